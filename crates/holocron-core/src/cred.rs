use std::{
    fmt,
    sync::Arc,
    time::{Duration, SystemTime},
};

use crate::{
    capability::Extension,
    cred_store::CredStore,
    engine::{AddCredRequest, Engine, RawCredInfo, StatusExt, StoreRequest},
    error::{Error, Result},
    lifetime::{self, Lifetime},
    mech::{Mech, NameType},
    name::{known_mechs, Name},
    status::RoutineError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CredUsage {
    Both,
    Initiate,
    Accept,
}

impl CredUsage {
    /// `GSS_C_BOTH`, `GSS_C_INITIATE` or `GSS_C_ACCEPT`.
    pub fn to_raw(self) -> i32 {
        match self {
            CredUsage::Both => 0,
            CredUsage::Initiate => 1,
            CredUsage::Accept => 2,
        }
    }
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(CredUsage::Both),
            1 => Some(CredUsage::Initiate),
            2 => Some(CredUsage::Accept),
            _ => None,
        }
    }
    pub fn can_initiate(self) -> bool {
        matches!(self, CredUsage::Both | CredUsage::Initiate)
    }
    pub fn can_accept(self) -> bool {
        matches!(self, CredUsage::Both | CredUsage::Accept)
    }
    pub fn union(self, other: CredUsage) -> CredUsage {
        if self == other {
            self
        } else {
            CredUsage::Both
        }
    }
}

impl fmt::Display for CredUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CredUsage::Both => "initiate-and-accept",
            CredUsage::Initiate => "initiate",
            CredUsage::Accept => "accept",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredInfo {
    /// Unset when the library cannot name a credential acquired without a name.
    pub name: Option<String>,
    pub name_type: Option<NameType>,
    pub usage: CredUsage,
    /// Unset for accept-only credentials.
    pub initiator_expiry: Option<Lifetime>,
    /// Unset for initiate-only credentials.
    pub acceptor_expiry: Option<Lifetime>,
    pub mechs: Vec<Mech>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredCredential {
    pub mechs: Vec<Mech>,
    pub usage: CredUsage,
}

/// One mechanism element to add to a credential.
pub struct CredElement<'a, E: Engine> {
    name: Option<&'a Name<E>>,
    mech: Mech,
    usage: CredUsage,
    initiator_lifetime: Option<Duration>,
    acceptor_lifetime: Option<Duration>,
}

impl<'a, E: Engine> CredElement<'a, E> {
    pub fn new(mech: Mech, usage: CredUsage) -> Self {
        Self {
            name: None,
            mech,
            usage,
            initiator_lifetime: None,
            acceptor_lifetime: None,
        }
    }
    pub fn name(self, name: &'a Name<E>) -> Self {
        Self { name: Some(name), ..self }
    }
    pub fn initiator_lifetime(self, lifetime: Duration) -> Self {
        Self {
            initiator_lifetime: Some(lifetime),
            ..self
        }
    }
    pub fn acceptor_lifetime(self, lifetime: Duration) -> Self {
        Self {
            acceptor_lifetime: Some(lifetime),
            ..self
        }
    }
}

pub struct Credential<E: Engine> {
    engine: Arc<E>,
    handle: Option<E::Cred>,
    usage: CredUsage,
    from_default_name: bool,
}

impl<E: Engine> Credential<E> {
    pub(crate) fn from_handle(engine: Arc<E>, handle: E::Cred, usage: CredUsage, from_default_name: bool) -> Self {
        Self {
            engine,
            handle: Some(handle),
            usage,
            from_default_name,
        }
    }
    pub(crate) fn handle(&self) -> Result<&E::Cred> {
        self.handle
            .as_ref()
            .ok_or_else(|| Error::local(RoutineError::NoCred, "credential has been released"))
    }
    pub(crate) fn handle_for(&self, engine: &Arc<E>) -> Result<&E::Cred> {
        if !Arc::ptr_eq(&self.engine, engine) {
            return Err(Error::local(
                RoutineError::DefectiveCredential,
                "credential belongs to a different provider",
            ));
        }
        self.handle()
    }

    /// Usage recorded when the credential was acquired or last extended.
    pub fn usage(&self) -> CredUsage {
        self.usage
    }
    pub fn is_released(&self) -> bool {
        self.handle.is_none()
    }
    /// Releasing twice is a no-op.
    pub fn release(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => self.engine.release_cred(handle).or_fail(&*self.engine, None),
            None => Ok(()),
        }
    }

    pub fn inquire(&self) -> Result<CredInfo> {
        let raw = self.engine.inquire_cred(self.handle()?).or_fail(&*self.engine, None)?;
        let usage = self.corrected_usage(raw.usage);
        self.info_from(raw, usage)
    }
    pub fn inquire_by_mech(&self, mech: Mech) -> Result<CredInfo> {
        let oid = mech.oid();
        let mut raw = self
            .engine
            .inquire_cred_by_mech(self.handle()?, &oid)
            .or_fail(&*self.engine, Some(&oid))?;
        let usage = self.corrected_usage(raw.usage);
        if usage == CredUsage::Accept && self.engine.capabilities().quirks().swaps_accept_expiry_by_mech {
            std::mem::swap(&mut raw.initiator_lifetime, &mut raw.acceptor_lifetime);
        }
        self.info_from(raw, usage)
    }
    /// The credential's principal. Names of credentials acquired without a name may not support
    /// every operation on some libraries.
    pub fn name(&self) -> Result<Option<Name<E>>> {
        let raw = self.engine.inquire_cred(self.handle()?).or_fail(&*self.engine, None)?;
        Ok(raw.name.map(|handle| {
            let name = Name::from_handle(self.engine.clone(), handle, true);
            if self.from_default_name {
                name.mark_from_default_credential()
            } else {
                name
            }
        }))
    }

    /// Adds a mechanism element to this credential.
    pub fn add(&mut self, element: CredElement<'_, E>) -> Result<()> {
        self.add_in_place(element, None)
    }
    /// Adds a mechanism element to a copy, leaving this credential untouched.
    pub fn add_to_new(&self, element: CredElement<'_, E>) -> Result<Credential<E>> {
        self.add_into_new(element, None)
    }
    pub fn add_from(&mut self, element: CredElement<'_, E>, store: &CredStore) -> Result<()> {
        self.add_in_place(element, Some(store))
    }
    pub fn add_from_to_new(&self, element: CredElement<'_, E>, store: &CredStore) -> Result<Credential<E>> {
        self.add_into_new(element, Some(store))
    }

    /// Writes this credential into the store named by `store`.
    pub fn store_into(
        &self,
        usage: CredUsage,
        mech: Option<Mech>,
        overwrite: bool,
        default: bool,
        store: &CredStore,
    ) -> Result<StoredCredential> {
        if !self.engine.capabilities().has_extension(Extension::CredStore) {
            return Err(Error::unavailable("gss_store_cred_into"));
        }
        let oid = mech.map(Mech::oid);
        let stored = self
            .engine
            .store_cred(
                self.handle()?,
                StoreRequest {
                    usage,
                    mech: oid.as_ref(),
                    overwrite,
                    default,
                    store,
                },
            )
            .or_fail(&*self.engine, oid.as_ref())?;
        Ok(StoredCredential {
            mechs: known_mechs(&stored.mechs),
            usage: stored.usage,
        })
    }

    fn corrected_usage(&self, reported: CredUsage) -> CredUsage {
        if reported != self.usage && self.engine.capabilities().quirks().misreports_cred_usage {
            tracing::debug!(%reported, recorded = %self.usage, "overriding misreported credential usage");
            self.usage
        } else {
            reported
        }
    }

    fn info_from(&self, raw: RawCredInfo<E::Name>, usage: CredUsage) -> Result<CredInfo> {
        // Wrapped straight away so the handle is released on every path.
        let name = raw.name.map(|handle| Name::from_handle(self.engine.clone(), handle, true));
        let unstable = self.from_default_name && self.engine.capabilities().quirks().unstable_default_name;
        let (name, name_type) = match name {
            Some(name) if !unstable => {
                let (text, name_type) = name.display()?;
                (Some(text), name_type)
            }
            _ => (None, None),
        };
        let now = SystemTime::now();
        Ok(CredInfo {
            name,
            name_type,
            usage,
            initiator_expiry: usage
                .can_initiate()
                .then(|| Lifetime::from_time_rec(raw.initiator_lifetime, now)),
            acceptor_expiry: usage
                .can_accept()
                .then(|| Lifetime::from_time_rec(raw.acceptor_lifetime, now)),
            mechs: known_mechs(&raw.mechs),
        })
    }

    fn add_element(
        &self,
        element: &CredElement<'_, E>,
        store: Option<&CredStore>,
        new_handle: bool,
    ) -> Result<Option<E::Cred>> {
        let caps = self.engine.capabilities();
        if caps.quirks().add_cred_defective {
            return Err(Error::unavailable("gss_add_cred"));
        }
        if store.is_some() && !caps.has_extension(Extension::CredStore) {
            return Err(Error::unavailable("gss_add_cred_from"));
        }
        let name = element.name.map(|name| name.handle_for(&self.engine)).transpose()?;
        let oid = element.mech.oid();
        self.engine
            .add_cred(
                self.handle()?,
                AddCredRequest {
                    name,
                    mech: &oid,
                    usage: element.usage,
                    initiator_time_req: lifetime::time_req(element.initiator_lifetime),
                    acceptor_time_req: lifetime::time_req(element.acceptor_lifetime),
                    store,
                },
                new_handle,
            )
            .or_fail(&*self.engine, Some(&oid))
    }

    fn add_in_place(&mut self, element: CredElement<'_, E>, store: Option<&CredStore>) -> Result<()> {
        let new_handle = self.engine.capabilities().quirks().add_cred_requires_new_handle;
        if let Some(minted) = self.add_element(&element, store, new_handle)? {
            if let Some(old) = self.handle.replace(minted) {
                if let Err(status) = self.engine.release_cred(old) {
                    tracing::warn!(major = status.major, minor = status.minor, "failed to release replaced credential");
                }
            }
        }
        self.usage = self.usage.union(element.usage);
        Ok(())
    }

    fn add_into_new(&self, element: CredElement<'_, E>, store: Option<&CredStore>) -> Result<Credential<E>> {
        let minted = self
            .add_element(&element, store, true)?
            .ok_or_else(|| Error::local(RoutineError::Failure, "gss_add_cred returned no credential"))?;
        Ok(Credential {
            engine: self.engine.clone(),
            handle: Some(minted),
            usage: self.usage.union(element.usage),
            from_default_name: self.from_default_name,
        })
    }
}

impl<E: Engine> Drop for Credential<E> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::trace!("releasing GSSAPI credential");
            if let Err(status) = self.engine.release_cred(handle) {
                tracing::warn!(major = status.major, minor = status.minor, "failed to release GSSAPI credential");
            }
        }
    }
}

impl<E: Engine> fmt::Debug for Credential<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("usage", &self.usage)
            .field("released", &self.is_released())
            .field("from_default_name", &self.from_default_name)
            .finish_non_exhaustive()
    }
}
