use std::{fmt, sync::Arc};

use crate::{
    capability::Extension,
    engine::{Engine, StatusExt},
    error::{Error, Result},
    mech::{Mech, NameType},
    oid::Oid,
    status::RoutineError,
};

/// An engine-owned principal identity, released exactly once.
pub struct Name<E: Engine> {
    engine: Arc<E>,
    handle: Option<E::Name>,
    mechanism_name: bool,
    from_default_credential: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameInfo {
    pub is_mechanism_name: bool,
    /// Unset for names that are not mechanism names, or whose mechanism is not known here.
    pub mech: Option<Mech>,
    pub attributes: Vec<String>,
}

impl<E: Engine> Name<E> {
    pub(crate) fn from_handle(engine: Arc<E>, handle: E::Name, mechanism_name: bool) -> Self {
        Self {
            engine,
            handle: Some(handle),
            mechanism_name,
            from_default_credential: false,
        }
    }
    pub(crate) fn mark_from_default_credential(mut self) -> Self {
        self.from_default_credential = true;
        self
    }
    pub(crate) fn handle(&self) -> Result<&E::Name> {
        self.handle
            .as_ref()
            .ok_or_else(|| Error::local(RoutineError::BadName, "name has been released"))
    }
    pub(crate) fn belongs_to(&self, engine: &Arc<E>) -> bool {
        Arc::ptr_eq(&self.engine, engine)
    }
    /// Handle of a name that must come from `engine`.
    pub(crate) fn handle_for(&self, engine: &Arc<E>) -> Result<&E::Name> {
        if !self.belongs_to(engine) {
            return Err(Error::local(RoutineError::BadName, "name belongs to a different provider"));
        }
        self.handle()
    }
    fn stable_handle(&self, operation: &str) -> Result<&E::Name> {
        if self.from_default_credential && self.engine.capabilities().quirks().unstable_default_name {
            return Err(Error::local(
                RoutineError::Unavailable,
                format!("{operation} is not stable for the name of a default credential on this GSSAPI library"),
            ));
        }
        self.handle()
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_none()
    }
    /// True for names produced by canonicalization or context establishment.
    pub fn is_mechanism_name(&self) -> bool {
        self.mechanism_name
    }
    /// Releasing twice is a no-op.
    pub fn release(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => self.engine.release_name(handle).or_fail(&*self.engine, None),
            None => Ok(()),
        }
    }
    pub fn compare(&self, other: &Name<E>) -> Result<bool> {
        let a = self.stable_handle("gss_compare_name")?;
        let b = other.handle_for(&self.engine)?;
        other.stable_handle("gss_compare_name")?;
        self.engine.compare_name(a, b).or_fail(&*self.engine, None)
    }
    /// Text form and, when the engine reports one, the name type.
    pub fn display(&self) -> Result<(String, Option<NameType>)> {
        let handle = self.stable_handle("gss_display_name")?;
        let (bytes, oid) = self.engine.display_name(handle).or_fail(&*self.engine, None)?;
        let name_type = match oid {
            None => None,
            Some(oid) => Some(NameType::from_oid(&oid).ok_or_else(|| {
                Error::local(RoutineError::BadNameType, format!("unrecognised name type {oid}"))
            })?),
        };
        Ok((String::from_utf8_lossy(&bytes).into_owned(), name_type))
    }
    pub fn canonicalize(&self, mech: Mech) -> Result<Name<E>> {
        let handle = self.stable_handle("gss_canonicalize_name")?;
        let oid = mech.oid();
        let canonical = self
            .engine
            .canonicalize_name(handle, &oid)
            .or_fail(&*self.engine, Some(&oid))?;
        Ok(Name::from_handle(self.engine.clone(), canonical, true))
    }
    pub fn export(&self) -> Result<Vec<u8>> {
        let handle = self.stable_handle("gss_export_name")?;
        if !self.mechanism_name {
            return Err(Error::local(
                RoutineError::NameNotMn,
                "only canonicalized or authenticated names can be exported",
            ));
        }
        self.engine.export_name(handle).or_fail(&*self.engine, None)
    }
    pub fn duplicate(&self) -> Result<Name<E>> {
        let handle = self.stable_handle("gss_duplicate_name")?;
        let copy = self.engine.duplicate_name(handle).or_fail(&*self.engine, None)?;
        Ok(Name {
            engine: self.engine.clone(),
            handle: Some(copy),
            mechanism_name: self.mechanism_name,
            from_default_credential: self.from_default_credential,
        })
    }
    /// Mechanisms that support this name. Unrecognised mechanisms are skipped.
    pub fn inquire_mechs(&self) -> Result<Vec<Mech>> {
        let mechs = self
            .engine
            .inquire_mechs_for_name(self.handle()?)
            .or_fail(&*self.engine, None)?;
        Ok(known_mechs(&mechs))
    }
    /// Local account the name maps to.
    pub fn localname(&self, mech: Mech) -> Result<String> {
        if !self.engine.capabilities().has_extension(Extension::Localname) {
            return Err(Error::unavailable("gss_localname"));
        }
        let oid = mech.oid();
        let bytes = self
            .engine
            .localname(self.handle()?, &oid)
            .or_fail(&*self.engine, Some(&oid))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
    pub fn inquire(&self) -> Result<NameInfo> {
        if !self.engine.capabilities().has_extension(Extension::InquireName) {
            return Err(Error::unavailable("gss_inquire_name"));
        }
        let raw = self.engine.inquire_name(self.handle()?).or_fail(&*self.engine, None)?;
        let mech = match raw.mech {
            Some(oid) => Some(Mech::from_oid(&oid).ok_or_else(|| {
                Error::local(RoutineError::BadMech, format!("unrecognised mechanism {oid}"))
            })?),
            None => None,
        };
        Ok(NameInfo {
            is_mechanism_name: raw.is_mechanism_name,
            mech,
            attributes: raw
                .attributes
                .into_iter()
                .map(|attr| String::from_utf8_lossy(&attr).into_owned())
                .collect(),
        })
    }
}

pub(crate) fn known_mechs<'a>(oids: impl IntoIterator<Item = &'a Oid>) -> Vec<Mech> {
    let mut mechs = Vec::new();
    for oid in oids {
        match Mech::from_oid(oid) {
            Some(mech) if !mechs.contains(&mech) => mechs.push(mech),
            Some(_) => {}
            None => tracing::warn!(%oid, "skipping unrecognised mechanism"),
        }
    }
    mechs
}

impl<E: Engine> Drop for Name<E> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::trace!("releasing GSSAPI name");
            if let Err(status) = self.engine.release_name(handle) {
                tracing::warn!(major = status.major, minor = status.minor, "failed to release GSSAPI name");
            }
        }
    }
}

impl<E: Engine> fmt::Display for Name<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.display() {
            Ok((name, _)) => f.write_str(&name),
            Err(_) => Ok(()),
        }
    }
}

impl<E: Engine> fmt::Debug for Name<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Name")
            .field("released", &self.is_released())
            .field("mechanism_name", &self.mechanism_name)
            .field("from_default_credential", &self.from_default_credential)
            .finish_non_exhaustive()
    }
}
