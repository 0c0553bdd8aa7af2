use std::{sync::Arc, time::Duration};

use crate::{
    capability::{Capabilities, Extension},
    context::{AcceptOptions, InitOptions, SecContext},
    cred::{CredUsage, Credential},
    cred_store::CredStore,
    engine::{fail, AcquireRequest, Engine, StatusExt},
    error::{Error, Result},
    lifetime,
    mech::{Mech, NameType},
    name::{known_mechs, Name},
    oid::OidSet,
    status::RoutineError,
};

/// Entry point to one GSSAPI engine. Every object it creates keeps the engine alive.
pub struct Provider<E: Engine> {
    engine: Arc<E>,
}

impl<E: Engine> Clone for Provider<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

impl<E: Engine> Provider<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
    pub fn engine(&self) -> &E {
        &self.engine
    }
    pub fn capabilities(&self) -> &Capabilities {
        self.engine.capabilities()
    }
    pub fn has_extension(&self, extension: Extension) -> bool {
        self.capabilities().has_extension(extension)
    }
    /// Numeric form of [`has_extension`](Self::has_extension). Unknown codes answer false.
    pub fn has_extension_code(&self, code: u32) -> bool {
        self.capabilities().has_extension_code(code)
    }

    pub fn import_name(&self, name: &str, name_type: NameType) -> Result<Name<E>> {
        self.import_name_bytes(name.as_bytes(), name_type)
    }
    pub fn import_name_bytes(&self, name: &[u8], name_type: NameType) -> Result<Name<E>> {
        let handle = self
            .engine
            .import_name(name, &name_type.oid())
            .map_err(|raw| {
                let err = fail(&*self.engine, raw, None);
                // A broken export token is a token problem, whatever the library calls it.
                if name_type.is_exported_form() && err.is(RoutineError::BadName) {
                    Error::local(RoutineError::DefectiveToken, "malformed exported name")
                } else {
                    err
                }
            })?;
        Ok(Name::from_handle(self.engine.clone(), handle, name_type.is_exported_form()))
    }
    /// Installed mechanisms. Unrecognised mechanisms are skipped.
    pub fn indicate_mechs(&self) -> Result<Vec<Mech>> {
        let mechs = self.engine.indicate_mechs().or_fail(&*self.engine, None)?;
        Ok(known_mechs(&mechs))
    }
    /// Name types `mech` understands. Unrecognised types are skipped.
    pub fn inquire_names_for_mech(&self, mech: Mech) -> Result<Vec<NameType>> {
        let oid = mech.oid();
        let oids = self
            .engine
            .inquire_names_for_mech(&oid)
            .or_fail(&*self.engine, Some(&oid))?;
        let mut name_types = Vec::new();
        for oid in &oids {
            match NameType::from_oid(oid) {
                Some(name_type) if !name_types.contains(&name_type) => name_types.push(name_type),
                Some(_) => {}
                None => tracing::warn!(%oid, %mech, "skipping unrecognised name type"),
            }
        }
        Ok(name_types)
    }

    /// `name` of `None` asks for the default identity for `usage`; empty `mechs` for every mechanism.
    pub fn acquire_credential(
        &self,
        name: Option<&Name<E>>,
        mechs: &[Mech],
        usage: CredUsage,
        lifetime: Option<Duration>,
    ) -> Result<Credential<E>> {
        self.acquire(name, mechs, usage, lifetime, None)
    }
    /// Like [`acquire_credential`](Self::acquire_credential), reading identity material from `store`.
    pub fn acquire_credential_from(
        &self,
        name: Option<&Name<E>>,
        mechs: &[Mech],
        usage: CredUsage,
        lifetime: Option<Duration>,
        store: &CredStore,
    ) -> Result<Credential<E>> {
        if !self.has_extension(Extension::CredStore) {
            return Err(Error::unavailable("gss_acquire_cred_from"));
        }
        self.acquire(name, mechs, usage, lifetime, Some(store))
    }

    fn acquire(
        &self,
        name: Option<&Name<E>>,
        mechs: &[Mech],
        usage: CredUsage,
        lifetime: Option<Duration>,
        store: Option<&CredStore>,
    ) -> Result<Credential<E>> {
        if name.is_none() && usage == CredUsage::Both && self.capabilities().quirks().cannot_acquire_both_by_default {
            return Err(Error::unavailable("acquiring a default credential for both usages"));
        }
        let name_handle = name.map(|name| name.handle_for(&self.engine)).transpose()?;
        let mech_set: OidSet = mechs.iter().map(|mech| mech.oid()).collect();
        let single_mech = match mechs {
            [mech] => Some(mech.oid()),
            _ => None,
        };
        let handle = self
            .engine
            .acquire_cred(AcquireRequest {
                name: name_handle,
                mechs: &mech_set,
                usage,
                time_req: lifetime::time_req(lifetime),
                store,
            })
            .map_err(|raw| match fail(&*self.engine, raw, single_mech.as_ref()) {
                Error::Fatal(status) if matches!(status.routine, Some(RoutineError::NoCred | RoutineError::Failure)) => {
                    Error::NoIdentity { usage, status }
                }
                other => other,
            })?;
        Ok(Credential::from_handle(self.engine.clone(), handle, usage, name.is_none()))
    }

    /// Starts an initiator context. No engine call happens until the first [`SecContext::step`].
    pub fn init_sec_context<'cred>(
        &self,
        target: &Name<E>,
        options: InitOptions<'cred, E>,
    ) -> Result<SecContext<'cred, E>> {
        target.handle_for(&self.engine)?;
        let target = target.duplicate()?;
        Ok(SecContext::initiator(self.engine.clone(), target, options))
    }
    /// Starts an acceptor context. No engine call happens until the first [`SecContext::step`].
    pub fn accept_sec_context<'cred>(&self, options: AcceptOptions<'cred, E>) -> SecContext<'cred, E> {
        SecContext::acceptor(self.engine.clone(), options)
    }
    pub fn import_sec_context(&self, token: &[u8]) -> Result<SecContext<'static, E>> {
        let handle = self
            .engine
            .import_sec_context(token)
            .or_fail(&*self.engine, None)?;
        SecContext::imported(self.engine.clone(), handle)
    }

    /// Always unavailable: the libraries keep this setting per thread, and callers cannot pin the
    /// thread later calls run on. Set `KRB5_KTNAME` or use a [`CredStore`] instead.
    pub fn register_acceptor_identity(&self, _keytab: &str) -> Result<()> {
        Err(Error::local(
            RoutineError::Unavailable,
            "per-thread acceptor identity is not supported; use KRB5_KTNAME or a credential store",
        ))
    }
    /// Always unavailable, for the same reason as
    /// [`register_acceptor_identity`](Self::register_acceptor_identity).
    pub fn set_ccache_name(&self, _ccache: &str) -> Result<()> {
        Err(Error::local(
            RoutineError::Unavailable,
            "per-thread credential cache selection is not supported; use KRB5CCNAME or a credential store",
        ))
    }
}
