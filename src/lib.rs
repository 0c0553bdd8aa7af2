//! GSSAPI (RFC 2744) security contexts, names and credentials over the system Kerberos library.
//!
//! ```no_run
//! use holocron::{CredUsage, InitOptions, Mech, NameType};
//!
//! let provider = holocron::load()?;
//! let cred = provider.acquire_credential(None, &[Mech::Krb5], CredUsage::Initiate, None)?;
//! let target = provider.import_name("HTTP@web.example.com", NameType::HostbasedService)?;
//! let mut ctx = provider.init_sec_context(&target, InitOptions::new().credential(&cred))?;
//! let _first = ctx.step(&[])?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use holocron_core::{
    capability, channel_bindings, cred_store, engine, flags, lifetime, mech, oid, status, CallingError, Capabilities,
    Channel, ChannelBinding, ContextFlags, ContextState, CredInfo, CredStore, CredStoreKey, CredUsage, EngineFamily,
    Error, Extension, FatalStatus, GssAddress, InfoStatus, Lifetime, Mech, NameInfo, NameType, Oid, OidError, OidSet,
    Quirks, RawStatus, Result, RoundInfo, RoutineError, Signals, Step, StoredCredential, Supplementary, Unwrapped,
    Verified, Wrapped, QOP_DEFAULT,
};
#[cfg(unix)]
pub use holocron_unix::{EngineConfig, LoadError, UnixEngine, LIBRARY_ENV};

#[cfg(unix)]
pub type Provider = holocron_core::Provider<UnixEngine>;
#[cfg(unix)]
pub type Name = holocron_core::Name<UnixEngine>;
#[cfg(unix)]
pub type Credential = holocron_core::Credential<UnixEngine>;
#[cfg(unix)]
pub type CredElement<'a> = holocron_core::CredElement<'a, UnixEngine>;
#[cfg(unix)]
pub type SecContext<'cred> = holocron_core::SecContext<'cred, UnixEngine>;
#[cfg(unix)]
pub type SecContextInfo<'a> = holocron_core::SecContextInfo<'a, UnixEngine>;
#[cfg(unix)]
pub type InitOptions<'cred> = holocron_core::InitOptions<'cred, UnixEngine>;
#[cfg(unix)]
pub type AcceptOptions<'cred> = holocron_core::AcceptOptions<'cred, UnixEngine>;

/// Loads the GSSAPI library named by `HOLOCRON_GSSAPI_LIBRARY`, or the platform default.
#[cfg(unix)]
pub fn load() -> std::result::Result<Provider, LoadError> {
    load_with(EngineConfig::from_env())
}

#[cfg(unix)]
pub fn load_with(config: EngineConfig) -> std::result::Result<Provider, LoadError> {
    let engine = UnixEngine::load(&config)?;
    tracing::debug!(library = engine.library_path(), "holocron provider ready");
    Ok(Provider::new(engine))
}
