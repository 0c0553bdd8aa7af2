pub mod capability;
pub mod channel_bindings;
mod context;
mod cred;
pub mod cred_store;
pub mod engine;
mod error;
pub mod flags;
pub mod lifetime;
pub mod mech;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod name;
pub mod oid;
mod provider;
pub mod status;

#[cfg(test)]
mod tests;

pub use capability::{Capabilities, EngineFamily, Extension, Quirks};
pub use channel_bindings::{Channel, ChannelBinding, GssAddress};
pub use context::{
    AcceptOptions, ContextState, InitOptions, RoundInfo, SecContext, SecContextInfo, Step, Unwrapped, Verified,
    Wrapped, QOP_DEFAULT,
};
pub use cred::{CredElement, CredInfo, CredUsage, Credential, StoredCredential};
pub use cred_store::{CredStore, CredStoreKey};
pub use error::{Error, Result};
pub use flags::{ContextFlags, Signals};
pub use lifetime::Lifetime;
pub use mech::{Mech, NameType};
pub use name::{Name, NameInfo};
pub use oid::{Oid, OidError, OidSet};
pub use provider::Provider;
pub use status::{CallingError, FatalStatus, InfoStatus, RawStatus, RoutineError, Supplementary};
