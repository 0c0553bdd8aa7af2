//! [`Engine`] over the system's RFC 2744 library, loaded at runtime.
//!
//! The required GSSAPI entry points must all resolve for a library to load. The extensions
//! (`gss_localname`, `gss_inquire_name` and the credential-store calls) are looked up
//! individually and reported through [`Capabilities`].

mod buffer;
mod config;
mod context;
mod cred;
mod error;
mod ffi;
mod library;
mod message;
mod name;
mod oid;
mod status;

pub use config::{EngineConfig, LIBRARY_ENV};
pub use context::UnixContext;
pub use cred::UnixCred;
pub use error::LoadError;
pub use name::UnixName;

use holocron_core::{
    engine::{
        AcceptRequest, AcquireRequest, AddCredRequest, Engine, EngineResult, InitRequest, MicOutput, RawContextInfo,
        RawCredInfo, RawNameInfo, RoundOutput, StoreRequest, StoredElements, UnwrapOutput, WrapOutput,
    },
    Capabilities, Oid, OidSet,
};

use crate::library::{Functions, Loaded};

pub struct UnixEngine {
    loaded: Loaded,
}

impl UnixEngine {
    pub fn load(config: &EngineConfig) -> Result<Self, LoadError> {
        library::load(config).map(|loaded| Self { loaded })
    }
    /// Loads the library named by `HOLOCRON_GSSAPI_LIBRARY`, or the platform default.
    pub fn from_env() -> Result<Self, LoadError> {
        Self::load(&EngineConfig::from_env())
    }
    /// Path or soname the library was loaded from.
    pub fn library_path(&self) -> &str {
        &self.loaded.path
    }
    fn functions(&self) -> &Functions {
        &self.loaded.functions
    }
}

impl Engine for UnixEngine {
    type Name = UnixName;
    type Cred = UnixCred;
    type Context = UnixContext;

    fn capabilities(&self) -> &Capabilities {
        &self.loaded.capabilities
    }
    fn minor_messages(&self, minor: u32, mech: Option<&Oid>) -> Vec<String> {
        status::minor_messages(self.functions(), minor, mech)
    }

    fn import_name(&self, name: &[u8], name_type: &Oid) -> EngineResult<UnixName> {
        name::import(self.functions(), name, name_type)
    }
    fn release_name(&self, name: UnixName) -> EngineResult<()> {
        name::release(self.functions(), name)
    }
    fn display_name(&self, name: &UnixName) -> EngineResult<(Vec<u8>, Option<Oid>)> {
        name::display(self.functions(), name)
    }
    fn compare_name(&self, a: &UnixName, b: &UnixName) -> EngineResult<bool> {
        name::compare(self.functions(), a, b)
    }
    fn canonicalize_name(&self, name: &UnixName, mech: &Oid) -> EngineResult<UnixName> {
        name::canonicalize(self.functions(), name, mech)
    }
    fn export_name(&self, name: &UnixName) -> EngineResult<Vec<u8>> {
        name::export(self.functions(), name)
    }
    fn duplicate_name(&self, name: &UnixName) -> EngineResult<UnixName> {
        name::duplicate(self.functions(), name)
    }
    fn inquire_mechs_for_name(&self, name: &UnixName) -> EngineResult<OidSet> {
        name::mechs_for_name(self.functions(), name)
    }
    fn inquire_names_for_mech(&self, mech: &Oid) -> EngineResult<OidSet> {
        name::names_for_mech(self.functions(), mech)
    }
    fn indicate_mechs(&self) -> EngineResult<OidSet> {
        name::indicate_mechs(self.functions())
    }
    fn localname(&self, name: &UnixName, mech: &Oid) -> EngineResult<Vec<u8>> {
        name::localname(self.functions(), name, mech)
    }
    fn inquire_name(&self, name: &UnixName) -> EngineResult<RawNameInfo> {
        name::inquire(self.functions(), name)
    }

    fn acquire_cred(&self, request: AcquireRequest<'_, Self>) -> EngineResult<UnixCred> {
        cred::acquire(self.functions(), request)
    }
    fn release_cred(&self, cred: UnixCred) -> EngineResult<()> {
        cred::release(self.functions(), cred)
    }
    fn inquire_cred(&self, cred: &UnixCred) -> EngineResult<RawCredInfo<UnixName>> {
        cred::inquire(self.functions(), cred)
    }
    fn inquire_cred_by_mech(&self, cred: &UnixCred, mech: &Oid) -> EngineResult<RawCredInfo<UnixName>> {
        cred::inquire_by_mech(self.functions(), cred, mech)
    }
    fn add_cred(
        &self,
        cred: &UnixCred,
        request: AddCredRequest<'_, Self>,
        new_handle: bool,
    ) -> EngineResult<Option<UnixCred>> {
        cred::add(self.functions(), cred, request, new_handle)
    }
    fn store_cred(&self, cred: &UnixCred, request: StoreRequest<'_>) -> EngineResult<StoredElements> {
        cred::store(self.functions(), cred, request)
    }

    fn init_sec_context(
        &self,
        ctx: &mut Option<UnixContext>,
        request: InitRequest<'_, Self>,
    ) -> EngineResult<RoundOutput<Self>> {
        context::init(self.functions(), ctx, request)
    }
    fn accept_sec_context(
        &self,
        ctx: &mut Option<UnixContext>,
        request: AcceptRequest<'_, Self>,
    ) -> EngineResult<RoundOutput<Self>> {
        context::accept(self.functions(), ctx, request)
    }
    fn delete_sec_context(&self, ctx: UnixContext) -> EngineResult<Vec<u8>> {
        context::delete(self.functions(), ctx)
    }
    fn process_context_token(&self, ctx: &UnixContext, token: &[u8]) -> EngineResult<()> {
        context::process_token(self.functions(), ctx, token)
    }
    fn context_time(&self, ctx: &UnixContext) -> EngineResult<u32> {
        context::time(self.functions(), ctx)
    }
    fn inquire_context(&self, ctx: &UnixContext) -> EngineResult<RawContextInfo<UnixName>> {
        context::inquire(self.functions(), ctx)
    }
    fn wrap_size_limit(&self, ctx: &UnixContext, conf: bool, qop: u32, max_output: u32) -> EngineResult<u32> {
        context::wrap_size_limit(self.functions(), ctx, conf, qop, max_output)
    }
    fn export_sec_context(&self, ctx: &mut Option<UnixContext>) -> EngineResult<Vec<u8>> {
        context::export(self.functions(), ctx)
    }
    fn import_sec_context(&self, token: &[u8]) -> EngineResult<UnixContext> {
        context::import(self.functions(), token)
    }
    fn wrap(&self, ctx: &UnixContext, conf: bool, qop: u32, message: &[u8]) -> EngineResult<WrapOutput> {
        message::wrap(self.functions(), ctx, conf, qop, message)
    }
    fn unwrap(&self, ctx: &UnixContext, token: &[u8]) -> EngineResult<UnwrapOutput> {
        message::unwrap(self.functions(), ctx, token)
    }
    fn get_mic(&self, ctx: &UnixContext, qop: u32, message: &[u8]) -> EngineResult<Vec<u8>> {
        message::get_mic(self.functions(), ctx, qop, message)
    }
    fn verify_mic(&self, ctx: &UnixContext, message: &[u8], mic: &[u8]) -> EngineResult<MicOutput> {
        message::verify_mic(self.functions(), ctx, message, mic)
    }
}
