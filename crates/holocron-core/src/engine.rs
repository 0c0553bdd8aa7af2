//! The seam between the owned wrappers in this crate and a concrete GSSAPI implementation.
//!
//! An [`Engine`] speaks RFC 2744 almost verbatim: it takes borrowed inputs, hands back raw handles
//! and reports failure as the untouched [`RawStatus`]. Ownership, release-once discipline, quirk
//! handling and status decoding all live above it, in [`Name`](crate::Name),
//! [`Credential`](crate::Credential) and [`SecContext`](crate::SecContext).

use crate::{
    capability::Capabilities,
    channel_bindings::ChannelBinding,
    cred::CredUsage,
    cred_store::CredStore,
    error::Error,
    flags::ContextFlags,
    oid::{Oid, OidSet},
    status::{self, RawStatus, RoutineError, Supplementary},
};

pub type EngineResult<T> = Result<T, RawStatus>;

pub struct AcquireRequest<'a, E: Engine + ?Sized> {
    pub name: Option<&'a E::Name>,
    /// Empty means every mechanism the engine offers.
    pub mechs: &'a OidSet,
    pub usage: CredUsage,
    pub time_req: u32,
    pub store: Option<&'a CredStore>,
}

pub struct AddCredRequest<'a, E: Engine + ?Sized> {
    pub name: Option<&'a E::Name>,
    pub mech: &'a Oid,
    pub usage: CredUsage,
    pub initiator_time_req: u32,
    pub acceptor_time_req: u32,
    pub store: Option<&'a CredStore>,
}

pub struct StoreRequest<'a> {
    pub usage: CredUsage,
    pub mech: Option<&'a Oid>,
    pub overwrite: bool,
    pub default: bool,
    pub store: &'a CredStore,
}

pub struct StoredElements {
    pub mechs: OidSet,
    pub usage: CredUsage,
}

pub struct RawCredInfo<N> {
    pub name: Option<N>,
    pub usage: CredUsage,
    pub initiator_lifetime: u32,
    pub acceptor_lifetime: u32,
    pub mechs: OidSet,
}

pub struct InitRequest<'a, E: Engine + ?Sized> {
    pub cred: Option<&'a E::Cred>,
    pub target: &'a E::Name,
    pub mech: Option<&'a Oid>,
    pub flags: ContextFlags,
    pub time_req: u32,
    pub bindings: Option<&'a ChannelBinding>,
    pub input: &'a [u8],
}

pub struct AcceptRequest<'a, E: Engine + ?Sized> {
    pub cred: Option<&'a E::Cred>,
    pub bindings: Option<&'a ChannelBinding>,
    pub input: &'a [u8],
}

/// Everything one `gss_init_sec_context`/`gss_accept_sec_context` call produced.
pub struct RoundOutput<E: Engine + ?Sized> {
    pub continue_needed: bool,
    pub output_token: Vec<u8>,
    pub mech: Option<Oid>,
    pub flags: ContextFlags,
    pub time_rec: u32,
    pub src_name: Option<E::Name>,
    pub delegated_cred: Option<E::Cred>,
}

pub struct RawContextInfo<N> {
    pub src_name: Option<N>,
    pub targ_name: Option<N>,
    pub lifetime: u32,
    pub mech: Option<Oid>,
    pub flags: ContextFlags,
    pub locally_initiated: bool,
    pub open: bool,
}

pub struct RawNameInfo {
    pub is_mechanism_name: bool,
    pub mech: Option<Oid>,
    pub attributes: Vec<Vec<u8>>,
}

pub struct WrapOutput {
    pub token: Vec<u8>,
    pub confidential: bool,
}

pub struct UnwrapOutput {
    pub message: Vec<u8>,
    pub confidential: bool,
    pub qop: u32,
    pub supplementary: Supplementary,
}

pub struct MicOutput {
    pub qop: u32,
    pub supplementary: Supplementary,
}

pub trait Engine: Send + Sync + 'static {
    type Name: Send + Sync + 'static;
    type Cred: Send + Sync + 'static;
    type Context: Send + Sync + 'static;

    fn capabilities(&self) -> &Capabilities;
    /// Resolves a minor status to the mechanism's messages. Never fails.
    fn minor_messages(&self, minor: u32, mech: Option<&Oid>) -> Vec<String>;

    fn import_name(&self, name: &[u8], name_type: &Oid) -> EngineResult<Self::Name>;
    fn release_name(&self, name: Self::Name) -> EngineResult<()>;
    fn display_name(&self, name: &Self::Name) -> EngineResult<(Vec<u8>, Option<Oid>)>;
    fn compare_name(&self, a: &Self::Name, b: &Self::Name) -> EngineResult<bool>;
    fn canonicalize_name(&self, name: &Self::Name, mech: &Oid) -> EngineResult<Self::Name>;
    fn export_name(&self, name: &Self::Name) -> EngineResult<Vec<u8>>;
    fn duplicate_name(&self, name: &Self::Name) -> EngineResult<Self::Name>;
    fn inquire_mechs_for_name(&self, name: &Self::Name) -> EngineResult<OidSet>;
    fn inquire_names_for_mech(&self, mech: &Oid) -> EngineResult<OidSet>;
    fn indicate_mechs(&self) -> EngineResult<OidSet>;
    fn localname(&self, name: &Self::Name, mech: &Oid) -> EngineResult<Vec<u8>>;
    fn inquire_name(&self, name: &Self::Name) -> EngineResult<RawNameInfo>;

    fn acquire_cred(&self, request: AcquireRequest<'_, Self>) -> EngineResult<Self::Cred>;
    fn release_cred(&self, cred: Self::Cred) -> EngineResult<()>;
    fn inquire_cred(&self, cred: &Self::Cred) -> EngineResult<RawCredInfo<Self::Name>>;
    fn inquire_cred_by_mech(&self, cred: &Self::Cred, mech: &Oid) -> EngineResult<RawCredInfo<Self::Name>>;
    /// Adds an element in place when `new_handle` is false, otherwise returns a new credential
    /// and leaves `cred` untouched.
    fn add_cred(
        &self,
        cred: &Self::Cred,
        request: AddCredRequest<'_, Self>,
        new_handle: bool,
    ) -> EngineResult<Option<Self::Cred>>;
    fn store_cred(&self, cred: &Self::Cred, request: StoreRequest<'_>) -> EngineResult<StoredElements>;

    /// `ctx` is `None` before the first round and filled in by it.
    fn init_sec_context(
        &self,
        ctx: &mut Option<Self::Context>,
        request: InitRequest<'_, Self>,
    ) -> EngineResult<RoundOutput<Self>>;
    fn accept_sec_context(
        &self,
        ctx: &mut Option<Self::Context>,
        request: AcceptRequest<'_, Self>,
    ) -> EngineResult<RoundOutput<Self>>;
    fn delete_sec_context(&self, ctx: Self::Context) -> EngineResult<Vec<u8>>;
    fn process_context_token(&self, ctx: &Self::Context, token: &[u8]) -> EngineResult<()>;
    fn context_time(&self, ctx: &Self::Context) -> EngineResult<u32>;
    fn inquire_context(&self, ctx: &Self::Context) -> EngineResult<RawContextInfo<Self::Name>>;
    fn wrap_size_limit(&self, ctx: &Self::Context, conf: bool, qop: u32, max_output: u32) -> EngineResult<u32>;
    /// Leaves `ctx` empty whether or not the export succeeded.
    fn export_sec_context(&self, ctx: &mut Option<Self::Context>) -> EngineResult<Vec<u8>>;
    fn import_sec_context(&self, token: &[u8]) -> EngineResult<Self::Context>;
    fn wrap(&self, ctx: &Self::Context, conf: bool, qop: u32, message: &[u8]) -> EngineResult<WrapOutput>;
    fn unwrap(&self, ctx: &Self::Context, token: &[u8]) -> EngineResult<UnwrapOutput>;
    fn get_mic(&self, ctx: &Self::Context, qop: u32, message: &[u8]) -> EngineResult<Vec<u8>>;
    fn verify_mic(&self, ctx: &Self::Context, message: &[u8], mic: &[u8]) -> EngineResult<MicOutput>;
}

/// Decodes an engine failure, resolving the minor status against `mech`.
pub(crate) trait StatusExt<T> {
    fn or_fail<E: Engine + ?Sized>(self, engine: &E, mech: Option<&Oid>) -> Result<T, Error>;
}

impl<T> StatusExt<T> for EngineResult<T> {
    fn or_fail<E: Engine + ?Sized>(self, engine: &E, mech: Option<&Oid>) -> Result<T, Error> {
        self.map_err(|raw| fail(engine, raw, mech))
    }
}

pub(crate) fn fail<E: Engine + ?Sized>(engine: &E, raw: RawStatus, mech: Option<&Oid>) -> Error {
    status::decode(raw, |minor| engine.minor_messages(minor, mech))
        .unwrap_or_else(|| Error::local(RoutineError::Failure, "engine failed without reporting a status"))
}
