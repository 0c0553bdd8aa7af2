use std::{fmt, sync::Arc, time::Duration, time::SystemTime};

use crate::{
    channel_bindings::ChannelBinding,
    cred::{CredUsage, Credential},
    engine::{fail, AcceptRequest, Engine, InitRequest, RoundOutput, StatusExt},
    error::{Error, Result},
    flags::ContextFlags,
    lifetime::{self, Lifetime},
    mech::Mech,
    name::Name,
    oid::Oid,
    status::{RoutineError, Supplementary},
};

/// `GSS_C_QOP_DEFAULT`
pub const QOP_DEFAULT: u32 = 0;

/// Initiator settings, reused unchanged for every establishment round.
pub struct InitOptions<'cred, E: Engine> {
    mech: Option<Mech>,
    credential: Option<&'cred Credential<E>>,
    flags: ContextFlags,
    lifetime: Option<Duration>,
    channel_binding: Option<ChannelBinding>,
}

impl<'cred, E: Engine> InitOptions<'cred, E> {
    pub fn new() -> Self {
        Self {
            mech: None,
            credential: None,
            flags: ContextFlags::empty(),
            lifetime: None,
            channel_binding: None,
        }
    }
    pub fn mech(self, mech: Mech) -> Self {
        Self { mech: Some(mech), ..self }
    }
    pub fn credential(self, credential: &'cred Credential<E>) -> Self {
        Self {
            credential: Some(credential),
            ..self
        }
    }
    /// Replaces the requested flags.
    pub fn flags(self, flags: ContextFlags) -> Self {
        Self { flags, ..self }
    }
    /// Adds to the requested flags.
    pub fn request(mut self, flags: ContextFlags) -> Self {
        self.flags.insert(flags);
        self
    }
    pub fn lifetime(self, lifetime: Duration) -> Self {
        Self {
            lifetime: Some(lifetime),
            ..self
        }
    }
    pub fn channel_binding(self, channel_binding: ChannelBinding) -> Self {
        Self {
            channel_binding: Some(channel_binding),
            ..self
        }
    }
}

impl<E: Engine> Default for InitOptions<'_, E> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AcceptOptions<'cred, E: Engine> {
    credential: Option<&'cred Credential<E>>,
    channel_binding: Option<ChannelBinding>,
}

impl<'cred, E: Engine> AcceptOptions<'cred, E> {
    pub fn new() -> Self {
        Self {
            credential: None,
            channel_binding: None,
        }
    }
    pub fn credential(self, credential: &'cred Credential<E>) -> Self {
        Self {
            credential: Some(credential),
            ..self
        }
    }
    pub fn channel_binding(self, channel_binding: ChannelBinding) -> Self {
        Self {
            channel_binding: Some(channel_binding),
            ..self
        }
    }
}

impl<E: Engine> Default for AcceptOptions<'_, E> {
    fn default() -> Self {
        Self::new()
    }
}

enum Role<'cred, E: Engine> {
    Initiator(InitOptions<'cred, E>),
    Acceptor(AcceptOptions<'cred, E>),
    Imported { locally_initiated: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextState {
    Unestablished,
    Continuing,
    Established,
    /// Deleted or exported. Terminal.
    Deleted,
}

/// What one establishment round reported.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundInfo {
    pub mech: Option<Mech>,
    pub flags: ContextFlags,
    pub expires_at: Lifetime,
    pub locally_initiated: bool,
    pub fully_established: bool,
    pub protection_ready: bool,
    pub transferable: bool,
    pub channel_bound: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step {
    /// Token to hand to the peer, if the engine produced one.
    pub token: Option<Vec<u8>>,
    pub info: RoundInfo,
}

pub struct SecContextInfo<'a, E: Engine> {
    pub initiator_name: Option<&'a Name<E>>,
    pub acceptor_name: Option<&'a Name<E>>,
    pub mech: Mech,
    pub flags: ContextFlags,
    pub expires_at: Lifetime,
    pub locally_initiated: bool,
    pub fully_established: bool,
    pub protection_ready: bool,
    pub transferable: bool,
    pub channel_bound: bool,
}

impl<E: Engine> fmt::Debug for SecContextInfo<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecContextInfo")
            .field("initiator_name", &self.initiator_name)
            .field("acceptor_name", &self.acceptor_name)
            .field("mech", &self.mech)
            .field("flags", &self.flags)
            .field("expires_at", &self.expires_at)
            .field("locally_initiated", &self.locally_initiated)
            .field("fully_established", &self.fully_established)
            .field("protection_ready", &self.protection_ready)
            .field("transferable", &self.transferable)
            .field("channel_bound", &self.channel_bound)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Wrapped {
    pub token: Vec<u8>,
    pub confidential: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unwrapped {
    pub message: Vec<u8>,
    pub confidential: bool,
    pub qop: u32,
    /// Replay and sequencing conditions the engine detected.
    pub supplementary: Supplementary,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Verified {
    pub qop: u32,
    pub supplementary: Supplementary,
}

/// A security context in either role.
///
/// Not safe for unsynchronised use from several callers: every call may mutate the engine handle.
pub struct SecContext<'cred, E: Engine> {
    engine: Arc<E>,
    handle: Option<E::Context>,
    role: Role<'cred, E>,
    state: ContextState,
    mech: Option<Mech>,
    target: Option<Name<E>>,
    initiator_name: Option<Name<E>>,
    acceptor_name: Option<Name<E>>,
    delegated_credential: Option<Credential<E>>,
}

/// Length of a message as the ABI's 32-bit length field.
pub(crate) fn wire_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::TooLarge(len))
}

impl<'cred, E: Engine> SecContext<'cred, E> {
    fn unestablished(engine: Arc<E>, role: Role<'cred, E>, target: Option<Name<E>>) -> Self {
        Self {
            engine,
            handle: None,
            role,
            state: ContextState::Unestablished,
            mech: None,
            target,
            initiator_name: None,
            acceptor_name: None,
            delegated_credential: None,
        }
    }
    pub(crate) fn initiator(engine: Arc<E>, target: Name<E>, options: InitOptions<'cred, E>) -> Self {
        let mech = options.mech;
        let mut ctx = Self::unestablished(engine, Role::Initiator(options), Some(target));
        ctx.mech = mech;
        ctx
    }
    pub(crate) fn acceptor(engine: Arc<E>, options: AcceptOptions<'cred, E>) -> Self {
        Self::unestablished(engine, Role::Acceptor(options), None)
    }

    pub fn state(&self) -> ContextState {
        self.state
    }
    /// True until a round reports the context complete.
    pub fn continue_needed(&self) -> bool {
        matches!(self.state, ContextState::Unestablished | ContextState::Continuing)
    }
    pub fn is_established(&self) -> bool {
        self.state == ContextState::Established
    }
    pub fn is_initiator(&self) -> bool {
        match self.role {
            Role::Initiator(_) => true,
            Role::Acceptor(_) => false,
            Role::Imported { locally_initiated } => locally_initiated,
        }
    }
    /// Negotiated mechanism, or the requested one before the first round.
    pub fn mech(&self) -> Option<Mech> {
        self.mech
    }
    pub fn target_name(&self) -> Option<&Name<E>> {
        self.target.as_ref()
    }
    pub fn initiator_name(&self) -> Option<&Name<E>> {
        self.initiator_name.as_ref()
    }
    pub fn acceptor_name(&self) -> Option<&Name<E>> {
        self.acceptor_name.as_ref()
    }
    pub fn delegated_credential(&self) -> Option<&Credential<E>> {
        self.delegated_credential.as_ref()
    }
    /// Takes ownership of the delegated credential so it can outlive the context.
    pub fn take_delegated_credential(&mut self) -> Option<Credential<E>> {
        self.delegated_credential.take()
    }

    fn live_handle(&self) -> Result<&E::Context> {
        self.handle
            .as_ref()
            .ok_or_else(|| Error::local(RoutineError::NoContext, "no security context has been established"))
    }
    fn mech_oid(&self) -> Option<Oid> {
        self.mech.map(Mech::oid)
    }

    /// Runs one establishment round. Pass an empty token on the initiator's first call.
    pub fn step(&mut self, input: &[u8]) -> Result<Step> {
        match self.state {
            ContextState::Deleted => {
                return Err(Error::local(RoutineError::NoContext, "security context has been deleted"));
            }
            ContextState::Established => {
                return Err(Error::local(RoutineError::Failure, "security context is already established"));
            }
            ContextState::Unestablished | ContextState::Continuing => {}
        }
        let engine = &*self.engine;
        let mech_oid = self.mech.map(Mech::oid);
        let round = match &self.role {
            Role::Initiator(options) => {
                let target = self
                    .target
                    .as_ref()
                    .ok_or_else(|| Error::local(RoutineError::BadName, "no target name"))?
                    .handle()?;
                let cred = options
                    .credential
                    .map(|cred| cred.handle_for(&self.engine))
                    .transpose()?;
                engine.init_sec_context(
                    &mut self.handle,
                    InitRequest {
                        cred,
                        target,
                        mech: mech_oid.as_ref(),
                        flags: options.flags,
                        time_req: lifetime::time_req(options.lifetime),
                        bindings: options.channel_binding.as_ref(),
                        input,
                    },
                )
            }
            Role::Acceptor(options) => {
                let cred = options
                    .credential
                    .map(|cred| cred.handle_for(&self.engine))
                    .transpose()?;
                engine.accept_sec_context(
                    &mut self.handle,
                    AcceptRequest {
                        cred,
                        bindings: options.channel_binding.as_ref(),
                        input,
                    },
                )
            }
            Role::Imported { .. } => {
                return Err(Error::local(
                    RoutineError::Failure,
                    "imported security contexts cannot be stepped",
                ));
            }
        };
        let round = round.map_err(|raw| fail(engine, raw, mech_oid.as_ref()))?;
        self.absorb(round, input.len())
    }

    fn absorb(&mut self, round: RoundOutput<E>, input_len: usize) -> Result<Step> {
        let RoundOutput {
            continue_needed,
            output_token,
            mech,
            flags,
            time_rec,
            src_name,
            delegated_cred,
        } = round;
        // Take ownership of every handle before anything can fail.
        if let Some(handle) = src_name {
            self.initiator_name = Some(Name::from_handle(self.engine.clone(), handle, true));
        }
        if let Some(handle) = delegated_cred {
            self.delegated_credential = Some(Credential::from_handle(
                self.engine.clone(),
                handle,
                CredUsage::Initiate,
                false,
            ));
        }
        self.state = if continue_needed {
            ContextState::Continuing
        } else {
            ContextState::Established
        };
        tracing::debug!(
            initiator = self.is_initiator(),
            continue_needed,
            input_len,
            output_len = output_token.len(),
            "security context round"
        );
        if let Some(oid) = mech {
            self.mech = Some(known_mech(&oid)?);
        }
        let (flags, signals) = flags.split_signals();
        Ok(Step {
            token: (!output_token.is_empty()).then_some(output_token),
            info: RoundInfo {
                mech: self.mech,
                flags,
                expires_at: Lifetime::from_time_rec(time_rec, SystemTime::now()),
                locally_initiated: self.is_initiator(),
                fully_established: !continue_needed,
                protection_ready: signals.protection_ready,
                transferable: signals.transferable,
                channel_bound: signals.channel_bound,
            },
        })
    }

    /// Current properties of the context. Replaces the captured peer names.
    pub fn inquire(&mut self) -> Result<SecContextInfo<'_, E>> {
        let engine = &*self.engine;
        let raw = engine
            .inquire_context(self.live_handle()?)
            .or_fail(engine, self.mech_oid().as_ref())?;
        self.initiator_name = raw
            .src_name
            .map(|handle| Name::from_handle(self.engine.clone(), handle, true));
        self.acceptor_name = raw
            .targ_name
            .map(|handle| Name::from_handle(self.engine.clone(), handle, true));
        let mech = match raw.mech {
            Some(oid) => known_mech(&oid)?,
            None if self.engine.capabilities().quirks().omits_context_mech => Mech::Krb5,
            None => return Err(Error::local(RoutineError::BadMech, "engine reported no mechanism")),
        };
        self.mech = Some(mech);
        let (flags, signals) = raw.flags.split_signals();
        Ok(SecContextInfo {
            initiator_name: self.initiator_name.as_ref(),
            acceptor_name: self.acceptor_name.as_ref(),
            mech,
            flags,
            expires_at: Lifetime::from_time_rec(raw.lifetime, SystemTime::now()),
            locally_initiated: raw.locally_initiated,
            fully_established: raw.open,
            protection_ready: signals.protection_ready,
            transferable: signals.transferable,
            channel_bound: signals.channel_bound,
        })
    }

    /// Releases everything the context owns and returns the engine's final token, if any.
    /// Deleting again is a no-op.
    pub fn delete(&mut self) -> Result<Vec<u8>> {
        let mut first_error = None;
        for name in [&mut self.initiator_name, &mut self.acceptor_name, &mut self.target] {
            if let Some(mut name) = name.take() {
                if let Err(err) = name.release() {
                    first_error.get_or_insert(err);
                }
            }
        }
        if let Some(mut cred) = self.delegated_credential.take() {
            if let Err(err) = cred.release() {
                first_error.get_or_insert(err);
            }
        }
        self.state = ContextState::Deleted;
        let token = match self.handle.take() {
            Some(handle) => {
                let mech = self.mech_oid();
                self.engine
                    .delete_sec_context(handle)
                    .or_fail(&*self.engine, mech.as_ref())?
            }
            None => Vec::new(),
        };
        match first_error {
            Some(err) => Err(err),
            None => Ok(token),
        }
    }

    /// Serialises an established context. The context is unusable afterwards.
    pub fn export(&mut self) -> Result<Vec<u8>> {
        self.live_handle()?;
        if self.state != ContextState::Established {
            return Err(Error::local(
                RoutineError::Unavailable,
                "only fully established contexts can be exported",
            ));
        }
        let mech = self.mech_oid();
        let exported = self.engine.export_sec_context(&mut self.handle);
        if self.handle.is_none() {
            self.state = ContextState::Deleted;
        }
        exported.or_fail(&*self.engine, mech.as_ref())
    }

    /// Feeds an out-of-band token from the peer to the engine.
    pub fn process_token(&mut self, token: &[u8]) -> Result<()> {
        wire_len(token.len())?;
        let handle = self.live_handle()?;
        self.engine
            .process_context_token(handle, token)
            .or_fail(&*self.engine, self.mech_oid().as_ref())
    }

    pub fn expires_at(&self) -> Result<Lifetime> {
        let handle = self.live_handle()?;
        match self.engine.context_time(handle) {
            Ok(seconds) => Ok(Lifetime::from_time_rec(seconds, SystemTime::now())),
            Err(raw) => {
                let err = fail(&*self.engine, raw, self.mech_oid().as_ref());
                if err.is(RoutineError::ContextExpired) {
                    Ok(Lifetime::Expired)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Largest message that still wraps into at most `max_wrapped` bytes.
    pub fn wrap_size_limit(&self, confidential: bool, max_wrapped: usize, qop: u32) -> Result<usize> {
        let max_wrapped = wire_len(max_wrapped)?;
        let handle = self.live_handle()?;
        let limit = self
            .engine
            .wrap_size_limit(handle, confidential, qop, max_wrapped)
            .or_fail(&*self.engine, self.mech_oid().as_ref())?;
        Ok(limit as usize)
    }

    pub fn wrap(&mut self, message: &[u8], confidential: bool, qop: u32) -> Result<Wrapped> {
        wire_len(message.len())?;
        let handle = self.live_handle()?;
        let out = self
            .engine
            .wrap(handle, confidential, qop, message)
            .or_fail(&*self.engine, self.mech_oid().as_ref())?;
        Ok(Wrapped {
            token: out.token,
            confidential: out.confidential,
        })
    }

    pub fn unwrap(&mut self, token: &[u8]) -> Result<Unwrapped> {
        wire_len(token.len())?;
        let handle = self.live_handle()?;
        let out = self
            .engine
            .unwrap(handle, token)
            .or_fail(&*self.engine, self.mech_oid().as_ref())?;
        Ok(Unwrapped {
            message: out.message,
            confidential: out.confidential,
            qop: out.qop,
            supplementary: out.supplementary,
        })
    }

    pub fn get_mic(&mut self, message: &[u8], qop: u32) -> Result<Vec<u8>> {
        wire_len(message.len())?;
        let handle = self.live_handle()?;
        self.engine
            .get_mic(handle, qop, message)
            .or_fail(&*self.engine, self.mech_oid().as_ref())
    }

    pub fn verify_mic(&mut self, message: &[u8], mic: &[u8]) -> Result<Verified> {
        wire_len(message.len())?;
        wire_len(mic.len())?;
        let handle = self.live_handle()?;
        let out = self
            .engine
            .verify_mic(handle, message, mic)
            .or_fail(&*self.engine, self.mech_oid().as_ref())?;
        Ok(Verified {
            qop: out.qop,
            supplementary: out.supplementary,
        })
    }
}

impl<E: Engine> SecContext<'static, E> {
    /// Wraps an imported handle, learning its role and state from the engine.
    pub(crate) fn imported(engine: Arc<E>, handle: E::Context) -> Result<Self> {
        let mut ctx = Self::unestablished(engine, Role::Imported { locally_initiated: false }, None);
        ctx.handle = Some(handle);
        let info = ctx.inquire()?;
        let (locally_initiated, open) = (info.locally_initiated, info.fully_established);
        ctx.role = Role::Imported { locally_initiated };
        ctx.state = if open {
            ContextState::Established
        } else {
            ContextState::Continuing
        };
        Ok(ctx)
    }
}

fn known_mech(oid: &Oid) -> Result<Mech> {
    Mech::from_oid(oid).ok_or_else(|| Error::local(RoutineError::BadMech, format!("unrecognised mechanism {oid}")))
}

impl<E: Engine> Drop for SecContext<'_, E> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::trace!("deleting GSSAPI security context");
            if let Err(status) = self.engine.delete_sec_context(handle) {
                tracing::warn!(
                    major = status.major,
                    minor = status.minor,
                    "failed to delete GSSAPI security context"
                );
            }
        }
    }
}

impl<E: Engine> fmt::Debug for SecContext<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecContext")
            .field("state", &self.state)
            .field("initiator", &self.is_initiator())
            .field("mech", &self.mech)
            .finish_non_exhaustive()
    }
}
