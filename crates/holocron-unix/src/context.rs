use std::{
    ffi::c_int,
    ptr::{self, NonNull},
};

use holocron_core::{
    engine::{AcceptRequest, EngineResult, InitRequest, RawContextInfo, RoundOutput},
    ContextFlags,
};

use crate::{
    buffer::{BindingsRef, InputBuffer, OwnedBuffer},
    cred::{OutCred, UnixCred},
    ffi::{gss_ctx_id_struct, gss_ctx_id_t, OM_uint32},
    library::Functions,
    name::{OutName, UnixName},
    oid::{self, oid_ptr, OidRef},
    status::{check, NULL_HANDLE},
    UnixEngine,
};

pub struct UnixContext(NonNull<gss_ctx_id_struct>);
// A context is driven by one owner at a time; the core wrapper takes `&mut self` for every call
// that changes its state.
unsafe impl Send for UnixContext {}
unsafe impl Sync for UnixContext {}

impl UnixContext {
    pub(crate) fn as_ptr(&self) -> gss_ctx_id_t {
        self.0.as_ptr()
    }
}

fn raw_of(ctx: &Option<UnixContext>) -> gss_ctx_id_t {
    ctx.as_ref().map_or(ptr::null_mut(), UnixContext::as_ptr)
}

/// Adopts whatever handle the library left behind. A failed first round is deleted so no
/// half-built context escapes.
fn settle(f: &Functions, ctx: &mut Option<UnixContext>, mut raw: gss_ctx_id_t, first_round: bool, failed: bool) {
    if failed && first_round && !raw.is_null() {
        let mut minor = 0;
        unsafe { (f.gss_delete_sec_context)(&mut minor, &mut raw, ptr::null_mut()) };
        raw = ptr::null_mut();
    }
    *ctx = NonNull::new(raw).map(UnixContext);
}

pub(crate) fn init(
    f: &Functions,
    ctx: &mut Option<UnixContext>,
    request: InitRequest<'_, UnixEngine>,
) -> EngineResult<RoundOutput<UnixEngine>> {
    let first_round = ctx.is_none();
    let mut raw = raw_of(ctx);
    let mut minor = 0;
    let mut mech = request.mech.map(OidRef::new);
    let mut bindings = request.bindings.map(BindingsRef::new);
    let mut input = InputBuffer::new(request.input);
    let mut actual_mech = ptr::null_mut();
    let mut output = OwnedBuffer::new(f);
    let mut ret_flags: OM_uint32 = 0;
    let mut time_rec: OM_uint32 = 0;
    let major = unsafe {
        (f.gss_init_sec_context)(
            &mut minor,
            request.cred.map_or(ptr::null_mut(), UnixCred::as_ptr),
            &mut raw,
            request.target.as_ptr(),
            oid_ptr(mech.as_mut()),
            request.flags.bits(),
            request.time_req,
            bindings.as_mut().map_or(ptr::null_mut(), BindingsRef::as_ptr),
            input.as_ptr(),
            &mut actual_mech,
            output.as_mut_ptr(),
            &mut ret_flags,
            &mut time_rec,
        )
    };
    let status = check(major, minor);
    settle(f, ctx, raw, first_round, status.is_err());
    let status = status?;
    if ctx.is_none() {
        return Err(NULL_HANDLE);
    }
    Ok(RoundOutput {
        continue_needed: status.continue_needed(),
        output_token: output.to_vec(),
        mech: oid::from_raw(actual_mech),
        flags: ContextFlags::from_bits(ret_flags),
        time_rec,
        src_name: None,
        delegated_cred: None,
    })
}

pub(crate) fn accept(
    f: &Functions,
    ctx: &mut Option<UnixContext>,
    request: AcceptRequest<'_, UnixEngine>,
) -> EngineResult<RoundOutput<UnixEngine>> {
    let first_round = ctx.is_none();
    let mut raw = raw_of(ctx);
    let mut minor = 0;
    let mut bindings = request.bindings.map(BindingsRef::new);
    let mut input = InputBuffer::new(request.input);
    let mut src_name = OutName::new(f);
    let mut mech = ptr::null_mut();
    let mut output = OwnedBuffer::new(f);
    let mut ret_flags: OM_uint32 = 0;
    let mut time_rec: OM_uint32 = 0;
    let mut delegated = OutCred::new(f);
    let major = unsafe {
        (f.gss_accept_sec_context)(
            &mut minor,
            &mut raw,
            request.cred.map_or(ptr::null_mut(), UnixCred::as_ptr),
            input.as_ptr(),
            bindings.as_mut().map_or(ptr::null_mut(), BindingsRef::as_ptr),
            src_name.as_mut_ptr(),
            &mut mech,
            output.as_mut_ptr(),
            &mut ret_flags,
            &mut time_rec,
            delegated.as_mut_ptr(),
        )
    };
    let status = check(major, minor);
    settle(f, ctx, raw, first_round, status.is_err());
    let status = status?;
    if ctx.is_none() {
        return Err(NULL_HANDLE);
    }
    let flags = ContextFlags::from_bits(ret_flags);
    Ok(RoundOutput {
        continue_needed: status.continue_needed(),
        output_token: output.to_vec(),
        mech: oid::from_raw(mech),
        flags,
        time_rec,
        src_name: if status.continue_needed() { None } else { src_name.take() },
        delegated_cred: if flags.contains(ContextFlags::DELEG) {
            delegated.take()
        } else {
            None
        },
    })
}

pub(crate) fn delete(f: &Functions, ctx: UnixContext) -> EngineResult<Vec<u8>> {
    let mut minor = 0;
    let mut raw = ctx.as_ptr();
    let mut output = OwnedBuffer::new(f);
    let major = unsafe { (f.gss_delete_sec_context)(&mut minor, &mut raw, output.as_mut_ptr()) };
    tracing::trace!("deleted GSSAPI security context");
    check(major, minor)?;
    Ok(output.to_vec())
}

pub(crate) fn process_token(f: &Functions, ctx: &UnixContext, token: &[u8]) -> EngineResult<()> {
    let mut minor = 0;
    let mut input = InputBuffer::new(token);
    let major = unsafe { (f.gss_process_context_token)(&mut minor, ctx.as_ptr(), input.as_ptr()) };
    check(major, minor).map(drop)
}

pub(crate) fn time(f: &Functions, ctx: &UnixContext) -> EngineResult<u32> {
    let mut minor = 0;
    let mut time_rec: OM_uint32 = 0;
    let major = unsafe { (f.gss_context_time)(&mut minor, ctx.as_ptr(), &mut time_rec) };
    check(major, minor)?;
    Ok(time_rec)
}

pub(crate) fn inquire(f: &Functions, ctx: &UnixContext) -> EngineResult<RawContextInfo<UnixName>> {
    let mut minor = 0;
    let mut src_name = OutName::new(f);
    let mut targ_name = OutName::new(f);
    let mut lifetime: OM_uint32 = 0;
    let mut mech = ptr::null_mut();
    let mut flags: OM_uint32 = 0;
    let mut locally_initiated: c_int = 0;
    let mut open: c_int = 0;
    let major = unsafe {
        (f.gss_inquire_context)(
            &mut minor,
            ctx.as_ptr(),
            src_name.as_mut_ptr(),
            targ_name.as_mut_ptr(),
            &mut lifetime,
            &mut mech,
            &mut flags,
            &mut locally_initiated,
            &mut open,
        )
    };
    check(major, minor)?;
    Ok(RawContextInfo {
        src_name: src_name.take(),
        targ_name: targ_name.take(),
        lifetime,
        mech: oid::from_raw(mech),
        flags: ContextFlags::from_bits(flags),
        locally_initiated: locally_initiated != 0,
        open: open != 0,
    })
}

pub(crate) fn wrap_size_limit(f: &Functions, ctx: &UnixContext, conf: bool, qop: u32, max_output: u32) -> EngineResult<u32> {
    let mut minor = 0;
    let mut max_input: OM_uint32 = 0;
    let major = unsafe {
        (f.gss_wrap_size_limit)(&mut minor, ctx.as_ptr(), conf.into(), qop, max_output, &mut max_input)
    };
    check(major, minor)?;
    Ok(max_input)
}

pub(crate) fn export(f: &Functions, ctx: &mut Option<UnixContext>) -> EngineResult<Vec<u8>> {
    let Some(handle) = ctx.take() else {
        return Err(NULL_HANDLE);
    };
    let mut minor = 0;
    let mut raw = handle.as_ptr();
    let mut token = OwnedBuffer::new(f);
    let major = unsafe { (f.gss_export_sec_context)(&mut minor, &mut raw, token.as_mut_ptr()) };
    let status = check(major, minor);
    if !raw.is_null() {
        // Only set when the export failed.
        let mut delete_minor = 0;
        unsafe { (f.gss_delete_sec_context)(&mut delete_minor, &mut raw, ptr::null_mut()) };
    }
    status?;
    Ok(token.to_vec())
}

pub(crate) fn import(f: &Functions, token: &[u8]) -> EngineResult<UnixContext> {
    let mut minor = 0;
    let mut input = InputBuffer::new(token);
    let mut raw = ptr::null_mut();
    let major = unsafe { (f.gss_import_sec_context)(&mut minor, input.as_ptr(), &mut raw) };
    check(major, minor)?;
    NonNull::new(raw).map(UnixContext).ok_or(NULL_HANDLE)
}
