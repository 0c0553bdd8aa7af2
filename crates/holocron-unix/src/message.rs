use std::ffi::c_int;

use holocron_core::engine::{EngineResult, MicOutput, UnwrapOutput, WrapOutput};

use crate::{
    buffer::{InputBuffer, OwnedBuffer},
    context::UnixContext,
    ffi::gss_qop_t,
    library::Functions,
    status::check,
};

pub(crate) fn wrap(f: &Functions, ctx: &UnixContext, conf: bool, qop: u32, message: &[u8]) -> EngineResult<WrapOutput> {
    let mut minor = 0;
    let mut input = InputBuffer::new(message);
    let mut conf_state: c_int = 0;
    let mut token = OwnedBuffer::new(f);
    let major = unsafe {
        (f.gss_wrap)(
            &mut minor,
            ctx.as_ptr(),
            conf.into(),
            qop,
            input.as_ptr(),
            &mut conf_state,
            token.as_mut_ptr(),
        )
    };
    check(major, minor)?;
    Ok(WrapOutput {
        token: token.to_vec(),
        confidential: conf_state != 0,
    })
}

pub(crate) fn unwrap(f: &Functions, ctx: &UnixContext, token: &[u8]) -> EngineResult<UnwrapOutput> {
    let mut minor = 0;
    let mut input = InputBuffer::new(token);
    let mut message = OwnedBuffer::new(f);
    let mut conf_state: c_int = 0;
    let mut qop: gss_qop_t = 0;
    let major = unsafe {
        (f.gss_unwrap)(
            &mut minor,
            ctx.as_ptr(),
            input.as_ptr(),
            message.as_mut_ptr(),
            &mut conf_state,
            &mut qop,
        )
    };
    let status = check(major, minor)?;
    Ok(UnwrapOutput {
        message: message.to_vec(),
        confidential: conf_state != 0,
        qop,
        supplementary: status.supplementary(),
    })
}

pub(crate) fn get_mic(f: &Functions, ctx: &UnixContext, qop: u32, message: &[u8]) -> EngineResult<Vec<u8>> {
    let mut minor = 0;
    let mut input = InputBuffer::new(message);
    let mut mic = OwnedBuffer::new(f);
    let major = unsafe { (f.gss_get_mic)(&mut minor, ctx.as_ptr(), qop, input.as_ptr(), mic.as_mut_ptr()) };
    check(major, minor)?;
    Ok(mic.to_vec())
}

pub(crate) fn verify_mic(f: &Functions, ctx: &UnixContext, message: &[u8], mic: &[u8]) -> EngineResult<MicOutput> {
    let mut minor = 0;
    let mut message = InputBuffer::new(message);
    let mut mic = InputBuffer::new(mic);
    let mut qop: gss_qop_t = 0;
    let major =
        unsafe { (f.gss_verify_mic)(&mut minor, ctx.as_ptr(), message.as_ptr(), mic.as_ptr(), &mut qop) };
    let status = check(major, minor)?;
    Ok(MicOutput {
        qop,
        supplementary: status.supplementary(),
    })
}
