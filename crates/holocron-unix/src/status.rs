use holocron_core::{engine::EngineResult, Oid, RawStatus, RoutineError};

use crate::{
    buffer::OwnedBuffer,
    ffi::{OM_uint32, GSS_C_MECH_CODE},
    library::Functions,
    oid::{oid_ptr, OidRef},
};

/// The library promised a handle and returned none.
pub(crate) const NULL_HANDLE: RawStatus = RawStatus::routine(RoutineError::Failure);
pub(crate) const UNAVAILABLE: RawStatus = RawStatus::routine(RoutineError::Unavailable);

/// Bounds the `gss_display_status` loop against a library that never clears the context.
const MAX_MESSAGES: usize = 16;

/// Splits a returned status pair into success (with its supplementary bits) or failure.
pub(crate) fn check(major: OM_uint32, minor: OM_uint32) -> EngineResult<RawStatus> {
    let status = RawStatus::new(major, minor);
    if status.is_error() {
        Err(status)
    } else {
        Ok(status)
    }
}

pub(crate) fn minor_messages(functions: &Functions, minor: u32, mech: Option<&Oid>) -> Vec<String> {
    let mut mech = mech.map(OidRef::new);
    let mut messages = Vec::new();
    let mut message_context = 0;
    loop {
        let mut display_minor = 0;
        let mut buffer = OwnedBuffer::new(functions);
        let major = unsafe {
            (functions.gss_display_status)(
                &mut display_minor,
                minor,
                GSS_C_MECH_CODE,
                oid_ptr(mech.as_mut()),
                &mut message_context,
                buffer.as_mut_ptr(),
            )
        };
        if RawStatus::new(major, display_minor).is_error() {
            break;
        }
        messages.push(String::from_utf8_lossy(buffer.as_slice()).into_owned());
        if message_context == 0 || messages.len() >= MAX_MESSAGES {
            break;
        }
    }
    if messages.is_empty() {
        messages.push(format!("unknown mechanism error {minor:#x}"));
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use holocron_core::Supplementary;

    #[test]
    fn supplementary_bits_are_success() {
        let status = check(Supplementary::CONTINUE_NEEDED.bits() as u32, 0).unwrap();
        assert!(status.continue_needed());
        assert_eq!(check(0, 0).unwrap(), RawStatus::new(0, 0));
    }

    #[test]
    fn routine_errors_keep_the_minor_status() {
        let err = check(RawStatus::routine(RoutineError::NoCred).major, 0x96c7_3a8d).unwrap_err();
        assert_eq!(err.minor, 0x96c7_3a8d);
        assert_eq!(err.routine_error_code(), RoutineError::NoCred.code());
    }
}
