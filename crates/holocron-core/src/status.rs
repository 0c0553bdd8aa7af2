//! RFC 2744 major status layout and its decomposition into [`Error`].
//!
//! A major status packs three fields: the calling error in bits 24..32, the routine error in bits
//! 16..24, and supplementary information bits in the low half word. The minor status is owned by
//! the mechanism and only the engine can turn it into text.

use std::fmt;

use crate::error::Error;

pub const GSS_S_COMPLETE: u32 = 0;

const CALLING_ERROR_OFFSET: u32 = 24;
const ROUTINE_ERROR_OFFSET: u32 = 16;
pub const CALLING_ERROR_MASK: u32 = 0xff << CALLING_ERROR_OFFSET;
pub const ROUTINE_ERROR_MASK: u32 = 0xff << ROUTINE_ERROR_OFFSET;
pub const SUPPLEMENTARY_MASK: u32 = 0xffff;

/// Status words exactly as a GSSAPI call returned them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawStatus {
    pub major: u32,
    pub minor: u32,
}

impl RawStatus {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
    pub const fn routine(code: RoutineError) -> Self {
        Self {
            major: (code.code() as u32) << ROUTINE_ERROR_OFFSET,
            minor: 0,
        }
    }
    pub const fn calling(calling: CallingError, routine: RoutineError) -> Self {
        Self {
            major: ((calling.code() as u32) << CALLING_ERROR_OFFSET) | ((routine.code() as u32) << ROUTINE_ERROR_OFFSET),
            minor: 0,
        }
    }
    pub const fn with_minor(self, minor: u32) -> Self {
        Self { minor, ..self }
    }
    pub fn calling_error_code(self) -> u8 {
        ((self.major & CALLING_ERROR_MASK) >> CALLING_ERROR_OFFSET) as u8
    }
    pub fn routine_error_code(self) -> u8 {
        ((self.major & ROUTINE_ERROR_MASK) >> ROUTINE_ERROR_OFFSET) as u8
    }
    pub fn supplementary(self) -> Supplementary {
        Supplementary((self.major & SUPPLEMENTARY_MASK) as u16)
    }
    /// `GSS_ERROR()`: either a calling or a routine error is present.
    pub fn is_error(self) -> bool {
        self.major & (CALLING_ERROR_MASK | ROUTINE_ERROR_MASK) != 0
    }
    pub fn continue_needed(self) -> bool {
        self.supplementary().contains(Supplementary::CONTINUE_NEEDED)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RoutineError {
    BadMech,
    BadName,
    BadNameType,
    BadBindings,
    BadStatus,
    BadMic,
    NoCred,
    NoContext,
    DefectiveToken,
    DefectiveCredential,
    CredentialsExpired,
    ContextExpired,
    Failure,
    BadQop,
    Unauthorized,
    Unavailable,
    DuplicateElement,
    NameNotMn,
    BadMechAttr,
    Other(u8),
}

impl RoutineError {
    pub const fn code(self) -> u8 {
        match self {
            RoutineError::BadMech => 1,
            RoutineError::BadName => 2,
            RoutineError::BadNameType => 3,
            RoutineError::BadBindings => 4,
            RoutineError::BadStatus => 5,
            RoutineError::BadMic => 6,
            RoutineError::NoCred => 7,
            RoutineError::NoContext => 8,
            RoutineError::DefectiveToken => 9,
            RoutineError::DefectiveCredential => 10,
            RoutineError::CredentialsExpired => 11,
            RoutineError::ContextExpired => 12,
            RoutineError::Failure => 13,
            RoutineError::BadQop => 14,
            RoutineError::Unauthorized => 15,
            RoutineError::Unavailable => 16,
            RoutineError::DuplicateElement => 17,
            RoutineError::NameNotMn => 18,
            RoutineError::BadMechAttr => 19,
            RoutineError::Other(code) => code,
        }
    }
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => RoutineError::BadMech,
            2 => RoutineError::BadName,
            3 => RoutineError::BadNameType,
            4 => RoutineError::BadBindings,
            5 => RoutineError::BadStatus,
            6 => RoutineError::BadMic,
            7 => RoutineError::NoCred,
            8 => RoutineError::NoContext,
            9 => RoutineError::DefectiveToken,
            10 => RoutineError::DefectiveCredential,
            11 => RoutineError::CredentialsExpired,
            12 => RoutineError::ContextExpired,
            13 => RoutineError::Failure,
            14 => RoutineError::BadQop,
            15 => RoutineError::Unauthorized,
            16 => RoutineError::Unavailable,
            17 => RoutineError::DuplicateElement,
            18 => RoutineError::NameNotMn,
            19 => RoutineError::BadMechAttr,
            other => RoutineError::Other(other),
        }
    }
    fn description(self) -> &'static str {
        match self {
            RoutineError::BadMech => "an unsupported mechanism was requested",
            RoutineError::BadName => "an invalid name was supplied",
            RoutineError::BadNameType => "a supplied name was of an unsupported type",
            RoutineError::BadBindings => "incorrect channel bindings were supplied",
            RoutineError::BadStatus => "an invalid status code was supplied",
            RoutineError::BadMic => "a token had an invalid message integrity check",
            RoutineError::NoCred => "no credentials were supplied, or the credentials were unavailable",
            RoutineError::NoContext => "no context has been established",
            RoutineError::DefectiveToken => "an invalid token was supplied",
            RoutineError::DefectiveCredential => "an invalid credential was supplied",
            RoutineError::CredentialsExpired => "the referenced credential has expired",
            RoutineError::ContextExpired => "the referenced context has expired",
            RoutineError::Failure => "unspecified GSSAPI failure",
            RoutineError::BadQop => "the requested quality of protection could not be provided",
            RoutineError::Unauthorized => "the operation is forbidden by local security policy",
            RoutineError::Unavailable => "the operation or option is not available",
            RoutineError::DuplicateElement => "the requested credential element already exists",
            RoutineError::NameNotMn => "the provided name was not a mechanism name",
            RoutineError::BadMechAttr => "an unsupported mechanism attribute was requested",
            RoutineError::Other(_) => "unknown routine error",
        }
    }
}

impl fmt::Display for RoutineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutineError::Other(code) => write!(f, "unknown routine error {code}"),
            known => f.write_str(known.description()),
        }
    }
}

/// The caller handed the engine an unusable parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallingError {
    InaccessibleRead,
    InaccessibleWrite,
    BadStructure,
    Other(u8),
}

impl CallingError {
    pub const fn code(self) -> u8 {
        match self {
            CallingError::InaccessibleRead => 1,
            CallingError::InaccessibleWrite => 2,
            CallingError::BadStructure => 3,
            CallingError::Other(code) => code,
        }
    }
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => CallingError::InaccessibleRead,
            2 => CallingError::InaccessibleWrite,
            3 => CallingError::BadStructure,
            other => CallingError::Other(other),
        }
    }
}

impl fmt::Display for CallingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallingError::InaccessibleRead => f.write_str("a required input parameter could not be read"),
            CallingError::InaccessibleWrite => f.write_str("a required output parameter could not be written"),
            CallingError::BadStructure => f.write_str("a parameter was malformed"),
            CallingError::Other(code) => write!(f, "unknown calling error {code}"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Supplementary(u16);

impl Supplementary {
    pub const CONTINUE_NEEDED: Supplementary = Supplementary(1);
    pub const DUPLICATE_TOKEN: Supplementary = Supplementary(2);
    pub const OLD_TOKEN: Supplementary = Supplementary(4);
    pub const UNSEQ_TOKEN: Supplementary = Supplementary(8);
    pub const GAP_TOKEN: Supplementary = Supplementary(16);

    const NAMES: [(Supplementary, &'static str); 5] = [
        (Supplementary::CONTINUE_NEEDED, "continuation needed"),
        (Supplementary::DUPLICATE_TOKEN, "duplicate token"),
        (Supplementary::OLD_TOKEN, "old token"),
        (Supplementary::UNSEQ_TOKEN, "out-of-sequence token"),
        (Supplementary::GAP_TOKEN, "gap in token sequence"),
    ];

    pub const fn bits(self) -> u16 {
        self.0
    }
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
    pub const fn contains(self, other: Supplementary) -> bool {
        self.0 & other.0 == other.0
    }
}

impl fmt::Display for Supplementary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (bit, name) in Self::NAMES {
            if self.contains(bit) {
                if !first {
                    f.write_str(", ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        let unknown = self.0 & !0x1f;
        if unknown != 0 {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "unknown supplementary bits {unknown:#06x}")?;
        }
        Ok(())
    }
}

/// Supplementary bits plus whatever the mechanism said about its minor code.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InfoStatus {
    pub supplementary: Supplementary,
    pub mech_errors: Vec<String>,
}

impl fmt::Display for InfoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.supplementary.is_empty(), self.mech_errors.is_empty()) {
            (true, true) => f.write_str("no supplementary information"),
            (false, true) => write!(f, "{}", self.supplementary),
            (true, false) => f.write_str(&self.mech_errors.join("; ")),
            (false, false) => write!(f, "{} ({})", self.mech_errors.join("; "), self.supplementary),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FatalStatus {
    /// Absent when only a calling error was reported.
    pub routine: Option<RoutineError>,
    pub info: InfoStatus,
}

impl FatalStatus {
    pub fn new(routine: RoutineError) -> Self {
        Self {
            routine: Some(routine),
            info: InfoStatus::default(),
        }
    }
}

impl fmt::Display for FatalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.routine {
            Some(routine) => write!(f, "{routine}")?,
            None => f.write_str("GSSAPI call failed")?,
        }
        if !self.info.mech_errors.is_empty() {
            write!(f, ": {}", self.info.mech_errors.join("; "))?;
        }
        if !self.info.supplementary.is_empty() {
            write!(f, " ({})", self.info.supplementary)?;
        }
        Ok(())
    }
}

/// Decodes a status pair. Returns `None` for `GSS_S_COMPLETE`.
///
/// `mech_messages` is only called for a non-zero minor status.
pub fn decode(status: RawStatus, mech_messages: impl FnOnce(u32) -> Vec<String>) -> Option<Error> {
    if status.major == GSS_S_COMPLETE {
        return None;
    }
    let info = InfoStatus {
        supplementary: status.supplementary(),
        mech_errors: if status.minor != 0 {
            mech_messages(status.minor)
        } else {
            Vec::new()
        },
    };
    let routine = status.routine_error_code();
    let calling = status.calling_error_code();
    if routine == 0 && calling == 0 {
        return Some(Error::Info(info));
    }
    let fatal = FatalStatus {
        routine: (routine != 0).then(|| RoutineError::from_code(routine)),
        info,
    };
    if calling == 0 {
        Some(Error::Fatal(fatal))
    } else {
        Some(Error::Calling {
            calling: CallingError::from_code(calling),
            status: fatal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_messages(_: u32) -> Vec<String> {
        panic!("minor status should not have been resolved")
    }

    #[test]
    fn complete_is_not_an_error() {
        assert_eq!(decode(RawStatus::new(0, 0), no_messages), None);
        assert_eq!(decode(RawStatus::new(0, 12345), no_messages), None);
    }

    #[test]
    fn supplementary_only_is_informational() {
        let status = RawStatus::new(Supplementary::DUPLICATE_TOKEN.bits() as u32, 0);
        let Some(Error::Info(info)) = decode(status, no_messages) else {
            panic!("expected informational status");
        };
        assert!(info.supplementary.contains(Supplementary::DUPLICATE_TOKEN));
        assert!(!info.supplementary.contains(Supplementary::CONTINUE_NEEDED));
        assert_eq!(info.to_string(), "duplicate token");
    }

    #[test]
    fn routine_error_is_fatal_with_mech_strings() {
        let status = RawStatus::routine(RoutineError::NoCred).with_minor(0x96c7_3a8d);
        let err = decode(status, |minor| {
            assert_eq!(minor, 0x96c7_3a8d);
            vec!["No Kerberos credentials available".to_owned()]
        })
        .unwrap();
        assert_eq!(err.routine(), Some(RoutineError::NoCred));
        assert_eq!(err.calling(), None);
        assert!(matches!(err, Error::Fatal(_)));
        assert_eq!(
            err.to_string(),
            "no credentials were supplied, or the credentials were unavailable: No Kerberos credentials available"
        );
    }

    #[test]
    fn calling_error_keeps_routine_part() {
        let status = RawStatus::calling(CallingError::InaccessibleRead, RoutineError::BadName);
        let err = decode(status, no_messages).unwrap();
        assert_eq!(err.calling(), Some(CallingError::InaccessibleRead));
        assert_eq!(err.routine(), Some(RoutineError::BadName));
    }

    #[test]
    fn calling_error_without_routine_part() {
        let err = decode(RawStatus::new(3 << 24, 0), no_messages).unwrap();
        assert_eq!(err.calling(), Some(CallingError::BadStructure));
        assert_eq!(err.routine(), None);
    }

    #[test]
    fn field_layout() {
        let status = RawStatus::new(0x0102_0009, 0);
        assert_eq!(status.calling_error_code(), 1);
        assert_eq!(status.routine_error_code(), 2);
        assert!(status.supplementary().contains(Supplementary::CONTINUE_NEEDED));
        assert!(status.supplementary().contains(Supplementary::UNSEQ_TOKEN));
        assert!(status.is_error());
        assert!(!RawStatus::new(1, 0).is_error());
        assert!(RawStatus::new(1, 0).continue_needed());
    }

    #[test]
    fn unknown_codes_are_preserved() {
        assert_eq!(RoutineError::from_code(42), RoutineError::Other(42));
        assert_eq!(RoutineError::from_code(42).code(), 42);
        for code in 1..=19 {
            assert_eq!(RoutineError::from_code(code).code(), code);
        }
    }
}
