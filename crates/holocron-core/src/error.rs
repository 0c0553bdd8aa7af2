use crate::{
    cred::CredUsage,
    oid::OidError,
    status::{CallingError, FatalStatus, InfoStatus, RoutineError, Supplementary},
};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Info(InfoStatus),
    #[error("{0}")]
    Fatal(FatalStatus),
    #[error("{calling}: {status}")]
    Calling { calling: CallingError, status: FatalStatus },
    #[error("no {usage} identity material available: {status}")]
    NoIdentity { usage: CredUsage, status: FatalStatus },
    #[error("message of {0} bytes does not fit the 32-bit GSSAPI length field")]
    TooLarge(usize),
    #[error(transparent)]
    Oid(#[from] OidError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// An error detected without asking the engine, reported in the engine's own taxonomy.
    pub(crate) fn local(routine: RoutineError, message: impl Into<String>) -> Self {
        Error::Fatal(FatalStatus {
            routine: Some(routine),
            info: InfoStatus {
                supplementary: Supplementary::default(),
                mech_errors: vec![message.into()],
            },
        })
    }
    pub(crate) fn unavailable(what: &str) -> Self {
        Self::local(RoutineError::Unavailable, format!("{what} is not supported by this GSSAPI library"))
    }
    pub fn routine(&self) -> Option<RoutineError> {
        self.fatal_status().and_then(|status| status.routine)
    }
    pub fn calling(&self) -> Option<CallingError> {
        match self {
            Error::Calling { calling, .. } => Some(*calling),
            _ => None,
        }
    }
    pub fn is(&self, routine: RoutineError) -> bool {
        self.routine() == Some(routine)
    }
    pub fn fatal_status(&self) -> Option<&FatalStatus> {
        match self {
            Error::Fatal(status) | Error::Calling { status, .. } | Error::NoIdentity { status, .. } => Some(status),
            _ => None,
        }
    }
    pub fn info(&self) -> Option<&InfoStatus> {
        match self {
            Error::Info(info) => Some(info),
            other => other.fatal_status().map(|status| &status.info),
        }
    }
    pub fn mech_errors(&self) -> &[String] {
        self.info().map(|info| info.mech_errors.as_slice()).unwrap_or_default()
    }
}
