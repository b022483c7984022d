//! The closed set of drive-side fault codes the classifier can produce.

use thiserror::Error;

/// Closed set of drive error codes.
///
/// `None` is not normally constructed by callers — the fault classifier
/// returns `Option<DriveErrorCode>` and uses the absence of a value to
/// mean "no fault", reserving this variant for places that need an
/// explicit "no error" sentinel (e.g. the fault-throttle table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum DriveErrorCode {
    #[error("no fault")]
    None,
    #[error("following error")]
    FollowError,
    #[error("position fail")]
    PositionFail,
    #[error("safety timeout")]
    SafetyTimeout,
    #[error("emergency stop")]
    EmergencyStop,
    #[error("encoder error")]
    EncoderError,
    #[error("thermal protection")]
    ThermalProtection,
    #[error("end stop hit")]
    EndStopHit,
    #[error("force zero")]
    ForceZero,
    #[error("error compensation fault")]
    ErrorCompensationFault,
    #[error("unknown fault")]
    UnknownFault,
}

impl DriveErrorCode {
    /// Static operator-facing recovery hint for codes the fault
    /// classifier can produce. Codes raised only from the
    /// pending-command timeout/AL-status paths get a generic hint.
    pub fn recovery_hint(self) -> &'static str {
        match self {
            Self::None => "",
            Self::ThermalProtection => "let drive cool; ENBL=1 or RSET",
            Self::EncoderError => "check encoder; RSET then INDX",
            Self::FollowError => "reduce speed/accel; ENBL=1",
            Self::SafetyTimeout => "RSET or ENBL=1; adjust TOU2",
            Self::EmergencyStop => "clear E-stop; ENBL=1 or RSET",
            Self::PositionFail => "relax PTOL/PTO2/TOU3; ENBL=1 or RSET",
            Self::EndStopHit => "jog away from the end stop",
            Self::ForceZero => "check force/zero reference",
            Self::ErrorCompensationFault => "check compensation table; RSET",
            Self::UnknownFault => "inspect drain_errors() output",
        }
    }
}
