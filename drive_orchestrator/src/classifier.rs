//! Pure fault classifier: maps a `TxFrame`'s status bits to the first
//! matching entry of a fixed priority table.

use drive_common::{DriveErrorCode, StatusFlags, TxFrame};

/// A decoded drive fault: the closed-set code plus its static recovery hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedFault {
    pub code: DriveErrorCode,
    pub hint: &'static str,
}

/// Priority-ordered classification table. Checked top to
/// bottom; the first matching entry wins. Two end-stop entries share a
/// code but carry direction-specific hints.
pub fn classify_fault(tx: &TxFrame) -> Option<ClassifiedFault> {
    let s = tx.status;

    let table: &[(StatusFlags, DriveErrorCode, &'static str)] = &[
        (
            StatusFlags::THERMAL_PROTECTION_1,
            DriveErrorCode::ThermalProtection,
            "let drive cool; ENBL=1 or RSET",
        ),
        (
            StatusFlags::THERMAL_PROTECTION_2,
            DriveErrorCode::ThermalProtection,
            "let drive cool; ENBL=1 or RSET",
        ),
        (
            StatusFlags::ENCODER_ERROR,
            DriveErrorCode::EncoderError,
            "check encoder; RSET then INDX",
        ),
        (
            StatusFlags::ERROR_LIMIT,
            DriveErrorCode::FollowError,
            "reduce speed/accel; ENBL=1",
        ),
        (
            StatusFlags::SAFETY_TIMEOUT,
            DriveErrorCode::SafetyTimeout,
            "RSET or ENBL=1; adjust TOU2",
        ),
        (
            StatusFlags::EMERGENCY_STOP,
            DriveErrorCode::EmergencyStop,
            "clear E-stop; ENBL=1 or RSET",
        ),
        (
            StatusFlags::POSITION_FAIL,
            DriveErrorCode::PositionFail,
            "relax PTOL/PTO2/TOU3; ENBL=1 or RSET",
        ),
    ];

    for (bit, code, hint) in table {
        if s.contains(*bit) {
            return Some(ClassifiedFault { code: *code, hint });
        }
    }

    if s.contains(StatusFlags::END_STOP) && s.contains(StatusFlags::LEFT_END_STOP) {
        return Some(ClassifiedFault {
            code: DriveErrorCode::EndStopHit,
            hint: "jog away from left",
        });
    }
    if s.contains(StatusFlags::END_STOP) && s.contains(StatusFlags::RIGHT_END_STOP) {
        return Some(ClassifiedFault {
            code: DriveErrorCode::EndStopHit,
            hint: "jog away from right",
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with(flags: StatusFlags) -> TxFrame {
        TxFrame {
            status: flags,
            ..Default::default()
        }
    }

    #[test]
    fn no_fault_on_clean_frame() {
        assert_eq!(classify_fault(&TxFrame::default()), None);
    }

    #[test]
    fn thermal_protection_1_has_top_priority() {
        let tx = with(StatusFlags::THERMAL_PROTECTION_1 | StatusFlags::POSITION_FAIL);
        assert_eq!(
            classify_fault(&tx).unwrap().code,
            DriveErrorCode::ThermalProtection
        );
    }

    #[test]
    fn thermal_protection_2_also_maps_to_thermal_protection() {
        let tx = with(StatusFlags::THERMAL_PROTECTION_2);
        assert_eq!(
            classify_fault(&tx).unwrap().code,
            DriveErrorCode::ThermalProtection
        );
    }

    #[test]
    fn encoder_error_outranks_error_limit() {
        let tx = with(StatusFlags::ENCODER_ERROR | StatusFlags::ERROR_LIMIT);
        assert_eq!(
            classify_fault(&tx).unwrap().code,
            DriveErrorCode::EncoderError
        );
    }

    #[test]
    fn error_limit_maps_to_follow_error() {
        let tx = with(StatusFlags::ERROR_LIMIT);
        assert_eq!(classify_fault(&tx).unwrap().code, DriveErrorCode::FollowError);
    }

    #[test]
    fn safety_timeout_outranks_emergency_stop() {
        let tx = with(StatusFlags::SAFETY_TIMEOUT | StatusFlags::EMERGENCY_STOP);
        assert_eq!(
            classify_fault(&tx).unwrap().code,
            DriveErrorCode::SafetyTimeout
        );
    }

    #[test]
    fn emergency_stop_outranks_position_fail() {
        let tx = with(StatusFlags::EMERGENCY_STOP | StatusFlags::POSITION_FAIL);
        assert_eq!(
            classify_fault(&tx).unwrap().code,
            DriveErrorCode::EmergencyStop
        );
    }

    #[test]
    fn position_fail_outranks_end_stop() {
        let tx = with(
            StatusFlags::POSITION_FAIL | StatusFlags::END_STOP | StatusFlags::LEFT_END_STOP,
        );
        assert_eq!(
            classify_fault(&tx).unwrap().code,
            DriveErrorCode::PositionFail
        );
    }

    #[test]
    fn end_stop_requires_a_direction_bit() {
        let tx = with(StatusFlags::END_STOP);
        assert_eq!(classify_fault(&tx), None);
    }

    #[test]
    fn left_end_stop_hint_mentions_left() {
        let tx = with(StatusFlags::END_STOP | StatusFlags::LEFT_END_STOP);
        let fault = classify_fault(&tx).unwrap();
        assert_eq!(fault.code, DriveErrorCode::EndStopHit);
        assert!(fault.hint.contains("left"));
    }

    #[test]
    fn right_end_stop_hint_mentions_right() {
        let tx = with(StatusFlags::END_STOP | StatusFlags::RIGHT_END_STOP);
        let fault = classify_fault(&tx).unwrap();
        assert_eq!(fault.code, DriveErrorCode::EndStopHit);
        assert!(fault.hint.contains("right"));
    }
}
