//! Fixed-layout process-data records exchanged with a slave every tick.
//!
//! `RxFrame` is written to a slave (receive-PDO, from the master's point
//! of view); `TxFrame` is read from a slave (transmit-PDO). Both layouts
//! are little-endian and unaligned; the byte counts this module is
//! pinned to are checked at compile time via `static_assertions`.

use bitflags::bitflags;
use static_assertions::const_assert_eq;

/// Byte width of the ASCII command keyword field in [`RxFrame`].
pub const COMMAND_LEN: usize = 32;

/// Total packed size of [`RxFrame`] on the wire.
pub const RX_FRAME_LEN: usize = COMMAND_LEN + 4 + 4 + 2 + 2 + 1;
const_assert_eq!(RX_FRAME_LEN, 45);

/// Total packed size of [`TxFrame`] on the wire.
pub const TX_FRAME_LEN: usize = 4 + 3 + 1;
const_assert_eq!(TX_FRAME_LEN, 8);

/// Known command keywords. `SendRaw` callers may send any keyword up to
/// [`COMMAND_LEN`] ASCII characters; these are the ones the public
/// operations in the orchestrator dispatch by name.
pub mod keyword {
    pub const DPOS: &str = "DPOS";
    pub const SCAN: &str = "SCAN";
    pub const INDX: &str = "INDX";
    pub const ENBL: &str = "ENBL";
    pub const RSET: &str = "RSET";
    pub const HALT: &str = "HALT";
    pub const STOP: &str = "STOP";
    pub const NOP: &str = "NOP";
}

/// Output record written to a slave (receive-PDO, master→slave).
///
/// `command` is always upper-cased and null-padded to [`COMMAND_LEN`]
/// bytes before it is packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxFrame {
    pub command: [u8; COMMAND_LEN],
    pub parameter: i32,
    pub velocity: i32,
    pub acceleration: u16,
    pub deceleration: u16,
    pub execute: u8,
}

impl Default for RxFrame {
    fn default() -> Self {
        Self::nop()
    }
}

impl RxFrame {
    /// An idle frame: `NOP` keyword, all numeric fields zeroed, not executing.
    pub fn nop() -> Self {
        Self {
            command: encode_command(keyword::NOP),
            parameter: 0,
            velocity: 0,
            acceleration: 0,
            deceleration: 0,
            execute: 0,
        }
    }

    /// Build a frame for `keyword` (upper-cased and truncated/padded to
    /// [`COMMAND_LEN`] bytes) with the given numeric fields.
    pub fn with_command(
        keyword: &str,
        parameter: i32,
        velocity: i32,
        acceleration: u16,
        deceleration: u16,
        execute: bool,
    ) -> Self {
        Self {
            command: encode_command(keyword),
            parameter,
            velocity,
            acceleration,
            deceleration,
            execute: execute as u8,
        }
    }

    /// The command keyword as a `&str`, trimmed of null padding.
    pub fn command_str(&self) -> &str {
        decode_command(&self.command)
    }

    /// Pack into the 45-byte little-endian wire representation.
    pub fn pack(&self) -> [u8; RX_FRAME_LEN] {
        let mut buf = [0u8; RX_FRAME_LEN];
        let mut off = 0;
        buf[off..off + COMMAND_LEN].copy_from_slice(&self.command);
        off += COMMAND_LEN;
        buf[off..off + 4].copy_from_slice(&self.parameter.to_le_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&self.velocity.to_le_bytes());
        off += 4;
        buf[off..off + 2].copy_from_slice(&self.acceleration.to_le_bytes());
        off += 2;
        buf[off..off + 2].copy_from_slice(&self.deceleration.to_le_bytes());
        off += 2;
        buf[off] = self.execute;
        buf
    }

    /// Unpack from the 45-byte little-endian wire representation.
    pub fn unpack(buf: &[u8; RX_FRAME_LEN]) -> Self {
        let mut command = [0u8; COMMAND_LEN];
        command.copy_from_slice(&buf[0..COMMAND_LEN]);
        let mut off = COMMAND_LEN;
        let parameter = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let velocity = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let acceleration = u16::from_le_bytes(buf[off..off + 2].try_into().unwrap());
        off += 2;
        let deceleration = u16::from_le_bytes(buf[off..off + 2].try_into().unwrap());
        off += 2;
        let execute = buf[off];
        Self {
            command,
            parameter,
            velocity,
            acceleration,
            deceleration,
            execute,
        }
    }
}

/// Upper-case `s`, truncate to [`COMMAND_LEN`] bytes, null-pad the rest.
pub fn encode_command(s: &str) -> [u8; COMMAND_LEN] {
    let mut out = [0u8; COMMAND_LEN];
    let upper = s.to_ascii_uppercase();
    let bytes = upper.as_bytes();
    let n = bytes.len().min(COMMAND_LEN);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

/// Decode a null-padded ASCII command field back to a `&str`.
pub fn decode_command(bytes: &[u8; COMMAND_LEN]) -> &str {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(COMMAND_LEN);
    std::str::from_utf8(&bytes[..end]).unwrap_or("")
}

bitflags! {
    /// The 22-bit drive status vector reported in every [`TxFrame`].
    ///
    /// Only the low 22 bits are wire-significant; bits 22 and 23 of the
    /// packed representation are reserved and always read as zero.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StatusFlags: u32 {
        const AMPLIFIERS_ENABLED          = 1 << 0;
        const END_STOP                    = 1 << 1;
        const THERMAL_PROTECTION_1        = 1 << 2;
        const THERMAL_PROTECTION_2        = 1 << 3;
        const FORCE_ZERO                  = 1 << 4;
        const MOTOR_ON                    = 1 << 5;
        const CLOSED_LOOP                 = 1 << 6;
        const ENCODER_AT_INDEX            = 1 << 7;
        const ENCODER_VALID               = 1 << 8;
        const SEARCHING_INDEX             = 1 << 9;
        const POSITION_REACHED            = 1 << 10;
        const ERROR_COMPENSATION          = 1 << 11;
        const ENCODER_ERROR               = 1 << 12;
        const SCANNING                    = 1 << 13;
        const LEFT_END_STOP               = 1 << 14;
        const RIGHT_END_STOP              = 1 << 15;
        const ERROR_LIMIT                 = 1 << 16;
        const SEARCHING_OPTIMAL_FREQUENCY = 1 << 17;
        const SAFETY_TIMEOUT              = 1 << 18;
        const EXECUTE_ACK                 = 1 << 19;
        const EMERGENCY_STOP              = 1 << 20;
        const POSITION_FAIL               = 1 << 21;
    }
}

const STATUS_MASK: u32 = (1 << 22) - 1;

/// Input record read from a slave (transmit-PDO, slave→master).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxFrame {
    pub actual_position: i32,
    pub status: StatusFlags,
    pub slot: u8,
}

impl TxFrame {
    /// Pack into the 8-byte little-endian wire representation.
    pub fn pack(&self) -> [u8; TX_FRAME_LEN] {
        let mut buf = [0u8; TX_FRAME_LEN];
        buf[0..4].copy_from_slice(&self.actual_position.to_le_bytes());
        let bits = self.status.bits() & STATUS_MASK;
        buf[4] = (bits & 0xFF) as u8;
        buf[5] = ((bits >> 8) & 0xFF) as u8;
        buf[6] = ((bits >> 16) & 0xFF) as u8;
        buf[7] = self.slot;
        buf
    }

    /// Unpack from the 8-byte little-endian wire representation.
    pub fn unpack(buf: &[u8; TX_FRAME_LEN]) -> Self {
        let actual_position = i32::from_le_bytes(buf[0..4].try_into().unwrap());
        let bits = (buf[4] as u32) | ((buf[5] as u32) << 8) | ((buf[6] as u32) << 16);
        Self {
            actual_position,
            status: StatusFlags::from_bits_truncate(bits & STATUS_MASK),
            slot: buf[7],
        }
    }

    /// Bitmask of status flags that differ between `self` and `other`.
    pub fn changed_bits(&self, other: &TxFrame) -> u32 {
        (self.status.bits() ^ other.status.bits()) & STATUS_MASK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rx_frame_len_is_45_bytes() {
        assert_eq!(RxFrame::nop().pack().len(), 45);
    }

    #[test]
    fn tx_frame_len_is_8_bytes() {
        assert_eq!(TxFrame::default().pack().len(), 8);
    }

    #[test]
    fn command_upper_cased_and_padded() {
        let frame = RxFrame::with_command("dpos", 100, 200, 10, 10, true);
        assert_eq!(frame.command_str(), "DPOS");
        assert_eq!(frame.command[4], 0);
        assert_eq!(frame.execute, 1);
    }

    #[test]
    fn rx_frame_roundtrip() {
        let frame = RxFrame::with_command(keyword::DPOS, -12345, 30_000, 1000, 1000, true);
        let packed = frame.pack();
        let unpacked = RxFrame::unpack(&packed);
        assert_eq!(frame, unpacked);
    }

    #[test]
    fn tx_frame_roundtrip() {
        let frame = TxFrame {
            actual_position: -99,
            status: StatusFlags::MOTOR_ON | StatusFlags::POSITION_FAIL,
            slot: 7,
        };
        let packed = frame.pack();
        let unpacked = TxFrame::unpack(&packed);
        assert_eq!(frame, unpacked);
    }

    #[test]
    fn tx_frame_reserved_bits_are_masked() {
        let mut frame = TxFrame::default();
        // Simulate garbage in reserved bits 22/23 by constructing raw bytes.
        let mut buf = frame.pack();
        buf[6] |= 0b1100_0000; // bits 22 and 23
        let unpacked = TxFrame::unpack(&buf);
        assert_eq!(unpacked.status.bits() & !STATUS_MASK, 0);
        frame.status = StatusFlags::empty();
        assert_eq!(frame.pack()[6] & 0b1100_0000, 0);
    }

    #[test]
    fn changed_bits_detects_single_flag_flip() {
        let a = TxFrame {
            status: StatusFlags::POSITION_REACHED,
            ..Default::default()
        };
        let b = TxFrame::default();
        assert_eq!(a.changed_bits(&b), StatusFlags::POSITION_REACHED.bits());
    }

    #[test]
    fn command_str_empty_is_empty() {
        let bytes = [0u8; COMMAND_LEN];
        assert_eq!(decode_command(&bytes), "");
    }

    #[test]
    fn long_keyword_is_truncated() {
        let long = "A".repeat(40);
        let encoded = encode_command(&long);
        assert_eq!(encoded.len(), COMMAND_LEN);
        assert_eq!(decode_command(&encoded).len(), COMMAND_LEN);
    }
}
