//! Named negative outcomes that [`crate::Adapter::exchange`] may return.

/// Working counter came back lower than the group expected.
pub const WKC_LOW: i32 = -10;
/// Fatal failure sending the cyclic frame.
pub const SEND_FAILED: i32 = -11;
/// Fatal failure receiving the cyclic frame.
pub const RECV_FAILED: i32 = -12;
/// Fatal failure caused by bad arguments to the exchange call.
pub const BAD_ARGS: i32 = -13;

/// Outcome classification for a raw `exchange()` return value, used by
/// the I/O loop's Phase E.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// `wkc >= 0` and matched the group's expected working counter.
    Healthy,
    /// `wkc >= 0` but below what the group expected, or the adapter
    /// reported [`WKC_LOW`] directly.
    WkcLow,
    /// One of [`SEND_FAILED`], [`RECV_FAILED`], [`BAD_ARGS`].
    Fatal,
    /// Any other negative value.
    Unknown,
}

/// Classify a raw `exchange()` return value given the group's expected
/// working counter and the adapter's last reported working counter.
pub fn classify(wkc: i32, last_wkc: i32, expected_wkc: i32) -> ExchangeOutcome {
    if wkc >= 0 {
        if last_wkc < expected_wkc {
            ExchangeOutcome::WkcLow
        } else {
            ExchangeOutcome::Healthy
        }
    } else {
        match wkc {
            WKC_LOW => ExchangeOutcome::WkcLow,
            SEND_FAILED | RECV_FAILED | BAD_ARGS => ExchangeOutcome::Fatal,
            _ => ExchangeOutcome::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_when_nonnegative_and_matching() {
        assert_eq!(classify(3, 3, 3), ExchangeOutcome::Healthy);
    }

    #[test]
    fn wkc_low_when_nonnegative_but_below_expected() {
        assert_eq!(classify(2, 2, 3), ExchangeOutcome::WkcLow);
    }

    #[test]
    fn wkc_low_sentinel() {
        assert_eq!(classify(WKC_LOW, 0, 3), ExchangeOutcome::WkcLow);
    }

    #[test]
    fn fatal_codes() {
        for code in [SEND_FAILED, RECV_FAILED, BAD_ARGS] {
            assert_eq!(classify(code, 0, 3), ExchangeOutcome::Fatal);
        }
    }

    #[test]
    fn unknown_negative() {
        assert_eq!(classify(-99, 0, 3), ExchangeOutcome::Unknown);
    }
}
