//! Fragment specification parsing
//!
//! Turns the three textual options (`packets`, `length`, `interval`) into a
//! validated [`FragmentSpec`]. Ranges are written as `N` or `A-B`; reversed
//! ranges are swapped.

use std::fmt;
use thiserror::Error;

/// Errors produced while parsing fragment options.
///
/// Every variant that rejects a bound carries the offending text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("invalid PacketsFrom: {0:?}")]
    InvalidPacketsFrom(String),
    #[error("invalid PacketsTo: {0:?}")]
    InvalidPacketsTo(String),
    #[error("PacketsFrom can't be 0")]
    PacketsFromZero,
    #[error("length can't be empty")]
    LengthEmpty,
    #[error("invalid LengthMin: {0:?}")]
    InvalidLengthMin(String),
    #[error("invalid LengthMax: {0:?}")]
    InvalidLengthMax(String),
    #[error("LengthMin can't be 0")]
    LengthMinZero,
    #[error("interval can't be empty")]
    IntervalEmpty,
    #[error("invalid IntervalMin: {0:?}")]
    InvalidIntervalMin(String),
    #[error("invalid IntervalMax: {0:?}")]
    InvalidIntervalMax(String),
}

/// Which write calls of a connection are fragmented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packets {
    /// Only the first write, and only at the TLS record level
    TlsHello,
    /// Every write
    All,
    /// Writes whose 1-based sequence number lies in `from..=to`
    Range { from: u64, to: u64 },
}

impl Packets {
    /// Lower bound in the numeric `(from, to)` encoding
    pub fn from(&self) -> u64 {
        match self {
            Packets::TlsHello | Packets::All => 0,
            Packets::Range { from, .. } => *from,
        }
    }

    /// Upper bound in the numeric `(from, to)` encoding
    pub fn to(&self) -> u64 {
        match self {
            Packets::TlsHello => 1,
            Packets::All => 0,
            Packets::Range { to, .. } => *to,
        }
    }

    /// Whether write number `seq` is subject to generic segmentation.
    ///
    /// Always false in TLS-hello mode, which has its own matching rule.
    pub fn segments(&self, seq: u64) -> bool {
        match self {
            Packets::TlsHello => false,
            Packets::All => true,
            Packets::Range { from, to } => (*from..=*to).contains(&seq),
        }
    }
}

impl fmt::Display for Packets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Packets::TlsHello => write!(f, "tlshello"),
            Packets::All => write!(f, "all"),
            Packets::Range { from, to } if from == to => write!(f, "{}", from),
            Packets::Range { from, to } => write!(f, "{}-{}", from, to),
        }
    }
}

/// Parsed, immutable fragmentation parameters shared by every writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentSpec {
    packets: Packets,
    length_min: u64,
    length_max: u64,
    interval_min: u64,
    interval_max: u64,
}

impl FragmentSpec {
    /// Parse the three option strings into a spec.
    ///
    /// # Errors
    ///
    /// Returns the first [`SpecError`] found, checking `packets`, then
    /// `length`, then `interval`.
    pub fn parse(packets: &str, length: &str, interval: &str) -> Result<Self, SpecError> {
        let packets = parse_packets(packets)?;

        let length = length.trim();
        if length.is_empty() {
            return Err(SpecError::LengthEmpty);
        }
        let (length_min, length_max) =
            parse_range(length, SpecError::InvalidLengthMin, SpecError::InvalidLengthMax)?;
        if length_min == 0 {
            return Err(SpecError::LengthMinZero);
        }

        let interval = interval.trim();
        if interval.is_empty() {
            return Err(SpecError::IntervalEmpty);
        }
        let (interval_min, interval_max) = parse_range(
            interval,
            SpecError::InvalidIntervalMin,
            SpecError::InvalidIntervalMax,
        )?;

        Ok(Self {
            packets,
            length_min,
            length_max,
            interval_min,
            interval_max,
        })
    }

    pub fn packets(&self) -> Packets {
        self.packets
    }

    pub fn packets_from(&self) -> u64 {
        self.packets.from()
    }

    pub fn packets_to(&self) -> u64 {
        self.packets.to()
    }

    pub fn length_min(&self) -> u64 {
        self.length_min
    }

    pub fn length_max(&self) -> u64 {
        self.length_max
    }

    /// Minimum pause after a chunk, in milliseconds
    pub fn interval_min(&self) -> u64 {
        self.interval_min
    }

    /// Maximum pause after a chunk, in milliseconds
    pub fn interval_max(&self) -> u64 {
        self.interval_max
    }
}

impl fmt::Display for FragmentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "packets={} length={}-{} interval={}-{}ms",
            self.packets, self.length_min, self.length_max, self.interval_min, self.interval_max
        )
    }
}

fn parse_packets(packets: &str) -> Result<Packets, SpecError> {
    let packets = packets.trim();
    if packets.is_empty() {
        return Ok(Packets::All);
    }
    if packets.eq_ignore_ascii_case("tlshello") {
        return Ok(Packets::TlsHello);
    }

    let (from, to) = parse_range(
        packets,
        SpecError::InvalidPacketsFrom,
        SpecError::InvalidPacketsTo,
    )?;
    if from == 0 {
        return Err(SpecError::PacketsFromZero);
    }
    Ok(Packets::Range { from, to })
}

/// Parse `N` or `A-B` into an ordered `(min, max)` pair.
fn parse_range(
    text: &str,
    invalid_low: fn(String) -> SpecError,
    invalid_high: fn(String) -> SpecError,
) -> Result<(u64, u64), SpecError> {
    let (low, high) = match text.split_once('-') {
        Some((low, high)) => {
            let low = parse_bound(low).ok_or_else(|| invalid_low(low.to_string()))?;
            let high = parse_bound(high).ok_or_else(|| invalid_high(high.to_string()))?;
            (low, high)
        }
        None => {
            let value = parse_bound(text).ok_or_else(|| invalid_low(text.to_string()))?;
            (value, value)
        }
    };
    Ok((low.min(high), low.max(high)))
}

/// Plain decimal digits only; `u64::from_str` alone would also accept `+5`.
fn parse_bound(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn spec(packets: &str, length: &str, interval: &str) -> FragmentSpec {
        FragmentSpec::parse(packets, length, interval).unwrap()
    }

    #[test]
    fn test_empty_packets_is_all_mode() {
        let s = spec("", "10", "5");
        assert_eq!(s.packets(), Packets::All);
        assert_eq!((s.packets_from(), s.packets_to()), (0, 0));
    }

    #[test]
    fn test_tlshello_any_case() {
        for token in ["tlshello", "TLSHello", "TLSHELLO", "tlsHELLO"] {
            let s = spec(token, "1-3", "0");
            assert_eq!(s.packets(), Packets::TlsHello);
            assert_eq!((s.packets_from(), s.packets_to()), (0, 1));
        }
    }

    #[test]
    fn test_single_packet_number() {
        let s = spec("3", "10", "0");
        assert_eq!(s.packets(), Packets::Range { from: 3, to: 3 });
        assert_eq!((s.packets_from(), s.packets_to()), (3, 3));
    }

    #[test]
    fn test_packets_zero_rejected() {
        assert_eq!(
            FragmentSpec::parse("0", "10", "0"),
            Err(SpecError::PacketsFromZero)
        );
        assert_eq!(
            FragmentSpec::parse("5-0", "10", "0"),
            Err(SpecError::PacketsFromZero)
        );
    }

    #[test]
    fn test_invalid_packets_bounds() {
        assert!(matches!(
            FragmentSpec::parse("x-3", "10", "0"),
            Err(SpecError::InvalidPacketsFrom(_))
        ));
        assert!(matches!(
            FragmentSpec::parse("1-y", "10", "0"),
            Err(SpecError::InvalidPacketsTo(_))
        ));
        assert!(matches!(
            FragmentSpec::parse("1-2-3", "10", "0"),
            Err(SpecError::InvalidPacketsTo(_))
        ));
        assert!(matches!(
            FragmentSpec::parse("+4", "10", "0"),
            Err(SpecError::InvalidPacketsFrom(_))
        ));
    }

    #[test]
    fn test_length_required() {
        assert_eq!(FragmentSpec::parse("", "", "0"), Err(SpecError::LengthEmpty));
        assert_eq!(FragmentSpec::parse("", "   ", "0"), Err(SpecError::LengthEmpty));
    }

    #[test]
    fn test_length_min_zero_rejected() {
        assert_eq!(FragmentSpec::parse("", "0", "0"), Err(SpecError::LengthMinZero));
        assert_eq!(FragmentSpec::parse("", "8-0", "0"), Err(SpecError::LengthMinZero));
    }

    #[test]
    fn test_invalid_length_bounds() {
        assert!(matches!(
            FragmentSpec::parse("", "a", "0"),
            Err(SpecError::InvalidLengthMin(_))
        ));
        assert!(matches!(
            FragmentSpec::parse("", "1-", "0"),
            Err(SpecError::InvalidLengthMax(_))
        ));
    }

    #[test]
    fn test_interval_required() {
        assert_eq!(FragmentSpec::parse("", "10", ""), Err(SpecError::IntervalEmpty));
    }

    #[test]
    fn test_zero_interval_allowed() {
        let s = spec("", "10", "0");
        assert_eq!((s.interval_min(), s.interval_max()), (0, 0));
    }

    #[test]
    fn test_invalid_interval_bounds() {
        assert!(matches!(
            FragmentSpec::parse("", "10", "-5"),
            Err(SpecError::InvalidIntervalMin(_))
        ));
        assert!(matches!(
            FragmentSpec::parse("", "10", "5-ms"),
            Err(SpecError::InvalidIntervalMax(_))
        ));
    }

    #[test]
    fn test_packets_error_reported_first() {
        assert!(matches!(
            FragmentSpec::parse("abc", "", ""),
            Err(SpecError::InvalidPacketsFrom(_))
        ));
    }

    #[test]
    fn test_range_segments() {
        let packets = Packets::Range { from: 2, to: 3 };
        assert!(!packets.segments(1));
        assert!(packets.segments(2));
        assert!(packets.segments(3));
        assert!(!packets.segments(4));
        assert!(Packets::All.segments(1000));
        assert!(!Packets::TlsHello.segments(1));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            spec("tlshello", "100-200", "10-20").to_string(),
            "packets=tlshello length=100-200 interval=10-20ms"
        );
        assert_eq!(spec("4", "1", "0").packets().to_string(), "4");
    }

    proptest! {
        #[test]
        fn prop_reversed_ranges_are_swapped(a in 1u64..1_000_000, b in 1u64..1_000_000) {
            prop_assume!(a > b);
            let text = format!("{}-{}", a, b);
            let s = FragmentSpec::parse(&text, &text, &text).unwrap();
            prop_assert_eq!((s.packets_from(), s.packets_to()), (b, a));
            prop_assert_eq!((s.length_min(), s.length_max()), (b, a));
            prop_assert_eq!((s.interval_min(), s.interval_max()), (b, a));
        }

        #[test]
        fn prop_parse_is_idempotent(a in 1u64..10_000, b in 1u64..10_000, c in 0u64..10_000) {
            let length = format!("{}-{}", a, b);
            let interval = c.to_string();
            let first = FragmentSpec::parse("", &length, &interval);
            let second = FragmentSpec::parse("", &length, &interval);
            prop_assert_eq!(first, second);
        }
    }
}
