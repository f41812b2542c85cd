// Jitter source for chunk sizes and inter-chunk pauses
//
// Draws from the operating system CSPRNG: the values shape traffic seen by
// a hostile observer, so they must not be predictable.

use rand::rngs::OsRng;
use rand::Rng;
use std::time::Duration;

/// Uniform integer in `[low, high)`.
///
/// Returns `low` when the range is empty (`low >= high`). The upper bound is
/// therefore only ever produced when it equals the lower bound.
pub fn uniform(low: u64, high: u64) -> u64 {
    if low >= high {
        return low;
    }
    OsRng.gen_range(low..high)
}

/// Chunk length drawn from `[min, max)`, clamped to `remaining`.
pub fn chunk_len(min: u64, max: u64, remaining: usize) -> usize {
    let drawn = usize::try_from(uniform(min, max)).unwrap_or(usize::MAX);
    drawn.min(remaining)
}

/// Pause drawn from `[min_ms, max_ms)` milliseconds.
pub fn pause(min_ms: u64, max_ms: u64) -> Duration {
    Duration::from_millis(uniform(min_ms, max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_bounds_return_low() {
        assert_eq!(uniform(7, 7), 7);
        assert_eq!(uniform(0, 0), 0);
    }

    #[test]
    fn test_upper_bound_never_reached() {
        for _ in 0..1000 {
            let v = uniform(1, 3);
            assert!(v == 1 || v == 2, "value {} outside [1, 3)", v);
        }
    }

    #[test]
    fn test_unit_range_is_constant() {
        for _ in 0..100 {
            assert_eq!(uniform(4, 5), 4);
        }
    }

    #[test]
    fn test_wide_range_varies() {
        let values: Vec<u64> = (0..50).map(|_| uniform(0, u64::MAX)).collect();
        let first = values[0];
        // 50 equal draws from a 64-bit range is practically impossible
        assert!(values.iter().any(|&v| v != first));
    }

    #[test]
    fn test_chunk_len_clamped() {
        assert_eq!(chunk_len(10, 10, 3), 3);
        assert_eq!(chunk_len(2, 2, 100), 2);
        assert_eq!(chunk_len(u64::MAX, u64::MAX, 9), 9);
    }

    #[test]
    fn test_pause_bounds() {
        assert_eq!(pause(0, 0), Duration::ZERO);
        for _ in 0..100 {
            let d = pause(10, 20);
            assert!(d >= Duration::from_millis(10) && d < Duration::from_millis(20));
        }
    }
}
