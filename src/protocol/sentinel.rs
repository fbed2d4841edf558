//! Section markers for the worker stream.
//!
//! Control events are signalled in place of a payload length: every marker
//! is a small negative `i32`, disjoint from any valid non-negative frame
//! length, so a reader can tell "N payload bytes follow" from "control
//! event M occurred" by sign and value alone.

/// End of one data section. More sections may follow, or the stream ends.
pub const END_OF_DATA_SECTION: i32 = -1;

/// The next envelope is a worker-side exception message.
pub const WORKER_EXCEPTION: i32 = -2;

/// A timing/instrumentation envelope follows (opaque, may be ignored).
pub const TIMING_DATA: i32 = -3;

/// End of stream: the worker has no more output; the session may be
/// released.
pub const END_OF_STREAM: i32 = -4;

/// Explicit null value marker.
pub const NULL_MARKER: i32 = -5;

/// Begin a columnar/streaming payload section.
pub const START_STREAM: i32 = -6;

/// A schema-only section follows.
pub const SCHEMA_SECTION: i32 = -7;

/// Check whether a frame marker is a reserved control value.
#[inline]
pub fn is_sentinel(value: i32) -> bool {
    (SCHEMA_SECTION..=END_OF_DATA_SECTION).contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_are_negative_and_distinct() {
        let all = [
            END_OF_DATA_SECTION,
            WORKER_EXCEPTION,
            TIMING_DATA,
            END_OF_STREAM,
            NULL_MARKER,
            START_STREAM,
            SCHEMA_SECTION,
        ];
        for (i, a) in all.iter().enumerate() {
            assert!(*a < 0, "sentinel {} must be negative", a);
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_is_sentinel_covers_reserved_range() {
        for value in SCHEMA_SECTION..=END_OF_DATA_SECTION {
            assert!(is_sentinel(value));
        }
        assert!(!is_sentinel(0));
        assert!(!is_sentinel(1));
        assert!(!is_sentinel(-8));
        assert!(!is_sentinel(i32::MAX));
    }

    #[test]
    fn test_sentinels_disjoint_from_lengths() {
        // Any valid payload length is non-negative and therefore never a
        // control value.
        assert!(!is_sentinel(0));
        assert!(!is_sentinel(65536));
    }
}
