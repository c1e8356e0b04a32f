//! Small shared helpers.

use std::time::Duration;

/// Returns the current `CLOCK_MONOTONIC` time.
pub fn get_monotonic_time() -> Duration {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // Cannot fail for CLOCK_MONOTONIC with a valid timespec pointer.
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32)
}

/// Whether timestamp `a` lies before timestamp `b`.
///
/// Event timestamps are 32-bit milliseconds that wrap roughly every 49.7
/// days, compared the way the X server does: a difference of more than half
/// the range means the smaller value is actually the later one. Zero means
/// "no timestamp" and sorts before every real timestamp.
pub fn time_is_before(a: u32, b: u32) -> bool {
    if a == 0 {
        return true;
    }
    if b == 0 {
        return false;
    }
    (a < b && b - a < u32::MAX / 2) || (a > b && a - b > u32::MAX / 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_time_advances() {
        let a = get_monotonic_time();
        let b = get_monotonic_time();
        assert!(b >= a);
    }

    #[test]
    fn plain_timestamp_ordering() {
        assert!(time_is_before(100, 200));
        assert!(!time_is_before(200, 100));
        assert!(!time_is_before(100, 100));
    }

    #[test]
    fn wrapped_timestamp_ordering() {
        // A timestamp that wrapped around zero is later than one from just
        // before the wrap.
        assert!(time_is_before(u32::MAX - 5, 10));
        assert!(!time_is_before(10, u32::MAX - 5));
    }

    #[test]
    fn zero_sorts_first() {
        assert!(time_is_before(0, 1));
        assert!(!time_is_before(1, 0));
    }
}
