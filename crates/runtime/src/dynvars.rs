//! Built-in dynamic variables.
//!
//! Dynamic variables invoke host code on every read. The two core timers
//! expose a wall-clock and a thread CPU clock in microseconds; scripts
//! measure durations by subtracting two reads.

use nksp_core::vmint;
use nkspc::builtins::DynIntVar;

/// `$NKSP_REAL_TIMER` (and its compatibility alias `$KSP_TIMER`): a
/// monotonic wall-clock in microseconds.
pub struct RealTimerVar;

impl DynIntVar for RealTimerVar {
    fn eval(&self) -> vmint {
        clock_us(ClockSource::Monotonic)
    }
}

/// `$NKSP_PERF_TIMER`: CPU time consumed by the calling thread, in
/// microseconds. Falls back to the wall clock on platforms without a
/// thread CPU clock.
pub struct PerfTimerVar;

impl DynIntVar for PerfTimerVar {
    fn eval(&self) -> vmint {
        clock_us(ClockSource::ThreadCpu)
    }
}

enum ClockSource {
    Monotonic,
    ThreadCpu,
}

#[cfg(unix)]
fn clock_us(source: ClockSource) -> vmint {
    let clock_id = match source {
        ClockSource::Monotonic => libc::CLOCK_MONOTONIC,
        ClockSource::ThreadCpu => libc::CLOCK_THREAD_CPUTIME_ID,
    };
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let rc = unsafe { libc::clock_gettime(clock_id, &mut ts) };
    if rc != 0 {
        return 0;
    }
    ts.tv_sec as vmint * 1_000_000 + ts.tv_nsec as vmint / 1_000
}

#[cfg(not(unix))]
fn clock_us(_source: ClockSource) -> vmint {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as vmint)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_timer_is_monotonic() {
        let timer = RealTimerVar;
        let a = timer.eval();
        let b = timer.eval();
        assert!(b >= a);
        assert!(a > 0);
    }

    #[test]
    fn test_timers_are_not_assignable() {
        assert!(!RealTimerVar.is_assignable());
        assert!(!PerfTimerVar.is_assignable());
    }
}
