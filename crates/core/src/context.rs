//! Per-voice execution state.
//!
//! One [`ExecContext`] exists per voice; it owns the control stack, the
//! polyphonic memory pools and the suspension / exit bookkeeping of that
//! voice. All of it is allocated once when the context is created and
//! reused for every event; execution itself never allocates here.

use crate::flags::{ExecStatus, StmtFlags};
use crate::ids::StmtId;
use crate::units::{NO_FACTOR, UnitType};
use crate::{vmfloat, vmint};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::sync::atomic::{AtomicBool, Ordering};

/// One frame of the executor's control stack.
#[derive(Debug, Clone, Copy)]
pub struct StackFrame {
    pub stmt: StmtId,
    pub subindex: i32,
}

/// Value captured by `exit(<arg>)` when the exit-result feature is enabled.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitValue {
    Int {
        value: vmint,
        factor: vmfloat,
        unit: UnitType,
        is_final: bool,
    },
    Real {
        value: vmfloat,
        factor: vmfloat,
        unit: UnitType,
        is_final: bool,
    },
    Str(String),
}

/// Mutable state of one script execution instance (voice).
pub struct ExecContext {
    stack: Box<[StackFrame]>,
    frame_idx: i32,
    pub poly_ints: Box<[vmint]>,
    pub poly_reals: Box<[vmfloat]>,
    pub poly_factors: Box<[vmfloat]>,
    pub status: ExecStatus,
    pub flags: StmtFlags,
    pub suspend_microseconds: vmint,
    pub instructions_count: u64,
    pub exit_res: Option<ExitValue>,
    pub rng: SmallRng,
    abort: AtomicBool,
}

impl ExecContext {
    /// Allocate a context for a script requiring the given stack depth and
    /// polyphonic pool sizes.
    pub fn new(stack_size: usize, poly_ints: usize, poly_reals: usize, poly_factors: usize) -> Self {
        ExecContext {
            stack: vec![
                StackFrame {
                    stmt: StmtId(0),
                    subindex: -1,
                };
                stack_size.max(1)
            ]
            .into_boxed_slice(),
            frame_idx: -1,
            poly_ints: vec![0; poly_ints].into_boxed_slice(),
            poly_reals: vec![0.0; poly_reals].into_boxed_slice(),
            poly_factors: vec![NO_FACTOR; poly_factors].into_boxed_slice(),
            status: ExecStatus::NOT_RUNNING,
            flags: StmtFlags::SUCCESS,
            suspend_microseconds: 0,
            instructions_count: 0,
            exit_res: None,
            rng: SmallRng::from_entropy(),
            abort: AtomicBool::new(false),
        }
    }

    pub fn stack_capacity(&self) -> usize {
        self.stack.len()
    }

    /// Index of the current top frame, -1 when the stack is empty.
    pub fn frame_idx(&self) -> i32 {
        self.frame_idx
    }

    pub fn frame(&self, idx: i32) -> StackFrame {
        self.stack[idx as usize]
    }

    pub fn set_subindex(&mut self, idx: i32, subindex: i32) {
        self.stack[idx as usize].subindex = subindex;
    }

    /// Push a statement frame. Callers check against `stack_capacity()`;
    /// a push beyond capacity leaves the stack untouched and is caught by
    /// the executor as an internal error.
    pub fn push_frame(&mut self, stmt: StmtId) {
        self.frame_idx += 1;
        let idx = self.frame_idx as usize;
        if idx >= self.stack.len() {
            return;
        }
        self.stack[idx] = StackFrame { stmt, subindex: 0 };
    }

    pub fn pop_frame(&mut self) {
        if self.frame_idx >= 0 {
            self.frame_idx -= 1;
        }
    }

    /// Drop any saved frames and pending flags, e.g. after a completed or
    /// aborted execution. Polyphonic memory is left untouched.
    pub fn reset(&mut self) {
        self.frame_idx = -1;
        self.flags = StmtFlags::SUCCESS;
    }

    /// Zero the polyphonic pools, as done when a voice starts.
    pub fn reset_polyphonic_data(&mut self) {
        self.poly_ints.fill(0);
        self.poly_reals.fill(0.0);
        self.poly_factors.fill(NO_FACTOR);
    }

    /// Take over the polyphonic values of another context, used by the
    /// host to carry per-voice state from a `note` handler instance to its
    /// matching `release` handler instance.
    pub fn copy_polyphonic_data_from(&mut self, other: &ExecContext) {
        self.poly_ints.copy_from_slice(&other.poly_ints);
        self.poly_reals.copy_from_slice(&other.poly_reals);
        self.poly_factors.copy_from_slice(&other.poly_factors);
    }

    /// Clone this (suspended) execution instance into `child`, which will
    /// resume at the same position with its own copy of the polyphonic
    /// state. Used by hosts that fork voices.
    pub fn fork_to(&self, child: &mut ExecContext) {
        child.copy_polyphonic_data_from(self);
        child.stack.copy_from_slice(&self.stack);
        child.frame_idx = self.frame_idx;
        child.status = ExecStatus::SUSPENDED;
        child.flags = StmtFlags::SUCCESS;
        child.suspend_microseconds = 0;
        child.instructions_count = 0;
    }

    /// Scheduled suspension delta of the last `exec()` call, in
    /// microseconds. Only meaningful while `status` contains `SUSPENDED`.
    pub fn suspension_microseconds(&self) -> vmint {
        self.suspend_microseconds
    }

    /// Amount of VM instructions the last `exec()` call processed.
    pub fn instructions_count(&self) -> u64 {
        self.instructions_count
    }

    /// Value passed to `exit()` during the last execution, if any.
    pub fn exit_result(&self) -> Option<&ExitValue> {
        self.exit_res.as_ref()
    }

    /// Request termination of the running (or suspended) execution. May be
    /// called from any thread; the executor observes it at each step.
    pub fn signal_abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    /// Consume a pending abort request.
    pub fn take_abort(&self) -> bool {
        self.abort.swap(false, Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ExecContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecContext")
            .field("frame_idx", &self.frame_idx)
            .field("status", &self.status)
            .field("suspend_microseconds", &self.suspend_microseconds)
            .field("instructions_count", &self.instructions_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_push_pop() {
        let mut ctx = ExecContext::new(4, 0, 0, 0);
        assert_eq!(ctx.frame_idx(), -1);
        ctx.push_frame(StmtId(7));
        ctx.push_frame(StmtId(8));
        assert_eq!(ctx.frame_idx(), 1);
        assert_eq!(ctx.frame(1).stmt, StmtId(8));
        ctx.pop_frame();
        assert_eq!(ctx.frame_idx(), 0);
        ctx.reset();
        assert_eq!(ctx.frame_idx(), -1);
    }

    #[test]
    fn test_polyphonic_handoff() {
        let mut a = ExecContext::new(2, 2, 1, 3);
        a.poly_ints[0] = 11;
        a.poly_reals[0] = 2.5;
        a.poly_factors[2] = 1e-3;
        let mut b = ExecContext::new(2, 2, 1, 3);
        b.copy_polyphonic_data_from(&a);
        assert_eq!(b.poly_ints[0], 11);
        assert_eq!(b.poly_reals[0], 2.5);
        assert_eq!(b.poly_factors[2], 1e-3);
    }

    #[test]
    fn test_fork_resumes_suspended() {
        let mut a = ExecContext::new(3, 1, 0, 1);
        a.push_frame(StmtId(1));
        a.poly_ints[0] = 5;
        let mut b = ExecContext::new(3, 1, 0, 1);
        a.fork_to(&mut b);
        assert_eq!(b.frame_idx(), 0);
        assert_eq!(b.frame(0).stmt, StmtId(1));
        assert_eq!(b.status, ExecStatus::SUSPENDED);
        assert_eq!(b.poly_ints[0], 5);
    }

    #[test]
    fn test_abort_is_consumed_once() {
        let ctx = ExecContext::new(1, 0, 0, 0);
        assert!(!ctx.take_abort());
        ctx.signal_abort();
        assert!(ctx.take_abort());
        assert!(!ctx.take_abort());
    }
}
