//! Status flag sets threaded through statement execution.
//!
//! Every executed statement returns a [`StmtFlags`] set; the executor
//! composes them by bitwise-or up the control stack and never uses panics
//! or unwinding for abort/suspend/return, because those must stay
//! observable at step granularity.

use bitflags::bitflags;

bitflags! {
    /// Result flags of a single statement or built-in function call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StmtFlags: u8 {
        /// Stop the current handler execution (error, or `exit()` at
        /// handler level).
        const ABORT = 1;
        /// Execution was suspended, either by `wait()` or by the
        /// instruction budgets.
        const SUSPEND = 1 << 1;
        /// A runtime error occurred.
        const ERROR = 1 << 2;
        /// Unwind to the innermost subroutine (user function or handler).
        const RETURN = 1 << 3;
    }
}

impl StmtFlags {
    /// Statement executed successfully, no signal raised.
    pub const SUCCESS: StmtFlags = StmtFlags::empty();
}

bitflags! {
    /// Overall execution status of one script execution instance.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExecStatus: u8 {
        /// The VM is currently executing the script.
        const RUNNING = 1;
        /// Execution is suspended and can be resumed later.
        const SUSPENDED = 1 << 1;
        /// A runtime error terminated the execution.
        const ERROR = 1 << 2;
    }
}

impl ExecStatus {
    /// Script is currently not executed by the VM.
    pub const NOT_RUNNING: ExecStatus = ExecStatus::empty();
}
