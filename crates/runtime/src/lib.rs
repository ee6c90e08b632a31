//! Real-time VM of the NKSP script engine.
//!
//! Hosts embed this crate: load scripts through a [`ScriptVM`] (optionally
//! deduplicated via the [`ScriptCache`]), create one [`ExecContext`] per
//! voice, and drive handlers with [`ScriptVM::exec`] from the audio
//! thread. Execution is cooperative; suspension is surfaced as a
//! microsecond delta and real time is entirely the host's business.

pub mod cache;
pub mod dynvars;
pub mod functions;
pub mod vm;

pub use cache::{ConsumerId, ScriptCache, ScriptKey};
pub use nksp_core::{
    BufferSink, DiagnosticSink, ExecContext, ExecStatus, ExitValue, HandlerId, NullSink,
    TracingSink,
};
pub use nkspc::builtins::{DynIntVar, FnResult, FnValue, Int8ArrayView, IntVarPtr, VmFunction};
pub use nkspc::{ParsedScript, SourceToken, VmConfig, syntax_tokens};
pub use vm::{NO_MESSAGE_CONDITION, PatchOverrides, ScriptVM};
