//! Core foundation for the NKSP script engine.
//!
//! This crate holds everything the front-end (`nksp-compiler`) and the
//! executor (`nksp-runtime`) share: the numeric type choices, the
//! measurement-unit model, status flag sets, source spans and diagnostics,
//! and the mutable per-script / per-voice memory that compiled scripts
//! operate on.

pub mod context;
pub mod diag;
pub mod flags;
pub mod float;
pub mod ids;
pub mod issues;
pub mod memory;
pub mod units;

pub use context::{ExecContext, ExitValue, StackFrame};
pub use diag::{BufferSink, DiagnosticSink, NullSink, TracingSink};
pub use flags::{ExecStatus, StmtFlags};
pub use float::fequal;
pub use ids::{ExprId, FnId, HandlerId, StmtId, VarId};
pub use issues::{CodeBlock, IssueKind, ParserIssue};
pub use memory::GlobalMemory;
pub use units::{MetricPrefix, UnitType, NO_FACTOR};

/// Integer type used for all `$` variables and integer expressions.
#[allow(non_camel_case_types)]
pub type vmint = i64;

/// Floating point type used for all `~` variables and real expressions.
///
/// Fixed to 64 bit; the equality tolerance in [`float`] and the factor
/// conversion helpers in [`units`] are calibrated against this choice.
#[allow(non_camel_case_types)]
pub type vmfloat = f64;
