//! Registry interfaces for built-in functions and host-registered
//! variables.
//!
//! The parser validates calls against these interfaces at parse time so
//! that execution can skip per-call checks; the runtime crate supplies the
//! implementations. Dispatch through trait objects is confined to this
//! registry boundary — everything else in the tree uses enum dispatch.

use crate::ast::{ExprType, Program};
use crate::eval::{ExecEnv, IntScalar, RealScalar};
use nksp_core::{ExprId, FnId, IssueKind, StmtFlags, UnitType, vmfloat, vmint};
use std::collections::HashSet;
use std::sync::Arc;

/// Value returned by a built-in function call.
#[derive(Debug, Clone, PartialEq)]
pub enum FnValue {
    Empty,
    Int(IntScalar),
    Real(RealScalar),
    Str(String),
}

/// Result of a built-in function call: the returned value plus the
/// statement flags the executor composes up the stack. Returned by value;
/// call sites never allocate for numeric results.
#[derive(Debug, Clone, PartialEq)]
pub struct FnResult {
    pub flags: StmtFlags,
    pub value: FnValue,
}

impl FnResult {
    pub fn success() -> Self {
        FnResult {
            flags: StmtFlags::SUCCESS,
            value: FnValue::Empty,
        }
    }

    pub fn success_int(value: vmint, factor: vmfloat) -> Self {
        FnResult {
            flags: StmtFlags::SUCCESS,
            value: FnValue::Int(IntScalar { value, factor }),
        }
    }

    pub fn success_real(value: vmfloat, factor: vmfloat) -> Self {
        FnResult {
            flags: StmtFlags::SUCCESS,
            value: FnValue::Real(RealScalar { value, factor }),
        }
    }

    pub fn success_str(value: String) -> Self {
        FnResult {
            flags: StmtFlags::SUCCESS,
            value: FnValue::Str(value),
        }
    }

    /// Runtime error: aborts the current handler.
    pub fn error() -> Self {
        FnResult {
            flags: StmtFlags::ABORT | StmtFlags::ERROR,
            value: FnValue::Empty,
        }
    }
}

/// A built-in script function.
///
/// The `accepts_*` family and `check_args` run at parse time against the
/// annotated tree; `exec` runs on the audio thread and must not allocate
/// for numeric results.
pub trait VmFunction {
    /// Result type, possibly dependent on the argument types.
    fn return_type(&self, prog: &Program, args: &[ExprId]) -> ExprType;

    /// Standard unit type of the result.
    fn return_unit_type(&self, _prog: &Program, _args: &[ExprId]) -> UnitType {
        UnitType::None
    }

    /// Whether the result carries the `final` flag.
    fn returns_final(&self, _prog: &Program, _args: &[ExprId]) -> bool {
        false
    }

    fn min_args(&self) -> usize;

    fn max_args(&self) -> usize;

    fn accepts_arg_type(&self, i: usize, ty: ExprType) -> bool;

    /// Whether argument `i` may carry the given standard unit type.
    fn accepts_arg_unit_type(&self, _i: usize, unit: UnitType) -> bool {
        unit == UnitType::None
    }

    /// Whether argument `i` may carry a metric prefix for the given unit.
    fn accepts_arg_unit_prefix(&self, _i: usize, _unit: UnitType) -> bool {
        false
    }

    /// Whether argument `i` may be `final`.
    fn accepts_arg_final(&self, _i: usize) -> bool {
        false
    }

    /// Whether the function assigns through argument `i` (the parser then
    /// requires an assignable variable there).
    fn modifies_arg(&self, _i: usize) -> bool {
        false
    }

    /// Function-specific argument validation beyond the generic checks.
    fn check_args(
        &self,
        _prog: &Program,
        _args: &[ExprId],
        _issue: &mut dyn FnMut(IssueKind, String),
    ) {
    }

    fn exec(&self, args: &[ExprId], env: &mut ExecEnv) -> FnResult;
}

/// Resolves function names at parse time and hands out implementations at
/// execution time. Implemented by the VM; hosts can wrap it to add
/// engine-specific functions.
pub trait FunctionProvider {
    fn resolve(&self, name: &str) -> Option<FnId>;

    fn function(&self, id: FnId) -> &dyn VmFunction;

    /// Whether calls to the function should be elided at parse time, e.g.
    /// `message()` under an active `NKSP_NO_MESSAGE` condition.
    fn is_disabled(&self, _id: FnId, _conditions: &HashSet<String>) -> bool {
        false
    }
}

/// Host-registered integer scalar variable, read and written through the
/// host object.
pub trait IntVarPtr: Send + Sync {
    fn eval(&self) -> vmint;
    fn assign(&self, value: vmint);
    fn is_readonly(&self) -> bool {
        false
    }
}

/// Host-registered 8 bit integer array view.
pub trait Int8ArrayView: Send + Sync {
    fn len(&self) -> usize;
    fn get(&self, i: usize) -> i8;
    fn set(&self, i: usize, value: i8);
    fn is_readonly(&self) -> bool {
        false
    }
}

/// Dynamic integer variable: every read invokes host code (e.g. the
/// `$NKSP_REAL_TIMER` microsecond clock).
pub trait DynIntVar: Send + Sync {
    fn eval(&self) -> vmint;
    fn assign(&self, _value: vmint) {}
    fn is_assignable(&self) -> bool {
        false
    }
}

/// Host objects a parsed script is bound to. Indexed by the `binding`
/// fields of the symbol table; owned by the parsed script.
#[derive(Default, Clone)]
pub struct HostBindings {
    pub int_ptrs: Vec<Arc<dyn IntVarPtr>>,
    pub int8_arrays: Vec<Arc<dyn Int8ArrayView>>,
    pub dyn_ints: Vec<Arc<dyn DynIntVar>>,
}

impl std::fmt::Debug for HostBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBindings")
            .field("int_ptrs", &self.int_ptrs.len())
            .field("int8_arrays", &self.int8_arrays.len())
            .field("dyn_ints", &self.dyn_ints.len())
            .finish()
    }
}
