//! Runtime evaluation of the execution tree.
//!
//! Scalars evaluate eagerly to value-and-factor pairs; arrays evaluate
//! lazily through [`ArrayAccess`]. All soft failure semantics live here:
//! out-of-range array reads yield zero, stores are discarded, division by
//! zero yields zero, integer overflow wraps.

use crate::ast::{BinOp, BoolOp, Expr, ExprType, Program, RelOp, VarKind};
use crate::builtins::{FnResult, FnValue, HostBindings, VmFunction};
use crate::config::VmConfig;
use nksp_core::units::{conv_int_to_factor, conv_real_to_factor, factor_short_str};
use nksp_core::{
    DiagnosticSink, ExecContext, ExprId, GlobalMemory, NO_FACTOR, StmtFlags, fequal, vmfloat, vmint,
};

/// Integer value with its metric prefix factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntScalar {
    pub value: vmint,
    pub factor: vmfloat,
}

/// Real value with its metric prefix factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RealScalar {
    pub value: vmfloat,
    pub factor: vmfloat,
}

/// Everything one execution step may touch: the immutable tree, the
/// script's global memory, host bindings, the function table, the VM
/// configuration, the per-voice context and the diagnostic sink.
pub struct ExecEnv<'a> {
    pub prog: &'a Program,
    pub globals: &'a GlobalMemory,
    pub host: &'a HostBindings,
    pub fns: &'a [Box<dyn VmFunction>],
    pub config: &'a VmConfig,
    pub ctx: &'a mut ExecContext,
    pub sink: &'a mut dyn DiagnosticSink,
}

/// Evaluate an integer expression.
pub fn eval_int(env: &mut ExecEnv, id: ExprId) -> IntScalar {
    let prog = env.prog;
    match prog.expr(id) {
        Expr::IntLit { value, factor } => IntScalar {
            value: *value,
            factor: *factor,
        },
        Expr::Var(var) => {
            let v = prog.var(*var);
            match &v.kind {
                VarKind::Int { slot, factor_slot } => {
                    if v.is_poly {
                        IntScalar {
                            value: env.ctx.poly_ints[*slot],
                            factor: env.ctx.poly_factors[*factor_slot],
                        }
                    } else {
                        IntScalar {
                            value: env.globals.int(*slot),
                            factor: env.globals.factor(*factor_slot),
                        }
                    }
                }
                VarKind::ConstInt { value, factor } => IntScalar {
                    value: *value,
                    factor: *factor,
                },
                VarKind::HostInt { binding, .. } => IntScalar {
                    value: env.host.int_ptrs[*binding].eval(),
                    factor: NO_FACTOR,
                },
                VarKind::DynInt { binding } => IntScalar {
                    value: env.host.dyn_ints[*binding].eval(),
                    factor: NO_FACTOR,
                },
                _ => IntScalar {
                    value: 0,
                    factor: NO_FACTOR,
                },
            }
        }
        Expr::IntArrayElem { var, index } => {
            let idx = eval_int(env, *index).value;
            let v = env.prog.var(*var);
            match &v.kind {
                VarKind::IntArray {
                    slot,
                    factor_slot,
                    len,
                } => {
                    if idx < 0 || idx as usize >= *len {
                        return IntScalar {
                            value: 0,
                            factor: NO_FACTOR,
                        };
                    }
                    IntScalar {
                        value: env.globals.int(slot + idx as usize),
                        factor: env.globals.factor(factor_slot + idx as usize),
                    }
                }
                VarKind::HostIntArray { binding, .. } => {
                    let view = &env.host.int8_arrays[*binding];
                    if idx < 0 || idx as usize >= view.len() {
                        return IntScalar {
                            value: 0,
                            factor: NO_FACTOR,
                        };
                    }
                    IntScalar {
                        value: view.get(idx as usize) as vmint,
                        factor: NO_FACTOR,
                    }
                }
                _ => IntScalar {
                    value: 0,
                    factor: NO_FACTOR,
                },
            }
        }
        Expr::Binary { op, lhs, rhs } => eval_int_binary(env, *op, *lhs, *rhs),
        Expr::Relation { op, lhs, rhs } => IntScalar {
            value: eval_relation(env, *op, *lhs, *rhs),
            factor: NO_FACTOR,
        },
        Expr::Bool { op, lhs, rhs } => IntScalar {
            value: eval_bool(env, *op, *lhs, *rhs),
            factor: NO_FACTOR,
        },
        Expr::Neg(inner) => {
            let s = eval_int(env, *inner);
            IntScalar {
                value: s.value.wrapping_neg(),
                factor: s.factor,
            }
        }
        Expr::Not(inner) => IntScalar {
            value: (eval_int(env, *inner).value == 0) as vmint,
            factor: NO_FACTOR,
        },
        Expr::BitNot(inner) => IntScalar {
            value: !eval_int(env, *inner).value,
            factor: NO_FACTOR,
        },
        Expr::Final(inner) => eval_int(env, *inner),
        Expr::FnCall { .. } => match exec_fn(env, id).value {
            FnValue::Int(s) => s,
            _ => IntScalar {
                value: 0,
                factor: NO_FACTOR,
            },
        },
        _ => IntScalar {
            value: 0,
            factor: NO_FACTOR,
        },
    }
}

/// Evaluate a real expression.
pub fn eval_real(env: &mut ExecEnv, id: ExprId) -> RealScalar {
    let prog = env.prog;
    match prog.expr(id) {
        Expr::RealLit { value, factor } => RealScalar {
            value: *value,
            factor: *factor,
        },
        Expr::Var(var) => {
            let v = prog.var(*var);
            match &v.kind {
                VarKind::Real { slot, factor_slot } => {
                    if v.is_poly {
                        RealScalar {
                            value: env.ctx.poly_reals[*slot],
                            factor: env.ctx.poly_factors[*factor_slot],
                        }
                    } else {
                        RealScalar {
                            value: env.globals.real(*slot),
                            factor: env.globals.factor(*factor_slot),
                        }
                    }
                }
                VarKind::ConstReal { value, factor } => RealScalar {
                    value: *value,
                    factor: *factor,
                },
                _ => RealScalar {
                    value: 0.0,
                    factor: NO_FACTOR,
                },
            }
        }
        Expr::RealArrayElem { var, index } => {
            let idx = eval_int(env, *index).value;
            let v = env.prog.var(*var);
            match &v.kind {
                VarKind::RealArray {
                    slot,
                    factor_slot,
                    len,
                } => {
                    if idx < 0 || idx as usize >= *len {
                        return RealScalar {
                            value: 0.0,
                            factor: NO_FACTOR,
                        };
                    }
                    RealScalar {
                        value: env.globals.real(slot + idx as usize),
                        factor: env.globals.factor(factor_slot + idx as usize),
                    }
                }
                _ => RealScalar {
                    value: 0.0,
                    factor: NO_FACTOR,
                },
            }
        }
        Expr::Binary { op, lhs, rhs } => eval_real_binary(env, *op, *lhs, *rhs),
        Expr::Neg(inner) => {
            let s = eval_real(env, *inner);
            RealScalar {
                value: -s.value,
                factor: s.factor,
            }
        }
        Expr::Final(inner) => eval_real(env, *inner),
        Expr::FnCall { .. } => match exec_fn(env, id).value {
            FnValue::Real(s) => s,
            _ => RealScalar {
                value: 0.0,
                factor: NO_FACTOR,
            },
        },
        _ => RealScalar {
            value: 0.0,
            factor: NO_FACTOR,
        },
    }
}

/// Evaluate a string expression.
pub fn eval_str(env: &mut ExecEnv, id: ExprId) -> String {
    let prog = env.prog;
    match prog.expr(id) {
        Expr::StrLit(s) => s.clone(),
        Expr::Var(var) => match &prog.var(*var).kind {
            VarKind::Str { slot } => env.globals.string(*slot),
            VarKind::ConstStr { value } => value.clone(),
            _ => String::new(),
        },
        Expr::StrArrayElem { var, index } => {
            let idx = eval_int(env, *index).value;
            match &env.prog.var(*var).kind {
                VarKind::StrArray { slot, len } => {
                    if idx < 0 || idx as usize >= *len {
                        String::new()
                    } else {
                        env.globals.string(slot + idx as usize)
                    }
                }
                _ => String::new(),
            }
        }
        Expr::Concat { lhs, rhs } => {
            let l = eval_cast_str(env, *lhs);
            let r = eval_cast_str(env, *rhs);
            l + &r
        }
        Expr::FnCall { .. } => match exec_fn(env, id).value {
            FnValue::Str(s) => s,
            _ => String::new(),
        },
        _ => String::new(),
    }
}

/// Evaluate any scalar expression and render it as a string, appending
/// the metric prefix and unit notation of numeric values.
pub fn eval_cast_str(env: &mut ExecEnv, id: ExprId) -> String {
    let info = *env.prog.info(id);
    match info.ty {
        ExprType::String => eval_str(env, id),
        ExprType::Int => {
            let s = eval_int(env, id);
            format!("{}{}{}", s.value, factor_short_str(s.factor), info.unit.token())
        }
        ExprType::Real => {
            let s = eval_real(env, id);
            format!("{}{}{}", s.value, factor_short_str(s.factor), info.unit.token())
        }
        _ => String::new(),
    }
}

/// Evaluate a numeric expression as integer, casting reals.
pub fn eval_cast_int(env: &mut ExecEnv, id: ExprId) -> IntScalar {
    if env.prog.info(id).ty == ExprType::Real {
        let s = eval_real(env, id);
        IntScalar {
            value: s.value as vmint,
            factor: s.factor,
        }
    } else {
        eval_int(env, id)
    }
}

/// Evaluate a numeric expression as real, casting integers.
pub fn eval_cast_real(env: &mut ExecEnv, id: ExprId) -> RealScalar {
    if env.prog.info(id).ty == ExprType::Int {
        let s = eval_int(env, id);
        RealScalar {
            value: s.value as vmfloat,
            factor: s.factor,
        }
    } else {
        eval_real(env, id)
    }
}

/// Evaluate a numeric expression converted to the given target prefix
/// factor (e.g. 10^-6 to obtain microseconds from a seconds value).
pub fn eval_number_to_factor(env: &mut ExecEnv, id: ExprId, dst_factor: vmfloat) -> vmint {
    if env.prog.info(id).ty == ExprType::Real {
        let s = eval_real(env, id);
        (s.value * (s.factor / dst_factor)).round() as vmint
    } else {
        let s = eval_int(env, id);
        conv_int_to_factor(s.value, s.factor, dst_factor)
    }
}

fn eval_int_binary(env: &mut ExecEnv, op: BinOp, lhs: ExprId, rhs: ExprId) -> IntScalar {
    let l = eval_int(env, lhs);
    let r = eval_int(env, rhs);
    match op {
        BinOp::Add | BinOp::Sub => {
            let (lv, rv, f) = if l.factor == r.factor {
                (l.value, r.value, l.factor)
            } else if l.factor < r.factor {
                (l.value, conv_int_to_factor(r.value, r.factor, l.factor), l.factor)
            } else {
                (conv_int_to_factor(l.value, l.factor, r.factor), r.value, r.factor)
            };
            IntScalar {
                value: if op == BinOp::Add {
                    lv.wrapping_add(rv)
                } else {
                    lv.wrapping_sub(rv)
                },
                factor: f,
            }
        }
        BinOp::Mul => IntScalar {
            value: l.value.wrapping_mul(r.value),
            factor: l.factor * r.factor,
        },
        BinOp::Div => IntScalar {
            value: if r.value == 0 {
                0
            } else {
                l.value.wrapping_div(r.value)
            },
            factor: l.factor / r.factor,
        },
        BinOp::Mod => IntScalar {
            value: if r.value == 0 {
                0
            } else {
                l.value.wrapping_rem(r.value)
            },
            factor: NO_FACTOR,
        },
    }
}

fn eval_real_binary(env: &mut ExecEnv, op: BinOp, lhs: ExprId, rhs: ExprId) -> RealScalar {
    let l = eval_real(env, lhs);
    let r = eval_real(env, rhs);
    match op {
        BinOp::Add | BinOp::Sub => {
            let (lv, rv, f) = if l.factor == r.factor {
                (l.value, r.value, l.factor)
            } else if l.factor < r.factor {
                (l.value, conv_real_to_factor(r.value, r.factor, l.factor), l.factor)
            } else {
                (conv_real_to_factor(l.value, l.factor, r.factor), r.value, r.factor)
            };
            RealScalar {
                value: if op == BinOp::Add { lv + rv } else { lv - rv },
                factor: f,
            }
        }
        BinOp::Mul => RealScalar {
            value: l.value * r.value,
            factor: l.factor * r.factor,
        },
        BinOp::Div => RealScalar {
            value: if r.value == 0.0 { 0.0 } else { l.value / r.value },
            factor: l.factor / r.factor,
        },
        BinOp::Mod => RealScalar {
            value: 0.0,
            factor: NO_FACTOR,
        },
    }
}

fn eval_bool(env: &mut ExecEnv, op: BoolOp, lhs: ExprId, rhs: ExprId) -> vmint {
    match op {
        BoolOp::LogicalAnd => {
            if eval_int(env, lhs).value == 0 {
                0
            } else {
                (eval_int(env, rhs).value != 0) as vmint
            }
        }
        BoolOp::LogicalOr => {
            if eval_int(env, lhs).value != 0 {
                1
            } else {
                (eval_int(env, rhs).value != 0) as vmint
            }
        }
        BoolOp::BitAnd => eval_int(env, lhs).value & eval_int(env, rhs).value,
        BoolOp::BitOr => eval_int(env, lhs).value | eval_int(env, rhs).value,
    }
}

fn eval_relation(env: &mut ExecEnv, op: RelOp, lhs: ExprId, rhs: ExprId) -> vmint {
    let lty = env.prog.info(lhs).ty;
    let rty = env.prog.info(rhs).ty;

    if lty == ExprType::String || rty == ExprType::String {
        let l = eval_cast_str(env, lhs);
        let r = eval_cast_str(env, rhs);
        return match op {
            RelOp::Equal => (l == r) as vmint,
            RelOp::NotEqual => (l != r) as vmint,
            _ => 0,
        };
    }

    if lty == ExprType::Int && rty == ExprType::Int {
        let l = eval_int(env, lhs);
        let r = eval_int(env, rhs);
        let (lv, rv) = if l.factor == r.factor {
            (l.value, r.value)
        } else if l.factor < r.factor {
            (l.value, conv_int_to_factor(r.value, r.factor, l.factor))
        } else {
            (conv_int_to_factor(l.value, l.factor, r.factor), r.value)
        };
        return match op {
            RelOp::Less => (lv < rv) as vmint,
            RelOp::Greater => (lv > rv) as vmint,
            RelOp::LessEq => (lv <= rv) as vmint,
            RelOp::GreaterEq => (lv >= rv) as vmint,
            RelOp::Equal => (lv == rv) as vmint,
            RelOp::NotEqual => (lv != rv) as vmint,
        };
    }

    // at least one real operand: compare as reals, with tolerance on
    // (in)equality only
    let l = eval_cast_real(env, lhs);
    let r = eval_cast_real(env, rhs);
    let (lv, rv) = if l.factor == r.factor {
        (l.value, r.value)
    } else if l.factor < r.factor {
        (l.value, conv_real_to_factor(r.value, r.factor, l.factor))
    } else {
        (conv_real_to_factor(l.value, l.factor, r.factor), r.value)
    };
    match op {
        RelOp::Less => (lv < rv) as vmint,
        RelOp::Greater => (lv > rv) as vmint,
        RelOp::LessEq => (lv <= rv) as vmint,
        RelOp::GreaterEq => (lv >= rv) as vmint,
        RelOp::Equal => fequal(lv, rv) as vmint,
        RelOp::NotEqual => !fequal(lv, rv) as vmint,
    }
}

/// Execute a built-in function call node.
pub fn exec_fn(env: &mut ExecEnv, id: ExprId) -> FnResult {
    let prog = env.prog;
    let fns = env.fns;
    match prog.expr(id) {
        Expr::FnCall { fn_id, args } => fns[fn_id.0 as usize].exec(args, env),
        _ => FnResult::error(),
    }
}

/// Execute a leaf statement node (assignment or function call).
pub fn exec_leaf(env: &mut ExecEnv, stmt: &crate::ast::Stmt) -> StmtFlags {
    match stmt {
        crate::ast::Stmt::Assign { lhs, rhs } => {
            assign(env, *lhs, *rhs);
            StmtFlags::SUCCESS
        }
        crate::ast::Stmt::FnCall { expr } => exec_fn(env, *expr).flags,
        _ => StmtFlags::SUCCESS,
    }
}

/// Perform the assignment `lhs := rhs`. Type and unit compatibility were
/// established at parse time; out-of-range element stores are discarded.
pub fn assign(env: &mut ExecEnv, lhs: ExprId, rhs: ExprId) {
    let prog = env.prog;
    match prog.expr(lhs) {
        Expr::Var(var) => {
            let v = prog.var(*var);
            match &v.kind {
                VarKind::Int { .. } => {
                    let s = eval_int(env, rhs);
                    store_int_var(env, *var, s);
                }
                VarKind::Real { .. } => {
                    let s = eval_real(env, rhs);
                    store_real_var(env, *var, s);
                }
                VarKind::Str { slot } => {
                    let s = eval_str(env, rhs);
                    env.globals.set_string(*slot, s);
                }
                VarKind::HostInt { binding, .. } => {
                    let s = eval_int(env, rhs);
                    env.host.int_ptrs[*binding].assign(s.value);
                }
                VarKind::DynInt { binding } => {
                    let s = eval_int(env, rhs);
                    env.host.dyn_ints[*binding].assign(s.value);
                }
                // const variables never reach here (rejected at parse)
                _ => {}
            }
        }
        Expr::IntArrayElem { var, index } => {
            let s = eval_int(env, rhs);
            let idx = eval_int(env, *index).value;
            let v = env.prog.var(*var);
            match &v.kind {
                VarKind::IntArray {
                    slot,
                    factor_slot,
                    len,
                } => {
                    if idx >= 0 && (idx as usize) < *len {
                        env.globals.set_int(slot + idx as usize, s.value);
                        env.globals.set_factor(factor_slot + idx as usize, s.factor);
                    }
                }
                VarKind::HostIntArray { binding, .. } => {
                    let view = &env.host.int8_arrays[*binding];
                    if idx >= 0 && (idx as usize) < view.len() {
                        view.set(idx as usize, s.value as i8);
                    }
                }
                _ => {}
            }
        }
        Expr::RealArrayElem { var, index } => {
            let s = eval_real(env, rhs);
            let idx = eval_int(env, *index).value;
            if let VarKind::RealArray {
                slot,
                factor_slot,
                len,
            } = &env.prog.var(*var).kind
            {
                if idx >= 0 && (idx as usize) < *len {
                    env.globals.set_real(slot + idx as usize, s.value);
                    env.globals.set_factor(factor_slot + idx as usize, s.factor);
                }
            }
        }
        Expr::StrArrayElem { var, index } => {
            let s = eval_str(env, rhs);
            let idx = eval_int(env, *index).value;
            if let VarKind::StrArray { slot, len } = &env.prog.var(*var).kind {
                if idx >= 0 && (idx as usize) < *len {
                    env.globals.set_string(slot + idx as usize, s);
                }
            }
        }
        _ => {}
    }
}

/// Store an integer value (with factor) into a scalar variable. Used by
/// assignment and by the in-place built-ins `inc()` / `dec()`.
pub fn store_int_var(env: &mut ExecEnv, var: nksp_core::VarId, s: IntScalar) {
    let v = env.prog.var(var);
    match &v.kind {
        VarKind::Int { slot, factor_slot } => {
            if v.is_poly {
                env.ctx.poly_ints[*slot] = s.value;
                env.ctx.poly_factors[*factor_slot] = s.factor;
            } else {
                env.globals.set_int(*slot, s.value);
                env.globals.set_factor(*factor_slot, s.factor);
            }
        }
        VarKind::HostInt { binding, .. } => env.host.int_ptrs[*binding].assign(s.value),
        VarKind::DynInt { binding } => env.host.dyn_ints[*binding].assign(s.value),
        _ => {}
    }
}

fn store_real_var(env: &mut ExecEnv, var: nksp_core::VarId, s: RealScalar) {
    let v = env.prog.var(var);
    if let VarKind::Real { slot, factor_slot } = &v.kind {
        if v.is_poly {
            env.ctx.poly_reals[*slot] = s.value;
            env.ctx.poly_factors[*factor_slot] = s.factor;
        } else {
            env.globals.set_real(*slot, s.value);
            env.globals.set_factor(*factor_slot, s.factor);
        }
    }
}

/// Store into a scalar variable or array element through its lvalue
/// expression. Used by `inc()` / `dec()`.
pub fn store_int_lvalue(env: &mut ExecEnv, lvalue: ExprId, s: IntScalar) {
    let prog = env.prog;
    match prog.expr(lvalue) {
        Expr::Var(var) => store_int_var(env, *var, s),
        Expr::IntArrayElem { var, index } => {
            let idx = eval_int(env, *index).value;
            let v = env.prog.var(*var);
            match &v.kind {
                VarKind::IntArray {
                    slot,
                    factor_slot,
                    len,
                } => {
                    if idx >= 0 && (idx as usize) < *len {
                        env.globals.set_int(slot + idx as usize, s.value);
                        env.globals.set_factor(factor_slot + idx as usize, s.factor);
                    }
                }
                VarKind::HostIntArray { binding, .. } => {
                    let view = &env.host.int8_arrays[*binding];
                    if idx >= 0 && (idx as usize) < view.len() {
                        view.set(idx as usize, s.value as i8);
                    }
                }
                _ => {}
            }
        }
        _ => {}
    }
}

/// Lazily evaluated view of an array-typed argument.
#[derive(Debug, Clone, Copy)]
pub enum ArrayAccess {
    Int { slot: usize, factor_slot: usize, len: usize },
    Real { slot: usize, factor_slot: usize, len: usize },
    Str { slot: usize, len: usize },
    HostInt8 { binding: usize },
}

/// Resolve a whole-array argument expression into an accessor.
pub fn array_access(prog: &Program, id: ExprId) -> Option<ArrayAccess> {
    match prog.expr(id) {
        Expr::ArrayRef(var) => match &prog.var(*var).kind {
            VarKind::IntArray {
                slot,
                factor_slot,
                len,
            } => Some(ArrayAccess::Int {
                slot: *slot,
                factor_slot: *factor_slot,
                len: *len,
            }),
            VarKind::RealArray {
                slot,
                factor_slot,
                len,
            } => Some(ArrayAccess::Real {
                slot: *slot,
                factor_slot: *factor_slot,
                len: *len,
            }),
            VarKind::StrArray { slot, len } => Some(ArrayAccess::Str {
                slot: *slot,
                len: *len,
            }),
            VarKind::HostIntArray { binding, .. } => Some(ArrayAccess::HostInt8 {
                binding: *binding,
            }),
            _ => None,
        },
        _ => None,
    }
}

impl ArrayAccess {
    pub fn len(&self, env: &ExecEnv) -> usize {
        match self {
            ArrayAccess::Int { len, .. }
            | ArrayAccess::Real { len, .. }
            | ArrayAccess::Str { len, .. } => *len,
            ArrayAccess::HostInt8 { binding } => env.host.int8_arrays[*binding].len(),
        }
    }

    pub fn get_int(&self, env: &ExecEnv, i: usize) -> vmint {
        match self {
            ArrayAccess::Int { slot, len, .. } => {
                if i < *len {
                    env.globals.int(slot + i)
                } else {
                    0
                }
            }
            ArrayAccess::HostInt8 { binding } => {
                let view = &env.host.int8_arrays[*binding];
                if i < view.len() { view.get(i) as vmint } else { 0 }
            }
            _ => 0,
        }
    }

    pub fn set_int(&self, env: &ExecEnv, i: usize, value: vmint) {
        match self {
            ArrayAccess::Int { slot, len, .. } => {
                if i < *len {
                    env.globals.set_int(slot + i, value);
                }
            }
            ArrayAccess::HostInt8 { binding } => {
                let view = &env.host.int8_arrays[*binding];
                if i < view.len() {
                    view.set(i, value as i8);
                }
            }
            _ => {}
        }
    }

    pub fn get_real(&self, env: &ExecEnv, i: usize) -> vmfloat {
        match self {
            ArrayAccess::Real { slot, len, .. } if i < *len => env.globals.real(slot + i),
            _ => 0.0,
        }
    }

    pub fn set_real(&self, env: &ExecEnv, i: usize, value: vmfloat) {
        if let ArrayAccess::Real { slot, len, .. } = self {
            if i < *len {
                env.globals.set_real(slot + i, value);
            }
        }
    }

    pub fn factor_of(&self, env: &ExecEnv, i: usize) -> vmfloat {
        match self {
            ArrayAccess::Int {
                factor_slot, len, ..
            }
            | ArrayAccess::Real {
                factor_slot, len, ..
            } if i < *len => env.globals.factor(factor_slot + i),
            _ => NO_FACTOR,
        }
    }

    pub fn set_factor(&self, env: &ExecEnv, i: usize, value: vmfloat) {
        match self {
            ArrayAccess::Int {
                factor_slot, len, ..
            }
            | ArrayAccess::Real {
                factor_slot, len, ..
            } if i < *len => env.globals.set_factor(factor_slot + i, value),
            _ => {}
        }
    }

    pub fn is_real(&self) -> bool {
        matches!(self, ArrayAccess::Real { .. })
    }
}
