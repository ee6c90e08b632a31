//! Core built-in script functions.
//!
//! Argument counts, types, units and finalness are validated at parse time
//! through the `VmFunction` signature methods, so `exec` implementations
//! assume well-formed arguments and focus on the soft-failure semantics
//! (runtime errors abort the handler, everything else degrades to zero).

use nkspc::ast::{ExprType, Program};
use nkspc::builtins::{FnResult, FnValue, VmFunction};
use nkspc::eval::{
    self, ArrayAccess, ExecEnv, IntScalar, array_access, eval_cast_int, eval_cast_real, eval_int,
    eval_number_to_factor, eval_real, eval_str,
};
use nksp_core::units::{conv_int_to_factor, conv_real_to_factor};
use nksp_core::{
    ExecContext, ExprId, IssueKind, NO_FACTOR, StmtFlags, UnitType, fequal, vmfloat, vmint,
};
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn arg_unit(prog: &Program, args: &[ExprId], i: usize) -> UnitType {
    prog.info(args[i]).unit
}

fn arg_final(prog: &Program, args: &[ExprId], i: usize) -> bool {
    prog.info(args[i]).is_final
}

fn arg_type(prog: &Program, args: &[ExprId], i: usize) -> ExprType {
    prog.info(args[i]).ty
}

// ---------------------------------------------------------------------------
// message()

pub struct MessageFn;

impl VmFunction for MessageFn {
    fn return_type(&self, _prog: &Program, _args: &[ExprId]) -> ExprType {
        ExprType::Empty
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> usize {
        1
    }

    fn accepts_arg_type(&self, _i: usize, ty: ExprType) -> bool {
        matches!(ty, ExprType::Int | ExprType::Real | ExprType::String)
    }

    fn exec(&self, args: &[ExprId], env: &mut ExecEnv) -> FnResult {
        let text = match env.prog.info(args[0]).ty {
            ExprType::String => eval_str(env, args[0]),
            ExprType::Real => format!("{}", eval_real(env, args[0]).value),
            _ => format!("{}", eval_int(env, args[0]).value),
        };
        env.sink.script_message(&text);
        FnResult::success()
    }
}

// ---------------------------------------------------------------------------
// exit()

/// `exit()` unwinds to the innermost subroutine: inside a user function it
/// returns from that function, at handler level it ends the handler. With
/// the exit-result feature enabled it additionally captures its argument.
pub struct ExitFn {
    result_enabled: Arc<AtomicBool>,
}

impl ExitFn {
    pub fn new(result_enabled: Arc<AtomicBool>) -> Self {
        ExitFn { result_enabled }
    }

    fn enabled(&self) -> bool {
        self.result_enabled.load(Ordering::Relaxed)
    }
}

impl VmFunction for ExitFn {
    fn return_type(&self, _prog: &Program, _args: &[ExprId]) -> ExprType {
        ExprType::Empty
    }

    fn min_args(&self) -> usize {
        0
    }

    fn max_args(&self) -> usize {
        if self.enabled() { 1 } else { 0 }
    }

    fn accepts_arg_type(&self, _i: usize, ty: ExprType) -> bool {
        self.enabled() && matches!(ty, ExprType::Int | ExprType::Real | ExprType::String)
    }

    fn accepts_arg_unit_type(&self, _i: usize, _unit: UnitType) -> bool {
        self.enabled()
    }

    fn accepts_arg_unit_prefix(&self, _i: usize, _unit: UnitType) -> bool {
        self.enabled()
    }

    fn accepts_arg_final(&self, _i: usize) -> bool {
        self.enabled()
    }

    fn exec(&self, args: &[ExprId], env: &mut ExecEnv) -> FnResult {
        if env.config.exit_result_enabled && !args.is_empty() {
            let info = *env.prog.info(args[0]);
            env.ctx.exit_res = Some(match info.ty {
                ExprType::Int => {
                    let s = eval_int(env, args[0]);
                    nksp_core::ExitValue::Int {
                        value: s.value,
                        factor: s.factor,
                        unit: info.unit,
                        is_final: info.is_final,
                    }
                }
                ExprType::Real => {
                    let s = eval_real(env, args[0]);
                    nksp_core::ExitValue::Real {
                        value: s.value,
                        factor: s.factor,
                        unit: info.unit,
                        is_final: info.is_final,
                    }
                }
                _ => nksp_core::ExitValue::Str(eval_str(env, args[0])),
            });
        }
        FnResult {
            flags: StmtFlags::RETURN,
            value: FnValue::Empty,
        }
    }
}

// ---------------------------------------------------------------------------
// wait()

pub struct WaitFn;

impl VmFunction for WaitFn {
    fn return_type(&self, _prog: &Program, _args: &[ExprId]) -> ExprType {
        ExprType::Empty
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> usize {
        1
    }

    fn accepts_arg_type(&self, _i: usize, ty: ExprType) -> bool {
        matches!(ty, ExprType::Int | ExprType::Real)
    }

    fn accepts_arg_unit_type(&self, _i: usize, unit: UnitType) -> bool {
        matches!(unit, UnitType::None | UnitType::Second)
    }

    fn accepts_arg_unit_prefix(&self, _i: usize, unit: UnitType) -> bool {
        // metric prefixes only make sense on a seconds value here
        unit == UnitType::Second
    }

    fn exec(&self, args: &[ExprId], env: &mut ExecEnv) -> FnResult {
        let us = if env.prog.info(args[0]).unit == UnitType::Second {
            eval_number_to_factor(env, args[0], 1e-6)
        } else {
            eval_cast_int(env, args[0]).value
        };
        if us < 0 {
            env.sink
                .runtime_warning("wait(): argument must not be negative, aborting script");
            return FnResult::error();
        }
        if us == 0 {
            env.sink
                .runtime_warning("wait(): argument must not be zero, aborting script");
            return FnResult::error();
        }
        env.ctx.suspend_microseconds = us;
        FnResult {
            flags: StmtFlags::SUSPEND,
            value: FnValue::Empty,
        }
    }
}

// ---------------------------------------------------------------------------
// abs()

pub struct AbsFn;

impl VmFunction for AbsFn {
    fn return_type(&self, prog: &Program, args: &[ExprId]) -> ExprType {
        arg_type(prog, args, 0)
    }

    fn return_unit_type(&self, prog: &Program, args: &[ExprId]) -> UnitType {
        arg_unit(prog, args, 0)
    }

    fn returns_final(&self, prog: &Program, args: &[ExprId]) -> bool {
        arg_final(prog, args, 0)
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> usize {
        1
    }

    fn accepts_arg_type(&self, _i: usize, ty: ExprType) -> bool {
        ty.is_number()
    }

    fn accepts_arg_unit_type(&self, _i: usize, _unit: UnitType) -> bool {
        true
    }

    fn accepts_arg_unit_prefix(&self, _i: usize, _unit: UnitType) -> bool {
        true
    }

    fn accepts_arg_final(&self, _i: usize) -> bool {
        true
    }

    fn exec(&self, args: &[ExprId], env: &mut ExecEnv) -> FnResult {
        if env.prog.info(args[0]).ty == ExprType::Real {
            let s = eval_real(env, args[0]);
            FnResult::success_real(s.value.abs(), s.factor)
        } else {
            let s = eval_int(env, args[0]);
            FnResult::success_int(s.value.wrapping_abs(), s.factor)
        }
    }
}

// ---------------------------------------------------------------------------
// random()

pub struct RandomFn;

impl VmFunction for RandomFn {
    fn return_type(&self, prog: &Program, args: &[ExprId]) -> ExprType {
        if arg_type(prog, args, 0) == ExprType::Int && arg_type(prog, args, 1) == ExprType::Int {
            ExprType::Int
        } else {
            ExprType::Real
        }
    }

    fn return_unit_type(&self, prog: &Program, args: &[ExprId]) -> UnitType {
        // check_args() ensured both arguments share one unit type
        arg_unit(prog, args, 0)
    }

    fn returns_final(&self, prog: &Program, args: &[ExprId]) -> bool {
        arg_final(prog, args, 0) || arg_final(prog, args, 1)
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> usize {
        2
    }

    fn accepts_arg_type(&self, _i: usize, ty: ExprType) -> bool {
        ty.is_number()
    }

    fn accepts_arg_unit_type(&self, _i: usize, _unit: UnitType) -> bool {
        true
    }

    fn accepts_arg_unit_prefix(&self, _i: usize, _unit: UnitType) -> bool {
        true
    }

    fn accepts_arg_final(&self, _i: usize) -> bool {
        true
    }

    fn check_args(
        &self,
        prog: &Program,
        args: &[ExprId],
        issue: &mut dyn FnMut(IssueKind, String),
    ) {
        let a = arg_unit(prog, args, 0);
        let b = arg_unit(prog, args, 1);
        if a != b {
            issue(
                IssueKind::Error,
                format!(
                    "argument 1 has unit type {}, whereas argument 2 has unit type {}",
                    a, b
                ),
            );
            return;
        }
        if arg_final(prog, args, 0) != arg_final(prog, args, 1) {
            issue(
                IssueKind::Warning,
                "only one argument is 'final', function result will be 'final'".to_string(),
            );
        }
    }

    fn exec(&self, args: &[ExprId], env: &mut ExecEnv) -> FnResult {
        if arg_type(env.prog, args, 0) == ExprType::Int
            && arg_type(env.prog, args, 1) == ExprType::Int
        {
            let lo = eval_int(env, args[0]);
            let hi = eval_int(env, args[1]);
            let (min, max, factor) = if lo.factor == hi.factor {
                (lo.value, hi.value, lo.factor)
            } else if lo.factor < hi.factor {
                (
                    lo.value,
                    conv_int_to_factor(hi.value, hi.factor, lo.factor),
                    lo.factor,
                )
            } else {
                (
                    conv_int_to_factor(lo.value, lo.factor, hi.factor),
                    hi.value,
                    hi.factor,
                )
            };
            let value = random_int_inclusive(env.ctx, min, max);
            FnResult::success_int(value, factor)
        } else {
            let lo = eval_cast_real(env, args[0]);
            let hi = eval_cast_real(env, args[1]);
            let (min, max, factor) = if lo.factor == hi.factor {
                (lo.value, hi.value, lo.factor)
            } else if lo.factor < hi.factor {
                (
                    lo.value,
                    conv_real_to_factor(hi.value, hi.factor, lo.factor),
                    lo.factor,
                )
            } else {
                (
                    conv_real_to_factor(lo.value, lo.factor, hi.factor),
                    hi.value,
                    hi.factor,
                )
            };
            let value = if min < max {
                env.ctx.rng.gen_range(min..=max)
            } else if max < min {
                env.ctx.rng.gen_range(max..=min)
            } else {
                min
            };
            FnResult::success_real(value, factor)
        }
    }
}

fn random_int_inclusive(ctx: &mut ExecContext, min: vmint, max: vmint) -> vmint {
    if min < max {
        ctx.rng.gen_range(min..=max)
    } else if max < min {
        ctx.rng.gen_range(max..=min)
    } else {
        min
    }
}

// ---------------------------------------------------------------------------
// num_elements()

pub struct NumElementsFn;

impl VmFunction for NumElementsFn {
    fn return_type(&self, _prog: &Program, _args: &[ExprId]) -> ExprType {
        ExprType::Int
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> usize {
        1
    }

    fn accepts_arg_type(&self, _i: usize, ty: ExprType) -> bool {
        ty.is_array()
    }

    fn exec(&self, args: &[ExprId], env: &mut ExecEnv) -> FnResult {
        match array_access(env.prog, args[0]) {
            Some(acc) => FnResult::success_int(acc.len(env) as vmint, NO_FACTOR),
            None => {
                // string arrays have no accessor payload beyond length
                let len = env.prog.info(args[0]).array_size.unwrap_or(0);
                FnResult::success_int(len as vmint, NO_FACTOR)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// inc() / dec()

pub struct IncDecFn {
    delta: vmint,
}

impl IncDecFn {
    pub fn inc() -> Self {
        IncDecFn { delta: 1 }
    }

    pub fn dec() -> Self {
        IncDecFn { delta: -1 }
    }
}

impl VmFunction for IncDecFn {
    fn return_type(&self, _prog: &Program, _args: &[ExprId]) -> ExprType {
        ExprType::Int
    }

    fn return_unit_type(&self, prog: &Program, args: &[ExprId]) -> UnitType {
        arg_unit(prog, args, 0)
    }

    fn returns_final(&self, prog: &Program, args: &[ExprId]) -> bool {
        arg_final(prog, args, 0)
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> usize {
        1
    }

    fn accepts_arg_type(&self, _i: usize, ty: ExprType) -> bool {
        ty == ExprType::Int
    }

    fn accepts_arg_unit_type(&self, _i: usize, _unit: UnitType) -> bool {
        true
    }

    fn accepts_arg_unit_prefix(&self, _i: usize, _unit: UnitType) -> bool {
        true
    }

    fn accepts_arg_final(&self, _i: usize) -> bool {
        true
    }

    fn modifies_arg(&self, i: usize) -> bool {
        i == 0
    }

    fn check_args(
        &self,
        prog: &Program,
        args: &[ExprId],
        issue: &mut dyn FnMut(IssueKind, String),
    ) {
        let unit = arg_unit(prog, args, 0);
        if unit != UnitType::None {
            issue(
                IssueKind::Warning,
                format!(
                    "argument has a unit type ({}), only the number before the unit will be changed by one",
                    unit
                ),
            );
        }
    }

    fn exec(&self, args: &[ExprId], env: &mut ExecEnv) -> FnResult {
        let s = eval_int(env, args[0]);
        let out = IntScalar {
            value: s.value.wrapping_add(self.delta),
            factor: s.factor,
        };
        eval::store_int_lvalue(env, args[0], out);
        FnResult::success_int(out.value, out.factor)
    }
}

// ---------------------------------------------------------------------------
// in_range()

pub struct InRangeFn;

impl VmFunction for InRangeFn {
    fn return_type(&self, _prog: &Program, _args: &[ExprId]) -> ExprType {
        ExprType::Int
    }

    fn min_args(&self) -> usize {
        3
    }

    fn max_args(&self) -> usize {
        3
    }

    fn accepts_arg_type(&self, _i: usize, ty: ExprType) -> bool {
        ty.is_number()
    }

    fn accepts_arg_unit_type(&self, _i: usize, _unit: UnitType) -> bool {
        true
    }

    fn accepts_arg_unit_prefix(&self, _i: usize, _unit: UnitType) -> bool {
        true
    }

    fn accepts_arg_final(&self, _i: usize) -> bool {
        true
    }

    fn check_args(
        &self,
        prog: &Program,
        args: &[ExprId],
        issue: &mut dyn FnMut(IssueKind, String),
    ) {
        let units: Vec<UnitType> = (0..3).map(|i| arg_unit(prog, args, i)).collect();
        if units[0] != units[1] || units[1] != units[2] {
            issue(
                IssueKind::Error,
                format!(
                    "all arguments must have the same unit type, got {}, {} and {}",
                    units[0], units[1], units[2]
                ),
            );
            return;
        }
        let types: Vec<ExprType> = (0..3).map(|i| arg_type(prog, args, i)).collect();
        if types[0] != types[1] || types[1] != types[2] {
            issue(
                IssueKind::Warning,
                "arguments have mixed integer and real types, they will be compared as real numbers"
                    .to_string(),
            );
        }
    }

    fn exec(&self, args: &[ExprId], env: &mut ExecEnv) -> FnResult {
        let needle = eval_cast_real(env, args[0]);
        let lo = eval_cast_real(env, args[1]);
        let hi = eval_cast_real(env, args[2]);
        let needle = needle.value * needle.factor;
        let mut lo = lo.value * lo.factor;
        let mut hi = hi.value * hi.factor;
        if lo > hi {
            std::mem::swap(&mut lo, &mut hi);
        }
        FnResult::success_int((needle >= lo && needle <= hi) as vmint, NO_FACTOR)
    }
}

// ---------------------------------------------------------------------------
// sh_left() / sh_right()

pub struct ShiftFn {
    left: bool,
}

impl ShiftFn {
    pub fn left() -> Self {
        ShiftFn { left: true }
    }

    pub fn right() -> Self {
        ShiftFn { left: false }
    }
}

impl VmFunction for ShiftFn {
    fn return_type(&self, _prog: &Program, _args: &[ExprId]) -> ExprType {
        ExprType::Int
    }

    fn returns_final(&self, prog: &Program, args: &[ExprId]) -> bool {
        arg_final(prog, args, 0)
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> usize {
        2
    }

    fn accepts_arg_type(&self, _i: usize, ty: ExprType) -> bool {
        ty == ExprType::Int
    }

    fn accepts_arg_final(&self, _i: usize) -> bool {
        true
    }

    fn exec(&self, args: &[ExprId], env: &mut ExecEnv) -> FnResult {
        let value = eval_int(env, args[0]).value;
        let n = eval_int(env, args[1]).value as u32;
        let out = if self.left {
            value.wrapping_shl(n)
        } else {
            value.wrapping_shr(n)
        };
        FnResult::success_int(out, NO_FACTOR)
    }
}

// ---------------------------------------------------------------------------
// msb() / lsb()

/// Splits a 14 bit MIDI value (as used by RPN / NRPN addresses) into its
/// 7 bit halves.
pub struct ByteHalfFn {
    high: bool,
}

impl ByteHalfFn {
    pub fn msb() -> Self {
        ByteHalfFn { high: true }
    }

    pub fn lsb() -> Self {
        ByteHalfFn { high: false }
    }
}

impl VmFunction for ByteHalfFn {
    fn return_type(&self, _prog: &Program, _args: &[ExprId]) -> ExprType {
        ExprType::Int
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> usize {
        1
    }

    fn accepts_arg_type(&self, _i: usize, ty: ExprType) -> bool {
        ty == ExprType::Int
    }

    fn exec(&self, args: &[ExprId], env: &mut ExecEnv) -> FnResult {
        let v = eval_int(env, args[0]).value;
        let out = if self.high { (v >> 7) & 127 } else { v & 127 };
        FnResult::success_int(out, NO_FACTOR)
    }
}

// ---------------------------------------------------------------------------
// min() / max()

pub struct MinMaxFn {
    want_max: bool,
}

impl MinMaxFn {
    pub fn min() -> Self {
        MinMaxFn { want_max: false }
    }

    pub fn max() -> Self {
        MinMaxFn { want_max: true }
    }
}

impl VmFunction for MinMaxFn {
    fn return_type(&self, prog: &Program, args: &[ExprId]) -> ExprType {
        if arg_type(prog, args, 0) == ExprType::Real || arg_type(prog, args, 1) == ExprType::Real {
            ExprType::Real
        } else {
            ExprType::Int
        }
    }

    fn return_unit_type(&self, prog: &Program, args: &[ExprId]) -> UnitType {
        arg_unit(prog, args, 0)
    }

    fn returns_final(&self, prog: &Program, args: &[ExprId]) -> bool {
        arg_final(prog, args, 0) || arg_final(prog, args, 1)
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> usize {
        2
    }

    fn accepts_arg_type(&self, _i: usize, ty: ExprType) -> bool {
        ty.is_number()
    }

    fn accepts_arg_unit_type(&self, _i: usize, _unit: UnitType) -> bool {
        true
    }

    fn accepts_arg_unit_prefix(&self, _i: usize, _unit: UnitType) -> bool {
        true
    }

    fn accepts_arg_final(&self, _i: usize) -> bool {
        true
    }

    fn check_args(
        &self,
        prog: &Program,
        args: &[ExprId],
        issue: &mut dyn FnMut(IssueKind, String),
    ) {
        let a = arg_unit(prog, args, 0);
        let b = arg_unit(prog, args, 1);
        if a != b {
            issue(
                IssueKind::Error,
                format!(
                    "argument 1 has unit type {}, whereas argument 2 has unit type {}",
                    a, b
                ),
            );
            return;
        }
        if arg_type(prog, args, 0) != arg_type(prog, args, 1) {
            issue(
                IssueKind::Warning,
                "arguments have mixed integer and real types, function result will be a real number"
                    .to_string(),
            );
            return;
        }
        if arg_final(prog, args, 0) != arg_final(prog, args, 1) {
            issue(
                IssueKind::Warning,
                "only one argument is 'final', function result will be 'final'".to_string(),
            );
        }
    }

    fn exec(&self, args: &[ExprId], env: &mut ExecEnv) -> FnResult {
        let both_int = arg_type(env.prog, args, 0) == ExprType::Int
            && arg_type(env.prog, args, 1) == ExprType::Int;
        if both_int {
            let l = eval_int(env, args[0]);
            let r = eval_int(env, args[1]);
            let lprod = l.value as vmfloat * l.factor;
            let rprod = r.value as vmfloat * r.factor;
            let take_left = if self.want_max {
                lprod > rprod
            } else {
                lprod < rprod
            };
            let s = if take_left { l } else { r };
            FnResult::success_int(s.value, s.factor)
        } else {
            let l = eval_cast_real(env, args[0]);
            let r = eval_cast_real(env, args[1]);
            let lprod = l.value * l.factor;
            let rprod = r.value * r.factor;
            let take_left = if self.want_max {
                lprod > rprod
            } else {
                lprod < rprod
            };
            let s = if take_left { l } else { r };
            FnResult::success_real(s.value, s.factor)
        }
    }
}

// ---------------------------------------------------------------------------
// array_equal()

pub struct ArrayEqualFn;

impl VmFunction for ArrayEqualFn {
    fn return_type(&self, _prog: &Program, _args: &[ExprId]) -> ExprType {
        ExprType::Int
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> usize {
        2
    }

    fn accepts_arg_type(&self, _i: usize, ty: ExprType) -> bool {
        matches!(ty, ExprType::IntArray | ExprType::RealArray)
    }

    fn check_args(
        &self,
        prog: &Program,
        args: &[ExprId],
        issue: &mut dyn FnMut(IssueKind, String),
    ) {
        if arg_type(prog, args, 0) != arg_type(prog, args, 1) {
            issue(
                IssueKind::Error,
                format!(
                    "argument 1 is {}, whereas argument 2 is {}",
                    arg_type(prog, args, 0).name(),
                    arg_type(prog, args, 1).name()
                ),
            );
            return;
        }
        let a = prog.info(args[0]).array_size;
        let b = prog.info(args[1]).array_size;
        if let (Some(a), Some(b)) = (a, b) {
            if a != b {
                issue(
                    IssueKind::Warning,
                    "result is always false, the two arrays were declared with different sizes"
                        .to_string(),
                );
            }
        }
    }

    fn exec(&self, args: &[ExprId], env: &mut ExecEnv) -> FnResult {
        let (Some(l), Some(r)) = (
            array_access(env.prog, args[0]),
            array_access(env.prog, args[1]),
        ) else {
            return FnResult::error();
        };
        let n = l.len(env);
        if n != r.len(env) {
            return FnResult::success_int(0, NO_FACTOR);
        }
        let real = l.is_real();
        for i in 0..n {
            let lf = l.factor_of(env, i);
            let rf = r.factor_of(env, i);
            if real {
                let lv = l.get_real(env, i);
                let rv = r.get_real(env, i);
                let equal = if lf == rf {
                    fequal(lv, rv)
                } else if lf < rf {
                    fequal(lv, conv_real_to_factor(rv, rf, lf))
                } else {
                    fequal(conv_real_to_factor(lv, lf, rf), rv)
                };
                if !equal {
                    return FnResult::success_int(0, NO_FACTOR);
                }
            } else {
                let lv = l.get_int(env, i);
                let rv = r.get_int(env, i);
                let equal = if lf == rf {
                    lv == rv
                } else if lf < rf {
                    lv == conv_int_to_factor(rv, rf, lf)
                } else {
                    conv_int_to_factor(lv, lf, rf) == rv
                };
                if !equal {
                    return FnResult::success_int(0, NO_FACTOR);
                }
            }
        }
        FnResult::success_int(1, NO_FACTOR)
    }
}

// ---------------------------------------------------------------------------
// search()

pub struct SearchFn;

impl VmFunction for SearchFn {
    fn return_type(&self, _prog: &Program, _args: &[ExprId]) -> ExprType {
        ExprType::Int
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> usize {
        2
    }

    fn accepts_arg_type(&self, i: usize, ty: ExprType) -> bool {
        if i == 0 {
            matches!(ty, ExprType::IntArray | ExprType::RealArray)
        } else {
            ty.is_number()
        }
    }

    fn check_args(
        &self,
        prog: &Program,
        args: &[ExprId],
        issue: &mut dyn FnMut(IssueKind, String),
    ) {
        let arr = arg_type(prog, args, 0);
        let needle = arg_type(prog, args, 1);
        let expected = if arr == ExprType::IntArray {
            ExprType::Int
        } else {
            ExprType::Real
        };
        if needle != expected {
            issue(
                IssueKind::Error,
                format!(
                    "argument 1 is {}, hence argument 2 should be {}, but is {}",
                    arr.name(),
                    expected.name(),
                    needle.name()
                ),
            );
        }
    }

    fn exec(&self, args: &[ExprId], env: &mut ExecEnv) -> FnResult {
        let Some(acc) = array_access(env.prog, args[0]) else {
            return FnResult::error();
        };
        let n = acc.len(env);
        if acc.is_real() {
            let needle = eval_real(env, args[1]).value;
            for i in 0..n {
                if fequal(acc.get_real(env, i), needle) {
                    return FnResult::success_int(i as vmint, NO_FACTOR);
                }
            }
        } else {
            let needle = eval_int(env, args[1]).value;
            for i in 0..n {
                if acc.get_int(env, i) == needle {
                    return FnResult::success_int(i as vmint, NO_FACTOR);
                }
            }
        }
        FnResult::success_int(-1, NO_FACTOR)
    }
}

// ---------------------------------------------------------------------------
// sort()

pub struct SortFn;

impl VmFunction for SortFn {
    fn return_type(&self, _prog: &Program, _args: &[ExprId]) -> ExprType {
        ExprType::Empty
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> usize {
        2
    }

    fn accepts_arg_type(&self, i: usize, ty: ExprType) -> bool {
        if i == 0 {
            matches!(ty, ExprType::IntArray | ExprType::RealArray)
        } else {
            ty == ExprType::Int
        }
    }

    fn modifies_arg(&self, i: usize) -> bool {
        i == 0
    }

    fn exec(&self, args: &[ExprId], env: &mut ExecEnv) -> FnResult {
        let Some(acc) = array_access(env.prog, args[0]) else {
            return FnResult::error();
        };
        let descending = args.len() > 1 && eval_int(env, args[1]).value != 0;
        sort_indirect(&acc, env, descending);
        FnResult::success()
    }
}

/// Indirect indexed sort: builds an index permutation by comparing the
/// effective values (element value times element factor) through the
/// virtual accessors, then applies it by swapping through the same
/// accessors. Makes no assumption that the storage is contiguous.
fn sort_indirect(acc: &ArrayAccess, env: &mut ExecEnv, descending: bool) {
    let n = acc.len(env);
    if n < 2 {
        return;
    }
    let keys: Vec<vmfloat> = (0..n)
        .map(|i| {
            if acc.is_real() {
                acc.get_real(env, i) * acc.factor_of(env, i)
            } else {
                acc.get_int(env, i) as vmfloat * acc.factor_of(env, i)
            }
        })
        .collect();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        let ord = keys[a]
            .partial_cmp(&keys[b])
            .unwrap_or(std::cmp::Ordering::Equal);
        if descending { ord.reverse() } else { ord }
    });

    // invert the gather order into scatter destinations, then realize the
    // permutation with element swaps
    let mut dest = vec![0usize; n];
    for (target, &src) in order.iter().enumerate() {
        dest[src] = target;
    }
    for i in 0..n {
        while dest[i] != i {
            let j = dest[i];
            swap_elements(acc, env, i, j);
            dest.swap(i, j);
        }
    }
}

fn swap_elements(acc: &ArrayAccess, env: &ExecEnv, a: usize, b: usize) {
    let fa = acc.factor_of(env, a);
    let fb = acc.factor_of(env, b);
    if acc.is_real() {
        let va = acc.get_real(env, a);
        let vb = acc.get_real(env, b);
        acc.set_real(env, a, vb);
        acc.set_real(env, b, va);
    } else {
        let va = acc.get_int(env, a);
        let vb = acc.get_int(env, b);
        acc.set_int(env, a, vb);
        acc.set_int(env, b, va);
    }
    acc.set_factor(env, a, fb);
    acc.set_factor(env, b, fa);
}

// ---------------------------------------------------------------------------
// real_to_int() / int() and int_to_real() / real()

pub struct RealToIntFn;

impl VmFunction for RealToIntFn {
    fn return_type(&self, _prog: &Program, _args: &[ExprId]) -> ExprType {
        ExprType::Int
    }

    fn return_unit_type(&self, prog: &Program, args: &[ExprId]) -> UnitType {
        arg_unit(prog, args, 0)
    }

    fn returns_final(&self, prog: &Program, args: &[ExprId]) -> bool {
        arg_final(prog, args, 0)
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> usize {
        1
    }

    fn accepts_arg_type(&self, _i: usize, ty: ExprType) -> bool {
        ty == ExprType::Real
    }

    fn accepts_arg_unit_type(&self, _i: usize, _unit: UnitType) -> bool {
        true
    }

    fn accepts_arg_unit_prefix(&self, _i: usize, _unit: UnitType) -> bool {
        true
    }

    fn accepts_arg_final(&self, _i: usize) -> bool {
        true
    }

    fn exec(&self, args: &[ExprId], env: &mut ExecEnv) -> FnResult {
        let s = eval_real(env, args[0]);
        FnResult::success_int(s.value as vmint, s.factor)
    }
}

pub struct IntToRealFn;

impl VmFunction for IntToRealFn {
    fn return_type(&self, _prog: &Program, _args: &[ExprId]) -> ExprType {
        ExprType::Real
    }

    fn return_unit_type(&self, prog: &Program, args: &[ExprId]) -> UnitType {
        arg_unit(prog, args, 0)
    }

    fn returns_final(&self, prog: &Program, args: &[ExprId]) -> bool {
        arg_final(prog, args, 0)
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> usize {
        1
    }

    fn accepts_arg_type(&self, _i: usize, ty: ExprType) -> bool {
        ty == ExprType::Int
    }

    fn accepts_arg_unit_type(&self, _i: usize, _unit: UnitType) -> bool {
        true
    }

    fn accepts_arg_unit_prefix(&self, _i: usize, _unit: UnitType) -> bool {
        true
    }

    fn accepts_arg_final(&self, _i: usize) -> bool {
        true
    }

    fn exec(&self, args: &[ExprId], env: &mut ExecEnv) -> FnResult {
        let s = eval_int(env, args[0]);
        FnResult::success_real(s.value as vmfloat, s.factor)
    }
}

// ---------------------------------------------------------------------------
// transcendental and rounding functions over one real argument

pub struct RealUnaryFn {
    f: fn(vmfloat) -> vmfloat,
}

impl RealUnaryFn {
    pub fn new(f: fn(vmfloat) -> vmfloat) -> Self {
        RealUnaryFn { f }
    }
}

impl VmFunction for RealUnaryFn {
    fn return_type(&self, _prog: &Program, _args: &[ExprId]) -> ExprType {
        ExprType::Real
    }

    fn return_unit_type(&self, prog: &Program, args: &[ExprId]) -> UnitType {
        arg_unit(prog, args, 0)
    }

    fn returns_final(&self, prog: &Program, args: &[ExprId]) -> bool {
        arg_final(prog, args, 0)
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> usize {
        1
    }

    fn accepts_arg_type(&self, _i: usize, ty: ExprType) -> bool {
        ty == ExprType::Real
    }

    fn accepts_arg_unit_type(&self, _i: usize, _unit: UnitType) -> bool {
        true
    }

    fn accepts_arg_unit_prefix(&self, _i: usize, _unit: UnitType) -> bool {
        true
    }

    fn accepts_arg_final(&self, _i: usize) -> bool {
        true
    }

    fn exec(&self, args: &[ExprId], env: &mut ExecEnv) -> FnResult {
        let s = eval_real(env, args[0]);
        FnResult::success_real((self.f)(s.value), s.factor)
    }
}

// ---------------------------------------------------------------------------
// pow()

pub struct PowFn;

impl VmFunction for PowFn {
    fn return_type(&self, _prog: &Program, _args: &[ExprId]) -> ExprType {
        ExprType::Real
    }

    fn return_unit_type(&self, prog: &Program, args: &[ExprId]) -> UnitType {
        // only the base may carry a unit
        arg_unit(prog, args, 0)
    }

    fn returns_final(&self, prog: &Program, args: &[ExprId]) -> bool {
        // only the base may be 'final'
        arg_final(prog, args, 0)
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> usize {
        2
    }

    fn accepts_arg_type(&self, _i: usize, ty: ExprType) -> bool {
        ty == ExprType::Real
    }

    fn accepts_arg_unit_type(&self, i: usize, unit: UnitType) -> bool {
        i == 0 || unit == UnitType::None
    }

    fn accepts_arg_unit_prefix(&self, i: usize, _unit: UnitType) -> bool {
        i == 0
    }

    fn accepts_arg_final(&self, i: usize) -> bool {
        i == 0
    }

    fn exec(&self, args: &[ExprId], env: &mut ExecEnv) -> FnResult {
        let base = eval_real(env, args[0]);
        let exp = eval_real(env, args[1]);
        FnResult::success_real(base.value.powf(exp.value), base.factor)
    }
}
