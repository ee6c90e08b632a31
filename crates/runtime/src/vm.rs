//! The script VM: loading, per-voice contexts and the executor.
//!
//! The executor steps the tree through an explicit control stack of
//! `(statement, subindex)` frames sized at parse time, so executing on the
//! audio thread performs no allocation and no recursion. Abort, suspend
//! and return travel as flag bits, never as panics.

use crate::dynvars::{PerfTimerVar, RealTimerVar};
use crate::functions::{
    AbsFn, ArrayEqualFn, ByteHalfFn, ExitFn, InRangeFn, IncDecFn, IntToRealFn, MessageFn, MinMaxFn,
    NumElementsFn, PowFn, RandomFn, RealToIntFn, RealUnaryFn, SearchFn, ShiftFn, SortFn, WaitFn,
};
use nksp_core::{
    DiagnosticSink, ExecContext, ExecStatus, FnId, HandlerId, StmtFlags, TracingSink, vmfloat,
};
use nkspc::ast::{Stmt, StmtClass};
use nkspc::builtins::{DynIntVar, FunctionProvider, Int8ArrayView, IntVarPtr, VmFunction};
use nkspc::eval::{self, ExecEnv};
use nkspc::{BuiltinVars, HandlerKind, ParsedScript, VmConfig, parse_script};
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Patch-variable override map: variable name (with sigil) to replacement
/// initializer text.
pub type PatchOverrides = BTreeMap<String, String>;

/// Name of the preprocessor condition that elides all `message()` calls.
pub const NO_MESSAGE_CONDITION: &str = "NKSP_NO_MESSAGE";

/// Registry of built-in functions, also acting as the parser's function
/// provider. Separate from [`ScriptVM`] so the VM can hand out disjoint
/// borrows of registry and sink.
pub struct FnRegistry {
    fns: Vec<Box<dyn VmFunction>>,
    names: Vec<(String, FnId)>,
    message_id: Option<FnId>,
}

impl FnRegistry {
    fn new() -> Self {
        FnRegistry {
            fns: Vec::new(),
            names: Vec::new(),
            message_id: None,
        }
    }

    fn add(&mut self, names: &[&str], f: Box<dyn VmFunction>) -> FnId {
        let id = FnId(self.fns.len() as u32);
        self.fns.push(f);
        for name in names {
            self.names.push((name.to_string(), id));
        }
        id
    }

    pub fn functions(&self) -> &[Box<dyn VmFunction>] {
        &self.fns
    }
}

impl FunctionProvider for FnRegistry {
    fn resolve(&self, name: &str) -> Option<FnId> {
        self.names
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
    }

    fn function(&self, id: FnId) -> &dyn VmFunction {
        &*self.fns[id.0 as usize]
    }

    fn is_disabled(&self, id: FnId, conditions: &HashSet<String>) -> bool {
        self.message_id == Some(id) && conditions.contains(NO_MESSAGE_CONDITION)
    }
}

/// The embedding surface of the script engine.
///
/// One `ScriptVM` parses and executes scripts; a parsed script stays tied
/// to the VM that loaded it (its function table indices refer to this
/// VM's registry). Methods of one VM must not be invoked concurrently.
pub struct ScriptVM {
    registry: FnRegistry,
    config: VmConfig,
    exit_result_flag: Arc<AtomicBool>,
    sink: Box<dyn DiagnosticSink>,
    builtin_vars: BuiltinVars,
    builtin_conditions: HashSet<String>,
}

impl ScriptVM {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        let exit_result_flag = Arc::new(AtomicBool::new(config.exit_result_enabled));
        let mut registry = FnRegistry::new();
        let message_id = registry.add(&["message"], Box::new(MessageFn));
        registry.message_id = Some(message_id);
        registry.add(&["exit"], Box::new(ExitFn::new(exit_result_flag.clone())));
        registry.add(&["wait"], Box::new(WaitFn));
        registry.add(&["abs"], Box::new(AbsFn));
        registry.add(&["random"], Box::new(RandomFn));
        registry.add(&["num_elements"], Box::new(NumElementsFn));
        registry.add(&["inc"], Box::new(IncDecFn::inc()));
        registry.add(&["dec"], Box::new(IncDecFn::dec()));
        registry.add(&["in_range"], Box::new(InRangeFn));
        registry.add(&["sh_left"], Box::new(ShiftFn::left()));
        registry.add(&["sh_right"], Box::new(ShiftFn::right()));
        registry.add(&["msb"], Box::new(ByteHalfFn::msb()));
        registry.add(&["lsb"], Box::new(ByteHalfFn::lsb()));
        registry.add(&["min"], Box::new(MinMaxFn::min()));
        registry.add(&["max"], Box::new(MinMaxFn::max()));
        registry.add(&["array_equal"], Box::new(ArrayEqualFn));
        registry.add(&["search"], Box::new(SearchFn));
        registry.add(&["sort"], Box::new(SortFn));
        registry.add(&["int_to_real", "real"], Box::new(IntToRealFn));
        registry.add(&["real_to_int", "int"], Box::new(RealToIntFn));
        registry.add(&["round"], Box::new(RealUnaryFn::new(vmfloat::round)));
        registry.add(&["ceil"], Box::new(RealUnaryFn::new(vmfloat::ceil)));
        registry.add(&["floor"], Box::new(RealUnaryFn::new(vmfloat::floor)));
        registry.add(&["sqrt"], Box::new(RealUnaryFn::new(vmfloat::sqrt)));
        registry.add(&["log"], Box::new(RealUnaryFn::new(vmfloat::ln)));
        registry.add(&["log2"], Box::new(RealUnaryFn::new(vmfloat::log2)));
        registry.add(&["log10"], Box::new(RealUnaryFn::new(vmfloat::log10)));
        registry.add(&["exp"], Box::new(RealUnaryFn::new(vmfloat::exp)));
        registry.add(&["pow"], Box::new(PowFn));
        registry.add(&["sin"], Box::new(RealUnaryFn::new(vmfloat::sin)));
        registry.add(&["cos"], Box::new(RealUnaryFn::new(vmfloat::cos)));
        registry.add(&["tan"], Box::new(RealUnaryFn::new(vmfloat::tan)));
        registry.add(&["asin"], Box::new(RealUnaryFn::new(vmfloat::asin)));
        registry.add(&["acos"], Box::new(RealUnaryFn::new(vmfloat::acos)));
        registry.add(&["atan"], Box::new(RealUnaryFn::new(vmfloat::atan)));

        let mut builtin_vars = BuiltinVars::default();
        builtin_vars.register_const_int("$NI_CB_TYPE_INIT", HandlerKind::Init as i64);
        builtin_vars.register_const_int("$NI_CB_TYPE_NOTE", HandlerKind::Note as i64);
        builtin_vars.register_const_int("$NI_CB_TYPE_RELEASE", HandlerKind::Release as i64);
        builtin_vars.register_const_int("$NI_CB_TYPE_CONTROLLER", HandlerKind::Controller as i64);
        builtin_vars.register_const_int("$NI_CB_TYPE_RPN", HandlerKind::Rpn as i64);
        builtin_vars.register_const_int("$NI_CB_TYPE_NRPN", HandlerKind::Nrpn as i64);
        builtin_vars.register_const_real("~NI_MATH_PI", std::f64::consts::PI);
        builtin_vars.register_const_real("~NI_MATH_E", std::f64::consts::E);
        builtin_vars.register_dyn_int("$NKSP_REAL_TIMER", Arc::new(RealTimerVar));
        builtin_vars.register_dyn_int("$NKSP_PERF_TIMER", Arc::new(PerfTimerVar));
        builtin_vars.register_dyn_int("$KSP_TIMER", Arc::new(RealTimerVar));

        ScriptVM {
            registry,
            config,
            exit_result_flag,
            sink: Box::new(TracingSink::new()),
            builtin_vars,
            builtin_conditions: HashSet::new(),
        }
    }

    /// Replace the diagnostic sink (script messages, runtime warnings and
    /// parse issue forwarding).
    pub fn set_sink(&mut self, sink: Box<dyn DiagnosticSink>) {
        self.sink = sink;
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: VmConfig) {
        self.exit_result_flag
            .store(config.exit_result_enabled, Ordering::Relaxed);
        self.config = config;
    }

    pub fn set_auto_suspend_enabled(&mut self, enabled: bool) {
        self.config.auto_suspend = enabled;
    }

    pub fn is_auto_suspend_enabled(&self) -> bool {
        self.config.auto_suspend
    }

    pub fn set_exit_result_enabled(&mut self, enabled: bool) {
        self.config.exit_result_enabled = enabled;
        self.exit_result_flag.store(enabled, Ordering::Relaxed);
    }

    pub fn is_exit_result_enabled(&self) -> bool {
        self.config.exit_result_enabled
    }

    /// Seed a built-in preprocessor condition (visible to all subsequently
    /// loaded scripts).
    pub fn add_preprocessor_condition(&mut self, name: &str) {
        self.builtin_conditions.insert(name.to_string());
    }

    // ---- host function and variable registration ------------------------

    /// Add an engine-specific built-in function (under one or more names).
    /// Affects scripts loaded afterwards.
    pub fn register_function(&mut self, names: &[&str], f: Box<dyn VmFunction>) -> FnId {
        self.registry.add(names, f)
    }

    pub fn function_by_name(&self, name: &str) -> Option<FnId> {
        self.registry.resolve(name)
    }

    pub fn register_const_int_variable(&mut self, name: &str, value: i64) {
        self.builtin_vars.register_const_int(name, value);
    }

    pub fn register_const_real_variable(&mut self, name: &str, value: vmfloat) {
        self.builtin_vars.register_const_real(name, value);
    }

    pub fn register_int_variable(&mut self, name: &str, ptr: Arc<dyn IntVarPtr>) {
        self.builtin_vars.register_int_ptr(name, ptr);
    }

    pub fn register_int8_array_variable(&mut self, name: &str, view: Arc<dyn Int8ArrayView>) {
        self.builtin_vars.register_int8_array(name, view);
    }

    pub fn register_dynamic_variable(&mut self, name: &str, var: Arc<dyn DynIntVar>) {
        self.builtin_vars.register_dyn_int(name, var);
    }

    // ---- loading ---------------------------------------------------------

    /// Parse a script. Always returns a script object so callers can
    /// inspect diagnostics; scripts with errors refuse execution.
    pub fn load_script(&mut self, source: &str, overrides: &PatchOverrides) -> Rc<ParsedScript> {
        self.load_script_internal(source, overrides, None)
    }

    /// Like [`ScriptVM::load_script`], additionally reporting the default
    /// initializer text of every `patch` variable found in the source.
    pub fn load_script_with_defaults(
        &mut self,
        source: &str,
        overrides: &PatchOverrides,
        defaults: &mut BTreeMap<String, String>,
    ) -> Rc<ParsedScript> {
        self.load_script_internal(source, overrides, Some(defaults))
    }

    fn load_script_internal(
        &mut self,
        source: &str,
        overrides: &PatchOverrides,
        mut defaults: Option<&mut BTreeMap<String, String>>,
    ) -> Rc<ParsedScript> {
        let first = self.parse_once(source);
        if first.has_errors()
            || first.patch_vars.is_empty()
            || (overrides.is_empty() && defaults.is_none())
        {
            return Rc::new(ParsedScript::from_output(first));
        }

        // substitution positions, back to front so earlier spans stay valid
        let mut by_pos: BTreeMap<usize, usize> = BTreeMap::new();
        for (i, pv) in first.patch_vars.iter().enumerate() {
            let pos = match &pv.expr_block {
                Some(block) => block.first_byte,
                None => pv.name_block.first_byte + pv.name_block.length_bytes,
            };
            by_pos.insert(pos, i);
            if let Some(defaults) = defaults.as_deref_mut() {
                let text = match &pv.expr_block {
                    Some(block) => {
                        source[block.first_byte..block.first_byte + block.length_bytes].to_string()
                    }
                    None => String::new(),
                };
                defaults.insert(pv.name.clone(), text);
            }
        }
        if overrides.is_empty() {
            return Rc::new(ParsedScript::from_output(first));
        }

        let mut patched = source.to_string();
        for (&pos, &i) in by_pos.iter().rev() {
            let pv = &first.patch_vars[i];
            let Some(value) = overrides.get(&pv.name) else {
                continue;
            };
            let len = pv.expr_block.map(|b| b.length_bytes).unwrap_or(0);
            let mut replacement = String::new();
            if len == 0 {
                replacement.push_str(" := ");
            }
            replacement.push_str(value);
            patched.replace_range(pos..pos + len, &replacement);
        }

        if patched != source {
            let second = self.parse_once(&patched);
            Rc::new(ParsedScript::from_output(second))
        } else {
            Rc::new(ParsedScript::from_output(first))
        }
    }

    fn parse_once(&mut self, source: &str) -> nkspc::ParseOutput {
        parse_script(
            source,
            &self.registry,
            &self.builtin_vars,
            &self.builtin_conditions,
            self.sink.as_mut(),
        )
    }

    // ---- execution -------------------------------------------------------

    /// Allocate a per-voice execution context sized for the given script.
    /// No further allocation happens when executing with it.
    pub fn create_exec_context(&self, script: &ParsedScript) -> ExecContext {
        let layout = script.program.layout;
        tracing::debug!(
            target: "nksp::vm",
            stack_size = script.required_stack_size(),
            poly_ints = layout.poly_ints,
            poly_reals = layout.poly_reals,
            poly_factors = layout.poly_factors,
            "created exec context"
        );
        ExecContext::new(
            script.required_stack_size(),
            layout.poly_ints,
            layout.poly_reals,
            layout.poly_factors,
        )
    }

    /// Run the given event handler until completion, suspension or error.
    /// A suspended context resumes in place on the next call.
    pub fn exec(
        &mut self,
        script: &ParsedScript,
        ctx: &mut ExecContext,
        handler: HandlerId,
    ) -> ExecStatus {
        if script.has_errors() {
            self.sink
                .runtime_error("refusing to execute a script with parse errors");
            return ExecStatus::NOT_RUNNING | ExecStatus::ERROR;
        }
        let Some(h) = script.program.handler(handler) else {
            return ExecStatus::NOT_RUNNING;
        };
        let handler_body = h.body;

        ctx.status = ExecStatus::RUNNING;
        ctx.exit_res = None;
        let mut flags = ctx.flags;
        let mut instructions: u64 = 0;

        // inside sync blocks (and with auto-suspend disabled) the budgets
        // are never checked; a resumed context may still hold sync frames
        let mut synced: i64 = if self.config.auto_suspend { 0 } else { 1 };
        for i in 0..=ctx.frame_idx() {
            if matches!(
                script.program.stmt_class(ctx.frame(i).stmt),
                StmtClass::Sync
            ) {
                synced += 1;
            }
        }

        if ctx.frame_idx() < 0 {
            ctx.push_frame(handler_body);
        }

        let mut env = ExecEnv {
            prog: &script.program,
            globals: &script.globals,
            host: &script.host,
            fns: self.registry.functions(),
            config: &self.config,
            ctx: &mut *ctx,
            sink: self.sink.as_mut(),
        };

        while flags == StmtFlags::SUCCESS && env.ctx.frame_idx() >= 0 {
            if env.ctx.take_abort() {
                env.sink.runtime_error("script execution aborted by host");
                flags = StmtFlags::ABORT | StmtFlags::ERROR;
                break;
            }
            let frame_idx = env.ctx.frame_idx();
            if frame_idx as usize >= env.ctx.stack_capacity() {
                env.sink.runtime_error("VM control stack overflow");
                flags = StmtFlags::ABORT | StmtFlags::ERROR;
                break;
            }
            let frame = env.ctx.frame(frame_idx);
            let prog = env.prog;

            match prog.stmt_class(frame.stmt) {
                StmtClass::Leaf => {
                    flags = eval::exec_leaf(&mut env, prog.stmt(frame.stmt));
                    env.ctx.pop_frame();
                }
                StmtClass::NoOp => {
                    env.ctx.pop_frame();
                }
                StmtClass::List => match prog.stmt(frame.stmt) {
                    Stmt::List { children } => {
                        let sub = frame.subindex as usize;
                        if sub < children.len() {
                            env.ctx.set_subindex(frame_idx, frame.subindex + 1);
                            env.ctx.push_frame(children[sub]);
                        } else {
                            env.ctx.pop_frame();
                        }
                    }
                    _ => env.ctx.pop_frame(),
                },
                StmtClass::Sub => match prog.stmt(frame.stmt) {
                    Stmt::Sub { body } => {
                        if frame.subindex == 0 {
                            env.ctx.set_subindex(frame_idx, 1);
                            env.ctx.push_frame(*body);
                        } else {
                            env.ctx.pop_frame();
                        }
                    }
                    _ => env.ctx.pop_frame(),
                },
                StmtClass::Branch => {
                    if frame.subindex < 0 {
                        env.ctx.pop_frame();
                    } else {
                        let selected = eval_branch(&mut env, frame.stmt);
                        match prog.branch(frame.stmt, selected) {
                            Some(body) => {
                                env.ctx.set_subindex(frame_idx, -1);
                                env.ctx.push_frame(body);
                            }
                            None => env.ctx.pop_frame(),
                        }
                    }
                }
                StmtClass::Loop => match prog.stmt(frame.stmt) {
                    Stmt::While { cond, body } => {
                        if eval::eval_int(&mut env, *cond).value != 0 {
                            env.ctx.push_frame(*body);
                            if flags == StmtFlags::SUCCESS
                                && synced == 0
                                && instructions > env.config.max_instructions_soft
                            {
                                flags = StmtFlags::SUSPEND;
                                env.ctx.suspend_microseconds = env.config.suspension_microseconds;
                            }
                        } else {
                            env.ctx.pop_frame();
                        }
                    }
                    _ => env.ctx.pop_frame(),
                },
                StmtClass::Sync => match prog.stmt(frame.stmt) {
                    Stmt::Sync { body } => {
                        if frame.subindex == 0 {
                            env.ctx.set_subindex(frame_idx, 1);
                            synced += 1;
                            env.ctx.push_frame(*body);
                        } else {
                            env.ctx.pop_frame();
                            synced -= 1;
                        }
                    }
                    _ => env.ctx.pop_frame(),
                },
            }

            if flags.contains(StmtFlags::RETURN) {
                flags.remove(StmtFlags::RETURN);
                // unwind to (and including) the innermost subroutine frame
                while env.ctx.frame_idx() >= 0 {
                    let fr = env.ctx.frame(env.ctx.frame_idx());
                    let class = prog.stmt_class(fr.stmt);
                    env.ctx.pop_frame();
                    match class {
                        StmtClass::Sync => synced -= 1,
                        StmtClass::Sub => break,
                        _ => {}
                    }
                }
            }

            if flags == StmtFlags::SUCCESS
                && synced == 0
                && instructions > env.config.max_instructions_hard
            {
                flags = StmtFlags::SUSPEND;
                env.ctx.suspend_microseconds = env.config.suspension_microseconds;
            }

            instructions += 1;
        }

        if flags.contains(StmtFlags::SUSPEND) && !flags.contains(StmtFlags::ABORT) {
            ctx.status = ExecStatus::SUSPENDED;
            ctx.flags = StmtFlags::SUCCESS;
        } else {
            ctx.status = if flags.contains(StmtFlags::ERROR) {
                ExecStatus::ERROR
            } else {
                ExecStatus::NOT_RUNNING
            };
            ctx.reset();
        }
        ctx.instructions_count = instructions;
        ctx.status
    }
}

impl Default for ScriptVM {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluate the selector of a branch statement: for `if` 0 selects the
/// then-branch and 1 the else-branch; for `select` the index of the first
/// matching case. -1 selects nothing.
fn eval_branch(env: &mut ExecEnv, stmt: nksp_core::StmtId) -> i64 {
    let prog = env.prog;
    match prog.stmt(stmt) {
        Stmt::If {
            cond, else_body, ..
        } => {
            if eval::eval_int(env, *cond).value != 0 {
                0
            } else if else_body.is_some() {
                1
            } else {
                -1
            }
        }
        Stmt::Select { value, cases } => {
            let v = eval::eval_int(env, *value).value;
            for (i, case) in cases.iter().enumerate() {
                let matched = match case.to {
                    Some(to) => {
                        eval::eval_int(env, case.from).value <= v
                            && eval::eval_int(env, to).value >= v
                    }
                    None => eval::eval_int(env, case.from).value == v,
                };
                if matched {
                    return i as i64;
                }
            }
            -1
        }
        _ => -1,
    }
}

