//! Shared helpers for the end-to-end script tests.

use nksp_core::{ExitValue, UnitType, vmfloat, vmint};
use nksp_runtime::{ExecContext, ExecStatus, HandlerId, ParsedScript, ScriptVM};
use std::rc::Rc;

pub struct Run {
    pub vm: ScriptVM,
    pub script: Rc<ParsedScript>,
    pub ctx: ExecContext,
    pub status: ExecStatus,
}

/// Load the script and run its first event handler, with auto-suspension
/// disabled and the exit-result feature enabled (the configuration the
/// original engine test suite uses). Panics on parse errors.
pub fn run_script(source: &str) -> Run {
    let mut vm = ScriptVM::new();
    vm.set_auto_suspend_enabled(false);
    vm.set_exit_result_enabled(true);
    let script = vm.load_script(source, &Default::default());
    for issue in script.issues() {
        eprintln!("{}", issue);
    }
    assert!(!script.has_errors(), "unexpected parse error");
    let mut ctx = vm.create_exec_context(&script);
    let handler = script.event_handler(0).expect("script has no handler");
    let status = vm.exec(&script, &mut ctx, handler);
    Run {
        vm,
        script,
        ctx,
        status,
    }
}

/// Parse only; returns the script so tests can inspect diagnostics.
pub fn parse(source: &str) -> Rc<ParsedScript> {
    let mut vm = ScriptVM::new();
    vm.set_exit_result_enabled(true);
    vm.load_script(source, &Default::default())
}

pub fn expect_parse_error(source: &str) {
    let script = parse(source);
    assert!(
        script.has_errors(),
        "expected a parse error for:\n{}",
        source
    );
}

pub fn expect_parse_warning(source: &str) {
    let script = parse(source);
    assert!(!script.has_errors(), "unexpected parse error");
    assert!(
        !script.warnings().is_empty(),
        "expected a parse warning for:\n{}",
        source
    );
}

impl Run {
    pub fn exit_int(&self) -> vmint {
        match self.ctx.exit_result() {
            Some(ExitValue::Int { value, .. }) => *value,
            other => panic!("expected integer exit result, got {:?}", other),
        }
    }

    pub fn exit_real(&self) -> vmfloat {
        match self.ctx.exit_result() {
            Some(ExitValue::Real { value, .. }) => *value,
            other => panic!("expected real exit result, got {:?}", other),
        }
    }

    pub fn exit_str(&self) -> &str {
        match self.ctx.exit_result() {
            Some(ExitValue::Str(s)) => s,
            other => panic!("expected string exit result, got {:?}", other),
        }
    }

    pub fn exit_unit(&self) -> UnitType {
        match self.ctx.exit_result() {
            Some(ExitValue::Int { unit, .. }) | Some(ExitValue::Real { unit, .. }) => *unit,
            other => panic!("expected numeric exit result, got {:?}", other),
        }
    }

    pub fn exit_factor(&self) -> vmfloat {
        match self.ctx.exit_result() {
            Some(ExitValue::Int { factor, .. }) | Some(ExitValue::Real { factor, .. }) => *factor,
            other => panic!("expected numeric exit result, got {:?}", other),
        }
    }

    pub fn exit_final(&self) -> bool {
        match self.ctx.exit_result() {
            Some(ExitValue::Int { is_final, .. }) | Some(ExitValue::Real { is_final, .. }) => {
                *is_final
            }
            other => panic!("expected numeric exit result, got {:?}", other),
        }
    }

    /// Resume a suspended execution.
    pub fn resume(&mut self) -> ExecStatus {
        let handler = self.script.event_handler(0).unwrap();
        self.status = self.vm.exec(&self.script, &mut self.ctx, handler);
        self.status
    }

    pub fn exec_handler(&mut self, handler: HandlerId) -> ExecStatus {
        self.status = self.vm.exec(&self.script, &mut self.ctx, handler);
        self.status
    }
}
