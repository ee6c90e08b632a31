//! End-to-end tests of the executor: suspension, budgets, sync blocks,
//! abort, polyphonic memory, handler dispatch, host registration, patch
//! variables and the preprocessor.

mod common;

use common::{expect_parse_error, run_script};
use nksp_core::DiagnosticSink;
use nksp_runtime::{
    ExecStatus, NO_MESSAGE_CONDITION, PatchOverrides, ScriptVM, VmConfig,
};
use nkspc::builtins::{Int8ArrayView, IntVarPtr};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI8, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

// ---- suspension ------------------------------------------------------------

#[test]
fn test_wait_suspends_and_resumes() {
    let mut run = run_script("on init\n wait(100)\n exit(1)\nend on");
    assert_eq!(run.status, ExecStatus::SUSPENDED);
    assert_eq!(run.ctx.suspension_microseconds(), 100);
    assert!(run.ctx.frame_idx() >= 0, "suspended frame must be kept");
    assert_eq!(run.resume(), ExecStatus::NOT_RUNNING);
    assert_eq!(run.exit_int(), 1);
    assert_eq!(run.ctx.frame_idx(), -1, "stack must be empty after return");
}

#[test]
fn test_wait_converts_seconds_to_microseconds() {
    let run = run_script("on init\n wait(1ms)\n exit(1)\nend on");
    assert_eq!(run.status, ExecStatus::SUSPENDED);
    assert_eq!(run.ctx.suspension_microseconds(), 1000);

    let run = run_script("on init\n wait(2s)\n exit(1)\nend on");
    assert_eq!(run.ctx.suspension_microseconds(), 2_000_000);
}

#[test]
fn test_wait_zero_and_negative_abort_with_error() {
    let run = run_script("on init\n wait(0)\n exit(1)\nend on");
    assert!(run.status.contains(ExecStatus::ERROR));
    assert!(run.ctx.exit_result().is_none());

    let run = run_script("on init\n wait(0 - 5)\n exit(1)\nend on");
    assert!(run.status.contains(ExecStatus::ERROR));
}

#[test]
fn test_wait_rejects_prefix_without_seconds_unit() {
    expect_parse_error("on init\n wait(10k)\nend on");
    expect_parse_error("on init\n wait(10Hz)\nend on");
}

// ---- instruction budgets ---------------------------------------------------

const LOOP_SCRIPT: &str = "on init
 declare $i
 while ($i < 1000)
  $i := $i + 1
 end while
 exit($i)
end on";

#[test]
fn test_loop_auto_suspends_under_budget() {
    let mut vm = ScriptVM::new();
    vm.set_exit_result_enabled(true);
    let script = vm.load_script(LOOP_SCRIPT, &Default::default());
    assert!(!script.has_errors());
    let mut ctx = vm.create_exec_context(&script);
    let handler = script.event_handler(0).unwrap();

    let mut status = vm.exec(&script, &mut ctx, handler);
    assert_eq!(status, ExecStatus::SUSPENDED);
    assert_eq!(ctx.suspension_microseconds(), 1000);

    let mut rounds = 0;
    while status == ExecStatus::SUSPENDED {
        rounds += 1;
        assert!(rounds < 1000, "script does not make progress");
        status = vm.exec(&script, &mut ctx, handler);
    }
    assert_eq!(status, ExecStatus::NOT_RUNNING);
    assert!(rounds > 1);
}

#[test]
fn test_sync_block_disables_auto_suspension() {
    let src = "on init
 declare $i
 sync
  while ($i < 1000)
   $i := $i + 1
  end while
 end sync
 exit($i)
end on";
    let mut vm = ScriptVM::new();
    vm.set_exit_result_enabled(true);
    let script = vm.load_script(src, &Default::default());
    assert!(!script.has_errors());
    let mut ctx = vm.create_exec_context(&script);
    let handler = script.event_handler(0).unwrap();
    // completes in a single call despite the budgets
    assert_eq!(vm.exec(&script, &mut ctx, handler), ExecStatus::NOT_RUNNING);
}

#[test]
fn test_budget_thresholds_are_configurable() {
    let mut config = VmConfig::default();
    config.max_instructions_soft = 10_000_000;
    config.max_instructions_hard = 10_000_000;
    config.exit_result_enabled = true;
    let mut vm = ScriptVM::with_config(config);
    let script = vm.load_script(LOOP_SCRIPT, &Default::default());
    let mut ctx = vm.create_exec_context(&script);
    let handler = script.event_handler(0).unwrap();
    assert_eq!(vm.exec(&script, &mut ctx, handler), ExecStatus::NOT_RUNNING);
}

#[test]
fn test_instruction_count_is_reported() {
    let run = run_script("on init\n exit(1)\nend on");
    assert!(run.ctx.instructions_count() > 0);
}

// ---- cancellation ----------------------------------------------------------

#[test]
fn test_signal_abort_terminates_with_error() {
    let mut vm = ScriptVM::new();
    vm.set_exit_result_enabled(true);
    let script = vm.load_script("on init\n exit(1)\nend on", &Default::default());
    let mut ctx = vm.create_exec_context(&script);
    ctx.signal_abort();
    let handler = script.event_handler(0).unwrap();
    let status = vm.exec(&script, &mut ctx, handler);
    assert!(status.contains(ExecStatus::ERROR));
    // the context stays usable for the next event
    let status = vm.exec(&script, &mut ctx, handler);
    assert_eq!(status, ExecStatus::NOT_RUNNING);
    assert_eq!(ctx.exit_result().is_some(), true);
}

// ---- polyphonic memory -----------------------------------------------------

const POLY_SCRIPT: &str = "on note
 declare polyphonic $x
 $x := $x + 1
 exit($x)
end on";

#[test]
fn test_polyphonic_state_persists_per_context() {
    let mut run = run_script(POLY_SCRIPT);
    assert_eq!(run.exit_int(), 1);
    let handler = run.script.event_handler(0).unwrap();
    run.exec_handler(handler);
    assert_eq!(run.exit_int(), 2);
    run.ctx.reset_polyphonic_data();
    run.exec_handler(handler);
    assert_eq!(run.exit_int(), 1);
}

#[test]
fn test_polyphonic_handoff_between_contexts() {
    let mut vm = ScriptVM::new();
    vm.set_auto_suspend_enabled(false);
    vm.set_exit_result_enabled(true);
    let script = vm.load_script(POLY_SCRIPT, &Default::default());
    let handler = script.event_handler(0).unwrap();

    let mut note_ctx = vm.create_exec_context(&script);
    vm.exec(&script, &mut note_ctx, handler);

    let mut release_ctx = vm.create_exec_context(&script);
    release_ctx.copy_polyphonic_data_from(&note_ctx);
    vm.exec(&script, &mut release_ctx, handler);
    match release_ctx.exit_result() {
        Some(nksp_runtime::ExitValue::Int { value, .. }) => assert_eq!(*value, 2),
        other => panic!("unexpected exit result {:?}", other),
    }
}

#[test]
fn test_globals_are_shared_between_contexts() {
    let src = "on note
 declare $g
 $g := $g + 1
 exit($g)
end on";
    let mut vm = ScriptVM::new();
    vm.set_auto_suspend_enabled(false);
    vm.set_exit_result_enabled(true);
    let script = vm.load_script(src, &Default::default());
    let handler = script.event_handler(0).unwrap();
    let mut a = vm.create_exec_context(&script);
    let mut b = vm.create_exec_context(&script);
    vm.exec(&script, &mut a, handler);
    vm.exec(&script, &mut b, handler);
    match b.exit_result() {
        Some(nksp_runtime::ExitValue::Int { value, .. }) => assert_eq!(*value, 2),
        other => panic!("unexpected exit result {:?}", other),
    }
}

// ---- handler table ---------------------------------------------------------

#[test]
fn test_handler_lookup_by_name_and_index() {
    let src = "on init
 exit(1)
end on

on note
 exit(2)
end on

on release
end on

on controller
end on

on rpn
end on

on nrpn
end on";
    let mut run = run_script(src);
    assert_eq!(run.script.event_handler_count(), 6);
    assert_eq!(run.exit_int(), 1);
    let note = run.script.event_handler_by_name("note").unwrap();
    run.exec_handler(note);
    assert_eq!(run.exit_int(), 2);
    assert!(run.script.event_handler_by_name("bogus").is_none());
}

#[test]
fn test_duplicate_handler_is_error() {
    expect_parse_error("on init\nend on\non init\nend on");
}

// ---- host registration -----------------------------------------------------

struct HostInt {
    value: AtomicI64,
    readonly: bool,
}

impl IntVarPtr for HostInt {
    fn eval(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    fn assign(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    fn is_readonly(&self) -> bool {
        self.readonly
    }
}

#[test]
fn test_registered_int_variable_is_readable_and_writable() {
    let host_var = Arc::new(HostInt {
        value: AtomicI64::new(7),
        readonly: false,
    });
    let mut vm = ScriptVM::new();
    vm.set_auto_suspend_enabled(false);
    vm.set_exit_result_enabled(true);
    vm.register_int_variable("$HOST_X", host_var.clone());
    let script = vm.load_script(
        "on init\n declare $seen := $HOST_X\n $HOST_X := 11\n exit($seen)\nend on",
        &Default::default(),
    );
    assert!(!script.has_errors());
    let mut ctx = vm.create_exec_context(&script);
    let handler = script.event_handler(0).unwrap();
    vm.exec(&script, &mut ctx, handler);
    match ctx.exit_result() {
        Some(nksp_runtime::ExitValue::Int { value, .. }) => assert_eq!(*value, 7),
        other => panic!("unexpected exit result {:?}", other),
    }
    assert_eq!(host_var.value.load(Ordering::Relaxed), 11);
}

#[test]
fn test_readonly_registered_variable_rejects_assignment() {
    let mut vm = ScriptVM::new();
    vm.register_int_variable(
        "$HOST_RO",
        Arc::new(HostInt {
            value: AtomicI64::new(0),
            readonly: true,
        }),
    );
    let script = vm.load_script("on init\n $HOST_RO := 1\nend on", &Default::default());
    assert!(script.has_errors());
}

struct HostBytes {
    data: Vec<AtomicI8>,
}

impl Int8ArrayView for HostBytes {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn get(&self, i: usize) -> i8 {
        self.data[i].load(Ordering::Relaxed)
    }

    fn set(&self, i: usize, value: i8) {
        self.data[i].store(value, Ordering::Relaxed);
    }
}

#[test]
fn test_registered_int8_array_view() {
    let bytes = Arc::new(HostBytes {
        data: (0..4).map(|i| AtomicI8::new(i as i8 * 10)).collect(),
    });
    let mut vm = ScriptVM::new();
    vm.set_auto_suspend_enabled(false);
    vm.set_exit_result_enabled(true);
    vm.register_int8_array_variable("%HOST_BYTES", bytes.clone());
    let script = vm.load_script(
        "on init\n %HOST_BYTES[0] := 5\n exit(%HOST_BYTES[0] + %HOST_BYTES[3])\nend on",
        &Default::default(),
    );
    assert!(!script.has_errors());
    let mut ctx = vm.create_exec_context(&script);
    let handler = script.event_handler(0).unwrap();
    vm.exec(&script, &mut ctx, handler);
    match ctx.exit_result() {
        Some(nksp_runtime::ExitValue::Int { value, .. }) => assert_eq!(*value, 35),
        other => panic!("unexpected exit result {:?}", other),
    }
    assert_eq!(bytes.data[0].load(Ordering::Relaxed), 5);
}

// ---- diagnostics sink ------------------------------------------------------

#[derive(Clone, Default)]
struct SharedSink {
    messages: Arc<Mutex<Vec<String>>>,
}

impl DiagnosticSink for SharedSink {
    fn script_message(&mut self, text: &str) {
        self.messages.lock().unwrap().push(text.to_string());
    }

    fn runtime_warning(&mut self, _text: &str) {}

    fn runtime_error(&mut self, _text: &str) {}
}

#[test]
fn test_message_output_goes_to_sink() {
    let sink = SharedSink::default();
    let messages = sink.messages.clone();
    let mut vm = ScriptVM::new();
    vm.set_sink(Box::new(sink));
    let script = vm.load_script(
        "on init\n message(\"hello \" & 42)\nend on",
        &Default::default(),
    );
    assert!(!script.has_errors());
    let mut ctx = vm.create_exec_context(&script);
    let handler = script.event_handler(0).unwrap();
    vm.exec(&script, &mut ctx, handler);
    assert_eq!(messages.lock().unwrap().as_slice(), ["hello 42"]);
}

#[test]
fn test_no_message_condition_elides_calls() {
    let sink = SharedSink::default();
    let messages = sink.messages.clone();
    let mut vm = ScriptVM::new();
    vm.set_sink(Box::new(sink));
    vm.add_preprocessor_condition(NO_MESSAGE_CONDITION);
    let script = vm.load_script("on init\n message(\"quiet\")\nend on", &Default::default());
    assert!(!script.has_errors());
    let mut ctx = vm.create_exec_context(&script);
    let handler = script.event_handler(0).unwrap();
    vm.exec(&script, &mut ctx, handler);
    assert!(messages.lock().unwrap().is_empty());
}

// ---- preprocessor ----------------------------------------------------------

#[test]
fn test_preprocessor_selects_code_path() {
    let src = "SET_CONDITION(FAST)
on init
USE_CODE_IF(FAST)
 exit(1)
END_USE_CODE
USE_CODE_IF_NOT(FAST)
 exit(2)
END_USE_CODE
end on";
    let run = run_script(src);
    assert_eq!(run.exit_int(), 1);
    assert_eq!(run.script.preprocessor_elisions().len(), 1);
}

// ---- patch variables -------------------------------------------------------

#[test]
fn test_patch_variable_override() {
    let src = "on init\n declare patch $gain := 100\n exit($gain)\nend on";
    let mut vm = ScriptVM::new();
    vm.set_auto_suspend_enabled(false);
    vm.set_exit_result_enabled(true);

    let script = vm.load_script(src, &Default::default());
    let mut ctx = vm.create_exec_context(&script);
    let handler = script.event_handler(0).unwrap();
    vm.exec(&script, &mut ctx, handler);
    match ctx.exit_result() {
        Some(nksp_runtime::ExitValue::Int { value, .. }) => assert_eq!(*value, 100),
        other => panic!("unexpected exit result {:?}", other),
    }

    let mut overrides = PatchOverrides::new();
    overrides.insert("$gain".to_string(), "127".to_string());
    let script = vm.load_script(src, &overrides);
    assert!(!script.has_errors());
    let mut ctx = vm.create_exec_context(&script);
    let handler = script.event_handler(0).unwrap();
    vm.exec(&script, &mut ctx, handler);
    match ctx.exit_result() {
        Some(nksp_runtime::ExitValue::Int { value, .. }) => assert_eq!(*value, 127),
        other => panic!("unexpected exit result {:?}", other),
    }
}

#[test]
fn test_patch_variable_defaults_are_reported() {
    let src = "on init\n declare patch $gain := 100\n declare patch $pan\n exit($gain)\nend on";
    let mut vm = ScriptVM::new();
    vm.set_exit_result_enabled(true);
    let mut defaults = BTreeMap::new();
    let script = vm.load_script_with_defaults(src, &Default::default(), &mut defaults);
    assert!(!script.has_errors());
    assert_eq!(defaults.get("$gain").map(String::as_str), Some("100"));
    assert_eq!(defaults.get("$pan").map(String::as_str), Some(""));
}

#[test]
fn test_patch_variable_without_initializer_gets_one_appended() {
    let src = "on init\n declare patch $x\n exit($x)\nend on";
    let mut vm = ScriptVM::new();
    vm.set_auto_suspend_enabled(false);
    vm.set_exit_result_enabled(true);
    let mut overrides = PatchOverrides::new();
    overrides.insert("$x".to_string(), "5".to_string());
    let script = vm.load_script(src, &overrides);
    assert!(!script.has_errors());
    let mut ctx = vm.create_exec_context(&script);
    let handler = script.event_handler(0).unwrap();
    vm.exec(&script, &mut ctx, handler);
    match ctx.exit_result() {
        Some(nksp_runtime::ExitValue::Int { value, .. }) => assert_eq!(*value, 5),
        other => panic!("unexpected exit result {:?}", other),
    }
}

#[test]
fn test_patch_array_override_replaces_initializer_list() {
    let src = "on init\n declare patch %a[3] := ( 1, 2, 3 )\n exit(%a[0])\nend on";
    let mut vm = ScriptVM::new();
    vm.set_auto_suspend_enabled(false);
    vm.set_exit_result_enabled(true);
    let mut overrides = PatchOverrides::new();
    overrides.insert("%a".to_string(), "( 7, 8, 9 )".to_string());
    let script = vm.load_script(src, &overrides);
    assert!(!script.has_errors());
    let mut ctx = vm.create_exec_context(&script);
    let handler = script.event_handler(0).unwrap();
    vm.exec(&script, &mut ctx, handler);
    match ctx.exit_result() {
        Some(nksp_runtime::ExitValue::Int { value, .. }) => assert_eq!(*value, 7),
        other => panic!("unexpected exit result {:?}", other),
    }
}

// ---- error handling --------------------------------------------------------

#[test]
fn test_script_with_parse_errors_is_loadable_but_not_executable() {
    let mut vm = ScriptVM::new();
    let script = vm.load_script("on init\n exit(\nend on", &Default::default());
    assert!(script.has_errors());
    let mut ctx = vm.create_exec_context(&script);
    let status = vm.exec(&script, &mut ctx, nksp_runtime::HandlerId(0));
    assert!(status.contains(ExecStatus::ERROR));
    assert!(!status.contains(ExecStatus::SUSPENDED));
}

#[test]
fn test_exit_argument_requires_enabled_exit_result() {
    let mut vm = ScriptVM::new();
    // exit results are disabled by default, as in production
    let script = vm.load_script("on init\n exit(42)\nend on", &Default::default());
    assert!(script.has_errors());
    let script = vm.load_script("on init\n exit\nend on", &Default::default());
    assert!(!script.has_errors());
}

#[test]
fn test_warnings_do_not_block_execution() {
    let mut vm = ScriptVM::new();
    vm.set_auto_suspend_enabled(false);
    vm.set_exit_result_enabled(true);
    let script = vm.load_script("on init\n exit(!1 + 2)\nend on", &Default::default());
    assert!(!script.has_errors());
    assert!(!script.warnings().is_empty());
    let mut ctx = vm.create_exec_context(&script);
    let handler = script.event_handler(0).unwrap();
    assert_eq!(vm.exec(&script, &mut ctx, handler), ExecStatus::NOT_RUNNING);
}
