//! Front-end tests that run the parser without any VM: memory layout,
//! diagnostics collection, constant folding, stack size computation and
//! patch-variable span recording.

use nksp_core::{FnId, NullSink};
use nkspc::ast::ExprType;
use nkspc::builtins::{FunctionProvider, VmFunction};
use nkspc::{BuiltinVars, ParseOutput, parse_script};
use std::collections::HashSet;

/// Provider without any built-in functions; scripts under test use none.
struct NoFns;

impl FunctionProvider for NoFns {
    fn resolve(&self, _name: &str) -> Option<FnId> {
        None
    }

    fn function(&self, _id: FnId) -> &dyn VmFunction {
        unreachable!("no functions are registered")
    }
}

fn parse(source: &str) -> ParseOutput {
    let mut sink = NullSink;
    parse_script(
        source,
        &NoFns,
        &BuiltinVars::default(),
        &HashSet::new(),
        &mut sink,
    )
}

fn parse_ok(source: &str) -> ParseOutput {
    let out = parse(source);
    for issue in &out.issues {
        eprintln!("{}", issue);
    }
    assert!(!out.has_errors(), "unexpected parse error");
    out
}

#[test]
fn test_empty_handler_parses() {
    let out = parse_ok("on init\nend on");
    assert_eq!(out.program.handlers.len(), 1);
    assert!(out.program.required_stack_size >= 2);
}

#[test]
fn test_memory_layout_counts_scalars_and_arrays() {
    let out = parse_ok(
        "on init
 declare $a
 declare $b
 declare ~r
 declare @s
 declare %arr[4]
 declare polyphonic $p
end on",
    );
    let layout = out.program.layout;
    // two global ints plus four array elements
    assert_eq!(layout.global_ints, 6);
    assert_eq!(layout.global_reals, 1);
    assert_eq!(layout.global_strs, 1);
    // every numeric slot owns a unit factor slot
    assert_eq!(
        layout.global_factors,
        layout.global_ints + layout.global_reals
    );
    assert_eq!(layout.poly_ints, 1);
    assert_eq!(layout.poly_factors, 1);
}

#[test]
fn test_const_variables_occupy_no_slots() {
    let out = parse_ok("on init\n declare const $n := 4\nend on");
    assert_eq!(out.program.layout.global_ints, 0);
    assert_eq!(out.program.layout.global_factors, 0);
}

#[test]
fn test_array_size_folds_const_expressions() {
    let out = parse_ok(
        "on init
 declare const $n := 3
 declare %a[$n + 1]
end on",
    );
    assert_eq!(out.program.layout.global_ints, 4);
}

#[test]
fn test_stack_size_grows_with_nesting() {
    let flat = parse_ok("on init\n declare $a\n $a := 1\nend on");
    let nested = parse_ok(
        "on init
 declare $a
 while ($a < 3)
  if ($a > 1)
   $a := $a + 1
  end if
 end while
end on",
    );
    assert!(
        nested.program.required_stack_size > flat.program.required_stack_size,
        "nesting must increase the required stack size"
    );
}

#[test]
fn test_multiple_errors_are_collected() {
    let out = parse(
        "on init
 $undeclared := 1
 declare $a := \"text\"
 exit(1)
end on",
    );
    // undeclared variable, initializer type mismatch, unknown function
    assert!(out.errors().count() >= 3);
}

#[test]
fn test_unterminated_string_is_reported() {
    let out = parse("on init\n declare @s := \"oops\nend on");
    assert!(out.has_errors());
}

#[test]
fn test_unknown_handler_name_is_error() {
    let out = parse("on bogus\nend on");
    assert!(out.has_errors());
}

#[test]
fn test_patch_variable_spans_point_at_initializer() {
    let source = "on init\n declare patch $gain := 100\nend on";
    let out = parse_ok(source);
    assert_eq!(out.patch_vars.len(), 1);
    let pv = &out.patch_vars[0];
    assert_eq!(pv.name, "$gain");
    let name_text = &source[pv.name_block.first_byte
        ..pv.name_block.first_byte + pv.name_block.length_bytes];
    assert_eq!(name_text, "$gain");
    let block = pv.expr_block.expect("initializer span");
    assert_eq!(&source[block.first_byte..block.first_byte + block.length_bytes], "100");
}

#[test]
fn test_expression_annotations() {
    let out = parse_ok("on init\n declare $a := 1s + 2s\nend on");
    // the initializer expression carries the unit type of its operands
    let info = out
        .program
        .infos
        .iter()
        .find(|i| i.ty == ExprType::Int && i.unit == nksp_core::UnitType::Second);
    assert!(info.is_some());
}

#[test]
fn test_preprocessor_elisions_have_spans() {
    let out = parse_ok(
        "on init
USE_CODE_IF_NOT(MISSING)
 declare $a
END_USE_CODE
end on",
    );
    // USE_CODE_IF_NOT on an unset condition keeps the block, so nothing is
    // elided here
    assert!(out.elisions.is_empty());
    let out = parse_ok(
        "on init
USE_CODE_IF(MISSING)
 declare $a
END_USE_CODE
end on",
    );
    assert_eq!(out.elisions.len(), 1);
    assert!(out.elisions[0].length_bytes > 0);
}
