//! End-to-end tests of the core language: operators, units, finalness,
//! control flow and the built-in functions, asserted through the captured
//! exit result.

mod common;

use common::{expect_parse_error, expect_parse_warning, run_script};
use nksp_core::{UnitType, fequal};

// ---- exit() and plain values ----------------------------------------------

#[test]
fn test_exit_plain_int() {
    let run = run_script("on init\n exit(42)\nend on");
    assert_eq!(run.exit_int(), 42);
    assert_eq!(run.exit_unit(), UnitType::None);
    assert_eq!(run.exit_factor(), 1.0);
    assert!(!run.exit_final());
}

#[test]
fn test_exit_with_unit_and_prefix() {
    let run = run_script("on init\n exit(42kHz)\nend on");
    assert_eq!(run.exit_int(), 42);
    assert_eq!(run.exit_unit(), UnitType::Hertz);
    assert_eq!(run.exit_factor(), 1e3);
    assert!(!run.exit_final());
}

#[test]
fn test_exit_final_negative() {
    let run = run_script("on init\n exit(!-58)\nend on");
    assert_eq!(run.exit_int(), -58);
    assert!(run.exit_final());
}

#[test]
fn test_exit_string() {
    let run = run_script("on init\n exit(\"hello\")\nend on");
    assert_eq!(run.exit_str(), "hello");
}

#[test]
fn test_exit_without_result_leaves_none() {
    let run = run_script("on init\n exit\nend on");
    assert!(run.ctx.exit_result().is_none());
}

// ---- variables and assignment ---------------------------------------------

#[test]
fn test_variable_roundtrip() {
    let run = run_script("on init\n declare $foo := 42\n exit($foo)\nend on");
    assert_eq!(run.exit_int(), 42);
    assert!(!run.exit_final());
}

#[test]
fn test_final_variable_declaration() {
    let run = run_script("on init\n declare $foo := !42\n exit($foo)\nend on");
    assert_eq!(run.exit_int(), 42);
    assert!(run.exit_final());
}

#[test]
fn test_final_mismatch_on_assignment_is_error() {
    expect_parse_error("on init\n declare ~f := !0.0mdB\n ~f := 3.14mdB\nend on");
    expect_parse_error("on init\n declare ~f := 0.0mdB\n ~f := !3.14mdB\nend on");
}

#[test]
fn test_unit_type_is_fixed_per_variable() {
    expect_parse_error("on init\n declare ~f := 0.0dB\n ~f := -0.1Hz\n exit(~f)\nend on");
}

#[test]
fn test_assignment_type_mismatch_is_error() {
    expect_parse_error("on init\n declare $i := 1\n $i := 1.5\nend on");
    expect_parse_error("on init\n declare @s := \"x\"\n @s := 5\nend on");
}

#[test]
fn test_const_variable() {
    let run = run_script("on init\n declare const $n := 5 + 3\n exit($n)\nend on");
    assert_eq!(run.exit_int(), 8);
    expect_parse_error("on init\n declare const $n := 5\n $n := 6\nend on");
    expect_parse_error("on init\n declare $x\n declare const $n := $x\nend on");
}

#[test]
fn test_undeclared_and_redeclared_variables() {
    expect_parse_error("on init\n $nope := 1\nend on");
    expect_parse_error("on init\n declare $a\n declare $a\nend on");
}

// ---- units in arithmetic ---------------------------------------------------

#[test]
fn test_sub_adopts_smaller_prefix_factor() {
    let run = run_script("on init\n exit(1s - 145ms)\nend on");
    assert_eq!(run.exit_int(), 855);
    assert_eq!(run.exit_unit(), UnitType::Second);
    assert_eq!(run.exit_factor(), 1e-3);
}

#[test]
fn test_mixed_unit_types_in_add_is_error() {
    expect_parse_error("on init\n exit(1s + 1Hz)\nend on");
}

#[test]
fn test_mul_combines_factors() {
    let run = run_script("on init\n exit(2k * 3)\nend on");
    assert_eq!(run.exit_int(), 6);
    assert_eq!(run.exit_factor(), 1e3);
}

#[test]
fn test_mul_rejects_units_on_both_sides() {
    expect_parse_error("on init\n exit(1s * 1s)\nend on");
}

#[test]
fn test_div_cancels_shared_unit() {
    let run = run_script("on init\n exit(10s / 2s)\nend on");
    assert_eq!(run.exit_int(), 5);
    assert_eq!(run.exit_unit(), UnitType::None);
}

#[test]
fn test_division_by_zero_yields_zero() {
    let run = run_script("on init\n declare $z\n exit(10 / $z)\nend on");
    assert_eq!(run.exit_int(), 0);
    assert!(!run.status.contains(nksp_runtime::ExecStatus::ERROR));
}

// ---- real number equality tolerance ---------------------------------------

#[test]
fn test_real_equality_tolerates_rounding() {
    let run = run_script(
        "on init\n declare ~a := 0.165\n declare ~b := 0.185\n exit(~a + ~b = 0.35)\nend on",
    );
    assert_eq!(run.exit_int(), 1);
}

#[test]
fn test_real_ordering_is_strict() {
    let run = run_script(
        "on init\n declare ~a := 0.165\n declare ~b := 0.185\n exit(~a + ~b > 0.35)\nend on",
    );
    assert_eq!(run.exit_int(), 0);
}

// ---- mod, bitwise and logical operators ------------------------------------

#[test]
fn test_mod() {
    let run = run_script("on init\n exit(10 mod 8)\nend on");
    assert_eq!(run.exit_int(), 2);
}

#[test]
fn test_mod_restrictions() {
    expect_parse_error("on init\n exit(10.0 mod 8.0)\nend on");
    expect_parse_error("on init\n exit(10 mod 8.0)\nend on");
    expect_parse_error("on init\n exit(10s mod 8)\nend on");
    expect_parse_error("on init\n exit(10 mod 8s)\nend on");
}

#[test]
fn test_mod_accepts_final_operands() {
    let run = run_script("on init\n exit(!10 mod !8)\nend on");
    assert_eq!(run.exit_int(), 2);
    assert!(run.exit_final());
}

#[test]
fn test_bitwise_operators() {
    assert_eq!(run_script("on init\n exit(43 .and. 142)\nend on").exit_int(), 10);
    assert_eq!(run_script("on init\n exit(43 .or. 142)\nend on").exit_int(), 175);
    assert_eq!(run_script("on init\n exit(.not. 0)\nend on").exit_int(), -1);
}

#[test]
fn test_logical_operators_return_bool_ints() {
    assert_eq!(run_script("on init\n exit(43 and 142)\nend on").exit_int(), 1);
    assert_eq!(run_script("on init\n exit(0 and 1)\nend on").exit_int(), 0);
    assert_eq!(run_script("on init\n exit(0 or 0)\nend on").exit_int(), 0);
    assert_eq!(run_script("on init\n exit(not 0)\nend on").exit_int(), 1);
    assert_eq!(run_script("on init\n exit(not 7)\nend on").exit_int(), 0);
}

#[test]
fn test_bitwise_rejects_reals_and_units() {
    expect_parse_error("on init\n exit(1.0 .and. 1)\nend on");
    expect_parse_error("on init\n exit(1s .and. 1)\nend on");
}

// ---- control flow ----------------------------------------------------------

#[test]
fn test_if_else() {
    let src = "on init
 declare $a := 5
 if ($a > 3)
  exit(1)
 else
  exit(2)
 end if
end on";
    assert_eq!(run_script(src).exit_int(), 1);
}

#[test]
fn test_while_loop_sums() {
    let src = "on init
 declare $i
 declare $sum
 while ($i < 100)
  $sum := $sum + $i
  $i := $i + 1
 end while
 exit($sum)
end on";
    assert_eq!(run_script(src).exit_int(), 4950);
}

#[test]
fn test_select_case_values_and_ranges() {
    let src = "on init
 declare $x := 6
 select $x
 case 1
  exit(10)
 case 4 to 7
  exit(20)
 case 8
  exit(30)
 end select
 exit(40)
end on";
    assert_eq!(run_script(src).exit_int(), 20);
}

#[test]
fn test_select_without_match_falls_through() {
    let src = "on init
 declare $x := 99
 select $x
 case 1
  exit(10)
 end select
 exit(40)
end on";
    assert_eq!(run_script(src).exit_int(), 40);
}

// ---- user functions --------------------------------------------------------

#[test]
fn test_exit_returns_from_user_function_only() {
    let src = "function doFoo
 exit(2)
end function

on init
 call doFoo
 exit(3)
end on";
    assert_eq!(run_script(src).exit_int(), 3);
}

#[test]
fn test_nested_user_function_calls() {
    let src = "function doFoo1
 exit(2)
end function

function doFoo2
 call doFoo1
 exit(3)
end function

on init
 call doFoo2
 exit(4)
end on";
    assert_eq!(run_script(src).exit_int(), 4);
}

#[test]
fn test_exit_in_handler_stops_handler() {
    let src = "function doFoo
 exit(2)
end function

on init
 call doFoo
 exit(3)
 call doFoo
 exit(4)
end on";
    assert_eq!(run_script(src).exit_int(), 3);
}

#[test]
fn test_call_of_undefined_function_is_error() {
    expect_parse_error("on init\n call doesNotExist\nend on");
}

#[test]
fn test_recursion_is_rejected() {
    expect_parse_error("function f\n call f\nend function\non init\n call f\nend on");
}

// ---- string concatenation --------------------------------------------------

#[test]
fn test_concat_with_numeric_casts() {
    let run = run_script("on init\n exit(\"foo\" & \" bar\" & \" \" & 123)\nend on");
    assert_eq!(run.exit_str(), "foo bar 123");
    let run = run_script("on init\n declare ~r := 1.25\n exit(\"v=\" & ~r)\nend on");
    assert_eq!(run.exit_str(), "v=1.25");
}

#[test]
fn test_concat_renders_units() {
    let run = run_script("on init\n exit(\"\" & 12kHz)\nend on");
    assert_eq!(run.exit_str(), "12kHz");
}

#[test]
fn test_string_comparison() {
    assert_eq!(
        run_script("on init\n exit(\"foo\" = \"foo\")\nend on").exit_int(),
        1
    );
    assert_eq!(
        run_script("on init\n exit(\"foo\" # \"bar\")\nend on").exit_int(),
        1
    );
    expect_parse_error("on init\n exit(\"foo\" < \"bar\")\nend on");
}

// ---- arrays ----------------------------------------------------------------

#[test]
fn test_array_init_and_element_access() {
    let src = "on init
 declare %a[3] := ( 12, 23, 34 )
 exit(%a[1])
end on";
    assert_eq!(run_script(src).exit_int(), 23);
}

#[test]
fn test_array_out_of_range_reads_zero() {
    let run = run_script("on init\n declare %a[3] := ( 1, 2, 3 )\n exit(%a[5])\nend on");
    assert_eq!(run.exit_int(), 0);
    assert!(!run.status.contains(nksp_runtime::ExecStatus::ERROR));
}

#[test]
fn test_array_out_of_range_store_is_discarded() {
    let src = "on init
 declare %a[3] := ( 1, 2, 3 )
 %a[5] := 99
 exit(%a[0])
end on";
    assert_eq!(run_script(src).exit_int(), 1);
}

#[test]
fn test_array_size_must_be_const() {
    expect_parse_error("on init\n declare $n := 3\n declare %a[$n]\nend on");
    expect_parse_error("on init\n declare %a[0]\nend on");
}

#[test]
fn test_array_rejects_polyphonic_and_units() {
    expect_parse_error("on init\n declare polyphonic %a[3]\nend on");
    expect_parse_error("on init\n declare %a[3] := ( 1s, 2, 3 )\nend on");
}

#[test]
fn test_num_elements() {
    let run = run_script("on init\n declare ?r[5]\n exit(num_elements(?r))\nend on");
    assert_eq!(run.exit_int(), 5);
}

#[test]
fn test_sort_descending() {
    let src = "on init
 declare %a[3] := ( 1, 2, 3 )
 sort(%a, 1)
 exit(%a[0])
end on";
    assert_eq!(run_script(src).exit_int(), 3);
}

#[test]
fn test_sort_ascending_orders_by_effective_value() {
    // 2k (factor 1000) is effectively larger than 500
    let src = "on init
 declare %a[3] := ( 2k, 500, 1 )
 sort(%a, 0)
 exit(%a[2])
end on";
    assert_eq!(run_script(src).exit_int(), 2);
}

#[test]
fn test_search_finds_first_index() {
    let src = "on init
 declare %a[4] := ( 5, 7, 7, 9 )
 exit(search(%a, 7))
end on";
    assert_eq!(run_script(src).exit_int(), 1);
    let src = "on init
 declare %a[2] := ( 5, 7 )
 exit(search(%a, 8))
end on";
    assert_eq!(run_script(src).exit_int(), -1);
}

#[test]
fn test_array_equal_is_factor_aware() {
    let src = "on init
 declare %a[2] := ( 1k, 2 )
 declare %b[2] := ( 1000, 2 )
 exit(array_equal(%a, %b))
end on";
    assert_eq!(run_script(src).exit_int(), 1);
}

#[test]
fn test_array_equal_different_sizes_warns_and_is_false() {
    let src = "on init
 declare %a[2] := ( 1, 2 )
 declare %b[3] := ( 1, 2, 3 )
 exit(array_equal(%a, %b))
end on";
    expect_parse_warning(src);
    assert_eq!(run_script(src).exit_int(), 0);
}

#[test]
fn test_string_array_elements() {
    let src = "on init
 declare !names[2] := ( \"bob\", \"eve\" )
 !names[0] := \"alice\"
 exit(!names[0] & \" \" & !names[1])
end on";
    assert_eq!(run_script(src).exit_str(), "alice eve");
}

// ---- built-in functions ----------------------------------------------------

#[test]
fn test_inc_dec() {
    let run = run_script("on init\n declare $foo := 5\n inc($foo)\n exit(inc($foo))\nend on");
    assert_eq!(run.exit_int(), 7);
    let run = run_script("on init\n declare $foo := 5\n dec($foo)\n exit($foo)\nend on");
    assert_eq!(run.exit_int(), 4);
}

#[test]
fn test_inc_warns_on_unit_operand() {
    expect_parse_warning("on init\n declare $t := 5s\n inc($t)\n exit($t)\nend on");
}

#[test]
fn test_inc_requires_assignable_operand() {
    expect_parse_error("on init\n exit(inc(5))\nend on");
    expect_parse_error("on init\n declare const $c := 1\n inc($c)\nend on");
}

#[test]
fn test_abs() {
    assert_eq!(run_script("on init\n exit(abs(-23))\nend on").exit_int(), 23);
    let run = run_script("on init\n exit(abs(-1.5))\nend on");
    assert!(fequal(run.exit_real(), 1.5));
}

#[test]
fn test_min_max() {
    assert_eq!(run_script("on init\n exit(min(3, 7))\nend on").exit_int(), 3);
    assert_eq!(run_script("on init\n exit(max(3, 7))\nend on").exit_int(), 7);
    // 1k is effectively 1000, so it wins over 500
    let run = run_script("on init\n exit(max(1k, 500))\nend on");
    assert_eq!(run.exit_int(), 1);
    assert_eq!(run.exit_factor(), 1e3);
}

#[test]
fn test_min_unit_mismatch_is_error() {
    expect_parse_error("on init\n exit(min(1s, 1Hz))\nend on");
}

#[test]
fn test_in_range_orders_bounds() {
    assert_eq!(
        run_script("on init\n exit(in_range(5, 10, 1))\nend on").exit_int(),
        1
    );
    assert_eq!(
        run_script("on init\n exit(in_range(11, 1, 10))\nend on").exit_int(),
        0
    );
}

#[test]
fn test_in_range_requires_matching_units() {
    expect_parse_error("on init\n exit(in_range(1s, 1, 10))\nend on");
}

#[test]
fn test_random_within_inclusive_range() {
    let run = run_script("on init\n exit(in_range(random(1, 3), 1, 3))\nend on");
    assert_eq!(run.exit_int(), 1);
}

#[test]
fn test_random_unit_mismatch_is_error() {
    expect_parse_error("on init\n exit(random(1s, 10))\nend on");
}

#[test]
fn test_shift_functions() {
    assert_eq!(run_script("on init\n exit(sh_left(1, 4))\nend on").exit_int(), 16);
    assert_eq!(run_script("on init\n exit(sh_right(16, 4))\nend on").exit_int(), 1);
}

#[test]
fn test_msb_lsb_split_14_bit_values() {
    assert_eq!(run_script("on init\n exit(msb(16383))\nend on").exit_int(), 127);
    assert_eq!(run_script("on init\n exit(lsb(16383))\nend on").exit_int(), 127);
    assert_eq!(run_script("on init\n exit(msb(128))\nend on").exit_int(), 1);
    assert_eq!(run_script("on init\n exit(lsb(128))\nend on").exit_int(), 0);
}

#[test]
fn test_conversions_preserve_unit_and_factor() {
    let run = run_script("on init\n exit(int(1.6ms))\nend on");
    assert_eq!(run.exit_int(), 1);
    assert_eq!(run.exit_unit(), UnitType::Second);
    assert_eq!(run.exit_factor(), 1e-3);
    let run = run_script("on init\n exit(real(2))\nend on");
    assert!(fequal(run.exit_real(), 2.0));
}

#[test]
fn test_rounding_functions() {
    assert!(fequal(run_script("on init\n exit(round(1.5))\nend on").exit_real(), 2.0));
    assert!(fequal(run_script("on init\n exit(ceil(1.1))\nend on").exit_real(), 2.0));
    assert!(fequal(run_script("on init\n exit(floor(1.9))\nend on").exit_real(), 1.0));
}

#[test]
fn test_transcendental_functions() {
    assert!(fequal(run_script("on init\n exit(sqrt(16.0))\nend on").exit_real(), 4.0));
    assert!(fequal(run_script("on init\n exit(log2(8.0))\nend on").exit_real(), 3.0));
    assert!(fequal(run_script("on init\n exit(log10(1000.0))\nend on").exit_real(), 3.0));
    assert!(fequal(run_script("on init\n exit(exp(0.0))\nend on").exit_real(), 1.0));
    assert!(fequal(run_script("on init\n exit(sin(0.0))\nend on").exit_real(), 0.0));
    assert!(fequal(run_script("on init\n exit(cos(0.0))\nend on").exit_real(), 1.0));
}

#[test]
fn test_pow_unit_and_finalness_follow_base() {
    let run = run_script("on init\n exit(pow(!2.0, 3.0))\nend on");
    assert!(fequal(run.exit_real(), 8.0));
    assert!(run.exit_final());
    expect_parse_error("on init\n exit(pow(2.0, !3.0))\nend on");
    expect_parse_error("on init\n exit(pow(2.0, 3.0s))\nend on");
}

#[test]
fn test_math_constants() {
    let run = run_script("on init\n exit(~NI_MATH_PI)\nend on");
    assert!(fequal(run.exit_real(), std::f64::consts::PI));
}

#[test]
fn test_callback_type_constants() {
    assert_eq!(
        run_script("on init\n exit($NI_CB_TYPE_INIT)\nend on").exit_int(),
        0
    );
    assert_eq!(
        run_script("on init\n exit($NI_CB_TYPE_NRPN)\nend on").exit_int(),
        5
    );
}

#[test]
fn test_builtin_timer_advances() {
    let run = run_script("on init\n exit($NKSP_REAL_TIMER > 0)\nend on");
    assert_eq!(run.exit_int(), 1);
}

// ---- finalness propagation -------------------------------------------------

#[test]
fn test_mixed_finalness_warns_and_result_is_final() {
    let src = "on init\n exit(!10 + 5)\nend on";
    expect_parse_warning(src);
    let run = run_script(src);
    assert_eq!(run.exit_int(), 15);
    assert!(run.exit_final());
}

#[test]
fn test_relations_are_never_final() {
    let run = run_script("on init\n exit(!5 > !3)\nend on");
    assert_eq!(run.exit_int(), 1);
    assert!(!run.exit_final());
}
