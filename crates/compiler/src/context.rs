//! Parse-time context: registered built-in variables and the structured
//! output of one parse pass.

use crate::ast::Program;
use crate::builtins::{DynIntVar, HostBindings, Int8ArrayView, IntVarPtr};
use nksp_core::{CodeBlock, ParserIssue, vmfloat, vmint};
use std::sync::Arc;

/// Location of a `patch` variable: where its name sits in the source and,
/// if present, where its default initializer expression sits. Used for the
/// textual override pass of `load_script`.
#[derive(Debug, Clone)]
pub struct PatchVar {
    /// Variable name including its sigil.
    pub name: String,
    pub name_block: CodeBlock,
    pub expr_block: Option<CodeBlock>,
}

/// Built-in variables supplied by the host before parsing.
///
/// Names are given with their sigil (`$FOO`, `~BAR`, `%BAZ`); scripts
/// reference them like ordinary variables.
#[derive(Default, Clone)]
pub struct BuiltinVars {
    pub(crate) const_ints: Vec<(String, vmint)>,
    pub(crate) const_reals: Vec<(String, vmfloat)>,
    pub(crate) int_ptrs: Vec<(String, Arc<dyn IntVarPtr>)>,
    pub(crate) int8_arrays: Vec<(String, Arc<dyn Int8ArrayView>)>,
    pub(crate) dyn_ints: Vec<(String, Arc<dyn DynIntVar>)>,
}

impl BuiltinVars {
    pub fn register_const_int(&mut self, name: &str, value: vmint) {
        self.const_ints.push((name.to_string(), value));
    }

    pub fn register_const_real(&mut self, name: &str, value: vmfloat) {
        self.const_reals.push((name.to_string(), value));
    }

    pub fn register_int_ptr(&mut self, name: &str, ptr: Arc<dyn IntVarPtr>) {
        self.int_ptrs.push((name.to_string(), ptr));
    }

    pub fn register_int8_array(&mut self, name: &str, view: Arc<dyn Int8ArrayView>) {
        self.int8_arrays.push((name.to_string(), view));
    }

    pub fn register_dyn_int(&mut self, name: &str, var: Arc<dyn DynIntVar>) {
        self.dyn_ints.push((name.to_string(), var));
    }
}

/// Everything one parse pass produces.
#[derive(Debug)]
pub struct ParseOutput {
    pub program: Program,
    pub issues: Vec<ParserIssue>,
    /// Source regions elided by preprocessor conditions.
    pub elisions: Vec<CodeBlock>,
    /// `patch` variables in source order.
    pub patch_vars: Vec<PatchVar>,
    /// Host objects referenced by the symbol table.
    pub host: HostBindings,
}

impl ParseOutput {
    pub fn errors(&self) -> impl Iterator<Item = &ParserIssue> {
        self.issues.iter().filter(|i| i.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ParserIssue> {
        self.issues.iter().filter(|i| i.is_warning())
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }
}
