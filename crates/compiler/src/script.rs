//! The loaded form of a script.
//!
//! A [`ParsedScript`] bundles the immutable execution tree with the global
//! memory pools of this script instance, the host bindings its symbol
//! table references and all diagnostics. Scripts with parse errors are
//! still represented (for diagnostic display) but refuse execution.

use crate::ast::{PoolInit, Program};
use crate::builtins::HostBindings;
use crate::context::{ParseOutput, PatchVar};
use nksp_core::{CodeBlock, GlobalMemory, HandlerId, ParserIssue};

/// Shared, immutable-after-load compiled form of one script plus its
/// global variable memory.
#[derive(Debug)]
pub struct ParsedScript {
    pub program: Program,
    pub globals: GlobalMemory,
    pub host: HostBindings,
    issues: Vec<ParserIssue>,
    elisions: Vec<CodeBlock>,
    patch_vars: Vec<PatchVar>,
}

impl ParsedScript {
    /// Materialize a parse result: allocates the global pools and applies
    /// the array initializer image.
    pub fn from_output(out: ParseOutput) -> ParsedScript {
        let layout = out.program.layout;
        let globals = GlobalMemory::new(
            layout.global_ints,
            layout.global_reals,
            layout.global_factors,
            layout.global_strs,
        );
        for init in &out.program.init_image {
            match init {
                PoolInit::Int { slot, value } => globals.set_int(*slot, *value),
                PoolInit::Real { slot, value } => globals.set_real(*slot, *value),
                PoolInit::Factor { slot, value } => globals.set_factor(*slot, *value),
                PoolInit::Str { slot, value } => globals.set_string(*slot, value.clone()),
            }
        }
        ParsedScript {
            program: out.program,
            globals,
            host: out.host,
            issues: out.issues,
            elisions: out.elisions,
            patch_vars: out.patch_vars,
        }
    }

    pub fn issues(&self) -> &[ParserIssue] {
        &self.issues
    }

    pub fn errors(&self) -> Vec<&ParserIssue> {
        self.issues.iter().filter(|i| i.is_error()).collect()
    }

    pub fn warnings(&self) -> Vec<&ParserIssue> {
        self.issues.iter().filter(|i| i.is_warning()).collect()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.is_error())
    }

    /// Source regions elided by preprocessor conditions.
    pub fn preprocessor_elisions(&self) -> &[CodeBlock] {
        &self.elisions
    }

    /// `patch` variables found in the source, in declaration order.
    pub fn patch_variables(&self) -> &[PatchVar] {
        &self.patch_vars
    }

    pub fn event_handler_count(&self) -> usize {
        self.program.handlers.len()
    }

    pub fn event_handler(&self, index: usize) -> Option<HandlerId> {
        if index < self.program.handlers.len() {
            Some(HandlerId(index as u32))
        } else {
            None
        }
    }

    pub fn event_handler_by_name(&self, name: &str) -> Option<HandlerId> {
        self.program.handler_by_name(name)
    }

    /// Control stack depth an exec context needs for this script.
    pub fn required_stack_size(&self) -> usize {
        self.program.required_stack_size
    }
}
