//! Front-end of the NKSP script engine.
//!
//! Turns UTF-8 source text into a typed, annotated execution tree: the
//! scanner produces byte-accurate tokens, the integrated preprocessor
//! evaluates condition directives and elides inactive regions, and the
//! recursive-descent parser performs all type, unit and finalness checking
//! while laying out the script's memory pools. The [`eval`] module walks
//! the finished tree at execution time on behalf of the VM.
//!
//! The crate also provides the lex-only [`syntax::syntax_tokens`] path for
//! external editors.

pub mod ast;
pub mod builtins;
pub mod config;
pub mod context;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod preproc;
pub mod script;
pub mod syntax;
pub mod token;

pub use ast::{ExprType, HandlerKind, Program};
pub use builtins::{
    DynIntVar, FnResult, FnValue, FunctionProvider, HostBindings, Int8ArrayView, IntVarPtr,
    VmFunction,
};
pub use config::VmConfig;
pub use context::{BuiltinVars, ParseOutput, PatchVar};
pub use eval::{ExecEnv, IntScalar, RealScalar};
pub use parser::parse_script;
pub use script::ParsedScript;
pub use syntax::{SourceToken, SourceTokenKind, syntax_tokens};
