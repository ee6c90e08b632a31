//! Recursive-descent parser for NKSP.
//!
//! Produces the annotated execution tree, performing all type, unit and
//! finalness checking inline, folding constant expressions where they are
//! required to be constant, computing the memory pool layout and the
//! executor's required stack size. All problems are collected as
//! [`ParserIssue`]s; the parser never bails on the first error.

use crate::ast::{
    BinOp, BoolOp, CaseBranch, Expr, ExprInfo, ExprType, Handler, HandlerKind, PoolInit, Program,
    RelOp, Stmt, StmtClass, UserFn, VarKind, Variable,
};
use crate::builtins::{FunctionProvider, HostBindings};
use crate::context::{BuiltinVars, ParseOutput, PatchVar};
use crate::lexer::tokenize;
use crate::preproc::preprocess;
use crate::token::{Token, TokenKind};
use nksp_core::{
    CodeBlock, DiagnosticSink, ExprId, IssueKind, NO_FACTOR, ParserIssue, StmtId, UnitType, VarId,
    vmint,
};
use std::collections::{HashMap, HashSet};

/// Largest accepted array declaration size.
const MAX_ARRAY_SIZE: vmint = 1_000_000;

/// Parse a complete script.
///
/// `builtin_conditions` seeds the preprocessor condition set; `builtin_vars`
/// are the host-registered variables; `provider` resolves built-in function
/// names. Issues are collected in the returned [`ParseOutput`] and also
/// forwarded to `sink`.
pub fn parse_script(
    source: &str,
    provider: &dyn FunctionProvider,
    builtin_vars: &BuiltinVars,
    builtin_conditions: &HashSet<String>,
    sink: &mut dyn DiagnosticSink,
) -> ParseOutput {
    let raw = tokenize(source);
    let pre = preprocess(raw, builtin_conditions);

    let mut conditions = builtin_conditions.clone();
    conditions.extend(pre.user_conditions.iter().cloned());

    let mut parser = Parser {
        tokens: pre.tokens,
        pos: 0,
        prog: Program::default(),
        issues: pre.issues,
        symbols: HashMap::new(),
        user_fn_ids: HashMap::new(),
        patch_vars: Vec::new(),
        host: HostBindings::default(),
        provider,
        conditions,
        handler_kinds: Vec::new(),
    };
    parser.register_builtin_vars(builtin_vars);
    parser.parse_script_body();
    parser.prog.required_stack_size = parser.required_stack_size();

    for issue in &parser.issues {
        sink.parse_issue(issue);
    }
    tracing::debug!(
        target: "nksp::parser",
        handlers = parser.prog.handlers.len(),
        errors = parser.issues.iter().filter(|i| i.is_error()).count(),
        warnings = parser.issues.iter().filter(|i| i.is_warning()).count(),
        stack_size = parser.prog.required_stack_size,
        "script parsed"
    );

    ParseOutput {
        program: parser.prog,
        issues: parser.issues,
        elisions: pre.elisions,
        patch_vars: parser.patch_vars,
        host: parser.host,
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    prog: Program,
    issues: Vec<ParserIssue>,
    /// Declared and registered variables, keyed by full name with sigil.
    symbols: HashMap<String, VarId>,
    /// User functions, keyed by name, holding indices into `prog.user_fns`.
    user_fn_ids: HashMap<String, usize>,
    patch_vars: Vec<PatchVar>,
    host: HostBindings,
    provider: &'a dyn FunctionProvider,
    conditions: HashSet<String>,
    handler_kinds: Vec<HandlerKind>,
}

impl<'a> Parser<'a> {
    // ---- token plumbing --------------------------------------------------

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek_is(&self, text: &str) -> bool {
        self.peek().is_some_and(|t| t.text == text)
    }

    fn current_block(&self) -> CodeBlock {
        match self.peek() {
            Some(t) => t.block,
            None => self
                .tokens
                .last()
                .map(|t| t.block)
                .unwrap_or_default(),
        }
    }

    fn expect(&mut self, text: &str) -> bool {
        if self.peek_is(text) {
            self.bump();
            true
        } else {
            let block = self.current_block();
            let found = self
                .peek()
                .map(|t| format!("'{}'", t.text))
                .unwrap_or_else(|| "end of file".to_string());
            self.error(block, &format!("expected '{}', found {}", text, found));
            false
        }
    }

    fn error(&mut self, block: CodeBlock, message: &str) {
        self.issues.push(ParserIssue {
            kind: IssueKind::Error,
            message: message.to_string(),
            block,
        });
    }

    fn warn(&mut self, block: CodeBlock, message: &str) {
        self.issues.push(ParserIssue {
            kind: IssueKind::Warning,
            message: message.to_string(),
            block,
        });
    }

    /// Skip tokens until a plausible statement start, so one error does
    /// not cascade through the rest of the script.
    fn recover(&mut self) {
        const SYNC: &[&str] = &[
            "declare", "if", "else", "while", "select", "case", "sync", "call", "end", "on",
            "function",
        ];
        while let Some(tok) = self.peek() {
            if SYNC.contains(&tok.text.as_str())
                || matches!(
                    tok.kind,
                    TokenKind::IntVarName
                        | TokenKind::RealVarName
                        | TokenKind::StrVarName
                        | TokenKind::IntArrVarName
                        | TokenKind::RealArrVarName
                        | TokenKind::StrArrVarName
                )
            {
                return;
            }
            self.bump();
        }
    }

    /// Merged span of the tokens parsed since `start_pos`.
    fn span_since(&self, start_pos: usize) -> CodeBlock {
        match (self.tokens.get(start_pos), self.tokens.get(self.pos.saturating_sub(1))) {
            (Some(first), Some(last)) if start_pos < self.pos => first.block.merged(&last.block),
            (Some(first), _) => first.block,
            _ => CodeBlock::default(),
        }
    }

    // ---- built-in variable registration ---------------------------------

    fn register_builtin_vars(&mut self, vars: &BuiltinVars) {
        for (name, value) in &vars.const_ints {
            self.add_symbol(Variable {
                name: name.clone(),
                kind: VarKind::ConstInt {
                    value: *value,
                    factor: NO_FACTOR,
                },
                unit: UnitType::None,
                is_final: false,
                is_const: true,
                is_poly: false,
                is_patch: false,
            });
        }
        for (name, value) in &vars.const_reals {
            self.add_symbol(Variable {
                name: name.clone(),
                kind: VarKind::ConstReal {
                    value: *value,
                    factor: NO_FACTOR,
                },
                unit: UnitType::None,
                is_final: false,
                is_const: true,
                is_poly: false,
                is_patch: false,
            });
        }
        for (name, ptr) in &vars.int_ptrs {
            let binding = self.host.int_ptrs.len();
            self.host.int_ptrs.push(ptr.clone());
            self.add_symbol(Variable {
                name: name.clone(),
                kind: VarKind::HostInt {
                    binding,
                    readonly: ptr.is_readonly(),
                },
                unit: UnitType::None,
                is_final: false,
                is_const: false,
                is_poly: false,
                is_patch: false,
            });
        }
        for (name, view) in &vars.int8_arrays {
            let binding = self.host.int8_arrays.len();
            self.host.int8_arrays.push(view.clone());
            self.add_symbol(Variable {
                name: name.clone(),
                kind: VarKind::HostIntArray {
                    binding,
                    readonly: view.is_readonly(),
                },
                unit: UnitType::None,
                is_final: false,
                is_const: false,
                is_poly: false,
                is_patch: false,
            });
        }
        for (name, var) in &vars.dyn_ints {
            let binding = self.host.dyn_ints.len();
            self.host.dyn_ints.push(var.clone());
            self.add_symbol(Variable {
                name: name.clone(),
                kind: VarKind::DynInt { binding },
                unit: UnitType::None,
                is_final: false,
                is_const: false,
                is_poly: false,
                is_patch: false,
            });
        }
    }

    fn add_symbol(&mut self, var: Variable) -> VarId {
        let id = VarId(self.prog.vars.len() as u32);
        self.symbols.insert(var.name.clone(), id);
        self.prog.vars.push(var);
        id
    }

    // ---- top level -------------------------------------------------------

    fn parse_script_body(&mut self) {
        while !self.at_end() {
            if self.peek_is("on") {
                self.parse_handler();
            } else if self.peek_is("function") {
                self.parse_function();
            } else {
                let block = self.current_block();
                let text = self.peek().map(|t| t.text.clone()).unwrap_or_default();
                self.error(
                    block,
                    &format!("expected 'on' or 'function', found '{}'", text),
                );
                self.bump();
                self.recover();
            }
        }
    }

    fn parse_handler(&mut self) {
        self.bump(); // 'on'
        let name_tok = match self.bump() {
            Some(t) => t,
            None => return,
        };
        let kind = match HandlerKind::from_name(&name_tok.text) {
            Some(k) => k,
            None => {
                self.error(
                    name_tok.block,
                    &format!("unknown event handler '{}'", name_tok.text),
                );
                self.recover();
                return;
            }
        };
        if self.handler_kinds.contains(&kind) {
            self.error(
                name_tok.block,
                &format!("event handler '{}' defined more than once", name_tok.text),
            );
        }
        let body = self.parse_stmt_list();
        self.expect("end");
        self.expect("on");
        let sub = self.prog.add_stmt(Stmt::Sub { body });
        let polyphonic = self.stmt_is_poly(body);
        self.handler_kinds.push(kind);
        self.prog.handlers.push(Handler {
            kind,
            body: sub,
            polyphonic,
        });
    }

    fn parse_function(&mut self) {
        self.bump(); // 'function'
        let name_tok = match self.bump() {
            Some(t) => t,
            None => return,
        };
        if !matches!(name_tok.kind, TokenKind::Identifier) {
            self.error(name_tok.block, "expected function name");
            self.recover();
            return;
        }
        if self.user_fn_ids.contains_key(&name_tok.text) {
            self.error(
                name_tok.block,
                &format!("function '{}' defined more than once", name_tok.text),
            );
        }
        let body = self.parse_stmt_list();
        self.expect("end");
        self.expect("function");
        let sub = self.prog.add_stmt(Stmt::Sub { body });
        let idx = self.prog.user_fns.len();
        self.prog.user_fns.push(UserFn {
            name: name_tok.text.clone(),
            body: sub,
        });
        self.user_fn_ids.insert(name_tok.text, idx);
    }

    /// Statement list until `end`, `else` or `case` (not consumed).
    fn parse_stmt_list(&mut self) -> StmtId {
        let mut children = Vec::new();
        while let Some(tok) = self.peek() {
            if matches!(tok.text.as_str(), "end" | "else" | "case") {
                break;
            }
            match self.parse_statement() {
                Some(stmt) => children.push(stmt),
                None => self.recover(),
            }
        }
        self.prog.add_stmt(Stmt::List { children })
    }

    fn parse_statement(&mut self) -> Option<StmtId> {
        let tok = self.peek()?.clone();
        match &tok.kind {
            TokenKind::Keyword => match tok.text.as_str() {
                "declare" => self.parse_declare(),
                "if" => self.parse_if(),
                "while" => self.parse_while(),
                "select" => self.parse_select(),
                "sync" => self.parse_sync(),
                "call" => self.parse_call(),
                _ => {
                    self.error(
                        tok.block,
                        &format!("unexpected keyword '{}' at statement level", tok.text),
                    );
                    self.bump();
                    None
                }
            },
            TokenKind::IntVarName
            | TokenKind::RealVarName
            | TokenKind::StrVarName
            | TokenKind::IntArrVarName
            | TokenKind::RealArrVarName
            | TokenKind::StrArrVarName => self.parse_assignment(),
            TokenKind::Identifier => self.parse_fn_call_stmt(),
            TokenKind::Other if tok.text.starts_with('"') => {
                self.error(tok.block, "unterminated string literal");
                self.bump();
                None
            }
            _ => {
                self.error(tok.block, &format!("unexpected token '{}'", tok.text));
                self.bump();
                None
            }
        }
    }

    // ---- control flow ----------------------------------------------------

    fn parse_if(&mut self) -> Option<StmtId> {
        self.bump(); // 'if'
        let cond = self.parse_paren_condition()?;
        let then_body = self.parse_stmt_list();
        let else_body = if self.peek_is("else") {
            self.bump();
            Some(self.parse_stmt_list())
        } else {
            None
        };
        self.expect("end");
        self.expect("if");
        Some(self.prog.add_stmt(Stmt::If {
            cond,
            then_body,
            else_body,
        }))
    }

    fn parse_while(&mut self) -> Option<StmtId> {
        self.bump(); // 'while'
        let cond = self.parse_paren_condition()?;
        let body = self.parse_stmt_list();
        self.expect("end");
        self.expect("while");
        Some(self.prog.add_stmt(Stmt::While { cond, body }))
    }

    fn parse_paren_condition(&mut self) -> Option<ExprId> {
        if !self.expect("(") {
            return None;
        }
        let start = self.pos;
        let cond = self.parse_expr()?;
        if !self.expect(")") {
            return None;
        }
        if self.prog.info(cond).ty != ExprType::Int {
            let block = self.span_since(start);
            self.error(block, "condition must be an integer expression");
            return None;
        }
        Some(cond)
    }

    fn parse_select(&mut self) -> Option<StmtId> {
        self.bump(); // 'select'
        let start = self.pos;
        let value = self.parse_expr()?;
        if self.prog.info(value).ty != ExprType::Int {
            let block = self.span_since(start);
            self.error(block, "select expression must be an integer expression");
        }
        let mut cases = Vec::new();
        while self.peek_is("case") {
            self.bump();
            let from = self.parse_case_value()?;
            let to = if self.peek_is("to") {
                self.bump();
                Some(self.parse_case_value()?)
            } else {
                None
            };
            let body = self.parse_stmt_list();
            cases.push(CaseBranch { from, to, body });
        }
        if cases.is_empty() {
            let block = self.current_block();
            self.error(block, "select block requires at least one case branch");
        }
        self.expect("end");
        self.expect("select");
        Some(self.prog.add_stmt(Stmt::Select { value, cases }))
    }

    fn parse_case_value(&mut self) -> Option<ExprId> {
        let start = self.pos;
        let expr = self.parse_expr()?;
        if self.prog.info(expr).ty != ExprType::Int {
            let block = self.span_since(start);
            self.error(block, "case value must be an integer expression");
            return None;
        }
        Some(expr)
    }

    fn parse_sync(&mut self) -> Option<StmtId> {
        self.bump(); // 'sync'
        let body = self.parse_stmt_list();
        self.expect("end");
        self.expect("sync");
        Some(self.prog.add_stmt(Stmt::Sync { body }))
    }

    fn parse_call(&mut self) -> Option<StmtId> {
        self.bump(); // 'call'
        let name_tok = self.bump()?;
        if !matches!(name_tok.kind, TokenKind::Identifier) {
            self.error(name_tok.block, "expected user function name after 'call'");
            return None;
        }
        match self.user_fn_ids.get(&name_tok.text) {
            // the callee's subroutine node is embedded directly; functions
            // must be defined before they are called, which also rules out
            // recursion
            Some(idx) => Some(self.prog.user_fns[*idx].body),
            None => {
                self.error(
                    name_tok.block,
                    &format!("no such user function '{}'", name_tok.text),
                );
                None
            }
        }
    }

    // ---- declarations ----------------------------------------------------

    fn parse_declare(&mut self) -> Option<StmtId> {
        self.bump(); // 'declare'
        let mut is_const = false;
        let mut is_poly = false;
        let mut is_patch = false;
        loop {
            if self.peek_is("const") {
                let tok = self.bump().unwrap();
                if is_const {
                    self.warn(tok.block, "duplicate 'const' qualifier");
                }
                is_const = true;
            } else if self.peek_is("polyphonic") {
                let tok = self.bump().unwrap();
                if is_poly {
                    self.warn(tok.block, "duplicate 'polyphonic' qualifier");
                }
                is_poly = true;
            } else if self.peek_is("patch") {
                let tok = self.bump().unwrap();
                if is_patch {
                    self.warn(tok.block, "duplicate 'patch' qualifier");
                }
                is_patch = true;
            } else {
                break;
            }
        }
        let name_tok = match self.bump() {
            Some(t) => t,
            None => return None,
        };
        if is_const && is_poly {
            self.error(
                name_tok.block,
                "variable cannot be declared both 'const' and 'polyphonic'",
            );
            is_poly = false;
        }
        if self.symbols.contains_key(&name_tok.text) {
            self.error(
                name_tok.block,
                &format!("redeclaration of variable '{}'", name_tok.text),
            );
            // parse the remainder anyway to keep issues meaningful
        }
        match name_tok.kind {
            TokenKind::IntVarName | TokenKind::RealVarName | TokenKind::StrVarName => {
                self.parse_scalar_decl(name_tok, is_const, is_poly, is_patch)
            }
            TokenKind::IntArrVarName | TokenKind::RealArrVarName | TokenKind::StrArrVarName => {
                self.parse_array_decl(name_tok, is_const, is_poly, is_patch)
            }
            _ => {
                self.error(name_tok.block, "expected variable name after 'declare'");
                None
            }
        }
    }

    fn parse_scalar_decl(
        &mut self,
        name_tok: Token,
        is_const: bool,
        is_poly: bool,
        is_patch: bool,
    ) -> Option<StmtId> {
        let ty = match name_tok.kind {
            TokenKind::IntVarName => ExprType::Int,
            TokenKind::RealVarName => ExprType::Real,
            _ => ExprType::String,
        };
        if ty == ExprType::String && is_poly {
            self.error(
                name_tok.block,
                "'polyphonic' is not allowed on string variables",
            );
        }

        let mut init: Option<ExprId> = None;
        let mut expr_block: Option<CodeBlock> = None;
        if self.peek_is(":=") {
            self.bump();
            let start = self.pos;
            let expr = self.parse_expr()?;
            expr_block = Some(self.span_since(start));
            let info = *self.prog.info(expr);
            if info.ty != ty {
                self.error(
                    expr_block.unwrap(),
                    &format!(
                        "initializer of variable '{}' must be {}, is {}",
                        name_tok.text,
                        ty.name(),
                        info.ty.name()
                    ),
                );
            } else {
                init = Some(expr);
            }
        } else if is_const {
            self.error(
                name_tok.block,
                "'const' variable requires an initializer expression",
            );
        }

        if is_patch {
            self.patch_vars.push(PatchVar {
                name: name_tok.text.clone(),
                name_block: name_tok.block,
                expr_block,
            });
        }

        let (unit, is_final) = match init {
            Some(expr) => {
                let info = self.prog.info(expr);
                (info.unit, info.is_final)
            }
            None => (UnitType::None, false),
        };

        let kind = if is_const {
            match (ty, init) {
                (ExprType::Int, Some(expr)) => match self.prog.fold_int(expr) {
                    Some((value, factor)) => VarKind::ConstInt { value, factor },
                    None => {
                        self.error(
                            expr_block.unwrap(),
                            "initializer of 'const' variable must be a constant expression",
                        );
                        VarKind::ConstInt {
                            value: 0,
                            factor: NO_FACTOR,
                        }
                    }
                },
                (ExprType::Real, Some(expr)) => match self.prog.fold_real(expr) {
                    Some((value, factor)) => VarKind::ConstReal { value, factor },
                    None => {
                        self.error(
                            expr_block.unwrap(),
                            "initializer of 'const' variable must be a constant expression",
                        );
                        VarKind::ConstReal {
                            value: 0.0,
                            factor: NO_FACTOR,
                        }
                    }
                },
                (ExprType::String, Some(expr)) => match self.prog.fold_str(expr) {
                    Some(value) => VarKind::ConstStr { value },
                    None => {
                        self.error(
                            expr_block.unwrap(),
                            "initializer of 'const' variable must be a constant expression",
                        );
                        VarKind::ConstStr {
                            value: String::new(),
                        }
                    }
                },
                (ExprType::Int, None) => VarKind::ConstInt {
                    value: 0,
                    factor: NO_FACTOR,
                },
                (ExprType::Real, None) => VarKind::ConstReal {
                    value: 0.0,
                    factor: NO_FACTOR,
                },
                _ => VarKind::ConstStr {
                    value: String::new(),
                },
            }
        } else {
            match ty {
                ExprType::Int => {
                    let (slot, factor_slot) = if is_poly {
                        let s = (self.prog.layout.poly_ints, self.prog.layout.poly_factors);
                        self.prog.layout.poly_ints += 1;
                        self.prog.layout.poly_factors += 1;
                        s
                    } else {
                        let s = (self.prog.layout.global_ints, self.prog.layout.global_factors);
                        self.prog.layout.global_ints += 1;
                        self.prog.layout.global_factors += 1;
                        s
                    };
                    VarKind::Int { slot, factor_slot }
                }
                ExprType::Real => {
                    let (slot, factor_slot) = if is_poly {
                        let s = (self.prog.layout.poly_reals, self.prog.layout.poly_factors);
                        self.prog.layout.poly_reals += 1;
                        self.prog.layout.poly_factors += 1;
                        s
                    } else {
                        let s = (self.prog.layout.global_reals, self.prog.layout.global_factors);
                        self.prog.layout.global_reals += 1;
                        self.prog.layout.global_factors += 1;
                        s
                    };
                    VarKind::Real { slot, factor_slot }
                }
                _ => {
                    let slot = self.prog.layout.global_strs;
                    self.prog.layout.global_strs += 1;
                    VarKind::Str { slot }
                }
            }
        };

        let var_id = self.add_symbol(Variable {
            name: name_tok.text.clone(),
            kind,
            unit,
            is_final,
            is_const,
            is_poly,
            is_patch,
        });

        match (init, is_const) {
            (Some(expr), false) => {
                // the declaration assigns in place when executed
                let var = self.prog.var(var_id).clone();
                let lhs = self.prog.add_expr(
                    Expr::Var(var_id),
                    ExprInfo {
                        ty,
                        unit: var.unit,
                        is_final: var.is_final,
                        konst: false,
                        poly: var.is_poly,
                        has_prefix: false,
                        array_size: None,
                    },
                );
                Some(self.prog.add_stmt(Stmt::Assign { lhs, rhs: expr }))
            }
            _ => Some(self.prog.add_stmt(Stmt::NoOp)),
        }
    }

    fn parse_array_decl(
        &mut self,
        name_tok: Token,
        is_const: bool,
        is_poly: bool,
        is_patch: bool,
    ) -> Option<StmtId> {
        let elem_ty = match name_tok.kind {
            TokenKind::IntArrVarName => ExprType::Int,
            TokenKind::RealArrVarName => ExprType::Real,
            _ => ExprType::String,
        };
        if is_poly {
            self.error(name_tok.block, "'polyphonic' is not allowed on arrays");
        }

        if !self.expect("[") {
            return None;
        }
        let size_start = self.pos;
        let size_expr = self.parse_expr()?;
        let size_block = self.span_since(size_start);
        if !self.expect("]") {
            return None;
        }

        let size = match self.prog.fold_int(size_expr) {
            Some((v, _)) if self.prog.info(size_expr).ty == ExprType::Int => v,
            _ => {
                self.error(
                    size_block,
                    "array size must be a constant integer expression",
                );
                0
            }
        };
        if self.prog.info(size_expr).unit != UnitType::None {
            self.error(size_block, "array size must not have a unit");
        }
        if size <= 0 || size > MAX_ARRAY_SIZE {
            self.error(
                size_block,
                &format!("array size out of range (1 .. {})", MAX_ARRAY_SIZE),
            );
        }
        let len = size.clamp(0, MAX_ARRAY_SIZE) as usize;

        let kind = match elem_ty {
            ExprType::Int => {
                let slot = self.prog.layout.global_ints;
                let factor_slot = self.prog.layout.global_factors;
                self.prog.layout.global_ints += len;
                self.prog.layout.global_factors += len;
                VarKind::IntArray {
                    slot,
                    factor_slot,
                    len,
                }
            }
            ExprType::Real => {
                let slot = self.prog.layout.global_reals;
                let factor_slot = self.prog.layout.global_factors;
                self.prog.layout.global_reals += len;
                self.prog.layout.global_factors += len;
                VarKind::RealArray {
                    slot,
                    factor_slot,
                    len,
                }
            }
            _ => {
                let slot = self.prog.layout.global_strs;
                self.prog.layout.global_strs += len;
                VarKind::StrArray { slot, len }
            }
        };

        let mut expr_block: Option<CodeBlock> = None;
        if self.peek_is(":=") {
            self.bump();
            let list_start = self.pos;
            if !self.expect("(") {
                return None;
            }
            let mut elems = Vec::new();
            if !self.peek_is(")") {
                loop {
                    let elem_start = self.pos;
                    let elem = self.parse_expr()?;
                    let elem_block = self.span_since(elem_start);
                    elems.push((elem, elem_block));
                    if self.peek_is(",") {
                        self.bump();
                    } else {
                        break;
                    }
                }
            }
            if !self.expect(")") {
                return None;
            }
            expr_block = Some(self.span_since(list_start));

            if elems.len() > len {
                self.error(
                    expr_block.unwrap(),
                    &format!(
                        "array '{}' declared with {} elements but initialized with {}",
                        name_tok.text,
                        len,
                        elems.len()
                    ),
                );
            }
            self.fold_array_init(&name_tok, elem_ty, &kind, &elems);
        } else if is_const {
            self.error(
                name_tok.block,
                "'const' array requires an initializer list",
            );
        }

        if is_patch {
            self.patch_vars.push(PatchVar {
                name: name_tok.text.clone(),
                name_block: name_tok.block,
                expr_block,
            });
        }

        self.add_symbol(Variable {
            name: name_tok.text.clone(),
            kind,
            unit: UnitType::None,
            is_final: false,
            is_const,
            is_poly: false,
            is_patch,
        });
        Some(self.prog.add_stmt(Stmt::NoOp))
    }

    /// Fold array initializer elements into the load-time pool image.
    fn fold_array_init(
        &mut self,
        name_tok: &Token,
        elem_ty: ExprType,
        kind: &VarKind,
        elems: &[(ExprId, CodeBlock)],
    ) {
        for (i, (elem, elem_block)) in elems.iter().enumerate() {
            let info = *self.prog.info(*elem);
            if info.ty != elem_ty {
                self.error(
                    *elem_block,
                    &format!(
                        "element {} of array '{}' must be {}, is {}",
                        i,
                        name_tok.text,
                        elem_ty.name(),
                        info.ty.name()
                    ),
                );
                continue;
            }
            if info.unit != UnitType::None {
                self.error(
                    *elem_block,
                    "array elements must not have a unit type",
                );
                continue;
            }
            if info.is_final {
                self.error(*elem_block, "array elements must not be declared 'final'");
                continue;
            }
            match (kind, elem_ty) {
                (VarKind::IntArray { slot, factor_slot, len }, ExprType::Int) if i < *len => {
                    match self.prog.fold_int(*elem) {
                        Some((value, factor)) => {
                            self.prog.init_image.push(PoolInit::Int {
                                slot: slot + i,
                                value,
                            });
                            self.prog.init_image.push(PoolInit::Factor {
                                slot: factor_slot + i,
                                value: factor,
                            });
                        }
                        None => self.error(
                            *elem_block,
                            "array initializer elements must be constant expressions",
                        ),
                    }
                }
                (VarKind::RealArray { slot, factor_slot, len }, ExprType::Real) if i < *len => {
                    match self.prog.fold_real(*elem) {
                        Some((value, factor)) => {
                            self.prog.init_image.push(PoolInit::Real {
                                slot: slot + i,
                                value,
                            });
                            self.prog.init_image.push(PoolInit::Factor {
                                slot: factor_slot + i,
                                value: factor,
                            });
                        }
                        None => self.error(
                            *elem_block,
                            "array initializer elements must be constant expressions",
                        ),
                    }
                }
                (VarKind::StrArray { slot, len }, ExprType::String) if i < *len => {
                    match self.prog.fold_str(*elem) {
                        Some(value) => self.prog.init_image.push(PoolInit::Str {
                            slot: slot + i,
                            value,
                        }),
                        None => self.error(
                            *elem_block,
                            "array initializer elements must be constant expressions",
                        ),
                    }
                }
                _ => {}
            }
        }
    }

    // ---- assignments -----------------------------------------------------

    fn parse_assignment(&mut self) -> Option<StmtId> {
        let name_tok = self.bump()?;
        let var_id = match self.symbols.get(&name_tok.text) {
            Some(id) => *id,
            None => {
                self.error(
                    name_tok.block,
                    &format!("undeclared variable '{}'", name_tok.text),
                );
                return None;
            }
        };
        let var = self.prog.var(var_id).clone();

        let lhs = if self.peek_is("[") {
            self.parse_array_elem(&name_tok, var_id, &var)?
        } else {
            if var.array_len().is_some() || matches!(var.kind, VarKind::HostIntArray { .. }) {
                self.error(
                    name_tok.block,
                    &format!("array variable '{}' requires an element index", name_tok.text),
                );
                return None;
            }
            self.prog.add_expr(
                Expr::Var(var_id),
                ExprInfo {
                    ty: var.expr_type(),
                    unit: var.unit,
                    is_final: var.is_final,
                    konst: false,
                    poly: var.is_poly,
                    has_prefix: false,
                    array_size: None,
                },
            )
        };

        if !self.expect(":=") {
            return None;
        }
        let rhs_start = self.pos;
        let rhs = self.parse_expr()?;
        let rhs_block = self.span_since(rhs_start);

        if !var.is_assignable() {
            self.error(
                name_tok.block,
                &format!("variable '{}' may not be modified", name_tok.text),
            );
            return None;
        }

        let lhs_info = *self.prog.info(lhs);
        let rhs_info = *self.prog.info(rhs);
        if lhs_info.ty != rhs_info.ty {
            self.error(
                rhs_block,
                &format!(
                    "cannot assign {} to '{}' which is {}",
                    rhs_info.ty.name(),
                    name_tok.text,
                    lhs_info.ty.name()
                ),
            );
            return None;
        }
        if lhs_info.ty.is_number() {
            if lhs_info.unit != rhs_info.unit {
                self.error(
                    rhs_block,
                    &format!(
                        "cannot assign unit type {} to '{}' which has unit type {}",
                        rhs_info.unit, name_tok.text, lhs_info.unit
                    ),
                );
                return None;
            }
            if lhs_info.is_final && !rhs_info.is_final {
                self.error(
                    rhs_block,
                    "cannot assign a non-final value to a 'final' variable",
                );
                return None;
            }
            if !lhs_info.is_final && rhs_info.is_final {
                self.error(
                    rhs_block,
                    "cannot assign a 'final' value to a non-final variable",
                );
                return None;
            }
        }
        Some(self.prog.add_stmt(Stmt::Assign { lhs, rhs }))
    }

    /// Parse `[index]` after an array variable name, producing the element
    /// access expression.
    fn parse_array_elem(
        &mut self,
        name_tok: &Token,
        var_id: VarId,
        var: &Variable,
    ) -> Option<ExprId> {
        self.bump(); // '['
        let idx_start = self.pos;
        let index = self.parse_expr()?;
        let idx_block = self.span_since(idx_start);
        if !self.expect("]") {
            return None;
        }
        if self.prog.info(index).ty != ExprType::Int {
            self.error(idx_block, "array index must be an integer expression");
            return None;
        }
        let poly = self.prog.info(index).poly;
        let (expr, ty) = match var.kind {
            VarKind::IntArray { .. } | VarKind::HostIntArray { .. } => (
                Expr::IntArrayElem {
                    var: var_id,
                    index,
                },
                ExprType::Int,
            ),
            VarKind::RealArray { .. } => (
                Expr::RealArrayElem {
                    var: var_id,
                    index,
                },
                ExprType::Real,
            ),
            VarKind::StrArray { .. } => (
                Expr::StrArrayElem {
                    var: var_id,
                    index,
                },
                ExprType::String,
            ),
            _ => {
                self.error(
                    name_tok.block,
                    &format!("variable '{}' is not an array", name_tok.text),
                );
                return None;
            }
        };
        Some(self.prog.add_expr(
            expr,
            ExprInfo {
                ty,
                unit: UnitType::None,
                is_final: false,
                konst: false,
                poly,
                has_prefix: false,
                array_size: None,
            },
        ))
    }

    // ---- function calls --------------------------------------------------

    fn parse_fn_call_stmt(&mut self) -> Option<StmtId> {
        let name_tok = self.peek()?.clone();
        let expr = self.parse_fn_call_expr(true)?;
        if expr == DISABLED_CALL {
            return Some(self.prog.add_stmt(Stmt::NoOp));
        }
        let ty = self.prog.info(expr).ty;
        if !matches!(ty, ExprType::Empty | ExprType::Int | ExprType::Real | ExprType::String) {
            self.error(
                name_tok.block,
                &format!("function '{}' cannot be used as a statement", name_tok.text),
            );
        }
        Some(self.prog.add_stmt(Stmt::FnCall { expr }))
    }

    /// Parse `name(args...)`. In statement position a call to a disabled
    /// function is legal and elided; the sentinel [`DISABLED_CALL`] is
    /// returned for it.
    fn parse_fn_call_expr(&mut self, stmt_position: bool) -> Option<ExprId> {
        let name_tok = self.bump()?;
        let fn_id = match self.provider.resolve(&name_tok.text) {
            Some(id) => id,
            None => {
                self.error(
                    name_tok.block,
                    &format!("no such built-in function '{}'", name_tok.text),
                );
                return None;
            }
        };

        let mut args = Vec::new();
        if self.peek_is("(") {
            self.bump();
            if !self.peek_is(")") {
                loop {
                    let arg = self.parse_expr()?;
                    args.push(arg);
                    if self.peek_is(",") {
                        self.bump();
                    } else {
                        break;
                    }
                }
            }
            if !self.expect(")") {
                return None;
            }
        } else if !stmt_position {
            self.expect("(");
            return None;
        }

        if self.provider.is_disabled(fn_id, &self.conditions) {
            if stmt_position {
                return Some(DISABLED_CALL);
            }
            self.error(
                name_tok.block,
                &format!(
                    "function '{}' is disabled by a preprocessor condition",
                    name_tok.text
                ),
            );
            return None;
        }

        let f = self.provider.function(fn_id);
        if args.len() < f.min_args() {
            self.error(
                name_tok.block,
                &format!(
                    "too few arguments to function '{}' (at least {} required)",
                    name_tok.text,
                    f.min_args()
                ),
            );
            return None;
        }
        if args.len() > f.max_args() {
            self.error(
                name_tok.block,
                &format!(
                    "too many arguments to function '{}' (at most {} accepted)",
                    name_tok.text,
                    f.max_args()
                ),
            );
            return None;
        }
        let mut arg_ok = true;
        for (i, arg) in args.iter().enumerate() {
            let info = *self.prog.info(*arg);
            if !f.accepts_arg_type(i, info.ty) {
                self.error(
                    name_tok.block,
                    &format!(
                        "argument {} of function '{}' has unsupported type {}",
                        i + 1,
                        name_tok.text,
                        info.ty.name()
                    ),
                );
                arg_ok = false;
                continue;
            }
            if info.ty.is_number() {
                if info.unit != UnitType::None && !f.accepts_arg_unit_type(i, info.unit) {
                    self.error(
                        name_tok.block,
                        &format!(
                            "argument {} of function '{}' must not have unit type {}",
                            i + 1,
                            name_tok.text,
                            info.unit
                        ),
                    );
                    arg_ok = false;
                }
                if info.has_prefix && !f.accepts_arg_unit_prefix(i, info.unit) {
                    self.error(
                        name_tok.block,
                        &format!(
                            "argument {} of function '{}' must not have a metric prefix",
                            i + 1,
                            name_tok.text
                        ),
                    );
                    arg_ok = false;
                }
                if info.is_final && !f.accepts_arg_final(i) {
                    self.error(
                        name_tok.block,
                        &format!(
                            "argument {} of function '{}' must not be 'final'",
                            i + 1,
                            name_tok.text
                        ),
                    );
                    arg_ok = false;
                }
            }
            if f.modifies_arg(i) && !self.is_assignable_expr(*arg) {
                self.error(
                    name_tok.block,
                    &format!(
                        "argument {} of function '{}' must be an assignable variable",
                        i + 1,
                        name_tok.text
                    ),
                );
                arg_ok = false;
            }
        }
        if arg_ok {
            let mut extra = Vec::new();
            f.check_args(&self.prog, &args, &mut |kind, message| {
                extra.push((kind, message));
            });
            for (kind, message) in extra {
                self.issues.push(ParserIssue {
                    kind,
                    message: format!("{}(): {}", name_tok.text, message),
                    block: name_tok.block,
                });
            }
        }

        let ty = f.return_type(&self.prog, &args);
        let unit = f.return_unit_type(&self.prog, &args);
        let is_final = f.returns_final(&self.prog, &args);
        let poly = args.iter().any(|a| self.prog.info(*a).poly);
        Some(self.prog.add_expr(
            Expr::FnCall { fn_id, args },
            ExprInfo {
                ty,
                unit,
                is_final,
                konst: false,
                poly,
                has_prefix: false,
                array_size: None,
            },
        ))
    }

    fn is_assignable_expr(&self, id: ExprId) -> bool {
        match self.prog.expr(id) {
            Expr::Var(v) | Expr::ArrayRef(v) => self.prog.var(*v).is_assignable(),
            Expr::IntArrayElem { var, .. }
            | Expr::RealArrayElem { var, .. }
            | Expr::StrArrayElem { var, .. } => self.prog.var(*var).is_assignable(),
            Expr::Final(inner) => self.is_assignable_expr(*inner),
            _ => false,
        }
    }

    // ---- expressions -----------------------------------------------------

    fn parse_expr(&mut self) -> Option<ExprId> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Option<ExprId> {
        let mut lhs = self.parse_and()?;
        loop {
            let op = if self.peek_is("or") {
                BoolOp::LogicalOr
            } else if self.peek_is(".or.") {
                BoolOp::BitOr
            } else {
                return Some(lhs);
            };
            let op_tok = self.bump().unwrap();
            let rhs = self.parse_and()?;
            lhs = self.make_bool(op, lhs, rhs, op_tok.block)?;
        }
    }

    fn parse_and(&mut self) -> Option<ExprId> {
        let mut lhs = self.parse_rel()?;
        loop {
            let op = if self.peek_is("and") {
                BoolOp::LogicalAnd
            } else if self.peek_is(".and.") {
                BoolOp::BitAnd
            } else {
                return Some(lhs);
            };
            let op_tok = self.bump().unwrap();
            let rhs = self.parse_rel()?;
            lhs = self.make_bool(op, lhs, rhs, op_tok.block)?;
        }
    }

    fn parse_rel(&mut self) -> Option<ExprId> {
        let lhs = self.parse_add()?;
        let op = match self.peek().map(|t| t.text.as_str()) {
            Some("<") => RelOp::Less,
            Some(">") => RelOp::Greater,
            Some("<=") => RelOp::LessEq,
            Some(">=") => RelOp::GreaterEq,
            Some("=") => RelOp::Equal,
            Some("#") => RelOp::NotEqual,
            _ => return Some(lhs),
        };
        let op_tok = self.bump().unwrap();
        let rhs = self.parse_add()?;
        self.make_relation(op, lhs, rhs, op_tok.block)
    }

    fn parse_add(&mut self) -> Option<ExprId> {
        let mut lhs = self.parse_mul()?;
        loop {
            let text = match self.peek() {
                Some(t) if matches!(t.text.as_str(), "+" | "-" | "&") => t.text.clone(),
                _ => return Some(lhs),
            };
            let op_tok = self.bump().unwrap();
            let rhs = self.parse_mul()?;
            lhs = match text.as_str() {
                "&" => self.make_concat(lhs, rhs, op_tok.block)?,
                "+" => self.make_binary(BinOp::Add, lhs, rhs, op_tok.block)?,
                _ => self.make_binary(BinOp::Sub, lhs, rhs, op_tok.block)?,
            };
        }
    }

    fn parse_mul(&mut self) -> Option<ExprId> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek().map(|t| t.text.as_str()) {
                Some("*") => BinOp::Mul,
                Some("/") => BinOp::Div,
                Some("mod") => BinOp::Mod,
                _ => return Some(lhs),
            };
            let op_tok = self.bump().unwrap();
            let rhs = self.parse_unary()?;
            lhs = self.make_binary(op, lhs, rhs, op_tok.block)?;
        }
    }

    fn parse_unary(&mut self) -> Option<ExprId> {
        let tok = self.peek()?.clone();
        match tok.text.as_str() {
            "-" => {
                self.bump();
                let inner = self.parse_unary()?;
                let info = *self.prog.info(inner);
                if !info.ty.is_number() {
                    self.error(tok.block, "operand of unary '-' must be a number");
                    return None;
                }
                Some(self.prog.add_expr(Expr::Neg(inner), info))
            }
            "+" => {
                self.bump();
                let inner = self.parse_unary()?;
                if !self.prog.info(inner).ty.is_number() {
                    self.error(tok.block, "operand of unary '+' must be a number");
                    return None;
                }
                Some(inner)
            }
            "not" => {
                self.bump();
                let inner = self.parse_unary()?;
                let info = *self.prog.info(inner);
                if info.ty != ExprType::Int {
                    self.error(tok.block, "operand of 'not' must be an integer");
                    return None;
                }
                if info.unit != UnitType::None {
                    self.error(tok.block, "operand of 'not' must not have a unit");
                    return None;
                }
                let mut out = info;
                out.unit = UnitType::None;
                out.has_prefix = false;
                Some(self.prog.add_expr(Expr::Not(inner), out))
            }
            ".not." => {
                self.bump();
                let inner = self.parse_unary()?;
                let info = *self.prog.info(inner);
                if info.ty != ExprType::Int {
                    self.error(tok.block, "operand of '.not.' must be an integer");
                    return None;
                }
                if info.unit != UnitType::None {
                    self.error(tok.block, "operand of '.not.' must not have a unit");
                    return None;
                }
                let mut out = info;
                out.unit = UnitType::None;
                out.has_prefix = false;
                Some(self.prog.add_expr(Expr::BitNot(inner), out))
            }
            "!" => {
                self.bump();
                let inner = self.parse_unary()?;
                let info = *self.prog.info(inner);
                if !info.ty.is_number() {
                    self.error(tok.block, "the 'final' marker applies to numbers only");
                    return None;
                }
                let mut out = info;
                out.is_final = true;
                Some(self.prog.add_expr(Expr::Final(inner), out))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Option<ExprId> {
        let tok = self.peek()?.clone();
        match &tok.kind {
            TokenKind::Operator if tok.text == "(" => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect(")");
                Some(inner)
            }
            TokenKind::IntLiteral {
                value,
                factor,
                unit,
                ..
            } => {
                self.bump();
                let (value, factor, unit) = (*value, *factor, *unit);
                Some(self.prog.add_expr(
                    Expr::IntLit { value, factor },
                    ExprInfo {
                        ty: ExprType::Int,
                        unit,
                        is_final: false,
                        konst: true,
                        poly: false,
                        has_prefix: factor != NO_FACTOR,
                        array_size: None,
                    },
                ))
            }
            TokenKind::RealLiteral {
                value,
                factor,
                unit,
                ..
            } => {
                self.bump();
                let (value, factor, unit) = (*value, *factor, *unit);
                Some(self.prog.add_expr(
                    Expr::RealLit { value, factor },
                    ExprInfo {
                        ty: ExprType::Real,
                        unit,
                        is_final: false,
                        konst: true,
                        poly: false,
                        has_prefix: factor != NO_FACTOR,
                        array_size: None,
                    },
                ))
            }
            TokenKind::StringLiteral(s) => {
                let s = s.clone();
                self.bump();
                Some(self.prog.add_expr(
                    Expr::StrLit(s),
                    ExprInfo {
                        ty: ExprType::String,
                        unit: UnitType::None,
                        is_final: false,
                        konst: true,
                        poly: false,
                        has_prefix: false,
                        array_size: None,
                    },
                ))
            }
            TokenKind::IntVarName
            | TokenKind::RealVarName
            | TokenKind::StrVarName
            | TokenKind::IntArrVarName
            | TokenKind::RealArrVarName
            | TokenKind::StrArrVarName => self.parse_var_expr(),
            TokenKind::Identifier => self.parse_fn_call_expr(false),
            _ => {
                let message = if tok.text.starts_with('"') {
                    "unterminated string literal".to_string()
                } else {
                    format!("unexpected token '{}' in expression", tok.text)
                };
                self.error(tok.block, &message);
                self.bump();
                None
            }
        }
    }

    fn parse_var_expr(&mut self) -> Option<ExprId> {
        let name_tok = self.bump()?;
        let var_id = match self.symbols.get(&name_tok.text) {
            Some(id) => *id,
            None => {
                self.error(
                    name_tok.block,
                    &format!("undeclared variable '{}'", name_tok.text),
                );
                return None;
            }
        };
        let var = self.prog.var(var_id).clone();
        let is_array = var.array_len().is_some() || matches!(var.kind, VarKind::HostIntArray { .. });

        if is_array {
            if self.peek_is("[") {
                return self.parse_array_elem(&name_tok, var_id, &var);
            }
            // whole-array reference (built-in function argument)
            let ty = var.expr_type();
            let array_size = var.array_len().map(|l| l as u32);
            return Some(self.prog.add_expr(
                Expr::ArrayRef(var_id),
                ExprInfo {
                    ty,
                    unit: UnitType::None,
                    is_final: false,
                    konst: var.is_const,
                    poly: false,
                    has_prefix: false,
                    array_size,
                },
            ));
        }

        let has_prefix = match &var.kind {
            VarKind::ConstInt { factor, .. } | VarKind::ConstReal { factor, .. } => {
                *factor != NO_FACTOR
            }
            _ => false,
        };
        Some(self.prog.add_expr(
            Expr::Var(var_id),
            ExprInfo {
                ty: var.expr_type(),
                unit: var.unit,
                is_final: var.is_final,
                konst: var.is_const,
                poly: var.is_poly,
                has_prefix,
                array_size: None,
            },
        ))
    }

    // ---- typed node builders ---------------------------------------------

    fn make_binary(
        &mut self,
        op: BinOp,
        lhs: ExprId,
        rhs: ExprId,
        op_block: CodeBlock,
    ) -> Option<ExprId> {
        let l = *self.prog.info(lhs);
        let r = *self.prog.info(rhs);
        let op_name = match op {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "mod",
        };
        if !l.ty.is_number() || !r.ty.is_number() {
            self.error(
                op_block,
                &format!("operands of '{}' must be numbers", op_name),
            );
            return None;
        }
        if l.ty != r.ty {
            self.error(
                op_block,
                &format!(
                    "left and right operands of '{}' must have the same type ({} vs. {})",
                    op_name,
                    l.ty.name(),
                    r.ty.name()
                ),
            );
            return None;
        }

        let unit = match op {
            BinOp::Add | BinOp::Sub => {
                if l.unit != r.unit {
                    self.error(
                        op_block,
                        &format!(
                            "operands of '{}' must have the same unit type ({} vs. {})",
                            op_name, l.unit, r.unit
                        ),
                    );
                    return None;
                }
                l.unit
            }
            BinOp::Mul => {
                if l.unit != UnitType::None && r.unit != UnitType::None {
                    self.error(
                        op_block,
                        "at most one operand of '*' may have a unit type",
                    );
                    return None;
                }
                if l.unit != UnitType::None { l.unit } else { r.unit }
            }
            BinOp::Div => {
                if l.unit == r.unit {
                    UnitType::None
                } else if r.unit == UnitType::None {
                    l.unit
                } else {
                    self.error(
                        op_block,
                        "the divisor may only have a unit type if the dividend has the same one",
                    );
                    return None;
                }
            }
            BinOp::Mod => {
                if l.ty != ExprType::Int {
                    self.error(op_block, "operands of 'mod' must be integers");
                    return None;
                }
                if l.unit != UnitType::None || r.unit != UnitType::None {
                    self.error(op_block, "operands of 'mod' must not have a unit type");
                    return None;
                }
                UnitType::None
            }
        };

        if l.is_final != r.is_final {
            self.warn(
                op_block,
                &format!(
                    "only one operand of '{}' is 'final', the result will be 'final'",
                    op_name
                ),
            );
        }

        Some(self.prog.add_expr(
            Expr::Binary { op, lhs, rhs },
            ExprInfo {
                ty: l.ty,
                unit,
                is_final: l.is_final || r.is_final,
                konst: l.konst && r.konst,
                poly: l.poly || r.poly,
                has_prefix: l.has_prefix || r.has_prefix,
                array_size: None,
            },
        ))
    }

    fn make_relation(
        &mut self,
        op: RelOp,
        lhs: ExprId,
        rhs: ExprId,
        op_block: CodeBlock,
    ) -> Option<ExprId> {
        let l = *self.prog.info(lhs);
        let r = *self.prog.info(rhs);
        if l.ty == ExprType::String || r.ty == ExprType::String {
            if l.ty != ExprType::String || r.ty != ExprType::String {
                self.error(
                    op_block,
                    "strings can only be compared with other strings",
                );
                return None;
            }
            if !matches!(op, RelOp::Equal | RelOp::NotEqual) {
                self.error(op_block, "strings can only be compared with '=' and '#'");
                return None;
            }
        } else {
            if !l.ty.is_number() || !r.ty.is_number() {
                self.error(op_block, "operands of a comparison must be numbers");
                return None;
            }
            if l.unit != r.unit {
                self.error(
                    op_block,
                    &format!(
                        "compared operands must have the same unit type ({} vs. {})",
                        l.unit, r.unit
                    ),
                );
                return None;
            }
        }
        Some(self.prog.add_expr(
            Expr::Relation { op, lhs, rhs },
            ExprInfo {
                ty: ExprType::Int,
                unit: UnitType::None,
                is_final: false,
                konst: l.konst && r.konst,
                poly: l.poly || r.poly,
                has_prefix: false,
                array_size: None,
            },
        ))
    }

    fn make_bool(
        &mut self,
        op: BoolOp,
        lhs: ExprId,
        rhs: ExprId,
        op_block: CodeBlock,
    ) -> Option<ExprId> {
        let l = *self.prog.info(lhs);
        let r = *self.prog.info(rhs);
        let op_name = match op {
            BoolOp::LogicalAnd => "and",
            BoolOp::LogicalOr => "or",
            BoolOp::BitAnd => ".and.",
            BoolOp::BitOr => ".or.",
        };
        if l.ty != ExprType::Int || r.ty != ExprType::Int {
            self.error(
                op_block,
                &format!("operands of '{}' must be integers", op_name),
            );
            return None;
        }
        if l.unit != UnitType::None || r.unit != UnitType::None {
            self.error(
                op_block,
                &format!("operands of '{}' must not have a unit type", op_name),
            );
            return None;
        }
        if l.is_final != r.is_final {
            self.warn(
                op_block,
                &format!(
                    "only one operand of '{}' is 'final', the result will be 'final'",
                    op_name
                ),
            );
        }
        Some(self.prog.add_expr(
            Expr::Bool { op, lhs, rhs },
            ExprInfo {
                ty: ExprType::Int,
                unit: UnitType::None,
                is_final: l.is_final || r.is_final,
                konst: l.konst && r.konst,
                poly: l.poly || r.poly,
                has_prefix: false,
                array_size: None,
            },
        ))
    }

    fn make_concat(&mut self, lhs: ExprId, rhs: ExprId, op_block: CodeBlock) -> Option<ExprId> {
        let l = *self.prog.info(lhs);
        let r = *self.prog.info(rhs);
        for info in [&l, &r] {
            if !matches!(info.ty, ExprType::Int | ExprType::Real | ExprType::String) {
                self.error(
                    op_block,
                    "operands of '&' must be strings, integers or real numbers",
                );
                return None;
            }
        }
        Some(self.prog.add_expr(
            Expr::Concat { lhs, rhs },
            ExprInfo {
                ty: ExprType::String,
                unit: UnitType::None,
                is_final: false,
                konst: l.konst && r.konst,
                poly: l.poly || r.poly,
                has_prefix: false,
                array_size: None,
            },
        ))
    }

    // ---- post-parse analyses ---------------------------------------------

    fn stmt_is_poly(&self, id: StmtId) -> bool {
        match self.prog.stmt(id) {
            Stmt::NoOp => false,
            Stmt::List { children } => children.iter().any(|c| self.stmt_is_poly(*c)),
            Stmt::Sub { body } => self.stmt_is_poly(*body),
            Stmt::Assign { lhs, rhs } => {
                self.prog.info(*lhs).poly || self.prog.info(*rhs).poly
            }
            Stmt::FnCall { expr } => self.prog.info(*expr).poly,
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                self.prog.info(*cond).poly
                    || self.stmt_is_poly(*then_body)
                    || else_body.is_some_and(|e| self.stmt_is_poly(e))
            }
            Stmt::Select { value, cases } => {
                self.prog.info(*value).poly
                    || cases.iter().any(|c| {
                        self.prog.info(c.from).poly
                            || c.to.is_some_and(|t| self.prog.info(t).poly)
                            || self.stmt_is_poly(c.body)
                    })
            }
            Stmt::While { cond, body } => self.prog.info(*cond).poly || self.stmt_is_poly(*body),
            Stmt::Sync { body } => self.stmt_is_poly(*body),
        }
    }

    /// Maximum control stack depth any handler of this script can reach.
    fn required_stack_size(&self) -> usize {
        let mut max = 1;
        for handler in &self.prog.handlers {
            max = max.max(self.stack_size_of(handler.body));
        }
        max
    }

    fn stack_size_of(&self, id: StmtId) -> usize {
        match self.prog.stmt_class(id) {
            StmtClass::Leaf | StmtClass::NoOp => 1,
            StmtClass::List => match self.prog.stmt(id) {
                Stmt::List { children } => {
                    1 + children
                        .iter()
                        .map(|c| self.stack_size_of(*c))
                        .max()
                        .unwrap_or(0)
                }
                _ => 1,
            },
            StmtClass::Sub => match self.prog.stmt(id) {
                Stmt::Sub { body } => 1 + self.stack_size_of(*body),
                _ => 1,
            },
            StmtClass::Branch => match self.prog.stmt(id) {
                Stmt::If {
                    then_body,
                    else_body,
                    ..
                } => {
                    let mut max = self.stack_size_of(*then_body);
                    if let Some(e) = else_body {
                        max = max.max(self.stack_size_of(*e));
                    }
                    1 + max
                }
                Stmt::Select { cases, .. } => {
                    1 + cases
                        .iter()
                        .map(|c| self.stack_size_of(c.body))
                        .max()
                        .unwrap_or(0)
                }
                _ => 1,
            },
            StmtClass::Loop => match self.prog.stmt(id) {
                Stmt::While { body, .. } => 1 + self.stack_size_of(*body),
                _ => 1,
            },
            StmtClass::Sync => match self.prog.stmt(id) {
                Stmt::Sync { body } => 1 + self.stack_size_of(*body),
                _ => 1,
            },
        }
    }
}

/// Sentinel expression id for calls elided by `is_disabled` (e.g.
/// `message()` under `NKSP_NO_MESSAGE`). Never stored in the tree.
const DISABLED_CALL: ExprId = ExprId(u32::MAX);
