//! The typed, annotated execution tree.
//!
//! All nodes live in index arenas owned by [`Program`]; nodes reference
//! each other through the id newtypes from `nksp_core::ids`. This keeps the
//! tree cycle-free and `Send + Sync` once parsing finished — many exec
//! contexts may then walk it concurrently without synchronization.
//!
//! Each expression carries a parse-time [`ExprInfo`] annotation (type,
//! unit type, finalness, constness, polyphonic reach); values and prefix
//! factors are runtime properties evaluated by `eval`.

use nksp_core::units::conv_int_to_factor;
use nksp_core::{ExprId, HandlerId, StmtId, UnitType, VarId, vmfloat, vmint};

/// Data type an expression evaluates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprType {
    Empty,
    Int,
    Real,
    String,
    IntArray,
    RealArray,
    StringArray,
}

impl ExprType {
    pub fn is_number(&self) -> bool {
        matches!(self, ExprType::Int | ExprType::Real)
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self,
            ExprType::IntArray | ExprType::RealArray | ExprType::StringArray
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExprType::Empty => "empty",
            ExprType::Int => "integer",
            ExprType::Real => "real number",
            ExprType::String => "string",
            ExprType::IntArray => "integer array",
            ExprType::RealArray => "real number array",
            ExprType::StringArray => "string array",
        }
    }
}

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// Relational operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    Less,
    Greater,
    LessEq,
    GreaterEq,
    Equal,
    NotEqual,
}

/// Logical (`and`/`or`) and bitwise (`.and.`/`.or.`) operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    LogicalAnd,
    LogicalOr,
    BitAnd,
    BitOr,
}

/// Expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntLit { value: vmint, factor: vmfloat },
    RealLit { value: vmfloat, factor: vmfloat },
    StrLit(String),
    /// Scalar variable read (including const, built-in and dynamic
    /// variables; the symbol decides).
    Var(VarId),
    /// Whole-array reference, used as built-in function argument.
    ArrayRef(VarId),
    IntArrayElem { var: VarId, index: ExprId },
    RealArrayElem { var: VarId, index: ExprId },
    StrArrayElem { var: VarId, index: ExprId },
    Binary { op: BinOp, lhs: ExprId, rhs: ExprId },
    Relation { op: RelOp, lhs: ExprId, rhs: ExprId },
    Bool { op: BoolOp, lhs: ExprId, rhs: ExprId },
    Neg(ExprId),
    Not(ExprId),
    BitNot(ExprId),
    Final(ExprId),
    Concat { lhs: ExprId, rhs: ExprId },
    FnCall { fn_id: nksp_core::FnId, args: Vec<ExprId> },
}

/// Parse-time annotations of one expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExprInfo {
    pub ty: ExprType,
    pub unit: UnitType,
    pub is_final: bool,
    /// Constant expression (usable as array size / const initializer).
    pub konst: bool,
    /// Touches polyphonic storage somewhere below.
    pub poly: bool,
    /// Statically certain to carry a metric prefix (literals and const
    /// values; variables are unknown and count as not carrying one).
    pub has_prefix: bool,
    /// Element count, for array-typed expressions with a static size.
    pub array_size: Option<u32>,
}

impl ExprInfo {
    pub fn plain(ty: ExprType) -> Self {
        ExprInfo {
            ty,
            unit: UnitType::None,
            is_final: false,
            konst: false,
            poly: false,
            has_prefix: false,
            array_size: None,
        }
    }
}

/// Statement node.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    NoOp,
    List { children: Vec<StmtId> },
    /// Subroutine boundary: event handler bodies and user functions.
    /// `exit()` and end-of-function unwind to the innermost one.
    Sub { body: StmtId },
    Assign { lhs: ExprId, rhs: ExprId },
    FnCall { expr: ExprId },
    If { cond: ExprId, then_body: StmtId, else_body: Option<StmtId> },
    Select { value: ExprId, cases: Vec<CaseBranch> },
    While { cond: ExprId, body: StmtId },
    Sync { body: StmtId },
}

/// One `case N` / `case N to M` branch of a `select` block.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseBranch {
    pub from: ExprId,
    pub to: Option<ExprId>,
    pub body: StmtId,
}

/// Executor-facing classification of a statement node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StmtClass {
    Leaf,
    List,
    Sub,
    Branch,
    Loop,
    Sync,
    NoOp,
}

/// Event handler kind; the discriminants are exposed to scripts through
/// the `$NI_CB_TYPE_*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Init = 0,
    Note = 1,
    Release = 2,
    Controller = 3,
    Rpn = 4,
    Nrpn = 5,
}

impl HandlerKind {
    pub fn from_name(name: &str) -> Option<HandlerKind> {
        Some(match name {
            "init" => HandlerKind::Init,
            "note" => HandlerKind::Note,
            "release" => HandlerKind::Release,
            "controller" => HandlerKind::Controller,
            "rpn" => HandlerKind::Rpn,
            "nrpn" => HandlerKind::Nrpn,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            HandlerKind::Init => "init",
            HandlerKind::Note => "note",
            HandlerKind::Release => "release",
            HandlerKind::Controller => "controller",
            HandlerKind::Rpn => "rpn",
            HandlerKind::Nrpn => "nrpn",
        }
    }
}

/// One `on <name> ... end on` block.
#[derive(Debug, Clone)]
pub struct Handler {
    pub kind: HandlerKind,
    /// A [`Stmt::Sub`] node wrapping the handler body.
    pub body: StmtId,
    /// Whether the handler touches polyphonic variables.
    pub polyphonic: bool,
}

/// One `function <name> ... end function` block.
#[derive(Debug, Clone)]
pub struct UserFn {
    pub name: String,
    /// A [`Stmt::Sub`] node wrapping the function body.
    pub body: StmtId,
}

/// Storage class and location of a declared or registered variable.
#[derive(Debug, Clone)]
pub enum VarKind {
    Int { slot: usize, factor_slot: usize },
    Real { slot: usize, factor_slot: usize },
    Str { slot: usize },
    IntArray { slot: usize, factor_slot: usize, len: usize },
    RealArray { slot: usize, factor_slot: usize, len: usize },
    StrArray { slot: usize, len: usize },
    ConstInt { value: vmint, factor: vmfloat },
    ConstReal { value: vmfloat, factor: vmfloat },
    ConstStr { value: String },
    /// Host-registered integer scalar accessed through a pointer object.
    HostInt { binding: usize, readonly: bool },
    /// Host-registered 8 bit integer array view.
    HostIntArray { binding: usize, readonly: bool },
    /// Host-registered dynamic integer variable (callback on access).
    DynInt { binding: usize },
}

/// A declared script variable or registered built-in variable.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
    pub unit: UnitType,
    pub is_final: bool,
    pub is_const: bool,
    pub is_poly: bool,
    pub is_patch: bool,
}

impl Variable {
    /// Whether scripts may assign to this variable.
    pub fn is_assignable(&self) -> bool {
        match &self.kind {
            VarKind::ConstInt { .. } | VarKind::ConstReal { .. } | VarKind::ConstStr { .. } => false,
            VarKind::HostInt { readonly, .. } | VarKind::HostIntArray { readonly, .. } => !readonly,
            VarKind::DynInt { .. } => false,
            _ => !self.is_const,
        }
    }

    pub fn expr_type(&self) -> ExprType {
        match &self.kind {
            VarKind::Int { .. } | VarKind::ConstInt { .. } | VarKind::HostInt { .. }
            | VarKind::DynInt { .. } => ExprType::Int,
            VarKind::Real { .. } | VarKind::ConstReal { .. } => ExprType::Real,
            VarKind::Str { .. } | VarKind::ConstStr { .. } => ExprType::String,
            VarKind::IntArray { .. } | VarKind::HostIntArray { .. } => ExprType::IntArray,
            VarKind::RealArray { .. } => ExprType::RealArray,
            VarKind::StrArray { .. } => ExprType::StringArray,
        }
    }

    pub fn array_len(&self) -> Option<usize> {
        match &self.kind {
            VarKind::IntArray { len, .. }
            | VarKind::RealArray { len, .. }
            | VarKind::StrArray { len, .. } => Some(*len),
            _ => None,
        }
    }
}

/// Memory pool sizes computed by the parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolLayout {
    pub global_ints: usize,
    pub global_reals: usize,
    pub global_factors: usize,
    pub global_strs: usize,
    pub poly_ints: usize,
    pub poly_reals: usize,
    pub poly_factors: usize,
}

/// Initial pool contents established at script load (array initializer
/// lists; everything else starts zeroed).
#[derive(Debug, Clone, PartialEq)]
pub enum PoolInit {
    Int { slot: usize, value: vmint },
    Real { slot: usize, value: vmfloat },
    Factor { slot: usize, value: vmfloat },
    Str { slot: usize, value: String },
}

/// The immutable compiled form of a script: node arenas, symbol table,
/// handler table, memory layout and the executor's stack requirement.
#[derive(Debug, Default)]
pub struct Program {
    pub exprs: Vec<Expr>,
    pub infos: Vec<ExprInfo>,
    pub stmts: Vec<Stmt>,
    pub vars: Vec<Variable>,
    pub handlers: Vec<Handler>,
    pub user_fns: Vec<UserFn>,
    pub layout: PoolLayout,
    pub init_image: Vec<PoolInit>,
    pub required_stack_size: usize,
}

impl Program {
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.0 as usize]
    }

    pub fn info(&self, id: ExprId) -> &ExprInfo {
        &self.infos[id.0 as usize]
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.0 as usize]
    }

    pub fn var(&self, id: VarId) -> &Variable {
        &self.vars[id.0 as usize]
    }

    pub fn add_expr(&mut self, expr: Expr, info: ExprInfo) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(expr);
        self.infos.push(info);
        id
    }

    pub fn add_stmt(&mut self, stmt: Stmt) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(stmt);
        id
    }

    pub fn stmt_class(&self, id: StmtId) -> StmtClass {
        match self.stmt(id) {
            Stmt::NoOp => StmtClass::NoOp,
            Stmt::List { .. } => StmtClass::List,
            Stmt::Sub { .. } => StmtClass::Sub,
            Stmt::Assign { .. } | Stmt::FnCall { .. } => StmtClass::Leaf,
            Stmt::If { .. } | Stmt::Select { .. } => StmtClass::Branch,
            Stmt::While { .. } => StmtClass::Loop,
            Stmt::Sync { .. } => StmtClass::Sync,
        }
    }

    /// Branch child `i` of an `if` or `select` statement.
    pub fn branch(&self, id: StmtId, i: i64) -> Option<StmtId> {
        if i < 0 {
            return None;
        }
        match self.stmt(id) {
            Stmt::If {
                then_body,
                else_body,
                ..
            } => match i {
                0 => Some(*then_body),
                1 => *else_body,
                _ => None,
            },
            Stmt::Select { cases, .. } => cases.get(i as usize).map(|c| c.body),
            _ => None,
        }
    }

    pub fn handler(&self, id: HandlerId) -> Option<&Handler> {
        self.handlers.get(id.0 as usize)
    }

    pub fn handler_by_name(&self, name: &str) -> Option<HandlerId> {
        self.handlers
            .iter()
            .position(|h| h.kind.name() == name)
            .map(|i| HandlerId(i as u32))
    }

    // ---- constant folding ------------------------------------------------

    /// Fold a constant integer expression to its value and prefix factor.
    /// Returns `None` for non-constant expressions.
    pub fn fold_int(&self, id: ExprId) -> Option<(vmint, vmfloat)> {
        match self.expr(id) {
            Expr::IntLit { value, factor } => Some((*value, *factor)),
            Expr::Var(var) => match &self.var(*var).kind {
                VarKind::ConstInt { value, factor } => Some((*value, *factor)),
                _ => None,
            },
            Expr::Neg(inner) => self.fold_int(*inner).map(|(v, f)| (v.wrapping_neg(), f)),
            Expr::Final(inner) => self.fold_int(*inner),
            Expr::Not(inner) => self
                .fold_int(*inner)
                .map(|(v, _)| ((v == 0) as vmint, nksp_core::NO_FACTOR)),
            Expr::BitNot(inner) => self.fold_int(*inner).map(|(v, f)| (!v, f)),
            Expr::Binary { op, lhs, rhs } => {
                let (lv, lf) = self.fold_int(*lhs)?;
                let (rv, rf) = self.fold_int(*rhs)?;
                Some(fold_int_binary(*op, lv, lf, rv, rf))
            }
            Expr::Bool { op, lhs, rhs } => {
                let (lv, _) = self.fold_int(*lhs)?;
                let (rv, _) = self.fold_int(*rhs)?;
                let v = match op {
                    BoolOp::LogicalAnd => (lv != 0 && rv != 0) as vmint,
                    BoolOp::LogicalOr => (lv != 0 || rv != 0) as vmint,
                    BoolOp::BitAnd => lv & rv,
                    BoolOp::BitOr => lv | rv,
                };
                Some((v, nksp_core::NO_FACTOR))
            }
            _ => None,
        }
    }

    /// Fold a constant real expression.
    pub fn fold_real(&self, id: ExprId) -> Option<(vmfloat, vmfloat)> {
        match self.expr(id) {
            Expr::RealLit { value, factor } => Some((*value, *factor)),
            Expr::Var(var) => match &self.var(*var).kind {
                VarKind::ConstReal { value, factor } => Some((*value, *factor)),
                _ => None,
            },
            Expr::Neg(inner) => self.fold_real(*inner).map(|(v, f)| (-v, f)),
            Expr::Final(inner) => self.fold_real(*inner),
            Expr::Binary { op, lhs, rhs } => {
                let (lv, lf) = self.fold_real(*lhs)?;
                let (rv, rf) = self.fold_real(*rhs)?;
                Some(fold_real_binary(*op, lv, lf, rv, rf))
            }
            _ => None,
        }
    }

    /// Fold a constant string expression.
    pub fn fold_str(&self, id: ExprId) -> Option<String> {
        match self.expr(id) {
            Expr::StrLit(s) => Some(s.clone()),
            Expr::Var(var) => match &self.var(*var).kind {
                VarKind::ConstStr { value } => Some(value.clone()),
                _ => None,
            },
            Expr::Concat { lhs, rhs } => {
                let l = self.fold_cast_str(*lhs)?;
                let r = self.fold_cast_str(*rhs)?;
                Some(l + &r)
            }
            _ => None,
        }
    }

    fn fold_cast_str(&self, id: ExprId) -> Option<String> {
        match self.info(id).ty {
            ExprType::String => self.fold_str(id),
            ExprType::Int => {
                let (v, f) = self.fold_int(id)?;
                Some(format!(
                    "{}{}{}",
                    v,
                    nksp_core::units::factor_short_str(f),
                    self.info(id).unit.token()
                ))
            }
            ExprType::Real => {
                let (v, f) = self.fold_real(id)?;
                Some(format!(
                    "{}{}{}",
                    v,
                    nksp_core::units::factor_short_str(f),
                    self.info(id).unit.token()
                ))
            }
            _ => None,
        }
    }
}

fn fold_int_binary(op: BinOp, lv: vmint, lf: vmfloat, rv: vmint, rf: vmfloat) -> (vmint, vmfloat) {
    match op {
        BinOp::Add | BinOp::Sub => {
            let (l, r, f) = if lf == rf {
                (lv, rv, lf)
            } else if lf < rf {
                (lv, conv_int_to_factor(rv, rf, lf), lf)
            } else {
                (conv_int_to_factor(lv, lf, rf), rv, rf)
            };
            let v = if op == BinOp::Add {
                l.wrapping_add(r)
            } else {
                l.wrapping_sub(r)
            };
            (v, f)
        }
        BinOp::Mul => (lv.wrapping_mul(rv), lf * rf),
        BinOp::Div => {
            if rv == 0 {
                (0, lf / rf)
            } else {
                (lv.wrapping_div(rv), lf / rf)
            }
        }
        BinOp::Mod => {
            if rv == 0 {
                (0, nksp_core::NO_FACTOR)
            } else {
                (lv.wrapping_rem(rv), nksp_core::NO_FACTOR)
            }
        }
    }
}

fn fold_real_binary(
    op: BinOp,
    lv: vmfloat,
    lf: vmfloat,
    rv: vmfloat,
    rf: vmfloat,
) -> (vmfloat, vmfloat) {
    match op {
        BinOp::Add | BinOp::Sub => {
            let (l, r, f) = if lf == rf {
                (lv, rv, lf)
            } else if lf < rf {
                (lv, rv * (rf / lf), lf)
            } else {
                (lv * (lf / rf), rv, rf)
            };
            (if op == BinOp::Add { l + r } else { l - r }, f)
        }
        BinOp::Mul => (lv * rv, lf * rf),
        BinOp::Div => {
            if rv == 0.0 {
                (0.0, lf / rf)
            } else {
                (lv / rv, lf / rf)
            }
        }
        BinOp::Mod => (0.0, nksp_core::NO_FACTOR),
    }
}
