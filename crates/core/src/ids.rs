//! Arena handles shared between the front-end and the executor.
//!
//! The execution tree is stored in index arenas; nodes reference each other
//! by these ids instead of pointers, which keeps the tree free of cycles
//! and `Send + Sync` once parsing finished.

/// Handle of an expression node in the program arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(pub u32);

/// Handle of a statement node in the program arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtId(pub u32);

/// Handle of a variable in the program's symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub u32);

/// Handle of a built-in function in the VM's function table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FnId(pub u32);

/// Handle of an event handler in the program's handler table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub u32);
