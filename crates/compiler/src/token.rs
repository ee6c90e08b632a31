//! Token model of the NKSP scanner.
//!
//! Every token carries a byte-accurate [`CodeBlock`] span so that
//! diagnostics and editor tooling can point at exact source locations.

use nksp_core::{CodeBlock, UnitType, vmfloat, vmint};

/// Lexical class of one source token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// A line feed. Kept in the raw stream for editor tooling, skipped by
    /// the parser.
    Newline,
    /// A `{ ... }` comment (may span lines).
    Comment,
    /// Language keyword (`on`, `declare`, `while`, ...).
    Keyword,
    /// Plain identifier: function names, handler names, preprocessor
    /// directive and condition names.
    Identifier,
    /// `$name`
    IntVarName,
    /// `~name`
    RealVarName,
    /// `@name`
    StrVarName,
    /// `%name`
    IntArrVarName,
    /// `?name`
    RealArrVarName,
    /// `!name` followed by `[` (distinguished from the final marker by the
    /// scanner's lookahead).
    StrArrVarName,
    /// Integer literal, possibly with metric prefixes and a unit suffix.
    /// `suffix_bytes` counts the trailing prefix+unit bytes inside the
    /// token text (used to split the token for syntax highlighting).
    IntLiteral {
        value: vmint,
        factor: vmfloat,
        unit: UnitType,
        suffix_bytes: u8,
        unit_bytes: u8,
    },
    /// Real number literal, same annotations as [`TokenKind::IntLiteral`].
    RealLiteral {
        value: vmfloat,
        factor: vmfloat,
        unit: UnitType,
        suffix_bytes: u8,
        unit_bytes: u8,
    },
    /// String literal; payload is the unescaped value.
    StringLiteral(String),
    /// Operator or punctuation; the token text disambiguates.
    Operator,
    /// Anything the scanner did not recognize.
    Other,
}

/// One scanned token.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub block: CodeBlock,
}

impl Token {
    pub fn is_significant(&self) -> bool {
        !matches!(self.kind, TokenKind::Newline | TokenKind::Comment)
    }

    /// Variable name without its sigil.
    pub fn var_name(&self) -> &str {
        match self.kind {
            TokenKind::StrArrVarName => &self.text[1..],
            TokenKind::IntVarName
            | TokenKind::RealVarName
            | TokenKind::StrVarName
            | TokenKind::IntArrVarName
            | TokenKind::RealArrVarName => &self.text[1..],
            _ => &self.text,
        }
    }
}

/// Keywords recognized by the scanner.
pub const KEYWORDS: &[&str] = &[
    "on",
    "end",
    "declare",
    "const",
    "polyphonic",
    "patch",
    "if",
    "else",
    "select",
    "case",
    "to",
    "while",
    "sync",
    "function",
    "call",
    "and",
    "or",
    "not",
    "mod",
];

/// Event handler names; used by the parser after `on` and by the syntax
/// highlighting classifier.
pub const EVENT_HANDLER_NAMES: &[&str] = &["init", "note", "release", "controller", "rpn", "nrpn"];

/// Preprocessor directive names.
pub const PREPROCESSOR_DIRECTIVES: &[&str] = &[
    "SET_CONDITION",
    "RESET_CONDITION",
    "USE_CODE_IF",
    "USE_CODE_IF_NOT",
    "END_USE_CODE",
];
