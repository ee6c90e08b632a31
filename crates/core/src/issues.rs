//! Source spans and structured parser diagnostics.

/// Byte- and line-accurate span of a region in the script source.
///
/// Lines and columns are 1-based, byte positions 0-based. Elided
/// preprocessor regions are reported with this same structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeBlock {
    pub first_line: u32,
    pub last_line: u32,
    pub first_column: u32,
    pub last_column: u32,
    pub first_byte: usize,
    pub length_bytes: usize,
}

impl CodeBlock {
    /// Span covering both blocks.
    pub fn merged(&self, other: &CodeBlock) -> CodeBlock {
        CodeBlock {
            first_line: self.first_line,
            last_line: other.last_line,
            first_column: self.first_column,
            last_column: other.last_column,
            first_byte: self.first_byte,
            length_bytes: (other.first_byte + other.length_bytes).saturating_sub(self.first_byte),
        }
    }
}

/// Severity of a [`ParserIssue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// The script cannot be executed.
    Error,
    /// Suspicious but legal; never blocks execution.
    Warning,
}

/// One problem the parser noticed, with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct ParserIssue {
    pub kind: IssueKind,
    pub message: String,
    pub block: CodeBlock,
}

impl ParserIssue {
    pub fn is_error(&self) -> bool {
        self.kind == IssueKind::Error
    }

    pub fn is_warning(&self) -> bool {
        self.kind == IssueKind::Warning
    }
}

impl std::fmt::Display for ParserIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            IssueKind::Error => "ERROR",
            IssueKind::Warning => "WARNING",
        };
        write!(
            f,
            "[{}] line {}, column {}: {}",
            kind, self.block.first_line, self.block.first_column, self.message
        )
    }
}
