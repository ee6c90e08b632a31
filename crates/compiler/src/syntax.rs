//! Lex-only path for external editors.
//!
//! Returns every source token with a byte-accurate span and a class
//! suitable for syntax highlighting. Number literals are split into their
//! number, metric prefix and standard unit parts so editors can color them
//! individually.

use crate::lexer::tokenize;
use crate::token::{EVENT_HANDLER_NAMES, PREPROCESSOR_DIRECTIVES, TokenKind};
use nksp_core::CodeBlock;

/// Class of a [`SourceToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTokenKind {
    Newline,
    Comment,
    Keyword,
    EventHandlerName,
    IntVar,
    RealVar,
    StrVar,
    IntArrVar,
    RealArrVar,
    StrArrVar,
    Number,
    MetricPrefix,
    StdUnit,
    String,
    Preprocessor,
    Identifier,
    Other,
}

/// One classified source token for editor tooling.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceToken {
    pub text: String,
    pub block: CodeBlock,
    kind: SourceTokenKind,
}

impl SourceToken {
    pub fn kind(&self) -> SourceTokenKind {
        self.kind
    }

    pub fn is_newline(&self) -> bool {
        self.kind == SourceTokenKind::Newline
    }

    pub fn is_comment(&self) -> bool {
        self.kind == SourceTokenKind::Comment
    }

    pub fn is_keyword(&self) -> bool {
        self.kind == SourceTokenKind::Keyword
    }

    pub fn is_event_handler_name(&self) -> bool {
        self.kind == SourceTokenKind::EventHandlerName
    }

    pub fn is_variable_name(&self) -> bool {
        matches!(
            self.kind,
            SourceTokenKind::IntVar
                | SourceTokenKind::RealVar
                | SourceTokenKind::StrVar
                | SourceTokenKind::IntArrVar
                | SourceTokenKind::RealArrVar
                | SourceTokenKind::StrArrVar
        )
    }

    pub fn is_int_variable(&self) -> bool {
        self.kind == SourceTokenKind::IntVar
    }

    pub fn is_real_variable(&self) -> bool {
        self.kind == SourceTokenKind::RealVar
    }

    pub fn is_string_variable(&self) -> bool {
        self.kind == SourceTokenKind::StrVar
    }

    pub fn is_int_array_variable(&self) -> bool {
        self.kind == SourceTokenKind::IntArrVar
    }

    pub fn is_real_array_variable(&self) -> bool {
        self.kind == SourceTokenKind::RealArrVar
    }

    pub fn is_string_array_variable(&self) -> bool {
        self.kind == SourceTokenKind::StrArrVar
    }

    pub fn is_number_literal(&self) -> bool {
        self.kind == SourceTokenKind::Number
    }

    pub fn is_metric_prefix(&self) -> bool {
        self.kind == SourceTokenKind::MetricPrefix
    }

    pub fn is_std_unit(&self) -> bool {
        self.kind == SourceTokenKind::StdUnit
    }

    pub fn is_string_literal(&self) -> bool {
        self.kind == SourceTokenKind::String
    }

    pub fn is_preprocessor(&self) -> bool {
        self.kind == SourceTokenKind::Preprocessor
    }

    pub fn is_identifier(&self) -> bool {
        self.kind == SourceTokenKind::Identifier
    }

    pub fn is_other(&self) -> bool {
        self.kind == SourceTokenKind::Other
    }
}

/// Tokenize source for syntax highlighting.
pub fn syntax_tokens(source: &str) -> Vec<SourceToken> {
    let mut out = Vec::new();
    for tok in tokenize(source) {
        match &tok.kind {
            TokenKind::Newline => push_simple(&mut out, &tok.text, tok.block, SourceTokenKind::Newline),
            TokenKind::Comment => push_simple(&mut out, &tok.text, tok.block, SourceTokenKind::Comment),
            TokenKind::Keyword => push_simple(&mut out, &tok.text, tok.block, SourceTokenKind::Keyword),
            TokenKind::Identifier => {
                let kind = if PREPROCESSOR_DIRECTIVES.contains(&tok.text.as_str()) {
                    SourceTokenKind::Preprocessor
                } else if EVENT_HANDLER_NAMES.contains(&tok.text.as_str()) {
                    SourceTokenKind::EventHandlerName
                } else {
                    SourceTokenKind::Identifier
                };
                push_simple(&mut out, &tok.text, tok.block, kind);
            }
            TokenKind::IntVarName => push_simple(&mut out, &tok.text, tok.block, SourceTokenKind::IntVar),
            TokenKind::RealVarName => {
                push_simple(&mut out, &tok.text, tok.block, SourceTokenKind::RealVar)
            }
            TokenKind::StrVarName => push_simple(&mut out, &tok.text, tok.block, SourceTokenKind::StrVar),
            TokenKind::IntArrVarName => {
                push_simple(&mut out, &tok.text, tok.block, SourceTokenKind::IntArrVar)
            }
            TokenKind::RealArrVarName => {
                push_simple(&mut out, &tok.text, tok.block, SourceTokenKind::RealArrVar)
            }
            TokenKind::StrArrVarName => {
                push_simple(&mut out, &tok.text, tok.block, SourceTokenKind::StrArrVar)
            }
            TokenKind::IntLiteral {
                suffix_bytes,
                unit_bytes,
                ..
            }
            | TokenKind::RealLiteral {
                suffix_bytes,
                unit_bytes,
                ..
            } => split_number(&mut out, &tok.text, tok.block, *suffix_bytes, *unit_bytes),
            TokenKind::StringLiteral(_) => {
                push_simple(&mut out, &tok.text, tok.block, SourceTokenKind::String)
            }
            TokenKind::Operator | TokenKind::Other => {
                push_simple(&mut out, &tok.text, tok.block, SourceTokenKind::Other)
            }
        }
    }
    out
}

fn push_simple(out: &mut Vec<SourceToken>, text: &str, block: CodeBlock, kind: SourceTokenKind) {
    out.push(SourceToken {
        text: text.to_string(),
        block,
        kind,
    });
}

/// Split a number token into number / metric prefix / unit sub-tokens.
/// Number tokens never span lines, so sub-spans stay on the same line.
fn split_number(
    out: &mut Vec<SourceToken>,
    text: &str,
    block: CodeBlock,
    suffix_bytes: u8,
    unit_bytes: u8,
) {
    let total = text.len();
    let suffix = suffix_bytes as usize;
    let unit = unit_bytes as usize;
    let digits_len = total - suffix;
    let prefix_len = suffix - unit;

    let mut offset = 0;
    for (len, kind) in [
        (digits_len, SourceTokenKind::Number),
        (prefix_len, SourceTokenKind::MetricPrefix),
        (unit, SourceTokenKind::StdUnit),
    ] {
        if len == 0 {
            continue;
        }
        let part = &text[offset..offset + len];
        out.push(SourceToken {
            text: part.to_string(),
            block: CodeBlock {
                first_line: block.first_line,
                last_line: block.first_line,
                first_column: block.first_column + offset as u32,
                last_column: block.first_column + (offset + len - 1) as u32,
                first_byte: block.first_byte + offset,
                length_bytes: len,
            },
            kind,
        });
        offset += len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_with_prefix_and_unit_is_split() {
        let toks = syntax_tokens("42kHz");
        assert_eq!(toks.len(), 3);
        assert_eq!(toks[0].text, "42");
        assert!(toks[0].is_number_literal());
        assert_eq!(toks[1].text, "k");
        assert!(toks[1].is_metric_prefix());
        assert_eq!(toks[2].text, "Hz");
        assert!(toks[2].is_std_unit());
        assert_eq!(toks[2].block.first_byte, 3);
        assert_eq!(toks[2].block.length_bytes, 2);
    }

    #[test]
    fn test_classification() {
        let toks = syntax_tokens("on init\n declare $foo := \"hi\" { c }\nend on");
        assert!(toks[0].is_keyword());
        assert!(toks[1].is_event_handler_name());
        assert!(toks[2].is_newline());
        assert!(toks[3].is_keyword());
        assert!(toks[4].is_int_variable());
        assert!(toks[5].is_other()); // :=
        assert!(toks[6].is_string_literal());
        assert!(toks[7].is_comment());
    }

    #[test]
    fn test_preprocessor_directive_classification() {
        let toks = syntax_tokens("SET_CONDITION(FOO)");
        assert!(toks[0].is_preprocessor());
        assert!(toks[1].is_other());
        assert!(toks[2].is_identifier());
    }
}
