//! Hand-written scanner for NKSP source.
//!
//! Produces the raw token stream including newlines and comments; the
//! preprocessor filters that stream before parsing, and the syntax
//! highlighting path consumes it as-is. Number literals absorb their
//! metric prefix sequence and unit suffix into a single token whose kind
//! carries the pre-multiplied factor.

use crate::token::{KEYWORDS, Token, TokenKind};
use nksp_core::units::prefix_factor;
use nksp_core::{CodeBlock, MetricPrefix, UnitType, vmfloat, vmint};

struct Scanner<'s> {
    src: &'s [u8],
    pos: usize,
    line: u32,
    col: u32,
}

/// Tokenize the given source. The scanner itself never fails; malformed
/// input surfaces as `Other` tokens which the parser reports with a span.
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut scanner = Scanner {
        src: source.as_bytes(),
        pos: 0,
        line: 1,
        col: 1,
    };
    let mut tokens = Vec::new();
    while let Some(tok) = scanner.next_token() {
        tokens.push(tok);
    }
    tokens
}

impl<'s> Scanner<'s> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, off: usize) -> Option<u8> {
        self.src.get(self.pos + off).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(b)
    }

    fn mark(&self) -> (usize, u32, u32) {
        (self.pos, self.line, self.col)
    }

    fn block_from(&self, mark: (usize, u32, u32)) -> CodeBlock {
        let (start, first_line, first_column) = mark;
        CodeBlock {
            first_line,
            last_line: self.line,
            first_column,
            // column of the last consumed character
            last_column: if self.col > 1 { self.col - 1 } else { 1 },
            first_byte: start,
            length_bytes: self.pos - start,
        }
    }

    fn text_from(&self, start: usize) -> String {
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }

    fn next_token(&mut self) -> Option<Token> {
        // skip horizontal whitespace
        while matches!(self.peek(), Some(b' ') | Some(b'\t') | Some(b'\r')) {
            self.bump();
        }
        let b = self.peek()?;
        let mark = self.mark();

        match b {
            b'\n' => {
                self.bump();
                Some(Token {
                    kind: TokenKind::Newline,
                    text: "\n".to_string(),
                    block: self.block_from(mark),
                })
            }
            b'{' => Some(self.scan_comment(mark)),
            b'"' => Some(self.scan_string(mark)),
            b'$' | b'~' | b'@' | b'%' | b'?' => Some(self.scan_var_name(mark)),
            b'!' => Some(self.scan_bang(mark)),
            b'0'..=b'9' => Some(self.scan_number(mark)),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => Some(self.scan_word(mark)),
            b'.' => Some(self.scan_dotted_operator(mark)),
            _ => Some(self.scan_operator(mark)),
        }
    }

    fn scan_comment(&mut self, mark: (usize, u32, u32)) -> Token {
        self.bump(); // '{'
        while let Some(b) = self.peek() {
            self.bump();
            if b == b'}' {
                break;
            }
        }
        Token {
            kind: TokenKind::Comment,
            text: self.text_from(mark.0),
            block: self.block_from(mark),
        }
    }

    fn scan_string(&mut self, mark: (usize, u32, u32)) -> Token {
        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    // unterminated; reported by the parser
                    return Token {
                        kind: TokenKind::Other,
                        text: self.text_from(mark.0),
                        block: self.block_from(mark),
                    };
                }
                Some(b'"') => {
                    self.bump();
                    break;
                }
                Some(b'\\') => {
                    self.bump();
                    let escaped = match self.peek() {
                        Some(b'n') => '\n',
                        Some(b'r') => '\r',
                        Some(b't') => '\t',
                        Some(b'"') => '"',
                        Some(b'\\') => '\\',
                        Some(other) => other as char,
                        None => continue,
                    };
                    self.bump();
                    value.push(escaped);
                }
                Some(other) => {
                    self.bump();
                    value.push(other as char);
                }
            }
        }
        Token {
            kind: TokenKind::StringLiteral(value),
            text: self.text_from(mark.0),
            block: self.block_from(mark),
        }
    }

    fn scan_ident_tail(&mut self) {
        while matches!(self.peek(), Some(b'a'..=b'z') | Some(b'A'..=b'Z') | Some(b'0'..=b'9') | Some(b'_'))
        {
            self.bump();
        }
    }

    fn scan_var_name(&mut self, mark: (usize, u32, u32)) -> Token {
        let sigil = self.bump().unwrap();
        if !matches!(self.peek(), Some(b'a'..=b'z') | Some(b'A'..=b'Z') | Some(b'_')) {
            // a lone sigil is not a variable name
            return Token {
                kind: TokenKind::Other,
                text: self.text_from(mark.0),
                block: self.block_from(mark),
            };
        }
        self.scan_ident_tail();
        let kind = match sigil {
            b'$' => TokenKind::IntVarName,
            b'~' => TokenKind::RealVarName,
            b'@' => TokenKind::StrVarName,
            b'%' => TokenKind::IntArrVarName,
            _ => TokenKind::RealArrVarName,
        };
        Token {
            kind,
            text: self.text_from(mark.0),
            block: self.block_from(mark),
        }
    }

    /// `!` either marks a value as final or, immediately followed by an
    /// identifier and a `[`, names a string array variable.
    fn scan_bang(&mut self, mark: (usize, u32, u32)) -> Token {
        if matches!(self.peek_at(1), Some(b'a'..=b'z') | Some(b'A'..=b'Z') | Some(b'_')) {
            // look ahead past the identifier for a '['
            let mut off = 1;
            while matches!(
                self.src.get(self.pos + off),
                Some(b'a'..=b'z') | Some(b'A'..=b'Z') | Some(b'0'..=b'9') | Some(b'_')
            ) {
                off += 1;
            }
            let mut ws = off;
            while matches!(self.src.get(self.pos + ws), Some(b' ') | Some(b'\t')) {
                ws += 1;
            }
            if self.src.get(self.pos + ws) == Some(&b'[') {
                self.bump(); // '!'
                self.scan_ident_tail();
                return Token {
                    kind: TokenKind::StrArrVarName,
                    text: self.text_from(mark.0),
                    block: self.block_from(mark),
                };
            }
        }
        self.bump();
        Token {
            kind: TokenKind::Operator,
            text: "!".to_string(),
            block: self.block_from(mark),
        }
    }

    fn scan_number(&mut self, mark: (usize, u32, u32)) -> Token {
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.bump();
        }
        let mut is_real = false;
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
            is_real = true;
            self.bump();
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.bump();
            }
        }
        let digits_end = self.pos;

        // collect a candidate prefix/unit suffix (alphabetic run)
        let mut run = 0;
        while matches!(self.src.get(self.pos + run), Some(b'a'..=b'z') | Some(b'A'..=b'Z')) {
            run += 1;
        }
        let suffix = &self.src[self.pos..self.pos + run];
        let mut factor: vmfloat = nksp_core::NO_FACTOR;
        let mut unit = UnitType::None;
        let mut suffix_bytes = 0u8;
        let mut unit_bytes = 0u8;
        if run > 0 {
            if let Some((prefixes, parsed_unit, unit_len)) = parse_number_suffix(suffix) {
                factor = prefix_factor(&prefixes);
                unit = parsed_unit;
                suffix_bytes = run as u8;
                unit_bytes = unit_len as u8;
                for _ in 0..run {
                    self.bump();
                }
            }
        }

        let digits = String::from_utf8_lossy(&self.src[mark.0..digits_end]).into_owned();
        let kind = if is_real {
            TokenKind::RealLiteral {
                value: digits.parse::<vmfloat>().unwrap_or(0.0),
                factor,
                unit,
                suffix_bytes,
                unit_bytes,
            }
        } else {
            // out-of-range literals saturate; the parser warns via the
            // ordinary constant checks if that ever matters
            TokenKind::IntLiteral {
                value: digits.parse::<vmint>().unwrap_or(vmint::MAX),
                factor,
                unit,
                suffix_bytes,
                unit_bytes,
            }
        };
        Token {
            kind,
            text: self.text_from(mark.0),
            block: self.block_from(mark),
        }
    }

    fn scan_word(&mut self, mark: (usize, u32, u32)) -> Token {
        self.scan_ident_tail();
        let text = self.text_from(mark.0);
        let kind = if KEYWORDS.contains(&text.as_str()) {
            TokenKind::Keyword
        } else {
            TokenKind::Identifier
        };
        Token {
            kind,
            text,
            block: self.block_from(mark),
        }
    }

    fn scan_dotted_operator(&mut self, mark: (usize, u32, u32)) -> Token {
        for candidate in [".and.", ".or.", ".not."] {
            let bytes = candidate.as_bytes();
            if self.src[self.pos..].starts_with(bytes) {
                for _ in 0..bytes.len() {
                    self.bump();
                }
                return Token {
                    kind: TokenKind::Operator,
                    text: candidate.to_string(),
                    block: self.block_from(mark),
                };
            }
        }
        self.bump();
        Token {
            kind: TokenKind::Other,
            text: ".".to_string(),
            block: self.block_from(mark),
        }
    }

    fn scan_operator(&mut self, mark: (usize, u32, u32)) -> Token {
        let two: &[&str] = &[":=", "<=", ">="];
        for candidate in two {
            if self.src[self.pos..].starts_with(candidate.as_bytes()) {
                self.bump();
                self.bump();
                return Token {
                    kind: TokenKind::Operator,
                    text: (*candidate).to_string(),
                    block: self.block_from(mark),
                };
            }
        }
        let b = self.bump().unwrap();
        let kind = match b {
            b'+' | b'-' | b'*' | b'/' | b'&' | b'<' | b'>' | b'=' | b'#' | b'(' | b')' | b'['
            | b']' | b',' => TokenKind::Operator,
            _ => TokenKind::Other,
        };
        Token {
            kind,
            text: (b as char).to_string(),
            block: self.block_from(mark),
        }
    }
}

/// Split a trailing alphabetic run into up to two metric prefixes plus an
/// optional standard unit. Returns `None` when the run is not a valid
/// suffix (the letters then lex as a separate identifier).
fn parse_number_suffix(suffix: &[u8]) -> Option<(Vec<MetricPrefix>, UnitType, usize)> {
    let (unit, unit_len) = if suffix.ends_with(b"Hz") {
        (UnitType::Hertz, 2)
    } else if suffix.ends_with(b"s") {
        (UnitType::Second, 1)
    } else if suffix.ends_with(b"B") {
        (UnitType::Bel, 1)
    } else {
        (UnitType::None, 0)
    };
    let mut rest = &suffix[..suffix.len() - unit_len];
    let mut prefixes = Vec::new();
    while !rest.is_empty() {
        if prefixes.len() == 2 {
            return None;
        }
        let (prefix, used) = if rest.starts_with(b"da") {
            (MetricPrefix::Deca, 2)
        } else {
            let p = match rest[0] {
                b'k' => MetricPrefix::Kilo,
                b'h' => MetricPrefix::Hecto,
                b'd' => MetricPrefix::Deci,
                b'c' => MetricPrefix::Centi,
                b'm' => MetricPrefix::Milli,
                b'u' => MetricPrefix::Micro,
                _ => return None,
            };
            (p, 1)
        };
        prefixes.push(prefix);
        rest = &rest[used..];
    }
    Some((prefixes, unit, unit_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).into_iter().filter(|t| t.is_significant()).collect()
    }

    #[test]
    fn test_scan_declaration() {
        let toks = kinds("declare $foo := 5");
        assert_eq!(toks[0].kind, TokenKind::Keyword);
        assert_eq!(toks[1].kind, TokenKind::IntVarName);
        assert_eq!(toks[1].text, "$foo");
        assert_eq!(toks[2].text, ":=");
        match toks[3].kind {
            TokenKind::IntLiteral { value, factor, unit, .. } => {
                assert_eq!(value, 5);
                assert_eq!(factor, 1.0);
                assert_eq!(unit, UnitType::None);
            }
            ref k => panic!("expected int literal, got {:?}", k),
        }
    }

    #[test]
    fn test_scan_units_and_prefixes() {
        let toks = kinds("42kHz 145ms 3.14mdB 10B 1k");
        match toks[0].kind {
            TokenKind::IntLiteral { value, factor, unit, .. } => {
                assert_eq!(value, 42);
                assert_eq!(factor, 1e3);
                assert_eq!(unit, UnitType::Hertz);
            }
            ref k => panic!("unexpected {:?}", k),
        }
        match toks[1].kind {
            TokenKind::IntLiteral { value, factor, unit, .. } => {
                assert_eq!(value, 145);
                assert_eq!(factor, 1e-3);
                assert_eq!(unit, UnitType::Second);
            }
            ref k => panic!("unexpected {:?}", k),
        }
        match toks[2].kind {
            TokenKind::RealLiteral { value, factor, unit, .. } => {
                assert!((value - 3.14).abs() < 1e-12);
                assert!((factor - 1e-4).abs() < 1e-18);
                assert_eq!(unit, UnitType::Bel);
            }
            ref k => panic!("unexpected {:?}", k),
        }
        match toks[3].kind {
            TokenKind::IntLiteral { unit, .. } => assert_eq!(unit, UnitType::Bel),
            ref k => panic!("unexpected {:?}", k),
        }
        match toks[4].kind {
            TokenKind::IntLiteral { factor, unit, .. } => {
                assert_eq!(factor, 1e3);
                assert_eq!(unit, UnitType::None);
            }
            ref k => panic!("unexpected {:?}", k),
        }
    }

    #[test]
    fn test_invalid_suffix_is_not_consumed() {
        let toks = kinds("10hz");
        assert!(matches!(toks[0].kind, TokenKind::IntLiteral { .. }));
        assert_eq!(toks[1].kind, TokenKind::Identifier);
        assert_eq!(toks[1].text, "hz");
    }

    #[test]
    fn test_bang_disambiguation() {
        // final marker before a literal
        let toks = kinds("!42");
        assert_eq!(toks[0].kind, TokenKind::Operator);
        assert_eq!(toks[0].text, "!");
        // string array element
        let toks = kinds("!names[0]");
        assert_eq!(toks[0].kind, TokenKind::StrArrVarName);
        assert_eq!(toks[0].text, "!names");
        assert_eq!(toks[1].text, "[");
    }

    #[test]
    fn test_dotted_operators_and_mod() {
        let toks = kinds("43 .and. 142 mod 8");
        assert_eq!(toks[1].text, ".and.");
        assert_eq!(toks[1].kind, TokenKind::Operator);
        assert_eq!(toks[3].text, "mod");
        assert_eq!(toks[3].kind, TokenKind::Keyword);
    }

    #[test]
    fn test_string_and_comment_spans() {
        let toks = tokenize("{ hi }\n\"a\\nb\"");
        assert_eq!(toks[0].kind, TokenKind::Comment);
        assert_eq!(toks[0].block.first_line, 1);
        assert_eq!(toks[1].kind, TokenKind::Newline);
        match &toks[2].kind {
            TokenKind::StringLiteral(s) => assert_eq!(s, "a\nb"),
            k => panic!("unexpected {:?}", k),
        }
        assert_eq!(toks[2].block.first_line, 2);
        assert_eq!(toks[2].block.first_byte, 7);
        assert_eq!(toks[2].block.length_bytes, 6);
    }

    #[test]
    fn test_real_not_confused_with_dotted_op() {
        let toks = kinds("1.and.1");
        assert!(matches!(toks[0].kind, TokenKind::IntLiteral { value: 1, .. }));
        assert_eq!(toks[1].text, ".and.");
        assert!(matches!(toks[2].kind, TokenKind::IntLiteral { value: 1, .. }));
    }
}
