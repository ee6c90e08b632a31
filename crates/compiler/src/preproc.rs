//! Integrated preprocessor pass.
//!
//! Runs between the scanner and the parser: evaluates name-based condition
//! directives, drops the tokens of inactive regions (recording their spans
//! for editor tooling) and maintains the set of active condition names,
//! seeded by host-supplied built-in conditions.

use crate::token::{Token, TokenKind};
use nksp_core::{CodeBlock, IssueKind, ParserIssue};
use std::collections::HashSet;

/// Output of the preprocessor pass.
#[derive(Debug)]
pub struct PreprocOutput {
    /// Significant tokens of the active regions, ready for the parser.
    pub tokens: Vec<Token>,
    /// Spans of source regions elided by inactive condition blocks.
    pub elisions: Vec<CodeBlock>,
    /// Condition names set by the script itself.
    pub user_conditions: HashSet<String>,
    /// Errors and warnings raised by directives.
    pub issues: Vec<ParserIssue>,
}

struct CondBlock {
    active: bool,
    directive_block: CodeBlock,
    skipped: Option<CodeBlock>,
}

/// Apply all preprocessor directives to a raw token stream.
pub fn preprocess(raw: Vec<Token>, builtin_conditions: &HashSet<String>) -> PreprocOutput {
    let mut out = PreprocOutput {
        tokens: Vec::with_capacity(raw.len()),
        elisions: Vec::new(),
        user_conditions: HashSet::new(),
        issues: Vec::new(),
    };
    let mut stack: Vec<CondBlock> = Vec::new();
    let mut iter = raw.into_iter().peekable();

    while let Some(tok) = iter.next() {
        let directive = match tok.kind {
            TokenKind::Identifier => match tok.text.as_str() {
                "SET_CONDITION" | "RESET_CONDITION" | "USE_CODE_IF" | "USE_CODE_IF_NOT" => {
                    Some(tok.text.clone())
                }
                "END_USE_CODE" => {
                    match stack.pop() {
                        Some(block) => {
                            if let Some(span) = block.skipped {
                                out.elisions.push(span);
                            }
                        }
                        None => out.issues.push(ParserIssue {
                            kind: IssueKind::Error,
                            message: "END_USE_CODE without a preceding USE_CODE_IF".to_string(),
                            block: tok.block,
                        }),
                    }
                    continue;
                }
                _ => None,
            },
            _ => None,
        };

        let active = stack.iter().all(|b| b.active);

        if let Some(name_directive) = directive {
            let (cond_name, full_block) = match parse_condition_arg(&mut iter, &tok) {
                Ok(parsed) => parsed,
                Err(issue) => {
                    out.issues.push(issue);
                    continue;
                }
            };
            match name_directive.as_str() {
                "SET_CONDITION" => {
                    if !active {
                        continue;
                    }
                    if builtin_conditions.contains(&cond_name)
                        || out.user_conditions.contains(&cond_name)
                    {
                        out.issues.push(ParserIssue {
                            kind: IssueKind::Warning,
                            message: format!("condition '{}' is already set", cond_name),
                            block: full_block,
                        });
                    } else {
                        out.user_conditions.insert(cond_name);
                    }
                }
                "RESET_CONDITION" => {
                    if !active {
                        continue;
                    }
                    if builtin_conditions.contains(&cond_name) {
                        out.issues.push(ParserIssue {
                            kind: IssueKind::Warning,
                            message: format!(
                                "built-in condition '{}' cannot be reset",
                                cond_name
                            ),
                            block: full_block,
                        });
                    } else if !out.user_conditions.remove(&cond_name) {
                        out.issues.push(ParserIssue {
                            kind: IssueKind::Warning,
                            message: format!("condition '{}' is not set", cond_name),
                            block: full_block,
                        });
                    }
                }
                "USE_CODE_IF" | "USE_CODE_IF_NOT" => {
                    let set = builtin_conditions.contains(&cond_name)
                        || out.user_conditions.contains(&cond_name);
                    let wanted = name_directive == "USE_CODE_IF";
                    stack.push(CondBlock {
                        active: active && (set == wanted),
                        directive_block: full_block,
                        skipped: None,
                    });
                }
                _ => unreachable!(),
            }
            continue;
        }

        if active {
            if tok.is_significant() {
                out.tokens.push(tok);
            }
        } else if tok.is_significant() {
            // extend the elided span of the innermost inactive block
            if let Some(block) = stack.iter_mut().rev().find(|b| !b.active) {
                block.skipped = Some(match block.skipped {
                    Some(span) => span.merged(&tok.block),
                    None => tok.block,
                });
            }
        }
    }

    for block in stack {
        out.issues.push(ParserIssue {
            kind: IssueKind::Error,
            message: "USE_CODE_IF block not closed by END_USE_CODE".to_string(),
            block: block.directive_block,
        });
    }
    out
}

/// Parse the `(NAME)` argument following a condition directive.
fn parse_condition_arg(
    iter: &mut std::iter::Peekable<std::vec::IntoIter<Token>>,
    directive: &Token,
) -> Result<(String, CodeBlock), ParserIssue> {
    let mut significant = || {
        loop {
            match iter.next() {
                Some(t) if !t.is_significant() => continue,
                other => return other,
            }
        }
    };
    let open = significant();
    let name = significant();
    let close = significant();
    match (&open, &name, &close) {
        (Some(o), Some(n), Some(c))
            if o.text == "(" && matches!(n.kind, TokenKind::Identifier) && c.text == ")" =>
        {
            Ok((n.text.clone(), directive.block.merged(&c.block)))
        }
        _ => Err(ParserIssue {
            kind: IssueKind::Error,
            message: format!("malformed {} directive, expected (NAME)", directive.text),
            block: directive.block,
        }),
    }
}
