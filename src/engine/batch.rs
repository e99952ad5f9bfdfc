// SPDX-License-Identifier: Apache-2.0

//! Batch splitting
//!
//! A batch is cut into its statements before it runs so every statement's
//! result can be attributed to it, including a query that matched nothing.
//! Splitting works on the dialect's tokens: semicolons inside literals,
//! quoted identifiers, comments and compound-statement bodies do not end a
//! statement. Slices of the original text are returned, never re-rendered
//! SQL.

use sqlparser::dialect::{MySqlDialect, PostgreSqlDialect};
use sqlparser::tokenizer::{Location, Token, TokenWithSpan, Tokenizer};
use tracing::debug;

use crate::engine::types::BackendKind;

/// Statements of `sql` in order, trimmed, with empty ones dropped.
///
/// Text the tokenizer rejects is returned whole and left for the server to
/// diagnose.
pub fn split_statements(kind: BackendKind, sql: &str) -> Vec<&str> {
    let tokenized = match kind {
        BackendKind::Postgres => Tokenizer::new(&PostgreSqlDialect {}, sql).tokenize_with_location(),
        BackendKind::MySql => Tokenizer::new(&MySqlDialect {}, sql).tokenize_with_location(),
    };

    let tokens = match tokenized {
        Ok(tokens) => tokens,
        Err(e) => {
            debug!(error = %e, "Batch not tokenizable, sending it unsplit");
            return whole(sql);
        }
    };

    split_tokens(sql, &tokens).unwrap_or_else(|| whole(sql))
}

fn whole(sql: &str) -> Vec<&str> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        Vec::new()
    } else {
        vec![trimmed]
    }
}

fn split_tokens<'a>(sql: &'a str, tokens: &[TokenWithSpan]) -> Option<Vec<&'a str>> {
    let significant: Vec<&TokenWithSpan> = tokens
        .iter()
        .filter(|t| !matches!(t.token, Token::Whitespace(_) | Token::EOF))
        .collect();
    let lines = LineIndex::new(sql);

    let mut statements = Vec::new();
    let mut start = 0;
    let mut has_content = false;
    let mut depth = 0usize;
    let mut closing_case = false;

    for (idx, tok) in significant.iter().enumerate() {
        let next = significant.get(idx + 1).map(|t| &t.token);
        match &tok.token {
            Token::SemiColon if depth == 0 => {
                let end = lines.offset(sql, tok.span.start)?;
                if sql.as_bytes().get(end) != Some(&b';') {
                    return None;
                }
                if has_content {
                    statements.push(sql[start..end].trim());
                }
                start = end + 1;
                has_content = false;
                continue;
            }
            Token::Word(_) => match keyword(&tok.token) {
                Some("BEGIN") if opens_block(next) => depth += 1,
                Some("CASE") => {
                    if closing_case {
                        closing_case = false;
                    } else {
                        depth += 1;
                    }
                }
                Some("END") => match next.and_then(keyword) {
                    // END IF / END LOOP / ... close constructs that never opened a level
                    Some("IF" | "LOOP" | "WHILE" | "REPEAT") => {}
                    Some("CASE") => {
                        depth = depth.saturating_sub(1);
                        closing_case = true;
                    }
                    _ => depth = depth.saturating_sub(1),
                },
                _ => {}
            },
            _ => {}
        }
        has_content = true;
    }

    if has_content {
        statements.push(sql[start..].trim());
    }
    Some(statements)
}

/// Upper-cased text of an unquoted word token.
fn keyword(token: &Token) -> Option<&'static str> {
    let Token::Word(word) = token else {
        return None;
    };
    if word.quote_style.is_some() {
        return None;
    }
    ["BEGIN", "END", "CASE", "IF", "LOOP", "WHILE", "REPEAT"]
        .into_iter()
        .find(|kw| word.value.eq_ignore_ascii_case(kw))
}

/// `BEGIN` opens a compound block unless it starts a transaction.
fn opens_block(next: Option<&Token>) -> bool {
    match next {
        None | Some(Token::SemiColon) => false,
        Some(Token::Word(word)) => !["TRANSACTION", "WORK", "ISOLATION", "READ", "DEFERRABLE"]
            .iter()
            .any(|kw| word.value.eq_ignore_ascii_case(kw)),
        Some(_) => true,
    }
}

/// Maps tokenizer locations (1-based line, 1-based char column) to byte
/// offsets.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(sql: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(sql.match_indices('\n').map(|(at, _)| at + 1));
        Self { starts }
    }

    fn offset(&self, sql: &str, location: Location) -> Option<usize> {
        let line_start = *self.starts.get(usize::try_from(location.line).ok()?.checked_sub(1)?)?;
        let column = usize::try_from(location.column).ok()?.checked_sub(1)?;
        sql[line_start..]
            .char_indices()
            .nth(column)
            .map(|(at, _)| line_start + at)
    }
}
