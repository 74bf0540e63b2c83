//! Filter strings for model version search.
//!
//! The grammar is deliberately tiny:
//!
//! ```text
//! filter  := clause ( ("AND" | "OR") clause )*
//! clause  := key comparator value
//! key     := identifier | `backticked identifier`
//! value   := 'single quoted' | "double quoted"
//! ```
//!
//! The parser accepts the full clause list so that error messages can name
//! what was written; [`ModelVersionFilter::parse`] then narrows it to the one
//! equality clause the registry supports.

use std::fmt;

use crate::error::{RegistryError, Result};

/// Comparison operator in a filter clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    ILike,
}

impl Comparator {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "LIKE",
            Self::ILike => "ILIKE",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `key <op> 'value'` condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterClause {
    pub key: String,
    pub comparator: Comparator,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    Bare(String),
    Op(Comparator),
    And,
    Or,
}

/// Parse a filter string into its clauses. Empty input yields no clauses.
///
/// # Errors
///
/// Returns [`RegistryError::InvalidArgument`] when the string does not follow
/// the clause grammar.
pub fn parse_filter(filter: &str) -> Result<Vec<FilterClause>> {
    let tokens = tokenize(filter)?;
    let mut clauses = Vec::new();
    let mut iter = tokens.into_iter().peekable();

    if iter.peek().is_none() {
        return Ok(clauses);
    }

    loop {
        clauses.push(parse_clause(&mut iter, filter)?);
        match iter.next() {
            None => break,
            Some(Token::And | Token::Or) => continue,
            Some(other) => {
                return Err(invalid(filter, &format!("unexpected token {other:?}")));
            }
        }
    }

    Ok(clauses)
}

fn parse_clause(
    iter: &mut std::iter::Peekable<std::vec::IntoIter<Token>>,
    filter: &str,
) -> Result<FilterClause> {
    let key = match iter.next() {
        Some(Token::Ident(key)) => key,
        Some(other) => return Err(invalid(filter, &format!("expected a key, found {other:?}"))),
        None => return Err(invalid(filter, "expected a key")),
    };
    let comparator = match iter.next() {
        Some(Token::Op(op)) => op,
        _ => return Err(invalid(filter, &format!("expected a comparator after '{key}'"))),
    };
    let value = match iter.next() {
        Some(Token::Str(value)) => value,
        Some(Token::Bare(raw) | Token::Ident(raw)) => {
            return Err(invalid(
                filter,
                &format!("value {raw} for '{key}' must be a quoted string"),
            ));
        }
        _ => return Err(invalid(filter, &format!("expected a value for '{key}'"))),
    };

    Ok(FilterClause {
        key,
        comparator,
        value,
    })
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '_' | '.')) {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            tokens.push(match word.to_ascii_uppercase().as_str() {
                "AND" => Token::And,
                "OR" => Token::Or,
                "LIKE" => Token::Op(Comparator::Like),
                "ILIKE" => Token::Op(Comparator::ILike),
                _ => Token::Ident(word),
            });
            continue;
        }

        match c {
            '`' => {
                let (text, next) = read_quoted(&chars, i, '`', input)?;
                tokens.push(Token::Ident(text));
                i = next;
            }
            '\'' | '"' => {
                let (text, next) = read_quoted(&chars, i, c, input)?;
                tokens.push(Token::Str(text));
                i = next;
            }
            '=' => {
                tokens.push(Token::Op(Comparator::Eq));
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(Comparator::NotEq));
                i += 2;
            }
            '<' => match chars.get(i + 1) {
                Some('=') => {
                    tokens.push(Token::Op(Comparator::Le));
                    i += 2;
                }
                Some('>') => {
                    tokens.push(Token::Op(Comparator::NotEq));
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Op(Comparator::Lt));
                    i += 1;
                }
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(Comparator::Ge));
                    i += 2;
                } else {
                    tokens.push(Token::Op(Comparator::Gt));
                    i += 1;
                }
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '.' | '-' | '_')) {
                    i += 1;
                }
                tokens.push(Token::Bare(chars[start..i].iter().collect()));
            }
            other => {
                return Err(invalid(input, &format!("unexpected character '{other}'")));
            }
        }
    }

    Ok(tokens)
}

/// Read a quoted run starting at `start`; a doubled quote is a literal quote.
fn read_quoted(chars: &[char], start: usize, quote: char, input: &str) -> Result<(String, usize)> {
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                out.push(quote);
                i += 2;
                continue;
            }
            return Ok((out, i + 1));
        }
        out.push(chars[i]);
        i += 1;
    }
    Err(invalid(input, &format!("unterminated {quote} quote")))
}

fn invalid(filter: &str, detail: &str) -> RegistryError {
    RegistryError::InvalidArgument(format!("Invalid filter string '{filter}': {detail}"))
}

/// The single predicate a model version search may carry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ModelVersionFilter {
    /// No filter: every version matches
    #[default]
    All,
    /// Parent registered model name equals
    Name(String),
    /// Version `source` equals (`source_path` in filter strings)
    Source(String),
    /// Originating run id equals
    RunId(String),
}

impl ModelVersionFilter {
    /// Translate a search filter string into a version predicate.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidArgument`] for anything other than an
    /// empty string or one equality clause on `name`, `source_path` or `run_id`.
    pub fn parse(filter: Option<&str>) -> Result<Self> {
        let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) else {
            return Ok(Self::All);
        };

        let mut clauses = parse_filter(filter)?;
        if clauses.len() > 1 {
            return Err(RegistryError::InvalidArgument(format!(
                "Model Registry expects filter to be one of \"name = '<model_name>'\" or \
                 \"source_path = '<source_path>'\" or \"run_id = '<run_id>'\". \
                 Input filter string: {filter}"
            )));
        }
        let Some(clause) = clauses.pop() else {
            return Ok(Self::All);
        };

        if clause.comparator != Comparator::Eq {
            return Err(RegistryError::InvalidArgument(format!(
                "Model Registry search filter only supports equality(=) comparator. \
                 Input filter string: {filter}"
            )));
        }

        match clause.key.as_str() {
            "name" => Ok(Self::Name(clause.value)),
            "source_path" => Ok(Self::Source(clause.value)),
            "run_id" => Ok(Self::RunId(clause.value)),
            _ => Err(RegistryError::InvalidArgument(format!(
                "Invalid filter string: {filter}"
            ))),
        }
    }

    /// Column and bound value for the SQL `WHERE` clause, if any.
    pub(crate) fn condition(&self) -> Option<(&'static str, &str)> {
        match self {
            Self::All => None,
            Self::Name(value) => Some(("name", value)),
            Self::Source(value) => Some(("source", value)),
            Self::RunId(value) => Some(("run_id", value)),
        }
    }
}
