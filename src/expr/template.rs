//! Placeholder templates: `Hello {{ upper("world") }}`.
//!
//! Everything outside `{{ ... }}` is copied as is. Inside, a placeholder holds one call:
//!
//! ```text
//! call := ident | ident "(" [arg ("," arg)*] ")"
//! arg  := string | number | call
//! ```
//!
//! Strings are quoted with `"` or `'`; a backslash escapes the next character.
//! A `}}` inside a string does not close the placeholder.
//! A bare `ident` calls the helper without arguments.

use log::trace;
use logos::Logos;
use smallvec::SmallVec;
use thiserror::Error;

use super::helpers::{BoundHelpers, HelperError};

/// Turns a template string into its final text using the supplied helpers.
pub trait TemplateFormatter {
    fn format(&self, template: &str, helpers: &BoundHelpers<'_>) -> Result<String, TemplateError>;
}

/// The default formatter, for `{{ call }}` placeholders.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderFormatter;

impl TemplateFormatter for PlaceholderFormatter {
    fn format(&self, template: &str, helpers: &BoundHelpers<'_>) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = 0;

        while let Some(pos) = template[rest..].find("{{") {
            let open = rest + pos;
            out.push_str(&template[rest..open]);

            let body = &template[open + 2..];
            let unterminated = TemplateError::Unterminated { offset: open };
            if !body.contains("}}") {
                return Err(unterminated);
            }
            // The placeholder ends at the first `}}` outside a string literal.
            let Some((call, len)) = Call::parse(body)? else {
                return Err(unterminated);
            };
            trace!("Evaluating placeholder `{}`", body[..len - 2].trim());
            out.push_str(&call.eval(helpers)?);
            rest = open + 2 + len;
        }

        out.push_str(&template[rest..]);
        Ok(out)
    }
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("placeholder opened at byte {offset} is never closed")]
    Unterminated { offset: usize },

    #[error("placeholder is empty")]
    Empty,

    #[error("unknown token `{0}` in placeholder")]
    UnknownToken(String),

    #[error("unexpected end of placeholder")]
    UnexpectedEnd,

    #[error("unexpected {0} in placeholder")]
    Unexpected(String),

    #[error("unknown template helper `{0}`")]
    UnknownHelper(String),

    #[error("helper `{name}` failed: {source}")]
    Helper { name: String, source: HelperError },
}

/// Lexical element of a placeholder.
#[derive(Debug, Logos, PartialEq, Eq, Clone)]
#[logos(skip r"[ \t\n\f]+")]
enum PlaceholderLex {
    #[regex("[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_owned())]
    Ident(String),

    #[regex(r"-?[0-9]+(\.[0-9]+)?", |lex| lex.slice().to_owned())]
    NumLit(String),

    #[regex(r#""([^\\"]|\\.)*""#, lex_to_str_lit)]
    #[regex(r#"'([^\\']|\\.)*'"#, lex_to_str_lit)]
    StrLit(String),

    #[token("(")]
    OpenParen,

    #[token(")")]
    CloseParen,

    #[token(",")]
    Comma,

    #[token("}}")]
    CloseTemplate,
}

/// Strip the quotes and apply backslash escapes.
fn lex_to_str_lit(lex: &mut logos::Lexer<PlaceholderLex>) -> String {
    let slice = lex.slice();
    let unquoted = &slice[1..slice.len() - 1];

    let mut out = String::with_capacity(unquoted.len());
    let mut chars = unquoted.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[derive(Debug, PartialEq, Eq)]
enum Arg {
    Lit(String),
    Call(Call),
}

#[derive(Debug, PartialEq, Eq)]
struct Call {
    name: String,
    args: Vec<Arg>,
}

type Tokens<'a> = std::iter::Peekable<std::slice::Iter<'a, PlaceholderLex>>;

impl Call {
    /// Parse one placeholder from the text right after its `{{`.
    ///
    /// Returns the call and the length of the text up to and including the
    /// closing `}}`, or `None` when the placeholder is never closed.
    fn parse(src: &str) -> Result<Option<(Call, usize)>, TemplateError> {
        let Some((tokens, len)) = tokenize(src)? else {
            return Ok(None);
        };
        if tokens.is_empty() {
            return Err(TemplateError::Empty);
        }

        let mut iter = tokens.iter().peekable();
        let call = Self::parse_call(&mut iter)?;
        match iter.next() {
            None => Ok(Some((call, len))),
            Some(t) => Err(TemplateError::Unexpected(format!("{t:?}"))),
        }
    }

    fn parse_call(iter: &mut Tokens) -> Result<Call, TemplateError> {
        use PlaceholderLex::*;

        let name = match iter.next() {
            Some(Ident(name)) => name.clone(),
            Some(t) => return Err(TemplateError::Unexpected(format!("{t:?}"))),
            None => return Err(TemplateError::UnexpectedEnd),
        };

        let mut args = Vec::new();
        if iter.next_if_eq(&&OpenParen).is_some() {
            if iter.next_if_eq(&&CloseParen).is_none() {
                loop {
                    args.push(Self::parse_arg(iter)?);
                    match iter.next() {
                        Some(Comma) => continue,
                        Some(CloseParen) => break,
                        Some(t) => return Err(TemplateError::Unexpected(format!("{t:?}"))),
                        None => return Err(TemplateError::UnexpectedEnd),
                    }
                }
            }
        }

        Ok(Call { name, args })
    }

    fn parse_arg(iter: &mut Tokens) -> Result<Arg, TemplateError> {
        use PlaceholderLex::*;

        match iter.peek() {
            Some(StrLit(s)) | Some(NumLit(s)) => {
                let s = s.clone();
                iter.next();
                Ok(Arg::Lit(s))
            }
            Some(Ident(_)) => Self::parse_call(iter).map(Arg::Call),
            Some(t) => Err(TemplateError::Unexpected(format!("{t:?}"))),
            None => Err(TemplateError::UnexpectedEnd),
        }
    }

    fn eval(&self, helpers: &BoundHelpers<'_>) -> Result<String, TemplateError> {
        let args = self
            .args
            .iter()
            .map(|arg| match arg {
                Arg::Lit(s) => Ok(s.clone()),
                Arg::Call(call) => call.eval(helpers),
            })
            .collect::<Result<SmallVec<[String; 4]>, _>>()?;

        match helpers.call(&self.name, &args) {
            Some(result) => result.map_err(|source| TemplateError::Helper {
                name: self.name.clone(),
                source,
            }),
            None => Err(TemplateError::UnknownHelper(self.name.clone())),
        }
    }
}

/// Lex up to the closing `}}`. Gives the tokens before it and the offset right
/// after it, or `None` if the input ends first.
fn tokenize(src: &str) -> Result<Option<(Vec<PlaceholderLex>, usize)>, TemplateError> {
    let mut lex = PlaceholderLex::lexer(src);
    let mut tokens = Vec::new();
    while let Some(token) = lex.next() {
        match token {
            Ok(PlaceholderLex::CloseTemplate) => return Ok(Some((tokens, lex.span().end))),
            Ok(t) => tokens.push(t),
            Err(_) => return Err(TemplateError::UnknownToken(lex.slice().to_owned())),
        }
    }
    Ok(None)
}
