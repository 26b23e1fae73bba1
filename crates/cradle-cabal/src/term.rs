//! A reader for the subset of Haskell `show` output that appears in `setup-config` values.
//!
//! Supported shapes: constructor application (`Just x`, `UnitId "base"`), record syntax
//! (`Con {field = value}`), lists, tuples, string and character literals, and numbers. Anything
//! else is reported as a [`TermError`] with the byte offset where reading stopped.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// A name applied to zero or more arguments. Nullary constructors (`True`) have no args.
    App { head: String, args: Vec<Term> },
    Record {
        con: String,
        fields: Vec<(String, Term)>,
    },
    List(Vec<Term>),
    /// `()` reads as the empty tuple; a single parenthesized term reads as the term itself.
    Tuple(Vec<Term>),
    Str(String),
    Char(char),
    /// Kept as text; callers decide which numeric type they need.
    Number(String),
}

impl Term {
    /// The constructor or head name, for applications and records.
    pub fn head(&self) -> Option<&str> {
        match self {
            Term::App { head, .. } => Some(head),
            Term::Record { con, .. } => Some(con),
            _ => None,
        }
    }

    pub fn args(&self) -> &[Term] {
        match self {
            Term::App { args, .. } => args,
            _ => &[],
        }
    }

    /// `Some(args)` if this is an application of `head`.
    pub fn app_of(&self, name: &str) -> Option<&[Term]> {
        match self {
            Term::App { head, args } if head == name => Some(args),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Term> {
        match self {
            Term::Record { fields, .. } => fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Term]> {
        match self {
            Term::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Term]> {
        match self {
            Term::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Term::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.app_of("True").or_else(|| self.app_of("False")) {
            Some([]) => Some(self.head() == Some("True")),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Term::Number(n) => n.parse().ok(),
            _ => None,
        }
    }

    /// A short description of the term's shape for error messages.
    pub fn describe(&self) -> String {
        match self {
            Term::App { head, args } if args.is_empty() => format!("`{head}`"),
            Term::App { head, args } => format!("`{head}` applied to {} argument(s)", args.len()),
            Term::Record { con, .. } => format!("record `{con}`"),
            Term::List(items) => format!("list of {} item(s)", items.len()),
            Term::Tuple(items) => format!("{}-tuple", items.len()),
            Term::Str(_) => "string literal".to_owned(),
            Term::Char(_) => "character literal".to_owned(),
            Term::Number(_) => "number".to_owned(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, items: &[Term]) -> fmt::Result {
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{item}")?;
            }
            Ok(())
        }

        match self {
            Term::App { head, args } => {
                f.write_str(head)?;
                for arg in args {
                    match arg {
                        Term::App { args, .. } if !args.is_empty() => write!(f, " ({arg})")?,
                        _ => write!(f, " {arg}")?,
                    }
                }
                Ok(())
            }
            Term::Record { con, fields } => {
                write!(f, "{con} {{")?;
                for (idx, (name, value)) in fields.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name} = {value}")?;
                }
                f.write_str("}")
            }
            Term::List(items) => {
                f.write_str("[")?;
                join(f, items)?;
                f.write_str("]")
            }
            Term::Tuple(items) => {
                f.write_str("(")?;
                join(f, items)?;
                f.write_str(")")
            }
            Term::Str(s) => write!(f, "{s:?}"),
            Term::Char(c) => write!(f, "{c:?}"),
            Term::Number(n) => f.write_str(n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("at offset {offset}: {message}")]
pub struct TermError {
    pub offset: usize,
    pub message: String,
}

/// Reads exactly one term from `text`; trailing non-whitespace is an error.
pub fn parse_term(text: &str) -> Result<Term, TermError> {
    let tokens = tokenize(text)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        end: text.len(),
    };
    let term = parser.expr()?;
    match parser.peek() {
        None => Ok(term),
        Some((offset, tok)) => Err(TermError {
            offset,
            message: format!("unexpected {tok} after complete term"),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Open(char),
    Close(char),
    Comma,
    Equals,
    Ident(String),
    Str(String),
    Char(char),
    Number(String),
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tok::Open(c) | Tok::Close(c) => write!(f, "`{c}`"),
            Tok::Comma => f.write_str("`,`"),
            Tok::Equals => f.write_str("`=`"),
            Tok::Ident(name) => write!(f, "identifier `{name}`"),
            Tok::Str(_) => f.write_str("string literal"),
            Tok::Char(_) => f.write_str("character literal"),
            Tok::Number(n) => write!(f, "number `{n}`"),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<(usize, Tok)>, TermError> {
    let mut out = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((offset, c)) = chars.next() {
        let tok = match c {
            c if c.is_whitespace() => continue,
            '(' | '[' | '{' => Tok::Open(c),
            ')' | ']' | '}' => Tok::Close(c),
            ',' => Tok::Comma,
            '=' => Tok::Equals,
            '"' => Tok::Str(read_string(&mut chars, offset)?),
            '\'' => {
                let value = read_char_literal(&mut chars, offset)?;
                Tok::Char(value)
            }
            '-' if chars.peek().is_some_and(|(_, next)| next.is_ascii_digit()) => {
                Tok::Number(read_number(&mut chars, String::from("-")))
            }
            c if c.is_ascii_digit() => Tok::Number(read_number(&mut chars, c.to_string())),
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::from(c);
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_alphanumeric() || matches!(next, '_' | '\'' | '.') {
                        ident.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                Tok::Ident(ident)
            }
            other => {
                return Err(TermError {
                    offset,
                    message: format!("unexpected character {other:?}"),
                })
            }
        };
        out.push((offset, tok));
    }
    Ok(out)
}

type Chars<'a> = std::iter::Peekable<std::str::CharIndices<'a>>;

fn read_number(chars: &mut Chars<'_>, mut buf: String) -> String {
    while let Some(&(_, next)) = chars.peek() {
        if next.is_ascii_digit() || next == '.' || next == 'e' {
            buf.push(next);
            chars.next();
        } else {
            break;
        }
    }
    buf
}

fn read_string(chars: &mut Chars<'_>, start: usize) -> Result<String, TermError> {
    let mut out = String::new();
    loop {
        match chars.next() {
            None => {
                return Err(TermError {
                    offset: start,
                    message: "unterminated string literal".to_owned(),
                })
            }
            Some((_, '"')) => return Ok(out),
            Some((offset, '\\')) => {
                if let Some(c) = read_escape(chars, offset)? {
                    out.push(c);
                }
            }
            Some((_, c)) => out.push(c),
        }
    }
}

fn read_char_literal(chars: &mut Chars<'_>, start: usize) -> Result<char, TermError> {
    let value = match chars.next() {
        Some((offset, '\\')) => read_escape(chars, offset)?,
        Some((_, '\'')) | None => None,
        Some((_, c)) => Some(c),
    };
    match (value, chars.next()) {
        (Some(c), Some((_, '\''))) => Ok(c),
        _ => Err(TermError {
            offset: start,
            message: "malformed character literal".to_owned(),
        }),
    }
}

/// Decodes one escape after a backslash. `\&` (the empty escape) yields `None`.
fn read_escape(chars: &mut Chars<'_>, offset: usize) -> Result<Option<char>, TermError> {
    let bad = |message: &str| TermError {
        offset,
        message: message.to_owned(),
    };
    let Some((_, c)) = chars.next() else {
        return Err(bad("unterminated escape sequence"));
    };
    let decoded = match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '\\' => '\\',
        '"' => '"',
        '\'' => '\'',
        '&' => return Ok(None),
        d if d.is_ascii_digit() => {
            let mut code = d.to_digit(10).unwrap_or_default();
            while let Some(&(_, next)) = chars.peek() {
                let Some(digit) = next.to_digit(10) else {
                    break;
                };
                code = code
                    .checked_mul(10)
                    .and_then(|code| code.checked_add(digit))
                    .ok_or_else(|| bad("numeric escape out of range"))?;
                chars.next();
            }
            char::from_u32(code).ok_or_else(|| bad("numeric escape is not a valid character"))?
        }
        _ => return Err(bad("unsupported escape sequence")),
    };
    Ok(Some(decoded))
}

struct Parser<'t> {
    tokens: &'t [(usize, Tok)],
    pos: usize,
    end: usize,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<(usize, &'t Tok)> {
        self.tokens.get(self.pos).map(|(offset, tok)| (*offset, tok))
    }

    fn bump(&mut self) -> Option<(usize, &'t Tok)> {
        let next = self.peek();
        if next.is_some() {
            self.pos += 1;
        }
        next
    }

    fn offset(&self) -> usize {
        self.peek().map_or(self.end, |(offset, _)| offset)
    }

    fn error(&self, message: impl Into<String>) -> TermError {
        TermError {
            offset: self.offset(),
            message: message.into(),
        }
    }

    fn expect(&mut self, want: &Tok) -> Result<(), TermError> {
        match self.peek() {
            Some((_, tok)) if tok == want => {
                self.pos += 1;
                Ok(())
            }
            Some((_, tok)) => Err(self.error(format!("expected {want}, found {tok}"))),
            None => Err(self.error(format!("expected {want}, found end of input"))),
        }
    }

    fn starts_atom(&self) -> bool {
        matches!(
            self.peek(),
            Some((
                _,
                Tok::Open(_) | Tok::Ident(_) | Tok::Str(_) | Tok::Char(_) | Tok::Number(_)
            ))
        )
    }

    /// An application `head arg*`, or a lone atom.
    fn expr(&mut self) -> Result<Term, TermError> {
        let first = self.atom()?;
        let head = match &first {
            Term::App { head, args } if args.is_empty() => head.clone(),
            _ => {
                if self.starts_atom() {
                    return Err(self.error(format!("{} cannot be applied", first.describe())));
                }
                return Ok(first);
            }
        };
        let mut args = Vec::new();
        while self.starts_atom() {
            args.push(self.atom()?);
        }
        Ok(Term::App { head, args })
    }

    fn atom(&mut self) -> Result<Term, TermError> {
        let Some((_, tok)) = self.bump() else {
            return Err(self.error("expected a term, found end of input"));
        };
        match tok {
            Tok::Ident(name) => {
                if matches!(self.peek(), Some((_, Tok::Open('{')))) {
                    self.pos += 1;
                    return self.record_fields(name.clone());
                }
                Ok(Term::App {
                    head: name.clone(),
                    args: Vec::new(),
                })
            }
            Tok::Str(s) => Ok(Term::Str(s.clone())),
            Tok::Char(c) => Ok(Term::Char(*c)),
            Tok::Number(n) => Ok(Term::Number(n.clone())),
            Tok::Open('[') => Ok(Term::List(self.sequence(']')?)),
            Tok::Open('(') => {
                let mut items = self.sequence(')')?;
                if items.len() == 1 {
                    Ok(items.remove(0))
                } else {
                    Ok(Term::Tuple(items))
                }
            }
            other => {
                self.pos -= 1;
                Err(self.error(format!("expected a term, found {other}")))
            }
        }
    }

    /// Comma-separated expressions up to `close`; the opener is already consumed.
    fn sequence(&mut self, close: char) -> Result<Vec<Term>, TermError> {
        let mut items = Vec::new();
        if matches!(self.peek(), Some((_, Tok::Close(c))) if *c == close) {
            self.pos += 1;
            return Ok(items);
        }
        loop {
            items.push(self.expr()?);
            match self.peek() {
                Some((_, Tok::Comma)) => self.pos += 1,
                Some((_, Tok::Close(c))) if *c == close => {
                    self.pos += 1;
                    return Ok(items);
                }
                Some((_, tok)) => {
                    return Err(self.error(format!("expected `,` or `{close}`, found {tok}")))
                }
                None => return Err(self.error(format!("expected `{close}`, found end of input"))),
            }
        }
    }

    fn record_fields(&mut self, con: String) -> Result<Term, TermError> {
        let mut fields = Vec::new();
        if matches!(self.peek(), Some((_, Tok::Close('}')))) {
            self.pos += 1;
            return Ok(Term::Record { con, fields });
        }
        loop {
            let name = match self.bump() {
                Some((_, Tok::Ident(name))) => name.clone(),
                Some((_, tok)) => {
                    self.pos -= 1;
                    return Err(self.error(format!("expected a field name, found {tok}")));
                }
                None => return Err(self.error("expected a field name, found end of input")),
            };
            self.expect(&Tok::Equals)?;
            let value = self.expr()?;
            fields.push((name, value));
            match self.bump() {
                Some((_, Tok::Comma)) => {}
                Some((_, Tok::Close('}'))) => return Ok(Term::Record { con, fields }),
                Some((_, tok)) => {
                    self.pos -= 1;
                    return Err(self.error(format!("expected `,` or `}}`, found {tok}")));
                }
                None => return Err(self.error("expected `}`, found end of input")),
            }
        }
    }
}
