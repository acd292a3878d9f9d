//! C2: atoms, quoted strings, and parenthesised lists.
//!
//! The grammar primitives (`atom`, `quoted`, the `{N}`/`{N+}` literal
//! marker) are `nom` combinators over the already-buffered line, the same
//! way the upstream `core` module builds `atom`/`quoted`/`literal` out of
//! `alt`/`take_while1`/`escaped`. This layer only ever sees a complete
//! line (literal payloads already spliced out by the wire codec in C1),
//! so `nom::*::complete` parsers are used throughout rather than
//! `streaming` ones — there is no partial input to suspend on here.
//!
//! Literal placeholders are resolved upstream by the wire codec (C1) and
//! spliced into the token stream as [`Token::Literal`] before this module
//! ever sees them, so the tokenizer itself stays allocation-light and
//! synchronous.

use nom::{
    branch::alt,
    bytes::complete::{escaped, tag, take_while1},
    character::complete::{char as nom_char, digit1, one_of},
    combinator::{map, opt, recognize},
    sequence::{delimited, tuple},
    IResult,
};

use crate::error::{ImapError, ImapResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Atom(String),
    QuotedString(String),
    Literal(Vec<u8>),
    List(Vec<Token>),
}

impl Token {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Token::Atom(s) | Token::QuotedString(s) => Some(s),
            Token::Literal(bytes) => std::str::from_utf8(bytes).ok(),
            Token::List(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Token::Atom(s) | Token::QuotedString(s) => Some(s.as_bytes()),
            Token::Literal(bytes) => Some(bytes),
            Token::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Token]> {
        match self {
            Token::List(tokens) => Some(tokens),
            _ => None,
        }
    }
}

fn is_atom_char(b: u8) -> bool {
    !matches!(b, b' ' | b'(' | b')' | b'"' | b'\r' | b'\n' | b'{')
}

/// `atom = 1*ATOM-CHAR`
pub(crate) fn atom(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(is_atom_char)(input)
}

/// `quoted = DQUOTE *QUOTED-CHAR DQUOTE`, returning the raw (still
/// escaped) bytes between the quotes.
pub(crate) fn quoted(input: &[u8]) -> IResult<&[u8], &[u8]> {
    delimited(
        nom_char('"'),
        escaped(take_while1(|b| b != b'"' && b != b'\\'), '\\', one_of("\\\"")),
        nom_char('"'),
    )(input)
}

/// `literal = "{" number ["+"] "}"` marker only — the CHAR8 payload was
/// already pulled off the wire by the codec and is threaded through
/// separately.
pub(crate) fn literal_marker(input: &[u8]) -> IResult<&[u8], &[u8]> {
    recognize(tuple((tag(b"{"), digit1, opt(nom_char('+')), tag(b"}"))))(input)
}

pub(crate) fn unescape_quoted(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut bytes = raw.iter().copied();
    while let Some(b) = bytes.next() {
        if b == b'\\' {
            if let Some(c @ (b'"' | b'\\')) = bytes.next() {
                out.push(c as char);
            }
        } else {
            out.push(b as char);
        }
    }
    out
}

pub(crate) fn atom_str(input: &[u8]) -> IResult<&[u8], String> {
    map(atom, |b: &[u8]| String::from_utf8_lossy(b).into_owned())(input)
}

pub(crate) fn quoted_str(input: &[u8]) -> IResult<&[u8], String> {
    map(quoted, unescape_quoted)(input)
}

/// `astring` (roughly): a quoted string or a bare atom run.
pub(crate) fn astring(input: &[u8]) -> IResult<&[u8], String> {
    alt((quoted_str, atom_str))(input)
}

/// A command line with any embedded literals already substituted in as
/// [`Token::Literal`] placeholders (see `codec::reader`), ready for
/// argument tokenization.
pub struct Tokenizer<'a> {
    input: &'a [u8],
    pos: usize,
    literals: &'a [Vec<u8>],
    next_literal: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a [u8], literals: &'a [Vec<u8>]) -> Self {
        Self {
            input,
            pos: 0,
            literals,
            next_literal: 0,
        }
    }

    fn skip_spaces(&mut self) {
        while self.input.get(self.pos) == Some(&b' ') {
            self.pos += 1;
        }
    }

    pub fn at_end(&mut self) -> bool {
        self.skip_spaces();
        self.pos >= self.input.len()
    }

    /// The unconsumed suffix of the line, with leading spaces skipped.
    /// Lets callers hand off to a grammar (e.g. SEARCH's) that parses
    /// straight from bytes instead of through further `next_token` calls.
    pub fn remaining(&mut self) -> &'a [u8] {
        self.skip_spaces();
        &self.input[self.pos..]
    }

    /// Detect and consume a leading `CHARSET astring` prefix (SEARCH's
    /// only argument that precedes the key grammar), returning its value
    /// if present and leaving the cursor untouched otherwise.
    pub fn take_charset_prefix(&mut self) -> Option<String> {
        self.skip_spaces();
        let rest = &self.input[self.pos..];
        let parsed = tuple((
            nom::bytes::complete::tag_no_case(b"CHARSET".as_slice()),
            take_while1(|b| b == b' '),
            astring,
        ))(rest);
        match parsed {
            Ok((remaining, (_, _, charset))) => {
                self.pos = self.input.len() - remaining.len();
                Some(charset)
            }
            Err(_) => None,
        }
    }

    /// Read one token: atom, quoted string, literal placeholder, or a
    /// recursively-tokenized parenthesised list.
    pub fn next_token(&mut self) -> ImapResult<Token> {
        self.skip_spaces();
        match self.input.get(self.pos) {
            None => Err(ImapError::bad("Unexpected end of command")),
            Some(b'(') => self.read_list(),
            Some(b'"') => self.read_quoted(),
            Some(b'{') => self.read_literal_marker(),
            _ => self.read_atom(),
        }
    }

    fn read_list(&mut self) -> ImapResult<Token> {
        self.pos += 1; // consume '('
        let mut items = Vec::new();
        loop {
            self.skip_spaces();
            match self.input.get(self.pos) {
                None => return Err(ImapError::bad("Unterminated list")),
                Some(b')') => {
                    self.pos += 1;
                    return Ok(Token::List(items));
                }
                _ => items.push(self.next_token()?),
            }
        }
    }

    fn read_quoted(&mut self) -> ImapResult<Token> {
        let (remaining, raw) = quoted(&self.input[self.pos..])
            .map_err(|_| ImapError::bad("Unterminated quoted string"))?;
        self.pos = self.input.len() - remaining.len();
        Ok(Token::QuotedString(unescape_quoted(raw)))
    }

    /// Literals were already substituted by the wire codec as a
    /// `{N}`/`{N+}` run; we surface them in order.
    fn read_literal_marker(&mut self) -> ImapResult<Token> {
        let (remaining, _) = literal_marker(&self.input[self.pos..])
            .map_err(|_| ImapError::bad("Malformed literal marker"))?;
        self.pos = self.input.len() - remaining.len();
        let literal = self
            .literals
            .get(self.next_literal)
            .cloned()
            .ok_or_else(|| ImapError::bad("Literal marker without matching payload"))?;
        self.next_literal += 1;
        Ok(Token::Literal(literal))
    }

    fn read_atom(&mut self) -> ImapResult<Token> {
        let (remaining, raw) =
            atom(&self.input[self.pos..]).map_err(|_| ImapError::bad("Expected an atom"))?;
        self.pos = self.input.len() - remaining.len();
        Ok(Token::Atom(String::from_utf8_lossy(raw).into_owned()))
    }
}

/// INBOX is case-insensitive; every other mailbox atom/quoted-string is
/// taken verbatim.
pub fn mailbox_name_from_token(token: &Token) -> ImapResult<crate::types::MailboxName> {
    let raw = token
        .as_str()
        .ok_or_else(|| ImapError::bad("Expected a mailbox name"))?;
    Ok(crate::types::MailboxName::new(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_atoms_and_quoted_strings() {
        let mut tok = Tokenizer::new(br#"FOO "bar baz""#, &[]);
        assert_eq!(tok.next_token().unwrap(), Token::Atom("FOO".to_owned()));
        assert_eq!(
            tok.next_token().unwrap(),
            Token::QuotedString("bar baz".to_owned())
        );
    }

    #[test]
    fn tokenizes_nested_parenthesised_lists() {
        let mut tok = Tokenizer::new(b"(FLAGS (\\Seen \\Deleted))", &[]);
        let Token::List(outer) = tok.next_token().unwrap() else {
            panic!("expected list");
        };
        assert_eq!(outer[0], Token::Atom("FLAGS".to_owned()));
        let Token::List(inner) = &outer[1] else {
            panic!("expected nested list");
        };
        assert_eq!(inner.len(), 2);
    }

    #[test]
    fn unescapes_quoted_backslashes_and_quotes() {
        let mut tok = Tokenizer::new(br#""a\"b\\c""#, &[]);
        assert_eq!(
            tok.next_token().unwrap(),
            Token::QuotedString(r#"a"b\c"#.to_owned())
        );
    }

    #[test]
    fn empty_quoted_string_parses() {
        let mut tok = Tokenizer::new(br#""""#, &[]);
        assert_eq!(tok.next_token().unwrap(), Token::QuotedString(String::new()));
    }

    #[test]
    fn substitutes_literal_placeholders_in_order() {
        let mut tok = Tokenizer::new(b"{5}", &[b"hello".to_vec()]);
        assert_eq!(tok.next_token().unwrap(), Token::Literal(b"hello".to_vec()));
    }

    #[test]
    fn take_charset_prefix_consumes_only_when_present() {
        let mut tok = Tokenizer::new(b"CHARSET UTF-8 SEEN", &[]);
        assert_eq!(tok.take_charset_prefix(), Some("UTF-8".to_owned()));
        assert_eq!(tok.remaining(), b"SEEN");

        let mut tok = Tokenizer::new(b"SEEN", &[]);
        assert_eq!(tok.take_charset_prefix(), None);
        assert_eq!(tok.remaining(), b"SEEN");
    }
}
