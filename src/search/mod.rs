//! C4: the SEARCH key grammar, represented as the
//! `And(Vec<Node>) | Or(Node, Node) | Not(Node) | Leaf(Predicate)` AST the
//! spec's design note (§9) calls for, and its per-message evaluator.
//!
//! The grammar itself is a tree of `nom` combinators parsed straight off
//! the command's raw argument bytes, the same shape the upstream
//! `search` module builds `search-key`/`search-key-list` out of
//! `alt`/`separated_list1`/`delimited` — rather than walking a
//! pre-tokenized slice.
//!
//! CHARSET handling is deliberately narrow: only `US-ASCII` and `UTF-8` are
//! accepted (spec Non-goals exclude general charset transcoding), and string
//! comparisons are byte-wise over the UTF-8 text — see the Open Question
//! decision recorded in `DESIGN.md`.

pub mod eval;

use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while},
    character::complete::{char, digit1},
    combinator::{all_consuming, map, map_opt, map_res, value},
    multi::separated_list1,
    sequence::{delimited, pair, preceded, separated_pair},
    IResult,
};

use crate::error::{ImapError, ImapResult};
use crate::tokenizer::astring;
use crate::types::{SearchKey, SeqSet};

/// Zero or more spaces.
fn ws0(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while(|b| b == b' ')(input)
}

/// One or more spaces, the mandatory separator between SEARCH terms.
fn ws1(input: &[u8]) -> IResult<&[u8], &[u8]> {
    nom::bytes::complete::take_while1(|b| b == b' ')(input)
}

fn number(input: &[u8]) -> IResult<&[u8], u32> {
    map_res(digit1, |d: &[u8]| std::str::from_utf8(d).unwrap().parse())(input)
}

fn seq_set_bytes(input: &[u8]) -> IResult<&[u8], SeqSet> {
    map_opt(crate::tokenizer::atom, |raw: &[u8]| {
        let s = std::str::from_utf8(raw).ok()?;
        SeqSet::parse(s).ok()
    })(input)
}

/// A bare keyword that must be followed by a space, a closing paren, or
/// end of input — so e.g. `keyword("ON")` doesn't swallow the first two
/// letters of `ONE`.
fn keyword<'a>(word: &'static str) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], &'a [u8]> {
    move |input: &'a [u8]| {
        let (rest, matched) = tag_no_case(word.as_bytes())(input)?;
        match rest.first() {
            None | Some(b' ') | Some(b')') => Ok((rest, matched)),
            _ => Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            ))),
        }
    }
}

fn search_key_list(input: &[u8]) -> IResult<&[u8], Vec<SearchKey>> {
    separated_list1(ws1, search_key)(input)
}

fn parenthesised(input: &[u8]) -> IResult<&[u8], SearchKey> {
    map(
        delimited(char('('), delimited(ws0, search_key_list, ws0), char(')')),
        collapse,
    )(input)
}

fn collapse(mut keys: Vec<SearchKey>) -> SearchKey {
    if keys.len() == 1 {
        keys.pop().unwrap()
    } else {
        SearchKey::And(keys)
    }
}

fn flag_terms(input: &[u8]) -> IResult<&[u8], SearchKey> {
    alt((
        value(SearchKey::All, keyword("ALL")),
        value(SearchKey::Answered, keyword("ANSWERED")),
        value(SearchKey::Unanswered, keyword("UNANSWERED")),
        value(SearchKey::Deleted, keyword("DELETED")),
        value(SearchKey::Undeleted, keyword("UNDELETED")),
        value(SearchKey::Draft, keyword("DRAFT")),
        value(SearchKey::Undraft, keyword("UNDRAFT")),
        value(SearchKey::Flagged, keyword("FLAGGED")),
    ))(input)
}

fn flag_terms2(input: &[u8]) -> IResult<&[u8], SearchKey> {
    alt((
        value(SearchKey::Unflagged, keyword("UNFLAGGED")),
        value(SearchKey::Seen, keyword("SEEN")),
        value(SearchKey::Unseen, keyword("UNSEEN")),
        value(SearchKey::New, keyword("NEW")),
        value(SearchKey::Old, keyword("OLD")),
        value(SearchKey::Recent, keyword("RECENT")),
        map(
            preceded(pair(keyword("NOT"), ws1), search_key),
            |inner| SearchKey::Not(Box::new(inner)),
        ),
        map(
            preceded(
                pair(keyword("OR"), ws1),
                separated_pair(search_key, ws1, search_key),
            ),
            |(a, b)| SearchKey::Or(Box::new(a), Box::new(b)),
        ),
    ))(input)
}

fn string_terms(input: &[u8]) -> IResult<&[u8], SearchKey> {
    alt((
        map(
            preceded(
                pair(keyword("HEADER"), ws1),
                separated_pair(astring, ws1, astring),
            ),
            |(field, value)| SearchKey::Header(field, value),
        ),
        map(preceded(pair(keyword("BCC"), ws1), astring), SearchKey::Bcc),
        map(preceded(pair(keyword("CC"), ws1), astring), SearchKey::Cc),
        map(preceded(pair(keyword("FROM"), ws1), astring), SearchKey::From),
        map(
            preceded(pair(keyword("SUBJECT"), ws1), astring),
            SearchKey::Subject,
        ),
        map(preceded(pair(keyword("TO"), ws1), astring), SearchKey::To),
        map(preceded(pair(keyword("BODY"), ws1), astring), SearchKey::Body),
        map(preceded(pair(keyword("TEXT"), ws1), astring), SearchKey::Text),
    ))(input)
}

fn misc_terms(input: &[u8]) -> IResult<&[u8], SearchKey> {
    alt((
        map(
            preceded(pair(keyword("KEYWORD"), ws1), astring),
            SearchKey::Keyword,
        ),
        map(
            preceded(pair(keyword("UNKEYWORD"), ws1), astring),
            SearchKey::Unkeyword,
        ),
        map(
            preceded(pair(keyword("LARGER"), ws1), number),
            SearchKey::Larger,
        ),
        map(
            preceded(pair(keyword("SMALLER"), ws1), number),
            SearchKey::Smaller,
        ),
        map(
            preceded(pair(keyword("BEFORE"), ws1), astring),
            SearchKey::Before,
        ),
        map(preceded(pair(keyword("ON"), ws1), astring), SearchKey::On),
        map(
            preceded(pair(keyword("SINCE"), ws1), astring),
            SearchKey::Since,
        ),
        map(
            preceded(pair(keyword("SENTBEFORE"), ws1), astring),
            SearchKey::SentBefore,
        ),
    ))(input)
}

fn date_and_uid_terms(input: &[u8]) -> IResult<&[u8], SearchKey> {
    alt((
        map(
            preceded(pair(keyword("SENTON"), ws1), astring),
            SearchKey::SentOn,
        ),
        map(
            preceded(pair(keyword("SENTSINCE"), ws1), astring),
            SearchKey::SentSince,
        ),
        map(
            preceded(pair(keyword("UID"), ws1), seq_set_bytes),
            SearchKey::Uid,
        ),
        parenthesised,
    ))(input)
}

/// Any token that isn't a recognised keyword must be a bare sequence set
/// (RFC 3501 allows `SEARCH 1:5,8` with no keyword).
fn bare_sequence_set(input: &[u8]) -> IResult<&[u8], SearchKey> {
    map(seq_set_bytes, SearchKey::SequenceSet)(input)
}

fn search_key(input: &[u8]) -> IResult<&[u8], SearchKey> {
    alt((
        flag_terms,
        flag_terms2,
        string_terms,
        misc_terms,
        date_and_uid_terms,
        bare_sequence_set,
    ))(input)
}

/// Parse a full `SEARCH`/`UID SEARCH` key list (implicitly AND'd) from the
/// command's raw argument bytes (everything after an optional `CHARSET`
/// prefix, already stripped by the caller).
pub fn parse_search_key_list(input: &[u8]) -> ImapResult<SearchKey> {
    if input.is_empty() {
        return Err(ImapError::bad("SEARCH requires at least one key"));
    }
    match all_consuming(delimited(ws0, search_key_list, ws0))(input) {
        Ok((_, keys)) => Ok(collapse(keys)),
        Err(_) => Err(ImapError::bad("Invalid SEARCH key")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_implicit_and() {
        let key = parse_search_key_list(b"SEEN FLAGGED").unwrap();
        assert_eq!(key, SearchKey::And(vec![SearchKey::Seen, SearchKey::Flagged]));
    }

    #[test]
    fn parses_or_and_not() {
        let key = parse_search_key_list(b"OR NOT SEEN DELETED").unwrap();
        assert_eq!(
            key,
            SearchKey::Or(
                Box::new(SearchKey::Not(Box::new(SearchKey::Seen))),
                Box::new(SearchKey::Deleted)
            )
        );
    }

    #[test]
    fn parses_header_with_two_strings() {
        let key = parse_search_key_list(br#"HEADER "X-Spam" "yes""#).unwrap();
        assert_eq!(
            key,
            SearchKey::Header("X-Spam".to_owned(), "yes".to_owned())
        );
    }

    #[test]
    fn bare_sequence_set_is_a_search_key() {
        let key = parse_search_key_list(b"1:5").unwrap();
        assert!(matches!(key, SearchKey::SequenceSet(_)));
    }

    #[test]
    fn keyword_prefix_does_not_swallow_a_longer_atom() {
        // "ON" must not match the leading two letters of "ONE" here;
        // the whole thing should fall through to the bare-sequence-set
        // arm and fail, since "ONE" isn't a valid sequence set either.
        assert!(parse_search_key_list(b"ONE").is_err());
    }

    #[test]
    fn nested_groups_collapse_single_element_lists() {
        let key = parse_search_key_list(b"(SEEN)").unwrap();
        assert_eq!(key, SearchKey::Seen);
    }
}
