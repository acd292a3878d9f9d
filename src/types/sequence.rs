//! Sequence-set / UID-set grammar and evaluation (C3).
//!
//! `set := element ("," element)*`, `element := num | num":"num | "*"`,
//! parsed with the same `nom` combinator shape the upstream `sequence`
//! module uses for `sequence-set`/`seq-range`/`seq-number`, adapted from
//! `streaming` to `complete` parsers since this layer only ever sees a
//! fully-buffered argument string.
//!
//! `*` means "the largest existing sequence number or UID" per RFC 3501,
//! never "any" — see spec §9 open question (a).

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::digit1,
    combinator::{map, map_res, value},
    multi::separated_list1,
    sequence::tuple,
    IResult,
};

use crate::error::{ImapError, ImapResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqSetElement {
    Number(u32),
    Range(u32, u32),
    Star,
    RangeToStar(u32),
    StarToRange(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeqSet(pub Vec<SeqSetElement>);

impl SeqSet {
    /// Parse `1:5,8,*`-style input. Fails only on syntactic malformation.
    pub fn parse(input: &str) -> ImapResult<SeqSet> {
        match nom::combinator::all_consuming(sequence_set)(input) {
            Ok((_, elements)) => Ok(SeqSet(elements)),
            Err(_) => Err(ImapError::bad("Invalid sequence set")),
        }
    }

    /// Resolve against the actual ascending list of present numbers
    /// (sequence numbers or UIDs), returning a deduplicated ascending
    /// subset of `present`.
    pub fn resolve(&self, present: &[u32]) -> Vec<u32> {
        if present.is_empty() {
            return Vec::new();
        }
        let largest = *present.iter().max().unwrap();
        let present_set: std::collections::BTreeSet<u32> = present.iter().copied().collect();
        let mut hits = std::collections::BTreeSet::new();

        for element in &self.0 {
            let (lo, hi) = match *element {
                SeqSetElement::Number(n) => (n, n),
                SeqSetElement::Range(a, b) => {
                    if a <= b {
                        (a, b)
                    } else {
                        (b, a)
                    }
                }
                SeqSetElement::Star => (largest, largest),
                SeqSetElement::RangeToStar(a) => {
                    if a <= largest {
                        (a, largest)
                    } else {
                        (largest, a)
                    }
                }
                SeqSetElement::StarToRange(b) => {
                    if b <= largest {
                        (b, largest)
                    } else {
                        (largest, b)
                    }
                }
            };
            for n in lo..=hi {
                if present_set.contains(&n) {
                    hits.insert(n);
                }
            }
        }
        hits.into_iter().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeqNumber {
    Value(u32),
    Star,
}

fn number(input: &str) -> IResult<&str, u32> {
    map_res(digit1, str::parse)(input)
}

/// `seq-number = nz-number / "*"`
fn seq_number(input: &str) -> IResult<&str, SeqNumber> {
    alt((
        map(number, SeqNumber::Value),
        value(SeqNumber::Star, tag("*")),
    ))(input)
}

/// `seq-range = seq-number ":" seq-number`
fn seq_range(input: &str) -> IResult<&str, SeqSetElement> {
    map(
        tuple((seq_number, tag(":"), seq_number)),
        |(a, _, b)| match (a, b) {
            (SeqNumber::Star, SeqNumber::Star) => SeqSetElement::Star,
            (SeqNumber::Star, SeqNumber::Value(b)) => SeqSetElement::StarToRange(b),
            (SeqNumber::Value(a), SeqNumber::Star) => SeqSetElement::RangeToStar(a),
            (SeqNumber::Value(a), SeqNumber::Value(b)) => SeqSetElement::Range(a, b),
        },
    )(input)
}

fn seq_element(input: &str) -> IResult<&str, SeqSetElement> {
    alt((
        seq_range,
        map(seq_number, |n| match n {
            SeqNumber::Value(v) => SeqSetElement::Number(v),
            SeqNumber::Star => SeqSetElement::Star,
        }),
    ))(input)
}

/// `sequence-set = (seq-number / seq-range) *("," (seq-number / seq-range))`
fn sequence_set(input: &str) -> IResult<&str, Vec<SeqSetElement>> {
    separated_list1(tag(","), seq_element)(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_are_order_independent() {
        let set = SeqSet::parse("4:2").unwrap();
        assert_eq!(set.resolve(&[1, 2, 3, 4, 5]), vec![2, 3, 4]);
    }

    #[test]
    fn star_means_largest_present() {
        let set = SeqSet::parse("*").unwrap();
        assert_eq!(set.resolve(&[1, 2, 7]), vec![7]);
    }

    #[test]
    fn deduplicates_and_sorts() {
        let set = SeqSet::parse("1:5,3,8").unwrap();
        assert_eq!(set.resolve(&[1, 2, 3, 4, 5, 8]), vec![1, 2, 3, 4, 5, 8]);
    }

    #[test]
    fn nonexistent_numbers_silently_skipped() {
        let set = SeqSet::parse("1,99").unwrap();
        assert_eq!(set.resolve(&[1, 2, 3]), vec![1]);
    }

    #[test]
    fn empty_expansion_is_empty_not_an_error() {
        let set = SeqSet::parse("99").unwrap();
        assert!(set.resolve(&[1, 2, 3]).is_empty());
    }

    #[test]
    fn malformed_input_is_bad() {
        assert!(SeqSet::parse("1:a").is_err());
        assert!(SeqSet::parse("").is_err());
        assert!(SeqSet::parse(",").is_err());
    }

    #[test]
    fn star_to_number_and_number_to_star_ranges_parse() {
        let set = SeqSet::parse("*:2").unwrap();
        assert_eq!(set.resolve(&[1, 2, 3, 4]), vec![2, 3, 4]);
        let set = SeqSet::parse("2:*").unwrap();
        assert_eq!(set.resolve(&[1, 2, 3, 4]), vec![2, 3, 4]);
    }
}
