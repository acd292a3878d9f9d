//! Per-message SEARCH key evaluation against a mailbox snapshot.

use chrono::{DateTime, FixedOffset};

use crate::message::Message;
use crate::types::{Flag, FlagSet, SearchKey};

/// Everything one SEARCH evaluation needs about a single message, gathered
/// from the mailbox view so the evaluator itself stays pure and testable.
pub struct SearchContext<'a> {
    pub seq: u32,
    pub uid: u32,
    pub flags: &'a FlagSet,
    pub internal_date: DateTime<FixedOffset>,
    pub size_octets: u32,
    pub message: &'a Message,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_ascii_lowercase().contains(&needle.to_ascii_lowercase())
}

fn header_contains(message: &Message, name: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return message.header(name).is_some();
    }
    message
        .header(name)
        .map(|value| contains_ci(value, needle))
        .unwrap_or(false)
}

/// `BEFORE`/`ON`/`SINCE` compare calendar dates, not instants (RFC 3501
/// §6.4.4: "the time and timezone are irrelevant").
fn date_key(date: &DateTime<FixedOffset>) -> (i32, u32, u32) {
    use chrono::Datelike;
    (date.year(), date.month(), date.day())
}

fn parse_search_date(raw: &str) -> Option<(i32, u32, u32)> {
    crate::types::datetime::parse_internal_date(raw).map(|d| date_key(&d))
}

/// Evaluate `key` for one message. `all_seqs`/`all_uids` back the bare
/// sequence-set and `UID` search keys, which need the full ascending
/// enumeration to resolve `*`.
pub fn evaluate(key: &SearchKey, ctx: &SearchContext, all_seqs: &[u32], all_uids: &[u32]) -> bool {
    match key {
        SearchKey::All => true,
        SearchKey::Answered => ctx.flags.contains(&Flag::Answered),
        SearchKey::Unanswered => !ctx.flags.contains(&Flag::Answered),
        SearchKey::Deleted => ctx.flags.contains(&Flag::Deleted),
        SearchKey::Undeleted => !ctx.flags.contains(&Flag::Deleted),
        SearchKey::Draft => ctx.flags.contains(&Flag::Draft),
        SearchKey::Undraft => !ctx.flags.contains(&Flag::Draft),
        SearchKey::Flagged => ctx.flags.contains(&Flag::Flagged),
        SearchKey::Unflagged => !ctx.flags.contains(&Flag::Flagged),
        SearchKey::Seen => ctx.flags.contains(&Flag::Seen),
        SearchKey::Unseen => !ctx.flags.contains(&Flag::Seen),
        SearchKey::Recent => ctx.flags.contains(&Flag::Recent),
        SearchKey::New => ctx.flags.contains(&Flag::Recent) && !ctx.flags.contains(&Flag::Seen),
        SearchKey::Old => !ctx.flags.contains(&Flag::Recent),
        SearchKey::Header(field, value) => header_contains(ctx.message, field, value),
        SearchKey::Bcc(value) => header_contains(ctx.message, "Bcc", value),
        SearchKey::Cc(value) => header_contains(ctx.message, "Cc", value),
        SearchKey::From(value) => header_contains(ctx.message, "From", value),
        SearchKey::Subject(value) => header_contains(ctx.message, "Subject", value),
        SearchKey::To(value) => header_contains(ctx.message, "To", value),
        SearchKey::Keyword(name) => ctx.flags.contains(&Flag::Keyword(name.clone())),
        SearchKey::Unkeyword(name) => !ctx.flags.contains(&Flag::Keyword(name.clone())),
        SearchKey::Body(value) => {
            let text = String::from_utf8_lossy(ctx.message.full_text_bytes());
            contains_ci(&text, value)
        }
        SearchKey::Text(value) => {
            let full = String::from_utf8_lossy(&ctx.message.raw);
            contains_ci(&full, value)
        }
        SearchKey::Larger(n) => ctx.size_octets > *n,
        SearchKey::Smaller(n) => ctx.size_octets < *n,
        SearchKey::Before(raw) => parse_search_date(raw)
            .map(|d| date_key(&ctx.internal_date) < d)
            .unwrap_or(false),
        SearchKey::On(raw) => parse_search_date(raw)
            .map(|d| date_key(&ctx.internal_date) == d)
            .unwrap_or(false),
        SearchKey::Since(raw) => parse_search_date(raw)
            .map(|d| date_key(&ctx.internal_date) >= d)
            .unwrap_or(false),
        SearchKey::SentBefore(raw) => sent_date_cmp(ctx, raw, std::cmp::Ordering::Less),
        SearchKey::SentOn(raw) => sent_date_cmp(ctx, raw, std::cmp::Ordering::Equal),
        SearchKey::SentSince(raw) => {
            sent_date_cmp(ctx, raw, std::cmp::Ordering::Greater)
                || sent_date_cmp(ctx, raw, std::cmp::Ordering::Equal)
        }
        SearchKey::SequenceSet(set) => set.resolve(all_seqs).contains(&ctx.seq),
        SearchKey::Uid(set) => set.resolve(all_uids).contains(&ctx.uid),
        SearchKey::And(keys) => keys.iter().all(|k| evaluate(k, ctx, all_seqs, all_uids)),
        SearchKey::Or(a, b) => {
            evaluate(a, ctx, all_seqs, all_uids) || evaluate(b, ctx, all_seqs, all_uids)
        }
        SearchKey::Not(inner) => !evaluate(inner, ctx, all_seqs, all_uids),
    }
}

/// The `Date:` header is RFC 5322 (`"Wed, 05 Mar 2024 09:30:00 +0000"`),
/// not the `INTERNALDATE` format `BEFORE`/`ON`/`SINCE` compare against —
/// `mailparse::dateparse` is what this crate already uses elsewhere to read
/// message headers, so it is the natural parser for this one too.
fn parse_rfc5322_date(raw: &str) -> Option<(i32, u32, u32)> {
    use chrono::{Datelike, TimeZone, Utc};
    let secs = mailparse::dateparse(raw).ok()?;
    let dt = Utc.timestamp_opt(secs, 0).single()?;
    Some((dt.year(), dt.month(), dt.day()))
}

fn sent_date_cmp(ctx: &SearchContext, raw: &str, want: std::cmp::Ordering) -> bool {
    let Some(target) = parse_search_date(raw) else {
        return false;
    };
    let Some(sent) = ctx.message.header("Date").and_then(parse_rfc5322_date) else {
        return false;
    };
    sent.cmp(&target) == want
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::now_as_fixed_offset;

    fn ctx(message: &Message, flags: &FlagSet) -> SearchContext<'_> {
        SearchContext {
            seq: 1,
            uid: 1,
            flags,
            internal_date: now_as_fixed_offset(),
            size_octets: message.size_octets(),
            message,
        }
    }

    #[test]
    fn all_always_matches() {
        let message = Message::parse(b"Subject: hi\r\n\r\nbody\r\n".to_vec()).unwrap();
        let flags = FlagSet::new();
        assert!(evaluate(&SearchKey::All, &ctx(&message, &flags), &[1], &[1]));
    }

    #[test]
    fn subject_substring_is_case_insensitive() {
        let message = Message::parse(b"Subject: Hello World\r\n\r\nbody\r\n".to_vec()).unwrap();
        let flags = FlagSet::new();
        let key = SearchKey::Subject("hello".to_owned());
        assert!(evaluate(&key, &ctx(&message, &flags), &[1], &[1]));
    }

    #[test]
    fn and_requires_every_branch() {
        let message = Message::parse(b"Subject: hi\r\n\r\nbody\r\n".to_vec()).unwrap();
        let mut flags = FlagSet::new();
        flags.insert(Flag::Seen);
        let key = SearchKey::And(vec![SearchKey::Seen, SearchKey::Deleted]);
        assert!(!evaluate(&key, &ctx(&message, &flags), &[1], &[1]));
    }

    #[test]
    fn senton_reads_the_date_header_not_internaldate() {
        let message = Message::parse(
            b"Date: Tue, 05 Mar 2024 09:30:00 +0000\r\nSubject: hi\r\n\r\nbody\r\n".to_vec(),
        )
        .unwrap();
        let flags = FlagSet::new();
        let key = SearchKey::SentOn("05-Mar-2024".to_owned());
        assert!(evaluate(&key, &ctx(&message, &flags), &[1], &[1]));
        let key = SearchKey::SentOn("06-Mar-2024".to_owned());
        assert!(!evaluate(&key, &ctx(&message, &flags), &[1], &[1]));
    }

    #[test]
    fn new_is_recent_and_not_seen() {
        let message = Message::parse(b"Subject: hi\r\n\r\nbody\r\n".to_vec()).unwrap();
        let mut flags = FlagSet::new();
        flags.insert(Flag::Recent);
        assert!(evaluate(&SearchKey::New, &ctx(&message, &flags), &[1], &[1]));
        flags.insert(Flag::Seen);
        assert!(!evaluate(&SearchKey::New, &ctx(&message, &flags), &[1], &[1]));
    }
}
