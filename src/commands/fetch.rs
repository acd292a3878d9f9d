//! C5: the FETCH responder — macro expansion (ALL/FAST/FULL), structural
//! items (ENVELOPE/BODYSTRUCTURE/BODY), section addressing with `<partial>`,
//! and the `\Seen` side effect of a non-peeking `BODY[section]` fetch.

use std::sync::Arc;

use crate::error::{ImapError, ImapResult};
use crate::mailbox_view::MailboxView;
use crate::message::Message;
use crate::repository::Repository;
use crate::types::{
    BodyStructure, Data, Envelope, Flag, FetchAttributeValue, FetchItem, MimePartPath, SeqSet,
};

use super::resolve_targets;

/// Execute a `FETCH`/`UID FETCH`. Returns one [`Data::Fetch`] per resolved
/// message, in ascending sequence order, plus the set of sequence numbers
/// whose `\Seen` flag was newly set as a side effect (so the session can
/// also emit the implicit `FLAGS` update FETCH responses require,
/// RFC 3501 §6.4.5).
pub fn handle_fetch(
    view: &mut MailboxView,
    repo: &dyn Repository,
    user: &str,
    set: &SeqSet,
    items: &[FetchItem],
    uid: bool,
) -> ImapResult<Vec<Data>> {
    let targets = resolve_targets(view, set, uid);
    let mut out = Vec::with_capacity(targets.len());

    // RFC 3501 §6.4.8: a UID FETCH always returns UID in the data, even if
    // the client's item list didn't ask for it.
    let needs_implicit_uid = uid && !items.iter().any(|item| matches!(item, FetchItem::Uid));

    for (seq, msg_uid) in targets {
        let entry = view
            .entry_at_seq(seq)
            .ok_or_else(|| ImapError::server_bug("FETCH target vanished mid-command"))?
            .clone();
        let message = repo.load_message(user, entry.message_id)?;

        let marks_seen = items.iter().any(|item| {
            matches!(item, FetchItem::Rfc822 | FetchItem::Rfc822Text)
                || matches!(item, FetchItem::BodySection { peek: false, .. })
        });
        if marks_seen && !view.read_only {
            let mut flags = entry.flags.clone();
            if flags.insert(Flag::Seen) {
                repo.update_flags(user, &view.name, entry.uid, flags.clone())?;
                view.set_flags_at_seq(seq, flags);
            }
        }

        let entry = view
            .entry_at_seq(seq)
            .ok_or_else(|| ImapError::server_bug("FETCH target vanished mid-command"))?
            .clone();

        let mut attributes = Vec::with_capacity(items.len() + 1);
        if needs_implicit_uid {
            attributes.push(FetchAttributeValue::Uid(msg_uid));
        }
        for item in items {
            attributes.push(render_item(item, &message, &entry.flags, msg_uid, &entry)?);
        }

        out.push(Data::Fetch { seq, attributes });
    }

    Ok(out)
}

fn render_item(
    item: &FetchItem,
    message: &Arc<Message>,
    flags: &crate::types::FlagSet,
    uid: u32,
    entry: &crate::repository::MailboxEntry,
) -> ImapResult<FetchAttributeValue> {
    Ok(match item {
        FetchItem::Flags => {
            FetchAttributeValue::Flags(flags.iter().map(|f| f.to_string()).collect())
        }
        FetchItem::InternalDate => FetchAttributeValue::InternalDate(
            crate::types::datetime::format_internal_date(&entry.internal_date),
        ),
        FetchItem::Rfc822Size => FetchAttributeValue::Rfc822Size(message.size_octets()),
        FetchItem::Envelope => {
            FetchAttributeValue::Envelope(Envelope::from_message(message).render())
        }
        FetchItem::Uid => FetchAttributeValue::Uid(uid),
        FetchItem::Rfc822 => FetchAttributeValue::Rfc822(message.raw.clone()),
        FetchItem::Rfc822Header => {
            FetchAttributeValue::Rfc822Header(message.full_header_bytes().to_vec())
        }
        FetchItem::Rfc822Text => {
            FetchAttributeValue::Rfc822Text(message.full_text_bytes().to_vec())
        }
        FetchItem::BodyStructure => {
            FetchAttributeValue::BodyStructure(BodyStructure::render(&message.root, true).as_str().to_owned())
        }
        FetchItem::Body => {
            FetchAttributeValue::Body(BodyStructure::render(&message.root, false).as_str().to_owned())
        }
        FetchItem::BodySection {
            peek: _,
            section,
            partial,
        } => {
            let data = fetch_section_bytes(message, section)?;
            let (data, origin) = match partial {
                Some((start, len)) => {
                    let start = (*start as usize).min(data.len());
                    let end = (start + *len as usize).min(data.len());
                    (data[start..end].to_vec(), Some(*start as u32))
                }
                None => (data, None),
            };
            FetchAttributeValue::BodySection {
                section: section.clone(),
                partial_origin: origin,
                data,
            }
        }
    })
}

/// Resolve a `BODY[section]` label to its bytes. `section` is one of:
/// empty (whole message), `HEADER`, `TEXT`, `HEADER.FIELDS (names)`,
/// `HEADER.FIELDS.NOT (names)`, or a dotted numeric part path optionally
/// suffixed with `.HEADER`/`.TEXT`/`.MIME`.
fn fetch_section_bytes(message: &Message, section: &str) -> ImapResult<Vec<u8>> {
    if section.is_empty() {
        return Ok(message.raw.clone());
    }
    if section.eq_ignore_ascii_case("HEADER") {
        return Ok(message.full_header_bytes().to_vec());
    }
    if section.eq_ignore_ascii_case("TEXT") {
        return Ok(message.full_text_bytes().to_vec());
    }
    if let Some(rest) = strip_header_fields_prefix(section) {
        let (names, invert) = rest;
        return Ok(message.header_fields(&names, invert));
    }

    let (path_str, suffix) = split_trailing_suffix(section);
    let path = MimePartPath::parse(path_str)
        .ok_or_else(|| ImapError::bad(format!("Malformed MIME section {section}")))?;
    let node = message
        .root
        .navigate(&path.0)
        .ok_or_else(|| ImapError::no(format!("No such MIME part {section}")))?;

    Ok(match suffix {
        Some("HEADER") => message.slice(&node.header_range).to_vec(),
        Some("TEXT") | Some("MIME") => message.slice(&node.body_range).to_vec(),
        _ => message.slice(&node.full_range()).to_vec(),
    })
}

fn strip_header_fields_prefix(section: &str) -> Option<(Vec<String>, bool)> {
    let upper = section.to_ascii_uppercase();
    let (prefix, invert) = if upper.starts_with("HEADER.FIELDS.NOT") {
        ("HEADER.FIELDS.NOT", true)
    } else if upper.starts_with("HEADER.FIELDS") {
        ("HEADER.FIELDS", false)
    } else {
        return None;
    };
    let rest = section[prefix.len()..].trim();
    let inner = rest.trim_start_matches('(').trim_end_matches(')');
    let names = inner
        .split_whitespace()
        .map(|s| s.trim_matches('"').to_owned())
        .collect();
    Some((names, invert))
}

fn split_trailing_suffix(section: &str) -> (&str, Option<&'static str>) {
    let upper = section.to_ascii_uppercase();
    for suffix in ["HEADER", "TEXT", "MIME"] {
        let marker = format!(".{suffix}");
        if upper.ends_with(&marker) {
            return (&section[..section.len() - marker.len()], Some(suffix));
        }
    }
    (section, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{now_as_fixed_offset, InMemoryRepository};
    use crate::types::{Flag, FlagSet, MailboxName};

    fn setup() -> (InMemoryRepository, MailboxView) {
        let repo = InMemoryRepository::new();
        repo.provision_user("alice");
        let msg_id = repo
            .store_message("alice", b"Subject: hi\r\n\r\nhello\r\n".to_vec())
            .unwrap();
        repo.insert_entry(
            "alice",
            &MailboxName::inbox(),
            msg_id,
            FlagSet::new(),
            now_as_fixed_offset(),
        )
        .unwrap();
        let snapshot = repo.snapshot("alice", &MailboxName::inbox()).unwrap();
        let view = MailboxView::from_snapshot(MailboxName::inbox(), snapshot, false);
        (repo, view)
    }

    #[test]
    fn fetch_flags_and_uid() {
        let (repo, mut view) = setup();
        let set = SeqSet::parse("1").unwrap();
        let results = handle_fetch(&mut view, &repo, "alice", &set, &[FetchItem::Uid], false).unwrap();
        match &results[0] {
            Data::Fetch { attributes, .. } => {
                assert_eq!(attributes[0], FetchAttributeValue::Uid(1));
            }
            _ => panic!("expected Fetch"),
        }
    }

    #[test]
    fn body_section_without_peek_sets_seen() {
        let (repo, mut view) = setup();
        let set = SeqSet::parse("1").unwrap();
        let items = vec![FetchItem::BodySection {
            peek: false,
            section: "TEXT".to_owned(),
            partial: None,
        }];
        handle_fetch(&mut view, &repo, "alice", &set, &items, false).unwrap();
        assert!(view.entry_at_seq(1).unwrap().flags.contains(&Flag::Seen));
    }

    #[test]
    fn uid_fetch_implicitly_includes_uid() {
        let (repo, mut view) = setup();
        let set = SeqSet::parse("1").unwrap();
        let results =
            handle_fetch(&mut view, &repo, "alice", &set, &[FetchItem::Flags], true).unwrap();
        match &results[0] {
            Data::Fetch { attributes, .. } => {
                assert_eq!(attributes[0], FetchAttributeValue::Uid(1));
            }
            _ => panic!("expected Fetch"),
        }
    }

    #[test]
    fn header_fields_filters_to_named_headers() {
        let message =
            Message::parse(b"Subject: hi\r\nX-Other: nope\r\n\r\nbody\r\n".to_vec()).unwrap();
        let bytes = fetch_section_bytes(&message, "HEADER.FIELDS (Subject)").unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Subject: hi"));
        assert!(!text.contains("X-Other"));
    }
}
