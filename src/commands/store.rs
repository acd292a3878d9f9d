//! C6: `STORE`/`UID STORE` flag arithmetic, plus the Junk/NonJunk keyword
//! auto-move policy (spec §4.6) — a STORE that flips `Junk` from absent to
//! present relocates the message to the fixed-name mailbox `Spam` (and
//! drops `NonJunk`); one that flips `NonJunk` from absent to present moves
//! it back to `INBOX` (and drops `Junk`). Both route through the same
//! insert/delete pair COPY uses, so UID allocation and `\Recent` ownership
//! stay consistent. A missing destination mailbox skips the policy
//! entirely — the flag update is still applied in place.

use crate::error::ImapResult;
use crate::mailbox_view::MailboxView;
use crate::repository::Repository;
use crate::types::{Data, Flag, FlagSet, MailboxName, SeqSet, StoreKind};

use super::resolve_targets;

pub struct StoreOutcome {
    pub updates: Vec<Data>,
    pub auto_moved: Vec<(u32, MailboxName)>,
}

#[allow(clippy::too_many_arguments)]
pub fn handle_store(
    view: &mut MailboxView,
    repo: &dyn Repository,
    user: &str,
    set: &SeqSet,
    kind: StoreKind,
    silent: bool,
    client_flags: &[Flag],
    uid: bool,
) -> ImapResult<StoreOutcome> {
    let targets = resolve_targets(view, set, uid);
    let mut updates = Vec::new();
    let mut auto_moved = Vec::new();

    // `targets` was resolved against the pre-mutation view, so its UIDs are
    // stable even as earlier iterations of this same loop remove entries
    // (the Junk auto-move) and shift everyone after them down a position.
    for (_, msg_uid) in targets {
        let seq = match view.seq_of_uid(msg_uid) {
            Some(seq) => seq,
            None => continue,
        };
        let entry = view
            .entry_at_seq(seq)
            .cloned()
            .ok_or_else(|| crate::error::ImapError::server_bug("STORE target vanished mid-command"))?;

        let mut flags = entry.flags.clone();
        match kind {
            StoreKind::Replace => flags.replace_with(client_flags),
            StoreKind::Plus => flags.union_with(client_flags),
            StoreKind::Minus => flags.subtract(client_flags),
        }

        let auto_move = junk_auto_move_target(&entry.flags, &flags);

        if let Some((target_mailbox, strip)) = &auto_move {
            if repo.mailbox_exists(user, target_mailbox)? {
                flags.remove(strip);
                move_message(repo, user, view, seq, target_mailbox, flags)?;
                view.remove_entry_at_seq(seq);
                auto_moved.push((seq, target_mailbox.clone()));
                if !silent {
                    updates.push(Data::Expunge(seq));
                }
                continue;
            }
        }

        repo.update_flags(user, &view.name, entry.uid, flags.clone())?;
        view.set_flags_at_seq(seq, flags.clone());

        if !silent {
            updates.push(Data::Fetch {
                seq,
                attributes: vec![crate::types::FetchAttributeValue::Flags(
                    flags.iter().map(|f| f.to_string()).collect(),
                )],
            });
        }
    }

    Ok(StoreOutcome { updates, auto_moved })
}

/// Returns `(destination, flag-to-strip)` if this STORE just flipped
/// `Junk`/`NonJunk` from absent to present, per spec §4.6. `STORE`/`-FLAGS`
/// never triggers the policy (a flag can only transition to *present*).
fn junk_auto_move_target(before: &FlagSet, after: &FlagSet) -> Option<(MailboxName, Flag)> {
    let junk = Flag::Keyword("Junk".to_owned());
    let nonjunk = Flag::Keyword("NonJunk".to_owned());

    let junk_turned_on = !before.contains(&junk) && after.contains(&junk);
    let nonjunk_turned_on = !before.contains(&nonjunk) && after.contains(&nonjunk);

    if junk_turned_on {
        Some((MailboxName::new("Spam"), nonjunk))
    } else if nonjunk_turned_on {
        Some((MailboxName::inbox(), junk))
    } else {
        None
    }
}

fn move_message(
    repo: &dyn Repository,
    user: &str,
    view: &mut MailboxView,
    seq: u32,
    target: &MailboxName,
    flags: FlagSet,
) -> ImapResult<()> {
    let entry = view
        .entry_at_seq(seq)
        .cloned()
        .ok_or_else(|| crate::error::ImapError::server_bug("auto-move target vanished"))?;

    repo.insert_entry(user, target, entry.message_id, flags, entry.internal_date)?;
    repo.delete_entry(user, &view.name, entry.uid)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{now_as_fixed_offset, InMemoryRepository};

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
    fn plus_flags_adds_without_clobbering() {
        let (repo, mut view) = setup();
        let set = SeqSet::parse("1").unwrap();
        handle_store(
            &mut view,
            &repo,
            "alice",
            &set,
            StoreKind::Plus,
            false,
            &[Flag::Deleted],
            false,
        )
        .unwrap();
        assert!(view.entry_at_seq(1).unwrap().flags.contains(&Flag::Deleted));
    }

    #[test]
    fn junk_keyword_moves_message_to_spam_when_present() {
        let (repo, mut view) = setup();
        repo.create_mailbox("alice", &MailboxName::new("Spam")).unwrap();
        let set = SeqSet::parse("1").unwrap();
        let outcome = handle_store(
            &mut view,
            &repo,
            "alice",
            &set,
            StoreKind::Plus,
            false,
            &[Flag::Keyword("Junk".to_owned())],
            false,
        )
        .unwrap();
        assert_eq!(outcome.auto_moved, vec![(1, MailboxName::new("Spam"))]);
        assert_eq!(outcome.updates, vec![Data::Expunge(1)]);
        assert_eq!(view.exists(), 0);
        let spam = repo.snapshot("alice", &MailboxName::new("Spam")).unwrap();
        assert_eq!(spam.entries.len(), 1);
        assert!(spam.entries[0].flags.contains(&Flag::Keyword("Junk".to_owned())));
        assert!(!spam.entries[0].flags.contains(&Flag::Keyword("NonJunk".to_owned())));
    }

    #[test]
    fn junk_keyword_skips_move_when_spam_missing() {
        let (repo, mut view) = setup();
        let set = SeqSet::parse("1").unwrap();
        let outcome = handle_store(
            &mut view,
            &repo,
            "alice",
            &set,
            StoreKind::Plus,
            false,
            &[Flag::Keyword("Junk".to_owned())],
            false,
        )
        .unwrap();
        assert!(outcome.auto_moved.is_empty());
        assert_eq!(view.exists(), 1);
        assert!(view.entry_at_seq(1).unwrap().flags.contains(&Flag::Keyword("Junk".to_owned())));
    }

    #[test]
    fn silent_store_emits_no_update() {
        let (repo, mut view) = setup();
        let set = SeqSet::parse("1").unwrap();
        let outcome = handle_store(
            &mut view,
            &repo,
            "alice",
            &set,
            StoreKind::Plus,
            true,
            &[Flag::Flagged],
            false,
        )
        .unwrap();
        assert!(outcome.updates.is_empty());
    }
}
