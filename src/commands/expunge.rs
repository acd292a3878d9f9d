//! C8: `EXPUNGE`, `UID EXPUNGE` (RFC 4315), and `CLOSE` — removing
//! `\Deleted` messages and renumbering the survivors.

use crate::error::ImapResult;
use crate::mailbox_view::MailboxView;
use crate::repository::Repository;
use crate::types::{Data, Flag, SeqSet};

/// `EXPUNGE`: removes every `\Deleted` message and returns one
/// [`Data::Expunge`] per removal, in the exact order RFC 3501 §7.4.1
/// requires (each response's number already accounts for earlier removals
/// in this same batch).
pub fn handle_expunge(
    view: &mut MailboxView,
    repo: &dyn Repository,
    user: &str,
) -> ImapResult<Vec<Data>> {
    let deleted_uids: Vec<_> = view
        .entries()
        .iter()
        .filter(|e| e.flags.contains(&Flag::Deleted))
        .map(|e| e.uid)
        .collect();

    let reported = view.expunge_deleted();
    for uid in deleted_uids {
        repo.delete_entry(user, &view.name, uid)?;
    }
    Ok(reported.into_iter().map(Data::Expunge).collect())
}

/// `UID EXPUNGE uid-set` (RFC 4315 §2.1): like `EXPUNGE`, but restricted to
/// `\Deleted` messages whose UID is also in `set`.
pub fn handle_uid_expunge(
    view: &mut MailboxView,
    repo: &dyn Repository,
    user: &str,
    set: &SeqSet,
) -> ImapResult<Vec<Data>> {
    let targeted: std::collections::BTreeSet<u32> = set.resolve(&view.all_uids()).into_iter().collect();

    // Temporarily clear \Deleted on anything outside the requested set so
    // the shared renumbering logic only touches what UID EXPUNGE asked for.
    let mut suppressed = Vec::new();
    for entry in view.entries().to_vec() {
        if entry.flags.contains(&Flag::Deleted) && !targeted.contains(&entry.uid.0) {
            suppressed.push(entry.uid.0);
        }
    }
    for uid in &suppressed {
        if let Some(seq) = view.seq_of_uid(*uid) {
            let mut flags = view.entry_at_seq(seq).unwrap().flags.clone();
            flags.remove(&Flag::Deleted);
            view.set_flags_at_seq(seq, flags);
        }
    }

    let result = handle_expunge(view, repo, user);

    for uid in &suppressed {
        if let Some(seq) = view.seq_of_uid(*uid) {
            let mut flags = view.entry_at_seq(seq).unwrap().flags.clone();
            flags.insert(Flag::Deleted);
            view.set_flags_at_seq(seq, flags);
        }
    }

    result
}

/// `CLOSE`: expunges silently (no untagged `EXPUNGE` responses are sent,
/// RFC 3501 §6.4.2).
pub fn handle_close(view: &mut MailboxView, repo: &dyn Repository, user: &str) -> ImapResult<()> {
    handle_expunge(view, repo, user)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{now_as_fixed_offset, InMemoryRepository};
    use crate::types::{FlagSet, MailboxName};

    fn setup_with_deletions(deleted: &[u32]) -> (InMemoryRepository, MailboxView) {
        let repo = InMemoryRepository::new();
        repo.provision_user("alice");
        for uid in 1..=5u32 {
            let msg_id = repo
                .store_message("alice", b"Subject: hi\r\n\r\nhello\r\n".to_vec())
                .unwrap();
            let mut flags = FlagSet::new();
            if deleted.contains(&uid) {
                flags.insert(Flag::Deleted);
            }
            repo.insert_entry("alice", &MailboxName::inbox(), msg_id, flags, now_as_fixed_offset())
                .unwrap();
        }
        let snapshot = repo.snapshot("alice", &MailboxName::inbox()).unwrap();
        let view = MailboxView::from_snapshot(MailboxName::inbox(), snapshot, false);
        (repo, view)
    }

    #[test]
    fn expunge_removes_deleted_and_renumbers() {
        let (repo, mut view) = setup_with_deletions(&[2, 4]);
        let reported = handle_expunge(&mut view, &repo, "alice").unwrap();
        assert_eq!(reported, vec![Data::Expunge(2), Data::Expunge(3)]);
        assert_eq!(view.exists(), 3);
    }

    #[test]
    fn uid_expunge_spares_deleted_messages_outside_set() {
        let (repo, mut view) = setup_with_deletions(&[2, 4]);
        let set = SeqSet::parse("4").unwrap();
        let reported = handle_uid_expunge(&mut view, &repo, "alice", &set).unwrap();
        assert_eq!(reported.len(), 1);
        assert_eq!(view.exists(), 4);
        assert!(view
            .entries()
            .iter()
            .any(|e| e.flags.contains(&Flag::Deleted)));
    }
}
