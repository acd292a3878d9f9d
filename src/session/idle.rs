//! IDLE (RFC 2177): the untagged-notification loop a session enters after
//! `+ idling` and leaves on `DONE` (spec §4.9). NOOP's "report changes since
//! the last observation" behavior shares the same diff, which is why this
//! module exposes a plain function rather than a driver loop: the loop
//! itself (a timer plus a concurrent read for `DONE`) belongs to the
//! connection driver, since this crate has no cross-session notification
//! bus to push through instead (spec §5's "delivery is best-effort").

use std::time::Duration;

use crate::error::ImapResult;
use crate::mailbox_view::MailboxView;
use crate::repository::Repository;
use crate::types::{Data, FetchAttributeValue};

/// Typical poll cadence while idling (spec §4.9: "a 1-5 s cadence is
/// typical"). The connection driver is free to use a different value.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Re-fetch `view`'s mailbox from `repo` and diff it against what `view`
/// already knows, returning the untagged responses a real server must emit
/// for the difference (new messages, expunged messages, flag changes) and
/// updating `view` in place to match. Used by both IDLE's poll loop and
/// NOOP's "report changes since the last observation".
pub fn diff_against_snapshot(
    view: &mut MailboxView,
    repo: &dyn Repository,
    user: &str,
) -> ImapResult<Vec<Data>> {
    let fresh = repo.snapshot(user, &view.name)?;
    let mut out = Vec::new();

    for uid in view.all_uids() {
        let Some(seq) = view.seq_of_uid(uid) else {
            continue;
        };
        let Some(was) = view.entry_at_seq(seq) else {
            continue;
        };
        let Some(now) = fresh.entries.iter().find(|e| e.uid.0 == uid) else {
            continue;
        };
        if was.flags != now.flags {
            let flags = now.flags.clone();
            view.set_flags_at_seq(seq, flags.clone());
            out.push(Data::Fetch {
                seq,
                attributes: vec![FetchAttributeValue::Flags(
                    flags.iter().map(|f| f.to_string()).collect(),
                )],
            });
        }
    }

    // Removals first, reported in the same p_i - (i-1) renumbering EXPUNGE
    // itself uses (spec §3's derived invariant (b)): each removal shifts
    // everything after it down by one position before the next is reported.
    let mut removed_seqs: Vec<u32> = view
        .all_uids()
        .into_iter()
        .filter(|uid| !fresh.entries.iter().any(|e| e.uid.0 == *uid))
        .filter_map(|uid| view.seq_of_uid(uid))
        .collect();
    removed_seqs.sort_unstable();
    for (i, original_seq) in removed_seqs.iter().enumerate() {
        let adjusted = original_seq - i as u32;
        if view.remove_entry_at_seq(adjusted).is_some() {
            out.push(Data::Expunge(adjusted));
        }
    }

    // Additions: anything the fresh snapshot has that the view hasn't seen
    // yet. `fresh.entries` is already in ascending-UID order (the repository
    // contract, spec §4.11), and every new UID sorts after every UID the
    // view already holds, so appending preserves the ascending-UID invariant
    // sequence numbers depend on.
    let known: std::collections::BTreeSet<u32> = view.all_uids().into_iter().collect();
    let added: Vec<_> = fresh
        .entries
        .iter()
        .filter(|e| !known.contains(&e.uid.0))
        .cloned()
        .collect();
    if !added.is_empty() {
        for entry in added {
            view.push_entry(entry);
        }
        out.push(Data::Exists(view.exists()));
        let recent = view.recent();
        if recent > 0 {
            out.push(Data::Recent(recent));
        }
    }

    view.uidnext = fresh.uidnext;
    Ok(out)
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
        let mut view = MailboxView::from_snapshot(MailboxName::inbox(), snapshot, false);
        view.clear_recent();
        (repo, view)
    }

    #[test]
    fn new_delivery_reports_exists_and_recent() {
        let (repo, mut view) = setup();
        let msg_id = repo
            .store_message("alice", b"Subject: two\r\n\r\nbody\r\n".to_vec())
            .unwrap();
        repo.insert_entry(
            "alice",
            &MailboxName::inbox(),
            msg_id,
            FlagSet::new(),
            now_as_fixed_offset(),
        )
        .unwrap();

        let updates = diff_against_snapshot(&mut view, &repo, "alice").unwrap();
        assert_eq!(updates, vec![Data::Exists(2), Data::Recent(1)]);
        assert_eq!(view.exists(), 2);
    }

    #[test]
    fn flag_change_from_other_session_reports_fetch() {
        let (repo, mut view) = setup();
        let uid = view.entries()[0].uid;
        let mut flags = FlagSet::new();
        flags.insert(Flag::Answered);
        repo.update_flags("alice", &MailboxName::inbox(), uid, flags).unwrap();

        let updates = diff_against_snapshot(&mut view, &repo, "alice").unwrap();
        match &updates[0] {
            Data::Fetch { seq, attributes } => {
                assert_eq!(*seq, 1);
                assert_eq!(
                    attributes[0],
                    FetchAttributeValue::Flags(vec!["\\Answered".to_owned()])
                );
            }
            other => panic!("expected Fetch, got {other:?}"),
        }
    }

    #[test]
    fn expunge_elsewhere_reports_expunge_and_shrinks_view() {
        let (repo, mut view) = setup();
        let msg_id = repo
            .store_message("alice", b"Subject: two\r\n\r\nbody\r\n".to_vec())
            .unwrap();
        let second = repo
            .insert_entry(
                "alice",
                &MailboxName::inbox(),
                msg_id,
                FlagSet::new(),
                now_as_fixed_offset(),
            )
            .unwrap();
        // Bring the view up to date with the second message before it's
        // removed, so the removal below is the only change the diff sees.
        diff_against_snapshot(&mut view, &repo, "alice").unwrap();

        repo.delete_entry("alice", &MailboxName::inbox(), second.uid).unwrap();

        let updates = diff_against_snapshot(&mut view, &repo, "alice").unwrap();
        assert_eq!(updates, vec![Data::Expunge(2)]);
        assert_eq!(view.exists(), 1);
    }
}
