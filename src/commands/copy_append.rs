//! C7: `COPY`/`UID COPY` and `APPEND`, with RFC 4315 UIDPLUS response codes
//! (`APPENDUID`, `COPYUID`) and the `TRYCREATE` hint when the destination
//! mailbox doesn't exist.

use chrono::{DateTime, FixedOffset};

use crate::error::{ImapError, ImapResult};
use crate::error::ResponseCode;
use crate::mailbox_view::MailboxView;
use crate::repository::{MailboxEntry, Repository};
use crate::types::{Flag, FlagSet, MailboxName, SeqSet};

use super::resolve_targets;

fn require_destination(repo: &dyn Repository, user: &str, mailbox: &MailboxName) -> ImapResult<()> {
    if repo.mailbox_exists(user, mailbox)? {
        Ok(())
    } else {
        Err(ImapError::no_code(
            format!("Destination mailbox {mailbox} does not exist"),
            ResponseCode::TryCreate,
        ))
    }
}

/// `COPY`/`UID COPY`: returns the `[COPYUID uidvalidity src-set dst-set]`
/// triple the client needs to reconcile the new UIDs without a re-fetch.
pub fn handle_copy(
    view: &MailboxView,
    repo: &dyn Repository,
    user: &str,
    set: &SeqSet,
    destination: &MailboxName,
    uid: bool,
) -> ImapResult<ResponseCode> {
    require_destination(repo, user, destination)?;

    let targets = resolve_targets(view, set, uid);
    let mut source_uids = Vec::with_capacity(targets.len());
    let mut dest_uids = Vec::with_capacity(targets.len());

    for (seq, _) in targets {
        let entry = match view.entry_at_seq(seq) {
            Some(entry) => entry,
            None => {
                rollback(repo, user, destination, &dest_uids);
                return Err(ImapError::server_bug("COPY target vanished mid-command"));
            }
        };
        let new_entry = match repo.insert_entry(
            user,
            destination,
            entry.message_id,
            entry.flags.clone(),
            entry.internal_date,
        ) {
            Ok(new_entry) => new_entry,
            Err(_) => {
                rollback(repo, user, destination, &dest_uids);
                return Err(ImapError::no("COPY failed"));
            }
        };
        source_uids.push(entry.uid.0);
        dest_uids.push(new_entry.uid.0);
    }

    let uidvalidity = repo.snapshot(user, destination)?.uidvalidity;

    Ok(ResponseCode::CopyUid(
        uidvalidity,
        render_uid_set(&source_uids),
        render_uid_set(&dest_uids),
    ))
}

/// `APPEND`: stores the literal as a new message and inserts it into
/// `mailbox`. Returns the new entry plus the `[APPENDUID ...]` code.
pub fn handle_append(
    repo: &dyn Repository,
    user: &str,
    mailbox: &MailboxName,
    flags: Vec<Flag>,
    date: Option<DateTime<FixedOffset>>,
    data: Vec<u8>,
) -> ImapResult<(MailboxEntry, ResponseCode)> {
    require_destination(repo, user, mailbox)?;

    let message_id = repo.store_message(user, data)?;
    let internal_date = date.unwrap_or_else(crate::repository::now_as_fixed_offset);
    let flag_set: FlagSet = flags.into_iter().collect();
    let entry = repo.insert_entry(user, mailbox, message_id, flag_set, internal_date)?;
    let snapshot = repo.snapshot(user, mailbox)?;
    let code = ResponseCode::AppendUid(snapshot.uidvalidity, entry.uid.0);
    Ok((entry, code))
}

/// Undo every destination insert already committed by a `COPY` that
/// failed partway through, so a partial batch never becomes visible.
fn rollback(repo: &dyn Repository, user: &str, destination: &MailboxName, dest_uids: &[u32]) {
    for &uid in dest_uids {
        let _ = repo.delete_entry(user, destination, crate::types::Uid(uid));
    }
}

/// Render UIDs as a `uid-set` (RFC 3501 §9), compressing contiguous
/// ascending runs into `lo:hi` ranges rather than listing every member.
fn render_uid_set(uids: &[u32]) -> String {
    let mut parts = Vec::new();
    let mut iter = uids.iter().copied();
    let Some(mut start) = iter.next() else {
        return String::new();
    };
    let mut end = start;

    for uid in iter {
        if uid == end + 1 {
            end = uid;
            continue;
        }
        parts.push(render_run(start, end));
        start = uid;
        end = uid;
    }
    parts.push(render_run(start, end));
    parts.join(",")
}

fn render_run(start: u32, end: u32) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{start}:{end}")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::message::Message;
    use crate::repository::{now_as_fixed_offset, InMemoryRepository, RepoResult, RepositoryError};
    use crate::types::MessageId;

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

    fn setup_many(count: u32) -> (InMemoryRepository, MailboxView) {
        let repo = InMemoryRepository::new();
        repo.provision_user("alice");
        for _ in 0..count {
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
        }
        let snapshot = repo.snapshot("alice", &MailboxName::inbox()).unwrap();
        let view = MailboxView::from_snapshot(MailboxName::inbox(), snapshot, false);
        (repo, view)
    }

    /// Wraps an [`InMemoryRepository`] and fails the Nth `insert_entry`
    /// call, to exercise `handle_copy`'s rollback on a mid-batch failure.
    struct FlakyRepository {
        inner: InMemoryRepository,
        fail_on_call: usize,
        calls: AtomicUsize,
    }

    impl Repository for FlakyRepository {
        fn mailbox_exists(&self, user: &str, name: &MailboxName) -> RepoResult<bool> {
            self.inner.mailbox_exists(user, name)
        }
        fn create_mailbox(&self, user: &str, name: &MailboxName) -> RepoResult<()> {
            self.inner.create_mailbox(user, name)
        }
        fn delete_mailbox(&self, user: &str, name: &MailboxName) -> RepoResult<()> {
            self.inner.delete_mailbox(user, name)
        }
        fn rename_mailbox(&self, user: &str, from: &MailboxName, to: &MailboxName) -> RepoResult<()> {
            self.inner.rename_mailbox(user, from, to)
        }
        fn list_mailboxes(&self, user: &str) -> RepoResult<Vec<crate::repository::MailboxListing>> {
            self.inner.list_mailboxes(user)
        }
        fn set_subscribed(&self, user: &str, name: &MailboxName, subscribed: bool) -> RepoResult<()> {
            self.inner.set_subscribed(user, name, subscribed)
        }
        fn snapshot(&self, user: &str, name: &MailboxName) -> RepoResult<crate::repository::MailboxSnapshot> {
            self.inner.snapshot(user, name)
        }
        fn insert_entry(
            &self,
            user: &str,
            name: &MailboxName,
            message_id: MessageId,
            flags: FlagSet,
            internal_date: DateTime<FixedOffset>,
        ) -> RepoResult<crate::repository::MailboxEntry> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.fail_on_call {
                return Err(RepositoryError::Backend("simulated failure".to_owned()));
            }
            self.inner.insert_entry(user, name, message_id, flags, internal_date)
        }
        fn delete_entry(&self, user: &str, name: &MailboxName, uid: crate::types::Uid) -> RepoResult<()> {
            self.inner.delete_entry(user, name, uid)
        }
        fn update_flags(
            &self,
            user: &str,
            name: &MailboxName,
            uid: crate::types::Uid,
            flags: FlagSet,
        ) -> RepoResult<()> {
            self.inner.update_flags(user, name, uid, flags)
        }
        fn store_message(&self, user: &str, raw: Vec<u8>) -> RepoResult<MessageId> {
            self.inner.store_message(user, raw)
        }
        fn load_message(&self, user: &str, message_id: MessageId) -> RepoResult<std::sync::Arc<Message>> {
            self.inner.load_message(user, message_id)
        }
    }

    #[test]
    fn copy_to_missing_mailbox_suggests_trycreate() {
        let (repo, view) = setup();
        let set = SeqSet::parse("1").unwrap();
        let err = handle_copy(&view, &repo, "alice", &set, &MailboxName::new("Archive"), false)
            .unwrap_err();
        assert_eq!(err.code(), Some(ResponseCode::TryCreate));
    }

    #[test]
    fn copy_returns_copyuid_code() {
        let (repo, view) = setup();
        repo.create_mailbox("alice", &MailboxName::new("Archive")).unwrap();
        let set = SeqSet::parse("1").unwrap();
        let code = handle_copy(&view, &repo, "alice", &set, &MailboxName::new("Archive"), false)
            .unwrap();
        assert!(matches!(code, ResponseCode::CopyUid(_, _, _)));
    }

    #[test]
    fn append_allocates_a_uid_and_recent_flag() {
        let (repo, _view) = setup();
        let (entry, code) = handle_append(
            &repo,
            "alice",
            &MailboxName::inbox(),
            vec![Flag::Seen],
            None,
            b"Subject: new\r\n\r\nbody\r\n".to_vec(),
        )
        .unwrap();
        assert!(entry.flags.contains(&Flag::Recent));
        assert!(matches!(code, ResponseCode::AppendUid(_, _)));
    }

    #[test]
    fn copy_compresses_contiguous_uids_into_a_range() {
        let (repo, view) = setup_many(3);
        repo.create_mailbox("alice", &MailboxName::new("Archive")).unwrap();
        let set = SeqSet::parse("1:3").unwrap();
        let code = handle_copy(&view, &repo, "alice", &set, &MailboxName::new("Archive"), false)
            .unwrap();
        match code {
            ResponseCode::CopyUid(_, src, dst) => {
                assert_eq!(src, "1:3");
                assert_eq!(dst, "1:3");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn copy_leaves_non_contiguous_runs_comma_separated() {
        assert_eq!(render_uid_set(&[2, 4, 5, 6, 9]), "2,4:6,9");
        assert_eq!(render_uid_set(&[]), "");
        assert_eq!(render_uid_set(&[7]), "7");
    }

    #[test]
    fn copy_rolls_back_earlier_inserts_when_a_later_one_fails() {
        let (inner, view) = setup_many(3);
        inner.create_mailbox("alice", &MailboxName::new("Archive")).unwrap();
        let repo = FlakyRepository {
            inner,
            fail_on_call: 2,
            calls: AtomicUsize::new(0),
        };

        let set = SeqSet::parse("1:3").unwrap();
        let err = handle_copy(&view, &repo, "alice", &set, &MailboxName::new("Archive"), false)
            .unwrap_err();
        assert_eq!(err.to_string(), "COPY failed");

        let snapshot = repo
            .inner
            .snapshot("alice", &MailboxName::new("Archive"))
            .unwrap();
        assert!(snapshot.entries.is_empty());
    }
}
