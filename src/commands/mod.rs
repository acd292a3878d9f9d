//! Command responders: each submodule implements one family of commands
//! against a [`MailboxView`](crate::mailbox_view::MailboxView) and a
//! [`Repository`](crate::repository::Repository), producing the untagged
//! [`Data`](crate::types::Data) responses the session then writes out.

pub mod copy_append;
pub mod expunge;
pub mod fetch;
pub mod store;

use crate::mailbox_view::MailboxView;
use crate::types::SeqSet;

/// Resolve a sequence-set or UID-set argument against the current view,
/// returning `(seq, uid)` pairs in ascending sequence order.
pub fn resolve_targets(view: &MailboxView, set: &SeqSet, uid: bool) -> Vec<(u32, u32)> {
    if uid {
        set.resolve(&view.all_uids())
            .into_iter()
            .filter_map(|target_uid| view.seq_of_uid(target_uid).map(|seq| (seq, target_uid)))
            .collect()
    } else {
        set.resolve(&view.all_seqs())
            .into_iter()
            .filter_map(|seq| view.entry_at_seq(seq).map(|entry| (seq, entry.uid.0)))
            .collect()
    }
}
