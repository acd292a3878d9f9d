//! C10: the SELECT/EXAMINE-time snapshot binding sequence numbers to UIDs
//! for one session's view of a mailbox, plus the bookkeeping (first unseen,
//! permanent flags, read-only) RFC 3501 §6.3.1/§6.3.2 require on selection.

use std::collections::BTreeSet;

use crate::repository::{MailboxEntry, MailboxSnapshot};
use crate::types::{Flag, FlagSet, MailboxName};

/// System flags this server lets clients set, advertised in `PERMANENTFLAGS`.
pub const PERMANENT_FLAGS: &[Flag] = &[
    Flag::Answered,
    Flag::Flagged,
    Flag::Deleted,
    Flag::Seen,
    Flag::Draft,
];

/// The selected-mailbox view: sequence number `i+1` maps to `entries[i]`.
/// Rebuilt wholesale on `SELECT`/`EXAMINE`; mutated in place by commands
/// that change membership or flags within the same session (spec §4.9).
#[derive(Debug, Clone)]
pub struct MailboxView {
    pub name: MailboxName,
    pub read_only: bool,
    pub uidvalidity: u32,
    pub uidnext: u32,
    entries: Vec<MailboxEntry>,
}

impl MailboxView {
    pub fn from_snapshot(name: MailboxName, snapshot: MailboxSnapshot, read_only: bool) -> Self {
        Self {
            name,
            read_only,
            uidvalidity: snapshot.uidvalidity,
            uidnext: snapshot.uidnext,
            entries: snapshot.entries,
        }
    }

    pub fn exists(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn recent(&self) -> u32 {
        self.entries
            .iter()
            .filter(|e| e.flags.contains(&Flag::Recent))
            .count() as u32
    }

    /// 1-based sequence number of the first message without `\Seen`, if any
    /// (the `UNSEEN` response code on SELECT/EXAMINE).
    pub fn first_unseen_seq(&self) -> Option<u32> {
        self.entries
            .iter()
            .position(|e| !e.flags.contains(&Flag::Seen))
            .map(|idx| idx as u32 + 1)
    }

    pub fn defined_keywords(&self) -> Vec<String> {
        let mut keywords = BTreeSet::new();
        for entry in &self.entries {
            for flag in entry.flags.iter() {
                if let Flag::Keyword(name) = flag {
                    keywords.insert(name.clone());
                }
            }
        }
        keywords.into_iter().collect()
    }

    pub fn entry_at_seq(&self, seq: u32) -> Option<&MailboxEntry> {
        seq.checked_sub(1)
            .and_then(|idx| self.entries.get(idx as usize))
    }

    pub fn seq_of_uid(&self, uid: u32) -> Option<u32> {
        self.entries
            .iter()
            .position(|e| e.uid.0 == uid)
            .map(|idx| idx as u32 + 1)
    }

    pub fn all_seqs(&self) -> Vec<u32> {
        (1..=self.exists()).collect()
    }

    pub fn all_uids(&self) -> Vec<u32> {
        self.entries.iter().map(|e| e.uid.0).collect()
    }

    pub fn entries(&self) -> &[MailboxEntry] {
        &self.entries
    }

    pub fn entry_mut_at_seq(&mut self, seq: u32) -> Option<&mut MailboxEntry> {
        seq.checked_sub(1)
            .and_then(|idx| self.entries.get_mut(idx as usize))
    }

    /// Remove every `\Deleted` entry, renumbering the rest, and return the
    /// 1-based sequence numbers that were removed **in the order EXPUNGE
    /// responses must be sent**: each removal shifts everything after it
    /// down by one, so response `i` (0-based) reports `p_i - i`, where `p_i`
    /// is that message's *original* position (RFC 3501 §7.4.1 example).
    pub fn expunge_deleted(&mut self) -> Vec<u32> {
        let mut removed_original_positions = Vec::new();
        let mut kept = Vec::with_capacity(self.entries.len());
        for (idx, entry) in std::mem::take(&mut self.entries).into_iter().enumerate() {
            if entry.flags.contains(&Flag::Deleted) {
                removed_original_positions.push(idx as u32 + 1);
            } else {
                kept.push(entry);
            }
        }
        self.entries = kept;
        removed_original_positions
            .iter()
            .enumerate()
            .map(|(i, &original)| original - i as u32)
            .collect()
    }

    /// Remove a single entry at `seq`, shifting everyone after it down by
    /// one position. Used by the Junk/NonJunk auto-move (spec §4.6), which
    /// expunges its source entry outside of a full `EXPUNGE` pass.
    pub fn remove_entry_at_seq(&mut self, seq: u32) -> Option<MailboxEntry> {
        let idx = seq.checked_sub(1)? as usize;
        if idx >= self.entries.len() {
            return None;
        }
        Some(self.entries.remove(idx))
    }

    pub fn push_entry(&mut self, entry: MailboxEntry) {
        self.uidnext = self.uidnext.max(entry.uid.0 + 1);
        self.entries.push(entry);
    }

    /// Clear `\Recent` on every entry, done once right after SELECT reports
    /// it (RFC 3501 §6.3.1: `\Recent` is reported once, on the session that
    /// first observes it).
    pub fn clear_recent(&mut self) {
        for entry in &mut self.entries {
            entry.flags.remove(&Flag::Recent);
        }
    }

    pub fn permanent_flags_including_keywords(&self) -> Vec<Flag> {
        let mut flags: Vec<Flag> = PERMANENT_FLAGS.to_vec();
        flags.extend(self.defined_keywords().into_iter().map(Flag::Keyword));
        flags
    }

    pub fn set_flags_at_seq(&mut self, seq: u32, flags: FlagSet) -> bool {
        match self.entry_mut_at_seq(seq) {
            Some(entry) => {
                entry.flags = flags;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::now_as_fixed_offset;
    use crate::types::{MessageId, Uid};

    fn entry(uid: u32, deleted: bool) -> MailboxEntry {
        let mut flags = FlagSet::new();
        if deleted {
            flags.insert(Flag::Deleted);
        }
        MailboxEntry {
            uid: Uid(uid),
            message_id: MessageId(uid as u64),
            flags,
            internal_date: now_as_fixed_offset(),
        }
    }

    fn view(entries: Vec<MailboxEntry>) -> MailboxView {
        MailboxView::from_snapshot(
            MailboxName::inbox(),
            crate::repository::MailboxSnapshot {
                uidvalidity: 1,
                uidnext: entries.last().map(|e| e.uid.0 + 1).unwrap_or(1),
                entries,
            },
            false,
        )
    }

    #[test]
    fn expunge_follows_rfc3501_renumbering_example() {
        // RFC 3501 §7.4.1: messages 3, 4, 7 deleted among 1..9.
        let entries = (1..=9u32)
            .map(|uid| entry(uid, matches!(uid, 3 | 4 | 7)))
            .collect();
        let mut mailbox = view(entries);
        let reported = mailbox.expunge_deleted();
        assert_eq!(reported, vec![3, 3, 5]);
        assert_eq!(mailbox.exists(), 6);
    }

    #[test]
    fn first_unseen_finds_earliest_unflagged_message() {
        let mut e1 = entry(1, false);
        e1.flags.insert(Flag::Seen);
        let e2 = entry(2, false);
        let mailbox = view(vec![e1, e2]);
        assert_eq!(mailbox.first_unseen_seq(), Some(2));
    }
}
