//! C11: the only way the core touches storage.
//!
//! Spec §1 treats the SQL schema as an external collaborator; this module
//! defines the abstract contract plus an in-memory implementation used by
//! this crate's own tests (and suitable as a reference for a real backend).

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, FixedOffset, Utc};

use crate::message::Message;
use crate::types::{FlagSet, MailboxName, MessageId, Uid};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("mailbox does not exist")]
    NoSuchMailbox,
    #[error("mailbox already exists")]
    MailboxExists,
    #[error("INBOX cannot be deleted or renamed away from")]
    InboxImmutable,
    #[error("message not found")]
    NoSuchMessage,
    #[error("backend error: {0}")]
    Backend(String),
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// A placement of a [`Message`] into a mailbox (spec §3 MailboxEntry).
#[derive(Debug, Clone)]
pub struct MailboxEntry {
    pub uid: Uid,
    pub message_id: MessageId,
    pub flags: FlagSet,
    pub internal_date: DateTime<FixedOffset>,
}

#[derive(Debug, Clone)]
pub struct MailboxSnapshot {
    pub uidvalidity: u32,
    pub uidnext: u32,
    /// Ascending UID order; sequence number is 1-based rank here.
    pub entries: Vec<MailboxEntry>,
}

#[derive(Debug, Clone)]
pub struct MailboxListing {
    pub name: MailboxName,
    pub has_children: bool,
    pub subscribed: bool,
}

/// Abstract operations a mailbox/message store must provide (spec §4.11).
pub trait Repository: Send + Sync {
    fn mailbox_exists(&self, user: &str, name: &MailboxName) -> RepoResult<bool>;
    fn create_mailbox(&self, user: &str, name: &MailboxName) -> RepoResult<()>;
    fn delete_mailbox(&self, user: &str, name: &MailboxName) -> RepoResult<()>;
    fn rename_mailbox(&self, user: &str, from: &MailboxName, to: &MailboxName) -> RepoResult<()>;
    fn list_mailboxes(&self, user: &str) -> RepoResult<Vec<MailboxListing>>;
    fn set_subscribed(&self, user: &str, name: &MailboxName, subscribed: bool) -> RepoResult<()>;

    fn snapshot(&self, user: &str, name: &MailboxName) -> RepoResult<MailboxSnapshot>;

    /// Insert a new entry, allocating the next UID and unioning `\Recent`
    /// into the supplied flags (COPY, APPEND, delivery all route through
    /// this one operation).
    fn insert_entry(
        &self,
        user: &str,
        name: &MailboxName,
        message_id: MessageId,
        flags: FlagSet,
        internal_date: DateTime<FixedOffset>,
    ) -> RepoResult<MailboxEntry>;

    fn delete_entry(&self, user: &str, name: &MailboxName, uid: Uid) -> RepoResult<()>;
    fn update_flags(&self, user: &str, name: &MailboxName, uid: Uid, flags: FlagSet) -> RepoResult<()>;

    fn store_message(&self, user: &str, raw: Vec<u8>) -> RepoResult<MessageId>;
    fn load_message(&self, user: &str, message_id: MessageId) -> RepoResult<Arc<Message>>;
}

struct MailboxState {
    uidvalidity: u32,
    uidnext: u32,
    subscribed: bool,
    entries: Vec<MailboxEntry>,
}

struct UserState {
    mailboxes: BTreeMap<String, MailboxState>,
}

/// A `Mutex`-guarded in-memory store. Good enough to exercise every
/// repository contract in tests; a real deployment swaps this for a SQL
/// backend behind the same trait.
pub struct InMemoryRepository {
    users: Mutex<HashMap<String, UserState>>,
    messages: Mutex<HashMap<MessageId, Arc<Message>>>,
    next_message_id: Mutex<u64>,
    next_uidvalidity: Mutex<u32>,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            messages: Mutex::new(HashMap::new()),
            next_message_id: Mutex::new(1),
            next_uidvalidity: Mutex::new(1),
        }
    }

    /// Pre-populate a user with an empty INBOX, as a fresh account would
    /// have on first login.
    pub fn provision_user(&self, user: &str) {
        let mut users = self.users.lock().unwrap();
        let state = users.entry(user.to_owned()).or_insert_with(|| UserState {
            mailboxes: BTreeMap::new(),
        });
        if !state.mailboxes.contains_key("INBOX") {
            let uidvalidity = self.alloc_uidvalidity();
            state.mailboxes.insert(
                "INBOX".to_owned(),
                MailboxState {
                    uidvalidity,
                    uidnext: 1,
                    subscribed: true,
                    entries: Vec::new(),
                },
            );
        }
    }

    fn alloc_uidvalidity(&self) -> u32 {
        let mut next = self.next_uidvalidity.lock().unwrap();
        let value = *next;
        *next += 1;
        value
    }
}

impl Repository for InMemoryRepository {
    fn mailbox_exists(&self, user: &str, name: &MailboxName) -> RepoResult<bool> {
        let users = self.users.lock().unwrap();
        Ok(users
            .get(user)
            .map(|u| u.mailboxes.contains_key(name.as_str()))
            .unwrap_or(false))
    }

    fn create_mailbox(&self, user: &str, name: &MailboxName) -> RepoResult<()> {
        let uidvalidity = self.alloc_uidvalidity();
        let mut users = self.users.lock().unwrap();
        let state = users.entry(user.to_owned()).or_insert_with(|| UserState {
            mailboxes: BTreeMap::new(),
        });
        if state.mailboxes.contains_key(name.as_str()) {
            return Err(RepositoryError::MailboxExists);
        }
        state.mailboxes.insert(
            name.as_str().to_owned(),
            MailboxState {
                uidvalidity,
                uidnext: 1,
                subscribed: false,
                entries: Vec::new(),
            },
        );
        Ok(())
    }

    fn delete_mailbox(&self, user: &str, name: &MailboxName) -> RepoResult<()> {
        if name.is_inbox() {
            return Err(RepositoryError::InboxImmutable);
        }
        let mut users = self.users.lock().unwrap();
        let state = users.get_mut(user).ok_or(RepositoryError::NoSuchMailbox)?;
        state
            .mailboxes
            .remove(name.as_str())
            .ok_or(RepositoryError::NoSuchMailbox)?;
        Ok(())
    }

    fn rename_mailbox(&self, user: &str, from: &MailboxName, to: &MailboxName) -> RepoResult<()> {
        let mut users = self.users.lock().unwrap();
        let state = users.get_mut(user).ok_or(RepositoryError::NoSuchMailbox)?;
        if state.mailboxes.contains_key(to.as_str()) {
            return Err(RepositoryError::MailboxExists);
        }
        let mailbox = state
            .mailboxes
            .remove(from.as_str())
            .ok_or(RepositoryError::NoSuchMailbox)?;
        state.mailboxes.insert(to.as_str().to_owned(), mailbox);
        if from.is_inbox() {
            // INBOX itself is immutable, but renaming keeps an empty INBOX
            // behind per RFC 3501 §6.3.5.
            state.mailboxes.insert(
                "INBOX".to_owned(),
                MailboxState {
                    uidvalidity: self.alloc_uidvalidity(),
                    uidnext: 1,
                    subscribed: true,
                    entries: Vec::new(),
                },
            );
        }
        Ok(())
    }

    fn list_mailboxes(&self, user: &str) -> RepoResult<Vec<MailboxListing>> {
        let users = self.users.lock().unwrap();
        let Some(state) = users.get(user) else {
            return Ok(Vec::new());
        };
        let names: Vec<&String> = state.mailboxes.keys().collect();
        Ok(state
            .mailboxes
            .iter()
            .map(|(name, mailbox)| MailboxListing {
                name: MailboxName::new(name.clone()),
                has_children: names
                    .iter()
                    .any(|other| other.starts_with(&format!("{name}{}", MailboxName::DELIMITER))),
                subscribed: mailbox.subscribed,
            })
            .collect())
    }

    fn set_subscribed(&self, user: &str, name: &MailboxName, subscribed: bool) -> RepoResult<()> {
        let mut users = self.users.lock().unwrap();
        let state = users.get_mut(user).ok_or(RepositoryError::NoSuchMailbox)?;
        let mailbox = state
            .mailboxes
            .get_mut(name.as_str())
            .ok_or(RepositoryError::NoSuchMailbox)?;
        mailbox.subscribed = subscribed;
        Ok(())
    }

    fn snapshot(&self, user: &str, name: &MailboxName) -> RepoResult<MailboxSnapshot> {
        let users = self.users.lock().unwrap();
        let state = users.get(user).ok_or(RepositoryError::NoSuchMailbox)?;
        let mailbox = state
            .mailboxes
            .get(name.as_str())
            .ok_or(RepositoryError::NoSuchMailbox)?;
        Ok(MailboxSnapshot {
            uidvalidity: mailbox.uidvalidity,
            uidnext: mailbox.uidnext,
            entries: mailbox.entries.clone(),
        })
    }

    fn insert_entry(
        &self,
        user: &str,
        name: &MailboxName,
        message_id: MessageId,
        mut flags: FlagSet,
        internal_date: DateTime<FixedOffset>,
    ) -> RepoResult<MailboxEntry> {
        use crate::types::Flag;

        let mut users = self.users.lock().unwrap();
        let state = users.get_mut(user).ok_or(RepositoryError::NoSuchMailbox)?;
        let mailbox = state
            .mailboxes
            .get_mut(name.as_str())
            .ok_or(RepositoryError::NoSuchMailbox)?;

        flags.insert(Flag::Recent);
        let uid = Uid(mailbox.uidnext);
        mailbox.uidnext += 1;
        let entry = MailboxEntry {
            uid,
            message_id,
            flags,
            internal_date,
        };
        mailbox.entries.push(entry.clone());
        mailbox.entries.sort_by_key(|e| e.uid.0);
        Ok(entry)
    }

    fn delete_entry(&self, user: &str, name: &MailboxName, uid: Uid) -> RepoResult<()> {
        let mut users = self.users.lock().unwrap();
        let state = users.get_mut(user).ok_or(RepositoryError::NoSuchMailbox)?;
        let mailbox = state
            .mailboxes
            .get_mut(name.as_str())
            .ok_or(RepositoryError::NoSuchMailbox)?;
        let before = mailbox.entries.len();
        mailbox.entries.retain(|e| e.uid != uid);
        if mailbox.entries.len() == before {
            return Err(RepositoryError::NoSuchMessage);
        }
        Ok(())
    }

    fn update_flags(
        &self,
        user: &str,
        name: &MailboxName,
        uid: Uid,
        flags: FlagSet,
    ) -> RepoResult<()> {
        let mut users = self.users.lock().unwrap();
        let state = users.get_mut(user).ok_or(RepositoryError::NoSuchMailbox)?;
        let mailbox = state
            .mailboxes
            .get_mut(name.as_str())
            .ok_or(RepositoryError::NoSuchMailbox)?;
        let entry = mailbox
            .entries
            .iter_mut()
            .find(|e| e.uid == uid)
            .ok_or(RepositoryError::NoSuchMessage)?;
        entry.flags = flags;
        Ok(())
    }

    fn store_message(&self, _user: &str, raw: Vec<u8>) -> RepoResult<MessageId> {
        let message = Message::parse(raw).map_err(|e| RepositoryError::Backend(e.to_string()))?;
        let mut next = self.next_message_id.lock().unwrap();
        let id = MessageId(*next);
        *next += 1;
        self.messages.lock().unwrap().insert(id, Arc::new(message));
        Ok(id)
    }

    fn load_message(&self, _user: &str, message_id: MessageId) -> RepoResult<Arc<Message>> {
        self.messages
            .lock()
            .unwrap()
            .get(&message_id)
            .cloned()
            .ok_or(RepositoryError::NoSuchMessage)
    }
}

pub fn now_as_fixed_offset() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&FixedOffset::east_opt(0).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Flag;

    #[test]
    fn insert_allocates_monotonic_uids() {
        let repo = InMemoryRepository::new();
        repo.provision_user("alice");
        let inbox = MailboxName::inbox();
        let msg_id = repo.store_message("alice", b"Subject: a\r\n\r\nbody\r\n".to_vec()).unwrap();
        let e1 = repo
            .insert_entry("alice", &inbox, msg_id, FlagSet::new(), now_as_fixed_offset())
            .unwrap();
        let e2 = repo
            .insert_entry("alice", &inbox, msg_id, FlagSet::new(), now_as_fixed_offset())
            .unwrap();
        assert!(e2.uid.0 > e1.uid.0);
        assert!(e1.flags.contains(&Flag::Recent));
    }

    #[test]
    fn inbox_cannot_be_deleted() {
        let repo = InMemoryRepository::new();
        repo.provision_user("alice");
        let err = repo.delete_mailbox("alice", &MailboxName::inbox()).unwrap_err();
        assert!(matches!(err, RepositoryError::InboxImmutable));
    }
}
