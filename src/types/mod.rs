//! Value types shared across the wire codec, session, and command layers.

pub mod address;
pub mod body_structure;
pub mod command;
pub mod datetime;
pub mod envelope;
pub mod flag;
pub mod mailbox_name;
pub mod response;
pub mod sequence;

pub use address::Address;
pub use body_structure::{BodyStructure, MimePartPath};
pub use command::{Command, CommandBody, FetchItem, SearchKey, StatusItem, StoreKind};
pub use envelope::Envelope;
pub use flag::{Flag, FlagSet};
pub use mailbox_name::MailboxName;
pub use response::{
    Data, FetchAttributeValue, MailboxAttribute, NamespaceEntry, Response, Status, StatusLine,
};
pub use sequence::{SeqSet, SeqSetElement};

/// A client-chosen opaque token, echoed back on the completion line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(pub String);

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message's position in the 1..N ascending-UID enumeration of a mailbox,
/// valid only at the moment it was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqNum(pub u32);

/// A mailbox-scoped message identifier, stable across sessions within a
/// `UIDVALIDITY` epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub u32);

/// An opaque handle into the repository's message store; distinct from
/// [`Uid`] because one `Message` body can be referenced by many
/// [`MailboxEntry`](crate::repository::MailboxEntry) placements (COPY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub u64);

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for SeqNum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
