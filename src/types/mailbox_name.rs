//! Mailbox names: atoms or quoted strings on the wire, with `INBOX` folded
//! case-insensitively per RFC 3501 §5.1.

use std::fmt;

#[derive(Debug, Clone, Eq)]
pub struct MailboxName(String);

impl MailboxName {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.eq_ignore_ascii_case("INBOX") {
            Self("INBOX".to_owned())
        } else {
            Self(raw)
        }
    }

    pub fn inbox() -> Self {
        Self("INBOX".to_owned())
    }

    pub fn is_inbox(&self) -> bool {
        self.0 == "INBOX"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hierarchy separator used by this server, per NAMESPACE (C2342).
    pub const DELIMITER: char = '/';

    pub fn parent(&self) -> Option<MailboxName> {
        self.0
            .rfind(Self::DELIMITER)
            .map(|idx| MailboxName::new(&self.0[..idx]))
    }
}

impl PartialEq for MailboxName {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl std::hash::Hash for MailboxName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Display for MailboxName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbox_is_case_insensitive() {
        assert_eq!(MailboxName::new("inbox"), MailboxName::new("INBOX"));
        assert_eq!(MailboxName::new("InBoX"), MailboxName::inbox());
        assert!(MailboxName::new("inbox").is_inbox());
    }

    #[test]
    fn non_inbox_names_are_case_sensitive() {
        assert_ne!(MailboxName::new("Work"), MailboxName::new("work"));
    }

    #[test]
    fn parent_splits_on_delimiter() {
        let name = MailboxName::new("Work/Projects/Active");
        assert_eq!(name.parent(), Some(MailboxName::new("Work/Projects")));
    }
}
