//! System flags and keywords, and the `\Recent` server-ownership rule.

use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flag {
    Seen,
    Answered,
    Flagged,
    Deleted,
    Draft,
    Recent,
    Keyword(String),
}

impl Flag {
    pub fn parse(token: &str) -> Flag {
        match token {
            "\\Seen" => Flag::Seen,
            "\\Answered" => Flag::Answered,
            "\\Flagged" => Flag::Flagged,
            "\\Deleted" => Flag::Deleted,
            "\\Draft" => Flag::Draft,
            "\\Recent" => Flag::Recent,
            other => Flag::Keyword(other.to_owned()),
        }
    }

    pub fn is_recent(&self) -> bool {
        matches!(self, Flag::Recent)
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flag::Seen => write!(f, "\\Seen"),
            Flag::Answered => write!(f, "\\Answered"),
            Flag::Flagged => write!(f, "\\Flagged"),
            Flag::Deleted => write!(f, "\\Deleted"),
            Flag::Draft => write!(f, "\\Draft"),
            Flag::Recent => write!(f, "\\Recent"),
            Flag::Keyword(name) => write!(f, "{name}"),
        }
    }
}

/// A message's flag set. Ordered so `STORE`/`FETCH` echoes are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSet(BTreeSet<Flag>);

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_iter_strip_recent(flags: impl IntoIterator<Item = Flag>) -> Self {
        let mut set = BTreeSet::new();
        for flag in flags {
            if !flag.is_recent() {
                set.insert(flag);
            }
        }
        Self(set)
    }

    pub fn contains(&self, flag: &Flag) -> bool {
        self.0.contains(flag)
    }

    pub fn insert(&mut self, flag: Flag) -> bool {
        self.0.insert(flag)
    }

    pub fn remove(&mut self, flag: &Flag) -> bool {
        self.0.remove(flag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Client-supplied flags never carry `\Recent`; the server owns it.
    pub fn strip_recent_from_client_input(mut flags: Vec<Flag>) -> Vec<Flag> {
        flags.retain(|f| !f.is_recent());
        flags
    }

    /// Union, the way `+FLAGS` applies.
    pub fn union_with(&mut self, other: &[Flag]) {
        for flag in other {
            if !flag.is_recent() {
                self.0.insert(flag.clone());
            }
        }
    }

    /// Difference, the way `-FLAGS` applies.
    pub fn subtract(&mut self, other: &[Flag]) {
        for flag in other {
            self.0.remove(flag);
        }
    }

    /// Replace, the way bare `FLAGS` applies. `\Recent` is preserved if it
    /// was already set; clients cannot set or clear it explicitly.
    pub fn replace_with(&mut self, other: &[Flag]) {
        let recent = self.0.contains(&Flag::Recent);
        self.0 = other.iter().filter(|f| !f.is_recent()).cloned().collect();
        if recent {
            self.0.insert(Flag::Recent);
        }
    }

    pub fn render(&self) -> String {
        self.0
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl FromIterator<Flag> for FlagSet {
    fn from_iter<T: IntoIterator<Item = Flag>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_flags_is_idempotent() {
        let mut flags = FlagSet::new();
        flags.union_with(&[Flag::Deleted]);
        flags.union_with(&[Flag::Deleted]);
        assert_eq!(flags.len(), 1);
        assert!(flags.contains(&Flag::Deleted));
    }

    #[test]
    fn replace_preserves_recent() {
        let mut flags = FlagSet::new();
        flags.insert(Flag::Recent);
        flags.replace_with(&[Flag::Seen, Flag::Recent]);
        assert!(flags.contains(&Flag::Recent));
        assert!(flags.contains(&Flag::Seen));
        assert_eq!(flags.len(), 2);
    }

    #[test]
    fn client_cannot_set_recent_via_store() {
        let mut flags = FlagSet::new();
        flags.union_with(&[Flag::Recent]);
        assert!(!flags.contains(&Flag::Recent));
    }
}
