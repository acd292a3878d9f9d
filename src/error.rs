//! The one error type that crosses every fallible boundary in the core.
//!
//! Every command handler ultimately converts whatever went wrong into an
//! [`ImapError`], which already knows which of the four wire-level kinds
//! (`BAD`/`NO`/`BYE`/`SERVERBUG`, see spec §7) it should render as.

use crate::repository::RepositoryError;

/// A `[...]` response code, attached to a `NO` or `OK` status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    Alert,
    Capability(Vec<String>),
    PermanentFlags(Vec<String>),
    ReadOnly,
    ReadWrite,
    TryCreate,
    UidNext(u32),
    UidValidity(u32),
    Unseen(u32),
    AppendUid(u32, u32),
    CopyUid(u32, String, String),
    BadCharset(Vec<String>),
    PrivacyRequired,
    AuthenticationFailed,
    ServerBug,
    Unavailable,
}

impl ResponseCode {
    /// Render as the bracketed token that goes between the status word and
    /// the human-readable text, e.g. `[TRYCREATE]`.
    pub fn render(&self) -> String {
        match self {
            Self::Alert => "[ALERT]".to_owned(),
            Self::Capability(caps) => format!("[CAPABILITY {}]", caps.join(" ")),
            Self::PermanentFlags(flags) => format!("[PERMANENTFLAGS ({})]", flags.join(" ")),
            Self::ReadOnly => "[READ-ONLY]".to_owned(),
            Self::ReadWrite => "[READ-WRITE]".to_owned(),
            Self::TryCreate => "[TRYCREATE]".to_owned(),
            Self::UidNext(n) => format!("[UIDNEXT {n}]"),
            Self::UidValidity(n) => format!("[UIDVALIDITY {n}]"),
            Self::Unseen(n) => format!("[UNSEEN {n}]"),
            Self::AppendUid(v, u) => format!("[APPENDUID {v} {u}]"),
            Self::CopyUid(v, src, dst) => format!("[COPYUID {v} {src} {dst}]"),
            Self::BadCharset(charsets) => format!("[BADCHARSET ({})]", charsets.join(" ")),
            Self::PrivacyRequired => "[PRIVACYREQUIRED]".to_owned(),
            Self::AuthenticationFailed => "[AUTHENTICATIONFAILED]".to_owned(),
            Self::ServerBug => "[SERVERBUG]".to_owned(),
            Self::Unavailable => "[UNAVAILABLE]".to_owned(),
        }
    }
}

/// Everything that can go wrong while handling one command.
#[derive(Debug, thiserror::Error)]
pub enum ImapError {
    /// Protocol or syntax violation: unparseable command, missing argument,
    /// malformed sequence set.
    #[error("{0}")]
    Bad(String),

    /// Semantically valid but rejected: not authenticated, no mailbox
    /// selected, read-only violation, missing destination, ...
    #[error("{message}")]
    No {
        message: String,
        code: Option<ResponseCode>,
    },

    /// The session is terminating.
    #[error("{0}")]
    Bye(String),

    /// Internal inconsistency: a message that fails to parse after
    /// successful ingestion, a repository error inside a transaction.
    #[error("internal error: {0}")]
    ServerBug(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type ImapResult<T> = Result<T, ImapError>;

impl ImapError {
    pub fn bad(message: impl Into<String>) -> Self {
        Self::Bad(message.into())
    }

    pub fn no(message: impl Into<String>) -> Self {
        Self::No {
            message: message.into(),
            code: None,
        }
    }

    pub fn no_code(message: impl Into<String>, code: ResponseCode) -> Self {
        Self::No {
            message: message.into(),
            code: Some(code),
        }
    }

    pub fn bye(message: impl Into<String>) -> Self {
        Self::Bye(message.into())
    }

    pub fn server_bug(message: impl Into<String>) -> Self {
        Self::ServerBug(message.into())
    }

    /// The status word this error renders as on the wire.
    pub fn status_word(&self) -> &'static str {
        match self {
            Self::Bad(_) => "BAD",
            Self::No { .. } => "NO",
            Self::Bye(_) => "BYE",
            Self::ServerBug(_) => "NO",
            Self::Io(_) => "BYE",
            Self::Repository(_) => "NO",
        }
    }

    /// The `[...]` code to attach, if any.
    pub fn code(&self) -> Option<ResponseCode> {
        match self {
            Self::No { code, .. } => code.clone(),
            Self::ServerBug(_) | Self::Repository(_) => Some(ResponseCode::ServerBug),
            _ => None,
        }
    }

    /// The human-readable text to attach.
    pub fn text(&self) -> String {
        match self {
            Self::Repository(err) => format!("{err}"),
            other => other.to_string(),
        }
    }
}
