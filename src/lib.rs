//! IMAP4rev1 server core: the protocol engine described in this crate's
//! design document (wire codec, session state machine, and the command
//! responders it dispatches to), plus the trait boundaries
//! ([`auth::Authenticator`], [`repository::Repository`]) through which it
//! consumes its external collaborators.
//!
//! `main.rs` is the thin connection driver that wires these pieces to a
//! `tokio` TCP listener; everything reachable from here is transport-free
//! and directly testable.

pub mod auth;
pub mod codec;
pub mod commands;
pub mod config;
pub mod error;
pub mod mailbox_view;
pub mod message;
pub mod repository;
pub mod search;
pub mod session;
pub mod tokenizer;
pub mod types;
