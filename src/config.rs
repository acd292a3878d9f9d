//! C12: typed configuration surface.
//!
//! Spec §1 treats config *sourcing* as external; this module owns the typed
//! struct every other module reads from, loaded from environment variables
//! following the `IMAPD_<KEY>` convention of
//! `bradsjm-mail-imap-mcp-rs/src/config.rs` (`MAIL_IMAP_<SEGMENT>_<KEY>`
//! generalized to this crate's single-process, single-domain shape), with
//! `clap` layered on top for the binary's process-level flags the way
//! `bradsjm`'s `main.rs` and this corpus's other server binaries do.

use std::env::VarError;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::{ImapError, ImapResult};

/// Default cap on a single literal's octet count (spec §6).
pub const DEFAULT_MAX_LITERAL_OCTETS: u64 = 52_428_800;
/// Default connection idle timeout, in seconds (spec §5).
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 1_800;
/// Default timeout for an in-flight literal transfer, in seconds (spec §5).
pub const DEFAULT_LITERAL_TIMEOUT_SECS: u64 = 300;

/// Process-level flags, parsed with `clap`. These override the
/// environment-sourced [`Config`] fields they name.
#[derive(Debug, clap::Parser)]
#[command(name = "imapd", about = "RFC 3501 IMAP4rev1 server core")]
pub struct Cli {
    /// Address to bind the plaintext/STARTTLS listener on.
    #[arg(long, env = "IMAPD_BIND_ADDR")]
    pub bind_addr: Option<SocketAddr>,

    /// Path to a config file (reserved; the core reads environment
    /// variables directly today). Kept for parity with the corpus's
    /// `--config` flags.
    #[arg(long)]
    pub config_path: Option<PathBuf>,
}

/// Everything the core needs to know about its deployment that isn't part
/// of the repository or authenticator traits themselves (spec §6).
#[derive(Debug, Clone)]
pub struct Config {
    /// Fully-qualified mail domain, used in greeting text and NAMESPACE.
    pub domain: String,
    /// URL of the external SASL/LOGIN authenticator.
    pub auth_endpoint: String,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
    pub max_literal_octets: u64,
    pub idle_timeout_secs: u64,
    pub literal_timeout_secs: u64,
    pub bind_addr: SocketAddr,
}

impl Config {
    /// Load from `IMAPD_*` environment variables, then let a parsed [`Cli`]
    /// override the fields it carries (bind address, config path).
    pub fn load(cli: &Cli) -> ImapResult<Self> {
        let domain = required_env("IMAPD_DOMAIN")?;
        let auth_endpoint = required_env("IMAPD_AUTH_ENDPOINT")?;
        let tls_cert_path = optional_env("IMAPD_TLS_CERT_PATH")?.map(PathBuf::from);
        let tls_key_path = optional_env("IMAPD_TLS_KEY_PATH")?.map(PathBuf::from);
        let max_literal_octets =
            parse_u64_env("IMAPD_MAX_LITERAL_OCTETS", DEFAULT_MAX_LITERAL_OCTETS)?;
        let idle_timeout_secs = parse_u64_env("IMAPD_IDLE_TIMEOUT", DEFAULT_IDLE_TIMEOUT_SECS)?;
        let literal_timeout_secs =
            parse_u64_env("IMAPD_LITERAL_TIMEOUT", DEFAULT_LITERAL_TIMEOUT_SECS)?;
        let bind_addr = cli.bind_addr.unwrap_or_else(|| {
            "0.0.0.0:143"
                .parse()
                .expect("hardcoded fallback bind address is valid")
        });

        Ok(Self {
            domain,
            auth_endpoint,
            tls_cert_path,
            tls_key_path,
            max_literal_octets,
            idle_timeout_secs,
            literal_timeout_secs,
            bind_addr,
        })
    }
}

fn required_env(key: &str) -> ImapResult<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ImapError::server_bug(format!(
            "missing required environment variable {key}"
        ))),
    }
}

fn optional_env(key: &str) -> ImapResult<Option<String>> {
    match std::env::var(key) {
        Ok(v) => Ok(Some(v)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(ImapError::server_bug(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

fn parse_u64_env(key: &str, default: u64) -> ImapResult<u64> {
    match std::env::var(key) {
        Ok(v) => v
            .parse::<u64>()
            .map_err(|_| ImapError::server_bug(format!("invalid u64 environment variable {key}: '{v}'"))),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(ImapError::server_bug(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize the tests that
    // touch them so they don't race each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn load_fills_in_defaults_when_optional_vars_are_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("IMAPD_DOMAIN", "example.com");
        std::env::set_var("IMAPD_AUTH_ENDPOINT", "https://auth.example.com");
        std::env::remove_var("IMAPD_MAX_LITERAL_OCTETS");
        std::env::remove_var("IMAPD_IDLE_TIMEOUT");
        std::env::remove_var("IMAPD_LITERAL_TIMEOUT");
        std::env::remove_var("IMAPD_TLS_CERT_PATH");

        let cli = Cli {
            bind_addr: None,
            config_path: None,
        };
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.domain, "example.com");
        assert_eq!(config.max_literal_octets, DEFAULT_MAX_LITERAL_OCTETS);
        assert_eq!(config.idle_timeout_secs, DEFAULT_IDLE_TIMEOUT_SECS);
        assert!(config.tls_cert_path.is_none());

        std::env::remove_var("IMAPD_DOMAIN");
        std::env::remove_var("IMAPD_AUTH_ENDPOINT");
    }

    #[test]
    fn load_fails_without_required_vars() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("IMAPD_DOMAIN");
        std::env::remove_var("IMAPD_AUTH_ENDPOINT");
        let cli = Cli {
            bind_addr: None,
            config_path: None,
        };
        assert!(Config::load(&cli).is_err());
    }
}
