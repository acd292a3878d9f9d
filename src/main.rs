//! Connection driver: the thin `tokio` binary that wires
//! [`imapd::codec::ImapDecoder`] and [`imapd::session::Session`] to a TCP
//! listener. Every protocol decision lives in the library; this file only
//! owns I/O scheduling (spec §5's suspension points) and the two places a
//! real deployment swaps in its own collaborator: [`imapd::auth::Authenticator`]
//! and [`imapd::repository::Repository`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, info_span, warn, Instrument};
use tracing_subscriber::EnvFilter;

use imapd::auth::{Authenticator, StaticAuthenticator};
use imapd::codec::{Event, ImapDecoder};
use imapd::config::{Cli, Config};
use imapd::error::{ImapError, ResponseCode};
use imapd::repository::{InMemoryRepository, Repository};
use imapd::session::{idle, Session, State};
use imapd::types::command::{parse_command, peek_append_mailbox};
use imapd::types::{Response, Status, StatusLine, Tag};

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli)?;
    let bind_addr = config.bind_addr;
    let config = Arc::new(config);

    // Stand-ins for the two traits spec §1 treats as external collaborators:
    // a real deployment replaces these with an HTTP-backed authenticator
    // against `config.auth_endpoint` and a SQL-backed repository, without
    // touching anything else in this crate (§4.11).
    warn!("using the in-memory repository and an empty static authenticator; wire real collaborators for production");
    let authenticator: Arc<dyn Authenticator> = Arc::new(StaticAuthenticator::new(std::iter::empty()));
    let repository: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());

    let listener = TcpListener::bind(bind_addr).await?;
    info!(%bind_addr, "listening");

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let conn_id = NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed);
        let config = config.clone();
        let authenticator = authenticator.clone();
        let repository = repository.clone();
        let span = info_span!("session", conn_id, %peer_addr);
        tokio::spawn(
            async move {
                if let Err(err) =
                    handle_connection(stream, config, authenticator, repository).await
                {
                    error!(%err, "connection ended with error");
                }
            }
            .instrument(span),
        );
    }
}

/// Extract the leading whitespace-delimited tag from a raw command line,
/// best-effort, for tagging a `BAD` response to a line that failed to parse
/// as far as `Command::parse` itself.
fn extract_tag(line: &[u8]) -> Option<Tag> {
    let text = std::str::from_utf8(line).ok()?;
    let tag = text.split(' ').next().filter(|s| !s.is_empty())?;
    Some(Tag(tag.to_owned()))
}

async fn write_responses(writer: &mut (impl AsyncWriteExt + Unpin), responses: &[Response]) -> std::io::Result<()> {
    for response in responses {
        writer.write_all(&response.render()).await?;
    }
    writer.flush().await
}

async fn handle_connection(
    stream: TcpStream,
    config: Arc<Config>,
    authenticator: Arc<dyn Authenticator>,
    repository: Arc<dyn Repository>,
) -> anyhow::Result<()> {
    stream.set_nodelay(true).ok();
    let (read_half, mut write_half) = stream.into_split();
    let max_literal: u32 = config.max_literal_octets.min(u32::MAX as u64) as u32;
    let mut framed = FramedRead::new(read_half, ImapDecoder::new(max_literal));

    let greeting = StatusLine::untagged(
        Status::Ok,
        format!("{} IMAP4rev1 Service Ready", config.domain),
    );
    write_responses(&mut write_half, &[Response::Status(greeting)]).await?;

    let mut session = Session::new(authenticator, repository.clone());
    let idle_timeout = Duration::from_secs(config.idle_timeout_secs);
    let literal_timeout = Duration::from_secs(config.literal_timeout_secs);

    loop {
        if session.state == State::Logout {
            return Ok(());
        }

        if session.idling {
            if !run_idle_loop(&mut framed, &mut write_half, &mut session, idle_timeout).await? {
                return Ok(());
            }
            continue;
        }

        let deadline = idle_timeout;
        let event = match timeout(deadline, framed.next()).await {
            Ok(Some(Ok(event))) => event,
            Ok(Some(Err(err))) => return Err(err.into()),
            Ok(None) => return Ok(()),
            Err(_) => {
                let bye = StatusLine::untagged(Status::Bye, "Autologout; idle for too long");
                write_responses(&mut write_half, &[Response::Status(bye)]).await?;
                return Ok(());
            }
        };

        match event {
            Event::Command(raw) => {
                if session.awaiting_sasl_response() {
                    let Some((tag, _mechanism)) = session.take_pending_auth() else {
                        unreachable!("awaiting_sasl_response implied a pending tag")
                    };
                    let responses = session.handle_auth_continuation(tag, &raw.line);
                    write_responses(&mut write_half, &responses).await?;
                    continue;
                }

                match parse_command(&raw.line, &raw.literals) {
                    Ok(command) => {
                        debug!(tag = %command.tag, name = command.body.name(), "dispatching command");
                        let responses = session.handle(command);
                        write_responses(&mut write_half, &responses).await?;
                    }
                    Err(err) => {
                        let tag = extract_tag(&raw.line);
                        let status = match tag {
                            Some(tag) => StatusLine::tagged(tag, Status::Bad, err.text()),
                            None => StatusLine::untagged(Status::Bad, err.text()),
                        };
                        write_responses(&mut write_half, &[Response::Status(status)]).await?;
                    }
                }
            }
            Event::LiteralAck {
                length: _,
                line_so_far,
            } => {
                if let Some(response) =
                    reject_append_without_destination(&line_so_far, &session, repository.as_ref())
                {
                    framed.decoder_mut().cancel_pending_literal();
                    write_responses(&mut write_half, &[response]).await?;
                    continue;
                }
                write_responses(
                    &mut write_half,
                    &[Response::Continuation("Ready for literal data".to_owned())],
                )
                .await?;
                // The literal payload itself must land within the shorter
                // literal-transfer deadline (spec §5), not the general idle
                // timeout.
                match timeout(literal_timeout, framed.next()).await {
                    Ok(Some(Ok(Event::Command(raw)))) => {
                        match parse_command(&raw.line, &raw.literals) {
                            Ok(command) => {
                                let responses = session.handle(command);
                                write_responses(&mut write_half, &responses).await?;
                            }
                            Err(err) => {
                                let tag = extract_tag(&raw.line);
                                let status = match tag {
                                    Some(tag) => StatusLine::tagged(tag, Status::Bad, err.text()),
                                    None => StatusLine::untagged(Status::Bad, err.text()),
                                };
                                write_responses(&mut write_half, &[Response::Status(status)]).await?;
                            }
                        }
                    }
                    Ok(Some(Ok(other))) => {
                        warn!(?other, "unexpected event while draining a literal");
                    }
                    Ok(Some(Err(err))) => return Err(err.into()),
                    Ok(None) => return Ok(()),
                    Err(_) => {
                        let bye = StatusLine::untagged(Status::Bye, "Literal transfer timed out");
                        write_responses(&mut write_half, &[Response::Status(bye)]).await?;
                        return Ok(());
                    }
                }
            }
            Event::LiteralRejected { line_so_far, .. } => {
                let tag = extract_tag(&line_so_far);
                let status = match tag {
                    Some(tag) => StatusLine::tagged(tag, Status::No, "Message size invalid or too large")
                        .with_code(ResponseCode::Unavailable),
                    None => StatusLine::untagged(Status::Bad, "Message size invalid or too large"),
                };
                write_responses(&mut write_half, &[Response::Status(status)]).await?;
            }
        }
    }
}

/// The `TRYCREATE` pre-ack optimization (spec §4.7, tested by S4): decline
/// an `APPEND` to a nonexistent mailbox before the `+` that would commit
/// the client to sending literal octets the server already knows it will
/// reject. Returns `None` (meaning: ack normally) for anything that is not
/// a recognisable, authenticated `APPEND` to a mailbox we can prove absent.
fn reject_append_without_destination(
    line_so_far: &[u8],
    session: &Session,
    repository: &dyn Repository,
) -> Option<Response> {
    let (tag, mailbox) = peek_append_mailbox(line_so_far)?;
    let user = session.user.as_deref()?;
    match repository.mailbox_exists(user, &mailbox) {
        Ok(true) => None,
        Ok(false) => Some(Response::Status(
            StatusLine::tagged(tag, Status::No, format!("Mailbox {mailbox} does not exist"))
                .with_code(ResponseCode::TryCreate),
        )),
        Err(_) => None,
    }
}

/// Run the `IDLE` wait loop (spec §4.9): poll the repository on a timer and
/// push untagged notifications, while concurrently watching for the
/// client's `DONE`. Returns `Ok(false)` when the connection should close.
async fn run_idle_loop(
    framed: &mut FramedRead<tokio::net::tcp::OwnedReadHalf, ImapDecoder>,
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    session: &mut Session,
    idle_timeout: Duration,
) -> anyhow::Result<bool> {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(idle::POLL_INTERVAL) => {
                match session.idle_updates() {
                    Ok(responses) if !responses.is_empty() => {
                        write_responses(write_half, &responses).await?;
                    }
                    Ok(_) => {}
                    Err(ImapError::Bye(text)) => {
                        write_responses(write_half, &[Response::Status(StatusLine::untagged(Status::Bye, text))]).await?;
                        return Ok(false);
                    }
                    Err(err) => warn!(%err, "error while polling during IDLE"),
                }
            }
            event = timeout(idle_timeout, framed.next()) => {
                let event = match event {
                    Ok(Some(Ok(event))) => event,
                    Ok(Some(Err(err))) => return Err(err.into()),
                    Ok(None) => return Ok(false),
                    Err(_) => {
                        let bye = StatusLine::untagged(Status::Bye, "Autologout; idle for too long");
                        write_responses(write_half, &[Response::Status(bye)]).await?;
                        return Ok(false);
                    }
                };
                match event {
                    Event::Command(raw) if raw.line.eq_ignore_ascii_case(b"DONE") => {
                        let Some(tag) = session.take_idle_tag() else {
                            continue;
                        };
                        let responses = session.handle(imapd::types::Command {
                            tag,
                            body: imapd::types::CommandBody::IdleDone,
                        });
                        write_responses(write_half, &responses).await?;
                        return Ok(true);
                    }
                    _ => {
                        let bad = StatusLine::untagged(Status::Bad, "Expected DONE");
                        write_responses(write_half, &[Response::Status(bad)]).await?;
                    }
                }
            }
        }
    }
}
