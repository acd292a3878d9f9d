//! C9: the per-connection state machine — `NotAuthenticated` →
//! `Authenticated` → `Selected`, with `LOGOUT` reachable from any state
//! (RFC 3501 §3). Command dispatch is a match over `(state, command)`; each
//! arm either updates session state directly or delegates to a `commands::*`
//! responder and turns its result into untagged [`Data`].

pub mod idle;

use std::sync::Arc;

use crate::auth::Authenticator;
use crate::commands::{copy_append, expunge, fetch, store};
use crate::error::{ImapError, ImapResult, ResponseCode};
use crate::mailbox_view::MailboxView;
use crate::repository::Repository;
use crate::search::eval::{evaluate, SearchContext};
use crate::types::{
    Command, CommandBody, Data, MailboxAttribute, MailboxName, NamespaceEntry, Response,
    SearchKey, Status, StatusLine, StoreKind, Tag,
};

pub const CAPABILITIES: &[&str] = &[
    "IMAP4rev1",
    "LITERAL+",
    "IDLE",
    "NAMESPACE",
    "UNSELECT",
    "UIDPLUS",
    "AUTH=PLAIN",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    NotAuthenticated,
    Authenticated,
    Selected,
    Logout,
}

/// One client connection's mutable protocol state. Owns the selected
/// mailbox view, if any; everything durable lives behind [`Repository`].
pub struct Session {
    pub state: State,
    pub user: Option<String>,
    pub view: Option<MailboxView>,
    pub idling: bool,
    tls_active: bool,
    idle_tag: Option<Tag>,
    pending_auth: Option<(Tag, String)>,
    authenticator: Arc<dyn Authenticator>,
    repo: Arc<dyn Repository>,
}

impl Session {
    pub fn new(authenticator: Arc<dyn Authenticator>, repo: Arc<dyn Repository>) -> Self {
        Self {
            state: State::NotAuthenticated,
            user: None,
            view: None,
            idling: false,
            tls_active: false,
            idle_tag: None,
            pending_auth: None,
            authenticator,
            repo,
        }
    }

    /// Tag of the suspended `IDLE`, if any. `DONE` (RFC 2177) arrives as a
    /// bare untagged line; the connection driver calls this to attach the
    /// right tag to the completion it builds once `DONE` is seen.
    pub fn take_idle_tag(&mut self) -> Option<Tag> {
        self.idle_tag.take()
    }

    /// Whether an `AUTHENTICATE` is waiting on its SASL continuation
    /// response line, without consuming it.
    pub fn awaiting_sasl_response(&self) -> bool {
        self.pending_auth.is_some()
    }

    /// `(tag, mechanism)` of an `AUTHENTICATE` waiting on its SASL
    /// continuation response, if any. Like `DONE`, that response arrives as
    /// a bare untagged line (RFC 3501 §7.5); the driver uses this to replay
    /// it as the rest of the original tagged command.
    pub fn take_pending_auth(&mut self) -> Option<(Tag, String)> {
        self.pending_auth.take()
    }

    /// Record that the transport has completed a TLS handshake (driver-side
    /// STARTTLS upgrade, RFC 2595). Unlocks `LOGIN`/`AUTHENTICATE PLAIN` and
    /// switches `CAPABILITY`'s advertised mechanisms (spec §4.9).
    pub fn mark_tls_active(&mut self) {
        self.tls_active = true;
    }

    pub fn tls_active(&self) -> bool {
        self.tls_active
    }

    fn capabilities(&self) -> Vec<String> {
        if self.tls_active {
            CAPABILITIES.iter().map(|s| s.to_string()).collect()
        } else {
            vec!["IMAP4rev1".to_owned(), "STARTTLS".to_owned(), "LOGINDISABLED".to_owned()]
        }
    }

    fn require_user(&self) -> ImapResult<&str> {
        self.user
            .as_deref()
            .ok_or_else(|| ImapError::no("Not authenticated"))
    }

    fn require_view(&mut self) -> ImapResult<&mut MailboxView> {
        self.view
            .as_mut()
            .ok_or_else(|| ImapError::no("No mailbox selected"))
    }

    /// Dispatch one command, returning every response line to write
    /// (untagged data first, then the final tagged status line).
    ///
    /// A dispatch arm that needs to attach a response code to the tagged
    /// completion (UIDPLUS's `APPENDUID`/`COPYUID`, SELECT's `READ-WRITE`)
    /// pushes a placeholder `Response::Status` with no tag and text `"[]"`;
    /// `handle` lifts that code onto the real tagged line below instead of
    /// emitting it as its own response.
    pub fn handle(&mut self, command: Command) -> Vec<Response> {
        let tag = command.tag.clone();
        let completion_text = match &command.body {
            CommandBody::IdleDone => "IDLE terminated",
            _ => "completed.",
        };
        let result = self.dispatch(command);
        self.finish(tag, result, completion_text)
    }

    /// Complete an `AUTHENTICATE` that was suspended on a bare `+`
    /// continuation once the driver has read its SASL response line
    /// (RFC 3501 §7.5). Consumed via `take_pending_auth` by the driver, which
    /// supplies back the original tag.
    pub fn handle_auth_continuation(&mut self, tag: Tag, response_line: &[u8]) -> Vec<Response> {
        let result = self.authenticate_continuation(response_line);
        self.finish(tag, result, "completed.")
    }

    /// Attach a tagged completion line to a dispatch result, lifting any
    /// response-code placeholder (see `dispatch`'s doc comment) onto it.
    /// Shared by ordinary command dispatch and the SASL-continuation path,
    /// since both need the same completion-line bookkeeping.
    fn finish(
        &mut self,
        tag: Tag,
        result: ImapResult<Vec<Response>>,
        completion_text: &str,
    ) -> Vec<Response> {
        match result {
            // IDLE's `+ idling` and AUTHENTICATE's bare `+` continuation
            // leave the command in progress; the tagged completion comes
            // later, built by the driver from the `DONE`/SASL-response line.
            Ok(lines) if matches!(lines.as_slice(), [Response::Continuation(_)]) => lines,
            Ok(mut lines) => {
                let completion_code = match lines.last() {
                    Some(Response::Status(s)) if s.tag.is_none() && s.text == "[]" => {
                        let Some(Response::Status(s)) = lines.pop() else {
                            unreachable!()
                        };
                        s.code
                    }
                    _ => None,
                };
                let mut completion = StatusLine::tagged(tag, Status::Ok, completion_text);
                if let Some(code) = completion_code {
                    completion = completion.with_code(code);
                }
                lines.push(Response::Status(completion));
                lines
            }
            Err(err) => {
                if matches!(err, ImapError::Bye(_)) {
                    self.state = State::Logout;
                }
                let mut status = StatusLine::tagged(tag, status_word(&err), err.text());
                if let Some(code) = err.code() {
                    status = status.with_code(code);
                }
                vec![Response::Status(status)]
            }
        }
    }

    fn dispatch(&mut self, command: Command) -> ImapResult<Vec<Response>> {
        match command.body {
            CommandBody::Capability => Ok(vec![Response::Data(Data::Capability(
                self.capabilities(),
            ))]),
            CommandBody::Noop => self.pending_updates(),
            CommandBody::Logout => {
                self.state = State::Logout;
                Ok(vec![Response::Status(StatusLine::untagged(
                    Status::Bye,
                    "Server logging out.",
                ))])
            }
            CommandBody::StartTls => {
                if self.state != State::NotAuthenticated {
                    return Err(ImapError::bad("STARTTLS only valid before authentication"));
                }
                if self.tls_active {
                    return Err(ImapError::bad("TLS already active"));
                }
                self.tls_active = true;
                Ok(Vec::new())
            }
            CommandBody::Login { user, password } => self.login(&user, &password),
            CommandBody::Authenticate {
                mechanism,
                initial_response,
            } => self.authenticate(command.tag.clone(), &mechanism, initial_response),
            CommandBody::Select { mailbox } => self.select(mailbox, false),
            CommandBody::Examine { mailbox } => self.select(mailbox, true),
            CommandBody::Create { mailbox } => {
                let user = self.require_user()?.to_owned();
                self.repo.create_mailbox(&user, &mailbox)?;
                Ok(Vec::new())
            }
            CommandBody::Delete { mailbox } => {
                let user = self.require_user()?.to_owned();
                self.repo.delete_mailbox(&user, &mailbox)?;
                Ok(Vec::new())
            }
            CommandBody::Rename { from, to } => {
                let user = self.require_user()?.to_owned();
                self.repo.rename_mailbox(&user, &from, &to)?;
                Ok(Vec::new())
            }
            CommandBody::Subscribe { mailbox } => {
                let user = self.require_user()?.to_owned();
                self.repo.set_subscribed(&user, &mailbox, true)?;
                Ok(Vec::new())
            }
            CommandBody::Unsubscribe { mailbox } => {
                let user = self.require_user()?.to_owned();
                self.repo.set_subscribed(&user, &mailbox, false)?;
                Ok(Vec::new())
            }
            CommandBody::List {
                reference,
                pattern,
                lsub,
            } => self.list(&reference, &pattern, lsub),
            CommandBody::Status { mailbox, items } => self.status(mailbox, items),
            CommandBody::Append {
                mailbox,
                flags,
                date,
                data,
            } => {
                let user = self.require_user()?.to_owned();
                let (_, code) =
                    copy_append::handle_append(self.repo.as_ref(), &user, &mailbox, flags, date, data)?;
                Ok(vec![Response::Status(StatusLine::untagged(
                    Status::Ok,
                    "[]",
                ).with_code(code))])
            }
            CommandBody::Namespace => {
                self.require_user()?;
                Ok(vec![Response::Data(Data::Namespace {
                    personal: vec![NamespaceEntry {
                        prefix: String::new(),
                        delimiter: MailboxName::DELIMITER,
                    }],
                    other_users: Vec::new(),
                    shared: Vec::new(),
                })])
            }
            CommandBody::Idle => {
                self.require_user()?;
                self.idling = true;
                self.idle_tag = Some(command.tag.clone());
                Ok(vec![Response::Continuation("idling".to_owned())])
            }
            CommandBody::IdleDone => {
                self.idling = false;
                self.idle_tag = None;
                Ok(Vec::new())
            }
            CommandBody::Check => {
                self.require_view()?;
                Ok(Vec::new())
            }
            CommandBody::Close => {
                let user = self.require_user()?.to_owned();
                let repo = self.repo.clone();
                let view = self.require_view()?;
                expunge::handle_close(view, repo.as_ref(), &user)?;
                self.view = None;
                self.state = State::Authenticated;
                Ok(Vec::new())
            }
            CommandBody::Unselect => {
                self.require_view()?;
                self.view = None;
                self.state = State::Authenticated;
                Ok(Vec::new())
            }
            CommandBody::Expunge => {
                let user = self.require_user()?.to_owned();
                let repo = self.repo.clone();
                let view = self.require_view()?;
                let data = expunge::handle_expunge(view, repo.as_ref(), &user)?;
                Ok(data.into_iter().map(Response::Data).collect())
            }
            CommandBody::UidExpunge { set } => {
                let user = self.require_user()?.to_owned();
                let repo = self.repo.clone();
                let view = self.require_view()?;
                let data = expunge::handle_uid_expunge(view, repo.as_ref(), &user, &set)?;
                Ok(data.into_iter().map(Response::Data).collect())
            }
            CommandBody::Search { uid, charset, key } => self.search(uid, charset, key),
            CommandBody::Fetch { uid, set, items } => {
                let user = self.require_user()?.to_owned();
                let repo = self.repo.clone();
                let view = self.require_view()?;
                let data = fetch::handle_fetch(view, repo.as_ref(), &user, &set, &items, uid)?;
                Ok(data.into_iter().map(Response::Data).collect())
            }
            CommandBody::Store {
                uid,
                set,
                kind,
                silent,
                flags,
            } => self.store(uid, set, kind, silent, flags),
            CommandBody::Copy { uid, set, mailbox } => {
                let user = self.require_user()?.to_owned();
                let repo = self.repo.clone();
                let view = self.require_view()?;
                let code = copy_append::handle_copy(view, repo.as_ref(), &user, &set, &mailbox, uid)?;
                Ok(vec![Response::Status(StatusLine::untagged(Status::Ok, "[]").with_code(code))])
            }
        }
    }

    fn login(&mut self, user: &str, password: &[u8]) -> ImapResult<Vec<Response>> {
        if self.state != State::NotAuthenticated {
            return Err(ImapError::bad("Already authenticated"));
        }
        if !self.tls_active {
            return Err(ImapError::no_code(
                "LOGIN disabled without TLS",
                ResponseCode::PrivacyRequired,
            ));
        }
        let password = String::from_utf8_lossy(password);
        let ok = self.authenticator.verify(user, &password)?;
        if !ok {
            return Err(ImapError::no_code(
                "Authentication failed",
                ResponseCode::AuthenticationFailed,
            ));
        }
        self.user = Some(user.to_owned());
        self.state = State::Authenticated;
        Ok(Vec::new())
    }

    fn authenticate(
        &mut self,
        tag: Tag,
        mechanism: &str,
        initial_response: Option<Vec<u8>>,
    ) -> ImapResult<Vec<Response>> {
        if self.state != State::NotAuthenticated {
            return Err(ImapError::bad("Already authenticated"));
        }
        if !mechanism.eq_ignore_ascii_case("PLAIN") {
            return Err(ImapError::no("Unsupported SASL mechanism"));
        }
        if !self.tls_active {
            return Err(ImapError::no_code(
                "AUTHENTICATE PLAIN disabled without TLS",
                ResponseCode::PrivacyRequired,
            ));
        }
        let Some(response) = initial_response else {
            self.pending_auth = Some((tag, mechanism.to_owned()));
            return Ok(vec![Response::Continuation(String::new())]);
        };
        let creds = crate::auth::decode_plain(&response)?;
        self.login(&creds.authcid, creds.password.as_bytes())
    }

    /// Complete an `AUTHENTICATE` that was suspended awaiting its SASL
    /// response line (RFC 3501 §7.5). The connection driver calls this once
    /// it has read that bare line, after consuming `take_pending_auth`.
    pub fn authenticate_continuation(&mut self, response_line: &[u8]) -> ImapResult<Vec<Response>> {
        let creds = crate::auth::decode_plain(response_line)?;
        self.login(&creds.authcid, creds.password.as_bytes())
    }

    fn select(&mut self, mailbox: MailboxName, read_only: bool) -> ImapResult<Vec<Response>> {
        let user = self.require_user()?.to_owned();
        let snapshot = self.repo.snapshot(&user, &mailbox)?;
        let mut view = MailboxView::from_snapshot(mailbox, snapshot, read_only);

        let mut lines = vec![
            Response::Data(Data::Flags(
                view.permanent_flags_including_keywords()
                    .iter()
                    .map(|f| f.to_string())
                    .collect(),
            )),
            Response::Data(Data::Exists(view.exists())),
            Response::Data(Data::Recent(view.recent())),
        ];
        if let Some(seq) = view.first_unseen_seq() {
            lines.push(Response::Status(
                StatusLine::untagged(Status::Ok, "Message is first unseen.")
                    .with_code(ResponseCode::Unseen(seq)),
            ));
        }
        lines.push(Response::Status(
            StatusLine::untagged(Status::Ok, "Permanent flags.").with_code(
                ResponseCode::PermanentFlags(
                    view.permanent_flags_including_keywords()
                        .iter()
                        .map(|f| f.to_string())
                        .collect(),
                ),
            ),
        ));
        lines.push(Response::Status(
            StatusLine::untagged(Status::Ok, "UIDs valid.")
                .with_code(ResponseCode::UidValidity(view.uidvalidity)),
        ));
        lines.push(Response::Status(
            StatusLine::untagged(Status::Ok, "Predicted next UID.")
                .with_code(ResponseCode::UidNext(view.uidnext)),
        ));

        view.clear_recent();
        self.view = Some(view);
        self.state = State::Selected;

        let readwrite_code = if read_only {
            ResponseCode::ReadOnly
        } else {
            ResponseCode::ReadWrite
        };
        lines.push(Response::Status(
            StatusLine::untagged(Status::Ok, "[]").with_code(readwrite_code),
        ));
        Ok(lines)
    }

    fn list(&mut self, reference: &str, pattern: &str, lsub: bool) -> ImapResult<Vec<Response>> {
        let user = self.require_user()?.to_owned();
        if pattern.is_empty() {
            return Ok(vec![Response::Data(Data::List {
                attributes: vec![MailboxAttribute::Noselect],
                delimiter: MailboxName::DELIMITER,
                mailbox: String::new(),
                lsub,
            })]);
        }
        let listings = self.repo.list_mailboxes(&user)?;
        let full_pattern = format!("{reference}{pattern}");
        let matcher = wildcard_to_matcher(&full_pattern);

        Ok(listings
            .into_iter()
            .filter(|listing| !lsub || listing.subscribed)
            .filter(|listing| matcher(listing.name.as_str()))
            .map(|listing| {
                let mut attributes = Vec::new();
                if listing.has_children {
                    attributes.push(MailboxAttribute::HasChildren);
                } else {
                    attributes.push(MailboxAttribute::HasNoChildren);
                }
                Response::Data(Data::List {
                    attributes,
                    delimiter: MailboxName::DELIMITER,
                    mailbox: listing.name.as_str().to_owned(),
                    lsub,
                })
            })
            .collect())
    }

    fn status(
        &mut self,
        mailbox: MailboxName,
        items: Vec<crate::types::StatusItem>,
    ) -> ImapResult<Vec<Response>> {
        let user = self.require_user()?.to_owned();
        let snapshot = self.repo.snapshot(&user, &mailbox)?;
        let view = MailboxView::from_snapshot(mailbox.clone(), snapshot, true);

        let rendered = items
            .iter()
            .map(|item| {
                let (name, value) = match item {
                    crate::types::StatusItem::Messages => ("MESSAGES", view.exists()),
                    crate::types::StatusItem::Recent => ("RECENT", view.recent()),
                    crate::types::StatusItem::UidNext => ("UIDNEXT", view.uidnext),
                    crate::types::StatusItem::UidValidity => ("UIDVALIDITY", view.uidvalidity),
                    crate::types::StatusItem::Unseen => {
                        ("UNSEEN", view.first_unseen_seq().unwrap_or(0))
                    }
                };
                (name.to_owned(), value)
            })
            .collect();

        Ok(vec![Response::Data(Data::Status {
            mailbox: mailbox.as_str().to_owned(),
            items: rendered,
        })])
    }

    fn search(
        &mut self,
        uid: bool,
        charset: Option<String>,
        key: SearchKey,
    ) -> ImapResult<Vec<Response>> {
        if let Some(charset) = &charset {
            if !charset.eq_ignore_ascii_case("US-ASCII") && !charset.eq_ignore_ascii_case("UTF-8") {
                return Err(ImapError::no_code(
                    format!("Unsupported CHARSET {charset}"),
                    ResponseCode::BadCharset(vec!["US-ASCII".to_owned(), "UTF-8".to_owned()]),
                ));
            }
        }
        let user = self.require_user()?.to_owned();
        let repo = self.repo.clone();
        let view = self.require_view()?;
        let all_seqs = view.all_seqs();
        let all_uids = view.all_uids();

        let mut hits = Vec::new();
        for entry in view.entries().to_vec() {
            let seq = view
                .seq_of_uid(entry.uid.0)
                .ok_or_else(|| ImapError::server_bug("entry missing from its own view"))?;
            let message = repo.load_message(&user, entry.message_id)?;
            let ctx = SearchContext {
                seq,
                uid: entry.uid.0,
                flags: &entry.flags,
                internal_date: entry.internal_date,
                size_octets: message.size_octets(),
                message: &message,
            };
            if evaluate(&key, &ctx, &all_seqs, &all_uids) {
                hits.push(if uid { entry.uid.0 } else { seq });
            }
        }
        hits.sort_unstable();
        Ok(vec![Response::Data(Data::Search(hits))])
    }

    fn store(
        &mut self,
        uid: bool,
        set: crate::types::SeqSet,
        kind: StoreKind,
        silent: bool,
        flags: Vec<crate::types::Flag>,
    ) -> ImapResult<Vec<Response>> {
        let user = self.require_user()?.to_owned();
        let repo = self.repo.clone();
        let view = self.require_view()?;
        let outcome = store::handle_store(view, repo.as_ref(), &user, &set, kind, silent, &flags, uid)?;
        Ok(outcome.updates.into_iter().map(Response::Data).collect())
    }

    /// Untagged updates a real server would also send on any command while
    /// `Selected` (new `EXISTS`/`EXPUNGE`/flag changes from other sessions
    /// sharing the same repository). NOOP is the one command that reports
    /// these without requiring an otherwise-pointless mailbox operation.
    fn pending_updates(&mut self) -> ImapResult<Vec<Response>> {
        let Some(user) = self.user.clone() else {
            return Ok(Vec::new());
        };
        match &mut self.view {
            Some(view) => Ok(idle::diff_against_snapshot(view, self.repo.as_ref(), &user)?
                .into_iter()
                .map(Response::Data)
                .collect()),
            None => Ok(Vec::new()),
        }
    }

    /// Poll the repository for changes to the selected mailbox and return
    /// the untagged notifications they produce (spec §4.9's IDLE loop). The
    /// connection driver calls this on its own timer (`idle::POLL_INTERVAL`
    /// is a reasonable default) while `self.idling` is set, and stops on
    /// `DONE`.
    pub fn idle_updates(&mut self) -> ImapResult<Vec<Response>> {
        let user = self.require_user()?.to_owned();
        let repo = self.repo.clone();
        let view = self.require_view()?;
        Ok(idle::diff_against_snapshot(view, repo.as_ref(), &user)?
            .into_iter()
            .map(Response::Data)
            .collect())
    }
}

fn status_word(err: &ImapError) -> Status {
    match err.status_word() {
        "BAD" => Status::Bad,
        "BYE" => Status::Bye,
        _ => Status::No,
    }
}

/// Translate an IMAP mailbox-name wildcard pattern (`%` = any run of chars
/// except the hierarchy delimiter, `*` = any run of chars including it)
/// into a matcher closure.
fn wildcard_to_matcher(pattern: &str) -> impl Fn(&str) -> bool {
    let pattern = pattern.to_owned();
    move |candidate: &str| -> bool { wildcard_match(&pattern, candidate) }
}

fn wildcard_match(pattern: &str, candidate: &str) -> bool {
    fn helper(pat: &[char], cand: &[char]) -> bool {
        match pat.first() {
            None => cand.is_empty(),
            Some('*') => {
                (0..=cand.len()).any(|split| helper(&pat[1..], &cand[split..]))
            }
            Some('%') => (0..=cand.len())
                .take_while(|&split| !cand[..split].contains(&MailboxName::DELIMITER))
                .any(|split| helper(&pat[1..], &cand[split..])),
            Some(c) => cand.first() == Some(c) && helper(&pat[1..], &cand[1..]),
        }
    }
    helper(
        &pattern.chars().collect::<Vec<_>>(),
        &candidate.chars().collect::<Vec<_>>(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticAuthenticator;
    use crate::repository::InMemoryRepository;

    fn session() -> Session {
        let repo = InMemoryRepository::new();
        repo.provision_user("alice");
        let auth = StaticAuthenticator::new([("alice".to_owned(), "secret".to_owned())]);
        let mut session = Session::new(Arc::new(auth), Arc::new(repo));
        session.mark_tls_active();
        session
    }

    #[test]
    fn login_without_tls_is_privacy_required() {
        let repo = InMemoryRepository::new();
        repo.provision_user("alice");
        let auth = StaticAuthenticator::new([("alice".to_owned(), "secret".to_owned())]);
        let mut session = Session::new(Arc::new(auth), Arc::new(repo));
        let responses = session.handle(Command {
            tag: Tag("a1".to_owned()),
            body: CommandBody::Login {
                user: "alice".to_owned(),
                password: b"secret".to_vec(),
            },
        });
        match &responses[0] {
            Response::Status(status) => {
                assert_eq!(status.status, Status::No);
                assert_eq!(status.code, Some(ResponseCode::PrivacyRequired));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn login_then_select_moves_through_states() {
        let mut session = session();
        let responses = session.handle(Command {
            tag: Tag("a1".to_owned()),
            body: CommandBody::Login {
                user: "alice".to_owned(),
                password: b"secret".to_vec(),
            },
        });
        assert_eq!(session.state, State::Authenticated);
        assert!(matches!(responses.last(), Some(Response::Status(s)) if s.status == Status::Ok));

        let responses = session.handle(Command {
            tag: Tag("a2".to_owned()),
            body: CommandBody::Select {
                mailbox: MailboxName::inbox(),
            },
        });
        assert_eq!(session.state, State::Selected);
        assert!(responses.iter().any(|r| matches!(r, Response::Data(Data::Exists(_)))));
    }

    #[test]
    fn commands_requiring_auth_fail_before_login() {
        let mut session = session();
        let responses = session.handle(Command {
            tag: Tag("a1".to_owned()),
            body: CommandBody::Select {
                mailbox: MailboxName::inbox(),
            },
        });
        match &responses[0] {
            Response::Status(status) => assert_eq!(status.status, Status::No),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn wildcard_percent_does_not_cross_delimiter() {
        assert!(wildcard_match("INBOX/%", "INBOX/Work"));
        assert!(!wildcard_match("INBOX/%", "INBOX/Work/Sub"));
        assert!(wildcard_match("INBOX/*", "INBOX/Work/Sub"));
    }

    #[test]
    fn search_rejects_unsupported_charset() {
        let mut session = session();
        session.handle(Command {
            tag: Tag("a1".to_owned()),
            body: CommandBody::Login {
                user: "alice".to_owned(),
                password: b"secret".to_owned().to_vec(),
            },
        });
        session.handle(Command {
            tag: Tag("a2".to_owned()),
            body: CommandBody::Select {
                mailbox: MailboxName::inbox(),
            },
        });
        let responses = session.handle(Command {
            tag: Tag("a3".to_owned()),
            body: CommandBody::Search {
                uid: false,
                charset: Some("ISO-8859-1".to_owned()),
                key: SearchKey::All,
            },
        });
        match &responses[0] {
            Response::Status(status) => {
                assert_eq!(status.status, Status::No);
                assert!(matches!(status.code, Some(ResponseCode::BadCharset(_))));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn check_requires_selected_mailbox() {
        let mut session = session();
        session.handle(Command {
            tag: Tag("a1".to_owned()),
            body: CommandBody::Login {
                user: "alice".to_owned(),
                password: b"secret".to_vec(),
            },
        });
        let responses = session.handle(Command {
            tag: Tag("a2".to_owned()),
            body: CommandBody::Check,
        });
        match &responses[0] {
            Response::Status(status) => assert_eq!(status.status, Status::No),
            other => panic!("unexpected {other:?}"),
        }

        session.handle(Command {
            tag: Tag("a3".to_owned()),
            body: CommandBody::Select {
                mailbox: MailboxName::inbox(),
            },
        });
        let responses = session.handle(Command {
            tag: Tag("a4".to_owned()),
            body: CommandBody::Check,
        });
        assert!(matches!(responses[0], Response::Status(ref s) if s.status == Status::Ok));
    }

    #[test]
    fn unselect_requires_selected_mailbox() {
        let mut session = session();
        session.handle(Command {
            tag: Tag("a1".to_owned()),
            body: CommandBody::Login {
                user: "alice".to_owned(),
                password: b"secret".to_vec(),
            },
        });
        let responses = session.handle(Command {
            tag: Tag("a2".to_owned()),
            body: CommandBody::Unselect,
        });
        match &responses[0] {
            Response::Status(status) => assert_eq!(status.status, Status::No),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn starttls_rejected_outside_not_authenticated() {
        let mut session = session();
        session.handle(Command {
            tag: Tag("a1".to_owned()),
            body: CommandBody::Login {
                user: "alice".to_owned(),
                password: b"secret".to_vec(),
            },
        });
        let responses = session.handle(Command {
            tag: Tag("a2".to_owned()),
            body: CommandBody::StartTls,
        });
        match &responses[0] {
            Response::Status(status) => assert_eq!(status.status, Status::Bad),
            other => panic!("unexpected {other:?}"),
        }
    }
}
