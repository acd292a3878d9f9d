//! Commands as a tagged variant with parsed arguments as associated data
//! (spec §9 design note: avoid open-ended polymorphism — the state
//! machine's guard is a match over `(state, command-tag)`).

use chrono::{DateTime, FixedOffset};
use nom::bytes::complete::take_while1;

use super::{Flag, MailboxName, SeqSet, Tag};
use crate::error::{ImapError, ImapResult};
use crate::tokenizer::{mailbox_name_from_token, Token, Tokenizer};

/// `tag = 1*<any ASTRING-CHAR except "+">`, approximated here as any run
/// of non-space, non-CRLF bytes — the same shape as the upstream
/// `core::tag_imap` combinator.
fn command_tag(input: &[u8]) -> nom::IResult<&[u8], &[u8]> {
    take_while1(|b| b != b' ' && b != b'\r' && b != b'\n')(input)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKind {
    Replace,
    Plus,
    Minus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItem {
    Flags,
    InternalDate,
    Rfc822Size,
    Envelope,
    Uid,
    Rfc822,
    Rfc822Header,
    Rfc822Text,
    BodyStructure,
    Body,
    BodySection {
        peek: bool,
        section: String,
        partial: Option<(u32, u32)>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchKey {
    All,
    Answered,
    Unanswered,
    Deleted,
    Undeleted,
    Draft,
    Undraft,
    Flagged,
    Unflagged,
    Seen,
    Unseen,
    New,
    Old,
    Recent,
    Header(String, String),
    Bcc(String),
    Cc(String),
    From(String),
    Subject(String),
    To(String),
    Body(String),
    Text(String),
    Keyword(String),
    Unkeyword(String),
    Larger(u32),
    Smaller(u32),
    Before(String),
    On(String),
    Since(String),
    SentBefore(String),
    SentOn(String),
    SentSince(String),
    SequenceSet(SeqSet),
    Uid(SeqSet),
    And(Vec<SearchKey>),
    Or(Box<SearchKey>, Box<SearchKey>),
    Not(Box<SearchKey>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusItem {
    Messages,
    Recent,
    UidNext,
    UidValidity,
    Unseen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandBody {
    Capability,
    Noop,
    Logout,
    StartTls,
    Authenticate {
        mechanism: String,
        initial_response: Option<Vec<u8>>,
    },
    Login {
        user: String,
        password: Vec<u8>,
    },
    Select {
        mailbox: MailboxName,
    },
    Examine {
        mailbox: MailboxName,
    },
    Create {
        mailbox: MailboxName,
    },
    Delete {
        mailbox: MailboxName,
    },
    Rename {
        from: MailboxName,
        to: MailboxName,
    },
    Subscribe {
        mailbox: MailboxName,
    },
    Unsubscribe {
        mailbox: MailboxName,
    },
    List {
        reference: String,
        pattern: String,
        lsub: bool,
    },
    Status {
        mailbox: MailboxName,
        items: Vec<StatusItem>,
    },
    Append {
        mailbox: MailboxName,
        flags: Vec<Flag>,
        date: Option<DateTime<FixedOffset>>,
        data: Vec<u8>,
    },
    Namespace,
    Idle,
    IdleDone,
    Check,
    Close,
    Unselect,
    Expunge,
    UidExpunge {
        set: SeqSet,
    },
    Search {
        uid: bool,
        charset: Option<String>,
        key: SearchKey,
    },
    Fetch {
        uid: bool,
        set: SeqSet,
        items: Vec<FetchItem>,
    },
    Store {
        uid: bool,
        set: SeqSet,
        kind: StoreKind,
        silent: bool,
        flags: Vec<Flag>,
    },
    Copy {
        uid: bool,
        set: SeqSet,
        mailbox: MailboxName,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub tag: Tag,
    pub body: CommandBody,
}

impl CommandBody {
    pub fn name(&self) -> &'static str {
        match self {
            CommandBody::Capability => "CAPABILITY",
            CommandBody::Noop => "NOOP",
            CommandBody::Logout => "LOGOUT",
            CommandBody::StartTls => "STARTTLS",
            CommandBody::Authenticate { .. } => "AUTHENTICATE",
            CommandBody::Login { .. } => "LOGIN",
            CommandBody::Select { .. } => "SELECT",
            CommandBody::Examine { .. } => "EXAMINE",
            CommandBody::Create { .. } => "CREATE",
            CommandBody::Delete { .. } => "DELETE",
            CommandBody::Rename { .. } => "RENAME",
            CommandBody::Subscribe { .. } => "SUBSCRIBE",
            CommandBody::Unsubscribe { .. } => "UNSUBSCRIBE",
            CommandBody::List { lsub: false, .. } => "LIST",
            CommandBody::List { lsub: true, .. } => "LSUB",
            CommandBody::Status { .. } => "STATUS",
            CommandBody::Append { .. } => "APPEND",
            CommandBody::Namespace => "NAMESPACE",
            CommandBody::Idle => "IDLE",
            CommandBody::IdleDone => "DONE",
            CommandBody::Check => "CHECK",
            CommandBody::Close => "CLOSE",
            CommandBody::Unselect => "UNSELECT",
            CommandBody::Expunge => "EXPUNGE",
            CommandBody::UidExpunge { .. } => "UID EXPUNGE",
            CommandBody::Search { uid: false, .. } => "SEARCH",
            CommandBody::Search { uid: true, .. } => "UID SEARCH",
            CommandBody::Fetch { uid: false, .. } => "FETCH",
            CommandBody::Fetch { uid: true, .. } => "UID FETCH",
            CommandBody::Store { uid: false, .. } => "STORE",
            CommandBody::Store { uid: true, .. } => "UID STORE",
            CommandBody::Copy { uid: false, .. } => "COPY",
            CommandBody::Copy { uid: true, .. } => "UID COPY",
        }
    }
}

/// Parse a tag + command body out of a [`RawCommand`](crate::codec::RawCommand)'s
/// line bytes and associated literals.
pub fn parse_command(line: &[u8], literals: &[Vec<u8>]) -> ImapResult<Command> {
    let (rest, tag_bytes) = command_tag(line).map_err(|_| ImapError::bad("Missing tag"))?;
    let tag_str = std::str::from_utf8(tag_bytes).map_err(|_| ImapError::bad("Command is not valid UTF-8"))?;
    let tag = Tag(tag_str.to_owned());
    let rest = rest.strip_prefix(b" ".as_slice()).unwrap_or(rest);

    let mut tokenizer = Tokenizer::new(rest, literals);
    let command_word_tok = tokenizer.next_token().map_err(|e| e)?;
    let command_word = command_word_tok
        .as_str()
        .ok_or_else(|| ImapError::bad("Missing command name"))?
        .to_ascii_uppercase();

    let body = match command_word.as_str() {
        "CAPABILITY" => CommandBody::Capability,
        "NOOP" => CommandBody::Noop,
        "LOGOUT" => CommandBody::Logout,
        "STARTTLS" => CommandBody::StartTls,
        "CHECK" => CommandBody::Check,
        "CLOSE" => CommandBody::Close,
        "UNSELECT" => CommandBody::Unselect,
        "EXPUNGE" => CommandBody::Expunge,
        "NAMESPACE" => CommandBody::Namespace,
        "IDLE" => CommandBody::Idle,
        "DONE" => CommandBody::IdleDone,
        "AUTHENTICATE" => {
            let mechanism = expect_atom(&mut tokenizer)?.to_ascii_uppercase();
            CommandBody::Authenticate {
                mechanism,
                initial_response: None,
            }
        }
        "LOGIN" => {
            let user = expect_string(&mut tokenizer)?;
            let password = expect_string(&mut tokenizer)?.into_bytes();
            CommandBody::Login { user, password }
        }
        "SELECT" => CommandBody::Select {
            mailbox: expect_mailbox(&mut tokenizer)?,
        },
        "EXAMINE" => CommandBody::Examine {
            mailbox: expect_mailbox(&mut tokenizer)?,
        },
        "CREATE" => CommandBody::Create {
            mailbox: expect_mailbox(&mut tokenizer)?,
        },
        "DELETE" => CommandBody::Delete {
            mailbox: expect_mailbox(&mut tokenizer)?,
        },
        "RENAME" => {
            let from = expect_mailbox(&mut tokenizer)?;
            let to = expect_mailbox(&mut tokenizer)?;
            CommandBody::Rename { from, to }
        }
        "SUBSCRIBE" => CommandBody::Subscribe {
            mailbox: expect_mailbox(&mut tokenizer)?,
        },
        "UNSUBSCRIBE" => CommandBody::Unsubscribe {
            mailbox: expect_mailbox(&mut tokenizer)?,
        },
        "LIST" | "LSUB" => {
            let reference = expect_string(&mut tokenizer)?;
            let pattern = expect_string(&mut tokenizer)?;
            CommandBody::List {
                reference,
                pattern,
                lsub: command_word == "LSUB",
            }
        }
        "STATUS" => {
            let mailbox = expect_mailbox(&mut tokenizer)?;
            let list_tok = tokenizer.next_token()?;
            let items = list_tok
                .as_list()
                .ok_or_else(|| ImapError::bad("STATUS requires a parenthesised item list"))?
                .iter()
                .map(parse_status_item)
                .collect::<ImapResult<Vec<_>>>()?;
            CommandBody::Status { mailbox, items }
        }
        "APPEND" => parse_append(&mut tokenizer)?,
        "UID" => return parse_uid_command(&mut tokenizer, tag),
        "SEARCH" => parse_search(&mut tokenizer, false)?,
        "FETCH" => parse_fetch(&mut tokenizer, false)?,
        "STORE" => parse_store(&mut tokenizer, false)?,
        "COPY" => parse_copy(&mut tokenizer, false)?,
        other => return Err(ImapError::bad(format!("Unknown command {other}"))),
    };

    Ok(Command { tag, body })
}

/// Peek the tag and destination mailbox out of an `APPEND`'s line-so-far,
/// i.e. everything the wire codec has accumulated up to (not including) a
/// synchronising literal marker it has not yet acknowledged. Returns `None`
/// for anything other than a well-formed `tag APPEND mailbox ...{N}`
/// prefix; a parse failure here just means the driver falls back to
/// acknowledging the literal and letting the fully-assembled command fail
/// normally once read.
///
/// Used by the connection driver to answer `NO [TRYCREATE]` for an `APPEND`
/// to a nonexistent mailbox *before* sending `+ Ready for literal data`
/// (spec §4.7, tested by S4): the client must never be told to send literal
/// octets the server already knows it will reject.
pub fn peek_append_mailbox(line_so_far: &[u8]) -> Option<(Tag, MailboxName)> {
    let (rest, tag_bytes) = command_tag(line_so_far).ok()?;
    let tag_str = std::str::from_utf8(tag_bytes).ok()?;
    let rest = rest.strip_prefix(b" ".as_slice()).unwrap_or(rest);

    let mut tokenizer = Tokenizer::new(rest, &[]);
    let command_word = tokenizer.next_token().ok()?;
    if !command_word
        .as_str()
        .is_some_and(|s| s.eq_ignore_ascii_case("APPEND"))
    {
        return None;
    }
    let mailbox_tok = tokenizer.next_token().ok()?;
    let mailbox = mailbox_name_from_token(&mailbox_tok).ok()?;
    Some((Tag(tag_str.to_owned()), mailbox))
}

fn parse_uid_command(tokenizer: &mut Tokenizer, tag: Tag) -> ImapResult<Command> {
    let sub = expect_atom(tokenizer)?.to_ascii_uppercase();
    let body = match sub.as_str() {
        "SEARCH" => parse_search(tokenizer, true)?,
        "FETCH" => parse_fetch(tokenizer, true)?,
        "STORE" => parse_store(tokenizer, true)?,
        "COPY" => parse_copy(tokenizer, true)?,
        "EXPUNGE" => {
            let set = expect_seq_set(tokenizer)?;
            CommandBody::UidExpunge { set }
        }
        other => return Err(ImapError::bad(format!("Unknown UID subcommand {other}"))),
    };
    Ok(Command { tag, body })
}

fn parse_status_item(token: &Token) -> ImapResult<StatusItem> {
    let name = token
        .as_str()
        .ok_or_else(|| ImapError::bad("Invalid STATUS item"))?
        .to_ascii_uppercase();
    Ok(match name.as_str() {
        "MESSAGES" => StatusItem::Messages,
        "RECENT" => StatusItem::Recent,
        "UIDNEXT" => StatusItem::UidNext,
        "UIDVALIDITY" => StatusItem::UidValidity,
        "UNSEEN" => StatusItem::Unseen,
        other => return Err(ImapError::bad(format!("Unknown STATUS item {other}"))),
    })
}

fn parse_append(tokenizer: &mut Tokenizer) -> ImapResult<CommandBody> {
    let mailbox = expect_mailbox(tokenizer)?;
    let mut flags = Vec::new();
    let mut date = None;

    if !tokenizer.at_end() {
        let tok = tokenizer.next_token()?;
        if let Some(list) = tok.as_list() {
            flags = list
                .iter()
                .filter_map(|t| t.as_str().map(Flag::parse))
                .collect();
            flags = crate::types::FlagSet::strip_recent_from_client_input(flags);
            if !tokenizer.at_end() {
                let date_tok = tokenizer.next_token()?;
                date = date_tok
                    .as_str()
                    .and_then(crate::types::datetime::parse_internal_date);
            }
        } else if let Some(s) = tok.as_str() {
            date = crate::types::datetime::parse_internal_date(s);
        }
    }

    let literal_tok = tokenizer.next_token()?;
    let data = literal_tok
        .as_bytes()
        .ok_or_else(|| ImapError::bad("APPEND requires a message literal"))?
        .to_vec();

    Ok(CommandBody::Append {
        mailbox,
        flags,
        date,
        data,
    })
}

fn parse_search(tokenizer: &mut Tokenizer, uid: bool) -> ImapResult<CommandBody> {
    let charset = tokenizer.take_charset_prefix();
    let key = crate::search::parse_search_key_list(tokenizer.remaining())?;
    Ok(CommandBody::Search { uid, charset, key })
}

fn parse_fetch(tokenizer: &mut Tokenizer, uid: bool) -> ImapResult<CommandBody> {
    let set = expect_seq_set(tokenizer)?;
    let items_tok = tokenizer.next_token()?;
    let items = parse_fetch_items(&items_tok)?;
    Ok(CommandBody::Fetch { uid, set, items })
}

fn parse_fetch_items(tok: &Token) -> ImapResult<Vec<FetchItem>> {
    let raw_items: Vec<Token> = match tok.as_list() {
        Some(list) => list.to_vec(),
        None => vec![tok.clone()],
    };

    let mut out = Vec::new();
    for item in raw_items {
        let name = item
            .as_str()
            .ok_or_else(|| ImapError::bad("Invalid FETCH data item"))?;
        let upper = name.to_ascii_uppercase();
        match upper.as_str() {
            "ALL" => out.extend([
                FetchItem::Flags,
                FetchItem::InternalDate,
                FetchItem::Rfc822Size,
                FetchItem::Envelope,
            ]),
            "FAST" => out.extend([
                FetchItem::Flags,
                FetchItem::InternalDate,
                FetchItem::Rfc822Size,
            ]),
            "FULL" => out.extend([
                FetchItem::Flags,
                FetchItem::InternalDate,
                FetchItem::Rfc822Size,
                FetchItem::Envelope,
                FetchItem::Body,
            ]),
            "FLAGS" => out.push(FetchItem::Flags),
            "INTERNALDATE" => out.push(FetchItem::InternalDate),
            "RFC822.SIZE" => out.push(FetchItem::Rfc822Size),
            "ENVELOPE" => out.push(FetchItem::Envelope),
            "UID" => out.push(FetchItem::Uid),
            "RFC822" => out.push(FetchItem::Rfc822),
            "RFC822.HEADER" => out.push(FetchItem::Rfc822Header),
            "RFC822.TEXT" => out.push(FetchItem::Rfc822Text),
            "BODYSTRUCTURE" => out.push(FetchItem::BodyStructure),
            "BODY" => out.push(FetchItem::Body),
            other if other.starts_with("BODY[") || other.starts_with("BODY.PEEK[") => {
                out.push(parse_body_section(other)?);
            }
            other => return Err(ImapError::bad(format!("Unknown FETCH item {other}"))),
        }
    }
    Ok(out)
}

fn parse_body_section(raw: &str) -> ImapResult<FetchItem> {
    let peek = raw.starts_with("BODY.PEEK[");
    let open = raw.find('[').ok_or_else(|| ImapError::bad("Malformed BODY section"))?;
    let close = raw.find(']').ok_or_else(|| ImapError::bad("Malformed BODY section"))?;
    let section = raw[open + 1..close].to_owned();
    let partial = raw[close + 1..].strip_prefix('<').and_then(|rest| {
        let rest = rest.strip_suffix('>')?;
        let (start, len) = rest.split_once('.')?;
        Some((start.parse().ok()?, len.parse().ok()?))
    });
    Ok(FetchItem::BodySection {
        peek,
        section,
        partial,
    })
}

fn parse_store(tokenizer: &mut Tokenizer, uid: bool) -> ImapResult<CommandBody> {
    let set = expect_seq_set(tokenizer)?;
    let op = expect_atom(tokenizer)?.to_ascii_uppercase();
    let (kind, silent) = match op.as_str() {
        "FLAGS" => (StoreKind::Replace, false),
        "FLAGS.SILENT" => (StoreKind::Replace, true),
        "+FLAGS" => (StoreKind::Plus, false),
        "+FLAGS.SILENT" => (StoreKind::Plus, true),
        "-FLAGS" => (StoreKind::Minus, false),
        "-FLAGS.SILENT" => (StoreKind::Minus, true),
        other => return Err(ImapError::bad(format!("Unknown STORE operation {other}"))),
    };
    let flags_tok = tokenizer.next_token()?;
    let raw_flags: Vec<Token> = match flags_tok.as_list() {
        Some(list) => list.to_vec(),
        None => vec![flags_tok],
    };
    let flags: Vec<Flag> = raw_flags
        .iter()
        .filter_map(|t| t.as_str().map(Flag::parse))
        .collect();
    let flags = crate::types::FlagSet::strip_recent_from_client_input(flags);
    Ok(CommandBody::Store {
        uid,
        set,
        kind,
        silent,
        flags,
    })
}

fn parse_copy(tokenizer: &mut Tokenizer, uid: bool) -> ImapResult<CommandBody> {
    let set = expect_seq_set(tokenizer)?;
    let mailbox = expect_mailbox(tokenizer)?;
    Ok(CommandBody::Copy { uid, set, mailbox })
}

fn expect_atom(tokenizer: &mut Tokenizer) -> ImapResult<String> {
    let tok = tokenizer.next_token()?;
    tok.as_str()
        .map(str::to_owned)
        .ok_or_else(|| ImapError::bad("Expected an atom"))
}

fn expect_string(tokenizer: &mut Tokenizer) -> ImapResult<String> {
    expect_atom(tokenizer)
}

fn expect_mailbox(tokenizer: &mut Tokenizer) -> ImapResult<MailboxName> {
    let tok = tokenizer.next_token()?;
    mailbox_name_from_token(&tok)
}

fn expect_seq_set(tokenizer: &mut Tokenizer) -> ImapResult<SeqSet> {
    let tok = tokenizer.next_token()?;
    let raw = tok
        .as_str()
        .ok_or_else(|| ImapError::bad("Expected a sequence set"))?;
    SeqSet::parse(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_login() {
        let cmd = parse_command(b"a1 LOGIN alice secret", &[]).unwrap();
        assert_eq!(cmd.tag, Tag("a1".to_owned()));
        assert!(matches!(cmd.body, CommandBody::Login { ref user, .. } if user == "alice"));
    }

    #[test]
    fn peek_append_mailbox_reads_tag_and_destination_before_the_literal() {
        let (tag, mailbox) = peek_append_mailbox(b"a1 APPEND Nope {5}").unwrap();
        assert_eq!(tag, Tag("a1".to_owned()));
        assert_eq!(mailbox, MailboxName::new("Nope"));
    }

    #[test]
    fn peek_append_mailbox_ignores_non_append_commands() {
        assert!(peek_append_mailbox(b"a1 NOOP").is_none());
        assert!(peek_append_mailbox(b"a1 LOGIN alice secret").is_none());
    }

    #[test]
    fn parses_uid_fetch() {
        let cmd = parse_command(b"a2 UID FETCH 1:5 (FLAGS UID)", &[]).unwrap();
        match cmd.body {
            CommandBody::Fetch { uid, items, .. } => {
                assert!(uid);
                assert_eq!(items, vec![FetchItem::Flags, FetchItem::Uid]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_body_peek_section_with_partial() {
        let cmd = parse_command(b"a3 FETCH 1 BODY.PEEK[TEXT]<0.10>", &[]).unwrap();
        match cmd.body {
            CommandBody::Fetch { items, .. } => match &items[0] {
                FetchItem::BodySection {
                    peek,
                    section,
                    partial,
                } => {
                    assert!(peek);
                    assert_eq!(section, "TEXT");
                    assert_eq!(*partial, Some((0, 10)));
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_append_with_literal() {
        let cmd =
            parse_command(b"a4 APPEND INBOX (\\Seen) {5}", &[b"hello".to_vec()]).unwrap();
        match cmd.body {
            CommandBody::Append { data, flags, .. } => {
                assert_eq!(data, b"hello");
                assert_eq!(flags, vec![Flag::Seen]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
