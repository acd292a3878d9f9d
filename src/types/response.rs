//! Untagged (`*`), continuation (`+`), and tagged status-line responses.
//!
//! Rendering returns raw bytes rather than a joined `&str` tuple the way
//! [`crate::codec::writer::encode_line`] does, because a FETCH response can
//! carry a literal-framed payload (`RFC822`, `BODY[section]`) spliced into
//! the middle of an otherwise textual line.

use crate::error::ResponseCode;
use crate::types::Tag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    No,
    Bad,
    PreAuth,
    Bye,
}

impl Status {
    pub fn word(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::No => "NO",
            Status::Bad => "BAD",
            Status::PreAuth => "PREAUTH",
            Status::Bye => "BYE",
        }
    }
}

/// One FETCH data-item value, already rendered to its wire form except for
/// raw-octet payloads, which are literal-framed at render time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttributeValue {
    Flags(Vec<String>),
    InternalDate(String),
    Rfc822Size(u32),
    Envelope(String),
    Uid(u32),
    BodyStructure(String),
    Body(String),
    /// `section` is the bracketed label as echoed back, e.g. `TEXT` or
    /// `1.2.HEADER`; `partial_origin` is the `<N>` prefix on a partial fetch.
    BodySection {
        section: String,
        partial_origin: Option<u32>,
        data: Vec<u8>,
    },
    Rfc822(Vec<u8>),
    Rfc822Header(Vec<u8>),
    Rfc822Text(Vec<u8>),
}

impl FetchAttributeValue {
    fn render_into(&self, out: &mut Vec<u8>) {
        match self {
            FetchAttributeValue::Flags(flags) => {
                out.extend_from_slice(format!("FLAGS ({})", flags.join(" ")).as_bytes());
            }
            FetchAttributeValue::InternalDate(date) => {
                out.extend_from_slice(format!("INTERNALDATE {date:?}").as_bytes());
            }
            FetchAttributeValue::Rfc822Size(size) => {
                out.extend_from_slice(format!("RFC822.SIZE {size}").as_bytes());
            }
            FetchAttributeValue::Envelope(rendered) => {
                out.extend_from_slice(format!("ENVELOPE {rendered}").as_bytes());
            }
            FetchAttributeValue::Uid(uid) => {
                out.extend_from_slice(format!("UID {uid}").as_bytes());
            }
            FetchAttributeValue::BodyStructure(rendered) => {
                out.extend_from_slice(format!("BODYSTRUCTURE {rendered}").as_bytes());
            }
            FetchAttributeValue::Body(rendered) => {
                out.extend_from_slice(format!("BODY {rendered}").as_bytes());
            }
            FetchAttributeValue::BodySection {
                section,
                partial_origin,
                data,
            } => {
                out.extend_from_slice(format!("BODY[{section}]").as_bytes());
                if let Some(origin) = partial_origin {
                    out.extend_from_slice(format!("<{origin}>").as_bytes());
                }
                out.push(b' ');
                append_literal(out, data);
            }
            FetchAttributeValue::Rfc822(data) => {
                out.extend_from_slice(b"RFC822 ");
                append_literal(out, data);
            }
            FetchAttributeValue::Rfc822Header(data) => {
                out.extend_from_slice(b"RFC822.HEADER ");
                append_literal(out, data);
            }
            FetchAttributeValue::Rfc822Text(data) => {
                out.extend_from_slice(b"RFC822.TEXT ");
                append_literal(out, data);
            }
        }
    }
}

fn append_literal(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(format!("{{{}}}\r\n", data.len()).as_bytes());
    out.extend_from_slice(data);
}

/// A mailbox flag declared in a LIST/LSUB response, e.g. `\Noselect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailboxAttribute {
    Noselect,
    Noinferiors,
    HasChildren,
    HasNoChildren,
    Marked,
    Unmarked,
}

impl MailboxAttribute {
    fn render(&self) -> &'static str {
        match self {
            MailboxAttribute::Noselect => "\\Noselect",
            MailboxAttribute::Noinferiors => "\\Noinferiors",
            MailboxAttribute::HasChildren => "\\HasChildren",
            MailboxAttribute::HasNoChildren => "\\HasNoChildren",
            MailboxAttribute::Marked => "\\Marked",
            MailboxAttribute::Unmarked => "\\Unmarked",
        }
    }
}

/// One namespace entry: `(prefix delimiter)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceEntry {
    pub prefix: String,
    pub delimiter: char,
}

/// Untagged `*`-prefixed server data (RFC 3501 §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Data {
    Capability(Vec<String>),
    List {
        attributes: Vec<MailboxAttribute>,
        delimiter: char,
        mailbox: String,
        lsub: bool,
    },
    Flags(Vec<String>),
    Exists(u32),
    Recent(u32),
    Expunge(u32),
    Fetch {
        seq: u32,
        attributes: Vec<FetchAttributeValue>,
    },
    Search(Vec<u32>),
    Status {
        mailbox: String,
        items: Vec<(String, u32)>,
    },
    Namespace {
        personal: Vec<NamespaceEntry>,
        other_users: Vec<NamespaceEntry>,
        shared: Vec<NamespaceEntry>,
    },
}

impl Data {
    pub fn render(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"* ");
        match self {
            Data::Capability(caps) => {
                out.extend_from_slice(format!("CAPABILITY {}", caps.join(" ")).as_bytes());
            }
            Data::List {
                attributes,
                delimiter,
                mailbox,
                lsub,
            } => {
                let name = if *lsub { "LSUB" } else { "LIST" };
                let attrs: Vec<&str> = attributes.iter().map(|a| a.render()).collect();
                out.extend_from_slice(
                    format!(
                        "{name} ({}) {:?} {:?}",
                        attrs.join(" "),
                        delimiter.to_string(),
                        mailbox
                    )
                    .as_bytes(),
                );
            }
            Data::Flags(flags) => {
                out.extend_from_slice(format!("FLAGS ({})", flags.join(" ")).as_bytes());
            }
            Data::Exists(n) => out.extend_from_slice(format!("{n} EXISTS").as_bytes()),
            Data::Recent(n) => out.extend_from_slice(format!("{n} RECENT").as_bytes()),
            Data::Expunge(n) => out.extend_from_slice(format!("{n} EXPUNGE").as_bytes()),
            Data::Fetch { seq, attributes } => {
                out.extend_from_slice(format!("{seq} FETCH (").as_bytes());
                for (i, attr) in attributes.iter().enumerate() {
                    if i > 0 {
                        out.push(b' ');
                    }
                    attr.render_into(&mut out);
                }
                out.push(b')');
            }
            Data::Search(nums) => {
                let rendered: Vec<String> = nums.iter().map(u32::to_string).collect();
                out.extend_from_slice(format!("SEARCH {}", rendered.join(" ")).as_bytes());
            }
            Data::Status { mailbox, items } => {
                let rendered: Vec<String> = items
                    .iter()
                    .flat_map(|(k, v)| [k.clone(), v.to_string()])
                    .collect();
                out.extend_from_slice(
                    format!("STATUS {mailbox:?} ({})", rendered.join(" ")).as_bytes(),
                );
            }
            Data::Namespace {
                personal,
                other_users,
                shared,
            } => {
                out.extend_from_slice(b"NAMESPACE ");
                out.extend_from_slice(render_namespace_group(personal).as_bytes());
                out.push(b' ');
                out.extend_from_slice(render_namespace_group(other_users).as_bytes());
                out.push(b' ');
                out.extend_from_slice(render_namespace_group(shared).as_bytes());
            }
        }
        out
    }
}

fn render_namespace_group(entries: &[NamespaceEntry]) -> String {
    if entries.is_empty() {
        return "NIL".to_owned();
    }
    let rendered: Vec<String> = entries
        .iter()
        .map(|e| format!("({:?} {:?})", e.prefix, e.delimiter.to_string()))
        .collect();
    format!("({})", rendered.join(""))
}

/// A tagged or untagged status-line completion, e.g. `A1 OK LOGIN completed.`
/// or `* OK [UIDVALIDITY 1] INBOX`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub tag: Option<Tag>,
    pub status: Status,
    pub code: Option<ResponseCode>,
    pub text: String,
}

impl StatusLine {
    pub fn tagged(tag: Tag, status: Status, text: impl Into<String>) -> Self {
        Self {
            tag: Some(tag),
            status,
            code: None,
            text: text.into(),
        }
    }

    pub fn untagged(status: Status, text: impl Into<String>) -> Self {
        Self {
            tag: None,
            status,
            code: None,
            text: text.into(),
        }
    }

    pub fn with_code(mut self, code: ResponseCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn render(&self) -> Vec<u8> {
        let tag_str = self
            .tag
            .as_ref()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "*".to_owned());
        let mut line = format!("{tag_str} {}", self.status.word());
        if let Some(code) = &self.code {
            line.push(' ');
            line.push_str(&code.render());
        }
        line.push(' ');
        line.push_str(&self.text);
        line.into_bytes()
    }
}

/// Top-level response: either a `+` continuation prompt, untagged server
/// data, or a status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Continuation(String),
    Data(Data),
    Status(StatusLine),
}

impl Response {
    /// Render the complete CRLF-terminated wire bytes.
    pub fn render(&self) -> Vec<u8> {
        let mut out = match self {
            Response::Continuation(text) => format!("+ {text}").into_bytes(),
            Response::Data(data) => data.render(),
            Response::Status(status) => status.render(),
        };
        out.extend_from_slice(b"\r\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_tagged_ok_with_code() {
        let line = StatusLine::tagged(Tag("A1".to_owned()), Status::Ok, "LOGIN completed.")
            .with_code(ResponseCode::Capability(vec!["IMAP4rev1".to_owned()]));
        let rendered = String::from_utf8(Response::Status(line).render()).unwrap();
        assert_eq!(rendered, "A1 OK [CAPABILITY IMAP4rev1] LOGIN completed.\r\n");
    }

    #[test]
    fn renders_untagged_exists() {
        let rendered = Response::Data(Data::Exists(23)).render();
        assert_eq!(rendered, b"* 23 EXISTS\r\n");
    }

    #[test]
    fn fetch_body_section_is_literal_framed() {
        let data = Data::Fetch {
            seq: 1,
            attributes: vec![FetchAttributeValue::BodySection {
                section: "TEXT".to_owned(),
                partial_origin: None,
                data: b"hi".to_vec(),
            }],
        };
        let rendered = data.render();
        assert_eq!(rendered, b"* 1 FETCH (BODY[TEXT] {2}\r\nhi)");
    }

    #[test]
    fn continuation_has_no_tag() {
        let rendered = Response::Continuation("Ready for literal data".to_owned()).render();
        assert_eq!(rendered, b"+ Ready for literal data\r\n");
    }
}
