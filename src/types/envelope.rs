//! The 10-tuple ENVELOPE structure (RFC 3501 §7.4.2).

use super::address::Address;
use crate::message::Message;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub date: Option<String>,
    pub subject: Option<String>,
    pub from: Vec<Address>,
    pub sender: Vec<Address>,
    pub reply_to: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub in_reply_to: Option<String>,
    pub message_id: Option<String>,
}

impl Envelope {
    pub fn from_message(message: &Message) -> Envelope {
        let header = |name: &str| message.header(name).map(str::to_owned);
        let addr_list = |name: &str| {
            message
                .header(name)
                .map(Address::parse_list)
                .unwrap_or_default()
        };

        let from = addr_list("From");
        // Missing sender/reply-to default to the From list per spec §4.5.
        let sender = {
            let explicit = addr_list("Sender");
            if explicit.is_empty() {
                from.clone()
            } else {
                explicit
            }
        };
        let reply_to = {
            let explicit = addr_list("Reply-To");
            if explicit.is_empty() {
                from.clone()
            } else {
                explicit
            }
        };

        Envelope {
            date: header("Date"),
            subject: header("Subject"),
            from,
            sender,
            reply_to,
            to: addr_list("To"),
            cc: addr_list("Cc"),
            bcc: addr_list("Bcc"),
            in_reply_to: header("In-Reply-To"),
            message_id: header("Message-ID"),
        }
    }

    /// Render as the wire-level parenthesised list, with `NIL` for absent
    /// fields.
    pub fn render(&self) -> String {
        fn nstring(value: &Option<String>) -> String {
            match value {
                Some(v) => format!("{:?}", v),
                None => "NIL".to_owned(),
            }
        }
        fn addr_list(addrs: &[Address]) -> String {
            if addrs.is_empty() {
                return "NIL".to_owned();
            }
            let rendered: Vec<String> = addrs
                .iter()
                .map(|a| {
                    format!(
                        "({} NIL {} {})",
                        a.personal_name
                            .as_ref()
                            .map(|n| format!("{n:?}"))
                            .unwrap_or_else(|| "NIL".to_owned()),
                        format!("{:?}", a.mailbox),
                        format!("{:?}", a.host),
                    )
                })
                .collect();
            format!("({})", rendered.join(" "))
        }

        format!(
            "({} {} {} {} {} {} {} {} {} {})",
            nstring(&self.date),
            nstring(&self.subject),
            addr_list(&self.from),
            addr_list(&self.sender),
            addr_list(&self.reply_to),
            addr_list(&self.to),
            addr_list(&self.cc),
            addr_list(&self.bcc),
            nstring(&self.in_reply_to),
            nstring(&self.message_id),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn sender_and_reply_to_default_to_from() {
        let raw = b"From: Alice <alice@example.com>\r\nSubject: hi\r\n\r\nbody\r\n".to_vec();
        let message = Message::parse(raw).unwrap();
        let envelope = Envelope::from_message(&message);
        assert_eq!(envelope.sender, envelope.from);
        assert_eq!(envelope.reply_to, envelope.from);
    }

    #[test]
    fn missing_fields_render_as_nil() {
        let raw = b"Subject: hi\r\n\r\nbody\r\n".to_vec();
        let message = Message::parse(raw).unwrap();
        let envelope = Envelope::from_message(&message);
        assert!(envelope.from.is_empty());
        assert!(envelope.render().contains("NIL NIL"));
    }
}
