//! `(personal-name SMTP-route mailbox host)` address tuples for ENVELOPE.
//!
//! Only the pragmatic subset of RFC 5322 address-list syntax needed for
//! ENVELOPE is implemented (spec §1 Non-goals): `Display Name <user@host>`,
//! bare `user@host`, and comma-separated lists. Group syntax is not parsed.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub personal_name: Option<String>,
    /// Always `NIL` on the wire; kept as a field for symmetry with the
    /// 4-tuple shape RFC 3501 specifies.
    pub smtp_route: Option<String>,
    pub mailbox: String,
    pub host: String,
}

impl Address {
    /// Parse a comma-separated address list header value into `Address`es.
    pub fn parse_list(value: &str) -> Vec<Address> {
        split_addresses(value)
            .iter()
            .filter_map(|part| Address::parse_one(part.trim()))
            .collect()
    }

    fn parse_one(part: &str) -> Option<Address> {
        if part.is_empty() {
            return None;
        }
        let (personal_name, rest) = if let Some(open) = part.find('<') {
            let name = part[..open].trim().trim_matches('"').trim();
            let close = part.find('>').unwrap_or(part.len());
            let inner = &part[open + 1..close.max(open + 1)];
            (
                if name.is_empty() {
                    None
                } else {
                    Some(name.to_owned())
                },
                inner.to_owned(),
            )
        } else {
            (None, part.to_owned())
        };

        let rest = rest.trim();
        let (mailbox, host) = match rest.split_once('@') {
            Some((m, h)) => (m.to_owned(), h.to_owned()),
            None => (rest.to_owned(), String::new()),
        };

        if mailbox.is_empty() {
            return None;
        }

        Some(Address {
            personal_name,
            smtp_route: None,
            mailbox,
            host,
        })
    }
}

/// Splits on top-level commas, respecting `<...>` and `"..."` nesting so
/// display names containing commas (`"Doe, Jane" <jane@example.com>`) are
/// not split in half.
fn split_addresses(value: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth_angle = 0i32;
    let mut in_quotes = false;
    let mut current = String::new();

    for ch in value.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '<' if !in_quotes => {
                depth_angle += 1;
                current.push(ch);
            }
            '>' if !in_quotes => {
                depth_angle -= 1;
                current.push(ch);
            }
            ',' if !in_quotes && depth_angle == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}
