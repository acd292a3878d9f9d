//! The parsed-message representation the repository hands back to the core.
//!
//! Spec §1 treats MIME parsing as an external collaborator ("a parsed-message
//! store interface"); this module is the boundary glue that stands in for
//! that collaborator in this crate (there is no separate store process to
//! call out to). It leans on `mailparse` for header decoding, the way
//! `bradsjm-mail-imap-mcp-rs/src/mime.rs` does, while keeping explicit byte
//! ranges per part so the FETCH responder (C5) can slice `BODY[section]`
//! without re-parsing.

use std::ops::Range;

use crate::error::{ImapError, ImapResult};

/// One node of the MIME tree. Leaf nodes have empty `children`.
#[derive(Debug, Clone)]
pub struct MimeNode {
    pub content_type: String,
    pub content_subtype: String,
    pub params: Vec<(String, String)>,
    pub content_id: Option<String>,
    pub description: Option<String>,
    pub encoding: String,
    pub disposition: Option<(String, Vec<(String, String)>)>,
    pub language: Option<Vec<String>>,
    pub location: Option<String>,
    /// Byte range of this part's own MIME headers within `Message::raw`.
    pub header_range: Range<usize>,
    /// Byte range of this part's body (for a leaf: the text/blob content;
    /// for a multipart container: everything between the first and last
    /// boundary, i.e. the children's headers+bodies).
    pub body_range: Range<usize>,
    pub size_octets: u32,
    pub line_count: Option<u32>,
    pub children: Vec<MimeNode>,
}

impl MimeNode {
    pub fn is_multipart(&self) -> bool {
        self.content_type.eq_ignore_ascii_case("multipart")
    }

    /// Full section bytes (headers + body) for this part, used when a
    /// numeric section like `BODY[2]` addresses a multipart container.
    pub fn full_range(&self) -> Range<usize> {
        self.header_range.start..self.body_range.end
    }

    /// Navigate a dotted MIME part path, e.g. `[1, 2]` for `BODY[1.2]`.
    /// Top-level parts are 1-based; a non-multipart message answers only
    /// to path `[1]` (itself).
    pub fn navigate<'a>(&'a self, path: &[u32]) -> Option<&'a MimeNode> {
        if path.is_empty() {
            return Some(self);
        }
        if self.children.is_empty() {
            // A non-multipart message's only numbered part is "1".
            return if path == [1] { Some(self) } else { None };
        }
        let (&first, rest) = path.split_first()?;
        let idx = first.checked_sub(1)? as usize;
        self.children.get(idx)?.navigate(rest)
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    /// Canonical raw octets, CRLF-terminated lines throughout.
    pub raw: Vec<u8>,
    headers: Vec<(String, String)>,
    pub root: MimeNode,
}

impl Message {
    /// Parse raw RFC 5322 octets (as ingested by APPEND) into the
    /// structured form the core operates on. Normalizes bare `\n` to
    /// `\r\n` first so later byte-range math is CRLF-exact.
    pub fn parse(raw: Vec<u8>) -> ImapResult<Message> {
        let raw = normalize_crlf(&raw);
        let header_end = find_header_end(&raw, 0).unwrap_or(raw.len());
        let headers = parse_header_block(&raw[..header_end]);
        let body_start = header_end;
        let root = build_node(&raw, &headers, 0, body_start, raw.len())?;
        Ok(Message { raw, headers, root })
    }

    /// Case-insensitive header lookup; folded continuation lines are
    /// already joined with a single space (RFC 5322 unfolding).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn all_headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn size_octets(&self) -> u32 {
        self.raw.len() as u32
    }

    /// Slice the bytes for an arbitrary range, clamped to the message.
    pub fn slice(&self, range: &Range<usize>) -> &[u8] {
        let start = range.start.min(self.raw.len());
        let end = range.end.min(self.raw.len());
        if start >= end {
            &[]
        } else {
            &self.raw[start..end]
        }
    }

    /// `BODY[HEADER]` / `RFC822.HEADER`: the full header block, with its
    /// trailing blank line.
    pub fn full_header_bytes(&self) -> &[u8] {
        self.slice(&self.root.header_range)
    }

    /// `BODY[TEXT]` / `RFC822.TEXT`: everything after the header block.
    pub fn full_text_bytes(&self) -> &[u8] {
        self.slice(&self.root.body_range)
    }

    /// `HEADER.FIELDS (names...)` / `HEADER.FIELDS.NOT (names...)`.
    pub fn header_fields(&self, names: &[String], invert: bool) -> Vec<u8> {
        let mut out = Vec::new();
        for (key, value) in &self.headers {
            let matched = names.iter().any(|n| n.eq_ignore_ascii_case(key));
            if matched != invert {
                out.extend_from_slice(key.as_bytes());
                out.extend_from_slice(b": ");
                out.extend_from_slice(value.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
        }
        out.extend_from_slice(b"\r\n");
        out
    }
}

fn normalize_crlf(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() + 16);
    let mut i = 0;
    while i < raw.len() {
        let b = raw[i];
        if b == b'\n' {
            if out.last() != Some(&b'\r') {
                out.push(b'\r');
            }
            out.push(b'\n');
        } else if b == b'\r' {
            out.push(b'\r');
        } else {
            out.push(b);
        }
        i += 1;
    }
    out
}

fn find_header_end(raw: &[u8], from: usize) -> Option<usize> {
    let needle = b"\r\n\r\n";
    raw[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| from + pos + needle.len())
}

fn parse_header_block(block: &[u8]) -> Vec<(String, String)> {
    let text = String::from_utf8_lossy(block);
    let mut headers = Vec::new();
    for line in text.split("\r\n") {
        if line.is_empty() {
            continue;
        }
        if (line.starts_with(' ') || line.starts_with('\t')) && !headers.is_empty() {
            let idx = headers.len() - 1;
            let folded: &mut (String, String) = &mut headers[idx];
            folded.1.push(' ');
            folded.1.push_str(line.trim());
        } else if let Some((key, value)) = line.split_once(':') {
            headers.push((key.trim().to_owned(), value.trim().to_owned()));
        }
    }
    headers
}

fn header_lookup<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn build_node(
    raw: &[u8],
    headers: &[(String, String)],
    header_start: usize,
    body_start: usize,
    part_end: usize,
) -> ImapResult<MimeNode> {
    let content_type_raw = header_lookup(headers, "Content-Type").unwrap_or("text/plain");
    let parsed = mailparse::parse_content_type(content_type_raw);
    let (content_type, content_subtype) = parsed
        .mimetype
        .split_once('/')
        .map(|(a, b)| (a.to_owned(), b.to_owned()))
        .unwrap_or_else(|| ("text".to_owned(), "plain".to_owned()));
    let params: Vec<(String, String)> = parsed.params.into_iter().collect();

    let encoding = header_lookup(headers, "Content-Transfer-Encoding")
        .unwrap_or("7BIT")
        .to_ascii_uppercase();
    let content_id = header_lookup(headers, "Content-ID").map(str::to_owned);
    let description = header_lookup(headers, "Content-Description").map(str::to_owned);
    let disposition = header_lookup(headers, "Content-Disposition").map(|raw_disp| {
        let parsed_disp = mailparse::parse_content_disposition(raw_disp);
        let kind = match parsed_disp.disposition {
            mailparse::DispositionType::Inline => "inline",
            mailparse::DispositionType::Attachment => "attachment",
            mailparse::DispositionType::FormData => "form-data",
            _ => "attachment",
        }
        .to_owned();
        let disp_params: Vec<(String, String)> = parsed_disp.params.into_iter().collect();
        (kind, disp_params)
    });

    if content_type.eq_ignore_ascii_case("multipart") {
        let boundary = params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("boundary"))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| ImapError::server_bug("multipart message missing boundary"))?;

        let children = split_multipart(raw, body_start, part_end, &boundary)?;
        return Ok(MimeNode {
            content_type,
            content_subtype,
            params,
            content_id,
            description,
            encoding,
            disposition,
            language: None,
            location: None,
            header_range: header_start..body_start,
            body_range: body_start..part_end,
            size_octets: (part_end - body_start) as u32,
            line_count: None,
            children,
        });
    }

    let body = &raw[body_start..part_end];
    let line_count = if content_type.eq_ignore_ascii_case("text") {
        Some(body.iter().filter(|&&b| b == b'\n').count() as u32)
    } else {
        None
    };

    Ok(MimeNode {
        content_type,
        content_subtype,
        params,
        content_id,
        description,
        encoding,
        disposition,
        language: None,
        location: None,
        header_range: header_start..body_start,
        body_range: body_start..part_end,
        size_octets: body.len() as u32,
        line_count,
        children: Vec::new(),
    })
}

fn split_multipart(
    raw: &[u8],
    start: usize,
    end: usize,
    boundary: &str,
) -> ImapResult<Vec<MimeNode>> {
    let delim = format!("--{boundary}");
    let text_region = &raw[start..end];
    let mut bounds = Vec::new();
    let mut search_from = 0;
    while let Some(pos) = find_subslice(&text_region[search_from..], delim.as_bytes()) {
        bounds.push(start + search_from + pos);
        search_from += pos + delim.len();
        if search_from >= text_region.len() {
            break;
        }
    }

    let mut children = Vec::new();
    for window in bounds.windows(2) {
        let part_start = line_after(raw, window[0]);
        let part_end = window[1];
        if part_start >= part_end {
            continue;
        }
        let header_end = find_header_end(raw, part_start).unwrap_or(part_end);
        let child_headers = parse_header_block(&raw[part_start..header_end.min(part_end)]);
        let child = build_node(
            raw,
            &child_headers,
            part_start,
            header_end.min(part_end),
            part_end,
        )?;
        children.push(child);
    }
    Ok(children)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Byte offset of the start of the line following the one containing
/// `from` (skips past the boundary marker's own CRLF).
fn line_after(raw: &[u8], from: usize) -> usize {
    match raw[from..].iter().position(|&b| b == b'\n') {
        Some(pos) => from + pos + 1,
        None => raw.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_simple_message() {
        let raw = b"Subject: hi\r\n\r\nhello world\r\n".to_vec();
        let message = Message::parse(raw.clone()).unwrap();
        assert_eq!(message.raw, raw);
        assert_eq!(message.header("Subject"), Some("hi"));
        assert_eq!(message.full_text_bytes(), b"hello world\r\n");
    }

    #[test]
    fn folds_continuation_headers() {
        let raw = b"Subject: long\r\n subject line\r\n\r\nbody\r\n".to_vec();
        let message = Message::parse(raw).unwrap();
        assert_eq!(message.header("Subject"), Some("long subject line"));
    }

    #[test]
    fn normalizes_bare_lf() {
        let raw = b"Subject: hi\n\nbody\n".to_vec();
        let message = Message::parse(raw).unwrap();
        assert_eq!(message.raw, b"Subject: hi\r\n\r\nbody\r\n");
    }

    #[test]
    fn splits_multipart_children() {
        let raw = concat_multipart();
        let message = Message::parse(raw).unwrap();
        assert!(message.root.is_multipart());
        assert_eq!(message.root.children.len(), 2);
        assert_eq!(message.root.children[0].content_type, "text");
        assert_eq!(message.root.children[1].content_subtype, "plain");
    }

    fn concat_multipart() -> Vec<u8> {
        let body = "Content-Type: multipart/mixed; boundary=XYZ\r\n\r\n\
--XYZ\r\nContent-Type: text/plain\r\n\r\npart one\r\n\
--XYZ\r\nContent-Type: text/plain\r\n\r\npart two\r\n\
--XYZ--\r\n";
        body.as_bytes().to_vec()
    }
}
