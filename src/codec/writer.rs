//! Response and literal writing. Every write is CRLF-terminated; a string
//! literal embedded in a response tuple is framed as `{len}CRLF<bytes>`.

/// Join already-rendered tokens with spaces and terminate with CRLF.
pub fn encode_line(parts: &[&str]) -> Vec<u8> {
    let mut out = parts.join(" ").into_bytes();
    out.extend_from_slice(b"\r\n");
    out
}

/// Render a response-side literal: `{len}\r\n<bytes>`. Unlike a
/// command-side literal, a response literal is never synchronising — the
/// server does not wait for client acknowledgement.
pub fn encode_literal(bytes: &[u8]) -> Vec<u8> {
    let mut out = format!("{{{}}}\r\n", bytes.len()).into_bytes();
    out.extend_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_line_joins_and_terminates() {
        assert_eq!(encode_line(&["A1", "OK", "done"]), b"A1 OK done\r\n");
    }

    #[test]
    fn encode_literal_frames_length_prefix() {
        assert_eq!(encode_literal(b"hi"), b"{2}\r\nhi");
    }
}
