//! C1: the wire codec. Reads tagged command lines with embedded
//! synchronising/non-synchronising literals, and writes CRLF-terminated
//! responses.

pub mod reader;
pub mod writer;

pub use reader::{Event, ImapDecoder, RawCommand};
pub use writer::encode_line;
