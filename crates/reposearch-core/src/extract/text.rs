//! Default text sniffing and charset handling.

use super::collab::{Charset, TextSniffer};

/// Number of leading bytes inspected when sniffing.
const SNIFF_LEN: usize = 8000;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Treats content with a NUL byte in its first 8000 bytes as binary.
///
/// UTF-16 and other wide encodings contain NUL bytes and sniff as binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct NulByteSniffer;

impl TextSniffer for NulByteSniffer {
    fn is_text(&self, content: &[u8]) -> bool {
        let head = &content[..content.len().min(SNIFF_LEN)];
        !head.contains(&0)
    }
}

/// Decodes UTF-8, stripping a byte order mark and dropping invalid sequences.
#[derive(Debug, Clone, Copy, Default)]
pub struct LossyUtf8;

impl Charset for LossyUtf8 {
    fn to_canonical(&self, content: &[u8]) -> String {
        let content = content.strip_prefix(UTF8_BOM).unwrap_or(content);
        let mut out = String::with_capacity(content.len());
        for chunk in content.utf8_chunks() {
            out.push_str(chunk.valid());
        }
        out
    }
}
