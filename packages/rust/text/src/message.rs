//! Plain-text body extraction from raw RFC 822 messages.
//!
//! Only what the digest pipeline needs: header unfolding, multipart
//! traversal to the first `text/plain` part, and quoted-printable/base64
//! transfer decoding. Charsets other than UTF-8 are decoded best-effort.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, warn};

use digestmerge_shared::{DigestError, Result};

/// Nesting bound for multipart bodies.
const MAX_MULTIPART_DEPTH: usize = 8;

/// A parsed header block plus the raw body that follows it.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    headers: Vec<(String, String)>,
    body: String,
}

impl ParsedMessage {
    /// Parse a raw message. Requires a header block terminated by a blank line.
    pub fn parse(raw: &str, document: &str) -> Result<Self> {
        let normalized = normalize_newlines(raw);
        let (headers, body) = split_headers(&normalized)
            .ok_or_else(|| DigestError::malformed(document, "no header block"))?;
        if headers.is_empty() {
            return Err(DigestError::malformed(document, "no header block"));
        }
        Ok(Self {
            headers,
            body: body.to_string(),
        })
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Decoded text of the first `text/plain` part.
    pub fn plain_text(&self, document: &str) -> Result<String> {
        extract_part(&self.headers, &self.body, document, 0)?
            .ok_or_else(|| DigestError::malformed(document, "no text/plain part"))
    }
}

/// Parse a raw message and return its plain-text body.
pub fn plain_text_body(raw: &str, document: &str) -> Result<String> {
    ParsedMessage::parse(raw, document)?.plain_text(document)
}

/// Decode bytes as UTF-8, replacing invalid sequences.
///
/// Replacement is logged as an encoding error but never fails.
pub fn decode_text(bytes: &[u8], document: &str) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(e) => {
            let err = DigestError::Encoding {
                document: document.to_string(),
                message: e.to_string(),
            };
            warn!(error = %err, "replacing invalid UTF-8 sequences");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

fn normalize_newlines(raw: &str) -> String {
    raw.replace("\r\n", "\n")
}

/// Split `Name: value` headers from the body at the first blank line.
///
/// Returns `None` when the text does not start with a header line or the
/// header block is never terminated.
fn split_headers(text: &str) -> Option<(Vec<(String, String)>, &str)> {
    let (block, body) = if let Some(rest) = text.strip_prefix('\n') {
        ("", rest)
    } else {
        let end = text.find("\n\n")?;
        (&text[..end], &text[end + 2..])
    };

    let mut headers: Vec<(String, String)> = Vec::new();
    for line in block.lines() {
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        match parse_header_line(line) {
            Some(header) => headers.push(header),
            None if headers.is_empty() => return None,
            None => debug!(line, "ignoring non-header line in header block"),
        }
    }

    Some((headers, body))
}

fn parse_header_line(line: &str) -> Option<(String, String)> {
    let (name, value) = line.split_once(':')?;
    let valid_name = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_graphic() && c != ':');
    valid_name.then(|| (name.to_string(), value.trim().to_string()))
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Split a `Content-Type` value into its lower-cased MIME type and parameters.
fn parse_content_type(value: &str) -> (String, Vec<(String, String)>) {
    let mut parts = value.split(';');
    let mime = parts.next().unwrap_or("").trim().to_ascii_lowercase();
    let params = parts
        .filter_map(|p| {
            let (k, v) = p.split_once('=')?;
            Some((
                k.trim().to_ascii_lowercase(),
                v.trim().trim_matches('"').to_string(),
            ))
        })
        .collect();
    (mime, params)
}

// ---------------------------------------------------------------------------
// Parts
// ---------------------------------------------------------------------------

fn extract_part(
    headers: &[(String, String)],
    body: &str,
    document: &str,
    depth: usize,
) -> Result<Option<String>> {
    if depth > MAX_MULTIPART_DEPTH {
        return Err(DigestError::malformed(document, "multipart nesting too deep"));
    }

    let (mime, params) = find_header(headers, "Content-Type")
        .map(parse_content_type)
        .unwrap_or_else(|| ("text/plain".to_string(), Vec::new()));

    if mime.starts_with("multipart/") {
        let boundary = params
            .iter()
            .find(|(k, _)| k == "boundary")
            .map(|(_, v)| v.as_str())
            .filter(|b| !b.is_empty())
            .ok_or_else(|| DigestError::malformed(document, "multipart without boundary"))?;

        for part in split_multipart(body, boundary) {
            let (part_headers, part_body) = split_headers(part).unwrap_or((Vec::new(), part));
            if let Some(text) = extract_part(&part_headers, part_body, document, depth + 1)? {
                return Ok(Some(text));
            }
        }
        return Ok(None);
    }

    if mime != "text/plain" {
        debug!(%mime, "skipping non-plain part");
        return Ok(None);
    }

    let encoding = find_header(headers, "Content-Transfer-Encoding")
        .unwrap_or("7bit")
        .trim()
        .to_ascii_lowercase();

    let text = match encoding.as_str() {
        "quoted-printable" => decode_text(&decode_quoted_printable(body), document),
        "base64" => {
            let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = STANDARD
                .decode(compact.as_bytes())
                .map_err(|e| DigestError::malformed(document, format!("bad base64 body: {e}")))?;
            normalize_newlines(&decode_text(&bytes, document))
        }
        _ => body.to_string(),
    };

    Ok(Some(text))
}

/// Bodies of the parts delimited by `--boundary` lines.
fn split_multipart<'a>(body: &'a str, boundary: &str) -> Vec<&'a str> {
    let delimiter = format!("--{boundary}");
    let closing = format!("--{boundary}--");

    let mut parts = Vec::new();
    let mut start: Option<usize> = None;
    let mut offset = 0;

    for line in body.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == delimiter || trimmed == closing {
            if let Some(s) = start {
                parts.push(&body[s..offset]);
            }
            if trimmed == closing {
                return parts;
            }
            start = Some(offset + line.len());
        }
        offset += line.len();
    }

    if let Some(s) = start {
        parts.push(&body[s..]);
    }
    parts
}

fn decode_quoted_printable(body: &str) -> Vec<u8> {
    let bytes = body.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'=' {
            if bytes.get(i + 1) == Some(&b'\n') {
                i += 2;
                continue;
            }
            if let (Some(h), Some(l)) = (
                bytes.get(i + 1).and_then(|b| hex_value(*b)),
                bytes.get(i + 2).and_then(|b| hex_value(*b)),
            ) {
                out.push(h << 4 | l);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    out
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_message_body() {
        let raw = "From: news@example.com\r\nSubject: Daily\r\n\r\nGENERAL\r\nHello there.\r\n";
        let body = plain_text_body(raw, "doc").unwrap();
        assert_eq!(body, "GENERAL\nHello there.\n");
    }

    #[test]
    fn headers_are_unfolded_and_case_insensitive() {
        let raw = "Subject: A very\n long subject\nfrom: a@b.c\n\nbody";
        let msg = ParsedMessage::parse(raw, "doc").unwrap();
        assert_eq!(msg.header("SUBJECT"), Some("A very long subject"));
        assert_eq!(msg.header("From"), Some("a@b.c"));
        assert_eq!(msg.headers.len(), 2);
    }

    #[test]
    fn missing_header_block_is_malformed() {
        let err = plain_text_body("just some text\nwith lines\n", "doc").unwrap_err();
        assert!(matches!(err, DigestError::MalformedDocument { .. }));

        let err = plain_text_body("From: a@b.c\nno blank line ever", "doc").unwrap_err();
        assert!(matches!(err, DigestError::MalformedDocument { .. }));
    }

    #[test]
    fn multipart_picks_first_plain_part() {
        let raw = "From: a@b.c\n\
                   Content-Type: multipart/alternative; boundary=\"XYZ\"\n\
                   \n\
                   preamble\n\
                   --XYZ\n\
                   Content-Type: text/html\n\
                   \n\
                   <p>html</p>\n\
                   --XYZ\n\
                   Content-Type: text/plain; charset=utf-8\n\
                   \n\
                   plain body\n\
                   --XYZ--\n\
                   epilogue\n";
        let body = plain_text_body(raw, "doc").unwrap();
        assert_eq!(body, "plain body\n");
    }

    #[test]
    fn nested_multipart_is_searched() {
        let raw = "From: a@b.c\n\
                   Content-Type: multipart/mixed; boundary=outer\n\
                   \n\
                   --outer\n\
                   Content-Type: multipart/alternative; boundary=inner\n\
                   \n\
                   --inner\n\
                   Content-Type: text/plain\n\
                   \n\
                   nested plain\n\
                   --inner--\n\
                   --outer--\n";
        assert_eq!(plain_text_body(raw, "doc").unwrap(), "nested plain\n");
    }

    #[test]
    fn multipart_without_plain_part_is_malformed() {
        let raw = "From: a@b.c\n\
                   Content-Type: multipart/alternative; boundary=B\n\
                   \n\
                   --B\n\
                   Content-Type: text/html\n\
                   \n\
                   <p>only html</p>\n\
                   --B--\n";
        let err = plain_text_body(raw, "doc").unwrap_err();
        assert!(err.to_string().contains("no text/plain part"));
    }

    #[test]
    fn multipart_without_boundary_is_malformed() {
        let raw = "From: a@b.c\nContent-Type: multipart/mixed\n\nbody\n";
        let err = plain_text_body(raw, "doc").unwrap_err();
        assert!(err.to_string().contains("boundary"));
    }

    #[test]
    fn quoted_printable_is_decoded() {
        let raw = "From: a@b.c\n\
                   Content-Transfer-Encoding: quoted-printable\n\
                   \n\
                   Caf=C3=A9 prices rose by 3=25 this wee=\n\
                   k.\n";
        assert_eq!(
            plain_text_body(raw, "doc").unwrap(),
            "Café prices rose by 3% this week.\n"
        );
    }

    #[test]
    fn base64_is_decoded() {
        let raw = "From: a@b.c\n\
                   Content-Transfer-Encoding: base64\n\
                   \n\
                   R0VORVJBTApIZWxs\n\
                   byB3b3JsZC4K\n";
        assert_eq!(plain_text_body(raw, "doc").unwrap(), "GENERAL\nHello world.\n");
    }

    #[test]
    fn invalid_base64_is_malformed() {
        let raw = "From: a@b.c\nContent-Transfer-Encoding: base64\n\n!!!not base64!!!\n";
        let err = plain_text_body(raw, "doc").unwrap_err();
        assert!(matches!(err, DigestError::MalformedDocument { .. }));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let text = decode_text(b"caf\xe9 latte", "doc");
        assert_eq!(text, "caf\u{FFFD} latte");
    }
}
