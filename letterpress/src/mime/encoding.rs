//! Header and body encoders (RFC 2045, RFC 2047, RFC 2231)

use base64::{engine::general_purpose, Engine as _};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MailError, Result};

/// Charset used for every text part and encoded header word
pub const CHARSET: &str = "utf-8";

/// Longest encoded word allowed by RFC 2047
const MAX_ENCODED_WORD: usize = 75;

/// Longest line allowed in a 7bit body, excluding CRLF
const MAX_LINE_LENGTH: usize = 998;

/// Base64 output is wrapped at this many characters per line
const BASE64_LINE_LENGTH: usize = 76;

/// Preferred header line width, excluding CRLF (RFC 5322 2.1.1)
const MAX_HEADER_WIDTH: usize = 78;

/// Longer parameter values are split into RFC 2231 continuations
const MAX_PARAM_LENGTH: usize = 50;

/// Everything except RFC 3986 unreserved characters
pub const TOKEN_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Content-Transfer-Encoding of a leaf part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferEncoding {
    #[serde(rename = "7bit")]
    SevenBit,
    #[serde(rename = "quoted-printable")]
    QuotedPrintable,
    #[serde(rename = "base64")]
    Base64,
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferEncoding::SevenBit => write!(f, "7bit"),
            TransferEncoding::QuotedPrintable => write!(f, "quoted-printable"),
            TransferEncoding::Base64 => write!(f, "base64"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WordEncoding {
    Q,
    B,
}

impl WordEncoding {
    fn tag(self) -> char {
        match self {
            WordEncoding::Q => 'q',
            WordEncoding::B => 'b',
        }
    }

    fn encoded_len(self, bytes: &[u8]) -> usize {
        match self {
            WordEncoding::Q => bytes
                .iter()
                .map(|b| if q_literal(*b) || *b == b' ' { 1 } else { 3 })
                .sum(),
            WordEncoding::B => bytes.len().div_ceil(3) * 4,
        }
    }

    fn encode(self, bytes: &[u8]) -> String {
        match self {
            WordEncoding::Q => {
                let mut out = String::with_capacity(bytes.len() * 3);
                for &b in bytes {
                    if q_literal(b) {
                        out.push(b as char);
                    } else if b == b' ' {
                        out.push('_');
                    } else {
                        out.push_str(&format!("={:02X}", b));
                    }
                }
                out
            }
            WordEncoding::B => general_purpose::STANDARD.encode(bytes),
        }
    }
}

fn q_literal(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'!' | b'*' | b'+' | b'-' | b'/')
}

/// RFC 2047 encode a header value if it contains non-ASCII characters
/// or a word too long to ever fit on a folded line.
///
/// The shorter of the Q and B encodings is used. Long values are split into
/// several encoded words joined by a folding CRLF.
pub fn encode_word(value: &str) -> String {
    if value.is_ascii() && value.split(' ').all(|w| w.len() <= MAX_HEADER_WIDTH) {
        return value.to_string();
    }

    let q_len = WordEncoding::Q.encoded_len(value.as_bytes());
    let b_len = WordEncoding::B.encoded_len(value.as_bytes());
    let encoding = if q_len <= b_len {
        WordEncoding::Q
    } else {
        WordEncoding::B
    };

    // "=?utf-8?q?" + "?="
    let budget = MAX_ENCODED_WORD - CHARSET.len() - 7;

    let mut words = Vec::new();
    let mut chunk = String::new();
    for ch in value.chars() {
        let mut candidate = chunk.clone();
        candidate.push(ch);
        if !chunk.is_empty() && encoding.encoded_len(candidate.as_bytes()) > budget {
            words.push(std::mem::take(&mut chunk));
            chunk.push(ch);
        } else {
            chunk = candidate;
        }
    }
    if !chunk.is_empty() {
        words.push(chunk);
    }

    words
        .iter()
        .map(|w| {
            format!(
                "=?{}?{}?{}?=",
                CHARSET,
                encoding.tag(),
                encoding.encode(w.as_bytes())
            )
        })
        .collect::<Vec<_>>()
        .join("\r\n ")
}

/// Build a `filename` parameter, switching to the RFC 2231 form for
/// names that cannot travel in a quoted string and to numbered
/// continuations (`filename*0*=`, `filename*1*=`, ...) for long names.
pub fn filename_param(filename: &str) -> String {
    if filename.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        let escaped = filename.replace('\\', "\\\\").replace('"', "\\\"");
        if escaped.len() <= MAX_PARAM_LENGTH {
            return format!("filename=\"{}\"", escaped);
        }
    } else {
        let encoded = percent_token(filename);
        if encoded.len() <= MAX_PARAM_LENGTH {
            return format!("filename*={}''{}", CHARSET, encoded);
        }
    }

    // Split between characters so no UTF-8 sequence straddles two sections
    let mut sections = Vec::new();
    let mut section = String::new();
    let mut buf = [0u8; 4];
    for ch in filename.chars() {
        let piece = percent_token(ch.encode_utf8(&mut buf));
        if !section.is_empty() && section.len() + piece.len() > MAX_PARAM_LENGTH {
            sections.push(std::mem::take(&mut section));
        }
        section.push_str(&piece);
    }
    if !section.is_empty() {
        sections.push(section);
    }

    sections
        .iter()
        .enumerate()
        .map(|(i, section)| match i {
            0 => format!("filename*0*={}''{}", CHARSET, section),
            _ => format!("filename*{}*={}", i, section),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fold an ASCII header value at spaces so lines stay within 78 columns
/// wherever the words allow it. Folds already present in `value` are kept.
pub fn fold_header(name: &str, value: &str) -> String {
    let mut out = String::with_capacity(value.len() + value.len() / 16);
    // "Name: "
    let mut column = name.len() + 2;

    for (i, line) in value.split("\r\n").enumerate() {
        if i > 0 {
            out.push_str("\r\n");
            column = 0;
        }
        for (j, word) in line.split(' ').enumerate() {
            if j > 0 {
                if !word.is_empty() && column > 1 && column + 1 + word.len() > MAX_HEADER_WIDTH {
                    out.push_str("\r\n");
                    column = 0;
                }
                out.push(' ');
                column += 1;
            }
            out.push_str(word);
            column += word.len();
        }
    }

    out
}

/// Wire form of a header value: RFC 2047 words for non-ASCII text or
/// tokens too long for any line, folded ASCII otherwise.
pub fn header_value(name: &str, value: &str) -> String {
    if !value.is_ascii() {
        return encode_word(value);
    }
    let folded = fold_header(name, value);
    let too_long = folded
        .split("\r\n")
        .any(|line| name.len() + 2 + line.len() > MAX_LINE_LENGTH);
    if too_long {
        encode_word(value)
    } else {
        folded
    }
}

/// Percent-encode a value so it stays a single header token.
pub fn percent_token(value: &str) -> String {
    utf8_percent_encode(value, TOKEN_SET).to_string()
}

/// Check that a header name is printable ASCII without a colon
pub fn check_header_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.bytes().all(|b| (33..=126).contains(&b) && b != b':') {
        return Err(MailError::Encoding(format!(
            "Invalid header name: {:?}",
            name
        )));
    }
    Ok(())
}

/// Reject CR and LF unless they form a folding CRLF followed by whitespace
pub fn check_header_value(name: &str, value: &str) -> Result<()> {
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\r' => {
                let folded = bytes.get(i + 1) == Some(&b'\n')
                    && matches!(bytes.get(i + 2), Some(b' ') | Some(b'\t'));
                if !folded {
                    return Err(MailError::Encoding(format!(
                        "Line break in header {}",
                        name
                    )));
                }
                i += 2;
            }
            b'\n' => {
                return Err(MailError::Encoding(format!("Line break in header {}", name)));
            }
            _ => i += 1,
        }
    }
    Ok(())
}

/// Convert bare LF and CR line endings to CRLF
pub fn normalize_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 32);
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("\r\n");
            }
            '\n' => out.push_str("\r\n"),
            _ => out.push(c),
        }
    }
    out
}

/// Encode a text body, keeping it 7bit when it is plain short-lined ASCII
/// and falling back to `unsafe_encoding` otherwise.
pub fn encode_text_body(text: &str, unsafe_encoding: TransferEncoding) -> (TransferEncoding, String) {
    let text = normalize_newlines(text);
    let seven_bit_safe = text.is_ascii()
        && !text.contains('\0')
        && text.split("\r\n").all(|line| line.len() <= MAX_LINE_LENGTH);

    if seven_bit_safe {
        return (TransferEncoding::SevenBit, text);
    }

    match unsafe_encoding {
        TransferEncoding::QuotedPrintable => (
            TransferEncoding::QuotedPrintable,
            quoted_printable::encode_to_str(text.as_bytes()),
        ),
        // 7bit cannot carry this body, so base64 is the only safe choice left
        TransferEncoding::Base64 | TransferEncoding::SevenBit => {
            (TransferEncoding::Base64, wrap_base64(text.as_bytes()))
        }
    }
}

/// Base64 encode and wrap at 76 characters per line
pub fn wrap_base64(data: &[u8]) -> String {
    let encoded = general_purpose::STANDARD.encode(data);
    encoded
        .as_bytes()
        .chunks(BASE64_LINE_LENGTH)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect::<Vec<_>>()
        .join("\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_word_ascii_untouched() {
        assert_eq!(encode_word("Hello"), "Hello");
        assert_eq!(encode_word(""), "");
    }

    #[test]
    fn test_encode_word_picks_q_for_mostly_ascii() {
        assert_eq!(
            encode_word("Hello Honored User °C"),
            "=?utf-8?q?Hello_Honored_User_=C2=B0C?="
        );
    }

    #[test]
    fn test_encode_word_picks_b_for_mostly_non_ascii() {
        let encoded = encode_word("Привет");
        assert!(encoded.starts_with("=?utf-8?b?"));
        assert!(encoded.ends_with("?="));
        let payload = encoded
            .trim_start_matches("=?utf-8?b?")
            .trim_end_matches("?=");
        let decoded = general_purpose::STANDARD.decode(payload).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "Привет");
    }

    #[test]
    fn test_encode_word_splits_long_values() {
        let value = "Ж".repeat(100);
        let encoded = encode_word(&value);
        let words: Vec<&str> = encoded.split("\r\n ").collect();
        assert!(words.len() > 1);
        for word in words {
            assert!(word.len() <= MAX_ENCODED_WORD, "{} is too long", word);
        }
    }

    #[test]
    fn test_filename_param() {
        assert_eq!(filename_param("test.txt"), "filename=\"test.txt\"");
        assert_eq!(filename_param("a\"b.txt"), "filename=\"a\\\"b.txt\"");
        assert_eq!(
            filename_param("résumé.pdf"),
            "filename*=utf-8''r%C3%A9sum%C3%A9.pdf"
        );
    }

    #[test]
    fn test_encode_word_long_ascii_token() {
        let value = "x".repeat(200);
        let encoded = encode_word(&value);
        assert!(encoded.starts_with("=?utf-8?q?"));
        for word in encoded.split("\r\n ") {
            assert!(word.len() <= MAX_ENCODED_WORD);
        }
        assert_eq!(encode_word("normal words stay"), "normal words stay");
    }

    #[test]
    fn test_filename_param_continuations() {
        let name = format!("{}.pdf", "a".repeat(120));
        let param = filename_param(&name);
        let sections: Vec<&str> = param.split("; ").collect();

        assert_eq!(sections.len(), 3);
        assert!(sections[0].starts_with("filename*0*=utf-8''aaa"));
        assert!(sections[1].starts_with("filename*1*=aaa"));
        assert!(sections[2].starts_with("filename*2*=") && sections[2].ends_with(".pdf"));
        for section in &sections {
            assert!(section.len() <= MAX_PARAM_LENGTH + 20, "{} is too long", section);
        }
    }

    #[test]
    fn test_filename_param_continuations_keep_utf8_whole() {
        let param = filename_param(&"é".repeat(30));
        for section in param.split("; ") {
            let value = section.rsplit('=').next().unwrap();
            let value = value.trim_start_matches("utf-8''");
            // Every escaped character is the full two-byte sequence
            assert_eq!(value.matches("%C3%A9").count() * 6, value.len());
        }
    }

    #[test]
    fn test_fold_header() {
        let value = "word ".repeat(40);
        let folded = fold_header("Subject", value.trim_end());
        let lines: Vec<&str> = folded.split("\r\n").collect();

        assert!(lines.len() > 1);
        assert!("Subject: ".len() + lines[0].len() <= MAX_HEADER_WIDTH);
        for line in &lines[1..] {
            assert!(line.starts_with(' '));
            assert!(line.len() <= MAX_HEADER_WIDTH);
        }
        assert_eq!(folded.replace("\r\n", ""), value.trim_end());
    }

    #[test]
    fn test_fold_header_short_and_prefolded() {
        assert_eq!(fold_header("To", "a@b"), "a@b");
        assert_eq!(fold_header("To", "a@b,\r\n c@d"), "a@b,\r\n c@d");
    }

    #[test]
    fn test_header_value_encodes_unfoldable_token() {
        let token = "t".repeat(1500);
        let value = header_value("X-Token", &token);
        assert!(value.starts_with("=?utf-8?q?ttt"));
        assert!(value.split("\r\n").all(|line| line.len() <= MAX_LINE_LENGTH));

        assert_eq!(header_value("X-Short", "plain"), "plain");
    }

    #[test]
    fn test_percent_token() {
        assert_eq!(percent_token("logo.png"), "logo.png");
        assert_eq!(percent_token("my logo.png"), "my%20logo.png");
    }

    #[test]
    fn test_check_header_name() {
        assert!(check_header_name("X-Custom").is_ok());
        assert!(check_header_name("").is_err());
        assert!(check_header_name("Bad Name").is_err());
        assert!(check_header_name("Bad:Name").is_err());
    }

    #[test]
    fn test_check_header_value_rejects_injection() {
        assert!(check_header_value("Subject", "fine").is_ok());
        assert!(check_header_value("Subject", "folded\r\n value").is_ok());
        assert!(check_header_value("Subject", "evil\r\nBcc: x@y").is_err());
        assert!(check_header_value("Subject", "evil\nBcc: x@y").is_err());
    }

    #[test]
    fn test_encode_text_body_ascii_stays_7bit() {
        let (encoding, body) = encode_text_body("line one\nline two", TransferEncoding::Base64);
        assert_eq!(encoding, TransferEncoding::SevenBit);
        assert_eq!(body, "line one\r\nline two");
    }

    #[test]
    fn test_encode_text_body_non_ascii_uses_fallback() {
        let (encoding, body) = encode_text_body("°C", TransferEncoding::Base64);
        assert_eq!(encoding, TransferEncoding::Base64);
        assert_eq!(body, general_purpose::STANDARD.encode("°C"));

        let (encoding, body) = encode_text_body("°C", TransferEncoding::QuotedPrintable);
        assert_eq!(encoding, TransferEncoding::QuotedPrintable);
        assert_eq!(body, "=C2=B0C");
    }

    #[test]
    fn test_encode_text_body_long_line() {
        let long = "a".repeat(MAX_LINE_LENGTH + 1);
        let (encoding, _) = encode_text_body(&long, TransferEncoding::Base64);
        assert_eq!(encoding, TransferEncoding::Base64);
    }

    #[test]
    fn test_wrap_base64() {
        let wrapped = wrap_base64(&[0u8; 200]);
        for line in wrapped.split("\r\n") {
            assert!(line.len() <= BASE64_LINE_LENGTH);
        }
        let joined: String = wrapped.split("\r\n").collect();
        assert_eq!(general_purpose::STANDARD.decode(joined).unwrap(), vec![0u8; 200]);
    }
}
