use std::fmt::Write as _;

use super::encoding::{
    check_header_name, check_header_value, encode_text_body, header_value, wrap_base64,
    TransferEncoding, CHARSET,
};
use crate::error::Result;

/// Ordered header list with case-insensitive, last-write-wins keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        HeaderMap::default()
    }

    /// Set a header, replacing any existing value under the same name.
    ///
    /// A replaced header keeps its original position.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Set a header only if it is not present yet
    pub fn set_default(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if !self.contains(&name) {
            self.entries.push((name, value.into()));
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self
            .entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy every entry of `other` over this map
    pub fn merge(&mut self, other: &HeaderMap) {
        for (name, value) in other.iter() {
            self.set(name, value);
        }
    }

    /// Write all headers as `Name: value` lines.
    ///
    /// Non-ASCII values are RFC 2047 encoded, ASCII values folded at
    /// spaces. Invalid names and unfolded line breaks fail with an
    /// encoding error.
    pub fn write_to(&self, out: &mut String) -> Result<()> {
        for (name, value) in self.iter() {
            check_header_name(name)?;
            check_header_value(name, value)?;
            let _ = write!(out, "{}: {}\r\n", name, header_value(name, value));
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = HeaderMap::new();
        map.extend(iter);
        map
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for HeaderMap {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.set(name, value);
        }
    }
}

/// Body of a MIME part: encoded leaf content or nested parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MimeBody {
    Leaf(String),
    Multipart { boundary: String, parts: Vec<MimePart> },
}

/// A node of the MIME tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePart {
    pub headers: HeaderMap,
    pub body: MimeBody,
}

impl MimePart {
    /// A `text/<subtype>` part in utf-8
    pub fn text(subtype: &str, content: &str, unsafe_encoding: TransferEncoding) -> Self {
        let (encoding, encoded) = encode_text_body(content, unsafe_encoding);
        let mut headers = HeaderMap::new();
        headers.set(
            "Content-Type",
            format!("text/{}; charset=\"{}\"", subtype, CHARSET),
        );
        headers.set("Content-Transfer-Encoding", encoding.to_string());
        MimePart {
            headers,
            body: MimeBody::Leaf(encoded),
        }
    }

    /// A base64 encoded binary part
    pub fn binary(content_type: &str, data: &[u8]) -> Self {
        let mut headers = HeaderMap::new();
        headers.set("Content-Type", content_type);
        headers.set("Content-Transfer-Encoding", TransferEncoding::Base64.to_string());
        MimePart {
            headers,
            body: MimeBody::Leaf(wrap_base64(data)),
        }
    }

    /// An empty `multipart/<subtype>` container
    pub fn multipart(subtype: &str, boundary: impl Into<String>) -> Self {
        let boundary = boundary.into();
        let mut headers = HeaderMap::new();
        headers.set(
            "Content-Type",
            format!("multipart/{}; boundary=\"{}\"", subtype, boundary),
        );
        MimePart {
            headers,
            body: MimeBody::Multipart {
                boundary,
                parts: Vec::new(),
            },
        }
    }

    /// Append a child part; no-op on leaf parts
    pub fn attach(&mut self, part: MimePart) {
        if let MimeBody::Multipart { parts, .. } = &mut self.body {
            parts.push(part);
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("Content-Type")
    }

    pub fn parts(&self) -> &[MimePart] {
        match &self.body {
            MimeBody::Leaf(_) => &[],
            MimeBody::Multipart { parts, .. } => parts,
        }
    }

    /// Serialize the part and its children
    pub fn to_wire(&self) -> Result<String> {
        let mut out = String::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    fn write_to(&self, out: &mut String) -> Result<()> {
        self.headers.write_to(out)?;
        out.push_str("\r\n");

        match &self.body {
            MimeBody::Leaf(content) => {
                out.push_str(content);
                if !content.ends_with("\r\n") {
                    out.push_str("\r\n");
                }
            }
            MimeBody::Multipart { boundary, parts } => {
                for part in parts {
                    let _ = write!(out, "--{}\r\n", boundary);
                    part.write_to(out)?;
                }
                let _ = write!(out, "--{}--\r\n", boundary);
            }
        }

        Ok(())
    }
}
