//! File attachments and inline resources

use std::fmt;

use tracing::debug;

use crate::error::{MailError, Result};
use crate::mime::encoding::{filename_param, percent_token};
use crate::mime::{detect_image_subtype, HeaderMap, MimePart};

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Content-Disposition of an attachment part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Standalone file
    Attachment,
    /// Displayed within the body, referenced through `cid:` URLs
    Inline,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Attachment => write!(f, "attachment"),
            Disposition::Inline => write!(f, "inline"),
        }
    }
}

/// How the part's Content-Type is determined
#[derive(Debug, Clone, PartialEq, Eq)]
enum ContentKind {
    /// Given by the caller
    Explicit(String),
    /// `image/*`, subtype sniffed from the payload when the part is built
    Image,
}

/// A file attached to a message.
///
/// Inline attachments get a `Content-ID` of `<percent-encoded filename>`
/// unless one was set explicitly; see [`Attachment::cid_url`] for the
/// matching reference to use in HTML bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    filename: Option<String>,
    data: Vec<u8>,
    content: ContentKind,
    disposition: Disposition,
    headers: HeaderMap,
}

impl Attachment {
    /// A plain `application/octet-stream` attachment
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: Some(filename.into()),
            data: data.into(),
            content: ContentKind::Explicit(DEFAULT_CONTENT_TYPE.to_string()),
            disposition: Disposition::Attachment,
            headers: HeaderMap::new(),
        }
    }

    /// An attachment without a filename
    pub fn unnamed(data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: None,
            ..Self::new(String::new(), data)
        }
    }

    /// An inline resource
    pub fn inline(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self::new(filename, data).with_disposition(Disposition::Inline)
    }

    /// An image whose Content-Type is detected from the data
    pub fn image(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            content: ContentKind::Image,
            ..Self::new(filename, data)
        }
    }

    /// An inline image, e.g. a logo referenced as `<img src="cid:logo.png">`
    pub fn inline_image(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self::image(filename, data).with_disposition(Disposition::Inline)
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content = ContentKind::Explicit(content_type.into());
        self
    }

    pub fn with_disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self.default_content_id();
        self
    }

    /// Add a header to the part; later values win over earlier ones
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.merge(&headers);
        self.default_content_id();
        self
    }

    fn default_content_id(&mut self) {
        if self.disposition != Disposition::Inline {
            return;
        }
        if let Some(filename) = self.filename.as_deref().filter(|f| !f.is_empty()) {
            self.headers
                .set_default("Content-ID", format!("<{}>", percent_token(filename)));
        }
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Caller-supplied Content-Type; `None` for images until the part is built
    pub fn content_type(&self) -> Option<&str> {
        match &self.content {
            ContentKind::Explicit(ct) => Some(ct.as_str()),
            ContentKind::Image => None,
        }
    }

    pub fn is_image(&self) -> bool {
        self.content == ContentKind::Image
    }

    pub fn disposition(&self) -> Disposition {
        self.disposition
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn content_id(&self) -> Option<&str> {
        self.headers.get("Content-ID")
    }

    /// The `cid:` URL referencing this part from an HTML body
    pub fn cid_url(&self) -> Option<String> {
        let id = self.content_id()?;
        let id = id.trim().trim_start_matches('<').trim_end_matches('>');
        Some(format!("cid:{}", id))
    }

    fn resolve_content_type(&self) -> Result<String> {
        match &self.content {
            ContentKind::Explicit(ct) => {
                let valid = ct
                    .split_once('/')
                    .map(|(t, s)| !t.trim().is_empty() && !s.trim().is_empty())
                    .unwrap_or(false);
                if !valid {
                    return Err(MailError::Encoding(format!("Invalid content type: {}", ct)));
                }
                Ok(ct.clone())
            }
            ContentKind::Image => detect_image_subtype(&self.data)
                .map(|subtype| format!("image/{}", subtype))
                .ok_or_else(|| {
                    MailError::UnrecognizedImage(
                        self.filename.clone().unwrap_or_else(|| "<unnamed>".to_string()),
                    )
                }),
        }
    }

    /// Build the base64 MIME part for this attachment
    pub fn build_mime_part(&self) -> Result<MimePart> {
        let content_type = self.resolve_content_type()?;
        debug!(
            "Building {} part {:?} ({}, {} bytes)",
            self.disposition,
            self.filename,
            content_type,
            self.data.len()
        );

        let mut part = MimePart::binary(&content_type, &self.data);

        let disposition = match self.filename.as_deref() {
            Some(filename) => format!("{}; {}", self.disposition, filename_param(filename)),
            None => self.disposition.to_string(),
        };
        part.headers.set("Content-Disposition", disposition);
        part.headers.merge(&self.headers);

        Ok(part)
    }
}
