//! E-mail message and its MIME tree

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::address::{address_list, Address, IntoAddress};
use crate::attachment::Attachment;
use crate::config::MimeConfig;
use crate::error::Result;
use crate::mime::encoding::encode_word;
use crate::mime::{HeaderMap, MimePart};

/// Address headers longer than this are folded after each comma
const FOLD_WIDTH: usize = 78;

/// Headers that only ever come from the message's address fields
const ADDRESS_HEADERS: [&str; 5] = ["To", "Cc", "Bcc", "From", "Reply-To"];

/// Optional parts of a [`Message`]
#[derive(Debug, Clone, Default)]
pub struct MessageOptions {
    pub html: Option<String>,
    pub text: Option<String>,
    pub sender: Option<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub attachments: Vec<Attachment>,
    pub reply_to: Option<Address>,
    pub date: Option<DateTime<Utc>>,
    /// Custom, non-address headers
    pub headers: HeaderMap,
}

impl MessageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn sender(mut self, sender: impl IntoAddress) -> Result<Self> {
        self.sender = Some(sender.into_address()?);
        Ok(self)
    }

    pub fn reply_to(mut self, reply_to: impl IntoAddress) -> Result<Self> {
        self.reply_to = Some(reply_to.into_address()?);
        Ok(self)
    }

    pub fn cc<I>(mut self, cc: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: IntoAddress,
    {
        self.cc.extend(address_list(cc)?);
        Ok(self)
    }

    pub fn bcc<I>(mut self, bcc: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: IntoAddress,
    {
        self.bcc.extend(address_list(bcc)?);
        Ok(self)
    }

    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }
}

/// An e-mail message.
///
/// Provide `html`, `text` or both; with both the body becomes a
/// `multipart/alternative` container and the client picks one. The MIME
/// tree is rebuilt on every serialization, so later changes to headers or
/// the sender show up in the output.
#[derive(Debug, Clone)]
pub struct Message {
    recipients: Vec<Address>,
    subject: String,
    html: Option<String>,
    text: Option<String>,
    sender: Option<Address>,
    cc: Vec<Address>,
    bcc: Vec<Address>,
    attachments: Vec<Attachment>,
    reply_to: Option<Address>,
    date: Option<DateTime<Utc>>,
    headers: HeaderMap,
    message_id: String,
    boundary_seed: String,
}

impl Message {
    /// Create a message.
    ///
    /// Fails with `InvalidAddress` on the first malformed recipient.
    pub fn new<I>(recipients: I, subject: impl Into<String>, options: MessageOptions) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: IntoAddress,
    {
        let recipients = address_list(recipients)?;
        let id = Uuid::new_v4().simple().to_string();

        Ok(Self {
            recipients,
            subject: subject.into(),
            html: options.html,
            text: options.text,
            sender: options.sender,
            cc: options.cc,
            bcc: options.bcc,
            attachments: options.attachments,
            reply_to: options.reply_to,
            date: options.date,
            headers: options.headers,
            message_id: format!("<{}@{}>", id, local_hostname()),
            boundary_seed: id,
        })
    }

    pub fn recipients(&self) -> &[Address] {
        &self.recipients
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn html(&self) -> Option<&str> {
        self.html.as_deref()
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn sender(&self) -> Option<&Address> {
        self.sender.as_ref()
    }

    pub fn cc(&self) -> &[Address] {
        &self.cc
    }

    pub fn bcc(&self) -> &[Address] {
        &self.bcc
    }

    pub fn reply_to(&self) -> Option<&Address> {
        self.reply_to.as_ref()
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.date
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The `Message-ID`, fixed for the lifetime of this message
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn set_sender(&mut self, sender: Address) {
        self.sender = Some(sender);
    }

    /// Set the sender only if none was given
    pub fn set_default_sender(&mut self, sender: &Address) {
        if self.sender.is_none() {
            self.sender = Some(sender.clone());
        }
    }

    /// Envelope sender: the bare `From` address
    pub fn envelope_from(&self) -> Option<&str> {
        self.sender.as_ref().map(Address::email)
    }

    /// Envelope recipients: To, then Cc, then Bcc
    pub fn envelope_recipients(&self) -> Vec<&str> {
        self.recipients
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .map(Address::email)
            .collect()
    }

    fn boundary(&self, level: usize) -> String {
        format!("=_{}_{}", self.boundary_seed, level)
    }

    /// Build the MIME tree for this message
    pub fn build_mime_tree(&self, config: &MimeConfig) -> Result<MimePart> {
        let encoding = config.transfer_encoding;

        // Text before HTML: the last alternative is the preferred one
        let mut bodies: Vec<MimePart> = [("plain", &self.text), ("html", &self.html)]
            .into_iter()
            .filter_map(|(subtype, content)| {
                content
                    .as_deref()
                    .map(|content| MimePart::text(subtype, content, encoding))
            })
            .collect();

        let mut root = if bodies.len() == 1 {
            bodies.remove(0)
        } else {
            let mut alternative = MimePart::multipart("alternative", self.boundary(1));
            for body in bodies {
                alternative.attach(body);
            }
            alternative
        };

        if !self.attachments.is_empty() {
            let mut mixed = MimePart::multipart("mixed", self.boundary(0));
            mixed.attach(root);
            for attachment in &self.attachments {
                mixed.attach(attachment.build_mime_part()?);
            }
            root = mixed;
        }

        debug!(
            "Built MIME tree for {}: {} ({} attachments)",
            self.message_id,
            root.content_type().unwrap_or("?"),
            self.attachments.len()
        );

        let mut headers = HeaderMap::new();
        headers.set("Subject", encode_word(&self.subject));
        headers.set(
            "Date",
            self.date.unwrap_or_else(Utc::now).to_rfc2822(),
        );
        headers.set("Message-ID", self.message_id.as_str());

        let mut custom = self.headers.clone();
        for name in ADDRESS_HEADERS {
            if custom.remove(name).is_some() {
                debug!("Ignoring custom {} header on {}", name, self.message_id);
            }
        }
        headers.merge(&custom);

        let lists = [
            ("To", &self.recipients),
            ("Cc", &self.cc),
            ("Bcc", &self.bcc),
        ];
        for (name, addresses) in lists {
            if !addresses.is_empty() {
                headers.set(name, address_header(name, addresses));
            }
        }
        if let Some(sender) = &self.sender {
            headers.set("From", sender.format());
        }
        if let Some(reply_to) = &self.reply_to {
            headers.set("Reply-To", reply_to.format());
        }

        headers.set("MIME-Version", "1.0");
        headers.merge(&root.headers);
        root.headers = headers;

        Ok(root)
    }

    /// Full message text with the default MIME settings
    pub fn serialize(&self) -> Result<String> {
        self.serialize_with(&MimeConfig::default())
    }

    /// Full message text, headers and encoded body
    pub fn serialize_with(&self, config: &MimeConfig) -> Result<String> {
        self.build_mime_tree(config)?.to_wire()
    }
}

fn address_header(name: &str, addresses: &[Address]) -> String {
    let formatted: Vec<String> = addresses.iter().map(Address::format).collect();
    let single_line = formatted.join(", ");
    if name.len() + 2 + single_line.len() <= FOLD_WIDTH {
        single_line
    } else {
        formatted.join(",\r\n ")
    }
}

fn local_hostname() -> String {
    let hostname = gethostname::gethostname().to_string_lossy().to_string();
    let valid = !hostname.is_empty()
        && hostname
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    if valid {
        hostname
    } else {
        "localhost".to_string()
    }
}
