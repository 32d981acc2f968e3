//! Loading templates from directories
//!
//! A template directory holds up to three text files (subject, html body,
//! text body) plus inline resources whose names match the configured
//! pattern, by default `i-<filename>`. Anything else is attached as is:
//!
//! ```text
//! welcome/
//!   subject.txt
//!   index.htm
//!   index.txt
//!   i-logo.png      -> inline attachment "logo.png"
//!   terms.pdf       -> attachment "terms.pdf"
//! ```
//!
//! Loading is split in two: [`read_payload`] collects file contents from
//! disk and [`Template::from_payload`] interprets them, so templates can
//! also be built from bundled or in-memory files.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use regex::Regex;
use tracing::{debug, info};

use crate::attachment::Attachment;
use crate::config::TemplateDirConfig;
use crate::error::{MailError, Result};
use crate::mime::detect_image_subtype;
use crate::templates::registry::TemplateRegistry;
use crate::templates::template::Template;

/// Flat mapping of file name to file content
pub type Payload = BTreeMap<String, Vec<u8>>;

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Read the regular, non-hidden files of `path`
pub fn read_payload(path: impl AsRef<Path>) -> Result<Payload> {
    let path = path.as_ref();
    let mut payload = Payload::new();

    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            debug!("Skipping non UTF-8 file name in {}", path.display());
            continue;
        };
        if is_hidden(&name) || !entry.file_type()?.is_file() {
            continue;
        }
        payload.insert(name, fs::read(entry.path())?);
    }

    Ok(payload)
}

fn decode_text(name: &str, content: &[u8]) -> Result<String> {
    String::from_utf8(content.to_vec())
        .map_err(|_| MailError::Encoding(format!("Template file {} is not valid UTF-8", name)))
}

/// Attachment filename for `name` if it matches the inline pattern.
/// Matches must start at the beginning of the name.
fn inline_filename(pattern: &Regex, name: &str) -> Option<String> {
    let captures = pattern.captures(name)?;
    let whole = captures.get(0)?;
    if whole.start() != 0 {
        return None;
    }
    let filename = captures.get(1).unwrap_or(whole).as_str();
    Some(filename.to_string())
}

impl Template {
    /// Build a template from file contents.
    ///
    /// Hidden entries and names containing a path separator are ignored.
    /// The subject is trimmed. Files matching the inline pattern become
    /// inline attachments (typed as images when they are one), every other
    /// file a plain attachment. Fails with `NotFound` when there is no
    /// subject file.
    pub fn from_payload(files: &Payload, config: &TemplateDirConfig) -> Result<Self> {
        let pattern = Regex::new(&config.inline_pattern)?;

        let mut subject = None;
        let mut html = None;
        let mut text = None;
        let mut attachments = Vec::new();

        for (name, content) in files {
            if is_hidden(name) || name.contains('/') || name.contains('\\') {
                continue;
            }

            if *name == config.subject_name {
                subject = Some(decode_text(name, content)?.trim().to_string());
            } else if *name == config.html_name {
                html = Some(decode_text(name, content)?);
            } else if *name == config.text_name {
                text = Some(decode_text(name, content)?);
            } else if let Some(filename) = inline_filename(&pattern, name) {
                debug!("Inline resource {} from {}", filename, name);
                let attachment = if detect_image_subtype(content).is_some() {
                    Attachment::inline_image(filename, content.clone())
                } else {
                    Attachment::inline(filename, content.clone())
                };
                attachments.push(attachment);
            } else {
                attachments.push(Attachment::new(name.as_str(), content.clone()));
            }
        }

        let subject = subject.ok_or_else(|| {
            MailError::NotFound(format!("Template subject file {}", config.subject_name))
        })?;

        let mut template = Template::new(subject).with_attachments(attachments);
        if let Some(html) = html {
            template = template.with_html(html);
        }
        if let Some(text) = text {
            template = template.with_text(text);
        }
        Ok(template)
    }

    /// Load a template from a directory on disk
    pub fn from_directory(path: impl AsRef<Path>, config: &TemplateDirConfig) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading template from {}", path.display());
        Self::from_payload(&read_payload(path)?, config)
    }
}

impl TemplateRegistry {
    /// One template per non-hidden subdirectory, named after it
    pub fn from_directory(path: impl AsRef<Path>, config: &TemplateDirConfig) -> Result<Self> {
        let path = path.as_ref();
        let mut entries = Vec::new();

        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if is_hidden(&name) || !entry.file_type()?.is_dir() {
                continue;
            }
            entries.push((name, entry.path()));
        }
        entries.sort();

        let mut registry = TemplateRegistry::new();
        for (name, dir) in entries {
            registry.add(name, Template::from_directory(dir, config)?)?;
        }

        info!(
            "Loaded {} templates from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::Disposition;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

    fn file(name: &str, content: impl AsRef<[u8]>) -> (String, Vec<u8>) {
        (name.to_string(), content.as_ref().to_vec())
    }

    fn payload<const N: usize>(files: [(String, Vec<u8>); N]) -> Payload {
        files.into_iter().collect()
    }

    #[test]
    fn test_from_payload() {
        let files = payload([
            file("subject.txt", b"  Hello $user \n"),
            file("index.htm", b"<img src=\"cid:logo.png\"> $user"),
            file("index.txt", b"Hi $user"),
            file("i-logo.png", PNG),
            file("other.pdf", b"%PDF-1.4"),
            file(".hidden", b"ignored"),
        ]);
        let template = Template::from_payload(&files, &TemplateDirConfig::default()).unwrap();

        assert_eq!(template.subject(), "Hello $user");
        assert_eq!(template.html(), Some("<img src=\"cid:logo.png\"> $user"));
        assert_eq!(template.text(), Some("Hi $user"));
        assert_eq!(template.attachments().len(), 2);

        let logo = &template.attachments()[0];
        assert_eq!(logo.filename(), Some("logo.png"));
        assert_eq!(logo.disposition(), Disposition::Inline);
        assert_eq!(logo.content_id(), Some("<logo.png>"));
        assert!(logo.is_image());

        let pdf = &template.attachments()[1];
        assert_eq!(pdf.filename(), Some("other.pdf"));
        assert_eq!(pdf.disposition(), Disposition::Attachment);
        assert_eq!(pdf.content_type(), Some("application/octet-stream"));
        assert!(pdf.content_id().is_none());
    }

    #[test]
    fn test_inline_non_image() {
        let files = payload([file("subject.txt", b"Hi"), file("i-style.css", b"p { }")]);
        let template = Template::from_payload(&files, &TemplateDirConfig::default()).unwrap();

        let css = &template.attachments()[0];
        assert_eq!(css.filename(), Some("style.css"));
        assert_eq!(css.disposition(), Disposition::Inline);
        assert!(!css.is_image());
    }

    #[test]
    fn test_missing_bodies_are_absent() {
        let files = payload([file("subject.txt", b"Hi")]);
        let template = Template::from_payload(&files, &TemplateDirConfig::default()).unwrap();
        assert_eq!(template.html(), None);
        assert_eq!(template.text(), None);
        assert!(template.attachments().is_empty());
    }

    #[test]
    fn test_missing_subject() {
        let files = payload([file("index.txt", b"Hi")]);
        assert!(matches!(
            Template::from_payload(&files, &TemplateDirConfig::default()),
            Err(MailError::NotFound(_))
        ));
    }

    #[test]
    fn test_subdirectory_entries_skipped() {
        let files = payload([file("subject.txt", b"Hi"), file("nested/i-logo.png", PNG)]);
        let template = Template::from_payload(&files, &TemplateDirConfig::default()).unwrap();
        assert!(template.attachments().is_empty());
    }

    #[test]
    fn test_custom_names_and_pattern() {
        let config = TemplateDirConfig {
            subject_name: "subject".to_string(),
            html_name: "body.html".to_string(),
            text_name: "body.txt".to_string(),
            inline_pattern: r"^inline_".to_string(),
        };
        let files = payload([
            file("subject", b"S"),
            file("body.html", b"<p>H</p>"),
            file("inline_logo.png", PNG),
            file("i-other.png", PNG),
        ]);
        let template = Template::from_payload(&files, &config).unwrap();

        assert_eq!(template.html(), Some("<p>H</p>"));
        let names: Vec<_> = template
            .attachments()
            .iter()
            .map(|a| (a.filename().unwrap_or_default(), a.disposition()))
            .collect();
        // No capture group: the whole match names the attachment
        assert_eq!(
            names,
            vec![
                ("i-other.png", Disposition::Attachment),
                ("inline_", Disposition::Inline),
            ]
        );
    }

    #[test]
    fn test_match_must_start_at_beginning() {
        let pattern = Regex::new("i-(.*)").unwrap();
        assert_eq!(inline_filename(&pattern, "i-logo.png").as_deref(), Some("logo.png"));
        assert_eq!(inline_filename(&pattern, "xi-logo.png"), None);
    }

    #[test]
    fn test_invalid_pattern() {
        let config = TemplateDirConfig {
            inline_pattern: "(".to_string(),
            ..TemplateDirConfig::default()
        };
        let files = payload([file("subject.txt", b"Hi")]);
        assert!(matches!(
            Template::from_payload(&files, &config),
            Err(MailError::Pattern(_))
        ));
    }

    #[test]
    fn test_invalid_utf8_subject() {
        let files = payload([file("subject.txt", b"\xff\xfe")]);
        assert!(matches!(
            Template::from_payload(&files, &TemplateDirConfig::default()),
            Err(MailError::Encoding(_))
        ));
    }
}
