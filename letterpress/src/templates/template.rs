//! Message templates

use std::cell::{OnceCell, RefCell};
use std::sync::Arc;

use tracing::debug;

use crate::address::IntoAddress;
use crate::attachment::Attachment;
use crate::error::{MailError, Result};
use crate::message::{Message, MessageOptions};
use crate::templates::renderer::{Renderer, RendererFactory, SimpleRenderer, Values};

/// Subject, html and text compiled by one factory
#[derive(Debug)]
pub(crate) struct Compiled {
    subject: Box<dyn Renderer>,
    html: Option<Box<dyn Renderer>>,
    text: Option<Box<dyn Renderer>>,
}

impl Compiled {
    fn new(template: &Template, factory: &dyn RendererFactory) -> Result<Self> {
        let compile = |source: &Option<String>| {
            source.as_deref().map(|s| factory.compile(s)).transpose()
        };

        Ok(Self {
            subject: factory.compile(&template.subject)?,
            html: compile(&template.html)?,
            text: compile(&template.text)?,
        })
    }

    fn simple(template: &Template) -> Self {
        let compile = |source: &Option<String>| {
            source
                .as_deref()
                .map(|s| Box::new(SimpleRenderer::new(s)) as Box<dyn Renderer>)
        };

        Self {
            subject: Box::new(SimpleRenderer::new(&template.subject)),
            html: compile(&template.html),
            text: compile(&template.text),
        }
    }
}

/// A reusable message: subject, html and text bodies with placeholders,
/// plus attachments copied into every message built from it.
///
/// A renderer can be assigned once; without one, `$name` substitution is
/// used. Defaults are merged below the values given at render time.
#[derive(Debug)]
pub struct Template {
    subject: String,
    html: Option<String>,
    text: Option<String>,
    attachments: Vec<Attachment>,
    default_values: RefCell<Values>,
    renderer: OnceCell<Compiled>,
    fallback: OnceCell<Compiled>,
}

impl Template {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            html: None,
            text: None,
            attachments: Vec::new(),
            default_values: RefCell::new(Values::new()),
            renderer: OnceCell::new(),
            fallback: OnceCell::new(),
        }
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_attachments(mut self, attachments: impl IntoIterator<Item = Attachment>) -> Self {
        self.attachments.extend(attachments);
        self
    }

    pub fn with_defaults(self, values: Values) -> Self {
        self.defaults(values);
        self
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

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Snapshot of the current default values
    pub fn default_values(&self) -> Values {
        self.default_values.borrow().clone()
    }

    /// Merge into the default values; later calls win on conflicting keys
    pub fn defaults(&self, values: Values) {
        self.default_values.borrow_mut().extend(values);
    }

    /// Whether a renderer was explicitly assigned
    pub fn has_renderer(&self) -> bool {
        self.renderer.get().is_some()
    }

    /// Compile subject and bodies with `factory`.
    ///
    /// Only one assignment is allowed; a second one fails with
    /// `DuplicateName`. A compile error leaves the template unassigned.
    pub fn set_renderer(&self, factory: Arc<dyn RendererFactory>) -> Result<()> {
        if self.has_renderer() {
            return Err(MailError::DuplicateName(
                "Template renderer already assigned".to_string(),
            ));
        }

        let compiled = self.compile(factory.as_ref())?;
        self.install(compiled)?;

        debug!("Assigned renderer {:?} to template {:?}", factory, self.subject);
        Ok(())
    }

    /// Compile subject and bodies without assigning the result
    pub(crate) fn compile(&self, factory: &dyn RendererFactory) -> Result<Compiled> {
        Compiled::new(self, factory)
    }

    pub(crate) fn install(&self, compiled: Compiled) -> Result<()> {
        self.renderer.set(compiled).map_err(|_| {
            MailError::DuplicateName("Template renderer already assigned".to_string())
        })
    }

    fn compiled(&self) -> &Compiled {
        match self.renderer.get() {
            Some(compiled) => compiled,
            None => self.fallback.get_or_init(|| Compiled::simple(self)),
        }
    }

    /// Render a message for `recipients`.
    ///
    /// `values` override the defaults. Template attachments come first,
    /// followed by any in `options`; every other option passes through.
    pub fn build_message<I>(
        &self,
        recipients: I,
        values: &Values,
        options: MessageOptions,
    ) -> Result<Message>
    where
        I: IntoIterator,
        I::Item: IntoAddress,
    {
        let mut merged = self.default_values();
        merged.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));

        let compiled = self.compiled();
        let subject = compiled.subject.render(&merged)?;
        let html = compiled
            .html
            .as_ref()
            .map(|r| r.render(&merged))
            .transpose()?;
        let text = compiled
            .text
            .as_ref()
            .map(|r| r.render(&merged))
            .transpose()?;

        let mut attachments = self.attachments.clone();
        attachments.extend(options.attachments);

        debug!(
            "Rendered template {:?} with {} values, {} attachments",
            self.subject,
            merged.len(),
            attachments.len()
        );

        Message::new(
            recipients,
            subject,
            MessageOptions {
                html,
                text,
                attachments,
                ..options
            },
        )
    }
}
