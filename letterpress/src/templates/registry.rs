//! Named collection of templates

use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;

use crate::address::IntoAddress;
use crate::error::{MailError, Result};
use crate::message::{Message, MessageOptions};
use crate::templates::renderer::{RendererFactory, Values};
use crate::templates::template::Template;

/// Templates by name, with shared defaults and renderer.
///
/// Templates are held through shared handles: callers keep using the
/// `Rc<Template>` they registered and see registry-wide changes.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, Rc<Template>>,
    defaults: Values,
    renderer: OnceCell<Arc<dyn RendererFactory>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `template` under `name`.
    ///
    /// The registry renderer is applied unless the template already has
    /// one, then the registry defaults are merged in.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        template: impl Into<Rc<Template>>,
    ) -> Result<Rc<Template>> {
        let name = name.into();
        if self.templates.contains_key(&name) {
            return Err(MailError::DuplicateName(name));
        }

        let template = template.into();
        if let Some(factory) = self.renderer.get() {
            if !template.has_renderer() {
                template.set_renderer(Arc::clone(factory))?;
            }
        }
        template.defaults(self.defaults.clone());

        debug!("Registered template {}", name);
        self.templates.insert(name, Rc::clone(&template));
        Ok(template)
    }

    /// Merge into the shared defaults and push them to every template
    pub fn defaults(&mut self, values: Values) -> &mut Self {
        self.defaults.extend(values);
        for template in self.templates.values() {
            template.defaults(self.defaults.clone());
        }
        self
    }

    pub fn default_values(&self) -> &Values {
        &self.defaults
    }

    /// Assign the shared renderer, once.
    ///
    /// Templates that already have a renderer keep it. Later additions
    /// receive this one. Every template is compiled before any is
    /// assigned, so a compile error leaves the registry and all its
    /// templates unchanged.
    pub fn set_renderer(&mut self, factory: Arc<dyn RendererFactory>) -> Result<&mut Self> {
        if self.renderer.get().is_some() {
            return Err(MailError::DuplicateName(
                "Registry renderer already assigned".to_string(),
            ));
        }

        let compiled = self
            .templates
            .iter()
            .filter(|(_, template)| !template.has_renderer())
            .map(|(name, template)| {
                template
                    .compile(factory.as_ref())
                    .map(|compiled| (name, template, compiled))
            })
            .collect::<Result<Vec<_>>>()?;

        for (name, template, compiled) in compiled {
            debug!("Applying registry renderer to template {}", name);
            template.install(compiled)?;
        }

        self.renderer.set(factory).map_err(|_| {
            MailError::DuplicateName("Registry renderer already assigned".to_string())
        })?;
        Ok(self)
    }

    /// Fails with `NotFound` for unknown names
    pub fn get(&self, name: &str) -> Result<Rc<Template>> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| MailError::NotFound(format!("Template {}", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Look up `name` and build a message from it
    pub fn build_message<I>(
        &self,
        name: &str,
        recipients: I,
        values: &Values,
        options: MessageOptions,
    ) -> Result<Message>
    where
        I: IntoIterator,
        I::Item: IntoAddress,
    {
        self.get(name)?.build_message(recipients, values, options)
    }
}
