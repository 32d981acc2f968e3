//! Template rendering strategies
//!
//! A [`RendererFactory`] compiles a template string into a [`Renderer`];
//! the renderer can then be called any number of times with different
//! values. Two strategies ship with the crate:
//!
//! - [`SimpleRenderer`]: `$name` / `${name}` substitution, `$$` for a literal `$`
//! - `MiniJinjaRenderer` (feature `minijinja`): conditionals, loops and
//!   filters with strict undefined handling

use std::collections::BTreeMap;
use std::fmt::Debug;

use serde_json::Value;

use crate::error::{MailError, Result};

/// Values available to a template
pub type Values = BTreeMap<String, Value>;

/// Build [`Values`] from key/value pairs
pub fn values<I, K, V>(pairs: I) -> Values
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// A compiled template string
pub trait Renderer: Debug + Send + Sync {
    /// Render with the given values. Fails with `MissingValue` when a
    /// referenced value is absent.
    fn render(&self, values: &Values) -> Result<String>;
}

/// Compiles template strings into renderers; options live on the factory
pub trait RendererFactory: Debug + Send + Sync {
    fn compile(&self, template: &str) -> Result<Box<dyn Renderer>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// `$identifier` and `${identifier}` substitution.
///
/// `$$` renders a single `$`. A `$` that does not start a placeholder is
/// kept as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleRenderer {
    segments: Vec<Segment>,
}

impl SimpleRenderer {
    pub fn new(template: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' {
                literal.push(c);
                continue;
            }

            match chars.peek() {
                Some('$') => {
                    chars.next();
                    literal.push('$');
                }
                Some('{') => {
                    let mut lookahead = chars.clone();
                    lookahead.next(); // consume {
                    let name: String = lookahead
                        .clone()
                        .take_while(|ch| *ch != '}')
                        .collect();
                    let closed = lookahead.clone().nth(name.chars().count()) == Some('}');

                    if closed && is_identifier(&name) {
                        for _ in 0..name.chars().count() + 2 {
                            chars.next();
                        }
                        push_placeholder(&mut segments, &mut literal, name);
                    } else {
                        literal.push('$');
                    }
                }
                Some(ch) if is_identifier_start(*ch) => {
                    let mut name = String::new();
                    while let Some(ch) = chars.peek() {
                        if ch.is_ascii_alphanumeric() || *ch == '_' {
                            name.push(*ch);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    push_placeholder(&mut segments, &mut literal, name);
                }
                _ => literal.push('$'),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { segments }
    }

    /// Names referenced by the template, in order of first appearance
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Placeholder(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }
}

fn push_placeholder(segments: &mut Vec<Segment>, literal: &mut String, name: String) {
    if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(literal)));
    }
    segments.push(Segment::Placeholder(name));
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if is_identifier_start(first) => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Text form of a value: strings verbatim, null as empty, JSON otherwise
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl Renderer for SimpleRenderer {
    fn render(&self, values: &Values) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    let value = values
                        .get(name)
                        .ok_or_else(|| MailError::MissingValue(name.clone()))?;
                    out.push_str(&display_value(value));
                }
            }
        }
        Ok(out)
    }
}

/// Factory for [`SimpleRenderer`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleRendererFactory;

impl RendererFactory for SimpleRendererFactory {
    fn compile(&self, template: &str) -> Result<Box<dyn Renderer>> {
        Ok(Box::new(SimpleRenderer::new(template)))
    }
}

#[cfg(feature = "minijinja")]
pub use self::jinja::{MiniJinjaFactory, MiniJinjaRenderer};

#[cfg(feature = "minijinja")]
mod jinja {
    use minijinja::{Environment, ErrorKind, UndefinedBehavior};

    use super::{Renderer, RendererFactory, Values};
    use crate::error::{MailError, Result};

    /// Jinja-style templates; undefined values are an error
    #[derive(Debug, Clone, Default)]
    pub struct MiniJinjaFactory {
        pub trim_blocks: bool,
        pub lstrip_blocks: bool,
    }

    pub struct MiniJinjaRenderer {
        env: Environment<'static>,
        source: String,
    }

    impl std::fmt::Debug for MiniJinjaRenderer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MiniJinjaRenderer")
                .field("source", &self.source)
                .finish()
        }
    }

    fn convert(err: minijinja::Error) -> MailError {
        match err.kind() {
            ErrorKind::UndefinedError => MailError::MissingValue(err.to_string()),
            _ => MailError::Render(err.to_string()),
        }
    }

    impl RendererFactory for MiniJinjaFactory {
        fn compile(&self, template: &str) -> Result<Box<dyn Renderer>> {
            let mut env = Environment::new();
            env.set_undefined_behavior(UndefinedBehavior::Strict);
            env.set_trim_blocks(self.trim_blocks);
            env.set_lstrip_blocks(self.lstrip_blocks);

            // Surface syntax errors at compile time
            env.template_from_str(template).map_err(convert)?;

            Ok(Box::new(MiniJinjaRenderer {
                env,
                source: template.to_string(),
            }))
        }
    }

    impl Renderer for MiniJinjaRenderer {
        fn render(&self, values: &Values) -> Result<String> {
            self.env.render_str(&self.source, values).map_err(convert)
        }
    }
}
