//! Message templates
//!
//! Templates hold a subject, html and text body with placeholders, plus
//! attachments shared by every message rendered from them. A registry
//! groups templates by name and applies shared defaults and renderer.

pub mod directory;
pub mod registry;
pub mod renderer;
pub mod template;

pub use directory::{read_payload, Payload};
pub use registry::TemplateRegistry;
pub use renderer::{values, Renderer, RendererFactory, SimpleRenderer, SimpleRendererFactory, Values};
#[cfg(feature = "minijinja")]
pub use renderer::{MiniJinjaFactory, MiniJinjaRenderer};
pub use template::Template;
