//! letterpress: compose, template and dispatch e-mail
//!
//! Builds standards-conforming MIME messages from a few high-level inputs
//! and keeps reusable message templates around for rendering.
//!
//! # Features
//!
//! - **Messages**: html and/or text bodies, attachments, inline images,
//!   custom headers, RFC 2047 encoded non-ASCII headers
//! - **Templates**: `$name` substitution out of the box, optional
//!   `minijinja` engine, defaults and shared renderers via a registry
//! - **Dispatch**: SMTP transport, plus a loopback mailbox for tests
//!
//! # Example
//!
//! ```
//! use letterpress::{values, LoopbackTransport, MessageOptions, Postman, Template};
//!
//! # fn main() -> letterpress::Result<()> {
//! let template = Template::new("Hello $user").with_text("Welcome aboard, $user!");
//! let mut message = template.build_message(
//!     ["user@example.com"],
//!     &values([("user", "Ann")]),
//!     MessageOptions::new(),
//! )?;
//!
//! let mut postman = Postman::new("robot@example.com", LoopbackTransport::new())?;
//! let mut loopback = postman.loopback();
//! loopback.connect()?.send(&mut message)?;
//!
//! assert_eq!(loopback.mailbox().len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`address`]: Addresses and display names
//! - [`attachment`]: File attachments and inline images
//! - [`message`]: Message assembly and serialization
//! - [`mime`]: MIME tree and header encoding
//! - [`templates`]: Templates, renderers and the registry
//! - [`transport`]: SMTP and loopback transports
//! - [`postman`]: Sending through a transport
//! - [`config`]: Configuration management
//! - [`error`]: Error types and handling

pub mod address;
pub mod attachment;
pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod mime;
pub mod postman;
pub mod templates;
pub mod transport;

// Re-export commonly used types
pub use address::{Address, IntoAddress};
pub use attachment::{Attachment, Disposition};
pub use config::Config;
pub use error::{MailError, Result};
pub use message::{Message, MessageOptions};
pub use postman::{ConnectedPostman, LoopbackGuard, Postman};
pub use templates::{values, Template, TemplateRegistry, Values};
pub use transport::{LoopbackTransport, SmtpTransport, Transport};
