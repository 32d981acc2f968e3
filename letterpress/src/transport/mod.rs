//! Delivery channels
//!
//! A [`Transport`] takes a serialized message plus its envelope and hands
//! it to something: an SMTP server, or an in-memory mailbox for tests.

pub mod loopback;
pub mod smtp;

pub use loopback::{LoopbackTransport, SentMessage};
pub use smtp::SmtpTransport;

use crate::error::Result;

#[cfg_attr(test, mockall::automock)]
pub trait Transport {
    /// Open the connection; may be called again after `disconnect`
    fn connect(&mut self) -> Result<()>;

    /// Close the connection. Disconnecting twice is harmless.
    fn disconnect(&mut self) -> Result<()>;

    /// Deliver `raw` from the envelope sender to every recipient
    fn send(&mut self, raw: &str, from: &str, to: &[String]) -> Result<()>;
}
