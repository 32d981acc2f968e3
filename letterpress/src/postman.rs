//! Message dispatch
//!
//! A [`Postman`] owns a default sender and a [`Transport`]. Sending goes
//! through a [`ConnectedPostman`] guard that closes the connection when
//! dropped:
//!
//! ```no_run
//! use letterpress::{Message, MessageOptions, Postman, SmtpTransport};
//! use letterpress::config::SmtpConfig;
//!
//! # fn main() -> letterpress::Result<()> {
//! let mut postman = Postman::new("robot@example.com", SmtpTransport::new(SmtpConfig::default()))?;
//! let mut message = Message::new(["user@example.com"], "Hello", MessageOptions::new().text("Hi"))?;
//!
//! let mut connection = postman.connect()?;
//! connection.send(&mut message)?;
//! connection.disconnect()?;
//! # Ok(())
//! # }
//! ```
//!
//! [`Postman::loopback`] temporarily swaps the transport for an in-memory
//! mailbox, which is how tests observe outgoing mail.

use std::ops::{Deref, DerefMut};

use tracing::{debug, info, warn};

use crate::address::{Address, IntoAddress};
use crate::config::MimeConfig;
use crate::error::{MailError, Result};
use crate::message::Message;
use crate::transport::{LoopbackTransport, Transport};

pub struct Postman {
    sender: Address,
    transport: Box<dyn Transport>,
    mime: MimeConfig,
}

impl Postman {
    pub fn new(sender: impl IntoAddress, transport: impl Transport + 'static) -> Result<Self> {
        Ok(Self {
            sender: sender.into_address()?,
            transport: Box::new(transport),
            mime: MimeConfig::default(),
        })
    }

    pub fn with_mime_config(mut self, mime: MimeConfig) -> Self {
        self.mime = mime;
        self
    }

    pub fn sender(&self) -> &Address {
        &self.sender
    }

    /// Open the transport; it is closed when the guard goes away
    pub fn connect(&mut self) -> Result<ConnectedPostman<'_>> {
        self.transport.connect()?;
        debug!("Postman connected");
        Ok(ConnectedPostman {
            postman: self,
            open: true,
        })
    }

    /// Capture outgoing mail in memory until the guard is dropped.
    ///
    /// Guards nest: only the innermost one records, and each drop restores
    /// the transport that was active before it.
    pub fn loopback(&mut self) -> LoopbackGuard<'_> {
        let mailbox = LoopbackTransport::new();
        let previous = std::mem::replace(&mut self.transport, Box::new(mailbox.clone()));
        debug!("Loopback enabled");
        LoopbackGuard {
            postman: self,
            previous: Some(previous),
            mailbox,
        }
    }

    fn deliver(&mut self, message: &mut Message) -> Result<()> {
        message.set_default_sender(&self.sender);

        let from = message
            .envelope_from()
            .ok_or_else(|| MailError::Delivery("Message has no sender".to_string()))?
            .to_string();
        let to: Vec<String> = message
            .envelope_recipients()
            .into_iter()
            .map(str::to_string)
            .collect();
        if to.is_empty() {
            return Err(MailError::Delivery("Message has no recipients".to_string()));
        }

        let raw = message.serialize_with(&self.mime)?;
        self.transport.send(&raw, &from, &to)?;

        info!(
            "Sent message {} from {} to {} recipients",
            message.message_id(),
            from,
            to.len()
        );
        Ok(())
    }
}

/// An open connection; disconnects on drop
pub struct ConnectedPostman<'a> {
    postman: &'a mut Postman,
    open: bool,
}

impl ConnectedPostman<'_> {
    /// Send `message`, filling in the default sender when it has none
    pub fn send(&mut self, message: &mut Message) -> Result<()> {
        self.postman.deliver(message)
    }

    /// Close the connection explicitly, reporting errors
    pub fn disconnect(mut self) -> Result<()> {
        self.open = false;
        self.postman.transport.disconnect()
    }
}

impl Drop for ConnectedPostman<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.postman.transport.disconnect() {
                warn!("Failed to disconnect: {}", e);
            }
        }
    }
}

/// Active loopback; derefs to the postman
pub struct LoopbackGuard<'a> {
    postman: &'a mut Postman,
    previous: Option<Box<dyn Transport>>,
    mailbox: LoopbackTransport,
}

impl LoopbackGuard<'_> {
    /// Handle on the captured messages; stays usable after the guard drops
    pub fn mailbox(&self) -> LoopbackTransport {
        self.mailbox.clone()
    }
}

impl Deref for LoopbackGuard<'_> {
    type Target = Postman;

    fn deref(&self) -> &Postman {
        &*self.postman
    }
}

impl DerefMut for LoopbackGuard<'_> {
    fn deref_mut(&mut self) -> &mut Postman {
        &mut *self.postman
    }
}

impl Drop for LoopbackGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.postman.transport = previous;
            debug!("Loopback disabled, {} messages captured", self.mailbox.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageOptions;
    use crate::transport::MockTransport;

    fn message() -> Message {
        Message::new(["to@example.com"], "Hi", MessageOptions::new().text("Hello")).unwrap()
    }

    #[test]
    fn test_send_injects_default_sender() {
        let mut transport = MockTransport::new();
        transport.expect_connect().times(1).returning(|| Ok(()));
        transport
            .expect_send()
            .withf(|raw, from, to| {
                raw.contains("From: Robot <robot@example.com>\r\n")
                    && from == "robot@example.com"
                    && to == ["to@example.com".to_string()]
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        transport.expect_disconnect().times(1).returning(|| Ok(()));

        let mut postman = Postman::new(("robot@example.com", "Robot"), transport).unwrap();
        let mut message = message();
        {
            let mut connection = postman.connect().unwrap();
            connection.send(&mut message).unwrap();
        }

        assert_eq!(message.sender().map(Address::email), Some("robot@example.com"));
    }

    #[test]
    fn test_explicit_sender_kept() {
        let mut transport = MockTransport::new();
        transport.expect_connect().returning(|| Ok(()));
        transport
            .expect_send()
            .withf(|_, from, _| from == "me@example.com")
            .times(1)
            .returning(|_, _, _| Ok(()));
        transport.expect_disconnect().returning(|| Ok(()));

        let mut postman = Postman::new("robot@example.com", transport).unwrap();
        let mut message = Message::new(
            ["to@example.com"],
            "Hi",
            MessageOptions::new().sender("me@example.com").unwrap(),
        )
        .unwrap();

        let mut connection = postman.connect().unwrap();
        connection.send(&mut message).unwrap();
        connection.disconnect().unwrap();
    }

    #[test]
    fn test_explicit_disconnect_runs_once() {
        let mut transport = MockTransport::new();
        transport.expect_connect().times(1).returning(|| Ok(()));
        transport.expect_disconnect().times(1).returning(|| Ok(()));

        let mut postman = Postman::new("robot@example.com", transport).unwrap();
        let connection = postman.connect().unwrap();
        connection.disconnect().unwrap();
    }

    #[test]
    fn test_connect_failure() {
        let mut transport = MockTransport::new();
        transport
            .expect_connect()
            .returning(|| Err(MailError::Connection("refused".to_string())));
        transport.expect_disconnect().never();

        let mut postman = Postman::new("robot@example.com", transport).unwrap();
        assert!(matches!(postman.connect(), Err(MailError::Connection(_))));
    }

    #[test]
    fn test_delivery_error_propagates() {
        let mut transport = MockTransport::new();
        transport.expect_connect().returning(|| Ok(()));
        transport
            .expect_send()
            .returning(|_, _, _| Err(MailError::Delivery("550 rejected".to_string())));
        transport.expect_disconnect().times(1).returning(|| Ok(()));

        let mut postman = Postman::new("robot@example.com", transport).unwrap();
        let mut connection = postman.connect().unwrap();
        assert!(matches!(
            connection.send(&mut message()),
            Err(MailError::Delivery(_))
        ));
    }

    #[test]
    fn test_no_recipients() {
        let mut transport = MockTransport::new();
        transport.expect_connect().returning(|| Ok(()));
        transport.expect_send().never();
        transport.expect_disconnect().returning(|| Ok(()));

        let mut postman = Postman::new("robot@example.com", transport).unwrap();
        let mut message = Message::new(Vec::<String>::new(), "Hi", MessageOptions::new()).unwrap();
        let mut connection = postman.connect().unwrap();
        assert!(matches!(
            connection.send(&mut message),
            Err(MailError::Delivery(_))
        ));
    }

    #[test]
    fn test_loopback_restores_transport() {
        let mut transport = MockTransport::new();
        transport.expect_connect().times(1).returning(|| Ok(()));
        transport.expect_send().times(1).returning(|_, _, _| Ok(()));
        transport.expect_disconnect().times(1).returning(|| Ok(()));

        let mut postman = Postman::new("robot@example.com", transport).unwrap();

        let mailbox = {
            let mut loopback = postman.loopback();
            let mut connection = loopback.connect().unwrap();
            connection.send(&mut message()).unwrap();
            drop(connection);
            loopback.mailbox()
        };
        assert_eq!(mailbox.len(), 1);

        let mut connection = postman.connect().unwrap();
        connection.send(&mut message()).unwrap();
        assert_eq!(mailbox.len(), 1);
    }

    #[test]
    fn test_nested_loopback_innermost_captures() {
        let mut postman = Postman::new("robot@example.com", LoopbackTransport::new()).unwrap();

        let mut outer = postman.loopback();
        let outer_box = outer.mailbox();
        {
            let mut inner = outer.loopback();
            let inner_box = inner.mailbox();
            inner.connect().unwrap().send(&mut message()).unwrap();
            assert_eq!(inner_box.len(), 1);
            assert!(outer_box.is_empty());
        }

        outer.connect().unwrap().send(&mut message()).unwrap();
        assert_eq!(outer_box.len(), 1);
    }
}
