//! In-memory transport

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::error::Result;
use crate::transport::Transport;

/// A message captured by [`LoopbackTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub raw: String,
    pub from: String,
    pub to: Vec<String>,
}

/// Records messages instead of delivering them.
///
/// Clones share the same mailbox, so a handle kept by a test still sees
/// messages sent after the transport was moved into a postman.
#[derive(Debug, Clone, Default)]
pub struct LoopbackTransport {
    mailbox: Rc<RefCell<Vec<SentMessage>>>,
    connected: bool,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything captured so far
    pub fn messages(&self) -> Vec<SentMessage> {
        self.mailbox.borrow().clone()
    }

    /// Drain the mailbox
    pub fn take_messages(&self) -> Vec<SentMessage> {
        std::mem::take(&mut *self.mailbox.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.mailbox.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mailbox.borrow().is_empty()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Transport for LoopbackTransport {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn send(&mut self, raw: &str, from: &str, to: &[String]) -> Result<()> {
        debug!("Loopback captured message from {} to {:?}", from, to);
        self.mailbox.borrow_mut().push(SentMessage {
            raw: raw.to_string(),
            from: from.to_string(),
            to: to.to_vec(),
        });
        Ok(())
    }
}
