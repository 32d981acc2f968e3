//! SMTP client transport
//!
//! SMTP (RFC 5321) over a blocking TCP stream: EHLO, optional STARTTLS
//! (RFC 3207) or implicit TLS, optional AUTH PLAIN, then MAIL/RCPT/DATA
//! per message and QUIT on disconnect. One connection carries any number
//! of messages. Credentials are only sent over an encrypted session
//! unless `allow_insecure_auth` is set.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use rustls::{Certificate, ClientConfig, ClientConnection, RootCertStore, ServerName, StreamOwned};
use tracing::{debug, error, info, warn};

use crate::config::{SmtpConfig, SmtpSecurity};
use crate::error::{MailError, Result};
use crate::transport::Transport;

/// A parsed server reply, possibly multi-line
#[derive(Debug, Clone, PartialEq, Eq)]
struct Reply {
    code: u16,
    text: String,
}

/// Socket under a session; STARTTLS swaps `Plain` for `Tls`
enum Stream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.read(buf),
            Stream::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.write(buf),
            Stream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(s) => s.flush(),
            Stream::Tls(s) => s.flush(),
        }
    }
}

struct Session {
    stream: BufReader<Stream>,
}

impl Session {
    fn new(stream: Stream) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    fn is_encrypted(&self) -> bool {
        matches!(self.stream.get_ref(), Stream::Tls(_))
    }

    /// Give back the plain socket for a TLS upgrade
    fn into_tcp(self) -> Result<TcpStream> {
        match self.stream.into_inner() {
            Stream::Plain(tcp) => Ok(tcp),
            Stream::Tls(_) => Err(MailError::Tls("TLS is already active".to_string())),
        }
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        let writer = self.stream.get_mut();
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        if line.starts_with("AUTH") {
            debug!("> AUTH ****");
        } else {
            debug!("> {}", line);
        }
        self.write_raw(format!("{}\r\n", line).as_bytes())
    }

    fn read_reply(&mut self) -> Result<Reply> {
        let mut text = String::new();

        loop {
            let mut line = String::new();
            if self.stream.read_line(&mut line)? == 0 {
                return Err(MailError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "SMTP server closed the connection",
                )));
            }
            debug!("< {}", line.trim_end());
            text.push_str(&line);

            // Last line has a space (or nothing) after the code
            if line.as_bytes().get(3) != Some(&b'-') {
                break;
            }
        }

        let code = text
            .get(..3)
            .and_then(|c| c.parse::<u16>().ok())
            .ok_or_else(|| {
                MailError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Malformed SMTP reply: {}", text.trim_end()),
                ))
            })?;

        Ok(Reply {
            code,
            text: text.trim_end().to_string(),
        })
    }

    /// Send `line` (if any) and require one of `expected`
    fn command(
        &mut self,
        line: Option<&str>,
        expected: &[u16],
        fail: fn(String) -> MailError,
    ) -> Result<Reply> {
        if let Some(line) = line {
            self.write_line(line)?;
        }
        let reply = self.read_reply()?;
        if !expected.contains(&reply.code) {
            error!("Unexpected SMTP reply: {}", reply.text);
            return Err(fail(format!("Expected {:?}, got: {}", expected, reply.text)));
        }
        Ok(reply)
    }

    /// Send a TLS close_notify; the peer may already be gone
    fn close_tls(&mut self) {
        if let Stream::Tls(tls) = self.stream.get_mut() {
            tls.conn.send_close_notify();
            let _ = tls.flush();
        }
    }
}

/// Escape lines starting with `.` and terminate with `<CRLF>.<CRLF>`
fn dot_stuff(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    for line in raw.split_inclusive('\n') {
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
    }
    if !out.is_empty() && !out.ends_with("\r\n") {
        if out.ends_with('\n') {
            out.pop();
        }
        out.push_str("\r\n");
    }
    out.push_str(".\r\n");
    out
}

fn auth_plain(username: &str, password: &str) -> String {
    general_purpose::STANDARD.encode(format!("\0{}\0{}", username, password))
}

/// Re-tag any failure as `wrap`, keeping errors already of that kind
fn retag(err: MailError, wrap: fn(String) -> MailError, keep: fn(&MailError) -> bool) -> MailError {
    if keep(&err) {
        err
    } else {
        wrap(err.to_string())
    }
}

/// Delivers through an SMTP server
pub struct SmtpTransport {
    config: SmtpConfig,
    session: Option<Session>,
}

impl SmtpTransport {
    pub fn new(config: SmtpConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    pub fn config(&self) -> &SmtpConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn hostname(&self) -> String {
        self.config.local_hostname.clone().unwrap_or_else(|| {
            gethostname::gethostname()
                .to_string_lossy()
                .to_string()
        })
    }

    fn timeout(&self) -> Option<Duration> {
        (self.config.timeout_secs > 0).then(|| Duration::from_secs(self.config.timeout_secs))
    }

    /// Trust store: system roots plus the configured CA file
    fn tls_config(&self) -> Result<Arc<ClientConfig>> {
        let mut roots = RootCertStore::empty();

        let native = rustls_native_certs::load_native_certs();
        for e in &native.errors {
            debug!("Skipping system certificate: {}", e);
        }
        let system: Vec<Vec<u8>> = native.certs.iter().map(|c| c.as_ref().to_vec()).collect();
        let (added, ignored) = roots.add_parsable_certificates(&system);
        debug!("Loaded {} system root certificates ({} ignored)", added, ignored);

        if let Some(path) = &self.config.ca_file {
            let file = File::open(path).map_err(|e| {
                MailError::Tls(format!("Failed to open CA file {}: {}", path.display(), e))
            })?;
            let certs = rustls_pemfile::certs(&mut BufReader::new(file))
                .map_err(|e| MailError::Tls(format!("Failed to read certificates: {}", e)))?;
            if certs.is_empty() {
                return Err(MailError::Tls(format!(
                    "No certificates found in {}",
                    path.display()
                )));
            }
            for cert in certs {
                roots
                    .add(&Certificate(cert))
                    .map_err(|e| MailError::Tls(format!("Invalid CA certificate: {:?}", e)))?;
            }
        }

        let config = ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(Arc::new(config))
    }

    fn handshake(&self, mut tcp: TcpStream) -> Result<StreamOwned<ClientConnection, TcpStream>> {
        let host = self.config.host.as_str();
        let name = ServerName::try_from(host)
            .map_err(|e| MailError::Tls(format!("Invalid server name {}: {}", host, e)))?;
        let mut conn = ClientConnection::new(self.tls_config()?, name)
            .map_err(|e| MailError::Tls(e.to_string()))?;

        while conn.is_handshaking() {
            conn.complete_io(&mut tcp)
                .map_err(|e| MailError::Tls(format!("Handshake with {} failed: {}", host, e)))?;
        }

        debug!("TLS established with {}", host);
        Ok(StreamOwned::new(conn, tcp))
    }

    fn dial(&self) -> Result<TcpStream> {
        let addrs = (self.config.host.as_str(), self.config.port).to_socket_addrs()?;

        let mut last_error = None;
        for addr in addrs {
            let attempt = match self.timeout() {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    stream.set_read_timeout(self.timeout())?;
                    stream.set_write_timeout(self.timeout())?;
                    return Ok(stream);
                }
                Err(e) => {
                    warn!("Failed to connect to {}: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e.into()),
            None => Err(MailError::Connection(format!(
                "No address found for {}",
                self.config.host
            ))),
        }
    }

    fn ehlo(&self, session: &mut Session) -> Result<()> {
        session.command(
            Some(&format!("EHLO {}", self.hostname())),
            &[250],
            MailError::Connection,
        )?;
        Ok(())
    }

    fn open(&self) -> Result<Session> {
        let tcp = self.dial()?;
        let stream = match self.config.security {
            SmtpSecurity::Tls => Stream::Tls(Box::new(self.handshake(tcp)?)),
            SmtpSecurity::Plain | SmtpSecurity::StartTls => Stream::Plain(tcp),
        };
        let mut session = Session::new(stream);

        let greeting = session.command(None, &[220], MailError::Connection)?;
        debug!("Received greeting: {}", greeting.text);
        self.ehlo(&mut session)?;

        if self.config.security == SmtpSecurity::StartTls {
            session.command(Some("STARTTLS"), &[220], MailError::Tls)?;
            let tcp = session.into_tcp()?;
            session = Session::new(Stream::Tls(Box::new(self.handshake(tcp)?)));
            // Capabilities must be fetched again over TLS (RFC 3207 4.2)
            self.ehlo(&mut session)?;
        }

        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            if !session.is_encrypted() && !self.config.allow_insecure_auth {
                let _ = session.command(Some("QUIT"), &[221], MailError::Connection);
                return Err(MailError::Connection(format!(
                    "Refusing to authenticate as {} over an unencrypted connection",
                    username
                )));
            }
            session.command(
                Some(&format!("AUTH PLAIN {}", auth_plain(username, password))),
                &[235],
                MailError::Connection,
            )?;
            debug!("Authenticated as {}", username);
        }

        Ok(session)
    }

    fn deliver(session: &mut Session, raw: &str, from: &str, to: &[String]) -> Result<()> {
        session.command(Some(&format!("MAIL FROM:<{}>", from)), &[250], MailError::Delivery)?;
        for recipient in to {
            session.command(
                Some(&format!("RCPT TO:<{}>", recipient)),
                &[250, 251],
                MailError::Delivery,
            )?;
        }
        session.command(Some("DATA"), &[354], MailError::Delivery)?;

        session.write_raw(dot_stuff(raw).as_bytes())?;
        session.command(None, &[250], MailError::Delivery)?;
        Ok(())
    }
}

impl Transport for SmtpTransport {
    fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        info!(
            "Connecting to SMTP server {}:{} ({:?})",
            self.config.host, self.config.port, self.config.security
        );
        let session = self.open().map_err(|e| {
            retag(e, MailError::Connection, |e| matches!(e, MailError::Connection(_)))
        })?;
        self.session = Some(session);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        if let Err(e) = session.command(Some("QUIT"), &[221], MailError::Connection) {
            warn!("SMTP QUIT failed: {}", e);
        }
        session.close_tls();
        debug!("Disconnected from {}", self.config.host);
        Ok(())
    }

    fn send(&mut self, raw: &str, from: &str, to: &[String]) -> Result<()> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| MailError::Connection("Not connected".to_string()))?;

        info!("Sending mail from {} to {} recipients", from, to.len());

        let result = Self::deliver(session, raw, from, to).map_err(|e| {
            retag(e, MailError::Delivery, |e| matches!(e, MailError::Delivery(_)))
        });

        if result.is_err() {
            // Leave the session ready for the next message
            if let Err(e) = session.command(Some("RSET"), &[250], MailError::Delivery) {
                warn!("SMTP RSET failed, dropping connection: {}", e);
                self.session = None;
            }
        } else {
            info!("Mail sent successfully to {:?}", to);
        }

        result
    }
}

impl Drop for SmtpTransport {
    fn drop(&mut self) {
        if self.session.is_some() {
            let _ = self.disconnect();
        }
    }
}
