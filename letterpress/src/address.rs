//! E-mail endpoint: address plus optional display name

use std::fmt;
use std::str::FromStr;

use crate::error::{MailError, Result};
use crate::mime::encoding::encode_word;

/// Characters that force a display name into a quoted string (RFC 5322 specials)
const SPECIALS: &[char] = &['(', ')', '<', '>', '@', ',', ';', ':', '\\', '"', '.', '[', ']'];

/// An e-mail address with an optional display name.
///
/// Equality and hashing use the `(email, name)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    email: String,
    name: Option<String>,
}

impl Address {
    /// Bare address, e.g. `user@example.com`
    pub fn new(email: impl Into<String>) -> Result<Self> {
        let email = email.into();
        validate_email(&email)?;
        Ok(Self { email, name: None })
    }

    /// Address with a display name
    pub fn with_name(email: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let email = email.into();
        let name = name.into();
        validate_email(&email)?;
        if name.contains(['\r', '\n']) {
            return Err(MailError::InvalidAddress(
                "Display name cannot contain line breaks".to_string(),
            ));
        }
        Ok(Self {
            email,
            name: Some(name),
        })
    }

    /// Parse `user@example.com`, `Name <user@example.com>` or
    /// `"Quoted, Name" <user@example.com>`
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        let Some(open) = input.rfind('<') else {
            return Self::new(input);
        };
        if !input.ends_with('>') {
            return Err(MailError::InvalidAddress(format!(
                "Unterminated angle address: {}",
                input
            )));
        }

        let email = input[open + 1..input.len() - 1].trim();
        let name = input[..open].trim();
        let name = if name.len() >= 2 && name.starts_with('"') && name.ends_with('"') {
            name[1..name.len() - 1]
                .replace("\\\"", "\"")
                .replace("\\\\", "\\")
        } else {
            name.to_string()
        };

        if name.is_empty() {
            Self::new(email)
        } else {
            Self::with_name(email, name)
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Header-ready form: `Name <email>` or the bare address.
    ///
    /// Non-ASCII names are RFC 2047 encoded, names with specials are quoted.
    pub fn format(&self) -> String {
        match self.name.as_deref() {
            None | Some("") => self.email.clone(),
            Some(name) if !name.is_ascii() => format!("{} <{}>", encode_word(name), self.email),
            Some(name) if name.contains(SPECIALS) => {
                let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{}\" <{}>", escaped, self.email)
            }
            Some(name) => format!("{} <{}>", name, self.email),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl FromStr for Address {
    type Err = MailError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Conversion of the accepted address shapes: a bare address string or an
/// `(email, name)` pair
pub trait IntoAddress {
    fn into_address(self) -> Result<Address>;
}

impl IntoAddress for Address {
    fn into_address(self) -> Result<Address> {
        Ok(self)
    }
}

impl IntoAddress for &Address {
    fn into_address(self) -> Result<Address> {
        Ok(self.clone())
    }
}

impl IntoAddress for &str {
    fn into_address(self) -> Result<Address> {
        Address::new(self)
    }
}

impl IntoAddress for String {
    fn into_address(self) -> Result<Address> {
        Address::new(self)
    }
}

impl IntoAddress for &String {
    fn into_address(self) -> Result<Address> {
        Address::new(self.as_str())
    }
}

impl<E: Into<String>, N: Into<String>> IntoAddress for (E, N) {
    fn into_address(self) -> Result<Address> {
        Address::with_name(self.0, self.1)
    }
}

impl IntoAddress for &[&str] {
    fn into_address(self) -> Result<Address> {
        match self {
            [email, name] => Address::with_name(*email, *name),
            _ => Err(MailError::InvalidAddress(format!(
                "Expected an (email, name) pair, got {} elements",
                self.len()
            ))),
        }
    }
}

impl IntoAddress for Vec<String> {
    fn into_address(self) -> Result<Address> {
        let parts: Vec<&str> = self.iter().map(String::as_str).collect();
        parts.as_slice().into_address()
    }
}

/// Convert a list of address inputs, failing on the first malformed one
pub fn address_list<I>(items: I) -> Result<Vec<Address>>
where
    I: IntoIterator,
    I::Item: IntoAddress,
{
    items.into_iter().map(IntoAddress::into_address).collect()
}

/// Basic email validation
pub fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() {
        return Err(MailError::InvalidAddress("Email is empty".to_string()));
    }

    if !email.is_ascii() {
        return Err(MailError::InvalidAddress(format!(
            "Email must be ASCII: {}",
            email
        )));
    }

    if email
        .chars()
        .any(|c| c.is_ascii_whitespace() || c.is_ascii_control() || matches!(c, '<' | '>' | ','))
    {
        return Err(MailError::InvalidAddress(format!(
            "Email contains forbidden characters: {:?}",
            email
        )));
    }

    let Some((local, domain)) = email.rsplit_once('@') else {
        return Err(MailError::InvalidAddress(format!(
            "Email must contain @: {}",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() {
        return Err(MailError::InvalidAddress(
            "Email parts cannot be empty".to_string(),
        ));
    }

    if domain.contains('@') || (local.contains('@') && !local.starts_with('"')) {
        return Err(MailError::InvalidAddress(format!(
            "Invalid email format: {}",
            email
        )));
    }

    Ok(())
}
