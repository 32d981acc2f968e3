//! MIME tree construction and serialization
//!
//! This module provides the building blocks used by messages and
//! attachments: an ordered header map, the part tree and its wire
//! writer, header/body encoders and image type sniffing.

pub mod encoding;
pub mod image;
pub mod types;

pub use encoding::TransferEncoding;
pub use self::image::detect_image_subtype;
pub use types::{HeaderMap, MimeBody, MimePart};
