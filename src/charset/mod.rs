//! Path transcoding between Rust strings and the server's charset.
//!
//! Conversion fails open: a name that cannot be encoded or decoded is passed
//! through untransformed rather than failing the call.

use encoding_rs::{Encoding, UTF_8};
use std::{borrow::Cow, fmt};
use tracing::{debug, warn};

// -----------------------------------------------------------------------------
// ----- Charset ---------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Charset {
    // None: UTF-8 passthrough
    encoding: Option<&'static Encoding>,
}

impl Default for Charset {
    fn default() -> Self {
        Self::utf8()
    }
}

impl fmt::Debug for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Charset").field(&self.name()).finish()
    }
}

// -----------------------------------------------------------------------------
// ----- Charset: Static -------------------------------------------------------

impl Charset {
    pub const fn utf8() -> Self {
        Self { encoding: None }
    }

    /// Resolves a WHATWG label (`GBK`, `gb2312`, `GB18030`, `Shift_JIS`...).
    /// Unknown labels fall back to UTF-8 passthrough.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        if label.is_empty() {
            return Self::utf8();
        }

        match Encoding::for_label(label.as_bytes()) {
            Some(encoding) if encoding == UTF_8 => Self::utf8(),
            Some(encoding) => Self {
                encoding: Some(encoding),
            },
            None => {
                warn!("unsupported charset {label:?}; paths will be sent untransformed");
                Self::utf8()
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Charset: Public -------------------------------------------------------

impl Charset {
    pub fn name(&self) -> &'static str {
        self.encoding.unwrap_or(UTF_8).name()
    }

    pub fn is_utf8(&self) -> bool {
        self.encoding.is_none()
    }

    pub fn encode<'a>(&self, text: &'a str) -> Cow<'a, [u8]> {
        let Some(encoding) = self.encoding else {
            return Cow::Borrowed(text.as_bytes());
        };

        let (bytes, _, had_errors) = encoding.encode(text);
        if had_errors {
            debug!("{text:?} is not representable in {}; sending as-is", encoding.name());
            return Cow::Borrowed(text.as_bytes());
        }
        bytes
    }

    pub fn decode<'a>(&self, raw: &'a [u8]) -> Cow<'a, str> {
        let Some(encoding) = self.encoding else {
            return String::from_utf8_lossy(raw);
        };

        match encoding.decode_without_bom_handling_and_without_replacement(raw) {
            Some(text) => text,
            None => {
                debug!("malformed {} name; decoding as UTF-8", encoding.name());
                String::from_utf8_lossy(raw)
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
