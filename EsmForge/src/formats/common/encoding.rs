//! Text encodings for ESM strings
//!
//! Content files store 8-bit text in the code page of the game's language.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use encoding_rs::{Encoding, UTF_8, WINDOWS_1250, WINDOWS_1251, WINDOWS_1252};

use crate::error::Error;

/// Code page used to convert between file bytes and `String`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    Utf8,
    /// Central and Eastern European (Polish, Czech, Hungarian, ...)
    Windows1250,
    /// Cyrillic (Russian)
    Windows1251,
    /// Western European (English, French, German, ...)
    #[default]
    Windows1252,
}

impl TextEncoding {
    fn encoding(self) -> &'static Encoding {
        match self {
            TextEncoding::Utf8 => UTF_8,
            TextEncoding::Windows1250 => WINDOWS_1250,
            TextEncoding::Windows1251 => WINDOWS_1251,
            TextEncoding::Windows1252 => WINDOWS_1252,
        }
    }

    /// Decode file bytes. Unmappable bytes become U+FFFD.
    pub fn decode(self, bytes: &[u8]) -> Cow<'_, str> {
        let (text, had_errors) = self.encoding().decode_without_bom_handling(bytes);
        if had_errors {
            tracing::warn!("{} bytes contain sequences invalid for {self}", bytes.len());
        }
        text
    }

    /// Encode text for writing. Characters outside the code page become numeric references.
    pub fn encode(self, text: &str) -> Cow<'_, [u8]> {
        let (bytes, _, had_errors) = self.encoding().encode(text);
        if had_errors {
            tracing::warn!("string {text:?} has characters outside {self}");
        }
        bytes
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TextEncoding::Utf8 => "utf8",
            TextEncoding::Windows1250 => "win1250",
            TextEncoding::Windows1251 => "win1251",
            TextEncoding::Windows1252 => "win1252",
        })
    }
}

impl FromStr for TextEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(TextEncoding::Utf8),
            "win1250" | "windows-1250" => Ok(TextEncoding::Windows1250),
            "win1251" | "windows-1251" => Ok(TextEncoding::Windows1251),
            "win1252" | "windows-1252" => Ok(TextEncoding::Windows1252),
            _ => Err(Error::UnknownEncoding(s.to_string())),
        }
    }
}
