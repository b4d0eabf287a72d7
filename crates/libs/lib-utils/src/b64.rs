//! # Base64 Encoding/Decoding
//!
//! Standard-alphabet base64, used for key material in the environment and for
//! ciphertext columns.

use base64::{engine::general_purpose, Engine as _};

/// Encode bytes to a padded standard base64 string.
pub fn b64_encode(content: impl AsRef<[u8]>) -> String {
    general_purpose::STANDARD.encode(content)
}

/// Decode a padded standard base64 string.
pub fn b64_decode(b64: &str) -> Result<Vec<u8>, Error> {
    general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|_| Error::FailToB64Decode)
}

// region:    --- Error
#[derive(Debug)]
pub enum Error {
    FailToB64Decode,
}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{self:?}")
    }
}

impl std::error::Error for Error {}
// endregion: --- Error
