//! Errors raised while decoding, encoding or encrypting statistics trees.
//!
//! Type mismatches between statistics and failed decryption are not errors:
//! both are absorbed by the tree (disablement and an absent statistic
//! respectively) because either outcome still answers "must read".

use snafu::Snafu;

use crate::registry::IndexType;

/// Error type reported by external collaborators (key stores, ciphers).
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Block index errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// A wire type tag (shortcut or full identifier) has no registered statistic.
    #[snafu(display("unknown block index type tag '{tag}'"))]
    UnknownTypeTag {
        /// The tag as read from the binary.
        tag: String,
    },

    /// The binary ended before a field could be read.
    #[snafu(display(
        "malformed block index binary: {needed} bytes needed at offset {offset}, {available} available"
    ))]
    Truncated {
        /// Offset of the field within the section being decoded.
        offset: usize,
        /// Bytes the field requires.
        needed: usize,
        /// Bytes remaining in the section.
        available: usize,
    },

    /// A length or count field was negative.
    #[snafu(display("malformed block index binary: negative length {len} at offset {offset}"))]
    NegativeLength {
        /// Offset of the length field.
        offset: usize,
        /// The decoded value.
        len: i32,
    },

    /// A name or type tag was not valid UTF-8.
    #[snafu(display("malformed block index binary: invalid utf-8 in {field}: {source}"))]
    InvalidUtf8 {
        /// Which field failed to decode.
        field: &'static str,
        /// Decoder error.
        source: std::string::FromUtf8Error,
    },

    /// A string statistic bound was not valid UTF-16.
    #[snafu(display("malformed block index binary: invalid utf-16 in string statistic: {source}"))]
    InvalidUtf16 {
        /// Decoder error.
        source: std::string::FromUtf16Error,
    },

    /// A section decoded cleanly but left bytes behind.
    #[snafu(display("malformed block index binary: {remaining} trailing bytes after {what}"))]
    TrailingBytes {
        /// The section that was decoded.
        what: &'static str,
        /// Unconsumed bytes.
        remaining: usize,
    },

    /// A field held a value outside its domain.
    #[snafu(display("malformed block index binary: {reason}"))]
    Malformed {
        /// Description of the offending field.
        reason: String,
    },

    /// A node must be encrypted but the encryption setting names no key.
    #[snafu(display("block index node '{path}' requires encryption but has no key name"))]
    MissingKeyName {
        /// Dotted path of the node.
        path: String,
    },

    /// The key store could not supply a key required to write a node.
    #[snafu(display("failed to look up block index key '{key_name}': {source}"))]
    KeyLookup {
        /// The requested key.
        key_name: String,
        /// Key store error.
        source: DynError,
    },

    /// A cipher could not be built from a key.
    #[snafu(display("failed to build block index cipher for key '{key_name}': {source}"))]
    CipherConstruction {
        /// The key the cipher was built from.
        key_name: String,
        /// Cipher provider error.
        source: DynError,
    },

    /// Encrypting a node payload failed.
    #[snafu(display("failed to encrypt block index node '{path}': {source}"))]
    Encryption {
        /// Dotted path of the node.
        path: String,
        /// Cipher error.
        source: DynError,
    },

    /// A composite entry was given a statistic that is not a range variant.
    #[snafu(display("full range entries must hold a range statistic, got {index_type}"))]
    InvalidFullRangeEntry {
        /// Type of the rejected statistic.
        index_type: IndexType,
    },
}

impl Error {
    /// Returns true if this error means the binary itself cannot be trusted.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::Truncated { .. }
                | Self::NegativeLength { .. }
                | Self::InvalidUtf8 { .. }
                | Self::InvalidUtf16 { .. }
                | Self::TrailingBytes { .. }
                | Self::Malformed { .. }
        )
    }
}

/// Result for the block index crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
