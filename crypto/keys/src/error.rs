// Copyright (c) 2024 Tessera Foundation

//! Errors which can occur when handling keys

use displaydoc::Display;

/// An error which can occur when parsing key material
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum KeyError {
    /// Expected {expected} bytes of key material, got {actual}
    LengthMismatch {
        /// The length the key type requires
        expected: usize,
        /// The length that was supplied
        actual: usize,
    },
    /// Key material is not valid hex
    InvalidHex,
    /// Bytes do not encode a valid curve point
    InvalidPoint,
}

impl std::error::Error for KeyError {}
