//! PS2 Classics container handling
//!
//! This module converts PS2 disc images into the segmented, AES-encrypted
//! `ISO.BIN.ENC` container used by PS2 Classics on the PS3, and back.
//!
//! A container is one header segment followed by groups of one encrypted
//! metadata segment and up to [`keys::NUM_CHILD_SEGMENTS`] encrypted data
//! segments. Each data segment is an independent AES-128-CBC stream.

pub mod crypto;
pub mod disc;
pub mod error;
pub mod headers;
pub mod iso;
pub mod keys;
pub mod limg;
pub mod options;
pub mod reader;
pub mod segment;
pub mod writer;

// Re-export main types for convenience
pub use crypto::{CryptoContext, derive_keys};
pub use disc::detect_disc_number;
pub use error::{CryptoError, Ps2Error};
pub use headers::{Ps2Header, Ps2Metadata, build_header, verify_header, verify_header_tags};
pub use keys::{ConsoleMode, Ps2Keys};
pub use limg::{add_limg_header, has_limg_header};
pub use options::{DecryptOptions, EncryptOptions};
pub use reader::{Ps2Reader, decrypt_bin_enc, extract_metadata};
pub use segment::{SegmentEntry, SegmentProcessor};
pub use writer::{Ps2StreamWriter, Ps2Writer, encrypt_iso};
