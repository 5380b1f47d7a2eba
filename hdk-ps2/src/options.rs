//! Options structs for container encryption and decryption.
//!
//! Options carry per-operation configuration (identity fields, license,
//! disc number); the key set and the data streams are passed separately.

use derive_builder::Builder;

use crate::error::Ps2Error;
use crate::headers::Ps2Header;
use crate::keys::{PS2_DEFAULT_FILE_NAME, PS2_PLACEHOLDER_CID, PS2_PLACEHOLDER_KLIC};

/// Highest disc number a container can carry
pub const MAX_DISC_NUM: u8 = 9;

/// Check that a disc number is in `1..=MAX_DISC_NUM`
pub fn validate_disc_num(disc_num: u8) -> Result<(), Ps2Error> {
    if disc_num == 0 || disc_num > MAX_DISC_NUM {
        return Err(Ps2Error::InvalidDiscNumber(disc_num));
    }
    Ok(())
}

/// Options for encrypting an image into a container.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct EncryptOptions {
    /// Content ID embedded in the header, at most 0x30 ASCII bytes
    #[builder(default = "PS2_PLACEHOLDER_CID.to_string()")]
    pub content_id: String,
    /// File name folded into the title hash
    #[builder(default = "PS2_DEFAULT_FILE_NAME.to_string()")]
    pub file_name: String,
    /// 1-based disc number, encoded into every metadata record
    #[builder(default = "1")]
    pub disc_num: u8,
    /// License used to derive the data and meta keys
    #[builder(default = "PS2_PLACEHOLDER_KLIC")]
    pub klicensee: [u8; 16],
    /// NPD type field of the header
    #[builder(default = "Ps2Header::DEFAULT_NPD_TYPE")]
    pub npd_type: u32,
}

impl EncryptOptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(disc_num) = self.disc_num {
            validate_disc_num(disc_num).map_err(|e| e.to_string())?;
        }
        if let Some(content_id) = &self.content_id {
            if !content_id.is_ascii() {
                return Err(format!("content ID must be ASCII: {content_id:?}"));
            }
            if content_id.len() > 0x30 {
                return Err(Ps2Error::ContentIdTooLong(content_id.clone()).to_string());
            }
        }
        Ok(())
    }
}

impl EncryptOptions {
    /// Builder with every field defaulted
    #[must_use]
    pub fn builder() -> EncryptOptionsBuilder {
        EncryptOptionsBuilder::default()
    }
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self {
            content_id: PS2_PLACEHOLDER_CID.to_string(),
            file_name: PS2_DEFAULT_FILE_NAME.to_string(),
            disc_num: 1,
            klicensee: PS2_PLACEHOLDER_KLIC,
            npd_type: Ps2Header::DEFAULT_NPD_TYPE,
        }
    }
}

/// Options for decrypting a container.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(setter(into))]
pub struct DecryptOptions {
    /// License used to derive the data and meta keys
    #[builder(default = "PS2_PLACEHOLDER_KLIC")]
    pub klicensee: [u8; 16],
    /// Check every data segment against its metadata record
    #[builder(default = "false")]
    pub verify_segments: bool,
}

impl DecryptOptions {
    #[must_use]
    pub fn builder() -> DecryptOptionsBuilder {
        DecryptOptionsBuilder::default()
    }
}

impl Default for DecryptOptions {
    fn default() -> Self {
        Self {
            klicensee: PS2_PLACEHOLDER_KLIC,
            verify_segments: false,
        }
    }
}

impl From<EncryptOptionsBuilderError> for Ps2Error {
    fn from(e: EncryptOptionsBuilderError) -> Self {
        Self::InvalidOptions(e.to_string())
    }
}

impl From<DecryptOptionsBuilderError> for Ps2Error {
    fn from(e: DecryptOptionsBuilderError) -> Self {
        Self::InvalidOptions(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_defaults() {
        let options = EncryptOptions::builder().build().unwrap();
        assert_eq!(options, EncryptOptions::default());
        assert_eq!(options.content_id, PS2_PLACEHOLDER_CID);
        assert_eq!(options.file_name, "ISO.BIN.ENC");
        assert_eq!(options.disc_num, 1);
        assert_eq!(options.npd_type, 2);
    }

    #[test]
    fn test_encrypt_builder_overrides() {
        let options = EncryptOptions::builder()
            .content_id("UP0000-SLUS20000_00-0000000000000001")
            .disc_num(3u8)
            .build()
            .unwrap();
        assert_eq!(options.content_id, "UP0000-SLUS20000_00-0000000000000001");
        assert_eq!(options.disc_num, 3);
        assert_eq!(options.klicensee, PS2_PLACEHOLDER_KLIC);
    }

    #[test]
    fn test_encrypt_builder_rejects_disc_num() {
        for disc_num in [0u8, 10, 255] {
            let result: Result<EncryptOptions, Ps2Error> = EncryptOptions::builder()
                .disc_num(disc_num)
                .build()
                .map_err(Into::into);
            assert!(matches!(result, Err(Ps2Error::InvalidOptions(_))));
        }
    }

    #[test]
    fn test_encrypt_builder_rejects_long_content_id() {
        let result = EncryptOptions::builder().content_id("X".repeat(0x31)).build();
        assert!(result.is_err());

        let result = EncryptOptions::builder().content_id("X".repeat(0x30)).build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_disc_num() {
        assert!(validate_disc_num(1).is_ok());
        assert!(validate_disc_num(9).is_ok());
        assert!(matches!(
            validate_disc_num(0),
            Err(Ps2Error::InvalidDiscNumber(0))
        ));
    }

    #[test]
    fn test_decrypt_defaults() {
        let options = DecryptOptions::builder().build().unwrap();
        assert_eq!(options, DecryptOptions::default());
        assert!(!options.verify_segments);
    }
}
