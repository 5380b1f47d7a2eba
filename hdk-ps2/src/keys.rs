//! Key material and container geometry for PS2 Classics images

use std::str::FromStr;

use crate::error::Ps2Error;

/// Size of one container segment. The header, every metadata block and
/// every data block are exactly one segment long.
pub const SEGMENT_SIZE: usize = 0x4000;

/// Number of data segments following each metadata segment.
pub const NUM_CHILD_SEGMENTS: usize = 0x1FF;

/// Size of one metadata record: SHA-1 digest followed by a big-endian sequence word.
pub const META_ENTRY_SIZE: usize = 0x18;

/// All segments and key derivations use a zero IV.
pub const PS2_IV: [u8; 16] = [0u8; 16];

/// Retail (CEX) base data key
pub const PS2_KEY_CEX_DATA: [u8; 16] = [
    0x10, 0x17, 0x82, 0x34, 0x63, 0xF4, 0x68, 0xC1, 0xAA, 0x41, 0xD7, 0x00, 0xB1, 0x40, 0xF2, 0x57,
];

/// Retail (CEX) base metadata key
pub const PS2_KEY_CEX_META: [u8; 16] = [
    0x38, 0x9D, 0xCB, 0xA5, 0x20, 0x3C, 0x81, 0x59, 0xEC, 0xF9, 0x4C, 0x93, 0x93, 0x16, 0x4C, 0xC9,
];

/// Debug (DEX) base data key
pub const PS2_KEY_DEX_DATA: [u8; 16] = [
    0x74, 0xFF, 0x7E, 0x5D, 0x1D, 0x7B, 0x96, 0x94, 0x3B, 0xEF, 0xDC, 0xFA, 0x81, 0xFC, 0x20, 0x07,
];

/// Debug (DEX) base metadata key
pub const PS2_KEY_DEX_META: [u8; 16] = [
    0x2B, 0x05, 0xF7, 0xC7, 0xAF, 0xD1, 0xB1, 0x69, 0xD6, 0x25, 0x86, 0x50, 0x88, 0x7A, 0xEE, 0x67,
];

/// NPDRM OMAC key 2 (combined with the KEK for the header hash)
pub const NPD_OMAC_KEY_2: [u8; 16] = [
    0x6B, 0xA5, 0x29, 0x76, 0xEF, 0xDA, 0x16, 0xEF, 0x3C, 0x33, 0x9F, 0xB2, 0x97, 0x1E, 0x25, 0x6B,
];

/// NPDRM OMAC key 3 (used for the title hash)
pub const NPD_OMAC_KEY_3: [u8; 16] = [
    0x9B, 0x51, 0x5F, 0xEA, 0xCF, 0x75, 0x06, 0x49, 0x81, 0xAA, 0x60, 0x4D, 0x91, 0xA5, 0x4E, 0x97,
];

/// NPDRM key encryption key
pub const NPD_KEK: [u8; 16] = [
    0x72, 0xF9, 0x90, 0x78, 0x8F, 0x9C, 0xFF, 0x74, 0x57, 0x25, 0xF0, 0x8E, 0x4C, 0x12, 0x83, 0x87,
];

/// Stand-in klicensee. Real titles use a per-content value supplied by the caller.
pub const PS2_PLACEHOLDER_KLIC: [u8; 16] = [
    0xE1, 0x57, 0x6B, 0x3D, 0xB2, 0xCB, 0x3C, 0x2D, 0xF0, 0x67, 0x04, 0x70, 0x55, 0xE9, 0x45, 0x59,
];

/// Stand-in content ID
pub const PS2_PLACEHOLDER_CID: &str = "2P0001-PS2U10000_00-0000111122223333";

/// File name folded into the title hash of the header
pub const PS2_DEFAULT_FILE_NAME: &str = "ISO.BIN.ENC";

/// Target console flavour, selecting the base key pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleMode {
    /// Retail console
    #[default]
    Cex,
    /// Debug/test console
    Dex,
}

impl ConsoleMode {
    /// Base `(data, meta)` key pair for this mode
    #[must_use]
    pub const fn base_keys(self) -> ([u8; 16], [u8; 16]) {
        match self {
            Self::Cex => (PS2_KEY_CEX_DATA, PS2_KEY_CEX_META),
            Self::Dex => (PS2_KEY_DEX_DATA, PS2_KEY_DEX_META),
        }
    }
}

impl FromStr for ConsoleMode {
    type Err = Ps2Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cex" => Ok(Self::Cex),
            "dex" => Ok(Self::Dex),
            other => Err(Ps2Error::InvalidOptions(format!(
                "Unknown console mode \"{other}\", expected \"cex\" or \"dex\""
            ))),
        }
    }
}

/// Key set used by the container writer and reader.
///
/// Constructed once per process (or per operation) and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ps2Keys {
    pub data_key: [u8; 16],
    pub meta_key: [u8; 16],
    pub npd_omac_key_2: [u8; 16],
    pub npd_omac_key_3: [u8; 16],
    pub npd_kek: [u8; 16],
}

impl Ps2Keys {
    /// Built-in key set for the given console mode
    #[must_use]
    pub const fn for_mode(mode: ConsoleMode) -> Self {
        let (data_key, meta_key) = mode.base_keys();
        Self {
            data_key,
            meta_key,
            npd_omac_key_2: NPD_OMAC_KEY_2,
            npd_omac_key_3: NPD_OMAC_KEY_3,
            npd_kek: NPD_KEK,
        }
    }

    /// Key for the header hash: `KEK ^ OMAC key 2`
    #[must_use]
    pub fn header_hash_key(&self) -> [u8; 16] {
        let mut key = [0u8; 16];
        for (out, (kek, omac)) in key
            .iter_mut()
            .zip(self.npd_kek.iter().zip(self.npd_omac_key_2.iter()))
        {
            *out = kek ^ omac;
        }
        key
    }
}

impl Default for Ps2Keys {
    fn default() -> Self {
        Self::for_mode(ConsoleMode::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_mode_parse() {
        assert_eq!("cex".parse::<ConsoleMode>().unwrap(), ConsoleMode::Cex);
        assert_eq!("DEX".parse::<ConsoleMode>().unwrap(), ConsoleMode::Dex);
        assert!(matches!(
            "tool".parse::<ConsoleMode>(),
            Err(Ps2Error::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_header_hash_key_is_xor() {
        let keys = Ps2Keys::default();
        let key = keys.header_hash_key();
        for i in 0..16 {
            assert_eq!(key[i], NPD_KEK[i] ^ NPD_OMAC_KEY_2[i]);
        }
    }

    #[test]
    fn test_metadata_records_fit_in_one_segment() {
        assert!(NUM_CHILD_SEGMENTS * META_ENTRY_SIZE <= SEGMENT_SIZE);
    }
}
