//! PS2 Classics container header structures and parsing

use binrw::{BinRead, BinWrite};

use crate::crypto::CryptoContext;
use crate::error::Ps2Error;
use crate::keys::{Ps2Keys, SEGMENT_SIZE};

/// Fixed-layout prefix of the container header.
///
/// The header occupies a whole segment on disk; everything past
/// [`Ps2Header::SIZE`] is zero.
#[repr(C)]
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct Ps2Header {
    pub magic: [u8; 4],
    pub version_major: u16,
    pub version_minor: u16,
    pub npd_type: u32,
    pub type_: u32,
    pub content_id: [u8; 0x30],
    pub vendor: [u8; 0x10],
    pub title_hash: [u8; 0x10],
    pub header_hash: [u8; 0x10],
    pub reserved: [u8; 0x14],
    pub segment_size: u32,
    pub iso_size: u64,
}

/// Decoded, human-readable view of a container header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ps2Metadata {
    pub magic: String,
    pub version_major: u16,
    pub version_minor: u16,
    pub npd_type: u32,
    pub type_: u32,
    pub content_id: String,
    pub segment_size: u32,
    pub iso_size: u64,
}

impl Ps2Header {
    /// Size of the structured part of the header in bytes
    pub const SIZE: usize = 0x90;

    /// Expected magic number for PS2 Classics containers
    pub const MAGIC: [u8; 4] = *b"PS2\0";

    /// Vendor tag stored at offset 0x40
    pub const VENDOR: [u8; 0x10] = *b"bucanero.com.ar\0";

    /// Default NPD type for PS2 Classics images
    pub const DEFAULT_NPD_TYPE: u32 = 2;

    const VERSION: u16 = 1;
    const TYPE: u32 = 1;

    /// Offset of the title hash (OMAC over content ID + file name)
    pub const TITLE_HASH_OFFSET: usize = 0x50;
    /// Offset of the header hash (OMAC over the first 0x60 bytes)
    pub const HEADER_HASH_OFFSET: usize = 0x60;
    /// Offset of the big-endian segment size field
    pub const SEGMENT_SIZE_OFFSET: usize = 0x84;

    /// Create a header with empty hashes
    ///
    /// # Arguments
    ///
    /// * `content_id` - ASCII content ID, at most 0x30 bytes
    /// * `iso_size` - Size of the plaintext image (after padding and LIMG)
    /// * `npd_type` - NPD type field, usually [`Self::DEFAULT_NPD_TYPE`]
    ///
    /// # Errors
    ///
    /// Returns an error if the content ID is not ASCII or longer than 0x30 bytes.
    pub fn new(content_id: &str, iso_size: u64, npd_type: u32) -> Result<Self, Ps2Error> {
        if !content_id.is_ascii() {
            return Err(Ps2Error::NonAsciiField {
                field: "content ID",
                value: content_id.to_string(),
            });
        }
        let bytes = content_id.as_bytes();
        if bytes.len() > 0x30 {
            return Err(Ps2Error::ContentIdTooLong(content_id.to_string()));
        }

        let mut cid = [0u8; 0x30];
        cid[..bytes.len()].copy_from_slice(bytes);

        Ok(Self {
            magic: Self::MAGIC,
            version_major: Self::VERSION,
            version_minor: Self::VERSION,
            npd_type,
            type_: Self::TYPE,
            content_id: cid,
            vendor: Self::VENDOR,
            title_hash: [0u8; 0x10],
            header_hash: [0u8; 0x10],
            reserved: [0u8; 0x14],
            segment_size: SEGMENT_SIZE as u32,
            iso_size,
        })
    }

    /// Parse the header from the start of a container
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is shorter than [`Self::SIZE`] or the
    /// magic does not match.
    pub fn parse(buffer: &[u8]) -> Result<Self, Ps2Error> {
        if buffer.len() < Self::SIZE {
            return Err(Ps2Error::BufferTooSmall {
                needed: Self::SIZE,
                available: buffer.len(),
            });
        }
        if buffer[..4] != Self::MAGIC {
            let mut magic = [0u8; 4];
            magic.copy_from_slice(&buffer[..4]);
            return Err(Ps2Error::InvalidHeaderMagic(magic));
        }

        let mut cursor = std::io::Cursor::new(buffer);
        Self::read(&mut cursor)
            .map_err(|e| Ps2Error::InvalidHeader(format!("Failed to read PS2 header: {e}")))
    }

    /// Structural sanity check: length, magic and segment size.
    ///
    /// The OMAC hashes are not recomputed here, so a container with forged
    /// or stale hashes still passes. See [`verify_header_tags`] for the
    /// cryptographic check.
    #[must_use]
    pub fn verify(buffer: &[u8]) -> bool {
        if buffer.len() < Self::SIZE || buffer[..4] != Self::MAGIC {
            return false;
        }
        let off = Self::SEGMENT_SIZE_OFFSET;
        let segment_size =
            u32::from_be_bytes([buffer[off], buffer[off + 1], buffer[off + 2], buffer[off + 3]]);
        segment_size as usize == SEGMENT_SIZE
    }

    /// Serialize the header into `buffer`
    ///
    /// # Arguments
    ///
    /// * `buffer` - Buffer to write header to (must be at least SIZE bytes)
    pub fn serialize(&self, buffer: &mut [u8]) -> Result<(), Ps2Error> {
        if buffer.len() < Self::SIZE {
            return Err(Ps2Error::BufferTooSmall {
                needed: Self::SIZE,
                available: buffer.len(),
            });
        }
        let mut cursor = std::io::Cursor::new(buffer);
        self.write(&mut cursor)
            .map_err(|e| Ps2Error::InvalidHeader(format!("Failed to write PS2 header: {e}")))?;

        Ok(())
    }

    /// Content ID with non-ASCII bytes dropped and trailing NULs removed
    #[must_use]
    pub fn content_id_str(&self) -> String {
        let ascii: String = self
            .content_id
            .iter()
            .filter(|b| b.is_ascii())
            .map(|&b| char::from(b))
            .collect();
        ascii.trim_end_matches('\0').to_string()
    }

    #[must_use]
    pub fn metadata(&self) -> Ps2Metadata {
        Ps2Metadata {
            magic: String::from_utf8_lossy(&self.magic).into_owned(),
            version_major: self.version_major,
            version_minor: self.version_minor,
            npd_type: self.npd_type,
            type_: self.type_,
            content_id: self.content_id_str(),
            segment_size: self.segment_size,
            iso_size: self.iso_size,
        }
    }
}

/// Build the full one-segment container header.
///
/// The title hash is `OMAC(content_id_field || file_name, NPD_OMAC_KEY_3)`
/// and the header hash is `OMAC(header[0x00..0x60], NPD_KEK ^ NPD_OMAC_KEY_2)`,
/// computed in that order since the second covers the first.
///
/// # Errors
///
/// Returns an error if the content ID or file name are not acceptable.
pub fn build_header(
    content_id: &str,
    file_name: &str,
    iso_size: u64,
    npd_type: u32,
    keys: &Ps2Keys,
) -> Result<Vec<u8>, Ps2Error> {
    if !file_name.is_ascii() {
        return Err(Ps2Error::NonAsciiField {
            field: "file name",
            value: file_name.to_string(),
        });
    }

    let mut header = Ps2Header::new(content_id, iso_size, npd_type)?;
    let mut buffer = vec![0u8; SEGMENT_SIZE];
    header.serialize(&mut buffer)?;

    let crypto_ctx = CryptoContext::new();
    header.title_hash = title_hash(&crypto_ctx, &buffer, file_name, keys);
    header.serialize(&mut buffer)?;

    header.header_hash = crypto_ctx.omac(
        &keys.header_hash_key(),
        &buffer[..Ps2Header::HEADER_HASH_OFFSET],
    );
    header.serialize(&mut buffer)?;

    Ok(buffer)
}

fn title_hash(
    crypto_ctx: &CryptoContext,
    header: &[u8],
    file_name: &str,
    keys: &Ps2Keys,
) -> [u8; 16] {
    let mut title_msg = Vec::with_capacity(0x30 + file_name.len());
    title_msg.extend_from_slice(&header[0x10..0x40]);
    title_msg.extend_from_slice(file_name.as_bytes());
    crypto_ctx.omac(&keys.npd_omac_key_3, &title_msg)
}

/// Structural header check, see [`Ps2Header::verify`]
#[must_use]
pub fn verify_header(buffer: &[u8]) -> bool {
    Ps2Header::verify(buffer)
}

/// Recompute both OMAC hashes of a header and compare them to the stored ones.
///
/// `file_name` must be the name the container was built with. Decryption
/// never calls this; it only relies on [`verify_header`].
#[must_use]
pub fn verify_header_tags(buffer: &[u8], file_name: &str, keys: &Ps2Keys) -> bool {
    if !Ps2Header::verify(buffer) {
        return false;
    }

    let crypto_ctx = CryptoContext::new();
    let title = title_hash(&crypto_ctx, buffer, file_name, keys);
    let header = crypto_ctx.omac(
        &keys.header_hash_key(),
        &buffer[..Ps2Header::HEADER_HASH_OFFSET],
    );

    buffer[Ps2Header::TITLE_HASH_OFFSET..Ps2Header::HEADER_HASH_OFFSET] == title
        && buffer[Ps2Header::HEADER_HASH_OFFSET..Ps2Header::HEADER_HASH_OFFSET + 0x10] == header
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{PS2_DEFAULT_FILE_NAME, PS2_PLACEHOLDER_CID};

    fn sample_header() -> Vec<u8> {
        build_header(
            PS2_PLACEHOLDER_CID,
            PS2_DEFAULT_FILE_NAME,
            0x1000_0000,
            Ps2Header::DEFAULT_NPD_TYPE,
            &Ps2Keys::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_build_header_layout() {
        let header = sample_header();

        assert_eq!(header.len(), SEGMENT_SIZE);
        assert_eq!(&header[0x00..0x04], b"PS2\0");
        assert_eq!(&header[0x04..0x08], &[0x00, 0x01, 0x00, 0x01]);
        assert_eq!(&header[0x08..0x0C], &2u32.to_be_bytes());
        assert_eq!(&header[0x0C..0x10], &1u32.to_be_bytes());
        assert_eq!(
            &header[0x10..0x10 + PS2_PLACEHOLDER_CID.len()],
            PS2_PLACEHOLDER_CID.as_bytes()
        );
        assert!(header[0x10 + PS2_PLACEHOLDER_CID.len()..0x40].iter().all(|&b| b == 0));
        assert_eq!(&header[0x40..0x50], b"bucanero.com.ar\0");
        assert_eq!(&header[0x84..0x88], &0x4000u32.to_be_bytes());
        assert_eq!(&header[0x88..0x90], &0x1000_0000u64.to_be_bytes());
        assert!(header[Ps2Header::SIZE..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_build_header_hashes() {
        let keys = Ps2Keys::default();
        let header = sample_header();
        let ctx = CryptoContext::new();

        let mut title_msg = header[0x10..0x40].to_vec();
        title_msg.extend_from_slice(PS2_DEFAULT_FILE_NAME.as_bytes());
        assert_eq!(&header[0x50..0x60], &ctx.omac(&keys.npd_omac_key_3, &title_msg));

        assert_eq!(
            &header[0x60..0x70],
            &ctx.omac(&keys.header_hash_key(), &header[..0x60])
        );
        assert_ne!(&header[0x50..0x60], &[0u8; 16]);
    }

    #[test]
    fn test_parse_roundtrip() {
        let header = sample_header();
        let metadata = Ps2Header::parse(&header).unwrap().metadata();

        assert_eq!(metadata.magic, "PS2\0");
        assert_eq!(metadata.version_major, 1);
        assert_eq!(metadata.version_minor, 1);
        assert_eq!(metadata.npd_type, 2);
        assert_eq!(metadata.type_, 1);
        assert_eq!(metadata.content_id, PS2_PLACEHOLDER_CID);
        assert_eq!(metadata.segment_size, SEGMENT_SIZE as u32);
        assert_eq!(metadata.iso_size, 0x1000_0000);
    }

    #[test]
    fn test_content_id_drops_non_ascii() {
        let mut header = Ps2Header::new("UP0000-SLUS2", 0, Ps2Header::DEFAULT_NPD_TYPE).unwrap();
        header.content_id[3] = 0xFF;
        header.content_id[12] = 0xC3;
        header.content_id[13] = 0xA9;

        assert_eq!(header.content_id_str(), "UP000-SLUS2");
        assert!(!header.metadata().content_id.contains('\u{FFFD}'));
    }

    #[test]
    fn test_parse_invalid_magic() {
        let header = vec![0u8; SEGMENT_SIZE];
        assert!(matches!(
            Ps2Header::parse(&header),
            Err(Ps2Error::InvalidHeaderMagic([0, 0, 0, 0]))
        ));
    }

    #[test]
    fn test_parse_short_buffer() {
        assert!(matches!(
            Ps2Header::parse(b"PS2\0"),
            Err(Ps2Error::BufferTooSmall {
                needed: 0x90,
                available: 4
            })
        ));
    }

    #[test]
    fn test_verify_header() {
        let mut header = sample_header();
        assert!(verify_header(&header));

        // Too short
        assert!(!verify_header(&header[..0x8F]));

        // Wrong segment size
        header[0x84..0x88].copy_from_slice(&0x8000u32.to_be_bytes());
        assert!(!verify_header(&header));

        // Wrong magic
        let mut header = sample_header();
        header[..4].copy_from_slice(b"BAD\0");
        assert!(!verify_header(&header));
    }

    #[test]
    fn test_verify_ignores_hashes() {
        let mut header = sample_header();
        header[0x50..0x70].fill(0xFF);
        assert!(verify_header(&header));
        assert!(!verify_header_tags(
            &header,
            PS2_DEFAULT_FILE_NAME,
            &Ps2Keys::default()
        ));
    }

    #[test]
    fn test_verify_header_tags() {
        let keys = Ps2Keys::default();
        let header = sample_header();

        assert!(verify_header_tags(&header, PS2_DEFAULT_FILE_NAME, &keys));
        assert!(!verify_header_tags(&header, "OTHER.BIN.ENC", &keys));

        let mut tampered = header.clone();
        tampered[0x3F] ^= 1;
        assert!(!verify_header_tags(&tampered, PS2_DEFAULT_FILE_NAME, &keys));
    }

    #[test]
    fn test_content_id_validation() {
        let too_long = "X".repeat(0x31);
        assert!(matches!(
            Ps2Header::new(&too_long, 0, 2),
            Err(Ps2Error::ContentIdTooLong(_))
        ));
        assert!(matches!(
            Ps2Header::new("ÜP0001", 0, 2),
            Err(Ps2Error::NonAsciiField { .. })
        ));

        let exact = "Y".repeat(0x30);
        let header = Ps2Header::new(&exact, 0, 2).unwrap();
        assert_eq!(header.content_id_str(), exact);
    }
}
