//! LIMG trailer: sector geometry appended to the plaintext image

use std::io::{self, Read, Seek, SeekFrom, Write};

use binrw::{BinRead, BinWrite};
use byteorder::{LittleEndian, ReadBytesExt};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::Ps2Error;
use crate::iso::{CD_SIGNATURE_OFFSET, DVD_SIGNATURE_OFFSET, is_dvd_size};

/// Magic at the start of the trailer block
pub const LIMG_MAGIC: [u8; 4] = *b"LIMG";

/// Size of the trailer block appended to the image
pub const LIMG_BLOCK_SIZE: usize = 0x4000;

/// Offset of the sector count inside the primary volume descriptor
const PVD_SECTOR_COUNT_OFFSET: u64 = 0x54;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum DiscType {
    Dvd = 1,
    Cd = 2,
}

impl DiscType {
    /// Classify an image by its size
    #[must_use]
    pub const fn from_image_size(size: u64) -> Self {
        if is_dvd_size(size) { Self::Dvd } else { Self::Cd }
    }

    /// Native sector size of the disc
    #[must_use]
    pub const fn sector_size(self) -> u32 {
        match self {
            Self::Dvd => 0x800,
            Self::Cd => 0x930,
        }
    }

    /// Offset of the primary volume descriptor within the image
    #[must_use]
    pub const fn volume_descriptor_offset(self) -> u64 {
        match self {
            Self::Dvd => DVD_SIGNATURE_OFFSET,
            Self::Cd => CD_SIGNATURE_OFFSET,
        }
    }
}

/// Structured prefix of the LIMG block, all fields big-endian
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(big)]
#[bw(big)]
pub struct LimgHeader {
    pub magic: [u8; 4],
    pub disc_type: u32,
    pub sector_count: u32,
    pub sector_size: u32,
}

impl LimgHeader {
    pub const SIZE: usize = 0x10;

    #[must_use]
    pub fn new(disc_type: DiscType, sector_count: u32) -> Self {
        Self {
            magic: LIMG_MAGIC,
            disc_type: disc_type.into(),
            sector_count,
            sector_size: disc_type.sector_size(),
        }
    }

    /// Parse the structured prefix of a LIMG block
    pub fn parse(buffer: &[u8]) -> Result<Self, Ps2Error> {
        if buffer.len() < Self::SIZE {
            return Err(Ps2Error::BufferTooSmall {
                needed: Self::SIZE,
                available: buffer.len(),
            });
        }
        let header = Self::read(&mut io::Cursor::new(buffer))
            .map_err(|e| Ps2Error::InvalidHeader(format!("Failed to read LIMG header: {e}")))?;
        if header.magic != LIMG_MAGIC {
            return Err(Ps2Error::InvalidHeader(format!(
                "Invalid LIMG magic: {:02X?}",
                header.magic
            )));
        }
        Ok(header)
    }

    /// Typed disc type, if the stored code is known
    pub fn disc_type(&self) -> Result<DiscType, Ps2Error> {
        DiscType::try_from(self.disc_type).map_err(|_| {
            Ps2Error::InvalidHeader(format!("Unknown LIMG disc type {}", self.disc_type))
        })
    }

    /// Serialize into a zero-filled block of [`LIMG_BLOCK_SIZE`] bytes
    pub fn to_block(&self) -> Result<Vec<u8>, Ps2Error> {
        let mut block = vec![0u8; LIMG_BLOCK_SIZE];
        self.write(&mut io::Cursor::new(&mut block[..]))
            .map_err(|e| Ps2Error::InvalidHeader(format!("Failed to write LIMG header: {e}")))?;
        Ok(block)
    }
}

/// Whether the last [`LIMG_BLOCK_SIZE`] bytes start with the LIMG magic.
///
/// Any I/O failure, including an image shorter than one block, counts as
/// "no trailer".
pub fn has_limg_header<R: Read + Seek>(reader: &mut R) -> bool {
    let mut magic = [0u8; 4];
    reader
        .seek(SeekFrom::End(-(LIMG_BLOCK_SIZE as i64)))
        .and_then(|_| reader.read_exact(&mut magic))
        .is_ok_and(|()| magic == LIMG_MAGIC)
}

/// Build the LIMG block for an image of `image_size` bytes.
///
/// The sector count is the little-endian word at offset 0x54 of the primary
/// volume descriptor for the detected disc layout.
pub fn build_limg_header<R: Read + Seek>(
    reader: &mut R,
    image_size: u64,
) -> Result<Vec<u8>, Ps2Error> {
    let disc_type = DiscType::from_image_size(image_size);

    reader.seek(SeekFrom::Start(
        disc_type.volume_descriptor_offset() + PVD_SECTOR_COUNT_OFFSET,
    ))?;
    let sector_count = reader.read_u32::<LittleEndian>().map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Ps2Error::InvalidIso("Image too small to hold a volume descriptor".to_string())
        } else {
            Ps2Error::Io(e)
        }
    })?;

    LimgHeader::new(disc_type, sector_count).to_block()
}

/// Append a LIMG block unless one is already present.
///
/// Returns the total image size afterwards.
pub fn add_limg_header<F: Read + Write + Seek>(image: &mut F) -> Result<u64, Ps2Error> {
    let size = image.seek(SeekFrom::End(0))?;
    if has_limg_header(image) {
        return Ok(size);
    }

    let block = build_limg_header(image, size)?;
    image.seek(SeekFrom::End(0))?;
    image.write_all(&block)?;

    #[cfg(feature = "logging")]
    tracing::debug!(image_size = size, "appended LIMG trailer");

    Ok(image.stream_position()?)
}
