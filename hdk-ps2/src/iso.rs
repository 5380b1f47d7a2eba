//! ISO9660 image checks and preparation

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::Ps2Error;

/// Primary volume descriptor signature: type 1 followed by `CD001`
pub const ISO9660_SIGNATURE: [u8; 6] = *b"\x01CD001";

/// Signature offset for 2048-byte sector images (DVD layout)
pub const DVD_SIGNATURE_OFFSET: u64 = 0x8000;

/// Signature offset for raw 2352-byte sector images (CD layout)
pub const CD_SIGNATURE_OFFSET: u64 = 0x9318;

/// Images strictly larger than this are treated as DVDs
pub const DVD_SIZE_THRESHOLD: u64 = 0x2BC0_0000;

/// Whether an image of `size` bytes is DVD-sized
#[must_use]
pub const fn is_dvd_size(size: u64) -> bool {
    size > DVD_SIZE_THRESHOLD
}

fn has_signature_at<R: Read + Seek>(reader: &mut R, offset: u64) -> Result<bool, Ps2Error> {
    reader.seek(SeekFrom::Start(offset))?;

    let mut signature = [0u8; 6];
    match reader.read_exact(&mut signature) {
        Ok(()) => Ok(signature == ISO9660_SIGNATURE),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Check for an ISO9660 signature at the DVD or CD volume descriptor offset
///
/// # Errors
///
/// Returns [`Ps2Error::InvalidIso`] if neither location carries the
/// signature, or an I/O error if the image cannot be read.
pub fn validate_iso<R: Read + Seek>(reader: &mut R) -> Result<(), Ps2Error> {
    if has_signature_at(reader, DVD_SIGNATURE_OFFSET)?
        || has_signature_at(reader, CD_SIGNATURE_OFFSET)?
    {
        return Ok(());
    }

    Err(Ps2Error::InvalidIso(format!(
        "No ISO9660 signature at {DVD_SIGNATURE_OFFSET:#X} or {CD_SIGNATURE_OFFSET:#X}"
    )))
}

/// Append zero bytes until the stream length is a multiple of `boundary`.
///
/// Returns the number of bytes added, 0 if the stream was already aligned.
/// The stream position is left at the new end.
pub fn pad_to_boundary<W: Write + Seek>(writer: &mut W, boundary: u64) -> Result<u64, Ps2Error> {
    if boundary == 0 {
        return Err(Ps2Error::InvalidOptions(
            "Padding boundary must be non-zero".to_string(),
        ));
    }

    let size = writer.seek(SeekFrom::End(0))?;
    let padding = (boundary - size % boundary) % boundary;

    if padding > 0 {
        io::copy(&mut io::repeat(0).take(padding), writer)?;
    }

    Ok(padding)
}
