//! Segment group encryption: data segments plus their metadata block

use std::io::{self, Read};

use byteorder::{BigEndian, ByteOrder};

use crate::crypto::CryptoContext;
use crate::error::{CryptoError, Ps2Error};
use crate::keys::{META_ENTRY_SIZE, NUM_CHILD_SEGMENTS, PS2_IV, SEGMENT_SIZE};

/// Size of the SHA-1 digest at the start of each metadata record
const META_HASH_SIZE: usize = 0x14;

/// Bits of the sequence word holding the running segment index
const SEGMENT_INDEX_MASK: u32 = 0x00FF_FFFF;

/// Upper byte of the sequence word for a 1-based disc number
#[must_use]
pub const fn disc_prefix(disc_num: u8) -> u32 {
    (disc_num.saturating_sub(1) as u32) << 24
}

/// One decoded metadata record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentEntry {
    /// SHA-1 of the encrypted data segment
    pub hash: [u8; 20],
    /// Raw big-endian sequence word: `(disc - 1) << 24 | segment_index`
    pub sequence: u32,
}

impl SegmentEntry {
    #[must_use]
    pub fn parse(record: &[u8]) -> Self {
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&record[..META_HASH_SIZE]);
        Self {
            hash,
            sequence: BigEndian::read_u32(&record[META_HASH_SIZE..META_ENTRY_SIZE]),
        }
    }

    /// 0-based disc index from the upper byte
    #[must_use]
    pub const fn disc_index(&self) -> u8 {
        (self.sequence >> 24) as u8
    }

    /// Running segment index from the low 24 bits
    #[must_use]
    pub const fn segment_index(&self) -> u32 {
        self.sequence & SEGMENT_INDEX_MASK
    }
}

/// Per-operation segment processor holding the derived keys
pub struct SegmentProcessor {
    crypto_ctx: CryptoContext,
    data_key: [u8; 16],
    meta_key: [u8; 16],
    child_segments: usize,
}

impl SegmentProcessor {
    /// Create a processor from already-derived keys
    #[must_use]
    pub const fn new(data_key: [u8; 16], meta_key: [u8; 16]) -> Self {
        Self {
            crypto_ctx: CryptoContext::new(),
            data_key,
            meta_key,
            child_segments: NUM_CHILD_SEGMENTS,
        }
    }

    /// Override the number of data segments per group (defaults to [`NUM_CHILD_SEGMENTS`]).
    ///
    /// Clamped to what one metadata segment can describe.
    #[must_use]
    pub const fn with_child_segments(mut self, child_segments: usize) -> Self {
        let max = SEGMENT_SIZE / META_ENTRY_SIZE;
        self.child_segments = if child_segments == 0 {
            1
        } else if child_segments > max {
            max
        } else {
            child_segments
        };
        self
    }

    #[must_use]
    pub const fn child_segments(&self) -> usize {
        self.child_segments
    }

    /// Plaintext bytes covered by one full group
    #[must_use]
    pub const fn group_size(&self) -> usize {
        self.child_segments * SEGMENT_SIZE
    }

    /// Encrypt one group of data segments and fill in its metadata records.
    ///
    /// Every segment is its own CBC stream starting from the zero IV. The
    /// metadata record for segment `i` holds the SHA-1 of its ciphertext and
    /// `prefix | *segment_number`, after which the counter is incremented.
    ///
    /// # Arguments
    ///
    /// * `plaintext` - Whole segments, at most one group
    /// * `encrypted` - Output buffer, at least `plaintext.len()` bytes
    /// * `metadata` - Plaintext metadata segment, zeroed by the caller
    /// * `prefix` - Disc number bits, see [`disc_prefix`]
    /// * `segment_number` - Running segment counter
    ///
    /// Returns the number of segments encrypted.
    pub fn encrypt_group(
        &self,
        plaintext: &[u8],
        encrypted: &mut [u8],
        metadata: &mut [u8],
        prefix: u32,
        segment_number: &mut u32,
    ) -> Result<usize, Ps2Error> {
        if !plaintext.len().is_multiple_of(SEGMENT_SIZE) || plaintext.len() > self.group_size() {
            return Err(CryptoError::InvalidLength(plaintext.len()).into());
        }
        let segments = plaintext.len() / SEGMENT_SIZE;
        if encrypted.len() < plaintext.len() {
            return Err(CryptoError::OutputTooSmall {
                needed: plaintext.len(),
                available: encrypted.len(),
            }
            .into());
        }
        if metadata.len() < segments * META_ENTRY_SIZE {
            return Err(Ps2Error::BufferTooSmall {
                needed: segments * META_ENTRY_SIZE,
                available: metadata.len(),
            });
        }

        for (i, (plain, enc)) in plaintext
            .chunks_exact(SEGMENT_SIZE)
            .zip(encrypted.chunks_exact_mut(SEGMENT_SIZE))
            .enumerate()
        {
            self.crypto_ctx
                .aes_cbc_encrypt(&self.data_key, &PS2_IV, plain, enc)?;

            let record = &mut metadata[i * META_ENTRY_SIZE..(i + 1) * META_ENTRY_SIZE];
            record[..META_HASH_SIZE].copy_from_slice(&self.crypto_ctx.sha1(enc));
            BigEndian::write_u32(&mut record[META_HASH_SIZE..], prefix | *segment_number);

            *segment_number += 1;
        }

        Ok(segments)
    }

    /// Encrypt a full metadata segment with the meta key
    pub fn encrypt_metadata(&self, metadata: &[u8], output: &mut [u8]) -> Result<(), Ps2Error> {
        self.crypto_ctx
            .aes_cbc_encrypt(&self.meta_key, &PS2_IV, metadata, output)?;
        Ok(())
    }

    /// Decrypt an encrypted metadata segment and decode its first `count` records
    pub fn decrypt_metadata(
        &self,
        encrypted: &[u8],
        count: usize,
    ) -> Result<Vec<SegmentEntry>, Ps2Error> {
        if count * META_ENTRY_SIZE > encrypted.len() {
            return Err(Ps2Error::BufferTooSmall {
                needed: count * META_ENTRY_SIZE,
                available: encrypted.len(),
            });
        }

        let mut plain = vec![0u8; encrypted.len()];
        self.crypto_ctx
            .aes_cbc_decrypt(&self.meta_key, &PS2_IV, encrypted, &mut plain)?;

        Ok(plain
            .chunks_exact(META_ENTRY_SIZE)
            .take(count)
            .map(SegmentEntry::parse)
            .collect())
    }

    /// Decrypt one data segment
    pub fn decrypt_segment(&self, encrypted: &[u8], output: &mut [u8]) -> Result<(), Ps2Error> {
        self.crypto_ctx
            .aes_cbc_decrypt(&self.data_key, &PS2_IV, encrypted, output)?;
        Ok(())
    }

    /// Check a data segment's ciphertext against its metadata record
    #[must_use]
    pub fn segment_matches(&self, encrypted: &[u8], entry: &SegmentEntry) -> bool {
        self.crypto_ctx.sha1(encrypted) == entry.hash
    }
}

/// Fill `buf` from `reader`, stopping early only at end of input.
///
/// Returns the number of bytes read.
pub(crate) fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
