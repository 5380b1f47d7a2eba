use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::crypto::derive_keys;
use crate::error::Ps2Error;
use crate::headers::{Ps2Header, Ps2Metadata};
use crate::keys::{ConsoleMode, Ps2Keys, SEGMENT_SIZE};
use crate::options::DecryptOptions;
use crate::segment::{SegmentEntry, SegmentProcessor, read_up_to};
use crate::writer::ProgressFn;

/// Bytes of the header segment needed for parsing
const HEADER_PROBE_SIZE: usize = 0x100;

/// Read and structurally verify the container header at the current position.
fn read_header<R: Read>(inner: &mut R) -> Result<Ps2Header, Ps2Error> {
    let mut probe = [0u8; HEADER_PROBE_SIZE];
    let read = read_up_to(inner, &mut probe)?;

    if !Ps2Header::verify(&probe[..read]) {
        return Err(Ps2Error::CorruptedFile(
            "Header verification failed".to_string(),
        ));
    }
    Ps2Header::parse(&probe[..read])
}

/// Streaming container reader.
pub struct Ps2Reader<'a, R: Read + Seek> {
    inner: R,
    header: Ps2Header,
    processor: SegmentProcessor,
    verify_segments: bool,
    progress: Option<ProgressFn<'a>>,
}

impl<'a, R: Read + Seek> Ps2Reader<'a, R> {
    /// Open a container from a seekable reader.
    ///
    /// # Arguments
    ///
    /// * `inner` - The seekable reader containing the container
    /// * `keys` - Base keys for the console the container was built for
    /// * `options` - License and verification settings
    ///
    /// # Errors
    ///
    /// Returns [`Ps2Error::CorruptedFile`] if the header magic or segment
    /// size field is wrong.
    pub fn open(mut inner: R, keys: &Ps2Keys, options: &DecryptOptions) -> Result<Self, Ps2Error> {
        inner.seek(SeekFrom::Start(0))?;
        let header = read_header(&mut inner)?;

        let (data_key, meta_key) =
            derive_keys(&keys.data_key, &keys.meta_key, &options.klicensee)?;

        Ok(Self {
            inner,
            header,
            processor: SegmentProcessor::new(data_key, meta_key),
            verify_segments: options.verify_segments,
            progress: None,
        })
    }

    /// Override the number of data segments per group (defaults to `NUM_CHILD_SEGMENTS`).
    ///
    /// Must match the value the container was written with.
    #[must_use]
    pub fn with_child_segments(mut self, child_segments: usize) -> Self {
        self.processor = self.processor.with_child_segments(child_segments);
        self
    }

    /// Report `(plaintext_written, iso_size)` after every group.
    #[must_use]
    pub fn with_progress(mut self, progress: impl FnMut(u64, u64) + 'a) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub const fn header(&self) -> &Ps2Header {
        &self.header
    }

    pub fn metadata(&self) -> Ps2Metadata {
        self.header.metadata()
    }

    /// Plaintext size recorded in the header
    pub const fn iso_size(&self) -> u64 {
        self.header.iso_size
    }

    fn check_group(
        &self,
        encrypted_meta: &[u8],
        data: &[u8],
        segments: usize,
        expected_index: &mut u32,
        disc_index: &mut Option<u8>,
    ) -> Result<(), Ps2Error> {
        let entries = self.processor.decrypt_metadata(encrypted_meta, segments)?;

        for (entry, segment) in entries.iter().zip(data.chunks_exact(SEGMENT_SIZE)) {
            self.check_entry(entry, segment, *expected_index, disc_index)?;
            *expected_index += 1;
        }
        Ok(())
    }

    fn check_entry(
        &self,
        entry: &SegmentEntry,
        segment: &[u8],
        expected_index: u32,
        disc_index: &mut Option<u8>,
    ) -> Result<(), Ps2Error> {
        if !self.processor.segment_matches(segment, entry) {
            return Err(Ps2Error::CorruptedFile(format!(
                "Segment {expected_index} hash mismatch"
            )));
        }
        if entry.segment_index() != expected_index {
            return Err(Ps2Error::CorruptedFile(format!(
                "Segment {expected_index} carries index {}",
                entry.segment_index()
            )));
        }
        match *disc_index {
            None => *disc_index = Some(entry.disc_index()),
            Some(disc) if disc != entry.disc_index() => {
                return Err(Ps2Error::CorruptedFile(format!(
                    "Segment {expected_index} belongs to disc index {}, expected {disc}",
                    entry.disc_index()
                )));
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Decrypt the container payload into `out`.
    ///
    /// Writes at most [`Self::iso_size`] bytes, dropping the zero padding of
    /// the final segment. Returns the number of plaintext bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`Ps2Error::CorruptedFile`] if a segment is cut short, or if
    /// segment verification is enabled and a segment does not match its
    /// metadata record.
    pub fn decrypt_to_writer<W: Write>(&mut self, mut out: W) -> Result<u64, Ps2Error> {
        let iso_size = self.header.iso_size;
        let group_size = self.processor.group_size();

        self.inner.seek(SeekFrom::Start(SEGMENT_SIZE as u64))?;

        #[cfg(feature = "logging")]
        tracing::info!(
            iso_size,
            content_id = %self.header.content_id_str(),
            "decrypting PS2 container"
        );

        let mut encrypted_meta = vec![0u8; SEGMENT_SIZE];
        let mut encrypted = vec![0u8; group_size];
        let mut plain = vec![0u8; group_size];

        let mut remaining = iso_size;
        let mut total_written = 0u64;
        let mut expected_index = 0u32;
        let mut disc_index = None;

        while remaining > 0 {
            let read = read_up_to(&mut self.inner, &mut encrypted_meta)?;
            if read == 0 {
                break;
            }
            if read < SEGMENT_SIZE {
                return Err(Ps2Error::CorruptedFile(format!(
                    "Metadata segment truncated to {read:#X} bytes"
                )));
            }

            let read = read_up_to(&mut self.inner, &mut encrypted)?;
            if read % SEGMENT_SIZE != 0 {
                return Err(Ps2Error::CorruptedFile(format!(
                    "Data segment truncated to {:#X} bytes",
                    read % SEGMENT_SIZE
                )));
            }
            let segments = read / SEGMENT_SIZE;
            if segments == 0 {
                break;
            }

            if self.verify_segments {
                self.check_group(
                    &encrypted_meta,
                    &encrypted[..read],
                    segments,
                    &mut expected_index,
                    &mut disc_index,
                )?;
            }

            for (enc, dec) in encrypted[..read]
                .chunks_exact(SEGMENT_SIZE)
                .zip(plain.chunks_exact_mut(SEGMENT_SIZE))
            {
                self.processor.decrypt_segment(enc, dec)?;
            }

            let take = (read as u64).min(remaining) as usize;
            out.write_all(&plain[..take])?;
            remaining -= take as u64;
            total_written += take as u64;

            #[cfg(feature = "logging")]
            tracing::debug!(segments, total_written, "decrypted segment group");

            if let Some(progress) = self.progress.as_mut() {
                progress(total_written, iso_size);
            }
        }

        if remaining > 0 {
            #[cfg(feature = "logging")]
            tracing::warn!(
                total_written,
                iso_size,
                "container ended before the recorded image size"
            );
        }

        out.flush()?;

        #[cfg(feature = "logging")]
        tracing::info!(total_written, "decryption complete");

        Ok(total_written)
    }

    /// Convenience helper: decrypt into a Vec.
    ///
    /// # Errors
    ///
    /// This function will return an error if decryption fails.
    pub fn decrypt_to_vec(&mut self) -> Result<Vec<u8>, Ps2Error> {
        // The recorded size is untrusted; never reserve past what the stream holds
        let payload = self
            .inner
            .seek(SeekFrom::End(0))?
            .saturating_sub(2 * SEGMENT_SIZE as u64);
        let capacity = usize::try_from(self.header.iso_size.min(payload)).unwrap_or(0);
        let mut buf = Vec::with_capacity(capacity);
        self.decrypt_to_writer(&mut buf)?;
        Ok(buf)
    }

    /// Return the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Decrypt a container file into a plaintext image file.
///
/// The header is verified before `out_path` is created, so a corrupted
/// container leaves no output behind. Returns the number of plaintext bytes
/// written.
///
/// # Errors
///
/// Returns [`Ps2Error::CorruptedFile`] for a bad header or truncated
/// segment stream, or an I/O error.
pub fn decrypt_bin_enc(
    enc_path: impl AsRef<Path>,
    out_path: impl AsRef<Path>,
    mode: ConsoleMode,
    options: &DecryptOptions,
    progress: Option<&mut dyn FnMut(u64, u64)>,
) -> Result<u64, Ps2Error> {
    let input = BufReader::new(File::open(enc_path.as_ref())?);
    let mut reader = Ps2Reader::open(input, &Ps2Keys::for_mode(mode), options)?;
    if let Some(progress) = progress {
        reader = reader.with_progress(progress);
    }

    let out = BufWriter::new(File::create(out_path.as_ref())?);
    reader.decrypt_to_writer(out)
}

/// Read the header of a container file without decrypting anything.
///
/// # Errors
///
/// Returns [`Ps2Error::CorruptedFile`] if the header does not verify.
pub fn extract_metadata(path: impl AsRef<Path>) -> Result<Ps2Metadata, Ps2Error> {
    let mut file = File::open(path.as_ref())?;
    Ok(read_header(&mut file)?.metadata())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::EncryptOptions;
    use crate::writer::Ps2Writer;
    use std::io::Cursor;

    fn container(input: &[u8]) -> Vec<u8> {
        Ps2Writer::new(Ps2Keys::default(), EncryptOptions::default())
            .unwrap()
            .write_to_vec(input)
            .unwrap()
    }

    #[test]
    fn test_open_reads_header() {
        let enc = container(&[7u8; 1000]);
        let reader =
            Ps2Reader::open(Cursor::new(enc), &Ps2Keys::default(), &DecryptOptions::default())
                .unwrap();

        assert_eq!(reader.iso_size(), 1000);
        let metadata = reader.metadata();
        assert_eq!(metadata.magic, "PS2\0");
        assert_eq!(metadata.content_id, "2P0001-PS2U10000_00-0000111122223333");
        assert_eq!(metadata.segment_size, 0x4000);
    }

    #[test]
    fn test_decrypt_truncates_to_iso_size() {
        let input: Vec<u8> = (0..SEGMENT_SIZE + 123).map(|i| (i * 7) as u8).collect();
        let enc = container(&input);

        let mut reader =
            Ps2Reader::open(Cursor::new(enc), &Ps2Keys::default(), &DecryptOptions::default())
                .unwrap();
        assert_eq!(reader.decrypt_to_vec().unwrap(), input);
    }

    #[test]
    fn test_open_rejects_bad_segment_size() {
        let mut enc = container(&[0u8; 16]);
        enc[0x84..0x88].copy_from_slice(&0x8000u32.to_be_bytes());

        let result =
            Ps2Reader::open(Cursor::new(enc), &Ps2Keys::default(), &DecryptOptions::default());
        assert!(matches!(result, Err(Ps2Error::CorruptedFile(_))));
    }

    #[test]
    fn test_open_rejects_short_input() {
        let result = Ps2Reader::open(
            Cursor::new(b"PS2\0".to_vec()),
            &Ps2Keys::default(),
            &DecryptOptions::default(),
        );
        assert!(matches!(result, Err(Ps2Error::CorruptedFile(_))));
    }

    #[test]
    fn test_truncated_data_segment() {
        let mut enc = container(&[1u8; SEGMENT_SIZE * 2]);
        enc.truncate(enc.len() - 10);

        let mut reader =
            Ps2Reader::open(Cursor::new(enc), &Ps2Keys::default(), &DecryptOptions::default())
                .unwrap();
        assert!(matches!(
            reader.decrypt_to_vec(),
            Err(Ps2Error::CorruptedFile(_))
        ));
    }

    #[test]
    fn test_clean_end_stops_early() {
        let input = vec![3u8; SEGMENT_SIZE * 2];
        let mut enc = container(&input);

        // Claim a larger image than the container holds
        enc[0x88..0x90].copy_from_slice(&((SEGMENT_SIZE * 4) as u64).to_be_bytes());

        let mut reader =
            Ps2Reader::open(Cursor::new(enc), &Ps2Keys::default(), &DecryptOptions::default())
                .unwrap();
        assert_eq!(reader.decrypt_to_vec().unwrap(), input);
    }

    #[test]
    fn test_forged_iso_size_is_bounded_by_stream() {
        let input = vec![5u8; 64];
        let mut enc = container(&input);
        enc[0x88..0x90].copy_from_slice(&(u64::MAX / 2).to_be_bytes());

        let mut reader =
            Ps2Reader::open(Cursor::new(enc), &Ps2Keys::default(), &DecryptOptions::default())
                .unwrap();
        assert_eq!(reader.iso_size(), u64::MAX / 2);

        // Whole padded data segment comes back, then the stream ends cleanly
        let output = reader.decrypt_to_vec().unwrap();
        assert_eq!(output.len(), SEGMENT_SIZE);
        assert_eq!(output[..64], input[..]);
        assert!(output[64..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_wrong_license_garbles_output() {
        let input = vec![9u8; SEGMENT_SIZE];
        let enc = container(&input);

        let options = DecryptOptions {
            klicensee: [0x42; 16],
            ..DecryptOptions::default()
        };
        let mut reader = Ps2Reader::open(Cursor::new(enc), &Ps2Keys::default(), &options).unwrap();
        assert_ne!(reader.decrypt_to_vec().unwrap(), input);
    }
}
