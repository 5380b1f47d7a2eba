use std::fs::File;
use std::io::{self, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::crypto::derive_keys;
use crate::error::Ps2Error;
use crate::headers::build_header;
use crate::iso::{pad_to_boundary, validate_iso};
use crate::keys::{ConsoleMode, Ps2Keys, SEGMENT_SIZE};
use crate::limg::add_limg_header;
use crate::options::{EncryptOptions, validate_disc_num};
use crate::segment::{SegmentProcessor, disc_prefix, read_up_to};

/// Progress callback, invoked as `(bytes_processed, total_bytes)`
pub type ProgressFn<'a> = Box<dyn FnMut(u64, u64) + 'a>;

/// In-memory container writer.
///
/// Encrypts the given bytes as-is; use [`encrypt_iso`] for the full image
/// preparation (padding and LIMG trailer).
#[derive(Debug, Clone)]
pub struct Ps2Writer {
    keys: Ps2Keys,
    options: EncryptOptions,
}

impl Ps2Writer {
    /// # Errors
    ///
    /// Returns an error if the disc number is out of range.
    pub fn new(keys: Ps2Keys, options: EncryptOptions) -> Result<Self, Ps2Error> {
        validate_disc_num(options.disc_num)?;
        Ok(Self { keys, options })
    }

    /// Encrypt plaintext bytes, returning the full container.
    ///
    /// # Errors
    ///
    /// This function will return an error if the header cannot be built.
    pub fn write_to_vec(&self, input: &[u8]) -> Result<Vec<u8>, Ps2Error> {
        let mut in_cur = Cursor::new(input);
        let (out, _) = Ps2StreamWriter::new(Vec::new(), self.keys, self.options.clone())?
            .write_from_reader_seekable(&mut in_cur)?;
        Ok(out)
    }
}

/// Streaming container writer.
///
/// Output is written strictly sequentially: header segment, then one
/// metadata segment followed by its data segments per group.
pub struct Ps2StreamWriter<'a, W: Write> {
    inner: W,
    keys: Ps2Keys,
    options: EncryptOptions,
    child_segments: Option<usize>,
    progress: Option<ProgressFn<'a>>,
}

impl<'a, W: Write> Ps2StreamWriter<'a, W> {
    /// Create a new streaming writer.
    ///
    /// # Arguments
    ///
    /// * `inner` - Destination for the container bytes
    /// * `keys` - Base keys for the target console
    /// * `options` - Header identity, disc number and license
    ///
    /// # Errors
    ///
    /// Returns [`Ps2Error::InvalidDiscNumber`] before anything is written if
    /// the disc number is outside 1-9.
    pub fn new(inner: W, keys: Ps2Keys, options: EncryptOptions) -> Result<Self, Ps2Error> {
        validate_disc_num(options.disc_num)?;
        Ok(Self {
            inner,
            keys,
            options,
            child_segments: None,
            progress: None,
        })
    }

    /// Override the number of data segments per group (defaults to `NUM_CHILD_SEGMENTS`).
    #[must_use]
    pub const fn with_child_segments(mut self, child_segments: usize) -> Self {
        self.child_segments = Some(child_segments);
        self
    }

    /// Report `(plaintext_consumed, plaintext_total)` after every group.
    #[must_use]
    pub fn with_progress(mut self, progress: impl FnMut(u64, u64) + 'a) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Encrypt everything from `input` and return the output plus bytes written.
    ///
    /// The header records the full length of `input`. A final partial
    /// segment is zero-padded.
    ///
    /// # Errors
    ///
    /// This function will return an error if reading from `input` or writing
    /// to the output fails, or if the header cannot be built.
    pub fn write_from_reader_seekable(
        mut self,
        input: &mut (impl Read + Seek),
    ) -> Result<(W, u64), Ps2Error> {
        let total_size = input.seek(SeekFrom::End(0))?;
        input.seek(SeekFrom::Start(0))?;

        let (data_key, meta_key) = derive_keys(
            &self.keys.data_key,
            &self.keys.meta_key,
            &self.options.klicensee,
        )?;
        let mut processor = SegmentProcessor::new(data_key, meta_key);
        if let Some(child_segments) = self.child_segments {
            processor = processor.with_child_segments(child_segments);
        }

        let header = build_header(
            &self.options.content_id,
            &self.options.file_name,
            total_size,
            self.options.npd_type,
            &self.keys,
        )?;
        self.inner.write_all(&header)?;
        let mut bytes_written = header.len() as u64;

        #[cfg(feature = "logging")]
        tracing::info!(
            total_size,
            disc_num = self.options.disc_num,
            content_id = %self.options.content_id,
            "encrypting PS2 image"
        );

        let prefix = disc_prefix(self.options.disc_num);
        let mut segment_number = 0u32;
        let mut consumed = 0u64;

        let mut plain = vec![0u8; processor.group_size()];
        let mut encrypted = vec![0u8; processor.group_size()];
        let mut metadata = vec![0u8; SEGMENT_SIZE];
        let mut encrypted_meta = vec![0u8; SEGMENT_SIZE];

        loop {
            let read = read_up_to(input, &mut plain)?;
            if read == 0 {
                break;
            }

            let padded = read.div_ceil(SEGMENT_SIZE) * SEGMENT_SIZE;
            plain[read..padded].fill(0);
            metadata.fill(0);

            let segments = processor.encrypt_group(
                &plain[..padded],
                &mut encrypted[..padded],
                &mut metadata,
                prefix,
                &mut segment_number,
            )?;
            processor.encrypt_metadata(&metadata, &mut encrypted_meta)?;

            self.inner.write_all(&encrypted_meta)?;
            self.inner.write_all(&encrypted[..padded])?;
            bytes_written += (SEGMENT_SIZE + padded) as u64;
            consumed += read as u64;

            #[cfg(feature = "logging")]
            tracing::debug!(segments, segment_number, consumed, "encrypted segment group");
            #[cfg(not(feature = "logging"))]
            let _ = segments;

            if let Some(progress) = self.progress.as_mut() {
                progress(consumed, total_size);
            }
        }

        self.inner.flush()?;

        #[cfg(feature = "logging")]
        tracing::info!(bytes_written, segments = segment_number, "encryption complete");

        Ok((self.inner, bytes_written))
    }
}

/// Encrypt an ISO image file into a container file.
///
/// The image is copied to a temporary working file, zero-padded to a whole
/// segment and tagged with a LIMG trailer before encryption; the source file
/// is never modified.
///
/// Returns the number of bytes written to `out_path`.
///
/// # Errors
///
/// Fails with [`Ps2Error::InvalidDiscNumber`] or [`Ps2Error::InvalidIso`]
/// before the output is created, or with an I/O error.
pub fn encrypt_iso(
    iso_path: impl AsRef<Path>,
    out_path: impl AsRef<Path>,
    mode: ConsoleMode,
    options: &EncryptOptions,
    progress: Option<&mut dyn FnMut(u64, u64)>,
) -> Result<u64, Ps2Error> {
    validate_disc_num(options.disc_num)?;

    let mut source = File::open(iso_path.as_ref())?;
    validate_iso(&mut source)?;
    source.seek(SeekFrom::Start(0))?;

    let mut working = tempfile::tempfile()?;
    io::copy(&mut source, &mut working)?;
    drop(source);

    let padding = pad_to_boundary(&mut working, SEGMENT_SIZE as u64)?;
    let image_size = add_limg_header(&mut working)?;

    #[cfg(feature = "logging")]
    tracing::debug!(
        iso = %iso_path.as_ref().display(),
        padding,
        image_size,
        "prepared working image"
    );
    #[cfg(not(feature = "logging"))]
    let _ = (padding, image_size);

    working.seek(SeekFrom::Start(0))?;

    let out = BufWriter::new(File::create(out_path.as_ref())?);
    let mut writer = Ps2StreamWriter::new(out, Ps2Keys::for_mode(mode), options.clone())?;
    if let Some(progress) = progress {
        writer = writer.with_progress(progress);
    }

    let (_, bytes_written) = writer.write_from_reader_seekable(&mut working)?;
    Ok(bytes_written)
}
