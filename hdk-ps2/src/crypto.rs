//! Cryptographic primitives for PS2 Classics containers

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes128, Block};
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha1_smol::Sha1;

use crate::error::CryptoError;
use crate::keys::PS2_IV;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Galois-field constant applied when the doubled value overflows
const OMAC_RB: u8 = 0x87;

/// Cryptographic context for PS2 Classics operations
pub struct CryptoContext {
    // Context is stateless, keys are passed per call
}

impl CryptoContext {
    /// Create a new cryptographic context
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    fn cipher(key: &[u8; 16]) -> Aes128 {
        Aes128::new(GenericArray::from_slice(key))
    }

    fn check_lengths(input: &[u8], output: &[u8]) -> Result<(), CryptoError> {
        if !input.len().is_multiple_of(16) {
            return Err(CryptoError::InvalidLength(input.len()));
        }
        if output.len() < input.len() {
            return Err(CryptoError::OutputTooSmall {
                needed: input.len(),
                available: output.len(),
            });
        }
        Ok(())
    }

    /// AES-128-CBC decryption without padding
    ///
    /// # Arguments
    ///
    /// * `key` - 16-byte AES key
    /// * `iv` - 16-byte initialization vector
    /// * `input` - Input data to decrypt (must be multiple of 16 bytes)
    /// * `output` - Output buffer for decrypted data
    pub fn aes_cbc_decrypt(
        &self,
        key: &[u8; 16],
        iv: &[u8; 16],
        input: &[u8],
        output: &mut [u8],
    ) -> Result<(), CryptoError> {
        Self::check_lengths(input, output)?;

        Aes128CbcDec::new(key.into(), iv.into())
            .decrypt_padded_b2b_mut::<NoPadding>(input, &mut output[..input.len()])
            .map_err(|_| CryptoError::InvalidLength(input.len()))?;

        Ok(())
    }

    /// AES-128-CBC encryption without padding
    ///
    /// # Arguments
    ///
    /// * `key` - 16-byte AES key
    /// * `iv` - 16-byte initialization vector
    /// * `input` - Input data to encrypt (must be multiple of 16 bytes)
    /// * `output` - Output buffer for encrypted data
    pub fn aes_cbc_encrypt(
        &self,
        key: &[u8; 16],
        iv: &[u8; 16],
        input: &[u8],
        output: &mut [u8],
    ) -> Result<(), CryptoError> {
        Self::check_lengths(input, output)?;

        Aes128CbcEnc::new(key.into(), iv.into())
            .encrypt_padded_b2b_mut::<NoPadding>(input, &mut output[..input.len()])
            .map_err(|_| CryptoError::InvalidLength(input.len()))?;

        Ok(())
    }

    /// AES-128-ECB encryption of a single block
    #[must_use]
    pub fn aes_ecb_encrypt(&self, key: &[u8; 16], input: &[u8; 16]) -> [u8; 16] {
        let mut block = *Block::from_slice(input);
        Self::cipher(key).encrypt_block(&mut block);
        to_array(&block)
    }

    /// SHA-1 digest
    #[must_use]
    pub fn sha1(&self, data: &[u8]) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update(data);
        hasher.digest().bytes()
    }

    /// Compute the NPDRM OMAC tag of `data`
    ///
    /// This is AES-CMAC for every non-empty input. An empty input is treated
    /// as one full all-zero block: no `0x80` marker, masked with `K1`, which
    /// a stock CMAC does not do.
    ///
    /// # Arguments
    ///
    /// * `key` - 16-byte AES key
    /// * `data` - Data to authenticate
    #[must_use]
    pub fn omac(&self, key: &[u8; 16], data: &[u8]) -> [u8; 16] {
        let cipher = Self::cipher(key);

        let mut subkey = Block::default();
        cipher.encrypt_block(&mut subkey);
        let mut subkey = to_array(&subkey);
        rol1(&mut subkey);

        // Every block but the last goes through plain CBC-MAC
        let tail_start = data.len().saturating_sub(1) / 16 * 16;
        let mut running = Block::default();
        for chunk in data[..tail_start].chunks_exact(16) {
            for (r, d) in running.iter_mut().zip(chunk) {
                *r ^= d;
            }
            cipher.encrypt_block(&mut running);
        }

        let tail = &data[tail_start..];
        let mut last = [0u8; 16];
        last[..tail.len()].copy_from_slice(tail);

        if !tail.is_empty() && tail.len() != 16 {
            last[tail.len()] = 0x80;
            rol1(&mut subkey);
        }

        let mut block = Block::default();
        for (i, out) in block.iter_mut().enumerate() {
            *out = last[i] ^ running[i] ^ subkey[i];
        }
        cipher.encrypt_block(&mut block);

        to_array(&block)
    }
}

impl Default for CryptoContext {
    fn default() -> Self {
        Self::new()
    }
}

fn to_array(block: &Block) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(block);
    out
}

/// Shift a 128-bit value left by one bit, folding the carry back in with `0x87`
pub fn rol1(data: &mut [u8; 16]) {
    let xor_value = if data[0] & 0x80 != 0 { OMAC_RB } else { 0 };

    for i in 0..15 {
        data[i] = (data[i] << 1) | (data[i + 1] >> 7);
    }
    data[15] = (data[15] << 1) ^ xor_value;
}

/// Derive the per-operation `(data_key, meta_key)` pair from the base keys and a klicensee
///
/// Each derived key is the single-block CBC encryption (zero IV) of the
/// klicensee under the corresponding base key.
pub fn derive_keys(
    base_data_key: &[u8; 16],
    base_meta_key: &[u8; 16],
    klicensee: &[u8; 16],
) -> Result<([u8; 16], [u8; 16]), CryptoError> {
    let ctx = CryptoContext::new();

    let mut data_key = [0u8; 16];
    ctx.aes_cbc_encrypt(base_data_key, &PS2_IV, klicensee, &mut data_key)?;

    let mut meta_key = [0u8; 16];
    ctx.aes_cbc_encrypt(base_meta_key, &PS2_IV, klicensee, &mut meta_key)?;

    Ok((data_key, meta_key))
}
