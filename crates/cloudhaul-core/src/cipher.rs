//! Per-part symmetric encryption.
//!
//! Every part is encrypted independently with AES-256-CBC and PKCS#7
//! padding. A fresh random IV is generated per part and stored inline as
//! the first cipher block, so a part can be decrypted from its stored
//! bytes and the session key alone. The stored length is therefore always
//! `16 * (plaintext_len / 16 + 2)`; see [`crate::chunk::encrypted_part_size`].

use aes::Aes256;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand_core::{OsRng, RngCore};

use crate::chunk::CIPHER_BLOCK_SIZE;
use crate::error::{CloudHaulError, CloudHaulResult};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Encrypt one part with a fresh inline IV.
///
/// # Examples
///
/// ```
/// use cloudhaul_core::cipher;
///
/// let key = [7_u8; 32];
/// let stored = cipher::encrypt_part(&key, b"hello").unwrap();
/// assert_eq!(stored.len(), 32);
/// assert_eq!(cipher::decrypt_part(&key, &stored).unwrap(), b"hello");
/// ```
pub fn encrypt_part(key: &[u8], plaintext: &[u8]) -> CloudHaulResult<Vec<u8>> {
    let mut iv = [0_u8; 16];
    OsRng.fill_bytes(&mut iv);

    let cipher = Aes256CbcEnc::new_from_slices(key, &iv).map_err(|_| CloudHaulError::Cipher {
        message: format!("invalid symmetric key length: {}", key.len()),
    })?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut stored = Vec::with_capacity(iv.len() + ciphertext.len());
    stored.extend_from_slice(&iv);
    stored.extend_from_slice(&ciphertext);
    Ok(stored)
}

/// Decrypt one part from its stored bytes (inline IV followed by ciphertext).
pub fn decrypt_part(key: &[u8], stored: &[u8]) -> CloudHaulResult<Vec<u8>> {
    let block = usize::try_from(CIPHER_BLOCK_SIZE).unwrap_or(16);
    if stored.len() < 2 * block || stored.len() % block != 0 {
        return Err(CloudHaulError::Cipher {
            message: format!("encrypted part has invalid length: {}", stored.len()),
        });
    }

    let (iv, ciphertext) = stored.split_at(block);
    let cipher = Aes256CbcDec::new_from_slices(key, iv).map_err(|_| CloudHaulError::Cipher {
        message: format!("invalid symmetric key length: {}", key.len()),
    })?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CloudHaulError::Cipher {
            message: "failed to decrypt part: bad key or corrupt ciphertext".to_owned(),
        })
}
