//! Part planning for multipart transfers.
//!
//! A file of `file_length` bytes is split into parts of `chunk_size` bytes,
//! numbered `position / chunk_size` (0-based). When envelope encryption is
//! active every part is stored expanded: one cipher block for the inline IV
//! plus PKCS#7 padding, so part `n` of the remote object starts at a fixed
//! stride regardless of how much plaintext the final part holds. An empty
//! file still yields exactly one (zero-length) part so small and empty files
//! flow through the same pipeline.

/// AES block size in bytes; the unit of the encrypted-part geometry.
pub const CIPHER_BLOCK_SIZE: u64 = 16;

/// Default chunk size for multipart transfers (5 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// The largest part count the remote store accepts.
pub const MAX_PARTS: u64 = 10_000;

/// One planned part of a transfer.
///
/// `offset`/`size` address the plaintext file; `stored_offset`/`stored_size`
/// address the remote object, which differs only when encryption is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartDescriptor {
    /// 0-based part number, `offset / chunk_size`.
    pub part_number: u32,
    /// Byte offset of this part in the plaintext file.
    pub offset: u64,
    /// Plaintext length of this part.
    pub size: u64,
    /// Byte offset of this part in the stored object.
    pub stored_offset: u64,
    /// Stored length of this part (ciphertext length when encrypted).
    pub stored_size: u64,
}

/// Derive a default chunk size for a file of `file_length` bytes.
///
/// Starts at [`DEFAULT_CHUNK_SIZE`] and grows by half until the part count
/// fits the remote limit of [`MAX_PARTS`].
///
/// # Examples
///
/// ```
/// use cloudhaul_core::chunk::{default_chunk_size, DEFAULT_CHUNK_SIZE};
///
/// assert_eq!(default_chunk_size(0), DEFAULT_CHUNK_SIZE);
/// assert_eq!(default_chunk_size(100 * 1024 * 1024), DEFAULT_CHUNK_SIZE);
/// assert!(default_chunk_size(100 * 1024 * 1024 * 1024) > DEFAULT_CHUNK_SIZE);
/// ```
#[must_use]
pub fn default_chunk_size(file_length: u64) -> u64 {
    let mut chunk_size = DEFAULT_CHUNK_SIZE;
    while part_count(file_length, chunk_size) > MAX_PARTS {
        chunk_size += chunk_size / 2;
    }
    chunk_size
}

/// Number of parts a file of `file_length` bytes occupies at `chunk_size`.
///
/// An empty file counts as one part.
#[must_use]
pub fn part_count(file_length: u64, chunk_size: u64) -> u64 {
    if file_length == 0 {
        1
    } else {
        file_length.div_ceil(chunk_size)
    }
}

/// Stored length of an encrypted part holding `plaintext_size` bytes.
///
/// One block for the inline IV plus the PKCS#7-padded payload.
#[must_use]
pub fn encrypted_part_size(plaintext_size: u64) -> u64 {
    CIPHER_BLOCK_SIZE * (plaintext_size / CIPHER_BLOCK_SIZE + 2)
}

/// Stored offset of encrypted part `part_number` at `chunk_size`.
///
/// Every part before the last is a full chunk, so the stored stride is
/// constant: `16 * (chunk_size / 16 + 2)`.
#[must_use]
pub fn encrypted_part_offset(part_number: u32, chunk_size: u64) -> u64 {
    u64::from(part_number) * CIPHER_BLOCK_SIZE * (chunk_size / CIPHER_BLOCK_SIZE + 2)
}

/// Plan the ordered part sequence for a transfer.
///
/// Boundaries are contiguous and exhaustive over `[0, file_length)`; an
/// empty file yields exactly one zero-length part.
#[must_use]
pub fn plan(file_length: u64, chunk_size: u64, encrypted: bool) -> Vec<PartDescriptor> {
    debug_assert!(chunk_size > 0, "chunk size must be resolved before planning");

    let mut parts = Vec::with_capacity(usize::try_from(part_count(file_length, chunk_size)).unwrap_or(1));
    let mut position = 0_u64;
    while position < file_length || (position == 0 && file_length == 0) {
        let part_number = u32::try_from(position / chunk_size).unwrap_or(u32::MAX);
        let size = (file_length - position).min(chunk_size);
        let (stored_offset, stored_size) = if encrypted {
            (
                encrypted_part_offset(part_number, chunk_size),
                encrypted_part_size(size),
            )
        } else {
            (position, size)
        };
        parts.push(PartDescriptor {
            part_number,
            offset: position,
            size,
            stored_offset,
            stored_size,
        });
        if file_length == 0 {
            break;
        }
        position += chunk_size;
    }
    parts
}
