//! Object tag computation and end-to-end integrity checks.
//!
//! Remote stores tag every object with an MD5-based checksum: plain
//! `hex(md5(bytes))` for single-part objects, or a composite
//! `hex(md5(concat(part digests)))-<count>` for multipart uploads. All
//! digests are taken over the *stored* bytes, so for encrypted objects
//! they cover the ciphertext and validation never needs a key.
//!
//! Validation is best effort: when the remote tag cannot be compared
//! (missing, foreign multipart object, part-count disagreement) the check
//! is skipped and the caller logs a warning. An actual digest inequality
//! is fatal and never retried.

use digest::Digest;

// ---------------------------------------------------------------------------
// Digest helpers
// ---------------------------------------------------------------------------

/// Compute the raw MD5 digest of `data`.
#[must_use]
pub fn md5_digest(data: &[u8]) -> [u8; 16] {
    md5::Md5::digest(data).into()
}

/// Compute the hex-encoded MD5 digest of `data`.
///
/// # Examples
///
/// ```
/// use cloudhaul_core::checksums::md5_hex;
///
/// assert_eq!(md5_hex(b"hello"), "5d41402abc4b2a76b9719d911017c592");
/// ```
#[must_use]
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(md5_digest(data))
}

/// Tag of a single-part object: the hex digest of its only part.
#[must_use]
pub fn single_tag(part_digest: &[u8; 16]) -> String {
    hex::encode(part_digest)
}

/// Composite tag of a multipart object.
///
/// The MD5 of the concatenated raw part digests, hex-encoded, with the
/// part count appended after a dash.
///
/// # Examples
///
/// ```
/// use cloudhaul_core::checksums::{composite_tag, md5_digest};
///
/// let tag = composite_tag(&[md5_digest(b"hello"), md5_digest(b"world")]);
/// assert!(tag.ends_with("-2"));
/// ```
#[must_use]
pub fn composite_tag(part_digests: &[[u8; 16]]) -> String {
    let mut combined = Vec::with_capacity(part_digests.len() * 16);
    for digest in part_digests {
        combined.extend_from_slice(digest);
    }
    format!("{}-{}", md5_hex(&combined), part_digests.len())
}

/// Whether `tag` carries a multipart part-count suffix.
#[must_use]
pub fn is_composite(tag: &str) -> bool {
    tag.len() > 32 && tag.as_bytes()[32] == b'-'
}

// ---------------------------------------------------------------------------
// Download-side validation
// ---------------------------------------------------------------------------

/// Outcome of comparing a remote object tag against locally computed
/// part digests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValidation {
    /// Remote tag and local digest agree.
    Matched,
    /// The comparison could not be performed; the caller should log the
    /// reason and carry on.
    Skipped {
        /// Human-readable explanation of why validation was skipped.
        reason: String,
    },
    /// Remote and local digests disagree.
    Mismatch {
        /// The digest computed from the downloaded bytes.
        calculated: String,
        /// The digest advertised by the remote store.
        expected: String,
    },
}

/// Validate a downloaded object against the tag the store advertises.
///
/// `part_digests` are the raw MD5 digests of the stored bytes of every
/// downloaded part, in part order. `uploaded_by_tool` reflects whether the
/// object carried this tool's version header; composite tags on foreign
/// objects use unknowable part boundaries and are skipped.
#[must_use]
pub fn validate_object_tag(
    remote_tag: Option<&str>,
    uploaded_by_tool: bool,
    part_digests: &[[u8; 16]],
) -> TagValidation {
    let Some(tag) = remote_tag.map(|t| t.trim_matches('"')).filter(|t| !t.is_empty()) else {
        return TagValidation::Skipped {
            reason: "no remote checksum available".to_owned(),
        };
    };

    if is_composite(tag) {
        if !uploaded_by_tool {
            return TagValidation::Skipped {
                reason: "object has a multipart checksum but was not uploaded by this tool"
                    .to_owned(),
            };
        }
        let Some(expected_parts) = tag[33..].parse::<usize>().ok() else {
            return TagValidation::Skipped {
                reason: format!("malformed multipart checksum '{tag}'"),
            };
        };
        if expected_parts != part_digests.len() {
            return TagValidation::Skipped {
                reason: format!(
                    "part count mismatch: remote checksum covers {expected_parts} parts, downloaded {}",
                    part_digests.len()
                ),
            };
        }
        compare(composite_tag(part_digests), tag)
    } else if part_digests.len() == 1 {
        compare(single_tag(&part_digests[0]), tag)
    } else {
        TagValidation::Skipped {
            reason: "remote checksum is single-part but object was downloaded in multiple parts"
                .to_owned(),
        }
    }
}

fn compare(calculated: String, expected: &str) -> TagValidation {
    if calculated == expected {
        TagValidation::Matched
    } else {
        TagValidation::Mismatch {
            calculated,
            expected: expected.to_owned(),
        }
    }
}
