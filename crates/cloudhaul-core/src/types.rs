//! Shared object-addressing types.

use std::fmt;
use std::str::FromStr;

use crate::error::CloudHaulError;

/// Identifies one object in the remote store.
///
/// Displays as `s3://bucket/key`, the form used in every error message and
/// log line.
///
/// # Examples
///
/// ```
/// use cloudhaul_core::ObjectId;
///
/// let id = ObjectId::new("bucket", "path/to/key");
/// assert_eq!(id.to_string(), "s3://bucket/path/to/key");
///
/// let parsed: ObjectId = "s3://bucket/path/to/key".parse().unwrap();
/// assert_eq!(parsed, id);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectId {
    /// The bucket holding the object.
    pub bucket: String,
    /// The object key within the bucket.
    pub key: String,
}

impl ObjectId {
    /// Build an object id from bucket and key.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

impl FromStr for ObjectId {
    type Err = CloudHaulError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("s3://")
            .ok_or_else(|| CloudHaulError::InvalidObjectUrl { url: s.to_owned() })?;
        let (bucket, key) = rest
            .split_once('/')
            .ok_or_else(|| CloudHaulError::InvalidObjectUrl { url: s.to_owned() })?;
        if bucket.is_empty() || key.is_empty() {
            return Err(CloudHaulError::InvalidObjectUrl { url: s.to_owned() });
        }
        Ok(Self::new(bucket, key))
    }
}
