use std::fmt::Display;
use std::path::Path;

use anyhow::Result;
use axum::async_trait;

use crate::bail_request;
use crate::error::RunnerResult;

#[cfg(test)]
pub(crate) mod memory;
pub(crate) mod s3;

const S3_SCHEME: &str = "s3://";

/// A bucket and key pair, as addressed by `s3://bucket/key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    /// Splits `s3://bucket/key` once on the first `/` after the scheme.
    /// The scheme prefix is optional, the separator is not.
    pub fn parse(uri: &str) -> RunnerResult<Self> {
        let path = match uri.split_once("://") {
            Some(_) if uri.starts_with(S3_SCHEME) => &uri[S3_SCHEME.len()..],
            Some((scheme, _)) => bail_request!("Unsupported scheme {} in {}", scheme, uri),
            None => uri,
        };

        let Some((bucket, key)) = path.split_once('/') else {
            bail_request!("Expected s3://<bucket>/<key> but got {}", uri)
        };
        if bucket.is_empty() {
            bail_request!("Missing bucket in {}", uri)
        }

        Ok(ObjectLocation {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// The last path segment of the key, usable as a local file name.
    pub fn file_name(&self) -> RunnerResult<&str> {
        let name = self.key.rsplit('/').next().unwrap_or_default();
        if name.is_empty() || name == "." || name == ".." {
            bail_request!("Key {} does not name a file", self.key)
        }
        Ok(name)
    }

    /// Treats this location as a prefix and appends `segments` below it.
    pub fn join<I, S>(&self, segments: I) -> ObjectLocation
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut key = self.key.trim_end_matches('/').to_string();
        for segment in segments {
            if !key.is_empty() {
                key.push('/');
            }
            key.push_str(segment.as_ref());
        }

        ObjectLocation {
            bucket: self.bucket.clone(),
            key,
        }
    }
}

impl Display for ObjectLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}/{}", S3_SCHEME, self.bucket, self.key)
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn download(&self, location: &ObjectLocation, local_path: &Path) -> Result<()>;

    async fn upload(&self, local_path: &Path, location: &ObjectLocation) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use crate::error::RunnerError;

    use super::*;

    #[test]
    fn parse_splits_bucket_from_key() {
        let location = ObjectLocation::parse("s3://bucket/path/to/object.wav").unwrap();
        assert_eq!(location.bucket, "bucket");
        assert_eq!(location.key, "path/to/object.wav");
        assert_eq!(location.to_string(), "s3://bucket/path/to/object.wav");
    }

    #[test]
    fn parse_accepts_missing_scheme() {
        let location = ObjectLocation::parse("bucket/song.mp3").unwrap();
        assert_eq!(location.bucket, "bucket");
        assert_eq!(location.key, "song.mp3");
    }

    #[test]
    fn parse_rejects_uri_without_key_separator() {
        let err = ObjectLocation::parse("s3://bucket-only").unwrap_err();
        assert!(matches!(err, RunnerError::BadRequest(_)));
    }

    #[test]
    fn parse_rejects_empty_bucket_and_foreign_scheme() {
        assert!(matches!(
            ObjectLocation::parse("s3:///key.wav"),
            Err(RunnerError::BadRequest(_))
        ));
        assert!(matches!(
            ObjectLocation::parse("gs://bucket/key.wav"),
            Err(RunnerError::BadRequest(_))
        ));
    }

    #[test]
    fn file_name_is_last_key_segment() {
        let location = ObjectLocation::parse("s3://bucket/uploads/2024/track.flac").unwrap();
        assert_eq!(location.file_name().unwrap(), "track.flac");

        let prefix = ObjectLocation::parse("s3://bucket/uploads/").unwrap();
        assert!(prefix.file_name().is_err());

        let parent = ObjectLocation::parse("s3://bucket/uploads/..").unwrap();
        assert!(parent.file_name().is_err());
    }

    #[test]
    fn join_normalises_trailing_separator() {
        let prefix = ObjectLocation::parse("s3://out/results/").unwrap();
        let joined = prefix.join(["session-1", "vocals.wav"]);
        assert_eq!(joined.key, "results/session-1/vocals.wav");

        let root = ObjectLocation::parse("s3://out/").unwrap();
        assert_eq!(root.join(["s", "a.wav"]).to_string(), "s3://out/s/a.wav");
    }
}
