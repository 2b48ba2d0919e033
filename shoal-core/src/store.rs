// ABOUTME: Content-addressed attachment store keyed by BLAKE2b-160 digests
// ABOUTME: Writes blobs to a local directory and hands back their public retrieval URL

use std::path::{Path, PathBuf};
use std::sync::Arc;

use blake2::digest::consts::U20;
use blake2::{Blake2b, Digest};

use crate::config::LocalStoreConfig;
use crate::error::StorageError;

type Blake2b160 = Blake2b<U20>;

/// Length of a hex-encoded digest
pub const DIGEST_HEX_LEN: usize = 40;

/// A blob that has been written to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Lowercase hex BLAKE2b-160 digest of the stored bytes
    pub digest: String,
    /// Detected image extension; `None` for generic files
    pub extension: Option<&'static str>,
    /// Public retrieval URL
    pub url: String,
}

impl StoredBlob {
    /// File name inside the store: `digest[.ext]`
    pub fn name(&self) -> String {
        blob_name(&self.digest, self.extension)
    }
}

/// Hex BLAKE2b-160 digest of `bytes`
pub fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(Blake2b160::digest(bytes))
}

/// Canonical file extension of an image payload, or `None` if the bytes are
/// not a recognized image container
pub fn detect_image_extension(bytes: &[u8]) -> Option<&'static str> {
    let format = image::guess_format(bytes).ok()?;
    format.extensions_str().first().copied()
}

fn blob_name(digest: &str, extension: Option<&str>) -> String {
    match extension {
        Some(ext) => format!("{}.{}", digest, ext),
        None => digest.to_string(),
    }
}

/// Local directory store for relayed attachments.
///
/// Names are derived from content, so storing the same bytes twice yields the
/// same URL and rewrites identical content. Nothing is ever deleted.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
    base_url: String,
}

impl ContentStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| StorageError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self {
            root,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &LocalStoreConfig) -> Result<Self, StorageError> {
        Self::new(&config.path, &config.base_url)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Persist `bytes` and return where they can be fetched.
    ///
    /// With `is_image`, the container format is sniffed and used as the file
    /// extension; a payload that is not a recognized image is refused and
    /// nothing is written.
    pub fn put(&self, bytes: &[u8], is_image: bool) -> Result<StoredBlob, StorageError> {
        let extension = if is_image {
            Some(detect_image_extension(bytes).ok_or(StorageError::UnrecognizedImage)?)
        } else {
            None
        };

        let digest = digest_hex(bytes);
        let name = blob_name(&digest, extension);
        let path = self.root.join(&name);
        self.write_atomic(&path, bytes)?;

        tracing::debug!(
            name = %name,
            size = bytes.len(),
            "Stored attachment"
        );

        Ok(StoredBlob {
            url: format!("{}/{}", self.base_url, name),
            digest,
            extension,
        })
    }

    /// Read a file from disk and store its contents
    pub fn put_file(&self, path: &Path, is_image: bool) -> Result<StoredBlob, StorageError> {
        let bytes = std::fs::read(path).map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.put(&bytes, is_image)
    }

    /// `put` on the blocking pool, for callers on the async runtime
    pub async fn put_async(
        self: Arc<Self>,
        bytes: Vec<u8>,
        is_image: bool,
    ) -> Result<StoredBlob, StorageError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || self.put(&bytes, is_image))
            .await
            .map_err(|e| StorageError::Io {
                path: root,
                source: std::io::Error::other(e),
            })?
    }

    /// Local path behind a URL this store handed out
    pub fn resolve(&self, url: &str) -> Option<PathBuf> {
        let name = url.strip_prefix(&self.base_url)?.strip_prefix('/')?;
        let digest = name.split('.').next()?;
        let well_formed = digest.len() == DIGEST_HEX_LEN
            && digest.bytes().all(|b| b.is_ascii_hexdigit())
            && !name.contains('/')
            && name.matches('.').count() <= 1;
        if !well_formed {
            return None;
        }
        Some(self.root.join(name))
    }

    /// Load the bytes behind a URL this store handed out
    pub fn read(&self, url: &str) -> Result<Vec<u8>, StorageError> {
        let path = self
            .resolve(url)
            .ok_or_else(|| StorageError::ForeignUrl(url.to_string()))?;
        std::fs::read(&path).map_err(|source| StorageError::Io { path, source })
    }

    /// `read` on the blocking pool
    pub async fn read_async(self: Arc<Self>, url: String) -> Result<Vec<u8>, StorageError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || self.read(&url))
            .await
            .map_err(|e| StorageError::Io {
                path: root,
                source: std::io::Error::other(e),
            })?
    }

    /// Write through a uniquely named temp file and rename into place, so
    /// concurrent writers of the same digest never expose a partial file.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        let tmp = self.root.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        let io_err = |source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        };

        std::fs::write(&tmp, bytes).map_err(io_err)?;
        if let Err(source) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(source));
        }
        Ok(())
    }
}
