//! Attachment handles passed through to handlers
//!
//! The dispatch core never looks inside an attachment. It only enforces
//! the optional size limit using [`Attachment::size_hint`].

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use mime::Mime;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("failed to read attachment '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Opaque attachment handle
#[async_trait]
pub trait Attachment: Send + Sync + fmt::Debug {
    /// File name; may be empty
    fn name(&self) -> &str;

    fn mimetype(&self) -> &Mime;

    /// Size in bytes when known without reading
    fn size_hint(&self) -> Option<u64>;

    async fn read(&self) -> Result<Bytes, AttachmentError>;

    /// Content encoded as standard base64.
    async fn base64(&self) -> Result<String, AttachmentError> {
        let data = self.read().await?;
        Ok(STANDARD.encode(&data))
    }
}

/// Guess a MIME type from a file name's extension.
pub fn guess_mimetype(name: &str) -> Mime {
    let extension = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "txt" | "log" => mime::TEXT_PLAIN,
        "csv" => mime::TEXT_CSV,
        "html" | "htm" => mime::TEXT_HTML,
        "xml" => mime::TEXT_XML,
        "json" => mime::APPLICATION_JSON,
        "pdf" => mime::APPLICATION_PDF,
        "png" => mime::IMAGE_PNG,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "gif" => mime::IMAGE_GIF,
        "svg" => mime::IMAGE_SVG,
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

/// Attachment held in memory
#[derive(Debug, Clone)]
pub struct MemoryAttachment {
    name: String,
    mimetype: Mime,
    data: Bytes,
}

impl MemoryAttachment {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let name = name.into();
        Self {
            mimetype: guess_mimetype(&name),
            name,
            data: data.into(),
        }
    }

    pub fn with_mimetype(mut self, mimetype: Mime) -> Self {
        self.mimetype = mimetype;
        self
    }
}

#[async_trait]
impl Attachment for MemoryAttachment {
    fn name(&self) -> &str {
        &self.name
    }

    fn mimetype(&self) -> &Mime {
        &self.mimetype
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    async fn read(&self) -> Result<Bytes, AttachmentError> {
        Ok(self.data.clone())
    }
}

/// Attachment read from disk on demand
#[derive(Debug, Clone)]
pub struct FileAttachment {
    path: PathBuf,
    name: String,
    mimetype: Mime,
    size: u64,
}

impl FileAttachment {
    /// Check that `path` is a readable file and record its size.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, AttachmentError> {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|source| AttachmentError::Io {
                name: name.clone(),
                source,
            })?;
        if !metadata.is_file() {
            return Err(AttachmentError::Io {
                name,
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a file"),
            });
        }

        Ok(Self {
            mimetype: guess_mimetype(&name),
            path,
            name,
            size: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Attachment for FileAttachment {
    fn name(&self) -> &str {
        &self.name
    }

    fn mimetype(&self) -> &Mime {
        &self.mimetype
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.size)
    }

    async fn read(&self) -> Result<Bytes, AttachmentError> {
        tokio::fs::read(&self.path)
            .await
            .map(Bytes::from)
            .map_err(|source| AttachmentError::Io {
                name: self.name.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_guess_mimetype() {
        assert_eq!(guess_mimetype("report.PDF"), mime::APPLICATION_PDF);
        assert_eq!(guess_mimetype("photo.jpeg"), mime::IMAGE_JPEG);
        assert_eq!(guess_mimetype("noext"), mime::APPLICATION_OCTET_STREAM);
        assert_eq!(guess_mimetype(""), mime::APPLICATION_OCTET_STREAM);
    }

    #[tokio::test]
    async fn test_memory_attachment() {
        let attachment = MemoryAttachment::new("hello.txt", "hello");
        assert_eq!(attachment.name(), "hello.txt");
        assert_eq!(attachment.mimetype(), &mime::TEXT_PLAIN);
        assert_eq!(attachment.size_hint(), Some(5));
        assert_eq!(attachment.read().await.unwrap(), Bytes::from("hello"));
        assert_eq!(attachment.base64().await.unwrap(), "aGVsbG8=");
    }

    #[tokio::test]
    async fn test_file_attachment() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.json");
        fs::write(&path, br#"{"ok":true}"#).unwrap();

        let attachment = FileAttachment::open(&path).await.unwrap();
        assert_eq!(attachment.name(), "data.json");
        assert_eq!(attachment.mimetype(), &mime::APPLICATION_JSON);
        assert_eq!(attachment.size_hint(), Some(11));
        assert_eq!(attachment.read().await.unwrap().len(), 11);
    }

    #[tokio::test]
    async fn test_file_attachment_missing() {
        let temp_dir = TempDir::new().unwrap();
        let result = FileAttachment::open(temp_dir.path().join("missing.bin")).await;
        assert!(matches!(result, Err(AttachmentError::Io { .. })));

        let result = FileAttachment::open(temp_dir.path()).await;
        assert!(matches!(result, Err(AttachmentError::Io { .. })));
    }
}
