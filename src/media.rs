//! Media service: durable storage for uploaded files, addressed by URL.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};

pub const PROFILE_PICTURES: &str = "profile_pictures";
pub const DOCUMENTS: &str = "documents";

/// A file received from a client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub data: Bytes,
    pub content_type: Option<String>,
    pub file_name: Option<String>,
}

/// Where an upload ended up. `id` is what `delete` takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    pub url: String,
    pub id: String,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Persist `upload` under `folder` and return its public URL.
    async fn upload(&self, folder: &str, upload: &Upload) -> anyhow::Result<StoredMedia>;

    /// Remove a previously stored object.
    async fn delete(&self, id: &str) -> anyhow::Result<()>;
}

/// Stores media on the local filesystem under `root/<folder>/<uuid>.<ext>`.
pub struct LocalMediaStore {
    root: PathBuf,
    public_url: String,
}

impl LocalMediaStore {
    pub fn new(root: PathBuf, public_url: &str) -> Self {
        Self {
            root,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, id: &str) -> anyhow::Result<PathBuf> {
        if !is_safe_relative(id) {
            anyhow::bail!("invalid media id: {}", id);
        }
        Ok(self.root.join(id))
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn upload(&self, folder: &str, upload: &Upload) -> anyhow::Result<StoredMedia> {
        if !is_safe_relative(folder) {
            anyhow::bail!("invalid media folder: {}", folder);
        }

        let stem = uuid::Uuid::now_v7().to_string();
        let file = match file_extension(upload) {
            Some(ext) => format!("{}.{}", stem, ext),
            None => stem,
        };

        let dir = self.root.join(folder);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&file), &upload.data).await?;

        let id = format!("{}/{}", folder, file);
        tracing::debug!("Stored {} bytes as {}", upload.data.len(), id);
        Ok(StoredMedia {
            url: format!("{}/{}", self.public_url, id),
            id,
        })
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        let path = self.resolve(id)?;
        tokio::fs::remove_file(path).await?;
        Ok(())
    }
}

/// Extension from the client file name, else the first one registered for the MIME type.
fn file_extension(upload: &Upload) -> Option<String> {
    let from_name = upload
        .file_name
        .as_deref()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase());

    from_name.or_else(|| {
        upload
            .content_type
            .as_deref()
            .and_then(mime_guess::get_mime_extensions_str)
            .and_then(|exts| exts.first())
            .map(|ext| ext.to_string())
    })
}

fn is_safe_relative(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(name: Option<&str>) -> Upload {
        Upload {
            data: Bytes::from_static(b"\x89PNG fake"),
            content_type: Some("image/png".into()),
            file_name: name.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn upload_writes_file_and_builds_url() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(tmp.path().to_path_buf(), "/media/");

        let stored = store
            .upload(PROFILE_PICTURES, &png(Some("Me.PNG")))
            .await
            .unwrap();
        assert!(stored.id.starts_with("profile_pictures/"));
        assert!(stored.id.ends_with(".png"));
        assert_eq!(stored.url, format!("/media/{}", stored.id));
        assert!(tmp.path().join(&stored.id).exists());
    }

    #[tokio::test]
    async fn extension_falls_back_to_mime_type() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(tmp.path().to_path_buf(), "/media");
        let stored = store.upload(DOCUMENTS, &png(None)).await.unwrap();
        assert!(stored.id.ends_with(".png"));
    }

    #[tokio::test]
    async fn delete_removes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(tmp.path().to_path_buf(), "/media");
        let stored = store.upload(DOCUMENTS, &png(Some("a.png"))).await.unwrap();

        store.delete(&stored.id).await.unwrap();
        assert!(!tmp.path().join(&stored.id).exists());
        assert!(store.delete(&stored.id).await.is_err());
    }

    #[tokio::test]
    async fn delete_rejects_paths_outside_root() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(tmp.path().join("media"), "/media");
        assert!(store.delete("../secrets.txt").await.is_err());
        assert!(store.delete("/etc/passwd").await.is_err());
    }
}
