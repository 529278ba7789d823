//! Install-hook file uploads: content-addressed writes under the
//! configured upload directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use folio_engine::FileUploader;
use folio_schema::UploadedFile;
use sha2::{Digest, Sha256};

pub struct DiskUploader {
    dir: PathBuf,
}

impl DiskUploader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl FileUploader for DiskUploader {
    async fn upload(&self, file_name: &str, data: &[u8]) -> Result<UploadedFile> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating upload dir {}", self.dir.display()))?;

        let content_hash = hex::encode(Sha256::digest(data));
        let stored = self.dir.join(format!("{}-{file_name}", &content_hash[..12]));
        tokio::fs::write(&stored, data)
            .await
            .with_context(|| format!("writing {}", stored.display()))?;

        Ok(UploadedFile {
            file_name: file_name.to_string(),
            stored_path: stored.display().to_string(),
            content_hash,
            size: data.len() as u64,
        })
    }
}
