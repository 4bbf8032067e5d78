use super::PersistenceAdapter;
use crate::core::{FieldError, Result, StoreError};
use async_trait::async_trait;
use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Keeps one pretty-printed JSON document per collection on disk.
///
/// Writes go to a sibling temp file that is then renamed over the target, so
/// a crash mid-write never leaves a truncated document behind.
#[derive(Debug)]
pub struct JsonFileAdapter<P> {
    path: PathBuf,
    _document: PhantomData<fn() -> P>,
}

impl<P> JsonFileAdapter<P> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _document: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl<P> PersistenceAdapter<P> for JsonFileAdapter<P>
where
    P: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn save(&self, data: &P) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(data)?;
        atomic_write(&self.path, &bytes).await?;
        debug!("wrote {} bytes to '{}'", bytes.len(), self.path.display());
        Ok(())
    }

    async fn load(&self) -> Result<Option<P>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(StoreError::from_io(
                    &err,
                    &format!("Failed to read '{}'", self.path.display()),
                ));
            }
        };

        serde_json::from_slice(&bytes).map(Some).map_err(|err| {
            StoreError::Validation(vec![FieldError::new(
                format!("line {} column {}", err.line(), err.column()),
                err.to_string(),
            )])
        })
    }

    async fn reset(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::from_io(
                &err,
                &format!("Failed to remove '{}'", self.path.display()),
            )),
        }
    }
}

async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(|err| {
            StoreError::from_io(
                &err,
                &format!("Failed to create parent directory '{}'", parent.display()),
            )
        })?;
    }

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).await.map_err(|err| {
        StoreError::from_io(&err, &format!("Failed to write temp file '{}'", tmp.display()))
    })?;

    fs::rename(&tmp, path).await.map_err(|err| {
        StoreError::from_io(
            &err,
            &format!(
                "Failed to rename temp file '{}' -> '{}'",
                tmp.display(),
                path.display()
            ),
        )
    })?;
    Ok(())
}
