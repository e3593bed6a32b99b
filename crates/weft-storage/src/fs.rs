use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::{ByteStream, Error, Storage};

/// Filesystem-based storage.
///
/// Each file is stored at `{root}/{namespace}/{file_name}`. Namespace
/// directories are created on first write.
pub struct FsStorage {
  root: PathBuf,
}

impl FsStorage {
  /// Create a new filesystem storage rooted at `root`.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn not_found(namespace: &str, file_name: &str) -> impl FnOnce(std::io::Error) -> Error {
    let namespace = namespace.to_string();
    let file_name = file_name.to_string();
    move |e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound {
          namespace,
          file_name,
        }
      } else {
        Error::Io(e)
      }
    }
  }
}

/// Names must be plain relative paths that stay below the root.
fn check_name(name: &str) -> Result<(), Error> {
  let escapes = Path::new(name)
    .components()
    .any(|c| !matches!(c, Component::Normal(_)));
  if name.is_empty() || escapes {
    return Err(Error::InvalidName(name.to_string()));
  }
  Ok(())
}

#[async_trait]
impl Storage for FsStorage {
  fn build_full_path(&self, namespace: &str, file_name: &str) -> Result<PathBuf, Error> {
    check_name(namespace)?;
    check_name(file_name)?;
    Ok(self.root.join(namespace).join(file_name))
  }

  async fn get_file(&self, namespace: &str, file_name: &str) -> Result<ByteStream, Error> {
    let path = self.build_full_path(namespace, file_name)?;
    let file = File::open(&path)
      .await
      .map_err(Self::not_found(namespace, file_name))?;
    let stream = ReaderStream::new(file).map(|r| r.map_err(Error::Io));
    Ok(Box::pin(stream))
  }

  async fn get_file_size(&self, namespace: &str, file_name: &str) -> Result<u64, Error> {
    let path = self.build_full_path(namespace, file_name)?;
    let metadata = fs::metadata(&path)
      .await
      .map_err(Self::not_found(namespace, file_name))?;
    Ok(metadata.len())
  }

  async fn save_file(&self, namespace: &str, file_name: &str, data: ByteStream) -> Result<(), Error> {
    let path = self.build_full_path(namespace, file_name)?;

    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).await?;
    }

    let mut file = File::create(path).await?;
    let mut stream = std::pin::pin!(data);

    while let Some(chunk) = stream.next().await {
      let bytes = chunk?;
      file.write_all(&bytes).await?;
    }

    file.flush().await?;
    Ok(())
  }

  async fn delete_file(&self, namespace: &str, file_name: &str) -> Result<(), Error> {
    let path = self.build_full_path(namespace, file_name)?;
    fs::remove_file(&path)
      .await
      .map_err(Self::not_found(namespace, file_name))
  }

  async fn list_files(&self, namespace: &str) -> Result<Vec<String>, Error> {
    check_name(namespace)?;
    let dir = self.root.join(namespace);
    let mut entries = match fs::read_dir(&dir).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(Error::Io(e)),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
      if entry.file_type().await?.is_file() {
        names.push(entry.file_name().to_string_lossy().into_owned());
      }
    }
    names.sort();
    Ok(names)
  }
}
