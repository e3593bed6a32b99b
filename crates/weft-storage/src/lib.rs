//! Weft Storage
//!
//! This crate provides the storage capability flows use for files. Files are
//! addressed by a namespace (usually the flow id) and a file name; the
//! parameter resolver only needs [`Storage::build_full_path`], components use
//! the streaming accessors.
//!
//! The [`Storage`] trait is the backend seam. [`FsStorage`] keeps files on the
//! local filesystem under `{root}/{namespace}/{file_name}`.

mod fs;

pub use fs::FsStorage;

use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

/// A boxed stream of file bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested file was not found.
  #[error("file not found: {namespace}/{file_name}")]
  NotFound { namespace: String, file_name: String },

  /// A namespace or file name that would escape the storage root.
  #[error("invalid storage name: {0}")]
  InvalidName(String),

  /// An I/O error occurred.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// File storage trait.
#[async_trait]
pub trait Storage: Send + Sync {
  /// Full path of `file_name` inside `namespace`.
  ///
  /// Does not touch the backend; the file need not exist.
  fn build_full_path(&self, namespace: &str, file_name: &str) -> Result<PathBuf, Error>;

  /// Stream a file's contents.
  async fn get_file(&self, namespace: &str, file_name: &str) -> Result<ByteStream, Error>;

  /// Size of a file in bytes.
  async fn get_file_size(&self, namespace: &str, file_name: &str) -> Result<u64, Error>;

  /// Store a file, replacing any existing one.
  async fn save_file(&self, namespace: &str, file_name: &str, data: ByteStream) -> Result<(), Error>;

  /// Delete a file.
  async fn delete_file(&self, namespace: &str, file_name: &str) -> Result<(), Error>;

  /// Names of the files in a namespace, sorted. An unknown namespace is empty.
  async fn list_files(&self, namespace: &str) -> Result<Vec<String>, Error>;
}
