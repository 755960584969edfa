use std::io;
use std::mem;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::constants;
use crate::helpers;
use crate::part::Part;
use crate::Config;

/// An uploaded file staged in the upload directory.
///
/// The caller owns the file at [`path`](FileDescriptor::path) once the parse
/// succeeded; move or delete it as needed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FileDescriptor {
    /// Where the upload was written.
    pub path: PathBuf,
    /// The file name the client sent, without directories.
    pub original_filename: String,
    /// The declared `Content-Type`, `application/octet-stream` if absent.
    pub content_type: String,
    /// Number of bytes written.
    pub size: u64,
}

struct Staged {
    path: PathBuf,
    file: File,
}

/// Streams the body of one file part into a freshly named file.
pub(crate) struct FileSink {
    field_name: String,
    original_filename: String,
    content_type: String,
    upload_dir: PathBuf,
    extension: Option<String>,
    limit: Option<u64>,
    staged: Option<Staged>,
    size: u64,
}

impl FileSink {
    pub(crate) fn new(part: &Part, config: &Config) -> FileSink {
        let original_filename = part.file_name().unwrap_or_default().to_owned();

        let extension = if config.keep_extensions {
            helpers::file_extension(&original_filename)
        } else {
            None
        };

        FileSink {
            field_name: part.name().to_owned(),
            original_filename,
            content_type: part.content_type().to_owned(),
            upload_dir: config.upload_dir.clone(),
            extension,
            limit: config.size_limit.file_limit_for(part.name()),
            staged: None,
            size: 0,
        }
    }

    pub(crate) async fn append(&mut self, bytes: &[u8]) -> crate::Result<()> {
        if let Some(limit) = self.limit {
            if self.size + bytes.len() as u64 > limit {
                self.discard().await;
                return Err(crate::Error::FileTooLarge {
                    field_name: self.field_name.clone(),
                    limit,
                    bytes_parsed: 0,
                });
            }
        }

        let staged = self.staged().await?;
        let written = staged.file.write_all(bytes).await;

        if let Err(err) = written {
            let path = staged.path.clone();
            self.discard().await;
            return Err(crate::Error::storage(path, err));
        }

        self.size += bytes.len() as u64;
        Ok(())
    }

    /// Closes the file and hands it over, yielding `(field name, descriptor)`.
    pub(crate) async fn finish(mut self) -> crate::Result<(String, FileDescriptor)> {
        let mut staged = match self.staged.take() {
            Some(staged) => staged,
            None => self.create().await?,
        };

        let flushed = staged.file.flush().await;

        if let Err(err) = flushed {
            let path = staged.path.clone();
            remove_staged(staged).await;
            return Err(crate::Error::storage(path, err));
        }

        let Staged { path, file } = staged;
        drop(file);

        debug!("upload for field '{}' stored at {:?} ({} bytes)", self.field_name, path, self.size);

        let descriptor = FileDescriptor {
            path,
            original_filename: mem::take(&mut self.original_filename),
            content_type: mem::take(&mut self.content_type),
            size: self.size,
        };

        Ok((mem::take(&mut self.field_name), descriptor))
    }

    /// Closes and removes a partially written file.
    pub(crate) async fn discard(&mut self) {
        if let Some(staged) = self.staged.take() {
            remove_staged(staged).await;
        }
    }

    async fn staged(&mut self) -> crate::Result<&mut Staged> {
        match self.staged {
            Some(ref mut staged) => Ok(staged),
            None => {
                let staged = self.create().await?;
                Ok(self.staged.insert(staged))
            }
        }
    }

    async fn create(&self) -> crate::Result<Staged> {
        let (path, file) = create_unique(&self.upload_dir, self.extension.as_deref())
            .await
            .map_err(|(path, err)| crate::Error::storage(path, err))?;

        trace!("staging upload for field '{}' at {:?}", self.field_name, path);

        Ok(Staged { path, file })
    }
}

async fn remove_staged(staged: Staged) {
    let Staged { path, file } = staged;
    drop(file);

    if let Err(err) = fs::remove_file(&path).await {
        warn!("failed to remove partial upload {:?}: {}", path, err);
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if let Some(Staged { path, file }) = self.staged.take() {
            drop(file);

            if let Err(err) = std::fs::remove_file(&path) {
                warn!("failed to remove unfinished upload {:?}: {}", path, err);
            }
        }
    }
}

/// Creates a new file with a random name in `dir`, never reusing an
/// existing path.
pub(crate) async fn create_unique(dir: &Path, extension: Option<&str>) -> Result<(PathBuf, File), (PathBuf, io::Error)> {
    let mut attempts = 0;

    loop {
        let file_name = format!(
            "{}{:032x}{}",
            constants::UPLOAD_FILE_PREFIX,
            rand::random::<u128>(),
            extension.unwrap_or_default()
        );
        let path = dir.join(file_name);

        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists && attempts < constants::MAX_CREATE_ATTEMPTS => {
                attempts += 1;
            }
            Err(err) => return Err((path, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SizeLimit;
    use bytes::Bytes;
    use encoding_rs::UTF_8;

    fn file_part(file_name: &str) -> Part {
        let line = format!("Content-Disposition: form-data; name=\"upload\"; filename=\"{}\"", file_name);
        Part::parse(&[Bytes::from(line)], UTF_8).unwrap()
    }

    #[tokio::test]
    async fn test_write_and_finish() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new().upload_dir(dir.path());

        let mut sink = FileSink::new(&file_part("foo.txt"), &config);
        sink.append(b"foo\nbar\n").await.unwrap();
        sink.append(b"baz\n").await.unwrap();

        let (name, file) = sink.finish().await.unwrap();
        assert_eq!(name, "upload");
        assert_eq!(file.original_filename, "foo.txt");
        assert_eq!(file.content_type, "application/octet-stream");
        assert_eq!(file.size, 12);
        assert!(file.path.starts_with(dir.path()));
        assert!(file.path.extension().is_none());
        assert_eq!(std::fs::read(&file.path).unwrap(), b"foo\nbar\nbaz\n");
    }

    #[tokio::test]
    async fn test_keep_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new().upload_dir(dir.path()).keep_extensions(true);

        let mut sink = FileSink::new(&file_part("photo.JPG"), &config);
        sink.append(b"\xff\xd8\xff").await.unwrap();
        let (_, file) = sink.finish().await.unwrap();

        let name = file.path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("upload_"));
        assert!(name.ends_with(".JPG"));
    }

    #[tokio::test]
    async fn test_empty_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new().upload_dir(dir.path());

        let sink = FileSink::new(&file_part("empty.bin"), &config);
        let (_, file) = sink.finish().await.unwrap();

        assert_eq!(file.size, 0);
        assert!(file.path.exists());
    }

    #[tokio::test]
    async fn test_limit_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new()
            .upload_dir(dir.path())
            .size_limit(SizeLimit::new().per_file(4));

        let mut sink = FileSink::new(&file_part("big.bin"), &config);
        sink.append(b"1234").await.unwrap();

        let err = sink.append(b"5").await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::FileTooLarge);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_drop_removes_unfinished_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new().upload_dir(dir.path());

        let mut sink = FileSink::new(&file_part("a.txt"), &config);
        sink.append(b"partial").await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        drop(sink);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new().upload_dir(dir.path().join("does-not-exist"));

        let mut sink = FileSink::new(&file_part("a.txt"), &config);
        let err = sink.append(b"data").await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::StorageWriteFailed);
    }
}
