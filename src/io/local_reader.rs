use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

use crate::config::COPY_CHUNK_SIZE;
use crate::error::{Error, Result};

/// Buffered handle on a local source file
///
/// The handle is opened by [`SourceFile::open`] and closed when the value is
/// dropped, so every consumer releases the file on both success and failure.
pub struct SourceFile {
    path: PathBuf,
    reader: BufReader<File>,
    size: u64,
    bytes_read: u64,
}

impl SourceFile {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await.map_err(|source| Error::FileAccess {
            path: path.clone(),
            source,
        })?;
        let size = file
            .metadata()
            .await
            .map_err(|source| Error::FileAccess {
                path: path.clone(),
                source,
            })?
            .len();

        Ok(Self {
            path,
            reader: BufReader::new(file),
            size,
            bytes_read: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File size in bytes at open time
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Total bytes consumed from the file so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Read everything that has not been consumed yet
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let n = self
            .reader
            .read_to_end(&mut buffer)
            .await
            .map_err(|source| self.access_error(source))?;
        self.bytes_read += n as u64;
        Ok(buffer)
    }

    /// Consume the first line and return it without its line terminator
    ///
    /// Returns `None` for an empty file.
    pub async fn read_header(&mut self) -> Result<Option<String>> {
        let mut line = Vec::new();
        let n = self
            .reader
            .read_until(b'\n', &mut line)
            .await
            .map_err(|source| self.access_error(source))?;
        if n == 0 {
            return Ok(None);
        }
        self.bytes_read += n as u64;

        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    /// Read the next piece of at most [`COPY_CHUNK_SIZE`] bytes
    ///
    /// Returns `None` once the end of the file is reached.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
        let n = self
            .reader
            .read(&mut buffer)
            .await
            .map_err(|source| self.access_error(source))?;
        if n == 0 {
            return Ok(None);
        }
        buffer.truncate(n);
        self.bytes_read += n as u64;
        Ok(Some(buffer))
    }

    fn access_error(&self, source: std::io::Error) -> Error {
        Error::FileAccess {
            path: self.path.clone(),
            source,
        }
    }
}
