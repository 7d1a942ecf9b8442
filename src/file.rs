//! Backup streams stored as plain files on disk.
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::stream::{BackupSink, BackupSource, Seeked, StreamError};

/// An owned backup stream file, usable as either end of a pipeline.
///
/// The file is released by [`BackupFile::close`], dropping an open file
/// closes it too but can only log a failure.
#[derive(Debug)]
pub struct BackupFile {
    file: Option<File>,
    path: PathBuf,
    writable: bool,
}

impl BackupFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StreamError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| StreamError::with_path("open", &path, e))?;

        debug!("opened {}", path.display());
        Ok(BackupFile {
            file: Some(file),
            path,
            writable: false,
        })
    }

    /// Create or truncate `path` for writing.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, StreamError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| StreamError::with_path("create", &path, e))?;

        debug!("created {}", path.display());
        Ok(BackupFile {
            file: Some(file),
            path,
            writable: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    /// Flush and release the file. Only the first call does anything.
    ///
    /// Every step is run even after one fails, all failures are reported.
    pub fn close(&mut self) -> Result<(), StreamError> {
        let mut file = match self.file.take() {
            Some(f) => f,
            None => return Ok(()),
        };
        if !self.writable {
            return Ok(());
        }

        let steps = [extend_to_position(&mut file), file.flush(), file.sync_all()];
        let errors: Vec<StreamError> = steps
            .into_iter()
            .filter_map(Result::err)
            .map(|e| StreamError::with_path("close", &self.path, e))
            .collect();

        debug!("closed {}", self.path.display());
        StreamError::aggregate(errors)
    }

    // The kind of `err` is kept
    fn wrap(&self, op: &'static str, err: io::Error) -> io::Error {
        StreamError::with_path(op, &self.path, err).into()
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "backup file is closed"))
    }

    fn seek_forward(&mut self, offset: u64) -> io::Result<Seeked> {
        let delta = i64::try_from(offset).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput));
        let result = delta.and_then(|delta| self.file()?.seek(SeekFrom::Current(delta)));
        match result {
            Ok(_) => Ok(Seeked::Within(offset)),
            Err(e) => Err(self.wrap("seek", e)),
        }
    }
}

// A seek past the end leaves the hole unallocated until the file grows
fn extend_to_position(file: &mut File) -> io::Result<()> {
    let pos = file.stream_position()?;
    if pos > file.metadata()?.len() {
        file.set_len(pos)?;
    }
    Ok(())
}

impl Read for BackupFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let result = self.file().and_then(|f| f.read(buf));
        result.map_err(|e| self.wrap("read", e))
    }
}

impl Write for BackupFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.file().and_then(|f| f.write(buf));
        result.map_err(|e| self.wrap("write", e))
    }

    fn flush(&mut self) -> io::Result<()> {
        let result = match self.file.as_mut() {
            Some(f) => f.flush(),
            None => Ok(()),
        };
        result.map_err(|e| self.wrap("flush", e))
    }
}

impl BackupSource for BackupFile {
    fn seek_relative(&mut self, offset: u64) -> io::Result<Seeked> {
        self.seek_forward(offset)
    }

    fn close(&mut self) -> Result<(), StreamError> {
        BackupFile::close(self)
    }
}

impl BackupSink for BackupFile {
    fn seek_relative(&mut self, offset: u64) -> io::Result<Seeked> {
        self.seek_forward(offset)
    }

    fn close(&mut self) -> Result<(), StreamError> {
        BackupFile::close(self)
    }
}

impl Drop for BackupFile {
    fn drop(&mut self) {
        if self.file.is_some() {
            if let Err(e) = self.close() {
                warn!("dropping {}: {}", self.path.display(), e);
            }
        }
    }
}
