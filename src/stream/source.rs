//! Contract between the pipelines and whatever physically moves the raw
//! backup bytes.
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use crate::stream::StreamError;

/// Outcome of a relative seek on a source or sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seeked {
    /// Moved this many bytes
    Within(u64),
    /// Moved this many bytes and stopped at the start of the next record
    Boundary(u64),
}

/// Raw backup stream to read records from.
pub trait BackupSource: Read {
    /// Skip `offset` bytes forward. Never called with more than what is
    /// left of the current record's payload.
    fn seek_relative(&mut self, offset: u64) -> io::Result<Seeked>;

    /// Release whatever backs the source, must be safe to call again.
    fn close(&mut self) -> Result<(), StreamError> {
        Ok(())
    }
}

/// Raw backup stream to write records to.
pub trait BackupSink: Write {
    /// Skip `offset` bytes forward. Never called with more than what is
    /// left of the current record's payload.
    fn seek_relative(&mut self, offset: u64) -> io::Result<Seeked>;

    /// Flush and release whatever backs the sink, must be safe to call again.
    fn close(&mut self) -> Result<(), StreamError> {
        self.flush()?;
        Ok(())
    }
}

impl<S: BackupSource + ?Sized> BackupSource for &mut S {
    fn seek_relative(&mut self, offset: u64) -> io::Result<Seeked> {
        (**self).seek_relative(offset)
    }

    fn close(&mut self) -> Result<(), StreamError> {
        (**self).close()
    }
}

impl<S: BackupSink + ?Sized> BackupSink for &mut S {
    fn seek_relative(&mut self, offset: u64) -> io::Result<Seeked> {
        (**self).seek_relative(offset)
    }

    fn close(&mut self) -> Result<(), StreamError> {
        (**self).close()
    }
}

impl<S: BackupSource + ?Sized> BackupSource for Box<S> {
    fn seek_relative(&mut self, offset: u64) -> io::Result<Seeked> {
        (**self).seek_relative(offset)
    }

    fn close(&mut self) -> Result<(), StreamError> {
        (**self).close()
    }
}

impl<S: BackupSink + ?Sized> BackupSink for Box<S> {
    fn seek_relative(&mut self, offset: u64) -> io::Result<Seeked> {
        (**self).seek_relative(offset)
    }

    fn close(&mut self) -> Result<(), StreamError> {
        (**self).close()
    }
}

// In memory streams have no notion of records, the pipeline keeps seeks
// inside the current one
fn cursor_seek<C: Seek>(cursor: &mut C, offset: u64) -> io::Result<Seeked> {
    let delta = i64::try_from(offset).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    let before = cursor.stream_position()?;
    let after = cursor.seek(SeekFrom::Current(delta))?;
    Ok(Seeked::Within(after - before))
}

impl<T: AsRef<[u8]>> BackupSource for Cursor<T> {
    fn seek_relative(&mut self, offset: u64) -> io::Result<Seeked> {
        cursor_seek(self, offset)
    }
}

impl BackupSink for Cursor<Vec<u8>> {
    fn seek_relative(&mut self, offset: u64) -> io::Result<Seeked> {
        cursor_seek(self, offset)
    }
}

impl BackupSink for Cursor<&mut Vec<u8>> {
    fn seek_relative(&mut self, offset: u64) -> io::Result<Seeked> {
        cursor_seek(self, offset)
    }
}

impl BackupSink for Vec<u8> {
    // Skipped payload reads back as zeros
    fn seek_relative(&mut self, offset: u64) -> io::Result<Seeked> {
        let len = usize::try_from(offset).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
        self.resize(self.len() + len, 0);
        Ok(Seeked::Within(offset))
    }
}
