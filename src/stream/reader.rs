use std::cmp;
use std::io::{self, Read};

use log::debug;

use crate::buf::{fill_buf, flush_buf};
use crate::stream::hook::{Passthrough, Transform, TransformContext};
use crate::stream::{settle_seek, BackupSource, RecordHeader, SeekOutcome, State, StreamError, HEADER_SIZE};

/// Walks a raw backup stream record by record and hands it out as a plain
/// byte stream, every chunk passing through the transform first.
pub struct BackupReader<S: BackupSource, T: Transform = Passthrough> {
    inner: S,
    header: RecordHeader,
    state: State,
    bytes_left: i64,
    // Transform output that did not fit the caller's buffer
    leftover: Vec<u8>,
    transform: T,
}

impl<S: BackupSource> BackupReader<S> {
    pub fn new(source: S) -> Self {
        BackupReader::with_transform(source, Passthrough)
    }
}

impl<S: BackupSource, T: Transform> BackupReader<S, T> {
    pub fn with_transform(source: S, transform: T) -> Self {
        BackupReader {
            inner: source,
            header: RecordHeader::default(),
            state: State::AwaitingHeader,
            bytes_left: 0,
            leftover: Vec::new(),
            transform,
        }
    }

    /// The record currently being read.
    pub fn header(&self) -> &RecordHeader {
        &self.header
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Payload of the current record still to come from the source.
    pub fn bytes_left(&self) -> i64 {
        self.bytes_left
    }

    pub fn transform(&self) -> &T {
        &self.transform
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn into_parts(self) -> (S, T) {
        (self.inner, self.transform)
    }

    /// Skip `offset` bytes of the current record's payload.
    ///
    /// Seeks never leave the current record, asking for more than is left
    /// lands on the next header.
    pub fn seek(&mut self, offset: i64) -> Result<SeekOutcome, StreamError> {
        if self.state == State::AwaitingHeader {
            return Err(StreamError::SeekIntoHeader);
        }
        if offset < 0 {
            return Err(StreamError::BackwardSeek(offset));
        }

        let want = cmp::min(offset, self.bytes_left) as u64;
        let seeked = self.inner.seek_relative(want)?;
        let outcome = settle_seek(&mut self.state, &mut self.bytes_left, seeked);

        debug!("seek {} -> {:?}", offset, outcome);
        Ok(outcome)
    }

    /// Release the source. Safe to call more than once.
    pub fn close(&mut self) -> Result<(), StreamError> {
        self.leftover = Vec::new();
        self.inner.close()
    }

    // Returns false on a clean end of the stream
    fn next_header(&mut self) -> Result<bool, StreamError> {
        let mut base = [0u8; HEADER_SIZE];
        match fill_buf(&mut self.inner, &mut base)? {
            (true, 0) => return Ok(false),
            (true, _) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
            _ => (),
        }

        let mut stream = (&base[..]).chain(&mut self.inner);
        self.header.decode(&mut stream)?;

        debug!("record {}", self.header);
        self.state = State::InPayload;
        self.bytes_left = self.header.size;
        Ok(true)
    }

    fn handle_read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        let mut read_size = cmp::min(buf.len() as i64, self.bytes_left);
        if self.header.is_active() && self.bytes_left > buf.len() as i64 {
            // Leave room for the header ahead of the payload
            read_size -= self.header.encoded_size() as i64;
        }

        let out = if read_size > 0 {
            let result = self.inner.read(&mut buf[..read_size as usize]);
            let (read, last_error) = match result {
                Ok(0) => (0, Some(io::Error::new(io::ErrorKind::UnexpectedEof, "backup stream ended inside a record"))),
                Ok(n) => (n, None),
                Err(e) => (0, Some(e)),
            };

            let mut ctx = TransformContext::new(&self.header, self.bytes_left, last_error);
            let out = self.transform.transform(&mut ctx, &buf[..read])?;
            if let Some(e) = ctx.into_error() {
                return Err(e.into());
            }

            if read == 0 {
                // Transform took the error and chose to carry on, nothing
                // more is coming for this record
                self.bytes_left = 0;
            } else {
                self.bytes_left -= read as i64;
            }
            out
        } else {
            self.header.encode()?
        };

        self.header.deactivate();
        self.leftover = out;
        Ok(flush_buf(&mut self.leftover, buf))
    }

    // Empty records still owe the caller their header
    fn handle_empty(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        let mut ctx = TransformContext::new(&self.header, 0, None);
        let out = self.transform.transform(&mut ctx, &[])?;

        self.header.deactivate();
        self.leftover = out;
        Ok(flush_buf(&mut self.leftover, buf))
    }

    fn read_records(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        if !self.leftover.is_empty() {
            return Ok(flush_buf(&mut self.leftover, buf));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            match self.state {
                State::AwaitingHeader => {
                    if !self.next_header()? {
                        return Ok(0);
                    }
                }
                State::InPayload => {
                    let copied = if self.bytes_left > 0 {
                        self.handle_read(buf)?
                    } else if self.header.is_active() {
                        self.handle_empty(buf)?
                    } else {
                        self.state = State::AwaitingHeader;
                        continue;
                    };

                    // Zero bytes would read as the end of the stream, the
                    // transform dropped this chunk so move on
                    if copied > 0 {
                        return Ok(copied);
                    }
                }
            }
        }
    }
}

impl<S: BackupSource, T: Transform> Read for BackupReader<S, T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_records(buf)?)
    }
}
