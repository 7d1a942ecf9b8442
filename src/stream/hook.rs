use std::io;

use crate::stream::{RecordHeader, StreamError};

/// What a [`Transform`] gets to see on each call
pub struct TransformContext<'a> {
    pub header: &'a RecordHeader,
    /// Payload bytes of the record not yet delivered, before this chunk
    pub bytes_left: i64,
    last_error: Option<io::Error>,
}

impl<'a> TransformContext<'a> {
    pub fn new(header: &'a RecordHeader, bytes_left: i64, last_error: Option<io::Error>) -> Self {
        TransformContext {
            header,
            bytes_left,
            last_error,
        }
    }

    /// Error the source reported while fetching this chunk, if any.
    pub fn last_error(&self) -> Option<&io::Error> {
        self.last_error.as_ref()
    }

    /// Claim the source error. The pipeline returns any error left here
    /// once the transform is done, so taking it is how a transform keeps a
    /// short final read going.
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.last_error.take()
    }

    pub(crate) fn into_error(self) -> Option<io::Error> {
        self.last_error
    }
}

/// Per record hook run on every chunk going through a pipeline.
///
/// While `ctx.header.is_active()` the header has not been passed on yet and
/// the output is expected to start with its encoded bytes.
pub trait Transform {
    fn transform(&mut self, ctx: &mut TransformContext<'_>, data: &[u8]) -> Result<Vec<u8>, StreamError>;
}

impl<F> Transform for F
where
    F: FnMut(&mut TransformContext<'_>, &[u8]) -> Result<Vec<u8>, StreamError>,
{
    fn transform(&mut self, ctx: &mut TransformContext<'_>, data: &[u8]) -> Result<Vec<u8>, StreamError> {
        self(ctx, data)
    }
}

/// Helps closures pick up the higher ranked signature [`Transform`] needs.
pub fn transform_fn<F>(f: F) -> F
where
    F: FnMut(&mut TransformContext<'_>, &[u8]) -> Result<Vec<u8>, StreamError>,
{
    f
}

/// Header (when active) followed by the data as-is
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl Transform for Passthrough {
    fn transform(&mut self, ctx: &mut TransformContext<'_>, data: &[u8]) -> Result<Vec<u8>, StreamError> {
        with_header(ctx, data.to_vec())
    }
}

/// Prefix `data` with the encoded header if it is still active.
pub fn with_header(ctx: &TransformContext<'_>, data: Vec<u8>) -> Result<Vec<u8>, StreamError> {
    if !ctx.header.is_active() {
        return Ok(data);
    }

    let mut out = ctx.header.encode()?;
    out.extend_from_slice(&data);
    Ok(out)
}

/// Decides the fate of every attempt to write to the sink.
///
/// Gets the raw result of the attempt and returns how many bytes count as
/// written, an `Err` aborts the write.
pub trait WriteErrorHook {
    fn on_write(&mut self, result: io::Result<usize>) -> Result<usize, StreamError>;
}

impl<F> WriteErrorHook for F
where
    F: FnMut(io::Result<usize>) -> Result<usize, StreamError>,
{
    fn on_write(&mut self, result: io::Result<usize>) -> Result<usize, StreamError> {
        self(result)
    }
}

/// Any error or a write of zero bytes aborts
#[derive(Debug, Default, Clone, Copy)]
pub struct FailFast;

impl WriteErrorHook for FailFast {
    fn on_write(&mut self, result: io::Result<usize>) -> Result<usize, StreamError> {
        match result {
            Ok(0) => Err(io::Error::from(io::ErrorKind::WriteZero).into()),
            Ok(n) => Ok(n),
            Err(e) => Err(e.into()),
        }
    }
}

/// Retries interrupted and zero length writes, the writer bounds how long
#[derive(Debug, Default, Clone, Copy)]
pub struct RetryShortWrites;

impl WriteErrorHook for RetryShortWrites {
    fn on_write(&mut self, result: io::Result<usize>) -> Result<usize, StreamError> {
        match result {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}
