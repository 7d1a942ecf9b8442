use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{op} {}: {source}", .path.display())]
    Path {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("length of the stream name is an odd number: {0}")]
    OddNameLength(u32),
    #[error("length of the stream name exceeds the limit: {0}")]
    NameTooLong(u32),
    #[error("alternate data stream name is empty")]
    EmptyStreamName,
    #[error("stream name is not valid UTF-16")]
    InvalidName,
    #[error("record size is negative: {0}")]
    NegativeSize(i64),
    #[error("record size does not fit on the wire: {0}")]
    SizeOverflow(i64),
    #[error("cannot seek while a record header is pending")]
    SeekIntoHeader,
    #[error("only forward seeks are supported: {0}")]
    BackwardSeek(i64),
    #[error("sink made no progress after {0} write attempts")]
    WriteStalled(usize),
    #[error("stream ended with {0} bytes of the record missing")]
    IncompleteRecord(i64),
    #[error("stream ended inside a record header after {0} bytes")]
    IncompleteHeader(usize),
    #[error("failed to release backup stream: {}", join(.0))]
    Close(Vec<StreamError>),
}

impl StreamError {
    /// The input ran out before a header could be decoded, more bytes are
    /// needed rather than something being wrong.
    pub fn is_incomplete(&self) -> bool {
        match self {
            StreamError::Io(e) => e.kind() == io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }

    /// Closest io error kind, a wrapped io error keeps its own.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            StreamError::Io(e) => e.kind(),
            StreamError::Path { source, .. } => source.kind(),
            StreamError::SeekIntoHeader | StreamError::BackwardSeek(_) => io::ErrorKind::InvalidInput,
            StreamError::WriteStalled(_) => io::ErrorKind::WriteZero,
            StreamError::IncompleteRecord(_) | StreamError::IncompleteHeader(_) => io::ErrorKind::UnexpectedEof,
            _ => io::ErrorKind::InvalidData,
        }
    }

    pub(crate) fn with_path(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        StreamError::Path {
            op,
            path: path.into(),
            source,
        }
    }

    /// Fold the errors collected while releasing resources into one.
    pub(crate) fn aggregate(mut errors: Vec<StreamError>) -> Result<(), StreamError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(StreamError::Close(errors)),
        }
    }
}

fn join(errors: &[StreamError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<String>>()
        .join("; ")
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> io::Error {
        match err {
            StreamError::Io(e) => e,
            x => io::Error::new(x.kind(), x),
        }
    }
}
