//! NT Backup stream format
//!
//! This is the format `BackupRead` hands out and `BackupWrite` consumes. A
//! single filesystem object (file or directory) is serialized as a linear
//! sequence of records, one per data region of the object: the primary
//! data, the security descriptor, each named alternate stream, sparse
//! extents and so on.
//!
//! # Records
//!
//! Each record is a header followed by `size` bytes of payload. Unless
//! otherwise noted everything is stored in Little Endian format.
//!
//! | Offset | Type    | Name        | Description |
//! | -----: | ------: | ----------- | ----------- |
//! | 0      | u32     | stream id   | The record type, see [`types::StreamType`] |
//! | 4      | u32     | attributes  | Bitmask, see [`types::StreamAttributes`] |
//! | 8      | i64     | size        | The length of the payload |
//! | 16     | u32     | name size   | The length in bytes of the name, 0 unless `AlternateData` |
//! | 20     | [u8; N] | name        | UTF-16LE name, present only when the name size is not 0 |
//!
//! ## AlternateData
//!
//! The name is stored in its delimited form `:<name>:$DATA`. The header
//! carries the bare `<name>` only, see [`name`].
//!
//! ## SparseBlock
//!
//! Directly after the 20 byte base header there is a u64 offset of the
//! extent within the file stream. The on-wire `size` counts those 8 bytes
//! too, the decoded header does not.
//!
//! | Offset | Type | Name          | Description |
//! | -----: | ---: | ------------- | ----------- |
//! | 20     | u64  | sparse offset | The offset of this block in the file stream |
//!
//! # Pipelines
//!
//! [`reader::BackupReader`] walks a raw stream and exposes it as a plain
//! [`std::io::Read`], [`writer::BackupWriter`] accepts a plain
//! [`std::io::Write`] and re-frames the records into a sink. Both run every
//! record through a [`hook::Transform`] which sees the header bytes too
//! while the header is still active.
pub mod error;
pub mod header;
pub mod hook;
pub mod name;
pub mod reader;
pub mod source;
pub mod types;
pub mod writer;

pub use error::StreamError;
pub use header::RecordHeader;
pub use hook::{Passthrough, Transform, TransformContext};
pub use reader::BackupReader;
pub use source::{BackupSink, BackupSource, Seeked};
pub use types::{StreamAttributes, StreamType};
pub use writer::BackupWriter;

/// Size of the fixed part of a record header
pub const HEADER_SIZE: usize = 20;

/// Size of the sparse block offset field
pub const OFFSET_SIZE: usize = 8;

/// Largest header a valid stream can carry
pub const MAX_HEADER_SIZE: usize = HEADER_SIZE + header::MAX_NAME_SIZE as usize;

/// Where a pipeline is within the current record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    AwaitingHeader,
    InPayload,
}

/// Result of a successful seek on a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOutcome {
    /// Moved this many bytes, still inside the current record
    Within(u64),
    /// Skipped this many bytes and landed on the next record header
    Boundary(u64),
}

// Book keeping shared by both pipelines once the source/sink has moved
pub(crate) fn settle_seek(state: &mut State, bytes_left: &mut i64, seeked: Seeked) -> SeekOutcome {
    match seeked {
        Seeked::Within(n) if (n as i64) < *bytes_left => {
            *bytes_left -= n as i64;
            SeekOutcome::Within(n)
        }
        Seeked::Within(_) | Seeked::Boundary(_) => {
            // Whatever was left of the record is gone
            let skipped = *bytes_left as u64;
            *bytes_left = 0;
            *state = State::AwaitingHeader;
            SeekOutcome::Boundary(skipped)
        }
    }
}
