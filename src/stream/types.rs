use std::fmt;

use bitflags::bitflags;
use serde::Deserialize;

/// Type of the data held in a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum StreamType {
    Invalid,
    /// Standard data of the unnamed stream
    Data,
    /// Extended attributes
    EaData,
    /// Security descriptor
    SecurityData,
    /// Named alternate data stream
    AlternateData,
    /// Hard link information
    Link,
    PropertyData,
    ObjectId,
    ReparseData,
    /// Extent of a sparse file, prefixed by its offset
    SparseBlock,
    /// Transactional NTFS data
    TxfsData,
    GhostedFileExtents,
    /// Id with no known meaning, kept so it can be copied through as-is
    Unknown(u32),
}

impl From<u32> for StreamType {
    fn from(id: u32) -> Self {
        match id {
            0 => StreamType::Invalid,
            1 => StreamType::Data,
            2 => StreamType::EaData,
            3 => StreamType::SecurityData,
            4 => StreamType::AlternateData,
            5 => StreamType::Link,
            6 => StreamType::PropertyData,
            7 => StreamType::ObjectId,
            8 => StreamType::ReparseData,
            9 => StreamType::SparseBlock,
            10 => StreamType::TxfsData,
            11 => StreamType::GhostedFileExtents,
            x => StreamType::Unknown(x),
        }
    }
}

impl From<StreamType> for u32 {
    fn from(typ: StreamType) -> u32 {
        match typ {
            StreamType::Invalid => 0,
            StreamType::Data => 1,
            StreamType::EaData => 2,
            StreamType::SecurityData => 3,
            StreamType::AlternateData => 4,
            StreamType::Link => 5,
            StreamType::PropertyData => 6,
            StreamType::ObjectId => 7,
            StreamType::ReparseData => 8,
            StreamType::SparseBlock => 9,
            StreamType::TxfsData => 10,
            StreamType::GhostedFileExtents => 11,
            StreamType::Unknown(x) => x,
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamType::Unknown(x) => write!(f, "Unknown({:#x})", x),
            x => write!(f, "{:?}", x),
        }
    }
}

bitflags! {
    /// Properties of the record, carried through untouched
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StreamAttributes: u32 {
        const MODIFIED_WHEN_READ = 1;
        const CONTAINS_SECURITY = 1 << 1;
        const CONTAINS_PROPERTIES = 1 << 2;
        const SPARSE = 1 << 3;
        const CONTAINS_GHOSTED_FILE_EXTENTS = 1 << 4;

        // Keep bits we don't know about
        const _ = !0;
    }
}

impl StreamAttributes {
    pub const NORMAL: StreamAttributes = StreamAttributes::empty();
}
