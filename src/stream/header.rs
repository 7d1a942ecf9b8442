use std::fmt;
use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::trace;

use crate::stream::name;
use crate::stream::{StreamAttributes, StreamError, StreamType, HEADER_SIZE, OFFSET_SIZE};

// NTFS caps a stream name at 255 characters, leave plenty of room for the
// delimiters and odd producers
pub const MAX_NAME_SIZE: u32 = 64 * 1024;

/// One record header, see [`crate::stream`] for the layout.
#[derive(Debug, Clone)]
pub struct RecordHeader {
    pub id: StreamType,
    pub attributes: StreamAttributes,
    /// Payload length, not counting the sparse block offset
    pub size: i64,
    /// Bare name of an `AlternateData` stream
    pub name: String,
    /// Offset of a `SparseBlock` within the file stream
    pub sparse_offset: u64,

    // Header length on the wire including name/offset
    encoded_size: usize,
    // Header still has to be passed on ahead of its payload
    active: bool,
}

impl RecordHeader {
    pub fn new(id: StreamType, size: i64) -> Self {
        RecordHeader {
            id,
            attributes: StreamAttributes::NORMAL,
            size,
            name: String::new(),
            sparse_offset: 0,
            encoded_size: HEADER_SIZE,
            active: false,
        }
    }

    pub fn alternate(name: &str, size: i64) -> Self {
        RecordHeader {
            name: name.to_string(),
            encoded_size: HEADER_SIZE + name::wrap(name).len(),
            ..RecordHeader::new(StreamType::AlternateData, size)
        }
    }

    pub fn sparse(offset: u64, size: i64) -> Self {
        RecordHeader {
            sparse_offset: offset,
            encoded_size: HEADER_SIZE + OFFSET_SIZE,
            ..RecordHeader::new(StreamType::SparseBlock, size)
        }
    }

    pub fn with_attributes(mut self, attributes: StreamAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// True between decoding and the first delivery of payload. While
    /// active the header bytes are part of what a transform has to pass on.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn deactivate(&mut self) {
        self.active = false;
    }

    /// Bytes this header occupies on the wire.
    pub fn encoded_size(&self) -> usize {
        self.encoded_size
    }

    /// Decode the next header from `reader` into `self`.
    ///
    /// A short read surfaces as an `UnexpectedEof` io error, see
    /// [`StreamError::is_incomplete`].
    pub fn decode<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<(), StreamError> {
        self.name.clear();
        self.sparse_offset = 0;
        self.active = false;

        self.id = StreamType::from(reader.read_u32::<LittleEndian>()?);
        self.attributes = StreamAttributes::from_bits_retain(reader.read_u32::<LittleEndian>()?);
        self.size = reader.read_i64::<LittleEndian>()?;
        let name_size = reader.read_u32::<LittleEndian>()?;
        self.encoded_size = HEADER_SIZE;

        match self.id {
            StreamType::AlternateData => {
                if name_size == 0 {
                    return Err(StreamError::EmptyStreamName);
                }
                if name_size & 1 != 0 {
                    return Err(StreamError::OddNameLength(name_size));
                }
                if name_size > MAX_NAME_SIZE {
                    return Err(StreamError::NameTooLong(name_size));
                }

                let mut raw = vec![0; name_size as usize];
                reader.read_exact(&mut raw)?;

                let wire = name::decode_utf16(&raw)?;
                let bare = name::unwrap(&wire);
                if bare.is_empty() {
                    return Err(StreamError::EmptyStreamName);
                }

                self.name.push_str(bare);
                self.encoded_size += name_size as usize;
            }
            StreamType::SparseBlock => {
                self.sparse_offset = reader.read_u64::<LittleEndian>()?;
                self.size -= OFFSET_SIZE as i64;
                self.encoded_size += OFFSET_SIZE;
            }
            _ => (),
        }

        if self.size < 0 {
            return Err(StreamError::NegativeSize(self.size));
        }

        trace!("decoded {}", self);
        self.active = true;
        Ok(())
    }

    /// Encode the header back into its on-wire form.
    pub fn encode(&self) -> Result<Vec<u8>, StreamError> {
        let (extra, name_size, wire_size) = match self.id {
            StreamType::AlternateData => {
                if self.name.is_empty() {
                    return Err(StreamError::EmptyStreamName);
                }
                let wire = name::wrap(&self.name);
                let len = wire.len() as u32;
                (wire, len, self.size)
            }
            StreamType::SparseBlock => {
                let wire_size = self
                    .size
                    .checked_add(OFFSET_SIZE as i64)
                    .ok_or(StreamError::SizeOverflow(self.size))?;
                (self.sparse_offset.to_le_bytes().to_vec(), 0, wire_size)
            }
            _ => (vec![], 0, self.size),
        };

        let mut out = Vec::with_capacity(HEADER_SIZE + extra.len());
        out.write_u32::<LittleEndian>(u32::from(self.id))?;
        out.write_u32::<LittleEndian>(self.attributes.bits())?;
        out.write_i64::<LittleEndian>(wire_size)?;
        out.write_u32::<LittleEndian>(name_size)?;
        out.extend_from_slice(&extra);

        Ok(out)
    }
}

impl Default for RecordHeader {
    fn default() -> Self {
        RecordHeader::new(StreamType::Invalid, 0)
    }
}

// Only the logical fields, the derived and pipeline bookkeeping is ignored
impl PartialEq for RecordHeader {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.attributes == other.attributes
            && self.size == other.size
            && self.name == other.name
            && self.sparse_offset == other.sparse_offset
    }
}

impl Eq for RecordHeader {}

impl fmt::Display for RecordHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{:#x}] size: {}", self.id, self.attributes.bits(), self.size)?;
        match self.id {
            StreamType::AlternateData => write!(f, " name: {:?}", self.name),
            StreamType::SparseBlock => write!(f, " offset: {}", self.sparse_offset),
            _ => Ok(()),
        }
    }
}
