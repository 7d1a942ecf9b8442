//! Record level inventory of a backup stream.
//!
//! [`Inventory`] is a pass-through transform, hooking it into a pipeline
//! leaves the stream untouched while it notes down every record going by.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use log::debug;
use thiserror::Error;

use crate::hash::Checksum;
use crate::stream::hook::with_header;
use crate::stream::name::parse_stream_name;
use crate::stream::{StreamAttributes, StreamError, StreamType, Transform, TransformContext};

const DATA_TYPE: &str = "$DATA";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum InventoryError {
    #[error("alternate data stream does not exist: {0}")]
    NoSuchStream(String),
    #[error("alternate data stream already exists: {0}")]
    StreamExists(String),
}

/// One record as seen going through the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSummary {
    pub id: StreamType,
    pub attributes: StreamAttributes,
    pub name: String,
    pub sparse_offset: u64,
    /// Declared payload size
    pub size: i64,
    /// Payload bytes that actually went by
    pub seen: i64,
    /// xxHash32 of the payload seen
    pub checksum: u32,
}

impl fmt::Display for RecordSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<20} {:#06x} {:>12}", self.id.to_string(), self.attributes.bits(), self.size)?;
        match self.id {
            StreamType::AlternateData => write!(f, " {:>12}", self.name)?,
            StreamType::SparseBlock => write!(f, " {:>#12x}", self.sparse_offset)?,
            _ => write!(f, " {:>12}", "-")?,
        }
        write!(f, " {:08x}", self.checksum)?;
        if self.seen != self.size {
            write!(f, " (truncated at {})", self.seen)?;
        }
        Ok(())
    }
}

/// Named alternate data streams and their sizes.
///
/// Handing out a snapshot is cheap, the map is only copied on the next
/// change while a snapshot is still around.
#[derive(Debug, Clone, Default)]
pub struct StreamMap {
    streams: Arc<BTreeMap<String, i64>>,
}

impl StreamMap {
    pub fn new() -> Self {
        StreamMap::default()
    }

    pub fn insert(&mut self, name: &str, size: i64) -> Option<i64> {
        Arc::make_mut(&mut self.streams).insert(name.to_string(), size)
    }

    /// Insert a stream by its `:<name>:<$TYPE>` name.
    ///
    /// Only `$DATA` streams are alternate data streams, anything else (index
    /// allocations, bitmaps) is skipped and false returned.
    pub fn insert_wire(&mut self, wire: &str, size: i64) -> bool {
        match parse_stream_name(wire) {
            Some((name, DATA_TYPE)) if !name.is_empty() => {
                self.insert(name, size);
                true
            }
            _ => {
                debug!("skipping stream {}", wire);
                false
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.streams.get(name).copied()
    }

    pub fn remove(&mut self, name: &str) -> Result<i64, InventoryError> {
        Arc::make_mut(&mut self.streams)
            .remove(name)
            .ok_or_else(|| InventoryError::NoSuchStream(name.to_string()))
    }

    /// Move `old` to `new`, an existing `new` is only replaced when asked to.
    pub fn rename(&mut self, old: &str, new: &str, overwrite: bool) -> Result<(), InventoryError> {
        let size = self.get(old).ok_or_else(|| InventoryError::NoSuchStream(old.to_string()))?;
        if old == new {
            return Ok(());
        }
        if !overwrite && self.streams.contains_key(new) {
            return Err(InventoryError::StreamExists(new.to_string()));
        }

        let streams = Arc::make_mut(&mut self.streams);
        streams.remove(old);
        streams.insert(new.to_string(), size);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Immutable view of the map as it is right now.
    pub fn snapshot(&self) -> Arc<BTreeMap<String, i64>> {
        Arc::clone(&self.streams)
    }
}

/// Pass-through transform noting down every record.
#[derive(Default)]
pub struct Inventory {
    records: Vec<RecordSummary>,
    streams: StreamMap,
    checksum: Checksum,
    // Payload the last record is still owed
    remaining: i64,
}

impl Inventory {
    pub fn new() -> Self {
        Inventory::default()
    }

    pub fn records(&self) -> &[RecordSummary] {
        &self.records
    }

    pub fn streams(&self) -> &StreamMap {
        &self.streams
    }

    pub fn into_parts(self) -> (Vec<RecordSummary>, StreamMap) {
        (self.records, self.streams)
    }

    fn start_record(&mut self, ctx: &TransformContext<'_>) {
        let hdr = ctx.header;
        debug!("inventory: {}", hdr);

        if hdr.id == StreamType::AlternateData {
            self.streams.insert(&hdr.name, hdr.size);
        }
        self.records.push(RecordSummary {
            id: hdr.id,
            attributes: hdr.attributes,
            name: hdr.name.clone(),
            sparse_offset: hdr.sparse_offset,
            size: hdr.size,
            seen: 0,
            checksum: 0,
        });
        self.checksum = Checksum::new();
    }
}

impl Transform for Inventory {
    fn transform(&mut self, ctx: &mut TransformContext<'_>, data: &[u8]) -> Result<Vec<u8>, StreamError> {
        // A header the pipeline passed on by itself never shows up active
        if ctx.header.is_active() || self.remaining <= 0 {
            self.start_record(ctx);
        }

        self.checksum.update(data);
        if let Some(rec) = self.records.last_mut() {
            rec.seen += data.len() as i64;
            rec.checksum = self.checksum.finalize();
        }
        self.remaining = ctx.bytes_left - data.len() as i64;

        with_header(ctx, data.to_vec())
    }
}
