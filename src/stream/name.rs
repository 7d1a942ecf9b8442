//! Alternate stream names as stored in `AlternateData` records.
//!
//! On the wire a stream name is `:<name>:<$TYPE>` in UTF-16LE with no
//! terminating NUL, only `$DATA` streams carry content worth restoring.
use byteorder::{ByteOrder, LittleEndian};

use crate::stream::StreamError;

const PREFIX: &str = ":";
const DATA_SUFFIX: &str = ":$DATA";

/// Delimit `name` and encode it in its on-wire form.
pub fn wrap(name: &str) -> Vec<u8> {
    let units: Vec<u16> = format!("{}{}{}", PREFIX, name, DATA_SUFFIX).encode_utf16().collect();
    let mut out = vec![0; units.len() * 2];
    LittleEndian::write_u16_into(&units, &mut out);
    out
}

/// Strip the delimiters from a `:<name>:$DATA` string.
///
/// Anything else yields an empty name.
pub fn unwrap(wire: &str) -> &str {
    if !wire.starts_with(PREFIX) || !wire.ends_with(DATA_SUFFIX) {
        return "";
    }

    // ":$DATA" alone starts with the prefix too
    if wire.len() < PREFIX.len() + DATA_SUFFIX.len() {
        return "";
    }

    &wire[PREFIX.len()..wire.len() - DATA_SUFFIX.len()]
}

/// Decode a UTF-16LE name, stopping at the first NUL if there is one.
pub fn decode_utf16(bytes: &[u8]) -> Result<String, StreamError> {
    let mut units = vec![0u16; bytes.len() / 2];
    LittleEndian::read_u16_into(&bytes[..units.len() * 2], &mut units);

    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    String::from_utf16(&units[..end]).map_err(|_| StreamError::InvalidName)
}

/// Split `:<name>:<$TYPE>` into its name and stream type.
pub fn parse_stream_name(wire: &str) -> Option<(&str, &str)> {
    let rest = wire.strip_prefix(PREFIX)?;
    let split = rest.rfind(':')?;
    Some((&rest[..split], &rest[split + 1..]))
}
