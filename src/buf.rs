use std::cmp;
use std::io::{ErrorKind, Read};

/// Read until `buf` is full or the reader is exhausted.
///
/// Returns `(eof, filled)`, `eof` is set when the reader returned 0 before
/// `buf` was full.
pub fn fill_buf<R: Read + ?Sized>(data: &mut R, buf: &mut [u8]) -> std::io::Result<(bool, usize)> {
    let mut filled = 0;

    while filled < buf.len() {
        match data.read(&mut buf[filled..]) {
            Ok(0) => return Ok((true, filled)),
            Ok(x) => filled += x,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
    }
    Ok((false, filled))
}

/// Move as much of `pending` as fits into `buf`, keeping the rest queued
/// in order for the next call.
pub fn flush_buf(pending: &mut Vec<u8>, buf: &mut [u8]) -> usize {
    let split_at = cmp::min(pending.len(), buf.len());
    buf[..split_at].copy_from_slice(&pending[..split_at]);
    pending.drain(..split_at);

    split_at
}
