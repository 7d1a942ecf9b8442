use std::cmp;
use std::io::{self, Write};

use log::{debug, trace};

use crate::stream::hook::{FailFast, Passthrough, Transform, TransformContext, WriteErrorHook};
use crate::stream::{settle_seek, BackupSink, RecordHeader, SeekOutcome, State, StreamError};

/// Attempts without progress before a write to the sink is given up
pub const DEFAULT_WRITE_ATTEMPTS: usize = 16;

/// Takes a raw backup stream through plain writes, in whatever chunks the
/// caller likes, and re-frames it record by record into a sink.
pub struct BackupWriter<W: BackupSink, T: Transform = Passthrough, E: WriteErrorHook = FailFast> {
    inner: W,
    header: RecordHeader,
    state: State,
    bytes_left: i64,
    // Header bytes collected so far
    pending: Vec<u8>,
    transform: T,
    on_write: E,
    max_write_attempts: usize,
    // Last failed attempt on the sink, handed to the next transform call
    last_error: Option<io::Error>,
}

impl<W: BackupSink> BackupWriter<W> {
    pub fn new(sink: W) -> Self {
        BackupWriter::with_hooks(sink, Passthrough, FailFast)
    }
}

impl<W: BackupSink, T: Transform> BackupWriter<W, T> {
    pub fn with_transform(sink: W, transform: T) -> Self {
        BackupWriter::with_hooks(sink, transform, FailFast)
    }
}

impl<W: BackupSink, T: Transform, E: WriteErrorHook> BackupWriter<W, T, E> {
    pub fn with_hooks(sink: W, transform: T, on_write: E) -> Self {
        BackupWriter {
            inner: sink,
            header: RecordHeader::default(),
            state: State::AwaitingHeader,
            bytes_left: 0,
            pending: Vec::new(),
            transform,
            on_write,
            max_write_attempts: DEFAULT_WRITE_ATTEMPTS,
            last_error: None,
        }
    }

    /// Bound the attempts a single chunk gets to make progress on the sink.
    pub fn max_write_attempts(mut self, attempts: usize) -> Self {
        self.max_write_attempts = cmp::max(attempts, 1);
        self
    }

    /// The record currently being written.
    pub fn header(&self) -> &RecordHeader {
        &self.header
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Payload of the current record the caller still owes.
    pub fn bytes_left(&self) -> i64 {
        self.bytes_left
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Skip `offset` bytes of the current record's payload on the sink.
    ///
    /// A header not yet passed on is written out first.
    pub fn seek(&mut self, offset: i64) -> Result<SeekOutcome, StreamError> {
        if self.state == State::AwaitingHeader {
            return Err(StreamError::SeekIntoHeader);
        }
        if offset < 0 {
            return Err(StreamError::BackwardSeek(offset));
        }
        if self.header.is_active() {
            self.handle_write(&[])?;
        }

        let want = cmp::min(offset, self.bytes_left) as u64;
        let seeked = self.inner.seek_relative(want)?;
        let outcome = settle_seek(&mut self.state, &mut self.bytes_left, seeked);

        debug!("seek {} -> {:?}", offset, outcome);
        Ok(outcome)
    }

    /// Flush and release the sink. Safe to call more than once.
    ///
    /// A stream cut off inside a record is reported together with any
    /// failure of the sink.
    pub fn close(&mut self) -> Result<(), StreamError> {
        let mut errors = vec![];

        if !self.pending.is_empty() {
            errors.push(StreamError::IncompleteHeader(self.pending.len()));
        } else if self.state == State::InPayload && self.bytes_left > 0 {
            errors.push(StreamError::IncompleteRecord(self.bytes_left));
        }

        self.pending = Vec::new();
        self.state = State::AwaitingHeader;
        self.bytes_left = 0;

        if let Err(e) = self.inner.close() {
            errors.push(e);
        }
        StreamError::aggregate(errors)
    }

    fn handle_write(&mut self, payload: &[u8]) -> Result<(), StreamError> {
        let mut ctx = TransformContext::new(&self.header, self.bytes_left, self.last_error.take());
        let out = self.transform.transform(&mut ctx, payload)?;

        self.write_out(&out)?;

        self.bytes_left -= payload.len() as i64;
        self.header.deactivate();
        Ok(())
    }

    fn write_out(&mut self, mut out: &[u8]) -> Result<(), StreamError> {
        let mut attempts = 0;

        while !out.is_empty() {
            let result = self.inner.write(out);
            if let Err(e) = &result {
                self.last_error = Some(io::Error::new(e.kind(), e.to_string()));
            }
            let written = self.on_write.on_write(result)?;

            if written == 0 {
                attempts += 1;
                if attempts >= self.max_write_attempts {
                    return Err(StreamError::WriteStalled(attempts));
                }
                trace!("short write, attempt {}", attempts);
            } else {
                attempts = 0;
                out = &out[cmp::min(written, out.len())..];
            }
        }
        Ok(())
    }

    fn write_records(&mut self, data: &[u8]) -> Result<usize, StreamError> {
        let mut input = data;

        loop {
            match self.state {
                State::AwaitingHeader => {
                    if input.is_empty() {
                        break;
                    }

                    self.pending.extend_from_slice(input);
                    let mut assembled: &[u8] = &self.pending;
                    match self.header.decode(&mut assembled) {
                        // Not enough for a header yet, hold on to it
                        Err(e) if e.is_incomplete() => return Ok(data.len()),
                        Err(e) => {
                            self.pending.clear();
                            return Err(e);
                        }
                        Ok(()) => {
                            // Whatever follows the header is payload from this call
                            let rest = assembled.len();
                            input = &input[input.len() - rest..];
                        }
                    }

                    debug!("record {}", self.header);
                    self.pending.clear();
                    self.state = State::InPayload;
                    self.bytes_left = self.header.size;
                }
                State::InPayload => {
                    if self.bytes_left == 0 {
                        if self.header.is_active() {
                            self.handle_write(&[])?;
                        }
                        self.state = State::AwaitingHeader;
                        continue;
                    }
                    if input.is_empty() {
                        break;
                    }

                    let take = cmp::min(input.len() as i64, self.bytes_left) as usize;
                    self.handle_write(&input[..take])?;
                    input = &input[take..];
                }
            }
        }

        Ok(data.len())
    }
}

impl<W: BackupSink, T: Transform, E: WriteErrorHook> Write for BackupWriter<W, T, E> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_records(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod test_backup_writer {
    use super::*;
    use crate::stream::hook::{transform_fn, with_header, RetryShortWrites};
    use crate::stream::{BackupReader, Seeked, StreamAttributes, StreamType, HEADER_SIZE};
    use std::io::{Cursor, Read};

    fn record(hdr: &RecordHeader, payload: &[u8]) -> Vec<u8> {
        let mut out = hdr.encode().unwrap();
        out.extend_from_slice(payload);
        out
    }

    fn sample_records() -> Vec<(RecordHeader, Vec<u8>)> {
        vec![
            (
                RecordHeader::new(StreamType::SecurityData, 6).with_attributes(StreamAttributes::CONTAINS_SECURITY),
                b"SECRET".to_vec(),
            ),
            (RecordHeader::new(StreamType::Data, 77), (0..77).collect()),
            (RecordHeader::alternate("ads1", 10), b"0123456789".to_vec()),
            (RecordHeader::new(StreamType::EaData, 0), vec![]),
            (
                RecordHeader::sparse(1 << 20, 9).with_attributes(StreamAttributes::SPARSE),
                b"extent!!!".to_vec(),
            ),
            (RecordHeader::alternate("Zone.Identifier", 3), b"[Z]".to_vec()),
        ]
    }

    fn encode_all(records: &[(RecordHeader, Vec<u8>)]) -> Vec<u8> {
        records.iter().flat_map(|(hdr, payload)| record(hdr, payload)).collect()
    }

    fn write_chunked<W: Write>(writer: &mut W, data: &[u8], chunk: usize) {
        for piece in data.chunks(chunk) {
            assert_eq!(writer.write(piece).unwrap(), piece.len());
        }
    }

    fn read_chunked<R: Read>(reader: &mut R, chunk: usize) -> Vec<u8> {
        let mut out = vec![];
        let mut buf = vec![0u8; chunk];
        loop {
            match reader.read(&mut buf).unwrap() {
                0 => break,
                n => out.extend_from_slice(&buf[..n]),
            }
        }
        out
    }

    // Split a stream back into records through a transform
    fn collect_records(data: Vec<u8>, chunk: usize) -> Vec<(RecordHeader, Vec<u8>)> {
        let mut records: Vec<(RecordHeader, Vec<u8>)> = vec![];
        {
            let collect = transform_fn(|ctx, data| {
                if ctx.header.is_active() {
                    records.push((ctx.header.clone(), vec![]));
                }
                if let Some((_, payload)) = records.last_mut() {
                    payload.extend_from_slice(data);
                }
                with_header(ctx, data.to_vec())
            });
            let mut reader = BackupReader::with_transform(Cursor::new(data), collect);
            read_chunked(&mut reader, chunk);
        }
        records
    }

    // Takes at most `max` bytes per write
    struct Stingy {
        data: Vec<u8>,
        max: usize,
    }

    impl Write for Stingy {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let len = cmp::min(self.max, buf.len());
            self.data.extend_from_slice(&buf[..len]);
            Ok(len)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl BackupSink for Stingy {
        fn seek_relative(&mut self, offset: u64) -> io::Result<Seeked> {
            Ok(Seeked::Within(offset))
        }
    }

    // Every other write is interrupted
    struct Flaky {
        data: Vec<u8>,
        fail: bool,
    }

    impl Write for Flaky {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.fail = !self.fail;
            if self.fail {
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl BackupSink for Flaky {
        fn seek_relative(&mut self, offset: u64) -> io::Result<Seeked> {
            Ok(Seeked::Within(offset))
        }
    }

    // Never accepts anything
    struct Stuck;

    impl Write for Stuck {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    impl BackupSink for Stuck {
        fn seek_relative(&mut self, offset: u64) -> io::Result<Seeked> {
            Ok(Seeked::Within(offset))
        }
    }

    #[test]
    fn ads_then_data_scenario() {
        let first = RecordHeader::alternate("ads1", 10);
        let second = RecordHeader::new(StreamType::Data, 5);
        let mut input = record(&first, b"ABCDEFGHIJ");
        input.extend(record(&second, b"vwxyz"));

        let mut writer = BackupWriter::new(Vec::new());
        write_chunked(&mut writer, &input, 3);
        writer.close().unwrap();
        let stream = writer.into_inner();

        let mut reader = BackupReader::new(Cursor::new(stream));
        let output = read_chunked(&mut reader, 7);

        let mut expected = first.encode().unwrap();
        expected.extend_from_slice(b"ABCDEFGHIJ");
        expected.extend(second.encode().unwrap());
        expected.extend_from_slice(b"vwxyz");
        assert_eq!(output, expected);

        // Stays at the end
        let mut buf = [0u8; 7];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn chunking_invariance() {
        let records = sample_records();
        let input = encode_all(&records);

        for write_chunk in [1, 2, 3, 5, 8, 13, 20, 21, 64, 4096] {
            let mut writer = BackupWriter::new(Vec::new());
            write_chunked(&mut writer, &input, write_chunk);
            writer.close().unwrap();
            let stream = writer.into_inner();
            assert_eq!(stream, input, "write chunk {}", write_chunk);

            // Large enough for every header to reach the transform
            for read_chunk in [72, 128, 4096] {
                assert_eq!(
                    collect_records(stream.clone(), read_chunk),
                    records,
                    "write chunk {} read chunk {}",
                    write_chunk,
                    read_chunk
                );
            }
        }
    }

    #[test]
    fn partial_header_is_held_back() {
        let data = record(&RecordHeader::new(StreamType::Data, 4), b"abcd");
        let mut writer = BackupWriter::new(Vec::new());

        assert_eq!(writer.write(&data[..12]).unwrap(), 12);
        assert!(writer.get_ref().is_empty());
        assert_eq!(writer.state(), State::AwaitingHeader);

        assert_eq!(writer.write(&data[12..22]).unwrap(), 10);
        assert_eq!(writer.state(), State::InPayload);
        assert_eq!(writer.bytes_left(), 2);
        assert_eq!(writer.get_ref(), &data[..22]);
    }

    #[test]
    fn malformed_header_fails() {
        let mut data = vec![];
        data.extend_from_slice(&4u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&10i64.to_le_bytes());
        data.extend_from_slice(&3u32.to_le_bytes());

        let mut writer = BackupWriter::new(Vec::new());
        let err = writer.write(&data).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn redact_on_the_way_in() {
        let records = sample_records();
        let input = encode_all(&records);

        let redact = transform_fn(|ctx, data| {
            if ctx.header.id == StreamType::SecurityData {
                with_header(ctx, vec![0; data.len()])
            } else {
                with_header(ctx, data.to_vec())
            }
        });
        let mut writer = BackupWriter::with_transform(Vec::new(), redact);
        write_chunked(&mut writer, &input, 5);
        writer.close().unwrap();
        let stream = writer.into_inner();

        assert_eq!(stream.len(), input.len());
        assert_eq!(&stream[HEADER_SIZE..HEADER_SIZE + 6], &[0; 6]);
        assert_eq!(&stream[HEADER_SIZE + 6..], &input[HEADER_SIZE + 6..]);
    }

    #[test]
    fn short_writes_are_retried() {
        let input = encode_all(&sample_records());
        let sink = Stingy { data: vec![], max: 3 };

        let mut writer = BackupWriter::new(sink);
        write_chunked(&mut writer, &input, 64);
        assert_eq!(writer.into_inner().data, input);
    }

    #[test]
    fn interrupted_writes_are_retried() {
        let input = encode_all(&sample_records());
        let sink = Flaky { data: vec![], fail: false };

        let mut writer = BackupWriter::with_hooks(sink, Passthrough, RetryShortWrites);
        write_chunked(&mut writer, &input, 64);
        assert_eq!(writer.into_inner().data, input);
    }

    #[test]
    fn transform_sees_last_sink_error() {
        let mut seen = vec![];
        {
            let spy = transform_fn(|ctx, data| {
                seen.push(ctx.last_error().map(|e| e.kind()));
                with_header(ctx, data.to_vec())
            });
            let sink = Flaky { data: vec![], fail: false };
            let mut writer = BackupWriter::with_hooks(sink, spy, RetryShortWrites);

            writer.write_all(&record(&RecordHeader::new(StreamType::Data, 4), b"abcd")).unwrap();
            writer.write_all(&record(&RecordHeader::new(StreamType::EaData, 2), b"ef")).unwrap();
        }

        assert_eq!(seen, vec![None, Some(io::ErrorKind::Interrupted)]);
    }

    #[test]
    fn interrupted_write_fails_fast_by_default() {
        let input = encode_all(&sample_records());
        let sink = Flaky { data: vec![], fail: false };

        let mut writer = BackupWriter::new(sink);
        let err = writer.write(&input).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
    }

    #[test]
    fn stuck_sink_is_bounded() {
        let input = record(&RecordHeader::new(StreamType::Data, 4), b"abcd");

        let mut writer = BackupWriter::with_hooks(Stuck, Passthrough, RetryShortWrites).max_write_attempts(5);
        match writer.write_records(&input) {
            Err(StreamError::WriteStalled(5)) => (),
            x => panic!("unexpected: {:?}", x),
        }

        let mut writer = BackupWriter::new(Stuck);
        let err = writer.write(&input).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn custom_write_hook_aborts() {
        let input = record(&RecordHeader::new(StreamType::Data, 4), b"abcd");
        let mut calls = 0;
        {
            let hook = |result: io::Result<usize>| -> Result<usize, StreamError> {
                calls += 1;
                match result {
                    Ok(n) if n > 0 => Ok(n),
                    _ => Err(StreamError::WriteStalled(1)),
                }
            };
            let mut writer = BackupWriter::with_hooks(Stuck, Passthrough, hook);
            assert!(writer.write(&input).is_err());
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn seek_needs_a_record() {
        let mut writer = BackupWriter::new(Vec::new());
        assert!(matches!(writer.seek(1), Err(StreamError::SeekIntoHeader)));
        assert_eq!(writer.state(), State::AwaitingHeader);

        // Still the case with half a header in
        writer.write_all(&[1, 0, 0, 0]).unwrap();
        assert!(matches!(writer.seek(1), Err(StreamError::SeekIntoHeader)));
        assert_eq!(writer.state(), State::AwaitingHeader);
    }

    #[test]
    fn seek_skips_payload() {
        let hdr = RecordHeader::new(StreamType::Data, 10);
        let next = record(&RecordHeader::new(StreamType::SecurityData, 2), b"sd");
        let mut writer = BackupWriter::new(Vec::new());

        writer.write_all(&hdr.encode().unwrap()).unwrap();
        // Header went out ahead of the hole
        assert_eq!(writer.seek(4).unwrap(), SeekOutcome::Within(4));
        assert_eq!(writer.bytes_left(), 6);
        writer.write_all(b"efghij").unwrap();
        writer.write_all(&next).unwrap();
        writer.close().unwrap();

        let mut expected = record(&hdr, b"\0\0\0\0efghij");
        expected.extend(next);
        assert_eq!(writer.into_inner(), expected);
    }

    #[test]
    fn seek_to_boundary() {
        let hdr = RecordHeader::new(StreamType::Data, 10);
        let mut writer = BackupWriter::new(Vec::new());

        writer.write_all(&record(&hdr, b"abc")).unwrap();
        assert_eq!(writer.seek(100).unwrap(), SeekOutcome::Boundary(7));
        assert_eq!(writer.state(), State::AwaitingHeader);
        writer.close().unwrap();
    }

    #[test]
    fn close_reports_cut_record() {
        let data = record(&RecordHeader::new(StreamType::Data, 10), b"abc");

        let mut writer = BackupWriter::new(Vec::new());
        writer.write_all(&data).unwrap();
        assert!(matches!(writer.close(), Err(StreamError::IncompleteRecord(7))));
        // Only reported once
        writer.close().unwrap();

        let mut writer = BackupWriter::new(Vec::new());
        writer.write_all(&data[..5]).unwrap();
        assert!(matches!(writer.close(), Err(StreamError::IncompleteHeader(5))));
    }

    #[test]
    fn close_aggregates_errors() {
        let data = record(&RecordHeader::new(StreamType::Data, 10), b"abc");
        let mut writer = BackupWriter::with_hooks(Stingy { data: vec![], max: 100 }, Passthrough, FailFast);
        writer.write_all(&data).unwrap();
        assert!(writer.close().is_err());

        let mut writer = BackupWriter::new(Stuck);
        writer.write_all(&[0; 5]).unwrap();
        match writer.close() {
            Err(StreamError::Close(errs)) => {
                assert_eq!(errs.len(), 2);
                assert!(matches!(errs[0], StreamError::IncompleteHeader(5)));
                assert!(matches!(errs[1], StreamError::Io(_)));
            }
            x => panic!("unexpected: {:?}", x),
        }
    }
}
