//! Record stream wire protocol
//!
//! Every record travels as one self-describing frame. The payload is the
//! bincode encoding of a [`Record`] and the frame is validated with CRC32:
//!
//! ```text
//! [frame_type:1][length:4][payload:N][crc32:4]
//! ```
//!
//! A stream is a plain concatenation of frames. End of input at a frame
//! boundary ends the stream; anything else that cannot be decoded is a
//! [`Error::CorruptStream`].

use crate::config::DEFAULT_MAX_FRAME_LEN;
use crate::record::Record;
use crate::{Error, Result};
use crc32fast::Hasher;
use std::io::{ErrorKind, Read, Write};
use std::iter::FusedIterator;

/// Header size: type(1) + length(4)
const HEADER_LEN: usize = 5;

/// Trailer size: crc32(4)
const CRC_LEN: usize = 4;

/// Frame types
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// One encoded record
    Record = 0x01,
}

impl TryFrom<u8> for FrameType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::Record),
            _ => Err(Error::corrupt_stream(format!(
                "Unknown frame type: {:#04x}",
                value
            ))),
        }
    }
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn checksum(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Encode a record into a single frame
pub fn encode(record: &Record) -> Result<Vec<u8>> {
    let payload = bincode::serialize(record)
        .map_err(|e| Error::internal(format!("Serialization failed: {}", e)))?;
    let length = u32::try_from(payload.len())
        .map_err(|_| Error::internal(format!("Record too large: {} bytes", payload.len())))?;

    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len() + CRC_LEN);
    buf.push(FrameType::Record as u8);
    buf.extend_from_slice(&length.to_le_bytes());
    buf.extend_from_slice(&payload);

    // CRC32 of type + length + payload
    let crc = checksum(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());

    Ok(buf)
}

/// Decode exactly one frame
pub fn decode(buf: &[u8]) -> Result<Record> {
    if buf.len() < HEADER_LEN + CRC_LEN {
        return Err(Error::corrupt_stream("Frame too short"));
    }

    // Verify CRC
    let crc_offset = buf.len() - CRC_LEN;
    let stored_crc = le_u32(&buf[crc_offset..]);
    let computed_crc = checksum(&buf[..crc_offset]);
    if stored_crc != computed_crc {
        return Err(Error::corrupt_stream(format!(
            "CRC mismatch: expected {:x}, got {:x}",
            stored_crc, computed_crc
        )));
    }

    FrameType::try_from(buf[0])?;

    let length = le_u32(&buf[1..HEADER_LEN]) as usize;
    if buf.len() != HEADER_LEN + length + CRC_LEN {
        return Err(Error::corrupt_stream(format!(
            "Frame length mismatch: header says {} bytes, frame carries {}",
            length,
            buf.len() - HEADER_LEN - CRC_LEN
        )));
    }

    let payload = &buf[HEADER_LEN..HEADER_LEN + length];
    bincode::deserialize(payload)
        .map_err(|e| Error::corrupt_stream(format!("Deserialization failed: {}", e)))
}

/// Write one record to a stream
pub fn write<W: Write>(stream: &mut W, record: &Record) -> Result<()> {
    let buf = encode(record)?;
    stream.write_all(&buf)?;
    Ok(())
}

/// Lazily read records from a stream
pub fn read_records<R: Read>(stream: R) -> RecordReader<R> {
    RecordReader::new(stream)
}

/// Frame writer over any [`Write`]
pub struct RecordWriter<W: Write> {
    inner: W,
    records_written: u64,
}

impl<W: Write> RecordWriter<W> {
    /// Wrap a writer
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            records_written: 0,
        }
    }

    /// Encode and write one record
    pub fn write(&mut self, record: &Record) -> Result<()> {
        write(&mut self.inner, record)?;
        self.records_written += 1;
        Ok(())
    }

    /// Flush the underlying writer
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Number of records written so far
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Unwrap the underlying writer
    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Lazy, finite, non-restartable record sequence over any [`Read`]
///
/// Yields `Ok(record)` per frame and stops at end of input. The first
/// error is yielded once and ends the sequence.
pub struct RecordReader<R: Read> {
    inner: R,
    max_frame_len: u32,
    records_read: u64,
    done: bool,
}

impl<R: Read> RecordReader<R> {
    /// Wrap a reader with the default frame size limit
    pub fn new(inner: R) -> Self {
        Self::with_max_frame_len(inner, DEFAULT_MAX_FRAME_LEN)
    }

    /// Wrap a reader, rejecting frames whose payload exceeds `max_frame_len`
    pub fn with_max_frame_len(inner: R, max_frame_len: u32) -> Self {
        Self {
            inner,
            max_frame_len,
            records_read: 0,
            done: false,
        }
    }

    /// Number of records decoded so far
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    fn read_frame(&mut self) -> Result<Option<Record>> {
        let mut header = [0u8; HEADER_LEN];

        // A clean end of input is only allowed before the first header byte
        let n = loop {
            match self.inner.read(&mut header[..1]) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if n == 0 {
            return Ok(None);
        }
        read_exact_or_corrupt(&mut self.inner, &mut header[1..], "frame header")?;

        FrameType::try_from(header[0])?;
        let length = le_u32(&header[1..]);
        if length > self.max_frame_len {
            return Err(Error::corrupt_stream(format!(
                "Frame of {} bytes exceeds limit of {} bytes",
                length, self.max_frame_len
            )));
        }

        let mut buf = vec![0u8; HEADER_LEN + length as usize + CRC_LEN];
        buf[..HEADER_LEN].copy_from_slice(&header);
        read_exact_or_corrupt(&mut self.inner, &mut buf[HEADER_LEN..], "frame body")?;

        decode(&buf).map(Some)
    }
}

fn read_exact_or_corrupt<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            Err(Error::corrupt_stream(format!("Truncated {}", what)))
        }
        Err(e) => Err(e.into()),
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_frame() {
            Ok(Some(record)) => {
                self.records_read += 1;
                Some(Ok(record))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<R: Read> FusedIterator for RecordReader<R> {}
