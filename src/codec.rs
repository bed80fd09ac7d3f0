//! Record framing for the def/ref data files.
//!
//! ## Frame layout
//!
//! ```text
//! +----------------+----------------+------------------+
//! | Length (u32)   | CRC-32 (u32)   | bincode payload  |
//! +----------------+----------------+------------------+
//! ```
//!
//! Records are self-delimiting, so a data file is just a concatenation of
//! frames. The decoder reads exactly one frame per record and never looks
//! past it, which is what makes offset-driven random access safe. A clean
//! EOF before a frame header ends a scan; an EOF inside a frame is corrupt.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};

use crate::error::{Error, Result};

pub(crate) const CRC32: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISCSI);

/// Frame header size in bytes: length + checksum.
pub const FRAME_OVERHEAD: u64 = 8;

pub struct Encoder<W: Write> {
    writer: W,
}

impl<W: Write> Encoder<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes one framed record and returns the number of bytes written,
    /// frame header included.
    pub fn encode<T: Serialize>(&mut self, value: &T) -> Result<u64> {
        let payload = bincode::serialize(value)?;
        self.writer.write_u32::<BigEndian>(payload.len() as u32)?;
        self.writer.write_u32::<BigEndian>(CRC32.checksum(&payload))?;
        self.writer.write_all(&payload)?;
        Ok(FRAME_OVERHEAD + payload.len() as u64)
    }
}

pub struct Decoder<R: Read> {
    reader: R,
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads one framed record. Returns the record and its encoded size, or
    /// `None` at a clean end of file.
    pub fn decode<T: DeserializeOwned>(&mut self) -> Result<Option<(T, u64)>> {
        let len = match self.reader.read_u32::<BigEndian>() {
            Ok(len) => len,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let checksum = self
            .reader
            .read_u32::<BigEndian>()
            .map_err(|e| truncated("checksum", e))?;

        let mut payload = vec![0u8; len as usize];
        self.reader
            .read_exact(&mut payload)
            .map_err(|e| truncated("payload", e))?;

        if CRC32.checksum(&payload) != checksum {
            return Err(crate::corrupt!("record checksum mismatch"));
        }
        let value = bincode::deserialize(&payload)?;
        Ok(Some((value, FRAME_OVERHEAD + len as u64)))
    }
}

fn truncated(part: &str, err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        crate::corrupt!("truncated record {part}")
    } else {
        err.into()
    }
}
