//! The Primitive Codec: low-level reads and writes of wire scalars.
//!
//! [`WireWriter`] and [`WireReader`] wrap a borrowed stream and handle
//! the fixed-width little-endian integers, floats, 7-bit length-prefixed
//! UTF-8 strings, and raw byte blocks that every record is assembled
//! from. They advance the stream cursor and nothing else: the stream is
//! owned by the caller and is never closed, reopened, or repositioned
//! here.
//!
//! A read that cannot be completely satisfied is a
//! [`StreamTruncated`](crate::KnotcodeError::StreamTruncated) error, not
//! a generic I/O error, so corruption by truncation is distinguishable
//! from a genuinely failing stream.

use std::io::{ErrorKind, Read, Write};

use crate::error::{KnotcodeError, Result};

/// Writes wire scalars to a borrowed output stream, tracking the number
/// of bytes emitted.
#[derive(Debug)]
pub struct WireWriter<W: Write> {
    inner: W,
    position: u64,
}

impl<W: Write> WireWriter<W> {
    /// Wraps a borrowed stream.
    pub fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    /// Bytes written since construction.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Flushes the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Writes a raw byte block.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    /// Writes a single byte.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    /// Writes a signed byte.
    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_bytes(&[value as u8])
    }

    /// Writes a little-endian i16.
    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a little-endian u16.
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a little-endian i32.
    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a little-endian u32.
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a little-endian i64.
    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a little-endian u64.
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a little-endian f32.
    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a little-endian f64.
    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a bool as one byte (0 or 1).
    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(u8::from(value))
    }

    /// Writes a char as its UTF-8 encoding (1-4 bytes, no prefix).
    pub fn write_char(&mut self, value: char) -> Result<()> {
        let mut buf = [0u8; 4];
        let encoded = value.encode_utf8(&mut buf);
        self.write_bytes(encoded.as_bytes())
    }

    /// Writes a length as the 7-bit variable encoding: seven payload
    /// bits per byte, high bit set on every byte but the last.
    pub fn write_varlen(&mut self, mut value: u32) -> Result<()> {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                return self.write_u8(byte);
            }
            self.write_u8(byte | 0x80)?;
        }
    }

    /// Writes a 7-bit length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        let len = u32::try_from(value.len()).map_err(|_| {
            KnotcodeError::malformed(format!(
                "string of {} bytes exceeds the wire length limit",
                value.len()
            ))
        })?;
        self.write_varlen(len)?;
        self.write_bytes(value.as_bytes())
    }
}

/// Reads wire scalars from a borrowed input stream, tracking the stream
/// position for diagnostics.
#[derive(Debug)]
pub struct WireReader<R: Read> {
    inner: R,
    position: u64,
}

impl<R: Read> WireReader<R> {
    /// Wraps a borrowed stream.
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    /// Bytes consumed since construction.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Fills `buf` completely, looping over short reads. End of stream
    /// before the buffer is full is a truncation error.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(KnotcodeError::StreamTruncated {
                        needed: buf.len(),
                        available: filled,
                    })
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Err(KnotcodeError::StreamTruncated {
                        needed: buf.len(),
                        available: filled,
                    })
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.position += buf.len() as u64;
        Ok(())
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_bytes(&mut buf)?;
        Ok(buf[0])
    }

    /// Reads a signed byte.
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Reads a little-endian i16.
    pub fn read_i16(&mut self) -> Result<i16> {
        let mut buf = [0u8; 2];
        self.read_bytes(&mut buf)?;
        Ok(i16::from_le_bytes(buf))
    }

    /// Reads a little-endian u16.
    pub fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_bytes(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Reads a little-endian i32.
    pub fn read_i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    /// Reads a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Reads a little-endian i64.
    pub fn read_i64(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    /// Reads a little-endian u64.
    pub fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads a little-endian f32.
    pub fn read_f32(&mut self) -> Result<f32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(f32::from_le_bytes(buf))
    }

    /// Reads a little-endian f64.
    pub fn read_f64(&mut self) -> Result<f64> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }

    /// Reads a bool byte, rejecting anything but 0 or 1.
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(KnotcodeError::malformed(format!(
                "invalid boolean encoding {other:#04x}"
            ))),
        }
    }

    /// Reads a char from its UTF-8 encoding (1-4 bytes, no prefix).
    pub fn read_char(&mut self) -> Result<char> {
        let lead = self.read_u8()?;
        let total = match lead {
            0x00..=0x7f => 1,
            0xc0..=0xdf => 2,
            0xe0..=0xef => 3,
            0xf0..=0xf7 => 4,
            other => {
                return Err(KnotcodeError::malformed(format!(
                    "invalid UTF-8 lead byte {other:#04x} in char value"
                )))
            }
        };
        let mut buf = [lead, 0, 0, 0];
        self.read_bytes(&mut buf[1..total])?;
        let text = std::str::from_utf8(&buf[..total])
            .map_err(|e| KnotcodeError::malformed(format!("invalid char encoding: {e}")))?;
        text.chars()
            .next()
            .ok_or_else(|| KnotcodeError::malformed("empty char encoding".to_string()))
    }

    /// Reads a 7-bit variable-encoded length. Encodings longer than five
    /// bytes (or overflowing 32 bits) are malformed.
    pub fn read_varlen(&mut self) -> Result<u32> {
        let mut value: u32 = 0;
        for shift in (0..35).step_by(7) {
            let byte = self.read_u8()?;
            let payload = u32::from(byte & 0x7f);
            if shift == 28 && payload > 0x0f {
                break;
            }
            value |= payload << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(KnotcodeError::malformed(
            "7-bit length prefix overflows 32 bits".to_string(),
        ))
    }

    /// Reads a 7-bit length-prefixed UTF-8 string, guarding the claimed
    /// length against `max_prealloc` before allocating.
    pub fn read_string(&mut self, max_prealloc: usize) -> Result<String> {
        let len = self.read_varlen()? as usize;
        if len > max_prealloc {
            return Err(KnotcodeError::malformed(format!(
                "string length {len} exceeds the preallocation cap of {max_prealloc} bytes"
            )));
        }
        let mut buf = vec![0u8; len];
        self.read_bytes(&mut buf)?;
        String::from_utf8(buf)
            .map_err(|e| KnotcodeError::malformed(format!("invalid UTF-8 in string: {e}")))
    }
}
