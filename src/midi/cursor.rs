use crate::error::{MidiError, Result};

/// Longest delta-time / length encoding a Standard MIDI File may use.
pub const MAX_VLQ_BYTES: usize = 4;

/// Largest value that fits in four VLQ bytes.
pub const MAX_VLQ_VALUE: u32 = 0x0FFF_FFFF;

/// A saved cursor position, see [`ByteCursor::bookmark`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bookmark(usize);

/// Forward-only reader over a bounded part of a byte buffer.
///
/// The position never passes `end`; every read that would cross it fails
/// with [`MidiError::PrematureEof`] and leaves the position where it was.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteCursor { data, pos: 0, end: data.len() }
    }

    /// A cursor over `data[start..end]`. Offsets stay relative to `data`.
    pub fn with_range(data: &'a [u8], start: usize, end: usize) -> Result<Self> {
        if start > end || end > data.len() {
            return Err(MidiError::PrematureEof { offset: start, what: "cursor range" });
        }
        Ok(ByteCursor { data, pos: start, end })
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.end
    }

    pub fn bookmark(&self) -> Bookmark {
        Bookmark(self.pos)
    }

    /// Go back to a position saved earlier on this cursor.
    pub fn restore(&mut self, mark: Bookmark) {
        debug_assert!(mark.0 <= self.end);
        self.pos = mark.0.min(self.end);
    }

    pub fn peek_u8(&self) -> Result<u8> {
        if self.pos >= self.end {
            return Err(self.eof("byte"));
        }
        Ok(self.data[self.pos])
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let b = self.peek_u8()?;
        self.pos += 1;
        Ok(b)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.read_array::<2>()?;
        Ok(u16::from_be_bytes(b))
    }

    pub fn read_u24(&mut self) -> Result<u32> {
        let b = self.read_array::<3>()?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_array::<4>()?;
        Ok(u32::from_be_bytes(b))
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(self.eof("byte run"));
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.data[start..self.pos])
    }

    /// Skip `len` bytes, failing without moving if that would cross the end.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        if len > self.remaining() {
            return Err(self.eof("skip"));
        }
        self.pos += len;
        Ok(())
    }

    /// Read a MIDI variable-length quantity.
    ///
    /// A fourth byte that still has its continuation bit set is a
    /// [`MidiError::MalformedEvent`]; running out of data is `PrematureEof`.
    pub fn read_vlq(&mut self) -> Result<u32> {
        let start = self.pos;
        let mut value = 0u32;
        for _ in 0..MAX_VLQ_BYTES {
            let b = match self.read_u8() {
                Ok(b) => b,
                Err(e) => {
                    self.pos = start;
                    return Err(e);
                }
            };
            value = (value << 7) | u32::from(b & 0x7F);
            if b & 0x80 == 0 {
                return Ok(value);
            }
        }
        self.pos = start;
        Err(MidiError::MalformedEvent { offset: start, reason: "variable-length quantity longer than 4 bytes" })
    }

    fn eof(&self, what: &'static str) -> MidiError {
        MidiError::PrematureEof { offset: self.pos, what }
    }
}

/// Encode `value` as a MIDI variable-length quantity.
///
/// Values above [`MAX_VLQ_VALUE`] are truncated to 28 bits.
pub fn encode_vlq(value: u32) -> Vec<u8> {
    let value = value & MAX_VLQ_VALUE;
    let mut out = vec![(value & 0x7F) as u8];
    let mut rest = value >> 7;
    while rest > 0 {
        out.push(0x80 | (rest & 0x7F) as u8);
        rest >>= 7;
    }
    out.reverse();
    out
}
