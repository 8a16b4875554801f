use bytes::{Buf, BufMut};

use crate::common::{PageId, Result, StorageError};

/// Tag byte of a record cell
pub const RECORD_CELL_TAG: u8 = 0x01;

/// Tag byte of a pointer cell
pub const POINTER_CELL_TAG: u8 = 0x02;

/// Size of the length prefix in front of keys and values
const FRAME_LEN_SIZE: usize = 4;

/// Cell wire format (all integers big-endian):
///
/// ```text
/// Record  := 0x01 | len(key) u32 | key | len(value) u32 | value
/// Pointer := 0x02 | len(key) u32 | key | target page id u32
/// ```
///
/// Decoded cells own their bytes, so a cell never borrows from the page it
/// was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Record { key: Vec<u8>, value: Vec<u8> },
    Pointer { key: Vec<u8>, target: PageId },
}

impl Cell {
    pub fn record(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Cell::Record {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn pointer(key: impl Into<Vec<u8>>, target: PageId) -> Self {
        Cell::Pointer {
            key: key.into(),
            target,
        }
    }

    pub fn key(&self) -> &[u8] {
        match self {
            Cell::Record { key, .. } | Cell::Pointer { key, .. } => key,
        }
    }

    fn tag(&self) -> u8 {
        match self {
            Cell::Record { .. } => RECORD_CELL_TAG,
            Cell::Pointer { .. } => POINTER_CELL_TAG,
        }
    }

    /// Number of bytes [`Cell::encode`] produces.
    pub fn encoded_len(&self) -> usize {
        let body = match self {
            Cell::Record { key, value } => {
                FRAME_LEN_SIZE + key.len() + FRAME_LEN_SIZE + value.len()
            }
            Cell::Pointer { key, .. } => FRAME_LEN_SIZE + key.len() + 4,
        };
        1 + body
    }

    /// Appends the encoded cell to `buf`.
    pub fn encode_into<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.tag());
        match self {
            Cell::Record { key, value } => {
                put_framed(buf, key);
                put_framed(buf, value);
            }
            Cell::Pointer { key, target } => {
                put_framed(buf, key);
                buf.put_u32(target.as_u32());
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Decodes a cell occupying exactly `data`.
    pub fn decode(data: &[u8]) -> Result<Cell> {
        let mut buf = data;
        let tag = get_tag(&mut buf)?;
        let cell = match tag {
            RECORD_CELL_TAG => {
                let key = get_framed(&mut buf)?.to_vec();
                let value = get_framed(&mut buf)?.to_vec();
                Cell::Record { key, value }
            }
            POINTER_CELL_TAG => {
                let key = get_framed(&mut buf)?.to_vec();
                if buf.remaining() < 4 {
                    return Err(StorageError::CorruptCell(
                        "truncated pointer target".to_string(),
                    ));
                }
                let target = PageId::new(buf.get_u32());
                Cell::Pointer { key, target }
            }
            other => return Err(unknown_tag(other)),
        };
        if buf.has_remaining() {
            return Err(StorageError::CorruptCell(format!(
                "{} trailing bytes after cell",
                buf.remaining()
            )));
        }
        Ok(cell)
    }
}

/// Reads only the key of an encoded cell, borrowing it from `data`.
pub fn decode_key(data: &[u8]) -> Result<&[u8]> {
    let mut buf = data;
    match get_tag(&mut buf)? {
        RECORD_CELL_TAG | POINTER_CELL_TAG => get_framed(&mut buf),
        other => Err(unknown_tag(other)),
    }
}

fn put_framed<B: BufMut>(buf: &mut B, bytes: &[u8]) {
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

fn get_tag(buf: &mut &[u8]) -> Result<u8> {
    if !buf.has_remaining() {
        return Err(StorageError::CorruptCell("empty cell".to_string()));
    }
    Ok(buf.get_u8())
}

fn get_framed<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8]> {
    if buf.remaining() < FRAME_LEN_SIZE {
        return Err(StorageError::CorruptCell(
            "truncated length prefix".to_string(),
        ));
    }
    let len = buf.get_u32() as usize;
    let data: &'a [u8] = *buf;
    if data.len() < len {
        return Err(StorageError::CorruptCell(format!(
            "frame of {} bytes exceeds remaining {}",
            len,
            data.len()
        )));
    }
    let (frame, rest) = data.split_at(len);
    *buf = rest;
    Ok(frame)
}

fn unknown_tag(tag: u8) -> StorageError {
    StorageError::CorruptCell(format!("unknown cell tag {:#04x}", tag))
}
