// Bounds-checked fixed-width reads at byte offsets
use byteorder::{BigEndian, ByteOrder, LittleEndian};

pub fn u8_at(buf: &[u8], offset: usize) -> Option<u8> {
    buf.get(offset).copied()
}

pub fn i8_at(buf: &[u8], offset: usize) -> Option<i8> {
    u8_at(buf, offset).map(|b| b as i8)
}

pub fn bytes_at(buf: &[u8], offset: usize, len: usize) -> Option<&[u8]> {
    buf.get(offset..offset.checked_add(len)?)
}

/// True when `pattern` is found at `offset`.
pub fn has_bytes(buf: &[u8], offset: usize, pattern: &[u8]) -> bool {
    bytes_at(buf, offset, pattern.len()) == Some(pattern)
}

pub fn le_u16(buf: &[u8], offset: usize) -> Option<u16> {
    bytes_at(buf, offset, 2).map(LittleEndian::read_u16)
}

pub fn le_i16(buf: &[u8], offset: usize) -> Option<i16> {
    bytes_at(buf, offset, 2).map(LittleEndian::read_i16)
}

pub fn le_u32(buf: &[u8], offset: usize) -> Option<u32> {
    bytes_at(buf, offset, 4).map(LittleEndian::read_u32)
}

pub fn le_u64(buf: &[u8], offset: usize) -> Option<u64> {
    bytes_at(buf, offset, 8).map(LittleEndian::read_u64)
}

pub fn le_i64(buf: &[u8], offset: usize) -> Option<i64> {
    bytes_at(buf, offset, 8).map(LittleEndian::read_i64)
}

pub fn be_u16(buf: &[u8], offset: usize) -> Option<u16> {
    bytes_at(buf, offset, 2).map(BigEndian::read_u16)
}

pub fn be_u32(buf: &[u8], offset: usize) -> Option<u32> {
    bytes_at(buf, offset, 4).map(BigEndian::read_u32)
}

pub fn be_u64(buf: &[u8], offset: usize) -> Option<u64> {
    bytes_at(buf, offset, 8).map(BigEndian::read_u64)
}

/// Length of a NUL-terminated string field of at most `max` bytes.
pub fn c_str_len(buf: &[u8], offset: usize, max: usize) -> Option<usize> {
    let field = bytes_at(buf, offset, max)?;
    Some(field.iter().position(|&b| b == 0).unwrap_or(max))
}
