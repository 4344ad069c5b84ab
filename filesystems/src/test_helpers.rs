// Test helpers for detector testing

use parthunt_core::{Disk, DiskGeometry};
use std::io::Cursor;

/// In-memory disk over `image` with 512-byte sectors.
pub fn memory_disk(image: Vec<u8>) -> Disk {
    let sectors = image.len() as u64 / 512;
    Disk::from_reader(Cursor::new(image), 512, DiskGeometry::synthesize(sectors))
        .expect("memory disk")
}

/// Zeroed image of `sectors` 512-byte sectors.
pub fn blank_image(sectors: usize) -> Vec<u8> {
    vec![0u8; sectors * 512]
}

pub fn put_le16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn put_le32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn put_le64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

pub fn put_be16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

pub fn put_be32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

pub fn put_be64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_be_bytes());
}
