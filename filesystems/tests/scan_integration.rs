// End-to-end scans of sparse disk images with the built-in detectors

use parthunt_core::{
    check_guesses, AcceptAll, Disk, DiskOptions, ImageGeometry, ModuleRegistry, RunContext, ScanConfig,
    Scanner,
};
use parthunt_filesystems::{register_builtin_detectors, register_signature_file};
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::NamedTempFile;

fn sparse_image(sectors: u64) -> NamedTempFile {
    let image = NamedTempFile::new().unwrap();
    image.as_file().set_len(sectors * 512).unwrap();
    image
}

fn write_at(file: &mut File, offset: u64, bytes: &[u8]) {
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(bytes).unwrap();
}

fn le32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn le16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn ext2_superblock(blocks: u32, log_block_size: u32, blocks_per_group: u32) -> Vec<u8> {
    let mut sb = vec![0u8; 1024];
    le32(&mut sb, 0, 31232);
    le32(&mut sb, 4, blocks);
    le32(&mut sb, 12, blocks - 5000);
    le32(&mut sb, 16, 31000);
    le32(&mut sb, 20, 0);
    le32(&mut sb, 24, log_block_size);
    le32(&mut sb, 32, blocks_per_group);
    le16(&mut sb, 52, 0);
    le16(&mut sb, 54, 20);
    le16(&mut sb, 56, 0xEF53);
    le16(&mut sb, 58, 1);
    le16(&mut sb, 60, 1);
    sb
}

fn swap_header(pages: u32) -> Vec<u8> {
    let mut header = vec![0u8; 4096];
    le32(&mut header, 1024, 1);
    le32(&mut header, 1028, pages - 1);
    header[4096 - 10..].copy_from_slice(b"SWAPSPACE2");
    header
}

fn minix_superblock(zones: u16) -> Vec<u8> {
    let mut sb = vec![0u8; 1024];
    le16(&mut sb, 2, zones);
    le16(&mut sb, 16, 0x137F);
    le16(&mut sb, 18, 1);
    sb
}

fn open(path: &Path, registry: ModuleRegistry, config: ScanConfig) -> RunContext {
    let options = DiskOptions {
        sector_size: Some(512),
        geometry: None,
        query_geometry: false,
    };
    let disk = Disk::open(path, &options, &ImageGeometry).unwrap();
    RunContext::new(config, disk, registry).unwrap()
}

fn builtin_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    register_builtin_detectors(&mut registry).unwrap();
    registry
}

#[test]
fn test_recovers_single_ext2_partition() {
    let _ = env_logger::builder().is_test(true).try_init();

    let image = sparse_image(1_000_000);
    let mut file = image.reopen().unwrap();
    let start: u64 = 2048 * 512;
    // 4 KiB blocks; spare superblock at the start of group 1
    write_at(&mut file, start + 1024, &ext2_superblock(124_744, 2, 32768));
    write_at(&mut file, start + 32768 * 4096, &ext2_superblock(124_744, 2, 32768));
    file.sync_all().unwrap();

    let mut ctx = open(image.path(), builtin_registry(), ScanConfig::default());
    let mut outcome = Scanner::new(&mut ctx, &mut AcceptAll).run().unwrap();

    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].module(), Some("ext2"));

    let check = check_guesses(&ctx.disk, &mut outcome.records);
    assert!(outcome.records[0].flags.primary);
    assert_eq!(check.inconsistencies, 0);
    assert_eq!(check.discarded, 0);

    let entry = check.table.entries[0];
    assert_eq!(entry.partition_type, 0x83);
    assert_eq!(entry.start, 2048);
    assert_eq!(entry.size, 997_952);
    assert_eq!(entry.end(), 1_000_000);
    assert!(check.table.entries[1..].iter().all(|e| e.is_empty()));
    assert!(check.table.has_signature());
}

#[test]
fn test_overlapping_guess_is_discarded() {
    let image = sparse_image(4096);
    let mut file = image.reopen().unwrap();
    // minix v1, 1000 one-KiB zones at sector 64
    write_at(&mut file, 64 * 512 + 1024, &minix_superblock(1000));
    // swap header inside the minix filesystem
    write_at(&mut file, 1024 * 512, &swap_header(10));
    // swap area of 100 pages after it
    write_at(&mut file, 2560 * 512, &swap_header(100));
    file.sync_all().unwrap();

    let config = ScanConfig {
        fast: false,
        ..ScanConfig::default()
    };
    let mut ctx = open(image.path(), builtin_registry(), config);
    let mut outcome = Scanner::new(&mut ctx, &mut AcceptAll).run().unwrap();
    let sectors: Vec<u64> = outcome.records.iter().map(|r| r.sector).collect();
    assert_eq!(sectors, vec![64, 1024, 2560]);

    let check = check_guesses(&ctx.disk, &mut outcome.records);
    assert_eq!(check.discarded, 1);
    assert_eq!(check.inconsistencies, 0);
    assert_eq!(outcome.records.iter().filter(|r| r.flags.primary).count(), 2);

    let table = check.table;
    assert_eq!((table.entries[0].partition_type, table.entries[0].start, table.entries[0].size), (0x80, 64, 2000));
    assert_eq!((table.entries[1].partition_type, table.entries[1].start, table.entries[1].size), (0x82, 2560, 800));
    assert!(table.entries[2].is_empty());
}

#[test]
fn test_loaded_signature_detector_takes_part_in_scan() {
    let image = sparse_image(4096);
    let mut file = image.reopen().unwrap();
    let mut header = vec![0u8; 512];
    header[..8].copy_from_slice(b"-rom1fs-");
    header[8..12].copy_from_slice(&(256u32 * 512).to_be_bytes());
    write_at(&mut file, 128 * 512, &header);
    file.sync_all().unwrap();

    let signatures = NamedTempFile::new().unwrap();
    std::fs::write(
        signatures.path(),
        r#"[{"name": "romfs", "description": "ROM filesystem", "magic_offset": 0,
             "magic": "2d726f6d3166732d", "partition_type": 131,
             "size": {"offset": 8, "width": 4, "endian": "big"}}]"#,
    )
    .unwrap();

    let mut registry = builtin_registry();
    register_signature_file(&mut registry, signatures.path()).unwrap();
    let mut ctx = open(image.path(), registry, ScanConfig::default());
    let outcome = Scanner::new(&mut ctx, &mut AcceptAll).run().unwrap();

    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].module(), Some("romfs"));
    let entry = outcome.records[0].entry().unwrap();
    assert_eq!((entry.start, entry.size), (128, 256));
}
