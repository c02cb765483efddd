// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn memdisk_roundtrip() {
    let disk = MemDisk::new(8);
    let block = Block::from_bytes(b"payload");
    disk.write(3, &block).unwrap();
    assert_eq!(disk.read(3).unwrap(), block);
    assert_eq!(disk.read(4).unwrap(), Block::zeroed());
}

#[test]
fn memdisk_rejects_out_of_range() {
    let disk = MemDisk::new(4);
    assert!(matches!(
        disk.read(4),
        Err(DiskError::OutOfRange { bnum: 4, size: 4 })
    ));
    assert!(matches!(
        disk.write(9, &Block::zeroed()),
        Err(DiskError::OutOfRange { bnum: 9, size: 4 })
    ));
}

#[test]
fn filedisk_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disk.img");

    let disk = FileDisk::open(&path, 16).unwrap();
    let block = Block::from_bytes(&[0xab; 64]);
    disk.write(5, &block).unwrap();
    assert_eq!(disk.read(5).unwrap(), block);

    // Fresh blocks read back as zeros
    assert_eq!(disk.read(0).unwrap(), Block::zeroed());
}

#[test]
fn filedisk_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disk.img");

    {
        let disk = FileDisk::open(&path, 8).unwrap();
        disk.write(2, &Block::from_bytes(b"persist me")).unwrap();
    }

    let disk = FileDisk::open(&path, 8).unwrap();
    assert_eq!(&disk.read(2).unwrap().as_bytes()[..10], b"persist me");
}

#[test]
fn filedisk_rejects_out_of_range() {
    let dir = tempfile::tempdir().unwrap();
    let disk = FileDisk::open(&dir.path().join("disk.img"), 4).unwrap();
    assert!(matches!(
        disk.read(4),
        Err(DiskError::OutOfRange { bnum: 4, size: 4 })
    ));
}
