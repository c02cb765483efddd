// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use keel_core::{FileDisk, MemDisk, LOG_HDR, LOG_HDR2, LOG_START};
use std::time::{Duration, Instant};
use yare::parameterized;

/// First block past the log region
const HOME: u64 = LOG_START + LOG_SIZE;

fn disk() -> Arc<MemDisk> {
    Arc::new(MemDisk::new(LOG_START + 2 * LOG_SIZE + 16))
}

fn blk(tag: u8) -> Block {
    Block::from_bytes(&[tag; 16])
}

fn upd(bnum: u64, tag: u8) -> Update {
    Update::new(bnum, blk(tag))
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn append_then_read() {
    let wal = Walog::open(disk()).unwrap();
    wal.mem_append(vec![upd(HOME, 1), upd(HOME + 1, 2)]).unwrap();

    assert_eq!(wal.read(HOME).unwrap(), blk(1));
    assert_eq!(wal.read(HOME + 1).unwrap(), blk(2));
    wal.shutdown();
}

#[test]
fn read_installed_bypasses_staged_log() {
    let wal = Walog::open(disk()).unwrap();
    wal.mem_append(vec![upd(HOME, 1)]).unwrap();

    // nothing published: the home block is still untouched
    assert_eq!(wal.read_installed(HOME).unwrap(), Block::zeroed());
    assert_eq!(wal.read(HOME).unwrap(), blk(1));
    wal.shutdown();
}

#[test]
fn flushed_appends_survive_restart() {
    let disk = disk();
    let wal = Walog::open(Arc::clone(&disk) as Arc<dyn BlockDevice>).unwrap();
    let txn = wal.mem_append(vec![upd(HOME, 7)]).unwrap();
    wal.flush(txn);
    wal.shutdown();

    let wal = Walog::open(disk as Arc<dyn BlockDevice>).unwrap();
    assert_eq!(wal.read(HOME).unwrap(), blk(7));
    wal.shutdown();
}

#[test]
fn unflushed_appends_are_lost_on_restart() {
    let disk = disk();
    let wal = Walog::open(Arc::clone(&disk) as Arc<dyn BlockDevice>).unwrap();
    wal.mem_append(vec![upd(HOME, 9)]).unwrap();
    wal.shutdown();

    let wal = Walog::open(disk as Arc<dyn BlockDevice>).unwrap();
    assert_eq!(wal.read(HOME).unwrap(), Block::zeroed());
    wal.shutdown();
}

#[test]
fn absorption_latest_value_wins() {
    let wal = Walog::open(disk()).unwrap();
    wal.mem_append(vec![upd(HOME, 1)]).unwrap();
    wal.mem_append(vec![upd(HOME, 2)]).unwrap();

    assert_eq!(wal.read(HOME).unwrap(), blk(2));
    wal.shutdown();
}

#[parameterized(
    single = { 1, true },
    exactly_full = { LOG_SIZE, true },
    one_over = { LOG_SIZE + 1, false },
)]
fn append_batch_size_boundaries(count: u64, fits: bool) {
    let wal = Walog::open(disk()).unwrap();
    let batch: Vec<Update> = (0..count).map(|i| upd(HOME + i, 1)).collect();

    match wal.mem_append(batch) {
        Ok(txn) => {
            assert!(fits);
            wal.flush(txn);
        }
        Err(err) => {
            assert!(!fits);
            assert!(matches!(err, WalError::TooManyUpdates { .. }));
        }
    }
    wal.shutdown();
}

#[test]
fn full_log_blocks_until_installed() {
    let wal = Walog::open(disk()).unwrap();
    let batch: Vec<Update> = (0..LOG_SIZE).map(|i| upd(HOME + i, 1)).collect();
    wal.mem_append(batch).unwrap();

    // no room left: this append waits for the installer to advance the tail
    let txn = wal.mem_append(vec![upd(HOME + LOG_SIZE, 2)]).unwrap();
    wal.flush(txn);

    assert_eq!(wal.read(HOME).unwrap(), blk(1));
    assert_eq!(wal.read(HOME + LOG_SIZE).unwrap(), blk(2));
    wal.shutdown();
}

#[test]
fn flush_on_durable_txn_returns_immediately() {
    let wal = Walog::open(disk()).unwrap();
    let txn = wal.mem_append(vec![upd(HOME, 3)]).unwrap();
    wal.flush(txn);
    wal.flush(txn);
    wal.flush(0);
    wal.shutdown();
}

#[test]
fn flush_covers_all_preceding_appends() {
    let disk = disk();
    let wal = Walog::open(Arc::clone(&disk) as Arc<dyn BlockDevice>).unwrap();
    wal.mem_append(vec![upd(HOME, 1)]).unwrap();
    let txn = wal.mem_append(vec![upd(HOME + 1, 2)]).unwrap();
    wal.flush(txn);
    wal.shutdown();

    let wal = Walog::open(disk as Arc<dyn BlockDevice>).unwrap();
    assert_eq!(wal.read(HOME).unwrap(), blk(1));
    assert_eq!(wal.read(HOME + 1).unwrap(), blk(2));
    wal.shutdown();
}

#[test]
fn installer_copies_updates_home() {
    let wal = Walog::open(disk()).unwrap();
    let txn = wal.mem_append(vec![upd(HOME, 5)]).unwrap();
    wal.flush(txn);

    wait_until(|| wal.read_installed(HOME).unwrap() == blk(5));
    wal.shutdown();
}

#[test]
fn concurrent_disjoint_appends_all_commit() {
    let disk = disk();
    let wal = Arc::new(Walog::open(Arc::clone(&disk) as Arc<dyn BlockDevice>).unwrap());

    std::thread::scope(|scope| {
        for t in 0..4u64 {
            let wal = Arc::clone(&wal);
            scope.spawn(move || {
                for i in 0..8u64 {
                    let bnum = HOME + t * 8 + i;
                    let txn = wal.mem_append(vec![upd(bnum, (t * 8 + i) as u8)]).unwrap();
                    wal.flush(txn);
                }
            });
        }
    });

    for n in 0..32u64 {
        assert_eq!(wal.read(HOME + n).unwrap(), blk(n as u8));
    }
    wal.shutdown();
}

#[test]
fn logged_but_uninstalled_entries_replay_on_recovery() {
    let disk = disk();

    // Hand-build a crashed disk: payload slot and header 1 are durable,
    // header 2 still says nothing was installed.
    disk.write(LOG_START, &blk(8)).unwrap();
    let mut hdr = Block::zeroed();
    hdr.put_u64_le(0, 1);
    hdr.put_u64_le(8, HOME);
    disk.write(LOG_HDR, &hdr).unwrap();
    disk.write(LOG_HDR2, &Block::zeroed()).unwrap();

    let wal = Walog::open(Arc::clone(&disk) as Arc<dyn BlockDevice>).unwrap();
    assert_eq!(wal.read(HOME).unwrap(), blk(8));

    // installation replays; writing the home block twice is idempotent
    wait_until(|| wal.read_installed(HOME).unwrap() == blk(8));
    wal.shutdown();
}

#[test]
fn recovery_is_idempotent() {
    let disk = disk();
    let wal = Walog::open(Arc::clone(&disk) as Arc<dyn BlockDevice>).unwrap();
    let txn = wal.mem_append(vec![upd(HOME, 4)]).unwrap();
    wal.flush(txn);
    wal.shutdown();

    for _ in 0..2 {
        let wal = Walog::open(Arc::clone(&disk) as Arc<dyn BlockDevice>).unwrap();
        assert_eq!(wal.read(HOME).unwrap(), blk(4));
        wal.shutdown();
    }
}

#[test]
fn file_backed_wal_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disk.img");
    let size = LOG_START + LOG_SIZE + 16;

    {
        let disk = Arc::new(FileDisk::open(&path, size).unwrap());
        let wal = Walog::open(disk as Arc<dyn BlockDevice>).unwrap();
        let txn = wal.mem_append(vec![upd(HOME, 6)]).unwrap();
        wal.flush(txn);
        wal.shutdown();
    }

    let disk = Arc::new(FileDisk::open(&path, size).unwrap());
    let wal = Walog::open(disk as Arc<dyn BlockDevice>).unwrap();
    assert_eq!(wal.read(HOME).unwrap(), blk(6));
    wal.shutdown();
}

#[test]
fn position_overflow_is_reported() {
    let disk = disk();

    // Headers claiming the position counter is exhausted
    let mut hdr = Block::zeroed();
    hdr.put_u64_le(0, u64::MAX);
    disk.write(LOG_HDR, &hdr).unwrap();
    let mut hdr2 = Block::zeroed();
    hdr2.put_u64_le(0, u64::MAX);
    disk.write(LOG_HDR2, &hdr2).unwrap();

    let wal = Walog::open(disk as Arc<dyn BlockDevice>).unwrap();
    let err = wal.mem_append(vec![upd(HOME, 1)]).unwrap_err();
    assert!(matches!(err, WalError::PositionOverflow));
    wal.shutdown();
}
