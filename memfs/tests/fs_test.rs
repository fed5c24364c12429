use memfs::io::{BlockStorage, FileBlockEmulatorBuilder};
use memfs::{FsError, MemFs};
use tempfile::NamedTempFile;

#[test]
fn small_device_scenario() {
    let fs = MemFs::new(10, 4).unwrap();
    fs.create("/ankit/file1.txt", false).unwrap();
    fs.create("/ankit/file2.txt", false).unwrap();

    let mut first = fs.open("/ankit/file1.txt").unwrap();
    first.write(b"file 1 data").unwrap();
    assert_eq!(fs.free_blocks(), 2);
    assert_eq!(first.read().unwrap(), b"file 1 data".to_vec());

    let mut second = fs.open("/ankit/file2.txt").unwrap();
    match second.write(&[b'x'; 31]) {
        Err(FsError::OutOfSpace { shortfall }) => assert_eq!(shortfall, 2),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(fs.free_blocks(), 2);
    assert_eq!(first.read().unwrap(), b"file 1 data".to_vec());
}

#[test]
fn block_counts_are_conserved_across_churn() {
    let fs = MemFs::new(8, 16).unwrap();
    let paths: Vec<String> = (0..4).map(|i| format!("/data/f{}", i)).collect();
    for path in &paths {
        fs.create(path, false).unwrap();
    }

    for round in 0..20_usize {
        let path = &paths[round % paths.len()];
        let len = (round * 7) % 40;
        let data: Vec<u8> = (0..len).map(|b| (b + round) as u8).collect();

        let mut file = fs.open(path).unwrap();
        match file.write(&data) {
            Ok(()) => assert_eq!(file.read().unwrap(), data),
            Err(FsError::OutOfSpace { .. }) => (),
            Err(e) => panic!("unexpected {:?}", e),
        }
        drop(file);

        let held: usize = paths
            .iter()
            .map(|p| fs.open(p).unwrap().metadata().blocks)
            .sum();
        assert_eq!(held + fs.free_blocks(), fs.block_count());
        assert!(fs.allocator().is_consistent());
    }
}

#[test]
fn file_system_runs_on_emulated_disk() {
    let disk = NamedTempFile::new().unwrap();
    let dev = FileBlockEmulatorBuilder::from(disk.reopen().unwrap())
        .with_block_size(16)
        .with_block_count(8)
        .build()
        .unwrap();
    assert_eq!(dev.block_count(), 8);

    let fs = MemFs::with_device(dev).unwrap();
    fs.create("/big", false).unwrap();
    let data: Vec<u8> = (0..100).collect();
    let mut file = fs.open("/big").unwrap();
    file.write(&data).unwrap();
    assert_eq!(file.read().unwrap(), data);
    assert_eq!(fs.free_blocks(), 1);
}
