use std::thread;

use memfs::MemFs;

/// Three writers racing for four 10 byte blocks. The third write cannot fit once
/// the other two have landed and is rejected without touching the allocator.
pub fn main() {
    let fs = MemFs::new(10, 4).expect("should create");
    let jobs: [(&str, &[u8]); 3] = [
        ("/ankit/file1.txt", b"file 1 data"),
        ("/ankit/file2.txt", b"file"),
        ("/ankit/file3.txt", b"file overflow"),
    ];

    thread::scope(|s| {
        for &(path, data) in jobs.iter() {
            let fs = &fs;
            s.spawn(move || {
                fs.create(path, false).expect("should create file");
                let mut file = fs.open(path).expect("should open file");
                match file.write(data) {
                    Ok(()) => {
                        let content = file.read().expect("should read");
                        println!("{}: {}", path, String::from_utf8_lossy(&content));
                    }
                    Err(e) => println!("{}: {}", path, e),
                }
                fs.close(file);
            });
        }
    });

    println!("{} of {} blocks free", fs.free_blocks(), fs.block_count());
}
