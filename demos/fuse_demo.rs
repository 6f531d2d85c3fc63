use std::env;
use std::time::Instant;

use fuse_filter::{BinaryFuseFilter16, BinaryFuseFilter8};

fn main() {
    let mut key_count = 1_000_000_usize;

    let mut args = env::args().skip(1);
    while let Some(flag) = args.next() {
        match flag.as_str() {
            "--keys" => {
                let value = args.next().expect("expected value after --keys");
                key_count = value.parse().expect("invalid value for --keys");
            }
            other => panic!("unknown flag: {other}"),
        }
    }

    let mut keys: Vec<u64> = (0..key_count as u64).map(|i| i.wrapping_mul(0x9E37_79B9)).collect();

    println!("building 8-bit filter from {key_count} keys");
    let start = Instant::now();
    let filter8 = BinaryFuseFilter8::build(&mut keys).expect("8-bit filter should build");
    let build_time = start.elapsed();
    println!(
        "  built in {:?}, {} bytes ({:.2} bits/key)",
        build_time,
        filter8.size_in_bytes(),
        (filter8.fingerprint_bytes() * 8) as f64 / key_count as f64
    );

    println!("building 16-bit filter from {key_count} keys");
    let start = Instant::now();
    let filter16 = BinaryFuseFilter16::build(&mut keys).expect("16-bit filter should build");
    let build_time = start.elapsed();
    println!(
        "  built in {:?}, {} bytes ({:.2} bits/key)",
        build_time,
        filter16.size_in_bytes(),
        (filter16.fingerprint_bytes() * 8) as f64 / key_count as f64
    );

    let mut missing = 0_usize;
    for &key in &keys {
        if !filter8.contains(key) || !filter16.contains(key) {
            missing += 1;
        }
    }
    println!("false negatives: {missing} (must be 0)");

    let start = Instant::now();
    let mut hits = 0_usize;
    for &key in &keys {
        if filter16.contains(key) {
            hits += 1;
        }
    }
    let query_time = start.elapsed();
    println!(
        "queried {} keys in {:?} ({:.1} ns/query), {} hits",
        keys.len(),
        query_time,
        query_time.as_nanos() as f64 / keys.len() as f64,
        hits
    );
}
