use std::collections::HashSet;
use std::env;
use std::time::Instant;

use fuse_filter::{BinaryFuseFilter, FingerprintValue};

struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next(&mut self) -> u64 {
        let mut z = self.state.wrapping_add(0x9E3779B97F4A7C15);
        self.state = z;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }
}

fn random_keys(count: usize, generator: &mut SplitMix64) -> Vec<u64> {
    let mut keys = HashSet::with_capacity(count);
    while keys.len() < count {
        keys.insert(generator.next());
    }
    keys.into_iter().collect()
}

fn evaluate_variant<F: FingerprintValue>(
    name: &str,
    keys: &[u64],
    key_set: &HashSet<u64>,
    query_count: usize,
    generator: &mut SplitMix64,
) {
    let mut build_keys = keys.to_vec();
    let build_start = Instant::now();
    let filter =
        BinaryFuseFilter::<F>::build(&mut build_keys).expect("filter should build");
    let build_time = build_start.elapsed();

    for &key in keys {
        assert!(filter.contains(key), "false negative for {key}");
    }

    let mut false_positives = 0_usize;
    let mut queried = 0_usize;
    while queried < query_count {
        let probe = generator.next();
        if key_set.contains(&probe) {
            continue;
        }
        queried += 1;
        if filter.contains(probe) {
            false_positives += 1;
        }
    }

    println!(
        "{name}: build {:?}, {:.2} bits/key, fp rate {:.7} ({false_positives}/{query_count})",
        build_time,
        (filter.fingerprint_bytes() * 8) as f64 / keys.len() as f64,
        false_positives as f64 / query_count as f64
    );
}

fn main() {
    let mut key_count = 1_000_000_usize;
    let mut query_count = 10_000_000_usize;
    let mut seed = 0xD6E8_FEB8_6659_FD93_u64;

    let mut args = env::args().skip(1);
    while let Some(flag) = args.next() {
        fn parse<T: std::str::FromStr>(value: Option<String>, name: &str) -> T
        where
            T::Err: std::fmt::Display,
        {
            let value = value.unwrap_or_else(|| panic!("expected value after {name}"));
            value
                .parse::<T>()
                .unwrap_or_else(|err| panic!("invalid value for {name}: {err}"))
        }

        match flag.as_str() {
            "--keys" => key_count = parse(args.next(), "--keys"),
            "--queries" => query_count = parse(args.next(), "--queries"),
            "--seed" => seed = parse(args.next(), "--seed"),
            other => panic!("unknown flag: {other}"),
        }
    }

    let mut generator = SplitMix64::new(seed);
    let keys = random_keys(key_count, &mut generator);
    let key_set: HashSet<u64> = keys.iter().copied().collect();

    evaluate_variant::<u8>("fuse8 ", &keys, &key_set, query_count, &mut generator);
    evaluate_variant::<u16>("fuse16", &keys, &key_set, query_count, &mut generator);
    evaluate_variant::<u32>("fuse32", &keys, &key_set, query_count, &mut generator);
}
