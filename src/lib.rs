//! Binary fuse filter implementation for 64-bit keys.
//!
//! A binary fuse filter is a static approximate-membership structure: build it
//! once from a fixed set of key hashes with [`BinaryFuseFilter::populate`] and
//! query it with [`BinaryFuseFilter::contains`]. Queries never produce false
//! negatives; false positives occur with probability about `2^-w` for a
//! fingerprint width of `w` bits (8, 16, or 32).

use std::fmt;
use std::mem;
use std::ops::{BitXor, BitXorAssign};

const ARITY: u32 = 3;
const MAX_ITERATIONS: usize = 100;
const MAX_SEGMENT_LENGTH: u32 = 262_144;
/// Default starting state for the seed stream, taken from the reference
/// construction so default builds are reproducible.
const RNG_STATE_START: u64 = 0x726B_2B9D_438B_9D4D;

/// Derived array geometry: three overlapping power-of-two segments per key.
#[derive(Clone, Copy, Debug)]
struct Layout {
    segment_length: usize,
    segment_length_mask: usize,
    segment_count: usize,
    segment_count_length: usize,
    array_length: usize,
}

/// Error returned when construction of the filter fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    /// A fingerprint or scratch buffer could not be allocated.
    AllocationFailed(&'static str),
    /// Peeling failed for every seed within the retry bound; the filter is
    /// left poisoned and answers `true` for every query.
    ConstructionExhausted(&'static str),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::AllocationFailed(what) => {
                write!(f, "allocation failed: {what}")
            }
            BuildError::ConstructionExhausted(what) => {
                write!(f, "construction exhausted retries: {what}")
            }
        }
    }
}

impl std::error::Error for BuildError {}

/// Fixed-width unsigned fingerprint stored in the filter array.
pub trait FingerprintValue:
    Copy
    + Default
    + PartialEq
    + Eq
    + BitXor<Output = Self>
    + BitXorAssign
    + fmt::Debug
    + Send
    + Sync
    + 'static
{
    /// All-bits-set sentinel written to every slot of a failed build.
    const FULL: Self;

    /// Extracts the fingerprint from a mixed 64-bit hash.
    fn from_hash(hash: u64) -> Self;
}

impl FingerprintValue for u8 {
    const FULL: Self = u8::MAX;

    #[inline]
    fn from_hash(hash: u64) -> Self {
        fingerprint(hash) as u8
    }
}

impl FingerprintValue for u16 {
    const FULL: Self = u16::MAX;

    #[inline]
    fn from_hash(hash: u64) -> Self {
        fingerprint(hash) as u16
    }
}

impl FingerprintValue for u32 {
    const FULL: Self = u32::MAX;

    #[inline]
    fn from_hash(hash: u64) -> Self {
        fingerprint(hash) as u32
    }
}

/// A static binary fuse filter for 64-bit keys parameterized over fingerprint
/// width.
///
/// The filter is created empty with [`BinaryFuseFilter::new`], brought into a
/// queryable state by a single call to [`BinaryFuseFilter::populate`], and is
/// read-only thereafter. Once populated, concurrent unsynchronized
/// [`BinaryFuseFilter::contains`] calls are safe.
pub struct BinaryFuseFilter<F = u8>
where
    F: FingerprintValue,
{
    seed: u64,
    layout: Layout,
    fingerprints: Vec<F>,
    poisoned: bool,
}

/// Binary fuse filter using 8-bit fingerprints (~0.39% false-positive rate).
pub type BinaryFuseFilter8 = BinaryFuseFilter<u8>;
/// Binary fuse filter using 16-bit fingerprints (~0.0015% false-positive rate).
pub type BinaryFuseFilter16 = BinaryFuseFilter<u16>;
/// Binary fuse filter using 32-bit fingerprints.
pub type BinaryFuseFilter32 = BinaryFuseFilter<u32>;

impl<F> BinaryFuseFilter<F>
where
    F: FingerprintValue,
{
    /// Allocates an empty filter sized for `expected_size` keys.
    ///
    /// The fingerprint array is allocated fallibly; an allocation failure is
    /// reported as [`BuildError::AllocationFailed`] instead of aborting.
    pub fn new(expected_size: usize) -> Result<Self, BuildError> {
        if expected_size > u32::MAX as usize {
            return Err(BuildError::AllocationFailed(
                "key count exceeds the filter's 32-bit address space",
            ));
        }
        let layout = calculate_layout(expected_size as u32);
        let fingerprints = try_zeroed_vec(layout.array_length, "fingerprint array")?;
        Ok(Self {
            seed: 0,
            layout,
            fingerprints,
            poisoned: false,
        })
    }

    /// Allocates a filter for `keys.len()` keys and populates it.
    ///
    /// See [`BinaryFuseFilter::populate`] for the in-place mutation contract.
    pub fn build(keys: &mut [u64]) -> Result<Self, BuildError> {
        let mut filter = Self::new(keys.len())?;
        filter.populate(keys)?;
        Ok(filter)
    }

    /// Builds the filter from the given 64-bit key hashes.
    ///
    /// The slice **may be reordered and deduplicated in place**: when exact
    /// duplicate hash values are detected, construction sorts the slice and
    /// retries with the unique prefix. This side effect is part of the
    /// contract, mirroring the reference implementation; pass a copy if the
    /// original order matters.
    ///
    /// On success the filter is queryable and every key in `keys` is
    /// contained. On [`BuildError::ConstructionExhausted`] the fingerprint
    /// array is poisoned (every slot all-ones) and `contains` answers `true`
    /// for every key rather than returning silently wrong answers.
    pub fn populate(&mut self, keys: &mut [u64]) -> Result<(), BuildError> {
        self.populate_with_seed(keys, RNG_STATE_START)
    }

    /// Like [`BinaryFuseFilter::populate`], starting the seed stream from
    /// `rng_state`.
    ///
    /// Two populates from the same key set and the same `rng_state` produce
    /// bit-identical fingerprint arrays.
    pub fn populate_with_seed(
        &mut self,
        keys: &mut [u64],
        rng_state: u64,
    ) -> Result<(), BuildError> {
        self.populate_attempts(keys, rng_state, MAX_ITERATIONS)
    }

    fn populate_attempts(
        &mut self,
        keys: &mut [u64],
        rng_state: u64,
        max_iterations: usize,
    ) -> Result<(), BuildError> {
        if keys.len() > u32::MAX as usize {
            return Err(BuildError::AllocationFailed(
                "key count exceeds the filter's 32-bit address space",
            ));
        }

        let capacity = self.layout.array_length;
        let mut size = keys.len();

        let mut reverse_order: Vec<u64> = try_zeroed_vec(size + 1, "reverse order buffer")?;
        let mut reverse_h: Vec<u8> = try_zeroed_vec(size, "peel index buffer")?;
        let mut alone: Vec<u32> = try_zeroed_vec(capacity, "peel worklist")?;
        let mut t2count: Vec<u8> = try_zeroed_vec(capacity, "slot count table")?;
        let mut t2hash: Vec<u64> = try_zeroed_vec(capacity, "slot hash table")?;

        let mut block_bits: u32 = 1;
        while (1_u32 << block_bits) < self.layout.segment_count as u32 {
            block_bits += 1;
        }
        let block = 1_u32 << block_bits;
        let mut start_pos: Vec<u32> = try_zeroed_vec(block as usize, "bucket cursors")?;

        let mut rng_counter = rng_state;
        let mut seed = rng_splitmix64(&mut rng_counter);
        let mut h012 = [0usize; 5];
        let mut stack_size = 0usize;
        let mut success = false;

        for _ in 0..max_iterations {
            reverse_order.fill(0);
            reverse_order[size] = 1;
            t2count.fill(0);
            t2hash.fill(0);

            for i in 0..block {
                // i * size would overflow as a 32-bit product for large sets.
                start_pos[i as usize] = (((i as u64) * (size as u64)) >> block_bits) as u32;
            }

            let mask_block = (block - 1) as u64;
            for &key in keys[..size].iter() {
                let hash = mix_split(key, seed);
                let mut segment_index = hash >> (64 - block_bits);
                while reverse_order[start_pos[segment_index as usize] as usize] != 0 {
                    segment_index = (segment_index + 1) & mask_block;
                }
                reverse_order[start_pos[segment_index as usize] as usize] = hash;
                start_pos[segment_index as usize] += 1;
            }

            let mut duplicates = 0usize;
            let mut error = false;
            for &hash in reverse_order.iter().take(size) {
                let h0 = fuse_hash(0, hash, &self.layout);
                t2count[h0] = t2count[h0].wrapping_add(4);
                t2hash[h0] ^= hash;

                let h1 = fuse_hash(1, hash, &self.layout);
                t2count[h1] = t2count[h1].wrapping_add(4);
                t2count[h1] ^= 1;
                t2hash[h1] ^= hash;

                let h2 = fuse_hash(2, hash, &self.layout);
                t2count[h2] = t2count[h2].wrapping_add(4);
                t2count[h2] ^= 2;
                t2hash[h2] ^= hash;

                // A prior key with an identical hash triple zeroes all three
                // accumulators; undo the insertion and tolerate the duplicate.
                if (t2hash[h0] & t2hash[h1] & t2hash[h2]) == 0
                    && (((t2hash[h0] == 0) && (t2count[h0] == 8))
                        || ((t2hash[h1] == 0) && (t2count[h1] == 8))
                        || ((t2hash[h2] == 0) && (t2count[h2] == 8)))
                {
                    duplicates += 1;
                    t2count[h0] = t2count[h0].wrapping_sub(4);
                    t2hash[h0] ^= hash;
                    t2count[h1] = t2count[h1].wrapping_sub(4);
                    t2count[h1] ^= 1;
                    t2hash[h1] ^= hash;
                    t2count[h2] = t2count[h2].wrapping_sub(4);
                    t2count[h2] ^= 2;
                    t2hash[h2] ^= hash;
                }

                if t2count[h0] < 4 || t2count[h1] < 4 || t2count[h2] < 4 {
                    error = true;
                }
            }

            if error {
                // Routine outcome of a bad seed, not a caller-visible failure.
                seed = rng_splitmix64(&mut rng_counter);
                continue;
            }

            let mut q_size = 0usize;
            for (i, &count) in t2count.iter().enumerate().take(capacity) {
                if (count >> 2) == 1 {
                    alone[q_size] = i as u32;
                    q_size += 1;
                }
            }

            stack_size = 0;
            while q_size > 0 {
                q_size -= 1;
                let index = alone[q_size] as usize;
                if (t2count[index] >> 2) == 1 {
                    let hash = t2hash[index];

                    h012[0] = fuse_hash(0, hash, &self.layout);
                    h012[1] = fuse_hash(1, hash, &self.layout);
                    h012[2] = fuse_hash(2, hash, &self.layout);
                    h012[3] = h012[0];
                    h012[4] = h012[1];

                    let found = (t2count[index] & 3) as usize;
                    reverse_h[stack_size] = found as u8;
                    reverse_order[stack_size] = hash;
                    stack_size += 1;

                    let other_index1 = h012[found + 1];
                    if (t2count[other_index1] >> 2) == 2 {
                        alone[q_size] = other_index1 as u32;
                        q_size += 1;
                    }
                    t2count[other_index1] = t2count[other_index1].wrapping_sub(4);
                    t2count[other_index1] ^= mod3((found + 1) as u8);
                    t2hash[other_index1] ^= hash;

                    let other_index2 = h012[found + 2];
                    if (t2count[other_index2] >> 2) == 2 {
                        alone[q_size] = other_index2 as u32;
                        q_size += 1;
                    }
                    t2count[other_index2] = t2count[other_index2].wrapping_sub(4);
                    t2count[other_index2] ^= mod3((found + 2) as u8);
                    t2hash[other_index2] ^= hash;
                }
            }

            if stack_size + duplicates == size {
                // The hypergraph fully peeled for this seed.
                size = stack_size;
                success = true;
                break;
            }

            if duplicates > 0 {
                size = sort_and_remove_dup(&mut keys[..size]);
            }
            seed = rng_splitmix64(&mut rng_counter);
        }

        if !success {
            self.fingerprints.fill(F::FULL);
            self.poisoned = true;
            return Err(BuildError::ConstructionExhausted(
                "peeling failed for every seed within the retry bound",
            ));
        }

        self.fingerprints.fill(F::default());
        for i in (0..size).rev() {
            // The two other slots of the key peeled at step i were finalized
            // by later stack entries or never touched by a peeled key.
            let hash = reverse_order[i];
            let found = reverse_h[i] as usize;
            h012[0] = fuse_hash(0, hash, &self.layout);
            h012[1] = fuse_hash(1, hash, &self.layout);
            h012[2] = fuse_hash(2, hash, &self.layout);
            h012[3] = h012[0];
            h012[4] = h012[1];
            let value = F::from_hash(hash)
                ^ self.fingerprints[h012[found + 1]]
                ^ self.fingerprints[h012[found + 2]];
            self.fingerprints[h012[found]] = value;
        }

        self.seed = seed;
        self.poisoned = false;
        Ok(())
    }

    /// Returns true when `key` is (probably) in the set.
    /// Returns false when `key` is definitely not in the set.
    ///
    /// A filter whose construction failed always returns true.
    pub fn contains(&self, key: u64) -> bool {
        if self.poisoned {
            return true;
        }
        let hash = mix_split(key, self.seed);
        let [h0, h1, h2] = hash_batch(hash, &self.layout);
        let f = F::from_hash(hash);
        f == (self.fingerprints[h0] ^ self.fingerprints[h1] ^ self.fingerprints[h2])
    }

    /// Returns the resident footprint: fingerprint array plus fixed header.
    pub fn size_in_bytes(&self) -> usize {
        self.fingerprints.len() * mem::size_of::<F>() + mem::size_of::<Self>()
    }

    /// Returns the number of bytes used to store the fingerprints.
    pub fn fingerprint_bytes(&self) -> usize {
        self.fingerprints.len() * mem::size_of::<F>()
    }
}

fn try_zeroed_vec<T: Copy + Default>(len: usize, what: &'static str) -> Result<Vec<T>, BuildError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| BuildError::AllocationFailed(what))?;
    buf.resize(len, T::default());
    Ok(buf)
}

/// Sorts the slice and compacts unique values to its front, returning the
/// unique count.
fn sort_and_remove_dup(keys: &mut [u64]) -> usize {
    if keys.is_empty() {
        return 0;
    }
    keys.sort_unstable();
    let mut j = 0;
    for i in 1..keys.len() {
        if keys[i] != keys[j] {
            j += 1;
            keys[j] = keys[i];
        }
    }
    j + 1
}

fn calculate_layout(size: u32) -> Layout {
    let mut segment_length = if size == 0 {
        4
    } else {
        calculate_segment_length(size)
    };
    if segment_length > MAX_SEGMENT_LENGTH {
        segment_length = MAX_SEGMENT_LENGTH;
    }
    let segment_length_mask = segment_length - 1;

    let size_factor = if size <= 1 {
        0.0
    } else {
        calculate_size_factor(size)
    };
    let capacity = if size <= 1 {
        0
    } else {
        ((size as f64) * size_factor).round() as u32
    };

    // Two-pass fixpoint: the initial estimate can undershoot after rounding,
    // so segment_count and array_length are recomputed once. The wrapping
    // arithmetic lands the degenerate size <= 1 path on the minimum layout.
    let init_segment_count =
        ((capacity + segment_length - 1) / segment_length).wrapping_sub(ARITY - 1);
    let mut array_length = init_segment_count
        .wrapping_add(ARITY - 1)
        .wrapping_mul(segment_length);
    let mut segment_count = (array_length + segment_length - 1) / segment_length;
    if segment_count <= ARITY - 1 {
        segment_count = 1;
    } else {
        segment_count -= ARITY - 1;
    }
    array_length = (segment_count + ARITY - 1) * segment_length;
    let segment_count_length = segment_count * segment_length;

    Layout {
        segment_length: segment_length as usize,
        segment_length_mask: segment_length_mask as usize,
        segment_count: segment_count as usize,
        segment_count_length: segment_count_length as usize,
        array_length: array_length as usize,
    }
}

// These parameters are very sensitive; replacing floor by round substantially
// affects the construction time.
#[inline]
fn calculate_segment_length(size: u32) -> u32 {
    1_u32 << (((size as f64).ln() / 3.33_f64.ln() + 2.25).floor() as u32)
}

#[inline]
fn calculate_size_factor(size: u32) -> f64 {
    1.125_f64.max(0.875 + 0.250 * 1_000_000.0_f64.ln() / (size as f64).ln())
}

#[inline]
fn murmur64(mut h: u64) -> u64 {
    h ^= h >> 33;
    h = h.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    h ^= h >> 33;
    h = h.wrapping_mul(0xC4CE_B9FE_1A85_EC53);
    h ^= h >> 33;
    h
}

#[inline]
fn mix_split(key: u64, seed: u64) -> u64 {
    murmur64(key.wrapping_add(seed))
}

#[inline]
fn rng_splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Upper 64 bits of the full 128-bit product, used to map a hash into
/// `[0, segment_count_length)` without a modulo.
#[inline]
fn mulhi(a: u64, b: u64) -> u64 {
    (((a as u128) * (b as u128)) >> 64) as u64
}

#[inline]
fn mod3(x: u8) -> u8 {
    if x > 2 {
        x - 3
    } else {
        x
    }
}

#[inline]
fn fingerprint(hash: u64) -> u64 {
    hash ^ (hash >> 32)
}

/// Position `index` in `{0, 1, 2}` for `hash`: base segment from the high
/// half of the product, staggered 18-bit windows of the low 36 bits XORed in.
#[inline]
fn fuse_hash(index: u32, hash: u64, layout: &Layout) -> usize {
    let mut h = mulhi(hash, layout.segment_count_length as u64);
    h += (index as u64) * (layout.segment_length as u64);
    let hh = hash & ((1_u64 << 36) - 1);
    h ^= (hh >> (36 - 18 * index)) & (layout.segment_length_mask as u64);
    h as usize
}

#[inline]
fn hash_batch(hash: u64, layout: &Layout) -> [usize; 3] {
    let segment_length = layout.segment_length as u64;
    let mask = layout.segment_length_mask as u64;

    let h0 = mulhi(hash, layout.segment_count_length as u64);
    let mut h1 = h0 + segment_length;
    let mut h2 = h1 + segment_length;
    h1 ^= (hash >> 18) & mask;
    h2 ^= hash & mask;

    [h0 as usize, h1 as usize, h2 as usize]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    fn distinct_random_keys(count: usize, rng: &mut SmallRng) -> Vec<u64> {
        let mut seen = HashSet::with_capacity(count);
        while seen.len() < count {
            seen.insert(rng.gen::<u64>());
        }
        seen.into_iter().collect()
    }

    #[test]
    fn empty_set() {
        let mut filter = BinaryFuseFilter8::new(0).expect("allocate");
        filter.populate(&mut []).expect("empty populate succeeds");
        let hits = (0..100_u64).filter(|&probe| filter.contains(probe)).count();
        assert!(hits < 10, "empty filter matched {} of 100 probes", hits);
    }

    #[test]
    fn single_key() {
        let mut keys = [42_u64];
        let filter = BinaryFuseFilter8::build(&mut keys).expect("single-key build");
        assert!(filter.contains(42));
    }

    #[test]
    fn no_false_negatives_8() {
        let mut rng = SmallRng::seed_from_u64(0xDEC0_DE01);
        let mut keys = distinct_random_keys(10_000, &mut rng);
        let filter = BinaryFuseFilter8::build(&mut keys).expect("filter should build");
        for &k in &keys {
            assert!(filter.contains(k), "missing key: {}", k);
        }
    }

    #[test]
    fn no_false_negatives_32() {
        let mut rng = SmallRng::seed_from_u64(0xDEC0_DE02);
        let mut keys = distinct_random_keys(10_000, &mut rng);
        let filter = BinaryFuseFilter32::build(&mut keys).expect("filter should build");
        for &k in &keys {
            assert!(filter.contains(k), "missing key: {}", k);
        }
    }

    #[test]
    fn large_set_false_positive_rate_16() {
        let mut rng = SmallRng::seed_from_u64(0xDEC0_DE03);
        let mut keys = distinct_random_keys(100_000, &mut rng);
        let filter = BinaryFuseFilter16::build(&mut keys).expect("filter should build");

        let key_set: HashSet<u64> = keys.iter().copied().collect();
        for &k in &keys {
            assert!(filter.contains(k), "missing key: {}", k);
        }

        let probes = 1_000_000;
        let mut false_positives = 0usize;
        let mut probed = 0usize;
        while probed < probes {
            let q = rng.gen::<u64>();
            if key_set.contains(&q) {
                continue;
            }
            probed += 1;
            if filter.contains(q) {
                false_positives += 1;
            }
        }
        // Expected ~15.3 for a 16-bit fingerprint; 100 is far outside any
        // plausible statistical fluctuation.
        assert!(
            false_positives < 100,
            "false-positive rate too high: {} in {}",
            false_positives,
            probes
        );
    }

    #[test]
    fn false_positive_rate_8_is_bounded() {
        let mut rng = SmallRng::seed_from_u64(0xDEC0_DE04);
        let mut keys = distinct_random_keys(20_000, &mut rng);
        let filter = BinaryFuseFilter8::build(&mut keys).expect("filter should build");
        let key_set: HashSet<u64> = keys.iter().copied().collect();

        let probes = 200_000;
        let mut false_positives = 0usize;
        let mut probed = 0usize;
        while probed < probes {
            let q = rng.gen::<u64>();
            if key_set.contains(&q) {
                continue;
            }
            probed += 1;
            if filter.contains(q) {
                false_positives += 1;
            }
        }
        // Expected rate 1/256 (~781 of 200k).
        assert!(
            false_positives < 1_600,
            "false-positive rate too high: {} in {}",
            false_positives,
            probes
        );
    }

    #[test]
    fn duplicate_keys_are_tolerated() {
        let mut rng = SmallRng::seed_from_u64(0xDEC0_DE05);
        let mut keys = distinct_random_keys(1_000, &mut rng);
        keys.push(keys[0]);
        keys.push(keys[1]);
        keys.push(keys[1]);
        let filter = BinaryFuseFilter16::build(&mut keys).expect("duplicates must not fail");
        let unique: HashSet<u64> = keys.iter().copied().collect();
        for &k in &unique {
            assert!(filter.contains(k), "missing key: {}", k);
        }
    }

    #[test]
    fn deterministic_given_seed_state() {
        let mut rng = SmallRng::seed_from_u64(0xDEC0_DE06);
        let keys = distinct_random_keys(5_000, &mut rng);

        let mut keys_a = keys.clone();
        let mut filter_a = BinaryFuseFilter16::new(keys_a.len()).expect("allocate");
        filter_a
            .populate_with_seed(&mut keys_a, 0x1234_5678)
            .expect("build a");

        let mut keys_b = keys.clone();
        let mut filter_b = BinaryFuseFilter16::new(keys_b.len()).expect("allocate");
        filter_b
            .populate_with_seed(&mut keys_b, 0x1234_5678)
            .expect("build b");

        assert_eq!(filter_a.seed, filter_b.seed);
        assert_eq!(filter_a.fingerprints, filter_b.fingerprints);
    }

    #[test]
    fn repeated_queries_are_idempotent() {
        let mut keys: Vec<u64> = (0..1_000).map(|i| i * 7_919).collect();
        let filter = BinaryFuseFilter8::build(&mut keys).expect("filter should build");
        for probe in [0_u64, 1, 7_919, 999 * 7_919, u64::MAX] {
            let first = filter.contains(probe);
            for _ in 0..10 {
                assert_eq!(filter.contains(probe), first);
            }
        }
    }

    #[test]
    fn geometry_invariants() {
        for n in [2_u32, 3, 10, 100, 1_000, 12_345, 100_000, 1_000_000, 10_000_000] {
            let layout = calculate_layout(n);
            assert!(
                layout.array_length >= n as usize,
                "array_length {} below key count {}",
                layout.array_length,
                n
            );
            assert!(layout.segment_length.is_power_of_two());
            assert!(layout.segment_length <= MAX_SEGMENT_LENGTH as usize);
            assert_eq!(
                layout.array_length,
                (layout.segment_count + 2) * layout.segment_length
            );
            assert_eq!(
                layout.segment_count_length,
                layout.segment_count * layout.segment_length
            );
        }
    }

    #[test]
    fn exhausted_retries_poison_the_filter() {
        let mut keys: Vec<u64> = (0..1_000).map(|i| i * 13_791).collect();
        let mut filter = BinaryFuseFilter16::new(keys.len()).expect("allocate");
        let err = filter
            .populate_attempts(&mut keys, RNG_STATE_START, 0)
            .expect_err("zero attempts must exhaust");
        assert!(matches!(err, BuildError::ConstructionExhausted(_)));
        assert!(filter.fingerprints.iter().all(|&f| f == u16::MAX));
        for probe in [0_u64, 1, 42, u64::MAX] {
            assert!(filter.contains(probe), "poisoned filter must answer true");
        }
    }

    #[test]
    fn size_accounting() {
        let mut keys: Vec<u64> = (0..10_000).map(|i| i * 104_729).collect();
        let filter = BinaryFuseFilter16::build(&mut keys).expect("filter should build");
        assert_eq!(filter.fingerprint_bytes(), filter.fingerprints.len() * 2);
        assert_eq!(
            filter.size_in_bytes(),
            filter.fingerprint_bytes() + mem::size_of::<BinaryFuseFilter16>()
        );
        // Around 18 bits per key for a 16-bit binary fuse filter.
        let bits_per_key = (filter.fingerprint_bytes() * 8) as f64 / keys.len() as f64;
        assert!(bits_per_key < 22.0, "bits/key too high: {}", bits_per_key);
    }

    #[test]
    fn sort_and_remove_dup_compacts_unique_prefix() {
        let mut keys = [3_u64, 1, 2, 3, 1];
        let unique = sort_and_remove_dup(&mut keys);
        assert_eq!(unique, 3);
        assert_eq!(&keys[..unique], &[1, 2, 3]);
        assert_eq!(sort_and_remove_dup(&mut []), 0);
    }

    #[test]
    fn hash_batch_matches_fuse_hash() {
        let layout = calculate_layout(100_000);
        let mut state = 7_u64;
        for _ in 0..1_000 {
            let hash = rng_splitmix64(&mut state);
            let batch = hash_batch(hash, &layout);
            for index in 0..3_u32 {
                assert_eq!(batch[index as usize], fuse_hash(index, hash, &layout));
                assert!(batch[index as usize] < layout.array_length);
            }
        }
    }
}
