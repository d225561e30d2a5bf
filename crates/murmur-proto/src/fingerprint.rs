// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The two per-document fingerprint functions and their 14-byte pairing.
//!
//! [`SpectralBloomFilter`] (8 bytes) and [`Ph2`] (6 bytes) both consume the
//! canonical leaf bytes of a document (see [`crate::canonical`]). Their
//! concatenation, [`DocumentFingerprint`], is what anti-entropy compares:
//! byte-equal pairs are taken as "replicas carry byte-identical documents
//! with high probability"; anything else forces a timestamp exchange.
//!
//! Both builders are write-once. After [`digest`](SpectralBloomFilter::digest)
//! the builder is sealed and further [`update`](SpectralBloomFilter::update)
//! calls fail with [`Sealed`] instead of silently mutating a value that has
//! already been observed.

use std::fmt;

/// Byte length of the spectral Bloom filter output.
pub const SBF_LEN: usize = 8;
/// Byte length of the prime-histogram hash output.
pub const PH2_LEN: usize = 6;
/// Byte length of the combined per-document fingerprint.
pub const FINGERPRINT_LEN: usize = SBF_LEN + PH2_LEN;

/// Mutation attempted on a builder that has already been digested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("fingerprint builder is sealed after digest")]
pub struct Sealed;

/// Divisor set of the spectral Bloom filter; counter `i` tracks divisibility
/// by the i-th prime, the 8th "joker" counter tracks bytes none divides.
const SBF_PRIMES: [u8; 7] = [2, 3, 5, 7, 11, 13, 17];

/// All counters and sums wrap at 255, not 256.
const MODULUS: u16 = 255;

/// Spectral Bloom filter: eight byte-counters mod 255.
///
/// For each input byte, every prime in [`SBF_PRIMES`] that divides the byte
/// bumps its counter; a byte no prime divides bumps the joker instead. Note
/// that zero bytes bump all seven prime counters at once.
#[derive(Debug, Default)]
pub struct SpectralBloomFilter {
    counters: [u8; SBF_LEN],
    sealed: bool,
}

impl SpectralBloomFilter {
    /// Fresh builder with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb more input bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Sealed`] once [`digest`](Self::digest) has been called.
    pub fn update(&mut self, bytes: &[u8]) -> Result<(), Sealed> {
        if self.sealed {
            return Err(Sealed);
        }
        self.absorb(bytes);
        Ok(())
    }

    fn absorb(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            let mut joker = true;
            for (i, &prime) in SBF_PRIMES.iter().enumerate() {
                if byte % prime == 0 {
                    self.counters[i] = (self.counters[i] + 1) % 255;
                    joker = false;
                }
            }
            if joker {
                self.counters[SBF_LEN - 1] = (self.counters[SBF_LEN - 1] + 1) % 255;
            }
        }
    }

    /// Seal the builder and return the eight counter bytes in order.
    pub fn digest(&mut self) -> [u8; SBF_LEN] {
        self.sealed = true;
        self.counters
    }
}

/// The first 54 primes, through 251: the "prime" block classifier of PH2.
const PH2_PRIMES: [u8; 54] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89,
    97, 101, 103, 107, 109, 113, 127, 131, 137, 139, 149, 151, 157, 163, 167, 173, 179, 181, 191,
    193, 197, 199, 211, 223, 227, 229, 233, 239, 241, 251,
];

/// One accumulation lane of [`Ph2`]: a wrapping sum with an overflow counter
/// and a population counter, all mod 255.
#[derive(Debug, Default, Clone, Copy)]
struct Lane {
    sum: u16,
    overflow: u16,
    count: u16,
}

impl Lane {
    fn absorb(&mut self, value: u16) {
        let headroom = MODULUS - self.sum;
        if value >= headroom {
            self.sum = value - headroom;
            self.overflow = (self.overflow + 1) % MODULUS;
        } else {
            self.sum += value;
        }
        self.count = (self.count + 1) % MODULUS;
    }
}

/// Prime-histogram hash: block-wise accumulation into a prime lane and a
/// regular lane.
///
/// Blocks are one byte wide; an input needs no padding at this width (the
/// zero-pad-to-boundary rule only matters for wider blocks). Each block value
/// lands in the prime lane when it appears in [`PH2_PRIMES`], otherwise in
/// the regular lane.
#[derive(Debug, Default)]
pub struct Ph2 {
    regular: Lane,
    primes: Lane,
    sealed: bool,
}

impl Ph2 {
    /// Fresh builder with both lanes zeroed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb more input bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Sealed`] once [`digest`](Self::digest) has been called.
    pub fn update(&mut self, bytes: &[u8]) -> Result<(), Sealed> {
        if self.sealed {
            return Err(Sealed);
        }
        self.absorb(bytes);
        Ok(())
    }

    fn absorb(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if PH2_PRIMES.binary_search(&byte).is_ok() {
                self.primes.absorb(u16::from(byte));
            } else {
                self.regular.absorb(u16::from(byte));
            }
        }
    }

    /// Seal the builder and return the six output bytes:
    /// `count_regular, count_primes, sum_regular, overflow_regular,
    /// sum_primes, overflow_primes`, each reduced mod 255.
    pub fn digest(&mut self) -> [u8; PH2_LEN] {
        self.sealed = true;
        [
            fold(self.regular.count),
            fold(self.primes.count),
            fold(self.regular.sum),
            fold(self.regular.overflow),
            fold(self.primes.sum),
            fold(self.primes.overflow),
        ]
    }
}

#[allow(clippy::cast_possible_truncation)] // value < 255 after the reduction
fn fold(value: u16) -> u8 {
    (value % MODULUS) as u8
}

/// The 14-byte `SBF || PH2` pair compared during anti-entropy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentFingerprint([u8; FINGERPRINT_LEN]);

impl DocumentFingerprint {
    /// Fingerprint a document's canonical leaf bytes.
    pub fn compute(canonical: &[u8]) -> Self {
        let mut sbf = SpectralBloomFilter::new();
        sbf.absorb(canonical);
        let mut ph2 = Ph2::new();
        ph2.absorb(canonical);

        let mut out = [0_u8; FINGERPRINT_LEN];
        out[..SBF_LEN].copy_from_slice(&sbf.digest());
        out[SBF_LEN..].copy_from_slice(&ph2.digest());
        Self(out)
    }

    /// Wrap raw wire bytes.
    pub fn from_bytes(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Self(bytes)
    }

    /// View the 14 wire bytes.
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }
}

impl fmt::Display for DocumentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl TryFrom<&[u8]> for DocumentFingerprint {
    type Error = usize;

    /// Fails with the observed length when the slice is not 14 bytes.
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        <[u8; FINGERPRINT_LEN]>::try_from(bytes)
            .map(Self)
            .map_err(|_| bytes.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn sbf_counts_divisors_per_byte() {
        let mut sbf = SpectralBloomFilter::new();
        // 6 is divisible by 2 and 3; 1 is a joker.
        sbf.update(&[6, 1]).unwrap();
        assert_eq!(sbf.digest(), [1, 1, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn sbf_zero_byte_bumps_every_prime_counter() {
        let mut sbf = SpectralBloomFilter::new();
        sbf.update(&[0]).unwrap();
        assert_eq!(sbf.digest(), [1, 1, 1, 1, 1, 1, 1, 0]);
    }

    #[test]
    fn sbf_counters_wrap_at_255() {
        let mut sbf = SpectralBloomFilter::new();
        // 255 jokers: the joker counter wraps back to zero.
        sbf.update(&[1_u8; 255]).unwrap();
        assert_eq!(sbf.digest(), [0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn sbf_seals_after_digest() {
        let mut sbf = SpectralBloomFilter::new();
        sbf.update(b"abc").unwrap();
        let first = sbf.digest();
        assert_eq!(sbf.update(b"more"), Err(Sealed));
        assert_eq!(sbf.digest(), first);
    }

    #[test]
    fn ph2_splits_prime_and_regular_lanes() {
        let mut ph2 = Ph2::new();
        // 7 is prime, 4 is regular.
        ph2.update(&[7, 4]).unwrap();
        assert_eq!(ph2.digest(), [1, 1, 4, 0, 7, 0]);
    }

    #[test]
    fn ph2_sum_wraps_with_overflow_counter() {
        let mut ph2 = Ph2::new();
        // Regular lane: 200 + 100 crosses 255, leaving 200 - (255 - 100) = 45.
        ph2.update(&[200, 100]).unwrap();
        assert_eq!(ph2.digest(), [2, 0, 45, 1, 0, 0]);
    }

    #[test]
    fn ph2_seals_after_digest() {
        let mut ph2 = Ph2::new();
        ph2.update(b"abc").unwrap();
        let first = ph2.digest();
        assert_eq!(ph2.update(b"more"), Err(Sealed));
        assert_eq!(ph2.digest(), first);
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = DocumentFingerprint::compute(b"ValeriiNikitin");
        let b = DocumentFingerprint::compute(b"ValeriiNikitin");
        let c = DocumentFingerprint::compute(b"MarynaNikitin");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn fingerprint_wire_round_trip() {
        let fp = DocumentFingerprint::compute(b"payload");
        let back = DocumentFingerprint::try_from(fp.as_bytes().as_slice()).unwrap();
        assert_eq!(back, fp);
        assert_eq!(DocumentFingerprint::try_from([0_u8; 3].as_slice()), Err(3));
    }
}
