use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable 128-bit identity for an asset key or an event.
///
/// Two independently seeded FNV-1a streams over the same byte sequence.
/// Collisions across the pair are negligible for cache keying.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint {
    pub hi: u64,
    pub lo: u64,
}

impl Fingerprint {
    /// Fingerprint an ordered sequence of string fields.
    pub fn of_fields<'a>(fields: impl IntoIterator<Item = &'a str>) -> Self {
        let mut a = Fnv1a64::new(0xcbf29ce484222325);
        let mut b = Fnv1a64::new(0x9ae16a3b2f90404f);
        for field in fields {
            write_str_pair(&mut a, &mut b, field);
        }
        Fingerprint {
            hi: a.finish(),
            lo: b.finish(),
        }
    }

    /// Short hex form used in upload names and run reports.
    pub fn short(&self) -> String {
        format!("{:016x}", self.hi)[..12].to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.hi, self.lo)
    }
}

fn write_str_pair(a: &mut Fnv1a64, b: &mut Fnv1a64, s: &str) {
    let len = (s.len() as u64).to_le_bytes();
    a.write_bytes(&len);
    b.write_bytes(&len);
    a.write_bytes(s.as_bytes());
    b.write_bytes(s.as_bytes());
}

#[derive(Clone, Copy)]
struct Fnv1a64(u64);

impl Fnv1a64 {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        let mut h = self.0;
        for &b in bytes {
            h ^= b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        self.0 = h;
    }

    fn finish(self) -> u64 {
        self.0
    }
}
