//! Byte-offset postings and per-file byte ranges.
//!
//! Indices answer queries with positions inside `def.dat`/`ref.dat` rather
//! than with records. Offsets are absolute in memory and delta-encoded on
//! disk; ranges describe one contiguous run of refs per file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Absolute starting offsets of records in a data file, in write order.
pub type ByteOffsets = Vec<i64>;

/// Delta-encodes offsets for persistence: each value after the first becomes
/// the difference from its predecessor.
pub fn delta_encode(ofs: &[i64]) -> Vec<i64> {
    let mut out = Vec::with_capacity(ofs.len());
    let mut prev = 0;
    for (i, &o) in ofs.iter().enumerate() {
        if i == 0 {
            out.push(o);
        } else {
            out.push(o - prev);
        }
        prev = o;
    }
    out
}

/// Inverse of [`delta_encode`].
pub fn delta_decode(deltas: &[i64]) -> Vec<i64> {
    let mut out = Vec::with_capacity(deltas.len());
    let mut acc = 0;
    for (i, &d) in deltas.iter().enumerate() {
        if i == 0 {
            acc = d;
        } else {
            acc += d;
        }
        out.push(acc);
    }
    out
}

/// The byte positions of one file's refs in `ref.dat`: the absolute start
/// offset of the first ref, followed by the encoded length of each ref.
/// Valid because refs are written grouped by file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRanges(pub Vec<i64>);

impl ByteRanges {
    pub fn start(&self) -> i64 {
        self.0.first().copied().unwrap_or(0)
    }

    /// Total encoded length of all refs in the range.
    pub fn byte_len(&self) -> i64 {
        self.0.iter().skip(1).sum()
    }

    /// Number of refs in the range.
    pub fn count(&self) -> usize {
        self.0.len().saturating_sub(1)
    }
}

/// Byte ranges for every file present in `ref.dat`.
pub type FileByteRanges = BTreeMap<String, ByteRanges>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_roundtrip() {
        let cases: Vec<Vec<i64>> = vec![
            vec![],
            vec![0],
            vec![0, 10, 25, 100],
            vec![7, 7, 9],
        ];
        for ofs in cases {
            let enc = delta_encode(&ofs);
            assert_eq!(delta_decode(&enc), ofs);
        }
    }

    #[test]
    fn test_delta_encoding_shape() {
        assert_eq!(delta_encode(&[0, 10, 25]), vec![0, 10, 15]);
        assert_eq!(delta_decode(&[0, 10, 15]), vec![0, 10, 25]);
    }

    #[test]
    fn test_byte_ranges() {
        let br = ByteRanges(vec![100, 10, 20, 5]);
        assert_eq!(br.start(), 100);
        assert_eq!(br.byte_len(), 35);
        assert_eq!(br.count(), 3);

        let empty = ByteRanges::default();
        assert_eq!(empty.start(), 0);
        assert_eq!(empty.byte_len(), 0);
        assert_eq!(empty.count(), 0);
    }
}
