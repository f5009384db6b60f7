// LZ diff encoding
// Describes a target contig as matches against a reference contig

use crate::edit_script::EditOp;
use agcx_common::{murmur64, Contig, N_CODE};
use ahash::AHashMap;

const MIN_NRUN_LEN: usize = 4;
const MAX_NO_TRIES: usize = 64;
const HASHING_STEP: usize = 4;

/// Greedy hash-indexed LZ encoder bound to one reference contig
///
/// The reference is sampled every `HASHING_STEP` positions with k-mers of
/// `min_match_len - HASHING_STEP + 1` bases, so every match of at least
/// `min_match_len` bases contains one sampled k-mer.
pub struct LZDiff {
    reference: Contig,
    ht: AHashMap<u64, Vec<u32>>,
    min_match_len: usize,
    key_len: usize,
    key_mask: u64,
}

impl LZDiff {
    /// Build the index over `reference`
    pub fn new(reference: Contig, min_match_len: u32) -> Self {
        let min_match_len = min_match_len as usize;
        let key_len = (min_match_len + 1).saturating_sub(HASHING_STEP).max(1);
        let key_mask = if key_len >= 32 {
            !0u64
        } else {
            (1u64 << (2 * key_len)) - 1
        };

        let mut lz = LZDiff {
            reference,
            ht: AHashMap::new(),
            min_match_len,
            key_len,
            key_mask,
        };
        lz.build_index();
        lz
    }

    pub fn reference(&self) -> &[u8] {
        &self.reference
    }

    fn build_index(&mut self) {
        let mut i = 0;
        while i + self.key_len <= self.reference.len() {
            if let Some(code) = self.get_code(&self.reference[i..]) {
                self.ht
                    .entry(murmur64(code))
                    .or_default()
                    .push((i / HASHING_STEP) as u32);
            }
            i += HASHING_STEP;
        }
        log::trace!(
            "indexed {} reference bases into {} keys",
            self.reference.len(),
            self.ht.len()
        );
    }

    /// 2-bit code of the k-mer at the start of `seq`, `None` if it holds
    /// anything but ACGT
    fn get_code(&self, seq: &[u8]) -> Option<u64> {
        seq[..self.key_len].iter().try_fold(0u64, |code, &b| {
            if b > 3 {
                None
            } else {
                Some((code << 2) | b as u64)
            }
        })
    }

    /// Roll the previous k-mer code forward by one base
    fn get_code_skip1(&self, prev_code: u64, seq: &[u8]) -> Option<u64> {
        let last = seq[self.key_len - 1];
        if last > 3 {
            return None;
        }
        Some(((prev_code << 2) & self.key_mask) | last as u64)
    }

    fn get_nrun_len(seq: &[u8]) -> usize {
        seq.iter().take_while(|&&b| b == N_CODE).count()
    }

    fn matching_length(s1: &[u8], s2: &[u8]) -> usize {
        s1.iter().zip(s2).take_while(|(a, b)| a == b).count()
    }

    /// Returns (ref_pos, len_bck, len_fwd) of the longest candidate
    fn find_best_match(
        &self,
        hash: u64,
        target: &[u8],
        text_pos: usize,
        no_prev_literals: usize,
    ) -> Option<(usize, usize, usize)> {
        let positions = self.ht.get(&hash)?;

        let mut best = None;
        let mut min_to_update = self.min_match_len.saturating_sub(1);

        for &pos in positions.iter().take(MAX_NO_TRIES) {
            let h_pos = pos as usize * HASHING_STEP;
            let f_len = Self::matching_length(&target[text_pos..], &self.reference[h_pos..]);
            if f_len < self.key_len {
                continue;
            }

            let max_back = no_prev_literals.min(h_pos).min(text_pos);
            let b_len = (1..=max_back)
                .take_while(|&k| target[text_pos - k] == self.reference[h_pos - k])
                .count();

            if b_len + f_len > min_to_update {
                best = Some((h_pos, b_len, f_len));
                min_to_update = b_len + f_len;
            }
        }

        best
    }

    /// Encode `target` as an edit script against the reference
    pub fn encode(&self, target: &[u8]) -> Vec<EditOp> {
        let mut ops = Vec::new();

        if target.is_empty() {
            return ops;
        }
        if target == self.reference.as_slice() {
            ops.push(EditOp::Match {
                ref_pos: 0,
                len: target.len() as u64,
            });
            return ops;
        }

        let text_size = target.len();
        let mut literals: Vec<u8> = Vec::new();
        let mut i = 0;
        let mut x_prev: Option<u64> = None;

        while i + self.key_len <= text_size {
            let x = match x_prev {
                Some(prev) if !literals.is_empty() => self.get_code_skip1(prev, &target[i..]),
                _ => self.get_code(&target[i..]),
            };
            x_prev = x;

            let code = match x {
                Some(code) => code,
                None => {
                    let nrun_len = Self::get_nrun_len(&target[i..]);
                    if nrun_len >= MIN_NRUN_LEN {
                        flush_literals(&mut ops, &mut literals);
                        ops.push(EditOp::NRun(nrun_len as u64));
                        i += nrun_len;
                    } else {
                        literals.push(target[i]);
                        i += 1;
                    }
                    continue;
                }
            };

            match self.find_best_match(murmur64(code), target, i, literals.len()) {
                Some((h_pos, len_bck, len_fwd)) => {
                    literals.truncate(literals.len() - len_bck);
                    flush_literals(&mut ops, &mut literals);
                    ops.push(EditOp::Match {
                        ref_pos: (h_pos - len_bck) as u64,
                        len: (len_bck + len_fwd) as u64,
                    });
                    i += len_fwd;
                    x_prev = None;
                }
                None => {
                    literals.push(target[i]);
                    i += 1;
                }
            }
        }

        // Tail shorter than one k-mer
        while i < text_size {
            let nrun_len = Self::get_nrun_len(&target[i..]);
            if nrun_len >= MIN_NRUN_LEN {
                flush_literals(&mut ops, &mut literals);
                ops.push(EditOp::NRun(nrun_len as u64));
                i += nrun_len;
            } else {
                literals.push(target[i]);
                i += 1;
            }
        }
        flush_literals(&mut ops, &mut literals);

        ops
    }
}

fn flush_literals(ops: &mut Vec<EditOp>, literals: &mut Vec<u8>) {
    if !literals.is_empty() {
        ops.push(EditOp::Literal(std::mem::take(literals)));
    }
}

/// Number of target bases an edit script stores verbatim
pub fn literal_bases(ops: &[EditOp]) -> u64 {
    ops.iter()
        .map(|op| match op {
            EditOp::Literal(codes) => codes.len() as u64,
            _ => 0,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit_script::{reconstruct, target_len};

    /// Deterministic pseudo-random ACGT sequence
    fn random_contig(len: usize, seed: u64) -> Contig {
        let mut x = seed | 1;
        (0..len)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 7;
                x ^= x << 17;
                (x >> 33) as u8 & 3
            })
            .collect()
    }

    #[test]
    fn test_identical_is_single_match() {
        let reference = random_contig(500, 7);
        let lz = LZDiff::new(reference.clone(), 20);
        let ops = lz.encode(&reference);
        assert_eq!(ops, vec![EditOp::Match { ref_pos: 0, len: 500 }]);
    }

    #[test]
    fn test_short_unrelated_target_is_literal() {
        let lz = LZDiff::new(vec![0, 0, 0, 1, 1, 1], 18);
        let target = vec![0, 1, 2, 3];
        let ops = lz.encode(&target);
        assert_eq!(ops, vec![EditOp::Literal(target.clone())]);
        assert_eq!(reconstruct(lz.reference(), &ops).unwrap(), target);
    }

    #[test]
    fn test_snps_and_indels() {
        let reference = random_contig(5000, 42);
        let mut target = reference.clone();
        target[1000] = (target[1000] + 1) % 4;
        target[2500] = (target[2500] + 2) % 4;
        target.drain(3000..3050);
        target.splice(4000..4000, [0, 1, 2, 3, 3, 2, 1, 0]);

        let lz = LZDiff::new(reference.clone(), 20);
        let ops = lz.encode(&target);

        assert_eq!(target_len(&ops), target.len() as u64);
        assert_eq!(reconstruct(&reference, &ops).unwrap(), target);
        assert!(literal_bases(&ops) < 100);
    }

    #[test]
    fn test_n_runs_collapse() {
        let reference = random_contig(2000, 3);
        let mut target = reference[..800].to_vec();
        target.extend([N_CODE; 300]);
        target.extend_from_slice(&reference[800..]);
        target.extend([N_CODE; 5]);

        let lz = LZDiff::new(reference.clone(), 20);
        let ops = lz.encode(&target);

        assert!(ops.contains(&EditOp::NRun(300)));
        assert_eq!(ops.last(), Some(&EditOp::NRun(5)));
        assert_eq!(reconstruct(&reference, &ops).unwrap(), target);
    }

    #[test]
    fn test_unrelated_target_is_mostly_literal() {
        let reference = random_contig(3000, 11);
        let target = random_contig(3000, 99);
        let lz = LZDiff::new(reference.clone(), 20);
        let ops = lz.encode(&target);
        assert!(literal_bases(&ops) * 2 > target.len() as u64);
        assert_eq!(reconstruct(&reference, &ops).unwrap(), target);
    }

    #[test]
    fn test_empty_inputs() {
        let lz = LZDiff::new(Vec::new(), 20);
        assert!(lz.encode(&[]).is_empty());
        let ops = lz.encode(&[1, 2, 3]);
        assert_eq!(reconstruct(&[], &ops).unwrap(), vec![1, 2, 3]);
    }
}
