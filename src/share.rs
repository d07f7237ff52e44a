//! Share types for the 3-party replicated protocols and helpers to create
//! and recombine them.
//!
//! A secret `x` is split into three additive summands `x = x_0 + x_1 + x_2`;
//! party `i` holds the pair `(x_i, x_{i+1})` (indices mod 3), so any two
//! parties can reconstruct while a single party learns nothing. Boolean
//! shares work the same way with XOR instead of addition and carry an
//! explicit bit-width.
//!
//! The additive n-party sharing used by the permutation and triple-generation
//! protocols is a plain element buffer per party; helpers for it live here
//! as well.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ring::{self, Ring};

/// A replicated arithmetic share: party `i` holds `(x_i, x_{i+1})` of
/// `x = x_0 + x_1 + x_2` mod `2^k`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AShare<R> {
    /// The summand with the party's own index.
    pub s0: Vec<R>,
    /// The successor party's summand.
    pub s1: Vec<R>,
}

impl<R: Ring> AShare<R> {
    /// The number of shared elements.
    pub fn numel(&self) -> usize {
        self.s0.len()
    }

    /// A share of the all-zero vector (all summands zero).
    pub fn zero(numel: usize) -> Self {
        Self {
            s0: ring::zeros(numel),
            s1: ring::zeros(numel),
        }
    }
}

/// A replicated boolean share: like [`AShare`], but reconstruction is via
/// XOR and only the low `nbits` bits are meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BShare<R> {
    /// The number of meaningful low bits; `0` encodes the constant zero.
    pub nbits: usize,
    /// The summand with the party's own index.
    pub s0: Vec<R>,
    /// The successor party's summand.
    pub s1: Vec<R>,
}

impl<R: Ring> BShare<R> {
    /// The number of shared elements.
    pub fn numel(&self) -> usize {
        self.s0.len()
    }

    /// A share of the all-zero vector with the given width.
    pub fn zero(numel: usize, nbits: usize) -> Self {
        Self {
            nbits,
            s0: ring::zeros(numel),
            s1: ring::zeros(numel),
        }
    }
}

/// Splits plaintext values into replicated arithmetic shares for 3 parties.
pub fn share_arith<R: Ring>(rng: &mut impl Rng, values: &[R]) -> [AShare<R>; 3] {
    let numel = values.len();
    let x0 = ring::rand_vec::<R>(rng, numel);
    let x1 = ring::rand_vec::<R>(rng, numel);
    let x2: Vec<R> = (0..numel)
        .map(|idx| values[idx].sub(x0[idx]).sub(x1[idx]))
        .collect();
    let parts = [x0, x1, x2];
    [0, 1, 2].map(|i| AShare {
        s0: parts[i].clone(),
        s1: parts[(i + 1) % 3].clone(),
    })
}

/// Recombines replicated arithmetic shares, checking replication consistency.
pub fn combine_arith<R: Ring>(shares: &[AShare<R>; 3]) -> Vec<R> {
    for i in 0..3 {
        assert_eq!(shares[i].s1, shares[(i + 1) % 3].s0, "inconsistent replication");
    }
    let mut out = shares[0].s0.clone();
    ring::add_assign(&mut out, &shares[1].s0);
    ring::add_assign(&mut out, &shares[2].s0);
    out
}

/// Splits plaintext values into replicated boolean shares for 3 parties.
pub fn share_bool<R: Ring>(rng: &mut impl Rng, values: &[R], nbits: usize) -> [BShare<R>; 3] {
    let numel = values.len();
    let mask = |v: R| ring::mask_low_el(v, nbits);
    let x0: Vec<R> = ring::rand_vec::<R>(rng, numel).into_iter().map(mask).collect();
    let x1: Vec<R> = ring::rand_vec::<R>(rng, numel).into_iter().map(mask).collect();
    let x2: Vec<R> = (0..numel)
        .map(|idx| mask(values[idx].xor(x0[idx]).xor(x1[idx])))
        .collect();
    let parts = [x0, x1, x2];
    [0, 1, 2].map(|i| BShare {
        nbits,
        s0: parts[i].clone(),
        s1: parts[(i + 1) % 3].clone(),
    })
}

/// Recombines replicated boolean shares, checking replication consistency.
pub fn combine_bool<R: Ring>(shares: &[BShare<R>; 3]) -> Vec<R> {
    for i in 0..3 {
        assert_eq!(shares[i].s1, shares[(i + 1) % 3].s0, "inconsistent replication");
        assert_eq!(shares[i].nbits, shares[0].nbits, "inconsistent width");
    }
    (0..shares[0].numel())
        .map(|idx| {
            shares[0].s0[idx]
                .xor(shares[1].s0[idx])
                .xor(shares[2].s0[idx])
        })
        .collect()
}

/// Splits plaintext values into additive shares for `n` parties.
pub fn share_additive<R: Ring>(rng: &mut impl Rng, values: &[R], n: usize) -> Vec<Vec<R>> {
    let numel = values.len();
    let mut parts: Vec<Vec<R>> = (0..n - 1)
        .map(|_| ring::rand_vec::<R>(rng, numel))
        .collect();
    let last: Vec<R> = (0..numel)
        .map(|idx| {
            parts
                .iter()
                .fold(values[idx], |acc, p| acc.sub(p[idx]))
        })
        .collect();
    parts.push(last);
    parts
}

/// Recombines additive shares.
pub fn combine_additive<R: Ring>(shares: &[Vec<R>]) -> Vec<R> {
    let mut out = ring::zeros::<R>(shares[0].len());
    for share in shares {
        ring::add_assign(&mut out, share);
    }
    out
}

#[cfg(test)]
mod tests {
    use rand::rng;

    use super::*;

    #[test]
    fn arith_round_trip() {
        let mut rng = rng();
        let values: Vec<u64> = vec![0, 1, u64::MAX, 42];
        let shares = share_arith(&mut rng, &values);
        assert_eq!(combine_arith(&shares), values);
    }

    #[test]
    fn bool_round_trip_masks_width() {
        let mut rng = rng();
        let values: Vec<u32> = vec![0b1011, 0b0101];
        let shares = share_bool(&mut rng, &values, 4);
        assert_eq!(combine_bool(&shares), values);
    }

    #[test]
    fn additive_round_trip() {
        let mut rng = rng();
        let values: Vec<u128> = vec![7, u128::MAX, 0];
        let shares = share_additive(&mut rng, &values, 5);
        assert_eq!(combine_additive(&shares), values);
    }
}
