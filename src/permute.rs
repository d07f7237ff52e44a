//! Secure application of private permutations to additively shared vectors.
//!
//! The core building block is [`secure_inv_perm`]: with a dealer-provided
//! correlation `(A, B)` satisfying `apply_inv_perm(A, pv) = B`, the parties
//! open `x - A` to the permutation owner only, which applies the
//! permutation in the clear and adds `B`; everyone else's output share is
//! just `B`. A permutation shared across all parties (one private component
//! each) is applied by chaining this protocol once per rank, so rounds and
//! communication grow linearly with the party count.

use rand::Rng;

use crate::{
    channel::{self, Channel, recv_vec_from, send_to},
    dealer::{self, Dealer},
    ring::{self, Ring},
};

/// Errors occurring during secure permutation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A message could not be sent or received.
    #[error(transparent)]
    Channel(#[from] channel::Error),
    /// The correlation dealer failed.
    #[error(transparent)]
    Dealer(#[from] dealer::Error),
    /// The permutation vector length does not match the shared buffer.
    #[error("permutation of length {0} applied to {1} elements")]
    PermLengthMismatch(usize, usize),
}

/// Applies `perm` to a plaintext buffer: `out[i] = x[perm[i]]`.
pub fn apply_perm<T: Clone>(x: &[T], perm: &[usize]) -> Vec<T> {
    perm.iter().map(|&p| x[p].clone()).collect()
}

/// Applies the inverse of `perm` to a plaintext buffer: `out[perm[i]] = x[i]`.
pub fn apply_inv_perm<T: Clone>(x: &[T], perm: &[usize]) -> Vec<T> {
    let mut out = x.to_vec();
    for (i, &p) in perm.iter().enumerate() {
        out[p] = x[i].clone();
    }
    out
}

/// The inverse permutation vector.
pub fn inverse_perm(perm: &[usize]) -> Vec<usize> {
    let mut inv = vec![0; perm.len()];
    for (i, &p) in perm.iter().enumerate() {
        inv[p] = i;
    }
    inv
}

/// Samples this party's private component of a shared random permutation.
///
/// The composition of all components (applied rank by rank) is the shared
/// permutation; no party knows it in full.
pub fn rand_perm_m(rng: &mut impl Rng, numel: usize) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..numel).collect();
    for idx in (1..numel).rev() {
        let swap_idx = rng.random_range(0..=idx);
        perm.swap(idx, swap_idx);
    }
    perm
}

/// Securely applies the inverse of the permutation known to `owner` to the
/// additively shared `x`.
///
/// `pv` is the plaintext permutation vector on the owning rank and `None`
/// everywhere else (ranks without a plaintext simply skip the extraction
/// and only run the masking/recombination steps).
pub async fn secure_inv_perm<R: Ring>(
    channel: &mut impl Channel,
    dealer: &mut Dealer,
    i: usize,
    n: usize,
    x: &[R],
    pv: Option<&[usize]>,
    owner: usize,
) -> Result<Vec<R>, Error> {
    let numel = x.len();
    if let Some(pv) = pv
        && pv.len() != numel
    {
        return Err(Error::PermLengthMismatch(pv.len(), numel));
    }
    let (a, mut b) = dealer
        .perm_pair::<R>(channel, numel, owner, if i == owner { pv } else { None })
        .await?;

    let masked = ring::sub_vec(x, &a);
    if i == owner {
        let pv = pv.expect("owner holds the permutation, checked by the dealer");
        let mut opened = masked;
        for p in (0..n).filter(|p| *p != i) {
            let share: Vec<R> = recv_vec_from(channel, p, "inv_perm open", numel).await?;
            ring::add_assign(&mut opened, &share);
        }
        let permuted = apply_inv_perm(&opened, pv);
        ring::add_assign(&mut b, &permuted);
        Ok(b)
    } else {
        send_to(channel, owner, "inv_perm open", &masked).await?;
        Ok(b)
    }
}

/// Applies a shared permutation to a shared vector, chaining the per-rank
/// components in ascending rank order.
pub async fn perm_am<R: Ring>(
    channel: &mut impl Channel,
    dealer: &mut Dealer,
    i: usize,
    n: usize,
    x: &[R],
    own_component: &[usize],
) -> Result<Vec<R>, Error> {
    let mut out = x.to_vec();
    for rank in 0..n {
        let pv = (i == rank).then_some(own_component);
        out = secure_inv_perm(channel, dealer, i, n, &out, pv, rank).await?;
    }
    Ok(out)
}

/// Applies the inverse of a shared permutation, chaining the inverted
/// per-rank components in descending rank order.
pub async fn inv_perm_am<R: Ring>(
    channel: &mut impl Channel,
    dealer: &mut Dealer,
    i: usize,
    n: usize,
    x: &[R],
    own_component: &[usize],
) -> Result<Vec<R>, Error> {
    let inv = inverse_perm(own_component);
    let mut out = x.to_vec();
    for rank in (0..n).rev() {
        let pv = (i == rank).then_some(inv.as_slice());
        out = secure_inv_perm(channel, dealer, i, n, &out, pv, rank).await?;
    }
    Ok(out)
}

/// Applies the permutation privately known to `owner` to a shared vector
/// (forward direction, `y = apply_perm(x, pv)` after reconstruction).
pub async fn perm_av<R: Ring>(
    channel: &mut impl Channel,
    dealer: &mut Dealer,
    i: usize,
    n: usize,
    x: &[R],
    pv: Option<&[usize]>,
    owner: usize,
) -> Result<Vec<R>, Error> {
    let inv = pv.map(|pv| inverse_perm(pv));
    secure_inv_perm(channel, dealer, i, n, x, inv.as_deref(), owner).await
}

/// Applies the inverse of the permutation privately known to `owner` to a
/// shared vector.
pub async fn inv_perm_av<R: Ring>(
    channel: &mut impl Channel,
    dealer: &mut Dealer,
    i: usize,
    n: usize,
    x: &[R],
    pv: Option<&[usize]>,
    owner: usize,
) -> Result<Vec<R>, Error> {
    secure_inv_perm(channel, dealer, i, n, x, pv, owner).await
}
