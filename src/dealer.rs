//! Rank-0 trusted-party simulation dealing correlated randomness.
//!
//! At setup every party hands a fresh PRG seed to the coordinator (rank 0),
//! which can therefore reproduce the "random" share any party will draw
//! locally. Correlations are then dealt without bulk communication: all
//! parties draw their shares from their synced streams and the coordinator
//! folds the required correction into its own share.
//!
//! This models a semi-trusted dealer (the coordinator learns the dealt
//! correlations and, for permutation pairs, the permutation vector, but
//! never any shared secret). A production deployment would replace it with
//! an independent dealer service.

use rand::{Rng, SeedableRng, random};
use rand_chacha::ChaCha20Rng;

use crate::{
    channel::{self, Channel, recv_from, send_to},
    permute::apply_inv_perm,
    ring::{self, Ring},
};

/// Errors occurring while dealing correlated randomness.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A message could not be sent or received.
    #[error(transparent)]
    Channel(#[from] channel::Error),
    /// A message was sent, but it contained no data.
    #[error("a message contained no data")]
    EmptyMsg,
    /// The permutation owner did not supply a permutation vector.
    #[error("rank {0} owns the permutation but has no plaintext vector")]
    MissingPermutation(usize),
    /// The permutation vector length does not match the shared buffer.
    #[error("permutation of length {0} applied to {1} elements")]
    PermLengthMismatch(usize, usize),
}

/// Per-party state of the trusted-party dealer simulation.
pub struct Dealer {
    i: usize,
    n: usize,
    own: ChaCha20Rng,
    /// On rank 0: one synced stream per party, in rank order.
    all: Vec<ChaCha20Rng>,
}

impl Dealer {
    /// Generates a per-party seed and gathers all seeds at rank 0.
    pub async fn setup(channel: &mut impl Channel, i: usize, n: usize) -> Result<Self, Error> {
        let seed = random::<[u8; 32]>();
        let mut all = vec![];
        if i == 0 {
            all.push(ChaCha20Rng::from_seed(seed));
            for p in 1..n {
                let s = recv_from::<[u8; 32]>(channel, p, "dealer seed")
                    .await?
                    .pop()
                    .ok_or(Error::EmptyMsg)?;
                all.push(ChaCha20Rng::from_seed(s));
            }
        } else {
            send_to(channel, 0, "dealer seed", &[seed]).await?;
        }
        Ok(Self {
            i,
            n,
            own: ChaCha20Rng::from_seed(seed),
            all,
        })
    }

    /// Deals a permutation correlation `(A, B)` with
    /// `apply_inv_perm(A, pv) = B`, where `pv` is known to `owner` (and,
    /// through this dealer, to the coordinator).
    ///
    /// Returns this party's additive shares of `A` and `B`.
    pub async fn perm_pair<R: Ring>(
        &mut self,
        channel: &mut impl Channel,
        numel: usize,
        owner: usize,
        pv: Option<&[usize]>,
    ) -> Result<(Vec<R>, Vec<R>), Error> {
        if self.i == owner {
            let pv = pv.ok_or(Error::MissingPermutation(owner))?;
            if pv.len() != numel {
                return Err(Error::PermLengthMismatch(pv.len(), numel));
            }
            if self.i != 0 {
                let pv64: Vec<u64> = pv.iter().map(|&p| p as u64).collect();
                send_to(channel, 0, "perm pair pv", &pv64).await?;
            }
        }

        if self.i == 0 {
            let pv: Vec<usize> = if owner == 0 {
                pv.ok_or(Error::MissingPermutation(owner))?.to_vec()
            } else {
                recv_from::<u64>(channel, owner, "perm pair pv")
                    .await?
                    .into_iter()
                    .map(|p| p as usize)
                    .collect()
            };
            if pv.len() != numel {
                return Err(Error::PermLengthMismatch(pv.len(), numel));
            }
            // reproduce every party's draws, correct the own B share
            let mut a_own = vec![];
            let mut a_sum = ring::zeros::<R>(numel);
            let mut b_sum = ring::zeros::<R>(numel);
            for p in 0..self.n {
                let a: Vec<R> = draw(&mut self.all[p], numel);
                let b: Vec<R> = draw(&mut self.all[p], numel);
                ring::add_assign(&mut a_sum, &a);
                if p != 0 {
                    ring::add_assign(&mut b_sum, &b);
                } else {
                    a_own = a;
                }
            }
            let b_own = ring::sub_vec(&apply_inv_perm(&a_sum, &pv), &b_sum);
            Ok((a_own, b_own))
        } else {
            let a = draw(&mut self.own, numel);
            let b = draw(&mut self.own, numel);
            Ok((a, b))
        }
    }
}

fn draw<R: Ring>(rng: &mut impl Rng, numel: usize) -> Vec<R> {
    (0..numel).map(|_| R::random(rng)).collect()
}
