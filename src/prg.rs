//! Pseudorandom generator state for the 3-party protocols.
//!
//! Implements the usual PRSS setup: every party generates a fresh seed and
//! hands it to its predecessor, so that each adjacent pair on the ring shares
//! one seed. A party can then derive
//!
//! * a stream shared with its *previous* neighbor (its own seed),
//! * a stream shared with its *next* neighbor (the received seed),
//! * a public stream all parties agree on (coin-tossed at setup),
//! * a private stream nobody else knows.
//!
//! XORing the two neighbor streams yields a share of zero across the ring.
//! Every stream keeps its own position, so a protocol in which only two of
//! the three parties draw from a given seed stays aligned by construction.

use rand::{Rng, SeedableRng, random};
use rand_chacha::ChaCha20Rng;

use crate::{
    channel::{Channel, recv_from, send_to},
    commit::{self, shared_seed},
    ring::Ring,
};

/// Per-party PRSS state, see the module docs.
pub struct PrgState {
    prev: ChaCha20Rng,
    next: ChaCha20Rng,
    public: ChaCha20Rng,
    private: ChaCha20Rng,
}

impl PrgState {
    /// Exchanges PRSS seeds with the neighboring parties and coin-tosses the
    /// public seed.
    pub async fn setup(
        channel: &mut impl Channel,
        i: usize,
        n: usize,
    ) -> Result<Self, commit::Error> {
        let own_seed = random::<[u8; 32]>();
        let prev = (i + n - 1) % n;
        let next = (i + 1) % n;
        send_to(channel, prev, "prss seed", &[own_seed]).await?;
        let next_seed = recv_from::<[u8; 32]>(channel, next, "prss seed")
            .await?
            .pop()
            .ok_or(commit::Error::EmptyMsg)?;
        let public = shared_seed(channel, i, n).await?;
        Ok(Self {
            prev: ChaCha20Rng::from_seed(own_seed),
            next: ChaCha20Rng::from_seed(next_seed),
            public: ChaCha20Rng::from_seed(public),
            private: ChaCha20Rng::from_seed(random()),
        })
    }

    /// Fills a pair of buffers from the two neighbor streams; the XOR (or
    /// sum-difference) of `lo ^ hi` across all parties is a sharing of zero.
    pub(crate) fn zero_pair<R: Ring>(&mut self, numel: usize) -> (Vec<R>, Vec<R>) {
        let lo = fill(&mut self.prev, numel);
        let hi = fill(&mut self.next, numel);
        (lo, hi)
    }

    /// A buffer from the stream shared with the previous party.
    pub(crate) fn with_prev<R: Ring>(&mut self, numel: usize) -> Vec<R> {
        fill(&mut self.prev, numel)
    }

    /// A buffer from the stream shared with the next party.
    pub(crate) fn with_next<R: Ring>(&mut self, numel: usize) -> Vec<R> {
        fill(&mut self.next, numel)
    }

    /// A buffer from the public stream (identical on all parties).
    pub(crate) fn public<R: Ring>(&mut self, numel: usize) -> Vec<R> {
        fill(&mut self.public, numel)
    }

    /// A buffer from the party-local private stream.
    pub(crate) fn private<R: Ring>(&mut self, numel: usize) -> Vec<R> {
        fill(&mut self.private, numel)
    }

    /// A public pivot value, used to derive per-call role assignments.
    pub(crate) fn pivot(&mut self) -> usize {
        self.public.random::<u64>() as usize
    }

    /// A uniformly random private permutation of `[0, numel)`.
    pub fn private_perm(&mut self, numel: usize) -> Vec<usize> {
        let mut perm: Vec<usize> = (0..numel).collect();
        // Fisher-Yates
        for idx in (1..numel).rev() {
            let swap_idx = self.private.random_range(0..=idx);
            perm.swap(idx, swap_idx);
        }
        perm
    }
}

fn fill<R: Ring>(rng: &mut ChaCha20Rng, numel: usize) -> Vec<R> {
    (0..numel).map(|_| R::random(rng)).collect()
}

#[cfg(test)]
mod tests {
    use futures::future::try_join_all;

    use super::*;
    use crate::channel::SimpleChannel;

    async fn setup_three() -> Vec<PrgState> {
        let channels = SimpleChannel::channels(3);
        let parties = channels.into_iter().enumerate().map(|(i, mut ch)| {
            tokio::spawn(async move { PrgState::setup(&mut ch, i, 3).await.unwrap() })
        });
        try_join_all(parties).await.unwrap()
    }

    #[tokio::test]
    async fn zero_pairs_cancel() {
        let mut states = setup_three().await;
        let pairs: Vec<(Vec<u64>, Vec<u64>)> =
            states.iter_mut().map(|s| s.zero_pair(8)).collect();
        for idx in 0..8 {
            let mut acc = 0u64;
            for (lo, hi) in &pairs {
                acc ^= lo[idx] ^ hi[idx];
            }
            assert_eq!(acc, 0);
        }
        // party i's `next` stream is party i+1's `prev` stream
        for i in 0..3 {
            assert_eq!(pairs[i].1, pairs[(i + 1) % 3].0);
        }
    }

    #[tokio::test]
    async fn public_stream_agrees_and_private_does_not() {
        let mut states = setup_three().await;
        let pivots: Vec<usize> = states.iter_mut().map(|s| s.pivot()).collect();
        assert!(pivots.windows(2).all(|w| w[0] == w[1]));
        let publics: Vec<Vec<u128>> = states.iter_mut().map(|s| s.public(4)).collect();
        assert_eq!(publics[0], publics[1]);
        assert_eq!(publics[1], publics[2]);
        let privates: Vec<Vec<u128>> = states.iter_mut().map(|s| s.private(4)).collect();
        assert_ne!(privates[0], privates[1]);
    }

    #[tokio::test]
    async fn private_perm_is_a_permutation() {
        let mut states = setup_three().await;
        let perm = states[0].private_perm(100);
        let mut sorted = perm.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..100).collect::<Vec<_>>());
    }
}
