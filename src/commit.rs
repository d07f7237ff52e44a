//! Hash-based commitments and multi-party coin tossing.
//!
//! Commit-then-open is used wherever a value must be fixed before other
//! parties reveal theirs (MAC checks, coin tossing), to prevent adaptive
//! cheating. The commitments are plain BLAKE3 hashes; every committed value
//! in this crate has high entropy, so no separate blinding is needed.

use rand::random;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::channel::{self, Channel, recv_from, send_to};

/// A 32-byte BLAKE3 commitment to a value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub(crate) struct Commitment(pub(crate) [u8; 32]);

/// Errors occurring during commit/open or coin tossing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A message could not be sent or received.
    #[error(transparent)]
    Channel(#[from] channel::Error),
    /// A commitment could not be opened.
    #[error("commitment could not be opened")]
    CommitmentCouldNotBeOpened,
    /// A message was sent, but it contained no data.
    #[error("a message contained no data")]
    EmptyMsg,
}

/// Commits to a value.
pub(crate) fn commit(value: &[u8]) -> Commitment {
    Commitment(blake3::hash(value).into())
}

/// Verifies that a value matches a previously received commitment.
pub(crate) fn open_commitment(commitment: &Commitment, value: &[u8]) -> bool {
    bool::from(blake3::hash(value).as_bytes().ct_eq(&commitment.0))
}

/// Commits to a byte string, exchanges commitments with all parties, then
/// opens them, returning every party's opened value (own value included at
/// index `i`).
pub(crate) async fn commit_and_open(
    channel: &mut impl Channel,
    i: usize,
    n: usize,
    value: Vec<u8>,
) -> Result<Vec<Vec<u8>>, Error> {
    let c = commit(&value);
    for k in (0..n).filter(|k| *k != i) {
        send_to(channel, k, "commit", &[c]).await?;
    }
    let mut commitments = vec![Commitment([0; 32]); n];
    for k in (0..n).filter(|k| *k != i) {
        commitments[k] = recv_from::<Commitment>(channel, k, "commit")
            .await?
            .pop()
            .ok_or(Error::EmptyMsg)?;
    }
    for k in (0..n).filter(|k| *k != i) {
        send_to(channel, k, "open", &[value.clone()]).await?;
    }
    let mut opened = vec![vec![]; n];
    for k in (0..n).filter(|k| *k != i) {
        let v = recv_from::<Vec<u8>>(channel, k, "open")
            .await?
            .pop()
            .ok_or(Error::EmptyMsg)?;
        if !open_commitment(&commitments[k], &v) {
            return Err(Error::CommitmentCouldNotBeOpened);
        }
        opened[k] = v;
    }
    opened[i] = value;
    Ok(opened)
}

/// Multi-party coin tossing to derive a seed all parties agree on.
///
/// Every party commits to a random 256-bit contribution, all contributions
/// are opened and XORed together. As long as one party is honest, the
/// resulting seed is uniform.
pub(crate) async fn shared_seed(
    channel: &mut impl Channel,
    i: usize,
    n: usize,
) -> Result<[u8; 32], Error> {
    let buf = random::<[u8; 32]>();
    let opened = commit_and_open(channel, i, n, buf.to_vec()).await?;
    let mut seed = [0u8; 32];
    for contribution in opened {
        if contribution.len() != 32 {
            return Err(Error::EmptyMsg);
        }
        seed.iter_mut()
            .zip(contribution.iter())
            .for_each(|(s, c)| *s ^= *c);
    }
    Ok(seed)
}
