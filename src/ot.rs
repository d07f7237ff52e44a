//! Oblivious-transfer primitives: Chou-Orlandi base OT, a stateful
//! correlated-OT extension, and the ring-level correlations derived from it.
//!
//! The extension follows the usual IKNP structure: 128 base OTs seed one
//! PRG per matrix column, the receiver sends its masked columns, and after
//! transposition the sender holds `q_j` with `t_j = q_j ^ (b_j & delta)`
//! for a delta fixed at setup (the TinyOT key). The column PRGs are
//! stateful, so repeated `extend` calls keep drawing from the same
//! correlation. On top of this, [`CotSender::rot_send`] /
//! [`CotReceiver::rot_recv`] hash the blocks into random-OT messages over
//! an arbitrary ring, and [`CotSender::vole_send`] /
//! [`CotReceiver::vole_recv`] build a vector-OLE mod `2^k` by decomposing
//! the receiver's scalars bit by bit.
//!
//! Active consistency of the extension itself is not checked here: every
//! consumer in this crate re-verifies the derived correlations through its
//! own MAC checks, and a correlation broken by a cheating peer surfaces
//! there as a session abort.

use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_TABLE,
    ristretto::{CompressedRistretto, RistrettoBasepointTable, RistrettoPoint},
    scalar::Scalar,
};
use rand::{CryptoRng, Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::{
    channel::{self, Channel, recv_vec_from, send_to},
    ring::Ring,
    utils::{RngCompat, xor_inplace},
};

/// The number of base OTs, i.e. the extension security parameter.
pub(crate) const KAPPA: usize = 128;

/// Errors occurring in the OT layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A message could not be sent or received.
    #[error(transparent)]
    Channel(#[from] channel::Error),
    /// A received group element could not be decoded.
    #[error("invalid curve point in base OT")]
    InvalidPoint,
}

fn hash_point(counter: u128, point: &RistrettoPoint) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&counter.to_le_bytes());
    hasher.update(point.compress().as_bytes());
    hasher.finalize().into()
}

fn decode_point(bytes: &[u8; 32]) -> Result<RistrettoPoint, Error> {
    CompressedRistretto::from_slice(bytes)
        .map_err(|_| Error::InvalidPoint)?
        .decompress()
        .ok_or(Error::InvalidPoint)
}

/// Chou-Orlandi base OT, sender side: produces `count` random seed pairs of
/// which the receiver learns exactly the chosen one.
///
/// The OT index is hashed into the key derivation so that equal receiver
/// points still yield independent seeds.
async fn base_ot_send(
    channel: &mut impl Channel,
    rng: &mut (impl Rng + CryptoRng),
    peer: usize,
    count: usize,
) -> Result<Vec<([u8; 32], [u8; 32])>, Error> {
    let mut rng = RngCompat(rng);
    let y = Scalar::random(&mut rng);
    let s = &y * RISTRETTO_BASEPOINT_TABLE;
    send_to(channel, peer, "base OT s", s.compress().as_bytes()).await?;
    let ys = y * s;

    let points: Vec<[u8; 32]> = recv_vec_from(channel, peer, "base OT r", count).await?;
    let mut seeds = Vec::with_capacity(count);
    for (idx, bytes) in points.into_iter().enumerate() {
        let r = decode_point(&bytes)?;
        let yr = y * r;
        let k0 = hash_point(idx as u128, &yr);
        let k1 = hash_point(idx as u128, &(yr - ys));
        seeds.push((k0, k1));
    }
    Ok(seeds)
}

/// Chou-Orlandi base OT, receiver side: learns the seed selected by each
/// choice bit.
async fn base_ot_recv(
    channel: &mut impl Channel,
    rng: &mut (impl Rng + CryptoRng),
    peer: usize,
    choices: &[bool],
) -> Result<Vec<[u8; 32]>, Error> {
    let mut rng = RngCompat(rng);
    let s_bytes: [u8; 32] = recv_vec_from(channel, peer, "base OT s", 32)
        .await?
        .try_into()
        .map_err(|_| Error::InvalidPoint)?;
    let s = decode_point(&s_bytes)?;
    let s_table = RistrettoBasepointTable::create(&s);

    let mut points = Vec::with_capacity(choices.len());
    let mut seeds = Vec::with_capacity(choices.len());
    for (idx, &b) in choices.iter().enumerate() {
        let x = Scalar::random(&mut rng);
        let r = if b {
            s + &x * RISTRETTO_BASEPOINT_TABLE
        } else {
            &x * RISTRETTO_BASEPOINT_TABLE
        };
        points.push(*r.compress().as_bytes());
        seeds.push(hash_point(idx as u128, &(&x * &s_table)));
    }
    send_to(channel, peer, "base OT r", &points).await?;
    Ok(seeds)
}

/// Packs bits little-endian into bytes.
fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; bits.len().div_ceil(8)];
    for (j, &b) in bits.iter().enumerate() {
        if b {
            out[j / 8] |= 1 << (j % 8);
        }
    }
    out
}

/// Transposes `KAPPA` bit columns of `count` bits each into `count` rows.
fn transpose_to_rows(cols: &[Vec<u8>], count: usize) -> Vec<u128> {
    let mut rows = vec![0u128; count];
    for (i, col) in cols.iter().enumerate() {
        for (j, row) in rows.iter_mut().enumerate() {
            let bit = (col[j / 8] >> (j % 8)) & 1;
            *row |= (bit as u128) << i;
        }
    }
    rows
}

/// Correlated-OT extension sender: holds the fixed `delta` and one column
/// PRG per base OT, seeded by the base-OT seed its own choice bit selected.
pub(crate) struct CotSender {
    delta: u128,
    rngs: Vec<ChaCha20Rng>,
    counter: u128,
}

impl CotSender {
    /// Runs the base OTs (as receiver, with the bits of `delta` as choices)
    /// against the peer's [`CotReceiver::setup`].
    pub(crate) async fn setup(
        channel: &mut impl Channel,
        rng: &mut (impl Rng + CryptoRng),
        peer: usize,
        delta: u128,
    ) -> Result<Self, Error> {
        let choices: Vec<bool> = (0..KAPPA).map(|k| (delta >> k) & 1 == 1).collect();
        let seeds = base_ot_recv(channel, rng, peer, &choices).await?;
        Ok(Self {
            delta,
            rngs: seeds.into_iter().map(ChaCha20Rng::from_seed).collect(),
            counter: 0,
        })
    }

    /// The fixed correlation of this extension instance.
    pub(crate) fn delta(&self) -> u128 {
        self.delta
    }

    /// Extends `count` correlated OTs, returning the keys `q_j`; the peer's
    /// matching [`CotReceiver::extend`] yields `q_j ^ (b_j & delta)`.
    pub(crate) async fn extend(
        &mut self,
        channel: &mut impl Channel,
        peer: usize,
        count: usize,
    ) -> Result<Vec<u128>, Error> {
        let bytes = count.div_ceil(8);
        let u: Vec<Vec<u8>> = recv_vec_from(channel, peer, "cot extend", KAPPA).await?;
        let mut cols = Vec::with_capacity(KAPPA);
        for (i, rng) in self.rngs.iter_mut().enumerate() {
            let mut col = vec![0u8; bytes];
            rng.fill_bytes(&mut col);
            if (self.delta >> i) & 1 == 1 {
                xor_inplace(&mut col, &u[i]);
            }
            cols.push(col);
        }
        Ok(transpose_to_rows(&cols, count))
    }

    /// Random OT over a ring: returns `count` message pairs `(m0, m1)`, the
    /// peer learns the one selected by its choice bit.
    pub(crate) async fn rot_send<R: Ring>(
        &mut self,
        channel: &mut impl Channel,
        peer: usize,
        count: usize,
    ) -> Result<(Vec<R>, Vec<R>), Error> {
        let q = self.extend(channel, peer, count).await?;
        let base = self.counter;
        self.counter += count as u128;
        let mut m0 = Vec::with_capacity(count);
        let mut m1 = Vec::with_capacity(count);
        for (j, q) in q.into_iter().enumerate() {
            m0.push(hash_to_ring::<R>(base + j as u128, q));
            m1.push(hash_to_ring::<R>(base + j as u128, q ^ self.delta));
        }
        Ok((m0, m1))
    }

    /// Vector-OLE mod `2^k`: on input `x`, returns `b` such that the peer's
    /// [`CotReceiver::vole_recv`] output satisfies `a - b = alpha * x`.
    pub(crate) async fn vole_send<R: Ring>(
        &mut self,
        channel: &mut impl Channel,
        peer: usize,
        x: &[R],
    ) -> Result<Vec<R>, Error> {
        let numel = x.len();
        let levels = R::BITS;
        let (m0, m1) = self.rot_send::<R>(channel, peer, levels * numel).await?;
        // derandomize: d = m0 - m1 + (x << level), flat index level * numel + idx
        let mut d = Vec::with_capacity(levels * numel);
        for level in 0..levels {
            for idx in 0..numel {
                let flat = level * numel + idx;
                d.push(m0[flat].sub(m1[flat]).add(x[idx].shl(level)));
            }
        }
        send_to(channel, peer, "vole derand", &d).await?;

        let mut b = vec![R::ZERO; numel];
        for level in 0..levels {
            for (idx, b) in b.iter_mut().enumerate() {
                *b = b.add(m0[level * numel + idx]);
            }
        }
        Ok(b)
    }

    /// Matrix vector-OLE: on input the `(m, k)` matrix `x`, returns `v` such
    /// that the peer's output satisfies `w - v = x · beta` for its `(k, n)`
    /// matrix `beta`. Built column by column from [`CotSender::vole_send`].
    pub(crate) async fn vole_send_dot<R: Ring>(
        &mut self,
        channel: &mut impl Channel,
        peer: usize,
        x: &[R],
        m: usize,
        n: usize,
        k: usize,
    ) -> Result<Vec<R>, Error> {
        debug_assert_eq!(x.len(), m * k);
        let mut ret = vec![R::ZERO; m * n];
        for col in 0..n {
            let t = self.vole_send::<R>(channel, peer, x).await?;
            for row in 0..m {
                for j in 0..k {
                    ret[row * n + col] = ret[row * n + col].add(t[row * k + j]);
                }
            }
        }
        Ok(ret)
    }
}

/// Correlated-OT extension receiver, the counterpart of [`CotSender`].
pub(crate) struct CotReceiver {
    rngs: Vec<(ChaCha20Rng, ChaCha20Rng)>,
    counter: u128,
}

impl CotReceiver {
    /// Runs the base OTs (as sender) against the peer's [`CotSender::setup`].
    pub(crate) async fn setup(
        channel: &mut impl Channel,
        rng: &mut (impl Rng + CryptoRng),
        peer: usize,
    ) -> Result<Self, Error> {
        let seeds = base_ot_send(channel, rng, peer, KAPPA).await?;
        Ok(Self {
            rngs: seeds
                .into_iter()
                .map(|(s0, s1)| (ChaCha20Rng::from_seed(s0), ChaCha20Rng::from_seed(s1)))
                .collect(),
            counter: 0,
        })
    }

    /// Extends correlated OTs for the given choice bits, returning
    /// `t_j = q_j ^ (b_j & delta)`.
    pub(crate) async fn extend(
        &mut self,
        channel: &mut impl Channel,
        peer: usize,
        choices: &[bool],
    ) -> Result<Vec<u128>, Error> {
        let count = choices.len();
        let bytes = count.div_ceil(8);
        let packed = pack_bits(choices);
        let mut t_cols = Vec::with_capacity(KAPPA);
        let mut u = Vec::with_capacity(KAPPA);
        for (rng0, rng1) in self.rngs.iter_mut() {
            let mut t0 = vec![0u8; bytes];
            rng0.fill_bytes(&mut t0);
            let mut t1 = vec![0u8; bytes];
            rng1.fill_bytes(&mut t1);
            xor_inplace(&mut t1, &t0);
            xor_inplace(&mut t1, &packed);
            u.push(t1);
            t_cols.push(t0);
        }
        send_to(channel, peer, "cot extend", &u).await?;
        Ok(transpose_to_rows(&t_cols, count))
    }

    /// Random OT over a ring: learns the message selected by each choice bit.
    pub(crate) async fn rot_recv<R: Ring>(
        &mut self,
        channel: &mut impl Channel,
        peer: usize,
        choices: &[bool],
    ) -> Result<Vec<R>, Error> {
        let t = self.extend(channel, peer, choices).await?;
        let base = self.counter;
        self.counter += choices.len() as u128;
        Ok(t.into_iter()
            .enumerate()
            .map(|(j, t)| hash_to_ring::<R>(base + j as u128, t))
            .collect())
    }

    /// Vector-OLE mod `2^k`: on input `alpha`, returns `a` such that
    /// `a - b = alpha * x` against the peer's [`CotSender::vole_send`].
    pub(crate) async fn vole_recv<R: Ring>(
        &mut self,
        channel: &mut impl Channel,
        peer: usize,
        alpha: &[R],
    ) -> Result<Vec<R>, Error> {
        let numel = alpha.len();
        let levels = R::BITS;
        let mut choices = Vec::with_capacity(levels * numel);
        for level in 0..levels {
            for alpha in alpha {
                choices.push(alpha.bit(level));
            }
        }
        let mc = self.rot_recv::<R>(channel, peer, &choices).await?;
        let d: Vec<R> = recv_vec_from(channel, peer, "vole derand", levels * numel).await?;

        let mut a = vec![R::ZERO; numel];
        for level in 0..levels {
            for (idx, a) in a.iter_mut().enumerate() {
                let flat = level * numel + idx;
                let w = if choices[flat] {
                    mc[flat].add(d[flat])
                } else {
                    mc[flat]
                };
                *a = a.add(w);
            }
        }
        Ok(a)
    }

    /// Matrix vector-OLE, counterpart of [`CotSender::vole_send_dot`]: on
    /// input the `(k, n)` matrix `beta`, returns `w` with `w - v = x · beta`.
    pub(crate) async fn vole_recv_dot<R: Ring>(
        &mut self,
        channel: &mut impl Channel,
        peer: usize,
        beta: &[R],
        m: usize,
        n: usize,
        k: usize,
    ) -> Result<Vec<R>, Error> {
        debug_assert_eq!(beta.len(), k * n);
        let mut ret = vec![R::ZERO; m * n];
        for col in 0..n {
            // replicate column `col` of beta across all rows of the lhs shape
            let mut alpha_ext = Vec::with_capacity(m * k);
            for _row in 0..m {
                for j in 0..k {
                    alpha_ext.push(beta[j * n + col]);
                }
            }
            let t = self.vole_recv::<R>(channel, peer, &alpha_ext).await?;
            for row in 0..m {
                for j in 0..k {
                    ret[row * n + col] = ret[row * n + col].add(t[row * k + j]);
                }
            }
        }
        Ok(ret)
    }
}

fn hash_to_ring<R: Ring>(counter: u128, block: u128) -> R {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&counter.to_le_bytes());
    hasher.update(&block.to_le_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    let lo = u128::from_le_bytes(digest[..16].try_into().expect("16 bytes"));
    let hi = u128::from_le_bytes(digest[16..].try_into().expect("16 bytes"));
    R::from_u128(lo).xor(R::from_u128(hi))
}
