//! TinyOT-style authenticated bits and AND triples under pairwise binary
//! MACs.
//!
//! Every party holds a global 128-bit key `delta`; a party's bit `x` is
//! authenticated towards peer `j` by a MAC `M` satisfying
//! `M = K ^ (x & delta_j)`, where `K` is the key peer `j` holds for it.
//! Random authenticated bits come out of the correlated-OT extension
//! directly (the extension delta *is* the TinyOT key); AND triples are
//! produced with the half-AND hashing trick, checked as leaky ANDs and then
//! combined in buckets into non-leaky triples.

use rand::{Rng, SeedableRng, random};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use crate::{
    channel::{self, Channel, recv_vec_from, send_to},
    commit::{self, Commitment, commit, open_commitment},
    ot::{self, CotReceiver, CotSender},
};

/// The statistical security parameter of the bit-authentication checks.
pub(crate) const RHO: usize = 40;

/// Errors occurring in the TinyOT protocols.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A message could not be sent or received.
    #[error(transparent)]
    Channel(#[from] channel::Error),
    /// An OT primitive failed.
    #[error(transparent)]
    Ot(#[from] ot::Error),
    /// A commitment could not be opened.
    #[error("commitment could not be opened")]
    CommitmentCouldNotBeOpened,
    /// A MAC does not match the corresponding key in bit authentication.
    #[error("wrong MAC on an authenticated bit")]
    ABitWrongMac,
    /// The XOR of MACs does not match keys when checking shared bits.
    #[error("wrong MAC on an authenticated share")]
    AShareWrongMac,
    /// The XOR of all hashes in the leaky-AND check is not zero.
    #[error("leaky-AND check does not cancel to zero")]
    LaAndXorNotZero,
    /// Wrong MAC of a d-value when combining two leaky ANDs.
    #[error("wrong MAC on a bucket d-value")]
    AAndWrongDMac,
    /// Wrong MAC of an opened bit.
    #[error("wrong MAC on an opened bit")]
    OpenedBitWrongMac,
    /// The XOR of all opened bit shares does not match the claimed value.
    #[error("opened bit does not match its shares")]
    OpenedBitMismatch,
    /// A MAC or key is missing for a peer.
    #[error("missing MAC or key")]
    MissingMacKey,
    /// A bucket was unexpectedly empty.
    #[error("empty bucket")]
    EmptyBucket,
    /// A commitment sidechannel failed.
    #[error(transparent)]
    Commit(#[from] commit::Error),
}

/// The global binary MAC key known only to a single party, fixed as the
/// correlated-OT extension delta at setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Delta(pub(crate) u128);

/// A message authentication code held together with an authenticated bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Mac(pub(crate) u128);

/// The key a party holds for a peer's authenticated bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Key(pub(crate) u128);

/// Per-peer authentication data: `(mac, key)` towards every other party,
/// `None` at the own rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TinyAuth(pub(crate) Vec<Option<(Mac, Key)>>);

/// An authenticated bit share: the bit plus its per-peer MACs and keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TinyShare(pub(crate) bool, pub(crate) TinyAuth);

impl std::ops::BitXor for &TinyShare {
    type Output = TinyShare;

    fn bitxor(self, rhs: Self) -> TinyShare {
        let auth = self
            .1
            .0
            .iter()
            .zip(&rhs.1.0)
            .map(|(a, b)| match (a, b) {
                (Some((m0, k0)), Some((m1, k1))) => {
                    Some((Mac(m0.0 ^ m1.0), Key(k0.0 ^ k1.0)))
                }
                _ => None,
            })
            .collect();
        TinyShare(self.0 ^ rhs.0, TinyAuth(auth))
    }
}

impl TinyShare {
    fn mac_for(&self, peer: usize) -> Result<Mac, Error> {
        Ok(self.1.0[peer].ok_or(Error::MissingMacKey)?.0)
    }

    fn key_for(&self, peer: usize) -> Result<Key, Error> {
        Ok(self.1.0[peer].ok_or(Error::MissingMacKey)?.1)
    }
}

/// Hashes 128 bits to 128 bits with BLAKE3 by folding the two digest halves;
/// XORing correct hashes still cancels out.
pub(crate) fn hash128(input: u128) -> u128 {
    let digest: [u8; 32] = blake3::hash(&input.to_le_bytes()).into();
    let lo = u128::from_le_bytes(digest[..16].try_into().expect("16 bytes"));
    let hi = u128::from_le_bytes(digest[16..].try_into().expect("16 bytes"));
    lo ^ hi
}

/// Authenticates `l` fresh random bits towards every peer (`Pi_aBit`).
///
/// Runs one correlated-OT extension per ordered pair, then verifies `2*RHO`
/// public random linear combinations of the resulting MACs before releasing
/// the first `l` bits.
pub(crate) async fn auth_bits(
    channel: &mut impl Channel,
    delta: Delta,
    cot_send: &mut [Option<CotSender>],
    cot_recv: &mut [Option<CotReceiver>],
    i: usize,
    n: usize,
    l: usize,
    shared_rng: &mut ChaCha20Rng,
) -> Result<Vec<TinyShare>, Error> {
    let lprime = l + 2 * RHO;
    let mut x: Vec<bool> = {
        let mut rng = rand::rng();
        (0..lprime).map(|_| rng.random()).collect()
    };

    // keys for every peer's bits, MACs on our own bits
    let mut kk: Vec<Vec<u128>> = vec![vec![]; n];
    let mut mm: Vec<Vec<u128>> = vec![vec![]; n];
    for a in 0..n {
        for b in (0..n).filter(|b| *b != a) {
            if a == i {
                let sender = cot_send[b].as_mut().ok_or(Error::MissingMacKey)?;
                kk[b] = sender.extend(channel, b, lprime).await?;
            }
            if b == i {
                let receiver = cot_recv[a].as_mut().ok_or(Error::MissingMacKey)?;
                mm[a] = receiver.extend(channel, a, &x).await?;
            }
        }
    }

    // verification of MACs and keys against 2*RHO random combinations
    let two_rho = 2 * RHO;
    let r: Vec<Vec<bool>> = (0..two_rho)
        .map(|_| (0..lprime).map(|_| shared_rng.random()).collect())
        .collect();

    let mut xj = Vec::with_capacity(two_rho);
    for rbits in &r {
        let mut combined = false;
        for (xi, ri) in x.iter().zip(rbits) {
            combined ^= xi & ri;
        }
        xj.push(combined);
    }

    for k in (0..n).filter(|k| *k != i) {
        let mut xj_xjmac = Vec::with_capacity(two_rho);
        for (rbits, xj) in r.iter().zip(xj.iter()) {
            let mut xjmac = 0u128;
            for (j, &rbit) in rbits.iter().enumerate() {
                if rbit {
                    xjmac ^= mm[k][j];
                }
            }
            xj_xjmac.push((*xj, xjmac));
        }
        send_to(channel, k, "abit check", &xj_xjmac).await?;
    }
    for k in (0..n).filter(|k| *k != i) {
        let xj_xjmac_k: Vec<(bool, u128)> =
            recv_vec_from(channel, k, "abit check", two_rho).await?;
        for (rbits, (xj, xjmac)) in r.iter().zip(xj_xjmac_k) {
            let mut xjkey = 0u128;
            for (j, &rbit) in rbits.iter().enumerate() {
                if rbit {
                    xjkey ^= kk[k][j];
                }
            }
            if xjmac != xjkey ^ (u128::from(xj) * delta.0) {
                return Err(Error::ABitWrongMac);
            }
        }
    }

    // release the first l bits
    x.truncate(l);
    let mut res = Vec::with_capacity(l);
    for (idx, xi) in x.into_iter().enumerate() {
        let mut auth = vec![None; n];
        for k in (0..n).filter(|k| *k != i) {
            auth[k] = Some((Mac(mm[k][idx]), Key(kk[k][idx])));
        }
        res.push(TinyShare(xi, TinyAuth(auth)));
    }
    Ok(res)
}

/// Authenticates `l` random shared bits with an additional commitment-based
/// consistency layer (`Pi_aShare`): `RHO` sacrificial shares are opened via
/// commitments to catch a party that authenticated inconsistent bits.
pub(crate) async fn auth_share(
    channel: &mut impl Channel,
    delta: Delta,
    cot_send: &mut [Option<CotSender>],
    cot_recv: &mut [Option<CotReceiver>],
    i: usize,
    n: usize,
    l: usize,
    shared_rng: &mut ChaCha20Rng,
) -> Result<Vec<TinyShare>, Error> {
    let mut shares = auth_bits(
        channel, delta, cot_send, cot_recv, i, n, l + RHO, shared_rng,
    )
    .await?;

    // commitments over the RHO sacrificial shares
    let mut d0 = vec![0u128; RHO];
    let mut d1 = vec![0u128; RHO];
    let mut c0_c1_cm = Vec::with_capacity(RHO);
    let mut dmvec = Vec::with_capacity(RHO);
    for r in 0..RHO {
        let share = &shares[l + r];
        let mut dm = Vec::with_capacity(1 + n * 16);
        dm.push(share.0 as u8);
        for k in 0..n {
            if k != i {
                let (mac, key) = share.1.0[k].ok_or(Error::MissingMacKey)?;
                d0[r] ^= key.0;
                dm.extend(&mac.0.to_be_bytes());
            } else {
                dm.extend(&[0; 16]);
            }
        }
        d1[r] = d0[r] ^ delta.0;
        let c0 = commit(&d0[r].to_be_bytes());
        let c1 = commit(&d1[r].to_be_bytes());
        let cm = commit(&dm);
        c0_c1_cm.push((c0, c1, cm));
        dmvec.push(dm);
    }

    for k in (0..n).filter(|k| *k != i) {
        send_to(channel, k, "ashare comm", &c0_c1_cm).await?;
    }
    let mut c0_c1_cm_k = vec![vec![]; n];
    for k in (0..n).filter(|k| *k != i) {
        c0_c1_cm_k[k] =
            recv_vec_from::<(Commitment, Commitment, Commitment)>(channel, k, "ashare comm", RHO)
                .await?;
    }

    for k in (0..n).filter(|k| *k != i) {
        send_to(channel, k, "ashare open", &dmvec).await?;
    }
    let mut dm_k = vec![vec![]; n];
    for k in (0..n).filter(|k| *k != i) {
        dm_k[k] = recv_vec_from::<Vec<u8>>(channel, k, "ashare open", RHO).await?;
        for (dm, (_, _, cm)) in dm_k[k].iter().zip(&c0_c1_cm_k[k]) {
            if !open_commitment(cm, dm) {
                return Err(Error::CommitmentCouldNotBeOpened);
            }
        }
    }
    dm_k[i] = dmvec;

    // open the key combination selected by the XOR of the peers' bits
    let mut di_bi = vec![0u128; RHO];
    for r in 0..RHO {
        let mut bi = 0u8;
        for k in (0..n).filter(|k| *k != i) {
            bi ^= dm_k[k][r][0];
        }
        di_bi[r] = if bi == 0 { d0[r] } else { d1[r] };
    }
    for k in (0..n).filter(|k| *k != i) {
        send_to(channel, k, "ashare di_bi", &di_bi).await?;
    }
    let mut di_bi_k = vec![vec![0u128; RHO]; n];
    for k in (0..n).filter(|k| *k != i) {
        di_bi_k[k] = recv_vec_from::<u128>(channel, k, "ashare di_bi", RHO).await?;
    }

    // every party's opened key combination must match the XOR of the MACs
    // the others hold for it
    let mut xor_xk_macs = vec![vec![0u128; RHO]; n];
    for r in 0..RHO {
        for (p, dm) in dm_k.iter().enumerate() {
            for k in (0..n).filter(|k| *k != p) {
                if !dm.is_empty() {
                    let bytes: [u8; 16] = dm[r][(1 + k * 16)..(17 + k * 16)]
                        .try_into()
                        .map_err(|_| Error::MissingMacKey)?;
                    xor_xk_macs[k][r] ^= u128::from_be_bytes(bytes);
                }
            }
        }
        for k in (0..n).filter(|k| *k != i) {
            let opened = &di_bi_k[k][r].to_be_bytes();
            let (c0, c1, _) = &c0_c1_cm_k[k][r];
            if open_commitment(c0, opened) || open_commitment(c1, opened) {
                if xor_xk_macs[k][r] != di_bi_k[k][r] {
                    return Err(Error::AShareWrongMac);
                }
            } else {
                return Err(Error::CommitmentCouldNotBeOpened);
            }
        }
    }

    shares.truncate(l);
    Ok(shares)
}

/// Computes XOR shares of `x & y` where `x` is authenticated and each party
/// inputs its own `y` bits (`Pi_HaAND`): the cross terms `x_i & y_j` are
/// derived obliviously from hashes of the bit-authentication keys.
async fn half_and(
    channel: &mut impl Channel,
    delta: Delta,
    i: usize,
    n: usize,
    l: usize,
    xshares: &[TinyShare],
    y: &[bool],
) -> Result<Vec<bool>, Error> {
    let mut rng = ChaCha20Rng::from_seed(random());
    let mut v = vec![false; l];
    for j in (0..n).filter(|j| *j != i) {
        let mut h0h1 = vec![(false, false); l];
        for idx in 0..l {
            let s: bool = rng.random();
            let key = xshares[idx].key_for(j)?;
            let lsb0 = blake3::hash(&key.0.to_le_bytes()).as_bytes()[31] & 1 != 0;
            let lsb1 = blake3::hash(&(key.0 ^ delta.0).to_le_bytes()).as_bytes()[31] & 1 != 0;
            h0h1[idx] = (lsb0 ^ s, lsb1 ^ s ^ y[idx]);
            v[idx] ^= s;
        }
        send_to(channel, j, "haand", &h0h1).await?;
    }
    for j in (0..n).filter(|j| *j != i) {
        let h0h1_j: Vec<(bool, bool)> = recv_vec_from(channel, j, "haand", l).await?;
        for idx in 0..l {
            let mac = xshares[idx].mac_for(j)?;
            let mut t = blake3::hash(&mac.0.to_le_bytes()).as_bytes()[31] & 1 != 0;
            t ^= if xshares[idx].0 {
                h0h1_j[idx].1
            } else {
                h0h1_j[idx].0
            };
            v[idx] ^= t;
        }
    }
    Ok(v)
}

/// Generates leaky authenticated AND triples (`Pi_LaAND`): given
/// authenticated `x`, `y` and masking shares `r`, produces `z` shares with
/// `XOR(z) = XOR(x) & XOR(y)`, verified with a commit-then-open hash check
/// that must cancel to zero.
async fn leaky_and(
    channel: &mut impl Channel,
    delta: Delta,
    (xshares, yshares, rshares): (&[TinyShare], &[TinyShare], &[TinyShare]),
    i: usize,
    n: usize,
    l: usize,
) -> Result<Vec<TinyShare>, Error> {
    let y: Vec<bool> = yshares.iter().take(l).map(|s| s.0).collect();
    let v = half_and(channel, delta, i, n, l, xshares, &y).await?;

    let mut z = vec![false; l];
    let mut e = vec![false; l];
    for idx in 0..l {
        z[idx] = v[idx] ^ (xshares[idx].0 & yshares[idx].0);
        e[idx] = z[idx] ^ rshares[idx].0;
    }
    let mut zshares: Vec<TinyShare> = (0..l)
        .map(|idx| TinyShare(z[idx], rshares[idx].1.clone()))
        .collect();

    // phi = XOR of key/mac material for y plus y * delta
    let mut phi = vec![0u128; l];
    for (idx, phi) in phi.iter_mut().enumerate() {
        for k in (0..n).filter(|k| *k != i) {
            let (mac, key) = yshares[idx].1.0[k].ok_or(Error::MissingMacKey)?;
            *phi ^= key.0 ^ mac.0;
        }
        *phi ^= u128::from(yshares[idx].0) * delta.0;
    }

    // exchange e and the uij hash corrections, adjust the z MAC keys
    let mut ki_xj_phi = vec![vec![0u128; l]; n];
    for j in (0..n).filter(|j| *j != i) {
        let mut ei_uij = Vec::with_capacity(l);
        for (idx, phi) in phi.iter().enumerate() {
            let key = xshares[idx].key_for(j)?;
            ki_xj_phi[j][idx] = hash128(key.0);
            let uij = hash128(key.0 ^ delta.0) ^ ki_xj_phi[j][idx] ^ *phi;
            ei_uij.push((e[idx], uij));
        }
        send_to(channel, j, "laand", &ei_uij).await?;
    }
    for j in (0..n).filter(|j| *j != i) {
        let ei_uij_j: Vec<(bool, u128)> = recv_vec_from(channel, j, "laand", l).await?;
        for (idx, share) in xshares.iter().enumerate().take(l) {
            let mac = share.mac_for(j)?;
            ki_xj_phi[j][idx] ^= hash128(mac.0) ^ (u128::from(share.0) * ei_uij_j[idx].1);
        }
        for (idx, (e_j, _)) in ei_uij_j.iter().enumerate() {
            let (mac, key) = rshares[idx].1.0[j].ok_or(Error::MissingMacKey)?;
            // e flips the peer's r share, which flips the key we hold for it
            zshares[idx].1.0[j] = if *e_j {
                Some((mac, Key(key.0 ^ delta.0)))
            } else {
                Some((mac, key))
            };
        }
    }

    // hash check: the XOR of all parties' hi values must be zero
    let mut hi = vec![0u128; l];
    let mut commhi = Vec::with_capacity(l);
    for idx in 0..l {
        for k in (0..n).filter(|k| *k != i) {
            let (mac, key) = zshares[idx].1.0[k].ok_or(Error::MissingMacKey)?;
            hi[idx] ^= mac.0 ^ key.0 ^ ki_xj_phi[k][idx];
        }
        hi[idx] ^= u128::from(xshares[idx].0) * phi[idx];
        hi[idx] ^= u128::from(zshares[idx].0) * delta.0;
        commhi.push(commit(&hi[idx].to_be_bytes()));
    }
    for k in (0..n).filter(|k| *k != i) {
        send_to(channel, k, "laand comm", &commhi).await?;
    }
    let mut commhi_k = vec![vec![]; n];
    for k in (0..n).filter(|k| *k != i) {
        commhi_k[k] = recv_vec_from::<Commitment>(channel, k, "laand comm", l).await?;
    }
    for k in (0..n).filter(|k| *k != i) {
        send_to(channel, k, "laand hash", &hi).await?;
    }
    let mut xor_all_hi = hi;
    for k in (0..n).filter(|k| *k != i) {
        let hi_k: Vec<u128> = recv_vec_from(channel, k, "laand hash", l).await?;
        for (idx, hi_k) in hi_k.into_iter().enumerate() {
            if !open_commitment(&commhi_k[k][idx], &hi_k.to_be_bytes()) {
                return Err(Error::CommitmentCouldNotBeOpened);
            }
            xor_all_hi[idx] ^= hi_k;
        }
    }
    if xor_all_hi.iter().any(|h| *h != 0) {
        return Err(Error::LaAndXorNotZero);
    }

    Ok(zshares)
}

/// The bucket size needed for statistical security `RHO = 40` at a given
/// batch size.
pub(crate) fn bucket_size(batch: usize) -> usize {
    match batch {
        b if b >= 280_000 => 3,
        b if b >= 3_100 => 4,
        _ => 5,
    }
}

/// Generates `l` non-leaky authenticated AND triples (`Pi_aAND`): produces
/// leaky triples in buckets and combines each bucket into a single triple.
pub(crate) async fn and_triples(
    channel: &mut impl Channel,
    delta: Delta,
    cot_send: &mut [Option<CotSender>],
    cot_recv: &mut [Option<CotReceiver>],
    i: usize,
    n: usize,
    l: usize,
    shared_rng: &mut ChaCha20Rng,
) -> Result<Vec<(TinyShare, TinyShare, TinyShare)>, Error> {
    let b = bucket_size(l);
    let lprime = l * b;
    let shares = auth_share(
        channel,
        delta,
        cot_send,
        cot_recv,
        i,
        n,
        3 * lprime,
        shared_rng,
    )
    .await?;
    let (xshares, rest) = shares.split_at(lprime);
    let (yshares, rshares) = rest.split_at(lprime);

    let zshares = leaky_and(
        channel,
        delta,
        (xshares, yshares, rshares),
        i,
        n,
        lprime,
    )
    .await?;

    // randomly partition the leaky triples into l buckets of size b
    let mut buckets: Vec<Vec<(&TinyShare, &TinyShare, &TinyShare)>> = vec![vec![]; l];
    for idx in 0..lprime {
        let mut j = shared_rng.random_range(0..l);
        while buckets[j].len() >= b {
            j = (j + 1) % l;
        }
        buckets[j].push((&xshares[idx], &yshares[idx], &zshares[idx]));
    }

    let d_values = check_dvalues(channel, delta, i, n, &buckets).await?;

    let mut triples = Vec::with_capacity(l);
    for (bucket, d) in buckets.into_iter().zip(d_values) {
        triples.push(combine_bucket(i, n, bucket, d)?);
    }
    Ok(triples)
}

/// Opens and MAC-checks the `d = y_0 ^ y_m` values of every bucket.
async fn check_dvalues(
    channel: &mut impl Channel,
    delta: Delta,
    i: usize,
    n: usize,
    buckets: &[Vec<(&TinyShare, &TinyShare, &TinyShare)>],
) -> Result<Vec<Vec<bool>>, Error> {
    let len = buckets.len();
    let mut d_values: Vec<Vec<bool>> = vec![vec![]; len];
    let mut d_macs: Vec<Vec<Vec<Mac>>> = vec![vec![vec![]; len]; n];

    for (j, bucket) in buckets.iter().enumerate() {
        let (_, y0, _) = &bucket[0];
        for (_, y_next, _) in bucket.iter().skip(1) {
            d_values[j].push(y0.0 ^ y_next.0);
            for k in (0..n).filter(|k| *k != i) {
                d_macs[k][j].push(Mac(y0.mac_for(k)?.0 ^ y_next.mac_for(k)?.0));
            }
        }
    }

    for k in (0..n).filter(|k| *k != i) {
        let payload: Vec<(Vec<bool>, Vec<Mac>)> = (0..len)
            .map(|j| (d_values[j].clone(), d_macs[k][j].clone()))
            .collect();
        send_to(channel, k, "dvalue", &payload).await?;
    }
    for k in (0..n).filter(|k| *k != i) {
        let payload_k: Vec<(Vec<bool>, Vec<Mac>)> =
            recv_vec_from(channel, k, "dvalue", len).await?;
        for (j, dval) in d_values.iter_mut().enumerate() {
            let (d_value_p, d_macs_p) = &payload_k[j];
            let y0key = buckets[j][0].1.key_for(k)?;
            for (m, d) in dval.iter_mut().enumerate() {
                let ykey = buckets[j][m + 1].1.key_for(k)?;
                let expected = y0key.0 ^ ykey.0 ^ (u128::from(d_value_p[m]) * delta.0);
                if d_macs_p[m].0 != expected {
                    return Err(Error::AAndWrongDMac);
                }
                *d ^= d_value_p[m];
            }
        }
    }
    Ok(d_values)
}

/// Combines one bucket of leaky triples into a single non-leaky triple.
fn combine_bucket(
    i: usize,
    n: usize,
    bucket: Vec<(&TinyShare, &TinyShare, &TinyShare)>,
    d_vec: Vec<bool>,
) -> Result<(TinyShare, TinyShare, TinyShare), Error> {
    let mut iter = bucket.into_iter();
    let (x, y, z) = iter.next().ok_or(Error::EmptyBucket)?;
    let mut result = (x.clone(), y.clone(), z.clone());
    for (triple, d) in iter.zip(d_vec) {
        result = combine_two_leaky_ands(i, n, result, triple, d)?;
    }
    Ok(result)
}

/// Combines two leaky ANDs sharing the `y` value into one.
fn combine_two_leaky_ands(
    i: usize,
    n: usize,
    (x1, y1, z1): (TinyShare, TinyShare, TinyShare),
    (x2, _, z2): (&TinyShare, &TinyShare, &TinyShare),
    d: bool,
) -> Result<(TinyShare, TinyShare, TinyShare), Error> {
    let xshare = &x1 ^ x2;

    let zbit = z1.0 ^ z2.0 ^ (d & x2.0);
    let mut zauth = vec![None; n];
    for k in (0..n).filter(|k| *k != i) {
        let (m1, k1) = z1.1.0[k].ok_or(Error::MissingMacKey)?;
        let (m2, k2) = z2.1.0[k].ok_or(Error::MissingMacKey)?;
        let (mx, kx) = x2.1.0[k].ok_or(Error::MissingMacKey)?;
        zauth[k] = Some((
            Mac(m1.0 ^ m2.0 ^ (u128::from(d) * mx.0)),
            Key(k1.0 ^ k2.0 ^ (u128::from(d) * kx.0)),
        ));
    }
    Ok((xshare, y1, TinyShare(zbit, TinyAuth(zauth))))
}

/// Verifies opened XOR-shared bits against their TinyOT MACs: every party
/// reveals its share bits and the MACs towards each peer; the MACs must
/// match the locally held keys and the XOR of all shares must equal the
/// claimed opened bits.
pub(crate) async fn check_opened(
    channel: &mut impl Channel,
    delta: Delta,
    i: usize,
    n: usize,
    opened: &[bool],
    shares: &[TinyShare],
) -> Result<(), Error> {
    let len = shares.len();
    for k in (0..n).filter(|k| *k != i) {
        let payload: Vec<(bool, Mac)> = shares
            .iter()
            .map(|s| Ok((s.0, s.mac_for(k)?)))
            .collect::<Result<_, Error>>()?;
        send_to(channel, k, "tiny check", &payload).await?;
    }
    let mut xor_bits: Vec<bool> = shares.iter().map(|s| s.0).collect();
    for k in (0..n).filter(|k| *k != i) {
        let payload_k: Vec<(bool, Mac)> = recv_vec_from(channel, k, "tiny check", len).await?;
        for (idx, (bit, mac)) in payload_k.into_iter().enumerate() {
            let key = shares[idx].key_for(k)?;
            if mac.0 != key.0 ^ (u128::from(bit) * delta.0) {
                return Err(Error::OpenedBitWrongMac);
            }
            xor_bits[idx] ^= bit;
        }
    }
    if xor_bits != opened {
        return Err(Error::OpenedBitMismatch);
    }
    Ok(())
}
