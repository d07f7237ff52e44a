//! Actively-secure generator for MAC-authenticated correlated randomness:
//! authenticated values, AND triples, multiplication triples, dot-product
//! triples, random bits and truncation pairs, in the SPDZ2k/TinyOT style.
//!
//! Every party holds an additive share of a secret global MAC key; a value
//! `x` (itself additively shared) is authenticated by MAC shares `m` with
//! `sum(m) = sum(x) * sum(key)`. Pairwise VOLE correlations produce the MAC
//! cross terms, and every protocol ends in a batched
//! random-linear-combination check whose commitment-protected sum must come
//! out to exactly zero. Any nonzero check is active cheating (or
//! corruption) and aborts the session; there is no retry path.

use rand::{Rng, SeedableRng, random};
use rand_chacha::ChaCha20Rng;
use tracing::debug;

use crate::{
    channel::{self, Channel, recv_vec_from, send_to},
    commit::{self, commit_and_open, shared_seed},
    dealer::{self, Dealer},
    ot::{self, CotReceiver, CotSender},
    ring::{self, Ring},
    tinyot::{self, Delta, TinyShare, and_triples, auth_bits, check_opened},
};

/// The number of extra TinyOT check bits sampled by [`Beaver::auth_and`].
const SIGMA: usize = 64;

/// An additively shared triple `(a, b, c)` with `c = a * b`.
pub type Triple<R> = (Vec<R>, Vec<R>, Vec<R>);

/// A triple together with the MAC shares of its three components.
pub type TriplePair<R> = (Triple<R>, Triple<R>);

/// A pair of values (e.g. a random value and its truncation) with MACs.
pub type PairPair<R> = ((Vec<R>, Vec<R>), (Vec<R>, Vec<R>));

/// Errors occurring in the authenticated Beaver generator. The
/// check-failure variants are session-fatal: the whole MPC session must be
/// torn down and restarted.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A message could not be sent or received.
    #[error(transparent)]
    Channel(#[from] channel::Error),
    /// A commitment exchange failed.
    #[error(transparent)]
    Commit(#[from] commit::Error),
    /// An OT primitive failed.
    #[error(transparent)]
    Ot(#[from] ot::Error),
    /// A TinyOT subprotocol failed.
    #[error(transparent)]
    TinyOt(#[from] tinyot::Error),
    /// The correlation dealer failed.
    #[error(transparent)]
    Dealer(#[from] dealer::Error),
    /// The SPDZ key was not initialized before authentication.
    #[error("init_spdz_key must be called before authenticating values")]
    KeyNotInitialized,
    /// The precision parameters do not fill the ring: `max(k+s, 2s)` must
    /// reach the full ring width.
    #[error("unsupported precision: k={k}, s={s} over a {bits}-bit ring")]
    UnsupportedPrecision {
        /// Value precision.
        k: usize,
        /// Statistical security parameter.
        s: usize,
        /// Ring width.
        bits: usize,
    },
    /// The consistency check of value authentication found a nonzero sum.
    #[error("authentication consistency check failed, aborting session")]
    AuthCheckFailed,
    /// The batched MAC check found a nonzero sum.
    #[error("batch MAC check failed, aborting session")]
    MacCheckFailed,
    /// A sacrificed triple did not cancel to zero.
    #[error("triple sacrifice check failed, aborting session")]
    SacrificeFailed,
    /// An opened square was not an odd quadratic residue.
    #[error("opened value is not a quadratic residue, aborting session")]
    NotQuadraticResidue,
}

/// The authenticated-Beaver-triple generator.
///
/// Construction ([`Beaver::setup`]) establishes the pairwise OT-extension
/// correlations (fixing the TinyOT key as the extension delta), tosses the
/// shared public coin and gathers the dealer seeds at rank 0. The SPDZ
/// global MAC key share is generated separately by [`Beaver::init_spdz_key`]
/// and stays fixed (and secret) for the generator's lifetime.
pub struct Beaver<R: Ring> {
    i: usize,
    n: usize,
    tinyot_delta: Delta,
    cot_send: Vec<Option<CotSender>>,
    cot_recv: Vec<Option<CotReceiver>>,
    spdz_key: Option<R>,
    shared_rng: ChaCha20Rng,
    priv_rng: ChaCha20Rng,
    dealer: Dealer,
}

impl<R: Ring> Beaver<R> {
    /// Establishes the base-OT correlations with every peer, the shared
    /// public randomness and the dealer seed gather.
    pub async fn setup(channel: &mut impl Channel, i: usize, n: usize) -> Result<Self, Error> {
        debug!(i, n, "setting up beaver generator");
        let shared_rng = ChaCha20Rng::from_seed(shared_seed(channel, i, n).await?);
        let delta: u128 = random();
        let mut rng = ChaCha20Rng::from_seed(random());
        let mut cot_send: Vec<Option<CotSender>> = (0..n).map(|_| None).collect();
        let mut cot_recv: Vec<Option<CotReceiver>> = (0..n).map(|_| None).collect();
        for a in 0..n {
            for b in (0..n).filter(|b| *b != a) {
                if a == i {
                    cot_send[b] = Some(CotSender::setup(channel, &mut rng, b, delta).await?);
                }
                if b == i {
                    cot_recv[a] = Some(CotReceiver::setup(channel, &mut rng, a).await?);
                }
            }
        }
        let dealer = Dealer::setup(channel, i, n).await?;
        Ok(Self {
            i,
            n,
            tinyot_delta: Delta(delta),
            cot_send,
            cot_recv,
            spdz_key: None,
            shared_rng,
            priv_rng: ChaCha20Rng::from_seed(random()),
            dealer,
        })
    }

    /// Generates this party's share of the global SPDZ MAC key, truncated
    /// to `s` bits. The key share is returned for inspection in tests but
    /// never leaves the party.
    pub fn init_spdz_key(&mut self, s: usize) -> R {
        let key = ring::mask_low_el(R::from_u128(random::<u128>()), s);
        self.spdz_key = Some(key);
        key
    }

    fn key(&self) -> Result<R, Error> {
        self.spdz_key.ok_or(Error::KeyNotInitialized)
    }

    /// Deals a permutation correlation, see [`Dealer::perm_pair`].
    pub async fn perm_pair(
        &mut self,
        channel: &mut impl Channel,
        numel: usize,
        owner: usize,
        pv: Option<&[usize]>,
    ) -> Result<(Vec<R>, Vec<R>), Error> {
        Ok(self.dealer.perm_pair(channel, numel, owner, pv).await?)
    }

    /// Authenticates an additively shared value array: returns this party's
    /// MAC share over an effective width `max(k+s, 2s)` clamped to the ring
    /// width (which it must reach, i.e. the ring is expected to be sized as
    /// `k + s`).
    ///
    /// One random masking element is appended to the batch, pairwise VOLE
    /// produces the MAC cross terms, and a public-random-linear-combination
    /// consistency check (commit-then-open, sum must be zero) protects
    /// against inconsistent inputs.
    pub async fn auth_array(
        &mut self,
        channel: &mut impl Channel,
        x: &[R],
        k: usize,
        s: usize,
    ) -> Result<Vec<R>, Error> {
        debug!(numel = x.len(), k, s, "auth_array start");
        let key = self.key()?;
        let l_eff = (k + s).max(2 * s).min(R::BITS);
        if l_eff < R::BITS {
            return Err(Error::UnsupportedPrecision {
                k,
                s,
                bits: R::BITS,
            });
        }

        // one extra random element anchors the consistency check
        let t = x.len();
        let mut x_hat = x.to_vec();
        x_hat.push(R::random(&mut self.priv_rng));
        let numel = t + 1;

        let alpha = vec![key; numel];
        let mut a = Vec::new();
        let mut b = Vec::new();
        for ii in 0..self.n {
            for j in (0..self.n).filter(|j| *j != ii) {
                if ii == self.i {
                    let receiver = self.cot_recv[j].as_mut().expect("peer state exists");
                    a.push(receiver.vole_recv::<R>(channel, j, &alpha).await?);
                }
                if j == self.i {
                    let sender = self.cot_send[ii].as_mut().expect("peer state exists");
                    b.push(sender.vole_send::<R>(channel, ii, &x_hat).await?);
                }
            }
        }

        // MAC share: own key contribution plus all VOLE cross terms
        let mut m = ring::mul_scalar(&x_hat, key);
        for (a, b) in a.iter().zip(&b) {
            ring::add_assign(&mut m, &ring::sub_vec(a, b));
        }

        // consistency check with public coefficients (the mask element gets
        // coefficient one)
        let mut rv = self.pub_rand(t);
        rv.push(R::ONE);
        let mut x_angle = R::ZERO;
        let mut m_angle = R::ZERO;
        for idx in 0..numel {
            x_angle = x_angle.add(rv[idx].mul(x_hat[idx]));
            m_angle = m_angle.add(rv[idx].mul(m[idx]));
        }
        let x_angle_sum = self.all_reduce_sum(channel, &[x_angle]).await?[0];

        let z = m_angle.sub(x_angle_sum.mul(key));
        let opened =
            commit_and_open(channel, self.i, self.n, z.to_u128().to_le_bytes().to_vec()).await?;
        let mut plain_z = R::ZERO;
        for bytes in opened {
            let v: [u8; 16] = bytes.try_into().map_err(|_| Error::AuthCheckFailed)?;
            plain_z = plain_z.add(R::from_u128(u128::from_le_bytes(v)));
        }
        if plain_z != R::ZERO {
            return Err(Error::AuthCheckFailed);
        }

        m.truncate(t);
        debug!("auth_array end");
        Ok(m)
    }

    /// Samples fresh authenticated random values.
    pub async fn auth_coin_tossing(
        &mut self,
        channel: &mut impl Channel,
        numel: usize,
        k: usize,
        s: usize,
    ) -> Result<(Vec<R>, Vec<R>), Error> {
        let rand = ring::rand_vec::<R>(&mut self.priv_rng, numel);
        let mac = self.auth_array(channel, &rand, k, s).await?;
        Ok((rand, mac))
    }

    /// Opens an authenticated batch, revealing only the low `k` bits: the
    /// value is masked with a freshly authenticated random value shifted
    /// into the high bits before the all-reduce.
    ///
    /// Returns `(opened, mac)` where `mac` authenticates the masked value;
    /// the opened batch must still pass [`Beaver::batch_mac_check`].
    pub async fn batch_open(
        &mut self,
        channel: &mut impl Channel,
        value: &[R],
        mac: &[R],
        k: usize,
        s: usize,
    ) -> Result<(Vec<R>, Vec<R>), Error> {
        debug_assert_eq!(value.len(), mac.len());
        let (r_val, r_mac) = self.auth_coin_tossing(channel, value.len(), k, s).await?;
        let masked_val = ring::add_vec(value, &ring::lshift_vec(&r_val, k));
        let masked_mac = ring::add_vec(mac, &ring::lshift_vec(&r_mac, k));
        let open_val = self.all_reduce_sum(channel, &masked_val).await?;
        Ok((open_val, masked_mac))
    }

    /// Verifies a batch of opened values against their MAC shares with one
    /// random linear combination: `sum over parties of (mac - value * key)`
    /// must be exactly zero over `k + s` bits.
    pub async fn batch_mac_check(
        &mut self,
        channel: &mut impl Channel,
        open_value: &[R],
        mac: &[R],
        k: usize,
        s: usize,
    ) -> Result<(), Error> {
        debug_assert_eq!(open_value.len(), mac.len());
        debug!(numel = open_value.len(), "batch mac check start");
        let key = self.key()?;
        let mac_bits = k + s;

        let coef = ring::mask_low(&self.pub_coin(channel, open_value.len()).await?, s);
        let mut check_value = R::ZERO;
        let mut check_mac = R::ZERO;
        for idx in 0..open_value.len() {
            check_value = check_value.add(coef[idx].mul(open_value[idx]));
            check_mac = check_mac.add(coef[idx].mul(mac[idx]));
        }
        let local = check_mac.sub(check_value.mul(key));

        let opened = commit_and_open(
            channel,
            self.i,
            self.n,
            local.to_u128().to_le_bytes().to_vec(),
        )
        .await?;
        let mut sum = R::ZERO;
        for bytes in opened {
            let v: [u8; 16] = bytes.try_into().map_err(|_| Error::MacCheckFailed)?;
            sum = sum.add(R::from_u128(u128::from_le_bytes(v)));
        }
        if ring::mask_low_el(sum, mac_bits) != R::ZERO {
            return Err(Error::MacCheckFailed);
        }
        debug!("batch mac check end");
        Ok(())
    }

    /// Converts TinyOT AND triples into SPDZ2k-authenticated bit triples.
    ///
    /// The binary shares are re-encoded into ring MAC shares with one
    /// random-OT pass per ordered pair; `SIGMA` extra random bits are
    /// sampled and checked under *both* MAC schemes (the TinyOT check and
    /// the SPDZ batch MAC check) before the triples are released.
    pub async fn auth_and(
        &mut self,
        channel: &mut impl Channel,
        num: usize,
        s: usize,
    ) -> Result<TriplePair<R>, Error> {
        debug!(num, s, "auth_and start");
        let key = self.key()?;
        let delta = self.tinyot_delta;

        let triples = and_triples(
            channel,
            delta,
            &mut self.cot_send,
            &mut self.cot_recv,
            self.i,
            self.n,
            num,
            &mut self.shared_rng,
        )
        .await?;
        let check_bits = auth_bits(
            channel,
            delta,
            &mut self.cot_send,
            &mut self.cot_recv,
            self.i,
            self.n,
            SIGMA,
            &mut self.shared_rng,
        )
        .await?;

        // concatenate a | b | c | r for a single re-encoding pass
        let mut tiny: Vec<TinyShare> = Vec::with_capacity(3 * num + SIGMA);
        tiny.extend(triples.iter().map(|(a, _, _)| a.clone()));
        tiny.extend(triples.iter().map(|(_, b, _)| b.clone()));
        tiny.extend(triples.iter().map(|(_, _, c)| c.clone()));
        tiny.extend(check_bits);
        let total = 3 * num + SIGMA;

        let choices_bool: Vec<bool> = tiny.iter().map(|t| t.0).collect();
        let choices: Vec<R> = choices_bool.iter().map(|&b| R::from_bool(b)).collect();
        let ext_key = vec![key; total];

        // re-encode the binary shares under the ring MAC key
        let mut spdz_mac = ring::zeros::<R>(total);
        for ii in 0..self.n {
            for j in (0..self.n).filter(|j| *j != ii) {
                if ii == self.i {
                    let receiver = self.cot_recv[j].as_mut().expect("peer state exists");
                    let t_s = receiver.rot_recv::<R>(channel, j, &choices_bool).await?;
                    let d: Vec<R> = recv_vec_from(channel, j, "auth_and d", total).await?;
                    for idx in 0..total {
                        spdz_mac[idx] =
                            spdz_mac[idx].add(t_s[idx]).add(choices[idx].mul(d[idx]));
                    }
                }
                if j == self.i {
                    let sender = self.cot_send[ii].as_mut().expect("peer state exists");
                    let (m0, m1) = sender.rot_send::<R>(channel, ii, total).await?;
                    let d: Vec<R> = (0..total)
                        .map(|idx| m0[idx].sub(m1[idx]).add(ext_key[idx]))
                        .collect();
                    send_to(channel, ii, "auth_and d", &d).await?;
                    for idx in 0..total {
                        spdz_mac[idx] = spdz_mac[idx].sub(m0[idx]);
                    }
                }
            }
        }
        for idx in 0..total {
            spdz_mac[idx] = spdz_mac[idx].add(choices[idx].mul(ext_key[idx]));
        }

        // SIGMA random linear combinations over both MAC schemes
        let mut check_tiny: Vec<TinyShare> = tiny[3 * num..].to_vec();
        let mut check_bit: Vec<R> = choices[3 * num..].to_vec();
        let mut check_mac: Vec<R> = spdz_mac[3 * num..].to_vec();
        let mut comb_rng = ChaCha20Rng::from_seed(shared_seed(channel, self.i, self.n).await?);
        for j in 0..3 * num {
            let mut coef: u64 = comb_rng.random();
            for idx in 0..SIGMA {
                if coef & 1 == 1 {
                    check_tiny[idx] = &check_tiny[idx] ^ &tiny[j];
                    check_bit[idx] = check_bit[idx].add(choices[j]);
                    check_mac[idx] = check_mac[idx].add(spdz_mac[j]);
                }
                coef >>= 1;
            }
        }

        // open the check bits and verify under both MAC schemes
        let (open_bit, zero_mac) = self.batch_open(channel, &check_bit, &check_mac, 1, s).await?;
        let opened_bools: Vec<bool> = open_bit.iter().map(|v| v.lsb()).collect();
        check_opened(channel, delta, self.i, self.n, &opened_bools, &check_tiny).await?;
        self.batch_mac_check(channel, &open_bit, &zero_mac, s, s).await?;

        let slice = |offset: usize, src: &[R]| src[offset * num..(offset + 1) * num].to_vec();
        let values = (slice(0, &choices), slice(1, &choices), slice(2, &choices));
        let macs = (slice(0, &spdz_mac), slice(1, &spdz_mac), slice(2, &spdz_mac));
        debug!("auth_and end");
        Ok((values, macs))
    }

    /// Generates authenticated multiplication triples with the SPDZ2k
    /// redundancy-and-sacrifice procedure: `tao = 4s + 2k` random bit
    /// triples per output element are combined under public challenges, the
    /// combined triples (and auxiliary copies) are authenticated, and a
    /// sacrifice check binds them together.
    pub async fn auth_mul(
        &mut self,
        channel: &mut impl Channel,
        size: usize,
        k: usize,
        s: usize,
    ) -> Result<TriplePair<R>, Error> {
        debug!(size, k, s, "auth_mul start");
        let tao = 4 * s + 2 * k;
        let expand = tao * size;

        let a = ring::rand_bits::<R>(&mut self.priv_rng, expand);
        let a_bool: Vec<bool> = a.iter().map(|a| a.lsb()).collect();
        let b = ring::rand_vec::<R>(&mut self.priv_rng, size);
        let b_arr: Vec<R> = (0..expand).map(|idx| b[idx / tao]).collect();

        // pairwise random OT: cross terms a_i * b_j
        let mut cij = ring::zeros::<R>(expand);
        let mut cji = ring::zeros::<R>(expand);
        for ii in 0..self.n {
            for j in (0..self.n).filter(|j| *j != ii) {
                if ii == self.i {
                    let receiver = self.cot_recv[j].as_mut().expect("peer state exists");
                    let t_s = receiver.rot_recv::<R>(channel, j, &a_bool).await?;
                    let d: Vec<R> = recv_vec_from(channel, j, "auth_mul d", expand).await?;
                    for idx in 0..expand {
                        cij[idx] = cij[idx].add(t_s[idx]).add(a[idx].mul(d[idx]));
                    }
                }
                if j == self.i {
                    let sender = self.cot_send[ii].as_mut().expect("peer state exists");
                    let (q0, q1) = sender.rot_send::<R>(channel, ii, expand).await?;
                    let d: Vec<R> = (0..expand)
                        .map(|idx| q0[idx].sub(q1[idx]).add(b_arr[idx]))
                        .collect();
                    send_to(channel, ii, "auth_mul d", &d).await?;
                    for idx in 0..expand {
                        cji[idx] = cji[idx].sub(q0[idx]);
                    }
                }
            }
        }
        let mut c = ring::mul_vec(&a, &b_arr);
        ring::add_assign(&mut c, &cij);
        ring::add_assign(&mut c, &cji);

        // combine the redundant bit triples under public challenges
        let r = self.pub_rand(expand);
        let r_hat = self.pub_rand(expand);
        let mut cra = ring::zeros::<R>(size);
        let mut cra_hat = ring::zeros::<R>(size);
        let mut crc = ring::zeros::<R>(size);
        let mut crc_hat = ring::zeros::<R>(size);
        for idx in 0..expand {
            let out = idx / tao;
            cra[out] = cra[out].add(r[idx].mul(a[idx]));
            cra_hat[out] = cra_hat[out].add(r_hat[idx].mul(a[idx]));
            crc[out] = crc[out].add(r[idx].mul(c[idx]));
            crc_hat[out] = crc_hat[out].add(r_hat[idx].mul(c[idx]));
        }

        // authenticate the primary triple and the auxiliary copy
        let a_mac = self.auth_array(channel, &cra, k, s).await?;
        let b_mac = self.auth_array(channel, &b, k, s).await?;
        let c_mac = self.auth_array(channel, &crc, k, s).await?;
        let a_hat_mac = self.auth_array(channel, &cra_hat, k, s).await?;
        let c_hat_mac = self.auth_array(channel, &crc_hat, k, s).await?;

        // sacrifice: rou = t*a - a_hat is opened, delta = t*c - c_hat - b*rou
        // must cancel to zero
        let t = self.pub_rand(size);
        let rou = ring::sub_vec(&ring::mul_vec(&t, &cra), &cra_hat);
        let rou_mac = ring::sub_vec(&ring::mul_vec(&t, &a_mac), &a_hat_mac);
        let (pub_rou, check_rou_mac) = self.batch_open(channel, &rou, &rou_mac, k, s).await?;
        self.batch_mac_check(channel, &pub_rou, &check_rou_mac, k, s).await?;

        let t_delta = ring::sub_vec(&ring::mul_vec(&t, &crc), &crc_hat);
        let delta = ring::sub_vec(&t_delta, &ring::mul_vec(&b, &pub_rou));
        let t_delta_mac = ring::sub_vec(&ring::mul_vec(&t, &c_mac), &c_hat_mac);
        let delta_mac = ring::sub_vec(&t_delta_mac, &ring::mul_vec(&b_mac, &pub_rou));
        let (pub_delta, check_delta_mac) =
            self.batch_open(channel, &delta, &delta_mac, k, s).await?;
        self.batch_mac_check(channel, &pub_delta, &check_delta_mac, k, s).await?;
        if ring::mask_low(&pub_delta, k).iter().any(|d| *d != R::ZERO) {
            return Err(Error::SacrificeFailed);
        }

        debug!("auth_mul end");
        Ok(((cra, b, crc), (a_mac, b_mac, c_mac)))
    }

    /// Generates raw (unauthenticated) dot-product triples
    /// `c = a (m x k) * b (k x n)` via pairwise matrix VOLE.
    async fn mul_matrix_raw(
        &mut self,
        channel: &mut impl Channel,
        m: usize,
        n: usize,
        k_dim: usize,
        k: usize,
    ) -> Result<Triple<R>, Error> {
        let a = ring::mask_low(&ring::rand_vec::<R>(&mut self.priv_rng, m * k_dim), k);
        let b = ring::mask_low(&ring::rand_vec::<R>(&mut self.priv_rng, k_dim * n), k);
        let mut c = ring::mat_mul(&a, &b, m, n, k_dim);

        for ii in 0..self.n {
            for j in (0..self.n).filter(|j| *j != ii) {
                if ii == self.i {
                    let receiver = self.cot_recv[j].as_mut().expect("peer state exists");
                    let w = receiver.vole_recv_dot::<R>(channel, j, &b, m, n, k_dim).await?;
                    ring::add_assign(&mut c, &w);
                }
                if j == self.i {
                    let sender = self.cot_send[ii].as_mut().expect("peer state exists");
                    let v = sender.vole_send_dot::<R>(channel, ii, &a, m, n, k_dim).await?;
                    ring::add_assign(&mut c, &ring::neg_vec(&v));
                }
            }
        }
        Ok((a, b, c))
    }

    /// Generates an authenticated dot-product triple at matrix granularity:
    /// the batch is doubled for an auxiliary copy and the sacrifice uses
    /// matrix products instead of elementwise ones.
    pub async fn auth_dot(
        &mut self,
        channel: &mut impl Channel,
        m: usize,
        n: usize,
        k_dim: usize,
        k: usize,
        s: usize,
    ) -> Result<TriplePair<R>, Error> {
        debug!(m, n, k_dim, "auth_dot start");
        let (a_ext, b, c_ext) = self.mul_matrix_raw(channel, 2 * m, n, k_dim, k).await?;

        let a_ext_mac = self.auth_array(channel, &a_ext, k, s).await?;
        let b_mac = self.auth_array(channel, &b, k, s).await?;
        let c_ext_mac = self.auth_array(channel, &c_ext, k, s).await?;

        let a = a_ext[..m * k_dim].to_vec();
        let a_mac = a_ext_mac[..m * k_dim].to_vec();
        let c = c_ext[..m * n].to_vec();
        let c_mac = c_ext_mac[..m * n].to_vec();
        let a2 = &a_ext[m * k_dim..];
        let a2_mac = &a_ext_mac[m * k_dim..];
        let c2 = &c_ext[m * n..];
        let c2_mac = &c_ext_mac[m * n..];

        let t = self.pub_rand(m * m);
        let rou = ring::sub_vec(&ring::mat_mul(&t, &a, m, k_dim, m), a2);
        let rou_mac = ring::sub_vec(&ring::mat_mul(&t, &a_mac, m, k_dim, m), a2_mac);
        let (pub_rou, check_rou_mac) = self.batch_open(channel, &rou, &rou_mac, k, s).await?;
        self.batch_mac_check(channel, &pub_rou, &check_rou_mac, k, s).await?;

        let t_delta = ring::sub_vec(&ring::mat_mul(&t, &c, m, n, m), c2);
        let delta = ring::sub_vec(&t_delta, &ring::mat_mul(&pub_rou, &b, m, n, k_dim));
        let t_delta_mac = ring::sub_vec(&ring::mat_mul(&t, &c_mac, m, n, m), c2_mac);
        let delta_mac = ring::sub_vec(&t_delta_mac, &ring::mat_mul(&pub_rou, &b_mac, m, n, k_dim));
        let (pub_delta, check_delta_mac) =
            self.batch_open(channel, &delta, &delta_mac, k, s).await?;
        self.batch_mac_check(channel, &pub_delta, &check_delta_mac, k, s).await?;
        if ring::mask_low(&pub_delta, k).iter().any(|d| *d != R::ZERO) {
            return Err(Error::SacrificeFailed);
        }

        debug!("auth_dot end");
        Ok(((a, b, c), (a_mac, b_mac, c_mac)))
    }

    /// Generates authenticated uniformly random bits via the square-root
    /// protocol: an authenticated odd value is squared (one authenticated
    /// multiplication), the square is opened and checked to be a quadratic
    /// residue, and the bit is derived from `y / sqrt(y^2)`.
    pub async fn auth_rand_bit(
        &mut self,
        channel: &mut impl Channel,
        size: usize,
        k: usize,
        s: usize,
    ) -> Result<(Vec<R>, Vec<R>), Error> {
        debug!(size, k, s, "auth_rand_bit start");
        let key = self.key()?;
        let u = ring::mask_low(&ring::rand_vec::<R>(&mut self.priv_rng, size), k + 2);
        let u_mac = self.auth_array(channel, &u, k + 2, s).await?;

        // y = 2u + 1, forced odd by the rank-0 correction
        let two = R::ONE.add(R::ONE);
        let mut y = ring::mul_scalar(&u, two);
        let mut y_mac = ring::mul_scalar(&u_mac, two);
        if self.i == 0 {
            for y in y.iter_mut() {
                *y = y.add(R::ONE);
            }
        }
        for m in y_mac.iter_mut() {
            *m = m.add(key);
        }

        let ((a, b, c), (a_mac, b_mac, c_mac)) = self.auth_mul(channel, size, k, s).await?;

        let e = ring::sub_vec(&y, &a);
        let e_mac = ring::sub_vec(&y_mac, &a_mac);
        let f = ring::sub_vec(&y, &b);
        let f_mac = ring::sub_vec(&y_mac, &b_mac);

        let (p_e, pe_mac) = self.batch_open(channel, &e, &e_mac, k + 2, s).await?;
        let (p_f, pf_mac) = self.batch_open(channel, &f, &f_mac, k + 2, s).await?;
        self.batch_mac_check(channel, &p_e, &pe_mac, k, s).await?;
        self.batch_mac_check(channel, &p_f, &pf_mac, k, s).await?;

        let p_e = ring::mask_low(&p_e, k + 2);
        let p_f = ring::mask_low(&p_f, k + 2);
        let p_ef = ring::mul_vec(&p_e, &p_f);

        // z = y^2 via the Beaver relation
        let mut z = ring::add_vec(&ring::mul_vec(&p_e, &b), &ring::mul_vec(&p_f, &a));
        ring::add_assign(&mut z, &c);
        if self.i == 0 {
            ring::add_assign(&mut z, &p_ef);
        }
        let mut z_mac = ring::add_vec(&ring::mul_vec(&p_e, &b_mac), &ring::mul_vec(&p_f, &a_mac));
        ring::add_assign(&mut z_mac, &c_mac);
        ring::add_assign(&mut z_mac, &ring::mul_scalar(&p_ef, key));

        let (square, zero_mac) = self.batch_open(channel, &z, &z_mac, k + 2, s).await?;
        self.batch_mac_check(channel, &square, &zero_mac, k, s).await?;
        let square = ring::mask_low(&square, k + 2);
        if square.iter().any(|sq| !sq.lsb()) {
            return Err(Error::NotQuadraticResidue);
        }

        let mut d = u;
        let mut d_mac = u_mac;
        for idx in 0..size {
            let sq = square[idx].to_u128();
            if sq & 7 != 1 {
                return Err(Error::NotQuadraticResidue);
            }
            let root = sqrt_2k(sq, k + 2);
            let root_inv = invert_2k(root, k + 2);
            let rid2 = R::from_u128(root_inv >> 1);
            d[idx] = d[idx].add(rid2.mul(y[idx]));
            d_mac[idx] = d_mac[idx].add(rid2.mul(y_mac[idx]));
            if self.i == 0 {
                d[idx] = d[idx].add(R::ONE);
            }
            d_mac[idx] = d_mac[idx].add(key);
        }
        debug!("auth_rand_bit end");
        Ok((d, d_mac))
    }

    /// Derives a truncation correction pair from `k` authenticated random
    /// bits per element: `r` is the bit composition, `tr` the composition
    /// logically shifted right by `bits` with the top bit replicated
    /// (arithmetic-shift emulation over shares).
    pub async fn auth_trunc(
        &mut self,
        channel: &mut impl Channel,
        size: usize,
        bits: usize,
        k: usize,
        s: usize,
    ) -> Result<PairPair<R>, Error> {
        let nbits = k;
        let (b_val, b_mac) = self.auth_rand_bit(channel, nbits * size, k, s).await?;

        let mut r_val = ring::zeros::<R>(size);
        let mut r_mac = ring::zeros::<R>(size);
        let mut tr_val = ring::zeros::<R>(size);
        let mut tr_mac = ring::zeros::<R>(size);
        for idx in 0..size {
            for bit in 0..nbits {
                let flat = idx * nbits + bit;
                r_val[idx] = r_val[idx].add(b_val[flat].shl(bit));
                r_mac[idx] = r_mac[idx].add(b_mac[flat].shl(bit));
            }
            for bit in 0..nbits.saturating_sub(bits) {
                let flat = idx * nbits + bits + bit;
                tr_val[idx] = tr_val[idx].add(b_val[flat].shl(bit));
                tr_mac[idx] = tr_mac[idx].add(b_mac[flat].shl(bit));
            }
            // replicate the top bit to emulate an arithmetic shift
            let top = idx * nbits + nbits - 1;
            for bit in nbits - bits..nbits {
                tr_val[idx] = tr_val[idx].add(b_val[top].shl(bit));
                tr_mac[idx] = tr_mac[idx].add(b_mac[top].shl(bit));
            }
        }
        Ok(((r_val, tr_val), (r_mac, tr_mac)))
    }

    /// Public random ring elements from the synchronized public stream.
    fn pub_rand(&mut self, numel: usize) -> Vec<R> {
        (0..numel).map(|_| R::random(&mut self.shared_rng)).collect()
    }

    /// Fresh public coins: a new commit-and-open coin toss per call, so the
    /// coins are independent of everything already committed.
    async fn pub_coin(
        &mut self,
        channel: &mut impl Channel,
        numel: usize,
    ) -> Result<Vec<R>, Error> {
        let seed = shared_seed(channel, self.i, self.n).await?;
        let mut rng = ChaCha20Rng::from_seed(seed);
        Ok((0..numel).map(|_| R::random(&mut rng)).collect())
    }

    /// Everyone-to-everyone sum of an additively shared buffer.
    async fn all_reduce_sum(
        &self,
        channel: &mut impl Channel,
        v: &[R],
    ) -> Result<Vec<R>, Error> {
        for kk in (0..self.n).filter(|kk| *kk != self.i) {
            send_to(channel, kk, "all reduce", v).await?;
        }
        let mut out = v.to_vec();
        for kk in (0..self.n).filter(|kk| *kk != self.i) {
            let share: Vec<R> = recv_vec_from(channel, kk, "all reduce", v.len()).await?;
            ring::add_assign(&mut out, &share);
        }
        Ok(out)
    }
}

/// The smallest square root of a residue `= 1 mod 8` in `Z_2^bits`, via the
/// classic bit-by-bit lifting recurrence; the minimum over the four roots
/// `{x, -x, x + 2^(bits-1), -x + 2^(bits-1)}` makes the choice canonical so
/// that all parties derive the same root from the same opened square.
fn sqrt_2k(residue: u128, bits: usize) -> u128 {
    debug_assert_eq!(residue & 7, 1);
    let n = residue;
    let mut x: u128 = 1;
    while x < 8 && (n & 31) != ((x * x) & 31) {
        x += 2;
    }
    let mut t = n.wrapping_sub(x * x) >> 5;
    for idx in 4..bits {
        if t & 1 == 1 {
            x |= 1 << idx;
            t = t.wrapping_sub(x - (1 << (idx - 1)));
        }
        t >>= 1;
    }
    let half_mod = 1u128 << (bits - 1);
    let mask = half_mod + (half_mod - 1);
    [
        x & mask,
        x.wrapping_add(half_mod) & mask,
        x.wrapping_neg() & mask,
        x.wrapping_neg().wrapping_add(half_mod) & mask,
    ]
    .into_iter()
    .min()
    .expect("non-empty")
}

/// The odd `ret` with all bits of `value * ret` set over `Z_2^bits` (i.e.
/// `value * ret = -1`), found one bit at a time; together with [`sqrt_2k`]
/// this picks a canonical inverse root shared by all parties.
fn invert_2k(value: u128, bits: usize) -> u128 {
    debug_assert_eq!(value & 1, 1);
    let mut ret: u128 = 1;
    for idx in 0..bits {
        if (value.wrapping_mul(ret) >> idx) & 1 == 0 {
            ret += 1 << idx;
        }
    }
    ret
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqrt_2k_finds_smallest_root() {
        let bits = 34;
        let mask = (1u128 << bits) - 1;
        for odd in [1u128, 3, 5, 12345, 987654321] {
            let square = odd.wrapping_mul(odd) & mask;
            assert_eq!(square & 7, 1);
            let root = sqrt_2k(square, bits);
            assert_eq!(root.wrapping_mul(root) & mask, square);
            let half = 1u128 << (bits - 1);
            for other in [
                root.wrapping_neg() & mask,
                root.wrapping_add(half) & mask,
                root.wrapping_neg().wrapping_add(half) & mask,
            ] {
                assert!(root <= other);
            }
        }
    }

    #[test]
    fn invert_2k_yields_negated_inverse() {
        let bits = 34;
        let mask = (1u128 << bits) - 1;
        for odd in [1u128, 3, 17, 54321] {
            let inv = invert_2k(odd, bits);
            assert_eq!(odd.wrapping_mul(inv) & mask, mask, "value * ret = -1");
        }
    }
}
