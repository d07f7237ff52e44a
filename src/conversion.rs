//! Conversions between arithmetic and boolean replicated shares.
//!
//! * [`a2b`]: arithmetic to boolean, one rotate plus a parallel-prefix adder.
//! * [`b2a`]: boolean to arithmetic, choosing between an OT-based protocol
//!   (cheap for narrow shares) and a PPA-based one (cheap for wide shares).
//! * [`msb_a2b`]: extracts only the most significant bit, using a carry
//!   computation instead of a full adder.
//! * [`cast_a`] / [`cast_b`]: ring-width casts; widening arithmetic casts
//!   are a 2-round protocol with a wrap correction, narrowing casts are a
//!   local truncation.
//!
//! All protocols here are 3-party. Where a protocol assigns asymmetric
//! roles, the assignment is derived from a public pivot so that no physical
//! rank statically plays a sensitive role.

use crate::{
    bits::{bit_compose, bit_decompose},
    boolean::{self, PARTIES, add_bb, carry_out, rshift_b, xor_bb},
    channel::{self, Channel, recv_vec_from, rotate, send_to},
    prg::PrgState,
    ring::{self, Ring},
    share::{AShare, BShare},
};

/// Errors occurring during share conversion.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A message could not be sent or received.
    #[error(transparent)]
    Channel(#[from] channel::Error),
    /// A boolean kernel failed.
    #[error(transparent)]
    Boolean(#[from] boolean::Error),
    /// The rank cannot be mapped to a protocol role (3-party only).
    #[error("no role for rank {0}, the protocol is 3-party only")]
    UnsupportedRole(usize),
    /// A boolean share is wider than its backing ring.
    #[error("boolean share of {nbits} bits does not fit the {backing}-bit backing ring")]
    WidthOverflow {
        /// The share's claimed width.
        nbits: usize,
        /// The backing ring width.
        backing: usize,
    },
}

/// The per-call assignment of the logical roles `P0`/`P1`/`P2` to physical
/// ranks, derived from a public pivot. All parties must derive the same
/// assignment from the same pivot or the protocol desynchronizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Roles {
    pub(crate) p0: usize,
    pub(crate) p1: usize,
    pub(crate) p2: usize,
}

impl Roles {
    pub(crate) fn from_pivot(pivot: usize) -> Self {
        Self {
            p0: pivot % 3,
            p1: (pivot + 1) % 3,
            p2: (pivot + 2) % 3,
        }
    }
}

/// Builds the two boolean shares `M` and `N` with `M + N = x`:
/// `M` is a boolean zero share XORed with `x0 + x1` on rank 0 and reshared
/// with one rotate, `N` is `x2` placed locally on the parties that hold it.
async fn arith_to_mn<R: Ring>(
    channel: &mut impl Channel,
    prg: &mut PrgState,
    i: usize,
    x: &AShare<R>,
) -> Result<(BShare<R>, BShare<R>), Error> {
    let numel = x.numel();
    let (mut r0, r1) = prg.zero_pair::<R>(numel);
    for idx in 0..numel {
        r0[idx] = r0[idx].xor(r1[idx]);
        if i == 0 {
            r0[idx] = r0[idx].xor(x.s0[idx].add(x.s1[idx]));
        }
    }
    let r1 = rotate(channel, i, PARTIES, "a2b", &r0).await?;
    let m = BShare {
        nbits: R::BITS,
        s0: r0,
        s1: r1,
    };
    let n = BShare {
        nbits: R::BITS,
        s0: if i == 2 {
            x.s0.clone()
        } else {
            ring::zeros(numel)
        },
        s1: if i == 1 {
            x.s1.clone()
        } else {
            ring::zeros(numel)
        },
    };
    Ok((m, n))
}

/// Converts an arithmetic share into a boolean share of the full ring width.
///
/// `1 + log2(k)` AND rounds on top of one rotate.
pub async fn a2b<R: Ring>(
    channel: &mut impl Channel,
    prg: &mut PrgState,
    i: usize,
    x: &AShare<R>,
) -> Result<BShare<R>, Error> {
    let (m, n) = arith_to_mn(channel, prg, i, x).await?;
    Ok(add_bb(channel, prg, i, &m, &n).await?)
}

/// Converts a boolean share into an arithmetic share, picking the protocol
/// by width: up to 8 bits the OT protocol wins on communication, beyond
/// that the PPA protocol wins on latency growth.
pub async fn b2a<R: Ring>(
    channel: &mut impl Channel,
    prg: &mut PrgState,
    i: usize,
    x: &BShare<R>,
) -> Result<AShare<R>, Error> {
    if x.nbits <= 8 {
        b2a_by_ot(channel, prg, i, x).await
    } else {
        b2a_by_ppa(channel, prg, i, x).await
    }
}

/// Boolean-to-arithmetic conversion via a parallel-prefix adder:
/// `3 + log2(k)` rounds, `O(k log k)` bits.
pub async fn b2a_by_ppa<R: Ring>(
    channel: &mut impl Channel,
    prg: &mut PrgState,
    i: usize,
    x: &BShare<R>,
) -> Result<AShare<R>, Error> {
    check_width(x)?;
    let numel = x.numel();
    if x.nbits == 0 {
        return Ok(AShare::zero(numel));
    }
    let x_wide = BShare {
        nbits: R::BITS,
        s0: x.s0.clone(),
        s1: x.s1.clone(),
    };

    // ra is an arithmetic mask fully known only to rank 1; rb turns it into
    // a boolean sharing of the same value.
    let (ra0, ra1) = prg.zero_pair::<R>(numel);
    let (rb0, rb1) = prg.zero_pair::<R>(numel);
    let mut rb0: Vec<R> = (0..numel)
        .map(|idx| {
            let zb = rb0[idx].xor(rb1[idx]);
            if i == 1 {
                zb.xor(ra0[idx].add(ra1[idx]))
            } else {
                zb
            }
        })
        .collect();
    let rb1 = rotate(channel, i, PARTIES, "b2a.rand", &rb0).await?;
    let r = BShare {
        nbits: R::BITS,
        s0: rb0.clone(),
        s1: rb1,
    };

    let x_plus_r = add_bb(channel, prg, i, &x_wide, &r).await?;

    // reveal x ^ r to rank 0 only
    let mut plain = ring::zeros::<R>(numel);
    if i == 0 {
        let from_p2: Vec<R> = recv_vec_from(channel, 2, "b2a.reveal", numel).await?;
        for idx in 0..numel {
            plain[idx] = x_plus_r.s0[idx].xor(x_plus_r.s1[idx]).xor(from_p2[idx]);
        }
    } else if i == 2 {
        send_to(channel, 0, "b2a.reveal", &x_plus_r.s0).await?;
    }

    // rank 0 holds x + r in the clear, ranks 1 and 2 hold -r
    rb0 = ra0;
    for idx in 0..numel {
        rb0[idx] = if i == 0 { plain[idx] } else { rb0[idx].neg() };
    }
    let a1 = rotate(channel, i, PARTIES, "b2a.rotate", &rb0).await?;
    Ok(AShare { s0: rb0, s1: a1 })
}

/// Boolean-to-arithmetic conversion via a three-party OT: 2 rounds,
/// `O(k^2)` bits. Roles are assigned from a fresh public pivot.
pub async fn b2a_by_ot<R: Ring>(
    channel: &mut impl Channel,
    prg: &mut PrgState,
    i: usize,
    x: &BShare<R>,
) -> Result<AShare<R>, Error> {
    check_width(x)?;
    let numel = x.numel();
    if x.nbits == 0 {
        return Ok(AShare::zero(numel));
    }
    let nbits = x.nbits;
    let total = numel * nbits;

    let roles = Roles::from_pivot(prg.pivot());
    let (r0, r1) = prg.zero_pair::<R>(total);

    if i == roles.p0 {
        // the helper: selects the sender's mask with the shared bits b2
        let b2 = bit_decompose(&x.s1, nbits);
        let m0 = prg.with_prev::<R>(total);
        let m1 = prg.with_prev::<R>(total);
        let mc: Vec<R> = (0..total)
            .map(|idx| if b2[idx] { m1[idx] } else { m0[idx] })
            .collect();
        send_to(channel, roles.p1, "b2a.mc", &mc).await?;

        let c1 = bit_compose(&r0, nbits);
        let c2: Vec<R> = recv_vec_from(channel, roles.p1, "b2a.c2", numel).await?;
        // role neighbors are rank neighbors, so (own, successor) is already
        // the replicated pair layout
        Ok(AShare { s0: c1, s1: c2 })
    } else if i == roles.p1 {
        // the receiver: unmasks the message selected by its own bits
        let b2 = bit_decompose(&x.s0, nbits);
        let mc: Vec<R> = recv_vec_from(channel, roles.p0, "b2a.mc", total).await?;
        let m0: Vec<R> = recv_vec_from(channel, roles.p2, "b2a.m0", total).await?;
        let m1: Vec<R> = recv_vec_from(channel, roles.p2, "b2a.m1", total).await?;
        let unmasked: Vec<R> = (0..total)
            .map(|idx| {
                if b2[idx] {
                    m1[idx].xor(mc[idx])
                } else {
                    m0[idx].xor(mc[idx])
                }
            })
            .collect();
        let c2 = bit_compose(&unmasked, nbits);
        send_to(channel, roles.p0, "b2a.c2", &c2).await?;
        let c3 = bit_compose(&r1, nbits);
        Ok(AShare { s0: c2, s1: c3 })
    } else if i == roles.p2 {
        // the sender: m_i = (i ^ b1 ^ b3) - c1 - c3 per bit, masked with the
        // randomness shared with the helper
        let c3 = bit_compose(&r0, nbits);
        let c1 = bit_compose(&r1, nbits);
        let mut msg0 = ring::zeros::<R>(total);
        let mut msg1 = ring::zeros::<R>(total);
        for idx in 0..numel {
            let xx = x.s0[idx].xor(x.s1[idx]);
            for bit in 0..nbits {
                let flat = idx * nbits + bit;
                let t = r0[flat].add(r1[flat]);
                msg0[flat] = R::from_bool(xx.bit(bit)).sub(t);
                msg1[flat] = R::from_bool(!xx.bit(bit)).sub(t);
            }
        }
        let mask0 = prg.with_next::<R>(total);
        let mask1 = prg.with_next::<R>(total);
        for idx in 0..total {
            msg0[idx] = msg0[idx].xor(mask0[idx]);
            msg1[idx] = msg1[idx].xor(mask1[idx]);
        }
        send_to(channel, roles.p1, "b2a.m0", &msg0).await?;
        send_to(channel, roles.p1, "b2a.m1", &msg1).await?;
        Ok(AShare { s0: c3, s1: c1 })
    } else {
        Err(Error::UnsupportedRole(i))
    }
}

/// Extracts the most significant bit of an arithmetic share as a 1-bit
/// boolean share, computing only the `k-1`'th carry instead of a full sum.
pub async fn msb_a2b<R: Ring>(
    channel: &mut impl Channel,
    prg: &mut PrgState,
    i: usize,
    x: &AShare<R>,
) -> Result<BShare<R>, Error> {
    let (m, n) = arith_to_mn(channel, prg, i, x).await?;
    let k = R::BITS;
    let carry = carry_out(channel, prg, i, &m, &n, k - 1).await?;
    let top = rshift_b(&xor_bb(&m, &n)?, k - 1);
    let mut out = xor_bb(&top, &carry)?;
    out.nbits = 1;
    Ok(out)
}

/// Retags a boolean share with a different backing ring; pure metadata, the
/// bit content is unchanged.
pub fn cast_b<From: Ring, To: Ring>(x: &BShare<From>) -> Result<BShare<To>, Error> {
    if x.nbits > To::BITS {
        return Err(Error::WidthOverflow {
            nbits: x.nbits,
            backing: To::BITS,
        });
    }
    Ok(BShare {
        nbits: x.nbits,
        s0: x.s0.iter().map(|v| To::from_u128(v.to_u128())).collect(),
        s1: x.s1.iter().map(|v| To::from_u128(v.to_u128())).collect(),
    })
}

/// Casts an arithmetic share to a different ring width.
///
/// Narrowing is a local truncating cast of both stored summands; no
/// fixed-point correction is performed (known precision boundary for
/// fixed-point values, kept as-is). Widening runs a 2-round wrap-correction
/// protocol with pivot-derived roles; the secret is assumed to lie in
/// `[-2^(k-2), 2^(k-2))` under the narrow ring's two's-complement
/// interpretation.
pub async fn cast_a<From: Ring, To: Ring>(
    channel: &mut impl Channel,
    prg: &mut PrgState,
    i: usize,
    x: &AShare<From>,
) -> Result<AShare<To>, Error> {
    if To::BITS <= From::BITS {
        // NOTE: the truncation in down casts of fixed-point values could be
        // compensated here; it currently is not.
        return Ok(AShare {
            s0: x.s0.iter().map(|v| To::from_u128(v.to_u128())).collect(),
            s1: x.s1.iter().map(|v| To::from_u128(v.to_u128())).collect(),
        });
    }
    cast_up(channel, prg, i, x).await
}

async fn cast_up<From: Ring, To: Ring>(
    channel: &mut impl Channel,
    prg: &mut PrgState,
    i: usize,
    x: &AShare<From>,
) -> Result<AShare<To>, Error> {
    let numel = x.numel();
    let k = From::BITS;
    let roles = Roles::from_pivot(prg.pivot());
    let domain_shift = From::ONE.shl(k - 2);

    if i == roles.p0 {
        // correlated (r_msb, r) shares from the seed shared with the sender
        let cr = prg.with_prev::<To>(2 * numel);
        let (rc, rb) = cr.split_at(numel);

        let x_plus_r: Vec<From> = (0..numel)
            .map(|idx| {
                let t = x.s0[idx].add(x.s1[idx]).add(domain_shift);
                t.add(From::from_u128(rb[idx].to_u128()))
            })
            .collect();
        let c = open_with(channel, roles.p1, "cast.open", &x_plus_r).await?;

        let mut y2: Vec<To> = (0..numel)
            .map(|idx| {
                let c_up = To::from_u128(c[idx].to_u128());
                let c_msb = To::from_bool(c[idx].bit(k - 1));
                let w = rc[idx].mul(To::ONE.sub(c_msb));
                c_up.sub(rb[idx])
                    .add(w.shl(k))
                    .sub(To::from_u128(domain_shift.to_u128()))
            })
            .collect();

        let y1 = prg.with_prev::<To>(numel);
        for idx in 0..numel {
            y2[idx] = y2[idx].sub(y1[idx]);
        }
        send_to(channel, roles.p1, "cast.2to3", &y2).await?;
        let tmp: Vec<To> = recv_vec_from(channel, roles.p1, "cast.2to3", numel).await?;
        Ok(AShare {
            s0: y1,
            s1: ring::add_vec(&y2, &tmp),
        })
    } else if i == roles.p1 {
        let cr: Vec<To> = recv_vec_from(channel, roles.p2, "cast.cr", 2 * numel).await?;
        let (rc, rb) = cr.split_at(numel);

        let x_plus_r: Vec<From> = (0..numel)
            .map(|idx| x.s1[idx].add(From::from_u128(rb[idx].to_u128())))
            .collect();
        let c = open_with(channel, roles.p0, "cast.open", &x_plus_r).await?;

        let mut y2: Vec<To> = (0..numel)
            .map(|idx| {
                let c_msb = To::from_bool(c[idx].bit(k - 1));
                let w = rc[idx].mul(To::ONE.sub(c_msb));
                To::ZERO.sub(rb[idx]).add(w.shl(k))
            })
            .collect();

        let y3 = prg.with_next::<To>(numel);
        for idx in 0..numel {
            y2[idx] = y2[idx].sub(y3[idx]);
        }
        send_to(channel, roles.p0, "cast.2to3", &y2).await?;
        let tmp: Vec<To> = recv_vec_from(channel, roles.p0, "cast.2to3", numel).await?;
        Ok(AShare {
            s0: ring::add_vec(&y2, &tmp),
            s1: y3,
        })
    } else if i == roles.p2 {
        // knows r in the clear and deals (r_msb, r) as a 2-of-2 sharing
        let r0 = prg.private::<To>(numel);
        let r1 = prg.private::<To>(numel);
        let cr0 = prg.with_next::<To>(2 * numel);
        let mut cr1 = ring::neg_vec(&cr0);
        for idx in 0..numel {
            let r = From::from_u128(r0[idx].add(r1[idx]).to_u128());
            cr1[idx] = cr1[idx].add(To::from_bool(r.bit(k - 1)));
            cr1[numel + idx] = cr1[numel + idx].add(To::from_u128(r.to_u128()));
        }
        send_to(channel, roles.p1, "cast.cr", &cr1).await?;

        let (y3, y1) = prg.zero_pair::<To>(numel);
        Ok(AShare { s0: y3, s1: y1 })
    } else {
        Err(Error::UnsupportedRole(i))
    }
}

async fn open_with<R: Ring>(
    channel: &mut impl Channel,
    peer: usize,
    phase: &str,
    x: &[R],
) -> Result<Vec<R>, Error> {
    send_to(channel, peer, phase, x).await?;
    let peer_share: Vec<R> = recv_vec_from(channel, peer, phase, x.len()).await?;
    Ok(ring::add_vec(x, &peer_share))
}

fn check_width<R: Ring>(x: &BShare<R>) -> Result<(), Error> {
    if x.nbits > R::BITS {
        return Err(Error::WidthOverflow {
            nbits: x.nbits,
            backing: R::BITS,
        });
    }
    Ok(())
}
