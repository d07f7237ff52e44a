//! Boolean kernels over replicated XOR shares.
//!
//! XOR and shifts are local; AND costs one communication round (a PRSS zero
//! share plus one rotate, the replicated-sharing multiplication specialized
//! to bits). On top of these, [`add_bb`] implements a Kogge-Stone
//! parallel-prefix adder with `ceil(log2(k))` AND rounds, and [`carry_out`]
//! computes only the final carry bit by repeatedly halving the prefix
//! structure with an even/odd bit split.

use crate::{
    bits::{bit_split_vec, ceil_log2},
    channel::{self, Channel, rotate},
    prg::PrgState,
    ring::{self, Ring},
    share::BShare,
};

/// The number of parties in the replicated-sharing protocols.
pub(crate) const PARTIES: usize = 3;

/// Errors occurring in the boolean share kernels.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A message could not be sent or received.
    #[error(transparent)]
    Channel(#[from] channel::Error),
    /// The operands have a different number of elements.
    #[error("shape mismatch: {0} vs {1} elements")]
    ShapeMismatch(usize, usize),
}

fn check_shapes<R: Ring>(x: &BShare<R>, y: &BShare<R>) -> Result<(), Error> {
    if x.numel() != y.numel() {
        return Err(Error::ShapeMismatch(x.numel(), y.numel()));
    }
    Ok(())
}

/// Elementwise XOR of two boolean shares, local.
pub(crate) fn xor_bb<R: Ring>(x: &BShare<R>, y: &BShare<R>) -> Result<BShare<R>, Error> {
    check_shapes(x, y)?;
    Ok(BShare {
        nbits: x.nbits.max(y.nbits),
        s0: ring::xor_vec(&x.s0, &y.s0),
        s1: ring::xor_vec(&x.s1, &y.s1),
    })
}

/// Left shift of every shared element, width unchanged.
pub(crate) fn lshift_b<R: Ring>(x: &BShare<R>, shift: usize) -> BShare<R> {
    BShare {
        nbits: x.nbits,
        s0: ring::mask_low(&ring::lshift_vec(&x.s0, shift), x.nbits),
        s1: ring::mask_low(&ring::lshift_vec(&x.s1, shift), x.nbits),
    }
}

/// Logical right shift of every shared element, dropping `shift` bits of width.
pub(crate) fn rshift_b<R: Ring>(x: &BShare<R>, shift: usize) -> BShare<R> {
    BShare {
        nbits: x.nbits.saturating_sub(shift),
        s0: ring::rshift_vec(&x.s0, shift),
        s1: ring::rshift_vec(&x.s1, shift),
    }
}

/// Elementwise AND of two boolean shares; one round.
pub(crate) async fn and_bb<R: Ring>(
    channel: &mut impl Channel,
    prg: &mut PrgState,
    i: usize,
    x: &BShare<R>,
    y: &BShare<R>,
) -> Result<BShare<R>, Error> {
    check_shapes(x, y)?;
    let numel = x.numel();
    let nbits = x.nbits.min(y.nbits);
    let (z0, z1) = prg.zero_pair::<R>(numel);
    let mut t: Vec<R> = Vec::with_capacity(numel);
    for idx in 0..numel {
        let local = x.s0[idx]
            .and(y.s0[idx])
            .xor(x.s0[idx].and(y.s1[idx]))
            .xor(x.s1[idx].and(y.s0[idx]))
            .xor(z0[idx])
            .xor(z1[idx]);
        t.push(local);
    }
    let t1 = rotate(channel, i, PARTIES, "and_bb", &t).await?;
    Ok(BShare {
        nbits,
        s0: ring::mask_low(&t, nbits),
        s1: ring::mask_low(&t1, nbits),
    })
}

fn concat<R: Ring>(a: &BShare<R>, b: &BShare<R>) -> BShare<R> {
    let mut s0 = a.s0.clone();
    s0.extend_from_slice(&b.s0);
    let mut s1 = a.s1.clone();
    s1.extend_from_slice(&b.s1);
    BShare {
        nbits: a.nbits.max(b.nbits),
        s0,
        s1,
    }
}

fn split<R: Ring>(x: BShare<R>, numel: usize) -> (BShare<R>, BShare<R>) {
    let (a0, b0) = x.s0.split_at(numel);
    let (a1, b1) = x.s1.split_at(numel);
    (
        BShare {
            nbits: x.nbits,
            s0: a0.to_vec(),
            s1: a1.to_vec(),
        },
        BShare {
            nbits: x.nbits,
            s0: b0.to_vec(),
            s1: b1.to_vec(),
        },
    )
}

/// Ring addition of two boolean shares via a Kogge-Stone parallel-prefix
/// adder: `ceil(log2(k)) + 1` rounds, the dominant cost of A2B conversion.
pub(crate) async fn add_bb<R: Ring>(
    channel: &mut impl Channel,
    prg: &mut PrgState,
    i: usize,
    x: &BShare<R>,
    y: &BShare<R>,
) -> Result<BShare<R>, Error> {
    check_shapes(x, y)?;
    let numel = x.numel();
    let nbits = x.nbits.max(y.nbits);
    let mut p = xor_bb(x, y)?;
    p.nbits = nbits;
    let mut g = and_bb(channel, prg, i, x, y).await?;
    g.nbits = nbits;
    for level in 0..ceil_log2(nbits.max(1)) {
        let shift = 1 << level;
        let g1 = lshift_b(&g, shift);
        let p1 = lshift_b(&p, shift);
        // one batched AND per level: (P & G1, P & P1)
        let both = and_bb(channel, prg, i, &concat(&p, &p), &concat(&g1, &p1)).await?;
        let (pg1, pp1) = split(both, numel);
        g = xor_bb(&g, &pg1)?;
        p = pp1;
    }
    let c = lshift_b(&g, 1);
    let mut out = xor_bb(&xor_bb(x, y)?, &c)?;
    out.nbits = nbits;
    out.s0 = ring::mask_low(&out.s0, nbits);
    out.s1 = ring::mask_low(&out.s1, nbits);
    Ok(out)
}

/// The carry out of adding the low `k` bits of `x` and `y`, as a 1-bit share.
///
/// Uses the even/odd [`bit_split_vec`] halving so that only `O(k)` AND gates
/// in `ceil(log2(k))` rounds are needed instead of a full adder.
pub(crate) async fn carry_out<R: Ring>(
    channel: &mut impl Channel,
    prg: &mut PrgState,
    i: usize,
    x: &BShare<R>,
    y: &BShare<R>,
    k: usize,
) -> Result<BShare<R>, Error> {
    check_shapes(x, y)?;
    let numel = x.numel();
    let mut p = xor_bb(x, y)?;
    let mut g = and_bb(channel, prg, i, x, y).await?;
    let mask = |share: &mut BShare<R>, nb: usize| {
        share.nbits = nb;
        share.s0 = ring::mask_low(&share.s0, nb);
        share.s1 = ring::mask_low(&share.s1, nb);
    };
    let mut nb = k;
    mask(&mut p, nb);
    mask(&mut g, nb);
    while nb > 1 {
        if nb % 2 == 1 {
            nb += 1;
            mask(&mut p, nb);
            mask(&mut g, nb);
            p = lshift_b(&p, 1);
            g = lshift_b(&g, 1);
        }
        let (p_hi, p_lo) = split_bits(&p, nb);
        let (g_hi, g_lo) = split_bits(&g, nb);
        // (G, P) pairs combine to (G_hi ^ P_hi & G_lo, P_hi & P_lo)
        let both = and_bb(
            channel,
            prg,
            i,
            &concat(&p_hi, &p_hi),
            &concat(&g_lo, &p_lo),
        )
        .await?;
        let (pg, pp) = split(both, numel);
        g = xor_bb(&g_hi, &pg)?;
        p = pp;
        nb /= 2;
        mask(&mut p, nb);
        mask(&mut g, nb);
    }
    Ok(g)
}

fn split_bits<R: Ring>(x: &BShare<R>, nb: usize) -> (BShare<R>, BShare<R>) {
    let (hi0, lo0) = bit_split_vec(&x.s0, nb);
    let (hi1, lo1) = bit_split_vec(&x.s1, nb);
    (
        BShare {
            nbits: nb / 2,
            s0: hi0,
            s1: hi1,
        },
        BShare {
            nbits: nb / 2,
            s0: lo0,
            s1: lo1,
        },
    )
}
