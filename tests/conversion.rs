use polyring::{
    channel::SimpleChannel,
    conversion::{a2b, b2a, b2a_by_ot, b2a_by_ppa, cast_a, cast_b, msb_a2b},
    prg::PrgState,
    share::{AShare, BShare, combine_arith, combine_bool, share_arith, share_bool},
};

fn channels3() -> (SimpleChannel, SimpleChannel, SimpleChannel) {
    let mut chans = SimpleChannel::channels(3);
    let c2 = chans.pop().unwrap();
    let c1 = chans.pop().unwrap();
    let c0 = chans.pop().unwrap();
    (c0, c1, c2)
}

#[tokio::test]
async fn a2b_reconstructs_the_arithmetic_value() {
    let mut rng = rand::rng();
    let values: Vec<u64> = vec![0, 1, u64::MAX, 0x1234_5678_9abc_def0, rand::random()];
    let [s0, s1, s2] = share_arith(&mut rng, &values);
    let (c0, c1, c2) = channels3();

    let run = |mut ch: SimpleChannel, i: usize, sh: AShare<u64>| async move {
        let mut prg = PrgState::setup(&mut ch, i, 3).await.unwrap();
        a2b(&mut ch, &mut prg, i, &sh).await.unwrap()
    };
    let (r0, r1, r2) = tokio::join!(run(c0, 0, s0), run(c1, 1, s1), run(c2, 2, s2));
    assert_eq!(r0.nbits, 64);
    assert_eq!(combine_bool(&[r0, r1, r2]), values);
}

#[tokio::test]
async fn a2b_b2a_round_trip() {
    let mut rng = rand::rng();
    let values: Vec<u32> = vec![0, 1, u32::MAX, rand::random(), rand::random()];
    let [s0, s1, s2] = share_arith(&mut rng, &values);
    let (c0, c1, c2) = channels3();

    let run = |mut ch: SimpleChannel, i: usize, sh: AShare<u32>| async move {
        let mut prg = PrgState::setup(&mut ch, i, 3).await.unwrap();
        let b = a2b(&mut ch, &mut prg, i, &sh).await.unwrap();
        b2a(&mut ch, &mut prg, i, &b).await.unwrap()
    };
    let (r0, r1, r2) = tokio::join!(run(c0, 0, s0), run(c1, 1, s1), run(c2, 2, s2));
    assert_eq!(combine_arith(&[r0, r1, r2]), values);
}

#[tokio::test]
async fn b2a_round_trips_boolean_shares_via_a2b() {
    let mut rng = rand::rng();
    let values: Vec<u128> = vec![0, 1, u128::MAX, rand::random()];
    let [s0, s1, s2] = share_bool(&mut rng, &values, 128);
    let (c0, c1, c2) = channels3();

    let run = |mut ch: SimpleChannel, i: usize, sh: BShare<u128>| async move {
        let mut prg = PrgState::setup(&mut ch, i, 3).await.unwrap();
        let a = b2a(&mut ch, &mut prg, i, &sh).await.unwrap();
        a2b(&mut ch, &mut prg, i, &a).await.unwrap()
    };
    let (r0, r1, r2) = tokio::join!(run(c0, 0, s0), run(c1, 1, s1), run(c2, 2, s2));
    assert_eq!(combine_bool(&[r0, r1, r2]), values);
}

#[tokio::test]
async fn b2a_by_ot_handles_narrow_shares() {
    let mut rng = rand::rng();
    let values: Vec<u64> = vec![0, 1, 0xff, 0xa5, 0x80, 0x7f];
    let [s0, s1, s2] = share_bool(&mut rng, &values, 8);
    let (c0, c1, c2) = channels3();

    let run = |mut ch: SimpleChannel, i: usize, sh: BShare<u64>| async move {
        let mut prg = PrgState::setup(&mut ch, i, 3).await.unwrap();
        b2a_by_ot(&mut ch, &mut prg, i, &sh).await.unwrap()
    };
    let (r0, r1, r2) = tokio::join!(run(c0, 0, s0), run(c1, 1, s1), run(c2, 2, s2));
    assert_eq!(combine_arith(&[r0, r1, r2]), values);
}

#[tokio::test]
async fn b2a_strategies_agree_on_the_same_width() {
    let mut rng = rand::rng();
    let values: Vec<u32> = vec![0x0, 0x1, 0xfe, 0x33];
    let shares = share_bool(&mut rng, &values, 8);
    for use_ot in [true, false] {
        let [s0, s1, s2] = shares.clone();
        let (c0, c1, c2) = channels3();
        let run = move |mut ch: SimpleChannel, i: usize, sh: BShare<u32>| async move {
            let mut prg = PrgState::setup(&mut ch, i, 3).await.unwrap();
            if use_ot {
                b2a_by_ot(&mut ch, &mut prg, i, &sh).await.unwrap()
            } else {
                b2a_by_ppa(&mut ch, &mut prg, i, &sh).await.unwrap()
            }
        };
        let (r0, r1, r2) = tokio::join!(run(c0, 0, s0), run(c1, 1, s1), run(c2, 2, s2));
        assert_eq!(combine_arith(&[r0, r1, r2]), values);
    }
}

#[tokio::test]
async fn zero_width_shares_convert_to_zero() {
    let mut rng = rand::rng();
    let values: Vec<u64> = vec![0, 0, 0];
    let shares = share_bool(&mut rng, &values, 0);
    for s in &shares {
        assert_eq!(s.nbits, 0);
    }
    let [s0, s1, s2] = shares;
    let (c0, c1, c2) = channels3();
    let run = |mut ch: SimpleChannel, i: usize, sh: BShare<u64>| async move {
        let mut prg = PrgState::setup(&mut ch, i, 3).await.unwrap();
        b2a(&mut ch, &mut prg, i, &sh).await.unwrap()
    };
    let (r0, r1, r2) = tokio::join!(run(c0, 0, s0), run(c1, 1, s1), run(c2, 2, s2));
    assert_eq!(combine_arith(&[r0, r1, r2]), vec![0, 0, 0]);
}

#[tokio::test]
async fn msb_extracts_the_sign_bit() {
    let mut rng = rand::rng();
    let values: Vec<u64> = vec![
        0,
        1,
        u64::MAX,
        1 << 63,
        (1 << 63) - 1,
        (-12345i64) as u64,
        rand::random(),
    ];
    let expected: Vec<u64> = values.iter().map(|v| v >> 63).collect();
    let [s0, s1, s2] = share_arith(&mut rng, &values);
    let (c0, c1, c2) = channels3();

    let run = |mut ch: SimpleChannel, i: usize, sh: AShare<u64>| async move {
        let mut prg = PrgState::setup(&mut ch, i, 3).await.unwrap();
        msb_a2b(&mut ch, &mut prg, i, &sh).await.unwrap()
    };
    let (r0, r1, r2) = tokio::join!(run(c0, 0, s0), run(c1, 1, s1), run(c2, 2, s2));
    assert_eq!(r0.nbits, 1);
    assert_eq!(combine_bool(&[r0, r1, r2]), expected);
}

#[tokio::test]
async fn cast_up_preserves_signed_values() {
    let mut rng = rand::rng();
    let signed: Vec<i32> = vec![0, 1, -1, 12345, -(1 << 29), (1 << 29) - 1];
    let values: Vec<u32> = signed.iter().map(|v| *v as u32).collect();
    let expected: Vec<u64> = signed.iter().map(|v| *v as i64 as u64).collect();
    let [s0, s1, s2] = share_arith(&mut rng, &values);
    let (c0, c1, c2) = channels3();

    let run = |mut ch: SimpleChannel, i: usize, sh: AShare<u32>| async move {
        let mut prg = PrgState::setup(&mut ch, i, 3).await.unwrap();
        cast_a::<u32, u64>(&mut ch, &mut prg, i, &sh).await.unwrap()
    };
    let (r0, r1, r2) = tokio::join!(run(c0, 0, s0), run(c1, 1, s1), run(c2, 2, s2));
    assert_eq!(combine_arith(&[r0, r1, r2]), expected);
}

#[tokio::test]
async fn cast_widen_then_narrow_is_lossless() {
    let mut rng = rand::rng();
    let signed: Vec<i32> = vec![7, -7, 1 << 20, -(1 << 20)];
    let values: Vec<u32> = signed.iter().map(|v| *v as u32).collect();
    let [s0, s1, s2] = share_arith(&mut rng, &values);
    let (c0, c1, c2) = channels3();

    let run = |mut ch: SimpleChannel, i: usize, sh: AShare<u32>| async move {
        let mut prg = PrgState::setup(&mut ch, i, 3).await.unwrap();
        let wide = cast_a::<u32, u64>(&mut ch, &mut prg, i, &sh).await.unwrap();
        cast_a::<u64, u32>(&mut ch, &mut prg, i, &wide).await.unwrap()
    };
    let (r0, r1, r2) = tokio::join!(run(c0, 0, s0), run(c1, 1, s1), run(c2, 2, s2));
    assert_eq!(combine_arith(&[r0, r1, r2]), values);
}

// Known precision boundary: narrowing simply truncates the stored summands,
// so a value that does not fit the narrow ring's signed domain is not
// recovered by widening again.
#[tokio::test]
async fn cast_down_then_up_is_lossy() {
    let mut rng = rand::rng();
    let value: u64 = 0x1_2345_6789;
    let truncated = value as u32;
    let [s0, s1, s2] = share_arith(&mut rng, &[value]);
    let (c0, c1, c2) = channels3();

    let run = |mut ch: SimpleChannel, i: usize, sh: AShare<u64>| async move {
        let mut prg = PrgState::setup(&mut ch, i, 3).await.unwrap();
        let narrow = cast_a::<u64, u32>(&mut ch, &mut prg, i, &sh).await.unwrap();
        cast_a::<u32, u64>(&mut ch, &mut prg, i, &narrow).await.unwrap()
    };
    let (r0, r1, r2) = tokio::join!(run(c0, 0, s0), run(c1, 1, s1), run(c2, 2, s2));
    let back = combine_arith(&[r0, r1, r2]);
    assert_ne!(back, vec![value]);
    assert_eq!(back, vec![truncated as i32 as i64 as u64]);
}

#[test]
fn cast_b_is_a_metadata_retag() {
    let mut rng = rand::rng();
    let values: Vec<u64> = vec![0xab, 0x11];
    let shares = share_bool(&mut rng, &values, 8);
    let narrow: BShare<u8> = cast_b(&shares[0]).unwrap();
    assert_eq!(narrow.nbits, 8);
    assert_eq!(narrow.s0, shares[0].s0.iter().map(|v| *v as u8).collect::<Vec<_>>());
    // widening back up changes nothing
    let wide: BShare<u128> = cast_b(&narrow).unwrap();
    assert_eq!(wide.s1, shares[0].s1.iter().map(|v| *v as u128).collect::<Vec<_>>());
    // a share cannot be retagged into a backing that does not fit
    let too_narrow: Result<BShare<u8>, _> = cast_b(&share_bool(&mut rng, &[0u64], 9)[0]);
    assert!(too_narrow.is_err());
}
