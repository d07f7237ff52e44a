use polyring::{
    beaver::{Beaver, Error},
    channel::SimpleChannel,
};

const K: usize = 32;
const S: usize = 32;

fn channels3() -> (SimpleChannel, SimpleChannel, SimpleChannel) {
    let mut chans = SimpleChannel::channels(3);
    let c2 = chans.pop().unwrap();
    let c1 = chans.pop().unwrap();
    let c0 = chans.pop().unwrap();
    (c0, c1, c2)
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Elementwise sum of the three parties' additive shares.
fn reconstruct(shares: [&[u64]; 3]) -> Vec<u64> {
    (0..shares[0].len())
        .map(|i| {
            shares[0][i]
                .wrapping_add(shares[1][i])
                .wrapping_add(shares[2][i])
        })
        .collect()
}

fn mat_mul(a: &[u64], b: &[u64], m: usize, n: usize, k: usize) -> Vec<u64> {
    let mut out = vec![0u64; m * n];
    for row in 0..m {
        for j in 0..k {
            for col in 0..n {
                out[row * n + col] = out[row * n + col]
                    .wrapping_add(a[row * k + j].wrapping_mul(b[j * n + col]));
            }
        }
    }
    out
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_array_macs_bind_values_to_the_global_key() {
    init_logging();
    let (c0, c1, c2) = channels3();
    let run = |mut ch: SimpleChannel, i: usize| async move {
        let mut beaver = Beaver::<u64>::setup(&mut ch, i, 3).await.unwrap();
        let key = beaver.init_spdz_key(S);
        let x: Vec<u64> = (0..5).map(|_| rand::random()).collect();
        let mac = beaver.auth_array(&mut ch, &x, K, S).await.unwrap();
        (key, x, mac)
    };
    let (r0, r1, r2) = tokio::join!(
        tokio::spawn(run(c0, 0)),
        tokio::spawn(run(c1, 1)),
        tokio::spawn(run(c2, 2)),
    );
    let (k0, x0, m0) = r0.unwrap();
    let (k1, x1, m1) = r1.unwrap();
    let (k2, x2, m2) = r2.unwrap();
    let key = k0.wrapping_add(k1).wrapping_add(k2);
    let x = reconstruct([&x0, &x1, &x2]);
    let mac = reconstruct([&m0, &m1, &m2]);
    for idx in 0..x.len() {
        assert_eq!(mac[idx], x[idx].wrapping_mul(key));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_open_reveals_low_bits_and_mac_check_detects_corruption() {
    init_logging();
    let (c0, c1, c2) = channels3();
    let run = |mut ch: SimpleChannel, i: usize| async move {
        let mut beaver = Beaver::<u64>::setup(&mut ch, i, 3).await.unwrap();
        beaver.init_spdz_key(S);
        let (val, mac) = beaver.auth_coin_tossing(&mut ch, 4, K, S).await.unwrap();
        let (opened, omac) = beaver.batch_open(&mut ch, &val, &mac, K, S).await.unwrap();
        beaver
            .batch_mac_check(&mut ch, &opened, &omac, K, S)
            .await
            .unwrap();
        // a single corrupted MAC share must fail the check on every party
        let mut bad = omac;
        if i == 0 {
            bad[0] = bad[0].wrapping_add(1);
        }
        let verdict = beaver.batch_mac_check(&mut ch, &opened, &bad, K, S).await;
        (val, opened, verdict)
    };
    let (r0, r1, r2) = tokio::join!(
        tokio::spawn(run(c0, 0)),
        tokio::spawn(run(c1, 1)),
        tokio::spawn(run(c2, 2)),
    );
    let (v0, o0, e0) = r0.unwrap();
    let (v1, o1, e1) = r1.unwrap();
    let (v2, o2, e2) = r2.unwrap();
    assert_eq!(o0, o1);
    assert_eq!(o1, o2);
    let mask = (1u64 << K) - 1;
    let values = reconstruct([&v0, &v1, &v2]);
    for idx in 0..values.len() {
        assert_eq!(o0[idx] & mask, values[idx] & mask);
    }
    for err in [e0, e1, e2] {
        assert!(matches!(err, Err(Error::MacCheckFailed)));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_mul_triples_multiply_and_carry_valid_macs() {
    init_logging();
    let (c0, c1, c2) = channels3();
    let run = |mut ch: SimpleChannel, i: usize| async move {
        let mut beaver = Beaver::<u64>::setup(&mut ch, i, 3).await.unwrap();
        let key = beaver.init_spdz_key(S);
        let out = beaver.auth_mul(&mut ch, 3, K, S).await.unwrap();
        (key, out)
    };
    let (r0, r1, r2) = tokio::join!(
        tokio::spawn(run(c0, 0)),
        tokio::spawn(run(c1, 1)),
        tokio::spawn(run(c2, 2)),
    );
    let (k0, ((a0, b0, c0), (am0, bm0, cm0))) = r0.unwrap();
    let (k1, ((a1, b1, c1), (am1, bm1, cm1))) = r1.unwrap();
    let (k2, ((a2, b2, c2), (am2, bm2, cm2))) = r2.unwrap();
    let key = k0.wrapping_add(k1).wrapping_add(k2);
    let a = reconstruct([&a0, &a1, &a2]);
    let b = reconstruct([&b0, &b1, &b2]);
    let c = reconstruct([&c0, &c1, &c2]);
    let am = reconstruct([&am0, &am1, &am2]);
    let bm = reconstruct([&bm0, &bm1, &bm2]);
    let cm = reconstruct([&cm0, &cm1, &cm2]);
    for idx in 0..a.len() {
        assert_eq!(c[idx], a[idx].wrapping_mul(b[idx]));
        assert_eq!(am[idx], a[idx].wrapping_mul(key));
        assert_eq!(bm[idx], b[idx].wrapping_mul(key));
        assert_eq!(cm[idx], c[idx].wrapping_mul(key));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_and_triples_satisfy_the_bitwise_relation() {
    init_logging();
    let (c0, c1, c2) = channels3();
    let run = |mut ch: SimpleChannel, i: usize| async move {
        let mut beaver = Beaver::<u64>::setup(&mut ch, i, 3).await.unwrap();
        let key = beaver.init_spdz_key(S);
        let out = beaver.auth_and(&mut ch, 2, S).await.unwrap();
        (key, out)
    };
    let (r0, r1, r2) = tokio::join!(
        tokio::spawn(run(c0, 0)),
        tokio::spawn(run(c1, 1)),
        tokio::spawn(run(c2, 2)),
    );
    let (k0, ((a0, b0, c0), (am0, bm0, cm0))) = r0.unwrap();
    let (k1, ((a1, b1, c1), (am1, bm1, cm1))) = r1.unwrap();
    let (k2, ((a2, b2, c2), (am2, bm2, cm2))) = r2.unwrap();
    let key = k0.wrapping_add(k1).wrapping_add(k2);
    let a = reconstruct([&a0, &a1, &a2]);
    let b = reconstruct([&b0, &b1, &b2]);
    let c = reconstruct([&c0, &c1, &c2]);
    let am = reconstruct([&am0, &am1, &am2]);
    let bm = reconstruct([&bm0, &bm1, &bm2]);
    let cm = reconstruct([&cm0, &cm1, &cm2]);
    for idx in 0..a.len() {
        // the shared bits live in the low bit of the additive sum
        assert_eq!(c[idx] & 1, (a[idx] & 1) & (b[idx] & 1));
        assert_eq!(am[idx], a[idx].wrapping_mul(key));
        assert_eq!(bm[idx], b[idx].wrapping_mul(key));
        assert_eq!(cm[idx], c[idx].wrapping_mul(key));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_dot_triples_hold_at_matrix_granularity() {
    init_logging();
    let (m, n, k_dim) = (2, 2, 3);
    let (c0, c1, c2) = channels3();
    let run = move |mut ch: SimpleChannel, i: usize| async move {
        let mut beaver = Beaver::<u64>::setup(&mut ch, i, 3).await.unwrap();
        let key = beaver.init_spdz_key(S);
        let out = beaver.auth_dot(&mut ch, m, n, k_dim, K, S).await.unwrap();
        (key, out)
    };
    let (r0, r1, r2) = tokio::join!(
        tokio::spawn(run(c0, 0)),
        tokio::spawn(run(c1, 1)),
        tokio::spawn(run(c2, 2)),
    );
    let (k0, ((a0, b0, c0), (am0, _, cm0))) = r0.unwrap();
    let (k1, ((a1, b1, c1), (am1, _, cm1))) = r1.unwrap();
    let (k2, ((a2, b2, c2), (am2, _, cm2))) = r2.unwrap();
    let key = k0.wrapping_add(k1).wrapping_add(k2);
    let a = reconstruct([&a0, &a1, &a2]);
    let b = reconstruct([&b0, &b1, &b2]);
    let c = reconstruct([&c0, &c1, &c2]);
    assert_eq!(c, mat_mul(&a, &b, m, n, k_dim));
    let am = reconstruct([&am0, &am1, &am2]);
    let cm = reconstruct([&cm0, &cm1, &cm2]);
    for idx in 0..a.len() {
        assert_eq!(am[idx], a[idx].wrapping_mul(key));
    }
    for idx in 0..c.len() {
        assert_eq!(cm[idx], c[idx].wrapping_mul(key));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_rand_bit_outputs_authenticated_bits() {
    init_logging();
    let size = 128;
    let (c0, c1, c2) = channels3();
    let run = move |mut ch: SimpleChannel, i: usize| async move {
        let mut beaver = Beaver::<u64>::setup(&mut ch, i, 3).await.unwrap();
        let key = beaver.init_spdz_key(S);
        let out = beaver.auth_rand_bit(&mut ch, size, K, S).await.unwrap();
        (key, out)
    };
    let (r0, r1, r2) = tokio::join!(
        tokio::spawn(run(c0, 0)),
        tokio::spawn(run(c1, 1)),
        tokio::spawn(run(c2, 2)),
    );
    let (k0, (b0, m0)) = r0.unwrap();
    let (k1, (b1, m1)) = r1.unwrap();
    let (k2, (b2, m2)) = r2.unwrap();
    let key = k0.wrapping_add(k1).wrapping_add(k2);
    let bits = reconstruct([&b0, &b1, &b2]);
    let macs = reconstruct([&m0, &m1, &m2]);
    let mask = (1u64 << K) - 1;
    let mut ones = 0;
    for idx in 0..size {
        let bit = bits[idx] & mask;
        assert!(bit == 0 || bit == 1, "not a bit: {bit:#x}");
        ones += bit;
        assert_eq!(macs[idx], bits[idx].wrapping_mul(key));
    }
    // crude uniformity sanity over 128 samples (~5.6 sigma bounds)
    assert!((32..=96).contains(&ones), "biased bit count: {ones}/128");
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_trunc_pairs_encode_an_arithmetic_shift() {
    init_logging();
    let (size, bits) = (2, 7);
    let (c0, c1, c2) = channels3();
    let run = move |mut ch: SimpleChannel, i: usize| async move {
        let mut beaver = Beaver::<u64>::setup(&mut ch, i, 3).await.unwrap();
        let key = beaver.init_spdz_key(S);
        let out = beaver.auth_trunc(&mut ch, size, bits, K, S).await.unwrap();
        (key, out)
    };
    let (r0, r1, r2) = tokio::join!(
        tokio::spawn(run(c0, 0)),
        tokio::spawn(run(c1, 1)),
        tokio::spawn(run(c2, 2)),
    );
    let (k0, ((r_0, t_0), (rm0, tm0))) = r0.unwrap();
    let (k1, ((r_1, t_1), (rm1, tm1))) = r1.unwrap();
    let (k2, ((r_2, t_2), (rm2, tm2))) = r2.unwrap();
    let key = k0.wrapping_add(k1).wrapping_add(k2);
    let r = reconstruct([&r_0, &r_1, &r_2]);
    let tr = reconstruct([&t_0, &t_1, &t_2]);
    let rm = reconstruct([&rm0, &rm1, &rm2]);
    let tm = reconstruct([&tm0, &tm1, &tm2]);
    let mask = (1u64 << K) - 1;
    for idx in 0..size {
        // the truncated value is the arithmetic right shift of the K-bit value
        let r_k = (r[idx] & mask) as u32;
        let expected = ((r_k as i32) >> bits) as u32;
        assert_eq!((tr[idx] & mask) as u32, expected);
        assert_eq!(rm[idx], r[idx].wrapping_mul(key));
        assert_eq!(tm[idx], tr[idx].wrapping_mul(key));
    }
}
