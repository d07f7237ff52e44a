use polyring::{
    channel::SimpleChannel,
    dealer::Dealer,
    permute::{apply_inv_perm, apply_perm, inv_perm_am, inv_perm_av, perm_am, perm_av, rand_perm_m},
    share::{combine_additive, share_additive},
};

fn channels3() -> (SimpleChannel, SimpleChannel, SimpleChannel) {
    let mut chans = SimpleChannel::channels(3);
    let c2 = chans.pop().unwrap();
    let c1 = chans.pop().unwrap();
    let c0 = chans.pop().unwrap();
    (c0, c1, c2)
}

#[tokio::test]
async fn private_permutation_applies_the_owner_vector() {
    let mut rng = rand::rng();
    let values: Vec<u64> = vec![10, 20, 30, 40];
    let perm = vec![2usize, 0, 3, 1];
    let mut shares = share_additive(&mut rng, &values, 3).into_iter();
    let (s0, s1, s2) = (
        shares.next().unwrap(),
        shares.next().unwrap(),
        shares.next().unwrap(),
    );
    let (c0, c1, c2) = channels3();

    // rank 1 owns the permutation, the other ranks only hold value shares
    let run = |mut ch: SimpleChannel, i: usize, x: Vec<u64>, pv: Option<Vec<usize>>| async move {
        let mut dealer = Dealer::setup(&mut ch, i, 3).await.unwrap();
        perm_av(&mut ch, &mut dealer, i, 3, &x, pv.as_deref(), 1)
            .await
            .unwrap()
    };
    let (r0, r1, r2) = tokio::join!(
        run(c0, 0, s0, None),
        run(c1, 1, s1, Some(perm.clone())),
        run(c2, 2, s2, None),
    );
    assert_eq!(combine_additive(&[r0, r1, r2]), vec![30, 10, 40, 20]);
    assert_eq!(apply_perm(&values, &perm), vec![30, 10, 40, 20]);
}

#[tokio::test]
async fn private_permutation_round_trips_with_four_parties() {
    let mut rng = rand::rng();
    let n = 4;
    let values: Vec<u32> = (0..10).map(|_| rand::random()).collect();
    let perm = rand_perm_m(&mut rng, values.len());
    let shares = share_additive(&mut rng, &values, n);
    let chans = SimpleChannel::channels(n);

    let run = |mut ch: SimpleChannel, i: usize, x: Vec<u32>, pv: Option<Vec<usize>>| async move {
        let mut dealer = Dealer::setup(&mut ch, i, n).await.unwrap();
        let permuted = perm_av(&mut ch, &mut dealer, i, n, &x, pv.as_deref(), 3)
            .await
            .unwrap();
        let back = inv_perm_av(&mut ch, &mut dealer, i, n, &permuted, pv.as_deref(), 3)
            .await
            .unwrap();
        (permuted, back)
    };
    let mut parties = vec![];
    for (i, (ch, x)) in chans.into_iter().zip(shares).enumerate() {
        let pv = (i == 3).then(|| perm.clone());
        parties.push(tokio::spawn(run(ch, i, x, pv)));
    }
    let mut permuted = vec![];
    let mut back = vec![];
    for party in parties {
        let (p, b) = party.await.unwrap();
        permuted.push(p);
        back.push(b);
    }
    assert_eq!(combine_additive(&permuted), apply_perm(&values, &perm));
    assert_eq!(combine_additive(&back), values);
}

#[tokio::test]
async fn shared_permutation_composes_the_rank_components() {
    let mut rng = rand::rng();
    let values: Vec<u64> = (0..8).map(|_| rand::random()).collect();
    let comps: Vec<Vec<usize>> = (0..3).map(|_| rand_perm_m(&mut rng, values.len())).collect();
    let mut expected = values.clone();
    for comp in &comps {
        expected = apply_inv_perm(&expected, comp);
    }
    let mut shares = share_additive(&mut rng, &values, 3).into_iter();
    let (s0, s1, s2) = (
        shares.next().unwrap(),
        shares.next().unwrap(),
        shares.next().unwrap(),
    );
    let (c0, c1, c2) = channels3();

    let run = |mut ch: SimpleChannel, i: usize, x: Vec<u64>, comp: Vec<usize>| async move {
        let mut dealer = Dealer::setup(&mut ch, i, 3).await.unwrap();
        let permuted = perm_am(&mut ch, &mut dealer, i, 3, &x, &comp).await.unwrap();
        let back = inv_perm_am(&mut ch, &mut dealer, i, 3, &permuted, &comp)
            .await
            .unwrap();
        (permuted, back)
    };
    let (r0, r1, r2) = tokio::join!(
        run(c0, 0, s0, comps[0].clone()),
        run(c1, 1, s1, comps[1].clone()),
        run(c2, 2, s2, comps[2].clone()),
    );
    let (p0, b0) = r0;
    let (p1, b1) = r1;
    let (p2, b2) = r2;
    assert_eq!(combine_additive(&[p0, p1, p2]), expected);
    assert_eq!(combine_additive(&[b0, b1, b2]), values);
}
