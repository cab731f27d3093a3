//! Three-party truth tests for the online MPC primitives.

mod common;

use common::run_trio;
use trioram::core::share::{RegAS, RegBS, RegXS};
use trioram::dpf::PreprocItem;
use trioram::mpc;
use trioram::net::error::Result;
use trioram::net::MpcTio;

fn script() -> Vec<PreprocItem> {
    vec![
        PreprocItem::MultTriples(256),
        PreprocItem::HalfTriples(256),
        PreprocItem::SelectTriples(64),
    ]
}

fn as_share(tio: &MpcTio, v: u64, r: u64) -> RegAS {
    RegAS::from_share(match tio.player() {
        0 => r,
        1 => v.wrapping_sub(r),
        _ => 0,
    })
}

fn xs_share(tio: &MpcTio, v: u64, r: u64) -> RegXS {
    RegXS::from_share(match tio.player() {
        0 => r,
        1 => v ^ r,
        _ => 0,
    })
}

fn bs_share(tio: &MpcTio, v: bool, r: bool) -> RegBS {
    RegBS::from_share(match tio.player() {
        0 => r,
        1 => v ^ r,
        _ => false,
    })
}

async fn party(mut tio: MpcTio) -> Result<Vec<u64>> {
    let mut out = Vec::new();

    // mul
    let x = as_share(&tio, 7, 0xdead_beef);
    let y = as_share(&tio, 6, 0x1234_5678_9abc);
    let z = mpc::mul(&mut tio, x, y, 64).await?;
    out.push(mpc::reconstruct_as(&mut tio, z, 64).await?);

    // flagmult, both flag values
    let y = as_share(&tio, 1000, 3);
    for flag in [false, true] {
        let f = bs_share(&tio, flag, true);
        let z = mpc::flagmult(&mut tio, f, y, 64).await?;
        out.push(mpc::reconstruct_as(&mut tio, z, 64).await?);
    }

    // select
    let f = bs_share(&tio, true, false);
    let a = as_share(&tio, 111, 17);
    let b = as_share(&tio, 222, 18);
    let z = mpc::select(&mut tio, f, a, b, 64).await?;
    out.push(mpc::reconstruct_as(&mut tio, z, 64).await?);

    // oswap with the flag set
    let f = bs_share(&tio, true, true);
    let mut a = as_share(&tio, 5, 100);
    let mut b = as_share(&tio, 9, 200);
    mpc::oswap(&mut tio, &mut a, &mut b, f, 64).await?;
    out.push(mpc::reconstruct_as(&mut tio, a, 64).await?);
    out.push(mpc::reconstruct_as(&mut tio, b, 64).await?);

    // xs_to_as
    let x = xs_share(&tio, 0xfeed_f00d, 0x5555_5555);
    let z = mpc::xs_to_as(&mut tio, x, 64).await?;
    out.push(mpc::reconstruct_as(&mut tio, z, 64).await?);

    // and / or over the whole truth table
    for (p, q) in [(false, false), (false, true), (true, false), (true, true)] {
        let f = bs_share(&tio, p, true);
        let g = bs_share(&tio, q, false);
        let z = mpc::and(&mut tio, f, g).await?;
        out.push(mpc::reconstruct_bs(&mut tio, z).await? as u64);
        let z = mpc::or(&mut tio, f, g).await?;
        out.push(mpc::reconstruct_bs(&mut tio, z).await? as u64);
    }

    // select_xs / select_bs
    let f = bs_share(&tio, true, true);
    let a = xs_share(&tio, 0xaaaa, 1);
    let b = xs_share(&tio, 0xbbbb, 2);
    let z = mpc::select_xs(&mut tio, f, a, b).await?;
    out.push(mpc::reconstruct_xs(&mut tio, z, 64).await?);
    let fa = bs_share(&tio, false, true);
    let sel_a = bs_share(&tio, true, false);
    let sel_b = bs_share(&tio, false, false);
    let z = mpc::select_bs(&mut tio, fa, sel_a, sel_b)
        .await?;
    out.push(mpc::reconstruct_bs(&mut tio, z).await? as u64);

    Ok(out)
}

#[tokio::test]
async fn primitive_truth_tables() {
    let (p0, p1, srv) = run_trio(script(), party).await;
    let expected: Vec<u64> = vec![
        42,   // mul
        0,    // flagmult off
        1000, // flagmult on
        222,  // select picks y
        9, 5, // oswap swapped
        0xfeed_f00d, // xs_to_as
        // and/or truth table rows
        0, 0, 0, 1, 0, 1, 1, 1,
        0xbbbb, // select_xs picks y
        1,      // select_bs picks x (flag clear)
    ];
    assert_eq!(p0, expected);
    assert_eq!(p1, expected);
    // The server learns the published values too.
    assert_eq!(srv, expected);
}
