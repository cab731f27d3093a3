//! Oblivious comparison: exactly one of (lt, eq, gt) is set and matches
//! the signed relation of the shared operands.

mod common;

use common::run_trio;
use trioram::core::share::RegAS;
use trioram::dpf::{Cdpf, PreprocItem};
use trioram::mpc::reconstruct_bs;
use trioram::net::error::Result;
use trioram::net::MpcTio;

fn script() -> Vec<PreprocItem> {
    vec![PreprocItem::Cdpfs(64)]
}

fn as_share(tio: &MpcTio, v: u64, r: u64) -> RegAS {
    RegAS::from_share(match tio.player() {
        0 => r,
        1 => v.wrapping_sub(r),
        _ => 0,
    })
}

async fn party(mut tio: MpcTio) -> Result<Vec<(bool, bool, bool)>> {
    let cases: [(u64, u64); 9] = [
        (3, 5),
        (5, 3),
        (7, 7),
        (0, 0),
        (0, 1),
        (1, 0),
        (u64::MAX, 0),           // -1 vs 0 signed
        (0, u64::MAX),           // 0 vs -1
        (1 << 63, 0),            // most negative vs 0
    ];
    let mut out = Vec::new();
    for (i, (x, y)) in cases.iter().enumerate() {
        let xs = as_share(&tio, *x, 0x1111 * (i as u64 + 1));
        let ys = as_share(&tio, *y, 0x2222 * (i as u64 + 1));
        let cdpf = Cdpf::fetch(&mut tio).await?;
        let (lt, eq, gt) = cdpf.compare(&mut tio, xs - ys).await?;
        let lt = reconstruct_bs(&mut tio, lt).await?;
        let eq = reconstruct_bs(&mut tio, eq).await?;
        let gt = reconstruct_bs(&mut tio, gt).await?;
        out.push((lt, eq, gt));
    }
    Ok(out)
}

#[tokio::test]
async fn signed_compare_truth_table() {
    let (p0, p1, _srv) = run_trio(script(), party).await;
    assert_eq!(p0, p1);
    let expected = [
        (true, false, false),
        (false, false, true),
        (false, true, false),
        (false, true, false),
        (true, false, false),
        (false, false, true),
        (true, false, false),
        (false, false, true),
        (true, false, false),
    ];
    for (i, (got, want)) in p0.iter().zip(expected.iter()).enumerate() {
        assert_eq!(got, want, "case {i}");
    }
}
