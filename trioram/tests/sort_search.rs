//! Bitonic sort and oblivious binary search over a sorted flat.

mod common;

use common::run_trio;
use trioram::core::share::RegAS;
use trioram::dpf::PreprocItem;
use trioram::mpc::reconstruct_as;
use trioram::net::error::Result;
use trioram::net::MpcTio;
use trioram::oram::{
    bitonic_sort, init_with, obliv_binary_search, reconstruct, Duoram, Flat,
};

const SIZE: usize = 8;

fn script() -> Vec<PreprocItem> {
    let mut s = vec![
        PreprocItem::MultTriples(1024),
        PreprocItem::HalfTriples(64),
        PreprocItem::SelectTriples(64),
        PreprocItem::Cdpfs(256),
    ];
    // The search pads to the next power of two strictly above SIZE.
    s.push(PreprocItem::RdpfTriples {
        depth: 4,
        width: 1,
        count: 32,
    });
    s
}

fn as_share(tio: &MpcTio, v: u64, r: u64) -> RegAS {
    RegAS::from_share(match tio.player() {
        0 => r,
        1 => v.wrapping_sub(r),
        _ => 0,
    })
}

async fn party(mut tio: MpcTio) -> Result<(Vec<u64>, Vec<u64>)> {
    let mut oram: Duoram<RegAS> = Duoram::new(tio.player(), SIZE);
    let flat = Flat::whole(SIZE);
    let values = [41u64, 7, 199, 7, 0, 88, 154, 3];
    init_with(&mut oram, &flat, |i| values[i]);

    bitonic_sort(&mut tio, &mut oram, &flat).await?;
    let mut sorted = Vec::new();
    for cell in reconstruct(&mut tio, &oram, &flat).await? {
        sorted.push(cell.ashare);
    }

    // Search for several targets in the (now sorted) array.
    let mut found = Vec::new();
    for (i, target) in [88u64, 0, 7, 200].iter().enumerate() {
        let t = as_share(&tio, *target, 0x77 * (i as u64 + 1));
        let idx = obliv_binary_search(&mut tio, &mut oram, &flat, t).await?;
        found.push(reconstruct_as(&mut tio, idx, 64).await?);
    }
    Ok((sorted, found))
}

#[tokio::test]
async fn sort_then_search() {
    let (p0, p1, _srv) = run_trio(script(), party).await;
    assert_eq!(p0, p1);
    let (sorted, found) = p0;
    assert_eq!(sorted, vec![0, 3, 7, 7, 41, 88, 154, 199]);
    // Smallest index holding a value >= target.
    assert_eq!(found, vec![5, 0, 2, 8]);
}
