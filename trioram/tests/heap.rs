//! Oblivious min-heap: invariant preservation, extraction order, and
//! the one-element double-extract behavior.

mod common;

use common::{run_trio, standard_script};
use trioram::core::share::RegAS;
use trioram::ds::heap::HEAP_SENTINEL;
use trioram::ds::MinHeap;
use trioram::mpc::reconstruct_as;
use trioram::net::error::Result;
use trioram::net::MpcTio;

const SIZE: usize = 16;

fn as_share(tio: &MpcTio, v: u64, r: u64) -> RegAS {
    RegAS::from_share(match tio.player() {
        0 => r,
        1 => v.wrapping_sub(r),
        _ => 0,
    })
}

async fn extract_from_sequential(mut tio: MpcTio) -> Result<Vec<u64>> {
    let mut heap = MinHeap::new(tio.player(), SIZE);
    heap.init_sequential(7);
    let mut out = Vec::new();
    let min = heap.extract_min(&mut tio, true).await?;
    out.push(reconstruct_as(&mut tio, min, 64).await?);
    heap.verify_heap_property(&mut tio).await?;
    let min = heap.extract_min(&mut tio, false).await?;
    out.push(reconstruct_as(&mut tio, min, 64).await?);
    heap.verify_heap_property(&mut tio).await?;
    Ok(out)
}

async fn insert_then_drain(mut tio: MpcTio) -> Result<Vec<u64>> {
    let mut heap = MinHeap::new(tio.player(), SIZE);
    heap.init();
    let keys = [42u64, 17, 99, 3, 58];
    for (i, k) in keys.iter().enumerate() {
        let v = as_share(&tio, *k, 0x1000 + i as u64);
        // Exercise both insert paths.
        if i % 2 == 0 {
            heap.insert(&mut tio, v).await?;
        } else {
            heap.insert_optimized(&mut tio, v).await?;
        }
        heap.verify_heap_property(&mut tio).await?;
    }
    let mut out = Vec::new();
    for i in 0..keys.len() {
        let min = heap.extract_min(&mut tio, i % 2 == 0).await?;
        out.push(reconstruct_as(&mut tio, min, 64).await?);
        heap.verify_heap_property(&mut tio).await?;
    }
    Ok(out)
}

async fn double_extract_single(mut tio: MpcTio) -> Result<Vec<u64>> {
    let mut heap = MinHeap::new(tio.player(), SIZE);
    heap.init();
    let v = as_share(&tio, 77, 0xabc);
    heap.insert(&mut tio, v).await?;
    let first = heap.extract_min(&mut tio, false).await?;
    let second = heap.extract_min(&mut tio, false).await?;
    Ok(vec![
        reconstruct_as(&mut tio, first, 64).await?,
        reconstruct_as(&mut tio, second, 64).await?,
    ])
}

#[tokio::test]
async fn sequential_heap_extracts_minimum() {
    let (p0, p1, _srv) = run_trio(standard_script(), extract_from_sequential).await;
    assert_eq!(p0, p1);
    assert_eq!(p0, vec![1, 2]);
}

#[tokio::test]
async fn mixed_inserts_drain_in_order() {
    let (p0, p1, _srv) = run_trio(standard_script(), insert_then_drain).await;
    assert_eq!(p0, p1);
    assert_eq!(p0, vec![3, 17, 42, 58, 99]);
}

#[tokio::test]
async fn one_element_heap_yields_element_then_sentinel() {
    let (p0, _p1, _srv) = run_trio(standard_script(), double_extract_single).await;
    assert_eq!(p0, vec![77, HEAP_SENTINEL]);
}
