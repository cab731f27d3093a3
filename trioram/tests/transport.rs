//! Transport-level checks: Lamport agreement between the peers, IO
//! statistics, and inline correlated randomness during preprocessing.

use trioram::core::record::MultTriple;
use trioram::net::error::Result;
use trioram::net::setup::in_process_wiring;
use trioram::net::{MpcTio, TioOptions};

fn scratch(tag: &str) -> std::path::PathBuf {
    let d = std::env::temp_dir().join(format!("trioram-transport-{}-{tag}", std::process::id()));
    std::fs::create_dir_all(&d).unwrap();
    d
}

async fn chatty_party(mut tio: MpcTio) -> Result<(u64, u64)> {
    // A few rounds of peer traffic, then a clock cross-check.
    for i in 0..5u64 {
        tio.queue_peer(&i.to_le_bytes());
        tio.round();
        let _ = tio.recv_peer(8).await?;
    }
    tio.sync_lamport().await?;
    let (a, b) = tio.stats();
    Ok((tio.lamport(), a.bytes_sent + b.bytes_sent))
}

#[tokio::test]
async fn lamport_clocks_agree() {
    let ((p0p, p0s), (p1p, p1s), (sp0, sp1)) = in_process_wiring();
    let d = scratch("lamport");
    let h0 = tokio::spawn(chatty_party(MpcTio::computational(
        0,
        p0p,
        p0s,
        TioOptions::new(d.clone()),
    )));
    let h1 = tokio::spawn(chatty_party(MpcTio::computational(
        1,
        p1p,
        p1s,
        TioOptions::new(d.clone()),
    )));
    let h2 = tokio::spawn(chatty_party(MpcTio::server(sp0, sp1, TioOptions::new(d))));
    let (l0, sent0) = h0.await.unwrap().unwrap();
    let (l1, sent1) = h1.await.unwrap().unwrap();
    let _ = h2.await.unwrap().unwrap();
    assert_eq!(l0, l1);
    // 5 data rounds of 8 bytes plus the 8-byte clock exchange.
    assert_eq!(sent0, 48);
    assert_eq!(sent1, 48);
}

async fn inline_consumer(mut tio: MpcTio) -> Result<MultTriple> {
    tio.triple().await
}

async fn inline_server(mut tio: MpcTio) -> Result<MultTriple> {
    let t = tio.triple().await?;
    tio.round();
    Ok(t)
}

#[tokio::test]
async fn preprocessing_serves_triples_inline() {
    let ((p0p, p0s), (p1p, p1s), (sp0, sp1)) = in_process_wiring();
    let d = scratch("inline");
    let h0 = tokio::spawn(inline_consumer(MpcTio::computational(
        0,
        p0p,
        p0s,
        TioOptions::new(d.clone()).preprocessing(true),
    )));
    let h1 = tokio::spawn(inline_consumer(MpcTio::computational(
        1,
        p1p,
        p1s,
        TioOptions::new(d.clone()).preprocessing(true),
    )));
    let h2 = tokio::spawn(inline_server(MpcTio::server(
        sp0,
        sp1,
        TioOptions::new(d).preprocessing(true),
    )));
    let t0 = h0.await.unwrap().unwrap();
    let t1 = h1.await.unwrap().unwrap();
    let _ = h2.await.unwrap().unwrap();
    // The inline-served pair satisfies the cross-multiplication relation.
    assert_eq!(
        t0.x.wrapping_mul(t1.y).wrapping_add(t1.x.wrapping_mul(t0.y)),
        t0.z.wrapping_add(t1.z)
    );
}
