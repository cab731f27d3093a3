//! In-process three-party test harness.
//!
//! Wires P0, P1 and the server over in-memory pipes, runs a
//! preprocessing phase against the given script, then runs the same
//! async party function in all three roles over fresh pipes and the
//! banked correlated randomness.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use trioram::dpf::preproc::{provision, PreprocItem};
use trioram::net::error::Result;
use trioram::net::setup::in_process_wiring;
use trioram::net::{MpcTio, TioOptions};

static RUN: AtomicUsize = AtomicUsize::new(0);

fn scratch_dirs() -> [PathBuf; 3] {
    let run = RUN.fetch_add(1, Ordering::SeqCst);
    let base = std::env::temp_dir().join(format!(
        "trioram-test-{}-{run}",
        std::process::id()
    ));
    let dirs = [base.join("p0"), base.join("p1"), base.join("p2")];
    for d in &dirs {
        std::fs::create_dir_all(d).unwrap();
    }
    dirs
}

/// Run the preprocessing script, then the party function in all three
/// roles; returns (p0, p1, server) outputs.
pub async fn run_trio<F, Fut, T>(script: Vec<PreprocItem>, party: F) -> (T, T, T)
where
    F: Fn(MpcTio) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let dirs = scratch_dirs();

    // Preprocessing phase.
    let ((p0_peer, p0_srv), (p1_peer, p1_srv), (srv_p0, srv_p1)) = in_process_wiring();
    let script2 = script.clone();
    let script3 = script.clone();
    let d0 = dirs[0].clone();
    let d1 = dirs[1].clone();
    let d2 = dirs[2].clone();
    let h0 = tokio::spawn(async move {
        let mut tio =
            MpcTio::computational(0, p0_peer, p0_srv, TioOptions::new(d0).preprocessing(true));
        provision(&mut tio, &script).await.unwrap();
    });
    let h1 = tokio::spawn(async move {
        let mut tio =
            MpcTio::computational(1, p1_peer, p1_srv, TioOptions::new(d1).preprocessing(true));
        provision(&mut tio, &script2).await.unwrap();
    });
    let h2 = tokio::spawn(async move {
        let mut tio = MpcTio::server(srv_p0, srv_p1, TioOptions::new(d2).preprocessing(true));
        provision(&mut tio, &script3).await.unwrap();
    });
    h0.await.unwrap();
    h1.await.unwrap();
    h2.await.unwrap();

    // Online phase.
    let ((p0_peer, p0_srv), (p1_peer, p1_srv), (srv_p0, srv_p1)) = in_process_wiring();
    let f0 = party.clone();
    let f1 = party.clone();
    let f2 = party;
    let d0 = dirs[0].clone();
    let d1 = dirs[1].clone();
    let d2 = dirs[2].clone();
    let h0 = tokio::spawn(async move {
        let tio = MpcTio::computational(0, p0_peer, p0_srv, TioOptions::new(d0));
        f0(tio).await.unwrap()
    });
    let h1 = tokio::spawn(async move {
        let tio = MpcTio::computational(1, p1_peer, p1_srv, TioOptions::new(d1));
        f1(tio).await.unwrap()
    });
    let h2 = tokio::spawn(async move {
        let tio = MpcTio::server(srv_p0, srv_p1, TioOptions::new(d2));
        f2(tio).await.unwrap()
    });
    (h0.await.unwrap(), h1.await.unwrap(), h2.await.unwrap())
}

/// A script covering the small shapes the data-structure tests use.
pub fn standard_script() -> Vec<PreprocItem> {
    let mut script = vec![
        PreprocItem::MultTriples(8192),
        PreprocItem::HalfTriples(512),
        PreprocItem::SelectTriples(8192),
        PreprocItem::Cdpfs(2048),
    ];
    for depth in 1..=6 {
        script.push(PreprocItem::RdpfTriples {
            depth,
            width: 1,
            count: 320,
        });
    }
    for depth in 1..=5 {
        script.push(PreprocItem::RdpfTriples {
            depth,
            width: 3,
            count: 512,
        });
    }
    script
}
