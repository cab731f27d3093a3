//! Socket setup between the three parties.
//!
//! For each connection the lower-numbered party accepts and the
//! higher-numbered party connects, retrying once a second while the
//! listener is not up yet. Authentication is by address; there is no TLS.

use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{debug, warn};

use crate::bearer::Bearer;

/// The port for the P1 -> P0 connections.
pub const PORT_P1_P0: u16 = 2115;
/// The port for the P2 -> P0 connections.
pub const PORT_P2_P0: u16 = 2116;
/// The port for the P2 -> P1 connections.
pub const PORT_P2_P1: u16 = 2117;

async fn connect_retry(addr: &str, port: u16) -> tokio::io::Result<Bearer> {
    loop {
        match Bearer::connect_tcp((addr, port)).await {
            Ok(b) => return Ok(b),
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                warn!("connection to {addr}:{port} refused, will retry");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Establish a computational party's connections: `num_threads` pairs of
/// (peer bearer, server bearer), one pair per worker. `p0_addr` is
/// required for player 1 and ignored for player 0.
pub async fn setup_computational(
    player: u8,
    p0_addr: Option<&str>,
    num_threads: usize,
) -> tokio::io::Result<Vec<(Bearer, Bearer)>> {
    let mut peers = Vec::with_capacity(num_threads);
    let mut servers = Vec::with_capacity(num_threads);
    match player {
        0 => {
            let from_p1 = TcpListener::bind(("0.0.0.0", PORT_P1_P0)).await?;
            let from_p2 = TcpListener::bind(("0.0.0.0", PORT_P2_P0)).await?;
            for i in 0..num_threads {
                let (b, addr) = Bearer::accept_tcp(&from_p1).await?;
                debug!(worker = i, %addr, "accepted P1");
                peers.push(b);
            }
            for i in 0..num_threads {
                let (b, addr) = Bearer::accept_tcp(&from_p2).await?;
                debug!(worker = i, %addr, "accepted P2");
                servers.push(b);
            }
        }
        1 => {
            let p0 = p0_addr.expect("player 1 needs the p0 address");
            let from_p2 = TcpListener::bind(("0.0.0.0", PORT_P2_P1)).await?;
            for _ in 0..num_threads {
                peers.push(connect_retry(p0, PORT_P1_P0).await?);
            }
            for i in 0..num_threads {
                let (b, addr) = Bearer::accept_tcp(&from_p2).await?;
                debug!(worker = i, %addr, "accepted P2");
                servers.push(b);
            }
        }
        _ => panic!("setup_computational is for players 0 and 1"),
    }
    Ok(peers.into_iter().zip(servers).collect())
}

/// Establish the server's connections: `num_threads` pairs of
/// (p0 bearer, p1 bearer).
pub async fn setup_server(
    p0_addr: &str,
    p1_addr: &str,
    num_threads: usize,
) -> tokio::io::Result<Vec<(Bearer, Bearer)>> {
    let mut p0s = Vec::with_capacity(num_threads);
    let mut p1s = Vec::with_capacity(num_threads);
    for _ in 0..num_threads {
        p0s.push(connect_retry(p0_addr, PORT_P2_P0).await?);
    }
    for _ in 0..num_threads {
        p1s.push(connect_retry(p1_addr, PORT_P2_P1).await?);
    }
    Ok(p0s.into_iter().zip(p1s).collect())
}

/// Wire up one worker's worth of all three parties in-process, for tests
/// and local experiments. Returns the bearer pairs in the order the party
/// constructors expect: (p0 peer, p0 server), (p1 peer, p1 server),
/// (server p0, server p1).
pub fn in_process_wiring() -> ((Bearer, Bearer), (Bearer, Bearer), (Bearer, Bearer)) {
    let (p0_peer, p1_peer) = Bearer::pipe();
    let (p0_srv, srv_p0) = Bearer::pipe();
    let (p1_srv, srv_p1) = Bearer::pipe();
    ((p0_peer, p0_srv), (p1_peer, p1_srv), (srv_p0, srv_p1))
}
