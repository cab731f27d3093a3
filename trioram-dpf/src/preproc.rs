//! The preprocessing phase.
//!
//! The server drives a typed stream of bursts: a frame byte, a count,
//! then that many records (RDPF frames carry the depth in the type byte
//! and a width byte before the count). Multiplication triples,
//! half-triples and CDPFs are minted server-side and stored by the
//! peers; RDPF bursts are interactive, with the server serving
//! SelectTriples inline and banking its pair keys at the end of each
//! generation.

use tracing::debug;

use trioram_core::value::NBits;
use trioram_core::wire::Wire;
use trioram_core::{HalfTriple, MultTriple, SelectTriple};
use trioram_net::error::{Error, Result};
use trioram_net::{
    MpcTio, FRAME_CDPF, FRAME_END, FRAME_HALF, FRAME_RDPF_MAX, FRAME_SELECT, FRAME_TRIPLE,
};

use crate::cdpf::Cdpf;
use crate::rdpf::Rdpf;
use crate::triple::{RdpfPair, RdpfTriple};

/// One burst of the preprocessing script.
#[derive(Clone, Copy, Debug)]
pub enum PreprocItem {
    MultTriples(u32),
    HalfTriples(u32),
    SelectTriples(u32),
    Cdpfs(u32),
    RdpfTriples { depth: NBits, width: u8, count: u32 },
}

/// Mint `count` multiplication triples (server) / bank them (peers).
pub async fn preprocess_mult_triples(tio: &mut MpcTio, count: u32) -> Result<()> {
    if tio.is_server() {
        for _ in 0..count {
            let (t0, t1) = MultTriple::generate();
            tio.queue_p0(&trioram_core::wire::to_bytes(&t0));
            tio.queue_p1(&trioram_core::wire::to_bytes(&t1));
        }
        tio.round();
        return Ok(());
    }
    for _ in 0..count {
        let rec = tio.recv_server(MultTriple::SIZE).await?;
        tio.store_record("triples", &rec)?;
    }
    Ok(())
}

/// Mint or bank `count` half-triples.
pub async fn preprocess_halftriples(tio: &mut MpcTio, count: u32) -> Result<()> {
    if tio.is_server() {
        for _ in 0..count {
            let (h0, h1) = HalfTriple::generate();
            tio.queue_p0(&trioram_core::wire::to_bytes(&h0));
            tio.queue_p1(&trioram_core::wire::to_bytes(&h1));
        }
        tio.round();
        return Ok(());
    }
    for _ in 0..count {
        let rec = tio.recv_server(HalfTriple::SIZE).await?;
        tio.store_record("halves", &rec)?;
    }
    Ok(())
}

/// Mint or bank `count` select triples (for online XOR-word selects).
pub async fn preprocess_select_triples(tio: &mut MpcTio, count: u32) -> Result<()> {
    if tio.is_server() {
        for _ in 0..count {
            let (s0, s1) = SelectTriple::generate();
            tio.queue_p0(&trioram_core::wire::to_bytes(&s0));
            tio.queue_p1(&trioram_core::wire::to_bytes(&s1));
        }
        tio.round();
        return Ok(());
    }
    for _ in 0..count {
        let rec = tio.recv_server(SelectTriple::SIZE).await?;
        tio.store_record("selects", &rec)?;
    }
    Ok(())
}

/// Mint or bank `count` CDPF pairs. Generation is local to the server.
pub async fn preprocess_cdpfs(tio: &mut MpcTio, count: u32) -> Result<()> {
    if tio.is_server() {
        let mut aes = 0u64;
        for _ in 0..count {
            let (d0, d1) = Cdpf::generate_random(&mut aes);
            let mut b0 = Vec::with_capacity(Cdpf::RECORD_SIZE);
            let mut b1 = Vec::with_capacity(Cdpf::RECORD_SIZE);
            d0.encode(&mut b0);
            d1.encode(&mut b1);
            tio.queue_p0(&b0);
            tio.queue_p1(&b1);
        }
        *tio.aes_ops() += aes;
        tio.round();
        return Ok(());
    }
    for _ in 0..count {
        let rec = tio.recv_server(Cdpf::RECORD_SIZE).await?;
        tio.store_record("cdpfs", &rec)?;
    }
    Ok(())
}

/// Run `count` interactive RDPF-triple generations of the given shape.
/// Peers bank their triples and forward the server's key of DPF 1 (P0)
/// and DPF 2 (P1); the server banks the resulting non-matching pairs.
pub async fn preprocess_rdpf_triples(
    tio: &mut MpcTio,
    depth: NBits,
    width: u8,
    count: u32,
) -> Result<()> {
    let dsz = Rdpf::encoded_size(depth, width);
    for _ in 0..count {
        let triple = RdpfTriple::generate(tio, depth, width, false).await?;
        if tio.is_server() {
            let from_p0 = tio.recv_p0(dsz).await?;
            let from_p1 = tio.recv_p1(dsz).await?;
            let pair = RdpfPair {
                dpf0: Rdpf::decode(&from_p0),
                dpf1: Rdpf::decode(&from_p1),
            };
            let mut rec = Vec::with_capacity(RdpfPair::record_size(depth, width));
            pair.encode(&mut rec);
            tio.store_record(&RdpfPair::prefix(depth, width), &rec)?;
        } else {
            let mut rec = Vec::with_capacity(RdpfTriple::record_size(depth, width));
            triple.encode(&mut rec);
            tio.store_record(&RdpfTriple::prefix(depth, width), &rec)?;

            // The server's piece: P0 gives up its key of DPF 1, P1 its
            // key of DPF 2.
            let mine = if tio.player() == 0 { 1 } else { 2 };
            let mut piece = Vec::with_capacity(dsz);
            triple.dpf[mine].encode(&mut piece);
            tio.queue_server(&piece);
            tio.round();
        }
    }
    Ok(())
}

async fn run_burst(tio: &mut MpcTio, item: PreprocItem) -> Result<()> {
    debug!(?item, "preprocessing burst");
    match item {
        PreprocItem::MultTriples(n) => preprocess_mult_triples(tio, n).await,
        PreprocItem::HalfTriples(n) => preprocess_halftriples(tio, n).await,
        PreprocItem::SelectTriples(n) => preprocess_select_triples(tio, n).await,
        PreprocItem::Cdpfs(n) => preprocess_cdpfs(tio, n).await,
        PreprocItem::RdpfTriples {
            depth,
            width,
            count,
        } => preprocess_rdpf_triples(tio, depth, width, count).await,
    }
}

/// Server side of the preprocessing phase: frame and run each scripted
/// burst, then signal the end of the stream.
pub async fn run_server(tio: &mut MpcTio, script: &[PreprocItem]) -> Result<()> {
    debug_assert!(tio.is_server() && tio.is_preprocessing());
    for &item in script {
        match item {
            PreprocItem::MultTriples(n) => {
                tio.queue_both(&[FRAME_TRIPLE]);
                tio.queue_both(&n.to_le_bytes());
            }
            PreprocItem::HalfTriples(n) => {
                tio.queue_both(&[FRAME_HALF]);
                tio.queue_both(&n.to_le_bytes());
            }
            PreprocItem::SelectTriples(n) => {
                tio.queue_both(&[FRAME_SELECT]);
                tio.queue_both(&n.to_le_bytes());
            }
            PreprocItem::Cdpfs(n) => {
                tio.queue_both(&[FRAME_CDPF]);
                tio.queue_both(&n.to_le_bytes());
            }
            PreprocItem::RdpfTriples {
                depth,
                width,
                count,
            } => {
                tio.queue_both(&[depth, width]);
                tio.queue_both(&count.to_le_bytes());
            }
        }
        run_burst(tio, item).await?;
    }
    tio.queue_both(&[FRAME_END]);
    tio.round();
    tio.finish_stores()
}

/// Computational-party side: dispatch bursts off the server's framed
/// stream until the end marker.
pub async fn run_computational(tio: &mut MpcTio) -> Result<()> {
    debug_assert!(!tio.is_server() && tio.is_preprocessing());
    loop {
        let ty = tio.recv_server(1).await?[0];
        let item = match ty {
            FRAME_END => break,
            FRAME_TRIPLE => {
                let n = u32::from_le_bytes(tio.recv_server(4).await?.try_into().unwrap());
                PreprocItem::MultTriples(n)
            }
            FRAME_HALF => {
                let n = u32::from_le_bytes(tio.recv_server(4).await?.try_into().unwrap());
                PreprocItem::HalfTriples(n)
            }
            FRAME_SELECT => {
                let n = u32::from_le_bytes(tio.recv_server(4).await?.try_into().unwrap());
                PreprocItem::SelectTriples(n)
            }
            FRAME_CDPF => {
                let n = u32::from_le_bytes(tio.recv_server(4).await?.try_into().unwrap());
                PreprocItem::Cdpfs(n)
            }
            d if (1..=FRAME_RDPF_MAX).contains(&d) => {
                let width = tio.recv_server(1).await?[0];
                let count = u32::from_le_bytes(tio.recv_server(4).await?.try_into().unwrap());
                PreprocItem::RdpfTriples {
                    depth: d,
                    width,
                    count,
                }
            }
            other => return Err(Error::BadFrame(other)),
        };
        run_burst(tio, item).await?;
    }
    tio.finish_stores()
}

/// Run the whole phase for whichever party this context belongs to.
pub async fn provision(tio: &mut MpcTio, script: &[PreprocItem]) -> Result<()> {
    if tio.is_server() {
        run_server(tio, script).await
    } else {
        run_computational(tio).await
    }
}
