//! Duoram round trips: oblivious reads see explicit writes, oblivious
//! updates are seen by later reads, pads read as their constant, and
//! the XOR-shared database variant behaves the same.

mod common;

use common::run_trio;
use trioram::core::share::{RegAS, RegXS};
use trioram::dpf::{PreprocItem, RdpfBundle};
use trioram::mpc::{reconstruct_as, reconstruct_xs};
use trioram::net::error::Result;
use trioram::net::MpcTio;
use trioram::oram::{
    explicit_read, explicit_write, init_with, read, update, Duoram, Flat, IndexShare, Pad, Shape,
};

const SIZE: usize = 8;

fn script() -> Vec<PreprocItem> {
    let mut s = vec![
        PreprocItem::MultTriples(256),
        PreprocItem::HalfTriples(64),
        PreprocItem::SelectTriples(64),
    ];
    for depth in 3..=4 {
        s.push(PreprocItem::RdpfTriples {
            depth,
            width: 1,
            count: 32,
        });
    }
    s
}

fn xs_share(tio: &MpcTio, v: u64, r: u64) -> RegXS {
    RegXS::from_share(match tio.player() {
        0 => r,
        1 => v ^ r,
        _ => 0,
    })
}

fn as_share(tio: &MpcTio, v: u64, r: u64) -> RegAS {
    RegAS::from_share(match tio.player() {
        0 => r,
        1 => v.wrapping_sub(r),
        _ => 0,
    })
}

async fn party_additive(mut tio: MpcTio) -> Result<Vec<u64>> {
    let mut oram: Duoram<RegAS> = Duoram::new(tio.player(), SIZE);
    let flat = Flat::whole(SIZE);
    init_with(&mut oram, &flat, |i| 100 + i as u64);

    let mut out = Vec::new();

    // Oblivious read at an XOR-shared index.
    let idx = xs_share(&tio, 5, 0b011);
    let bundle = RdpfBundle::fetch(&mut tio, flat.addr_bits(), 1).await?;
    let v = read(&mut tio, &mut oram, &flat, IndexShare::Xs(idx), &bundle).await?;
    out.push(reconstruct_as(&mut tio, v, 64).await?);

    // Oblivious update at an additively shared index, then read back
    // explicitly.
    let idx = as_share(&tio, 2, 7);
    let bundle = RdpfBundle::fetch(&mut tio, flat.addr_bits(), 1).await?;
    let delta = as_share(&tio, 40, 3);
    update(&mut tio, &mut oram, &flat, IndexShare::As(idx), &bundle, delta).await?;
    let v = explicit_read(&oram, &flat, 2);
    out.push(reconstruct_as(&mut tio, v, 64).await?);

    // The same slot read obliviously: unlike the explicit read, this
    // path reconstructs through the peer-blinded copies and so checks
    // that the update kept them in step with the blinds.
    let idx = xs_share(&tio, 2, 0b110);
    let bundle = RdpfBundle::fetch(&mut tio, flat.addr_bits(), 1).await?;
    let v = read(&mut tio, &mut oram, &flat, IndexShare::Xs(idx), &bundle).await?;
    out.push(reconstruct_as(&mut tio, v, 64).await?);

    // Explicit write at a public index, then oblivious read of it.
    let val = as_share(&tio, 9999, 55);
    explicit_write(&mut tio, &mut oram, &flat, 6, val).await?;
    let idx = xs_share(&tio, 6, 0b101);
    let bundle = RdpfBundle::fetch(&mut tio, flat.addr_bits(), 1).await?;
    let v = read(&mut tio, &mut oram, &flat, IndexShare::Xs(idx), &bundle).await?;
    out.push(reconstruct_as(&mut tio, v, 64).await?);

    // Reads past the end of a Pad return its constant.
    let pad = Pad::new(Flat::sub(0, 5), 16, 0x1234);
    let idx = xs_share(&tio, 11, 0b0110);
    let bundle = RdpfBundle::fetch(&mut tio, pad.addr_bits(), 1).await?;
    let v = read(&mut tio, &mut oram, &pad, IndexShare::Xs(idx), &bundle).await?;
    out.push(reconstruct_as(&mut tio, v, 64).await?);
    // And in-range pad reads see the parent.
    let idx = xs_share(&tio, 3, 0b1100);
    let bundle = RdpfBundle::fetch(&mut tio, pad.addr_bits(), 1).await?;
    let v = read(&mut tio, &mut oram, &pad, IndexShare::Xs(idx), &bundle).await?;
    out.push(reconstruct_as(&mut tio, v, 64).await?);

    Ok(out)
}

async fn party_xor(mut tio: MpcTio) -> Result<Vec<u64>> {
    let mut oram: Duoram<RegXS> = Duoram::new(tio.player(), SIZE);
    let flat = Flat::whole(SIZE);
    init_with(&mut oram, &flat, |i| 0xf0f0 + i as u64);

    let mut out = Vec::new();
    let idx = xs_share(&tio, 4, 0b111);
    let bundle = RdpfBundle::fetch(&mut tio, flat.addr_bits(), 1).await?;
    let v = read(&mut tio, &mut oram, &flat, IndexShare::Xs(idx), &bundle).await?;
    out.push(reconstruct_xs(&mut tio, v, 64).await?);

    // XOR-shared update: += is ^=.
    let bundle = RdpfBundle::fetch(&mut tio, flat.addr_bits(), 1).await?;
    let delta = xs_share(&tio, 0x0f0f, 9);
    update(&mut tio, &mut oram, &flat, IndexShare::Xs(idx), &bundle, delta).await?;
    let v = explicit_read(&oram, &flat, 4);
    out.push(reconstruct_xs(&mut tio, v, 64).await?);

    // And obliviously, through the peer-blinded bookkeeping.
    let bundle = RdpfBundle::fetch(&mut tio, flat.addr_bits(), 1).await?;
    let v = read(&mut tio, &mut oram, &flat, IndexShare::Xs(idx), &bundle).await?;
    out.push(reconstruct_xs(&mut tio, v, 64).await?);

    Ok(out)
}

#[tokio::test]
async fn additive_round_trips() {
    let (p0, p1, _srv) = run_trio(script(), party_additive).await;
    assert_eq!(p0, p1);
    assert_eq!(p0, vec![105, 142, 142, 9999, 0x1234, 103]);
}

#[tokio::test]
async fn xor_round_trips() {
    let (p0, p1, _srv) = run_trio(script(), party_xor).await;
    assert_eq!(p0, p1);
    assert_eq!(p0, vec![0xf0f4, 0xf0f4 ^ 0x0f0f, 0xf0f4 ^ 0x0f0f]);
}
