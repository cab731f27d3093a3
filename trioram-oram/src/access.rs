//! Oblivious and explicit access protocols.
//!
//! The key/sign conventions for an access through an RDPF triple with
//! DPFs 0, 1, 2 (the server's pair holds P0's key of DPF 1 and P1's key
//! of DPF 2):
//!
//! Update by `v` (as an offset at the secret index): with revealed
//! per-DPF value offsets `V_j = v - M_j`,
//! - P0: `database += s⁰+u⁰V₀`, `blind -= s¹+u¹V₁`,
//!   `peer_blinded += (s²+u²V₂) - (s⁰+u⁰V₀)`;
//! - P1: `database += s⁰+u⁰V₀`, `blind -= s²+u²V₂`,
//!   `peer_blinded += (s¹+u¹V₁) - (s⁰+u⁰V₀)`;
//! - server mirrors the two blind updates bit-for-bit with its pair keys.
//!
//! Here `u`/`s` are each party's own unit/scaled decodings; subtracting
//! the own-blind share makes the peer's view of `database + blind`
//! computable from the peer's own keys, which is what keeps the update
//! to one round.
//!
//! Read: P0 returns `Σ u² · database + Σ u¹ · (peer_blinded - blind) +
//! S₀` and P1 the mirror image with DPFs 1 and 2 exchanged; the server's
//! corrections `S₀ = Σ u₁² · (b₁ - b₀)` and `S₁ = Σ u₀¹ · (b₀ - b₁)`
//! cancel the blinds. Summing the two parties' outputs then telescopes
//! to the database entry at the secret index.

use trioram_core::share::{RegAS, RegBS, RegXS};
use trioram_core::value::{bit_bytes, mask_bits, Address, Value};
use trioram_core::wire::{read_trunc, write_trunc};
use trioram_dpf::{RdpfBundle, RdpfTriple, StreamEval};
use trioram_net::error::Result;
use trioram_net::MpcTio;

use crate::cell::Cell;
use crate::duoram::Duoram;
use crate::shape::Shape;

/// A secret shared index, additively or XOR shared.
#[derive(Clone, Copy, Debug)]
pub enum IndexShare {
    As(RegAS),
    Xs(RegXS),
}

impl From<RegAS> for IndexShare {
    fn from(r: RegAS) -> Self {
        IndexShare::As(r)
    }
}

impl From<RegXS> for IndexShare {
    fn from(r: RegXS) -> Self {
        IndexShare::Xs(r)
    }
}

/// One oblivious access: a secret index into one or more same-sized
/// shapes (lanes) sharing a single DPF bundle. With `deltas` it is an
/// update of each lane; without, a read of each lane.
pub struct AccessOp<'b, S: Shape, T: Cell> {
    pub shapes: Vec<S>,
    pub index: IndexShare,
    pub bundle: &'b RdpfBundle,
    pub deltas: Option<Vec<T>>,
}

struct PeerOpState<T: Cell> {
    my_off: Value,
    my_voffs: Vec<Vec<T>>, // [dpf j][lane k]
}

fn index_offset_triple(t: &RdpfTriple, index: &IndexShare, mask: Value) -> Value {
    match index {
        IndexShare::Xs(i) => (t.xs_target.xshare ^ i.xshare) & mask,
        IndexShare::As(i) => t.as_target.ashare.wrapping_sub(i.ashare) & mask,
    }
}

fn combine_offset(index: &IndexShare, mine: Value, theirs: Value, mask: Value) -> Address {
    let shift = match index {
        IndexShare::Xs(_) => mine ^ theirs,
        IndexShare::As(_) => mine.wrapping_add(theirs),
    };
    (shift & mask) as Address
}

fn stream_params(index: &IndexShare, shift: Address) -> (Address, Address) {
    match index {
        IndexShare::Xs(_) => (0, shift),
        IndexShare::As(_) => (shift, 0),
    }
}

/// Run a batch of oblivious accesses in one round trip (plus one server
/// reply round when any of them reads). Returns, per op, the read cells
/// (empty for updates).
pub async fn access_many<S: Shape, T: Cell>(
    tio: &mut MpcTio,
    oram: &mut Duoram<T>,
    ops: &mut [AccessOp<'_, S, T>],
) -> Result<Vec<Vec<T>>> {
    let player = tio.player();
    let mut results: Vec<Vec<T>> = Vec::with_capacity(ops.len());
    let mut any_read = false;
    tracing::trace!(ops = ops.len(), "oblivious access batch");

    if player < 2 {
        // Phase one: queue index offsets (peer and server) and, for
        // updates, the per-DPF value offsets (all three to the peer, the
        // blind DPFs' to the server).
        let mut states: Vec<PeerOpState<T>> = Vec::with_capacity(ops.len());
        for op in ops.iter() {
            let t = match op.bundle {
                RdpfBundle::Triple(t) => t,
                RdpfBundle::Pair(_) => unreachable!("peers hold triples"),
            };
            let depth = t.depth();
            let mask = mask_bits(depth);
            let nbytes = bit_bytes(depth);
            let my_off = index_offset_triple(t, &op.index, mask);
            let mut msg = Vec::new();
            write_trunc(my_off, nbytes, &mut msg);
            tio.queue_peer(&msg);
            tio.queue_server(&msg);

            let mut my_voffs = Vec::new();
            if let Some(deltas) = &op.deltas {
                let mut peer_msg = Vec::new();
                let mut srv_msg = Vec::new();
                for j in 0..3 {
                    let mut per_lane = Vec::with_capacity(op.shapes.len());
                    for (k, delta) in deltas.iter().enumerate() {
                        let mut oc = *delta;
                        oc.sub(&T::scale_share(&t.dpf[j], k * T::WIDTH));
                        oc.write(&mut peer_msg);
                        if j > 0 {
                            oc.write(&mut srv_msg);
                        }
                        per_lane.push(oc);
                    }
                    my_voffs.push(per_lane);
                }
                tio.queue_peer(&peer_msg);
                tio.queue_server(&srv_msg);
            } else {
                any_read = true;
            }
            states.push(PeerOpState { my_off, my_voffs });
        }

        tio.round();

        // Phase two: combine with the peer's offsets, then sweep each
        // lane, reading or applying.
        for (op, st) in ops.iter_mut().zip(states.into_iter()) {
            let t = match op.bundle {
                RdpfBundle::Triple(t) => t,
                RdpfBundle::Pair(_) => unreachable!(),
            };
            let depth = t.depth();
            let mask = mask_bits(depth);
            let nbytes = bit_bytes(depth);
            let peer_off = read_trunc(&tio.recv_peer(nbytes).await?);
            let shift = combine_offset(&op.index, st.my_off, peer_off, mask);
            let (start, xoff) = stream_params(&op.index, shift);

            let voffs: Option<Vec<Vec<T>>> = if op.deltas.is_some() {
                let buf = tio
                    .recv_peer(3 * op.shapes.len() * T::SIZE)
                    .await?;
                let mut at = 0;
                let mut all = Vec::with_capacity(3);
                for j in 0..3 {
                    let mut per_lane = Vec::with_capacity(op.shapes.len());
                    for k in 0..op.shapes.len() {
                        let mut v = T::read(&buf[at..at + T::SIZE]);
                        at += T::SIZE;
                        v.add(&st.my_voffs[j][k]);
                        per_lane.push(v);
                    }
                    all.push(per_lane);
                }
                Some(all)
            } else {
                None
            };

            // P0 pairs its own database with DPF 2 and the blinded
            // difference with DPF 1; P1 the other way around. On
            // updates the same split recurs: `other` is the party's own
            // blind DPF (the one whose key the server mirrors), `own`
            // is the peer's, whose share-complement drives the
            // peer-blinded copy.
            let own = if player == 0 { 2usize } else { 1 };
            let other = if player == 0 { 1usize } else { 2 };

            let mut op_result = Vec::new();
            for (k, shape) in op.shapes.iter().enumerate() {
                let mut eval = StreamEval::new(t, start, xoff, false);
                let lane = k * T::WIDTH;
                let mut acc = T::default();
                let mut aes = 0u64;
                for i in 0..shape.len() {
                    let leaves = eval.next(&mut aes);
                    match shape.indexmap(i) {
                        Some(p) => {
                            if let Some(voffs) = &voffs {
                                let mut upd0 = T::scaled(&t.dpf[0], &leaves[0], lane);
                                upd0.add(&T::unit_times(&t.dpf[0], &leaves[0], &voffs[0][k]));
                                let mut updm = T::scaled(&t.dpf[other], &leaves[other], lane);
                                updm.add(&T::unit_times(
                                    &t.dpf[other],
                                    &leaves[other],
                                    &voffs[other][k],
                                ));
                                let mut updo = T::scaled(&t.dpf[own], &leaves[own], lane);
                                updo.add(&T::unit_times(
                                    &t.dpf[own],
                                    &leaves[own],
                                    &voffs[own][k],
                                ));
                                oram.database[p].add(&upd0);
                                oram.blind[p].sub(&updm);
                                oram.peer_blinded[p].add(&updo);
                                oram.peer_blinded[p].sub(&upd0);
                            } else {
                                acc.add(
                                    &oram.database[p].mul_unit(&t.dpf[own], &leaves[own]),
                                );
                                let mut bmb = oram.peer_blinded[p];
                                bmb.sub(&oram.blind[p]);
                                acc.add(&bmb.mul_unit(&t.dpf[other], &leaves[other]));
                            }
                        }
                        None => {
                            assert!(
                                op.deltas.is_none(),
                                "cannot write into shape padding"
                            );
                            // Padding: P0's database share of the pad is
                            // the pad value, P1's view of it arrives via
                            // the blinded difference. Both sides ride
                            // DPF 2, so they combine to padval at the
                            // secret index.
                            let pad = T::fill(shape.padval());
                            if player == 0 {
                                acc.add(&pad.mul_unit(&t.dpf[own], &leaves[own]));
                            } else {
                                acc.add(&pad.mul_unit(&t.dpf[other], &leaves[other]));
                            }
                        }
                    }
                }
                *tio.aes_ops() += aes;
                if op.deltas.is_none() {
                    op_result.push(acc);
                }
            }
            results.push(op_result);
        }

        // Reads complete with the server's blind-cancelling correction.
        for (op, res) in ops.iter().zip(results.iter_mut()) {
            if op.deltas.is_none() {
                let buf = tio.recv_server(op.shapes.len() * T::SIZE).await?;
                for (k, acc) in res.iter_mut().enumerate() {
                    acc.add(&T::read(&buf[k * T::SIZE..(k + 1) * T::SIZE]));
                }
            }
        }
        return Ok(results);
    }

    // Server: combine both parties' offsets, keep the blind copies in
    // sync for updates, supply the corrections for reads.
    for op in ops.iter_mut() {
        let p = match op.bundle {
            RdpfBundle::Pair(p) => p,
            RdpfBundle::Triple(_) => unreachable!("the server holds pairs"),
        };
        let depth = p.depth();
        let mask = mask_bits(depth);
        let nbytes = bit_bytes(depth);
        let nlanes = op.shapes.len();
        let vbytes = if op.deltas.is_some() {
            2 * nlanes * T::SIZE
        } else {
            0
        };
        let from_p0 = tio.recv_p0(nbytes + vbytes).await?;
        let from_p1 = tio.recv_p1(nbytes + vbytes).await?;
        let off0 = read_trunc(&from_p0[..nbytes]);
        let off1 = read_trunc(&from_p1[..nbytes]);
        let shift = combine_offset(&op.index, off0, off1, mask);
        let (start, xoff) = stream_params(&op.index, shift);

        // Value offsets for the two blind DPFs (j = 1, 2), combined.
        let voffs: Option<Vec<Vec<T>>> = if op.deltas.is_some() {
            let mut all = Vec::with_capacity(2);
            let mut at = nbytes;
            for _j in 0..2 {
                let mut per_lane = Vec::with_capacity(nlanes);
                for _k in 0..nlanes {
                    let mut v = T::read(&from_p0[at..at + T::SIZE]);
                    v.add(&T::read(&from_p1[at..at + T::SIZE]));
                    at += T::SIZE;
                    per_lane.push(v);
                }
                all.push(per_lane);
            }
            Some(all)
        } else {
            any_read = true;
            None
        };

        let mut corr0_msg = Vec::new();
        let mut corr1_msg = Vec::new();
        for (k, shape) in op.shapes.iter().enumerate() {
            let mut eval = StreamEval::new(p, start, xoff, false);
            let lane = k * T::WIDTH;
            let mut corr0 = T::default();
            let mut corr1 = T::default();
            let mut aes = 0u64;
            for i in 0..shape.len() {
                let leaves = eval.next(&mut aes);
                let phys = match shape.indexmap(i) {
                    Some(p) => p,
                    None => continue, // pads carry zero blinds
                };
                if let Some(voffs) = &voffs {
                    // Mirror P0's blind update with its key of DPF 1 and
                    // P1's with its key of DPF 2; whichhalf makes the
                    // decodings bit-identical to the owners'.
                    let mut upd0 = T::scaled(&p.dpf0, &leaves[0], lane);
                    upd0.add(&T::unit_times(&p.dpf0, &leaves[0], &voffs[0][k]));
                    oram.blind[phys].sub(&upd0);
                    let mut upd1 = T::scaled(&p.dpf1, &leaves[1], lane);
                    upd1.add(&T::unit_times(&p.dpf1, &leaves[1], &voffs[1][k]));
                    oram.peer_blinded[phys].sub(&upd1);
                } else {
                    let mut b1mb0 = oram.peer_blinded[phys];
                    b1mb0.sub(&oram.blind[phys]);
                    corr0.add(&b1mb0.mul_unit(&p.dpf1, &leaves[1]));
                    let mut b0mb1 = oram.blind[phys];
                    b0mb1.sub(&oram.peer_blinded[phys]);
                    corr1.add(&b0mb1.mul_unit(&p.dpf0, &leaves[0]));
                }
            }
            *tio.aes_ops() += aes;
            if op.deltas.is_none() {
                corr0.write(&mut corr0_msg);
                corr1.write(&mut corr1_msg);
            }
        }
        tio.queue_p0(&corr0_msg);
        tio.queue_p1(&corr1_msg);
        results.push(Vec::new());
    }
    if any_read {
        tio.round();
    }
    Ok(results)
}

/// Oblivious read of one shape at a secret index.
pub async fn read<S: Shape, T: Cell>(
    tio: &mut MpcTio,
    oram: &mut Duoram<T>,
    shape: &S,
    index: IndexShare,
    bundle: &RdpfBundle,
) -> Result<T> {
    let mut ops = [AccessOp {
        shapes: vec![*shape],
        index,
        bundle,
        deltas: None,
    }];
    let mut res = access_many(tio, oram, &mut ops).await?;
    Ok(res.pop().unwrap().pop().unwrap_or_default())
}

/// Oblivious update `A[index] += delta` of one shape.
pub async fn update<S: Shape, T: Cell>(
    tio: &mut MpcTio,
    oram: &mut Duoram<T>,
    shape: &S,
    index: IndexShare,
    bundle: &RdpfBundle,
    delta: T,
) -> Result<()> {
    let mut ops = [AccessOp {
        shapes: vec![*shape],
        index,
        bundle,
        deltas: Some(vec![delta]),
    }];
    access_many(tio, oram, &mut ops).await?;
    Ok(())
}

/// Bit shares of the unit vector `e_idx` over `0..len`, from one
/// prefetched bundle: the peers reveal the offset between the DPF target
/// and `idx` to each other (only), then decode unit bits. No data
/// vectors and no server involvement.
pub async fn unit_vector_bits(
    tio: &mut MpcTio,
    bundle: &RdpfBundle,
    len: usize,
    idx: RegXS,
) -> Result<Vec<RegBS>> {
    if tio.is_server() {
        tio.round();
        return Ok(vec![RegBS::default(); len]);
    }
    let t = match bundle {
        RdpfBundle::Triple(t) => t,
        RdpfBundle::Pair(_) => unreachable!(),
    };
    let depth = t.depth();
    let mask = mask_bits(depth);
    let nbytes = bit_bytes(depth);
    let my_off = (t.xs_target.xshare ^ idx.xshare) & mask;
    let mut msg = Vec::new();
    write_trunc(my_off, nbytes, &mut msg);
    tio.queue_peer(&msg);
    tio.round();
    let theirs = read_trunc(&tio.recv_peer(nbytes).await?);
    let shift = ((my_off ^ theirs) & mask) as Address;

    let dpf = &t.dpf[0];
    let mut eval = StreamEval::new(dpf, 0, shift, false);
    let mut aes = 0u64;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        let leaf = eval.next(&mut aes);
        out.push(dpf.unit_bs(&leaf));
    }
    *tio.aes_ops() += aes;
    Ok(out)
}

/// Read at a public index: purely local.
pub fn explicit_read<S: Shape, T: Cell>(oram: &Duoram<T>, shape: &S, idx: usize) -> T {
    match shape.indexmap(idx) {
        Some(p) => {
            if oram.is_server() {
                T::default()
            } else {
                oram.database[p]
            }
        }
        None => {
            if oram.player() == 0 {
                T::fill(shape.padval())
            } else {
                T::default()
            }
        }
    }
}

/// Add deltas at public indices. No DPFs, but the blinds are refreshed
/// so neither party sees the other's share move in the clear.
///
/// Cost: one cell to the peer and one to the server per item, 1 message.
pub async fn explicit_update_batch<S: Shape, T: Cell>(
    tio: &mut MpcTio,
    oram: &mut Duoram<T>,
    shape: &S,
    items: &[(usize, T)],
) -> Result<()> {
    let mut fresh = Vec::with_capacity(items.len());
    if !tio.is_server() {
        let mut peer_msg = Vec::new();
        let mut srv_msg = Vec::new();
        for (idx, delta) in items {
            let p = shape.indexmap(*idx).expect("cannot write into shape padding");
            let mut r = T::default();
            r.randomize();
            let mut blinded = *delta;
            blinded.add(&r);
            blinded.write(&mut peer_msg);
            r.write(&mut srv_msg);
            fresh.push((p, *delta, r));
        }
        tio.queue_peer(&peer_msg);
        tio.queue_server(&srv_msg);
    }
    tio.round();
    if tio.is_server() {
        let from_p0 = tio.recv_p0(items.len() * T::SIZE).await?;
        let from_p1 = tio.recv_p1(items.len() * T::SIZE).await?;
        for (k, (idx, _)) in items.iter().enumerate() {
            let p = shape.indexmap(*idx).expect("cannot write into shape padding");
            oram.blind[p].add(&T::read(&from_p0[k * T::SIZE..(k + 1) * T::SIZE]));
            oram
                .peer_blinded[p]
                .add(&T::read(&from_p1[k * T::SIZE..(k + 1) * T::SIZE]));
        }
        return Ok(());
    }
    let buf = tio.recv_peer(items.len() * T::SIZE).await?;
    for (k, (p, delta, r)) in fresh.into_iter().enumerate() {
        oram.database[p].add(&delta);
        oram.blind[p].add(&r);
        oram
            .peer_blinded[p]
            .add(&T::read(&buf[k * T::SIZE..(k + 1) * T::SIZE]));
    }
    Ok(())
}

/// `A[idx] += delta` at a public index.
pub async fn explicit_update<S: Shape, T: Cell>(
    tio: &mut MpcTio,
    oram: &mut Duoram<T>,
    shape: &S,
    idx: usize,
    delta: T,
) -> Result<()> {
    explicit_update_batch(tio, oram, shape, &[(idx, delta)]).await
}

/// `A[idx] = value` at a public index: replaces the cell and its blind.
pub async fn explicit_write_batch<S: Shape, T: Cell>(
    tio: &mut MpcTio,
    oram: &mut Duoram<T>,
    shape: &S,
    items: &[(usize, T)],
) -> Result<()> {
    let mut fresh = Vec::with_capacity(items.len());
    if !tio.is_server() {
        let mut peer_msg = Vec::new();
        let mut srv_msg = Vec::new();
        for (idx, value) in items {
            let p = shape.indexmap(*idx).expect("cannot write into shape padding");
            let mut r = T::default();
            r.randomize();
            let mut blinded = *value;
            blinded.add(&r);
            blinded.write(&mut peer_msg);
            r.write(&mut srv_msg);
            fresh.push((p, *value, r));
        }
        tio.queue_peer(&peer_msg);
        tio.queue_server(&srv_msg);
    }
    tio.round();
    if tio.is_server() {
        let from_p0 = tio.recv_p0(items.len() * T::SIZE).await?;
        let from_p1 = tio.recv_p1(items.len() * T::SIZE).await?;
        for (k, (idx, _)) in items.iter().enumerate() {
            let p = shape.indexmap(*idx).expect("cannot write into shape padding");
            oram.blind[p] = T::read(&from_p0[k * T::SIZE..(k + 1) * T::SIZE]);
            oram.peer_blinded[p] = T::read(&from_p1[k * T::SIZE..(k + 1) * T::SIZE]);
        }
        return Ok(());
    }
    let buf = tio.recv_peer(items.len() * T::SIZE).await?;
    for (k, (p, value, r)) in fresh.into_iter().enumerate() {
        oram.database[p] = value;
        oram.blind[p] = r;
        oram.peer_blinded[p] = T::read(&buf[k * T::SIZE..(k + 1) * T::SIZE]);
    }
    Ok(())
}

/// `A[idx] = value` at a public index.
pub async fn explicit_write<S: Shape, T: Cell>(
    tio: &mut MpcTio,
    oram: &mut Duoram<T>,
    shape: &S,
    idx: usize,
    value: T,
) -> Result<()> {
    explicit_write_batch(tio, oram, shape, &[(idx, value)]).await
}

/// Fill a shape with shares of one public word. Local: P0 takes the
/// value, P1 zero, all blinds zero.
pub fn init_fill<S: Shape, T: Cell>(oram: &mut Duoram<T>, shape: &S, value: Value) {
    init_with(oram, shape, |_| value);
}

/// Fill a shape with shares of public per-index words. Local.
pub fn init_with<S: Shape, T: Cell>(
    oram: &mut Duoram<T>,
    shape: &S,
    f: impl Fn(usize) -> Value,
) {
    for i in 0..shape.len() {
        let p = shape.indexmap(i).expect("cannot init shape padding");
        let cell = T::fill(f(i));
        match oram.player() {
            0 => {
                oram.database[p] = cell;
                oram.blind[p] = T::default();
                oram.peer_blinded[p] = T::default();
            }
            1 => {
                oram.database[p] = T::default();
                oram.blind[p] = T::default();
                oram.peer_blinded[p] = cell;
            }
            _ => {
                oram.blind[p] = T::default();
                oram.peer_blinded[p] = T::default();
            }
        }
    }
}

/// Reconstruct a shape's cleartext contents. Test/debug helper for the
/// computational parties; the server learns nothing and returns zeros.
pub async fn reconstruct<S: Shape, T: Cell>(
    tio: &mut MpcTio,
    oram: &Duoram<T>,
    shape: &S,
) -> Result<Vec<T>> {
    if tio.is_server() {
        tio.round();
        return Ok(vec![T::default(); shape.len()]);
    }
    let mut msg = Vec::with_capacity(shape.len() * T::SIZE);
    for i in 0..shape.len() {
        explicit_read(oram, shape, i).write(&mut msg);
    }
    tio.queue_peer(&msg);
    tio.round();
    let buf = tio.recv_peer(shape.len() * T::SIZE).await?;
    let mut out = Vec::with_capacity(shape.len());
    for i in 0..shape.len() {
        let mut mine = explicit_read(oram, shape, i);
        mine.add(&T::read(&buf[i * T::SIZE..(i + 1) * T::SIZE]));
        out.push(mine);
    }
    Ok(out)
}
