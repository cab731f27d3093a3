//! Oblivious binary search over sorted additively shared memory.

use trioram_core::share::{RegAS, RegXS};
use trioram_dpf::{Cdpf, RdpfBundle};
use trioram_net::error::Result;
use trioram_net::MpcTio;

use crate::access::{read, IndexShare};
use crate::duoram::Duoram;
use crate::shape::{Flat, Pad, Shape, DEFAULT_PADVAL};

/// Assuming the flat is sorted ascending, obliviously find the smallest
/// index holding a value at least `target`; the answer is the flat's
/// length if every element is smaller. Returns an additive share of the
/// index.
///
/// Classic halving over a power-of-two pad: each step is one oblivious
/// read, one CDPF compare, and two local share adjustments.
pub async fn obliv_binary_search(
    tio: &mut MpcTio,
    oram: &mut Duoram<RegAS>,
    flat: &Flat,
    target: RegAS,
) -> Result<RegAS> {
    if flat.len() == 0 {
        return Ok(RegAS::default());
    }
    // The smallest power of two strictly greater than the flat size.
    let mut padsize = 1usize;
    let mut depth = 0u8;
    while padsize <= flat.len() {
        padsize *= 2;
        depth += 1;
    }
    let pad = Pad::new(*flat, padsize, DEFAULT_PADVAL);

    // Invariant: index points at the last element of the left half of
    // the remaining range, which is 2^depth wide.
    let mut index = RegAS::default();
    if tio.player() == 0 {
        index.set((1u64 << (depth - 1)) - 1);
    }
    while depth > 0 {
        let bundle = RdpfBundle::fetch(tio, pad.addr_bits(), 1).await?;
        let val = read(tio, oram, &pad, IndexShare::As(index), &bundle).await?;
        let cdpf = Cdpf::fetch(tio).await?;
        let (lt, _eq, _gt) = cdpf.compare(tio, val - target).await?;
        if depth > 1 {
            // If val >= target the answer is here or to the left, so
            // move 2^{depth-2} left; otherwise strictly right, move
            // 2^{depth-2} right. Unconditionally subtract 2^{depth-2}
            // and add back lt * 2^{depth-1}.
            let mut uncond = RegAS::default();
            if tio.player() == 0 {
                uncond.set(1u64 << (depth - 2));
            }
            let mut cond = RegAS::default();
            if tio.player() == 0 {
                cond.set(1u64 << (depth - 1));
            }
            let condprod = trioram_mpc::flagmult(tio, lt, cond, 64).await?;
            index -= uncond;
            index += condprod;
        } else {
            // Range of width 2, pointing at its first element: stay if
            // val >= target, else step right.
            let mut cond = RegAS::default();
            if tio.player() == 0 {
                cond.set(1);
            }
            let condprod = trioram_mpc::flagmult(tio, lt, cond, 64).await?;
            index += condprod;
        }
        depth -= 1;
    }
    Ok(index)
}

/// First-index-≥ search that assembles the answer as an XOR share, bit
/// by bit from the top: at each level probe the last element of the
/// candidate left half; descend right exactly when it is still below the
/// target. The pad value serves as an always-≥ sentinel, so an answer
/// exists whenever `target` is at most the pad value.
pub async fn first_geq_xs<S: Shape>(
    tio: &mut MpcTio,
    oram: &mut Duoram<RegAS>,
    shape: &S,
    target: RegAS,
) -> Result<RegXS> {
    let padsize = shape.len().next_power_of_two().max(2);
    let depth = padsize.trailing_zeros() as u8;
    let pad = Pad::new(*shape, padsize, DEFAULT_PADVAL);

    let mut idx = RegXS::default();
    for level in 0..depth {
        let b = depth - 1 - level;
        // The probe is the current prefix with all bits below b set:
        // both low regions of idx are still zero, so P0 can set them
        // publicly.
        let mut probe = idx;
        if tio.player() == 0 {
            probe.xshare ^= (1u64 << b) - 1;
        }
        let bundle = RdpfBundle::fetch(tio, pad.addr_bits(), 1).await?;
        let val = read(tio, oram, &pad, IndexShare::Xs(probe), &bundle).await?;
        let cdpf = Cdpf::fetch(tio).await?;
        let (lt, _eq, _gt) = cdpf.compare(tio, val - target).await?;
        idx.xshare ^= (lt.bshare as u64) << b;
    }
    Ok(idx)
}
