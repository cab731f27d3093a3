//! Oblivious bitonic sort.
//!
//! The standard bitonic network over a power-of-two flat; every
//! comparator is one CDPF compare plus an oblivious swap, written back
//! through blind-refreshing explicit updates. The network's indices are
//! public, so no DPF accesses are needed.

use trioram_core::share::RegAS;
use trioram_dpf::Cdpf;
use trioram_net::error::Result;
use trioram_net::MpcTio;

use crate::access::{explicit_read, explicit_update_batch};
use crate::duoram::Duoram;
use crate::shape::{Flat, Shape};

/// Sort the flat ascending. The length must be a power of two.
pub async fn bitonic_sort(
    tio: &mut MpcTio,
    oram: &mut Duoram<RegAS>,
    flat: &Flat,
) -> Result<()> {
    let n = flat.len();
    assert!(n.is_power_of_two(), "bitonic network needs a power of two");
    let mut k = 2;
    while k <= n {
        let mut j = k / 2;
        while j > 0 {
            for i in 0..n {
                let l = i ^ j;
                if l > i {
                    let ascending = i & k == 0;
                    compare_swap(tio, oram, flat, i, l, ascending).await?;
                }
            }
            j /= 2;
        }
        k *= 2;
    }
    Ok(())
}

/// One comparator: leave (a, b) ordered according to `ascending`.
async fn compare_swap(
    tio: &mut MpcTio,
    oram: &mut Duoram<RegAS>,
    flat: &Flat,
    i: usize,
    l: usize,
    ascending: bool,
) -> Result<()> {
    let mut a = explicit_read(oram, flat, i);
    let mut b = explicit_read(oram, flat, l);
    let a0 = a;
    let b0 = b;
    let cdpf = Cdpf::fetch(tio).await?;
    let diff = if ascending { a - b } else { b - a };
    let (_lt, _eq, gt) = cdpf.compare(tio, diff).await?;
    trioram_mpc::oswap(tio, &mut a, &mut b, gt, 64).await?;
    explicit_update_batch(tio, oram, flat, &[(i, a - a0), (l, b - b0)]).await
}
