//! RDPF correctness over the full domain: the three co-generated DPFs
//! of a triple decode to shares of the unit vector (and scaled unit
//! vector) at the shared random target.

mod common;

use common::run_trio;
use trioram::core::share::{RegAS, RegBS, RegXS};
use trioram::dpf::{PreprocItem, RdpfBundle};
use trioram::mpc::{reconstruct_as, reconstruct_bs, reconstruct_xs};
use trioram::net::error::Result;
use trioram::net::MpcTio;

const DEPTH: u8 = 4;

fn script() -> Vec<PreprocItem> {
    vec![PreprocItem::RdpfTriples {
        depth: DEPTH,
        width: 1,
        count: 2,
    }]
}

async fn party(mut tio: MpcTio) -> Result<Vec<u64>> {
    let bundle = RdpfBundle::fetch(&mut tio, DEPTH, 1).await?;
    let triple = match &bundle {
        RdpfBundle::Triple(t) => Some(t.clone()),
        RdpfBundle::Pair(_) => None,
    };

    let mut out = Vec::new();
    // Publish the target (test only!), then check every leaf of every
    // DPF in the triple.
    let xs_t = triple.as_ref().map(|t| t.xs_target).unwrap_or_default();
    let as_t = triple.as_ref().map(|t| t.as_target).unwrap_or_default();
    let target = reconstruct_xs(&mut tio, xs_t, DEPTH).await?;
    let target_as = reconstruct_as(&mut tio, as_t, DEPTH).await?;
    out.push(target);
    out.push(target_as);

    for j in 0..3 {
        for x in 0..(1u32 << DEPTH) {
            let (bs, asv, xsv, m_as, m_xs) = match &triple {
                Some(t) => {
                    let mut aes = 0u64;
                    let leaf = t.dpf[j].leaf(x, &mut aes);
                    (
                        t.dpf[j].unit_bs(&leaf),
                        t.dpf[j].unit_as(&leaf),
                        t.dpf[j].scaled_xs(&leaf, 0),
                        t.dpf[j].scaled_sum[0],
                        t.dpf[j].scaled_xor[0],
                    )
                }
                None => (
                    RegBS::default(),
                    RegAS::default(),
                    RegXS::default(),
                    RegAS::default(),
                    RegXS::default(),
                ),
            };
            let unit_bit = reconstruct_bs(&mut tio, bs).await? as u64;
            let unit_val = reconstruct_as(&mut tio, asv, 64).await?;
            let scaled = reconstruct_xs(&mut tio, xsv, 64).await?;
            let m_as = reconstruct_as(&mut tio, m_as, 64).await?;
            let m_xs = reconstruct_xs(&mut tio, m_xs, 64).await?;
            out.push(unit_bit);
            out.push(unit_val);
            out.push(scaled);
            out.push(m_as);
            out.push(m_xs);
        }
    }
    Ok(out)
}

#[tokio::test]
async fn triple_decodes_point_function() {
    let (p0, p1, _srv) = run_trio(script(), party).await;
    assert_eq!(p0, p1);
    let target = p0[0];
    assert_eq!(p0[1], target, "AS and XS target shares agree");

    let rows = &p0[2..];
    for j in 0..3 {
        for x in 0..(1u64 << DEPTH) {
            let at = (j * (1 << DEPTH) + x as usize) * 5;
            let (unit_bit, unit_val, scaled, _m_as, m_xs) =
                (rows[at], rows[at + 1], rows[at + 2], rows[at + 3], rows[at + 4]);
            let hit = (x == target) as u64;
            assert_eq!(unit_bit, hit, "unit_bs at {x} (dpf {j})");
            assert_eq!(unit_val, hit, "unit_as at {x} (dpf {j})");
            assert_eq!(scaled, m_xs * hit, "scaled_xs at {x} (dpf {j})");
        }
    }
}

#[tokio::test]
async fn scaled_as_sums_to_scale_value() {
    let (p0, _p1, _srv) = run_trio(script(), party).await;
    // The additive scaled decodings across the whole domain must sum to
    // the scale share sum, i.e. reconstruct to M_as at the target and 0
    // elsewhere. unit/scaled coherence was checked above; here we just
    // sanity-check that the published M values are stable across rows.
    let rows = &p0[2..];
    for j in 0..3 {
        let base = j * (1usize << DEPTH) * 5;
        let m0 = rows[base + 3];
        for x in 0..(1usize << DEPTH) {
            assert_eq!(rows[base + x * 5 + 3], m0, "M_as constant across rows");
        }
    }
}
