//! A lazy descent cursor over a tree of shapes.
//!
//! An `OblivIndex` bundles a secret (XOR-shared) index with prefetched
//! RDPF bundles of the depths it will visit, so that all the reads and
//! updates of one descent level spend exactly one bundle between them.
//! `incr` appends one secret bit to the cursor: doubling an XOR share
//! and xoring in a bit share are both local.

use std::collections::VecDeque;

use trioram_core::share::{RegBS, RegXS};
use trioram_core::value::NBits;
use trioram_dpf::RdpfBundle;
use trioram_net::error::Result;
use trioram_net::MpcTio;

pub struct OblivIndex {
    idx: RegXS,
    depth: NBits,
    levels: VecDeque<(NBits, RdpfBundle)>,
}

impl OblivIndex {
    /// A cursor pinned to an existing index share, with a single bundle
    /// at the given depth.
    pub async fn fetch(
        tio: &mut MpcTio,
        idx: RegXS,
        depth: NBits,
        width: u8,
    ) -> Result<OblivIndex> {
        let bundle = RdpfBundle::fetch(tio, depth, width).await?;
        let mut levels = VecDeque::new();
        levels.push_back((depth, bundle));
        Ok(OblivIndex { idx, depth, levels })
    }

    /// A cursor starting above the root (depth 0, index 0) that will
    /// descend through depths `first..=last`, one `incr` per level.
    pub async fn fetch_descent(
        tio: &mut MpcTio,
        first: NBits,
        last: NBits,
        width: u8,
    ) -> Result<OblivIndex> {
        let mut levels = VecDeque::new();
        for depth in first..=last {
            levels.push_back((depth, RdpfBundle::fetch(tio, depth, width).await?));
        }
        Ok(OblivIndex {
            idx: RegXS::default(),
            depth: 0,
            levels,
        })
    }

    /// The current index share.
    #[inline]
    pub fn index(&self) -> RegXS {
        self.idx
    }

    #[inline]
    pub fn depth(&self) -> NBits {
        self.depth
    }

    /// Move the cursor down one level, to the left child (bit 0) or the
    /// right (bit 1) of its current position. Local.
    pub fn incr(&mut self, bit: RegBS) {
        self.idx = RegXS::from_share((self.idx.xshare << 1) ^ bit.bshare as u64);
        self.depth += 1;
    }

    /// Take the bundle for the current depth. Each level's bundle is
    /// consumed exactly once; the reads and updates of that level share
    /// it (and its revealed index offset).
    pub fn bundle(&mut self) -> RdpfBundle {
        let (depth, bundle) = self
            .levels
            .pop_front()
            .expect("obliv index descended past its prefetched depth");
        debug_assert_eq!(depth, self.depth, "bundle depth out of step with cursor");
        bundle
    }
}
