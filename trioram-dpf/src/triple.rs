//! RDPF triples and the server's pairs.
//!
//! The computational peers co-generate three RDPFs with the same random
//! target, of which they also hold additive and XOR shares; the server
//! holds one key of DPF 1 (P0's) and one of DPF 2 (P1's) — not a matching
//! pair, so it learns nothing about the target — which is exactly what it
//! needs to maintain the blind vectors and correct oblivious reads.

use trioram_core::share::{RegAS, RegXS};
use trioram_core::value::NBits;
use trioram_core::wire::Wire;
use trioram_crypto::node::DpfNode;
use trioram_mpc::xs_to_as;
use trioram_net::error::Result;
use trioram_net::MpcTio;

use crate::rdpf::{Cursor, Leaf, Rdpf};

/// A computational party's three co-targeted DPF keys plus its shares of
/// the target.
#[derive(Clone, Debug, Default)]
pub struct RdpfTriple {
    pub as_target: RegAS,
    pub xs_target: RegXS,
    pub dpf: [Rdpf; 3],
}

/// The server's two non-matching keys.
#[derive(Clone, Debug, Default)]
pub struct RdpfPair {
    /// P0's key of the triple's DPF 1.
    pub dpf0: Rdpf,
    /// P1's key of the triple's DPF 2.
    pub dpf1: Rdpf,
}

/// What a party holds for one oblivious access: peers a triple, the
/// server a pair.
#[derive(Clone, Debug)]
pub enum RdpfBundle {
    Triple(RdpfTriple),
    Pair(RdpfPair),
}

impl RdpfTriple {
    /// Generate three RDPFs of the given depth with one fresh random
    /// target, shared as XS (sampled) and AS (converted). All three
    /// parties call this during preprocessing; the server serves the
    /// correlated randomness and gets a meaningless value.
    pub async fn generate(
        tio: &mut MpcTio,
        depth: NBits,
        width: u8,
        save_expansion: bool,
    ) -> Result<RdpfTriple> {
        let mut xs_target = RegXS::default();
        if tio.player() < 2 {
            xs_target.randomize(depth);
        }
        let as_target = xs_to_as(tio, xs_target, depth).await?;
        let dpf0 = Rdpf::generate(tio, xs_target, depth, width, save_expansion).await?;
        let dpf1 = Rdpf::generate(tio, xs_target, depth, width, save_expansion).await?;
        let dpf2 = Rdpf::generate(tio, xs_target, depth, width, save_expansion).await?;
        Ok(RdpfTriple {
            as_target,
            xs_target,
            dpf: [dpf0, dpf1, dpf2],
        })
    }

    #[inline]
    pub fn depth(&self) -> NBits {
        self.dpf[0].depth
    }

    #[inline]
    pub fn width(&self) -> u8 {
        self.dpf[0].width
    }

    /// Descend the three DPFs in lock step.
    pub fn descend(
        &self,
        parent: [DpfNode; 3],
        level: NBits,
        dir: bool,
        aes_ops: &mut u64,
    ) -> [DpfNode; 3] {
        [
            self.dpf[0].descend(parent[0], level, dir, aes_ops),
            self.dpf[1].descend(parent[1], level, dir, aes_ops),
            self.dpf[2].descend(parent[2], level, dir, aes_ops),
        ]
    }

    /// The three leaves for one input.
    pub fn leaf(&self, input: u32, aes_ops: &mut u64) -> [Leaf; 3] {
        [
            self.dpf[0].leaf(input, aes_ops),
            self.dpf[1].leaf(input, aes_ops),
            self.dpf[2].leaf(input, aes_ops),
        ]
    }

    /// Preprocessing file prefix for triples of this shape.
    pub fn prefix(depth: NBits, width: u8) -> String {
        format!("rdpf{width}_{depth:02}")
    }

    pub const fn record_size(depth: NBits, width: u8) -> usize {
        16 + 3 * Rdpf::encoded_size(depth, width)
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        self.as_target.write(out);
        self.xs_target.write(out);
        for d in &self.dpf {
            d.encode(out);
        }
    }

    pub fn decode(buf: &[u8]) -> RdpfTriple {
        let mut cur = Cursor { buf, at: 0 };
        let as_target = RegAS::read(cur.take(8));
        let xs_target = RegXS::read(cur.take(8));
        let depth = buf[8 + 8 + 16 + 1 + 1];
        let width = buf[8 + 8 + 16 + 1];
        let dsz = Rdpf::encoded_size(depth, width);
        let dpf0 = Rdpf::decode(cur.take(dsz));
        let dpf1 = Rdpf::decode(cur.take(dsz));
        let dpf2 = Rdpf::decode(cur.take(dsz));
        RdpfTriple {
            as_target,
            xs_target,
            dpf: [dpf0, dpf1, dpf2],
        }
    }
}

impl RdpfPair {
    #[inline]
    pub fn depth(&self) -> NBits {
        self.dpf0.depth
    }

    /// Preprocessing file prefix for pairs of this shape.
    pub fn prefix(depth: NBits, width: u8) -> String {
        format!("rdpfpair{width}_{depth:02}")
    }

    pub const fn record_size(depth: NBits, width: u8) -> usize {
        2 * Rdpf::encoded_size(depth, width)
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        self.dpf0.encode(out);
        self.dpf1.encode(out);
    }

    pub fn decode(buf: &[u8]) -> RdpfPair {
        let depth = buf[16 + 1 + 1];
        let width = buf[16 + 1];
        let dsz = Rdpf::encoded_size(depth, width);
        let mut cur = Cursor { buf, at: 0 };
        RdpfPair {
            dpf0: Rdpf::decode(cur.take(dsz)),
            dpf1: Rdpf::decode(cur.take(dsz)),
        }
    }
}

impl RdpfBundle {
    /// Pop the next precomputed bundle of this shape from the worker's
    /// store: peers read a triple, the server the matched pair.
    pub async fn fetch(tio: &mut MpcTio, depth: NBits, width: u8) -> Result<RdpfBundle> {
        if tio.is_server() {
            let buf = tio
                .pop_record(
                    &RdpfPair::prefix(depth, width),
                    RdpfPair::record_size(depth, width),
                )
                .await?;
            Ok(RdpfBundle::Pair(RdpfPair::decode(&buf)))
        } else {
            let buf = tio
                .pop_record(
                    &RdpfTriple::prefix(depth, width),
                    RdpfTriple::record_size(depth, width),
                )
                .await?;
            Ok(RdpfBundle::Triple(RdpfTriple::decode(&buf)))
        }
    }

    pub fn depth(&self) -> NBits {
        match self {
            RdpfBundle::Triple(t) => t.depth(),
            RdpfBundle::Pair(p) => p.depth(),
        }
    }
}
