//! Comparison DPFs.
//!
//! A pair of depth-57 DPF keys over a notional depth-64 tree: the bottom
//! seven levels are folded into the 128-bit leaf nodes, whose bits are
//! the notional leaves. The two keys' leaves agree everywhere except bit
//! `target & 0x7f` of the block containing the target; interior nodes on
//! the path to the target differ in their flag bits.
//!
//! Given additive shares of `d = x - y`, the parties reveal
//! `S = target - d` (safe: the target is fresh and uniform) and locally
//! cover the wrapped interval `S+1 .. S+2^63-1` with a minimal set of
//! subtrees; XORing the covered flag bits yields a bit share of
//! `[x > y]` under signed interpretation. One leaf probe yields
//! `[x = y]`. A CDPF is consumed by a single comparison; reusing one
//! would leak differences, so the API takes `self` by value.

use rand::rngs::OsRng;
use rand::RngCore;

use trioram_core::share::{RegAS, RegBS, RegXS};
use trioram_core::value::{NBits, Value, VALUE_BITS};
use trioram_core::wire::Wire;
use trioram_crypto::node::{get_lsb, set_lsb, xor_if, DpfNode};
use trioram_crypto::prg::{prg, prg_both};
use trioram_net::error::Result;
use trioram_net::MpcTio;

use crate::rdpf::Cursor;

/// Explicit tree depth: the seven low bits live inside the leaf block.
pub const CDPF_DEPTH: NBits = VALUE_BITS - 7;

/// One party's comparison-DPF key plus its shares of the target.
#[derive(Clone, Debug, Default)]
pub struct Cdpf {
    pub seed: DpfNode,
    pub whichhalf: u8,
    /// 57 correction words; the last is the leaf layer's left-side word.
    pub cw: Vec<DpfNode>,
    pub cfbits: u64,
    /// The leaf layer's right-side correction word.
    pub leaf_cwr: DpfNode,
    pub as_target: RegAS,
    pub xs_target: RegXS,
}

fn random_node() -> DpfNode {
    let mut b = [0u8; 16];
    OsRng.fill_bytes(&mut b);
    u128::from_le_bytes(b)
}

impl Cdpf {
    /// Generate a matched pair of CDPFs for the given target. Entirely
    /// local to the server; no communication.
    pub fn generate(target: Value, aes_ops: &mut u64) -> (Cdpf, Cdpf) {
        let depth = CDPF_DEPTH;
        let mut dpf0 = Cdpf {
            seed: set_lsb(random_node(), false),
            whichhalf: 0,
            ..Cdpf::default()
        };
        let mut dpf1 = Cdpf {
            seed: set_lsb(random_node(), true),
            whichhalf: 1,
            ..Cdpf::default()
        };
        dpf0.as_target.randomize(VALUE_BITS);
        dpf1.as_target = RegAS::from_share(target.wrapping_sub(dpf0.as_target.ashare));
        dpf0.xs_target.randomize(VALUE_BITS);
        dpf1.xs_target = RegXS::from_share(target ^ dpf0.xs_target.xshare);

        // cur0 and cur1 walk the path to the target; they always differ,
        // and differ in their flag bits in particular.
        let mut cur0 = dpf0.seed;
        let mut cur1 = dpf1.seed;

        for curlevel in 0..depth {
            let (left0, right0) = prg_both(cur0, aes_ops);
            let (left1, right1) = prg_both(cur1, aes_ops);

            // Which way lies the target?
            let targetdir = (target >> (VALUE_BITS - curlevel - 1)) & 1 == 1;
            let cfbit = !get_lsb(left0 ^ left1 ^ right0 ^ right1);
            let cfmask = cfbit as u128;
            let flag0 = get_lsb(cur0);
            let flag1 = get_lsb(cur1);
            let cw;
            if curlevel < depth - 1 {
                if !targetdir {
                    // Target to the left: the correction word and bit
                    // make the right children match and the left
                    // children keep differing flag bits. Descend applies
                    // cw to both children and cfbit to the right child,
                    // for whichever party's parent carries the flag.
                    cw = right0 ^ right1 ^ cfmask;
                    cur0 = xor_if(left0, cw, flag0);
                    cur1 = xor_if(left1, cw, flag1);
                } else {
                    // Target to the right: left children match, right
                    // children keep differing flag bits.
                    cw = left0 ^ left1;
                    let cwr = cw ^ cfmask;
                    cur0 = xor_if(right0, cwr, flag0);
                    cur1 = xor_if(right1, cwr, flag1);
                }
            } else {
                // Last level: the children away from the target match,
                // and the target-side children match except for the
                // single target bit inside the 128-bit block. The low
                // bit is not special here; it is block data.
                let loc = (target & 0x7f) as u32;
                let target_set_bit = 1u128 << loc;
                if !targetdir {
                    cw = left0 ^ left1 ^ target_set_bit;
                    let cwr = right0 ^ right1;
                    dpf0.leaf_cwr = cwr;
                    dpf1.leaf_cwr = cwr;
                } else {
                    cw = left0 ^ left1;
                    let cwr = right0 ^ right1 ^ target_set_bit;
                    dpf0.leaf_cwr = cwr;
                    dpf1.leaf_cwr = cwr;
                }
            }
            dpf0.cw.push(cw);
            dpf1.cw.push(cw);
            dpf0.cfbits |= (cfbit as u64) << curlevel;
            dpf1.cfbits |= (cfbit as u64) << curlevel;
        }
        (dpf0, dpf1)
    }

    /// Generate a pair with a fresh random target.
    pub fn generate_random(aes_ops: &mut u64) -> (Cdpf, Cdpf) {
        Cdpf::generate(OsRng.next_u64(), aes_ops)
    }

    /// Pop the next precomputed CDPF from this worker's store. The
    /// server holds no CDPF state and gets a placeholder.
    pub async fn fetch(tio: &mut MpcTio) -> Result<Cdpf> {
        if tio.is_server() {
            return Ok(Cdpf::default());
        }
        let buf = tio.pop_record("cdpfs", Cdpf::RECORD_SIZE).await?;
        Ok(Cdpf::decode(&buf))
    }

    /// Descend one interior level (the parent is at `level`).
    #[inline]
    fn descend(&self, parent: DpfNode, level: NBits, dir: bool, aes_ops: &mut u64) -> DpfNode {
        let mut child = prg(parent, dir, aes_ops);
        if get_lsb(parent) {
            child ^= self.cw[level as usize];
            if dir {
                child ^= (self.cfbits >> level) as u128 & 1;
            }
        }
        child
    }

    /// Descend from the parent of a leaf block to the block.
    #[inline]
    fn descend_to_leaf(&self, parent: DpfNode, dir: bool, aes_ops: &mut u64) -> DpfNode {
        let mut out = prg(parent, dir, aes_ops);
        if get_lsb(parent) {
            out ^= if dir {
                self.leaf_cwr
            } else {
                self.cw[CDPF_DEPTH as usize - 1]
            };
        }
        out
    }

    /// The 128-bit leaf block for a 57-bit block index.
    ///
    /// Cost: 57 AES operations.
    fn leaf_block(&self, block: u64, aes_ops: &mut u64) -> DpfNode {
        let mut node = self.seed;
        for level in 0..CDPF_DEPTH - 1 {
            let dir = (block >> (CDPF_DEPTH - 1 - level)) & 1 == 1;
            node = self.descend(node, level, dir, aes_ops);
        }
        self.descend_to_leaf(node, block & 1 == 1, aes_ops)
    }

    /// XOR of bits `from..=to` of a block: a share of whether the target
    /// sits in those positions of this block.
    fn bits_parity(block: DpfNode, from: u32, to: u32) -> bool {
        let width = to - from + 1;
        let mask = if width == 128 {
            !0u128
        } else {
            ((1u128 << width) - 1) << from
        };
        (block & mask).count_ones() & 1 == 1
    }

    /// XOR the membership shares of the minimal subtree cover of the
    /// full blocks `lo..=hi` into `acc`.
    fn cover_blocks(
        &self,
        node: DpfNode,
        level: NBits,
        node_lo: u64,
        node_hi: u64,
        lo: u64,
        hi: u64,
        acc: &mut bool,
        aes_ops: &mut u64,
    ) {
        if node_hi < lo || node_lo > hi {
            return;
        }
        if lo <= node_lo && node_hi <= hi {
            // An interior node's flag bit is a share of "the target is
            // in this subtree"; a whole leaf block's share is the parity
            // of its 128 bits.
            if level == CDPF_DEPTH {
                *acc ^= Self::bits_parity(node, 0, 127);
            } else {
                *acc ^= get_lsb(node);
            }
            return;
        }
        let mid = node_lo + (node_hi - node_lo) / 2;
        let (lchild, rchild) = if level == CDPF_DEPTH - 1 {
            (
                self.descend_to_leaf(node, false, aes_ops),
                self.descend_to_leaf(node, true, aes_ops),
            )
        } else {
            (
                self.descend(node, level, false, aes_ops),
                self.descend(node, level, true, aes_ops),
            )
        };
        self.cover_blocks(lchild, level + 1, node_lo, mid, lo, hi, acc, aes_ops);
        self.cover_blocks(rchild, level + 1, mid + 1, node_hi, lo, hi, acc, aes_ops);
    }

    /// Membership-parity share of the positions `a..=b` (no wrap).
    fn range_parity(&self, a: u64, b: u64, aes_ops: &mut u64) -> bool {
        let bl = a >> 7;
        let bh = b >> 7;
        if bl == bh {
            return Self::bits_parity(
                self.leaf_block(bl, aes_ops),
                (a & 127) as u32,
                (b & 127) as u32,
            );
        }
        let mut acc = Self::bits_parity(self.leaf_block(bl, aes_ops), (a & 127) as u32, 127)
            ^ Self::bits_parity(self.leaf_block(bh, aes_ops), 0, (b & 127) as u32);
        if bh - bl >= 2 {
            self.cover_blocks(
                self.seed,
                0,
                0,
                (1u64 << CDPF_DEPTH) - 1,
                bl + 1,
                bh - 1,
                &mut acc,
                aes_ops,
            );
        }
        acc
    }

    /// Membership-parity share of the cyclic interval `a..=b` mod 2^64.
    fn cyclic_parity(&self, a: u64, b: u64, aes_ops: &mut u64) -> bool {
        if a <= b {
            return self.range_parity(a, b, aes_ops);
        }
        // Complement of the (possibly empty) gap; the root's flag bit is
        // a share of membership in the whole domain, i.e. of constant 1.
        let mut acc = get_lsb(self.seed);
        if a - b >= 2 {
            acc ^= self.range_parity(b + 1, a - 1, aes_ops);
        }
        acc
    }

    /// Compare the additively shared `diff = x - y` against zero: bit
    /// shares of `(x<y, x=y, x>y)` with exactly one set, under signed
    /// two's-complement interpretation.
    ///
    /// Cost: 1 word exchanged in 1 message; a few hundred local AES
    /// operations; consumes this CDPF.
    pub async fn compare(
        self,
        tio: &mut MpcTio,
        diff: RegAS,
    ) -> Result<(RegBS, RegBS, RegBS)> {
        let mine = self.as_target.ashare.wrapping_sub(diff.ashare);
        tio.queue_peer(&mine.to_le_bytes());
        tio.round();
        let theirs = Value::from_le_bytes(tio.recv_peer(8).await?.try_into().unwrap());
        if tio.is_server() {
            return Ok(Default::default());
        }
        let s = mine.wrapping_add(theirs);

        // diff > 0 as a signed 64-bit value iff target lies in
        // S+1 ..= S+2^63-1 (wrapping).
        let aes_ops = &mut 0u64;
        let gt = RegBS::from_share(self.cyclic_parity(
            s.wrapping_add(1),
            s.wrapping_add((1u64 << 63) - 1),
            aes_ops,
        ));
        // diff == 0 iff the target is exactly S.
        let eq = RegBS::from_share(Self::bits_parity(
            self.leaf_block(s >> 7, aes_ops),
            (s & 127) as u32,
            (s & 127) as u32,
        ));
        let lt = RegBS::from_share(gt.bshare ^ eq.bshare ^ (tio.player() == 0));
        *tio.aes_ops() += *aes_ops;
        Ok((lt, eq, gt))
    }

    /// Is the XOR-shared `x` equal to zero? One leaf probe; consumes
    /// this CDPF.
    pub async fn is_zero(self, tio: &mut MpcTio, x: RegXS) -> Result<RegBS> {
        let mine = self.xs_target.xshare ^ x.xshare;
        tio.queue_peer(&mine.to_le_bytes());
        tio.round();
        let theirs = Value::from_le_bytes(tio.recv_peer(8).await?.try_into().unwrap());
        if tio.is_server() {
            return Ok(RegBS::default());
        }
        let s = mine ^ theirs;
        let aes_ops = &mut 0u64;
        let bit = Self::bits_parity(
            self.leaf_block(s >> 7, aes_ops),
            (s & 127) as u32,
            (s & 127) as u32,
        );
        *tio.aes_ops() += *aes_ops;
        Ok(RegBS::from_share(bit))
    }

    pub const RECORD_SIZE: usize =
        16 + 1 + 16 * CDPF_DEPTH as usize + 8 + 16 + 8 + 8;

    pub fn encode(&self, out: &mut Vec<u8>) {
        self.seed.write(out);
        out.push(self.whichhalf);
        for cw in &self.cw {
            cw.write(out);
        }
        self.cfbits.write(out);
        self.leaf_cwr.write(out);
        self.as_target.write(out);
        self.xs_target.write(out);
    }

    pub fn decode(buf: &[u8]) -> Cdpf {
        let mut cur = Cursor { buf, at: 0 };
        let seed = u128::read(cur.take(16));
        let whichhalf = cur.take(1)[0];
        let mut cw = Vec::with_capacity(CDPF_DEPTH as usize);
        for _ in 0..CDPF_DEPTH {
            cw.push(u128::read(cur.take(16)));
        }
        let cfbits = u64::read(cur.take(8));
        let leaf_cwr = u128::read(cur.take(16));
        let as_target = RegAS::read(cur.take(8));
        let xs_target = RegXS::read(cur.take(8));
        Cdpf {
            seed,
            whichhalf,
            cw,
            cfbits,
            leaf_cwr,
            as_target,
            xs_target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trioram_core::share::combine_bs;

    fn compare_clear(d0: &Cdpf, d1: &Cdpf, diff: i64) -> (bool, bool, bool) {
        // Both parties' local halves of `compare`, with the exchange
        // collapsed: S = target - diff.
        let target = d0.as_target.ashare.wrapping_add(d1.as_target.ashare);
        let s = target.wrapping_sub(diff as u64);
        let mut ops = 0;
        let a = s.wrapping_add(1);
        let b = s.wrapping_add((1u64 << 63) - 1);
        let gt0 = d0.cyclic_parity(a, b, &mut ops);
        let gt1 = d1.cyclic_parity(a, b, &mut ops);
        let eq0 = Cdpf::bits_parity(d0.leaf_block(s >> 7, &mut ops), (s & 127) as u32, (s & 127) as u32);
        let eq1 = Cdpf::bits_parity(d1.leaf_block(s >> 7, &mut ops), (s & 127) as u32, (s & 127) as u32);
        let gt = gt0 ^ gt1;
        let eq = eq0 ^ eq1;
        (!(gt || eq), eq, gt)
    }

    #[test]
    fn truth_table_on_boundaries() {
        let mut ops = 0;
        let (d0, d1) = Cdpf::generate_random(&mut ops);
        for diff in [0i64, 1, -1, 2, -2, 57, -1000, i64::MAX, i64::MIN + 1] {
            let (lt, eq, gt) = compare_clear(&d0, &d1, diff);
            assert_eq!(lt, diff < 0, "lt for {diff}");
            assert_eq!(eq, diff == 0, "eq for {diff}");
            assert_eq!(gt, diff > 0, "gt for {diff}");
        }
    }

    #[test]
    fn off_target_blocks_agree_and_target_block_differs_in_one_bit() {
        let mut ops = 0;
        let target = 0x0123_4567_89ab_cdefu64;
        let (d0, d1) = Cdpf::generate(target, &mut ops);
        let tblock = target >> 7;
        let same = d0.leaf_block(tblock.wrapping_add(5), &mut ops)
            ^ d1.leaf_block(tblock.wrapping_add(5), &mut ops);
        assert_eq!(same, 0);
        let diffbits =
            d0.leaf_block(tblock, &mut ops) ^ d1.leaf_block(tblock, &mut ops);
        assert_eq!(diffbits, 1u128 << (target & 0x7f));
    }

    #[test]
    fn is_zero_probe_matches_target() {
        let mut ops = 0;
        let target = 42u64;
        let (d0, d1) = Cdpf::generate(target, &mut ops);
        // S as the is_zero exchange would compute it for x = 0 shares.
        let s = d0.xs_target.xshare ^ d1.xs_target.xshare;
        assert_eq!(s, target);
        let b0 = Cdpf::bits_parity(d0.leaf_block(s >> 7, &mut ops), (s & 127) as u32, (s & 127) as u32);
        let b1 = Cdpf::bits_parity(d1.leaf_block(s >> 7, &mut ops), (s & 127) as u32, (s & 127) as u32);
        assert!(combine_bs(
            &RegBS::from_share(b0),
            &RegBS::from_share(b1)
        ));
    }
}
