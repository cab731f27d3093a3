//! Random-target DPFs for oblivious memory access.
//!
//! The two computational parties construct an RDPF collaboratively from
//! an XOR-shared target, with the server contributing SelectTriples. Each
//! party ends up with one key; for any leaf index the two keys' leaves
//! XOR to zero, except at the target where they decode to (unit 1, scaled
//! M). The flag (low) bit of every interior node disagrees between the
//! parties exactly on the path to the target.

use rand::rngs::OsRng;
use rand::RngCore;

use trioram_core::share::{RegAS, RegBS, RegXS};
use trioram_core::value::{inverse, Address, NBits, Value};
use trioram_core::wire::Wire;
use trioram_crypto::node::{get_lsb, set_lsb, xor_if, DpfNode};
use trioram_crypto::prg::{prg, prg_leaf};
use trioram_mpc::reconstruct_choice_batch;
use trioram_net::error::Result;
use trioram_net::MpcTio;

/// The widest leaf any cell type uses: that many independent scaled words
/// per leaf.
pub const MAX_WIDTH: usize = 5;

/// A leaf of a width-`w` RDPF: `leaf_nodes(w)` 128-bit nodes packing
/// 64-bit words. Word 0 is the unit word; words `1..=w` are the scaled
/// words.
pub type Leaf = [DpfNode; MAX_WIDTH];

/// How many 128-bit nodes a width-`w` leaf occupies.
#[inline]
pub const fn leaf_nodes(width: usize) -> usize {
    (width + 2) / 2
}

/// Word `k` of a leaf.
#[inline]
pub fn leaf_word(leaf: &Leaf, k: usize) -> Value {
    if k % 2 == 0 {
        leaf[k / 2] as u64
    } else {
        (leaf[k / 2] >> 64) as u64
    }
}

fn random_node() -> DpfNode {
    let mut b = [0u8; 16];
    OsRng.fill_bytes(&mut b);
    u128::from_le_bytes(b)
}

/// One party's key of a random-target DPF.
#[derive(Clone, Debug, Default)]
pub struct Rdpf {
    /// This party's root node.
    pub seed: DpfNode,
    /// Which of the two keys this is; decides the sign of additive
    /// decodings.
    pub whichhalf: u8,
    /// Number of scaled words per leaf.
    pub width: u8,
    /// Interior correction words, one per level 0..depth-1.
    pub cw: Vec<DpfNode>,
    /// Correction-flag bits, bit ℓ for interior level ℓ.
    pub cfbits: u64,
    /// Tree depth (index bits).
    pub depth: NBits,
    /// Leaf-layer correction for left children.
    pub leaf_cw_l: Leaf,
    /// Leaf-layer correction for right children (word 0's flag bit may
    /// differ from the left one).
    pub leaf_cw_r: Leaf,
    /// Scale the unit word by this to get an additive share of
    /// `[x == target]`.
    pub unit_sum_inverse: Value,
    /// Additive share of the scaling value of each scaled word.
    pub scaled_sum: [RegAS; MAX_WIDTH],
    /// XOR share of the scaling value of each scaled word.
    pub scaled_xor: [RegXS; MAX_WIDTH],
    /// Memoized full expansion (2^depth leaves), if requested.
    pub expansion: Vec<Leaf>,
}

impl Rdpf {
    /// Construct an RDPF of the given depth with the given XOR-shared
    /// target, collaboratively between P0 and P1 with the server
    /// supplying SelectTriples. All three parties call this; the
    /// server's returned key is meaningless but its message pattern
    /// matches.
    ///
    /// Cost: ~2 messages per level plus one word exchanged for the leaf
    /// decoder; 2^{depth+1} local AES operations.
    pub async fn generate(
        tio: &mut MpcTio,
        target: RegXS,
        depth: NBits,
        width: u8,
        save_expansion: bool,
    ) -> Result<Rdpf> {
        debug_assert!(depth >= 1 && depth as usize <= 32);
        debug_assert!(width >= 1 && width as usize <= MAX_WIDTH);
        let player = tio.player();
        let peer = player < 2;
        let ln = leaf_nodes(width as usize);

        let mut dpf = Rdpf {
            seed: set_lsb(random_node(), player == 1),
            whichhalf: player.min(1),
            width,
            depth,
            ..Rdpf::default()
        };

        let mut curlevel = if peer { vec![dpf.seed] } else { Vec::new() };
        // Interior levels. The bit-shared choice bit at level ℓ is bit
        // depth-ℓ-1 of the target.
        for level in 0..depth - 1 {
            let bs_choice = target.bit(depth - level - 1);
            let mut nextlevel = vec![0u128; if peer { 1usize << (level + 1) } else { 0 }];
            let mut sum_l: DpfNode = 0;
            let mut sum_r: DpfNode = 0;
            for (i, &node) in curlevel.iter().enumerate() {
                let l = prg(node, false, tio.aes_ops());
                let r = prg(node, true, tio.aes_ops());
                sum_l ^= l;
                sum_r ^= r;
                nextlevel[2 * i] = l;
                nextlevel[2 * i + 1] = r;
            }

            // Agree on the correction-flag bit: it forces the on-path
            // children's flag bits to differ after correction.
            let my_parity = get_lsb(sum_l ^ sum_r) as u8;
            tio.queue_peer(&[my_parity]);
            tio.round();
            let peer_parity = tio.recv_peer(1).await?[0];
            let cfbit = (my_parity ^ peer_parity) & 1 == 0;
            let cfmask = cfbit as u128;

            // The correction word equalizes the children on the side away
            // from the target; neither party learns which side that is.
            let cw = reconstruct_choice_batch(tio, bs_choice, &[(sum_r ^ cfmask, sum_l)])
                .await?[0];

            if peer {
                for i in 0..curlevel.len() {
                    let flag = get_lsb(curlevel[i]);
                    nextlevel[2 * i] = xor_if(nextlevel[2 * i], cw, flag);
                    nextlevel[2 * i + 1] = xor_if(nextlevel[2 * i + 1], cw ^ cfmask, flag);
                }
                dpf.cw.push(cw);
                dpf.cfbits |= (cfbit as u64) << level;
            }
            curlevel = nextlevel;
        }

        // Leaf level: wide nodes, two correction words (left and right
        // differ in the word-0 flag bit).
        let bs_choice = target.bit(0);
        let mut leaves: Vec<Leaf> =
            vec![[0u128; MAX_WIDTH]; if peer { 1usize << depth } else { 0 }];
        let mut sum_l: Leaf = [0u128; MAX_WIDTH];
        let mut sum_r: Leaf = [0u128; MAX_WIDTH];
        for (i, &node) in curlevel.iter().enumerate() {
            let mut l: Leaf = [0u128; MAX_WIDTH];
            let mut r: Leaf = [0u128; MAX_WIDTH];
            prg_leaf(node, false, ln, &mut l, tio.aes_ops());
            prg_leaf(node, true, ln, &mut r, tio.aes_ops());
            for k in 0..ln {
                sum_l[k] ^= l[k];
                sum_r[k] ^= r[k];
            }
            leaves[2 * i] = l;
            leaves[2 * i + 1] = r;
        }

        let my_parity = get_lsb(sum_l[0] ^ sum_r[0]) as u8;
        tio.queue_peer(&[my_parity]);
        tio.round();
        let peer_parity = tio.recv_peer(1).await?[0];
        let cfbit = (my_parity ^ peer_parity) & 1 == 0;
        let cfmask = cfbit as u128;

        let mut pairs = Vec::with_capacity(ln);
        for k in 0..ln {
            let bake = if k == 0 { cfmask } else { 0 };
            pairs.push((sum_r[k] ^ bake, sum_l[k]));
        }
        let cw = reconstruct_choice_batch(tio, bs_choice, &pairs).await?;

        if peer {
            for k in 0..ln {
                dpf.leaf_cw_l[k] = cw[k];
                dpf.leaf_cw_r[k] = cw[k];
            }
            dpf.leaf_cw_r[0] ^= cfmask;
            for (i, &parent) in curlevel.iter().enumerate() {
                if get_lsb(parent) {
                    for k in 0..ln {
                        leaves[2 * i][k] ^= dpf.leaf_cw_l[k];
                        leaves[2 * i + 1][k] ^= dpf.leaf_cw_r[k];
                    }
                }
            }
        }

        // Decoder constants. The low-word sums over the whole expansion
        // cancel everywhere but the target, and the flag invariant makes
        // the combined sum odd, hence invertible mod 2^64.
        let mut low_sum: Value = 0;
        let mut high_sum = [0u64; MAX_WIDTH];
        let mut high_xor = [0u64; MAX_WIDTH];
        if peer {
            for leaf in &leaves {
                low_sum = low_sum.wrapping_add(leaf_word(leaf, 0));
                for w in 0..width as usize {
                    high_sum[w] = high_sum[w].wrapping_add(leaf_word(leaf, 1 + w));
                    high_xor[w] ^= leaf_word(leaf, 1 + w);
                }
            }
        }
        tio.queue_peer(&low_sum.to_le_bytes());
        tio.round();
        let peer_low_sum =
            Value::from_le_bytes(tio.recv_peer(8).await?.try_into().unwrap());
        if peer {
            let s = if player == 0 {
                low_sum.wrapping_sub(peer_low_sum)
            } else {
                peer_low_sum.wrapping_sub(low_sum)
            };
            dpf.unit_sum_inverse = inverse(s | 1);
            for w in 0..width as usize {
                dpf.scaled_sum[w] = if player == 0 {
                    RegAS::from_share(high_sum[w])
                } else {
                    RegAS::from_share(high_sum[w].wrapping_neg())
                };
                dpf.scaled_xor[w] = RegXS::from_share(high_xor[w]);
            }
            if save_expansion {
                dpf.expansion = leaves;
            }
        }
        Ok(dpf)
    }

    #[inline]
    pub fn depth(&self) -> NBits {
        self.depth
    }

    #[inline]
    pub fn has_expansion(&self) -> bool {
        !self.expansion.is_empty()
    }

    /// Descend one interior level (the parent is at `level`).
    #[inline]
    pub fn descend(&self, parent: DpfNode, level: NBits, dir: bool, aes_ops: &mut u64) -> DpfNode {
        let mut child = prg(parent, dir, aes_ops);
        if get_lsb(parent) {
            child ^= self.cw[level as usize];
            if dir {
                child ^= (self.cfbits >> level) as u128 & 1;
            }
        }
        child
    }

    /// Descend from a parent of leaves to the leaf itself.
    pub fn descend_to_leaf(&self, parent: DpfNode, dir: bool, aes_ops: &mut u64) -> Leaf {
        let ln = leaf_nodes(self.width as usize);
        let mut out: Leaf = [0u128; MAX_WIDTH];
        prg_leaf(parent, dir, ln, &mut out, aes_ops);
        if get_lsb(parent) {
            let cw = if dir { &self.leaf_cw_r } else { &self.leaf_cw_l };
            for k in 0..ln {
                out[k] ^= cw[k];
            }
        }
        out
    }

    /// The leaf for `input`, walking down from the root.
    ///
    /// Cost: depth AES operations (width-adjusted at the last level).
    pub fn leaf(&self, input: Address, aes_ops: &mut u64) -> Leaf {
        if self.has_expansion() {
            return self.expansion[input as usize];
        }
        let mut node = self.seed;
        for level in 0..self.depth - 1 {
            let dir = (input >> (self.depth - 1 - level)) & 1 == 1;
            node = self.descend(node, level, dir, aes_ops);
        }
        self.descend_to_leaf(node, input & 1 == 1, aes_ops)
    }

    /// Memoize the full expansion if it is not already stored.
    pub fn expand(&mut self, aes_ops: &mut u64) {
        if self.has_expansion() {
            return;
        }
        let size = 1usize << self.depth;
        let mut exp = Vec::with_capacity(size);
        for x in 0..size {
            exp.push(self.leaf(x as Address, aes_ops));
        }
        self.expansion = exp;
    }

    /// Bit share of the unit vector at this leaf.
    #[inline]
    pub fn unit_bs(&self, leaf: &Leaf) -> RegBS {
        RegBS::from_share(get_lsb(leaf[0]))
    }

    /// Sign-extended XOR share of the unit vector at this leaf.
    #[inline]
    pub fn unit_xs(&self, leaf: &Leaf) -> RegXS {
        RegXS::from(self.unit_bs(leaf))
    }

    /// Additive share of the unit vector at this leaf.
    #[inline]
    pub fn unit_as(&self, leaf: &Leaf) -> RegAS {
        let mut low = leaf_word(leaf, 0);
        if self.whichhalf == 1 {
            low = low.wrapping_neg();
        }
        RegAS::from_share(low.wrapping_mul(self.unit_sum_inverse))
    }

    /// XOR share of scaled word `w`.
    #[inline]
    pub fn scaled_xs(&self, leaf: &Leaf, w: usize) -> RegXS {
        RegXS::from_share(leaf_word(leaf, 1 + w))
    }

    /// Additive share of scaled word `w`.
    #[inline]
    pub fn scaled_as(&self, leaf: &Leaf, w: usize) -> RegAS {
        let mut high = leaf_word(leaf, 1 + w);
        if self.whichhalf == 1 {
            high = high.wrapping_neg();
        }
        RegAS::from_share(high)
    }

    /// Encoded size of a key of this shape (the expansion is never
    /// stored).
    pub const fn encoded_size(depth: NBits, width: u8) -> usize {
        16 + 1
            + 1
            + 1
            + 16 * (depth as usize - 1)
            + 8
            + 2 * 16 * leaf_nodes(width as usize)
            + 8
            + 8 * width as usize
            + 8 * width as usize
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        self.seed.write(out);
        out.push(self.whichhalf);
        out.push(self.width);
        out.push(self.depth);
        for cw in &self.cw {
            cw.write(out);
        }
        self.cfbits.write(out);
        let ln = leaf_nodes(self.width as usize);
        for k in 0..ln {
            self.leaf_cw_l[k].write(out);
        }
        for k in 0..ln {
            self.leaf_cw_r[k].write(out);
        }
        self.unit_sum_inverse.write(out);
        for w in 0..self.width as usize {
            self.scaled_sum[w].write(out);
        }
        for w in 0..self.width as usize {
            self.scaled_xor[w].write(out);
        }
    }

    pub fn decode(buf: &[u8]) -> Rdpf {
        let mut cur = Cursor { buf, at: 0 };
        let seed = u128::read(cur.take(16));
        let whichhalf = cur.take(1)[0];
        let width = cur.take(1)[0];
        let depth = cur.take(1)[0];
        let mut cw = Vec::with_capacity(depth as usize - 1);
        for _ in 0..depth - 1 {
            cw.push(u128::read(cur.take(16)));
        }
        let cfbits = u64::read(cur.take(8));
        let ln = leaf_nodes(width as usize);
        let mut leaf_cw_l: Leaf = [0u128; MAX_WIDTH];
        let mut leaf_cw_r: Leaf = [0u128; MAX_WIDTH];
        for slot in leaf_cw_l.iter_mut().take(ln) {
            *slot = u128::read(cur.take(16));
        }
        for slot in leaf_cw_r.iter_mut().take(ln) {
            *slot = u128::read(cur.take(16));
        }
        let unit_sum_inverse = u64::read(cur.take(8));
        let mut scaled_sum = [RegAS::default(); MAX_WIDTH];
        let mut scaled_xor = [RegXS::default(); MAX_WIDTH];
        for slot in scaled_sum.iter_mut().take(width as usize) {
            *slot = RegAS::read(cur.take(8));
        }
        for slot in scaled_xor.iter_mut().take(width as usize) {
            *slot = RegXS::read(cur.take(8));
        }
        Rdpf {
            seed,
            whichhalf,
            width,
            cw,
            cfbits,
            depth,
            leaf_cw_l,
            leaf_cw_r,
            unit_sum_inverse,
            scaled_sum,
            scaled_xor,
            expansion: Vec::new(),
        }
    }
}

/// Byte cursor for the decoders.
pub(crate) struct Cursor<'a> {
    pub buf: &'a [u8],
    pub at: usize,
}

impl<'a> Cursor<'a> {
    pub fn take(&mut self, n: usize) -> &'a [u8] {
        let s = &self.buf[self.at..self.at + n];
        self.at += n;
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_geometry() {
        assert_eq!(leaf_nodes(1), 1);
        assert_eq!(leaf_nodes(2), 2);
        assert_eq!(leaf_nodes(3), 2);
        assert_eq!(leaf_nodes(4), 3);
        assert_eq!(leaf_nodes(5), 3);
        let mut leaf: Leaf = [0u128; MAX_WIDTH];
        leaf[0] = (7u128 << 64) | 3;
        leaf[1] = (11u128 << 64) | 9;
        assert_eq!(leaf_word(&leaf, 0), 3);
        assert_eq!(leaf_word(&leaf, 1), 7);
        assert_eq!(leaf_word(&leaf, 2), 9);
        assert_eq!(leaf_word(&leaf, 3), 11);
    }

    #[test]
    fn encoded_size_matches_encoder() {
        let dpf = Rdpf {
            seed: 1,
            whichhalf: 0,
            width: 3,
            cw: vec![0; 9],
            cfbits: 0,
            depth: 10,
            ..Rdpf::default()
        };
        let mut buf = Vec::new();
        dpf.encode(&mut buf);
        assert_eq!(buf.len(), Rdpf::encoded_size(10, 3));
        let back = Rdpf::decode(&buf);
        assert_eq!(back.depth, 10);
        assert_eq!(back.width, 3);
        assert_eq!(back.cw.len(), 9);
    }
}
