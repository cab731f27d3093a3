//! Streaming evaluation over consecutive leaf indices.
//!
//! Evaluating a whole shape walks 2^depth leaves; holding the path from
//! the root and re-descending only the differing suffix when stepping
//! from index i to i+1 keeps the per-leaf AES cost amortized-constant.
//! An XOR offset may be applied so the cursor emits `leaf(i ^ off)`, and
//! a non-zero start index makes it emit `leaf((start + i) ^ off)`,
//! wrapping at 2^depth.

use trioram_core::value::{Address, NBits};
use trioram_crypto::node::DpfNode;

use crate::rdpf::{Leaf, Rdpf};
use crate::triple::{RdpfPair, RdpfTriple};

/// Anything a [`StreamEval`] can walk: a single RDPF, or a triple/pair of
/// them descending in lock step.
pub trait DpfEval {
    type Node: Copy;
    type LeafOut;

    fn depth(&self) -> NBits;
    fn root(&self) -> Self::Node;
    fn descend(&self, parent: Self::Node, level: NBits, dir: bool, aes_ops: &mut u64)
        -> Self::Node;
    fn leaf_descend(&self, parent: Self::Node, dir: bool, aes_ops: &mut u64) -> Self::LeafOut;
    /// The memoized leaf, if this DPF was expanded.
    fn expanded(&self, index: Address) -> Option<Self::LeafOut>;
}

impl DpfEval for Rdpf {
    type Node = DpfNode;
    type LeafOut = Leaf;

    fn depth(&self) -> NBits {
        self.depth
    }

    fn root(&self) -> DpfNode {
        self.seed
    }

    fn descend(&self, parent: DpfNode, level: NBits, dir: bool, aes_ops: &mut u64) -> DpfNode {
        Rdpf::descend(self, parent, level, dir, aes_ops)
    }

    fn leaf_descend(&self, parent: DpfNode, dir: bool, aes_ops: &mut u64) -> Leaf {
        self.descend_to_leaf(parent, dir, aes_ops)
    }

    fn expanded(&self, index: Address) -> Option<Leaf> {
        if self.has_expansion() {
            Some(self.expansion[index as usize])
        } else {
            None
        }
    }
}

impl DpfEval for RdpfTriple {
    type Node = [DpfNode; 3];
    type LeafOut = [Leaf; 3];

    fn depth(&self) -> NBits {
        self.depth()
    }

    fn root(&self) -> [DpfNode; 3] {
        [self.dpf[0].seed, self.dpf[1].seed, self.dpf[2].seed]
    }

    fn descend(
        &self,
        parent: [DpfNode; 3],
        level: NBits,
        dir: bool,
        aes_ops: &mut u64,
    ) -> [DpfNode; 3] {
        RdpfTriple::descend(self, parent, level, dir, aes_ops)
    }

    fn leaf_descend(&self, parent: [DpfNode; 3], dir: bool, aes_ops: &mut u64) -> [Leaf; 3] {
        [
            self.dpf[0].descend_to_leaf(parent[0], dir, aes_ops),
            self.dpf[1].descend_to_leaf(parent[1], dir, aes_ops),
            self.dpf[2].descend_to_leaf(parent[2], dir, aes_ops),
        ]
    }

    fn expanded(&self, index: Address) -> Option<[Leaf; 3]> {
        if self.dpf[0].has_expansion() {
            Some([
                self.dpf[0].expansion[index as usize],
                self.dpf[1].expansion[index as usize],
                self.dpf[2].expansion[index as usize],
            ])
        } else {
            None
        }
    }
}

impl DpfEval for RdpfPair {
    type Node = [DpfNode; 2];
    type LeafOut = [Leaf; 2];

    fn depth(&self) -> NBits {
        self.depth()
    }

    fn root(&self) -> [DpfNode; 2] {
        [self.dpf0.seed, self.dpf1.seed]
    }

    fn descend(
        &self,
        parent: [DpfNode; 2],
        level: NBits,
        dir: bool,
        aes_ops: &mut u64,
    ) -> [DpfNode; 2] {
        [
            self.dpf0.descend(parent[0], level, dir, aes_ops),
            self.dpf1.descend(parent[1], level, dir, aes_ops),
        ]
    }

    fn leaf_descend(&self, parent: [DpfNode; 2], dir: bool, aes_ops: &mut u64) -> [Leaf; 2] {
        [
            self.dpf0.descend_to_leaf(parent[0], dir, aes_ops),
            self.dpf1.descend_to_leaf(parent[1], dir, aes_ops),
        ]
    }

    fn expanded(&self, index: Address) -> Option<[Leaf; 2]> {
        if self.dpf0.has_expansion() {
            Some([
                self.dpf0.expansion[index as usize],
                self.dpf1.expansion[index as usize],
            ])
        } else {
            None
        }
    }
}

/// A cursor emitting `leaf((start + i) ^ xor_offset)` for i = 0, 1, 2...
pub struct StreamEval<'a, T: DpfEval> {
    dpf: &'a T,
    depth: NBits,
    indexmask: Address,
    xor_offset: Address,
    nextindex: Address,
    /// Interior nodes along the current path; `path[0]` is the root.
    path: Vec<T::Node>,
    /// The (offset-adjusted) index the path was last built for.
    path_index: Option<Address>,
    use_expansion: bool,
}

impl<'a, T: DpfEval> StreamEval<'a, T> {
    pub fn new(dpf: &'a T, start: Address, xor_offset: Address, use_expansion: bool) -> Self {
        let depth = dpf.depth();
        let indexmask = if depth >= 32 {
            !0
        } else {
            (1u32 << depth) - 1
        };
        StreamEval {
            dpf,
            depth,
            indexmask,
            xor_offset: xor_offset & indexmask,
            nextindex: start & indexmask,
            path: Vec::new(),
            path_index: None,
            use_expansion,
        }
    }

    /// The next leaf (or tuple of leaves) from the evaluator.
    pub fn next(&mut self, aes_ops: &mut u64) -> T::LeafOut {
        let shifted = (self.nextindex ^ self.xor_offset) & self.indexmask;
        self.nextindex = self.nextindex.wrapping_add(1) & self.indexmask;

        if self.use_expansion {
            if let Some(leaf) = self.dpf.expanded(shifted) {
                return leaf;
            }
        }

        // Rebuild the path from the highest level whose branch bit
        // changed; the first call builds it all.
        let from_level = match self.path_index {
            None => {
                self.path = vec![self.dpf.root()];
                1
            }
            Some(prev) => {
                let diff = (prev ^ shifted) & self.indexmask;
                if diff == 0 {
                    self.depth as usize
                } else {
                    let h = 31 - diff.leading_zeros() as usize;
                    self.depth as usize - h
                }
            }
        };
        self.path.truncate(from_level.max(1));
        for level in from_level..self.depth as usize {
            let dir = (shifted >> (self.depth as usize - level)) & 1 == 1;
            let node = self
                .dpf
                .descend(self.path[level - 1], level as NBits - 1, dir, aes_ops);
            self.path.push(node);
        }
        self.path_index = Some(shifted);
        let parent = self.path[self.depth as usize - 1];
        self.dpf.leaf_descend(parent, shifted & 1 == 1, aes_ops)
    }
}
