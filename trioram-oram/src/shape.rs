//! Shapes: index-remapped views of a Duoram.
//!
//! A shape never owns data; it maps virtual indices to physical ones and
//! pins the address width an oblivious access needs. Shapes are cheap
//! values; the three parties construct identical shapes from public
//! geometry.

use trioram_core::value::{NBits, Value};

/// The value a [`Pad`] returns beyond the end of its parent.
pub const DEFAULT_PADVAL: Value = 0x7fff_ffff_ffff_ffff;

pub trait Shape: Copy {
    /// Virtual size of this view.
    fn len(&self) -> usize;

    /// Physical index behind a virtual one, or `None` for padding.
    fn indexmap(&self, idx: usize) -> Option<usize>;

    /// The public word padding reads reconstruct to.
    fn padval(&self) -> Value {
        DEFAULT_PADVAL
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Address bits an oblivious index into this shape needs.
    fn addr_bits(&self) -> NBits {
        let mut bits = 1;
        while (1usize << bits) < self.len() {
            bits += 1;
        }
        bits
    }
}

/// A contiguous range of the underlying Duoram (the identity map when it
/// covers the whole thing).
#[derive(Clone, Copy, Debug)]
pub struct Flat {
    pub start: usize,
    pub len: usize,
}

impl Flat {
    /// The whole Duoram.
    pub fn whole(size: usize) -> Self {
        Flat { start: 0, len: size }
    }

    /// A sub-range.
    pub fn sub(start: usize, len: usize) -> Self {
        Flat { start, len }
    }
}

impl Shape for Flat {
    fn len(&self) -> usize {
        self.len
    }

    fn indexmap(&self, idx: usize) -> Option<usize> {
        debug_assert!(idx < self.len);
        Some(self.start + idx)
    }
}

/// Evenly spaced elements of a parent shape: `offset`, then every
/// `stride` elements.
#[derive(Clone, Copy, Debug)]
pub struct Stride<S: Shape> {
    pub parent: S,
    pub offset: usize,
    pub stride: usize,
    pub len: usize,
}

impl<S: Shape> Stride<S> {
    pub fn new(parent: S, offset: usize, stride: usize) -> Self {
        let len = if parent.len() > offset {
            (parent.len() - offset + stride - 1) / stride
        } else {
            0
        };
        Stride {
            parent,
            offset,
            stride,
            len,
        }
    }
}

impl<S: Shape> Shape for Stride<S> {
    fn len(&self) -> usize {
        self.len
    }

    fn indexmap(&self, idx: usize) -> Option<usize> {
        self.parent.indexmap(self.offset + idx * self.stride)
    }
}

/// A virtual extension of a parent shape: reads past the parent's end
/// return a share of `padval`, bit-exactly; writes into the padding are
/// forbidden.
#[derive(Clone, Copy, Debug)]
pub struct Pad<S: Shape> {
    pub parent: S,
    pub padded_len: usize,
    pub padval: Value,
}

impl<S: Shape> Pad<S> {
    pub fn new(parent: S, padded_len: usize, padval: Value) -> Self {
        debug_assert!(padded_len >= parent.len());
        Pad {
            parent,
            padded_len,
            padval,
        }
    }
}

impl<S: Shape> Shape for Pad<S> {
    fn len(&self) -> usize {
        self.padded_len
    }

    fn indexmap(&self, idx: usize) -> Option<usize> {
        if idx < self.parent.len() {
            self.parent.indexmap(idx)
        } else {
            None
        }
    }

    fn padval(&self) -> Value {
        self.padval
    }
}

/// The root-to-leaf path of a 1-based implicit binary tree laid out in a
/// [`Flat`]: virtual index j is the depth-j ancestor of `leaf`.
#[derive(Clone, Copy, Debug)]
pub struct Path {
    pub parent: Flat,
    pub leaf: usize,
    pub len: usize,
}

impl Path {
    pub fn down_to(parent: Flat, leaf: usize) -> Self {
        debug_assert!(leaf >= 1);
        let len = usize::BITS as usize - leaf.leading_zeros() as usize;
        Path { parent, leaf, len }
    }
}

impl Shape for Path {
    fn len(&self) -> usize {
        self.len
    }

    fn indexmap(&self, idx: usize) -> Option<usize> {
        debug_assert!(idx < self.len);
        self.parent.indexmap(self.leaf >> (self.len - 1 - idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_maps_arithmetic_progression() {
        let c = Flat::sub(8, 8);
        let l = Stride::new(c, 0, 2);
        let r = Stride::new(c, 1, 2);
        assert_eq!(l.len(), 4);
        assert_eq!(r.len(), 4);
        assert_eq!(l.indexmap(3), Some(14));
        assert_eq!(r.indexmap(0), Some(9));
    }

    #[test]
    fn pad_pads() {
        let p = Pad::new(Flat::whole(5), 8, 99);
        assert_eq!(p.indexmap(4), Some(4));
        assert_eq!(p.indexmap(5), None);
        assert_eq!(p.padval(), 99);
        assert_eq!(p.addr_bits(), 3);
    }

    #[test]
    fn path_walks_ancestors() {
        let p = Path::down_to(Flat::whole(16), 11);
        // 11 = 0b1011: ancestors 1, 2, 5, 11.
        assert_eq!(p.len(), 4);
        assert_eq!(p.indexmap(0), Some(1));
        assert_eq!(p.indexmap(1), Some(2));
        assert_eq!(p.indexmap(2), Some(5));
        assert_eq!(p.indexmap(3), Some(11));
    }

    #[test]
    fn addr_bits_rounds_up() {
        assert_eq!(Flat::whole(2).addr_bits(), 1);
        assert_eq!(Flat::whole(3).addr_bits(), 2);
        assert_eq!(Flat::whole(16).addr_bits(), 4);
        assert_eq!(Flat::whole(17).addr_bits(), 5);
    }
}
