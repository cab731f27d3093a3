//! The cell contract for Duoram element types.
//!
//! A Duoram can hold plain additive or XOR registers, or wide cells: a
//! struct of such registers (a search-tree node, say). A wide cell of W
//! fields consumes W scaled words per DPF leaf so that no two field
//! updates ever share a mask. For XOR-shared fields, `add` and `sub` are
//! both XOR and the unit decoding is the sign-extended unit bit.

use trioram_core::share::{RegAS, RegXS};
use trioram_core::value::Value;
use trioram_core::wire::Wire;
use trioram_dpf::{Leaf, Rdpf};

pub trait Cell: Copy + Default + std::fmt::Debug {
    /// Scaled words per leaf an update of this cell consumes.
    const WIDTH: usize;
    /// Wire size of one share of this cell.
    const SIZE: usize;

    /// A fresh uniformly random share.
    fn randomize(&mut self);

    fn add(&mut self, rhs: &Self);
    fn sub(&mut self, rhs: &Self);
    fn neg(self) -> Self;

    /// Every field set to the same public word (pad values, init fills).
    fn fill(v: Value) -> Self;

    /// Field-wise product of this cell with the unit decodings of
    /// `leaf`: additive fields scale by `unit_as`, XOR fields mask by
    /// the sign-extended unit bit. The workhorse of oblivious reads.
    fn mul_unit(&self, dpf: &Rdpf, leaf: &Leaf) -> Self;

    /// This party's scaled decoding of `leaf`; field w reads scaled word
    /// `lane + w`.
    fn scaled(dpf: &Rdpf, leaf: &Leaf, lane: usize) -> Self;

    /// The DPF's scale constants as a cell share (`scaled_sum` for
    /// additive fields, `scaled_xor` for XOR fields), lanes as above.
    fn scale_share(dpf: &Rdpf, lane: usize) -> Self;

    /// Field-wise product of the unit decodings with a public cell
    /// (the revealed value offsets of an update).
    fn unit_times(dpf: &Rdpf, leaf: &Leaf, v: &Self) -> Self;

    fn write(&self, out: &mut Vec<u8>);
    fn read(buf: &[u8]) -> Self;
}

impl Cell for RegAS {
    const WIDTH: usize = 1;
    const SIZE: usize = 8;

    fn randomize(&mut self) {
        RegAS::randomize(self, 64);
    }

    fn add(&mut self, rhs: &Self) {
        *self += *rhs;
    }

    fn sub(&mut self, rhs: &Self) {
        *self -= *rhs;
    }

    fn neg(self) -> Self {
        -self
    }

    fn fill(v: Value) -> Self {
        RegAS::from_share(v)
    }

    fn mul_unit(&self, dpf: &Rdpf, leaf: &Leaf) -> Self {
        RegAS::from_share(dpf.unit_as(leaf).ashare.wrapping_mul(self.ashare))
    }

    fn scaled(dpf: &Rdpf, leaf: &Leaf, lane: usize) -> Self {
        dpf.scaled_as(leaf, lane)
    }

    fn scale_share(dpf: &Rdpf, lane: usize) -> Self {
        dpf.scaled_sum[lane]
    }

    fn unit_times(dpf: &Rdpf, leaf: &Leaf, v: &Self) -> Self {
        RegAS::from_share(dpf.unit_as(leaf).ashare.wrapping_mul(v.ashare))
    }

    fn write(&self, out: &mut Vec<u8>) {
        Wire::write(self, out);
    }

    fn read(buf: &[u8]) -> Self {
        <RegAS as Wire>::read(buf)
    }
}

impl Cell for RegXS {
    const WIDTH: usize = 1;
    const SIZE: usize = 8;

    fn randomize(&mut self) {
        RegXS::randomize(self, 64);
    }

    fn add(&mut self, rhs: &Self) {
        *self ^= *rhs;
    }

    fn sub(&mut self, rhs: &Self) {
        *self ^= *rhs;
    }

    fn neg(self) -> Self {
        self
    }

    fn fill(v: Value) -> Self {
        RegXS::from_share(v)
    }

    fn mul_unit(&self, dpf: &Rdpf, leaf: &Leaf) -> Self {
        RegXS::from_share(dpf.unit_xs(leaf).xshare & self.xshare)
    }

    fn scaled(dpf: &Rdpf, leaf: &Leaf, lane: usize) -> Self {
        dpf.scaled_xs(leaf, lane)
    }

    fn scale_share(dpf: &Rdpf, lane: usize) -> Self {
        dpf.scaled_xor[lane]
    }

    fn unit_times(dpf: &Rdpf, leaf: &Leaf, v: &Self) -> Self {
        RegXS::from_share(dpf.unit_xs(leaf).xshare & v.xshare)
    }

    fn write(&self, out: &mut Vec<u8>) {
        Wire::write(self, out);
    }

    fn read(buf: &[u8]) -> Self {
        <RegXS as Wire>::read(buf)
    }
}
