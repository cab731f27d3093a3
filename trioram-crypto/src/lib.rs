//! Fixed-key AES-128 PRG over 128-bit DPF nodes.

pub mod node;
pub mod prg;

pub use node::{clear_lsb, get_lsb, if_mask, set_lsb, xor_if, DpfNode};
pub use prg::{prg, prg_both, prg_leaf, FIXED_KEY_WORDS};
