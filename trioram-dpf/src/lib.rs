//! Distributed point functions.
//!
//! An RDPF is a pair of keys that evaluate to shares of a vector that is
//! zero everywhere except at a secret random target index; Duoram
//! accesses spend one RDPF triple per oblivious read or update. A CDPF is
//! a comparison DPF: a pair of keys plus target shares that implement
//! oblivious `<`, `=`, `>` in constant rounds.

pub mod cdpf;
pub mod preproc;
pub mod rdpf;
pub mod stream;
pub mod triple;

pub use cdpf::{Cdpf, CDPF_DEPTH};
pub use preproc::{provision, PreprocItem};
pub use rdpf::{leaf_nodes, Leaf, Rdpf, MAX_WIDTH};
pub use stream::{DpfEval, StreamEval};
pub use triple::{RdpfBundle, RdpfPair, RdpfTriple};
