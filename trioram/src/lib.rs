//! trioram: three-party secure computation with oblivious data structures.
//!
//! Two computational parties hold secret shares of every value; a third
//! party supplies correlated randomness and never sees user data. On top
//! of that sharing model this workspace provides Duoram (a distributed
//! oblivious RAM) and two oblivious data structures built on it: a
//! min-heap priority queue and a self-balancing AVL search tree. The
//! index and content of every access stay hidden from each single party.
//!
//! This crate only re-exports the stack; depend on the member crates
//! directly if you want a smaller footprint.

#[doc(inline)]
pub use trioram_core as core;

#[doc(inline)]
pub use trioram_crypto as crypto;

#[doc(inline)]
pub use trioram_net as net;

#[doc(inline)]
pub use trioram_mpc as mpc;

#[doc(inline)]
pub use trioram_dpf as dpf;

#[doc(inline)]
pub use trioram_oram as oram;

#[doc(inline)]
pub use trioram_ds as ds;
