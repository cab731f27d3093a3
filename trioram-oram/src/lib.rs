//! Duoram: a three-party distributed oblivious RAM.
//!
//! The two computational parties each hold a share of the database, their
//! own blinding vector, and the other party's blinded database; the
//! server holds copies of both blinding vectors. An oblivious access
//! consumes one RDPF triple (peers) / pair (server): the revealed offset
//! between the DPF's random target and the secret index lets everyone
//! evaluate unit and scaled vectors at the right spot without anyone
//! learning the index.

pub mod access;
pub mod cell;
pub mod duoram;
pub mod oblivindex;
pub mod search;
pub mod shape;
pub mod sort;

pub use access::{
    access_many, explicit_read, explicit_update, explicit_update_batch, explicit_write,
    explicit_write_batch, init_fill, init_with, read, reconstruct, unit_vector_bits, update,
    AccessOp, IndexShare,
};
pub use cell::Cell;
pub use duoram::Duoram;
pub use oblivindex::OblivIndex;
pub use search::{first_geq_xs, obliv_binary_search};
pub use shape::{Flat, Pad, Path, Shape, Stride};
pub use sort::bitonic_sort;
