//! Oblivious data structures over Duoram: a min-heap priority queue and
//! a self-balancing AVL search tree. Every access pattern is identical
//! whatever the secret keys and indices are.

pub mod avl;
pub mod heap;

pub use avl::{Avl, Node};
pub use heap::MinHeap;
