//! Frame Graph
//!
//! Passes declare the resources they read and write; compiling the graph yields
//! the execution order and rejects reads of resources nothing has produced.

pub mod graph;

pub use graph::*;
