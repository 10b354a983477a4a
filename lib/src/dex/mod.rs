//! In-memory model of the program being packed
//!
//! The packer never looks at instructions. All it needs is the shape of the program: which types
//! exist, which of them have class definitions, how those classes inherit from one another, and
//! which methods and fields they declare. That information lives in the [`class_graph`].

mod access_flags;
pub mod class_graph;
mod names;

pub use access_flags::*;
pub use names::*;
