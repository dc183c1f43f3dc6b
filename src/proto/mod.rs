//! Protobuf wire definitions.

pub mod wa;

pub use wa::*;
