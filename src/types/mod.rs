//! Shared primitive types and the binary wire codec.

pub mod encoding;
