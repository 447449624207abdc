//! Outer surfaces: CSV files consumed and produced by the binary.

pub mod csv;
