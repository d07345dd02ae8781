//! File IO related tools

pub mod bytes;
