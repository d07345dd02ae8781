//! # fk2ck Core
//! Conversion of fixed-offset (class 4) frame definitions, spread over a history of
//! frame kernels, into a single CK which a class 3 frame kernel can point at.
//!
//! The crate carries its own kernel store, so no part of the SPICE toolkit is needed:
//! text kernels, type 1 spacecraft clocks, DAF files, and type 2 CK segments are all
//! read and written here.
//!
//! The conversion itself is three steps:
//! - [`schedule`](schedule::schedule) orders the historical kernels into windows.
//! - [`build`](builder::build) writes one segment per window and frame.
//! - [`validate`](validate::validate) compares the CK against the historical kernels.
//!

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]

pub mod builder;
pub mod config;
pub mod errors;
pub mod io;
pub mod schedule;
pub mod spice;
pub mod validate;

#[cfg(test)]
mod test_kernels;

/// Common useful imports
pub mod prelude {
    pub use crate::builder::build;
    pub use crate::config::{create, test, ConversionConfig};
    pub use crate::errors::{ConvResult, Error};
    pub use crate::schedule::{schedule, Window, WindowStop, OPEN_ENDED_THRESHOLD};
    pub use crate::spice::{KernelSet, KernelStore, Segment};
    pub use crate::validate::{validate, ValidationResult};
}
