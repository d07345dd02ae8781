//! Spice replacement methods
//!
//! Everything needed to convert frame kernels into a CK without the SPICE toolkit:
//! text kernels and the kernel pool, type 1 spacecraft clocks, DAF files, type 2 CK
//! segments, and TK / CK reference frames. [`KernelSet`] ties these together behind the
//! [`KernelStore`] interface.
mod ck;
mod daf;
mod frames;
mod pool;
mod sclk;
mod store;
mod text_kernel;

pub use ck::*;
pub use daf::*;
pub use frames::*;
pub use pool::*;
pub use sclk::*;
pub use store::*;
pub use text_kernel::*;
