//! Kernel files for tests, written into a temporary directory.
//!
//! The frame tree mimics a spacecraft with an instrument base and two instrument
//! frames, SC_HIGH and SC_LOW. The current frame kernel defines the instrument frames
//! as CK frames, historical kernels define them as fixed offsets from SC_BASE.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Clock -64 with 65536 ticks per second, parallel time in TDB.
pub const CLOCK_KERNEL: &str = r"
KPL/SCLK

\begindata
DELTET/DELTA_T_A = 32.184
DELTET/K         = 1.657D-3
DELTET/EB        = 1.671D-2
DELTET/M         = ( 6.239996D0 1.99096871D-7 )

SCLK_KERNEL_ID            = ( @2018-10-20/00:00:00 )
SCLK_DATA_TYPE_64         = ( 1 )
SCLK01_TIME_SYSTEM_64     = ( 1 )
SCLK01_N_FIELDS_64        = ( 2 )
SCLK01_MODULI_64          = ( 4294967296 65536 )
SCLK01_OFFSETS_64         = ( 0 0 )
SCLK01_OUTPUT_DELIM_64    = ( 1 )
SCLK_PARTITION_START_64   = ( 0.0000000000000E+00 )
SCLK_PARTITION_END_64     = ( 2.8147497671065E+14 )
SCLK01_COEFFICIENTS_64    = (
    0.0000000000000E+00    0.0000000000000E+00    1.0000000000000E+00
    3.2768000000000E+13    5.0000000000000E+08    1.0000000000000E+00 )
\begintext
";

/// The current frame kernel, instrument frames are CK frames.
pub const NEW_FK: &str = r"
KPL/FK

\begindata
FRAME_SC_BUS              = -64000
FRAME_-64000_NAME         = 'SC_BUS'
FRAME_-64000_CLASS        = 3
FRAME_-64000_CLASS_ID     = -64000
FRAME_-64000_CENTER       = -64
CK_-64000_SCLK            = -64
CK_-64000_SPK             = -64

FRAME_SC_BASE             = -64400
FRAME_-64400_NAME         = 'SC_BASE'
FRAME_-64400_CLASS        = 4
FRAME_-64400_CLASS_ID     = -64400
FRAME_-64400_CENTER       = -64
TKFRAME_-64400_RELATIVE   = 'SC_BUS'
TKFRAME_-64400_SPEC       = 'ANGLES'
TKFRAME_-64400_UNITS      = 'DEGREES'
TKFRAME_-64400_AXES       = ( 3, 2, 1 )
TKFRAME_-64400_ANGLES     = ( 0.0, 0.0, 0.0 )

FRAME_SC_HIGH             = -64401
FRAME_-64401_NAME         = 'SC_HIGH'
FRAME_-64401_CLASS        = 3
FRAME_-64401_CLASS_ID     = -64401
FRAME_-64401_CENTER       = -64
CK_-64401_SCLK            = -64
CK_-64401_SPK             = -64

FRAME_SC_LOW              = -64402
FRAME_-64402_NAME         = 'SC_LOW'
FRAME_-64402_CLASS        = 3
FRAME_-64402_CLASS_ID     = -64402
FRAME_-64402_CENTER       = -64
CK_-64402_SCLK            = -64
CK_-64402_SPK             = -64
\begintext
";

/// A historical frame kernel, with the given column major matrices for the two
/// instrument frames.
pub fn old_fk_text(high: &[f64; 9], low: &[f64; 9]) -> String {
    let fmt = |m: &[f64; 9]| {
        m.iter()
            .map(|v| format!("{:.17E}", v))
            .collect::<Vec<_>>()
            .join(" ")
    };
    format!(
        r"
KPL/FK

\begindata
FRAME_SC_BUS              = -64000
FRAME_-64000_NAME         = 'SC_BUS'
FRAME_-64000_CLASS        = 3
FRAME_-64000_CLASS_ID     = -64000
CK_-64000_SCLK            = -64

FRAME_SC_BASE             = -64400
FRAME_-64400_NAME         = 'SC_BASE'
FRAME_-64400_CLASS        = 4
FRAME_-64400_CLASS_ID     = -64400
TKFRAME_-64400_RELATIVE   = 'SC_BUS'
TKFRAME_-64400_SPEC       = 'MATRIX'
TKFRAME_-64400_MATRIX     = ( 1 0 0 0 1 0 0 0 1 )

FRAME_SC_HIGH             = -64401
FRAME_-64401_NAME         = 'SC_HIGH'
FRAME_-64401_CLASS        = 4
FRAME_-64401_CLASS_ID     = -64401
TKFRAME_-64401_RELATIVE   = 'SC_BASE'
TKFRAME_-64401_SPEC       = 'MATRIX'
TKFRAME_-64401_MATRIX     = ( {} )

FRAME_SC_LOW              = -64402
FRAME_-64402_NAME         = 'SC_LOW'
FRAME_-64402_CLASS        = 4
FRAME_-64402_CLASS_ID     = -64402
TKFRAME_-64402_RELATIVE   = 'SC_BASE'
TKFRAME_-64402_SPEC       = 'MATRIX'
TKFRAME_-64402_MATRIX     = ( {} )
\begintext
",
        fmt(high),
        fmt(low)
    )
}

/// 180 degrees about z.
pub const FLIP_Z: [f64; 9] = [-1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 1.0];

/// 180 degrees about x.
pub const FLIP_X: [f64; 9] = [1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, -1.0];

/// No rotation.
pub const IDENTITY: [f64; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

/// 180 degrees about y.
pub const FLIP_Y: [f64; 9] = [-1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, -1.0];

/// A temporary directory of kernels, removed on drop.
#[derive(Debug)]
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    /// Create an empty directory.
    pub fn new() -> Self {
        Fixture {
            dir: tempfile::tempdir().expect("temporary directory"),
        }
    }

    /// Directory the kernels are written to.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file into the directory.
    pub fn write(&self, name: &str, text: &str) -> PathBuf {
        let path = self.dir().join(name);
        std::fs::write(&path, text).expect("write kernel");
        path
    }

    /// Leapseconds constants and the spacecraft clock.
    pub fn lsk_sclk(&self) -> PathBuf {
        self.write("clock.tsc", CLOCK_KERNEL)
    }

    /// The current frame kernel.
    pub fn new_fk(&self) -> PathBuf {
        self.write("sc_new.tf", NEW_FK)
    }

    /// A historical frame kernel.
    pub fn old_fk(&self, name: &str, high: &[f64; 9], low: &[f64; 9]) -> PathBuf {
        self.write(name, &old_fk_text(high, low))
    }

    /// Meta-kernel configuring a conversion of both instrument frames over two
    /// historical kernels, `old2.tf` valid after `split_et` and `old1.tf` before.
    pub fn conversion(&self, split_et: f64, output: &str) -> PathBuf {
        let clock = self.lsk_sclk();
        let new_fk = self.new_fk();
        let old1 = self.old_fk("old1.tf", &FLIP_Z, &IDENTITY);
        let old2 = self.old_fk("old2.tf", &FLIP_X, &FLIP_Y);
        let text = format!(
            r"
\begindata
KERNELS_TO_LOAD   = ( '{}' '{}' )
FRAMES_TO_CONVERT = ( 'SC_HIGH' 'SC_LOW' )
FKS               = ( '{}' '{}' )
STOP_ETS          = ( -1D32 {:.6} )
OUTPUT_CK         = ( '{}' )
\begintext
",
            clock.display(),
            new_fk.display(),
            old2.display(),
            old1.display(),
            split_et,
            self.dir().join(output).display(),
        );
        self.write("conversion.tm", &text)
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
