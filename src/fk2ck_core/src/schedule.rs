//! Ordering historical frame kernels into contiguous time windows.
//!
//! Historical frame kernels are declared newest first, each with the ephemeris time
//! at which it stopped being valid. The newest kernel is still valid, its stop time is
//! a large negative sentinel. Windows are produced oldest first, each starting where
//! the previous one stopped, with the very first window starting at the beginning of
//! the spacecraft clock.
use crate::errors::{ConvResult, Error};
use serde::Serialize;
use std::path::PathBuf;

/// Stop times below this value mark a window which never ends.
pub const OPEN_ENDED_THRESHOLD: f64 = -1e30;

/// End of a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum WindowStop {
    /// The window extends to the end of the encoded clock.
    Open,

    /// Ephemeris time, seconds past J2000 TDB.
    Et(f64),
}

impl WindowStop {
    /// Interpret a declared stop time, applying the open ended sentinel.
    pub fn from_et(et: f64) -> Self {
        if et < OPEN_ENDED_THRESHOLD {
            WindowStop::Open
        } else {
            WindowStop::Et(et)
        }
    }

    /// Ephemeris time of the stop, if it is not open ended.
    pub fn et(&self) -> Option<f64> {
        match self {
            WindowStop::Open => None,
            WindowStop::Et(et) => Some(*et),
        }
    }
}

/// Interval of time over which one historical frame kernel is valid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Window {
    /// Position in processing order, earliest window first.
    pub index: usize,

    /// Position of the kernel in the declared, newest first, order.
    pub declared_index: usize,

    /// Start of the window, None for the first window which starts with the clock.
    pub start: Option<f64>,

    /// End of the window.
    pub stop: WindowStop,

    /// Historical frame kernel valid over this window.
    pub source: PathBuf,
}

impl Window {
    /// Does this window run to the end of the clock.
    pub fn is_open_ended(&self) -> bool {
        matches!(self.stop, WindowStop::Open)
    }
}

/// Produce the windows in processing order from the declared, newest first, inputs.
///
/// Fails if the inputs differ in length or are empty, if a stop time is not a number,
/// or if any window other than the last is open ended.
pub fn schedule(frame_files: &[PathBuf], stop_times: &[f64]) -> ConvResult<Vec<Window>> {
    if frame_files.len() != stop_times.len() {
        Err(Error::Configuration(format!(
            "{} frame kernels were given with {} stop times",
            frame_files.len(),
            stop_times.len()
        )))?;
    }
    if frame_files.is_empty() {
        Err(Error::Configuration(
            "No historical frame kernels were given".into(),
        ))?;
    }

    let n_windows = frame_files.len();
    let mut windows = Vec::with_capacity(n_windows);
    let mut start = None;
    for (index, (source, &stop)) in frame_files.iter().zip(stop_times).rev().enumerate() {
        if stop.is_nan() {
            Err(Error::Configuration(format!(
                "Stop time of {} is not a number",
                source.display()
            )))?;
        }
        let stop = WindowStop::from_et(stop);
        if matches!(stop, WindowStop::Open) && index + 1 != n_windows {
            Err(Error::Configuration(format!(
                "Only the newest frame kernel may be open ended, not {}",
                source.display()
            )))?;
        }
        windows.push(Window {
            index,
            declared_index: n_windows - 1 - index,
            start,
            stop,
            source: source.clone(),
        });
        start = stop.et();
    }
    Ok(windows)
}
