//! Checking a built CK against the historical frame kernels it replaces.
//!
//! Each window is sampled at two epochs away from its boundaries, where the historical
//! kernels and the CK legitimately disagree. The orientation of every converted frame
//! relative to its historical parent is computed twice: once through the new frame
//! kernel and the CK, and once with only the historical kernel loaded. The norm of the
//! quaternion difference should be exactly zero.
use crate::builder::{relative_frame, with_kernel, FrameIds};
use crate::errors::{ConvResult, Error};
use crate::schedule::{Window, WindowStop};
use crate::spice::KernelStore;
use itertools::Itertools;
use log::{info, warn};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Distance of the samples from the window boundaries, in seconds.
pub const SAMPLE_OFFSET: f64 = 10.0;

/// Distance of the second sample of an open ended window from its start, in seconds.
pub const OPEN_WINDOW_SAMPLE: f64 = 1e6;

/// Decimal places the error norm is rounded to.
const ERROR_DECIMALS: i32 = 16;

/// Disagreement between the CK and a historical frame kernel at one epoch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    /// Historical frame kernel.
    pub source_file: PathBuf,

    /// Frame which was converted.
    pub frame_name: String,

    /// Parent of the frame in the historical kernel.
    pub relative_frame: String,

    /// Ephemeris time of the sample.
    pub epoch: f64,

    /// Norm of the difference of the two quaternions, rounded to 16 decimal places.
    pub quaternion_error_norm: f64,
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "fk={} quat_error={} relative_frame={} frame={} et={:015.4}",
            self.source_file.display(),
            self.quaternion_error_norm,
            self.relative_frame,
            self.frame_name,
            self.epoch
        )
    }
}

/// Epochs at which a window is compared.
///
/// Open ended windows are sampled shortly after their start, and a long time after.
/// Closed windows are sampled just inside both ends, never closer together than a
/// third of the window.
pub fn sample_epochs(start: f64, stop: WindowStop) -> [f64; 2] {
    match stop {
        WindowStop::Open => [start + SAMPLE_OFFSET, start + OPEN_WINDOW_SAMPLE],
        WindowStop::Et(stop) => {
            let delta = SAMPLE_OFFSET.min((stop - start) / 3.0);
            [start + delta, stop - delta]
        }
    }
}

/// One frame of one window, to be evaluated at the given epochs.
#[derive(Debug)]
struct Sample {
    source: PathBuf,
    frame_name: String,
    relative: String,
    epochs: [f64; 2],
    from_ck: Vec<[f64; 4]>,
}

fn round_error(value: f64) -> f64 {
    let scale = 10f64.powi(ERROR_DECIMALS);
    (value * scale).round() / scale
}

fn clear<S: KernelStore>(store: &mut S) -> ConvResult<()> {
    store.clear_all();
    if store.count_loaded() != 0 {
        Err(Error::ValueError(
            "Kernels remain loaded after clearing the store".into(),
        ))?;
    }
    Ok(())
}

fn load_all<S: KernelStore>(store: &mut S, kernels: &[PathBuf], ck: &Path) -> ConvResult<()> {
    for kernel in kernels {
        store.load(kernel)?;
    }
    store.load(ck)
}

/// Decide what to sample, reading each frame's parent from its historical kernel.
fn plan<S: KernelStore>(
    windows: &[Window],
    targets: &[String],
    store: &mut S,
) -> ConvResult<Vec<Sample>> {
    let mut samples = Vec::with_capacity(windows.len() * targets.len());
    let mut last_stop: Option<f64> = None;

    for window in windows {
        for frame_name in targets {
            let ids = FrameIds::resolve(store, frame_name)?;
            let start = match last_stop {
                None => store.ticks_to_time(ids.clock_id, 0.0)?,
                Some(et) => et,
            };
            let relative = with_kernel(store, &window.source, |store| {
                relative_frame(store, ids.frame_id)
            })?;
            samples.push(Sample {
                source: window.source.clone(),
                frame_name: frame_name.clone(),
                relative,
                epochs: sample_epochs(start, window.stop),
                from_ck: Vec::new(),
            });
        }
        last_stop = window.stop.et();
    }
    Ok(samples)
}

/// Compare the CK against the historical frame kernels.
///
/// `kernels` are the base kernels, which include the new frame kernel. The store is
/// cleared before every pass, and is left empty. A result is returned for every sample
/// even when it disagrees; disagreements are also logged as warnings.
pub fn validate<S: KernelStore>(
    windows: &[Window],
    targets: &[String],
    kernels: &[PathBuf],
    store: &mut S,
    output_ck: &Path,
) -> ConvResult<Vec<ValidationResult>> {
    if windows.is_empty() || targets.is_empty() {
        return Ok(Vec::new());
    }
    let results = compare(windows, targets, kernels, store, output_ck);
    if results.is_err() {
        store.clear_all();
    }
    results
}

fn compare<S: KernelStore>(
    windows: &[Window],
    targets: &[String],
    kernels: &[PathBuf],
    store: &mut S,
    output_ck: &Path,
) -> ConvResult<Vec<ValidationResult>> {
    load_all(store, kernels, output_ck)?;
    let mut samples = plan(windows, targets, store)?;

    // The CK and the new frame kernel.
    clear(store)?;
    load_all(store, kernels, output_ck)?;
    for sample in samples.iter_mut() {
        for et in sample.epochs {
            let rot = store.transform_between_frames(&sample.relative, &sample.frame_name, et)?;
            sample.from_ck.push(store.rotation_to_quaternion(&rot)?);
        }
    }

    // Each historical kernel on its own.
    let mut results = Vec::with_capacity(samples.len() * 2);
    for (source, group) in &samples.iter().chunk_by(|s| s.source.clone()) {
        clear(store)?;
        store.load(&source)?;
        for sample in group {
            for (et, from_ck) in sample.epochs.iter().zip(&sample.from_ck) {
                let rot =
                    store.transform_between_frames(&sample.relative, &sample.frame_name, *et)?;
                let from_fk = store.rotation_to_quaternion(&rot)?;
                let norm = from_ck
                    .iter()
                    .zip(from_fk)
                    .map(|(a, b)| (a - b).powi(2))
                    .sum::<f64>()
                    .sqrt();

                let result = ValidationResult {
                    source_file: sample.source.clone(),
                    frame_name: sample.frame_name.clone(),
                    relative_frame: sample.relative.clone(),
                    epoch: *et,
                    quaternion_error_norm: round_error(norm),
                };
                if result.quaternion_error_norm == 0.0 {
                    info!("{}", result);
                } else {
                    warn!("{}", result);
                }
                results.push(result);
            }
        }
    }
    clear(store)?;
    Ok(results)
}
