//! Building the replacement CK from historical frame kernels.
//!
//! For every window, and every frame being converted, the historical frame kernel of
//! the window is loaded just long enough to read the frame's parent and its fixed
//! rotation. That rotation becomes one constant orientation segment of the output CK,
//! covering the window in clock ticks.
//!
//! The base kernels, the leapseconds and clock kernels and the current frame kernel,
//! must already be loaded in the store.
use crate::errors::{ConvResult, Error};
use crate::schedule::{Window, WindowStop};
use crate::spice::{CkHandle, KernelStore, Segment, CK_SEGMENT_ID_LEN};
use log::{debug, info, warn};
use nalgebra::Matrix3;
use std::path::Path;

/// Ticks between the two clock readings used to estimate the clock rate.
pub const RATE_SPAN_TICKS: f64 = 1000.0;

/// Longest frame name read from the kernel pool.
pub(crate) const FRAME_NAME_LEN: usize = 99;

/// Partition values read when looking for the end of the clock.
const MAX_PARTITIONS: usize = 999;

/// Frame and clock ids of a frame being converted.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameIds {
    pub(crate) frame_id: i32,
    pub(crate) clock_id: i64,
}

impl FrameIds {
    /// Resolve the ids from the currently loaded pool.
    pub(crate) fn resolve<S: KernelStore>(store: &S, frame_name: &str) -> ConvResult<Self> {
        let frame_id = store.get_integer_pool_value(
            &format!("FRAME_{}", frame_name.trim().to_uppercase()),
            0,
        )?;
        let frame_id = i32::try_from(frame_id)
            .map_err(|_| Error::ValueError(format!("Frame id {} is out of range", frame_id)))?;
        let clock_id = store.get_integer_pool_value(&format!("CK_{}_SCLK", frame_id), 0)?;
        Ok(FrameIds { frame_id, clock_id })
    }
}

/// Name of the parent frame declared by the loaded historical frame kernel.
pub(crate) fn relative_frame<S: KernelStore>(store: &S, frame_id: i32) -> ConvResult<String> {
    store.get_string_pool_value(
        &format!("TKFRAME_{}_RELATIVE", frame_id),
        0,
        None,
        FRAME_NAME_LEN,
    )
}

/// Load a historical frame kernel, run `read` against it, then unload it again.
///
/// The kernel is unloaded even if `read` fails.
pub(crate) fn with_kernel<S: KernelStore, T>(
    store: &mut S,
    path: &Path,
    read: impl FnOnce(&S) -> ConvResult<T>,
) -> ConvResult<T> {
    store.load(path)?;
    let result = read(store);
    store.unload(path)?;
    result
}

/// Segment id for a frame converted from a historical kernel.
fn segment_comment(source: &Path, frame_name: &str) -> String {
    let basename = source
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default();
    format!("{}[{}]", basename, frame_name)
        .chars()
        .take(CK_SEGMENT_ID_LEN)
        .collect()
}

/// Seconds per tick of a clock, measured over its first ticks.
fn clock_rate<S: KernelStore>(store: &S, clock_id: i64) -> ConvResult<f64> {
    Ok((store.ticks_to_time(clock_id, RATE_SPAN_TICKS)? - store.ticks_to_time(clock_id, 0.0)?)
        / RATE_SPAN_TICKS)
}

/// Encoded tick of a window boundary, rounded to the nearest whole tick.
fn boundary_tick<S: KernelStore>(store: &S, clock_id: i64, et: f64) -> ConvResult<f64> {
    Ok(store.time_to_ticks(clock_id, et)?.round())
}

/// Final encoded tick of a clock.
fn clock_end<S: KernelStore>(store: &S, clock_id: i64) -> ConvResult<f64> {
    let key = format!("SCLK_PARTITION_END_{}", -clock_id);
    store
        .get_double_pool_values(&key, 0, MAX_PARTITIONS)?
        .last()
        .copied()
        .ok_or_else(|| Error::PoolLookup(format!("{} is empty", key)))
}

/// Build the output CK, returning the segments written in file order.
///
/// Nothing is written, and no file is created, if there are no windows or no target
/// frames. An existing output file is never replaced. If anything fails after the
/// output was created, the partial file is removed.
pub fn build<S: KernelStore>(
    windows: &[Window],
    targets: &[String],
    store: &mut S,
    output: &Path,
    label: &str,
) -> ConvResult<Vec<Segment>> {
    if store.exists(output) {
        Err(Error::AlreadyExists(output.display().to_string()))?;
    }
    if windows.is_empty() || targets.is_empty() {
        info!("No windows or frames to convert, {} not created", output.display());
        return Ok(Vec::new());
    }

    let mut handle = None;
    let result = write_segments(windows, targets, store, output, label, &mut handle);

    match (result, handle) {
        (Ok(segments), Some(handle)) => {
            if let Err(err) = store.close_handle(handle) {
                if let Err(cleanup) = std::fs::remove_file(output) {
                    warn!("Failed to remove {}: {}", output.display(), cleanup);
                }
                return Err(err);
            }
            info!("Wrote {} segments to {}", segments.len(), output.display());
            Ok(segments)
        }
        (Ok(segments), None) => Ok(segments),
        (Err(err), Some(handle)) => {
            if let Err(cleanup) = store.abandon_handle(handle) {
                warn!("Failed to remove {}: {}", output.display(), cleanup);
            }
            Err(err)
        }
        (Err(err), None) => Err(err),
    }
}

fn write_segments<S: KernelStore>(
    windows: &[Window],
    targets: &[String],
    store: &mut S,
    output: &Path,
    label: &str,
    handle: &mut Option<CkHandle>,
) -> ConvResult<Vec<Segment>> {
    let mut segments = Vec::with_capacity(windows.len() * targets.len());

    // Stop of the previous window, the start of the current one.
    let mut last_stop: Option<f64> = None;

    for window in windows {
        for frame_name in targets {
            let ids = FrameIds::resolve(store, frame_name)?;

            let start_tick = match last_stop {
                None => 0.0,
                Some(et) => boundary_tick(store, ids.clock_id, et)?,
            };

            let (relative, matrix) = with_kernel(store, &window.source, |store| {
                let relative = relative_frame(store, ids.frame_id)?;
                let matrix: Matrix3<f64> =
                    store.transform_between_frames(&relative, frame_name, 0.0)?;
                Ok((relative, matrix))
            })?;
            let orientation = store.rotation_to_quaternion(&matrix)?;
            let rate = clock_rate(store, ids.clock_id)?;

            let stop_tick = match window.stop {
                WindowStop::Open => clock_end(store, ids.clock_id)?,
                WindowStop::Et(et) => boundary_tick(store, ids.clock_id, et)?,
            };

            debug!(
                "{} [{}] frame {} clock {} relative {}: ticks {} to {} ({} ticks), \
                 {:.3} ticks/s, matrix {:?}, quaternion {:?}",
                window.source.display(),
                frame_name,
                ids.frame_id,
                ids.clock_id,
                relative,
                start_tick,
                stop_tick,
                stop_tick - start_tick,
                1.0 / rate,
                matrix.as_slice(),
                orientation,
            );

            let ck = match *handle {
                Some(ck) => ck,
                None => {
                    let ck = store.open_pointing_kernel_for_write(output, label, 0)?;
                    *handle = Some(ck);
                    ck
                }
            };

            let segment = Segment {
                frame: ids.frame_id,
                relative_frame: relative,
                start_tick,
                stop_tick,
                orientation,
                angular_velocity: [0.0; 3],
                rate,
                comment: segment_comment(&window.source, frame_name),
            };
            store.append_fixed_orientation_segment(ck, &segment)?;
            info!(
                "Segment {:?}: {} relative to {}, ticks {} to {}",
                segment.comment, frame_name, segment.relative_frame, start_tick, stop_tick
            );
            segments.push(segment);
        }
        last_stop = window.stop.et();
    }
    Ok(segments)
}
