//! Run configuration, read from kernel pool variables.
//!
//! A conversion is configured by a meta-kernel which, besides `KERNELS_TO_LOAD`,
//! defines:
//!
//! - `FRAMES_TO_CONVERT` - names of the frames which become CK frames.
//! - `FKS` - historical frame kernels, newest first, `+` continues long paths.
//! - `STOP_ETS` - ephemeris time each historical kernel stopped being valid, the
//!   newest uses a value below [`OPEN_ENDED_THRESHOLD`](crate::schedule::OPEN_ENDED_THRESHOLD).
//! - `OUTPUT_CK` - path of the CK to write.
//! - `OUTPUT_CK_LABEL` - optional internal file name of the CK.
use crate::builder::{build, FRAME_NAME_LEN};
use crate::errors::{ConvResult, Error};
use crate::schedule::{schedule, Window};
use crate::spice::{KernelStore, Segment};
use crate::validate::{validate, ValidationResult};
use log::debug;
use serde::Serialize;
use std::path::PathBuf;

/// Internal file name of the output CK when none is configured.
pub const DEFAULT_LABEL: &str = "FK REPLACEMENT";

/// Longest path read from the kernel pool.
const PATH_LEN: usize = 2048;

/// Everything needed to run a conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionConfig {
    /// Base kernels, loaded for the build and for validation.
    pub kernels: Vec<PathBuf>,

    /// Frames to convert.
    pub frames: Vec<String>,

    /// Historical frame kernels, newest first.
    pub frame_files: Vec<PathBuf>,

    /// Stop time of each historical frame kernel.
    pub stop_times: Vec<f64>,

    /// Output CK.
    pub output: PathBuf,

    /// Internal file name of the output CK.
    pub label: String,
}

fn required<T>(result: ConvResult<T>, key: &str) -> ConvResult<T> {
    result.map_err(|err| Error::Configuration(format!("{}: {}", key, err)))
}

fn string_list<S: KernelStore>(
    store: &S,
    key: &str,
    continuation: Option<char>,
    max_len: usize,
) -> ConvResult<Vec<String>> {
    let count = required(store.count_string_pool_values(key, continuation), key)?;
    let values = (0..count)
        .map(|idx| store.get_string_pool_value(key, idx, continuation, max_len))
        .collect::<ConvResult<Vec<_>>>();
    let values = required(values, key)?;
    if values.is_empty() {
        Err(Error::Configuration(format!("{} is empty", key)))?;
    }
    Ok(values)
}

impl ConversionConfig {
    /// Read the configuration from the loaded pool, then clear the store.
    ///
    /// `kernels` are recorded as the base kernels of the run.
    pub fn from_pool<S: KernelStore>(kernels: Vec<PathBuf>, store: &mut S) -> ConvResult<Self> {
        let config = Self::read(kernels, store);
        store.clear_all();
        config
    }

    /// Load the kernels, and read the configuration they define.
    pub fn from_kernels<S: KernelStore>(kernels: &[PathBuf], store: &mut S) -> ConvResult<Self> {
        for kernel in kernels {
            if let Err(err) = store.load(kernel) {
                store.clear_all();
                return Err(err);
            }
        }
        Self::from_pool(kernels.to_vec(), store)
    }

    fn read<S: KernelStore>(kernels: Vec<PathBuf>, store: &S) -> ConvResult<Self> {
        let frames = string_list(store, "FRAMES_TO_CONVERT", None, FRAME_NAME_LEN)?;
        let frame_files = string_list(store, "FKS", Some('+'), PATH_LEN)?
            .into_iter()
            .map(PathBuf::from)
            .collect();
        let stop_times = required(
            store.get_double_pool_values("STOP_ETS", 0, usize::MAX),
            "STOP_ETS",
        )?;
        let output = required(
            store.get_string_pool_value("OUTPUT_CK", 0, Some('+'), PATH_LEN),
            "OUTPUT_CK",
        )?;
        let label = store
            .get_string_pool_value("OUTPUT_CK_LABEL", 0, None, PATH_LEN)
            .unwrap_or_else(|_| DEFAULT_LABEL.to_string());

        let config = ConversionConfig {
            kernels,
            frames,
            frame_files,
            stop_times,
            output: PathBuf::from(output),
            label,
        };
        debug!("Configuration {:?}", config);
        Ok(config)
    }

    /// Windows of the configured historical kernels.
    pub fn windows(&self) -> ConvResult<Vec<Window>> {
        schedule(&self.frame_files, &self.stop_times)
    }
}

/// Load the base kernels and build the output CK. The store is cleared afterwards.
pub fn create<S: KernelStore>(config: &ConversionConfig, store: &mut S) -> ConvResult<Vec<Segment>> {
    let windows = config.windows()?;
    let result = config
        .kernels
        .iter()
        .try_for_each(|kernel| store.load(kernel))
        .and_then(|_| build(&windows, &config.frames, store, &config.output, &config.label));
    store.clear_all();
    result
}

/// Validate the output CK against the historical kernels.
pub fn test<S: KernelStore>(
    config: &ConversionConfig,
    store: &mut S,
) -> ConvResult<Vec<ValidationResult>> {
    let windows = config.windows()?;
    validate(&windows, &config.frames, &config.kernels, store, &config.output)
}
