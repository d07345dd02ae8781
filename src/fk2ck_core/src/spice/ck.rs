//! Reading and writing of CK (pointing) kernel files.
//!
//! Only type 2 segments are supported, where each record holds a constant quaternion
//! over an interval of spacecraft clock ticks. Records here never rotate within their
//! interval, segments with a non-zero angular velocity are rejected.
//!
//! A type 2 segment with N records has the following data layout:
//! - N pointing records, each a quaternion (4) followed by an angular velocity (3).
//! - N record start ticks.
//! - N record stop ticks.
//! - N rates, seconds per tick.
//! - (N - 1) / 100 start ticks, every 100th record, used as a search directory.
//!
//! The summary of each segment is 2 floats (start and stop ticks), and 6 ints:
//! instrument id, reference frame id, segment type, angular velocity flag, and the
//! start and end addresses of the data.
//!
//! <https://naif.jpl.nasa.gov/pub/naif/toolkit_docs/C/req/ck.html>
//!
use super::daf::{DAFType, DafArray, DafFile};
use crate::errors::{ConvResult, Error};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Floats in a CK segment summary.
pub const CK_N_DOUBLES: usize = 2;

/// Ints in a CK segment summary.
pub const CK_N_INTS: usize = 6;

/// Maximum length of a segment id.
pub const CK_SEGMENT_ID_LEN: usize = 40;

/// Characters of comment area in one comment record.
const COMMENT_RECORD_CHARS: usize = 1000;

/// Number of f64 in one pointing record.
const POINTING_SIZE: usize = 7;

/// A single type 2 pointing record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CkRecord {
    /// First tick the record is valid for.
    pub start: f64,

    /// Last tick the record is valid for.
    pub stop: f64,

    /// SPICE style quaternion, scalar first.
    pub quaternion: [f64; 4],

    /// Angular velocity, radians per second.
    pub angular_velocity: [f64; 3],

    /// Seconds per tick.
    pub rate: f64,
}

/// A type 2 CK segment.
#[derive(Debug, Clone, PartialEq)]
pub struct CkSegment {
    /// Instrument id, for frames this is the frame's class id.
    pub instrument_id: i32,

    /// Id of the frame the pointing is relative to.
    pub reference_frame: i32,

    /// First tick covered by the segment.
    pub start: f64,

    /// Last tick covered by the segment.
    pub stop: f64,

    /// Segment id, at most 40 characters.
    pub segment_id: String,

    /// Pointing records, in increasing time order.
    pub records: Vec<CkRecord>,
}

impl CkSegment {
    /// Is the tick inside of the segment.
    pub fn contains(&self, ticks: f64) -> bool {
        (ticks >= self.start) && (ticks <= self.stop)
    }

    /// Check the segment may be written.
    pub fn validate(&self) -> ConvResult<()> {
        if self.segment_id.len() > CK_SEGMENT_ID_LEN
            || !self.segment_id.chars().all(|c| c.is_ascii() && !c.is_ascii_control())
        {
            Err(Error::ValueError(format!(
                "CK segment id {:?} must be at most {} printable ASCII characters",
                self.segment_id, CK_SEGMENT_ID_LEN
            )))?;
        }
        if self.records.is_empty() {
            Err(Error::ValueError("CK segment has no records".into()))?;
        }
        if !(self.start <= self.stop) {
            Err(Error::ValueError(format!(
                "CK segment stop {} is before start {}",
                self.stop, self.start
            )))?;
        }
        let mut last_start = f64::NEG_INFINITY;
        for record in self.records.iter() {
            if !(record.start <= record.stop) || record.start < last_start {
                Err(Error::ValueError(
                    "CK record intervals must be ordered with start <= stop".into(),
                ))?;
            }
            if record.angular_velocity.iter().any(|&x| x != 0.0) {
                Err(Error::ValueError(
                    "CK records with non-zero angular velocity are not supported".into(),
                ))?;
            }
            last_start = record.start;
        }
        Ok(())
    }

    /// Return the quaternion at the specified tick.
    /// Fails if the tick falls between the intervals of the records.
    pub fn try_get_quaternion(&self, ticks: f64) -> ConvResult<[f64; 4]> {
        let idx = self
            .records
            .partition_point(|r| r.start <= ticks)
            .checked_sub(1)
            .ok_or_else(|| Error::DAFLimits("Tick is not present in this segment.".into()))?;

        // Intervals may share a boundary tick, take the latest covering record.
        let record = self.records[..=idx]
            .iter()
            .rev()
            .take_while(|r| r.start <= ticks)
            .find(|r| ticks <= r.stop)
            .ok_or_else(|| Error::DAFLimits("Tick falls in a gap of this segment.".into()))?;

        if record.angular_velocity.iter().any(|&x| x != 0.0) {
            Err(Error::ValueError(
                "CK records with non-zero angular velocity are not supported".into(),
            ))?;
        }
        Ok(record.quaternion)
    }
}

impl TryFrom<DafArray> for CkSegment {
    type Error = Error;

    fn try_from(array: DafArray) -> ConvResult<CkSegment> {
        if array.summary_floats.len() != CK_N_DOUBLES || array.summary_ints.len() != CK_N_INTS {
            Err(Error::IOError("Array is not a CK segment.".into()))?;
        }
        let segment_type = array.summary_ints[2];
        if segment_type != 2 {
            Err(Error::IOError(format!(
                "CK Segment type {:?} not supported.",
                segment_type
            )))?;
        }

        // len = 7 N + 3 N + (N - 1) / 100
        let len = array.len();
        let n_records = (0..=len / 10)
            .rev()
            .find(|&n| n > 0 && 10 * n + (n - 1) / 100 == len)
            .ok_or_else(|| Error::IOError("CK type 2 segment is not formatted correctly.".into()))?;

        let data = &array.data;
        let starts = &data[POINTING_SIZE * n_records..(POINTING_SIZE + 1) * n_records];
        let stops = &data[(POINTING_SIZE + 1) * n_records..(POINTING_SIZE + 2) * n_records];
        let rates = &data[(POINTING_SIZE + 2) * n_records..(POINTING_SIZE + 3) * n_records];

        let records = (0..n_records)
            .map(|idx| {
                let rec = &data[POINTING_SIZE * idx..POINTING_SIZE * (idx + 1)];
                CkRecord {
                    start: starts[idx],
                    stop: stops[idx],
                    quaternion: [rec[0], rec[1], rec[2], rec[3]],
                    angular_velocity: [rec[4], rec[5], rec[6]],
                    rate: rates[idx],
                }
            })
            .collect();

        Ok(CkSegment {
            instrument_id: array.summary_ints[0],
            reference_frame: array.summary_ints[1],
            start: array.summary_floats[0],
            stop: array.summary_floats[1],
            segment_id: array.name,
            records,
        })
    }
}

impl From<&CkSegment> for DafArray {
    fn from(segment: &CkSegment) -> Self {
        let n = segment.records.len();
        let mut data = Vec::with_capacity(10 * n + n.saturating_sub(1) / 100);
        for record in segment.records.iter() {
            data.extend_from_slice(&record.quaternion);
            data.extend_from_slice(&record.angular_velocity);
        }
        data.extend(segment.records.iter().map(|r| r.start));
        data.extend(segment.records.iter().map(|r| r.stop));
        data.extend(segment.records.iter().map(|r| r.rate));
        // Directory of every 100th start tick, counted from 1.
        data.extend(
            segment
                .records
                .iter()
                .skip(99)
                .step_by(100)
                .take(n.saturating_sub(1) / 100)
                .map(|r| r.start),
        );

        DafArray {
            summary_floats: [segment.start, segment.stop].into(),
            summary_ints: [segment.instrument_id, segment.reference_frame, 2, 1, 0, 0].into(),
            name: segment.segment_id.clone(),
            data: data.into(),
        }
    }
}

/// Read all segments of a CK file.
pub fn read_ck_file(filename: &Path) -> ConvResult<Vec<CkSegment>> {
    let file = DafFile::from_file(filename)?;
    ck_segments(file)
}

/// Convert the arrays of a DAF file into CK segments.
pub fn ck_segments(file: DafFile) -> ConvResult<Vec<CkSegment>> {
    if !matches!(file.daf_type, DAFType::Ck) {
        Err(Error::IOError("File is not a CK formatted file.".into()))?;
    }
    file.segments.into_iter().map(CkSegment::try_from).collect()
}

/// A collection of loaded CK segments, in load order.
#[derive(Debug, Default, Clone)]
pub struct CkCollection {
    segments: Vec<CkSegment>,
}

impl CkCollection {
    /// Add segments, these take priority over everything already present.
    pub fn extend(&mut self, segments: impl IntoIterator<Item = CkSegment>) {
        self.segments.extend(segments);
    }

    /// Number of segments loaded.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Are there no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Find the pointing of the instrument at the given tick.
    /// The most recently loaded segment covering the tick is used.
    ///
    /// Returns the reference frame id, and the quaternion.
    pub fn try_get_pointing(&self, instrument_id: i32, ticks: f64) -> ConvResult<(i32, [f64; 4])> {
        for segment in self.segments.iter().rev() {
            if segment.instrument_id == instrument_id && segment.contains(ticks) {
                if let Ok(quat) = segment.try_get_quaternion(ticks) {
                    return Ok((segment.reference_frame, quat));
                }
            }
        }
        Err(Error::DAFLimits(format!(
            "Instrument ({}) does not have a CK record for tick {}.",
            instrument_id, ticks
        )))
    }
}

/// Writer for a new CK file.
///
/// The file is created immediately, and will never replace an existing file. Segments
/// are collected in memory and written out when the writer is closed.
#[derive(Debug)]
pub struct CkWriter {
    path: PathBuf,
    file: File,
    internal_name: String,
    comment_records: usize,
    segments: Vec<CkSegment>,
}

impl CkWriter {
    /// Create the output file.
    ///
    /// `comment_chars` characters of comment area are reserved.
    pub fn create(path: &Path, internal_name: &str, comment_chars: usize) -> ConvResult<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    Error::AlreadyExists(path.display().to_string())
                }
                _ => Error::IOError(format!("{}: {}", path.display(), err)),
            })?;
        Ok(CkWriter {
            path: path.to_path_buf(),
            file,
            internal_name: internal_name.to_string(),
            comment_records: comment_chars.div_ceil(COMMENT_RECORD_CHARS),
            segments: Vec::new(),
        })
    }

    /// Path of the file being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of segments added so far.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Have no segments been added.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Add a segment to the file.
    pub fn append(&mut self, segment: CkSegment) -> ConvResult<()> {
        segment.validate()?;
        self.segments.push(segment);
        Ok(())
    }

    /// Write out the file and close it.
    pub fn close(self) -> ConvResult<()> {
        let mut daf = DafFile::new(DAFType::Ck, CK_N_DOUBLES, CK_N_INTS, &self.internal_name);
        daf.segments = self.segments.iter().map(DafArray::from).collect();
        let mut out = BufWriter::new(&self.file);
        daf.write_to(&mut out, self.comment_records)?;
        out.flush()?;
        drop(out);
        self.file.sync_all()?;
        Ok(())
    }
}
