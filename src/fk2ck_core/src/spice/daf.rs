//! Support for arbitrary DAF files
//! DAF is a superset which includes SPK, PCK and CK files.
//!
//! DAF files are laid out in 1024 Byte "Records"
//! - The first record is header information about the contents of the file.
//! - The following N records are text comments.
//! - Immediately following the comments there is a Summary Record, which is itself
//!   followed by a Name Record.
//!
//! These summary records contain the location information for all the contents
//! of the DAF file. Addresses inside of a DAF are 1 indexed counts of f64s from the
//! start of the file.
//!
//! <https://naif.jpl.nasa.gov/pub/naif/toolkit_docs/C/req/daf.html>
//!
use crate::errors::{ConvResult, Error};
use crate::io::bytes::{
    bytes_to_f64, bytes_to_i32, bytes_to_i32_vec, bytes_to_string, f64_into_bytes,
    i32_into_bytes, read_bytes_exact, read_f64_vec, str_into_bytes,
};
use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::ops::Index;
use std::path::Path;

/// Number of bytes in a single DAF record.
const RECORD_LEN: usize = 1024;

/// Number of f64 in a single DAF record.
const RECORD_DOUBLES: usize = 128;

/// Characters of a comment record which are used.
const COMMENT_CHARS: usize = 1000;

/// FTP validation string written into every file record.
const FTP_STR: &[u8; 28] = b"FTPSTR:\r:\n:\r\n:\r\x00:\x81:\x10\xce:ENDFTP";

/// DAF Files can contain multiple different types of data.
/// This list contains the supported formats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DAFType {
    /// SPK files are planetary and satellite ephemeris data.
    Spk,

    /// PCK Files are planetary and satellite orientation data.
    Pck,

    /// CK Files are spacecraft and instrument orientation data.
    Ck,
}

impl DAFType {
    /// Try to parse the magic string of the DAF file into the correct DAFType.
    pub fn from_magic(magic: &str) -> ConvResult<Self> {
        let magic = magic.to_uppercase();
        match magic.strip_prefix("DAF/").map(str::trim) {
            Some("SPK") => Ok(DAFType::Spk),
            Some("PCK") => Ok(DAFType::Pck),
            Some("CK") => Ok(DAFType::Ck),
            _ => Err(Error::IOError(format!(
                "File type currently unsupported. Magic Number {:?}",
                magic
            ))),
        }
    }

    /// Magic string written at the start of the file.
    pub fn magic(&self) -> &'static str {
        match self {
            DAFType::Spk => "DAF/SPK ",
            DAFType::Pck => "DAF/PCK ",
            DAFType::Ck => "DAF/CK  ",
        }
    }
}

/// A single array from a DAF file, along with its summary and name.
#[derive(Debug, Clone, PartialEq)]
pub struct DafArray {
    /// Floats in the summary.
    pub summary_floats: Box<[f64]>,

    /// Ints in the summary, the final two are the start and end addresses of the data.
    pub summary_ints: Box<[i32]>,

    /// Name of the array, for segment files this is the segment id.
    pub name: String,

    /// Array contents.
    pub data: Box<[f64]>,
}

impl DafArray {
    /// Total length of the data array.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Is the data array empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Index<usize> for DafArray {
    type Output = f64;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.data[idx]
    }
}

/// Contents of a DAF file.
#[derive(Debug, Clone)]
pub struct DafFile {
    /// Magic number within the DAF file corresponds to this DAF type.
    pub daf_type: DAFType,

    /// Number of f64 in each summary.
    pub n_doubles: usize,

    /// Number of i32s in each summary.
    pub n_ints: usize,

    /// Internal Descriptor, also called the internal file name.
    pub internal_desc: String,

    /// The comment records.
    pub comments: String,

    /// Arrays contained within the file.
    pub segments: Vec<DafArray>,
}

/// Load a single record from the DAF, note records are 1 indexed.
fn load_record<T: Read + Seek>(file: &mut T, idx: u64) -> ConvResult<Box<[u8]>> {
    if idx == 0 {
        Err(Error::IOError("DAF record index 0 does not exist.".into()))?;
    }
    let _ = file.seek(std::io::SeekFrom::Start(RECORD_LEN as u64 * (idx - 1)))?;
    read_bytes_exact(file, RECORD_LEN)
}

/// First address of a record.
fn record_address(record: usize) -> usize {
    (record - 1) * RECORD_DOUBLES + 1
}

impl DafFile {
    /// Create an empty DAF of the given type.
    pub fn new(daf_type: DAFType, n_doubles: usize, n_ints: usize, internal_desc: &str) -> Self {
        DafFile {
            daf_type,
            n_doubles,
            n_ints,
            internal_desc: internal_desc.to_string(),
            comments: String::new(),
            segments: Vec::new(),
        }
    }

    /// Number of f64s which make up one summary.
    fn summary_size(&self) -> usize {
        self.n_doubles + (self.n_ints + 1) / 2
    }

    /// Number of characters in one array name.
    pub fn name_size(&self) -> usize {
        8 * self.summary_size()
    }

    /// Load a DAF file from disk.
    pub fn from_file(filename: &Path) -> ConvResult<Self> {
        let mut file = BufReader::new(File::open(filename)?);
        Self::from_buffer(&mut file)
    }

    /// Load the full contents of a DAF file from a buffer.
    pub fn from_buffer<T: Read + Seek>(mut file: T) -> ConvResult<Self> {
        let bytes = load_record(&mut file, 1)?;
        let daf_type = DAFType::from_magic(&bytes_to_string(&bytes[0..8]))?;

        let little_endian = match bytes_to_string(&bytes[88..96]).to_lowercase().as_str() {
            "ltl-ieee" => true,
            "big-ieee" => false,
            _ => Err(Error::IOError(
                "Expected little or big endian in DAF file, found neither".into(),
            ))?,
        };

        let n_doubles = bytes_to_i32(&bytes[8..12], little_endian)?;
        let n_ints = bytes_to_i32(&bytes[12..16], little_endian)?;
        if !(0..=124).contains(&n_doubles) || !(2..=250).contains(&n_ints) {
            Err(Error::IOError(format!(
                "DAF summary format ND={} NI={} is not valid",
                n_doubles, n_ints
            )))?;
        }
        let internal_desc = bytes_to_string(&bytes[16..76]);

        // record index of the first summary record in the file
        // records are 1024 long, and 1 indexed because fortran.
        let init_summary_record_index = bytes_to_i32(&bytes[76..80], little_endian)?;
        if init_summary_record_index < 2 {
            Err(Error::IOError("DAF file has no summary records".into()))?;
        }

        // after the header, there are comments until the first summary record.
        let mut comments = Vec::new();
        for idx in 2..init_summary_record_index {
            let record = load_record(&mut file, idx as u64)?;
            comments.extend_from_slice(&record[0..COMMENT_CHARS]);
        }
        if let Some(end) = comments.iter().position(|&c| c == 0x04) {
            comments.truncate(end);
        }
        comments.iter_mut().for_each(|x| {
            if *x == 0x00 {
                *x = b'\n';
            }
        });
        let comments = String::from_utf8_lossy(&comments)
            .trim_end_matches('\n')
            .to_string();

        let mut daf = DafFile {
            daf_type,
            n_doubles: n_doubles as usize,
            n_ints: n_ints as usize,
            internal_desc,
            comments,
            segments: Vec::new(),
        };

        let summary_size = daf.summary_size();
        let name_size = daf.name_size();
        let n_doubles = daf.n_doubles;
        let n_ints = daf.n_ints;

        let mut next_idx = init_summary_record_index;
        let mut visited = 0;
        while next_idx != 0 {
            visited += 1;
            if visited > 100_000 {
                Err(Error::IOError("DAF summary records form a loop".into()))?;
            }
            let summary = load_record(&mut file, next_idx as u64)?;
            let names = load_record(&mut file, next_idx as u64 + 1)?;

            let next = bytes_to_f64(&summary[0..8], little_endian)?;
            let n_summaries = bytes_to_f64(&summary[16..24], little_endian)? as usize;
            if n_summaries * summary_size + 3 > RECORD_DOUBLES {
                Err(Error::IOError("DAF summary record is corrupted".into()))?;
            }

            for idy in 0..n_summaries {
                let sum_start = 8 * (3 + idy * summary_size);
                let floats_end = sum_start + 8 * n_doubles;
                let summary_floats: Box<[f64]> = (0..n_doubles)
                    .map(|k| {
                        bytes_to_f64(
                            &summary[sum_start + 8 * k..sum_start + 8 * (k + 1)],
                            little_endian,
                        )
                    })
                    .collect::<ConvResult<_>>()?;
                let summary_ints =
                    bytes_to_i32_vec(&summary[floats_end..floats_end + 4 * n_ints], little_endian)?;

                let name = bytes_to_string(&names[idy * name_size..(idy + 1) * name_size]);

                let begin = summary_ints[n_ints - 2];
                let end = summary_ints[n_ints - 1];
                if begin < 1 || end < begin - 1 {
                    Err(Error::IOError(format!(
                        "DAF array {:?} has invalid addresses {} to {}",
                        name, begin, end
                    )))?;
                }
                let _ = file.seek(std::io::SeekFrom::Start(8 * (begin as u64 - 1)))?;
                let data = read_f64_vec(&mut file, (end - begin + 1) as usize, little_endian)?;

                daf.segments.push(DafArray {
                    summary_floats,
                    summary_ints,
                    name,
                    data,
                });
            }
            next_idx = next as i32;
        }
        Ok(daf)
    }

    /// Write the DAF to the provided buffer in little endian format.
    ///
    /// `comment_records` empty comment records are reserved after the file record.
    /// The final two summary ints of each array are replaced by the addresses
    /// the data is written to.
    pub fn write_to<W: Write>(&self, mut out: W, comment_records: usize) -> ConvResult<()> {
        let summary_size = self.summary_size();
        let name_size = self.name_size();
        let per_record = (RECORD_DOUBLES - 3) / summary_size;

        for (idx, array) in self.segments.iter().enumerate() {
            if array.summary_floats.len() != self.n_doubles
                || array.summary_ints.len() != self.n_ints
            {
                Err(Error::ValueError(format!(
                    "Array {} does not match the summary format of the DAF",
                    idx
                )))?;
            }
            if array.name.len() > name_size {
                Err(Error::ValueError(format!(
                    "Array name {:?} is longer than {} characters",
                    array.name, name_size
                )))?;
            }
        }

        let n_summary_records = self.segments.len().div_ceil(per_record).max(1);
        let first_summary = 2 + comment_records;
        let last_summary = first_summary + 2 * (n_summary_records - 1);
        let first_data_record = first_summary + 2 * n_summary_records;

        // assign addresses to each array.
        let mut addresses = Vec::with_capacity(self.segments.len());
        let mut address = record_address(first_data_record);
        for array in self.segments.iter() {
            addresses.push((address, address + array.len() - 1));
            address += array.len();
        }
        let first_free = address;

        let to_i32 = |v: usize| {
            i32::try_from(v).map_err(|_| Error::ValueError("DAF file is too large".into()))
        };

        // file record
        let mut record = [0u8; RECORD_LEN];
        str_into_bytes(self.daf_type.magic(), &mut record[0..8], b' ');
        i32_into_bytes(to_i32(self.n_doubles)?, &mut record[8..12]);
        i32_into_bytes(to_i32(self.n_ints)?, &mut record[12..16]);
        str_into_bytes(&self.internal_desc, &mut record[16..76], b' ');
        i32_into_bytes(to_i32(first_summary)?, &mut record[76..80]);
        i32_into_bytes(to_i32(last_summary)?, &mut record[80..84]);
        i32_into_bytes(to_i32(first_free)?, &mut record[84..88]);
        str_into_bytes("LTL-IEEE", &mut record[88..96], b' ');
        record[699..727].copy_from_slice(FTP_STR);
        out.write_all(&record)?;

        for _ in 0..comment_records {
            out.write_all(&[0u8; RECORD_LEN])?;
        }

        // summary and name record pairs
        let chunks: Vec<_> = if self.segments.is_empty() {
            vec![&self.segments[..]]
        } else {
            self.segments.chunks(per_record).collect()
        };
        for (chunk_idx, chunk) in chunks.iter().enumerate() {
            let this_record = first_summary + 2 * chunk_idx;
            let next = if chunk_idx + 1 < n_summary_records {
                this_record + 2
            } else {
                0
            };
            let prev = if chunk_idx == 0 { 0 } else { this_record - 2 };

            let mut summary = [0u8; RECORD_LEN];
            let mut names = [b' '; RECORD_LEN];
            f64_into_bytes(next as f64, &mut summary[0..8]);
            f64_into_bytes(prev as f64, &mut summary[8..16]);
            f64_into_bytes(chunk.len() as f64, &mut summary[16..24]);

            for (idy, array) in chunk.iter().enumerate() {
                let (begin, end) = addresses[chunk_idx * per_record + idy];
                let sum_start = 8 * (3 + idy * summary_size);
                for (k, &val) in array.summary_floats.iter().enumerate() {
                    f64_into_bytes(val, &mut summary[sum_start + 8 * k..sum_start + 8 * (k + 1)]);
                }
                let int_start = sum_start + 8 * self.n_doubles;
                let n_ints = self.n_ints;
                for (k, &val) in array.summary_ints.iter().enumerate() {
                    let val = match k {
                        k if k == n_ints - 2 => to_i32(begin)?,
                        k if k == n_ints - 1 => to_i32(end)?,
                        _ => val,
                    };
                    i32_into_bytes(val, &mut summary[int_start + 4 * k..int_start + 4 * (k + 1)]);
                }
                str_into_bytes(
                    &array.name,
                    &mut names[idy * name_size..(idy + 1) * name_size],
                    b' ',
                );
            }
            out.write_all(&summary)?;
            out.write_all(&names)?;
        }

        // data records, packed back to back and padded to a full record.
        let mut n_written = 0;
        for array in self.segments.iter() {
            for &val in array.data.iter() {
                out.write_all(&val.to_le_bytes())?;
            }
            n_written += array.len();
        }
        let padding = (RECORD_DOUBLES - n_written % RECORD_DOUBLES) % RECORD_DOUBLES;
        out.write_all(&vec![0u8; 8 * padding])?;
        out.flush()?;
        Ok(())
    }
}
