//! The kernel store, the set of loaded kernels and everything derived from them.
//!
//! [`KernelStore`] is the capability interface the conversion is written against,
//! [`KernelSet`] is its in-process implementation. The store is an explicit value which
//! is passed to every operation, there is no process wide kernel pool.
//!
use super::ck::{ck_segments, CkCollection, CkRecord, CkSegment, CkWriter};
use super::daf::{DAFType, DafFile};
use super::frames::{frame_id_from_name, matrix_to_quaternion, rotation_between};
use super::pool::KernelPool;
use super::sclk::Sclk;
use super::text_kernel::{parse_text_kernel, Assignment};
use crate::errors::{ConvResult, Error};
use log::debug;
use nalgebra::Matrix3;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Handle of a CK file open for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CkHandle(usize);

/// A fixed orientation pointing segment, as appended to an output CK.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    /// Id of the frame being pointed.
    pub frame: i32,

    /// Name of the frame the orientation is relative to.
    pub relative_frame: String,

    /// First tick of the segment.
    pub start_tick: f64,

    /// Last tick of the segment.
    pub stop_tick: f64,

    /// Quaternion rotating the relative frame into the frame, `[w, x, y, z]`.
    pub orientation: [f64; 4],

    /// Angular velocity, always zero.
    pub angular_velocity: [f64; 3],

    /// Seconds per tick.
    pub rate: f64,

    /// Segment id, at most 40 characters.
    pub comment: String,
}

/// Operations the conversion needs from a set of loaded kernels.
pub trait KernelStore {
    /// Load a kernel file. Loading a meta-kernel also loads every file it lists.
    fn load(&mut self, path: &Path) -> ConvResult<()>;

    /// Unload a kernel file, and any files it loaded.
    fn unload(&mut self, path: &Path) -> ConvResult<()>;

    /// Unload everything.
    fn clear_all(&mut self);

    /// Number of loaded files, including those loaded by meta-kernels.
    fn count_loaded(&self) -> usize;

    /// Does the file exist on disk.
    fn exists(&self, path: &Path) -> bool;

    /// Integer value of a pool variable.
    fn get_integer_pool_value(&self, key: &str, index: usize) -> ConvResult<i64>;

    /// String value of a pool variable, joining components ending in `continuation`.
    fn get_string_pool_value(
        &self,
        key: &str,
        index: usize,
        continuation: Option<char>,
        max_len: usize,
    ) -> ConvResult<String>;

    /// Number of logical string values of a pool variable.
    fn count_string_pool_values(&self, key: &str, continuation: Option<char>)
        -> ConvResult<usize>;

    /// Up to `max` numeric values of a pool variable, starting from `start`.
    fn get_double_pool_values(&self, key: &str, start: usize, max: usize) -> ConvResult<Vec<f64>>;

    /// Convert ephemeris time to encoded clock ticks.
    fn time_to_ticks(&self, clock_id: i64, et: f64) -> ConvResult<f64>;

    /// Convert encoded clock ticks to ephemeris time.
    fn ticks_to_time(&self, clock_id: i64, ticks: f64) -> ConvResult<f64>;

    /// Convert a rotation matrix to a quaternion.
    fn rotation_to_quaternion(&self, mat: &Matrix3<f64>) -> ConvResult<[f64; 4]>;

    /// Rotation from one named frame to another at the given ephemeris time.
    fn transform_between_frames(&self, from: &str, to: &str, et: f64)
        -> ConvResult<Matrix3<f64>>;

    /// Create a new CK file, never replacing an existing file.
    fn open_pointing_kernel_for_write(
        &mut self,
        path: &Path,
        label: &str,
        comment_chars: usize,
    ) -> ConvResult<CkHandle>;

    /// Add a segment to an open CK.
    fn append_fixed_orientation_segment(
        &mut self,
        handle: CkHandle,
        segment: &Segment,
    ) -> ConvResult<()>;

    /// Write out and close an open CK.
    fn close_handle(&mut self, handle: CkHandle) -> ConvResult<()>;

    /// Close an open CK without writing it, removing the file.
    fn abandon_handle(&mut self, handle: CkHandle) -> ConvResult<()>;
}

#[derive(Debug)]
enum Contents {
    Text(Vec<Assignment>),
    Pointing(Vec<CkSegment>),
    Daf(DAFType),
}

#[derive(Debug)]
struct LoadedKernel {
    path: PathBuf,
    parent: Option<PathBuf>,
    contents: Contents,
}

/// Kernels loaded in memory.
#[derive(Debug, Default)]
pub struct KernelSet {
    loaded: Vec<LoadedKernel>,
    pool: KernelPool,
    cks: CkCollection,
    writers: HashMap<CkHandle, CkWriter>,
    next_handle: usize,
}

/// Replace `$SYMBOL` references with their values.
fn substitute_symbols(path: &str, symbols: &[(String, String)]) -> String {
    let mut path = path.to_string();
    // Longest first so $A does not clobber $AB.
    let mut sorted: Vec<_> = symbols.iter().collect();
    sorted.sort_by_key(|(name, _)| std::cmp::Reverse(name.len()));
    for (name, value) in sorted {
        path = path.replace(&format!("${}", name), value);
    }
    path
}

fn read_contents(path: &Path) -> ConvResult<Contents> {
    let mut file = File::open(path)
        .map_err(|err| Error::KernelLoad(format!("{}: {}", path.display(), err)))?;
    let mut buffer = Vec::new();
    let _ = file
        .read_to_end(&mut buffer)
        .map_err(|err| Error::KernelLoad(format!("{}: {}", path.display(), err)))?;

    if buffer.starts_with(b"DAF/") {
        let daf = DafFile::from_buffer(std::io::Cursor::new(buffer))
            .map_err(|err| Error::KernelLoad(format!("{}: {}", path.display(), err)))?;
        return Ok(match daf.daf_type {
            DAFType::Ck => Contents::Pointing(ck_segments(daf)?),
            other => Contents::Daf(other),
        });
    }

    let text = String::from_utf8(buffer).map_err(|_| {
        Error::KernelLoad(format!("{} is neither a DAF nor a text kernel", path.display()))
    })?;
    let assignments = parse_text_kernel(&text)
        .map_err(|err| Error::KernelLoad(format!("{}: {}", path.display(), err)))?;
    Ok(Contents::Text(assignments))
}

/// Pool and pointing derived from the given kernels, in load order.
fn assemble<'a>(
    kernels: impl Iterator<Item = &'a LoadedKernel> + Clone,
) -> ConvResult<(KernelPool, CkCollection)> {
    let pool = KernelPool::from_kernels(kernels.clone().filter_map(|k| match &k.contents {
        Contents::Text(assigns) => Some(assigns.as_slice()),
        _ => None,
    }))?;
    let mut cks = CkCollection::default();
    for kernel in kernels {
        if let Contents::Pointing(segments) = &kernel.contents {
            cks.extend(segments.iter().cloned());
        }
    }
    Ok((pool, cks))
}

impl KernelSet {
    /// Construct an empty kernel set.
    pub fn new() -> Self {
        Self::default()
    }

    /// The combined kernel pool.
    pub fn pool(&self) -> &KernelPool {
        &self.pool
    }

    /// The loaded pointing segments.
    pub fn pointing(&self) -> &CkCollection {
        &self.cks
    }

    /// Paths of the loaded files, in load order.
    pub fn loaded_paths(&self) -> impl Iterator<Item = &Path> {
        self.loaded.iter().map(|k| k.path.as_path())
    }

    fn is_loaded(&self, path: &Path) -> bool {
        self.loaded.iter().any(|k| k.path == path)
    }

    /// Load one file, returning the files it lists if it is a meta-kernel.
    fn load_single(&mut self, path: &Path, parent: Option<&Path>) -> ConvResult<Vec<PathBuf>> {
        let contents = read_contents(path)?;
        let mut children = Vec::new();

        match &contents {
            Contents::Text(assigns) => {
                let mut pool = self.pool.clone();
                pool.apply(assigns)?;

                if assigns.iter().any(|a| a.name == "KERNELS_TO_LOAD") {
                    if parent.is_some() {
                        Err(Error::KernelLoad(format!(
                            "{} is a meta-kernel loaded by another meta-kernel",
                            path.display()
                        )))?;
                    }
                    let mut symbols: Vec<(String, String)> = Vec::new();
                    if pool.contains("PATH_SYMBOLS") {
                        let names = pool.strings("PATH_SYMBOLS", None)?;
                        let values = pool.strings("PATH_VALUES", Some('+'))?;
                        if names.len() != values.len() {
                            Err(Error::KernelLoad(format!(
                                "{}: PATH_SYMBOLS and PATH_VALUES differ in length",
                                path.display()
                            )))?;
                        }
                        symbols.extend(names.into_iter().zip(values));
                    }
                    children = pool
                        .strings("KERNELS_TO_LOAD", Some('+'))?
                        .iter()
                        .map(|p| PathBuf::from(substitute_symbols(p.trim(), &symbols)))
                        .collect();
                }
                self.pool = pool;
            }
            Contents::Pointing(segments) => self.cks.extend(segments.iter().cloned()),
            Contents::Daf(daf_type) => {
                debug!("{} is a {:?} file, it adds no pool or pointing data", path.display(), daf_type)
            }
        }

        debug!("Loaded kernel {}", path.display());
        self.loaded.push(LoadedKernel {
            path: path.to_path_buf(),
            parent: parent.map(Path::to_path_buf),
            contents,
        });
        Ok(children)
    }

    fn writer(&mut self, handle: CkHandle) -> ConvResult<&mut CkWriter> {
        self.writers
            .get_mut(&handle)
            .ok_or_else(|| Error::ValueError(format!("{:?} is not open", handle)))
    }
}

impl KernelStore for KernelSet {
    fn load(&mut self, path: &Path) -> ConvResult<()> {
        if self.is_loaded(path) {
            self.unload(path)?;
        }
        let children = self.load_single(path, None)?;
        for child in children {
            if let Err(err) = self.load_single(&child, Some(path)) {
                self.unload(path)?;
                return Err(err);
            }
        }
        Ok(())
    }

    fn unload(&mut self, path: &Path) -> ConvResult<()> {
        let keep = |k: &LoadedKernel| k.path != path && k.parent.as_deref() != Some(path);
        if self.loaded.iter().all(keep) {
            return Ok(());
        }
        // Nothing changes unless the remaining kernels still combine.
        let (pool, cks) = assemble(self.loaded.iter().filter(|k| keep(k)))?;
        self.loaded.retain(keep);
        self.pool = pool;
        self.cks = cks;
        debug!("Unloaded kernel {}", path.display());
        Ok(())
    }

    fn clear_all(&mut self) {
        self.loaded.clear();
        self.pool = KernelPool::default();
        self.cks = CkCollection::default();
    }

    fn count_loaded(&self) -> usize {
        self.loaded.len()
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn get_integer_pool_value(&self, key: &str, index: usize) -> ConvResult<i64> {
        self.pool.integer(key, index)
    }

    fn get_string_pool_value(
        &self,
        key: &str,
        index: usize,
        continuation: Option<char>,
        max_len: usize,
    ) -> ConvResult<String> {
        self.pool.string(key, index, continuation, max_len)
    }

    fn count_string_pool_values(
        &self,
        key: &str,
        continuation: Option<char>,
    ) -> ConvResult<usize> {
        Ok(self.pool.strings(key, continuation)?.len())
    }

    fn get_double_pool_values(&self, key: &str, start: usize, max: usize) -> ConvResult<Vec<f64>> {
        self.pool.doubles(key, start, max)
    }

    fn time_to_ticks(&self, clock_id: i64, et: f64) -> ConvResult<f64> {
        Sclk::from_pool(&self.pool, clock_id)?.time_to_ticks(et)
    }

    fn ticks_to_time(&self, clock_id: i64, ticks: f64) -> ConvResult<f64> {
        Sclk::from_pool(&self.pool, clock_id)?.ticks_to_time(ticks)
    }

    fn rotation_to_quaternion(&self, mat: &Matrix3<f64>) -> ConvResult<[f64; 4]> {
        matrix_to_quaternion(mat)
    }

    fn transform_between_frames(
        &self,
        from: &str,
        to: &str,
        et: f64,
    ) -> ConvResult<Matrix3<f64>> {
        let from = frame_id_from_name(&self.pool, from)?;
        let to = frame_id_from_name(&self.pool, to)?;
        rotation_between(&self.pool, &self.cks, from, to, et)
    }

    fn open_pointing_kernel_for_write(
        &mut self,
        path: &Path,
        label: &str,
        comment_chars: usize,
    ) -> ConvResult<CkHandle> {
        let writer = CkWriter::create(path, label, comment_chars)?;
        let handle = CkHandle(self.next_handle);
        self.next_handle += 1;
        let _ = self.writers.insert(handle, writer);
        debug!("Opened {} for writing as {:?}", path.display(), handle);
        Ok(handle)
    }

    fn append_fixed_orientation_segment(
        &mut self,
        handle: CkHandle,
        segment: &Segment,
    ) -> ConvResult<()> {
        let reference_frame = frame_id_from_name(&self.pool, &segment.relative_frame)?;
        let record = CkRecord {
            start: segment.start_tick,
            stop: segment.stop_tick,
            quaternion: segment.orientation,
            angular_velocity: segment.angular_velocity,
            rate: segment.rate,
        };
        self.writer(handle)?.append(CkSegment {
            instrument_id: segment.frame,
            reference_frame,
            start: segment.start_tick,
            stop: segment.stop_tick,
            segment_id: segment.comment.clone(),
            records: vec![record],
        })
    }

    fn close_handle(&mut self, handle: CkHandle) -> ConvResult<()> {
        let writer = self
            .writers
            .remove(&handle)
            .ok_or_else(|| Error::ValueError(format!("{:?} is not open", handle)))?;
        debug!("Closing {}", writer.path().display());
        writer.close()
    }

    fn abandon_handle(&mut self, handle: CkHandle) -> ConvResult<()> {
        let writer = self
            .writers
            .remove(&handle)
            .ok_or_else(|| Error::ValueError(format!("{:?} is not open", handle)))?;
        let path = writer.path().to_path_buf();
        drop(writer);
        std::fs::remove_file(&path)?;
        debug!("Removed partial file {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_kernels::Fixture;

    #[test]
    fn meta_kernel_children() {
        let fx = Fixture::new();
        let meta = fx.write(
            "meta.tm",
            &format!(
                "\\begindata\nPATH_SYMBOLS = ( 'K' )\nPATH_VALUES = ( '{}' )\nKERNELS_TO_LOAD = ( '$K/a.tk' '$K/+'\n'b.tk' )\n",
                fx.dir().display()
            ),
        );
        let _ = fx.write("a.tk", "\\begindata\nA = 1\nSHARED = 1\n");
        let _ = fx.write("b.tk", "\\begindata\nB = 2\nSHARED = 2\n");

        let mut store = KernelSet::new();
        store.load(&meta).unwrap();
        assert!(store.count_loaded() == 3);
        assert!(store.get_integer_pool_value("SHARED", 0).unwrap() == 2);

        store.unload(&fx.dir().join("b.tk")).unwrap();
        assert!(store.count_loaded() == 2);
        assert!(store.get_integer_pool_value("SHARED", 0).unwrap() == 1);
        assert!(store.get_integer_pool_value("B", 0).is_err());

        store.unload(&meta).unwrap();
        assert!(store.count_loaded() == 0);
        assert!(store.pool().is_empty());
    }

    #[test]
    fn failed_unload_keeps_state() {
        let fx = Fixture::new();
        let first = fx.write("first.tk", "\\begindata\nX = 'text'\n");
        let second = fx.write("second.tk", "\\begindata\nX = 1\n");
        let third = fx.write("third.tk", "\\begindata\nX += 2\n");

        let mut store = KernelSet::new();
        for path in [&first, &second, &third] {
            store.load(path).unwrap();
        }
        assert!(store.get_double_pool_values("X", 0, 10).unwrap() == vec![1.0, 2.0]);

        // Without the second kernel the append meets a string.
        assert!(store.unload(&second).is_err());
        assert!(store.count_loaded() == 3);
        assert!(store.get_double_pool_values("X", 0, 10).unwrap() == vec![1.0, 2.0]);

        store.unload(&third).unwrap();
        store.unload(&second).unwrap();
        assert!(store.get_string_pool_value("X", 0, None, 80).unwrap() == "text");
    }

    #[test]
    fn failed_child_rolls_back() {
        let fx = Fixture::new();
        let meta = fx.write(
            "meta.tm",
            &format!(
                "\\begindata\nKERNELS_TO_LOAD = ( '{}' )\n",
                fx.dir().join("missing.tk").display()
            ),
        );
        let mut store = KernelSet::new();
        assert!(matches!(store.load(&meta), Err(Error::KernelLoad(_))));
        assert!(store.count_loaded() == 0);
        assert!(store.count_string_pool_values("KERNELS_TO_LOAD", None).is_err());
    }

    #[test]
    fn reload_moves_to_end() {
        let fx = Fixture::new();
        let first = fx.write("first.tk", "\\begindata\nX = 1\n");
        let second = fx.write("second.tk", "\\begindata\nX = 2\n");

        let mut store = KernelSet::new();
        store.load(&first).unwrap();
        store.load(&second).unwrap();
        assert!(store.get_integer_pool_value("X", 0).unwrap() == 2);
        store.load(&first).unwrap();
        assert!(store.count_loaded() == 2);
        assert!(store.get_integer_pool_value("X", 0).unwrap() == 1);

        // unloading something never loaded is not an error
        store.unload(Path::new("nothing.tk")).unwrap();
        store.clear_all();
        assert!(store.count_loaded() == 0);
    }

    #[test]
    fn write_and_load_pointing() {
        let fx = Fixture::new();
        let mut store = KernelSet::new();
        store.load(&fx.lsk_sclk()).unwrap();
        store.load(&fx.new_fk()).unwrap();

        let path = fx.dir().join("out.bc");
        let handle = store
            .open_pointing_kernel_for_write(&path, "FK REPLACEMENT", 0)
            .unwrap();
        let segment = Segment {
            frame: -64401,
            relative_frame: "SC_BASE".into(),
            start_tick: 0.0,
            stop_tick: 1e9,
            orientation: [0.0, 0.0, 0.0, 1.0],
            angular_velocity: [0.0; 3],
            rate: 1.0 / 65536.0,
            comment: "test".into(),
        };
        store.append_fixed_orientation_segment(handle, &segment).unwrap();
        store.close_handle(handle).unwrap();
        assert!(store.close_handle(handle).is_err());
        assert!(store.exists(&path));

        store.load(&path).unwrap();
        assert!(store.pointing().len() == 1);
        let rot = store
            .transform_between_frames("SC_BASE", "SC_HIGH", 100.0)
            .unwrap();
        assert!(store.rotation_to_quaternion(&rot).unwrap() == [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn abandon_removes_file() {
        let fx = Fixture::new();
        let mut store = KernelSet::new();
        let path = fx.dir().join("partial.bc");
        let handle = store.open_pointing_kernel_for_write(&path, "X", 0).unwrap();
        assert!(path.exists());
        store.abandon_handle(handle).unwrap();
        assert!(!path.exists());
    }
}
