//! Reference frames defined by the kernel pool and loaded CK segments.
//!
//! Every frame other than J2000 is linked to a single parent frame by a rotation. A
//! transform between two frames walks both parent chains up to the nearest frame they
//! share, so a query between a frame and its direct parent only ever evaluates that one
//! link. This matters when only part of a frame tree is loaded, for example a single
//! historical frame kernel without the spacecraft pointing its frames hang off of.
//!
//! Rotation matrices follow the SPICE sense: the matrix returned for `(from, to)`
//! rotates vectors expressed in `from` into `to`.
//!
use super::ck::CkCollection;
use super::pool::KernelPool;
use super::sclk::Sclk;
use crate::errors::{ConvResult, Error};
use lazy_static::lazy_static;
use nalgebra::{Matrix3, Quaternion, Rotation3, UnitQuaternion, Vector3};

/// NAIF id of the J2000 equatorial frame.
pub const J2000_ID: i32 = 1;

/// NAIF id of the J2000 ecliptic frame.
pub const ECLIPJ2000_ID: i32 = 17;

/// Ecliptic obliquity at J2000, from the 1984 JPL DE series, matching SPICE.
const OBLIQUITY: f64 = 0.40909280422232897;

/// Chains longer than this are assumed to be cyclic.
const MAX_CHAIN_DEPTH: usize = 100;

/// Allowed deviation of a TK matrix from a rotation.
const TK_MATRIX_TOLERANCE: f64 = 1e-6;

/// Allowed deviation when converting a matrix to a quaternion.
const ROTATION_TOLERANCE: f64 = 0.1;

lazy_static! {
    /// Rotates vectors from the ecliptic frame into the equatorial frame.
    static ref ECLIPTIC_EQUATORIAL_ROT: Matrix3<f64> = {
        Rotation3::from_axis_angle(&Vector3::x_axis(), OBLIQUITY).into_inner()
    };
}

/// How a frame is tied to its parent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameClass {
    /// Built in inertial frame.
    Inertial,

    /// Fixed offset frame, defined by a TKFRAME specification.
    Tk,

    /// Frame pointed by CK segments of the given instrument id.
    Ck {
        /// Instrument id of the CK segments.
        class_id: i32,
    },
}

/// Identity of a known frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameInfo {
    /// NAIF frame id.
    pub id: i32,

    /// Frame name.
    pub name: String,

    /// Frame class.
    pub class: FrameClass,
}

/// Parent of a frame, and the rotation from the frame into the parent.
#[derive(Debug, Clone)]
struct Link {
    parent: i32,
    to_parent: Matrix3<f64>,
}

/// Look up the id of a frame from its name.
pub fn frame_id_from_name(pool: &KernelPool, name: &str) -> ConvResult<i32> {
    let name = name.trim().to_uppercase();
    match name.as_str() {
        "J2000" => Ok(J2000_ID),
        "ECLIPJ2000" => Ok(ECLIPJ2000_ID),
        _ => {
            let key = format!("FRAME_{}", name);
            if !pool.contains(&key) {
                Err(Error::UnknownFrame(name))?;
            }
            to_i32(pool.integer(&key, 0)?)
        }
    }
}

/// Look up the name and class of a frame from its id.
pub fn frame_info(pool: &KernelPool, id: i32) -> ConvResult<FrameInfo> {
    match id {
        J2000_ID => {
            return Ok(FrameInfo {
                id,
                name: "J2000".into(),
                class: FrameClass::Inertial,
            })
        }
        ECLIPJ2000_ID => {
            return Ok(FrameInfo {
                id,
                name: "ECLIPJ2000".into(),
                class: FrameClass::Inertial,
            })
        }
        _ => (),
    }

    let name = pool
        .try_string(&format!("FRAME_{}_NAME", id))?
        .ok_or_else(|| Error::UnknownFrame(id.to_string()))?;
    let class = pool.integer(&format!("FRAME_{}_CLASS", id), 0)?;
    let class = match class {
        3 => FrameClass::Ck {
            class_id: to_i32(pool.integer(&format!("FRAME_{}_CLASS_ID", id), 0)?)?,
        },
        4 => FrameClass::Tk,
        c => Err(Error::ValueError(format!(
            "Frame {} is class {}, only TK (4) and CK (3) frames are supported.",
            name, c
        )))?,
    };
    Ok(FrameInfo { id, name, class })
}

fn to_i32(value: i64) -> ConvResult<i32> {
    i32::try_from(value).map_err(|_| Error::ValueError(format!("{} does not fit an id", value)))
}

/// Find the TKFRAME variable of a frame, keyed either by id or by name.
fn tk_key(pool: &KernelPool, info: &FrameInfo, suffix: &str) -> Option<String> {
    [
        format!("TKFRAME_{}_{}", info.id, suffix),
        format!("TKFRAME_{}_{}", info.name, suffix),
    ]
    .into_iter()
    .find(|key| pool.contains(key))
}

fn required_tk_key(pool: &KernelPool, info: &FrameInfo, suffix: &str) -> ConvResult<String> {
    tk_key(pool, info, suffix).ok_or_else(|| {
        Error::PoolLookup(format!(
            "TKFRAME_{}_{} is not in the pool",
            info.id, suffix
        ))
    })
}

/// Coordinate frame rotation about one axis, SPICE's `[angle]_axis`.
fn axis_rotation(axis: i64, angle: f64) -> ConvResult<Matrix3<f64>> {
    let unit = match axis {
        1 => Vector3::x_axis(),
        2 => Vector3::y_axis(),
        3 => Vector3::z_axis(),
        _ => Err(Error::ValueError(format!(
            "Rotation axis {} must be 1, 2 or 3",
            axis
        )))?,
    };
    // Frame rotations turn the axes, not the vectors.
    Ok(Rotation3::from_axis_angle(&unit, -angle).into_inner())
}

fn angle_scale(units: &str) -> ConvResult<f64> {
    Ok(match units.trim().to_uppercase().as_str() {
        "RADIANS" => 1.0,
        "DEGREES" => 1f64.to_radians(),
        "ARCMINUTES" => (1.0 / 60.0f64).to_radians(),
        "ARCSECONDS" => (1.0 / 3600.0f64).to_radians(),
        u => Err(Error::ValueError(format!("Unknown angle units {:?}", u)))?,
    })
}

/// Orientation of a TK frame relative to its parent.
///
/// All specifications produce the matrix which rotates vectors from the TK frame into
/// the relative frame. `MATRIX` values are read in column major order, `ANGLES` give
/// `[ANGLE_3]_AXIS_3 [ANGLE_2]_AXIS_2 [ANGLE_1]_AXIS_1`.
fn tk_orientation(pool: &KernelPool, info: &FrameInfo) -> ConvResult<Matrix3<f64>> {
    let spec_key = required_tk_key(pool, info, "SPEC")?;
    let spec = pool.string(&spec_key, 0, None, 80)?.trim().to_uppercase();

    match spec.as_str() {
        "MATRIX" => {
            let key = required_tk_key(pool, info, "MATRIX")?;
            let values = pool.numbers(&key)?;
            if values.len() != 9 {
                Err(Error::KernelLoad(format!("{} must contain 9 values", key)))?;
            }
            let mat = Matrix3::from_column_slice(values);
            let error = (mat * mat.transpose() - Matrix3::identity()).abs().max();
            if error > TK_MATRIX_TOLERANCE || (mat.determinant() - 1.0).abs() > TK_MATRIX_TOLERANCE
            {
                Err(Error::KernelLoad(format!("{} is not a rotation matrix", key)))?;
            }
            Ok(mat)
        }
        "ANGLES" => {
            let angles = pool.numbers(&required_tk_key(pool, info, "ANGLES")?)?;
            let axes_key = required_tk_key(pool, info, "AXES")?;
            let units_key = required_tk_key(pool, info, "UNITS")?;
            let scale = angle_scale(&pool.string(&units_key, 0, None, 80)?)?;
            if angles.len() != 3 || pool.numbers(&axes_key)?.len() != 3 {
                Err(Error::KernelLoad(format!(
                    "TK frame {} needs 3 angles and 3 axes",
                    info.name
                )))?;
            }
            let mut mat = Matrix3::identity();
            for (idx, angle) in angles.iter().enumerate() {
                let axis = pool.integer(&axes_key, idx)?;
                mat = axis_rotation(axis, angle * scale)? * mat;
            }
            Ok(mat)
        }
        "QUATERNION" => {
            let key = required_tk_key(pool, info, "Q")?;
            let values = pool.numbers(&key)?;
            if values.len() != 4 {
                Err(Error::KernelLoad(format!("{} must contain 4 values", key)))?;
            }
            let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();
            if (norm - 1.0).abs() > TK_MATRIX_TOLERANCE {
                Err(Error::KernelLoad(format!("{} is not a unit quaternion", key)))?;
            }
            Ok(quaternion_to_matrix(&[
                values[0], values[1], values[2], values[3],
            ]))
        }
        s => Err(Error::KernelLoad(format!(
            "TK frame {} has unsupported specification {:?}",
            info.name, s
        ))),
    }
}

/// Name of the parent frame of a TK frame.
pub fn tk_relative(pool: &KernelPool, info: &FrameInfo) -> ConvResult<String> {
    let key = required_tk_key(pool, info, "RELATIVE")?;
    pool.string(&key, 0, None, 80)
}

fn link(pool: &KernelPool, cks: &CkCollection, id: i32, et: f64) -> ConvResult<Option<Link>> {
    let info = frame_info(pool, id)?;
    match info.class {
        FrameClass::Inertial => Ok(match id {
            ECLIPJ2000_ID => Some(Link {
                parent: J2000_ID,
                to_parent: *ECLIPTIC_EQUATORIAL_ROT,
            }),
            _ => None,
        }),
        FrameClass::Tk => {
            let parent = frame_id_from_name(pool, &tk_relative(pool, &info)?)?;
            Ok(Some(Link {
                parent,
                to_parent: tk_orientation(pool, &info)?,
            }))
        }
        FrameClass::Ck { class_id } => {
            let clock_id = pool.integer(&format!("CK_{}_SCLK", class_id), 0)?;
            let ticks = Sclk::from_pool(pool, clock_id)?.time_to_ticks(et)?;
            let (parent, quat) = cks.try_get_pointing(class_id, ticks)?;
            Ok(Some(Link {
                parent,
                to_parent: quaternion_to_matrix(&quat).transpose(),
            }))
        }
    }
}

/// Frames visited from a starting frame, each with the rotation from the start.
#[derive(Debug)]
struct Chain {
    nodes: Vec<(i32, Matrix3<f64>)>,
    failure: Option<Error>,
}

impl Chain {
    fn position(&self, id: i32) -> Option<usize> {
        self.nodes.iter().position(|(node, _)| *node == id)
    }

    /// Walk up from `start` until the root, a frame present in `stop`, or a link which
    /// can not be evaluated.
    fn walk(
        pool: &KernelPool,
        cks: &CkCollection,
        start: i32,
        et: f64,
        stop: Option<&Chain>,
    ) -> Chain {
        let mut nodes = vec![(start, Matrix3::identity())];
        loop {
            let (current, rot) = nodes[nodes.len() - 1];
            if stop.is_some_and(|s| s.position(current).is_some()) {
                return Chain {
                    nodes,
                    failure: None,
                };
            }
            if nodes.len() > MAX_CHAIN_DEPTH {
                return Chain {
                    nodes,
                    failure: Some(Error::ValueError(format!(
                        "Frame chain from {} does not terminate",
                        start
                    ))),
                };
            }
            match link(pool, cks, current, et) {
                Ok(Some(link)) => nodes.push((link.parent, link.to_parent * rot)),
                Ok(None) => {
                    return Chain {
                        nodes,
                        failure: None,
                    }
                }
                Err(err) => {
                    return Chain {
                        nodes,
                        failure: Some(err),
                    }
                }
            }
        }
    }
}

/// Rotation matrix from frame `from` to frame `to` at the ephemeris time `et`.
pub fn rotation_between(
    pool: &KernelPool,
    cks: &CkCollection,
    from: i32,
    to: i32,
    et: f64,
) -> ConvResult<Matrix3<f64>> {
    let to_chain = Chain::walk(pool, cks, to, et, None);
    let from_chain = Chain::walk(pool, cks, from, et, Some(&to_chain));

    let (common, rot_from) = from_chain.nodes[from_chain.nodes.len() - 1];
    match to_chain.position(common) {
        Some(pos) => Ok(to_chain.nodes[pos].1.transpose() * rot_from),
        None => Err(from_chain
            .failure
            .or(to_chain.failure)
            .unwrap_or_else(|| {
                Error::UnknownFrame(format!("no path between frames {} and {}", from, to))
            })),
    }
}

/// Convert a rotation matrix to a SPICE quaternion, `[w, x, y, z]` with `w >= 0`.
pub fn matrix_to_quaternion(mat: &Matrix3<f64>) -> ConvResult<[f64; 4]> {
    let error = (mat * mat.transpose() - Matrix3::identity()).abs().max();
    if !(error <= ROTATION_TOLERANCE) || !((mat.determinant() - 1.0).abs() <= ROTATION_TOLERANCE)
    {
        Err(Error::ValueError(
            "Matrix is not a rotation, can not convert to a quaternion.".into(),
        ))?;
    }
    let quat = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(*mat));
    let q = quat.quaternion();
    let sign = if q.w < 0.0 { -1.0 } else { 1.0 };
    Ok([sign * q.w, sign * q.i, sign * q.j, sign * q.k])
}

/// Convert a SPICE quaternion, `[w, x, y, z]`, to a rotation matrix.
pub fn quaternion_to_matrix(quat: &[f64; 4]) -> Matrix3<f64> {
    UnitQuaternion::new_unchecked(Quaternion::new(quat[0], quat[1], quat[2], quat[3]))
        .to_rotation_matrix()
        .into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spice::ck::{CkRecord, CkSegment};
    use crate::spice::text_kernel::parse_text_kernel;

    const FRAMES: &str = r"
\begindata
FRAME_SC_BUS             = -64000
FRAME_-64000_NAME        = 'SC_BUS'
FRAME_-64000_CLASS       = 3
FRAME_-64000_CLASS_ID    = -64000
CK_-64000_SCLK           = -64

FRAME_SC_BASE            = -64400
FRAME_-64400_NAME        = 'SC_BASE'
FRAME_-64400_CLASS       = 4
FRAME_-64400_CLASS_ID    = -64400
TKFRAME_-64400_RELATIVE  = 'SC_BUS'
TKFRAME_-64400_SPEC      = 'ANGLES'
TKFRAME_-64400_UNITS     = 'DEGREES'
TKFRAME_-64400_AXES      = ( 3, 2, 1 )
TKFRAME_-64400_ANGLES    = ( 0.0, 0.0, 90.0 )

FRAME_SC_HIGH            = -64401
FRAME_-64401_NAME        = 'SC_HIGH'
FRAME_-64401_CLASS       = 4
FRAME_-64401_CLASS_ID    = -64401
TKFRAME_SC_HIGH_RELATIVE = 'SC_BASE'
TKFRAME_SC_HIGH_SPEC     = 'MATRIX'
TKFRAME_SC_HIGH_MATRIX   = ( -1 0 0  0 -1 0  0 0 1 )

FRAME_SC_LOW             = -64402
FRAME_-64402_NAME        = 'SC_LOW'
FRAME_-64402_CLASS       = 4
FRAME_-64402_CLASS_ID    = -64402
TKFRAME_-64402_RELATIVE  = 'ECLIPJ2000'
TKFRAME_-64402_SPEC      = 'QUATERNION'
TKFRAME_-64402_Q         = ( 0.0 1.0 0.0 0.0 )

SCLK01_MODULI_64         = ( 4294967296 65536 )
SCLK_PARTITION_START_64  = ( 0.0 )
SCLK_PARTITION_END_64    = ( 2.8147497671065E+14 )
SCLK01_COEFFICIENTS_64   = ( 0.0 0.0 1.0 )
";

    fn pool() -> KernelPool {
        let assigns = parse_text_kernel(FRAMES).unwrap();
        KernelPool::from_kernels([assigns.as_slice()]).unwrap()
    }

    fn bus_pointing(quat: [f64; 4]) -> CkCollection {
        let mut cks = CkCollection::default();
        cks.extend([CkSegment {
            instrument_id: -64000,
            reference_frame: J2000_ID,
            start: 0.0,
            stop: 1e12,
            segment_id: "bus".into(),
            records: vec![CkRecord {
                start: 0.0,
                stop: 1e12,
                quaternion: quat,
                angular_velocity: [0.0; 3],
                rate: 1.0 / 65536.0,
            }],
        }]);
        cks
    }

    fn close(a: &Matrix3<f64>, b: &Matrix3<f64>) -> bool {
        (a - b).abs().max() < 1e-14
    }

    #[test]
    fn names_and_ids() {
        let pool = pool();
        assert!(frame_id_from_name(&pool, "j2000").unwrap() == J2000_ID);
        assert!(frame_id_from_name(&pool, "SC_HIGH").unwrap() == -64401);
        assert!(matches!(
            frame_id_from_name(&pool, "NOPE"),
            Err(Error::UnknownFrame(_))
        ));

        let info = frame_info(&pool, -64000).unwrap();
        assert!(info.name == "SC_BUS");
        assert!(info.class == FrameClass::Ck { class_id: -64000 });
        assert!(frame_info(&pool, -64401).unwrap().class == FrameClass::Tk);
        assert!(frame_info(&pool, 12345).is_err());

        let high = frame_info(&pool, -64401).unwrap();
        assert!(tk_relative(&pool, &high).unwrap() == "SC_BASE");
    }

    #[test]
    fn direct_parent_without_pointing() {
        // No CK is loaded, but the bus is never evaluated.
        let pool = pool();
        let cks = CkCollection::default();

        let rot = rotation_between(&pool, &cks, -64400, -64401, 0.0).unwrap();
        let expected = Matrix3::new(-1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 1.0);
        assert!(rot == expected);

        let back = rotation_between(&pool, &cks, -64401, -64400, 0.0).unwrap();
        assert!(back == expected.transpose());

        // Reaching J2000 needs the bus pointing.
        assert!(rotation_between(&pool, &cks, J2000_ID, -64401, 0.0).is_err());
        assert!(rotation_between(&pool, &cks, -64401, -64401, 0.0).unwrap() == Matrix3::identity());
    }

    #[test]
    fn through_pointing() {
        let pool = pool();
        // 180 degrees about z.
        let cks = bus_pointing([0.0, 0.0, 0.0, 1.0]);

        let bus = rotation_between(&pool, &cks, J2000_ID, -64000, 10.0).unwrap();
        assert!(bus == Matrix3::new(-1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 1.0));

        // The angles rotate the base frame into the bus.
        let base = rotation_between(&pool, &cks, -64000, -64400, 10.0).unwrap();
        let expected = Matrix3::new(1.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, 1.0, 0.0);
        assert!(close(&base, &expected));

        let full = rotation_between(&pool, &cks, J2000_ID, -64401, 10.0).unwrap();
        let high = Matrix3::new(-1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 1.0);
        assert!(close(&full, &(high * expected * bus)));

        // Outside of the clock range.
        assert!(rotation_between(&pool, &cks, J2000_ID, -64000, -10.0).is_err());
    }

    #[test]
    fn ecliptic() {
        let pool = pool();
        let cks = CkCollection::default();
        let rot = rotation_between(&pool, &cks, J2000_ID, ECLIPJ2000_ID, 0.0).unwrap();
        let z = rot * Vector3::new(0.0, 0.0, 1.0);
        assert!((z[2] - OBLIQUITY.cos()).abs() < 1e-15);
        assert!((z[1] - OBLIQUITY.sin()).abs() < 1e-15);

        let low = rotation_between(&pool, &cks, ECLIPJ2000_ID, -64402, 0.0).unwrap();
        assert!(low == Matrix3::new(1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, -1.0));
    }

    #[test]
    fn quaternions() {
        let mat = Matrix3::new(-1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 1.0);
        let q = matrix_to_quaternion(&mat).unwrap();
        assert!(q == [0.0, 0.0, 0.0, 1.0]);
        assert!(quaternion_to_matrix(&q) == mat);

        let q = matrix_to_quaternion(&Matrix3::identity()).unwrap();
        assert!(q == [1.0, 0.0, 0.0, 0.0]);

        let rot = Rotation3::from_euler_angles(0.3, -1.2, 2.9).into_inner();
        let q = matrix_to_quaternion(&rot).unwrap();
        assert!(q[0] >= 0.0);
        assert!(close(&quaternion_to_matrix(&q), &rot));

        let neg = matrix_to_quaternion(&(-rot)).is_err();
        assert!(neg);
        assert!(matrix_to_quaternion(&(rot * 2.0)).is_err());
    }

    #[test]
    fn bad_tk_matrix() {
        let text = r"
\begindata
FRAME_BAD              = -5
FRAME_-5_NAME          = 'BAD'
FRAME_-5_CLASS         = 4
FRAME_-5_CLASS_ID      = -5
TKFRAME_-5_RELATIVE    = 'J2000'
TKFRAME_-5_SPEC        = 'MATRIX'
TKFRAME_-5_MATRIX      = ( 1 0 0 0 1 0 0 0 2 )
";
        let assigns = parse_text_kernel(text).unwrap();
        let pool = KernelPool::from_kernels([assigns.as_slice()]).unwrap();
        let cks = CkCollection::default();
        assert!(rotation_between(&pool, &cks, J2000_ID, -5, 0.0).is_err());
    }
}
