//! Spacecraft clock (SCLK) conversions.
//!
//! Only type 1 clocks are supported. These are described entirely by kernel pool
//! variables, keyed by the positive clock number `n = -clock_id`:
//!
//! - `SCLK01_COEFFICIENTS_n` - triples of (encoded ticks, parallel time, rate), where the
//!   rate is parallel time seconds per most significant clock count.
//! - `SCLK01_MODULI_n` - modulus of each clock field, the product of all but the first
//!   is the number of ticks in a most significant count.
//! - `SCLK01_TIME_SYSTEM_n` - 1 for TDB (the default), 2 for TDT.
//! - `SCLK_PARTITION_START_n`, `SCLK_PARTITION_END_n` - partition boundaries.
//!
//! Ticks here are always continuous encoded ticks, counted from the start of the first
//! partition.
//!
//! <https://naif.jpl.nasa.gov/pub/naif/toolkit_docs/C/req/sclk.html>
//!
use super::pool::KernelPool;
use crate::errors::{ConvResult, Error};
use itertools::Itertools;

/// Time system of the parallel time in the coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParallelTime {
    /// Barycentric dynamical time, identical to ephemeris time.
    Tdb,

    /// Terrestrial dynamical time.
    Tdt,
}

/// One row of the SCLK coefficient table.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SclkCoefficient {
    ticks: f64,
    parallel: f64,
    rate: f64,
}

/// A type 1 spacecraft clock, loaded from the kernel pool.
#[derive(Debug, Clone)]
pub struct Sclk {
    /// NAIF clock id, negative.
    pub clock_id: i64,

    /// Parallel time system.
    pub time_system: ParallelTime,

    /// Number of ticks in one most significant count.
    pub ticks_per_count: f64,

    /// Partition start counts.
    pub partition_start: Vec<f64>,

    /// Partition end counts.
    pub partition_end: Vec<f64>,

    coefficients: Vec<SclkCoefficient>,

    /// TDT to TDB constants, only present for TDT clocks.
    deltet: Option<Deltet>,
}

/// Leapseconds kernel constants used to convert between TDT and TDB.
#[derive(Debug, Clone, Copy)]
struct Deltet {
    k: f64,
    eb: f64,
    m0: f64,
    m1: f64,
}

impl Deltet {
    fn from_pool(pool: &KernelPool) -> ConvResult<Self> {
        let k = pool.doubles("DELTET/K", 0, 1)?;
        let eb = pool.doubles("DELTET/EB", 0, 1)?;
        let m = pool.doubles("DELTET/M", 0, 2)?;
        match (k.as_slice(), eb.as_slice(), m.as_slice()) {
            ([k], [eb], [m0, m1]) => Ok(Deltet {
                k: *k,
                eb: *eb,
                m0: *m0,
                m1: *m1,
            }),
            _ => Err(Error::PoolLookup(
                "DELTET/K, DELTET/EB and DELTET/M must hold 1, 1 and 2 values".into(),
            )),
        }
    }

    /// TDB - TDT at the given TDT.
    fn offset(&self, tdt: f64) -> f64 {
        let m = self.m0 + self.m1 * tdt;
        let e = m + self.eb * m.sin();
        self.k * e.sin()
    }

    fn tdt_to_tdb(&self, tdt: f64) -> f64 {
        tdt + self.offset(tdt)
    }

    fn tdb_to_tdt(&self, tdb: f64) -> f64 {
        // The offset is under 2 ms, a few fixed point steps are plenty.
        let mut tdt = tdb;
        for _ in 0..3 {
            tdt = tdb - self.offset(tdt);
        }
        tdt
    }
}

impl Sclk {
    /// Load the clock definition for the given clock id from the pool.
    pub fn from_pool(pool: &KernelPool, clock_id: i64) -> ConvResult<Self> {
        let n = -clock_id;
        if let Some(kind) = pool.try_integer(&format!("SCLK_DATA_TYPE_{}", n))? {
            if kind != 1 {
                Err(Error::ValueError(format!(
                    "SCLK {} is type {}, only type 1 clocks are supported.",
                    clock_id, kind
                )))?;
            }
        }

        let coefficients: Vec<SclkCoefficient> = pool
            .numbers(&format!("SCLK01_COEFFICIENTS_{}", n))?
            .iter()
            .tuples()
            .map(|(&ticks, &parallel, &rate)| SclkCoefficient {
                ticks,
                parallel,
                rate,
            })
            .collect();
        if coefficients.is_empty() {
            Err(Error::PoolLookup(format!(
                "SCLK01_COEFFICIENTS_{} contains no complete records",
                n
            )))?;
        }

        let moduli = pool.numbers(&format!("SCLK01_MODULI_{}", n))?;
        let ticks_per_count: f64 = moduli.iter().skip(1).product();

        let time_system = match pool.try_integer(&format!("SCLK01_TIME_SYSTEM_{}", n))? {
            None | Some(1) => ParallelTime::Tdb,
            Some(2) => ParallelTime::Tdt,
            Some(v) => Err(Error::ValueError(format!(
                "SCLK {} uses unknown parallel time system {}",
                clock_id, v
            )))?,
        };
        let deltet = match time_system {
            ParallelTime::Tdb => None,
            ParallelTime::Tdt => Some(Deltet::from_pool(pool)?),
        };

        let partition_start = pool
            .numbers(&format!("SCLK_PARTITION_START_{}", n))?
            .to_vec();
        let partition_end = pool.numbers(&format!("SCLK_PARTITION_END_{}", n))?.to_vec();
        if partition_start.len() != partition_end.len() || partition_end.is_empty() {
            Err(Error::PoolLookup(format!(
                "SCLK {} partition start and end do not match",
                clock_id
            )))?;
        }

        Ok(Sclk {
            clock_id,
            time_system,
            ticks_per_count,
            partition_start,
            partition_end,
            coefficients,
            deltet,
        })
    }

    /// Total number of encoded ticks covered by all partitions.
    pub fn encoded_end(&self) -> f64 {
        self.partition_start
            .iter()
            .zip(&self.partition_end)
            .map(|(start, end)| end - start)
            .sum()
    }

    /// Final count of the last partition, as declared in the kernel.
    pub fn partition_end_tick(&self) -> f64 {
        // from_pool guarantees at least one partition.
        self.partition_end[self.partition_end.len() - 1]
    }

    fn check_range(&self, ticks: f64) -> ConvResult<()> {
        if !(0.0..=self.encoded_end()).contains(&ticks) {
            Err(Error::ValueError(format!(
                "Tick {} is outside of the range of SCLK {}",
                ticks, self.clock_id
            )))?;
        }
        Ok(())
    }

    /// Convert encoded ticks to ephemeris time, seconds past J2000 TDB.
    pub fn ticks_to_time(&self, ticks: f64) -> ConvResult<f64> {
        self.check_range(ticks)?;
        let idx = self
            .coefficients
            .partition_point(|c| c.ticks <= ticks)
            .saturating_sub(1);
        let coef = &self.coefficients[idx];
        let parallel = coef.parallel + (ticks - coef.ticks) * coef.rate / self.ticks_per_count;

        Ok(match &self.deltet {
            Some(deltet) => deltet.tdt_to_tdb(parallel),
            None => parallel,
        })
    }

    /// Convert ephemeris time, seconds past J2000 TDB, into encoded ticks.
    pub fn time_to_ticks(&self, et: f64) -> ConvResult<f64> {
        let parallel = match &self.deltet {
            Some(deltet) => deltet.tdb_to_tdt(et),
            None => et,
        };
        let idx = self
            .coefficients
            .partition_point(|c| c.parallel <= parallel)
            .saturating_sub(1);
        let coef = &self.coefficients[idx];
        if coef.rate == 0.0 {
            Err(Error::ValueError(format!(
                "SCLK {} has a zero rate coefficient",
                self.clock_id
            )))?;
        }
        let ticks = coef.ticks + (parallel - coef.parallel) * self.ticks_per_count / coef.rate;
        self.check_range(ticks)?;
        Ok(ticks)
    }
}
