//! The kernel pool, the combined variables of every loaded text kernel.
//!
//! The pool is never edited in place when a kernel is unloaded. Instead it is rebuilt
//! from the assignments of the kernels which remain loaded, in their load order, so
//! definitions from an unloaded file can not leak into later lookups.
use super::text_kernel::{AssignOp, Assignment, PoolValues};
use crate::errors::{ConvResult, Error};
use smol_str::SmolStr;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Collection of kernel pool variables.
#[derive(Debug, Default, Clone)]
pub struct KernelPool {
    variables: HashMap<SmolStr, PoolValues>,
}

/// Join string components which end in the continuation character.
fn join_continued(values: &[String], continuation: Option<char>) -> Vec<String> {
    let Some(cont) = continuation else {
        return values.to_vec();
    };
    let mut joined = Vec::new();
    let mut current = String::new();
    for value in values {
        let trimmed = value.trim_end();
        if let Some(head) = trimmed.strip_suffix(cont) {
            current.push_str(head);
        } else {
            current.push_str(trimmed);
            joined.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        joined.push(current);
    }
    joined
}

impl KernelPool {
    /// Apply assignments in order.
    pub fn apply(&mut self, assignments: &[Assignment]) -> ConvResult<()> {
        for assign in assignments {
            match (assign.op, self.variables.entry(assign.name.clone())) {
                (AssignOp::Append, Entry::Occupied(mut entry)) => {
                    match (entry.get_mut(), &assign.values) {
                        (PoolValues::Numbers(a), PoolValues::Numbers(b)) => a.extend(b),
                        (PoolValues::Strings(a), PoolValues::Strings(b)) => {
                            a.extend(b.iter().cloned())
                        }
                        _ => Err(Error::KernelLoad(format!(
                            "Cannot append values of a different type to {}",
                            assign.name
                        )))?,
                    }
                }
                (_, Entry::Occupied(mut entry)) => {
                    let _ = entry.insert(assign.values.clone());
                }
                (_, Entry::Vacant(entry)) => {
                    let _ = entry.insert(assign.values.clone());
                }
            }
        }
        Ok(())
    }

    /// Build a pool from the assignments of several kernels, applied in order.
    pub fn from_kernels<'a>(
        kernels: impl IntoIterator<Item = &'a [Assignment]>,
    ) -> ConvResult<Self> {
        let mut pool = KernelPool::default();
        for assignments in kernels {
            pool.apply(assignments)?;
        }
        Ok(pool)
    }

    /// Is the variable defined.
    pub fn contains(&self, key: &str) -> bool {
        self.variables.contains_key(key)
    }

    /// Raw values of a variable.
    pub fn get(&self, key: &str) -> Option<&PoolValues> {
        self.variables.get(key)
    }

    /// Number of variables in the pool.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Is the pool empty.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// All numeric values of a variable.
    pub fn numbers(&self, key: &str) -> ConvResult<&[f64]> {
        match self.variables.get(key) {
            Some(PoolValues::Numbers(v)) => Ok(v),
            Some(PoolValues::Strings(_)) => Err(Error::PoolLookup(format!(
                "{} holds strings, not numbers",
                key
            ))),
            None => Err(Error::PoolLookup(format!("{} is not in the pool", key))),
        }
    }

    /// All string values of a variable, joined on the continuation character.
    pub fn strings(&self, key: &str, continuation: Option<char>) -> ConvResult<Vec<String>> {
        match self.variables.get(key) {
            Some(PoolValues::Strings(v)) => Ok(join_continued(v, continuation)),
            Some(PoolValues::Numbers(_)) => Err(Error::PoolLookup(format!(
                "{} holds numbers, not strings",
                key
            ))),
            None => Err(Error::PoolLookup(format!("{} is not in the pool", key))),
        }
    }

    /// A single numeric value which must be integral.
    pub fn integer(&self, key: &str, index: usize) -> ConvResult<i64> {
        let value = *self.numbers(key)?.get(index).ok_or_else(|| {
            Error::PoolLookup(format!("{} has no value at index {}", key, index))
        })?;
        if value.fract() != 0.0 || !value.is_finite() {
            Err(Error::PoolLookup(format!(
                "{}[{}] = {} is not an integer",
                key, index, value
            )))?;
        }
        Ok(value as i64)
    }

    /// A single string value, truncated to `max_len` characters.
    pub fn string(
        &self,
        key: &str,
        index: usize,
        continuation: Option<char>,
        max_len: usize,
    ) -> ConvResult<String> {
        let values = self.strings(key, continuation)?;
        let value = values.get(index).ok_or_else(|| {
            Error::PoolLookup(format!("{} has no value at index {}", key, index))
        })?;
        Ok(value.chars().take(max_len).collect())
    }

    /// Up to `max` numeric values, starting at index `start`.
    pub fn doubles(&self, key: &str, start: usize, max: usize) -> ConvResult<Vec<f64>> {
        let values = self.numbers(key)?;
        if start >= values.len() {
            Err(Error::PoolLookup(format!(
                "{} has no value at index {}",
                key, start
            )))?;
        }
        Ok(values.iter().skip(start).take(max).copied().collect())
    }

    /// Integer lookup which returns None if the variable is absent.
    pub fn try_integer(&self, key: &str) -> ConvResult<Option<i64>> {
        if self.contains(key) {
            self.integer(key, 0).map(Some)
        } else {
            Ok(None)
        }
    }

    /// String lookup which returns None if the variable is absent.
    pub fn try_string(&self, key: &str) -> ConvResult<Option<String>> {
        if self.contains(key) {
            self.string(key, 0, None, usize::MAX).map(Some)
        } else {
            Ok(None)
        }
    }
}
