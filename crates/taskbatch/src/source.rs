// Task sources
//
// A source expands into the ordered payloads of a batch. Counts expand to
// `0..n` and are never shuffled; lists keep their order unless the runner
// shuffles them.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{Error, Result};

/// Payloads of a batch before indices are assigned
#[derive(Debug, Clone, PartialEq)]
pub enum Units<D> {
    /// Expanded from a count; payload equals its index
    Range(Vec<D>),
    /// Caller-provided items
    List(Vec<D>),
}

impl<D> Units<D> {
    /// Final payload order; lists are permuted once when `shuffle` is set
    pub fn into_ordered<R: Rng + ?Sized>(self, shuffle: bool, rng: &mut R) -> Vec<D> {
        match self {
            Units::Range(items) => items,
            Units::List(mut items) => {
                if shuffle {
                    items.shuffle(rng);
                }
                items
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Units::Range(items) | Units::List(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Anything a batch can be built from
pub trait TaskSource {
    type Data;

    /// Expand into payloads, or fail before anything is submitted
    fn into_units(self) -> Result<Units<Self::Data>>;
}

impl TaskSource for usize {
    type Data = usize;

    fn into_units(self) -> Result<Units<usize>> {
        Ok(Units::Range((0..self).collect()))
    }
}

impl TaskSource for i64 {
    type Data = i64;

    fn into_units(self) -> Result<Units<i64>> {
        if self < 0 {
            return Err(Error::invalid_source(format!(
                "task count must be non-negative, got {self}"
            )));
        }
        Ok(Units::Range((0..self).collect()))
    }
}

impl<D> TaskSource for Vec<D> {
    type Data = D;

    fn into_units(self) -> Result<Units<D>> {
        Ok(Units::List(self))
    }
}

impl<D: Clone> TaskSource for &[D] {
    type Data = D;

    fn into_units(self) -> Result<Units<D>> {
        Ok(Units::List(self.to_vec()))
    }
}

/// Dynamic source: a non-negative integer or an array
impl TaskSource for serde_json::Value {
    type Data = serde_json::Value;

    fn into_units(self) -> Result<Units<serde_json::Value>> {
        match self {
            serde_json::Value::Number(n) => match n.as_u64() {
                Some(count) => Ok(Units::Range(
                    (0..count).map(serde_json::Value::from).collect(),
                )),
                None => Err(Error::invalid_source(format!(
                    "task count must be a non-negative integer, got {n}"
                ))),
            },
            serde_json::Value::Array(items) => Ok(Units::List(items)),
            other => Err(Error::invalid_source(format!(
                "source must be an integer or a list, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
