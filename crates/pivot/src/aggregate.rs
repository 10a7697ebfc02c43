//! Aggregate engine.
//!
//! Every aggregate spec resolves once to a `Kernel` for its (kind, data type)
//! pair. Kernels come in two families:
//!
//! - rolling kernels (integer sum and sum abs, count) keep one accumulator
//!   per node; contributions from a batch are reduced at the bottom of the
//!   batch tree and rolled up towards the root, then rolled into the
//!   persistent tree. Integer accumulators wrap, so retractions are exact.
//! - value kernels (float sums, means, water marks, unique, distinct count)
//!   keep the multiset of live input values per node and recompute from it,
//!   so retractions stay exact.
//!
//! Count contributes nothing at reduce time; its value is the node's live
//! row count, whatever the validity of its input.
//!
//! Each node also counts its invalid live inputs for `Propagate` mode.

use crate::config::{AggKind, InvalidMode};
use crate::dtree::DenseTree;
use crate::strand::Strand;
use std::collections::BTreeMap;
use tessera_core::{fatal, DataType, Error, Result, Scalar};

/// A prepared aggregate input on one side of a strand.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Slot {
    /// No input: the row is not on this side, or its invalid input is excluded
    #[default]
    Absent,
    /// An invalid input under `Propagate`
    Invalid,
    /// A prepared input value
    Value(Scalar),
}

impl Slot {
    #[inline]
    pub fn is_invalid(&self) -> bool {
        matches!(self, Slot::Invalid)
    }

    #[inline]
    pub fn value(&self) -> Option<&Scalar> {
        match self {
            Slot::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// An aggregate implementation for one (kind, data type) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kernel {
    /// Sum into the widened accumulator type
    Sum(DataType),
    SumAbs(DataType),
    Count,
    /// (sum, count) pair
    Mean,
    /// (weighted sum, weight) pair
    WeightedMean,
    HighWaterMark(DataType),
    LowWaterMark(DataType),
    /// Water marks over interned strings
    StrHighWaterMark,
    StrLowWaterMark,
    Unique(DataType),
    DistinctCount,
}

impl Kernel {
    /// Picks the kernel for an aggregate kind over a column type.
    pub fn resolve(kind: AggKind, dtype: DataType, weight: Option<DataType>) -> Result<Self> {
        let unexpected = |dt| Err(Error::unexpected_dtype(kind.name(), dt));
        match kind {
            AggKind::Sum | AggKind::SumAbs => match dtype.widened() {
                Some(acc) if kind == AggKind::Sum => Ok(Kernel::Sum(acc)),
                Some(acc) => Ok(Kernel::SumAbs(acc)),
                None => unexpected(dtype),
            },
            AggKind::Count => Ok(Kernel::Count),
            AggKind::Mean if dtype.is_numeric() => Ok(Kernel::Mean),
            AggKind::Mean => unexpected(dtype),
            AggKind::WeightedMean => match weight {
                _ if !dtype.is_numeric() => unexpected(dtype),
                Some(w) if w.is_numeric() => Ok(Kernel::WeightedMean),
                Some(w) => unexpected(w),
                None => Err(Error::invalid_config("weighted mean needs a weight column")),
            },
            AggKind::HighWaterMark | AggKind::LowWaterMark => {
                let high = kind == AggKind::HighWaterMark;
                match dtype {
                    DataType::Str if high => Ok(Kernel::StrHighWaterMark),
                    DataType::Str => Ok(Kernel::StrLowWaterMark),
                    dt if !dt.is_orderable() => unexpected(dt),
                    dt if high => Ok(Kernel::HighWaterMark(dt)),
                    dt => Ok(Kernel::LowWaterMark(dt)),
                }
            }
            AggKind::Unique => Ok(Kernel::Unique(dtype)),
            AggKind::DistinctCount if dtype.is_orderable() => Ok(Kernel::DistinctCount),
            AggKind::DistinctCount => unexpected(dtype),
        }
    }

    /// Returns true for kernels whose batch values roll up by addition.
    #[inline]
    pub fn is_rolling(&self) -> bool {
        matches!(
            self,
            Kernel::Sum(_) | Kernel::SumAbs(_) | Kernel::Count | Kernel::Mean | Kernel::WeightedMean
        )
    }

    /// Returns true for kernels whose persistent state is a single
    /// accumulator; the rest keep a multiset of live inputs.
    ///
    /// Float accumulators are not kept: adding and retracting floats in
    /// place drifts once values cancel.
    #[inline]
    pub fn is_accumulated(&self) -> bool {
        matches!(
            self,
            Kernel::Sum(DataType::Int64 | DataType::UInt64)
                | Kernel::SumAbs(DataType::Int64 | DataType::UInt64)
                | Kernel::Count
        )
    }

    /// The accumulator of an empty node.
    pub fn identity(&self) -> Scalar {
        match self {
            Kernel::Sum(acc) | Kernel::SumAbs(acc) => Scalar::canonical(*acc),
            Kernel::Count => Scalar::Int64(0),
            Kernel::Mean | Kernel::WeightedMean => Scalar::Float64Pair(0.0, 0.0),
            _ => Scalar::None,
        }
    }

    /// Turns a valid input (and weight) into the kernel's input form.
    pub fn prepare(&self, value: &Scalar, weight: &Scalar) -> Scalar {
        match self {
            Kernel::Sum(acc) => self.widened(value, *acc),
            Kernel::SumAbs(acc) => match self.widened(value, *acc) {
                Scalar::Int64(v) => Scalar::Int64(v.wrapping_abs()),
                Scalar::Float64(v) => Scalar::Float64(v.abs()),
                other => other,
            },
            Kernel::Count => Scalar::Int64(0),
            Kernel::Mean => Scalar::Float64Pair(self.float(value), 1.0),
            Kernel::WeightedMean => {
                let w = self.float(weight);
                Scalar::Float64Pair(self.float(value) * w, w)
            }
            Kernel::HighWaterMark(dt) | Kernel::LowWaterMark(dt) | Kernel::Unique(dt) => {
                if value.dtype() != Some(*dt) {
                    fatal!("{:?} got {:?}, expected {}", self, value, dt);
                }
                value.clone()
            }
            Kernel::StrHighWaterMark | Kernel::StrLowWaterMark => match value {
                Scalar::Str(_) => value.clone(),
                other => fatal!("{:?} got non-string input {:?}", self, other),
            },
            Kernel::DistinctCount => value.clone(),
        }
    }

    fn widened(&self, value: &Scalar, acc: DataType) -> Scalar {
        let widened = value.widen();
        if widened.dtype() != Some(acc) {
            fatal!("{:?} got {:?}, expected a value widening to {}", self, value, acc);
        }
        widened
    }

    fn float(&self, value: &Scalar) -> f64 {
        match value.as_f64() {
            Some(v) => v,
            None => fatal!("{:?} got non-numeric input {:?}", self, value),
        }
    }

    /// Negates a rolling accumulator.
    ///
    /// Unsigned accumulators use wrapping negation.
    pub fn negate(&self, acc: &Scalar) -> Scalar {
        match acc {
            Scalar::Int64(v) => Scalar::Int64(v.wrapping_neg()),
            Scalar::UInt64(v) => Scalar::UInt64(v.wrapping_neg()),
            Scalar::Float64(v) => Scalar::Float64(-v),
            Scalar::Float64Pair(a, b) => Scalar::Float64Pair(-a, -b),
            other => fatal!("{:?} cannot negate {:?}", self, other),
        }
    }

    /// Combines two accumulators.
    ///
    /// Rolling kernels add. Water marks keep the extreme, ignoring `None`.
    /// Unique keeps a value only when both sides agree.
    pub fn roll_up(&self, a: &Scalar, b: &Scalar) -> Scalar {
        match (self, a, b) {
            (_, Scalar::Int64(x), Scalar::Int64(y)) if self.is_rolling() => {
                Scalar::Int64(x.wrapping_add(*y))
            }
            (_, Scalar::UInt64(x), Scalar::UInt64(y)) if self.is_rolling() => {
                Scalar::UInt64(x.wrapping_add(*y))
            }
            (_, Scalar::Float64(x), Scalar::Float64(y)) if self.is_rolling() => {
                Scalar::Float64(x + y)
            }
            (_, Scalar::Float64Pair(a0, a1), Scalar::Float64Pair(b0, b1)) if self.is_rolling() => {
                Scalar::Float64Pair(a0 + b0, a1 + b1)
            }
            (_, x, y) if self.is_rolling() => {
                fatal!("{:?} cannot roll up {:?} and {:?}", self, x, y)
            }
            (_, Scalar::None, y) => y.clone(),
            (_, x, Scalar::None) => x.clone(),
            (Kernel::HighWaterMark(_) | Kernel::StrHighWaterMark, x, y) => x.max(y).clone(),
            (Kernel::LowWaterMark(_) | Kernel::StrLowWaterMark, x, y) => x.min(y).clone(),
            (_, x, y) if x == y => x.clone(),
            _ => Scalar::None,
        }
    }

    /// The rolling contribution of a strand: its entering input minus its
    /// leaving input.
    pub fn contribution(&self, leaving: &Slot, entering: &Slot) -> Scalar {
        let identity = self.identity();
        let out = leaving.value().unwrap_or(&identity);
        let inp = entering.value().unwrap_or(&identity);
        self.roll_up(inp, &self.negate(out))
    }

    /// Reduces prepared inputs.
    ///
    /// Water marks over no input yield the canonical empty value.
    pub fn reduce<'a>(&self, inputs: impl IntoIterator<Item = &'a Scalar>) -> Scalar {
        match self {
            k if k.is_rolling() => inputs
                .into_iter()
                .fold(self.identity(), |acc, v| self.roll_up(&acc, v)),
            Kernel::HighWaterMark(dt) | Kernel::LowWaterMark(dt) => {
                let folded = inputs
                    .into_iter()
                    .fold(Scalar::None, |acc, v| self.roll_up(&acc, v));
                if folded.is_none() {
                    Scalar::canonical(*dt)
                } else {
                    folded
                }
            }
            Kernel::StrHighWaterMark | Kernel::StrLowWaterMark => {
                let folded = inputs
                    .into_iter()
                    .fold(Scalar::None, |acc, v| self.roll_up(&acc, v));
                if folded.is_none() {
                    Scalar::canonical(DataType::Str)
                } else {
                    folded
                }
            }
            Kernel::Unique(_) => {
                let mut iter = inputs.into_iter();
                match iter.next() {
                    Some(first) if iter.all(|v| v == first) => first.clone(),
                    _ => Scalar::None,
                }
            }
            _ => {
                let distinct: std::collections::BTreeSet<&Scalar> = inputs.into_iter().collect();
                Scalar::Int64(distinct.len() as i64)
            }
        }
    }

    /// The rolling accumulator of a node: kept in place, or rolled up from
    /// the live inputs.
    fn live_acc(&self, cell: &AggCell) -> Scalar {
        if self.is_accumulated() {
            return cell.acc.clone();
        }
        cell.values.iter().fold(self.identity(), |acc, (v, n)| {
            (0..*n).fold(acc, |acc, _| self.roll_up(&acc, v))
        })
    }

    /// The presented value of a node's aggregate state, given its live row
    /// count.
    pub fn value(&self, cell: &AggCell, rows: i64, mode: InvalidMode) -> Scalar {
        if *self == Kernel::Count {
            return Scalar::Int64(rows);
        }
        if mode == InvalidMode::Propagate && cell.invalid > 0 {
            return Scalar::None;
        }
        match self {
            Kernel::Sum(_) | Kernel::SumAbs(_) | Kernel::Count => self.live_acc(cell),
            Kernel::Mean | Kernel::WeightedMean => match self.live_acc(cell) {
                Scalar::Float64Pair(_, n) if n == 0.0 => Scalar::None,
                Scalar::Float64Pair(s, n) => Scalar::Float64(s / n),
                _ => Scalar::None,
            },
            Kernel::HighWaterMark(dt) => cell
                .values
                .keys()
                .next_back()
                .cloned()
                .unwrap_or_else(|| Scalar::canonical(*dt)),
            Kernel::LowWaterMark(dt) => cell
                .values
                .keys()
                .next()
                .cloned()
                .unwrap_or_else(|| Scalar::canonical(*dt)),
            Kernel::StrHighWaterMark => cell
                .values
                .keys()
                .next_back()
                .cloned()
                .unwrap_or_else(|| Scalar::canonical(DataType::Str)),
            Kernel::StrLowWaterMark => cell
                .values
                .keys()
                .next()
                .cloned()
                .unwrap_or_else(|| Scalar::canonical(DataType::Str)),
            Kernel::Unique(_) if cell.values.len() == 1 => {
                cell.values.keys().next().cloned().unwrap_or_default()
            }
            Kernel::Unique(_) => Scalar::None,
            Kernel::DistinctCount => Scalar::Int64(cell.values.len() as i64),
        }
    }
}

/// The aggregate state of one persistent tree node.
#[derive(Clone, Debug, PartialEq)]
pub struct AggCell {
    acc: Scalar,
    invalid: i64,
    values: BTreeMap<Scalar, i64>,
}

impl AggCell {
    pub fn new(kernel: &Kernel) -> Self {
        Self {
            acc: kernel.identity(),
            invalid: 0,
            values: BTreeMap::new(),
        }
    }

    /// Rolls a batch accumulator into this cell; only for accumulated
    /// kernels.
    pub fn roll_in(&mut self, kernel: &Kernel, acc: &Scalar) {
        self.acc = kernel.roll_up(&self.acc, acc);
    }

    /// Adjusts the number of invalid live inputs.
    pub fn add_invalid(&mut self, diff: i64) {
        self.invalid += diff;
        if self.invalid < 0 {
            fatal!("negative invalid count {}", self.invalid);
        }
    }

    /// Adjusts the multiplicity of one live input value.
    pub fn add_value(&mut self, value: &Scalar, diff: i64) {
        let count = self.values.entry(value.clone()).or_insert(0);
        *count += diff;
        match *count {
            0 => {
                self.values.remove(value);
            }
            c if c < 0 => fatal!("negative multiplicity {} for {}", c, value),
            _ => {}
        }
    }

    /// Returns the rolling accumulator.
    #[inline]
    pub fn acc(&self) -> &Scalar {
        &self.acc
    }

    #[inline]
    pub fn invalid(&self) -> i64 {
        self.invalid
    }
}

/// Aggregates of one batch tree, indexed by batch node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchAggregates {
    /// Net row count change per node
    pub counts: Vec<i64>,
    /// Accumulator per aggregate, per node
    pub columns: Vec<Vec<Scalar>>,
    /// Net invalid input change per aggregate, per node
    pub invalid: Vec<Vec<i64>>,
}

/// Computes one aggregate column over a batch tree, bottom-up.
///
/// Rolling kernels reduce strand contributions at the bottom nodes and roll
/// up above. Value kernels reduce the entering inputs of each node's leaf
/// range, which is exact because a node's leaves are contiguous.
pub fn compute_dense(tree: &DenseTree, strands: &[Strand], kernel: &Kernel, agg: usize) -> Vec<Scalar> {
    let nodes = tree.nodes();
    let mut column = vec![Scalar::None; nodes.len()];
    for idx in (0..nodes.len()).rev() {
        let node = &nodes[idx];
        column[idx] = if !kernel.is_rolling() {
            kernel.reduce(
                tree.leaves_of(idx)
                    .iter()
                    .filter_map(|s| strands[*s].slots[agg].1.value()),
            )
        } else if node.nchild == 0 {
            let contributions: Vec<Scalar> = tree
                .leaves_of(idx)
                .iter()
                .map(|s| {
                    let (out, inp) = &strands[*s].slots[agg];
                    kernel.contribution(out, inp)
                })
                .collect();
            kernel.reduce(contributions.iter())
        } else {
            let children = node.fcidx..node.fcidx + node.nchild;
            kernel.reduce(column[children].iter())
        };
    }
    column
}

/// Computes row counts and every aggregate column of a batch tree.
pub fn compute(tree: &DenseTree, strands: &[Strand], kernels: &[Kernel]) -> BatchAggregates {
    let nodes = tree.nodes();
    let mut counts = vec![0i64; nodes.len()];
    for idx in (0..nodes.len()).rev() {
        let node = &nodes[idx];
        counts[idx] = if node.nchild == 0 {
            tree.leaves_of(idx).iter().map(|s| strands[*s].count).sum()
        } else {
            counts[node.fcidx..node.fcidx + node.nchild].iter().sum()
        };
    }

    let invalid = (0..kernels.len())
        .map(|agg| {
            (0..nodes.len())
                .map(|idx| {
                    tree.leaves_of(idx)
                        .iter()
                        .map(|s| {
                            let (out, inp) = &strands[*s].slots[agg];
                            inp.is_invalid() as i64 - out.is_invalid() as i64
                        })
                        .sum()
                })
                .collect()
        })
        .collect();

    BatchAggregates {
        counts,
        columns: kernels
            .iter()
            .enumerate()
            .map(|(agg, kernel)| compute_dense(tree, strands, kernel, agg))
            .collect(),
        invalid,
    }
}
