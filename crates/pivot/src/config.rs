//! View configuration.
//!
//! A `Config` is immutable once built and describes one context: pivots on
//! each axis, aggregate specs, filters, sorts and totals. `resolve` binds the
//! names to a schema and picks an aggregate kernel per spec.

use crate::aggregate::Kernel;
use crate::filter::{FilterOp, FilterSet, FilterTerm};
use tessera_core::schema::Schema;
use tessera_core::{Error, Result};

/// One grouping level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pivot {
    /// Column whose values form the groups
    pub column: String,
    /// Column whose value orders sibling groups instead of the group value
    pub sort_by: Option<String>,
}

impl Pivot {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            sort_by: None,
        }
    }

    /// Orders sibling groups by another column's value.
    pub fn sorted_by(mut self, column: impl Into<String>) -> Self {
        self.sort_by = Some(column.into());
        self
    }
}

/// Aggregate kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggKind {
    Sum,
    SumAbs,
    Count,
    Mean,
    WeightedMean,
    HighWaterMark,
    LowWaterMark,
    /// The common value when every live input agrees, else `None`
    Unique,
    DistinctCount,
}

impl AggKind {
    pub fn name(&self) -> &'static str {
        match self {
            AggKind::Sum => "sum",
            AggKind::SumAbs => "sum abs",
            AggKind::Count => "count",
            AggKind::Mean => "mean",
            AggKind::WeightedMean => "weighted mean",
            AggKind::HighWaterMark => "high water mark",
            AggKind::LowWaterMark => "low water mark",
            AggKind::Unique => "unique",
            AggKind::DistinctCount => "distinct count",
        }
    }
}

/// How invalid inputs are treated by an aggregate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum InvalidMode {
    /// Invalid inputs are ignored
    #[default]
    Exclude,
    /// Invalid inputs are replaced by the column type's canonical value
    SubstituteCanonical,
    /// Any invalid live input makes the result `None`
    Propagate,
}

/// One aggregate column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggSpec {
    pub name: String,
    pub kind: AggKind,
    pub column: String,
    pub weight: Option<String>,
    pub invalid_mode: InvalidMode,
}

impl AggSpec {
    pub fn new(name: impl Into<String>, kind: AggKind, column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            column: column.into(),
            weight: None,
            invalid_mode: InvalidMode::default(),
        }
    }

    /// Sets the weight column of a weighted mean.
    pub fn weighted_by(mut self, column: impl Into<String>) -> Self {
        self.weight = Some(column.into());
        self
    }

    pub fn with_invalid_mode(mut self, mode: InvalidMode) -> Self {
        self.invalid_mode = mode;
        self
    }
}

/// Sort order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Sorts rows by an aggregate (pivoted contexts) or a column (flat contexts).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortSpec {
    pub target: String,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn asc(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            order: SortOrder::Desc,
        }
    }
}

/// Placement of the grand-total row and column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Totals {
    /// The total comes first
    #[default]
    Before,
    Hidden,
}

/// An immutable context configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    row_pivots: Vec<Pivot>,
    column_pivots: Vec<Pivot>,
    aggregates: Vec<AggSpec>,
    columns: Vec<String>,
    filters: Vec<FilterTerm>,
    filter_op: FilterOp,
    sorts: Vec<SortSpec>,
    totals: Totals,
    row_expand_depth: usize,
}

impl Config {
    /// Starts building a configuration.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn row_pivots(&self) -> &[Pivot] {
        &self.row_pivots
    }

    pub fn column_pivots(&self) -> &[Pivot] {
        &self.column_pivots
    }

    pub fn aggregates(&self) -> &[AggSpec] {
        &self.aggregates
    }

    /// Projected columns of a flat context; empty means every column.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn filters(&self) -> &[FilterTerm] {
        &self.filters
    }

    pub fn filter_op(&self) -> FilterOp {
        self.filter_op
    }

    pub fn sorts(&self) -> &[SortSpec] {
        &self.sorts
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    /// Tree depth up to which rows start expanded.
    pub fn row_expand_depth(&self) -> usize {
        self.row_expand_depth
    }

    /// Returns true if neither axis is pivoted and no aggregate is requested.
    pub fn is_flat(&self) -> bool {
        self.row_pivots.is_empty() && self.column_pivots.is_empty() && self.aggregates.is_empty()
    }

    /// Binds a pivoted configuration to a schema.
    ///
    /// Sorts must name aggregates.
    pub fn resolve(&self, schema: &Schema) -> Result<Resolved> {
        let row_pivots = resolve_pivots(&self.row_pivots, schema)?;
        let column_pivots = resolve_pivots(&self.column_pivots, schema)?;
        let mut aggregates = Vec::with_capacity(self.aggregates.len());
        for spec in &self.aggregates {
            aggregates.push(ResolvedAgg::resolve(spec, schema)?);
        }
        let mut sorts = Vec::with_capacity(self.sorts.len());
        for sort in &self.sorts {
            let idx = self
                .aggregates
                .iter()
                .position(|a| a.name == sort.target)
                .ok_or_else(|| {
                    Error::invalid_config(format!("sort target is not an aggregate: {}", sort.target))
                })?;
            sorts.push((idx, sort.order));
        }
        Ok(Resolved {
            row_pivots,
            column_pivots,
            aggregates,
            filter: FilterSet::compile(&self.filters, self.filter_op, schema)?,
            sorts,
            columns: resolve_columns(&self.columns, schema)?,
        })
    }

    /// Binds a flat configuration to a schema.
    ///
    /// Sorts must name columns.
    pub fn resolve_flat(&self, schema: &Schema) -> Result<Resolved> {
        if !self.is_flat() {
            return Err(Error::invalid_config(
                "a flat context takes no pivots or aggregates",
            ));
        }
        let mut sorts = Vec::with_capacity(self.sorts.len());
        for sort in &self.sorts {
            sorts.push((schema.require_column(&sort.target)?, sort.order));
        }
        Ok(Resolved {
            row_pivots: Vec::new(),
            column_pivots: Vec::new(),
            aggregates: Vec::new(),
            filter: FilterSet::compile(&self.filters, self.filter_op, schema)?,
            sorts,
            columns: resolve_columns(&self.columns, schema)?,
        })
    }
}

fn resolve_pivots(pivots: &[Pivot], schema: &Schema) -> Result<Vec<ResolvedPivot>> {
    pivots
        .iter()
        .map(|p| {
            Ok(ResolvedPivot {
                column: schema.require_column(&p.column)?,
                sort_by: match &p.sort_by {
                    Some(col) => Some(schema.require_column(col)?),
                    None => None,
                },
            })
        })
        .collect()
}

fn resolve_columns(columns: &[String], schema: &Schema) -> Result<Vec<usize>> {
    if columns.is_empty() {
        return Ok((0..schema.len()).collect());
    }
    columns.iter().map(|c| schema.require_column(c)).collect()
}

/// Builder for `Config`.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    row_pivots: Vec<Pivot>,
    column_pivots: Vec<Pivot>,
    aggregates: Vec<AggSpec>,
    columns: Vec<String>,
    filters: Vec<FilterTerm>,
    filter_op: FilterOp,
    sorts: Vec<SortSpec>,
    totals: Totals,
    row_expand_depth: Option<usize>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_pivot(mut self, pivot: impl Into<Pivot>) -> Self {
        self.row_pivots.push(pivot.into());
        self
    }

    pub fn column_pivot(mut self, pivot: impl Into<Pivot>) -> Self {
        self.column_pivots.push(pivot.into());
        self
    }

    pub fn aggregate(mut self, spec: AggSpec) -> Self {
        self.aggregates.push(spec);
        self
    }

    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(name.into());
        self
    }

    pub fn filter(mut self, term: FilterTerm) -> Self {
        self.filters.push(term);
        self
    }

    pub fn filter_op(mut self, op: FilterOp) -> Self {
        self.filter_op = op;
        self
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sorts.push(sort);
        self
    }

    pub fn totals(mut self, totals: Totals) -> Self {
        self.totals = totals;
        self
    }

    pub fn row_expand_depth(mut self, depth: usize) -> Self {
        self.row_expand_depth = Some(depth);
        self
    }

    /// Validates and builds the configuration.
    pub fn build(self) -> Result<Config> {
        for (i, spec) in self.aggregates.iter().enumerate() {
            if spec.name.is_empty() {
                return Err(Error::invalid_config("aggregate name cannot be empty"));
            }
            if self.aggregates[..i].iter().any(|a| a.name == spec.name) {
                return Err(Error::invalid_config(format!(
                    "duplicate aggregate name: {}",
                    spec.name
                )));
            }
            match (spec.kind, &spec.weight) {
                (AggKind::WeightedMean, None) => {
                    return Err(Error::invalid_config(format!(
                        "weighted mean {} needs a weight column",
                        spec.name
                    )))
                }
                (AggKind::WeightedMean, Some(_)) | (_, None) => {}
                (_, Some(_)) => {
                    return Err(Error::invalid_config(format!(
                        "only a weighted mean takes a weight column: {}",
                        spec.name
                    )))
                }
            }
        }
        Ok(Config {
            // Every row pivot level plus the root starts expanded.
            row_expand_depth: self.row_expand_depth.unwrap_or(self.row_pivots.len()),
            row_pivots: self.row_pivots,
            column_pivots: self.column_pivots,
            aggregates: self.aggregates,
            columns: self.columns,
            filters: self.filters,
            filter_op: self.filter_op,
            sorts: self.sorts,
            totals: self.totals,
        })
    }
}

impl From<&str> for Pivot {
    fn from(column: &str) -> Self {
        Pivot::new(column)
    }
}

impl From<String> for Pivot {
    fn from(column: String) -> Self {
        Pivot::new(column)
    }
}

/// A pivot bound to schema positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedPivot {
    pub column: usize,
    pub sort_by: Option<usize>,
}

/// An aggregate spec bound to schema positions and a kernel.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedAgg {
    pub name: String,
    pub kind: AggKind,
    pub kernel: Kernel,
    pub column: usize,
    pub weight: Option<usize>,
    pub invalid_mode: InvalidMode,
}

impl ResolvedAgg {
    fn resolve(spec: &AggSpec, schema: &Schema) -> Result<Self> {
        let column = schema.require_column(&spec.column)?;
        let weight = match &spec.weight {
            Some(w) => Some(schema.require_column(w)?),
            None => None,
        };
        let dtype = schema.columns()[column].data_type();
        let weight_dtype = weight.map(|w| schema.columns()[w].data_type());
        Ok(Self {
            name: spec.name.clone(),
            kind: spec.kind,
            kernel: Kernel::resolve(spec.kind, dtype, weight_dtype)?,
            column,
            weight,
            invalid_mode: spec.invalid_mode,
        })
    }
}

/// A configuration bound to a schema.
#[derive(Clone, Debug)]
pub struct Resolved {
    pub row_pivots: Vec<ResolvedPivot>,
    pub column_pivots: Vec<ResolvedPivot>,
    pub aggregates: Vec<ResolvedAgg>,
    pub filter: FilterSet,
    /// (aggregate or column position, order)
    pub sorts: Vec<(usize, SortOrder)>,
    pub columns: Vec<usize>,
}
