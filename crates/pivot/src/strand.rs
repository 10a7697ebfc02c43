//! Strands.
//!
//! A strand is one row's contribution to one grouping path in a batch: the
//! path, the row-count change, and for every aggregate the input leaving the
//! path and the input entering it. A row whose path is unchanged yields one
//! strand with count 0; a row that moves yields a retraction on the old path
//! and an addition on the new one.

use crate::aggregate::Slot;
use crate::config::{InvalidMode, ResolvedAgg, ResolvedPivot};
use crate::filter::FilterSet;
use tessera_core::{DataTable, Scalar};
use tessera_incremental::FlattenedBatch;

/// One row's contribution to one grouping path.
#[derive(Clone, Debug, PartialEq)]
pub struct Strand {
    /// Pivot values, one per level
    pub path: Vec<Scalar>,
    /// Sibling ordering value per level
    pub sort_keys: Vec<Scalar>,
    pub pkey: Scalar,
    /// Row of the flattened batch this strand came from
    pub row: usize,
    /// +1 added, -1 retracted, 0 updated in place
    pub count: i64,
    /// (leaving, entering) input per aggregate
    pub slots: Vec<(Slot, Slot)>,
}

/// Pivots and aggregates a strand set is built for.
#[derive(Clone, Copy, Debug)]
pub struct StrandSpec<'a> {
    pub pivots: &'a [ResolvedPivot],
    pub aggregates: &'a [ResolvedAgg],
    pub filter: &'a FilterSet,
}

impl<'a> StrandSpec<'a> {
    fn path(&self, table: &DataTable, row: usize) -> (Vec<Scalar>, Vec<Scalar>) {
        let cell = |col: usize| {
            table
                .column_at(col)
                .map(|c| c.get_scalar(row))
                .unwrap_or_default()
        };
        let path: Vec<Scalar> = self.pivots.iter().map(|p| cell(p.column)).collect();
        let sort_keys = self
            .pivots
            .iter()
            .zip(&path)
            .map(|(p, v)| match p.sort_by {
                Some(col) => cell(col),
                None => v.clone(),
            })
            .collect();
        (path, sort_keys)
    }

    fn slot(&self, agg: &ResolvedAgg, table: &DataTable, row: usize) -> Slot {
        let read = |col: usize| match table.column_at(col) {
            Some(c) => (c.get_scalar(row), Some(c.dtype())),
            None => (Scalar::None, None),
        };
        let (mut value, dtype) = read(agg.column);
        let mut weight = match agg.weight {
            Some(w) => read(w),
            None => (Scalar::Int64(1), None),
        };
        if value.is_valid() && weight.0.is_valid() {
            return Slot::Value(agg.kernel.prepare(&value, &weight.0));
        }
        match agg.invalid_mode {
            InvalidMode::Exclude => Slot::Absent,
            InvalidMode::Propagate => Slot::Invalid,
            InvalidMode::SubstituteCanonical => {
                if let (Scalar::None, Some(dt)) = (&value, dtype) {
                    value = Scalar::canonical(dt);
                }
                if let (Scalar::None, Some(dt)) = (&weight.0, weight.1) {
                    weight.0 = Scalar::canonical(dt);
                }
                Slot::Value(agg.kernel.prepare(&value, &weight.0))
            }
        }
    }

    fn slots(&self, table: &DataTable, row: usize) -> Vec<Slot> {
        self.aggregates
            .iter()
            .map(|agg| self.slot(agg, table, row))
            .collect()
    }
}

/// Builds the strands of a flattened batch, sorted by (path, pkey).
pub fn build_strands(batch: &FlattenedBatch, spec: &StrandSpec<'_>) -> Vec<Strand> {
    let mut strands = Vec::new();
    for row in 0..batch.len() {
        let was_in = batch.existed[row] && spec.filter.matches(&batch.prev, row);
        let is_in = batch.exists[row] && spec.filter.matches(&batch.current, row);
        if !was_in && !is_in {
            continue;
        }
        let pkey = batch.pkey(row);
        let old = was_in.then(|| spec.path(&batch.prev, row));
        let new = is_in.then(|| spec.path(&batch.current, row));

        match (old, new) {
            (Some((old_path, _)), Some((new_path, sort_keys))) if old_path == new_path => {
                if !batch.row_changed(row) {
                    continue;
                }
                let slots = spec
                    .slots(&batch.prev, row)
                    .into_iter()
                    .zip(spec.slots(&batch.current, row))
                    .collect();
                strands.push(Strand {
                    path: new_path,
                    sort_keys,
                    pkey,
                    row,
                    count: 0,
                    slots,
                });
            }
            (old, new) => {
                if let Some((path, sort_keys)) = old {
                    strands.push(Strand {
                        path,
                        sort_keys,
                        pkey: pkey.clone(),
                        row,
                        count: -1,
                        slots: spec
                            .slots(&batch.prev, row)
                            .into_iter()
                            .map(|s| (s, Slot::Absent))
                            .collect(),
                    });
                }
                if let Some((path, sort_keys)) = new {
                    strands.push(Strand {
                        path,
                        sort_keys,
                        pkey,
                        row,
                        count: 1,
                        slots: spec
                            .slots(&batch.current, row)
                            .into_iter()
                            .map(|s| (Slot::Absent, s))
                            .collect(),
                    });
                }
            }
        }
    }
    strands.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.pkey.cmp(&b.pkey)));
    strands
}

/// Re-keys strands onto a different grouping, keeping the levels in `levels`.
///
/// Used to feed one strand set into trees over subsets of the pivots.
pub fn project(strands: &[Strand], levels: &[usize]) -> Vec<Strand> {
    let mut projected: Vec<Strand> = strands
        .iter()
        .map(|s| Strand {
            path: levels.iter().filter_map(|l| s.path.get(*l).cloned()).collect(),
            sort_keys: levels
                .iter()
                .filter_map(|l| s.sort_keys.get(*l).cloned())
                .collect(),
            ..s.clone()
        })
        .collect();
    projected.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.pkey.cmp(&b.pkey)));
    projected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AggKind, AggSpec, Config};
    use crate::filter::FilterTerm;
    use tessera_core::schema::{Schema, SchemaBuilder};
    use tessera_core::DataType;
    use tessera_incremental::{flatten, Operation};
    use tessera_storage::MasterState;

    fn schema() -> Schema {
        SchemaBuilder::new("sales")
            .unwrap()
            .add_column("id", DataType::Int64)
            .unwrap()
            .add_column("city", DataType::Str)
            .unwrap()
            .add_column("sales", DataType::Int64)
            .unwrap()
            .primary_key("id")
            .unwrap()
            .build()
            .unwrap()
    }

    fn apply(state: &mut MasterState, ops: Vec<Operation>) -> FlattenedBatch {
        let resolved: Vec<_> = ops.iter().map(|o| o.resolve(state.schema()).unwrap()).collect();
        let batch = flatten(&resolved, state).unwrap();
        state.update_master_table(&batch.current, &batch.exists).unwrap();
        batch
    }

    fn strands_for(config: &Config, batch: &FlattenedBatch) -> Vec<Strand> {
        let resolved = config.resolve(&schema()).unwrap();
        build_strands(
            batch,
            &StrandSpec {
                pivots: &resolved.row_pivots,
                aggregates: &resolved.aggregates,
                filter: &resolved.filter,
            },
        )
    }

    fn config() -> Config {
        Config::builder()
            .row_pivot("city")
            .aggregate(AggSpec::new("total", AggKind::Sum, "sales"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_new_rows_sorted() {
        let mut state = MasterState::new(schema());
        let batch = apply(
            &mut state,
            vec![
                Operation::insert(1i64).set("city", "NY").set("sales", 10i64),
                Operation::insert(2i64).set("city", "LA").set("sales", 20i64),
            ],
        );
        let strands = strands_for(&config(), &batch);
        assert_eq!(strands.len(), 2);
        assert_eq!(strands[0].path, vec![Scalar::from("LA")]);
        assert_eq!(strands[0].count, 1);
        assert_eq!(strands[0].slots[0], (Slot::Absent, Slot::Value(Scalar::Int64(20))));
    }

    #[test]
    fn test_update_and_move() {
        let mut state = MasterState::new(schema());
        apply(
            &mut state,
            vec![Operation::insert(1i64).set("city", "NY").set("sales", 10i64)],
        );

        let update = apply(&mut state, vec![Operation::insert(1i64).set("sales", 15i64)]);
        let strands = strands_for(&config(), &update);
        assert_eq!(strands.len(), 1);
        assert_eq!(strands[0].count, 0);
        assert_eq!(
            strands[0].slots[0],
            (Slot::Value(Scalar::Int64(10)), Slot::Value(Scalar::Int64(15)))
        );

        let moved = apply(&mut state, vec![Operation::insert(1i64).set("city", "LA")]);
        let strands = strands_for(&config(), &moved);
        assert_eq!(strands.len(), 2);
        assert_eq!((strands[0].path[0].clone(), strands[0].count), (Scalar::from("LA"), 1));
        assert_eq!((strands[1].path[0].clone(), strands[1].count), (Scalar::from("NY"), -1));
    }

    #[test]
    fn test_unchanged_row_skipped() {
        let mut state = MasterState::new(schema());
        apply(
            &mut state,
            vec![Operation::insert(1i64).set("city", "NY").set("sales", 10i64)],
        );
        let same = apply(&mut state, vec![Operation::insert(1i64).set("sales", 10i64)]);
        assert!(strands_for(&config(), &same).is_empty());
    }

    #[test]
    fn test_filter_moves_rows_out() {
        let config = Config::builder()
            .row_pivot("city")
            .aggregate(AggSpec::new("total", AggKind::Sum, "sales"))
            .filter(FilterTerm::gt("sales", 5i64))
            .build()
            .unwrap();
        let mut state = MasterState::new(schema());
        let first = apply(
            &mut state,
            vec![
                Operation::insert(1i64).set("city", "NY").set("sales", 10i64),
                Operation::insert(2i64).set("city", "NY").set("sales", 1i64),
            ],
        );
        assert_eq!(strands_for(&config, &first).len(), 1);

        let drop = apply(&mut state, vec![Operation::insert(1i64).set("sales", 2i64)]);
        let strands = strands_for(&config, &drop);
        assert_eq!(strands.len(), 1);
        assert_eq!(strands[0].count, -1);
        assert_eq!(strands[0].slots[0].0, Slot::Value(Scalar::Int64(10)));
    }

    #[test]
    fn test_project() {
        let s = Strand {
            path: vec![Scalar::from("a"), Scalar::from("x")],
            sort_keys: vec![Scalar::from("a"), Scalar::from("x")],
            pkey: Scalar::Int64(1),
            row: 0,
            count: 1,
            slots: Vec::new(),
        };
        let projected = project(&[s], &[1]);
        assert_eq!(projected[0].path, vec![Scalar::from("x")]);
        assert_eq!(project(&projected, &[]).len(), 1);
    }
}
