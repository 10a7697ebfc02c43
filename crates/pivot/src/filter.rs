//! Row filters.
//!
//! Filters are evaluated against both the prior and the post image of every
//! flattened row, so a row can enter or leave a view when a filtered column
//! changes.

use tessera_core::schema::Schema;
use tessera_core::{DataTable, Error, Result, Scalar};

/// Evaluation type for a filter term.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvalType {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    IsNull,
    IsNotNull,
    In,
}

/// Logical operator combining filter terms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FilterOp {
    #[default]
    And,
    Or,
}

/// A filter term compares a column to literal values.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterTerm {
    pub column: String,
    pub eval_type: EvalType,
    pub values: Vec<Scalar>,
}

impl FilterTerm {
    pub fn new(column: impl Into<String>, eval_type: EvalType, values: Vec<Scalar>) -> Self {
        Self {
            column: column.into(),
            eval_type,
            values,
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::new(column, EvalType::Eq, vec![value.into()])
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::new(column, EvalType::Ne, vec![value.into()])
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::new(column, EvalType::Lt, vec![value.into()])
    }

    pub fn le(column: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::new(column, EvalType::Le, vec![value.into()])
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::new(column, EvalType::Gt, vec![value.into()])
    }

    pub fn ge(column: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::new(column, EvalType::Ge, vec![value.into()])
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::new(column, EvalType::IsNull, Vec::new())
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self::new(column, EvalType::IsNotNull, Vec::new())
    }

    pub fn is_in(column: impl Into<String>, values: Vec<Scalar>) -> Self {
        Self::new(column, EvalType::In, values)
    }
}

/// Evaluates one term against a cell value.
///
/// Comparisons never match an invalid cell.
fn eval(eval_type: EvalType, values: &[Scalar], cell: &Scalar) -> bool {
    match eval_type {
        EvalType::IsNull => return cell.is_none(),
        EvalType::IsNotNull => return cell.is_valid(),
        _ if cell.is_none() => return false,
        _ => {}
    }
    let literal = match values.first() {
        Some(v) => v,
        None => return false,
    };
    match eval_type {
        EvalType::Eq => cell == literal,
        EvalType::Ne => cell != literal,
        EvalType::Lt => cell < literal,
        EvalType::Le => cell <= literal,
        EvalType::Gt => cell > literal,
        EvalType::Ge => cell >= literal,
        EvalType::In => values.contains(cell),
        EvalType::IsNull | EvalType::IsNotNull => false,
    }
}

#[derive(Clone, Debug, PartialEq)]
struct CompiledTerm {
    column: usize,
    eval_type: EvalType,
    values: Vec<Scalar>,
}

/// Filter terms bound to column positions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterSet {
    terms: Vec<CompiledTerm>,
    op: FilterOp,
}

impl FilterSet {
    /// Binds terms to a schema, checking literal types.
    pub fn compile(terms: &[FilterTerm], op: FilterOp, schema: &Schema) -> Result<Self> {
        let mut compiled = Vec::with_capacity(terms.len());
        for term in terms {
            let column = schema.require_column(&term.column)?;
            let dtype = schema.columns()[column].data_type();
            let arity_ok = match term.eval_type {
                EvalType::IsNull | EvalType::IsNotNull => term.values.is_empty(),
                EvalType::In => true,
                _ => term.values.len() == 1,
            };
            if !arity_ok {
                return Err(Error::invalid_config(format!(
                    "filter on {} has {} operands",
                    term.column,
                    term.values.len()
                )));
            }
            for value in &term.values {
                match value.dtype() {
                    Some(got) if got != dtype => {
                        return Err(Error::type_mismatch(&term.column, dtype, got))
                    }
                    Some(_) => {}
                    None => {
                        return Err(Error::invalid_config(format!(
                            "filter on {} compares against none",
                            term.column
                        )))
                    }
                }
            }
            compiled.push(CompiledTerm {
                column,
                eval_type: term.eval_type,
                values: term.values.clone(),
            });
        }
        Ok(Self {
            terms: compiled,
            op,
        })
    }

    /// Returns true if there are no terms.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Evaluates the filter against row `row` of a table in schema order.
    pub fn matches(&self, table: &DataTable, row: usize) -> bool {
        let check = |t: &CompiledTerm| {
            let cell = table
                .column_at(t.column)
                .and_then(|c| c.get(row))
                .unwrap_or(&Scalar::None);
            eval(t.eval_type, &t.values, cell)
        };
        match self.op {
            FilterOp::And => self.terms.iter().all(check),
            FilterOp::Or => self.terms.is_empty() || self.terms.iter().any(check),
        }
    }
}
