//! Value transitions.
//!
//! Every cell touched by a batch is classified once, from the row's
//! existence before and after the batch and the cell's validity and equality.
//! Downstream consumers only look at the resulting `Transition`.

/// Classification of one cell's before/after state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Row absent before and after the batch
    EqFF,
    /// Row present before and after, value valid and unchanged
    EqTT,
    /// Row present before and after, value invalid before and after
    EqInvalid,
    /// Row created by the batch with a valid value
    NeqFT,
    /// Row created by the batch with an invalid value
    NeqFTInvalid,
    /// Row removed by the batch
    NeqTF,
    /// Value valid before and after, and changed
    NeqTT,
    /// Value became valid
    NveqFT,
    /// Value became invalid
    NveqTF,
}

impl Transition {
    /// Returns true if the cell counts as changed for deltas and aggregates.
    #[inline]
    pub fn is_changed(&self) -> bool {
        !matches!(self, Transition::EqFF | Transition::EqTT | Transition::EqInvalid)
    }

    /// Returns true if the cell's validity flipped.
    #[inline]
    pub fn is_validity_flip(&self) -> bool {
        matches!(self, Transition::NveqFT | Transition::NveqTF)
    }
}

/// The inputs of a transition classification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CellState {
    /// The row was live before the batch
    pub row_pre_existed: bool,
    /// The row is live after the batch
    pub exists: bool,
    /// The cell was valid before the batch
    pub prev_valid: bool,
    /// The cell is valid after the batch
    pub cur_valid: bool,
    /// Previous and current values compare equal
    pub prev_eq_cur: bool,
}

/// Classifies one cell.
pub fn classify(s: CellState) -> Transition {
    match (s.row_pre_existed, s.exists) {
        (false, false) => Transition::EqFF,
        (false, true) => {
            if s.cur_valid {
                Transition::NeqFT
            } else {
                Transition::NeqFTInvalid
            }
        }
        (true, false) => Transition::NeqTF,
        (true, true) => match (s.prev_valid, s.cur_valid) {
            (true, true) if s.prev_eq_cur => Transition::EqTT,
            (true, true) => Transition::NeqTT,
            (false, false) => Transition::EqInvalid,
            (false, true) => Transition::NveqFT,
            (true, false) => Transition::NveqTF,
        },
    }
}

/// Transitions for a flattened batch, stored per column.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransitionTable {
    columns: Vec<Vec<Transition>>,
}

impl TransitionTable {
    /// Creates a table with `num_columns` empty columns.
    pub fn new(num_columns: usize) -> Self {
        Self {
            columns: vec![Vec::new(); num_columns],
        }
    }

    /// Appends the transition of one cell to column `col`.
    pub fn push(&mut self, col: usize, transition: Transition) {
        if let Some(column) = self.columns.get_mut(col) {
            column.push(transition);
        }
    }

    /// Returns the transition at (`row`, `col`), `EqFF` when out of range.
    pub fn get(&self, row: usize, col: usize) -> Transition {
        self.columns
            .get(col)
            .and_then(|c| c.get(row))
            .copied()
            .unwrap_or(Transition::EqFF)
    }

    /// Returns one column of transitions.
    pub fn column(&self, col: usize) -> &[Transition] {
        self.columns.get(col).map(|c| c.as_slice()).unwrap_or(&[])
    }

    /// Returns true if any cell of `row` changed.
    pub fn row_changed(&self, row: usize) -> bool {
        (0..self.columns.len()).any(|col| self.get(row, col).is_changed())
    }
}
