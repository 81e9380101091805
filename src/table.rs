//! Conditional probability tables: for every source label, a distribution over target labels.
use crate::error::{HmmError, Result};
use crate::sample::WeightedOutcome;
use crate::Label;
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use std::iter::FromIterator;

/// The distribution over targets that one source of a table results in.
///
/// Targets are kept in the order in which they were first set.
#[derive(Clone, Debug)]
pub struct Row<T> {
    entries: Vec<(T, f64)>,
    index: HashMap<T, usize>,
}

impl<T: Label> Row<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub(crate) fn set(&mut self, target: T, probability: f64) {
        match self.index.get(&target) {
            Some(&i) => self.entries[i].1 = probability,
            None => {
                self.index.insert(target.clone(), self.entries.len());
                self.entries.push((target, probability));
            }
        }
    }

    /// Fails with `UnknownLabel` if `target` was never set, even if it would be a
    /// probability-zero event. A missing entry usually means the table was built incorrectly.
    pub fn probability_of(&self, target: &T) -> Result<f64> {
        self.get(target)
            .ok_or_else(|| HmmError::unknown_label(target))
    }

    pub fn get(&self, target: &T) -> Option<f64> {
        self.index.get(target).map(|&i| self.entries[i].1)
    }

    pub fn contains(&self, target: &T) -> bool {
        self.index.contains_key(target)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&T, f64)> + '_ {
        self.entries.iter().map(|(target, p)| (target, *p))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, p)| p).sum()
    }

    pub fn to_outcomes(&self) -> Vec<WeightedOutcome<T>> {
        self.entries
            .iter()
            .map(|(target, p)| WeightedOutcome::new(target.clone(), *p))
            .collect()
    }

    /// A row that sums to zero stays as it is.
    pub(crate) fn normalized(&self) -> Self {
        let total = self.total();
        let mut row = self.clone();
        if total > 0.0 {
            for entry in &mut row.entries {
                entry.1 /= total;
            }
        }
        row
    }
}

impl<T: Label> Default for Row<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Rows are equal if they hold the same probabilities, in whatever order.
impl<T: Label> PartialEq for Row<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(target, p)| other.get(target) == Some(p))
    }
}

impl<T: Label> FromIterator<(T, f64)> for Row<T> {
    fn from_iter<I: IntoIterator<Item = (T, f64)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (target, p) in iter {
            row.set(target, p);
        }
        row
    }
}

/// Maps a source label to a distribution over target labels: $P(target | source)$.
///
/// Used both for state transitions (`S → S`) and for emissions (`S → O`). The table does not
/// check that every row sums to 1; call `normalized` to enforce that.
///
/// Sources and targets are iterated in the order in which they were first set.
#[derive(Clone, Debug)]
pub struct ConditionalProbabilityTable<S, T> {
    rows: Vec<(S, Row<T>)>,
    index: HashMap<S, usize>,
    targets: Vec<T>,
    known_targets: HashSet<T>,
}

impl<S: Label, T: Label> ConditionalProbabilityTable<S, T> {
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            index: HashMap::new(),
            targets: Vec::new(),
            known_targets: HashSet::new(),
        }
    }

    pub fn builder() -> TableBuilder<S, T> {
        TableBuilder {
            table: Self::new(),
        }
    }

    /// Set $P(target | source)$, overwriting whatever was set for that pair before.
    pub fn set(&mut self, source: S, target: T, probability: f64) {
        if self.known_targets.insert(target.clone()) {
            self.targets.push(target.clone());
        }
        let i = match self.index.get(&source) {
            Some(&i) => i,
            None => {
                self.index.insert(source.clone(), self.rows.len());
                self.rows.push((source, Row::new()));
                self.rows.len() - 1
            }
        };
        self.rows[i].1.set(target, probability);
    }

    /// The distribution over targets given `source`. Fails with `UnknownLabel` if nothing was
    /// ever set for `source`.
    pub fn given(&self, source: &S) -> Result<&Row<T>> {
        self.index
            .get(source)
            .map(|&i| &self.rows[i].1)
            .ok_or_else(|| HmmError::unknown_label(source))
    }

    pub fn probability(&self, source: &S, target: &T) -> Result<f64> {
        self.given(source)?.probability_of(target)
    }

    /// The row of `source` as a list of outcomes, e.g. to sample from it.
    pub fn outcomes_given(&self, source: &S) -> Result<Vec<WeightedOutcome<T>>> {
        Ok(self.given(source)?.to_outcomes())
    }

    pub fn contains_source(&self, source: &S) -> bool {
        self.index.contains_key(source)
    }

    pub fn sources(&self) -> impl Iterator<Item = &S> + '_ {
        self.rows.iter().map(|(source, _)| source)
    }

    pub fn rows(&self) -> impl Iterator<Item = (&S, &Row<T>)> + '_ {
        self.rows.iter().map(|(source, row)| (source, row))
    }

    /// Every label that was ever set as a target, for any source.
    pub fn targets(&self) -> &[T] {
        &self.targets
    }

    /// The number of sources
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// A copy of this table where every row is divided by its sum. Rows that sum to zero are kept
    /// as they are.
    pub fn normalized(&self) -> Self {
        Self {
            rows: self
                .rows
                .iter()
                .map(|(source, row)| (source.clone(), row.normalized()))
                .collect(),
            index: self.index.clone(),
            targets: self.targets.clone(),
            known_targets: self.known_targets.clone(),
        }
    }
}

impl<S: Label> ConditionalProbabilityTable<S, S> {
    /// The probability of walking through `states`, given that the walk starts in the first one.
    ///
    /// This uses the Markov assumption: each step only depends on the state right before it.
    /// Sequences with fewer than two states contain no transitions and have likelihood 1.
    pub fn sequence_likelihood(&self, states: &[S]) -> Result<f64> {
        states
            .iter()
            .tuple_windows()
            .map(|(previous, next)| self.probability(previous, next))
            .product()
    }

    /// The natural logarithm of `sequence_likelihood`, summed step by step so that long sequences
    /// don't underflow.
    pub fn sequence_log_likelihood(&self, states: &[S]) -> Result<f64> {
        states
            .iter()
            .tuple_windows()
            .map(|(previous, next)| self.probability(previous, next).map(f64::ln))
            .sum()
    }
}

impl<S: Label, T: Label> Default for ConditionalProbabilityTable<S, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Tables are equal if every source has an equal row, regardless of insertion order.
impl<S: Label, T: Label> PartialEq for ConditionalProbabilityTable<S, T> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .rows()
                .all(|(source, row)| other.given(source).map_or(false, |other| row == other))
    }
}

impl<S: Label, T: Label> FromIterator<(S, T, f64)> for ConditionalProbabilityTable<S, T> {
    fn from_iter<I: IntoIterator<Item = (S, T, f64)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (source, target, probability) in iter {
            table.set(source, target, probability);
        }
        table
    }
}

/// Builds a `ConditionalProbabilityTable` one `(source, target, probability)` triple at a time.
#[derive(Clone, Debug)]
pub struct TableBuilder<S, T> {
    table: ConditionalProbabilityTable<S, T>,
}

impl<S: Label, T: Label> TableBuilder<S, T> {
    pub fn add(mut self, source: S, target: T, probability: f64) -> Self {
        self.table.set(source, target, probability);
        self
    }

    pub fn build(self) -> ConditionalProbabilityTable<S, T> {
        self.table
    }
}
