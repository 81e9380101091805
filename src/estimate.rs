//! Supervised estimation: when the hidden states are known, the maximum likelihood transition
//! table is just the relative frequency of every observed transition.
use crate::error::{HmmError, Result};
use crate::table::ConditionalProbabilityTable;
use crate::window::combined_states;
use crate::Label;
use itertools::Itertools;
use log::debug;

/// Count every transition between consecutive `states` and divide by the number of transitions
/// away from each source.
///
/// Sources and targets keep the order in which they first appear. A state that is never left,
/// such as the last one of the sequence if it appears nowhere else, has no row; a sequence of one
/// state results in an empty table.
pub fn estimate_from_sequence<S: Label>(
    states: &[S],
) -> Result<ConditionalProbabilityTable<S, S>> {
    if states.is_empty() {
        return Err(HmmError::EmptySequence);
    }

    let mut counts = ConditionalProbabilityTable::new();
    for (previous, next) in states.iter().tuple_windows() {
        let count = counts
            .given(previous)
            .ok()
            .and_then(|row| row.get(next))
            .unwrap_or(0.0);
        counts.set(previous.clone(), next.clone(), count + 1.0);
    }
    debug!("estimated {} rows from {} states", counts.len(), states.len());
    Ok(counts.normalized())
}

/// Estimate a chain of order `order` by folding every run of `order` consecutive states into one
/// label, see [`combined_states`]. An `order` of 1 is the same as `estimate_from_sequence`.
///
/// Fails with `EmptySequence` if `states` is shorter than `order` or if `order` is zero.
pub fn estimate_higher_order<S: Label>(
    states: &[S],
    order: usize,
) -> Result<ConditionalProbabilityTable<Vec<S>, Vec<S>>> {
    estimate_from_sequence(&combined_states(states, order))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Weather::*;
    use crate::fixtures::*;
    use crate::sample::generate_state_sequence;
    use spectral::prelude::*;

    #[test]
    fn three_states() {
        let expected = ConditionalProbabilityTable::builder()
            .add("a", "b", 1.0)
            .add("b", "c", 1.0)
            .build();
        assert_eq!(expected, estimate_from_sequence(&["a", "b", "c"]).unwrap());
    }

    #[test]
    fn split_transitions() {
        let table = estimate_from_sequence(&["a", "b", "a", "c"]).unwrap();
        assert_eq!(0.5, table.probability(&"a", &"b").unwrap());
        assert_eq!(0.5, table.probability(&"a", &"c").unwrap());
        assert_eq!(1.0, table.probability(&"b", &"a").unwrap());
        assert!(!table.contains_source(&"c"));
        assert_eq!(vec![&"a", &"b"], table.sources().collect::<Vec<_>>());
    }

    #[test]
    fn single_state() {
        assert!(estimate_from_sequence(&["a"]).unwrap().is_empty());
    }

    #[test]
    fn empty() {
        assert_eq!(Err(HmmError::EmptySequence), estimate_from_sequence::<&str>(&[]));
        assert_eq!(Err(HmmError::EmptySequence), estimate_higher_order(&["a"], 2));
    }

    #[test]
    fn order_two() {
        let states = ["a", "b", "c", "c", "d", "a", "b", "d"];
        let table = estimate_higher_order(&states, 2).unwrap();

        // ab is followed once by bc and once by bd
        assert_eq!(0.5, table.probability(&vec!["a", "b"], &vec!["b", "c"]).unwrap());
        assert_eq!(0.5, table.probability(&vec!["a", "b"], &vec!["b", "d"]).unwrap());
        assert_eq!(1.0, table.probability(&vec!["c", "c"], &vec!["c", "d"]).unwrap());
        assert_eq!(1.0, table.probability(&vec!["d", "a"], &vec!["a", "b"]).unwrap());
        assert!(!table.contains_source(&vec!["b", "d"]));
        assert_eq!(5, table.len());
    }

    #[test]
    fn order_one_matches_first_order() {
        let states = ["a", "b", "a", "c", "a"];
        let first = estimate_from_sequence(&states).unwrap();
        let higher = estimate_higher_order(&states, 1).unwrap();
        for (source, row) in first.rows() {
            for (target, p) in row.iter() {
                assert_eq!(p, higher.probability(&vec![*source], &vec![*target]).unwrap());
            }
        }
    }

    /// Sample a long walk and recover the table it was sampled from.
    #[test]
    fn recover_weather() {
        let weather = WEATHER.normalized();
        let initial = uniform(&[Sunny, Rainy, Foggy]);
        let states = generate_state_sequence(&initial, &weather, &mut new_rng(), 200_000).unwrap();
        let estimated = estimate_from_sequence(&states).unwrap();
        for (source, row) in weather.rows() {
            for (target, p) in row.iter() {
                assert_that(&estimated.probability(source, target).unwrap()).is_close_to(p, 0.01);
            }
        }
    }
}
