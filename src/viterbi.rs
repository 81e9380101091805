//! MAP decoding with the Viterbi algorithm.
use crate::error::{HmmError, Result};
use crate::model::{HiddenMarkovModel, Matrices};
use crate::ndarray_utils::*;
use crate::Label;
use log::trace;
use ndarray::prelude::*;
#[cfg(feature = "serde-1")]
use serde::{Deserialize, Serialize};

/// The most likely sequence of hidden states, with the joint log-probability of those states and
/// the observations.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-1", derive(Serialize, Deserialize))]
pub struct ViterbiPath<S> {
    pub states: Vec<S>,
    pub log_probability: f64,
}

impl<S> ViterbiPath<S> {
    pub fn probability(&self) -> f64 {
        self.log_probability.exp()
    }
}

// Divide a column of δ by its sum and return the log of the sum. A column of zeros stays as it
// is and contributes ln 0.
fn rescale(mut column: ArrayViewMut1<f64>) -> f64 {
    column.nip().ln()
}

/// This is the Viterbi algorithm. Given a sequence of observations, return the most likely
/// sequence of states.
///
/// It's possible to do this in log space but each column is normalized instead, the same way the
/// forward-backward algorithm does it. The scale factors are added back up in log space for
/// `ViterbiPath::log_probability`.
///
/// If several predecessors are equally likely, the one that comes first in the order of the
/// model's states wins. The same goes for the final state.
///
/// Observations that the model cannot produce still get a path: every column of δ is zero, so
/// the ties resolve to the first state, and the log-probability is `-inf`.
pub fn viterbi<S: Label, O: Label>(
    model: &HiddenMarkovModel<S, O>,
    observations: &[O],
) -> Result<ViterbiPath<S>> {
    if observations.is_empty() {
        return Err(HmmError::EmptySequence);
    }
    let Matrices { states, pi, a } = model.matrices()?;
    trace!(
        "viterbi over {} observations and {} states",
        observations.len(),
        states.len()
    );
    let b = model.emission_matrix(&states, observations)?;
    let (n_observations, n) = b.dim();

    // probs is a T × N matrix where probs[t, i] is proportional to the probability of the most
    // likely sequence of hidden states that ends in state i at time t.
    let mut probs = Array2::<f64>::zeros((n_observations, n));

    // x_to_prev_x is a (T - 1) × N matrix where each entry x_to_prev_x[t, i] is the most likely
    // state that would have occurred at time t given that we're in state i at time t + 1.
    let mut x_to_prev_x = Array2::<usize>::zeros((n_observations - 1, n));

    probs.row_mut(0).assign(&(&pi * &b.row(0)));
    let mut log_scale = rescale(probs.row_mut(0));

    for t in 1..n_observations {
        for j in 0..n {
            let mut best: Option<(usize, f64)> = None;
            for i in 0..n {
                let prob_i_j = probs[(t - 1, i)] * a[(i, j)];
                if best.map_or(true, |(_, best_prob)| prob_i_j > best_prob) {
                    best = Some((i, prob_i_j));
                }
            }
            if let Some((i, prob)) = best {
                probs[(t, j)] = prob * b[(t, j)];
                x_to_prev_x[(t - 1, j)] = i;
            }
        }

        // Normalize to prevent underflow
        log_scale += rescale(probs.row_mut(t));
    }

    let (mut i, p) = probs
        .row(n_observations - 1)
        .maxf()
        .ok_or(HmmError::ImpossibleObservations {
            time: n_observations,
        })?;

    let mut path = vec![i; n_observations];
    for t in (0..n_observations - 1).rev() {
        i = x_to_prev_x[(t, i)];
        path[t] = i;
    }

    Ok(ViterbiPath {
        states: path.into_iter().map(|i| states[i].clone()).collect(),
        log_probability: log_scale + p.ln(),
    })
}

/// Like `viterbi`, but only returns the states.
pub fn most_likely_state_sequence<S: Label, O: Label>(
    model: &HiddenMarkovModel<S, O>,
    observations: &[O],
) -> Result<Vec<S>> {
    Ok(viterbi(model, observations)?.states)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Caretaker::*;
    use crate::fixtures::Coin::*;
    use crate::fixtures::Toss::*;
    use crate::fixtures::Weather::*;
    use crate::fixtures::*;
    use crate::sample::generate_observations;
    use crate::table::ConditionalProbabilityTable;
    use itertools::Itertools;
    use proptest::prelude::*;
    use spectral::prelude::*;

    /// The most likely path and its probability, by trying every path
    fn exhaustive(
        model: &HiddenMarkovModel<usize, usize>,
        observations: &[usize],
    ) -> (Vec<usize>, f64) {
        std::iter::repeat(0..model.n())
            .take(observations.len())
            .multi_cartesian_product()
            .map(|states| {
                let p = model.joint_likelihood(&states, observations).unwrap();
                (states, p)
            })
            .fold((vec![], -1.0), |best, (states, p)| {
                if p > best.1 {
                    (states, p)
                } else {
                    best
                }
            })
    }

    #[test]
    fn coin_toss() {
        assert_eq!(
            vec![UnFair, UnFair, UnFair],
            most_likely_state_sequence(&*COIN_HMM, &[Heads, Tails, Heads]).unwrap()
        );
    }

    #[test]
    fn weather() {
        let path = viterbi(&*UMBRELLA_HMM, &[NoUmbrella, Umbrella, Umbrella]).unwrap();
        assert_eq!(vec![Foggy, Rainy, Rainy], path.states);
        assert_that(&path.probability()).is_close_to(0.02688, 1e-12);
    }

    #[test]
    fn single_observation() {
        assert_eq!(vec![0], most_likely_state_sequence(&*FANCY_HMM, &[0]).unwrap());
        assert_eq!(vec![2], most_likely_state_sequence(&*FANCY_HMM, &[1]).unwrap());
    }

    #[test]
    fn fancy() {
        let observations = [0, 1, 0, 1];
        let path = viterbi(&*FANCY_HMM, &observations).unwrap();
        assert_eq!(vec![0, 2, 0, 2], path.states);
        assert_that(&path.probability()).is_close_to(0.03125, 1e-12);
        assert_eq!(exhaustive(&FANCY_HMM, &observations).0, path.states);
    }

    #[test]
    fn ties_go_to_the_first_state() {
        let model = dense_model(&[1.0, 1.0], &[1.0; 4], &[1.0; 4]);
        assert_eq!(vec![0, 0, 0], most_likely_state_sequence(&model, &[0, 1, 0]).unwrap());
    }

    #[test]
    fn empty() {
        assert_eq!(Err(HmmError::EmptySequence), viterbi(&*COIN_HMM, &[]));
    }

    #[test]
    fn unknown_observation() {
        let transitions = COIN_HMM.state_transitions().clone();
        let emissions = ConditionalProbabilityTable::builder()
            .add(Fair, Heads, 1.0)
            .add(UnFair, Heads, 1.0)
            .build();
        let model =
            HiddenMarkovModel::new(COIN_HMM.initial_outcomes(), transitions, emissions).unwrap();
        assert!(matches!(
            viterbi(&model, &[Heads, Tails]),
            Err(HmmError::UnknownLabel { .. })
        ));
    }

    #[test]
    fn impossible_observations() {
        // PERIODIC_HMM starts in state 0, which never emits 0
        let path = viterbi(&*PERIODIC_HMM, &[0]).unwrap();
        assert_eq!(vec![0], path.states);
        assert_eq!(f64::NEG_INFINITY, path.log_probability);
        assert_eq!(0.0, path.probability());

        // Possible up to the second observation, then every path has probability zero
        let path = viterbi(&*PERIODIC_HMM, &[1, 1]).unwrap();
        assert_eq!(vec![0, 0], path.states);
        assert_eq!(f64::NEG_INFINITY, path.log_probability);
        assert_eq!(exhaustive(&PERIODIC_HMM, &[1, 1]).0, path.states);

        assert_eq!(
            vec![0, 1, 0],
            most_likely_state_sequence(&*PERIODIC_HMM, &[1, 0, 1]).unwrap()
        );
    }

    #[test]
    fn long_sequences_do_not_underflow() {
        let observations = generate_observations(&*RAIN_HMM, &mut new_rng(), 2000).unwrap();
        let path = viterbi(&*RAIN_HMM, &observations).unwrap();
        assert_eq!(2000, path.states.len());
        assert!(path.log_probability.is_finite());
        assert!(path.log_probability < -100.0);
        assert_that(&RAIN_HMM.joint_log_likelihood(&path.states, &observations).unwrap())
            .is_close_to(path.log_probability, 1e-6);
    }

    proptest! {
        #[test]
        fn viterbi_is_optimal((model, corpus) in arbitrary_model_and_corpus(5, 1)) {
            let observations = &corpus[0];
            let path = viterbi(&model, observations).unwrap();
            let (_, best) = exhaustive(&model, observations);
            prop_assert!((path.probability() - best).abs() < 1e-12);
            let likelihood = model.joint_likelihood(&path.states, observations).unwrap();
            prop_assert!((likelihood - best).abs() < 1e-12);
        }
    }
}
