#![cfg_attr(feature = "benchmark", feature(test))]
//! This library contains a Rust implementation of a time-invariant Hidden Markov model with
//! discrete observations over arbitrary labels. States and observations can be any type that is
//! `Clone + Debug + Eq + Hash`; the model parameters are kept in conditional probability tables
//! that are built once and queried read-only afterwards.
//!
//! It includes:
//! - Likelihoods of hidden state sequences, posterior decoding via the forward-backward algorithm
//!   and MAP decoding via the Viterbi algorithm.
//! - Unsupervised re-estimation of the parameters via the Baum-Welch expectation-maximization
//!   algorithm, one step at a time or iterated until the log-likelihood converges.
//! - Maximum likelihood estimation of a transition table from a known state sequence, including
//!   higher-order chains folded into first-order ones.
//! - Sampling of synthetic state and observation sequences from a model.
//!
//! Below, a fair and an unfair coin are swapped now and then. Only the tosses can be observed.
//!
//! ```
//! use labeled_hmm::{most_likely_state_sequence, ConditionalProbabilityTable, HiddenMarkovModel};
//! use labeled_hmm::WeightedOutcome;
//!
//! # fn main() -> labeled_hmm::Result<()> {
//! let coins = ConditionalProbabilityTable::builder()
//!     .add("fair", "fair", 0.9)
//!     .add("fair", "unfair", 0.1)
//!     .add("unfair", "fair", 0.1)
//!     .add("unfair", "unfair", 0.9)
//!     .build();
//! let tosses = ConditionalProbabilityTable::builder()
//!     .add("fair", "heads", 0.5)
//!     .add("fair", "tails", 0.5)
//!     .add("unfair", "heads", 0.6)
//!     .add("unfair", "tails", 0.4)
//!     .build();
//! let hmm = HiddenMarkovModel::new(
//!     vec![WeightedOutcome::new("fair", 0.5), WeightedOutcome::new("unfair", 0.5)],
//!     coins,
//!     tosses,
//! )?;
//!
//! let decoded = most_likely_state_sequence(&hmm, &["heads", "tails", "heads"])?;
//! assert_eq!(decoded, vec!["unfair", "unfair", "unfair"]);
//! # Ok(())
//! # }
//! ```
//!
//! There is a small amount of benchmarking functionality gated by the `benchmark` feature.
//!
//! ## Notes
//!
//! Rabiner's *A Tutorial on Hidden Markov Models and Selected Applications in Speech
//! Recognition*, 1989, is the reference for the scaling of the forward and backward variables and
//! for the re-estimation formulas.
//!
//! The notation follows the Wikipedia page on the Baum-Welch algorithm: $π$ is the initial
//! distribution, $a_{ij}$ a transition probability, $b_j(o)$ an emission probability and $α$,
//! $β$, $γ$, $ξ$ are the forward, backward, posterior and pairwise posterior variables.
#[cfg(feature = "benchmark")]
extern crate test;

use std::fmt::Debug;
use std::hash::Hash;

pub mod baum_welch;
pub mod error;
pub mod estimate;
pub mod forward_backward;
pub mod model;
pub mod sample;
pub mod table;
pub mod viterbi;
pub mod window;

#[cfg(test)]
mod fixtures;

pub use crate::baum_welch::{
    train, train_one_step, train_one_step_direct, TrainingConfig, TrainingOutcome, UpdateRule,
};
pub use crate::error::{HmmError, Result};
pub use crate::estimate::{estimate_from_sequence, estimate_higher_order};
pub use crate::forward_backward::{
    corpus_likelihood, corpus_log_likelihood, filter, forward_backward, forward_backward_with,
    log_likelihood, probability_of_observations, Filter, ForwardBackward, ForwardBackwardOptions,
};
pub use crate::model::HiddenMarkovModel;
pub use crate::sample::{
    generate_observations, generate_sequence, generate_state_sequence, sample_weighted, Sample,
    Sampler, WeightedChoice, WeightedOutcome,
};
pub use crate::table::{ConditionalProbabilityTable, Row, TableBuilder};
pub use crate::viterbi::{most_likely_state_sequence, viterbi, ViterbiPath};
pub use crate::window::{combined_states, SlidingWindow};

/// How far the probabilities of a distribution may sum away from 1.0 before it is rejected.
pub(crate) const TOLERANCE: f64 = 1e-6;

/// Anything that can be used as a hidden state or as an observation.
///
/// `Debug` is needed so that errors can name the label that was missing.
pub trait Label: Clone + Debug + Eq + Hash {}

impl<L: Clone + Debug + Eq + Hash> Label for L {}

mod ndarray_utils {
    use ndarray::prelude::*;
    use ndarray::*;
    use num_traits::Float;

    pub trait Array1Float<T: Float> {
        /// Along a 1D array, return the maximum float value and its index
        ///
        /// If there are multiple equal maximum values, the first one is returned with its index.
        ///
        /// The behavior of this function is unspecified if the array contains NaNs.
        fn maxf(&self) -> Option<(usize, T)>;
    }

    pub trait Array1FloatMut {
        /// Divide every element by the sum of the array, in place, and return the sum.
        ///
        /// An array that sums to zero is left untouched.
        fn nip(&mut self) -> f64;
    }

    impl<T, S> Array1Float<T> for ArrayBase<S, Ix1>
    where
        T: Float,
        S: Data<Elem = T>,
    {
        fn maxf(&self) -> Option<(usize, T)> {
            self.iter()
                .enumerate()
                .fold(None, |best, (i, &v)| match best {
                    Some((_, b)) if v <= b => best,
                    _ => Some((i, v)),
                })
        }
    }

    impl<S> Array1FloatMut for ArrayBase<S, Ix1>
    where
        S: DataMut + Data<Elem = f64>,
    {
        fn nip(&mut self) -> f64 {
            let sum: f64 = self.sum();
            if sum > 0.0 {
                (*self) /= sum;
            }
            sum
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use ndarray::array;

        #[test]
        fn maxf_prefers_the_first_of_equal_values() {
            assert_eq!(Some((1, 0.4)), array![0.2, 0.4, 0.4].maxf());
        }

        #[test]
        fn maxf_empty() {
            assert_eq!(None, Array1::<f64>::zeros(0).maxf());
        }

        #[test]
        fn nip_returns_the_sum() {
            let mut a = array![1.0, 3.0];
            assert_eq!(4.0, a.nip());
            assert_eq!(array![0.25, 0.75], a);
        }

        #[test]
        fn nip_leaves_zeros_alone() {
            let mut a = array![0.0, 0.0];
            assert_eq!(0.0, a.nip());
            assert_eq!(array![0.0, 0.0], a);
        }
    }
}

#[cfg(feature = "benchmark")]
mod benchmark {
    use crate::fixtures::*;
    use crate::*;
    use test::Bencher;

    #[bench]
    fn bench(b: &mut Bencher) {
        let observations = ["A", "B"].iter().cycle().take(1001).cloned().collect::<Vec<_>>();
        let corpus = vec![observations];
        b.iter(|| train_one_step(&*ST_MODEL, &corpus));
    }
}
