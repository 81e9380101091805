//! Unsupervised re-estimation of the model parameters with the Baum-Welch algorithm.
//!
//! Baum-Welch (Baum et. al. 1970) is a variant of the Expectation-Maximization algorithm for
//! HMMs. With the forward and backward variables of the `forward_backward` module, let
//! $γ_i(t)$ be the probability of being in state $i$ at observation $t$ and let $ξ_{ij}(t)$ be
//! the probability of being in state $i$ at observation $t$ and in state $j$ at observation
//! $t + 1$:
//!
//! $$
//! ξ_{ij}(t) = \frac{α_i(t) a_{ij} b_j(y_{t+1}) β_j(t+1)}
//!             {\sum_{k=1}^N \sum_{l=1}^N α_k(t) a_{kl} b_l(y_{t+1}) β_l(t+1)}
//! $$
//!
//! Summed over every sequence of the corpus, the updates are:
//!
//! $$
//! π_i^* = \frac{1}{|corpus|} \sum γ_i(1)
//! \qquad
//! a_{ij}^* = \frac{\sum \sum^{T-1}\_{t=1} ξ\_{ij}(t)}{\sum \sum^{T-1}\_{t=1} γ_i(t)}
//! \qquad
//! b_i^*(o) = \frac{\sum \sum^T_{t=1} 1_{y_t=o} γ_i(t)}{\sum \sum^T_{t=1} γ_i(t)}
//! $$
//!
//! Caveats:
//! - If there is not enough data, the MLE is undefined. This implementation will use a uniform
//!   distribution for any row for which there isn't enough data.
//! - This is not guaranteed to find a global maximum, only a local one.
//! - Due to a lack of identifiability, an HMM with $N$ states has $N!$ equivalent solutions.
use crate::error::{HmmError, Result};
use crate::forward_backward::{backward_pass, corpus_log_likelihood, forward_pass, smooth};
use crate::model::{HiddenMarkovModel, Matrices};
use crate::sample::WeightedOutcome;
use crate::table::ConditionalProbabilityTable;
use crate::Label;
use log::debug;
use ndarray::prelude::*;
use ndarray::s;
#[cfg(feature = "serde-1")]
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How the expected counts of one training step are computed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde-1", derive(Serialize, Deserialize))]
pub enum UpdateRule {
    /// From one scaled forward-backward pass per sequence. Never decreases the corpus
    /// log-likelihood.
    Standard,

    /// From an unscaled forward pass over the prefix and an unscaled backward pass over the suffix
    /// of every split point of a sequence. Quadratic in the sequence length and prone to
    /// underflow; only useful to cross-check `Standard` on short sequences.
    Direct,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-1", derive(Serialize, Deserialize))]
pub struct TrainingConfig {
    pub max_iterations: usize,
    /// Stop once the corpus log-likelihood improves by less than this
    pub tolerance: f64,
    pub rule: UpdateRule,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-6,
            rule: UpdateRule::Standard,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TrainingOutcome<S, O> {
    pub model: HiddenMarkovModel<S, O>,
    /// The corpus log-likelihood of the starting model, followed by one entry per iteration
    pub log_likelihoods: Vec<f64>,
    /// Whether training stopped because the improvement fell below the tolerance
    pub converged: bool,
}

/// Expected counts accumulated over a corpus. States are indexed like `Matrices::states` and
/// observations like `HiddenMarkovModel::observations`.
struct Expectations {
    sequences: usize,
    initial: Array1<f64>,
    transitions: Array2<f64>,
    departures: Array1<f64>,
    emissions: Array2<f64>,
    occupancy: Array1<f64>,
}

impl Expectations {
    fn new(n: usize, k: usize) -> Self {
        Self {
            sequences: 0,
            initial: Array1::zeros(n),
            transitions: Array2::zeros((n, n)),
            departures: Array1::zeros(n),
            emissions: Array2::zeros((n, k)),
            occupancy: Array1::zeros(n),
        }
    }

    /// Add $γ(t)$ of the observation `y` at position `t`, counting from 1.
    fn add_gamma(&mut self, t: usize, n_observations: usize, y: usize, gamma: ArrayView1<f64>) {
        if t == 1 {
            self.initial += &gamma;
        }
        if t < n_observations {
            self.departures += &gamma;
        }
        self.occupancy += &gamma;
        self.emissions.column_mut(y).scaled_add(1.0, &gamma);
    }

    fn add_standard<S: Label>(
        &mut self,
        matrices: &Matrices<S>,
        b: &Array2<f64>,
        ys: &[usize],
    ) -> Result<()> {
        let Matrices { pi, a, .. } = matrices;
        let (forward, _) = forward_pass(pi.view(), a.view(), b.view(), true)?;
        let backward = backward_pass(a.view(), b.view(), true);
        let gammas = smooth(&forward, &backward)?;

        // Note that ξ only runs to T - 1
        for t in 1..ys.len() {
            let mut xi = Array2::<f64>::zeros(a.dim());
            for ((i, j), xi_ij) in xi.indexed_iter_mut() {
                *xi_ij = forward[(t, i)] * a[(i, j)] * b[(t, j)] * backward[(t + 1, j)];
            }
            let xi_sum = xi.sum();
            if xi_sum > 0.0 {
                xi /= xi_sum;
            }
            self.transitions += &xi;
        }

        for (t, &y) in ys.iter().enumerate() {
            self.add_gamma(t + 1, ys.len(), y, gammas.row(t + 1));
        }
        self.sequences += 1;
        Ok(())
    }

    fn add_direct<S: Label>(
        &mut self,
        matrices: &Matrices<S>,
        b: &Array2<f64>,
        ys: &[usize],
    ) -> Result<()> {
        let Matrices { pi, a, .. } = matrices;
        let n_observations = ys.len();
        let (forward, _) = forward_pass(pi.view(), a.view(), b.view(), false)?;
        let probability = forward.row(n_observations).sum();
        if !(probability > 0.0) {
            return Err(HmmError::ImpossibleObservations {
                time: n_observations,
            });
        }

        for t in 1..=n_observations {
            // α over the first t observations
            let (prefix, _) = forward_pass(pi.view(), a.view(), b.slice(s![..t, ..]), false)?;
            let alpha = prefix.row(t);

            let gamma = if t < n_observations {
                // β over the observations after t + 1
                let suffix = backward_pass(a.view(), b.slice(s![t + 1.., ..]), false);
                let beta = suffix.row(0);
                let mut xi = Array2::<f64>::zeros(a.dim());
                for ((i, j), xi_ij) in xi.indexed_iter_mut() {
                    *xi_ij = alpha[i] * a[(i, j)] * b[(t, j)] * beta[j] / probability;
                }
                self.transitions += &xi;
                xi.sum_axis(Axis(1))
            } else {
                alpha.to_owned() / probability
            };
            self.add_gamma(t, n_observations, ys[t - 1], gamma.view());
        }
        self.sequences += 1;
        Ok(())
    }

    /// Turn the expected counts into a new model over the same states and observations.
    fn into_model<S: Label, O: Label>(
        self,
        states: &[S],
        observations: &[O],
    ) -> Result<HiddenMarkovModel<S, O>> {
        let sequences = self.sequences as f64;
        let initial = states
            .iter()
            .zip(self.initial.iter())
            .map(|(state, &count)| WeightedOutcome::new(state.clone(), count / sequences))
            .collect::<Vec<_>>();

        let mut transitions = ConditionalProbabilityTable::new();
        for (i, source) in states.iter().enumerate() {
            if self.departures[i] > 0.0 {
                for (j, target) in states.iter().enumerate() {
                    let p = self.transitions[(i, j)] / self.departures[i];
                    transitions.set(source.clone(), target.clone(), p);
                }
            } else {
                // If we have never seen a transition away from this state, fall back to a
                // uniform distribution.
                debug!("no transitions away from {:?}, using a uniform row", source);
                for target in states {
                    transitions.set(source.clone(), target.clone(), 1.0 / states.len() as f64);
                }
            }
        }

        let mut emissions = ConditionalProbabilityTable::new();
        for (i, state) in states.iter().enumerate() {
            if self.occupancy[i] > 0.0 {
                for (k, observation) in observations.iter().enumerate() {
                    let p = self.emissions[(i, k)] / self.occupancy[i];
                    emissions.set(state.clone(), observation.clone(), p);
                }
            } else {
                // If we have never seen this state, fall back to a uniform distribution
                debug!("{:?} was never visited, using uniform emissions", state);
                for observation in observations {
                    emissions.set(
                        state.clone(),
                        observation.clone(),
                        1.0 / observations.len() as f64,
                    );
                }
            }
        }

        HiddenMarkovModel::new(
            WeightedOutcome::normalize_all(&initial),
            transitions.normalized(),
            emissions.normalized(),
        )
    }
}

fn train_one_step_with<S, O, Q>(
    model: &HiddenMarkovModel<S, O>,
    corpus: &[Q],
    rule: UpdateRule,
) -> Result<HiddenMarkovModel<S, O>>
where
    S: Label,
    O: Label,
    Q: AsRef<[O]>,
{
    if corpus.is_empty() {
        return Err(HmmError::EmptyCorpus);
    }
    debug!("Baum-Welch step ({:?}) over {} sequences", rule, corpus.len());

    let matrices = model.matrices()?;
    let observations = model.observations();
    let observation_index = observations
        .iter()
        .enumerate()
        .map(|(k, observation)| (observation, k))
        .collect::<HashMap<_, _>>();

    let mut expectations = Expectations::new(matrices.states.len(), observations.len());
    for sequence in corpus {
        let sequence = sequence.as_ref();
        if sequence.is_empty() {
            return Err(HmmError::EmptySequence);
        }
        let b = model.emission_matrix(&matrices.states, sequence)?;
        let ys = sequence
            .iter()
            .map(|observation| {
                observation_index
                    .get(observation)
                    .copied()
                    .ok_or_else(|| HmmError::unknown_label(observation))
            })
            .collect::<Result<Vec<_>>>()?;
        match rule {
            UpdateRule::Standard => expectations.add_standard(&matrices, &b, &ys)?,
            UpdateRule::Direct => expectations.add_direct(&matrices, &b, &ys)?,
        }
    }

    expectations.into_model(&matrices.states, observations)
}

/// Perform exactly one Baum-Welch step over `corpus` and return the re-estimated model. Every
/// sequence restarts from the initial distribution.
///
/// Fails with `EmptyCorpus` if there are no sequences, with `EmptySequence` if one of them is
/// empty and with `ImpossibleObservations` if the model cannot produce one of them.
pub fn train_one_step<S, O, Q>(
    model: &HiddenMarkovModel<S, O>,
    corpus: &[Q],
) -> Result<HiddenMarkovModel<S, O>>
where
    S: Label,
    O: Label,
    Q: AsRef<[O]>,
{
    train_one_step_with(model, corpus, UpdateRule::Standard)
}

/// Like `train_one_step`, but with `UpdateRule::Direct`.
pub fn train_one_step_direct<S, O, Q>(
    model: &HiddenMarkovModel<S, O>,
    corpus: &[Q],
) -> Result<HiddenMarkovModel<S, O>>
where
    S: Label,
    O: Label,
    Q: AsRef<[O]>,
{
    train_one_step_with(model, corpus, UpdateRule::Direct)
}

/// Repeat training steps until the corpus log-likelihood improves by less than
/// `config.tolerance`, or for at most `config.max_iterations` steps.
///
/// This is a convenience loop over `train_one_step` (or `train_one_step_direct`). The single
/// steps never test for convergence themselves; callers that want their own stopping rule can
/// iterate them directly.
pub fn train<S, O, Q>(
    model: &HiddenMarkovModel<S, O>,
    corpus: &[Q],
    config: &TrainingConfig,
) -> Result<TrainingOutcome<S, O>>
where
    S: Label,
    O: Label,
    Q: AsRef<[O]>,
{
    if corpus.is_empty() {
        return Err(HmmError::EmptyCorpus);
    }

    let mut model = model.clone();
    let mut log_likelihood = corpus_log_likelihood(&model, corpus)?;
    let mut log_likelihoods = vec![log_likelihood];
    let mut converged = false;

    for iteration in 1..=config.max_iterations {
        let next = train_one_step_with(&model, corpus, config.rule)?;
        let next_log_likelihood = corpus_log_likelihood(&next, corpus)?;
        debug!(
            "iteration {}: log-likelihood {} -> {}",
            iteration, log_likelihood, next_log_likelihood
        );
        let improvement = next_log_likelihood - log_likelihood;

        model = next;
        log_likelihood = next_log_likelihood;
        log_likelihoods.push(log_likelihood);

        if improvement.abs() < config.tolerance {
            debug!("converged after {} iterations", iteration);
            converged = true;
            break;
        }
    }

    Ok(TrainingOutcome {
        model,
        log_likelihoods,
        converged,
    })
}
