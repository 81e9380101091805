//! Posterior decoding: the probability of being in each hidden state at each point in time, given
//! a whole sequence of observations.
//!
//! Let $α_i(t) = P(Y_0=y_0, \ldots, Y_{t-1}=y_{t-1}, X_{t-1}=i | θ)$ be the forward variable and
//! $β_i(t) = P(Y_t=y_t, \ldots, Y_{T-1}=y_{T-1} | X_{t-1}=i, θ)$ the backward variable. Both are
//! stored as $(T + 1) × N$ matrices. Row $t$ of the forward matrix covers the first $t$
//! observations, so row 0 only holds $π$ and row $T$ covers the whole sequence. Row $T$ of the
//! backward matrix is all ones.
//!
//! $$
//! γ_i(t) = \frac{α_i(t)β_i(t)}{\sum_{j=1}^N α_j(t)β_j(t)}
//! $$
//!
//! By default every row of $α$ and $β$ is rescaled to sum to 1, which prevents underflow on long
//! sequences. The scale factors of $α$ are kept so that $\ln P(Y|θ)$ can still be recovered.
use crate::error::{HmmError, Result};
use crate::model::{HiddenMarkovModel, Matrices};
use crate::ndarray_utils::*;
use crate::sample::WeightedOutcome;
use crate::Label;
use log::trace;
use ndarray::prelude::*;
#[cfg(feature = "serde-1")]
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-1", derive(Serialize, Deserialize))]
pub struct ForwardBackwardOptions {
    /// Rescale every forward and backward row to sum to 1
    pub normalize: bool,
}

impl Default for ForwardBackwardOptions {
    fn default() -> Self {
        Self { normalize: true }
    }
}

/// Compute the $(T + 1) × N$ forward matrix from $π$, $A$ and the $T × N$ emission matrix `b`,
/// along with $\ln P(Y|θ)$.
///
/// With `normalize`, a row that sums to zero means that the observations are impossible.
pub(crate) fn forward_pass(
    pi: ArrayView1<f64>,
    a: ArrayView2<f64>,
    b: ArrayView2<f64>,
    normalize: bool,
) -> Result<(Array2<f64>, f64)> {
    let (n_observations, n_states) = b.dim();
    let mut forward = Array2::<f64>::zeros((n_observations + 1, n_states));
    forward.row_mut(0).assign(&pi);

    let mut log_probability = 0.0;
    if normalize {
        log_probability += forward.row_mut(0).nip().ln();
    }

    for t in 1..=n_observations {
        // π already describes the state of the first observation
        let incoming = if t == 1 {
            forward.row(0).to_owned()
        } else {
            forward.row(t - 1).dot(&a)
        };
        let mut column = incoming * &b.row(t - 1);
        if normalize {
            let scale = column.nip();
            if !(scale > 0.0) {
                return Err(HmmError::ImpossibleObservations { time: t });
            }
            log_probability += scale.ln();
        }
        forward.row_mut(t).assign(&column);
    }

    if !normalize {
        log_probability = forward.row(n_observations).sum().ln();
    }
    Ok((forward, log_probability))
}

/// Compute the $(T + 1) × N$ backward matrix. The last row is all ones and is never rescaled.
pub(crate) fn backward_pass(
    a: ArrayView2<f64>,
    b: ArrayView2<f64>,
    normalize: bool,
) -> Array2<f64> {
    let (n_observations, n_states) = b.dim();
    let mut backward = Array2::<f64>::ones((n_observations + 1, n_states));
    for t in (0..n_observations).rev() {
        let mut column = a.dot(&(&b.row(t) * &backward.row(t + 1)));
        if normalize {
            column.nip();
        }
        backward.row_mut(t).assign(&column);
    }
    backward
}

/// Multiply forward and backward rows and renormalize them. Row 0 may be all zeros, any other
/// row may not.
pub(crate) fn smooth(forward: &Array2<f64>, backward: &Array2<f64>) -> Result<Array2<f64>> {
    let mut posterior = forward * backward;
    for (t, mut row) in posterior.outer_iter_mut().enumerate() {
        if !(row.nip() > 0.0) && t > 0 {
            return Err(HmmError::ImpossibleObservations { time: t });
        }
    }
    Ok(posterior)
}

/// The result of the forward-backward algorithm for one sequence of $T$ observations.
///
/// Columns follow the order of `states`. Row $t$ of each matrix belongs to observation $t - 1$;
/// row 0 is a boundary row that only reflects $π$.
#[derive(Clone, Debug, PartialEq)]
pub struct ForwardBackward<S> {
    states: Vec<S>,
    forward: Array2<f64>,
    backward: Array2<f64>,
    posterior: Array2<f64>,
    log_probability: f64,
}

impl<S: Label> ForwardBackward<S> {
    pub fn states(&self) -> &[S] {
        &self.states
    }

    /// $T$
    pub fn observation_count(&self) -> usize {
        self.forward.nrows() - 1
    }

    pub fn forward(&self) -> &Array2<f64> {
        &self.forward
    }

    pub fn backward(&self) -> &Array2<f64> {
        &self.backward
    }

    /// $γ$
    pub fn posterior(&self) -> &Array2<f64> {
        &self.posterior
    }

    pub fn forward_at(&self, t: usize) -> Option<Vec<WeightedOutcome<S>>> {
        self.outcomes(&self.forward, t)
    }

    pub fn backward_at(&self, t: usize) -> Option<Vec<WeightedOutcome<S>>> {
        self.outcomes(&self.backward, t)
    }

    pub fn posterior_at(&self, t: usize) -> Option<Vec<WeightedOutcome<S>>> {
        self.outcomes(&self.posterior, t)
    }

    /// $γ_i(t)$ for the state `state`
    pub fn posterior_of(&self, t: usize, state: &S) -> Option<f64> {
        let i = self.states.iter().position(|s| s == state)?;
        self.posterior.get((t, i)).copied()
    }

    /// $\ln P(Y|θ)$
    pub fn log_probability(&self) -> f64 {
        self.log_probability
    }

    /// $P(Y|θ)$, which may underflow to zero for long sequences
    pub fn probability(&self) -> f64 {
        self.log_probability.exp()
    }

    /// The most likely state at each point in time, one per observation.
    ///
    /// Taking the most likely state at each point in time doesn't necessarily result in the most
    /// likely sequence of states, or even a possible sequence of states. If you want that, use
    /// `viterbi`.
    pub fn most_likely_states(&self) -> Vec<S> {
        self.posterior
            .outer_iter()
            .skip(1)
            .filter_map(|row| row.maxf())
            .map(|(i, _)| self.states[i].clone())
            .collect()
    }

    fn outcomes(&self, matrix: &Array2<f64>, t: usize) -> Option<Vec<WeightedOutcome<S>>> {
        if t >= matrix.nrows() {
            return None;
        }
        Some(
            self.states
                .iter()
                .zip(matrix.row(t))
                .map(|(state, &p)| WeightedOutcome::new(state.clone(), p))
                .collect(),
        )
    }
}

/// Given a sequence of observations, compute the probability of being in any given state at
/// each point in time. This is the forward-backward algorithm.
///
/// Fails with `EmptySequence` if there are no observations and with `ImpossibleObservations` if
/// the model cannot produce them.
pub fn forward_backward<S: Label, O: Label>(
    model: &HiddenMarkovModel<S, O>,
    observations: &[O],
) -> Result<ForwardBackward<S>> {
    forward_backward_with(model, observations, ForwardBackwardOptions::default())
}

pub fn forward_backward_with<S: Label, O: Label>(
    model: &HiddenMarkovModel<S, O>,
    observations: &[O],
    options: ForwardBackwardOptions,
) -> Result<ForwardBackward<S>> {
    if observations.is_empty() {
        return Err(HmmError::EmptySequence);
    }
    let Matrices { states, pi, a } = model.matrices()?;
    trace!(
        "forward-backward over {} observations and {} states",
        observations.len(),
        states.len()
    );
    let b = model.emission_matrix(&states, observations)?;

    let (forward, log_probability) =
        forward_pass(pi.view(), a.view(), b.view(), options.normalize)?;
    let backward = backward_pass(a.view(), b.view(), options.normalize);
    let posterior = smooth(&forward, &backward)?;

    Ok(ForwardBackward {
        states,
        forward,
        backward,
        posterior,
        log_probability,
    })
}

/// $P(Y|θ)$, summed over the last row of the unscaled forward matrix. Impossible observations
/// have probability zero.
pub fn probability_of_observations<S: Label, O: Label>(
    model: &HiddenMarkovModel<S, O>,
    observations: &[O],
) -> Result<f64> {
    if observations.is_empty() {
        return Err(HmmError::EmptySequence);
    }
    let Matrices { states, pi, a } = model.matrices()?;
    let b = model.emission_matrix(&states, observations)?;
    let (forward, _) = forward_pass(pi.view(), a.view(), b.view(), false)?;
    Ok(forward.row(observations.len()).sum())
}

/// $\ln P(Y|θ)$, computed with rescaling so that it stays finite for long sequences. Impossible
/// observations have log-likelihood `-inf`, the log of what `probability_of_observations` returns.
pub fn log_likelihood<S: Label, O: Label>(
    model: &HiddenMarkovModel<S, O>,
    observations: &[O],
) -> Result<f64> {
    if observations.is_empty() {
        return Err(HmmError::EmptySequence);
    }
    let Matrices { states, pi, a } = model.matrices()?;
    let b = model.emission_matrix(&states, observations)?;
    match forward_pass(pi.view(), a.view(), b.view(), true) {
        Ok((_, log_probability)) => Ok(log_probability),
        Err(HmmError::ImpossibleObservations { .. }) => Ok(f64::NEG_INFINITY),
        Err(err) => Err(err),
    }
}

/// $\sum \ln P(Y|θ)$ over independent sequences. An empty corpus has log-likelihood 0.
pub fn corpus_log_likelihood<S: Label, O: Label, Q: AsRef<[O]>>(
    model: &HiddenMarkovModel<S, O>,
    corpus: &[Q],
) -> Result<f64> {
    corpus
        .iter()
        .map(|observations| log_likelihood(model, observations.as_ref()))
        .sum()
}

/// $\prod P(Y|θ)$ over independent sequences. This underflows quickly; prefer
/// `corpus_log_likelihood`.
pub fn corpus_likelihood<S: Label, O: Label, Q: AsRef<[O]>>(
    model: &HiddenMarkovModel<S, O>,
    corpus: &[Q],
) -> Result<f64> {
    corpus
        .iter()
        .map(|observations| probability_of_observations(model, observations.as_ref()))
        .product()
}

/// Given an iterator of observations, this returns a new iterator that yields the probability
/// of being in each hidden state at each time step, in the order of `Filter::states`. This is
/// relatively efficient from the standpoint of memory and computation time.
///
/// If you can store the whole sequence in memory, `forward_backward` is more accurate, because it
/// also uses the observations from the future to inform the probability of being in each hidden
/// state at any particular time.
///
/// This is not closely related to the meaning of "filter" as in `std::iter::Iterator::filter`.
pub fn filter<S, O, I>(
    model: &HiddenMarkovModel<S, O>,
    observations: I,
) -> Result<Filter<'_, S, O, I::IntoIter>>
where
    S: Label,
    O: Label,
    I: IntoIterator<Item = O>,
{
    let Matrices { states, pi, a } = model.matrices()?;
    Ok(Filter {
        model,
        states,
        pi,
        a,
        observations: observations.into_iter(),
        current: None,
        time: 0,
    })
}

/// This is an iterator returned by `filter`.
pub struct Filter<'a, S, O, I> {
    model: &'a HiddenMarkovModel<S, O>,
    states: Vec<S>,
    pi: Array1<f64>,
    a: Array2<f64>,
    observations: I,
    current: Option<Array1<f64>>,
    time: usize,
}

impl<'a, S: Label, O: Label, I> Filter<'a, S, O, I> {
    pub fn states(&self) -> &[S] {
        &self.states
    }

    fn step(&mut self, observation: &O) -> Result<Array1<f64>> {
        let observation_probs = self.model.emission_column(&self.states, observation)?;
        let transition_probs = match &self.current {
            Some(p_states) => p_states.dot(&self.a),
            None => self.pi.clone(),
        };
        let mut p_states = observation_probs * transition_probs;
        if !(p_states.nip() > 0.0) {
            return Err(HmmError::ImpossibleObservations { time: self.time });
        }
        self.current = Some(p_states.clone());
        Ok(p_states)
    }
}

impl<'a, S, O, I> Iterator for Filter<'a, S, O, I>
where
    S: Label,
    O: Label,
    I: Iterator<Item = O>,
{
    type Item = Result<Array1<f64>>;

    fn next(&mut self) -> Option<Self::Item> {
        let observation = self.observations.next()?;
        self.time += 1;
        Some(self.step(&observation))
    }
}
