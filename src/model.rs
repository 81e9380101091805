use crate::error::{HmmError, Result};
use crate::sample::{Sampler, WeightedOutcome};
use crate::table::{ConditionalProbabilityTable, Row};
use crate::Label;
use itertools::Itertools;
use ndarray::prelude::*;
use rand::Rng;

/// This struct represents an HMM over arbitrary state labels `S` and observation labels `O`.
///
/// # Math
///
/// The HMM is used to predict a sequence of observations $Y=(y_0, \ldots, y_{T-1})$ with the
/// help of hidden states $X=(x_0, \ldots, x_{T-1})$. It has three parameters:
/// * $π$, the initial state distribution: $π_i=P(X_0=i)$
/// * $A$, the state transitions: $a_{ij}=P(X_t=j|X_{t-1}=i)$
/// * $B$, the emissions: $b_i(o)=P(Y_t=o|X_t=i)$
///
/// The states of the model are the sources of the transition table, in the order they were first
/// added. Every algorithm in this crate looks the parameters up strictly: a missing entry fails
/// with `UnknownLabel` instead of counting as probability zero.
#[derive(Clone, Debug)]
pub struct HiddenMarkovModel<S, O> {
    initial: Row<S>,
    transitions: ConditionalProbabilityTable<S, S>,
    emissions: ConditionalProbabilityTable<S, O>,
}

/// The dense form of $π$ and $A$, indexed by the position of a state in `states`.
#[derive(Clone, Debug)]
pub(crate) struct Matrices<S> {
    pub states: Vec<S>,
    pub pi: Array1<f64>,
    pub a: Array2<f64>,
}

impl<S: Label, O: Label> HiddenMarkovModel<S, O> {
    /// Create a new HMM with the given parameters. The tables are taken as they are; use
    /// `ConditionalProbabilityTable::normalized` beforehand if they might not sum to 1.
    ///
    /// Fails with `MalformedDistribution` if a state appears twice in `initial`.
    pub fn new(
        initial: Vec<WeightedOutcome<S>>,
        transitions: ConditionalProbabilityTable<S, S>,
        emissions: ConditionalProbabilityTable<S, O>,
    ) -> Result<Self> {
        let mut row = Row::new();
        for outcome in initial {
            if row.contains(&outcome.label) {
                return Err(HmmError::malformed(format!(
                    "state {:?} appears twice in the initial distribution",
                    outcome.label
                )));
            }
            row.set(outcome.label, outcome.probability);
        }
        Ok(Self {
            initial: row,
            transitions,
            emissions,
        })
    }

    pub fn starting_probability_of(&self, state: &S) -> Result<f64> {
        self.initial.probability_of(state)
    }

    /// $π$ as a list of outcomes, in the order it was given
    pub fn initial_outcomes(&self) -> Vec<WeightedOutcome<S>> {
        self.initial.to_outcomes()
    }

    pub fn state_transitions(&self) -> &ConditionalProbabilityTable<S, S> {
        &self.transitions
    }

    pub fn observation_probabilities(&self) -> &ConditionalProbabilityTable<S, O> {
        &self.emissions
    }

    /// $N$, the number of states in this HMM
    pub fn n(&self) -> usize {
        self.transitions.len()
    }

    pub fn states(&self) -> impl Iterator<Item = &S> + '_ {
        self.transitions.sources()
    }

    /// Everything that this model can emit
    pub fn observations(&self) -> &[O] {
        self.emissions.targets()
    }

    /// The product of the emission probabilities of each `(state, observation)` pair. Transitions
    /// are not taken into account.
    pub fn likelihood_of(&self, pairs: &[(S, O)]) -> Result<f64> {
        pairs
            .iter()
            .map(|(state, observation)| self.emissions.probability(state, observation))
            .product()
    }

    /// The probability that the model walks through `states` and emits `observations` on the
    /// way. This is not a typical use case, because often the hidden states are not available.
    ///
    /// Fails with `LengthMismatch` if the sequences have different lengths. Empty sequences have
    /// likelihood 1.
    pub fn joint_likelihood(&self, states: &[S], observations: &[O]) -> Result<f64> {
        Ok(self.joint_log_likelihood(states, observations)?.exp())
    }

    /// The natural logarithm of `joint_likelihood`. Impossible sequences yield $-∞$.
    pub fn joint_log_likelihood(&self, states: &[S], observations: &[O]) -> Result<f64> {
        if states.len() != observations.len() {
            return Err(HmmError::LengthMismatch {
                states: states.len(),
                observations: observations.len(),
            });
        }

        // This special case is required b/c we treat the first time step specially
        let first = match states.first() {
            Some(first) => first,
            None => return Ok(0.0),
        };

        let initial_log_prob = self.starting_probability_of(first)?.ln();
        let transitions_log_prob = self.transitions.sequence_log_likelihood(states)?;
        let emissions_log_prob = states
            .iter()
            .zip(observations)
            .map(|(state, observation)| {
                self.emissions
                    .probability(state, observation)
                    .map(f64::ln)
            })
            .sum::<Result<f64>>()?;

        Ok(initial_log_prob + transitions_log_prob + emissions_log_prob)
    }

    /// Given a distribution over states, calculate the distribution over states `n_time_steps`
    /// into the future. States that `distribution` leaves out start with probability zero.
    ///
    /// This is only efficient for small values of `n_time_steps`.
    pub fn predict(
        &self,
        distribution: &[WeightedOutcome<S>],
        n_time_steps: usize,
    ) -> Result<Vec<WeightedOutcome<S>>> {
        let Matrices { states, a, .. } = self.matrices()?;
        let mut p_states = Array1::<f64>::zeros(states.len());
        for outcome in distribution {
            let i = states
                .iter()
                .position(|state| state == &outcome.label)
                .ok_or_else(|| HmmError::unknown_label(&outcome.label))?;
            p_states[i] += outcome.probability;
        }
        for _ in 0..n_time_steps {
            p_states = p_states.dot(&a);
        }
        Ok(states
            .into_iter()
            .zip(p_states.iter())
            .map(|(state, &p)| WeightedOutcome::new(state, p))
            .collect())
    }

    /// An endless iterator of random samples from this HMM.
    ///
    /// Fails with `MalformedDistribution` if $π$, or the transition or emission row of a state
    /// that can be reached, does not sum to 1.
    pub fn sampler<'a, R: Rng + ?Sized>(&self, rng: &'a mut R) -> Result<Sampler<'a, S, O, R>> {
        Sampler::new(self, rng)
    }

    /// Build $π$ and $A$ over `self.states()`.
    pub(crate) fn matrices(&self) -> Result<Matrices<S>> {
        let states = self.states().cloned().collect_vec();
        let n = states.len();
        let mut pi = Array1::<f64>::zeros(n);
        let mut a = Array2::<f64>::zeros((n, n));
        for (i, source) in states.iter().enumerate() {
            pi[i] = self.starting_probability_of(source)?;
            let row = self.transitions.given(source)?;
            for (j, target) in states.iter().enumerate() {
                a[(i, j)] = row.probability_of(target)?;
            }
        }
        Ok(Matrices { states, pi, a })
    }

    /// $b_i(o)$ for every state $i$ in `states`
    pub(crate) fn emission_column(&self, states: &[S], observation: &O) -> Result<Array1<f64>> {
        let mut column = Array1::<f64>::zeros(states.len());
        for (i, state) in states.iter().enumerate() {
            column[i] = self.emissions.probability(state, observation)?;
        }
        Ok(column)
    }

    /// A $T × N$ matrix where row $t$ holds $b_i(y_t)$ for every state $i$ in `states`.
    pub(crate) fn emission_matrix(&self, states: &[S], observations: &[O]) -> Result<Array2<f64>> {
        let mut b = Array2::<f64>::zeros((observations.len(), states.len()));
        for (t, observation) in observations.iter().enumerate() {
            b.row_mut(t)
                .assign(&self.emission_column(states, observation)?);
        }
        Ok(b)
    }
}

/// Models are equal if they hold the same probabilities, in whatever order.
impl<S: Label, O: Label> PartialEq for HiddenMarkovModel<S, O> {
    fn eq(&self, other: &Self) -> bool {
        self.initial == other.initial
            && self.transitions == other.transitions
            && self.emissions == other.emissions
    }
}
