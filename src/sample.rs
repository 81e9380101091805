//! Weighted random choice and the generation of synthetic sequences from a model.
use crate::error::{HmmError, Result};
use crate::model::HiddenMarkovModel;
use crate::table::ConditionalProbabilityTable;
use crate::{Label, TOLERANCE};
use itertools::Itertools;
use rand::distributions::Distribution;
use rand::Rng;
#[cfg(feature = "serde-1")]
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A label together with its probability. Lists of outcomes are not required to be normalized;
/// see [`WeightedOutcome::normalize_all`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-1", derive(Serialize, Deserialize))]
pub struct WeightedOutcome<L> {
    pub label: L,
    pub probability: f64,
}

impl<L> WeightedOutcome<L> {
    pub fn new(label: L, probability: f64) -> Self {
        Self { label, probability }
    }
}

impl<L: Clone> WeightedOutcome<L> {
    /// Scale the outcomes so that their probabilities sum to 1. Outcomes that sum to zero are
    /// returned unchanged.
    pub fn normalize_all(outcomes: &[WeightedOutcome<L>]) -> Vec<WeightedOutcome<L>> {
        let total: f64 = outcomes.iter().map(|outcome| outcome.probability).sum();
        outcomes
            .iter()
            .map(|outcome| WeightedOutcome {
                label: outcome.label.clone(),
                probability: if total > 0.0 {
                    outcome.probability / total
                } else {
                    outcome.probability
                },
            })
            .collect()
    }
}

impl<L> From<(L, f64)> for WeightedOutcome<L> {
    fn from((label, probability): (L, f64)) -> Self {
        Self::new(label, probability)
    }
}

/// Sample from a [categorical distribution](https://en.wikipedia.org/wiki/Categorical_distribution)
/// over labels.
///
/// The outcomes are sorted by ascending probability and turned into a cumulative mass function.
/// A uniform draw $u \in [0, 1)$ selects the first outcome whose cumulative probability exceeds
/// $u$. Outcomes with equal probability keep their original order.
#[derive(Clone, Debug)]
pub struct WeightedChoice<L> {
    // Never empty
    cmf: Vec<(L, f64)>,
}

impl<L: Clone> WeightedChoice<L> {
    /// Fails with `MalformedDistribution` if there are no outcomes, if a probability is negative
    /// or if the probabilities don't sum to 1.
    pub fn new(outcomes: &[WeightedOutcome<L>]) -> Result<Self> {
        if outcomes.is_empty() {
            return Err(HmmError::malformed("there are no outcomes to choose from"));
        }
        if let Some(negative) = outcomes.iter().find(|outcome| !(outcome.probability >= 0.0)) {
            return Err(HmmError::malformed(format!(
                "probability {} is not a valid probability",
                negative.probability
            )));
        }

        let cmf = outcomes
            .iter()
            .sorted_by(|a, b| a.probability.total_cmp(&b.probability))
            .scan(0.0, |total, outcome| {
                *total += outcome.probability;
                Some((outcome.label.clone(), *total))
            })
            .collect_vec();

        let total = cmf.last().map_or(0.0, |&(_, p)| p);
        if (total - 1.0).abs() > TOLERANCE {
            return Err(HmmError::malformed(format!(
                "probabilities have to sum up to 1.0 but sum up to {}",
                total
            )));
        }
        Ok(Self { cmf })
    }

    /// Select the outcome at `draw`, which has to be in $[0, 1)$.
    pub fn select(&self, draw: f64) -> Result<&L> {
        if !(0.0..1.0).contains(&draw) {
            return Err(HmmError::malformed(format!(
                "draw {} is outside of [0, 1)",
                draw
            )));
        }
        Ok(self.select_unchecked(draw))
    }

    fn select_unchecked(&self, draw: f64) -> &L {
        // The total may fall short of 1.0 by up to TOLERANCE, the most likely outcome covers that.
        let i = self
            .cmf
            .iter()
            .position(|&(_, p)| draw < p)
            .unwrap_or(self.cmf.len() - 1);
        &self.cmf[i].0
    }
}

impl<L: Clone> Distribution<L> for WeightedChoice<L> {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> L {
        self.select_unchecked(rng.gen::<f64>()).clone()
    }
}

/// Pick one of `outcomes` given a uniform `draw` from $[0, 1)$.
pub fn sample_weighted<L: Clone>(outcomes: &[WeightedOutcome<L>], draw: f64) -> Result<L> {
    WeightedChoice::new(outcomes)?.select(draw).cloned()
}

/// The item yielded by `Sampler`
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde-1", derive(Serialize, Deserialize))]
pub struct Sample<S, O> {
    pub state: S,
    pub observation: O,
}

/// An iterator that returns random samples from an HMM. It never ends on its own; use
/// `Iterator::take`.
pub struct Sampler<'a, S, O, R: Rng + ?Sized> {
    initial: WeightedChoice<S>,
    transitions: HashMap<S, WeightedChoice<S>>,
    emissions: HashMap<S, WeightedChoice<O>>,
    rng: &'a mut R,
    current_state: Option<S>,
}

impl<'a, S: Label, O: Label, R: Rng + ?Sized> Sampler<'a, S, O, R> {
    /// Every state the walk can reach must have a valid transition and emission distribution.
    pub(crate) fn new(model: &HiddenMarkovModel<S, O>, rng: &'a mut R) -> Result<Self> {
        let initial = WeightedChoice::new(&model.initial_outcomes())?;
        let reachable = model
            .initial_outcomes()
            .into_iter()
            .map(|outcome| outcome.label)
            .chain(model.state_transitions().targets().iter().cloned())
            .unique()
            .collect_vec();

        let mut transitions = HashMap::new();
        let mut emissions = HashMap::new();
        for state in reachable {
            let transition =
                WeightedChoice::new(&model.state_transitions().outcomes_given(&state)?)?;
            let emission =
                WeightedChoice::new(&model.observation_probabilities().outcomes_given(&state)?)?;
            transitions.insert(state.clone(), transition);
            emissions.insert(state, emission);
        }

        Ok(Self {
            initial,
            transitions,
            emissions,
            rng,
            current_state: None,
        })
    }
}

impl<'a, S: Label, O: Label, R: Rng + ?Sized> Iterator for Sampler<'a, S, O, R> {
    type Item = Sample<S, O>;

    fn next(&mut self) -> Option<Self::Item> {
        let state = if let Some(current_state) = &self.current_state {
            self.transitions.get(current_state)?.sample(self.rng)
        } else {
            self.initial.sample(self.rng)
        };
        let observation = self.emissions.get(&state)?.sample(self.rng);
        self.current_state = Some(state.clone());
        Some(Sample { state, observation })
    }
}

/// Walk the model for `length` steps, recording every state and what it emitted.
pub fn generate_sequence<S: Label, O: Label, R: Rng + ?Sized>(
    model: &HiddenMarkovModel<S, O>,
    rng: &mut R,
    length: usize,
) -> Result<Vec<Sample<S, O>>> {
    Ok(model.sampler(rng)?.take(length).collect())
}

/// Like `generate_sequence`, but only keeps what can be observed.
pub fn generate_observations<S: Label, O: Label, R: Rng + ?Sized>(
    model: &HiddenMarkovModel<S, O>,
    rng: &mut R,
    length: usize,
) -> Result<Vec<O>> {
    Ok(model
        .sampler(rng)?
        .take(length)
        .map(|sample| sample.observation)
        .collect())
}

/// Generate a plain Markov chain of `length` states: the first state is drawn from `initial`, each
/// following one from the row of its predecessor in `transitions`.
pub fn generate_state_sequence<S: Label, R: Rng + ?Sized>(
    initial: &[WeightedOutcome<S>],
    transitions: &ConditionalProbabilityTable<S, S>,
    rng: &mut R,
    length: usize,
) -> Result<Vec<S>> {
    if length == 0 {
        return Ok(Vec::new());
    }
    let choices = transitions
        .sources()
        .map(|source| {
            let choice = WeightedChoice::new(&transitions.outcomes_given(source)?)?;
            Ok((source.clone(), choice))
        })
        .collect::<Result<HashMap<_, _>>>()?;

    let mut state = WeightedChoice::new(initial)?.sample(rng);
    let mut states = Vec::with_capacity(length);
    for _ in 1..length {
        let next = choices
            .get(&state)
            .ok_or_else(|| HmmError::unknown_label(&state))?
            .sample(rng);
        states.push(std::mem::replace(&mut state, next));
    }
    states.push(state);
    Ok(states)
}
