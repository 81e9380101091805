//! Models shared by the unit tests. Most of them come from well known textbook examples so that
//! the expected numbers can be checked against the literature.
use crate::*;
use lazy_static::lazy_static;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Weather {
    Sunny,
    Rainy,
    Foggy,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Caretaker {
    Umbrella,
    NoUmbrella,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Coin {
    Fair,
    UnFair,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Toss {
    Heads,
    Tails,
}

/// Create a fast RNG with reproducible outputs
pub fn new_rng() -> StdRng {
    StdRng::seed_from_u64(1337)
}

pub fn uniform<L: Label>(labels: &[L]) -> Vec<WeightedOutcome<L>> {
    labels
        .iter()
        .map(|label| WeightedOutcome::new(label.clone(), 1.0 / labels.len() as f64))
        .collect()
}

lazy_static! {
    pub static ref WEATHER: ConditionalProbabilityTable<Weather, Weather> = {
        use Weather::*;
        ConditionalProbabilityTable::builder()
            .add(Sunny, Sunny, 0.8)
            .add(Sunny, Rainy, 0.05)
            .add(Sunny, Foggy, 0.15)
            .add(Rainy, Sunny, 0.1)
            .add(Rainy, Rainy, 0.6)
            .add(Rainy, Foggy, 0.2)
            .add(Foggy, Sunny, 0.2)
            .add(Foggy, Rainy, 0.3)
            .add(Foggy, Foggy, 0.5)
            .build()
    };
}

/// The weather is hidden, whether the caretaker carries an umbrella is observed.
lazy_static! {
    pub static ref UMBRELLA_HMM: HiddenMarkovModel<Weather, Caretaker> = {
        use Caretaker::*;
        use Weather::*;
        let caretaker = ConditionalProbabilityTable::builder()
            .add(Sunny, Umbrella, 0.1)
            .add(Sunny, NoUmbrella, 0.9)
            .add(Rainy, Umbrella, 0.8)
            .add(Rainy, NoUmbrella, 0.2)
            .add(Foggy, Umbrella, 0.3)
            .add(Foggy, NoUmbrella, 0.7)
            .build();
        HiddenMarkovModel::new(uniform(&[Sunny, Rainy, Foggy]), WEATHER.clone(), caretaker)
            .unwrap()
    };
}

/// A fair and an unfair coin that are swapped with probability 0.1.
lazy_static! {
    pub static ref COIN_HMM: HiddenMarkovModel<Coin, Toss> = {
        use Coin::*;
        use Toss::*;
        let coins = ConditionalProbabilityTable::builder()
            .add(Fair, UnFair, 0.1)
            .add(Fair, Fair, 0.9)
            .add(UnFair, Fair, 0.1)
            .add(UnFair, UnFair, 0.9)
            .build();
        let tosses = ConditionalProbabilityTable::builder()
            .add(Fair, Heads, 0.5)
            .add(Fair, Tails, 0.5)
            .add(UnFair, Heads, 0.6)
            .add(UnFair, Tails, 0.4)
            .build();
        HiddenMarkovModel::new(uniform(&[Fair, UnFair]), coins, tosses).unwrap()
    };
}

/// The umbrella world of the Wikipedia article on the forward-backward algorithm.
lazy_static! {
    pub static ref RAIN_HMM: HiddenMarkovModel<&'static str, &'static str> = {
        let transitions = ConditionalProbabilityTable::builder()
            .add("Rain", "Rain", 0.7)
            .add("Rain", "No Rain", 0.3)
            .add("No Rain", "Rain", 0.3)
            .add("No Rain", "No Rain", 0.7)
            .build();
        let emissions = ConditionalProbabilityTable::builder()
            .add("Rain", "umbrella", 0.9)
            .add("Rain", "no umbrella", 0.1)
            .add("No Rain", "umbrella", 0.2)
            .add("No Rain", "no umbrella", 0.8)
            .build();
        HiddenMarkovModel::new(uniform(&["Rain", "No Rain"]), transitions, emissions).unwrap()
    };
}

/// The starting point of the Baum-Welch example on Wikipedia.
lazy_static! {
    pub static ref ST_MODEL: HiddenMarkovModel<&'static str, &'static str> = {
        let transitions = ConditionalProbabilityTable::builder()
            .add("s", "s", 0.3)
            .add("s", "t", 0.7)
            .add("t", "s", 0.1)
            .add("t", "t", 0.9)
            .build();
        let emissions = ConditionalProbabilityTable::builder()
            .add("s", "A", 0.4)
            .add("s", "B", 0.6)
            .add("t", "A", 0.5)
            .add("t", "B", 0.5)
            .build();
        HiddenMarkovModel::new(
            vec![WeightedOutcome::new("s", 0.85), WeightedOutcome::new("t", 0.15)],
            transitions,
            emissions,
        )
        .unwrap()
    };
}

/// 10 times ABBA and 20 times BAB
pub fn st_corpus() -> Vec<Vec<&'static str>> {
    let mut corpus = vec![vec!["A", "B", "B", "A"]; 10];
    corpus.extend(vec![vec!["B", "A", "B"]; 20]);
    corpus
}

/// The example of the `hidden_markov` Python package.
lazy_static! {
    pub static ref AB_HMM: HiddenMarkovModel<&'static str, &'static str> = {
        let transitions = ConditionalProbabilityTable::builder()
            .add("s", "s", 0.6)
            .add("s", "t", 0.4)
            .add("t", "s", 0.3)
            .add("t", "t", 0.7)
            .build();
        let emissions = ConditionalProbabilityTable::builder()
            .add("s", "A", 0.3)
            .add("s", "B", 0.7)
            .add("t", "A", 0.4)
            .add("t", "B", 0.6)
            .build();
        HiddenMarkovModel::new(uniform(&["s", "t"]), transitions, emissions).unwrap()
    };
}

/// Build a model over `usize` labels from raw, possibly unnormalized weights.
pub fn dense_model(
    initial: &[f64],
    transitions: &[f64],
    emissions: &[f64],
) -> HiddenMarkovModel<usize, usize> {
    let n = initial.len();
    let k = emissions.len() / n;
    let initial = initial
        .iter()
        .enumerate()
        .map(|(i, &p)| WeightedOutcome::new(i, p))
        .collect::<Vec<_>>();
    let transitions = (0..n)
        .flat_map(|i| (0..n).map(move |j| (i, j)))
        .map(|(i, j)| (i, j, transitions[i * n + j]))
        .collect::<ConditionalProbabilityTable<_, _>>()
        .normalized();
    let emissions = (0..n)
        .flat_map(|i| (0..k).map(move |o| (i, o)))
        .map(|(i, o)| (i, o, emissions[i * k + o]))
        .collect::<ConditionalProbabilityTable<_, _>>()
        .normalized();
    HiddenMarkovModel::new(WeightedOutcome::normalize_all(&initial), transitions, emissions)
        .unwrap()
}

lazy_static! {
    /// Hand-checkable: state 1 can't start, state 0 only emits 0 and state 2 only emits 1.
    pub static ref FANCY_HMM: HiddenMarkovModel<usize, usize> = dense_model(
        &[0.5, 0.0, 0.5],
        &[0.25, 0.25, 0.5, 0.5, 0.25, 0.25, 0.25, 0.5, 0.25],
        &[1.0, 0.0, 0.5, 0.5, 0.0, 1.0],
    );
}

lazy_static! {
    pub static ref COOL_HMM: HiddenMarkovModel<usize, usize> = dense_model(
        &[0.5, 0.5],
        &[0.25, 0.75, 0.5, 0.5],
        &[0.5, 0.5, 0.75, 0.25],
    );
}

lazy_static! {
    /// Alternates between its two states and always reveals which one it is in.
    pub static ref PERIODIC_HMM: HiddenMarkovModel<usize, usize> = dense_model(
        &[1.0, 0.0],
        &[0.0, 1.0, 1.0, 0.0],
        &[0.0, 1.0, 1.0, 0.0],
    );
}

/// Small dense models with strictly positive parameters, together with a corpus of up to
/// `max_sequences` sequences of up to `max_len` observations each.
pub fn arbitrary_model_and_corpus(
    max_len: usize,
    max_sequences: usize,
) -> impl Strategy<Value = (HiddenMarkovModel<usize, usize>, Vec<Vec<usize>>)> {
    (1usize..4, 1usize..4)
        .prop_flat_map(move |(n, k)| {
            (
                prop::collection::vec(0.05f64..1.0, n),
                prop::collection::vec(0.05f64..1.0, n * n),
                prop::collection::vec(0.05f64..1.0, n * k),
                prop::collection::vec(
                    prop::collection::vec(0..k, 1..=max_len),
                    1..=max_sequences,
                ),
            )
        })
        .prop_map(|(initial, transitions, emissions, corpus)| {
            (dense_model(&initial, &transitions, &emissions), corpus)
        })
}
