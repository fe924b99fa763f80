//! Genetic search: single-objective generational GA.
//!
//! Individuals are six sorted distinct reds. Each generation keeps the elite
//! fraction, then breeds the rest through roulette-wheel selection,
//! single-point crossover (with de-duplication repair) and replacement
//! mutation whose rate decays linearly across generations when
//! `adaptive_mutation` is on.

use rand::prelude::*;

use super::objectives::{self, FitnessContext};
use super::{
    finish, random_reds, repair, replace_one, uniform_blue, Outcome, Strategy, StrategyError,
    StrategyKind,
};
use crate::constraint::{self, ConstraintSpec};
use crate::domain::{Candidate, HistoricalDraw, RED_COUNT};
use crate::params::StrategyParams;

/// Weights of the scalar fitness terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitnessWeights {
    pub history_match: f64,
    pub trend: f64,
    pub odd_even: f64,
    pub zone: f64,
    pub sum: f64,
}

/// Penalty per adjacent pair.
const ADJACENCY_PENALTY: f64 = 0.25;

/// Shared evolutionary knobs for the GA and NSGA-II searches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evolution {
    pub population_size: usize,
    pub generations: usize,
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    pub elite_count: usize,
    pub adaptive_mutation: bool,
}

impl Evolution {
    pub(crate) fn from_params(
        params: &StrategyParams,
        min_elite: usize,
    ) -> Result<Self, StrategyError> {
        let population_size = params.usize("population_size")?;
        let generations = params.usize("generations")?;
        if population_size < 4 {
            return Err(StrategyError::invalid("population_size", "must be at least 4"));
        }
        if generations == 0 {
            return Err(StrategyError::invalid("generations", "must be at least 1"));
        }
        let elite_rate = params.probability("elite_rate")?;
        let elite_count = ((population_size as f64 * elite_rate) as usize)
            .max(min_elite)
            .min(population_size);
        Ok(Self {
            population_size,
            generations,
            crossover_rate: params.probability("crossover_rate")?,
            mutation_rate: params.probability("mutation_rate")?,
            elite_count,
            adaptive_mutation: params.bool("adaptive_mutation")?,
        })
    }

    /// Mutation rate for generation `gen`.
    pub fn mutation_rate_at(&self, gen: usize) -> f64 {
        if self.adaptive_mutation {
            self.mutation_rate * (1.0 - gen as f64 / self.generations as f64)
        } else {
            self.mutation_rate
        }
    }
}

pub(crate) fn initial_population<R: Rng + ?Sized>(size: usize, rng: &mut R) -> Vec<Vec<u8>> {
    (0..size).map(|_| random_reds(rng)).collect()
}

/// Single-point crossover at a cut in `1..=5`, both children repaired.
pub(crate) fn crossover<R: Rng + ?Sized>(p1: &[u8], p2: &[u8], rng: &mut R) -> (Vec<u8>, Vec<u8>) {
    let point = rng.gen_range(1..RED_COUNT);
    let c1: Vec<u8> = p1[..point].iter().chain(&p2[point..]).copied().collect();
    let c2: Vec<u8> = p2[..point].iter().chain(&p1[point..]).copied().collect();
    (repair(c1, rng), repair(c2, rng))
}

/// Replace one or two positions with fresh values.
pub(crate) fn mutate<R: Rng + ?Sized>(individual: &mut Vec<u8>, rng: &mut R) {
    for _ in 0..rng.gen_range(1..=2) {
        replace_one(individual, rng);
    }
}

/// Best individual seen so far, overall and among those passing the policy.
#[derive(Debug, Clone, Default)]
pub(crate) struct Champions {
    pub overall: Option<(Vec<u8>, f64)>,
    pub constrained: Option<(Vec<u8>, f64)>,
}

impl Champions {
    pub fn offer(&mut self, reds: &[u8], score: f64, spec: &ConstraintSpec) {
        if self.overall.as_ref().map_or(true, |(_, s)| score > *s) {
            self.overall = Some((reds.to_vec(), score));
        }
        if constraint::accepts(reds, spec)
            && self.constrained.as_ref().map_or(true, |(_, s)| score > *s)
        {
            self.constrained = Some((reds.to_vec(), score));
        }
    }

    /// Constrained champion if any, else the overall one flagged unsatisfied.
    pub fn into_outcome<R: Rng + ?Sized>(self, attempts: usize, rng: &mut R) -> (Outcome, f64) {
        match (self.constrained, self.overall) {
            (Some((reds, score)), _) => (
                Outcome {
                    reds,
                    satisfied: true,
                    attempts,
                },
                score,
            ),
            (None, Some((reds, score))) => (
                Outcome {
                    reds,
                    satisfied: false,
                    attempts,
                },
                score,
            ),
            (None, None) => (
                Outcome {
                    reds: random_reds(rng),
                    satisfied: false,
                    attempts,
                },
                0.0,
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneticSearch {
    spec: ConstraintSpec,
    evolution: Evolution,
    weights: FitnessWeights,
    context: FitnessContext,
    params: StrategyParams,
}

impl GeneticSearch {
    /// Scalar fitness clamped to `[0.01, 1]`.
    pub fn fitness(&self, reds: &[u8]) -> f64 {
        let w = &self.weights;
        let score = w.history_match * self.context.overlap(reds)
            + w.trend * self.context.trend_agreement(reds)
            + w.odd_even * objectives::odd_even_balance(reds)
            + w.zone * objectives::zone_spread(reds)
            + w.sum * self.context.sum_fitness(reds)
            - ADJACENCY_PENALTY * objectives::adjacency(reds);
        score.clamp(0.01, 1.0)
    }

    fn roulette<'a, R: Rng + ?Sized>(
        population: &'a [Vec<u8>],
        fitness: &[f64],
        rng: &mut R,
    ) -> &'a [u8] {
        let total: f64 = fitness.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            return &population[rng.gen_range(0..population.len())];
        }
        let pick = rng.gen_range(0.0..total);
        let mut acc = 0.0;
        for (ind, &f) in population.iter().zip(fitness) {
            acc += f;
            if acc >= pick {
                return ind;
            }
        }
        &population[population.len() - 1]
    }

    fn evolve<R: Rng + ?Sized>(&self, rng: &mut R) -> Champions {
        let evo = &self.evolution;
        let mut population = initial_population(evo.population_size, rng);
        let mut champions = Champions::default();

        for gen in 0..evo.generations {
            let fitness: Vec<f64> = population.iter().map(|ind| self.fitness(ind)).collect();
            for (ind, &f) in population.iter().zip(&fitness) {
                champions.offer(ind, f, &self.spec);
            }

            let mut order: Vec<usize> = (0..population.len()).collect();
            order.sort_by(|&a, &b| {
                fitness[b]
                    .partial_cmp(&fitness[a])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let mut next: Vec<Vec<u8>> = order
                .iter()
                .take(evo.elite_count)
                .map(|&i| population[i].clone())
                .collect();

            let rate = evo.mutation_rate_at(gen);
            while next.len() < evo.population_size {
                let p1 = Self::roulette(&population, &fitness, rng);
                let p2 = Self::roulette(&population, &fitness, rng);
                let (mut c1, mut c2) = if rng.gen::<f64>() < evo.crossover_rate {
                    crossover(p1, p2, rng)
                } else {
                    (p1.to_vec(), p2.to_vec())
                };
                if rng.gen::<f64>() < rate {
                    mutate(&mut c1, rng);
                }
                if rng.gen::<f64>() < rate {
                    mutate(&mut c2, rng);
                }
                next.push(c1);
                next.push(c2);
            }
            next.truncate(evo.population_size);
            population = next;
        }

        for ind in &population {
            champions.offer(ind, self.fitness(ind), &self.spec);
        }
        champions
    }
}

impl Strategy for GeneticSearch {
    fn code(&self) -> &'static str {
        Self::CODE
    }

    fn label(&self) -> String {
        format!(
            "{} ({} generations, population {})",
            Self::NAME,
            self.evolution.generations,
            self.evolution.population_size
        )
    }

    fn generate(&self, rng: &mut dyn RngCore) -> Result<Candidate, StrategyError> {
        let champions = self.evolve(rng);
        let (outcome, score) = champions.into_outcome(self.evolution.generations, rng);
        let blue = uniform_blue(rng);
        Ok(finish(Self::CODE, self.label(), outcome, blue, &self.params)?
            .with_meta("fitness_score", score))
    }
}

impl StrategyKind for GeneticSearch {
    const CODE: &'static str = "genetic_model";
    const NAME: &'static str = "Genetic search";
    const DESCRIPTION: &'static str =
        "Generational GA with roulette selection, crossover repair and decaying mutation";
    const MIN_HISTORY: usize = 10;

    fn default_params() -> StrategyParams {
        ConstraintSpec::default_params()
            .with("population_size", 120)
            .with("generations", 60)
            .with("crossover_rate", 0.85)
            .with("mutation_rate", 0.08)
            .with("elite_rate", 0.12)
            .with("adaptive_mutation", true)
            .with("history_match_weight", 0.45)
            .with("trend_weight", 0.25)
            .with("odd_even_weight", 0.15)
            .with("zone_weight", 0.10)
            .with("sum_weight", 0.05)
            .with("history_window", 80)
    }

    fn build(history: &[HistoricalDraw], params: &StrategyParams) -> Result<Self, StrategyError> {
        let spec = ConstraintSpec::from_params(params)?;
        Ok(Self {
            spec,
            evolution: Evolution::from_params(params, 2)?,
            weights: FitnessWeights {
                history_match: params.f64("history_match_weight")?,
                trend: params.f64("trend_weight")?,
                odd_even: params.f64("odd_even_weight")?,
                zone: params.f64("zone_weight")?,
                sum: params.f64("sum_weight")?,
            },
            context: FitnessContext::new(
                history,
                params.usize("history_window")?,
                spec.min_sum,
                spec.max_sum,
            ),
            params: params.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::synthetic_history;
    use rand::rngs::StdRng;

    fn small_params() -> StrategyParams {
        GeneticSearch::default_params()
            .with("population_size", 30)
            .with("generations", 15)
    }

    #[test]
    fn fitness_is_clamped() {
        let ga = GeneticSearch::build(&synthetic_history(20, 3), &small_params()).unwrap();
        // Six adjacent values carry a 1.25 penalty.
        assert_eq!(ga.fitness(&[1, 2, 3, 4, 5, 6]), 0.01);
        let f = ga.fitness(&[3, 8, 14, 19, 25, 30]);
        assert!((0.01..=1.0).contains(&f));
    }

    #[test]
    fn mutation_rate_decays_linearly() {
        let evo = Evolution::from_params(&small_params(), 2).unwrap();
        assert_eq!(evo.mutation_rate_at(0), 0.08);
        assert!(evo.mutation_rate_at(14) < evo.mutation_rate_at(7));
        let fixed = Evolution::from_params(&small_params().with("adaptive_mutation", false), 2)
            .unwrap();
        assert_eq!(fixed.mutation_rate_at(14), 0.08);
    }

    #[test]
    fn crossover_children_are_valid() {
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..100 {
            let (c1, c2) = crossover(&[1, 2, 3, 4, 5, 6], &[1, 2, 3, 4, 5, 33], &mut rng);
            assert!(crate::domain::normalize_reds(&c1).is_ok());
            assert!(crate::domain::normalize_reds(&c2).is_ok());
        }
    }

    #[test]
    fn search_returns_constrained_champion() {
        let ga = GeneticSearch::build(&synthetic_history(30, 4), &small_params()).unwrap();
        let mut rng = StdRng::seed_from_u64(12);
        let c = ga.generate(&mut rng).unwrap();
        assert_eq!(c.meta("constraint_satisfied"), Some(&serde_json::Value::Bool(true)));
        assert!(constraint::accepts(c.reds(), &ConstraintSpec::default()));
    }

    #[test]
    fn tiny_population_rejected() {
        let params = small_params().with("population_size", 2);
        assert!(GeneticSearch::build(&synthetic_history(20, 1), &params).is_err());
    }
}
