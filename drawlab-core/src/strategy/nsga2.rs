//! NSGA-II multi-objective search.
//!
//! Five maximized objectives, no scalarization during selection:
//! `[overlap, odd/even balance, zone spread, sum fitness, -adjacency]`, each
//! scaled by its weight. Survivors are chosen by non-dominated rank with
//! crowding-distance truncation. Mutation alternates between replacement
//! mutation and differential evolution `clamp(a + de_scale * (b - c))`.

use rand::prelude::*;

use super::genetic::{crossover, initial_population, mutate, Champions, Evolution};
use super::objectives::{self, FitnessContext};
use super::{finish, repair, uniform_blue, Strategy, StrategyError, StrategyKind};
use crate::constraint::ConstraintSpec;
use crate::domain::{Candidate, HistoricalDraw, RED_COUNT, RED_MAX};
use crate::pareto;
use crate::params::StrategyParams;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectiveWeights {
    pub history_match: f64,
    pub odd_even: f64,
    pub zone: f64,
    pub sum: f64,
    pub consecutive_penalty: f64,
}

#[derive(Debug, Clone)]
pub struct Nsga2Search {
    spec: ConstraintSpec,
    evolution: Evolution,
    weights: ObjectiveWeights,
    de_scale: f64,
    context: FitnessContext,
    params: StrategyParams,
}

/// Differential-evolution child `clamp(a + scale * (b - c))`, repaired.
pub fn differential_child<R: Rng + ?Sized>(
    a: &[u8],
    b: &[u8],
    c: &[u8],
    scale: f64,
    rng: &mut R,
) -> Vec<u8> {
    let raw: Vec<u8> = (0..RED_COUNT)
        .map(|i| {
            let v = a[i] as f64 + scale * (b[i] as f64 - c[i] as f64);
            v.round().clamp(1.0, RED_MAX as f64) as u8
        })
        .collect();
    repair(raw, rng)
}

impl Nsga2Search {
    pub fn objectives(&self, reds: &[u8]) -> Vec<f64> {
        let w = &self.weights;
        vec![
            self.context.overlap(reds) * w.history_match,
            objectives::odd_even_balance(reds) * w.odd_even,
            objectives::zone_spread(reds) * w.zone,
            self.context.sum_fitness(reds) * w.sum,
            -objectives::adjacency(reds) * w.consecutive_penalty,
        ]
    }

    /// DE child of three donors drawn from `pool` without the parent at `parent`.
    fn de_mutant<R: Rng + ?Sized>(
        &self,
        pool: &[Vec<u8>],
        parent: usize,
        rng: &mut R,
    ) -> Option<Vec<u8>> {
        let others: Vec<usize> = (0..pool.len()).filter(|&i| i != parent).collect();
        match others.choose_multiple(rng, 3).collect::<Vec<_>>().as_slice() {
            [a, b, c] => Some(differential_child(
                &pool[**a],
                &pool[**b],
                &pool[**c],
                self.de_scale,
                rng,
            )),
            _ => None,
        }
    }

    fn evolve<R: Rng + ?Sized>(&self, rng: &mut R) -> Champions {
        let evo = &self.evolution;
        let mut population = initial_population(evo.population_size, rng);
        let mut champions = Champions::default();
        let mut use_de = false;

        for gen in 0..evo.generations {
            let scores: Vec<Vec<f64>> = population.iter().map(|ind| self.objectives(ind)).collect();
            for (ind, v) in population.iter().zip(&scores) {
                champions.offer(ind, v.iter().sum(), &self.spec);
            }

            // Survivors arrive in rank order, so the head is the elite.
            let survivors: Vec<Vec<u8>> = pareto::select(&scores, evo.population_size)
                .into_iter()
                .map(|i| population[i].clone())
                .collect();
            let mut next: Vec<Vec<u8>> = survivors.iter().take(evo.elite_count).cloned().collect();

            let rate = evo.mutation_rate_at(gen);
            while next.len() < evo.population_size {
                if survivors.len() < 2 {
                    break;
                }
                let parents = rand::seq::index::sample(rng, survivors.len(), 2);
                let (i1, i2) = (parents.index(0), parents.index(1));
                let (p1, p2) = (&survivors[i1], &survivors[i2]);
                let (mut c1, c2) = if rng.gen::<f64>() < evo.crossover_rate {
                    crossover(p1, p2, rng)
                } else {
                    (p1.clone(), p2.clone())
                };
                if rng.gen::<f64>() < rate {
                    use_de = !use_de;
                    if use_de {
                        if let Some(mutant) = self.de_mutant(&survivors, i1, rng) {
                            c1 = mutant;
                        }
                    } else {
                        mutate(&mut c1, rng);
                    }
                }
                next.push(c1);
                next.push(c2);
            }
            next.truncate(evo.population_size);
            population = next;
        }

        for ind in &population {
            champions.offer(ind, self.objectives(ind).iter().sum(), &self.spec);
        }
        champions
    }
}

impl Strategy for Nsga2Search {
    fn code(&self) -> &'static str {
        Self::CODE
    }

    fn label(&self) -> String {
        format!(
            "{} ({} generations, 5 objectives)",
            Self::NAME,
            self.evolution.generations
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

impl StrategyKind for Nsga2Search {
    const CODE: &'static str = "nsga2";
    const NAME: &'static str = "NSGA-II search";
    const DESCRIPTION: &'static str =
        "Multi-objective search with non-dominated sorting, crowding and differential evolution";
    const MIN_HISTORY: usize = 10;

    fn default_params() -> StrategyParams {
        ConstraintSpec::default_params()
            .with("population_size", 150)
            .with("generations", 80)
            .with("crossover_rate", 0.88)
            .with("mutation_rate", 0.12)
            .with("elite_rate", 0.15)
            .with("adaptive_mutation", true)
            .with("history_match_weight", 0.40)
            .with("odd_even_weight", 0.18)
            .with("zone_weight", 0.15)
            .with("sum_weight", 0.12)
            .with("consecutive_penalty", 0.15)
            .with("de_scale", 0.6)
            .with("history_window", 100)
    }

    fn build(history: &[HistoricalDraw], params: &StrategyParams) -> Result<Self, StrategyError> {
        let spec = ConstraintSpec::from_params(params)?;
        Ok(Self {
            spec,
            evolution: Evolution::from_params(params, 3)?,
            weights: ObjectiveWeights {
                history_match: params.f64("history_match_weight")?,
                odd_even: params.f64("odd_even_weight")?,
                zone: params.f64("zone_weight")?,
                sum: params.f64("sum_weight")?,
                consecutive_penalty: params.f64("consecutive_penalty")?,
            },
            de_scale: params.f64("de_scale")?,
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
    use crate::constraint;
    use crate::synthetic::synthetic_history;
    use rand::rngs::StdRng;

    fn small() -> Nsga2Search {
        let params = Nsga2Search::default_params()
            .with("population_size", 24)
            .with("generations", 10)
            .with("mutation_rate", 0.9);
        Nsga2Search::build(&synthetic_history(30, 6), &params).unwrap()
    }

    #[test]
    fn objective_vector_has_five_terms() {
        let search = small();
        let v = search.objectives(&[1, 2, 3, 10, 20, 30]);
        assert_eq!(v.len(), 5);
        assert!((v[4] + 2.0 * 0.15).abs() < 1e-12);
    }

    #[test]
    fn differential_child_is_clamped_and_valid() {
        let mut rng = StdRng::seed_from_u64(1);
        let child = differential_child(
            &[28, 29, 30, 31, 32, 33],
            &[20, 22, 24, 26, 28, 30],
            &[1, 2, 3, 4, 5, 6],
            0.6,
            &mut rng,
        );
        assert!(crate::domain::normalize_reds(&child).is_ok());
        assert!(child.contains(&33));
    }

    #[test]
    fn de_donors_exclude_the_parent() {
        let search = small();
        let donor = vec![3, 8, 14, 19, 25, 30];
        let pool = vec![
            donor.clone(),
            vec![1, 2, 3, 31, 32, 33],
            donor.clone(),
            donor.clone(),
        ];
        // With identical donors a + s * (b - c) == a, so the parent can only
        // leak in if it is drawn as a donor.
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            assert_eq!(search.de_mutant(&pool, 1, &mut rng), Some(donor.clone()));
        }
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(search.de_mutant(&pool[..3], 1, &mut rng), None);
    }

    #[test]
    fn search_produces_valid_constrained_candidate() {
        let search = small();
        for seed in 0..3 {
            let mut rng = StdRng::seed_from_u64(seed);
            let c = search.generate(&mut rng).unwrap();
            assert!(crate::domain::normalize_reds(c.reds()).is_ok());
            assert_eq!(c.meta("constraint_satisfied"), Some(&serde_json::Value::Bool(true)));
            assert!(constraint::accepts(c.reds(), &ConstraintSpec::default()));
        }
    }
}
