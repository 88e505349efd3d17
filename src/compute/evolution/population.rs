//! Generational population management.
//!
//! A generation moves through fixed phases:
//!
//! ```text
//! SelectSurvivors → CrossoverFill → MutationFill → RandomFill → SortPersist → Done
//! ```
//!
//! The initial generation skips straight to `RandomFill`. Each fill phase
//! produces candidates until its quota of successful evaluations is met;
//! failed candidates are logged and leave their slot open.

use std::fs;
use std::io;

use rayon::prelude::*;

use crate::compute::host::{HostBuilder, HostError};
use crate::schema::{RunConfig, Structure};
use crate::trajectory::{StoreError, write_xyz_file};

use super::energy::{EnergySummary, round_energy, sort_population};
use super::evaluator::{EvaluationError, Evaluator, Relaxed};
use super::layout::{GenerationLayout, GenerationLog};
use super::placement::{OperatorSettings, PlacementError, StructureRng};

/// Phase of a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationPhase {
    /// Carry the best individuals of the previous generation over unchanged.
    SelectSurvivors,
    /// Fill the crossover quota.
    CrossoverFill,
    /// Fill the mutation quota.
    MutationFill,
    /// Fill the rest of the population with random structures.
    RandomFill,
    /// Sort by energy and write the generation's outputs.
    SortPersist,
    /// Generation complete.
    Done,
}

impl GenerationPhase {
    fn next(self) -> Self {
        match self {
            GenerationPhase::SelectSurvivors => GenerationPhase::CrossoverFill,
            GenerationPhase::CrossoverFill => GenerationPhase::MutationFill,
            GenerationPhase::MutationFill => GenerationPhase::RandomFill,
            GenerationPhase::RandomFill => GenerationPhase::SortPersist,
            GenerationPhase::SortPersist | GenerationPhase::Done => GenerationPhase::Done,
        }
    }

    /// Prefix of candidate tags and folders produced in this phase.
    pub fn tag_prefix(self) -> &'static str {
        match self {
            GenerationPhase::SelectSurvivors => "best",
            GenerationPhase::CrossoverFill => "child",
            GenerationPhase::MutationFill => "mut",
            GenerationPhase::RandomFill => "cand",
            GenerationPhase::SortPersist | GenerationPhase::Done => "",
        }
    }
}

/// Fatal errors of a generation.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("Breeding pool has {found} structures, {needed} required")]
    NotEnoughParents { needed: usize, found: usize },
    #[error("{phase:?} stalled after {failures} consecutive failures")]
    QuotaStalled {
        phase: GenerationPhase,
        failures: usize,
    },
    #[error("Generation finished with no evaluated structures")]
    EmptyPopulation,
}

/// Sorted population and energy summary of a finished generation.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub population: Vec<Structure>,
    pub summary: EnergySummary,
}

/// A candidate waiting for evaluation.
struct Pending {
    tag: String,
    structure: Structure,
}

/// Runs generations for one configuration, template and evaluator.
pub struct PopulationManager<'a, E: Evaluator> {
    config: &'a RunConfig,
    host: HostBuilder,
    evaluator: E,
    rng: StructureRng,
    settings: OperatorSettings,
}

impl<'a, E: Evaluator> PopulationManager<'a, E> {
    /// Seeded from `config.random_seed`, or from entropy if unset.
    pub fn new(
        config: &'a RunConfig,
        template: &Structure,
        evaluator: E,
    ) -> Result<Self, GenerationError> {
        let host = HostBuilder::new(template, config.size, config.z_expansion)?;
        let rng = match config.random_seed {
            Some(seed) => StructureRng::new(seed),
            None => StructureRng::random(),
        };
        Ok(Self {
            config,
            host,
            evaluator,
            rng,
            settings: OperatorSettings::from(config),
        })
    }

    pub fn host(&self) -> &HostBuilder {
        &self.host
    }

    /// Generation 0: `pop_size` random structures.
    pub fn run_initial(
        &mut self,
        layout: &GenerationLayout,
    ) -> Result<GenerationOutcome, GenerationError> {
        self.run(layout, None, false)
    }

    /// Resume an interrupted generation 0, keeping what it already holds.
    pub fn continue_initial(
        &mut self,
        layout: &GenerationLayout,
    ) -> Result<GenerationOutcome, GenerationError> {
        self.run(layout, None, true)
    }

    /// Breed a new generation from the previous one.
    pub fn run_generation(
        &mut self,
        previous: &[Structure],
        layout: &GenerationLayout,
    ) -> Result<GenerationOutcome, GenerationError> {
        self.run(layout, Some(previous), false)
    }

    /// Resume an interrupted generation bred from `previous`.
    ///
    /// Entries already in the working population are kept. If there are
    /// none, the survivors are written first. Candidate numbering restarts
    /// after the entries already present in each bucket.
    pub fn continue_generation(
        &mut self,
        previous: &[Structure],
        layout: &GenerationLayout,
    ) -> Result<GenerationOutcome, GenerationError> {
        self.run(layout, Some(previous), true)
    }

    /// Best ⌈pop_size / 2⌉ of `previous`, sorted by energy.
    fn breeding_pool(&self, previous: &[Structure]) -> Result<Vec<Structure>, GenerationError> {
        let mut pool = previous.to_vec();
        sort_population(&mut pool);
        pool.truncate(self.config.breeding_pool_size());

        let mut needed = self.config.n_best;
        if self.config.n_child > 0 {
            needed = needed.max(2);
        }
        if self.config.n_mut > 0 {
            needed = needed.max(1);
        }
        if pool.len() < needed {
            return Err(GenerationError::NotEnoughParents {
                needed,
                found: pool.len(),
            });
        }
        Ok(pool)
    }

    fn run(
        &mut self,
        layout: &GenerationLayout,
        previous: Option<&[Structure]>,
        resume: bool,
    ) -> Result<GenerationOutcome, GenerationError> {
        let mut log = GenerationLog::open(layout)?;
        let working = layout.working();
        let pool = previous.map(|p| self.breeding_pool(p)).transpose()?;

        let mut count = if resume && working.exists() {
            working.count()?
        } else {
            working.create()?;
            0
        };
        if resume {
            log::info!("Resuming {} with {count} structures", layout.label());
        }

        let config = self.config;
        let mut phase = match pool {
            Some(_) => GenerationPhase::SelectSurvivors,
            None => GenerationPhase::RandomFill,
        };
        let mut outcome = None;

        while phase != GenerationPhase::Done {
            match phase {
                GenerationPhase::SelectSurvivors => {
                    if count == 0
                        && let Some(pool) = &pool
                    {
                        for survivor in &pool[..config.n_best] {
                            let mut survivor = survivor.clone();
                            survivor.label = Some(phase.tag_prefix().to_string());
                            working.append(&survivor)?;
                        }
                        count = config.n_best;
                    }
                }
                GenerationPhase::CrossoverFill
                | GenerationPhase::MutationFill
                | GenerationPhase::RandomFill => {
                    let (baseline, target) = self.bucket(phase, pool.is_some());
                    self.fill(
                        phase,
                        baseline,
                        target,
                        &mut count,
                        pool.as_deref(),
                        layout,
                        &mut log,
                    )?;
                }
                GenerationPhase::SortPersist => {
                    outcome = Some(self.sort_persist(layout, &mut log)?);
                }
                GenerationPhase::Done => {}
            }
            phase = phase.next();
        }

        outcome.ok_or(GenerationError::EmptyPopulation)
    }

    /// Population size before and after a fill phase.
    fn bucket(&self, phase: GenerationPhase, bred: bool) -> (usize, usize) {
        let c = self.config;
        if !bred {
            return (0, c.pop_size);
        }
        match phase {
            GenerationPhase::CrossoverFill => (c.n_best, c.n_best + c.n_child),
            GenerationPhase::MutationFill => {
                (c.n_best + c.n_child, c.n_best + c.n_child + c.n_mut)
            }
            _ => (c.n_best + c.n_child + c.n_mut, c.pop_size),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn fill(
        &mut self,
        phase: GenerationPhase,
        baseline: usize,
        target: usize,
        count: &mut usize,
        pool: Option<&[Structure]>,
        layout: &GenerationLayout,
        log: &mut GenerationLog,
    ) -> Result<(), GenerationError> {
        let working = layout.working();
        let batch_size = self.config.parallel_evaluations.max(1);
        let mut counter = count.saturating_sub(baseline);
        let mut failures = 0;

        while *count < target {
            let mut batch = Vec::new();
            while batch.len() < batch_size.min(target - *count) {
                counter += 1;
                let tag = format!("{}{counter}", phase.tag_prefix());
                match self.produce(phase, pool) {
                    Ok(mut structure) => {
                        structure.set_initial_magmoms(self.config.n_atoms, self.config.mag_moment);
                        batch.push(Pending { tag, structure });
                    }
                    Err(e) => {
                        log.failure(&format!("Failed to relax {tag}. Error: {e}"))?;
                        failures += 1;
                        self.check_stall(phase, failures)?;
                    }
                }
            }

            let results = self.evaluate_batch(&batch, layout)?;
            for (pending, result) in batch.iter().zip(results) {
                match result.and_then(|relaxed| accept(&pending.tag, relaxed, layout)) {
                    Ok(structure) => {
                        working.append(&structure)?;
                        *count += 1;
                        failures = 0;
                        log.line(&format!("Successfully relaxed {}.", pending.tag))?;
                    }
                    Err(e) => {
                        log.failure(&format!("Failed to relax {}. Error: {e}", pending.tag))?;
                        failures += 1;
                        self.check_stall(phase, failures)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn check_stall(&self, phase: GenerationPhase, failures: usize) -> Result<(), GenerationError> {
        let limit = self.config.max_consecutive_failures;
        if limit > 0 && failures >= limit {
            return Err(GenerationError::QuotaStalled { phase, failures });
        }
        Ok(())
    }

    fn produce(
        &mut self,
        phase: GenerationPhase,
        pool: Option<&[Structure]>,
    ) -> Result<Structure, PlacementError> {
        let config = self.config;
        match (phase, pool) {
            (GenerationPhase::CrossoverFill, Some(pool)) => {
                let (i, j) =
                    self.rng
                        .distinct_pair(pool.len())
                        .ok_or(PlacementError::NotEnoughParents {
                            needed: 2,
                            found: pool.len(),
                        })?;
                self.rng
                    .crossover(&pool[i], &pool[j], config.n_change, &self.host, &self.settings)
            }
            (GenerationPhase::MutationFill, Some(pool)) => {
                let i = self
                    .rng
                    .index(pool.len())
                    .ok_or(PlacementError::NotEnoughParents {
                        needed: 1,
                        found: 0,
                    })?;
                self.rng.mutate(&pool[i], &self.settings)
            }
            _ => self.rng.random_structure(
                &self.host,
                &config.atom_symbol,
                config.n_atoms,
                &self.settings,
            ),
        }
    }

    /// Evaluate a batch in parallel, each candidate in its own folder.
    fn evaluate_batch(
        &self,
        batch: &[Pending],
        layout: &GenerationLayout,
    ) -> Result<Vec<Result<Relaxed, EvaluationError>>, GenerationError> {
        for pending in batch {
            fs::create_dir_all(layout.candidate_dir(&pending.tag))?;
        }
        let evaluator = &self.evaluator;
        Ok(batch
            .par_iter()
            .map(|pending| {
                evaluator.evaluate(&pending.structure, &layout.candidate_dir(&pending.tag))
            })
            .collect())
    }

    fn sort_persist(
        &self,
        layout: &GenerationLayout,
        log: &mut GenerationLog,
    ) -> Result<GenerationOutcome, GenerationError> {
        let mut population = layout.working().read_all()?;
        sort_population(&mut population);
        let summary =
            EnergySummary::from_population(&population).ok_or(GenerationError::EmptyPopulation)?;

        summary.write_to(layout.energy_path())?;
        layout.sorted().write(&population)?;
        log.line(&format!("The {} is complete!", layout.label()))?;

        Ok(GenerationOutcome {
            population,
            summary,
        })
    }
}

/// Finalize a relaxed candidate and write its snapshot.
fn accept(
    tag: &str,
    relaxed: Relaxed,
    layout: &GenerationLayout,
) -> Result<Structure, EvaluationError> {
    let mut structure = relaxed.structure;
    structure.energy = Some(round_energy(relaxed.energy));
    structure.pbc = [true, true, false];
    structure.label = Some(tag.to_string());
    write_xyz_file(layout.snapshot_path(tag), &structure)?;
    Ok(structure)
}
