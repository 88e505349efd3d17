//! Multi-generation driver with resume.
//!
//! Generations are labelled `pop0`, `pop1`, ... under a run directory. A
//! generation with a sorted population on disk is skipped, one with only a
//! working population is continued, any other is started fresh.

use std::path::Path;

use crate::schema::{ConfigError, RunConfig, Structure};
use crate::trajectory::{LoadError, StoreError, load_structure};

use super::evaluator::{CommandEvaluator, EvaluationError, Evaluator};
use super::layout::GenerationLayout;
use super::population::{GenerationError, PopulationManager};

/// Errors that stop a run.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Cannot load template: {0}")]
    Template(#[from] LoadError),
    #[error("No evaluator configured, set `evaluator_command`")]
    MissingEvaluator,
    #[error("Invalid evaluator: {0}")]
    Evaluator(#[from] EvaluationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Summary of a finished run.
#[derive(Debug, Clone, Default)]
pub struct SearchReport {
    /// Generations computed by this invocation.
    pub completed: usize,
    /// Generations found complete on disk.
    pub skipped: usize,
    /// Lowest-energy structure of the last generation.
    pub best: Option<Structure>,
}

/// Label of generation `index`.
pub fn generation_label(index: usize) -> String {
    format!("pop{index}")
}

/// Run or resume all `config.n_generations` generations under `root`.
pub fn run_search<E: Evaluator>(
    config: &RunConfig,
    template: &Structure,
    evaluator: E,
    root: &Path,
) -> Result<SearchReport, DriverError> {
    let mut manager = PopulationManager::new(config, template, evaluator)?;
    log::info!(
        "Host {}x{} with {} atoms, {} generations of {}",
        config.size.n,
        config.size.m,
        manager.host().host_len(),
        config.n_generations,
        config.pop_size
    );

    let mut report = SearchReport::default();
    let mut previous: Option<Vec<Structure>> = None;

    for index in 0..config.n_generations {
        let layout = GenerationLayout::new(root, &generation_label(index));

        if layout.is_complete() {
            log::info!("{} already complete, skipping", layout.label());
            previous = Some(layout.sorted().read_all()?);
            report.skipped += 1;
            continue;
        }

        let resume = layout.is_started();
        if resume {
            log::info!("Resuming {}", layout.label());
        }
        let outcome = match (&previous, resume) {
            (None, false) => manager.run_initial(&layout)?,
            (None, true) => manager.continue_initial(&layout)?,
            (Some(parents), false) => manager.run_generation(parents, &layout)?,
            (Some(parents), true) => manager.continue_generation(parents, &layout)?,
        };

        log::info!(
            "{}: min {:.4} eV, mean {:.4} eV",
            layout.label(),
            outcome.summary.min,
            outcome.summary.mean
        );
        previous = Some(outcome.population);
        report.completed += 1;
    }

    report.best = previous.and_then(|population| population.into_iter().next());
    Ok(report)
}

/// Load the run configuration at `config_path` and run it with the
/// configured external evaluator. Relative file names and outputs resolve
/// against the configuration's folder.
pub fn run_from_file(config_path: &Path) -> Result<SearchReport, DriverError> {
    let config = RunConfig::from_file(config_path)?;
    let base = config_path.parent().unwrap_or(Path::new("."));
    let template = load_structure(config.template_path(base))?;

    let command = config
        .evaluator_command
        .as_deref()
        .ok_or(DriverError::MissingEvaluator)?;
    let evaluator = CommandEvaluator::new(command, &config.label)?
        .resolve_program(base)
        .map_err(EvaluationError::from)?
        .with_timeout(config.timeout()?);

    run_search(&config, &template, evaluator, base)
}

#[cfg(test)]
mod tests {
    use super::super::evaluator::Relaxed;
    use super::super::placement::tests::template;
    use super::*;
    use crate::schema::from_key_values;
    use crate::trajectory::write_xyz_file;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn config() -> RunConfig {
        let text = "n_generations = 2\n\
             pop_size = 4\n\
             n_best = 1\n\
             n_child = 1\n\
             n_mut = 1\n\
             struct_filename = template.xyz\n\
             size = 3x3\n\
             n_atoms = 2\n\
             n_change = 1\n\
             atom_symbol = Li\n\
             mag_moment = 1.0\n\
             label = test\n\
             random_seed = 11\n";
        let config: RunConfig = from_key_values(text).unwrap();
        config.validate().unwrap();
        config
    }

    fn fake_relax(s: &Structure, _: &Path) -> Result<Relaxed, EvaluationError> {
        let energy = s
            .interstitial_atoms(0.1)
            .iter()
            .map(|a| a.position.y)
            .sum::<f64>();
        Ok(Relaxed {
            structure: s.clone(),
            energy,
        })
    }

    #[test]
    fn test_run_two_generations() {
        let dir = tempdir().unwrap();
        let report = run_search(&config(), &template(), fake_relax, dir.path()).unwrap();

        assert_eq!(report.completed, 2);
        assert_eq!(report.skipped, 0);
        for label in ["pop0", "pop1"] {
            let layout = GenerationLayout::new(dir.path(), label);
            assert!(layout.is_complete());
            assert_eq!(layout.sorted().count().unwrap(), 4);
            assert!(layout.energy_path().is_file());
        }

        let best = report.best.unwrap();
        let last = GenerationLayout::new(dir.path(), "pop1")
            .sorted()
            .read_all()
            .unwrap();
        assert_eq!(best.energy, last[0].energy);
    }

    #[test]
    fn test_rerun_skips_finished() {
        let dir = tempdir().unwrap();
        let config = config();
        run_search(&config, &template(), fake_relax, dir.path()).unwrap();

        let calls = AtomicUsize::new(0);
        let counting = |s: &Structure, w: &Path| {
            calls.fetch_add(1, Ordering::SeqCst);
            fake_relax(s, w)
        };
        let report = run_search(&config, &template(), counting, dir.path()).unwrap();
        assert_eq!(report.completed, 0);
        assert_eq!(report.skipped, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_resume_unsorted_generation() {
        let dir = tempdir().unwrap();
        let config = config();
        run_search(&config, &template(), fake_relax, dir.path()).unwrap();

        // Interrupted after the working population was full but before sorting.
        let last = GenerationLayout::new(dir.path(), "pop1");
        fs::remove_file(last.sorted().path()).unwrap();

        let calls = AtomicUsize::new(0);
        let counting = |s: &Structure, w: &Path| {
            calls.fetch_add(1, Ordering::SeqCst);
            fake_relax(s, w)
        };
        let report = run_search(&config, &template(), counting, dir.path()).unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.completed, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(last.sorted().count().unwrap(), 4);
    }

    #[test]
    fn test_run_from_file_requires_evaluator() {
        let dir = tempdir().unwrap();
        write_xyz_file(dir.path().join("template.xyz"), &template()).unwrap();
        let text = "n_generations = 1\npop_size = 2\nn_best = 0\nn_child = 0\nn_mut = 0\n\
                    struct_filename = template.xyz\nsize = 2x2\nn_atoms = 1\nn_change = 0\n\
                    atom_symbol = Li\nmag_moment = 0.0\nlabel = t\n";
        let path = dir.path().join("input.txt");
        fs::write(&path, text).unwrap();

        assert!(matches!(
            run_from_file(&path),
            Err(DriverError::MissingEvaluator)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_from_file_with_command() {
        let dir = tempdir().unwrap();
        write_xyz_file(dir.path().join("template.xyz"), &template()).unwrap();
        let script = dir.path().join("relax.sh");
        fs::write(
            &script,
            "sed 's/pbc=/energy=-1.5 pbc=/' \"$INTERCALATE_INPUT\" > \"$INTERCALATE_OUTPUT\"\n",
        )
        .unwrap();
        let text = format!(
            "n_generations = 1\npop_size = 2\nn_best = 0\nn_child = 0\nn_mut = 0\n\
             struct_filename = template.xyz\nsize = 2x2\nn_atoms = 1\nn_change = 0\n\
             atom_symbol = Li\nmag_moment = 0.0\nlabel = t\nrandom_seed = 3\n\
             evaluator_command = sh {}\n",
            script.display()
        );
        let path = dir.path().join("input.txt");
        fs::write(&path, text).unwrap();

        let report = run_from_file(&path).unwrap();
        assert_eq!(report.completed, 1);
        assert_eq!(report.best.unwrap().energy, Some(-1.5));
        assert!(dir.path().join("pop0/cand1/t.xyz").is_file());
        assert!(dir.path().join("sorted_pop0.traj").is_file());
    }
}
