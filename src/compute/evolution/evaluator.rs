//! Energy evaluation of candidate structures.
//!
//! The population manager only needs `structure -> (relaxed structure, energy)`.
//! [`CommandEvaluator`] delegates that to an external program run inside the
//! candidate's working directory; any closure with the right signature works
//! as an in-process evaluator.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::schema::Structure;
use crate::trajectory::{XyzError, read_xyz_file, write_xyz_file};

/// Result of a successful evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Relaxed {
    /// Relaxed geometry.
    pub structure: Structure,
    /// Potential energy (eV).
    pub energy: f64,
}

/// Failure of a single evaluation. Never fatal for a run.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("Evaluation failed: {0}")]
    Failed(String),
    #[error("Evaluator timed out after {0:?}")]
    Timeout(Duration),
    #[error("Evaluator wrote no output at {0}")]
    MissingOutput(PathBuf),
    #[error("Evaluator output has no energy")]
    MissingEnergy,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid evaluator output: {0}")]
    Xyz(#[from] XyzError),
}

/// Relaxes a structure and reports its energy.
///
/// `workdir` is the candidate's own directory and exists when called.
/// Implementations must not change the process working directory.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, structure: &Structure, workdir: &Path) -> Result<Relaxed, EvaluationError>;
}

impl<F> Evaluator for F
where
    F: Fn(&Structure, &Path) -> Result<Relaxed, EvaluationError> + Send + Sync,
{
    fn evaluate(&self, structure: &Structure, workdir: &Path) -> Result<Relaxed, EvaluationError> {
        self(structure, workdir)
    }
}

/// Poll interval while waiting on an evaluator process.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs an external program per candidate.
///
/// In the working directory the program finds `<label>.xyz` and must write
/// `<label>.relaxed.xyz` with `energy=<eV>` on its comment line. File names
/// are also passed as `INTERCALATE_INPUT`, `INTERCALATE_OUTPUT` and
/// `INTERCALATE_LABEL`. Standard output and error go to `<label>.out`.
#[derive(Debug, Clone)]
pub struct CommandEvaluator {
    program: String,
    args: Vec<String>,
    label: String,
    timeout: Option<Duration>,
}

impl CommandEvaluator {
    /// Build from a whitespace-separated command line.
    pub fn new(command: &str, label: &str) -> Result<Self, EvaluationError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| EvaluationError::Failed("evaluator command is empty".into()))?;
        Ok(Self {
            program,
            args: parts.collect(),
            label: label.to_string(),
            timeout: None,
        })
    }

    /// Resolve a relative program path such as `./relax.sh` against `base`.
    /// Bare program names are still looked up on `PATH`.
    pub fn resolve_program(mut self, base: &Path) -> io::Result<Self> {
        let program = Path::new(&self.program);
        if program.is_relative() && program.components().count() > 1 {
            let resolved = std::path::absolute(base.join(program))?;
            self.program = resolved.to_string_lossy().into_owned();
        }
        Ok(self)
    }

    /// Kill the program and fail the evaluation after `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn input_name(&self) -> String {
        format!("{}.xyz", self.label)
    }

    pub fn output_name(&self) -> String {
        format!("{}.relaxed.xyz", self.label)
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus, EvaluationError> {
        let Some(timeout) = self.timeout else {
            return Ok(child.wait()?);
        };

        let start = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if start.elapsed() >= timeout {
                child.kill()?;
                child.wait()?;
                return Err(EvaluationError::Timeout(timeout));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Evaluator for CommandEvaluator {
    fn evaluate(&self, structure: &Structure, workdir: &Path) -> Result<Relaxed, EvaluationError> {
        fs::create_dir_all(workdir)?;
        let input = self.input_name();
        let output = self.output_name();
        write_xyz_file(workdir.join(&input), structure)?;

        let log = File::create(workdir.join(format!("{}.out", self.label)))?;
        let log_err = log.try_clone()?;

        log::debug!("Running `{}` in {}", self.program, workdir.display());
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(workdir)
            .env("INTERCALATE_INPUT", &input)
            .env("INTERCALATE_OUTPUT", &output)
            .env("INTERCALATE_LABEL", &self.label)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(|e| EvaluationError::Failed(format!("cannot run {}: {e}", self.program)))?;

        let status = self.wait(&mut child)?;
        if !status.success() {
            return Err(EvaluationError::Failed(format!(
                "{} exited with {status}",
                self.program
            )));
        }

        let output_path = workdir.join(&output);
        if !output_path.is_file() {
            return Err(EvaluationError::MissingOutput(output_path));
        }
        let relaxed = read_xyz_file(&output_path)?;
        let energy = relaxed.energy.ok_or(EvaluationError::MissingEnergy)?;
        Ok(Relaxed {
            structure: relaxed,
            energy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Atom, Lattice};
    use nalgebra::Vector3;
    use tempfile::tempdir;

    fn structure() -> Structure {
        Structure::with_atoms(
            Lattice::hexagonal(3.0, 15.0),
            vec![Atom::from_symbol("Li", Vector3::new(0.5, 0.5, 7.5)).unwrap()],
        )
    }

    #[test]
    fn test_closure_evaluator() {
        let evaluator = |s: &Structure, _: &Path| -> Result<Relaxed, EvaluationError> {
            Ok(Relaxed {
                structure: s.clone(),
                energy: -(s.len() as f64),
            })
        };
        let dir = tempdir().unwrap();
        let relaxed = evaluator.evaluate(&structure(), dir.path()).unwrap();
        assert_eq!(relaxed.energy, -1.0);
    }

    #[test]
    fn test_empty_command() {
        assert!(matches!(
            CommandEvaluator::new("   ", "siesta"),
            Err(EvaluationError::Failed(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_round_trip() {
        let dir = tempdir().unwrap();
        let script = "sed 's/pbc=/energy=-7.25 pbc=/' \"$INTERCALATE_INPUT\" > \"$INTERCALATE_OUTPUT\"";
        let evaluator = CommandEvaluator {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            label: "relax".into(),
            timeout: None,
        };

        let relaxed = evaluator.evaluate(&structure(), dir.path()).unwrap();
        assert_eq!(relaxed.energy, -7.25);
        assert_eq!(relaxed.structure.len(), 1);
        assert!(dir.path().join("relax.xyz").is_file());
        assert!(dir.path().join("relax.out").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_failures() {
        let dir = tempdir().unwrap();

        let failing = CommandEvaluator::new("false", "x").unwrap();
        assert!(matches!(
            failing.evaluate(&structure(), dir.path()),
            Err(EvaluationError::Failed(_))
        ));

        let silent = CommandEvaluator::new("true", "x").unwrap();
        assert!(matches!(
            silent.evaluate(&structure(), dir.path()),
            Err(EvaluationError::MissingOutput(_))
        ));

        let slow = CommandEvaluator::new("sleep 5", "x")
            .unwrap()
            .with_timeout(Some(Duration::from_millis(200)));
        assert!(matches!(
            slow.evaluate(&structure(), dir.path()),
            Err(EvaluationError::Timeout(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_program() {
        let base = Path::new("/runs/MoS2");
        let local = CommandEvaluator::new("./relax.sh --fast", "x")
            .unwrap()
            .resolve_program(base)
            .unwrap();
        assert_eq!(Path::new(&local.program), base.join("relax.sh").as_path());
        assert_eq!(local.args, vec!["--fast".to_string()]);

        let on_path = CommandEvaluator::new("vasp_std", "x")
            .unwrap()
            .resolve_program(base)
            .unwrap();
        assert_eq!(on_path.program, "vasp_std");
    }

    #[cfg(unix)]
    #[test]
    fn test_local_script_runs_in_candidate_folder() {
        use std::os::unix::fs::PermissionsExt;

        let run = tempdir().unwrap();
        let script = run.path().join("relax.sh");
        fs::write(
            &script,
            "#!/bin/sh\nsed 's/pbc=/energy=-3.5 pbc=/' \"$INTERCALATE_INPUT\" > \"$INTERCALATE_OUTPUT\"\n",
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let workdir = run.path().join("pop0").join("cand1");
        let evaluator = CommandEvaluator::new("./relax.sh", "relax")
            .unwrap()
            .resolve_program(run.path())
            .unwrap();
        let relaxed = evaluator.evaluate(&structure(), &workdir).unwrap();
        assert_eq!(relaxed.energy, -3.5);
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_energy() {
        let dir = tempdir().unwrap();
        let evaluator = CommandEvaluator {
            program: "sh".into(),
            args: vec!["-c".into(), "cp x.xyz x.relaxed.xyz".into()],
            label: "x".into(),
            timeout: None,
        };
        assert!(matches!(
            evaluator.evaluate(&structure(), dir.path()),
            Err(EvaluationError::MissingEnergy)
        ));
    }
}
