//! JSON-lines trajectory files: one serialized structure per line.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::schema::Structure;

/// Errors reading or writing a trajectory.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed entry at {path}:{line}: {source}")]
    Malformed {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to serialize structure: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Append-only structure file.
///
/// Entries are written in completion order; readers get them back in the
/// same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trajectory {
    path: PathBuf,
}

impl Trajectory {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Create an empty trajectory, truncating any existing file.
    pub fn create(&self) -> Result<(), StoreError> {
        File::create(&self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    /// Append one structure, creating the file if needed.
    pub fn append(&self, structure: &Structure) -> Result<(), StoreError> {
        let line = serde_json::to_string(structure)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        writeln!(file, "{line}").map_err(|e| self.io_error(e))
    }

    /// Replace the file contents with `structures`.
    pub fn write(&self, structures: &[Structure]) -> Result<(), StoreError> {
        let file = File::create(&self.path).map_err(|e| self.io_error(e))?;
        let mut writer = BufWriter::new(file);
        for structure in structures {
            serde_json::to_writer(&mut writer, structure)?;
            writer.write_all(b"\n").map_err(|e| self.io_error(e))?;
        }
        writer.flush().map_err(|e| self.io_error(e))
    }

    /// Read every entry. Blank lines are skipped.
    pub fn read_all(&self) -> Result<Vec<Structure>, StoreError> {
        let file = File::open(&self.path).map_err(|e| self.io_error(e))?;
        let mut structures = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| self.io_error(e))?;
            if line.trim().is_empty() {
                continue;
            }
            let structure =
                serde_json::from_str(&line).map_err(|source| StoreError::Malformed {
                    path: self.path.clone(),
                    line: index + 1,
                    source,
                })?;
            structures.push(structure);
        }
        Ok(structures)
    }

    /// Number of entries; a missing file counts as empty.
    pub fn count(&self) -> Result<usize, StoreError> {
        if !self.exists() {
            return Ok(0);
        }
        Ok(self.read_all()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Atom, Lattice};
    use nalgebra::Vector3;
    use tempfile::tempdir;

    fn structure(energy: f64) -> Structure {
        let mut s = Structure::with_atoms(
            Lattice::hexagonal(3.0, 15.0),
            vec![Atom::from_symbol("Li", Vector3::new(0.5, 0.5, 7.5)).unwrap()],
        );
        s.energy = Some(energy);
        s.label = Some("cand0".into());
        s
    }

    #[test]
    fn test_append_and_read() {
        let dir = tempdir().unwrap();
        let traj = Trajectory::new(dir.path().join("pop.traj"));
        assert_eq!(traj.count().unwrap(), 0);

        traj.create().unwrap();
        traj.append(&structure(-1.0)).unwrap();
        traj.append(&structure(-3.0)).unwrap();

        let all = traj.read_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].energy, Some(-3.0));
        assert_eq!(all[0], structure(-1.0));
        assert_eq!(traj.count().unwrap(), 2);
    }

    #[test]
    fn test_create_truncates() {
        let dir = tempdir().unwrap();
        let traj = Trajectory::new(dir.path().join("pop.traj"));
        traj.write(&[structure(1.0), structure(2.0)]).unwrap();
        traj.create().unwrap();
        assert!(traj.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_line() {
        let dir = tempdir().unwrap();
        let traj = Trajectory::new(dir.path().join("bad.traj"));
        traj.append(&structure(1.0)).unwrap();
        std::fs::write(
            traj.path(),
            format!(
                "{}\n{{not json\n",
                serde_json::to_string(&structure(1.0)).unwrap()
            ),
        )
        .unwrap();

        assert!(matches!(
            traj.read_all(),
            Err(StoreError::Malformed { line: 2, .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let traj = Trajectory::new(dir.path().join("none.traj"));
        assert!(matches!(traj.read_all(), Err(StoreError::Io { .. })));
    }
}
