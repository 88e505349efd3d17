//! On-disk layout of a generation and its human-readable log.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::trajectory::Trajectory;

/// Paths used by one generation labelled `L` under a run directory:
///
/// ```text
/// <root>/sorted_L.traj
/// <root>/energy_L.txt
/// <root>/L/L.traj
/// <root>/L/log_L.txt
/// <root>/L/<tag>/relaxed_<tag>.xyz
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationLayout {
    root: PathBuf,
    label: String,
}

impl GenerationLayout {
    pub fn new<P: Into<PathBuf>>(root: P, label: &str) -> Self {
        Self {
            root: root.into(),
            label: label.to_string(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder holding the generation's working files.
    pub fn dir(&self) -> PathBuf {
        self.root.join(&self.label)
    }

    /// Population in completion order.
    pub fn working(&self) -> Trajectory {
        Trajectory::new(self.dir().join(format!("{}.traj", self.label)))
    }

    /// Population sorted by energy.
    pub fn sorted(&self) -> Trajectory {
        Trajectory::new(self.root.join(format!("sorted_{}.traj", self.label)))
    }

    pub fn energy_path(&self) -> PathBuf {
        self.root.join(format!("energy_{}.txt", self.label))
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir().join(format!("log_{}.txt", self.label))
    }

    /// Working directory of one candidate.
    pub fn candidate_dir(&self, tag: &str) -> PathBuf {
        self.dir().join(tag)
    }

    /// Relaxed geometry snapshot of one candidate.
    pub fn snapshot_path(&self, tag: &str) -> PathBuf {
        self.candidate_dir(tag).join(format!("relaxed_{tag}.xyz"))
    }

    /// Whether the sorted population has been written.
    pub fn is_complete(&self) -> bool {
        self.sorted().exists()
    }

    /// Whether a working population exists to resume from.
    pub fn is_started(&self) -> bool {
        self.working().exists()
    }

    /// Create the generation folder.
    pub fn prepare(&self) -> io::Result<()> {
        fs::create_dir_all(self.dir())
    }
}

/// Progress log of a generation.
///
/// Each line is echoed once (to stdout unless another sink is given) and
/// appended to the generation's log file. The `log` facade only sees it at
/// debug level.
pub struct GenerationLog<W: Write = io::Stdout> {
    file: File,
    echo: W,
}

impl GenerationLog {
    /// Open the log of `layout` in append mode, creating folders as needed.
    pub fn open(layout: &GenerationLayout) -> io::Result<Self> {
        Self::with_echo(layout, io::stdout())
    }
}

impl<W: Write> GenerationLog<W> {
    /// Like [`GenerationLog::open`], echoing to `echo` instead of stdout.
    pub fn with_echo(layout: &GenerationLayout, echo: W) -> io::Result<Self> {
        layout.prepare()?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(layout.log_path())?;
        Ok(Self { file, echo })
    }

    pub fn line(&mut self, message: &str) -> io::Result<()> {
        log::debug!("{message}");
        self.emit(message)
    }

    /// Log a failed candidate.
    pub fn failure(&mut self, message: &str) -> io::Result<()> {
        log::debug!("candidate failed: {message}");
        self.emit(message)
    }

    pub fn into_echo(self) -> W {
        self.echo
    }

    fn emit(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.echo, "{message}")?;
        writeln!(self.file, "{message}")?;
        self.file.flush()
    }
}
