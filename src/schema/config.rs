//! Run configuration for the evolutionary search and the enumerator.
//!
//! Configuration files use a flat `key = value` format: one assignment per
//! line, `#` starts a comment, blank lines are skipped. Values are coerced to
//! an integer, then a float, and otherwise kept as a string. The parsed map
//! is handed to serde, so the same structs can also be loaded from JSON.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use super::elements;

/// Lateral supercell size, written `"NxM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LateralSize {
    /// Repeats along a.
    pub n: usize,
    /// Repeats along b.
    pub m: usize,
}

impl LateralSize {
    pub fn new(n: usize, m: usize) -> Self {
        Self { n, m }
    }
}

impl FromStr for LateralSize {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidSize(s.to_string());
        let (n, m) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let n: usize = n.trim().parse().map_err(|_| invalid())?;
        let m: usize = m.trim().parse().map_err(|_| invalid())?;
        if n == 0 || m == 0 {
            return Err(invalid());
        }
        Ok(Self { n, m })
    }
}

impl TryFrom<String> for LateralSize {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<LateralSize> for String {
    fn from(size: LateralSize) -> Self {
        size.to_string()
    }
}

impl fmt::Display for LateralSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.n, self.m)
    }
}

/// A coerced configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl ConfigValue {
    /// Coerce raw text: integer first, then float, otherwise string.
    pub fn coerce(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            ConfigValue::Int(i)
        } else if let Ok(f) = raw.parse::<f64>() {
            ConfigValue::Float(f)
        } else {
            ConfigValue::Str(raw.to_string())
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            ConfigValue::Int(i) => serde_json::Value::from(*i),
            ConfigValue::Float(f) => serde_json::Value::from(*f),
            ConfigValue::Str(s) => serde_json::Value::from(s.as_str()),
        }
    }
}

/// Parse `key = value` text into a map of coerced values.
pub fn parse_key_values(text: &str) -> Result<BTreeMap<String, ConfigValue>, ConfigError> {
    let mut values = BTreeMap::new();

    for (i, line) in text.lines().enumerate() {
        let content = line.split('#').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }

        let Some((key, value)) = content.split_once('=') else {
            return Err(ConfigError::Syntax {
                line: i + 1,
                content: content.to_string(),
            });
        };

        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::Syntax {
                line: i + 1,
                content: content.to_string(),
            });
        }
        values.insert(key.to_string(), ConfigValue::coerce(value.trim()));
    }

    Ok(values)
}

/// Load a config struct from a key=value file or, for `.json` files, from JSON.
fn load<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if path.extension().is_some_and(|e| e == "json") {
        return Ok(serde_json::from_str(&text)?);
    }

    from_key_values(&text)
}

/// Deserialize a config struct from key=value text.
pub fn from_key_values<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T, ConfigError> {
    let object: serde_json::Map<String, serde_json::Value> = parse_key_values(text)?
        .into_iter()
        .map(|(k, v)| (k, v.to_json()))
        .collect();
    Ok(serde_json::from_value(serde_json::Value::Object(object))?)
}

/// Accept strings that coercion may have turned into numbers (e.g. `label = 2`).
fn stringish<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stringish {
        Str(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Stringish::deserialize(deserializer)? {
        Stringish::Str(s) => s,
        Stringish::Int(i) => i.to_string(),
        Stringish::Float(f) => f.to_string(),
    })
}

fn default_max_placement_attempts() -> usize {
    10_000
}
fn default_shrink_factor() -> f64 {
    0.9
}
fn default_collision_tolerance() -> f64 {
    0.1
}
fn default_midplane_tolerance() -> f64 {
    0.1
}
fn default_z_expansion() -> f64 {
    1.4
}
fn default_parallel_evaluations() -> usize {
    1
}
fn default_match_tolerance() -> f64 {
    0.05
}

/// Configuration of an evolutionary run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Total number of generations, including the random generation 0.
    pub n_generations: usize,
    /// Individuals per generation.
    pub pop_size: usize,
    /// Survivors carried over unchanged.
    pub n_best: usize,
    /// Children produced by crossover.
    pub n_child: usize,
    /// Individuals produced by mutation.
    pub n_mut: usize,
    /// Single-layer template structure file (extended XYZ or `.traj`).
    #[serde(deserialize_with = "stringish")]
    pub struct_filename: String,
    /// Lateral supercell size.
    pub size: LateralSize,
    /// Interstitial atoms per structure.
    pub n_atoms: usize,
    /// Atoms exchanged between parents during crossover.
    pub n_change: usize,
    /// Interstitial species.
    #[serde(deserialize_with = "stringish")]
    pub atom_symbol: String,
    /// Initial magnetic moment of interstitial atoms.
    pub mag_moment: f64,
    /// Evaluator label, used to name evaluator files.
    #[serde(deserialize_with = "stringish")]
    pub label: String,

    /// External evaluator command line, run inside each candidate folder.
    #[serde(default)]
    pub evaluator_command: Option<String>,
    /// Evaluator timeout in seconds.
    #[serde(default)]
    pub evaluator_timeout: Option<f64>,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Rejected samples allowed per placement before giving up.
    #[serde(default = "default_max_placement_attempts")]
    pub max_placement_attempts: usize,
    /// Consecutive failed candidates tolerated per quota bucket (0 = unlimited).
    #[serde(default)]
    pub max_consecutive_failures: usize,
    /// Covalent radius shrink factor for collision tests.
    #[serde(default = "default_shrink_factor")]
    pub shrink_factor: f64,
    /// Absolute tolerance added to the shrunk radius sum (Å).
    #[serde(default = "default_collision_tolerance")]
    pub collision_tolerance: f64,
    /// Distance from the midplane within which an atom is interstitial (Å).
    #[serde(default = "default_midplane_tolerance")]
    pub midplane_tolerance: f64,
    /// Factor applied to the template's c vector before mirroring.
    #[serde(default = "default_z_expansion")]
    pub z_expansion: f64,
    /// Candidates evaluated concurrently within a quota bucket.
    #[serde(default = "default_parallel_evaluations")]
    pub parallel_evaluations: usize,
}

impl RunConfig {
    /// Load from a key=value file (or JSON) and validate.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = load(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Size of the breeding pool, ⌈pop_size / 2⌉.
    pub fn breeding_pool_size(&self) -> usize {
        self.pop_size.div_ceil(2)
    }

    /// Random individuals filling the rest of a bred generation.
    pub fn n_random(&self) -> usize {
        self.pop_size
            .saturating_sub(self.n_best + self.n_child + self.n_mut)
    }

    /// Template path resolved against `base`.
    pub fn template_path(&self, base: &Path) -> PathBuf {
        base.join(&self.struct_filename)
    }

    /// Evaluator timeout as a `Duration`. Rejects values that are not
    /// positive or do not fit in a `Duration`.
    pub fn timeout(&self) -> Result<Option<Duration>, ConfigError> {
        let Some(seconds) = self.evaluator_timeout else {
            return Ok(None);
        };
        if seconds <= 0.0 {
            return Err(ConfigError::Invalid("evaluator_timeout must be positive".into()));
        }
        Duration::try_from_secs_f64(seconds)
            .map(Some)
            .map_err(|e| ConfigError::Invalid(format!("evaluator_timeout {seconds}: {e}")))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_generations == 0 {
            return Err(ConfigError::Invalid("n_generations must be at least 1".into()));
        }
        if self.pop_size == 0 {
            return Err(ConfigError::Invalid("pop_size must be at least 1".into()));
        }
        if self.n_best + self.n_child + self.n_mut > self.pop_size {
            return Err(ConfigError::Invalid(format!(
                "n_best + n_child + n_mut ({}) exceeds pop_size ({})",
                self.n_best + self.n_child + self.n_mut,
                self.pop_size
            )));
        }
        if self.n_best > self.breeding_pool_size() {
            return Err(ConfigError::Invalid(format!(
                "n_best ({}) exceeds the breeding pool ({})",
                self.n_best,
                self.breeding_pool_size()
            )));
        }
        if self.n_generations > 1 && self.n_child > 0 && self.breeding_pool_size() < 2 {
            return Err(ConfigError::Invalid(
                "crossover needs a breeding pool of at least 2 (pop_size >= 3)".into(),
            ));
        }
        if self.n_atoms == 0 {
            return Err(ConfigError::Invalid("n_atoms must be at least 1".into()));
        }
        if self.n_change > self.n_atoms {
            return Err(ConfigError::Invalid(format!(
                "n_change ({}) exceeds n_atoms ({})",
                self.n_change, self.n_atoms
            )));
        }
        if elements::atomic_number(&self.atom_symbol).is_none() {
            return Err(ConfigError::UnknownElement(self.atom_symbol.clone()));
        }
        if self.max_placement_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_placement_attempts must be at least 1".into(),
            ));
        }
        if self.shrink_factor <= 0.0 || self.collision_tolerance < 0.0 {
            return Err(ConfigError::Invalid(
                "shrink_factor must be positive and collision_tolerance non-negative".into(),
            ));
        }
        if self.z_expansion <= 0.0 {
            return Err(ConfigError::Invalid("z_expansion must be positive".into()));
        }
        self.timeout()?;
        Ok(())
    }
}

/// Configuration of the combinatorial enumerator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombiConfig {
    /// Candidate interstitial sites of the 1×1 cell.
    #[serde(deserialize_with = "stringish")]
    pub positions_filename: String,
    /// Single-layer template structure file.
    #[serde(deserialize_with = "stringish")]
    pub struct_filename: String,
    /// Lateral supercell size.
    pub size: LateralSize,
    /// Interstitial atoms per structure.
    pub n_atoms: usize,
    /// Number of random draws.
    pub draw_range: usize,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Distance tolerance of the structure matcher (Å).
    #[serde(default = "default_match_tolerance")]
    pub match_tolerance: f64,
    #[serde(default = "default_shrink_factor")]
    pub shrink_factor: f64,
    #[serde(default = "default_collision_tolerance")]
    pub collision_tolerance: f64,
    /// Distance from the midplane within which a site atom is interstitial (Å).
    #[serde(default = "default_midplane_tolerance")]
    pub midplane_tolerance: f64,
    #[serde(default = "default_z_expansion")]
    pub z_expansion: f64,
}

impl CombiConfig {
    /// Load from a key=value file (or JSON) and validate.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = load(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Output file name, `{size}_{n_atoms}a.traj`.
    pub fn output_filename(&self) -> String {
        format!("{}_{}a.traj", self.size, self.n_atoms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_atoms == 0 {
            return Err(ConfigError::Invalid("n_atoms must be at least 1".into()));
        }
        if self.match_tolerance < 0.0 {
            return Err(ConfigError::Invalid("match_tolerance must be non-negative".into()));
        }
        Ok(())
    }
}

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Line {line}: expected `key = value`, found `{content}`")]
    Syntax { line: usize, content: String },
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid size token `{0}`, expected NxM with positive integers")]
    InvalidSize(String),
    #[error("Unknown element symbol `{0}`")]
    UnknownElement(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
