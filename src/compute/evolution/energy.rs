//! Energy ordering and summary statistics of a population.

use std::fmt::Write as _;
use std::io;
use std::path::Path;

use crate::schema::Structure;

/// Round an energy to 4 decimal places.
pub fn round_energy(energy: f64) -> f64 {
    (energy * 1e4).round() / 1e4
}

/// Sort ascending by energy. Stable; structures without energy go last.
pub fn sort_population(population: &mut [Structure]) {
    population.sort_by(|a, b| match (a.energy, b.energy) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

/// Energies of a sorted population with their sum, mean and minimum.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergySummary {
    pub energies: Vec<f64>,
    pub sum: f64,
    pub mean: f64,
    pub min: f64,
}

impl EnergySummary {
    /// Summarize the energies of `population` in their given order.
    /// `None` if the population is empty.
    pub fn from_population(population: &[Structure]) -> Option<Self> {
        let energies: Vec<f64> = population.iter().filter_map(|s| s.energy).collect();
        if energies.is_empty() {
            return None;
        }
        let sum: f64 = energies.iter().sum();
        let mean = sum / energies.len() as f64;
        let min = energies.iter().copied().fold(f64::INFINITY, f64::min);
        Some(Self {
            energies,
            sum,
            mean,
            min,
        })
    }

    /// One `rank<TAB>energy` line per structure, ranks counted from 1, a
    /// blank line, then the sum, mean and minimum.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (index, energy) in self.energies.iter().enumerate() {
            let _ = writeln!(out, "{}\t{energy:.4}", index + 1);
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "Sum: {:.4}", self.sum);
        let _ = writeln!(out, "Mean: {:.4}", self.mean);
        let _ = writeln!(out, "Min: {:.4}", self.min);
        out
    }

    /// Write the rendered summary to `path`, replacing any existing file.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        std::fs::write(path, self.render())
    }
}
