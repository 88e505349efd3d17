//! Combinatorial enumeration of interstitial arrangements over fixed sites.
//!
//! Random `n`-subsets of a site list are drawn with replacement, screened for
//! periodic collisions, and kept when no earlier kept structure is
//! equivalent under a [`StructureMatcher`].

use std::path::{Path, PathBuf};

use rand::prelude::*;
use rayon::prelude::*;

use crate::compute::evolution::sorted_subset;
use crate::compute::geometry::{CollisionRule, collides_periodic, minimum_image_distance};
use crate::compute::host::{HostBuilder, HostError};
use crate::schema::{Atom, CombiConfig, Structure};
use crate::trajectory::{LoadError, StoreError, Trajectory, load_structure};

/// Errors of an enumeration run.
#[derive(Debug, thiserror::Error)]
pub enum EnumerationError {
    #[error("Cannot choose {n_atoms} atoms from {sites} sites")]
    NotEnoughSites { sites: usize, n_atoms: usize },
    #[error(transparent)]
    Host(#[from] HostError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Decides whether two structures are the same arrangement.
pub trait StructureMatcher: Sync {
    /// Precomputed comparison key.
    type Fingerprint: Send + Sync;

    fn fingerprint(&self, structure: &Structure) -> Self::Fingerprint;

    fn equivalent(&self, a: &Self::Fingerprint, b: &Self::Fingerprint) -> bool;

    fn fit(&self, a: &Structure, b: &Structure) -> bool {
        self.equivalent(&self.fingerprint(a), &self.fingerprint(b))
    }
}

/// Matches structures by the sorted minimum-image distances of every pair
/// that involves an interstitial atom, grouped by species pair.
///
/// Symmetric, independent of atom order and invariant under lattice
/// translations of the interstitial set that map the host onto itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FingerprintMatcher {
    /// Largest allowed difference between matching distances (Å).
    pub tolerance: f64,
    /// Distance from the midplane within which an atom is interstitial (Å).
    pub midplane_tolerance: f64,
}

impl Default for FingerprintMatcher {
    fn default() -> Self {
        Self {
            tolerance: 0.05,
            midplane_tolerance: 0.1,
        }
    }
}

/// Sorted `(species, species, distance)` entries.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceFingerprint(Vec<(u8, u8, f64)>);

impl StructureMatcher for FingerprintMatcher {
    type Fingerprint = DistanceFingerprint;

    fn fingerprint(&self, structure: &Structure) -> DistanceFingerprint {
        let lattice = &structure.lattice;
        let interstitial: Vec<bool> = structure
            .atoms
            .iter()
            .map(|a| a.is_interstitial(lattice, self.midplane_tolerance))
            .collect();

        let mut entries = Vec::new();
        for (i, a) in structure.atoms.iter().enumerate() {
            for (j, b) in structure.atoms.iter().enumerate().skip(i + 1) {
                if !interstitial[i] && !interstitial[j] {
                    continue;
                }
                let key = (a.number.min(b.number), a.number.max(b.number));
                let d = minimum_image_distance(lattice, &a.position, &b.position);
                entries.push((key.0, key.1, d));
            }
        }
        entries.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)).then(x.2.total_cmp(&y.2)));
        DistanceFingerprint(entries)
    }

    fn equivalent(&self, a: &DistanceFingerprint, b: &DistanceFingerprint) -> bool {
        a.0.len() == b.0.len()
            && a.0.iter().zip(&b.0).all(|(x, y)| {
                x.0 == y.0 && x.1 == y.1 && (x.2 - y.2).abs() <= self.tolerance
            })
    }
}

fn splice(host: &HostBuilder, sites: &[Atom], subset: &[usize]) -> Structure {
    let mut structure = host.build();
    structure
        .atoms
        .extend(subset.iter().map(|&i| sites[i].clone()));
    structure
}

/// Draw `draw_count` random `n_atoms`-subsets of `sites` and return the
/// collision-free, mutually inequivalent structures in draw order.
///
/// Collision screening and fingerprinting run in parallel; the uniqueness
/// filter is sequential, so the result does not depend on thread count.
pub fn enumerate_candidates<M: StructureMatcher, R: Rng>(
    host: &HostBuilder,
    sites: &[Atom],
    n_atoms: usize,
    draw_count: usize,
    rule: &CollisionRule,
    matcher: &M,
    rng: &mut R,
) -> Result<Vec<Structure>, EnumerationError> {
    if n_atoms > sites.len() {
        return Err(EnumerationError::NotEnoughSites {
            sites: sites.len(),
            n_atoms,
        });
    }
    let draws: Vec<Vec<usize>> = (0..draw_count)
        .map(|_| sorted_subset(rng, sites.len(), n_atoms))
        .collect();

    let lattice = *host.lattice();
    let screened: Vec<Option<M::Fingerprint>> = draws
        .par_iter()
        .map(|subset| {
            let atoms: Vec<Atom> = subset.iter().map(|&i| sites[i].clone()).collect();
            if collides_periodic(&atoms, &lattice, rule) {
                return None;
            }
            Some(matcher.fingerprint(&splice(host, sites, subset)))
        })
        .collect();

    let mut kept: Vec<(usize, M::Fingerprint)> = Vec::new();
    for (index, fingerprint) in screened.into_iter().enumerate() {
        let Some(fingerprint) = fingerprint else {
            continue;
        };
        if !kept.iter().any(|(_, k)| matcher.equivalent(k, &fingerprint)) {
            kept.push((index, fingerprint));
        }
    }

    log::info!(
        "{} of {} draws kept as unique structures",
        kept.len(),
        draws.len()
    );
    Ok(kept
        .into_iter()
        .map(|(index, _)| splice(host, sites, &draws[index]))
        .collect())
}

/// Summary of an enumeration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumerationReport {
    pub unique: usize,
    pub output: PathBuf,
}

/// Run the enumerator for `config`, resolving file names against `base`,
/// and write the unique structures to `base/{size}_{n}a.traj`.
pub fn run_enumeration(
    config: &CombiConfig,
    base: &Path,
) -> Result<EnumerationReport, EnumerationError> {
    let template = load_structure(base.join(&config.struct_filename))?;
    let host = HostBuilder::new(&template, config.size, config.z_expansion)?;

    let unit_sites = load_structure(base.join(&config.positions_filename))?;
    let sites = unit_sites.repeat(config.size.n, config.size.m);
    let off_plane = sites
        .atoms
        .iter()
        .filter(|a| !a.is_interstitial(host.lattice(), config.midplane_tolerance))
        .count();
    if off_plane > 0 {
        log::warn!("{off_plane} sites lie outside the interstitial midplane");
    }

    let mut rng = match config.random_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let matcher = FingerprintMatcher {
        tolerance: config.match_tolerance,
        midplane_tolerance: config.midplane_tolerance,
    };
    let rule = CollisionRule::new(config.shrink_factor, config.collision_tolerance);

    let unique = enumerate_candidates(
        &host,
        &sites.atoms,
        config.n_atoms,
        config.draw_range,
        &rule,
        &matcher,
        &mut rng,
    )?;

    let output = base.join(config.output_filename());
    Trajectory::new(&output).write(&unique)?;
    println!("Final number of unique structures: {}", unique.len());

    Ok(EnumerationReport {
        unique: unique.len(),
        output,
    })
}
