//! Random interstitial placement by bounded rejection sampling.

use nalgebra::Vector3;
use rand::prelude::*;

use crate::compute::geometry::{
    CollisionRule, ImagePool, collides_with_own_images, random_point_in_cell,
};
use crate::compute::host::{HostBuilder, HostError};
use crate::schema::{Atom, Lattice, RunConfig, Structure, elements};

/// Settings shared by the structure operators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperatorSettings {
    /// Collision rule for every distance test.
    pub rule: CollisionRule,
    /// Rejected samples allowed before an operator gives up.
    pub max_attempts: usize,
    /// Distance from the midplane within which an atom is interstitial.
    pub midplane_tolerance: f64,
}

impl Default for OperatorSettings {
    fn default() -> Self {
        Self {
            rule: CollisionRule::default(),
            max_attempts: 10_000,
            midplane_tolerance: 0.1,
        }
    }
}

impl From<&RunConfig> for OperatorSettings {
    fn from(config: &RunConfig) -> Self {
        Self {
            rule: CollisionRule::new(config.shrink_factor, config.collision_tolerance),
            max_attempts: config.max_placement_attempts,
            midplane_tolerance: config.midplane_tolerance,
        }
    }
}

/// Errors raised by the structure operators. All are recoverable per candidate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlacementError {
    #[error(
        "Placement infeasible: placed {placed} of {requested} atoms, \
         no free position after {attempts} attempts"
    )]
    Infeasible {
        placed: usize,
        requested: usize,
        attempts: usize,
    },
    #[error("Structure has no interstitial atoms")]
    NoInterstitials,
    #[error("Cannot exchange {n_exchange} atoms, parent has only {available} interstitial atoms")]
    ExchangeTooLarge { n_exchange: usize, available: usize },
    #[error("Unknown element symbol `{0}`")]
    UnknownElement(String),
    #[error("Need {needed} parents, breeding pool has {found}")]
    NotEnoughParents { needed: usize, found: usize },
    #[error(transparent)]
    Host(#[from] HostError),
}

impl PlacementError {
    /// Whether the error signals that the cell is too crowded.
    pub fn is_infeasible(&self) -> bool {
        matches!(self, PlacementError::Infeasible { .. })
    }
}

/// Random number generator wrapper for structure operations.
pub struct StructureRng {
    pub(super) rng: StdRng,
}

impl StructureRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create with random seed.
    pub fn random() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Generate a random structure: a fresh host with `n_atoms` interstitial
    /// atoms of `species` placed without collisions.
    ///
    /// Each atom is checked against every host atom and every previously
    /// placed atom, including their periodic images.
    pub fn random_structure(
        &mut self,
        host: &HostBuilder,
        species: &str,
        n_atoms: usize,
        settings: &OperatorSettings,
    ) -> Result<Structure, PlacementError> {
        let number = elements::atomic_number(species)
            .ok_or_else(|| PlacementError::UnknownElement(species.to_string()))?;

        let mut structure = host.build();
        let lattice = structure.lattice;
        let mut pool = ImagePool::from_atoms(&lattice, &structure.atoms);

        for placed in 0..n_atoms {
            let atom = self
                .place_one(&lattice, number, &pool, settings)
                .ok_or(PlacementError::Infeasible {
                    placed,
                    requested: n_atoms,
                    attempts: settings.max_attempts,
                })?;
            pool.add(&lattice, &atom);
            structure.push(atom);
        }

        Ok(structure)
    }

    /// Sample midplane positions until one is free of `pool` and of the
    /// atom's own periodic images. `None` once the attempt cap is reached.
    pub(super) fn place_one(
        &mut self,
        lattice: &Lattice,
        number: u8,
        pool: &ImagePool,
        settings: &OperatorSettings,
    ) -> Option<Atom> {
        let probe = Atom::new(number, Vector3::zeros());
        if collides_with_own_images(&probe, lattice, &settings.rule) {
            return None;
        }

        for _ in 0..settings.max_attempts {
            let candidate = Atom::new(number, random_point_in_cell(lattice, &mut self.rng));
            if !pool.collides(&candidate, &settings.rule) {
                return Some(candidate);
            }
        }
        None
    }

    /// Uniform index in `0..len`.
    pub fn index(&mut self, len: usize) -> Option<usize> {
        (len > 0).then(|| self.rng.gen_range(0..len))
    }

    /// Two distinct indices in `0..len`, drawn without replacement.
    pub fn distinct_pair(&mut self, len: usize) -> Option<(usize, usize)> {
        if len < 2 {
            return None;
        }
        let picked = rand::seq::index::sample(&mut self.rng, len, 2);
        Some((picked.index(0), picked.index(1)))
    }

    /// Uniform `k`-subset of `0..n` in ascending order. Requires `k <= n`.
    pub fn subset(&mut self, n: usize, k: usize) -> Vec<usize> {
        sorted_subset(&mut self.rng, n, k)
    }
}

/// Uniform `k`-subset of `0..n` in ascending order. Requires `k <= n`.
pub fn sorted_subset<R: Rng + ?Sized>(rng: &mut R, n: usize, k: usize) -> Vec<usize> {
    let mut subset = rand::seq::index::sample(rng, n, k).into_vec();
    subset.sort_unstable();
    subset
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::compute::geometry::{ImagePool, collides_periodic};
    use crate::schema::LateralSize;
    use proptest::prelude::*;

    /// MoS2-like single layer used across operator tests.
    pub(crate) fn template() -> Structure {
        Structure::with_atoms(
            Lattice::hexagonal(3.19, 12.3),
            vec![
                Atom::from_symbol("Mo", Vector3::new(0.0, 0.0, 3.07)).unwrap(),
                Atom::from_symbol("S", Vector3::new(1.595, 0.921, 1.5)).unwrap(),
                Atom::from_symbol("S", Vector3::new(1.595, 0.921, 4.64)).unwrap(),
            ],
        )
    }

    pub(crate) fn host(n: usize) -> HostBuilder {
        HostBuilder::new(&template(), LateralSize::new(n, n), 1.4).unwrap()
    }

    #[test]
    fn test_random_structure() {
        let mut rng = StructureRng::new(42);
        let host = host(4);
        let settings = OperatorSettings::default();

        let s = rng.random_structure(&host, "Li", 5, &settings).unwrap();
        assert_eq!(s.len(), host.host_len() + 5);

        let inter = s.interstitial_atoms(settings.midplane_tolerance);
        assert_eq!(inter.len(), 5);
        assert!(inter.iter().all(|a| a.symbol == "Li"));
        // Interstitial atoms are appended last
        assert_eq!(s.interstitial_indices(0.1), (host.host_len()..s.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_collision_invariant() {
        let mut rng = StructureRng::new(3);
        let host = host(4);
        let settings = OperatorSettings::default();

        for _ in 0..10 {
            let s = rng.random_structure(&host, "Li", 6, &settings).unwrap();
            let inter = s.interstitial_atoms(0.1);
            assert!(!collides_periodic(&inter, &s.lattice, &settings.rule));
        }
    }

    #[test]
    fn test_host_untouched() {
        let mut rng = StructureRng::new(9);
        let host = host(3);
        let s = rng
            .random_structure(&host, "Na", 3, &OperatorSettings::default())
            .unwrap();
        assert_eq!(&s.atoms[..host.host_len()], &host.build().atoms[..]);
    }

    #[test]
    fn test_infeasible_small_cell() {
        // 2-atom layer, 2x2 => 8-atom host in a cell too small for one Li
        let template = Structure::with_atoms(
            Lattice::hexagonal(1.0, 10.0),
            vec![
                Atom::from_symbol("C", Vector3::new(0.0, 0.0, 2.0)).unwrap(),
                Atom::from_symbol("C", Vector3::new(0.5, 0.3, 3.0)).unwrap(),
            ],
        );
        let host = HostBuilder::new(&template, LateralSize::new(2, 2), 1.4).unwrap();
        assert_eq!(host.host_len(), 8);

        let settings = OperatorSettings {
            max_attempts: 50,
            ..Default::default()
        };
        let mut rng = StructureRng::new(1);
        let err = rng.random_structure(&host, "Li", 1, &settings).unwrap_err();
        assert!(err.is_infeasible());
        assert!(matches!(
            err,
            PlacementError::Infeasible {
                placed: 0,
                requested: 1,
                attempts: 50
            }
        ));
    }

    #[test]
    fn test_overcrowded_request() {
        let settings = OperatorSettings {
            max_attempts: 200,
            ..Default::default()
        };
        let mut rng = StructureRng::new(5);
        let err = rng
            .random_structure(&host(2), "Cs", 40, &settings)
            .unwrap_err();
        assert!(matches!(err, PlacementError::Infeasible { requested: 40, .. }));
    }

    #[test]
    fn test_unknown_species() {
        let mut rng = StructureRng::new(5);
        let err = rng
            .random_structure(&host(2), "Zz", 1, &OperatorSettings::default())
            .unwrap_err();
        assert_eq!(err, PlacementError::UnknownElement("Zz".into()));
    }

    #[test]
    fn test_reproducible() {
        let host = host(3);
        let settings = OperatorSettings::default();
        let a = StructureRng::new(11)
            .random_structure(&host, "Li", 4, &settings)
            .unwrap();
        let b = StructureRng::new(11)
            .random_structure(&host, "Li", 4, &settings)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_pair() {
        let mut rng = StructureRng::new(2);
        for _ in 0..100 {
            let (i, j) = rng.distinct_pair(3).unwrap();
            assert_ne!(i, j);
            assert!(i < 3 && j < 3);
        }
        assert!(rng.distinct_pair(1).is_none());
        assert!(rng.index(0).is_none());
    }

    #[test]
    fn test_subset() {
        let mut rng = StructureRng::new(4);
        for _ in 0..100 {
            let subset = rng.subset(10, 3);
            assert_eq!(subset.len(), 3);
            assert!(subset.windows(2).all(|w| w[0] < w[1]));
            assert!(subset.iter().all(|&i| i < 10));
        }
        assert!(rng.subset(3, 0).is_empty());
        assert_eq!(rng.subset(4, 4), vec![0, 1, 2, 3]);

        // C(108, 50) has no u64 representation
        let large = rng.subset(108, 50);
        assert_eq!(large.len(), 50);
        assert!(large.windows(2).all(|w| w[0] < w[1]));
        assert!(large.iter().all(|&i| i < 108));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_placement_clears_host_and_neighbours(seed in any::<u64>(), n_atoms in 1usize..5) {
            let host = host(3);
            let settings = OperatorSettings::default();
            let s = StructureRng::new(seed)
                .random_structure(&host, "Li", n_atoms, &settings)
                .unwrap();

            let inter = s.interstitial_atoms(settings.midplane_tolerance);
            prop_assert_eq!(inter.len(), n_atoms);
            prop_assert!(!collides_periodic(&inter, &s.lattice, &settings.rule));

            let pool = ImagePool::from_atoms(&s.lattice, &host.build().atoms);
            prop_assert!(inter.iter().all(|a| !pool.collides(a, &settings.rule)));
            prop_assert_eq!(&s.atoms[..host.host_len()], &host.build().atoms[..]);
        }
    }
}
