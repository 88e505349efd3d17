//! Cut-and-splice exchange of interstitial subsets between two parents.

use crate::compute::geometry::collides_periodic;
use crate::compute::host::HostBuilder;
use crate::schema::{Atom, Structure};

use super::placement::{OperatorSettings, PlacementError, StructureRng};

fn pick(atoms: &[Atom], indices: &[usize]) -> Vec<Atom> {
    indices.iter().map(|&i| atoms[i].clone()).collect()
}

/// Indices of `0..n` not contained in the sorted `subset`.
fn complement(n: usize, subset: &[usize]) -> Vec<usize> {
    (0..n).filter(|i| subset.binary_search(i).is_err()).collect()
}

impl StructureRng {
    /// Cross two parents by swapping `n_exchange` interstitial atoms.
    ///
    /// Each attempt draws a subset `Sa` from parent A and `Sb` from parent B.
    /// The first child keeps `Sa` and takes the complement of `Sb`; the
    /// second takes the complement of `Sa` and keeps `Sb`. The first of the
    /// two that is collision-free under periodic tiling is placed on a fresh
    /// host. Host atoms of the parents are discarded.
    pub fn crossover(
        &mut self,
        parent_a: &Structure,
        parent_b: &Structure,
        n_exchange: usize,
        host: &HostBuilder,
        settings: &OperatorSettings,
    ) -> Result<Structure, PlacementError> {
        let tol = settings.midplane_tolerance;
        let inter_a = parent_a.interstitial_atoms(tol);
        let inter_b = parent_b.interstitial_atoms(tol);

        for available in [inter_a.len(), inter_b.len()] {
            if n_exchange > available {
                return Err(PlacementError::ExchangeTooLarge {
                    n_exchange,
                    available,
                });
            }
        }

        let lattice = parent_a.lattice;
        for _ in 0..settings.max_attempts {
            let sub_a = self.subset(inter_a.len(), n_exchange);
            let sub_b = self.subset(inter_b.len(), n_exchange);
            let rest_a = complement(inter_a.len(), &sub_a);
            let rest_b = complement(inter_b.len(), &sub_b);

            let mut first = pick(&inter_a, &sub_a);
            first.extend(pick(&inter_b, &rest_b));
            if !collides_periodic(&first, &lattice, &settings.rule) {
                return Ok(splice(host, first));
            }

            let mut second = pick(&inter_a, &rest_a);
            second.extend(pick(&inter_b, &sub_b));
            if !collides_periodic(&second, &lattice, &settings.rule) {
                return Ok(splice(host, second));
            }
        }

        Err(PlacementError::Infeasible {
            placed: 0,
            requested: inter_b.len(),
            attempts: settings.max_attempts,
        })
    }
}

fn splice(host: &HostBuilder, interstitials: Vec<Atom>) -> Structure {
    let mut child = host.build();
    child.atoms.extend(interstitials);
    child
}
