//! Single-atom relocation within the interstitial plane.

use crate::compute::geometry::ImagePool;
use crate::schema::Structure;

use super::placement::{OperatorSettings, PlacementError, StructureRng};

impl StructureRng {
    /// Move one randomly chosen interstitial atom to a new collision-free
    /// position on the midplane.
    ///
    /// The removed atom's species is reused and the new atom is appended
    /// last. Every other atom keeps its position, so the host layers of the
    /// input are carried over as-is. The result carries no energy or label.
    pub fn mutate(
        &mut self,
        structure: &Structure,
        settings: &OperatorSettings,
    ) -> Result<Structure, PlacementError> {
        let indices = structure.interstitial_indices(settings.midplane_tolerance);
        let slot = self.index(indices.len()).ok_or(PlacementError::NoInterstitials)?;

        let mut mutated = structure.clone();
        mutated.energy = None;
        mutated.label = None;
        let removed = mutated.atoms.remove(indices[slot]);

        let lattice = mutated.lattice;
        let pool = ImagePool::from_atoms(&lattice, &mutated.atoms);
        let mut atom = self
            .place_one(&lattice, removed.number, &pool, settings)
            .ok_or(PlacementError::Infeasible {
                placed: indices.len() - 1,
                requested: indices.len(),
                attempts: settings.max_attempts,
            })?;
        atom.magmom = removed.magmom;
        mutated.push(atom);

        Ok(mutated)
    }
}
