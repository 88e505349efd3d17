//! Two-layer host lattice construction.

use crate::schema::{LateralSize, Lattice, Structure};

/// Errors building a host structure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HostError {
    #[error("Lateral size must be positive, got {n}x{m}")]
    InvalidSize { n: usize, m: usize },
    #[error("Template structure has no atoms")]
    EmptyTemplate,
    #[error("z expansion factor must be positive, got {0}")]
    InvalidExpansion(f64),
}

/// Build the two-layer host from a single-layer template.
///
/// The c vector is scaled by `z_expansion` (atom positions unchanged), every
/// atom is mirrored to `z' = c_z − z`, and the two-layer unit is repeated
/// `n × m × 1`.
pub fn build_host(
    template: &Structure,
    n: usize,
    m: usize,
    z_expansion: f64,
) -> Result<Structure, HostError> {
    if n == 0 || m == 0 {
        return Err(HostError::InvalidSize { n, m });
    }
    if template.is_empty() {
        return Err(HostError::EmptyTemplate);
    }
    if z_expansion <= 0.0 {
        return Err(HostError::InvalidExpansion(z_expansion));
    }

    let mut unit = template.clone();
    unit.energy = None;
    unit.label = None;
    unit.lattice.scale_c(z_expansion);

    let c_z = unit.lattice.vectors[2].z;
    let mirrored: Vec<_> = unit
        .atoms
        .iter()
        .map(|atom| {
            let mut copy = atom.clone();
            copy.position.z = c_z - atom.position.z;
            copy
        })
        .collect();
    unit.atoms.extend(mirrored);

    Ok(unit.repeat(n, m))
}

/// Hands out fresh copies of the host for one template and lateral size.
///
/// Host construction is deterministic, so the host is built once and cloned.
#[derive(Debug, Clone)]
pub struct HostBuilder {
    host: Structure,
    size: LateralSize,
}

impl HostBuilder {
    pub fn new(
        template: &Structure,
        size: LateralSize,
        z_expansion: f64,
    ) -> Result<Self, HostError> {
        let host = build_host(template, size.n, size.m, z_expansion)?;
        Ok(Self { host, size })
    }

    /// A fresh host structure.
    pub fn build(&self) -> Structure {
        self.host.clone()
    }

    /// The host lattice.
    pub fn lattice(&self) -> &Lattice {
        &self.host.lattice
    }

    pub fn size(&self) -> LateralSize {
        self.size
    }

    /// Atoms in every host built by this builder.
    pub fn host_len(&self) -> usize {
        self.host.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Atom;
    use nalgebra::Vector3;

    fn template() -> Structure {
        Structure::with_atoms(
            Lattice::hexagonal(3.19, 12.0),
            vec![
                Atom::from_symbol("Mo", Vector3::new(0.0, 0.0, 3.0)).unwrap(),
                Atom::from_symbol("S", Vector3::new(1.595, 0.921, 1.4)).unwrap(),
            ],
        )
    }

    #[test]
    fn test_two_atom_template_2x2() {
        let host = build_host(&template(), 2, 2, 1.4).unwrap();
        assert_eq!(host.len(), 8);
        assert!((host.lattice.c() - 16.8).abs() < 1e-9);
        assert!((host.lattice.a() - 6.38).abs() < 1e-9);
    }

    #[test]
    fn test_mirrored_layer() {
        let host = build_host(&template(), 1, 1, 1.4).unwrap();
        assert_eq!(host.len(), 4);
        assert!((host.atoms[0].position.z - 3.0).abs() < 1e-12);
        assert!((host.atoms[2].position.z - (16.8 - 3.0)).abs() < 1e-9);
        assert!((host.atoms[3].position.z - (16.8 - 1.4)).abs() < 1e-9);
        assert_eq!(host.atoms[2].symbol, "Mo");
        // No host atom sits at the midplane
        assert!(host.interstitial_indices(0.1).is_empty());
    }

    #[test]
    fn test_deterministic() {
        let a = build_host(&template(), 3, 2, 1.4).unwrap();
        let b = build_host(&template(), 3, 2, 1.4).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_size() {
        assert!(matches!(
            build_host(&template(), 0, 2, 1.4),
            Err(HostError::InvalidSize { n: 0, m: 2 })
        ));
        assert!(matches!(
            build_host(&Structure::new(Lattice::hexagonal(3.0, 10.0)), 1, 1, 1.4),
            Err(HostError::EmptyTemplate)
        ));
    }

    #[test]
    fn test_builder() {
        let builder = HostBuilder::new(&template(), LateralSize::new(2, 3), 1.4).unwrap();
        let host = builder.build();
        assert_eq!(host.len(), builder.host_len());
        assert_eq!(host.len(), 24);
    }
}
