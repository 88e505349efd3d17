//! Atomic structure types: lattice cell, atoms, and structures.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::elements;

/// Parallelepiped repeat unit described by three lattice vectors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    /// Lattice vectors `[a, b, c]` in Cartesian coordinates (Å).
    pub vectors: [Vector3<f64>; 3],
}

impl Lattice {
    /// Create a lattice from its three vectors.
    pub fn new(a: Vector3<f64>, b: Vector3<f64>, c: Vector3<f64>) -> Self {
        Self { vectors: [a, b, c] }
    }

    /// Hexagonal lattice with in-plane constant `a` and height `c`.
    ///
    /// The b vector sits at 120° from a, the conventional hexagonal setting.
    pub fn hexagonal(a: f64, c: f64) -> Self {
        let angle = 120f64.to_radians();
        Self::new(
            Vector3::new(a, 0.0, 0.0),
            Vector3::new(a * angle.cos(), a * angle.sin(), 0.0),
            Vector3::new(0.0, 0.0, c),
        )
    }

    /// Length of the a vector.
    pub fn a(&self) -> f64 {
        self.vectors[0].norm()
    }

    /// Length of the b vector.
    pub fn b(&self) -> f64 {
        self.vectors[1].norm()
    }

    /// Length of the c vector.
    pub fn c(&self) -> f64 {
        self.vectors[2].norm()
    }

    /// Height of the interstitial midplane.
    pub fn midplane(&self) -> f64 {
        self.c() / 2.0
    }

    /// Scale the c vector in place, leaving atom positions untouched.
    pub fn scale_c(&mut self, factor: f64) {
        self.vectors[2] *= factor;
    }
}

/// A single atom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    /// Element symbol.
    pub symbol: String,
    /// Atomic number.
    pub number: u8,
    /// Cartesian position (Å).
    pub position: Vector3<f64>,
    /// Initial magnetic moment, if assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magmom: Option<f64>,
}

impl Atom {
    /// Create an atom from its atomic number.
    pub fn new(number: u8, position: Vector3<f64>) -> Self {
        Self {
            symbol: elements::symbol(number).to_string(),
            number,
            position,
            magmom: None,
        }
    }

    /// Create an atom from an element symbol. Returns `None` for unknown symbols.
    pub fn from_symbol(symbol: &str, position: Vector3<f64>) -> Option<Self> {
        elements::atomic_number(symbol).map(|number| Self::new(number, position))
    }

    /// Covalent radius of this atom's species.
    pub fn covalent_radius(&self) -> f64 {
        elements::covalent_radius(self.number)
    }

    /// Copy of this atom moved by `offset`.
    pub fn translated(&self, offset: Vector3<f64>) -> Self {
        Self {
            position: self.position + offset,
            ..self.clone()
        }
    }

    /// Whether the atom lies in the interstitial midplane of `lattice`.
    pub fn is_interstitial(&self, lattice: &Lattice, tolerance: f64) -> bool {
        (self.position.z - lattice.midplane()).abs() <= tolerance
    }
}

/// A cell plus its atoms, optionally carrying an evaluated energy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    /// Repeat unit.
    pub lattice: Lattice,
    /// Atoms in insertion order. Freshly built candidates list interstitial atoms last.
    pub atoms: Vec<Atom>,
    /// Periodic boundary flags along a, b, c.
    #[serde(default = "default_pbc")]
    pub pbc: [bool; 3],
    /// Potential energy (eV), present only after successful evaluation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<f64>,
    /// Origin tag within a population (`best`, `child3`, `mut1`, `cand7`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

fn default_pbc() -> [bool; 3] {
    [true, true, true]
}

impl Structure {
    /// Empty structure with the given lattice.
    pub fn new(lattice: Lattice) -> Self {
        Self {
            lattice,
            atoms: Vec::new(),
            pbc: default_pbc(),
            energy: None,
            label: None,
        }
    }

    /// Structure with the given lattice and atoms.
    pub fn with_atoms(lattice: Lattice, atoms: Vec<Atom>) -> Self {
        Self {
            atoms,
            ..Self::new(lattice)
        }
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn push(&mut self, atom: Atom) {
        self.atoms.push(atom);
    }

    /// Indices of atoms lying in the interstitial midplane.
    pub fn interstitial_indices(&self, tolerance: f64) -> Vec<usize> {
        self.atoms
            .iter()
            .enumerate()
            .filter(|(_, atom)| atom.is_interstitial(&self.lattice, tolerance))
            .map(|(i, _)| i)
            .collect()
    }

    /// Clones of the atoms lying in the interstitial midplane.
    pub fn interstitial_atoms(&self, tolerance: f64) -> Vec<Atom> {
        self.atoms
            .iter()
            .filter(|atom| atom.is_interstitial(&self.lattice, tolerance))
            .cloned()
            .collect()
    }

    /// Clones of the host-layer atoms (everything outside the midplane).
    pub fn host_atoms(&self, tolerance: f64) -> Vec<Atom> {
        self.atoms
            .iter()
            .filter(|atom| !atom.is_interstitial(&self.lattice, tolerance))
            .cloned()
            .collect()
    }

    /// Lateral supercell `n × m × 1`.
    ///
    /// Atoms are laid out block by block, the a-offset varying slowest.
    pub fn repeat(&self, n: usize, m: usize) -> Self {
        let [a, b, c] = self.lattice.vectors;
        let mut atoms = Vec::with_capacity(self.atoms.len() * n * m);
        for i in 0..n {
            for j in 0..m {
                let offset = a * i as f64 + b * j as f64;
                atoms.extend(self.atoms.iter().map(|atom| atom.translated(offset)));
            }
        }

        Self {
            lattice: Lattice::new(a * n as f64, b * m as f64, c),
            atoms,
            pbc: self.pbc,
            energy: None,
            label: None,
        }
    }

    /// Assign initial magnetic moments: zero for all atoms except the last
    /// `n_last`, which receive `moment`.
    pub fn set_initial_magmoms(&mut self, n_last: usize, moment: f64) {
        let split = self.atoms.len().saturating_sub(n_last);
        for (i, atom) in self.atoms.iter_mut().enumerate() {
            atom.magmom = Some(if i < split { 0.0 } else { moment });
        }
    }

    /// Initial magnetic moments aligned one-to-one with atoms.
    pub fn initial_magmoms(&self) -> Vec<f64> {
        self.atoms.iter().map(|a| a.magmom.unwrap_or(0.0)).collect()
    }

    /// Cartesian positions of all atoms.
    pub fn positions(&self) -> Vec<Vector3<f64>> {
        self.atoms.iter().map(|a| a.position).collect()
    }
}
