//! Cell geometry, periodic images, and collision tests.
//!
//! The in-plane lattice is treated as hexagonal: the b vector lies at 120°
//! from a, so its Cartesian components are `(-b·cos60°, b·sin60°)`.

use nalgebra::{Matrix3, Vector3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::schema::{Atom, Lattice};

/// Scalar cell parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellParams {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl CellParams {
    /// x component of the b vector.
    pub fn b_x(&self) -> f64 {
        -self.b * 60f64.to_radians().cos()
    }

    /// y component of the b vector.
    pub fn b_y(&self) -> f64 {
        self.b * 60f64.to_radians().sin()
    }

    /// In-plane a translation.
    pub fn a_vec(&self) -> Vector3<f64> {
        Vector3::new(self.a, 0.0, 0.0)
    }

    /// In-plane b translation.
    pub fn b_vec(&self) -> Vector3<f64> {
        Vector3::new(self.b_x(), self.b_y(), 0.0)
    }
}

/// Extract (a, b, c) lengths from a lattice.
pub fn cell_params(lattice: &Lattice) -> CellParams {
    CellParams {
        a: lattice.a(),
        b: lattice.b(),
        c: lattice.c(),
    }
}

/// The 9 in-plane translations of a 3×3 tiling centred on the home cell.
///
/// The zero translation comes first.
pub fn image_offsets(lattice: &Lattice) -> [Vector3<f64>; 9] {
    let params = cell_params(lattice);
    let (a, b) = (params.a_vec(), params.b_vec());
    let mut offsets = [Vector3::zeros(); 9];
    let mut k = 1;
    for i in -1i32..=1 {
        for j in -1i32..=1 {
            if i == 0 && j == 0 {
                continue;
            }
            offsets[k] = a * i as f64 + b * j as f64;
            k += 1;
        }
    }
    offsets
}

/// Positions of `position` and its 8 in-plane periodic neighbours.
pub fn image_positions(lattice: &Lattice, position: &Vector3<f64>) -> [Vector3<f64>; 9] {
    image_offsets(lattice).map(|offset| position + offset)
}

/// Smallest pairwise distance; infinity for fewer than two points.
pub fn pairwise_min_distance(positions: &[Vector3<f64>]) -> f64 {
    let mut min = f64::INFINITY;
    for i in 0..positions.len() {
        for j in (i + 1)..positions.len() {
            min = min.min((positions[i] - positions[j]).norm());
        }
    }
    min
}

/// Whether any two points are closer than `threshold`. Stops at the first hit.
pub fn any_pair_closer_than(positions: &[Vector3<f64>], threshold: f64) -> bool {
    for i in 0..positions.len() {
        for j in (i + 1)..positions.len() {
            if (positions[i] - positions[j]).norm() < threshold {
                return true;
            }
        }
    }
    false
}

/// Minimum allowed centre-to-centre distance between two atoms:
/// `shrink × (r1 + r2) + tolerance`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionRule {
    /// Factor applied to the covalent radius sum.
    pub shrink: f64,
    /// Absolute tolerance (Å).
    pub tolerance: f64,
}

impl Default for CollisionRule {
    fn default() -> Self {
        Self {
            shrink: 0.9,
            tolerance: 0.1,
        }
    }
}

impl CollisionRule {
    pub fn new(shrink: f64, tolerance: f64) -> Self {
        Self { shrink, tolerance }
    }

    /// Effective radius sum for two radii.
    pub fn min_distance(&self, r1: f64, r2: f64) -> f64 {
        self.shrink * (r1 + r2) + self.tolerance
    }

    /// Whether two atoms sit closer than their effective radius sum.
    pub fn collides(&self, a: &Atom, b: &Atom) -> bool {
        let d = (a.position - b.position).norm();
        d < self.min_distance(a.covalent_radius(), b.covalent_radius())
    }
}

/// Whether any two atoms of the set collide. O(n²), short-circuits.
pub fn any_pair_collides(atoms: &[Atom], rule: &CollisionRule) -> bool {
    for i in 0..atoms.len() {
        for j in (i + 1)..atoms.len() {
            if rule.collides(&atoms[i], &atoms[j]) {
                return true;
            }
        }
    }
    false
}

/// Expand a set of atoms into its 3×3 in-plane tiling.
pub fn tile_3x3(atoms: &[Atom], lattice: &Lattice) -> Vec<Atom> {
    let offsets = image_offsets(lattice);
    atoms
        .iter()
        .flat_map(|atom| offsets.iter().map(move |o| atom.translated(*o)))
        .collect()
}

/// Exhaustive periodic check of a joint atom set: tile ×3×3 and test all pairs.
pub fn collides_periodic(atoms: &[Atom], lattice: &Lattice, rule: &CollisionRule) -> bool {
    any_pair_collides(&tile_3x3(atoms, lattice), rule)
}

/// Whether an atom overlaps its own periodic images.
pub fn collides_with_own_images(atom: &Atom, lattice: &Lattice, rule: &CollisionRule) -> bool {
    let r = atom.covalent_radius();
    let threshold = rule.min_distance(r, r);
    image_offsets(lattice)
        .iter()
        .skip(1)
        .any(|offset| offset.norm() < threshold)
}

/// Sample a point uniformly in the in-plane cell at the interstitial midplane.
///
/// Uses a shear transform: y is drawn in `[0, b_y)`, then x in
/// `[-x', a - x')` with `x' = y·cot 60°`.
pub fn random_point_in_cell<R: Rng>(lattice: &Lattice, rng: &mut R) -> Vector3<f64> {
    let params = cell_params(lattice);
    let y = rng.r#gen::<f64>() * params.b_y();
    let x_prim = y / 60f64.to_radians().tan();
    let x = rng.r#gen::<f64>() * params.a - x_prim;
    Vector3::new(x, y, params.c / 2.0)
}

/// In-plane minimum-image distance between two points.
///
/// The difference is wrapped into the central cell in fractional
/// coordinates before the 9 neighbouring images are searched. Falls back to
/// the direct distance for a singular lattice.
pub fn minimum_image_distance(lattice: &Lattice, p: &Vector3<f64>, q: &Vector3<f64>) -> f64 {
    let [a, b, c] = lattice.vectors;
    let cell = Matrix3::from_columns(&[a, b, c]);
    let Some(inverse) = cell.try_inverse() else {
        return (q - p).norm();
    };

    let mut frac = inverse * (q - p);
    frac.x -= frac.x.round();
    frac.y -= frac.y.round();
    let wrapped = cell * frac;

    let mut best = f64::INFINITY;
    for i in -1..=1 {
        for j in -1..=1 {
            let d = (wrapped + a * i as f64 + b * j as f64).norm();
            best = best.min(d);
        }
    }
    best
}

/// Running pool of periodic image points used for incremental placement.
///
/// Each accepted atom contributes its 9 images, so later candidates are
/// checked against every earlier atom's periodic repeats in one pass.
#[derive(Debug, Clone, Default)]
pub struct ImagePool {
    images: Vec<Atom>,
}

impl ImagePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool seeded with the images of every atom in `atoms`.
    pub fn from_atoms(lattice: &Lattice, atoms: &[Atom]) -> Self {
        Self {
            images: tile_3x3(atoms, lattice),
        }
    }

    /// Add the 9 images of `atom`.
    pub fn add(&mut self, lattice: &Lattice, atom: &Atom) {
        let offsets = image_offsets(lattice);
        self.images
            .extend(offsets.iter().map(|o| atom.translated(*o)));
    }

    /// Whether `candidate` collides with any pooled image.
    pub fn collides(&self, candidate: &Atom, rule: &CollisionRule) -> bool {
        self.images.iter().any(|image| rule.collides(candidate, image))
    }

    /// Number of pooled image points.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
