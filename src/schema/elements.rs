//! Element data: symbols, atomic numbers, and covalent radii.
//!
//! Radii are the Cordero et al. (2008) covalent radii in Å, indexed by
//! atomic number. Index 0 is a dummy entry for unknown species.

/// Element symbols indexed by atomic number.
const SYMBOLS: [&str; 97] = [
    "X", "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S",
    "Cl", "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge",
    "As", "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd",
    "In", "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd",
    "Tb", "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg",
    "Tl", "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm",
];

/// Covalent radii in Å indexed by atomic number.
#[rustfmt::skip]
const COVALENT_RADII: [f64; 97] = [
    0.20,
    // --- Period 1 ---
    0.31, 0.28,
    // --- Period 2 ---
    1.28, 0.96, 0.84, 0.76, 0.71, 0.66, 0.57, 0.58,
    // --- Period 3 ---
    1.66, 1.41, 1.21, 1.11, 1.07, 1.05, 1.02, 1.06,
    // --- Period 4 ---
    2.03, 1.76, 1.70, 1.60, 1.53, 1.39, 1.39, 1.32, 1.26, 1.24, 1.32, 1.22,
    1.22, 1.20, 1.19, 1.20, 1.20, 1.16,
    // --- Period 5 ---
    2.20, 1.95, 1.90, 1.75, 1.64, 1.54, 1.47, 1.46, 1.42, 1.39, 1.45, 1.44,
    1.42, 1.39, 1.39, 1.38, 1.39, 1.40,
    // --- Period 6 ---
    2.44, 2.15, 2.07, 2.04, 2.03, 2.01, 1.99, 1.98, 1.98, 1.96, 1.94, 1.92,
    1.92, 1.89, 1.90, 1.87, 1.87, 1.75, 1.70, 1.62, 1.51, 1.44, 1.41, 1.36,
    1.36, 1.32, 1.45, 1.46, 1.48, 1.40, 1.50, 1.50,
    // --- Period 7 ---
    2.60, 2.21, 2.15, 2.06, 2.00, 1.96, 1.90, 1.87, 1.80, 1.69,
];

/// Returns the covalent radius for an atomic number.
///
/// Unknown atomic numbers fall back to the dummy radius at index 0.
pub fn covalent_radius(atomic_number: u8) -> f64 {
    COVALENT_RADII
        .get(atomic_number as usize)
        .copied()
        .unwrap_or(COVALENT_RADII[0])
}

/// Returns the atomic number for an element symbol, if known.
pub fn atomic_number(symbol: &str) -> Option<u8> {
    SYMBOLS
        .iter()
        .skip(1)
        .position(|s| *s == symbol)
        .map(|i| (i + 1) as u8)
}

/// Returns the element symbol for an atomic number.
pub fn symbol(atomic_number: u8) -> &'static str {
    SYMBOLS
        .get(atomic_number as usize)
        .copied()
        .unwrap_or(SYMBOLS[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_lookup() {
        assert_eq!(atomic_number("H"), Some(1));
        assert_eq!(atomic_number("S"), Some(16));
        assert_eq!(atomic_number("Mo"), Some(42));
        assert_eq!(atomic_number("Cm"), Some(96));
        assert_eq!(atomic_number("X"), None);
        assert_eq!(atomic_number("Xx"), None);
    }

    #[test]
    fn test_symbol_roundtrip() {
        for z in 1..=96u8 {
            assert_eq!(atomic_number(symbol(z)), Some(z));
        }
    }

    #[test]
    fn test_covalent_radius() {
        assert!((covalent_radius(1) - 0.31).abs() < 1e-12);
        assert!((covalent_radius(3) - 1.28).abs() < 1e-12);
        assert!((covalent_radius(16) - 1.05).abs() < 1e-12);
        assert!((covalent_radius(42) - 1.54).abs() < 1e-12);
        assert!((covalent_radius(200) - 0.20).abs() < 1e-12);
    }
}
