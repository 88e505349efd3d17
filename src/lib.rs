//! Intercalate - Structure search for atoms intercalated between two layers.
//!
//! A single-layer template is mirrored into a fixed two-layer host, and
//! interstitial atoms are placed in the gap between the layers. Low-energy
//! arrangements are found by an evolutionary search driven by an external
//! relaxation program, or enumerated exhaustively from a set of candidate
//! sites.
//!
//! # Architecture
//!
//! The crate is split into three main modules:
//!
//! - `schema`: Lattices, atoms, structures and input file parsing
//! - `compute`: Geometry, host construction, enumeration and evolution
//! - `trajectory`: Extended XYZ and `.traj` structure files
//!
//! # Example
//!
//! ```rust,no_run
//! use intercalate::{
//!     compute::{HostBuilder, evolution::{OperatorSettings, StructureRng}},
//!     schema::LateralSize,
//!     trajectory::read_xyz_file,
//! };
//!
//! // Load a single layer and build a 3x3 two-layer host
//! let template = read_xyz_file("MoS2.xyz").unwrap();
//! let host = HostBuilder::new(&template, LateralSize::new(3, 3), 1.4).unwrap();
//!
//! // Place four Li atoms between the layers
//! let mut rng = StructureRng::new(42);
//! let structure = rng
//!     .random_structure(&host, "Li", 4, &OperatorSettings::default())
//!     .unwrap();
//!
//! println!("{} atoms", structure.len());
//! ```

pub mod compute;
pub mod schema;
pub mod trajectory;

// Re-export commonly used types
pub use compute::HostBuilder;
pub use compute::evolution::{PopulationManager, StructureRng};
pub use schema::{Atom, Lattice, RunConfig, Structure};
