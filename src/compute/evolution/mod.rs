//! Evolutionary search for low-energy intercalated structures.
//!
//! # Overview
//!
//! The search system consists of:
//!
//! - **Placement** (`placement`): Collision-free random structures on a fixed host
//! - **Operators** (`crossover`, `mutation`): Breeding new interstitial arrangements
//! - **Evaluation** (`evaluator`): Relaxation and energy through a pluggable backend
//! - **Population** (`population`): Quota-driven generations with on-disk checkpoints
//! - **Driver** (`driver`): Multi-generation runs that resume where they stopped
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use intercalate::compute::evolution::run_from_file;
//!
//! let report = run_from_file(Path::new("runs/MoS2/input.txt")).unwrap();
//! if let Some(best) = report.best {
//!     println!("Best energy: {:?}", best.energy);
//! }
//! ```
//!
//! # Generation quotas
//!
//! Each bred generation holds, in this order:
//!
//! - `n_best` survivors of the previous generation, labelled `best`
//! - `n_child` crossover children `child1`, `child2`, ...
//! - `n_mut` mutants `mut1`, `mut2`, ...
//! - random structures `cand1`, `cand2`, ... up to `pop_size`
//!
//! Generation 0 consists of random structures only.

mod crossover;
mod driver;
mod energy;
mod evaluator;
mod layout;
mod mutation;
mod placement;
mod population;

pub use driver::{DriverError, SearchReport, generation_label, run_from_file, run_search};
pub use energy::{EnergySummary, round_energy, sort_population};
pub use evaluator::{CommandEvaluator, EvaluationError, Evaluator, Relaxed};
pub use layout::{GenerationLayout, GenerationLog};
pub use placement::{OperatorSettings, PlacementError, StructureRng, sorted_subset};
pub use population::{GenerationError, GenerationOutcome, GenerationPhase, PopulationManager};
