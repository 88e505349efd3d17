//! Structure file I/O.
//!
//! Populations are kept in `.traj` files holding one JSON-encoded structure
//! per line, so a run can be appended to incrementally and re-read after an
//! interruption. Templates, evaluator input and relaxed snapshots use
//! extended XYZ, which external codes read directly.

mod store;
mod xyz;

pub use store::{StoreError, Trajectory};
pub use xyz::{
    XyzError, read_xyz, read_xyz_file, read_xyz_frames, write_xyz, write_xyz_file,
};

use std::path::Path;

use crate::schema::Structure;

/// Errors loading a structure file of either format.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Xyz(#[from] XyzError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0} contains no structures")]
    Empty(String),
}

/// Load every structure from a `.traj` or extended XYZ file, chosen by extension.
pub fn load_structures<P: AsRef<Path>>(path: P) -> Result<Vec<Structure>, LoadError> {
    let path = path.as_ref();
    let structures = if path.extension().is_some_and(|ext| ext == "traj") {
        Trajectory::new(path).read_all()?
    } else {
        let file = std::fs::File::open(path).map_err(XyzError::from)?;
        read_xyz_frames(std::io::BufReader::new(file))?
    };
    if structures.is_empty() {
        return Err(LoadError::Empty(path.display().to_string()));
    }
    Ok(structures)
}

/// Load the first structure from a `.traj` or extended XYZ file.
pub fn load_structure<P: AsRef<Path>>(path: P) -> Result<Structure, LoadError> {
    let mut structures = load_structures(path)?;
    Ok(structures.swap_remove(0))
}
