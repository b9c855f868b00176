use thiserror::Error;

use crate::mods::lattice::Voxel;

#[derive(Debug, Error)]
pub enum PottsError {
    #[error("lattice id {id} at ({x}, {y}, {z}) has no registry entry")]
    UnknownCell { id: i32, x: usize, y: usize, z: usize },

    #[error("parameter tables have no entry for population {pop}")]
    MissingPopulation { pop: usize },

    #[error("cell id {id} is already registered")]
    DuplicateCell { id: i32 },

    #[error("voxel ({x}, {y}, {z}) is outside the active region")]
    OutOfBounds { x: usize, y: usize, z: usize },

    #[error("setup failed: {0}")]
    Setup(String),

    #[error("snapshot rejected: {0}")]
    Snapshot(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PottsError {
    pub fn unknown_cell(id: i32, voxel: Voxel) -> Self {
        Self::UnknownCell {
            id,
            x: voxel.x,
            y: voxel.y,
            z: voxel.z,
        }
    }

    pub fn out_of_bounds(voxel: Voxel) -> Self {
        Self::OutOfBounds {
            x: voxel.x,
            y: voxel.y,
            z: voxel.z,
        }
    }
}

pub type PottsResult<T> = std::result::Result<T, PottsError>;
