use super::{Context, Flip, Hamiltonian, lookup};
use crate::mods::{
    constants::MEDIUM,
    error::PottsResult,
    lattice::{CellId, Voxel},
    registry::CellRecord,
};

/// Quadratic penalty on the distance from the target volume.
#[derive(Debug, Clone)]
pub struct Volume {
    lambda: Vec<f64>,
}

impl Volume {
    pub fn new(lambda: Vec<f64>) -> Self {
        Self { lambda }
    }

    fn penalty(&self, record: &CellRecord, change: i64) -> PottsResult<f64> {
        let lambda = lookup(&self.lambda, record.pop)?;
        let off = record.volume as f64 - record.target_volume + change as f64;
        Ok(lambda * off * off)
    }

    /// Energy of `id` with its volume shifted by `change`.
    pub fn energy(&self, ctx: &Context, id: CellId, voxel: Voxel, change: i64) -> PottsResult<f64> {
        if id == MEDIUM {
            return Ok(0.0);
        }
        self.penalty(ctx.record(id, voxel)?, change)
    }
}

impl Hamiltonian for Volume {
    fn name(&self) -> &'static str {
        "volume"
    }

    fn local_energy(&self, ctx: &Context, id: CellId, voxel: Voxel) -> PottsResult<f64> {
        self.energy(ctx, id, voxel, 0)
    }

    fn delta(&self, ctx: &Context, flip: &Flip) -> PottsResult<f64> {
        let target = self.energy(ctx, flip.target, flip.voxel, 1)?
            - self.energy(ctx, flip.target, flip.voxel, 0)?;
        let source = self.energy(ctx, flip.source, flip.voxel, -1)?
            - self.energy(ctx, flip.source, flip.voxel, 0)?;
        Ok(target + source)
    }

    fn total(&self, ctx: &Context) -> PottsResult<f64> {
        ctx.registry
            .iter()
            .map(|record| self.penalty(record, 0))
            .sum()
    }
}
