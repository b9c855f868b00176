use super::{Context, Flip, Hamiltonian, lookup};
use crate::mods::{
    constants::MEDIUM,
    error::PottsResult,
    lattice::{CellId, Voxel},
    registry::CellRecord,
};

/// Quadratic penalty on the distance from the target surface. The surface is
/// the count of faces a cell shares with other ids, kept by the registry.
#[derive(Debug, Clone)]
pub struct Surface {
    lambda: Vec<f64>,
}

impl Surface {
    pub fn new(lambda: Vec<f64>) -> Self {
        Self { lambda }
    }

    fn penalty(&self, record: &CellRecord, change: i64) -> PottsResult<f64> {
        let lambda = lookup(&self.lambda, record.pop)?;
        let off = (record.surface + change) as f64 - record.target_surface;
        Ok(lambda * off * off)
    }

    pub fn energy(&self, ctx: &Context, id: CellId, voxel: Voxel, change: i64) -> PottsResult<f64> {
        if id == MEDIUM {
            return Ok(0.0);
        }
        self.penalty(ctx.record(id, voxel)?, change)
    }
}

impl Hamiltonian for Surface {
    fn name(&self) -> &'static str {
        "surface"
    }

    fn local_energy(&self, ctx: &Context, id: CellId, voxel: Voxel) -> PottsResult<f64> {
        self.energy(ctx, id, voxel, 0)
    }

    fn delta(&self, ctx: &Context, flip: &Flip) -> PottsResult<f64> {
        let (source_change, target_change) = flip.surface_change;
        let target = self.energy(ctx, flip.target, flip.voxel, target_change)?
            - self.energy(ctx, flip.target, flip.voxel, 0)?;
        let source = self.energy(ctx, flip.source, flip.voxel, source_change)?
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
