use super::{Context, Flip, Hamiltonian, lookup};
use crate::mods::{
    constants::MEDIUM,
    error::PottsResult,
    lattice::{CellId, Voxel},
    registry::CellRecord,
};
use std::collections::HashMap;

/// Rewards flips that move a cell's centroid along its recent direction of
/// travel. Each cell keeps a unit migration vector that starts at zero.
#[derive(Debug, Clone)]
pub struct Persistence {
    lambda: Vec<f64>,
    decay: Vec<f64>,
    vectors: HashMap<CellId, [f64; 3]>,
}

fn unit(v: [f64; 3]) -> [f64; 3] {
    let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if norm == 0.0 {
        return [0.0; 3];
    }
    [v[0] / norm, v[1] / norm, v[2] / norm]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Unit centroid shift if `voxel` is added (`sign = 1`) or removed (`sign = -1`).
fn displacement(record: &CellRecord, voxel: Voxel, sign: i64) -> [f64; 3] {
    let Some(next) = record.centroid_with(voxel, sign) else {
        return [0.0; 3];
    };
    let now = record.centroid();
    unit([next[0] - now[0], next[1] - now[1], next[2] - now[2]])
}

impl Persistence {
    pub fn new(lambda: Vec<f64>, decay: Vec<f64>) -> Self {
        Self {
            lambda,
            decay,
            vectors: HashMap::new(),
        }
    }

    pub fn vector(&self, id: CellId) -> [f64; 3] {
        self.vectors.get(&id).copied().unwrap_or([0.0; 3])
    }

    fn energy(&self, ctx: &Context, id: CellId, voxel: Voxel, sign: i64) -> PottsResult<f64> {
        if id == MEDIUM {
            return Ok(0.0);
        }
        let record = ctx.record(id, voxel)?;
        let lambda = lookup(&self.lambda, record.pop)?;
        let d = displacement(record, voxel, sign);
        Ok(-lambda * dot(self.vector(id), d) * record.surface as f64)
    }

    fn update(&mut self, ctx: &Context, id: CellId, voxel: Voxel, sign: i64) -> PottsResult<()> {
        if id == MEDIUM {
            return Ok(());
        }
        let record = ctx.record(id, voxel)?;
        let decay = lookup(&self.decay, record.pop)?;
        let d = displacement(record, voxel, sign);
        let v = self.vector(id);
        let next = unit([
            (1.0 - decay) * v[0] + decay * d[0],
            (1.0 - decay) * v[1] + decay * d[1],
            (1.0 - decay) * v[2] + decay * d[2],
        ]);
        self.vectors.insert(id, next);
        Ok(())
    }
}

impl Hamiltonian for Persistence {
    fn name(&self) -> &'static str {
        "persistence"
    }

    /// Energy of handing `voxel` to `id`, or taking it away if `id` owns it.
    fn local_energy(&self, ctx: &Context, id: CellId, voxel: Voxel) -> PottsResult<f64> {
        let sign = if ctx.lattice.get(voxel) == id { -1 } else { 1 };
        self.energy(ctx, id, voxel, sign)
    }

    fn delta(&self, ctx: &Context, flip: &Flip) -> PottsResult<f64> {
        Ok(self.energy(ctx, flip.source, flip.voxel, -1)?
            + self.energy(ctx, flip.target, flip.voxel, 1)?)
    }

    /// Work term; it has no state energy.
    fn total(&self, _ctx: &Context) -> PottsResult<f64> {
        Ok(0.0)
    }

    fn accept(&mut self, ctx: &Context, flip: &Flip) -> PottsResult<()> {
        self.update(ctx, flip.source, flip.voxel, -1)?;
        self.update(ctx, flip.target, flip.voxel, 1)
    }

    fn forget(&mut self, id: CellId) {
        self.vectors.remove(&id);
    }
}
