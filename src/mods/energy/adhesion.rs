use super::{Context, Flip, Hamiltonian};
use crate::mods::{
    constants::MEDIUM,
    error::{PottsError, PottsResult},
    lattice::{CellId, Voxel},
};

/// Contact energy between different ids over the full neighbourhood.
#[derive(Debug, Clone)]
pub struct Adhesion {
    matrix: Vec<Vec<f64>>,
}

impl Adhesion {
    pub fn new(matrix: Vec<Vec<f64>>) -> Self {
        Self { matrix }
    }

    #[inline(always)]
    fn contact(&self, p: usize, q: usize) -> PottsResult<f64> {
        self.matrix
            .get(p)
            .and_then(|row| row.get(q))
            .copied()
            .ok_or(PottsError::MissingPopulation { pop: p.max(q) })
    }
}

impl Hamiltonian for Adhesion {
    fn name(&self) -> &'static str {
        "adhesion"
    }

    fn local_energy(&self, ctx: &Context, id: CellId, voxel: Voxel) -> PottsResult<f64> {
        let pop = ctx.population(id, voxel)?;
        let mut energy = 0.0;
        for &offset in ctx.geometry.moore() {
            let neighbor = ctx.lattice.get_offset(voxel, offset);
            if neighbor != id {
                let other = ctx.population(neighbor, voxel.offset(offset))?;
                energy += self.contact(pop, other)?;
            }
        }
        Ok(energy)
    }

    fn delta(&self, ctx: &Context, flip: &Flip) -> PottsResult<f64> {
        let target = self.local_energy(ctx, flip.target, flip.voxel)?;
        let source = self.local_energy(ctx, flip.source, flip.voxel)?;
        Ok(target - source)
    }

    /// Each unordered contact is seen from both voxels, hence the half.
    fn total(&self, ctx: &Context) -> PottsResult<f64> {
        let lattice = ctx.lattice;
        let mut energy = 0.0;
        for x in lattice.x_range() {
            for y in lattice.y_range() {
                for z in lattice.z_range() {
                    let voxel = Voxel::new(x, y, z);
                    let id = lattice.get(voxel);
                    energy += self.local_energy(ctx, id, voxel)?;
                    // Halo voxels are never centres, so count their side here.
                    if id != MEDIUM {
                        energy += self.halo_contacts(ctx, id, voxel)?;
                    }
                }
            }
        }
        Ok(energy / 2.0)
    }
}

impl Adhesion {
    /// Contacts between `voxel` and halo voxels, which are never visited as centres.
    fn halo_contacts(&self, ctx: &Context, id: CellId, voxel: Voxel) -> PottsResult<f64> {
        let pop = ctx.population(id, voxel)?;
        let mut energy = 0.0;
        for &offset in ctx.geometry.moore() {
            if !ctx.lattice.is_active(voxel.offset(offset)) {
                energy += self.contact(MEDIUM as usize, pop)?;
            }
        }
        Ok(energy)
    }
}
