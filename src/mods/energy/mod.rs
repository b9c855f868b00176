pub mod adhesion;
pub mod persistence;
pub mod surface;
pub mod volume;

use crate::mods::{
    constants::MEDIUM,
    error::{PottsError, PottsResult},
    geometry::Geometry,
    lattice::{CellId, Lattice, Voxel},
    registry::{CellRecord, CellRegistry},
};

pub use adhesion::Adhesion;
pub use persistence::Persistence;
pub use surface::Surface;
pub use volume::Volume;

/// Read-only view of the engine state handed to every term.
pub struct Context<'a> {
    pub lattice: &'a Lattice,
    pub registry: &'a CellRegistry,
    pub geometry: &'a dyn Geometry,
}

impl Context<'_> {
    /// Population of `id`; medium maps to 0.
    pub fn population(&self, id: CellId, voxel: Voxel) -> PottsResult<usize> {
        if id == MEDIUM {
            return Ok(0);
        }
        self.registry
            .population(id)
            .ok_or_else(|| PottsError::unknown_cell(id, voxel))
    }

    pub fn record(&self, id: CellId, voxel: Voxel) -> PottsResult<&CellRecord> {
        self.registry
            .get_cell(id)
            .ok_or_else(|| PottsError::unknown_cell(id, voxel))
    }
}

/// A proposed move of `voxel` from `source` to `target`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Flip {
    pub voxel: Voxel,
    pub source: CellId,
    pub target: CellId,
    /// Surface change `(source, target)` precomputed by the stepper.
    pub surface_change: (i64, i64),
}

/// One additive energy term.
pub trait Hamiltonian: Send {
    fn name(&self) -> &'static str;

    /// Energy `id` contributes around `voxel` in the current state.
    fn local_energy(&self, ctx: &Context, id: CellId, voxel: Voxel) -> PottsResult<f64>;

    /// Energy with `flip` applied minus energy without it.
    fn delta(&self, ctx: &Context, flip: &Flip) -> PottsResult<f64>;

    /// Energy of the whole lattice.
    fn total(&self, ctx: &Context) -> PottsResult<f64>;

    /// Called with the pre-flip state just before an accepted flip is applied.
    fn accept(&mut self, _ctx: &Context, _flip: &Flip) -> PottsResult<()> {
        Ok(())
    }

    /// Called after `id` leaves the registry.
    fn forget(&mut self, _id: CellId) {}
}

/// Per-population parameter tables. Index 0 is the medium.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationTable {
    /// Symmetric `(n + 1) x (n + 1)` contact energies; `[0][0]` is NaN.
    pub adhesion: Vec<Vec<f64>>,
    pub lambda_volume: Vec<f64>,
    pub lambda_surface: Vec<f64>,
    pub lambda_persistence: Vec<f64>,
    pub decay_persistence: Vec<f64>,
}

impl PopulationTable {
    /// Table for `n` populations with every parameter at zero.
    pub fn zeroed(n: usize) -> Self {
        let mut adhesion = vec![vec![0.0; n + 1]; n + 1];
        adhesion[0][0] = f64::NAN;
        Self {
            adhesion,
            lambda_volume: vec![0.0; n + 1],
            lambda_surface: vec![0.0; n + 1],
            lambda_persistence: vec![0.0; n + 1],
            decay_persistence: vec![0.0; n + 1],
        }
    }

    pub fn populations(&self) -> usize {
        self.adhesion.len().saturating_sub(1)
    }

    /// Sets `J(p, q)` and `J(q, p)`.
    pub fn set_adhesion(&mut self, p: usize, q: usize, value: f64) -> PottsResult<()> {
        let n = self.adhesion.len();
        if p >= n || q >= n {
            return Err(PottsError::MissingPopulation { pop: p.max(q) });
        }
        self.adhesion[p][q] = value;
        self.adhesion[q][p] = value;
        Ok(())
    }
}

/// Looks up the value for `pop`, failing on a short table.
#[inline(always)]
pub(crate) fn lookup(values: &[f64], pop: usize) -> PottsResult<f64> {
    values
        .get(pop)
        .copied()
        .ok_or(PottsError::MissingPopulation { pop })
}

/// Builds the terms named in `names` in the given order.
pub fn build_terms(
    names: &[String],
    table: &PopulationTable,
) -> PottsResult<Vec<Box<dyn Hamiltonian>>> {
    names
        .iter()
        .map(|name| -> PottsResult<Box<dyn Hamiltonian>> {
            match name.trim().to_ascii_lowercase().as_str() {
                "adhesion" => Ok(Box::new(Adhesion::new(table.adhesion.clone()))),
                "volume" => Ok(Box::new(Volume::new(table.lambda_volume.clone()))),
                "surface" => Ok(Box::new(Surface::new(table.lambda_surface.clone()))),
                "persistence" => Ok(Box::new(Persistence::new(
                    table.lambda_persistence.clone(),
                    table.decay_persistence.clone(),
                ))),
                other => Err(PottsError::Setup(format!("unknown energy term '{other}'"))),
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mods::geometry::Rect2D;

    /// Places `(x, y, id)` voxels on a flat lattice and registers every id with
    /// the given population, targets and a full-scan surface.
    pub(crate) fn layout(
        sx: usize,
        sy: usize,
        voxels: &[(usize, usize, CellId)],
        cells: &[(CellId, usize, f64, f64)],
    ) -> (Lattice, CellRegistry) {
        let mut lattice = Lattice::with_active(sx, sy, 1).unwrap();
        let mut registry = CellRegistry::new();
        for &(id, pop, tv, ts) in cells {
            registry.register(CellRecord::new(id, pop, tv, ts)).unwrap();
        }
        for &(x, y, id) in voxels {
            lattice.set(Voxel::new(x, y, 0), id);
        }
        for &(x, y, id) in voxels {
            registry.add_voxel(id, Voxel::new(x, y, 0), 0).unwrap();
        }
        for &(id, ..) in cells {
            let surface = Rect2D.surface_of(&lattice, id) as i64;
            registry.get_cell_mut(id).unwrap().surface = surface;
        }
        (lattice, registry)
    }

    #[test]
    fn builds_named_terms_in_order() {
        let table = PopulationTable::zeroed(2);
        let names = vec!["volume".to_string(), " Adhesion".to_string()];
        let terms = build_terms(&names, &table).unwrap();
        assert_eq!(terms[0].name(), "volume");
        assert_eq!(terms[1].name(), "adhesion");
        assert!(build_terms(&["height".to_string()], &table).is_err());
    }

    #[test]
    fn adhesion_table_is_kept_symmetric() {
        let mut table = PopulationTable::zeroed(2);
        table.set_adhesion(1, 2, 7.5).unwrap();
        assert_eq!(table.adhesion[2][1], 7.5);
        assert_eq!(table.populations(), 2);
        assert!(table.adhesion[0][0].is_nan());
        assert!(matches!(
            table.set_adhesion(3, 0, 1.0),
            Err(PottsError::MissingPopulation { pop: 3 })
        ));
    }

    #[test]
    fn lookup_reports_missing_population() {
        assert!(matches!(
            lookup(&[0.0, 1.0], 4),
            Err(PottsError::MissingPopulation { pop: 4 })
        ));
        assert_eq!(lookup(&[0.0, 1.0], 1).unwrap(), 1.0);
    }
}
