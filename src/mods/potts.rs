use crate::mods::{
    constants::MEDIUM,
    energy::{Context, Flip, Hamiltonian, PopulationTable, build_terms},
    error::{PottsError, PottsResult},
    geometry::{Geometry, for_lattice},
    lattice::{CellId, Lattice, Voxel},
    registry::{CellRecord, CellRegistry},
};
use rand::Rng;
use tracing::debug;

/// Construction parameters of the engine.
#[derive(Debug, Clone)]
pub struct PottsParams {
    pub temperature: f64,
    /// Proposals per tick as a multiple of the active voxel count.
    pub mcs: f64,
    pub terms: Vec<String>,
    pub table: PopulationTable,
}

impl PottsParams {
    pub fn validate(&self) -> PottsResult<()> {
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(PottsError::Setup(format!(
                "temperature must be finite and non-negative, got {}",
                self.temperature
            )));
        }
        if !(self.mcs > 0.0) {
            return Err(PottsError::Setup(format!("MCS must be positive, got {}", self.mcs)));
        }

        let table = &self.table;
        let size = table.adhesion.len();
        if size < 2 {
            return Err(PottsError::Setup("no populations defined".to_string()));
        }
        for (p, row) in table.adhesion.iter().enumerate() {
            if row.len() != size {
                return Err(PottsError::MissingPopulation { pop: p.max(row.len()) });
            }
        }
        for p in 0..size {
            for q in (p + 1)..size {
                if table.adhesion[p][q] != table.adhesion[q][p] {
                    return Err(PottsError::Setup(format!(
                        "adhesion matrix is not symmetric at ({p}, {q})"
                    )));
                }
            }
        }
        for column in [
            &table.lambda_volume,
            &table.lambda_surface,
            &table.lambda_persistence,
            &table.decay_persistence,
        ] {
            if column.len() < size {
                return Err(PottsError::MissingPopulation { pop: column.len() });
            }
        }
        Ok(())
    }
}

/// Counts for one tick of the stepper.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickStats {
    pub proposals: usize,
    pub no_target: usize,
    pub source_disconnected: usize,
    pub target_disconnected: usize,
    pub rejected: usize,
    pub accepted: usize,
    /// Sum of the energy changes of accepted flips.
    pub delta_sum: f64,
}

/// Metropolis acceptance: always take downhill moves; at zero temperature
/// nothing else.
#[inline(always)]
pub fn acceptance(delta: f64, temperature: f64) -> f64 {
    if delta < 0.0 {
        1.0
    } else if temperature <= 0.0 {
        0.0
    } else {
        (-delta / temperature).exp()
    }
}

/// The lattice, its registry and the energy terms acting on them. All writes
/// to the lattice go through this type.
pub struct Potts {
    lattice: Lattice,
    registry: CellRegistry,
    geometry: Box<dyn Geometry>,
    terms: Vec<Box<dyn Hamiltonian>>,
    temperature: f64,
    mcs: f64,
    populations: usize,
}

impl std::fmt::Debug for Potts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Potts")
            .field("lattice", &self.lattice.dims())
            .field("cells", &self.registry.len())
            .field("terms", &self.term_names())
            .field("temperature", &self.temperature)
            .field("mcs", &self.mcs)
            .finish()
    }
}

impl Potts {
    pub fn new(lattice: Lattice, registry: CellRegistry, params: &PottsParams) -> PottsResult<Self> {
        params.validate()?;
        let populations = params.table.populations();
        if let Some(record) = registry.iter().find(|r| r.pop == 0 || r.pop > populations) {
            return Err(PottsError::MissingPopulation { pop: record.pop });
        }

        Ok(Self {
            geometry: for_lattice(&lattice),
            terms: build_terms(&params.terms, &params.table)?,
            lattice,
            registry,
            temperature: params.temperature,
            mcs: params.mcs,
            populations,
        })
    }

    /// Empty engine over a `length x width x height` lattice, halo included.
    pub fn with_size(
        length: usize,
        width: usize,
        height: usize,
        params: &PottsParams,
    ) -> PottsResult<Self> {
        Self::new(
            Lattice::new(length, width, height)?,
            CellRegistry::new(),
            params,
        )
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn registry(&self) -> &CellRegistry {
        &self.registry
    }

    pub fn geometry(&self) -> &dyn Geometry {
        self.geometry.as_ref()
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn populations(&self) -> usize {
        self.populations
    }

    pub fn term_names(&self) -> Vec<&'static str> {
        self.terms.iter().map(|t| t.name()).collect()
    }

    pub fn context(&self) -> Context<'_> {
        Context {
            lattice: &self.lattice,
            registry: &self.registry,
            geometry: self.geometry.as_ref(),
        }
    }

    pub fn volume(&self, id: CellId) -> Option<usize> {
        self.registry.volume(id)
    }

    pub fn surface(&self, id: CellId) -> Option<i64> {
        self.registry.surface(id)
    }

    pub fn population(&self, id: CellId) -> Option<usize> {
        self.registry.population(id)
    }

    pub fn set_targets(&mut self, id: CellId, volume: f64, surface: f64) -> bool {
        self.registry.set_targets(id, volume, surface)
    }

    pub fn steps_per_tick(&self) -> usize {
        (self.mcs * self.lattice.active_size() as f64).round() as usize
    }

    pub fn delta(&self, flip: &Flip) -> PottsResult<f64> {
        let ctx = self.context();
        self.terms.iter().map(|term| term.delta(&ctx, flip)).sum()
    }

    pub fn total_energy(&self) -> PottsResult<f64> {
        let ctx = self.context();
        self.terms.iter().map(|term| term.total(&ctx)).sum()
    }

    fn check_known(&self, id: CellId, voxel: Voxel) -> PottsResult<()> {
        if id != MEDIUM && self.registry.get_cell(id).is_none() {
            return Err(PottsError::unknown_cell(id, voxel));
        }
        Ok(())
    }

    /// Runs one tick of proposals.
    pub fn step<R: Rng>(&mut self, rng: &mut R) -> PottsResult<TickStats> {
        let mut stats = TickStats::default();
        let mut targets = Vec::with_capacity(self.geometry.faces().len());
        let (xs, ys, zs) = (
            self.lattice.x_range(),
            self.lattice.y_range(),
            self.lattice.z_range(),
        );

        for _ in 0..self.steps_per_tick() {
            stats.proposals += 1;
            let voxel = Voxel::new(
                rng.random_range(xs.clone()),
                rng.random_range(ys.clone()),
                rng.random_range(zs.clone()),
            );

            let source = self.lattice.get(voxel);
            self.check_known(source, voxel)?;

            self.geometry.unique_targets(&self.lattice, voxel, &mut targets);
            if targets.is_empty() {
                stats.no_target += 1;
                continue;
            }
            let target = targets[rng.random_range(0..targets.len())];
            self.check_known(target, voxel)?;

            if source != MEDIUM && !self.geometry.is_connected(&self.lattice, voxel, source) {
                stats.source_disconnected += 1;
                continue;
            }
            if target != MEDIUM && !self.geometry.is_connected(&self.lattice, voxel, target) {
                stats.target_disconnected += 1;
                continue;
            }

            let flip = Flip {
                voxel,
                source,
                target,
                surface_change: self.geometry.surface_change(&self.lattice, voxel, source, target),
            };
            let delta = self.delta(&flip)?;

            if rng.random::<f64>() < acceptance(delta, self.temperature) {
                self.commit(&flip)?;
                stats.accepted += 1;
                stats.delta_sum += delta;
            } else {
                stats.rejected += 1;
            }
        }

        Ok(stats)
    }

    /// Applies an accepted flip to the terms, the lattice and the registry.
    fn commit(&mut self, flip: &Flip) -> PottsResult<()> {
        let ctx = Context {
            lattice: &self.lattice,
            registry: &self.registry,
            geometry: self.geometry.as_ref(),
        };
        for term in self.terms.iter_mut() {
            term.accept(&ctx, flip)?;
        }
        self.apply(flip)
    }

    fn apply(&mut self, flip: &Flip) -> PottsResult<()> {
        let (source_change, target_change) = flip.surface_change;
        self.lattice.set(flip.voxel, flip.target);

        if flip.source != MEDIUM {
            if let Some(retired) = self
                .registry
                .remove_voxel(flip.source, flip.voxel, source_change)?
            {
                self.forget(retired.id);
            }
        }
        if flip.target != MEDIUM {
            self.registry.add_voxel(flip.target, flip.voxel, target_change)?;
        }
        Ok(())
    }

    fn forget(&mut self, id: CellId) {
        debug!(id, "cell retired");
        for term in self.terms.iter_mut() {
            term.forget(id);
        }
    }

    /// Hands `voxel` to `id` with full bookkeeping but no energy check.
    pub fn reassign(&mut self, voxel: Voxel, id: CellId) -> PottsResult<()> {
        if !self.lattice.is_active(voxel) {
            return Err(PottsError::out_of_bounds(voxel));
        }
        let source = self.lattice.get(voxel);
        if source == id {
            return Ok(());
        }
        self.check_known(id, voxel)?;
        let flip = Flip {
            voxel,
            source,
            target: id,
            surface_change: self.geometry.surface_change(&self.lattice, voxel, source, id),
        };
        self.apply(&flip)
    }

    /// Registers an empty cell under a fresh id. It stays live until removed.
    pub fn register_cell(
        &mut self,
        pop: usize,
        target_volume: f64,
        target_surface: f64,
    ) -> PottsResult<CellId> {
        if pop == 0 || pop > self.populations {
            return Err(PottsError::MissingPopulation { pop });
        }
        let id = self.registry.allocate_id();
        self.registry
            .register(CellRecord::new(id, pop, target_volume, target_surface))?;
        Ok(id)
    }

    /// Places a new cell on medium voxels and returns its fresh id.
    pub fn insert_cell(
        &mut self,
        pop: usize,
        target_volume: f64,
        target_surface: f64,
        voxels: &[Voxel],
    ) -> PottsResult<CellId> {
        if pop == 0 || pop > self.populations {
            return Err(PottsError::MissingPopulation { pop });
        }
        for &voxel in voxels {
            if !self.lattice.is_active(voxel) {
                return Err(PottsError::out_of_bounds(voxel));
            }
            if self.lattice.get(voxel) != MEDIUM {
                return Err(PottsError::Setup(format!(
                    "voxel ({}, {}, {}) is already owned by {}",
                    voxel.x,
                    voxel.y,
                    voxel.z,
                    self.lattice.get(voxel)
                )));
            }
        }

        let id = self.register_cell(pop, target_volume, target_surface)?;
        for &voxel in voxels {
            self.reassign(voxel, id)?;
        }
        debug!(id, pop, volume = voxels.len(), "cell inserted");
        Ok(id)
    }

    /// Returns every voxel of `id` to the medium and retires its record.
    /// The returned record is the state just before removal.
    pub fn remove_cell(&mut self, id: CellId) -> PottsResult<Option<CellRecord>> {
        let Some(record) = self.registry.get_cell(id).cloned() else {
            return Ok(None);
        };
        for voxel in self.lattice.voxels_of(id) {
            self.reassign(voxel, MEDIUM)?;
        }
        // A cell registered without voxels is still live here.
        if self.registry.retire(id).is_some() {
            self.forget(id);
        }
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn params(terms: &[&str], temperature: f64) -> PottsParams {
        let mut table = PopulationTable::zeroed(1);
        table.set_adhesion(1, 0, 16.0).unwrap();
        table.set_adhesion(1, 1, 2.0).unwrap();
        table.lambda_volume[1] = 1.0;
        table.lambda_surface[1] = 0.5;
        PottsParams {
            temperature,
            mcs: 1.0,
            terms: terms.iter().map(|t| t.to_string()).collect(),
            table,
        }
    }

    fn square(potts: &mut Potts, x0: usize, y0: usize, side: usize) -> CellId {
        let voxels: Vec<Voxel> = (x0..x0 + side)
            .flat_map(|x| (y0..y0 + side).map(move |y| Voxel::new(x, y, 0)))
            .collect();
        potts
            .insert_cell(1, (side * side) as f64, (4 * side) as f64, &voxels)
            .unwrap()
    }

    #[test]
    fn acceptance_follows_metropolis() {
        assert_eq!(acceptance(-3.0, 10.0), 1.0);
        assert_eq!(acceptance(0.0, 10.0), 1.0);
        assert_eq!(acceptance(10.0, 10.0), (-1.0f64).exp());
        assert_eq!(acceptance(0.0, 0.0), 0.0);
        assert_eq!(acceptance(-1e-9, 0.0), 1.0);
    }

    #[test]
    fn validation_rejects_bad_tables() {
        let mut bad = params(&["adhesion"], 1.0);
        bad.table.adhesion[1][0] = 3.0;
        assert!(bad.validate().is_err());

        let mut short = params(&["volume"], 1.0);
        short.table.lambda_volume.pop();
        assert!(matches!(
            short.validate(),
            Err(PottsError::MissingPopulation { .. })
        ));

        assert!(params(&["volume"], -1.0).validate().is_err());
        assert!(Potts::with_size(6, 6, 1, &params(&["height"], 1.0)).is_err());
    }

    #[test]
    fn insert_and_remove_keep_counts() {
        let mut potts = Potts::with_size(8, 8, 1, &params(&["adhesion"], 1.0)).unwrap();
        let id = square(&mut potts, 2, 2, 3);
        assert_eq!(potts.volume(id), Some(9));
        assert_eq!(potts.surface(id), Some(12));
        assert_eq!(potts.population(id), Some(1));

        let record = potts.remove_cell(id).unwrap().unwrap();
        assert_eq!(record.id, id);
        assert_eq!(potts.lattice().count(id), 0);
        assert!(potts.registry().is_empty());
        assert!(potts.remove_cell(id).unwrap().is_none());
    }

    #[test]
    fn insert_rejects_occupied_or_halo_voxels() {
        let mut potts = Potts::with_size(6, 6, 1, &params(&["adhesion"], 1.0)).unwrap();
        square(&mut potts, 1, 1, 2);
        assert!(potts.insert_cell(1, 1.0, 4.0, &[Voxel::new(1, 1, 0)]).is_err());
        assert!(matches!(
            potts.insert_cell(1, 1.0, 4.0, &[Voxel::new(0, 1, 0)]),
            Err(PottsError::OutOfBounds { .. })
        ));
        assert!(matches!(
            potts.insert_cell(2, 1.0, 4.0, &[Voxel::new(3, 3, 0)]),
            Err(PottsError::MissingPopulation { pop: 2 })
        ));
    }

    #[test]
    fn step_budget_scales_with_active_region() {
        let mut potts = Potts::with_size(7, 6, 1, &params(&["volume"], 1.0)).unwrap();
        square(&mut potts, 2, 2, 2);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let stats = potts.step(&mut rng).unwrap();
        assert_eq!(stats.proposals, 5 * 4);
        assert_eq!(
            stats.proposals,
            stats.no_target
                + stats.source_disconnected
                + stats.target_disconnected
                + stats.rejected
                + stats.accepted
        );
    }

    #[test]
    fn committed_deltas_match_total_energy() {
        let mut potts =
            Potts::with_size(12, 12, 1, &params(&["adhesion", "volume", "surface"], 8.0)).unwrap();
        square(&mut potts, 2, 2, 3);
        square(&mut potts, 6, 5, 3);
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        for _ in 0..5 {
            let before = potts.total_energy().unwrap();
            let stats = potts.step(&mut rng).unwrap();
            let after = potts.total_energy().unwrap();
            assert!((after - before - stats.delta_sum).abs() < 1e-6);
        }

        for record in potts.registry().iter() {
            assert_eq!(record.volume, potts.lattice().count(record.id));
            assert_eq!(
                record.surface,
                potts.geometry().surface_of(potts.lattice(), record.id) as i64
            );
        }
    }

    #[test]
    fn unknown_lattice_id_is_fatal() {
        let mut potts = Potts::with_size(5, 5, 1, &params(&["adhesion"], 1.0)).unwrap();
        for x in 1..=3 {
            for y in 1..=3 {
                potts.lattice.set(Voxel::new(x, y, 0), 4);
            }
        }
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(matches!(
            potts.step(&mut rng),
            Err(PottsError::UnknownCell { id: 4, .. })
        ));
    }
}
