use crate::mods::{
    constants::{MEDIUM, SNAPSHOT_VERSION},
    error::{PottsError, PottsResult},
    geometry::for_lattice,
    lattice::{CellId, Lattice},
    potts::Potts,
    registry::{CellRecord, CellRegistry},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellEntry {
    pub id: CellId,
    pub pop: usize,
    pub volume: usize,
    pub surface: i64,
    pub target_volume: f64,
    pub target_surface: f64,
}

/// Full engine state at the end of a tick, independent of runtime objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub tick: u64,
    pub length: usize,
    pub width: usize,
    pub height: usize,
    pub ids: Vec<CellId>,
    pub cells: Vec<CellEntry>,
    pub next_id: CellId,
}

impl Snapshot {
    pub fn capture(potts: &Potts, tick: u64) -> Self {
        let lattice = potts.lattice();
        let registry = potts.registry();
        let (length, width, height) = lattice.dims();
        let cells = registry
            .sorted_ids()
            .into_iter()
            .filter_map(|id| registry.get_cell(id))
            .map(|r| CellEntry {
                id: r.id,
                pop: r.pop,
                volume: r.volume,
                surface: r.surface,
                target_volume: r.target_volume,
                target_surface: r.target_surface,
            })
            .collect();

        Self {
            version: SNAPSHOT_VERSION,
            tick,
            length,
            width,
            height,
            ids: lattice.ids().to_vec(),
            cells,
            next_id: registry.next_id(),
        }
    }

    pub fn encode(&self) -> PottsResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> PottsResult<Self> {
        let snapshot: Self = serde_json::from_str(text)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(PottsError::Snapshot(format!(
                "unsupported version {} (expected {SNAPSHOT_VERSION})",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }

    /// Rebuilds the lattice and registry, checking that they agree.
    pub fn restore(&self) -> PottsResult<(Lattice, CellRegistry)> {
        let lattice = Lattice::from_ids(self.length, self.width, self.height, self.ids.clone())?;
        let geometry = for_lattice(&lattice);

        let mut counts: BTreeMap<CellId, usize> = BTreeMap::new();
        for &id in lattice.ids() {
            if id != MEDIUM {
                *counts.entry(id).or_insert(0) += 1;
            }
        }

        let mut registry = CellRegistry::new();
        for entry in &self.cells {
            let counted = counts.remove(&entry.id).unwrap_or(0);
            if counted != entry.volume {
                return Err(PottsError::Snapshot(format!(
                    "cell {} records volume {} but owns {} voxels",
                    entry.id, entry.volume, counted
                )));
            }
            registry.register(CellRecord::new(
                entry.id,
                entry.pop,
                entry.target_volume,
                entry.target_surface,
            ))?;
        }
        if let Some((&id, _)) = counts.iter().next() {
            return Err(PottsError::Snapshot(format!(
                "lattice id {id} has no cell entry"
            )));
        }

        for idx in 0..lattice.size() {
            let id = lattice.ids()[idx];
            if id != MEDIUM {
                registry.add_voxel(id, lattice.idx_to_voxel(idx), 0)?;
            }
        }
        for entry in &self.cells {
            let surface = geometry.surface_of(&lattice, entry.id) as i64;
            if surface != entry.surface {
                return Err(PottsError::Snapshot(format!(
                    "cell {} records surface {} but has {}",
                    entry.id, entry.surface, surface
                )));
            }
            if let Some(record) = registry.get_cell_mut(entry.id) {
                record.surface = surface;
            }
        }

        registry.reserve_ids(self.next_id);
        Ok((lattice, registry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mods::{energy::PopulationTable, lattice::Voxel, potts::PottsParams};

    fn params() -> PottsParams {
        let mut table = PopulationTable::zeroed(2);
        table.lambda_volume = vec![0.0, 1.0, 1.0];
        PottsParams {
            temperature: 2.0,
            mcs: 1.0,
            terms: vec!["volume".to_string()],
            table,
        }
    }

    fn engine() -> Potts {
        let mut potts = Potts::with_size(7, 6, 1, &params()).unwrap();
        potts
            .insert_cell(1, 4.0, 8.0, &[Voxel::new(1, 1, 0), Voxel::new(2, 1, 0)])
            .unwrap();
        let gone = potts.insert_cell(2, 1.0, 4.0, &[Voxel::new(4, 4, 0)]).unwrap();
        potts.insert_cell(2, 3.0, 8.0, &[Voxel::new(5, 2, 0)]).unwrap();
        potts.remove_cell(gone).unwrap();
        potts
    }

    #[test]
    fn restore_reproduces_registry() {
        let potts = engine();
        let snapshot = Snapshot::capture(&potts, 12);
        let decoded = Snapshot::decode(&snapshot.encode().unwrap()).unwrap();
        assert_eq!(decoded, snapshot);

        let (lattice, registry) = decoded.restore().unwrap();
        assert_eq!(&lattice, potts.lattice());
        assert_eq!(registry.sorted_ids(), vec![1, 3]);
        assert_eq!(registry.next_id(), 4);
        for id in [1, 3] {
            assert_eq!(registry.get_cell(id), potts.registry().get_cell(id));
        }
    }

    #[test]
    fn cells_are_sorted_by_id() {
        let snapshot = Snapshot::capture(&engine(), 0);
        let ids: Vec<CellId> = snapshot.cells.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn rejects_unknown_version() {
        let mut snapshot = Snapshot::capture(&engine(), 0);
        snapshot.version = 99;
        let text = serde_json::to_string(&snapshot).unwrap();
        assert!(matches!(Snapshot::decode(&text), Err(PottsError::Snapshot(_))));
    }

    #[test]
    fn rejects_inconsistent_state() {
        let mut wrong_volume = Snapshot::capture(&engine(), 0);
        wrong_volume.cells[0].volume = 5;
        assert!(matches!(wrong_volume.restore(), Err(PottsError::Snapshot(_))));

        let mut orphan = Snapshot::capture(&engine(), 0);
        orphan.cells.pop();
        assert!(matches!(orphan.restore(), Err(PottsError::Snapshot(_))));

        let mut wrong_surface = Snapshot::capture(&engine(), 0);
        wrong_surface.cells[1].surface += 1;
        assert!(matches!(wrong_surface.restore(), Err(PottsError::Snapshot(_))));
    }
}
