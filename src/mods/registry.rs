use crate::mods::{
    error::{PottsError, PottsResult},
    lattice::{CellId, Voxel},
};

/// Aggregate state of one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellRecord {
    pub id: CellId,
    pub pop: usize,
    pub volume: usize,
    pub surface: i64,
    pub target_volume: f64,
    pub target_surface: f64,
    sum: [usize; 3],
}

impl CellRecord {
    pub fn new(id: CellId, pop: usize, target_volume: f64, target_surface: f64) -> Self {
        Self {
            id,
            pop,
            volume: 0,
            surface: 0,
            target_volume,
            target_surface,
            sum: [0; 3],
        }
    }

    pub fn centroid(&self) -> [f64; 3] {
        if self.volume == 0 {
            return [0.0; 3];
        }
        let n = self.volume as f64;
        [
            self.sum[0] as f64 / n,
            self.sum[1] as f64 / n,
            self.sum[2] as f64 / n,
        ]
    }

    /// Centroid after adding (`sign = 1`) or removing (`sign = -1`) `voxel`.
    pub fn centroid_with(&self, voxel: Voxel, sign: i64) -> Option<[f64; 3]> {
        let n = self.volume as i64 + sign;
        if n <= 0 {
            return None;
        }
        let n = n as f64;
        let s = sign as f64;
        Some([
            (self.sum[0] as f64 + s * voxel.x as f64) / n,
            (self.sum[1] as f64 + s * voxel.y as f64) / n,
            (self.sum[2] as f64 + s * voxel.z as f64) / n,
        ])
    }
}

/// Id to record map plus a dense list of live ids.
///
/// Ids are handed out from a monotonic counter and never reused, even after
/// the record is retired.
#[derive(Debug, Clone)]
enum Slot {
    Free,
    Live(CellRecord),
    Retired,
}

#[derive(Debug, Clone)]
pub struct CellRegistry {
    records: Vec<Slot>,
    live: Vec<CellId>,
    live_idx: Vec<usize>,
    next_id: CellId,
}

impl Default for CellRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CellRegistry {
    pub fn new() -> Self {
        Self {
            records: vec![Slot::Free],
            live: Vec::new(),
            live_idx: vec![0],
            next_id: 1,
        }
    }

    pub fn next_id(&self) -> CellId {
        self.next_id
    }

    /// Raises the counter; a lower value than the current one is ignored.
    pub fn reserve_ids(&mut self, next_id: CellId) {
        self.next_id = self.next_id.max(next_id);
    }

    pub fn allocate_id(&mut self) -> CellId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn register(&mut self, record: CellRecord) -> PottsResult<()> {
        let id = record.id;
        if id <= 0 {
            return Err(PottsError::DuplicateCell { id });
        }

        let idx = id as usize;
        if idx >= self.records.len() {
            self.records.resize(idx + 1, Slot::Free);
            self.live_idx.resize(idx + 1, 0);
        }
        if !matches!(self.records[idx], Slot::Free) {
            return Err(PottsError::DuplicateCell { id });
        }

        self.live_idx[idx] = self.live.len();
        self.live.push(id);
        self.records[idx] = Slot::Live(record);
        self.next_id = self.next_id.max(id + 1);
        Ok(())
    }

    pub fn retire(&mut self, id: CellId) -> Option<CellRecord> {
        let idx = usize::try_from(id).ok()?;
        let slot = self.records.get_mut(idx)?;
        if !matches!(slot, Slot::Live(_)) {
            return None;
        }
        let Slot::Live(record) = std::mem::replace(slot, Slot::Retired) else {
            return None;
        };

        let pos = self.live_idx[idx];
        self.live.swap_remove(pos);
        if let Some(&moved) = self.live.get(pos) {
            self.live_idx[moved as usize] = pos;
        }
        self.live_idx[idx] = 0;
        Some(record)
    }

    #[inline(always)]
    pub fn get_cell(&self, id: CellId) -> Option<&CellRecord> {
        self.slot(id)
    }

    #[inline(always)]
    pub fn get_cell_mut(&mut self, id: CellId) -> Option<&mut CellRecord> {
        let idx = usize::try_from(id).ok()?;
        match self.records.get_mut(idx)? {
            Slot::Live(record) => Some(record),
            _ => None,
        }
    }

    /// Adds `voxel` to `id` and applies the local surface change.
    pub fn add_voxel(&mut self, id: CellId, voxel: Voxel, surface_change: i64) -> PottsResult<()> {
        let record = self
            .get_cell_mut(id)
            .ok_or_else(|| PottsError::unknown_cell(id, voxel))?;
        record.volume += 1;
        record.surface += surface_change;
        record.sum[0] += voxel.x;
        record.sum[1] += voxel.y;
        record.sum[2] += voxel.z;
        Ok(())
    }

    /// Removes `voxel` from `id`. Returns the retired record once the volume hits zero.
    pub fn remove_voxel(
        &mut self,
        id: CellId,
        voxel: Voxel,
        surface_change: i64,
    ) -> PottsResult<Option<CellRecord>> {
        let record = self
            .get_cell_mut(id)
            .ok_or_else(|| PottsError::unknown_cell(id, voxel))?;
        if record.volume == 0 {
            return Err(PottsError::unknown_cell(id, voxel));
        }
        record.volume -= 1;
        record.surface += surface_change;
        record.sum[0] -= voxel.x;
        record.sum[1] -= voxel.y;
        record.sum[2] -= voxel.z;

        if record.volume == 0 {
            Ok(self.retire(id))
        } else {
            Ok(None)
        }
    }

    pub fn volume(&self, id: CellId) -> Option<usize> {
        self.slot(id).map(|r| r.volume)
    }

    pub fn surface(&self, id: CellId) -> Option<i64> {
        self.slot(id).map(|r| r.surface)
    }

    pub fn population(&self, id: CellId) -> Option<usize> {
        self.slot(id).map(|r| r.pop)
    }

    pub fn targets(&self, id: CellId) -> Option<(f64, f64)> {
        self.slot(id).map(|r| (r.target_volume, r.target_surface))
    }

    pub fn set_targets(&mut self, id: CellId, volume: f64, surface: f64) -> bool {
        match self.get_cell_mut(id) {
            Some(record) => {
                record.target_volume = volume;
                record.target_surface = surface;
                true
            }
            None => false,
        }
    }

    /// Live ids in registration order, disturbed by retirements.
    pub fn live_ids(&self) -> &[CellId] {
        &self.live
    }

    pub fn sorted_ids(&self) -> Vec<CellId> {
        let mut ids = self.live.clone();
        ids.sort_unstable();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellRecord> {
        self.records.iter().filter_map(|slot| match slot {
            Slot::Live(record) => Some(record),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    #[inline(always)]
    fn slot(&self, id: CellId) -> Option<&CellRecord> {
        let idx = usize::try_from(id).ok()?;
        match self.records.get(idx)? {
            Slot::Live(record) => Some(record),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_never_reused() {
        let mut registry = CellRegistry::new();
        let a = registry.allocate_id();
        let b = registry.allocate_id();
        registry.register(CellRecord::new(a, 1, 4.0, 8.0)).unwrap();
        registry.register(CellRecord::new(b, 1, 4.0, 8.0)).unwrap();

        registry.retire(a).unwrap();
        assert!(matches!(
            registry.register(CellRecord::new(a, 1, 4.0, 8.0)),
            Err(PottsError::DuplicateCell { .. })
        ));
        assert_eq!(registry.allocate_id(), 3);
        assert!(registry.register(CellRecord::new(0, 1, 1.0, 1.0)).is_err());
    }

    #[test]
    fn live_list_survives_swap_removal() {
        let mut registry = CellRegistry::new();
        for id in 1..=4 {
            registry.register(CellRecord::new(id, 1, 1.0, 1.0)).unwrap();
        }
        registry.retire(2);
        assert_eq!(registry.live_ids(), &[1, 4, 3]);
        registry.retire(4);
        assert_eq!(registry.sorted_ids(), vec![1, 3]);
        assert_eq!(registry.len(), 2);
        assert!(registry.retire(4).is_none());
        assert!(registry.get_cell(4).is_none());
    }

    #[test]
    fn voxel_updates_track_volume_surface_and_centroid() {
        let mut registry = CellRegistry::new();
        registry.register(CellRecord::new(1, 2, 2.0, 6.0)).unwrap();
        registry.add_voxel(1, Voxel::new(1, 1, 0), 4).unwrap();
        registry.add_voxel(1, Voxel::new(2, 1, 0), 2).unwrap();

        assert_eq!(registry.volume(1), Some(2));
        assert_eq!(registry.surface(1), Some(6));
        assert_eq!(registry.population(1), Some(2));

        let record = registry.get_cell(1).unwrap();
        assert_eq!(record.centroid(), [1.5, 1.0, 0.0]);
        assert_eq!(record.centroid_with(Voxel::new(3, 1, 0), 1), Some([2.0, 1.0, 0.0]));
        assert_eq!(record.centroid_with(Voxel::new(2, 1, 0), -1), Some([1.0, 1.0, 0.0]));
    }

    #[test]
    fn last_voxel_retires_the_cell() {
        let mut registry = CellRegistry::new();
        registry.register(CellRecord::new(1, 1, 1.0, 4.0)).unwrap();
        registry.add_voxel(1, Voxel::new(1, 1, 0), 4).unwrap();

        let retired = registry.remove_voxel(1, Voxel::new(1, 1, 0), -4).unwrap();
        assert_eq!(retired.map(|r| r.id), Some(1));
        assert!(registry.is_empty());
        assert!(matches!(
            registry.add_voxel(1, Voxel::new(1, 1, 0), 4),
            Err(PottsError::UnknownCell { id: 1, .. })
        ));
    }

    #[test]
    fn targets_round_trip() {
        let mut registry = CellRegistry::new();
        registry.register(CellRecord::new(5, 1, 10.0, 13.0)).unwrap();
        assert!(registry.set_targets(5, 12.0, 14.0));
        assert_eq!(registry.targets(5), Some((12.0, 14.0)));
        assert!(!registry.set_targets(6, 1.0, 1.0));
        assert_eq!(registry.next_id(), 6);
    }
}
