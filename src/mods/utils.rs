use crate::mods::{
    constants::MEDIUM,
    error::{PottsError, PottsResult},
    lattice::{CellId, Lattice, Offset, Voxel},
    potts::Potts,
};
use std::collections::{BTreeMap, HashSet, VecDeque};

/// Number of face-connected pieces of `id`.
pub fn count_components(lattice: &Lattice, id: CellId, faces: &[Offset]) -> usize {
    let voxels: HashSet<Voxel> = lattice.voxels_of(id).into_iter().collect();
    let mut seen: HashSet<Voxel> = HashSet::with_capacity(voxels.len());
    let mut components = 0;

    for &start in &voxels {
        if !seen.insert(start) {
            continue;
        }
        components += 1;

        let mut queue = VecDeque::from([start]);
        while let Some(voxel) = queue.pop_front() {
            for &offset in faces {
                let next = voxel.offset(offset);
                if voxels.contains(&next) && seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
    }
    components
}

/// Recounts every live cell from the lattice and compares with the registry.
pub fn check_consistency(potts: &Potts) -> PottsResult<()> {
    let lattice = potts.lattice();
    let registry = potts.registry();
    let geometry = potts.geometry();

    let mut counts: BTreeMap<CellId, usize> = BTreeMap::new();
    for idx in 0..lattice.size() {
        let id = lattice.ids()[idx];
        if id == MEDIUM {
            continue;
        }
        if registry.get_cell(id).is_none() {
            return Err(PottsError::unknown_cell(id, lattice.idx_to_voxel(idx)));
        }
        *counts.entry(id).or_insert(0) += 1;
    }

    for record in registry.iter() {
        let counted = counts.get(&record.id).copied().unwrap_or(0);
        if counted != record.volume {
            return Err(PottsError::Setup(format!(
                "cell {} records volume {} but owns {} voxels",
                record.id, record.volume, counted
            )));
        }
        let surface = geometry.surface_of(lattice, record.id) as i64;
        if surface != record.surface {
            return Err(PottsError::Setup(format!(
                "cell {} records surface {} but has {}",
                record.id, record.surface, surface
            )));
        }
    }
    Ok(())
}
