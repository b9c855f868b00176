use crate::mods::{
    connectivity::{connectivity_2d, connectivity_3d, neighborhood_2d, neighborhood_3d},
    constants::MEDIUM,
    lattice::{CellId, Lattice, Offset, Voxel},
};

pub const FACES_2D: [Offset; 4] = [(0, -1, 0), (1, 0, 0), (0, 1, 0), (-1, 0, 0)];
pub const FACES_3D: [Offset; 6] = [
    (0, -1, 0),
    (1, 0, 0),
    (0, 1, 0),
    (-1, 0, 0),
    (0, 0, 1),
    (0, 0, -1),
];
pub const MOORE_2D: [Offset; 8] = [
    (0, -1, 0),
    (1, -1, 0),
    (1, 0, 0),
    (1, 1, 0),
    (0, 1, 0),
    (-1, 1, 0),
    (-1, 0, 0),
    (-1, -1, 0),
];
pub const MOORE_3D: [Offset; 26] = moore_3d();

const fn moore_3d() -> [Offset; 26] {
    let mut out = [(0, 0, 0); 26];
    let mut n = 0;
    let mut dz = -1;
    while dz <= 1 {
        let mut dx = -1;
        while dx <= 1 {
            let mut dy = -1;
            while dy <= 1 {
                if !(dx == 0 && dy == 0 && dz == 0) {
                    out[n] = (dx, dy, dz);
                    n += 1;
                }
                dy += 1;
            }
            dx += 1;
        }
        dz += 1;
    }
    out
}

/// Neighbourhood shape of the lattice. The stepper, the energy terms and the
/// connectivity check only see the lattice through this trait.
pub trait Geometry: Send + Sync {
    /// Face-adjacent offsets used for targets, surfaces and connectivity.
    fn faces(&self) -> &'static [Offset];

    /// Full neighbourhood used for adhesion contacts.
    fn moore(&self) -> &'static [Offset];

    /// Whether flipping `voxel` into or out of `id` keeps `id` connected.
    fn is_connected(&self, lattice: &Lattice, voxel: Voxel, id: CellId) -> bool;

    /// Distinct face-neighbour ids that differ from the id at `voxel`, in face order.
    fn unique_targets(&self, lattice: &Lattice, voxel: Voxel, out: &mut Vec<CellId>) {
        out.clear();
        let source = lattice.get(voxel);
        for &offset in self.faces() {
            let id = lattice.get_offset(voxel, offset);
            if id != source && !out.contains(&id) {
                out.push(id);
            }
        }
    }

    /// Surface change `(source, target)` if `voxel` moves from `source` to `target`.
    fn surface_change(
        &self,
        lattice: &Lattice,
        voxel: Voxel,
        source: CellId,
        target: CellId,
    ) -> (i64, i64) {
        let mut source_change = 0;
        let mut target_change = 0;
        for &offset in self.faces() {
            let id = lattice.get_offset(voxel, offset);
            source_change += if id == source { 1 } else { -1 };
            target_change += if id == target { -1 } else { 1 };
        }
        (
            if source == MEDIUM { 0 } else { source_change },
            if target == MEDIUM { 0 } else { target_change },
        )
    }

    /// Faces of `voxel` that border a voxel not owned by `id`.
    fn boundary_faces(&self, lattice: &Lattice, voxel: Voxel, id: CellId) -> usize {
        self.faces()
            .iter()
            .filter(|&&offset| lattice.get_offset(voxel, offset) != id)
            .count()
    }

    /// Surface of `id` by full scan.
    fn surface_of(&self, lattice: &Lattice, id: CellId) -> usize {
        lattice
            .voxels_of(id)
            .into_iter()
            .map(|voxel| self.boundary_faces(lattice, voxel, id))
            .sum()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Rect2D;

#[derive(Debug, Clone, Copy, Default)]
pub struct Rect3D;

impl Geometry for Rect2D {
    fn faces(&self) -> &'static [Offset] {
        &FACES_2D
    }

    fn moore(&self) -> &'static [Offset] {
        &MOORE_2D
    }

    fn is_connected(&self, lattice: &Lattice, voxel: Voxel, id: CellId) -> bool {
        connectivity_2d(
            &neighborhood_2d(lattice, voxel, id),
            lattice.get(voxel) == MEDIUM,
        )
    }
}

impl Geometry for Rect3D {
    fn faces(&self) -> &'static [Offset] {
        &FACES_3D
    }

    fn moore(&self) -> &'static [Offset] {
        &MOORE_3D
    }

    fn is_connected(&self, lattice: &Lattice, voxel: Voxel, id: CellId) -> bool {
        connectivity_3d(
            &neighborhood_3d(lattice, voxel, id),
            lattice.get(voxel) == MEDIUM,
        )
    }
}

pub fn for_lattice(lattice: &Lattice) -> Box<dyn Geometry> {
    if lattice.is_single() {
        Box::new(Rect2D)
    } else {
        Box::new(Rect3D)
    }
}
