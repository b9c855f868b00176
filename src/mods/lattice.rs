use crate::mods::{
    constants::MEDIUM,
    error::{PottsError, PottsResult},
};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

pub type CellId = i32;

/// Face or corner offset `(dx, dy, dz)`.
pub type Offset = (isize, isize, isize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Voxel {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl Voxel {
    #[inline(always)]
    pub const fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    /// Shifts by an offset. Callers keep the result inside the halo.
    #[inline(always)]
    pub fn offset(self, (dx, dy, dz): Offset) -> Self {
        Self {
            x: (self.x as isize + dx) as usize,
            y: (self.y as isize + dy) as usize,
            z: (self.z as isize + dz) as usize,
        }
    }
}

/// Dense id array with a fixed 1-voxel medium halo on every open face.
///
/// `nx`, `ny` and `nz` include the halo. A single-layer lattice has `nz == 1`
/// and no halo in z.
#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    nx: usize,
    ny: usize,
    nz: usize,
    size: usize,
    size_zy: usize,
    ids: Box<[CellId]>,
}

impl Lattice {
    pub fn new(nx: usize, ny: usize, nz: usize) -> PottsResult<Self> {
        if nx < 3 || ny < 3 || nz == 2 || nz == 0 {
            return Err(PottsError::Setup(format!(
                "lattice {nx}x{ny}x{nz} leaves no active region inside the halo"
            )));
        }

        let size = nx * ny * nz;
        Ok(Self {
            nx,
            ny,
            nz,
            size,
            size_zy: nz * ny,
            ids: vec![MEDIUM; size].into_boxed_slice(),
        })
    }

    /// Builds a lattice around an active region of `sx * sy * sz` voxels.
    pub fn with_active(sx: usize, sy: usize, sz: usize) -> PottsResult<Self> {
        let nz = if sz == 1 { 1 } else { sz + 2 };
        Self::new(sx + 2, sy + 2, nz)
    }

    pub fn from_ids(nx: usize, ny: usize, nz: usize, ids: Vec<CellId>) -> PottsResult<Self> {
        let mut lattice = Self::new(nx, ny, nz)?;
        if ids.len() != lattice.size {
            return Err(PottsError::Snapshot(format!(
                "expected {} ids, got {}",
                lattice.size,
                ids.len()
            )));
        }
        lattice.ids = ids.into_boxed_slice();

        for idx in 0..lattice.size {
            let voxel = lattice.idx_to_voxel(idx);
            if !lattice.is_active(voxel) && lattice.ids[idx] != MEDIUM {
                return Err(PottsError::Snapshot(format!(
                    "halo voxel ({}, {}, {}) is owned by {}",
                    voxel.x, voxel.y, voxel.z, lattice.ids[idx]
                )));
            }
        }
        Ok(lattice)
    }

    /// Full side lengths `(nx, ny, nz)`, halo included.
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }

    /// Number of voxels, halo included.
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline(always)]
    pub fn xyz_to_idx(&self, x: usize, y: usize, z: usize) -> usize {
        z + y * self.nz + x * self.size_zy
    }

    #[inline(always)]
    pub fn idx_to_xyz(&self, idx: usize) -> (usize, usize, usize) {
        let z = idx % self.nz;
        let y = (idx / self.nz) % self.ny;
        let x = idx / self.size_zy;
        (x, y, z)
    }

    #[inline(always)]
    pub fn idx_to_voxel(&self, idx: usize) -> Voxel {
        let (x, y, z) = self.idx_to_xyz(idx);
        Voxel::new(x, y, z)
    }

    #[inline(always)]
    pub fn is_single(&self) -> bool {
        self.nz == 1
    }

    #[inline(always)]
    pub fn get(&self, voxel: Voxel) -> CellId {
        self.ids[self.xyz_to_idx(voxel.x, voxel.y, voxel.z)]
    }

    /// Id at `voxel + offset`; `voxel` must be active so the offset lands in the halo at worst.
    #[inline(always)]
    pub fn get_offset(&self, voxel: Voxel, offset: Offset) -> CellId {
        self.get(voxel.offset(offset))
    }

    #[inline(always)]
    pub(crate) fn set(&mut self, voxel: Voxel, id: CellId) {
        debug_assert!(self.is_active(voxel), "write into halo at {voxel:?}");
        let idx = self.xyz_to_idx(voxel.x, voxel.y, voxel.z);
        self.ids[idx] = id;
    }

    pub fn x_range(&self) -> RangeInclusive<usize> {
        1..=self.nx - 2
    }

    pub fn y_range(&self) -> RangeInclusive<usize> {
        1..=self.ny - 2
    }

    pub fn z_range(&self) -> RangeInclusive<usize> {
        if self.is_single() { 0..=0 } else { 1..=self.nz - 2 }
    }

    /// Side lengths of the active region.
    pub fn active_dims(&self) -> (usize, usize, usize) {
        let sz = if self.is_single() { 1 } else { self.nz - 2 };
        (self.nx - 2, self.ny - 2, sz)
    }

    pub fn active_size(&self) -> usize {
        let (sx, sy, sz) = self.active_dims();
        sx * sy * sz
    }

    pub fn is_active(&self, voxel: Voxel) -> bool {
        self.x_range().contains(&voxel.x)
            && self.y_range().contains(&voxel.y)
            && self.z_range().contains(&voxel.z)
    }

    pub fn ids(&self) -> &[CellId] {
        &self.ids
    }

    /// Full scan; only for agent-level operations, never per flip.
    pub fn voxels_of(&self, id: CellId) -> Vec<Voxel> {
        self.ids
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v == id)
            .map(|(idx, _)| self.idx_to_voxel(idx))
            .collect()
    }

    pub fn count(&self, id: CellId) -> usize {
        self.ids.iter().filter(|&&v| v == id).count()
    }
}
