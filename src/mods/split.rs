//! Division of one cell into two connected halves.

use crate::mods::{
    constants::BALANCE_DIFFERENCE,
    error::PottsResult,
    lattice::{CellId, Offset, Voxel},
    potts::Potts,
};
use rand::{Rng, seq::SliceRandom};
use std::{
    cmp::Ordering,
    collections::{BTreeSet, VecDeque},
};
use tracing::debug;

/// Line or plane the voxels are cut along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cut {
    /// Halves separated by x.
    X,
    /// Halves separated by y.
    Y,
    /// Halves separated by z.
    Z,
    /// Halves separated by `dx - dy`, cut along the `x = y` diagonal.
    AlongPositive,
    /// Halves separated by `dx + dy`, cut along the `x = -y` diagonal.
    AlongNegative,
}

impl Cut {
    fn side(self, voxel: Voxel, center: Voxel) -> Ordering {
        let d = |a: usize, b: usize| a as isize - b as isize;
        let (dx, dy, dz) = (
            d(voxel.x, center.x),
            d(voxel.y, center.y),
            d(voxel.z, center.z),
        );
        match self {
            Cut::X => dx.cmp(&0),
            Cut::Y => dy.cmp(&0),
            Cut::Z => dz.cmp(&0),
            Cut::AlongPositive => dx.cmp(&dy),
            Cut::AlongNegative => dx.cmp(&-dy),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPlan {
    pub cut: Cut,
    pub first: Vec<Voxel>,
    pub second: Vec<Voxel>,
}

/// Voxel at the rounded mean position.
pub fn center(voxels: &[Voxel]) -> Option<Voxel> {
    if voxels.is_empty() {
        return None;
    }
    let n = voxels.len() as f64;
    let mean = |f: fn(&Voxel) -> usize| {
        (voxels.iter().map(|v| f(v) as f64).sum::<f64>() / n).round() as usize
    };
    Some(Voxel::new(mean(|v| v.x), mean(|v| v.y), mean(|v| v.z)))
}

/// Extent of the voxels along each line through `center`, per direction.
fn diameter(voxels: &[Voxel], center: Voxel, on_line: impl Fn(isize, isize, isize) -> Option<isize>) -> isize {
    let mut range: Option<(isize, isize)> = None;
    for voxel in voxels {
        let i = voxel.x as isize - center.x as isize;
        let j = voxel.y as isize - center.y as isize;
        let k = voxel.z as isize - center.z as isize;
        if let Some(v) = on_line(i, j, k) {
            range = Some(match range {
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
                None => (v, v),
            });
        }
    }
    range.map_or(0, |(lo, hi)| hi - lo + 1)
}

/// Flat cells are cut along their shortest diameter among the two axes and
/// two diagonals; stacked cells are cut across their longest axis. Ties are
/// broken at random.
pub fn choose_cut<R: Rng>(voxels: &[Voxel], center: Voxel, single: bool, rng: &mut R) -> Cut {
    let candidates: Vec<(Cut, isize)> = if single {
        vec![
            // Shortest along x: the cut runs along x and separates by y.
            (Cut::Y, diameter(voxels, center, |i, j, _| (j == 0).then_some(i))),
            (Cut::X, diameter(voxels, center, |i, j, _| (i == 0).then_some(j))),
            (
                Cut::AlongPositive,
                diameter(voxels, center, |i, j, _| (i == j).then_some(i)),
            ),
            (
                Cut::AlongNegative,
                diameter(voxels, center, |i, j, _| (i == -j).then_some(i)),
            ),
        ]
    } else {
        // Negated so the longest axis wins the minimum below.
        vec![
            (Cut::X, -diameter(voxels, center, |i, j, k| (j == 0 && k == 0).then_some(i))),
            (Cut::Y, -diameter(voxels, center, |i, j, k| (i == 0 && k == 0).then_some(j))),
            (Cut::Z, -diameter(voxels, center, |i, j, k| (i == 0 && j == 0).then_some(k))),
        ]
    };

    let best = candidates.iter().map(|&(_, d)| d).min().unwrap_or(0);
    let ties: Vec<Cut> = candidates
        .into_iter()
        .filter(|&(_, d)| d == best)
        .map(|(cut, _)| cut)
        .collect();
    ties[rng.random_range(0..ties.len())]
}

/// Smaller side of a disconnected set, or `None` if the set is connected.
///
/// The search starts from a random voxel; when the reached part is the
/// larger one, the rest is returned, otherwise the reached part.
fn fragment<R: Rng>(set: &BTreeSet<Voxel>, faces: &[Offset], rng: &mut R) -> Option<Vec<Voxel>> {
    if set.is_empty() {
        return None;
    }
    let start = *set.iter().nth(rng.random_range(0..set.len()))?;

    let mut visited = BTreeSet::from([start]);
    let mut queue = VecDeque::from([start]);
    while let Some(voxel) = queue.pop_front() {
        for &offset in faces {
            let next = voxel.offset(offset);
            if set.contains(&next) && visited.insert(next) {
                queue.push_back(next);
            }
        }
    }

    if visited.len() == set.len() {
        return None;
    }
    if set.len() - visited.len() > visited.len() {
        Some(visited.into_iter().collect())
    } else {
        Some(set.difference(&visited).copied().collect())
    }
}

/// Moves stray fragments across until both halves are connected.
fn connect<R: Rng>(
    a: &mut BTreeSet<Voxel>,
    b: &mut BTreeSet<Voxel>,
    faces: &[Offset],
    rng: &mut R,
) -> bool {
    let total = a.len() + b.len();
    for _ in 0..=total {
        let stray_a = fragment(a, faces, rng);
        let stray_b = fragment(b, faces, rng);
        if stray_a.is_none() && stray_b.is_none() {
            return true;
        }
        for voxel in stray_a.into_iter().flatten() {
            a.remove(&voxel);
            b.insert(voxel);
        }
        for voxel in stray_b.into_iter().flatten() {
            b.remove(&voxel);
            a.insert(voxel);
        }
    }
    false
}

/// Shifts boundary voxels from the larger half while both stay connected.
fn balance<R: Rng>(
    a: &mut BTreeSet<Voxel>,
    b: &mut BTreeSet<Voxel>,
    faces: &[Offset],
    rng: &mut R,
) -> bool {
    loop {
        let (na, nb) = (a.len(), b.len());
        let allowed = ((na + nb) as f64 * BALANCE_DIFFERENCE).ceil() as usize;
        if na.abs_diff(nb) <= allowed {
            return true;
        }

        let (from, to) = if na > nb { (&mut *a, &mut *b) } else { (&mut *b, &mut *a) };

        let mut border: Vec<Voxel> = if to.is_empty() {
            from.iter().copied().collect()
        } else {
            let mut seen = BTreeSet::new();
            to.iter()
                .flat_map(|&v| faces.iter().map(move |&o| v.offset(o)))
                .filter(|v| from.contains(v) && seen.insert(*v))
                .collect()
        };
        border.shuffle(rng);

        let mut moved = false;
        let mut invalid = Vec::new();
        for voxel in border {
            from.remove(&voxel);
            if fragment(from, faces, rng).is_none() {
                to.insert(voxel);
                moved = true;
                break;
            }
            from.insert(voxel);
            invalid.push(voxel);
        }

        if !moved {
            for voxel in invalid {
                from.remove(&voxel);
                to.insert(voxel);
            }
            return connect(a, b, faces, rng);
        }
    }
}

/// Splits `voxels` into two connected, roughly equal halves.
pub fn plan_split<R: Rng>(
    voxels: &[Voxel],
    faces: &[Offset],
    single: bool,
    rng: &mut R,
) -> Option<SplitPlan> {
    let center = center(voxels)?;
    let cut = choose_cut(voxels, center, single, rng);

    let mut first = BTreeSet::new();
    let mut second = BTreeSet::new();
    for &voxel in voxels {
        let lower = match cut.side(voxel, center) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => rng.random::<f64>() < 0.5,
        };
        if lower {
            first.insert(voxel);
        } else {
            second.insert(voxel);
        }
    }

    if !connect(&mut first, &mut second, faces, rng)
        || !balance(&mut first, &mut second, faces, rng)
    {
        return None;
    }
    if first.is_empty()
        || second.is_empty()
        || fragment(&first, faces, rng).is_some()
        || fragment(&second, faces, rng).is_some()
    {
        return None;
    }

    Some(SplitPlan {
        cut,
        first: first.into_iter().collect(),
        second: second.into_iter().collect(),
    })
}

/// Divides `id`; one half keeps the id, the other becomes a new cell of the
/// same population with the given targets. Returns the daughter id, or
/// `None` if no valid split exists.
pub fn divide<R: Rng>(
    potts: &mut Potts,
    id: CellId,
    target_volume: f64,
    target_surface: f64,
    rng: &mut R,
) -> PottsResult<Option<CellId>> {
    let Some(pop) = potts.population(id) else {
        return Ok(None);
    };
    let voxels = potts.lattice().voxels_of(id);
    let faces = potts.geometry().faces();
    let single = potts.lattice().is_single();

    let Some(plan) = plan_split(&voxels, faces, single, rng) else {
        debug!(id, volume = voxels.len(), "no valid split");
        return Ok(None);
    };
    let daughter_voxels = if rng.random::<f64>() < 0.5 {
        plan.second
    } else {
        plan.first
    };

    let daughter = potts.register_cell(pop, target_volume, target_surface)?;
    for voxel in daughter_voxels {
        potts.reassign(voxel, daughter)?;
    }
    potts.set_targets(id, target_volume, target_surface);
    debug!(parent = id, daughter, cut = ?plan.cut, "cell divided");
    Ok(Some(daughter))
}
