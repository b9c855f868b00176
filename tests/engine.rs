use cpm_model::mods::{
    energy::PopulationTable,
    geometry::{FACES_2D, FACES_3D},
    lattice::Voxel,
    potts::{Potts, PottsParams},
    snapshot::Snapshot,
    utils::{check_consistency, count_components},
};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn params(temperature: f64) -> PottsParams {
    let mut table = PopulationTable::zeroed(2);
    table.set_adhesion(1, 0, 16.0).unwrap();
    table.set_adhesion(1, 1, 2.0).unwrap();
    table.set_adhesion(1, 2, 11.0).unwrap();
    table.set_adhesion(2, 0, 16.0).unwrap();
    table.set_adhesion(2, 2, 14.0).unwrap();
    table.lambda_volume = vec![0.0, 1.0, 1.0];
    table.lambda_surface = vec![0.0, 1.0, 1.0];
    PottsParams {
        temperature,
        mcs: 1.0,
        terms: vec![
            "adhesion".to_string(),
            "volume".to_string(),
            "surface".to_string(),
        ],
        table,
    }
}

fn block(x0: usize, y0: usize, side: usize) -> Vec<Voxel> {
    (x0..x0 + side)
        .flat_map(|x| (y0..y0 + side).map(move |y| Voxel::new(x, y, 0)))
        .collect()
}

/// Nine 3x3 cells of alternating populations on a 16x16 region, some touching.
fn engine(temperature: f64) -> Potts {
    let mut potts = Potts::with_size(16, 16, 1, &params(temperature)).unwrap();
    let mut pop = 1;
    for x0 in [2, 5, 10] {
        for y0 in [2, 6, 11] {
            potts.insert_cell(pop, 9.0, 12.0, &block(x0, y0, 3)).unwrap();
            pop = 3 - pop;
        }
    }
    potts
}

/// Four 3x3x3 cells on an 8x8x8 active region, two of them touching.
fn stacked_engine(temperature: f64) -> Potts {
    let mut potts = Potts::with_size(10, 10, 10, &params(temperature)).unwrap();
    let mut pop = 1;
    for (x0, y0, z0) in [(1, 1, 1), (4, 1, 1), (1, 5, 5), (5, 5, 4)] {
        let cube: Vec<Voxel> = (x0..x0 + 3)
            .flat_map(|x| {
                (y0..y0 + 3).flat_map(move |y| (z0..z0 + 3).map(move |z| Voxel::new(x, y, z)))
            })
            .collect();
        potts.insert_cell(pop, 27.0, 54.0, &cube).unwrap();
        pop = 3 - pop;
    }
    potts
}

fn assert_connected(potts: &Potts) {
    let faces = if potts.lattice().is_single() { &FACES_2D[..] } else { &FACES_3D[..] };
    for &id in potts.registry().live_ids() {
        assert_eq!(
            count_components(potts.lattice(), id, faces),
            1,
            "cell {id} split into pieces"
        );
    }
}

#[test]
fn volumes_match_lattice_counts_every_tick() {
    let mut potts = engine(8.0);
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    for _ in 0..10 {
        potts.step(&mut rng).unwrap();
        check_consistency(&potts).unwrap();
    }
}

#[test]
fn same_seed_same_run() {
    let mut a = engine(6.0);
    let mut b = engine(6.0);
    let mut rng_a = ChaCha8Rng::seed_from_u64(99);
    let mut rng_b = ChaCha8Rng::seed_from_u64(99);

    for _ in 0..8 {
        let stats_a = a.step(&mut rng_a).unwrap();
        let stats_b = b.step(&mut rng_b).unwrap();
        assert_eq!(stats_a, stats_b);
    }
    assert_eq!(a.lattice(), b.lattice());
    assert_eq!(a.registry().sorted_ids(), b.registry().sorted_ids());
}

#[test]
fn restored_snapshot_continues_identically() {
    let mut original = engine(5.0);
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    for _ in 0..3 {
        original.step(&mut rng).unwrap();
    }

    let text = Snapshot::capture(&original, 3).encode().unwrap();
    let (lattice, registry) = Snapshot::decode(&text).unwrap().restore().unwrap();
    let mut resumed = Potts::new(lattice, registry, &params(5.0)).unwrap();
    let mut resumed_rng = rng.clone();

    assert_eq!(resumed.total_energy().unwrap(), original.total_energy().unwrap());
    for _ in 0..3 {
        original.step(&mut rng).unwrap();
        resumed.step(&mut resumed_rng).unwrap();
    }

    assert_eq!(resumed.lattice(), original.lattice());
    for id in original.registry().sorted_ids() {
        assert_eq!(resumed.registry().get_cell(id), original.registry().get_cell(id));
    }
}

#[test]
fn stacked_cells_stay_connected_every_tick() {
    for seed in [1, 7, 42] {
        let mut potts = stacked_engine(20.0);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut accepted = 0;
        for _ in 0..10 {
            accepted += potts.step(&mut rng).unwrap().accepted;
            check_consistency(&potts).unwrap();
            assert_connected(&potts);
        }
        assert!(accepted > 0, "no flip accepted for seed {seed}");
        assert_eq!(potts.registry().len(), 4);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn cells_stay_connected(seed in any::<u64>(), temperature in 1.0f64..30.0) {
        let mut potts = engine(temperature);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        for _ in 0..4 {
            potts.step(&mut rng).unwrap();
            assert_connected(&potts);
        }
        prop_assert!(check_consistency(&potts).is_ok());
    }

    #[test]
    fn zero_temperature_never_raises_energy(seed in any::<u64>()) {
        let mut potts = engine(0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut energy = potts.total_energy().unwrap();
        for _ in 0..4 {
            let stats = potts.step(&mut rng).unwrap();
            let next = potts.total_energy().unwrap();
            prop_assert!(stats.delta_sum <= 0.0);
            prop_assert!(next <= energy + 1e-9, "energy rose from {} to {}", energy, next);
            energy = next;
        }
    }
}
