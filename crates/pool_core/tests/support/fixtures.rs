#![allow(dead_code)]

use pool_core::grid_world::GridWorld;
use pool_core::model::{Coord, RiderRequest};
use pool_core::params::PoolParams;
use pool_core::rides::generate_rides;
use rand::rngs::StdRng;
use rand::SeedableRng;

pub const GRID_SIZE: i64 = 12;

/// Small fleet and solver budget so whole runs finish quickly.
pub fn small_params(vehicles: usize, capacity: u32) -> PoolParams {
    PoolParams::default()
        .with_num_vehicles(vehicles)
        .with_max_capacity(capacity)
        .with_num_reads(24)
        .with_num_sweeps(300)
        .with_seed(11)
        .with_max_ticks(2_000)
}

/// Seeded batch on the shared grid, requested within the first minute.
pub fn seeded_riders(count: usize, seed: u64) -> Vec<RiderRequest> {
    let mut rng = StdRng::seed_from_u64(seed);
    generate_rides(count, GRID_SIZE, 60, &mut rng).expect("seeded rides")
}

pub fn open_grid() -> GridWorld {
    GridWorld::square(GRID_SIZE).expect("grid")
}

/// Grid whose cell (10, 10) is walled in on all four sides.
pub fn grid_with_enclosed_cell() -> (GridWorld, Coord) {
    let enclosed = Coord::new(10, 10);
    let walls = [
        Coord::new(9, 10),
        Coord::new(11, 10),
        Coord::new(10, 9),
        Coord::new(10, 11),
    ];
    (open_grid().with_blocked(walls), enclosed)
}
