pub mod agent;
pub mod connectivity;
pub mod constants;
pub mod energy;
pub mod error;
pub mod geometry;
pub mod io_handler;
pub mod lattice;
pub mod potts;
pub mod registry;
pub mod settings;
pub mod simulation;
pub mod snapshot;
pub mod split;
pub mod state;
pub mod utils;
