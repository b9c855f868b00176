use cpm_model::mods::simulation::{STOP, Simulation};

use std::time::Instant;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let sta1 = Instant::now();

    let sta2 = Instant::now();

    let mut simulation = match Simulation::new() {
        Ok(simulation) => simulation,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1)
        }
    };

    let fin2 = sta2.elapsed();
    info!("Preparation DONE! (Time: {:?})", fin2);

    let cfg = &simulation.cfg;
    info!("DST Path: {}", simulation.dst_path.display());
    info!("DirPrefix: {:?}; Seed: {:?};", cfg.dir_prefix, cfg.seed);
    info!("Sx: {:?}; Sy: {:?}; Sz: {:?};", cfg.sx, cfg.sy, cfg.sz);
    info!("T: {:.5e}; MCS: {:?}; Terms: {:?};", cfg.temperature, cfg.mcs, cfg.terms);
    for (i, pop) in cfg.populations.iter().enumerate() {
        info!(
            "Population {}: Adhesion: {:?}; VCrit: {:?}; SCrit: {:?}; Cells: {:?}; Behavior: {:?};",
            i + 1,
            pop.adhesion,
            pop.v_crit,
            pop.s_crit,
            pop.cells,
            pop.behavior
        );
    }
    info!("AgentI: {:?}; LoadPrev: {:?};", cfg.agent_i, cfg.load_prev);
    info!(
        "StepLim: {:?}; PrintI: {:?}; WriteI: {:?};",
        cfg.step_lim, cfg.print_i, cfg.write_i,
    );

    simulation.run_simulation(&STOP)?;

    let fin1 = sta1.elapsed();
    info!("All DONE! (Time: {:?})", fin1);

    Ok(())
}
