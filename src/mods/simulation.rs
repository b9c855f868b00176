use crate::mods::{
    agent::Agents,
    error::PottsError,
    io_handler,
    lattice::{Lattice, Voxel},
    potts::{Potts, TickStats},
    registry::CellRegistry,
    settings::Settings,
    snapshot::Snapshot,
    state::SimLog,
};
use rand::{SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha8Rng;
use std::{
    error::Error,
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
};
use tracing::{debug, info};

type Result<T> = std::result::Result<T, Box<dyn Error>>;

/// Process-wide stop request for the binary run. Setting it from any thread
/// ends `run_simulation` after the tick in progress; the log and snapshots
/// written so far are flushed as usual.
pub static STOP: AtomicBool = AtomicBool::new(false);

#[derive(Debug)]
pub struct Simulation {
    pub cfg: Settings,
    pub rng: ChaCha8Rng,
    pub potts: Potts,
    pub agents: Agents,
    pub simlog: SimLog,
    pub src_path: PathBuf,
    pub dst_path: PathBuf,
    pub tick: u64,
    snapshots: Option<BufWriter<File>>,
}

impl Simulation {
    /// Loads `InitSettings.ini` next to the binary and prepares the output directory.
    pub fn new() -> Result<Self> {
        let exe_dir =
            io_handler::get_exe_dir().map_err(|e| format!("get_exe_dir() failed: {e}"))?;

        let mut cfg = Settings::new();

        io_handler::load_config(&mut cfg, &exe_dir)
            .map_err(|e| format!("Failed to load config from {:?}: {e}", exe_dir))?;
        cfg.src_path = exe_dir;
        cfg.validate()?;

        let mut simulation = Self::from_settings(cfg)?;
        simulation.prepare_output()?;

        Ok(simulation)
    }

    /// Builds the engine and agents without touching the output directory.
    pub fn from_settings(cfg: Settings) -> Result<Self> {
        cfg.validate()?;

        let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
        let params = cfg.potts_params();
        let mut agents = Agents::new(cfg.blueprint_table());

        let (potts, tick) = if cfg.load_prev.trim().is_empty() {
            let lattice = Lattice::with_active(cfg.sx, cfg.sy, cfg.sz)?;
            let mut potts = Potts::new(lattice, CellRegistry::new(), &params)?;
            initial_layout(&mut potts, &mut agents, &cfg, &mut rng)?;
            (potts, 0)
        } else {
            let snapshot = io_handler::load_snapshot(&cfg)
                .map_err(|e| format!("Failed to load snapshot '{}': {e}", cfg.load_prev))?;
            let (lattice, registry) = resume(&cfg, &snapshot)?;
            let potts = Potts::new(lattice, registry, &params)?;
            agents.adopt_all(&potts)?;
            info!(tick = snapshot.tick, cells = potts.registry().len(), "resumed from snapshot");
            (potts, snapshot.tick)
        };

        let src_path = cfg.src_path.clone();
        let mut simulation = Self {
            cfg,
            rng,
            potts,
            agents,
            simlog: SimLog::new(),
            src_path,
            dst_path: PathBuf::new(),
            tick,
            snapshots: None,
        };

        simulation.simlog.measure(&simulation.potts, tick, &TickStats::default())?;
        simulation.simlog.add_log_point();

        Ok(simulation)
    }

    fn prepare_output(&mut self) -> Result<()> {
        self.dst_path = io_handler::prepare_main_dir(&self.cfg)
            .map_err(|e| format!("Failed to prepare main dir: {e}"))?;
        self.cfg.dst_path = self.dst_path.clone();

        self.simlog
            .create_out_file(self.dst_path.clone())
            .map_err(|e| format!("Failed to create log file: {e}"))?;

        let mut snapshots = io_handler::prepare_files(&self.cfg)
            .map_err(|e| format!("Failed to prepare files: {e}"))?;
        io_handler::write_snapshot(&mut snapshots, &Snapshot::capture(&self.potts, self.tick))?;
        self.snapshots = Some(snapshots);

        Ok(())
    }

    /// Runs `StepLim` ticks and writes the run log.
    pub fn run_simulation(&mut self, cancel: &AtomicBool) -> Result<()> {
        self.run_ticks(self.cfg.step_lim, cancel)?;

        if self.simlog.out_file_buf.is_some() {
            self.simlog.write_log_to_file()?;
        }
        if let Some(buf) = &mut self.snapshots {
            buf.flush()?;
        }
        Ok(())
    }

    /// Runs up to `count` ticks, stopping early only between ticks. Returns the ticks run.
    pub fn run_ticks(&mut self, count: u64, cancel: &AtomicBool) -> Result<u64> {
        let cfg = &self.cfg;
        let (agent_check_part, write_check_part, print_check_part) =
            (cfg.agent_i > 0, cfg.write_i > 0, cfg.print_i > 0);
        let (agent_i, write_i, print_i) = (cfg.agent_i, cfg.write_i, cfg.print_i);

        let mut done = 0;
        while done < count {
            if cancel.load(Ordering::Relaxed) {
                info!(tick = self.tick, "run cancelled");
                break;
            }

            let tick = self.tick + 1;
            let stats = self.potts.step(&mut self.rng)?;

            if agent_check_part && tick % agent_i == 0 {
                let agent_stats = self.agents.step(&mut self.potts, &mut self.rng)?;
                debug!(
                    tick,
                    divisions = agent_stats.divisions,
                    apoptotic = agent_stats.apoptotic,
                    removals = agent_stats.removals,
                    "agents stepped"
                );
            }

            self.tick = tick;
            done += 1;

            if write_check_part && tick % write_i == 0 {
                self.simlog.measure(&self.potts, tick, &stats)?;
                self.simlog.add_log_point();
                if let Some(buf) = &mut self.snapshots {
                    io_handler::write_snapshot(buf, &Snapshot::capture(&self.potts, tick))?;
                }
            }

            if print_check_part && tick % print_i == 0 {
                let energy = self.potts.total_energy()?;
                info!(
                    tick,
                    accepted = stats.accepted,
                    proposals = stats.proposals,
                    cells = self.potts.registry().len(),
                    energy,
                    "Steps: {}/{}",
                    done,
                    count
                );
            }
        }

        Ok(done)
    }
}

/// Rebuilds lattice and registry from `snapshot`, which must match the configured size.
fn resume(cfg: &Settings, snapshot: &Snapshot) -> Result<(Lattice, CellRegistry)> {
    let expected = Lattice::with_active(cfg.sx, cfg.sy, cfg.sz)?;
    if expected.dims() != (snapshot.length, snapshot.width, snapshot.height) {
        return Err(Box::new(PottsError::Snapshot(format!(
            "lattice {}x{}x{} does not match Sx={} Sy={} Sz={}",
            snapshot.length, snapshot.width, snapshot.height, cfg.sx, cfg.sy, cfg.sz
        ))));
    }
    Ok(snapshot.restore()?)
}

/// Places `Cells_<p>` square (cube) cells of side `round(VCrit^(1/d))` on a shuffled grid of slots.
pub fn initial_layout(
    potts: &mut Potts,
    agents: &mut Agents,
    cfg: &Settings,
    rng: &mut ChaCha8Rng,
) -> Result<()> {
    let single = cfg.is_single();
    let dims = if single { 2.0 } else { 3.0 };

    let mut requests = Vec::new();
    for blueprint in agents.table().iter() {
        let cells = cfg.populations[blueprint.pop - 1].cells;
        let side = (blueprint.critical_volume.powf(1.0 / dims).round() as usize).max(1);
        requests.extend(std::iter::repeat_n((blueprint.pop, side), cells));
    }
    if requests.is_empty() {
        return Ok(());
    }

    let slot = requests.iter().map(|&(_, side)| side).max().unwrap_or(1) + 1;
    let (nsx, nsy) = (cfg.sx / slot, cfg.sy / slot);
    let nsz = if single { 1 } else { cfg.sz / slot };

    let mut slots: Vec<(usize, usize, usize)> = Vec::with_capacity(nsx * nsy * nsz);
    for i in 0..nsx {
        for j in 0..nsy {
            for k in 0..nsz {
                slots.push((i, j, k));
            }
        }
    }
    if slots.len() < requests.len() {
        return Err(Box::new(PottsError::Setup(format!(
            "cannot place {} cells in {} slots of side {}",
            requests.len(),
            slots.len(),
            slot
        ))));
    }
    slots.shuffle(rng);

    for (&(pop, side), &(i, j, k)) in requests.iter().zip(slots.iter()) {
        let mut voxels = Vec::with_capacity(side * side * if single { 1 } else { side });
        let (x0, y0) = (1 + i * slot, 1 + j * slot);
        for x in x0..x0 + side {
            for y in y0..y0 + side {
                if single {
                    voxels.push(Voxel::new(x, y, 0));
                } else {
                    let z0 = 1 + k * slot;
                    for z in z0..z0 + side {
                        voxels.push(Voxel::new(x, y, z));
                    }
                }
            }
        }
        let agent = agents.table().place(potts, pop, &voxels)?;
        agents.insert(agent);
    }

    info!(cells = requests.len(), slot, "initial layout placed");
    Ok(())
}
