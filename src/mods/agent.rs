use crate::mods::{
    constants::{LATE_SIZE_TARGET, SHRINK_RATE, SIZE_CHECKPOINT, SIZE_TARGET},
    error::{PottsError, PottsResult},
    lattice::{CellId, Voxel},
    potts::Potts,
    split::divide,
};
use rand::Rng;
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Static,
    Proliferative,
}

impl Behavior {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Behavior::Static),
            1 => Some(Behavior::Proliferative),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Quiescent,
    Proliferative { ticks: u64 },
    Apoptotic { ticks: u64 },
}

/// Surface of a compact shape of `volume` voxels.
pub fn shape_surface(volume: f64, single: bool) -> f64 {
    if single {
        (4.0 * volume.sqrt()).ceil()
    } else {
        (6.0 * volume.powf(2.0 / 3.0)).ceil()
    }
}

/// Per-population template cells are built from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellBlueprint {
    pub pop: usize,
    pub critical_volume: f64,
    pub critical_surface: f64,
    pub growth: f64,
    pub apoptosis: f64,
    pub behavior: Behavior,
    single: bool,
    surface_scale: f64,
}

impl CellBlueprint {
    /// `critical_surface <= 0` derives the surface from the volume.
    pub fn new(
        pop: usize,
        critical_volume: f64,
        critical_surface: f64,
        growth: f64,
        apoptosis: f64,
        behavior: Behavior,
        single: bool,
    ) -> Self {
        let shape = shape_surface(critical_volume, single);
        let (critical_surface, surface_scale) = if critical_surface > 0.0 && shape > 0.0 {
            (critical_surface, critical_surface / shape)
        } else {
            (shape, 1.0)
        };
        Self {
            pop,
            critical_volume,
            critical_surface,
            growth,
            apoptosis,
            behavior,
            single,
            surface_scale,
        }
    }

    /// Target surface that goes with a target volume.
    pub fn surface_for(&self, volume: f64) -> f64 {
        shape_surface(volume, self.single) * self.surface_scale
    }

    pub fn initial_state(&self) -> AgentState {
        match self.behavior {
            Behavior::Static => AgentState::Quiescent,
            Behavior::Proliferative => AgentState::Proliferative { ticks: 0 },
        }
    }
}

/// Blueprints keyed by population, `1..=n`.
#[derive(Debug, Clone, Default)]
pub struct BlueprintTable {
    blueprints: Vec<CellBlueprint>,
}

impl BlueprintTable {
    pub fn new(blueprints: Vec<CellBlueprint>) -> Self {
        Self { blueprints }
    }

    pub fn get(&self, pop: usize) -> PottsResult<&CellBlueprint> {
        pop.checked_sub(1)
            .and_then(|i| self.blueprints.get(i))
            .ok_or(PottsError::MissingPopulation { pop })
    }

    pub fn len(&self) -> usize {
        self.blueprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blueprints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellBlueprint> {
        self.blueprints.iter()
    }

    /// Agent for an existing cell of population `pop`.
    pub fn spawn(&self, id: CellId, pop: usize) -> PottsResult<CellAgent> {
        Ok(CellAgent {
            id,
            pop,
            state: self.get(pop)?.initial_state(),
        })
    }

    /// Places a fresh cell of population `pop` at its critical targets.
    pub fn place(
        &self,
        potts: &mut Potts,
        pop: usize,
        voxels: &[Voxel],
    ) -> PottsResult<CellAgent> {
        let blueprint = self.get(pop)?;
        let id = potts.insert_cell(
            pop,
            blueprint.critical_volume,
            blueprint.critical_surface,
            voxels,
        )?;
        self.spawn(id, pop)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentEvent {
    Divided { parent: CellId, daughter: CellId },
    BecameApoptotic { id: CellId },
    Removed { id: CellId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellAgent {
    pub id: CellId,
    pub pop: usize,
    pub state: AgentState,
}

impl CellAgent {
    /// Advances the agent one agent tick against the current engine state.
    pub fn step<R: Rng>(
        &mut self,
        potts: &mut Potts,
        blueprint: &CellBlueprint,
        rng: &mut R,
    ) -> PottsResult<Option<AgentEvent>> {
        let Some((target_volume, _)) = potts.registry().targets(self.id) else {
            return Ok(None);
        };
        let volume = potts.volume(self.id).unwrap_or(0) as f64;
        let critical = blueprint.critical_volume;

        match self.state {
            AgentState::Quiescent => Ok(None),
            AgentState::Proliferative { ticks } => {
                if rng.random::<f64>() < blueprint.apoptosis {
                    self.state = AgentState::Apoptotic { ticks: 0 };
                    return Ok(Some(AgentEvent::BecameApoptotic { id: self.id }));
                }

                let grown = (target_volume + blueprint.growth * critical).min(SIZE_TARGET * critical);
                potts.set_targets(self.id, grown, blueprint.surface_for(grown));
                self.state = AgentState::Proliferative { ticks: ticks + 1 };

                if volume < SIZE_CHECKPOINT * SIZE_TARGET * critical {
                    return Ok(None);
                }
                let targets = (critical, blueprint.critical_surface);
                match divide(potts, self.id, targets.0, targets.1, rng)? {
                    Some(daughter) => {
                        self.state = AgentState::Proliferative { ticks: 0 };
                        Ok(Some(AgentEvent::Divided {
                            parent: self.id,
                            daughter,
                        }))
                    }
                    None => Ok(None),
                }
            }
            AgentState::Apoptotic { ticks } => {
                let shrunk = (target_volume - SHRINK_RATE * critical).max(0.0);
                potts.set_targets(self.id, shrunk, blueprint.surface_for(shrunk));
                self.state = AgentState::Apoptotic { ticks: ticks + 1 };

                if volume <= LATE_SIZE_TARGET * critical {
                    potts.remove_cell(self.id)?;
                    return Ok(Some(AgentEvent::Removed { id: self.id }));
                }
                Ok(None)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentStats {
    pub divisions: usize,
    pub apoptotic: usize,
    pub removals: usize,
}

/// All cell agents, run in ascending id order.
#[derive(Debug, Clone, Default)]
pub struct Agents {
    table: BlueprintTable,
    agents: BTreeMap<CellId, CellAgent>,
}

impl Agents {
    pub fn new(table: BlueprintTable) -> Self {
        Self {
            table,
            agents: BTreeMap::new(),
        }
    }

    pub fn table(&self) -> &BlueprintTable {
        &self.table
    }

    pub fn insert(&mut self, agent: CellAgent) {
        self.agents.insert(agent.id, agent);
    }

    /// One agent per live cell of `potts`, in the blueprint's initial state.
    pub fn adopt_all(&mut self, potts: &Potts) -> PottsResult<()> {
        for id in potts.registry().sorted_ids() {
            let pop = potts
                .population(id)
                .ok_or_else(|| PottsError::Setup(format!("cell {id} has no population")))?;
            self.insert(self.table.spawn(id, pop)?);
        }
        info!(agents = self.agents.len(), "agents adopted");
        Ok(())
    }

    pub fn get(&self, id: CellId) -> Option<&CellAgent> {
        self.agents.get(&id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn step<R: Rng>(&mut self, potts: &mut Potts, rng: &mut R) -> PottsResult<AgentStats> {
        let mut stats = AgentStats::default();
        let ids: Vec<CellId> = self.agents.keys().copied().collect();

        for id in ids {
            if potts.registry().get_cell(id).is_none() {
                self.agents.remove(&id);
                continue;
            }
            let Some(agent) = self.agents.get_mut(&id) else {
                continue;
            };
            let blueprint = self.table.get(agent.pop)?;

            match agent.step(potts, blueprint, rng)? {
                Some(AgentEvent::Divided { parent, daughter }) => {
                    debug!(parent, daughter, "division");
                    stats.divisions += 1;
                    let pop = agent.pop;
                    self.agents.insert(daughter, self.table.spawn(daughter, pop)?);
                }
                Some(AgentEvent::BecameApoptotic { id }) => {
                    debug!(id, "apoptosis started");
                    stats.apoptotic += 1;
                }
                Some(AgentEvent::Removed { id }) => {
                    debug!(id, "apoptotic cell removed");
                    stats.removals += 1;
                    self.agents.remove(&id);
                }
                None => {}
            }
        }
        Ok(stats)
    }
}
