use crate::mods::{
    agent::{Behavior, BlueprintTable, CellBlueprint},
    energy::{PopulationTable, build_terms},
    potts::PottsParams,
};
use std::{borrow::Cow, error::Error, fmt, path::PathBuf};

/// Parameters of one cell population, read from the `_<p>` keys.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationSettings {
    /// `J(p, 0), J(p, 1), .., J(p, N)`.
    pub adhesion: Vec<f64>,
    pub lambda_v: f64,
    pub lambda_s: f64,
    pub lambda_p: f64,
    pub decay_p: f64,
    pub v_crit: f64,
    pub s_crit: f64, // <= 0 derives the surface from VCrit
    pub cells: usize,
    pub behavior: i64,
    pub growth: f64,
    pub apoptosis: f64,
}

impl Default for PopulationSettings {
    fn default() -> Self {
        Self {
            adhesion: vec![16.0, 2.0],
            lambda_v: 1.0,
            lambda_s: 0.0,
            lambda_p: 0.0,
            decay_p: 0.0,
            v_crit: 16.0,
            s_crit: 0.0,
            cells: 4,
            behavior: 0,
            growth: 0.0,
            apoptosis: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub dir_prefix: String,
    pub seed: u64,

    pub sx: usize,
    pub sy: usize,
    pub sz: usize,

    pub temperature: f64,
    pub mcs: f64,
    pub terms: Vec<String>,

    pub populations: Vec<PopulationSettings>,

    pub agent_i: u64, // 0 disables agents

    pub load_prev: String, // empty means fresh layout, otherwise a snapshot file

    pub step_lim: u64,
    pub print_i: u64,
    pub write_i: u64,

    pub src_path: PathBuf,
    pub dst_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dir_prefix: "Default".to_string(),
            seed: 1012,

            sx: 40,
            sy: 40,
            sz: 1,

            temperature: 10.0,
            mcs: 1.0,
            terms: vec!["adhesion".to_string(), "volume".to_string()],

            populations: vec![PopulationSettings::default()],

            agent_i: 1,

            load_prev: String::new(),

            step_lim: 100,
            print_i: 10,
            write_i: 1,

            src_path: PathBuf::new(),
            dst_path: PathBuf::new(),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_single(&self) -> bool {
        self.sz == 1
    }

    /// Entry for population `p >= 1`, growing the list as needed.
    pub fn population_mut(&mut self, p: usize) -> &mut PopulationSettings {
        if self.populations.len() < p {
            self.populations.resize_with(p, PopulationSettings::default);
        }
        &mut self.populations[p - 1]
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.sx == 0 {
            return Err(SettingsError::simple("Sx", "must be > 0"));
        }
        if self.sy == 0 {
            return Err(SettingsError::simple("Sy", "must be > 0"));
        }
        if self.sz == 0 {
            return Err(SettingsError::simple("Sz", "must be > 0"));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(SettingsError::simple("T", "must be >= 0"));
        }
        if !(self.mcs > 0.0) {
            return Err(SettingsError::simple("MCS", "must be > 0"));
        }
        if self.dir_prefix.trim().is_empty() {
            return Err(SettingsError::simple("DirPrefix", "cannot be empty"));
        }
        if self.populations.is_empty() {
            return Err(SettingsError::simple("Adhesion_1", "no populations defined"));
        }

        let n = self.populations.len();
        for (i, pop) in self.populations.iter().enumerate() {
            let p = i + 1;
            if pop.adhesion.len() != n + 1 {
                return Err(SettingsError::simple(
                    format!("Adhesion_{p}"),
                    format!("expected {} values, got {}", n + 1, pop.adhesion.len()),
                ));
            }
            for q in 1..=n {
                let other = self.populations[q - 1].adhesion.get(p).copied();
                if other != Some(pop.adhesion[q]) {
                    return Err(SettingsError::simple(
                        format!("Adhesion_{p}"),
                        format!("J({p},{q}) differs from J({q},{p})"),
                    ));
                }
            }
            if pop.cells > 0 && !(pop.v_crit >= 1.0) {
                return Err(SettingsError::simple(format!("VCrit_{p}"), "must be >= 1"));
            }
            if Behavior::from_code(pop.behavior).is_none() {
                return Err(SettingsError::simple(
                    format!("Behavior_{p}"),
                    "must be 0 (static) or 1 (proliferative)",
                ));
            }
            if !(0.0..=1.0).contains(&pop.apoptosis) {
                return Err(SettingsError::simple(format!("Apoptosis_{p}"), "must be in [0, 1]"));
            }
            if !(0.0..=1.0).contains(&pop.decay_p) {
                return Err(SettingsError::simple(format!("DecayP_{p}"), "must be in [0, 1]"));
            }
            if pop.growth < 0.0 {
                return Err(SettingsError::simple(format!("Growth_{p}"), "must be >= 0"));
            }
        }

        build_terms(&self.terms, &self.population_table())
            .map_err(|e| SettingsError::new("Terms", self.terms.join(","), e))?;

        Ok(())
    }

    /// Parameter tables with the medium row filled in by symmetry.
    pub fn population_table(&self) -> PopulationTable {
        let n = self.populations.len();
        let mut table = PopulationTable::zeroed(n);
        for (i, pop) in self.populations.iter().enumerate() {
            let p = i + 1;
            for (q, &value) in pop.adhesion.iter().enumerate().take(n + 1) {
                table.adhesion[p][q] = value;
            }
            if let Some(&medium) = pop.adhesion.first() {
                table.adhesion[0][p] = medium;
            }
            table.lambda_volume[p] = pop.lambda_v;
            table.lambda_surface[p] = pop.lambda_s;
            table.lambda_persistence[p] = pop.lambda_p;
            table.decay_persistence[p] = pop.decay_p;
        }
        table
    }

    pub fn blueprint_table(&self) -> BlueprintTable {
        let single = self.is_single();
        let blueprints = self
            .populations
            .iter()
            .enumerate()
            .map(|(i, pop)| {
                CellBlueprint::new(
                    i + 1,
                    pop.v_crit,
                    pop.s_crit,
                    pop.growth,
                    pop.apoptosis,
                    Behavior::from_code(pop.behavior).unwrap_or(Behavior::Static),
                    single,
                )
            })
            .collect();
        BlueprintTable::new(blueprints)
    }

    pub fn potts_params(&self) -> PottsParams {
        PottsParams {
            temperature: self.temperature,
            mcs: self.mcs,
            terms: self.terms.clone(),
            table: self.population_table(),
        }
    }
}

#[derive(Debug)]
pub struct SettingsError {
    pub key: Cow<'static, str>,
    pub value: Option<String>,
    pub source: Box<dyn Error + Send + Sync>,
}

impl SettingsError {
    pub fn new<K: Into<Cow<'static, str>>, V: Into<String>, E: Error + Send + Sync + 'static>(
        key: K,
        value: V,
        source: E,
    ) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
            source: Box::new(source),
        }
    }

    pub fn simple<K: Into<Cow<'static, str>>, M: Into<String>>(key: K, message: M) -> Self {
        Self {
            key: key.into(),
            value: None,
            source: Box::new(SimpleMsg(message.into())),
        }
    }
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(
                f,
                "Failed to parse '{}' with value '{}': {}",
                self.key, value, self.source
            ),
            None => write!(f, "Invalid value for '{}': {}", self.key, self.source),
        }
    }
}

impl Error for SettingsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&*self.source)
    }
}

#[derive(Debug)]
pub(crate) struct SimpleMsg(pub(crate) String);

impl fmt::Display for SimpleMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for SimpleMsg {}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_populations() -> Settings {
        let mut cfg = Settings::new();
        cfg.population_mut(1).adhesion = vec![16.0, 2.0, 11.0];
        cfg.population_mut(2).adhesion = vec![5.0, 11.0, 3.0];
        cfg
    }

    #[test]
    fn defaults_are_valid() {
        assert!(Settings::new().validate().is_ok());
        assert!(two_populations().validate().is_ok());
    }

    #[test]
    fn medium_row_follows_by_symmetry() {
        let table = two_populations().population_table();
        assert!(table.adhesion[0][0].is_nan());
        assert_eq!(table.adhesion[0][1], 16.0);
        assert_eq!(table.adhesion[0][2], 5.0);
        assert_eq!(table.adhesion[2][1], 11.0);
        assert_eq!(table.populations(), 2);
    }

    #[test]
    fn rejects_asymmetric_adhesion() {
        let mut cfg = two_populations();
        cfg.population_mut(2).adhesion[1] = 12.0;
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.key, "Adhesion_1");
    }

    #[test]
    fn rejects_short_adhesion_row() {
        let mut cfg = two_populations();
        cfg.population_mut(2).adhesion.pop();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unknown_term() {
        let mut cfg = Settings::new();
        cfg.terms.push("chemotaxis".to_string());
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.key, "Terms");
        assert!(err.to_string().starts_with("Failed to parse 'Terms'"));
    }

    #[test]
    fn zero_temperature_is_allowed() {
        let mut cfg = Settings::new();
        cfg.temperature = 0.0;
        assert!(cfg.validate().is_ok());
        cfg.temperature = -1.0;
        assert!(cfg.validate().is_err());
        cfg.temperature = 1.0;
        cfg.mcs = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn error_message_names_key_and_value() {
        let err = SettingsError::new("Sx", "ten", SimpleMsg("not a number".to_string()));
        assert_eq!(
            err.to_string(),
            "Failed to parse 'Sx' with value 'ten': not a number"
        );

        let err = SettingsError::simple("MCS", "must be positive");
        assert_eq!(err.to_string(), "Invalid value for 'MCS': must be positive");
    }
}
