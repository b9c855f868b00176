use crate::mods::{
    constants::{COMMENT_LINE, CONFIG_FILE_NAME, SNAPSHOTS_FILE_NAME},
    error::{PottsError, PottsResult},
    settings::{PopulationSettings, Settings, SettingsError},
    snapshot::Snapshot,
};
use chrono::Utc;
use std::{
    collections::HashMap,
    env::current_exe,
    fs::{self, File},
    io::{BufRead, BufReader, BufWriter, Error as IoError, ErrorKind, Result as IoResult, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

use evalexpr::eval_number;

macro_rules! parse_and_assign_eval {
    ($map:expr, $field:ident, $type:ty, $key:expr, number) => {
        $map.insert(
            $key,
            Box::new(|v: &str, s: &mut Settings| {
                let val = eval_number(v).map_err(|e| SettingsError::new($key, v, e))?;
                s.$field = val as $type;
                Ok(())
            }),
        );
    };
}

macro_rules! parse_and_assign_pop {
    ($map:expr, $field:ident, $type:ty, $key:expr) => {
        $map.insert(
            $key,
            Box::new(|k: &str, v: &str, p: &mut PopulationSettings| {
                let val = eval_number(v).map_err(|e| SettingsError::new(k.to_string(), v, e))?;
                p.$field = val as $type;
                Ok(())
            }),
        );
    };
}

type GlobalParser = Box<dyn Fn(&str, &mut Settings) -> Result<(), SettingsError>>;
type PopulationParser = Box<dyn Fn(&str, &str, &mut PopulationSettings) -> Result<(), SettingsError>>;

/// Evaluates each comma separated item of `v` as a number.
fn parse_list(key: &str, v: &str) -> Result<Vec<f64>, SettingsError> {
    v.split(',')
        .map(|item| eval_number(item.trim()).map_err(|e| SettingsError::new(key.to_string(), v, e)))
        .collect()
}

/// Splits `Key_<p>` into `("Key", p)` for `p >= 1`.
fn split_indexed(key: &str) -> Option<(&str, usize)> {
    let (base, index) = key.rsplit_once('_')?;
    match index.parse::<usize>() {
        Ok(p) if p >= 1 && !base.is_empty() => Some((base, p)),
        _ => None,
    }
}

pub fn load_config(cfg: &mut Settings, exe_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::open(exe_dir.join(CONFIG_FILE_NAME))?;
    parse_config(cfg, BufReader::new(file))
}

/// Reads `Key: value` lines up to the `COMMENT_LINE` separator.
pub fn parse_config<R: BufRead>(
    cfg: &mut Settings,
    reader: R,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut dispatch: HashMap<&str, GlobalParser> = HashMap::new();

    dispatch.insert(
        "DirPrefix",
        Box::new(|v: &str, s: &mut Settings| {
            s.dir_prefix = v.to_string();
            Ok(())
        }),
    );
    parse_and_assign_eval!(dispatch, seed, u64, "Seed", number);

    parse_and_assign_eval!(dispatch, sx, usize, "Sx", number);
    parse_and_assign_eval!(dispatch, sy, usize, "Sy", number);
    parse_and_assign_eval!(dispatch, sz, usize, "Sz", number);

    parse_and_assign_eval!(dispatch, temperature, f64, "T", number);
    parse_and_assign_eval!(dispatch, mcs, f64, "MCS", number);
    dispatch.insert(
        "Terms",
        Box::new(|v: &str, s: &mut Settings| {
            s.terms = v
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            Ok(())
        }),
    );

    parse_and_assign_eval!(dispatch, agent_i, u64, "AgentI", number);

    dispatch.insert(
        "LoadPrev",
        Box::new(|v: &str, s: &mut Settings| {
            s.load_prev = v.to_string();
            Ok(())
        }),
    );

    parse_and_assign_eval!(dispatch, step_lim, u64, "StepLim", number);
    parse_and_assign_eval!(dispatch, print_i, u64, "PrintI", number);
    parse_and_assign_eval!(dispatch, write_i, u64, "WriteI", number);

    let mut pop_dispatch: HashMap<&str, PopulationParser> = HashMap::new();

    pop_dispatch.insert(
        "Adhesion",
        Box::new(|k: &str, v: &str, p: &mut PopulationSettings| {
            p.adhesion = parse_list(k, v)?;
            Ok(())
        }),
    );
    parse_and_assign_pop!(pop_dispatch, lambda_v, f64, "LambdaV");
    parse_and_assign_pop!(pop_dispatch, lambda_s, f64, "LambdaS");
    parse_and_assign_pop!(pop_dispatch, lambda_p, f64, "LambdaP");
    parse_and_assign_pop!(pop_dispatch, decay_p, f64, "DecayP");
    parse_and_assign_pop!(pop_dispatch, v_crit, f64, "VCrit");
    parse_and_assign_pop!(pop_dispatch, s_crit, f64, "SCrit");
    parse_and_assign_pop!(pop_dispatch, cells, usize, "Cells");
    parse_and_assign_pop!(pop_dispatch, behavior, i64, "Behavior");
    parse_and_assign_pop!(pop_dispatch, growth, f64, "Growth");
    parse_and_assign_pop!(pop_dispatch, apoptosis, f64, "Apoptosis");

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        let trimmed = line.trim();

        if trimmed == COMMENT_LINE {
            break;
        }
        if trimmed.is_empty() {
            continue;
        }

        let (key, value) = match trimmed.split_once(':') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => ("", ""),
        };

        // LoadPrev may be left empty to start fresh.
        if key.is_empty() || (value.is_empty() && key != "LoadPrev") {
            warn!(line = line_num + 1, "malformed config line '{}'", line);
            continue;
        }

        if let Some(parser) = dispatch.get(key) {
            parser(value, cfg)?;
        } else if let Some((parser, p)) = split_indexed(key)
            .and_then(|(base, p)| pop_dispatch.get(base).map(|parser| (parser, p)))
        {
            parser(key, value, cfg.population_mut(p))?;
        } else {
            warn!(line = line_num + 1, "unknown config key '{}'", key);
        }
    }

    debug!(populations = cfg.populations.len(), "config parsed");
    Ok(())
}

pub fn get_exe_dir() -> IoResult<PathBuf> {
    let exe_path = current_exe()?;

    exe_path.parent().map(|p| p.to_path_buf()).ok_or_else(|| {
        IoError::new(
            ErrorKind::Other,
            "Failed to get the parent directory of the executable.",
        )
    })
}

pub fn create_dir_name(cfg: &Settings, timestamp: i64) -> String {
    format!(
        "{}_{}_X{}Y{}Z{}_T{:e}",
        timestamp, cfg.dir_prefix, cfg.sx, cfg.sy, cfg.sz, cfg.temperature,
    )
}

pub fn prepare_main_dir(cfg: &Settings) -> IoResult<PathBuf> {
    let timestamp = Utc::now().timestamp_micros();
    let dir_name = create_dir_name(cfg, timestamp);
    let res_dir = cfg.src_path.join(&dir_name);

    fs::create_dir_all(&res_dir).map_err(|e| {
        IoError::new(
            e.kind(),
            format!("Failed to create directory '{}': {}", res_dir.display(), e),
        )
    })?;

    Ok(res_dir)
}

pub fn prepare_files(cfg: &Settings) -> IoResult<BufWriter<File>> {
    let path_src_config = cfg.src_path.join(CONFIG_FILE_NAME);
    let path_dst_config = cfg.dst_path.join(CONFIG_FILE_NAME);

    if path_src_config.exists() {
        fs::copy(&path_src_config, &path_dst_config).map_err(|e| {
            IoError::new(
                e.kind(),
                format!(
                    "Failed to copy config from '{}' to '{}': {}",
                    path_src_config.display(),
                    path_dst_config.display(),
                    e
                ),
            )
        })?;
    } else {
        warn!(
            "configuration file '{}' not found, skipping copy",
            path_src_config.display()
        );
    }

    let path_dst_snapshots = cfg.dst_path.join(SNAPSHOTS_FILE_NAME);

    let file = File::create(&path_dst_snapshots).map_err(|e| {
        IoError::new(
            e.kind(),
            format!(
                "Failed to create file '{}': {}",
                path_dst_snapshots.display(),
                e
            ),
        )
    })?;

    Ok(BufWriter::new(file))
}

/// Appends `snapshot` as one JSON line.
pub fn write_snapshot<W: Write>(writer: &mut W, snapshot: &Snapshot) -> PottsResult<()> {
    let line = snapshot.encode()?;
    writeln!(writer, "{}", line)?;
    Ok(())
}

/// Last snapshot of a `.jsonl` stream.
pub fn read_last_snapshot<R: BufRead>(reader: R) -> PottsResult<Snapshot> {
    let mut last_valid_line = None;
    for line_result in reader.lines() {
        let line = line_result?;
        if !line.trim().is_empty() {
            last_valid_line = Some(line);
        }
    }

    match last_valid_line {
        Some(line) => Snapshot::decode(line.trim()),
        None => Err(PottsError::Snapshot("no snapshot lines found".to_string())),
    }
}

/// Loads the most recent snapshot from `path`, relative to `src_path` if not absolute.
pub fn load_snapshot(cfg: &Settings) -> PottsResult<Snapshot> {
    let path = cfg.src_path.join(&cfg.load_prev);
    let file = File::open(&path).map_err(|e| {
        IoError::new(
            e.kind(),
            format!("Failed to open snapshot file '{}': {}", path.display(), e),
        )
    })?;
    read_last_snapshot(BufReader::new(file))
}

pub fn write_state_uni<W, T, F>(writer: &mut W, state: &[T], formatter: &F) -> IoResult<()>
where
    W: Write,
    T: Copy,
    F: Fn(T) -> String + ?Sized,
{
    if state.is_empty() {
        writer.write_all(b"\n")?;
        return Ok(());
    }

    let line = state
        .iter()
        .copied()
        .map(formatter)
        .collect::<Vec<_>>()
        .join(":");

    writeln!(writer, "{}", line)?;
    Ok(())
}
