use crate::mods::{
    constants::SIM_LOG_FILE_NAME,
    error::PottsResult,
    io_handler,
    potts::{Potts, TickStats},
};

use std::{
    fmt::Debug,
    fs::File,
    io::{BufWriter, Error as IoError, ErrorKind, Result as IoResult, Write},
    path::PathBuf,
};
use tracing::error;

pub struct LogEntry<T: Debug + 'static> {
    pub val: T,
    pub log: Vec<T>,
    pub is_on: bool,
    pub format_f: Box<dyn Fn(T) -> String + 'static>,
}

impl<T: Debug + 'static> Debug for LogEntry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogEntry")
            .field("val", &self.val)
            .field("log", &self.log)
            .field("is_on", &self.is_on)
            .field("format_f", &"<closure>")
            .finish()
    }
}

impl<T: Debug + Copy + 'static> LogEntry<T> {
    pub fn new<F>(val: T, is_on: bool, format_f: F) -> Self
    where
        F: Fn(T) -> String + 'static,
    {
        Self {
            val,
            log: Vec::new(),
            is_on,
            format_f: Box::new(format_f),
        }
    }

    pub fn push_if_enabled(&mut self) {
        if self.is_on {
            self.log.push(self.val);
        }
    }

    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        if self.is_on {
            io_handler::write_state_uni(writer, &self.log, &self.format_f)?;
        }
        Ok(())
    }
}

/// Run-level series sampled every `WriteI` ticks.
#[derive(Debug)]
pub struct SimLog {
    pub tick: LogEntry<u64>,
    pub accepted: LogEntry<usize>,
    pub live_cells: LogEntry<usize>,
    pub total_energy: LogEntry<f64>,
    pub mean_volume: LogEntry<f64>,

    pub path_out_file: Option<PathBuf>,
    pub out_file_buf: Option<BufWriter<File>>,
}

impl Default for SimLog {
    fn default() -> Self {
        Self::new()
    }
}

impl SimLog {
    pub fn new() -> Self {
        let fmt1 = |v: f64| format!("{:.15e}", v);
        let fmt2 = |v: usize| v.to_string();
        let fmt3 = |v: u64| v.to_string();

        Self {
            tick: LogEntry::new(0, true, fmt3),
            accepted: LogEntry::new(0, true, fmt2),
            live_cells: LogEntry::new(0, true, fmt2),
            total_energy: LogEntry::new(0.0, true, fmt1),
            mean_volume: LogEntry::new(0.0, true, fmt1),

            path_out_file: None,
            out_file_buf: None,
        }
    }

    pub fn create_out_file(&mut self, path_dst: PathBuf) -> IoResult<()> {
        let path_out_file = path_dst.join(SIM_LOG_FILE_NAME);

        let out_file_buf = BufWriter::new(File::create(&path_out_file).map_err(|e| {
            IoError::new(
                e.kind(),
                format!("Failed to create file '{}': {}", path_out_file.display(), e),
            )
        })?);

        self.path_out_file = Some(path_out_file);
        self.out_file_buf = Some(out_file_buf);

        Ok(())
    }

    /// Updates the current values from the engine after `tick`.
    pub fn measure(&mut self, potts: &Potts, tick: u64, stats: &TickStats) -> PottsResult<()> {
        let registry = potts.registry();

        self.tick.val = tick;
        self.accepted.val = stats.accepted;
        self.live_cells.val = registry.len();

        if self.total_energy.is_on {
            self.total_energy.val = potts.total_energy()?;
        }

        self.mean_volume.val = if registry.is_empty() {
            0.0
        } else {
            registry.iter().map(|r| r.volume as f64).sum::<f64>() / registry.len() as f64
        };

        Ok(())
    }

    pub fn add_log_point(&mut self) {
        self.tick.push_if_enabled();
        self.accepted.push_if_enabled();
        self.live_cells.push_if_enabled();
        self.total_energy.push_if_enabled();
        self.mean_volume.push_if_enabled();
    }

    /// One line per enabled series, in field order.
    pub fn write_log<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        self.tick.write(writer)?;
        self.accepted.write(writer)?;
        self.live_cells.write(writer)?;
        self.total_energy.write(writer)?;
        self.mean_volume.write(writer)?;
        Ok(())
    }

    pub fn write_log_to_file(&mut self) -> IoResult<()> {
        let Some(mut buf) = self.out_file_buf.take() else {
            error!("log file not initialized");
            return Err(IoError::new(ErrorKind::Other, "Log file not initialized"));
        };

        let result = self.write_log(&mut buf).and_then(|_| buf.flush());
        self.out_file_buf = Some(buf);
        result
    }
}
