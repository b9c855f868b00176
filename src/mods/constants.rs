pub const CONFIG_FILE_NAME: &str = "InitSettings.ini";
pub const SNAPSHOTS_FILE_NAME: &str = "Snapshots.jsonl";
pub const SIM_LOG_FILE_NAME: &str = "SimLog.txt";
pub const COMMENT_LINE: &str = "/////////////////////////////// | GENERAL INFO | ///////////////////////////////";

/// Version tag written into every snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Id of the unowned medium.
pub const MEDIUM: i32 = 0;

/// Fraction of the division size a cell must reach before it splits.
pub const SIZE_CHECKPOINT: f64 = 0.95;
/// Division size as a multiple of the critical volume.
pub const SIZE_TARGET: f64 = 2.0;
/// Apoptotic cells are removed once they shrink to this fraction of critical volume.
pub const LATE_SIZE_TARGET: f64 = 0.25;
/// Fraction of critical volume lost per agent tick while apoptotic.
pub const SHRINK_RATE: f64 = 0.5;
/// Allowed relative size difference between the two halves of a split.
pub const BALANCE_DIFFERENCE: f64 = 0.05;
