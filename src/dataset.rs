//! Dataset store: loads recorded or synthetic temperature traces.
//!
//! A dataset is a comma-separated UTF-8 file with a header row and the
//! columns `timestamp`, `measured_temp`, `commanded_power` plus the optional
//! `ambient_temp` and `content_mass`. It can be given directly, as a
//! directory holding `<dir-name>.csv` (or a single `.csv`), or as a `.zip`
//! archive holding `<archive-stem>.csv` (or a single `.csv` entry).
//!
//! Every row is validated once at load time; a dataset is either returned
//! whole or not at all.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Result, ThermoError};

pub const REQUIRED_COLUMNS: [&str; 3] = ["timestamp", "measured_temp", "commanded_power"];
pub const OPTIONAL_COLUMNS: [&str; 2] = ["ambient_temp", "content_mass"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureSample {
    pub timestamp: f64,       // seconds, strictly increasing
    pub measured_temp: f64,   // °C
    pub commanded_power: f64, // 0.0-1.0
    pub ambient_temp: Option<f64>,
    pub content_mass: Option<f64>,
}

impl TemperatureSample {
    pub fn new(timestamp: f64, measured_temp: f64, commanded_power: f64) -> Self {
        Self {
            timestamp,
            measured_temp,
            commanded_power,
            ambient_temp: None,
            content_mass: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatasetMeta {
    pub name: String,
    pub source_path: PathBuf,
    pub description: String,
}

impl DatasetMeta {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// An immutable, validated, time-ordered trace.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    meta: DatasetMeta,
    samples: Vec<TemperatureSample>,
}

impl Dataset {
    /// Build a dataset from samples produced elsewhere (e.g. a live sensor
    /// stream). Applies the same checks as [`load`].
    pub fn from_samples(meta: DatasetMeta, samples: Vec<TemperatureSample>) -> Result<Self> {
        validate_samples(&meta.source_path, &samples)?;
        Ok(Self { meta, samples })
    }

    pub fn meta(&self) -> &DatasetMeta {
        &self.meta
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn samples(&self) -> &[TemperatureSample] {
        &self.samples
    }

    pub fn get(&self, index: usize) -> Option<&TemperatureSample> {
        self.samples.get(index)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }

    /// Interval between the first two samples, 0 for a single-sample trace.
    pub fn nominal_dt(&self) -> f64 {
        match self.samples.get(..2) {
            Some([a, b]) => b.timestamp - a.timestamp,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Sidecar {
    #[serde(default)]
    description: String,
}

/// Load a dataset from a `.csv` file, a directory or a `.zip` archive.
pub fn load(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::error!("Dataset path '{}' does not exist", path.display());
        return Err(ThermoError::DatasetNotFound { path: path.to_path_buf() });
    }

    let name = base_name(path);
    let (samples, description) = if path.is_dir() {
        let csv_path = locate_in_directory(path, &name)?;
        let file = File::open(&csv_path)?;
        let samples = parse_csv(file, &csv_path)?;
        (samples, read_sidecar(&csv_path)?)
    } else if has_extension(path, "zip") {
        load_archive(path, &name)?
    } else {
        let file = File::open(path)?;
        let samples = parse_csv(file, path)?;
        (samples, read_sidecar(path)?)
    };

    let meta = DatasetMeta {
        name,
        source_path: path.to_path_buf(),
        description,
    };
    let dataset = Dataset::from_samples(meta, samples)?;
    tracing::info!(
        "Loaded dataset '{}' ({} samples, {:.1}s) from {}",
        dataset.name(),
        dataset.len(),
        dataset.duration(),
        path.display()
    );
    Ok(dataset)
}

/// Parse CSV text into samples. `origin` is only used for error reporting.
pub fn parse_csv<R: Read>(reader: R, origin: &Path) -> Result<Vec<TemperatureSample>> {
    let format_err = |reason: String| ThermoError::DatasetFormat {
        path: origin.to_path_buf(),
        reason,
    };

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().map_err(|e| format_err(e.to_string()))?.clone();
    let column = |name: &str| headers.iter().position(|h| h == name);

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|c| column(c).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(format_err(format!("missing required column(s): {}", missing.join(", "))));
    }
    // Indices are present: checked just above.
    let [ts_col, temp_col, power_col] = REQUIRED_COLUMNS.map(|c| column(c).unwrap_or_default());
    let ambient_col = column(OPTIONAL_COLUMNS[0]);
    let content_col = column(OPTIONAL_COLUMNS[1]);

    let mut samples = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let row = idx + 1;
        let record = record.map_err(|e| format_err(format!("row {row}: {e}")))?;

        let required = |col: usize, name: &str| -> Result<f64> {
            let raw = record.get(col).unwrap_or("");
            parse_number(raw).ok_or_else(|| format_err(format!("row {row}: {name} '{raw}' is not a finite number")))
        };
        let optional = |col: Option<usize>, name: &str| -> Result<Option<f64>> {
            match col.and_then(|c| record.get(c)) {
                None | Some("") => Ok(None),
                Some(raw) => parse_number(raw)
                    .map(Some)
                    .ok_or_else(|| format_err(format!("row {row}: {name} '{raw}' is not a finite number"))),
            }
        };

        samples.push(TemperatureSample {
            timestamp: required(ts_col, "timestamp")?,
            measured_temp: required(temp_col, "measured_temp")?,
            commanded_power: required(power_col, "commanded_power")?,
            ambient_temp: optional(ambient_col, "ambient_temp")?,
            content_mass: optional(content_col, "content_mass")?,
        });
    }
    Ok(samples)
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn validate_samples(path: &Path, samples: &[TemperatureSample]) -> Result<()> {
    let format_err = |reason: String| ThermoError::DatasetFormat {
        path: path.to_path_buf(),
        reason,
    };
    if samples.is_empty() {
        return Err(format_err("dataset contains no samples".to_string()));
    }
    for (idx, s) in samples.iter().enumerate() {
        let row = idx + 1;
        let finite = [s.timestamp, s.measured_temp, s.commanded_power]
            .into_iter()
            .chain(s.ambient_temp)
            .chain(s.content_mass)
            .all(f64::is_finite);
        if !finite {
            return Err(format_err(format!("row {row}: non-finite value")));
        }
        if !(0.0..=1.0).contains(&s.commanded_power) {
            return Err(format_err(format!(
                "row {row}: commanded_power {} outside [0, 1]",
                s.commanded_power
            )));
        }
    }
    for (idx, pair) in samples.windows(2).enumerate() {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(ThermoError::DatasetOrdering {
                path: path.to_path_buf(),
                row: idx + 2,
                previous: pair[0].timestamp,
                timestamp: pair[1].timestamp,
            });
        }
    }
    Ok(())
}

fn base_name(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string())
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
}

fn locate_in_directory(dir: &Path, name: &str) -> Result<PathBuf> {
    let preferred = dir.join(format!("{name}.csv"));
    if preferred.is_file() {
        return Ok(preferred);
    }
    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, "csv") {
            candidates.push(path);
        }
    }
    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        0 => Err(ThermoError::DatasetFormat {
            path: dir.to_path_buf(),
            reason: "directory contains no .csv file".to_string(),
        }),
        n => Err(ThermoError::DatasetFormat {
            path: dir.to_path_buf(),
            reason: format!("directory contains {n} .csv files and none is named {name}.csv"),
        }),
    }
}

fn read_sidecar(csv_path: &Path) -> Result<String> {
    let sidecar = csv_path.with_extension("toml");
    if !sidecar.is_file() {
        return Ok(String::new());
    }
    let contents = std::fs::read_to_string(&sidecar)?;
    let parsed: Sidecar = toml::from_str(&contents).map_err(|e| ThermoError::DatasetFormat {
        path: sidecar.clone(),
        reason: format!("invalid metadata: {e}"),
    })?;
    Ok(parsed.description)
}

fn load_archive(path: &Path, name: &str) -> Result<(Vec<TemperatureSample>, String)> {
    let zip_err = |e: zip::result::ZipError| ThermoError::DatasetFormat {
        path: path.to_path_buf(),
        reason: format!("zip error: {e}"),
    };
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(zip_err)?;

    let wanted = format!("{name}.csv");
    let csv_entries: Vec<String> = archive
        .file_names()
        .filter(|n| has_extension(Path::new(n), "csv"))
        .map(str::to_string)
        .collect();
    let entry = match csv_entries
        .iter()
        .find(|n| Path::new(n).file_name().is_some_and(|f| f.to_string_lossy() == wanted))
    {
        Some(entry) => entry.clone(),
        None if csv_entries.len() == 1 => csv_entries[0].clone(),
        None => {
            return Err(ThermoError::DatasetFormat {
                path: path.to_path_buf(),
                reason: format!("archive does not contain {wanted}"),
            });
        }
    };

    let description = String::from_utf8_lossy(archive.comment()).trim().to_string();
    let origin = path.join(&entry);
    let reader = archive.by_name(&entry).map_err(zip_err)?;
    let samples = parse_csv(reader, &origin)?;
    Ok((samples, description))
}
