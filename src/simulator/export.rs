// src/simulator/export.rs - CSV output of run traces
//
// The trace columns are a superset of the dataset columns, so an exported
// closed-loop run can be loaded back with `dataset::load` and replayed.
use csv::Writer;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use super::RunResult;
use crate::error::Result;

pub const TRACE_HEADER: [&str; 6] = [
    "timestamp",
    "target",
    "measured_temp",
    "commanded_power",
    "ambient_temp",
    "reference_power",
];

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub fn write_trace<W: Write>(result: &RunResult, writer: W) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(TRACE_HEADER)?;
    for s in result.samples() {
        wtr.write_record(&[
            s.timestamp.to_string(),
            s.target.to_string(),
            s.measured.to_string(),
            s.commanded.to_string(),
            optional(s.ambient),
            optional(s.reference),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_trace_file(result: &RunResult, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    write_trace(result, File::create(path)?)?;
    tracing::info!("Wrote {} samples of '{}' to {}", result.len(), result.label(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{RunMode, RunSample};

    #[test]
    fn test_trace_layout() {
        let result = RunResult::new(
            "tiny",
            RunMode::ClosedLoop,
            vec![
                RunSample {
                    timestamp: 0.0,
                    target: 40.0,
                    measured: 20.0,
                    commanded: 1.0,
                    ambient: Some(20.0),
                    reference: None,
                },
                RunSample {
                    timestamp: 1.0,
                    target: 40.0,
                    measured: 20.5,
                    commanded: 0.75,
                    ambient: None,
                    reference: Some(0.5),
                },
            ],
        );
        let mut out = Vec::new();
        write_trace(&result, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "timestamp,target,measured_temp,commanded_power,ambient_temp,reference_power");
        assert_eq!(lines[1], "0,40,20,1,20,");
        assert_eq!(lines[2], "1,40,20.5,0.75,,0.5");
    }
}
