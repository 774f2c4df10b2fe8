use std::fs;
use std::path::{Path, PathBuf};
use csv::Writer;

use crate::errors::Result;
use crate::measurement::{Flag, MeasurementEntry, MeasurementSet};
use crate::schema::MeasurementSchema;

/// Header values of the body model file.
#[derive(Debug, Clone, Copy)]
pub struct ModelHeader {
    pub measurement_conversion_factor: f64,
    pub total_mass: Option<f64>,
}

/// Render the body model measurement file.
///
/// Exported keys only, one `key : value` line each with one decimal. Missing
/// keys become `# key : missing (reason)` comment lines; a value above its
/// plausibility ceiling is followed by `# key : out of range (max ceiling)`.
pub fn format_model_file(set: &MeasurementSet, schema: &MeasurementSchema, header: &ModelHeader) -> String {
    let mut text = format!("measurementconversionfactor : {}\n", header.measurement_conversion_factor);
    if let Some(mass) = header.total_mass {
        text.push_str(&format!("totalmass : {}\n", mass));
    }

    for entry in set.iter().filter(|e| schema.is_exported(e.key())) {
        match entry {
            MeasurementEntry::Present { measurement, flags } => {
                text.push_str(&format!("{} : {:.1}\n", measurement.key, measurement.value));
                for flag in flags.iter().filter(|f| matches!(f, Flag::OutOfRange { .. })) {
                    text.push_str(&format!("# {} : {}\n", measurement.key, flag));
                }
            }
            MeasurementEntry::Missing { key, failure, .. } => {
                text.push_str(&format!("# {} : missing ({})\n", key, failure));
            }
        }
    }
    text
}

/// Write `<subject>.txt` into `output_dir`
pub fn write_model_file<P: AsRef<Path>>(
    set: &MeasurementSet,
    schema: &MeasurementSchema,
    header: &ModelHeader,
    output_dir: P,
    subject: &str,
) -> Result<PathBuf> {
    let output_path = output_dir.as_ref().join(format!("{}.txt", subject));

    // Create directory if it doesn't exist
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&output_path, format_model_file(set, schema, header))?;

    Ok(output_path)
}

/// Write the full report (intermediate keys and failures included) to CSV
pub fn write_report_csv<P: AsRef<Path>>(
    set: &MeasurementSet,
    output_dir: P,
    subject: &str,
) -> Result<PathBuf> {
    let output_path = output_dir.as_ref().join(format!("{}_report.csv", subject));

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = Writer::from_path(&output_path)?;

    writer.write_record(["Key", "Kind", "View", "Value", "Status", "Detail"])?;

    for entry in set.iter() {
        let (value, status, detail) = match entry {
            MeasurementEntry::Present { measurement, flags } => {
                let status = if flags.is_empty() { "present" } else { "flagged" };
                let detail = flags.iter().map(|f| f.to_string()).collect::<Vec<_>>().join("; ");
                (format!("{:.6}", measurement.value), status, detail)
            }
            MeasurementEntry::Missing { failure, .. } => {
                (String::new(), "missing", failure.to_string())
            }
        };

        writer.write_record([
            entry.key().to_string(),
            entry.kind().to_string(),
            entry.view().to_string(),
            value,
            status.to_string(),
            detail,
        ])?;
    }

    writer.flush()?;

    Ok(output_path)
}

/// Write the measurement set as JSON
pub fn write_report_json<P: AsRef<Path>>(
    set: &MeasurementSet,
    output_dir: P,
    subject: &str,
) -> Result<PathBuf> {
    let output_path = output_dir.as_ref().join(format!("{}_report.json", subject));

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&output_path, serde_json::to_string_pretty(set)?)?;

    Ok(output_path)
}
