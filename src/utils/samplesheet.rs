use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use serde::Deserialize;
use crate::config::defs::PipelineError;

/// One row of the input sample sheet. Paths are relative to the base dir.
#[derive(Debug, Clone, Deserialize)]
pub struct SampleRecord {
    #[serde(rename = "Sample")]
    pub sample: String,

    #[serde(rename = "Forward Read Path")]
    pub fwd_read: String,

    #[serde(rename = "Reverse Read Path")]
    pub rev_read: String,

    #[serde(rename = "Adapter Path")]
    pub adapter: String,

    #[serde(rename = "Reference Path")]
    pub reference: String,
}

/// Reads the headered CSV sample sheet and rejects rows that cannot be
/// processed: missing columns, blank or duplicate sample ids.
pub fn read_samplesheet(path: &Path) -> Result<Vec<SampleRecord>, PipelineError> {
    let file = File::open(path).map_err(|e| {
        PipelineError::InvalidSampleSheet(format!("cannot open {}: {}", path.display(), e))
    })?;

    let mut reader = csv::Reader::from_reader(file);
    let mut records: Vec<SampleRecord> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for row in reader.deserialize() {
        let record: SampleRecord =
            row.map_err(|e| PipelineError::InvalidSampleSheet(e.to_string()))?;
        let sample = record.sample.trim();
        if sample.is_empty() {
            return Err(PipelineError::InvalidSampleSheet(
                "row with empty sample id".to_string(),
            ));
        }
        if !seen.insert(sample.to_string()) {
            return Err(PipelineError::InvalidSampleSheet(format!(
                "duplicate sample id: {}",
                sample
            )));
        }
        records.push(record);
    }

    if records.is_empty() {
        return Err(PipelineError::InvalidSampleSheet(format!(
            "{} contains no sample rows",
            path.display()
        )));
    }

    Ok(records)
}

/// Checks every referenced input file exists before any sample starts.
pub fn validate_inputs(records: &[SampleRecord], base_dir: &Path) -> Result<(), PipelineError> {
    for record in records {
        for rel in [
            &record.fwd_read,
            &record.rev_read,
            &record.adapter,
            &record.reference,
        ] {
            let path = base_dir.join(rel);
            if !path.is_file() {
                return Err(PipelineError::MissingInput(path));
            }
        }
    }
    Ok(())
}
