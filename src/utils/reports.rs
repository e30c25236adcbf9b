use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use log::debug;
use crate::config::defs::{PipelineError, METRICS_CLASS_MARKER, VCF_STATS_OF_INTEREST};

/// Stat name to raw stat value. No effort is made to convert values to
/// numbers; downstream consumers decide the numeric interpretation.
pub type StatMap = BTreeMap<String, String>;

/// Extracts the allow-listed summary numbers from a bcftools-stats report.
///
/// Lines starting with the `SN` tag are tab-split; the second-to-last field
/// is the colon-terminated stat name and the last field its value. Only stat
/// names on the allow-list are retained (trailing colon stripped); anything
/// else, including untagged lines, is ignored. An allow-listed stat absent
/// from the report is simply absent from the result.
pub fn extract_vcf_stats(path: &Path) -> Result<StatMap, PipelineError> {
    let file = File::open(path)
        .map_err(|e| PipelineError::IOError(format!("cannot open {}: {}", path.display(), e)))?;

    let mut stats = StatMap::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| PipelineError::IOError(e.to_string()))?;
        if !line.starts_with("SN") {
            continue;
        }
        let parts: Vec<&str> = line.trim().split('\t').collect();
        if parts.len() < 2 {
            continue;
        }
        let stat = parts[parts.len() - 2];
        let value = parts[parts.len() - 1];
        if VCF_STATS_OF_INTEREST.contains(stat) {
            stats.insert(
                stat.trim_end_matches(':').to_string(),
                value.to_string(),
            );
        }
    }

    debug!("{}: extracted {} vcf stats", path.display(), stats.len());
    Ok(stats)
}

/// Extracts the METRICS CLASS section of a picard wgs or insert-size report.
///
/// Capturing starts after the section marker line and stops at the first
/// blank line. The first captured line is the tab-split header row, the
/// second the tab-split value row; the result is their positional zip. A
/// section with fewer than two rows, or with differing field counts, is a
/// malformed report.
pub fn extract_metrics_class(path: &Path) -> Result<StatMap, PipelineError> {
    let file = File::open(path)
        .map_err(|e| PipelineError::IOError(format!("cannot open {}: {}", path.display(), e)))?;

    let mut captured: Vec<Vec<String>> = Vec::new();
    let mut keep_line = false;
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| PipelineError::IOError(e.to_string()))?;
        if keep_line {
            // in practice the blank line lands after exactly 2 rows
            if line.trim().is_empty() {
                break;
            }
            captured.push(line.trim().split('\t').map(str::to_string).collect());
        }
        if line.starts_with(METRICS_CLASS_MARKER) {
            keep_line = true;
        }
    }

    if captured.len() < 2 {
        return Err(PipelineError::MalformedReport {
            path: path.to_path_buf(),
            reason: format!(
                "expected header and value rows after \"{}\", found {} row(s)",
                METRICS_CLASS_MARKER,
                captured.len()
            ),
        });
    }

    let header = &captured[0];
    let values = &captured[1];
    if header.len() != values.len() {
        return Err(PipelineError::MalformedReport {
            path: path.to_path_buf(),
            reason: format!(
                "header has {} fields but value row has {}",
                header.len(),
                values.len()
            ),
        });
    }

    Ok(header
        .iter()
        .cloned()
        .zip(values.iter().cloned())
        .collect())
}

/// Folds report StatMaps into one per-sample map. Later sources override
/// earlier ones on key collision; the fixed merge order makes that
/// last-write-wins policy explicit rather than accidental.
pub fn merge_stats<I>(sources: I) -> StatMap
where
    I: IntoIterator<Item = StatMap>,
{
    let mut merged = StatMap::new();
    for source in sources {
        merged.extend(source);
    }
    merged
}

/// Writes the consolidated table: one row per sample, first column `Sample`,
/// remaining columns the sorted union of stat names across all samples.
/// Samples missing a stat get an empty cell.
pub fn write_final_table(
    path: &Path,
    rows: &[(String, StatMap)],
) -> Result<(), PipelineError> {
    let columns: BTreeSet<&str> = rows
        .iter()
        .flat_map(|(_, stats)| stats.keys().map(String::as_str))
        .collect();

    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| PipelineError::IOError(format!("cannot create {}: {}", path.display(), e)))?;

    let mut header: Vec<&str> = vec!["Sample"];
    header.extend(columns.iter().copied());
    writer
        .write_record(&header)
        .map_err(|e| PipelineError::IOError(e.to_string()))?;

    for (sample, stats) in rows {
        let mut record: Vec<&str> = vec![sample.as_str()];
        for column in &columns {
            record.push(stats.get(*column).map(String::as_str).unwrap_or(""));
        }
        writer
            .write_record(&record)
            .map_err(|e| PipelineError::IOError(e.to_string()))?;
    }

    writer
        .flush()
        .map_err(|e| PipelineError::IOError(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn report(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn vcf_stats_keeps_allowlisted_and_drops_the_rest() {
        let file = report(
            "# This file was produced by bcftools stats\n\
             SN\t0\tnumber of samples:\t1\n\
             SN\t0\tnumber of SNPs:\t42\n\
             SN\t0\tnumber of indels:\t3\n\
             SN\t0\tnumber of unrelatedstat:\t7\n\
             ID\t0\tsomething else\n",
        );
        let stats = extract_vcf_stats(file.path()).unwrap();
        assert_eq!(stats.get("number of SNPs").map(String::as_str), Some("42"));
        assert_eq!(stats.get("number of indels").map(String::as_str), Some("3"));
        assert!(!stats.contains_key("number of unrelatedstat"));
        assert!(!stats.contains_key("number of samples"));
        assert_eq!(stats.len(), 2);
    }

    #[test]
    fn vcf_stats_omits_absent_allowlisted_names() {
        let file = report("SN\t0\tnumber of MNPs:\t0\n");
        let stats = extract_vcf_stats(file.path()).unwrap();
        assert_eq!(stats.len(), 1);
        assert!(!stats.contains_key("number of SNPs"));
    }

    #[test]
    fn metrics_class_zips_header_and_values() {
        let file = report(
            "## htsjdk.samtools.metrics.StringHeader\n\
             # CollectWgsMetrics\n\
             \n\
             ## METRICS CLASS\tpicard.analysis.WgsMetrics\n\
             A\tB\n\
             1\t2\n\
             \n\
             ## HISTOGRAM\tjava.lang.Integer\n",
        );
        let stats = extract_metrics_class(file.path()).unwrap();
        assert_eq!(stats.get("A").map(String::as_str), Some("1"));
        assert_eq!(stats.get("B").map(String::as_str), Some("2"));
        assert_eq!(stats.len(), 2);
    }

    #[test]
    fn metrics_class_field_count_mismatch_is_malformed() {
        let file = report("## METRICS CLASS\nA\tB\tC\n1\t2\n\n");
        let err = extract_metrics_class(file.path()).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedReport { .. }));
    }

    #[test]
    fn metrics_class_truncated_section_is_malformed() {
        let file = report("## METRICS CLASS\nA\tB\n\n");
        let err = extract_metrics_class(file.path()).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedReport { .. }));
    }

    #[test]
    fn metrics_class_missing_marker_is_malformed() {
        let file = report("A\tB\n1\t2\n\n");
        let err = extract_metrics_class(file.path()).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedReport { .. }));
    }

    #[test]
    fn merge_is_last_write_wins() {
        let first = StatMap::from([("X".to_string(), "1".to_string())]);
        let second = StatMap::from([
            ("X".to_string(), "2".to_string()),
            ("Y".to_string(), "3".to_string()),
        ]);
        let merged = merge_stats([first, second]);
        assert_eq!(merged.get("X").map(String::as_str), Some("2"));
        assert_eq!(merged.get("Y").map(String::as_str), Some("3"));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn final_table_unions_columns_and_leaves_gaps_empty() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("final_stats.csv");
        let rows = vec![
            (
                "s1".to_string(),
                StatMap::from([("A".to_string(), "1".to_string())]),
            ),
            (
                "s2".to_string(),
                StatMap::from([
                    ("A".to_string(), "2".to_string()),
                    ("B".to_string(), "9".to_string()),
                ]),
            ),
        ];
        write_final_table(&out, &rows).unwrap();

        let content = std::fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Sample,A,B");
        assert_eq!(lines[1], "s1,1,");
        assert_eq!(lines[2], "s2,2,9");
    }
}
