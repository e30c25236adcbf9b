use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use crate::config::defs::{PipelineError, FASTA_EXTS, OUTPUT_DIR_NAME};
use crate::utils::samplesheet::SampleRecord;

/// Every file a sample's pipeline reads or writes, derived once at planning
/// time. Each entry is written by exactly one stage and consumed by later
/// stages; all derived paths live under the sample's own output directory so
/// concurrent samples never collide.
#[derive(Debug, Clone)]
pub struct SamplePaths {
    pub output_base: PathBuf,

    // Inputs, resolved against the base dir
    pub fwd_read: PathBuf,
    pub rev_read: PathBuf,
    pub adapter: PathBuf,
    pub reference: PathBuf,

    // Artifacts derived from the shared reference
    pub ref_dict: PathBuf,
    pub ref_faidx: PathBuf,

    // Trimmomatic outputs
    pub fwd_trimmed: PathBuf,
    pub fwd_unpaired: PathBuf,
    pub rev_trimmed: PathBuf,
    pub rev_unpaired: PathBuf,

    // Alignment chain
    pub sam: PathBuf,
    pub bam: PathBuf,
    pub readgroup_bam: PathBuf,

    // Variant calling chain
    pub pileup: PathBuf,
    pub vcf: PathBuf,
    pub filtered_vcf: PathBuf,
    pub consensus: PathBuf,

    // Reports
    pub vcf_stats: PathBuf,
    pub wgs_metrics: PathBuf,
    pub size_metrics: PathBuf,
    pub size_histogram: PathBuf,
    pub flagstat: PathBuf,
}

impl SamplePaths {
    /// Derives the full path set for one sample and creates its output
    /// directory. An already-existing sample directory is a hard error:
    /// there is no overwrite or resume support, every run needs a fresh
    /// output root or fresh sample names.
    pub fn plan(record: &SampleRecord, base_dir: &Path) -> Result<SamplePaths, PipelineError> {
        let output_root = base_dir.join(OUTPUT_DIR_NAME);
        fs::create_dir_all(&output_root).map_err(|e| {
            PipelineError::IOError(format!("cannot create {}: {}", output_root.display(), e))
        })?;

        let sample_base = output_root.join(&record.sample);
        fs::create_dir(&sample_base).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => PipelineError::OutputDirExists(sample_base.clone()),
            _ => PipelineError::IOError(format!("cannot create {}: {}", sample_base.display(), e)),
        })?;

        let fwd_read = base_dir.join(&record.fwd_read);
        let rev_read = base_dir.join(&record.rev_read);
        let reference = base_dir.join(&record.reference);
        let ref_dict = reference_dict_path(&reference)?;
        let ref_faidx = append_suffix(&reference, ".fai");

        let fwd_name = file_name_of(&fwd_read)?;
        let rev_name = file_name_of(&rev_read)?;
        let sample = &record.sample;

        Ok(SamplePaths {
            adapter: base_dir.join(&record.adapter),

            ref_dict,
            ref_faidx,

            fwd_trimmed: sample_base.join(format!("{fwd_name}.trimmed.fastq")),
            fwd_unpaired: sample_base.join(format!("{fwd_name}.unpaired.fastq")),
            rev_trimmed: sample_base.join(format!("{rev_name}.trimmed.fastq")),
            rev_unpaired: sample_base.join(format!("{rev_name}.unpaired.fastq")),

            sam: sample_base.join(format!("{sample}.sam")),
            bam: sample_base.join(format!("{sample}.bam")),
            readgroup_bam: sample_base.join(format!("{sample}.readgroup.bam")),

            pileup: sample_base.join(format!("{sample}.pileup.bcf")),
            vcf: sample_base.join(format!("{sample}.vcf")),
            filtered_vcf: sample_base.join(format!("{sample}.filtered.vcf.gz")),
            consensus: sample_base.join(format!("{sample}.consensus.fasta")),

            vcf_stats: sample_base.join(format!("{sample}.vcf.stats.txt")),
            wgs_metrics: sample_base.join(format!("{sample}.picard_wgs.txt")),
            size_metrics: sample_base.join(format!("{sample}.picard_size.txt")),
            size_histogram: sample_base.join(format!("{sample}.picard_size_hist.pdf")),
            flagstat: sample_base.join(format!("{sample}.flagstat.txt")),

            fwd_read,
            rev_read,
            reference,
            output_base: sample_base,
        })
    }
}

/// The sequence dictionary sits next to the reference with the FASTA
/// extension swapped for `.dict`. A reference without a recognized extension
/// is rejected here rather than silently producing a wrong path.
fn reference_dict_path(reference: &Path) -> Result<PathBuf, PipelineError> {
    match reference.extension().and_then(|e| e.to_str()) {
        Some(ext) if FASTA_EXTS.contains(&ext) => Ok(reference.with_extension("dict")),
        _ => Err(PipelineError::InvalidReference(reference.to_path_buf())),
    }
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(suffix);
    path.with_file_name(name)
}

fn file_name_of(path: &Path) -> Result<String, PipelineError> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| PipelineError::MissingInput(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn record(sample: &str) -> SampleRecord {
        SampleRecord {
            sample: sample.to_string(),
            fwd_read: format!("reads/{sample}_R1.fastq.gz"),
            rev_read: format!("reads/{sample}_R2.fastq.gz"),
            adapter: "adapters.fasta".to_string(),
            reference: "refs/genome.fasta".to_string(),
        }
    }

    fn all_derived(paths: &SamplePaths) -> Vec<&PathBuf> {
        vec![
            &paths.fwd_trimmed,
            &paths.fwd_unpaired,
            &paths.rev_trimmed,
            &paths.rev_unpaired,
            &paths.sam,
            &paths.bam,
            &paths.readgroup_bam,
            &paths.pileup,
            &paths.vcf,
            &paths.filtered_vcf,
            &paths.consensus,
            &paths.vcf_stats,
            &paths.wgs_metrics,
            &paths.size_metrics,
            &paths.size_histogram,
            &paths.flagstat,
        ]
    }

    #[test]
    fn distinct_samples_share_no_derived_path() {
        let dir = tempfile::tempdir().unwrap();
        let a = SamplePaths::plan(&record("alpha"), dir.path()).unwrap();
        let b = SamplePaths::plan(&record("beta"), dir.path()).unwrap();

        let mut seen: HashSet<&PathBuf> = HashSet::new();
        for path in all_derived(&a).into_iter().chain(all_derived(&b)) {
            assert!(seen.insert(path), "path collision: {}", path.display());
        }
        assert!(a.output_base.ends_with("Output/alpha"));
        assert!(b.output_base.ends_with("Output/beta"));
    }

    #[test]
    fn derived_paths_stay_inside_sample_dir() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SamplePaths::plan(&record("alpha"), dir.path()).unwrap();
        for path in all_derived(&paths) {
            assert!(
                path.starts_with(&paths.output_base),
                "{} escapes the sample dir",
                path.display()
            );
        }
    }

    #[test]
    fn replanning_existing_sample_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        SamplePaths::plan(&record("alpha"), dir.path()).unwrap();
        let err = SamplePaths::plan(&record("alpha"), dir.path()).unwrap_err();
        assert!(matches!(err, PipelineError::OutputDirExists(_)));
    }

    #[test]
    fn dict_path_swaps_fasta_extension() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SamplePaths::plan(&record("alpha"), dir.path()).unwrap();
        assert!(paths.ref_dict.ends_with("refs/genome.dict"));
        assert!(paths.ref_faidx.ends_with("refs/genome.fasta.fai"));
    }

    #[test]
    fn unrecognized_reference_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut bad = record("alpha");
        bad.reference = "refs/genome.gbk".to_string();
        let err = SamplePaths::plan(&bad, dir.path()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidReference(_)));
    }
}
