use std::collections::HashSet;
use std::path::PathBuf;
use crate::cli::Arguments;
use lazy_static::lazy_static;
use thiserror::Error;

// External software
pub const JAVA_TAG: &str = "java";
pub const TRIMMOMATIC_TAG: &str = "trimmomatic";
pub const BWA_TAG: &str = "bwa";
pub const SAMTOOLS_TAG: &str = "samtools";
pub const BCFTOOLS_TAG: &str = "bcftools";
pub const GATK_TAG: &str = "gatk";
pub const PICARD_TAG: &str = "picard";
pub const TABIX_TAG: &str = "tabix";

// Heap ceiling handed to every java-launched tool
pub const JAVA_HEAP_FLAG: &str = "-Xmx2048m";

pub const FASTA_EXTS: &[&'static str] = &["fasta", "fa", "fna"];

// Static Filenames
pub const OUTPUT_DIR_NAME: &str = "Output";
pub const FINAL_STATS_FILENAME: &str = "final_stats.csv";

// Marker opening the one section of a picard report we scrape
pub const METRICS_CLASS_MARKER: &str = "## METRICS CLASS";

lazy_static! {
    /// bcftools-stats summary rows carried into the final table, as they
    /// appear in the report (trailing colon included).
    pub static ref VCF_STATS_OF_INTEREST: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert("number of SNPs:");
        s.insert("number of MNPs:");
        s.insert("number of indels:");
        s.insert("number of others:");
        s.insert("number of multiallelic sites:");
        s.insert("number of multiallelic SNP sites:");

        s
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BwaSubcommand {
    Index,
    Mem,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamtoolsSubcommand {
    Sort,
    Index,
    Faidx,
    Flagstat,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BcftoolsSubcommand {
    Mpileup,
    Call,
    Filter,
    Stats,
    Consensus,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GatkSubcommand {
    CreateSequenceDictionary,
    AddOrReplaceReadGroups,
    HaplotypeCaller,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PicardSubcommand {
    CollectWgsMetrics,
    CollectInsertSizeMetrics,
}

// Static Parameters

// ILLUMINACLIP seed mismatches : palindrome clip : simple clip
pub const CLIP_SEED_MISMATCHES: u32 = 4;
pub const CLIP_PALINDROME_THRESHOLD: u32 = 20;
pub const CLIP_SIMPLE_THRESHOLD: u32 = 10;

// Read-group fields GATK requires before calling
pub const READGROUP_ID: &str = "4";
pub const READGROUP_LIBRARY: &str = "lib1";
pub const READGROUP_PLATFORM: &str = "illumina";
pub const READGROUP_UNIT: &str = "unit1";
pub const READGROUP_SAMPLE: &str = "20";

/// Trimmomatic quality/length thresholds.
#[derive(Debug, Clone)]
pub struct TrimSettings {
    pub leading: u32,
    pub trailing: u32,
    pub min_len: u32,
    pub window_size: u32,
    pub window_quality: u32,
}

/// Variant filter predicate thresholds.
#[derive(Debug, Clone)]
pub struct FilterSettings {
    pub min_qual: u32,
    pub min_depth: u32,
    pub min_allele_fraction: f64,
}

/// Picard CollectWgsMetrics knobs.
#[derive(Debug, Clone)]
pub struct WgsMetricsSettings {
    pub coverage_cap: u64,
    pub fast_algorithm: bool,
    pub sample_size: u64,
}

/// Where each external executable (or jar) lives.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub java: String,
    pub trimmomatic_jar: PathBuf,
    pub bwa: String,
    pub samtools: String,
    pub bcftools: String,
    pub gatk_jar: PathBuf,
    pub picard_jar: PathBuf,
    pub tabix: String,
}

pub struct RunConfig {
    pub base_dir: PathBuf,
    pub out_dir: PathBuf,
    pub samplesheet: PathBuf,
    pub tools: ToolPaths,
    pub trim: TrimSettings,
    pub filter: FilterSettings,
    pub wgs: WgsMetricsSettings,
    pub args: Arguments,
}

impl RunConfig {
    /// Assembles the run configuration once, up front. Stage logic only ever
    /// sees this struct, never ambient globals.
    pub fn from_arguments(args: Arguments, cwd: &PathBuf) -> Result<RunConfig, PipelineError> {
        let base_dir = resolve_path(&args.base_dir, cwd);
        if !base_dir.is_dir() {
            return Err(PipelineError::InvalidConfig(format!(
                "base dir {} is not a directory",
                base_dir.display()
            )));
        }
        let samplesheet = resolve_path(&args.samplesheet, cwd);
        let out_dir = base_dir.join(OUTPUT_DIR_NAME);

        if args.window_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "sliding window size must be at least 1".to_string(),
            ));
        }
        if !(args.min_allele_fraction > 0.0 && args.min_allele_fraction <= 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "allele fraction threshold {} outside (0, 1]",
                args.min_allele_fraction
            )));
        }

        let tools = ToolPaths {
            java: args.java.clone(),
            trimmomatic_jar: PathBuf::from(&args.trimmomatic_jar),
            bwa: args.bwa.clone(),
            samtools: args.samtools.clone(),
            bcftools: args.bcftools.clone(),
            gatk_jar: PathBuf::from(&args.gatk_jar),
            picard_jar: PathBuf::from(&args.picard_jar),
            tabix: args.tabix.clone(),
        };
        let trim = TrimSettings {
            leading: args.leading,
            trailing: args.trailing,
            min_len: args.min_len,
            window_size: args.window_size,
            window_quality: args.window_quality,
        };
        let filter = FilterSettings {
            min_qual: args.min_qual,
            min_depth: args.min_depth,
            min_allele_fraction: args.min_allele_fraction,
        };
        let wgs = WgsMetricsSettings {
            coverage_cap: args.coverage_cap,
            fast_algorithm: args.fast_algorithm,
            sample_size: args.metrics_sample_size,
        };

        Ok(RunConfig {
            base_dir,
            out_dir,
            samplesheet,
            tools,
            trim,
            filter,
            wgs,
            args,
        })
    }
}

fn resolve_path(raw: &str, cwd: &PathBuf) -> PathBuf {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid sample sheet: {0}")]
    InvalidSampleSheet(String),

    #[error("Missing input file: {0:?}")]
    MissingInput(PathBuf),

    #[error("Output directory already exists: {0:?}")]
    OutputDirExists(PathBuf),

    #[error("Reference {0:?} has no recognized FASTA extension")]
    InvalidReference(PathBuf),

    #[error("Failed to spawn {tool}: {error}")]
    ToolSpawn { tool: String, error: String },

    #[error("{tool} exited with code {code} (args: {args})")]
    ToolExecution {
        tool: String,
        args: String,
        code: i32,
    },

    #[error("Malformed report {path:?}: {reason}")]
    MalformedReport { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    IOError(String),

    #[error("{0} sample(s) failed")]
    SamplesFailed(usize),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
