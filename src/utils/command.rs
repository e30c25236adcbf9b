/// Functions and structs for creating command-line arguments per tool

use std::path::Path;
use std::process::Stdio;
use futures::future::try_join_all;
use tokio::process::Command;
use crate::cli::VariantCaller;
use crate::config::defs::{
    PipelineError, RunConfig, BCFTOOLS_TAG, BWA_TAG, JAVA_TAG, SAMTOOLS_TAG, TABIX_TAG,
};

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

pub mod trimmomatic {
    use std::path::Path;
    use crate::config::defs::{
        PipelineError, TrimSettings, CLIP_PALINDROME_THRESHOLD, CLIP_SEED_MISMATCHES,
        CLIP_SIMPLE_THRESHOLD,
    };
    use crate::utils::paths::SamplePaths;
    use super::path_arg;

    pub struct TrimmomaticConfig<'a> {
        pub jar: &'a Path,
        pub paths: &'a SamplePaths,
        pub settings: &'a TrimSettings,
    }

    /// Paired-end trimming at phred33, adapters clipped from the sample's
    /// adapter FASTA. Emits trimmed and unpaired outputs for both mates.
    pub fn arg_generator(config: &TrimmomaticConfig) -> Result<Vec<String>, PipelineError> {
        if config.settings.min_len == 0 {
            return Err(PipelineError::InvalidConfig(
                "trimmomatic MINLEN must be at least 1".to_string(),
            ));
        }

        let paths = config.paths;
        let settings = config.settings;
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("-jar".to_string());
        args_vec.push(path_arg(config.jar));
        args_vec.push("PE".to_string());
        args_vec.push("-phred33".to_string());

        args_vec.push(path_arg(&paths.fwd_read));
        args_vec.push(path_arg(&paths.rev_read));

        args_vec.push(path_arg(&paths.fwd_trimmed));
        args_vec.push(path_arg(&paths.fwd_unpaired));
        args_vec.push(path_arg(&paths.rev_trimmed));
        args_vec.push(path_arg(&paths.rev_unpaired));

        args_vec.push(format!(
            "ILLUMINACLIP:{}:{}:{}:{}",
            path_arg(&paths.adapter),
            CLIP_SEED_MISMATCHES,
            CLIP_PALINDROME_THRESHOLD,
            CLIP_SIMPLE_THRESHOLD
        ));
        args_vec.push(format!("LEADING:{}", settings.leading));
        args_vec.push(format!("TRAILING:{}", settings.trailing));
        args_vec.push(format!(
            "SLIDINGWINDOW:{}:{}",
            settings.window_size, settings.window_quality
        ));
        args_vec.push(format!("MINLEN:{}", settings.min_len));

        Ok(args_vec)
    }
}

pub mod bwa {
    use crate::config::defs::{BwaSubcommand, PipelineError};
    use crate::utils::paths::SamplePaths;
    use super::path_arg;

    pub struct BwaConfig<'a> {
        pub subcommand: BwaSubcommand,
        pub paths: &'a SamplePaths,
    }

    pub fn arg_generator(config: &BwaConfig) -> Result<Vec<String>, PipelineError> {
        let paths = config.paths;
        let args_vec = match config.subcommand {
            BwaSubcommand::Index => {
                vec!["index".to_string(), path_arg(&paths.reference)]
            }
            // mem emits the alignment stream on stdout; the caller redirects
            // it to the sample's SAM path
            BwaSubcommand::Mem => vec![
                "mem".to_string(),
                path_arg(&paths.reference),
                path_arg(&paths.fwd_trimmed),
                path_arg(&paths.rev_trimmed),
            ],
        };
        Ok(args_vec)
    }
}

pub mod samtools {
    use std::path::Path;
    use crate::config::defs::{PipelineError, SamtoolsSubcommand};
    use super::path_arg;

    pub struct SamtoolsConfig<'a> {
        pub subcommand: SamtoolsSubcommand,
        pub target: &'a Path,
    }

    pub fn arg_generator(config: &SamtoolsConfig) -> Result<Vec<String>, PipelineError> {
        let subcommand = match config.subcommand {
            SamtoolsSubcommand::Sort => "sort",
            SamtoolsSubcommand::Index => "index",
            SamtoolsSubcommand::Faidx => "faidx",
            SamtoolsSubcommand::Flagstat => "flagstat",
        };
        Ok(vec![subcommand.to_string(), path_arg(config.target)])
    }
}

pub mod bcftools {
    use crate::config::defs::{BcftoolsSubcommand, FilterSettings, PipelineError};
    use crate::utils::paths::SamplePaths;
    use super::path_arg;

    pub struct BcftoolsConfig<'a> {
        pub subcommand: BcftoolsSubcommand,
        pub paths: &'a SamplePaths,
        /// Required for Filter, ignored elsewhere
        pub filter: Option<&'a FilterSettings>,
    }

    pub fn arg_generator(config: &BcftoolsConfig) -> Result<Vec<String>, PipelineError> {
        let paths = config.paths;
        let args_vec = match config.subcommand {
            BcftoolsSubcommand::Mpileup => vec![
                "mpileup".to_string(),
                "-Ou".to_string(),
                "-f".to_string(),
                path_arg(&paths.reference),
                path_arg(&paths.bam),
            ],
            BcftoolsSubcommand::Call => vec![
                "call".to_string(),
                "-mv".to_string(),
                "-Ov".to_string(),
                path_arg(&paths.pileup),
            ],
            BcftoolsSubcommand::Filter => {
                let settings = config.filter.ok_or_else(|| {
                    PipelineError::InvalidConfig(
                        "bcftools filter requires filter thresholds".to_string(),
                    )
                })?;
                vec![
                    "filter".to_string(),
                    "-i".to_string(),
                    filter_expression(settings),
                    "-Oz".to_string(),
                    path_arg(&paths.vcf),
                ]
            }
            BcftoolsSubcommand::Stats => {
                vec!["stats".to_string(), path_arg(&paths.filtered_vcf)]
            }
            BcftoolsSubcommand::Consensus => vec![
                "consensus".to_string(),
                "-f".to_string(),
                path_arg(&paths.reference),
                path_arg(&paths.filtered_vcf),
            ],
        };
        Ok(args_vec)
    }

    /// Boolean predicate over per-call annotations: minimum call quality,
    /// minimum depth, minimum alt allele fraction, and an alt depth that is
    /// actually present.
    pub fn filter_expression(settings: &FilterSettings) -> String {
        format!(
            "QUAL>={} && FORMAT/DP>{} && (FORMAT/AD[*:1]/ FORMAT/DP)>{} && FORMAT/AD[*:1] != '*'",
            settings.min_qual, settings.min_depth, settings.min_allele_fraction
        )
    }
}

pub mod gatk {
    use std::path::Path;
    use crate::config::defs::{
        GatkSubcommand, PipelineError, JAVA_HEAP_FLAG, READGROUP_ID, READGROUP_LIBRARY,
        READGROUP_PLATFORM, READGROUP_SAMPLE, READGROUP_UNIT,
    };
    use crate::utils::paths::SamplePaths;
    use super::path_arg;

    pub struct GatkConfig<'a> {
        pub jar: &'a Path,
        pub subcommand: GatkSubcommand,
        pub paths: &'a SamplePaths,
    }

    pub fn arg_generator(config: &GatkConfig) -> Result<Vec<String>, PipelineError> {
        let paths = config.paths;
        let mut args_vec = vec![
            JAVA_HEAP_FLAG.to_string(),
            "-jar".to_string(),
            path_arg(config.jar),
        ];
        match config.subcommand {
            GatkSubcommand::CreateSequenceDictionary => {
                args_vec.push("CreateSequenceDictionary".to_string());
                args_vec.push("-R".to_string());
                args_vec.push(path_arg(&paths.reference));
                args_vec.push("-O".to_string());
                args_vec.push(path_arg(&paths.ref_dict));
            }
            GatkSubcommand::AddOrReplaceReadGroups => {
                args_vec.push("AddOrReplaceReadGroups".to_string());
                args_vec.push("-I".to_string());
                args_vec.push(path_arg(&paths.bam));
                args_vec.push("-O".to_string());
                args_vec.push(path_arg(&paths.readgroup_bam));
                args_vec.push("-RGID".to_string());
                args_vec.push(READGROUP_ID.to_string());
                args_vec.push("-RGLB".to_string());
                args_vec.push(READGROUP_LIBRARY.to_string());
                args_vec.push("-RGPL".to_string());
                args_vec.push(READGROUP_PLATFORM.to_string());
                args_vec.push("-RGPU".to_string());
                args_vec.push(READGROUP_UNIT.to_string());
                args_vec.push("-RGSM".to_string());
                args_vec.push(READGROUP_SAMPLE.to_string());
            }
            GatkSubcommand::HaplotypeCaller => {
                args_vec.push("HaplotypeCaller".to_string());
                args_vec.push("-R".to_string());
                args_vec.push(path_arg(&paths.reference));
                args_vec.push("-I".to_string());
                args_vec.push(path_arg(&paths.readgroup_bam));
                args_vec.push("-O".to_string());
                args_vec.push(path_arg(&paths.vcf));
            }
        }
        Ok(args_vec)
    }
}

pub mod picard {
    use std::path::Path;
    use crate::config::defs::{
        PicardSubcommand, PipelineError, WgsMetricsSettings, JAVA_HEAP_FLAG,
    };
    use crate::utils::paths::SamplePaths;
    use super::path_arg;

    pub struct PicardConfig<'a> {
        pub jar: &'a Path,
        pub subcommand: PicardSubcommand,
        pub paths: &'a SamplePaths,
        /// Required for CollectWgsMetrics, ignored elsewhere
        pub wgs: Option<&'a WgsMetricsSettings>,
    }

    pub fn arg_generator(config: &PicardConfig) -> Result<Vec<String>, PipelineError> {
        let paths = config.paths;
        let mut args_vec = vec![
            JAVA_HEAP_FLAG.to_string(),
            "-jar".to_string(),
            path_arg(config.jar),
        ];
        match config.subcommand {
            PicardSubcommand::CollectWgsMetrics => {
                let wgs = config.wgs.ok_or_else(|| {
                    PipelineError::InvalidConfig(
                        "CollectWgsMetrics requires coverage settings".to_string(),
                    )
                })?;
                args_vec.push("CollectWgsMetrics".to_string());
                args_vec.push(format!("COVERAGE_CAP={}", wgs.coverage_cap));
                args_vec.push(format!(
                    "USE_FAST_ALGORITHM={}",
                    if wgs.fast_algorithm { "true" } else { "false" }
                ));
                args_vec.push(format!("SAMPLE_SIZE={}", wgs.sample_size));
                args_vec.push(format!("I={}", path_arg(&paths.bam)));
                args_vec.push(format!("R={}", path_arg(&paths.reference)));
                args_vec.push(format!("O={}", path_arg(&paths.wgs_metrics)));
            }
            PicardSubcommand::CollectInsertSizeMetrics => {
                args_vec.push("CollectInsertSizeMetrics".to_string());
                args_vec.push(format!("I={}", path_arg(&paths.bam)));
                args_vec.push(format!("H={}", path_arg(&paths.size_histogram)));
                args_vec.push(format!("O={}", path_arg(&paths.size_metrics)));
            }
        }
        Ok(args_vec)
    }
}

pub mod tabix {
    use crate::config::defs::PipelineError;
    use crate::utils::paths::SamplePaths;
    use super::path_arg;

    pub fn arg_generator(paths: &SamplePaths) -> Result<Vec<String>, PipelineError> {
        Ok(vec![path_arg(&paths.filtered_vcf)])
    }
}

/// Spawns `program` with no arguments just to prove it exists and is
/// executable; the exit status is ignored.
async fn presence_check(tool: &str, program: &str) -> Result<(), PipelineError> {
    let mut child = Command::new(program)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| PipelineError::ToolSpawn {
            tool: tool.to_string(),
            error: format!("{}. Is {} installed?", e, tool),
        })?;
    let _ = child.wait().await;
    Ok(())
}

fn jar_check(tool: &str, jar: &Path) -> Result<(), PipelineError> {
    if jar.is_file() {
        Ok(())
    } else {
        Err(PipelineError::InvalidConfig(format!(
            "{} jar not found at {}",
            tool,
            jar.display()
        )))
    }
}

/// Preflight for every tool the configured run will invoke, before any
/// sample starts.
pub async fn check_tools(config: &RunConfig) -> Result<(), PipelineError> {
    let executables = [
        (JAVA_TAG, config.tools.java.as_str()),
        (BWA_TAG, config.tools.bwa.as_str()),
        (SAMTOOLS_TAG, config.tools.samtools.as_str()),
        (BCFTOOLS_TAG, config.tools.bcftools.as_str()),
        (TABIX_TAG, config.tools.tabix.as_str()),
    ];
    try_join_all(
        executables
            .iter()
            .map(|(tag, program)| presence_check(tag, program)),
    )
    .await?;

    jar_check("trimmomatic", &config.tools.trimmomatic_jar)?;
    jar_check("picard", &config.tools.picard_jar)?;
    if config.args.caller == VariantCaller::Gatk {
        jar_check("gatk", &config.tools.gatk_jar)?;
    }
    Ok(())
}
