use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::anyhow;
use log::{error, info, warn};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use crate::cli::VariantCaller;
use crate::config::defs::{
    BcftoolsSubcommand, BwaSubcommand, GatkSubcommand, PicardSubcommand, PipelineError,
    RunConfig, SamtoolsSubcommand, BCFTOOLS_TAG, BWA_TAG, FINAL_STATS_FILENAME, GATK_TAG,
    PICARD_TAG, SAMTOOLS_TAG, TABIX_TAG, TRIMMOMATIC_TAG,
};
use crate::utils::command::{bcftools, bwa, check_tools, gatk, picard, samtools, tabix, trimmomatic};
use crate::utils::exec::run_tool;
use crate::utils::paths::SamplePaths;
use crate::utils::reports::{
    extract_metrics_class, extract_vcf_stats, merge_stats, write_final_table, StatMap,
};
use crate::utils::samplesheet::{read_samplesheet, validate_inputs, SampleRecord};

/// Build-once guards for artifacts derived from a shared reference (bwa
/// index, faidx, sequence dictionary), keyed by reference path. The first
/// sample to arrive builds; the rest wait, then skip.
struct ReferenceLocks {
    inner: Mutex<HashMap<PathBuf, Arc<Mutex<bool>>>>,
}

impl ReferenceLocks {
    fn new() -> Self {
        ReferenceLocks {
            inner: Mutex::new(HashMap::new()),
        }
    }

    async fn guard_for(&self, reference: &Path) -> Arc<Mutex<bool>> {
        let mut map = self.inner.lock().await;
        map.entry(reference.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(false)))
            .clone()
    }
}

/// Indexes the reference for alignment and lookup, and builds the sequence
/// dictionary when the GATK caller will need it. Serialized per reference
/// path since these tools mutate files next to the shared input.
async fn prepare_reference(
    config: &RunConfig,
    paths: &SamplePaths,
    locks: &ReferenceLocks,
) -> Result<(), PipelineError> {
    let guard = locks.guard_for(&paths.reference).await;
    let mut built = guard.lock().await;
    if *built {
        return Ok(());
    }

    info!("Indexing reference {}...", paths.reference.display());

    let index_args = bwa::arg_generator(&bwa::BwaConfig {
        subcommand: BwaSubcommand::Index,
        paths,
    })?;
    run_tool(BWA_TAG, &config.tools.bwa, &index_args, None).await?;

    let faidx_args = samtools::arg_generator(&samtools::SamtoolsConfig {
        subcommand: SamtoolsSubcommand::Faidx,
        target: &paths.reference,
    })?;
    run_tool(SAMTOOLS_TAG, &config.tools.samtools, &faidx_args, None).await?;

    if config.args.caller == VariantCaller::Gatk {
        let dict_args = gatk::arg_generator(&gatk::GatkConfig {
            jar: &config.tools.gatk_jar,
            subcommand: GatkSubcommand::CreateSequenceDictionary,
            paths,
        })?;
        run_tool(GATK_TAG, &config.tools.java, &dict_args, None).await?;
    }

    info!("...done indexing reference {}.", paths.reference.display());
    *built = true;
    Ok(())
}

/// Trims adapters and cleans sequence ends with Trimmomatic.
async fn trim_stage(
    config: &RunConfig,
    sample: &str,
    paths: &SamplePaths,
) -> Result<(), PipelineError> {
    info!("Starting trimmomatic for {}...", sample);

    let args = trimmomatic::arg_generator(&trimmomatic::TrimmomaticConfig {
        jar: &config.tools.trimmomatic_jar,
        paths,
        settings: &config.trim,
    })?;
    run_tool(TRIMMOMATIC_TAG, &config.tools.java, &args, None).await?;

    info!("...end trimmomatic for {}.", sample);
    Ok(())
}

/// Aligns the trimmed pair against the (already indexed) reference with
/// bwa mem, redirecting the alignment stream to the sample's SAM path.
async fn align_stage(
    config: &RunConfig,
    sample: &str,
    paths: &SamplePaths,
) -> Result<(), PipelineError> {
    info!("Starting BWA mem for {}...", sample);

    let mem_args = bwa::arg_generator(&bwa::BwaConfig {
        subcommand: BwaSubcommand::Mem,
        paths,
    })?;
    run_tool(BWA_TAG, &config.tools.bwa, &mem_args, Some(&paths.sam)).await?;

    info!("...end BWA mem for {}.", sample);
    Ok(())
}

/// Produces the raw VCF for the sample. The GATK path repairs read groups
/// first (the caller refuses BAMs without them); the bcftools path goes
/// straight from the sorted BAM through a pileup.
async fn call_variants(
    config: &RunConfig,
    sample: &str,
    paths: &SamplePaths,
) -> Result<(), PipelineError> {
    info!("Creating VCF file for {}...", sample);

    match config.args.caller {
        VariantCaller::Gatk => {
            let readgroup_args = gatk::arg_generator(&gatk::GatkConfig {
                jar: &config.tools.gatk_jar,
                subcommand: GatkSubcommand::AddOrReplaceReadGroups,
                paths,
            })?;
            run_tool(GATK_TAG, &config.tools.java, &readgroup_args, None).await?;

            let index_args = samtools::arg_generator(&samtools::SamtoolsConfig {
                subcommand: SamtoolsSubcommand::Index,
                target: &paths.readgroup_bam,
            })?;
            run_tool(SAMTOOLS_TAG, &config.tools.samtools, &index_args, None).await?;

            let caller_args = gatk::arg_generator(&gatk::GatkConfig {
                jar: &config.tools.gatk_jar,
                subcommand: GatkSubcommand::HaplotypeCaller,
                paths,
            })?;
            run_tool(GATK_TAG, &config.tools.java, &caller_args, None).await?;
        }
        VariantCaller::Bcftools => {
            let mpileup_args = bcftools::arg_generator(&bcftools::BcftoolsConfig {
                subcommand: BcftoolsSubcommand::Mpileup,
                paths,
                filter: None,
            })?;
            run_tool(
                BCFTOOLS_TAG,
                &config.tools.bcftools,
                &mpileup_args,
                Some(&paths.pileup),
            )
            .await?;

            let call_args = bcftools::arg_generator(&bcftools::BcftoolsConfig {
                subcommand: BcftoolsSubcommand::Call,
                paths,
                filter: None,
            })?;
            run_tool(
                BCFTOOLS_TAG,
                &config.tools.bcftools,
                &call_args,
                Some(&paths.vcf),
            )
            .await?;
        }
    }

    info!("...end creating VCF file for {}.", sample);
    Ok(())
}

/// Sorts and indexes the alignment, runs the configured variant caller,
/// filters the calls by quality/depth/allele fraction, compresses and
/// indexes the filtered set, and derives the consensus sequence.
async fn variant_call_stage(
    config: &RunConfig,
    sample: &str,
    paths: &SamplePaths,
) -> Result<(), PipelineError> {
    info!("Starting conversion of sam to bam for {}...", sample);

    let sort_args = samtools::arg_generator(&samtools::SamtoolsConfig {
        subcommand: SamtoolsSubcommand::Sort,
        target: &paths.sam,
    })?;
    run_tool(
        SAMTOOLS_TAG,
        &config.tools.samtools,
        &sort_args,
        Some(&paths.bam),
    )
    .await?;

    let index_args = samtools::arg_generator(&samtools::SamtoolsConfig {
        subcommand: SamtoolsSubcommand::Index,
        target: &paths.bam,
    })?;
    run_tool(SAMTOOLS_TAG, &config.tools.samtools, &index_args, None).await?;

    info!("...end conversion of sam to bam for {}.", sample);

    call_variants(config, sample, paths).await?;

    info!("Starting VCF filter for {}...", sample);

    let filter_args = bcftools::arg_generator(&bcftools::BcftoolsConfig {
        subcommand: BcftoolsSubcommand::Filter,
        paths,
        filter: Some(&config.filter),
    })?;
    run_tool(
        BCFTOOLS_TAG,
        &config.tools.bcftools,
        &filter_args,
        Some(&paths.filtered_vcf),
    )
    .await?;

    let tabix_args = tabix::arg_generator(paths)?;
    run_tool(TABIX_TAG, &config.tools.tabix, &tabix_args, None).await?;

    info!("...end VCF filter for {}.", sample);

    info!("Starting consensus generation for {}...", sample);

    let consensus_args = bcftools::arg_generator(&bcftools::BcftoolsConfig {
        subcommand: BcftoolsSubcommand::Consensus,
        paths,
        filter: None,
    })?;
    run_tool(
        BCFTOOLS_TAG,
        &config.tools.bcftools,
        &consensus_args,
        Some(&paths.consensus),
    )
    .await?;

    info!("...end consensus generation for {}.", sample);
    Ok(())
}

/// The BAM whose flags get summarized: the read-group-repaired one when the
/// GATK path produced it, the sorted alignment otherwise.
fn flagstat_bam<'a>(config: &RunConfig, paths: &'a SamplePaths) -> &'a Path {
    match config.args.caller {
        VariantCaller::Gatk => &paths.readgroup_bam,
        VariantCaller::Bcftools => &paths.bam,
    }
}

/// Collects the per-sample report files: variant-call summary, whole-genome
/// coverage metrics, insert-size metrics, and alignment-flag statistics.
async fn metrics_stage(
    config: &RunConfig,
    sample: &str,
    paths: &SamplePaths,
) -> Result<(), PipelineError> {
    info!("Starting VCF stats for {}...", sample);

    let stats_args = bcftools::arg_generator(&bcftools::BcftoolsConfig {
        subcommand: BcftoolsSubcommand::Stats,
        paths,
        filter: None,
    })?;
    run_tool(
        BCFTOOLS_TAG,
        &config.tools.bcftools,
        &stats_args,
        Some(&paths.vcf_stats),
    )
    .await?;

    info!("...end VCF stats for {}.", sample);

    info!("Starting picard WGS stats for {}...", sample);

    let wgs_args = picard::arg_generator(&picard::PicardConfig {
        jar: &config.tools.picard_jar,
        subcommand: PicardSubcommand::CollectWgsMetrics,
        paths,
        wgs: Some(&config.wgs),
    })?;
    run_tool(PICARD_TAG, &config.tools.java, &wgs_args, None).await?;

    info!("...end picard WGS stats for {}.", sample);

    info!("Starting picard size stats for {}...", sample);

    let size_args = picard::arg_generator(&picard::PicardConfig {
        jar: &config.tools.picard_jar,
        subcommand: PicardSubcommand::CollectInsertSizeMetrics,
        paths,
        wgs: None,
    })?;
    run_tool(PICARD_TAG, &config.tools.java, &size_args, None).await?;

    info!("...end picard size stats for {}.", sample);

    info!("Starting samtools flagstat for {}...", sample);

    let flagstat_args = samtools::arg_generator(&samtools::SamtoolsConfig {
        subcommand: SamtoolsSubcommand::Flagstat,
        target: flagstat_bam(config, paths),
    })?;
    run_tool(
        SAMTOOLS_TAG,
        &config.tools.samtools,
        &flagstat_args,
        Some(&paths.flagstat),
    )
    .await?;

    info!("...end samtools flagstat for {}.", sample);
    Ok(())
}

/// Scrapes the stage-produced reports into one StatMap. Merge order is
/// variant stats, then coverage metrics, then insert-size metrics; later
/// sources win on (unexpected) name collisions.
fn extract_sample_stats(paths: &SamplePaths) -> Result<StatMap, PipelineError> {
    let vcf_stats = extract_vcf_stats(&paths.vcf_stats)?;
    let wgs_stats = extract_metrics_class(&paths.wgs_metrics)?;
    let size_stats = extract_metrics_class(&paths.size_metrics)?;
    Ok(merge_stats([vcf_stats, wgs_stats, size_stats]))
}

/// Drives one sample through the fixed stage sequence. Any stage failure
/// aborts the remaining stages for this sample.
async fn run_sample(
    config: &RunConfig,
    sample: &str,
    paths: &SamplePaths,
    locks: &ReferenceLocks,
) -> Result<StatMap, PipelineError> {
    trim_stage(config, sample, paths).await?;
    prepare_reference(config, paths, locks).await?;
    align_stage(config, sample, paths).await?;
    variant_call_stage(config, sample, paths).await?;
    metrics_stage(config, sample, paths).await?;
    extract_sample_stats(paths)
}

/// Run function for the resequencing pipeline
///
/// Reads the sample sheet, plans every sample's path set up front (input
/// validation and output-directory collisions are fatal here, before any
/// tool runs), then processes samples under a bounded worker pool and folds
/// the surviving stat maps into the final table.
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
///
/// # Returns
/// Result<(), PipelineError>
pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    check_tools(&config).await?;

    let records = read_samplesheet(&config.samplesheet)?;
    validate_inputs(&records, &config.base_dir)?;
    info!("Sample sheet lists {} sample(s)", records.len());

    let mut planned: Vec<(SampleRecord, SamplePaths)> = Vec::with_capacity(records.len());
    for record in records {
        let paths = SamplePaths::plan(&record, &config.base_dir)?;
        planned.push((record, paths));
    }

    let permits = config.args.parallel_samples.max(1);
    let semaphore = Arc::new(Semaphore::new(permits));
    let locks = Arc::new(ReferenceLocks::new());

    let mut tasks: Vec<JoinHandle<(String, Result<StatMap, PipelineError>)>> =
        Vec::with_capacity(planned.len());
    for (record, paths) in planned {
        let config = config.clone();
        let semaphore = semaphore.clone();
        let locks = locks.clone();
        tasks.push(tokio::spawn(async move {
            let sample = record.sample.clone();
            let permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    return (
                        sample,
                        Err(PipelineError::Other(anyhow!("worker pool closed: {}", e))),
                    );
                }
            };
            let result = run_sample(&config, &record.sample, &paths, &locks).await;
            drop(permit);
            (sample, result)
        }));
    }

    let mut stats_rows: Vec<(String, StatMap)> = Vec::new();
    let mut failed_samples: Vec<String> = Vec::new();
    let mut pending = tasks.into_iter();
    while let Some(task) = pending.next() {
        let (sample, result) = task
            .await
            .map_err(|e| PipelineError::Other(anyhow!("sample task panicked: {}", e)))?;
        match result {
            Ok(stats) => stats_rows.push((sample, stats)),
            Err(e) => {
                error!("Sample {} failed: {}", sample, e);
                if !config.args.keep_going {
                    for remaining in pending {
                        remaining.abort();
                    }
                    return Err(e);
                }
                warn!("Excluding {} from the final table (--keep-going)", sample);
                failed_samples.push(sample);
            }
        }
    }

    info!("Starting writing final stats...");

    let final_path = config.out_dir.join(FINAL_STATS_FILENAME);
    fs::create_dir_all(&config.out_dir)
        .map_err(|e| PipelineError::IOError(format!("cannot create {}: {}", config.out_dir.display(), e)))?;
    write_final_table(&final_path, &stats_rows)?;

    info!(
        "...end writing stats: {} sample(s) in {}",
        stats_rows.len(),
        final_path.display()
    );

    if !failed_samples.is_empty() {
        warn!("Failed samples: {}", failed_samples.join(", "));
        return Err(PipelineError::SamplesFailed(failed_samples.len()));
    }
    Ok(())
}
