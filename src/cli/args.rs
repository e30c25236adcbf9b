use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, ValueEnum, Default, PartialEq)]
pub enum VariantCaller {
    /// GATK HaplotypeCaller after read-group repair (reference behavior)
    #[default]
    Gatk,
    /// bcftools mpileup + call, no read-group repair needed
    Bcftools,
}

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "fastseq-pipelines", version)]
pub struct Arguments {
    /// Base of where processing takes place. All paths in the sample sheet
    /// are relative to this path and results land in its "Output" directory.
    pub base_dir: String,

    /// CSV sample sheet detailing samples and where their files can be found,
    /// all paths relative to the base dir.
    pub samplesheet: String,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(long = "caller", default_value = "gatk", value_enum)]
    pub caller: VariantCaller,

    #[arg(long, default_value_t = 1, help = "Samples processed concurrently; 1 reproduces strictly sequential behavior")]
    pub parallel_samples: usize,

    #[arg(long, default_value_t = false, help = "Skip failed samples and keep processing the rest instead of aborting the run")]
    pub keep_going: bool,

    // Tool locations; defaults match the corresponding docker image.
    #[arg(long, default_value = "java")]
    pub java: String,

    #[arg(long, default_value = "/tools/trimmomatic/trimmomatic-0.38.jar")]
    pub trimmomatic_jar: String,

    #[arg(long, default_value = "/tools/bwa/bwa")]
    pub bwa: String,

    #[arg(long, default_value = "/tools/samtools/bin/samtools")]
    pub samtools: String,

    #[arg(long, default_value = "/tools/samtools/bin/bcftools")]
    pub bcftools: String,

    #[arg(long, default_value = "/gatk/gatk.jar")]
    pub gatk_jar: String,

    #[arg(long, default_value = "/tools/picard/picard.jar")]
    pub picard_jar: String,

    #[arg(long, default_value = "/usr/bin/tabix")]
    pub tabix: String,

    // Trimmomatic thresholds
    #[arg(long, default_value_t = 3)]
    pub leading: u32,

    #[arg(long, default_value_t = 3)]
    pub trailing: u32,

    #[arg(long, default_value_t = 50)]
    pub min_len: u32,

    #[arg(long, default_value_t = 4)]
    pub window_size: u32,

    #[arg(long, default_value_t = 20)]
    pub window_quality: u32,

    // Variant filter thresholds
    #[arg(long, default_value_t = 20)]
    pub min_qual: u32,

    #[arg(long, default_value_t = 10)]
    pub min_depth: u32,

    #[arg(long, default_value_t = 0.7)]
    pub min_allele_fraction: f64,

    // Picard CollectWgsMetrics options
    #[arg(long, default_value_t = 100000)]
    pub coverage_cap: u64,

    #[arg(long, default_value_t = true)]
    pub fast_algorithm: bool,

    #[arg(long, default_value_t = 5000)]
    pub metrics_sample_size: u64,
}
