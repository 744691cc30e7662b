//! tnqc - Tn-seq control QC and inoculum filtering CLI

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tnseq_qc::data::{ControlLayout, ControlTable, CountTable, Outcome, RoleInference};
use tnseq_qc::error::Result;
use tnseq_qc::filter::{barcodes_for_gene, filter_all_experiments, filter_inoculum};
use tnseq_qc::pipeline::{AnalysisConfig, Selection, Session};
use tnseq_qc::qc::{
    compute_correlations, summarize_samples_by_day, write_day_summary_csv, CorrelationConfig,
    Transform,
};

/// The output verbosity level.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum Verbosity {
    #[default]
    Info,
    Warn,
    Debug,
    Error,
}

impl std::fmt::Display for Verbosity {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        // lowercase for RUST_LOG
        let lowercase = format!("{:?}", self).to_lowercase();
        write!(f, "{lowercase}")
    }
}

/// CLI-friendly transform enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliTransform {
    /// Correlate concentration and count as-is
    Raw,
    /// log10 of both, zero counts dropped
    Log,
    /// log10 of both, zero counts treated as 1
    LogKeepZero,
}

impl From<CliTransform> for Transform {
    fn from(t: CliTransform) -> Self {
        match t {
            CliTransform::Raw => Transform::Raw,
            CliTransform::Log => Transform::Log,
            CliTransform::LogKeepZero => Transform::LogKeepZero,
        }
    }
}

/// Column layout of the control reference file
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliLayout {
    /// barcode, phenotype, concentration
    Plain,
    /// An unused leading column, then barcode, phenotype, concentration
    LeadingDiscard,
}

impl From<CliLayout> for ControlLayout {
    fn from(layout: CliLayout) -> Self {
        match layout {
            CliLayout::Plain => ControlLayout::default(),
            CliLayout::LeadingDiscard => ControlLayout::with_leading_discard(),
        }
    }
}

/// Tn-seq control barcode QC and inoculum filtering
#[derive(Parser)]
#[command(name = "tnqc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log verbosity
    #[arg(short, long, global = true, default_value_t = Verbosity::default())]
    verbosity: Verbosity,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CountArgs {
    /// Count table CSV file(s)
    #[arg(short = 'c', long, required = true, num_args = 1..)]
    counts: Vec<PathBuf>,

    /// Regex marking inoculum samples by id when a file has no role column
    #[arg(long)]
    inoculum_pattern: Option<String>,
}

impl CountArgs {
    fn load(&self) -> Result<CountTable> {
        let roles = match &self.inoculum_pattern {
            Some(p) => RoleInference::pattern(p)?,
            None => RoleInference::default(),
        };
        eprintln!("Loading {} count file(s)...", self.counts.len());
        let table = CountTable::from_csv_files(&self.counts, &roles)?;
        eprintln!(
            "Loaded {} rows: {} barcodes x {} samples",
            table.len(),
            table.barcodes().len(),
            table.sample_ids().len()
        );
        Ok(table)
    }
}

#[derive(Args)]
struct QcArgs {
    /// Control reference file
    #[arg(long)]
    controls: PathBuf,

    /// Control reference column layout
    #[arg(long, value_enum, default_value = "plain")]
    layout: CliLayout,

    /// Transform applied before correlating
    #[arg(short, long, value_enum, default_value = "log")]
    transform: CliTransform,

    /// Wild-type correlation a sample must exceed to pass
    #[arg(long, default_value = "0.9")]
    cutoff: f64,

    /// Column the correlations are grouped by
    #[arg(long, default_value = "sampleID")]
    group_by: String,

    /// Restrict to one dataset
    #[arg(long)]
    dnaid: Option<String>,

    /// Restrict to one experiment within --dnaid
    #[arg(long, requires = "dnaid")]
    experiment: Option<String>,
}

impl QcArgs {
    fn controls(&self) -> Result<ControlTable> {
        let controls = ControlTable::from_tsv_with_layout(&self.controls, &self.layout.into())?;
        eprintln!("Loaded {} control barcodes", controls.len());
        Ok(controls)
    }

    fn config(&self) -> CorrelationConfig {
        CorrelationConfig {
            grouping_column: self.group_by.clone(),
            transform: self.transform.into(),
            cutoff: self.cutoff,
        }
    }

    fn selection(&self) -> Selection {
        Selection {
            dnaid: self.dnaid.clone(),
            experiment: self.experiment.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Correlate control barcode counts with their expected concentration
    Correlate {
        #[command(flatten)]
        input: CountArgs,

        #[command(flatten)]
        qc: QcArgs,

        /// Output path for the correlation CSV
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Passing and failing mice per day
    Summary {
        #[command(flatten)]
        input: CountArgs,

        #[command(flatten)]
        qc: QcArgs,

        /// Output path for the summary CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Filter one experiment on inoculum counts
    Filter {
        #[command(flatten)]
        input: CountArgs,

        /// Dataset identifier
        #[arg(long)]
        dnaid: String,

        /// Experiment identifier
        #[arg(short, long)]
        experiment: String,

        /// Minimum count in every inoculum sample
        #[arg(long, default_value = "1000")]
        threshold: u64,

        /// Output path for the filtered CSV
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Filter every experiment on inoculum counts and re-attach annotations
    FilterAll {
        #[command(flatten)]
        input: CountArgs,

        /// Minimum count in every inoculum sample
        #[arg(long, default_value = "1000")]
        threshold: u64,

        /// Output path for the filtered CSV
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show retained barcodes of one gene after filtering
    Gene {
        #[command(flatten)]
        input: CountArgs,

        /// ShortName or locus tag
        #[arg(short, long)]
        gene: String,

        /// Minimum count in every inoculum sample
        #[arg(long, default_value = "1000")]
        threshold: u64,
    },

    /// Run QC, day summary and filtering from a YAML configuration file
    Run {
        /// Path to analysis configuration YAML
        #[arg(long)]
        config: PathBuf,

        /// Directory the result tables are written to
        #[arg(short, long)]
        output_dir: PathBuf,
    },

    /// Write an example configuration file
    Example {
        /// Output path for the example config
        #[arg(short, long, default_value = "tnqc.yaml")]
        output: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    std::env::set_var("RUST_LOG", cli.verbosity.to_string());
    env_logger::init();

    let result = match cli.command {
        Commands::Correlate {
            input,
            qc,
            output,
            json,
        } => cmd_correlate(&input, &qc, output.as_deref(), json),
        Commands::Summary { input, qc, output } => cmd_summary(&input, &qc, output.as_deref()),
        Commands::Filter {
            input,
            dnaid,
            experiment,
            threshold,
            output,
        } => cmd_filter(&input, &dnaid, &experiment, threshold, &output),
        Commands::FilterAll {
            input,
            threshold,
            output,
        } => cmd_filter_all(&input, threshold, &output),
        Commands::Gene {
            input,
            gene,
            threshold,
        } => cmd_gene(&input, &gene, threshold),
        Commands::Run { config, output_dir } => cmd_run(&config, &output_dir),
        Commands::Example { output } => cmd_example(&output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Compute control correlations
fn cmd_correlate(input: &CountArgs, qc: &QcArgs, output: Option<&Path>, json: bool) -> Result<()> {
    let counts = qc.selection().apply(&input.load()?)?;
    let controls = qc.controls()?;

    let report = compute_correlations(&counts, &controls, &qc.config())?;
    if !report.has_controls() {
        eprintln!("No control barcodes found in the selected samples");
        return Ok(());
    }

    if let Some(path) = output {
        report.write_csv(path)?;
        eprintln!("Wrote {} correlations to {:?}", report.records.len(), path);
    }
    if json {
        print_json(&report)?;
    } else {
        print!("{}", report);
        let failed = report.failed();
        if !failed.is_empty() {
            println!("  Failing: {}", failed.into_iter().collect::<Vec<_>>().join(", "));
        }
    }
    Ok(())
}

/// Summarise passing and failing mice per day
fn cmd_summary(input: &CountArgs, qc: &QcArgs, output: Option<&Path>) -> Result<()> {
    let counts = qc.selection().apply(&input.load()?)?;
    let controls = qc.controls()?;

    let report = compute_correlations(&counts, &controls, &qc.config())?;
    if !report.has_controls() {
        eprintln!("No control barcodes found in the selected samples");
        return Ok(());
    }
    let summary = summarize_samples_by_day(&counts, &report.good);

    if let Some(path) = output {
        write_day_summary_csv(&summary, path)?;
        eprintln!("Wrote summary for {} day(s) to {:?}", summary.len(), path);
    }
    println!("{:<8} {:>8}  {:<30} Failed", "Day", "Passing", "Passing mice");
    for day in &summary {
        println!(
            "{:<8} {:>8}  {:<30} {}",
            day.day,
            day.n_passing(),
            day.passing.join(", "),
            day.failed.join(", ")
        );
    }
    Ok(())
}

/// Filter one experiment
fn cmd_filter(
    input: &CountArgs,
    dnaid: &str,
    experiment: &str,
    threshold: u64,
    output: &Path,
) -> Result<()> {
    let counts = input.load()?.subset_experiment(dnaid, experiment)?;

    match filter_inoculum(&counts, threshold)? {
        Outcome::Data(filtered) => {
            eprintln!("{}", filtered.stats);
            filtered.write_csv(output)?;
            eprintln!("Wrote {} rows to {:?}", filtered.len(), output);
        }
        Outcome::NoData(reason) => eprintln!("No data: {}", reason),
    }
    Ok(())
}

/// Filter every experiment
fn cmd_filter_all(input: &CountArgs, threshold: u64, output: &Path) -> Result<()> {
    let counts = input.load()?;

    match filter_all_experiments(&counts, threshold)? {
        Outcome::Data(filtered) => {
            for exp in &filtered.experiments {
                match (&exp.stats, &exp.no_data) {
                    (Some(stats), _) => eprintln!(
                        "{} / {}: kept {}/{} barcodes",
                        exp.dnaid, exp.experiment, stats.n_after, stats.n_before
                    ),
                    (None, Some(reason)) => {
                        eprintln!("{} / {}: no data ({})", exp.dnaid, exp.experiment, reason)
                    }
                    (None, None) => {}
                }
            }
            filtered.write_csv(output)?;
            eprintln!("Wrote {} rows to {:?}", filtered.len(), output);
        }
        Outcome::NoData(reason) => eprintln!("No data: {}", reason),
    }
    Ok(())
}

/// Look up one gene in the filtered table
fn cmd_gene(input: &CountArgs, gene: &str, threshold: u64) -> Result<()> {
    let counts = input.load()?;

    let filtered = match filter_all_experiments(&counts, threshold)? {
        Outcome::Data(f) => f,
        Outcome::NoData(reason) => {
            eprintln!("No data: {}", reason);
            return Ok(());
        }
    };
    match barcodes_for_gene(&filtered, gene) {
        Outcome::Data(rows) => {
            println!("{:<16} {:<24} {:>10}  {}/{}", "barcode", "sampleID", "cnt", "dnaid", "experiment");
            for r in rows {
                println!(
                    "{:<16} {:<24} {:>10}  {}/{}",
                    r.barcode, r.sample_id, r.count, r.dnaid, r.experiment
                );
            }
        }
        Outcome::NoData(reason) => eprintln!("{}", reason),
    }
    Ok(())
}

/// Run the whole analysis from a configuration file
fn cmd_run(config_path: &Path, output_dir: &Path) -> Result<()> {
    eprintln!("Loading configuration from {:?}...", config_path);
    let config = AnalysisConfig::from_file(config_path)?;

    let mut session = Session::from_config(&config)?;
    std::fs::create_dir_all(output_dir)?;

    let selection = Selection {
        dnaid: config.dnaid.clone(),
        experiment: config.experiment.clone(),
    };

    eprintln!("Running analysis '{}'...", config.name);
    match session.correlations(&selection, &config.correlation)? {
        Outcome::Data(report) => {
            let path = output_dir.join("correlations.csv");
            report.write_csv(&path)?;
            eprintln!(
                "  {} sample(s) passing at R > {:.2}; wrote {:?}",
                report.good.len(),
                report.cutoff,
                path
            );
        }
        Outcome::NoData(reason) => eprintln!("  Correlation: {}", reason),
    }

    if let Outcome::Data(summary) = session.day_summary(&selection, &config.correlation)? {
        let path = output_dir.join("day_summary.csv");
        write_day_summary_csv(&summary, &path)?;
        eprintln!("  Wrote day summary to {:?}", path);
    }

    match session.filter_all(config.threshold)? {
        Outcome::Data(filtered) => {
            let path = output_dir.join("filtered.csv");
            filtered.write_csv(&path)?;
            eprintln!("  Wrote {} filtered rows to {:?}", filtered.len(), path);
        }
        Outcome::NoData(reason) => eprintln!("  Filter: {}", reason),
    }

    eprintln!("Done!");
    Ok(())
}

/// Write an example configuration
fn cmd_example(output_path: &Path) -> Result<()> {
    let config = AnalysisConfig {
        name: "example-tnseq".to_string(),
        controls: PathBuf::from("references/controls.txt"),
        counts: vec![PathBuf::from("counts")],
        ..AnalysisConfig::default()
    };
    let yaml = format!(
        "# tnqc analysis configuration\n# transform: raw | log | log-keep-zero\n{}",
        config.to_yaml()?
    );

    std::fs::write(output_path, &yaml)?;
    eprintln!("Wrote example configuration to {:?}", output_path);
    eprintln!();
    eprintln!("Contents:");
    println!("{}", yaml);

    Ok(())
}
