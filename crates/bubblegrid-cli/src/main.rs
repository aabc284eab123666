//! bubblegrid CLI — scan, grade and analyze bubble sheets.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};

use bubblegrid::{
    analyze_misses, collect_images, process_batch, read_results_csv, render_overlay, score_rows,
    write_graded_csv, write_miss_report_csv, write_question_stats_csv, write_results_csv,
    write_warning_log, AnswerKey, MissConfig, ScanConfig, SheetLayout,
};

#[derive(Parser)]
#[command(name = "bubblegrid")]
#[command(about = "Scan bubble sheets against a layout, then grade them against an answer key")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan one image or a folder of scans into a results CSV.
    Scan(ScanArgs),

    /// Grade a results CSV against an answer key.
    Grade(GradeArgs),

    /// Report per-question miss percentages.
    Misses(MissesArgs),
}

#[derive(Debug, Args)]
struct ScanArgs {
    /// Layout JSON produced by the sheet generator.
    #[arg(long)]
    layout: PathBuf,

    /// Path to a single scanned image (PNG/JPG/TIFF).
    #[arg(long, conflicts_with = "folder", required_unless_present = "folder")]
    image: Option<PathBuf>,

    /// Folder of scans, walked recursively.
    #[arg(long)]
    folder: Option<PathBuf>,

    /// Destination results CSV.
    #[arg(long, default_value = "results.csv")]
    output: PathBuf,

    /// Write a warning log next to the results.
    #[arg(long)]
    log: Option<PathBuf>,

    /// Write a color-coded diagnostic overlay per sheet into this folder.
    #[arg(long)]
    overlay_dir: Option<PathBuf>,

    /// Absolute fill threshold for a marked bubble (0-1).
    #[arg(long, default_value = "0.5")]
    threshold: f32,

    /// Relative threshold: fraction of the best-filled sibling (0-1).
    #[arg(long, default_value = "0.8")]
    rel_threshold: f32,

    /// Minimum fill for the relative rule to apply (smudge rejection).
    #[arg(long, default_value = "0.2")]
    noise_floor: f32,

    /// Fill-ratio gap below which a digit slot is flagged ambiguous.
    #[arg(long, default_value = "0.1")]
    ambiguity_margin: f32,

    /// Mean marker residual (pixels) above which alignment is degraded.
    #[arg(long, default_value = "3.0")]
    residual_tolerance: f64,
}

#[derive(Debug, Args)]
struct GradeArgs {
    /// Results CSV with student_id,question_id,selected_answers columns.
    responses_csv: PathBuf,

    /// Answer key CSV with Question,Correct_Answer,Points columns.
    answer_key_csv: PathBuf,

    /// Directory for graded_report.csv and question_stats.csv.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
}

#[derive(Debug, Args)]
struct MissesArgs {
    /// Results CSV produced by the scan command.
    #[arg(long)]
    results: PathBuf,

    /// Answer key CSV.
    #[arg(long)]
    key: PathBuf,

    /// Destination CSV for the miss report.
    #[arg(long)]
    output: PathBuf,

    /// Percent threshold for flagging high-miss questions.
    #[arg(long, default_value = "50.0")]
    miss_threshold: f64,

    /// Minimum ratio of correct options (0-1] for multi-select questions
    /// to count as correct.
    #[arg(long, default_value = "1.0")]
    partial_threshold: f64,

    /// Optional log file for per-response anomalies.
    #[arg(long)]
    log: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Commands::Scan(args) => run_scan(args),
        Commands::Grade(args) => run_grade(args),
        Commands::Misses(args) => run_misses(args),
    }
}

fn run_scan(args: ScanArgs) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&args.threshold) {
        bail!("--threshold must be between 0 and 1");
    }

    let layout = SheetLayout::from_json_file(&args.layout)
        .with_context(|| format!("loading layout {}", args.layout.display()))?;

    let config = ScanConfig {
        fill_abs_threshold: args.threshold,
        fill_rel_threshold: args.rel_threshold,
        fill_noise_floor: args.noise_floor,
        digit_ambiguity_margin: args.ambiguity_margin,
        residual_tolerance_px: args.residual_tolerance,
        ..ScanConfig::default()
    };

    let input = args
        .image
        .as_ref()
        .or(args.folder.as_ref())
        .context("either --image or --folder is required")?;
    let paths = collect_images(input)?;
    println!("Scanning {} sheet(s)...", paths.len());

    let outcome = process_batch(&paths, &layout, &config);

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    write_results_csv(&args.output, &outcome.responses)?;
    println!("Results stored at: {}", args.output.display());

    let mut log_lines = bubblegrid::report::warning_log_lines(&outcome.responses);
    for skip in &outcome.skipped {
        log_lines.push(format!("{}: skipped ({})", skip.source, skip.reason));
    }
    if let Some(log_path) = &args.log {
        write_warning_log(log_path, &log_lines)?;
        if !log_lines.is_empty() {
            println!("Log file: {}", log_path.display());
        }
    } else if !log_lines.is_empty() {
        eprintln!(
            "Note: {} warning(s) generated. Use --log to capture them.",
            log_lines.len()
        );
    }

    if let Some(overlay_dir) = &args.overlay_dir {
        std::fs::create_dir_all(overlay_dir)?;
        for path in &paths {
            let source = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "sheet".to_string());
            let img = image::open(path)
                .with_context(|| format!("reloading {} for overlay", path.display()))?
                .to_luma8();
            match render_overlay(&img, &layout, &config) {
                Ok(overlay) => {
                    let out = overlay_dir.join(format!("{source}_overlay.png"));
                    overlay.save(&out)?;
                }
                Err(e) => eprintln!("{source}: no overlay ({e})"),
            }
        }
        println!("Overlays stored in: {}", overlay_dir.display());
    }

    for skip in &outcome.skipped {
        eprintln!("Skipped {}: {}", skip.path.display(), skip.reason);
    }
    println!(
        "{} sheet(s) extracted, {} skipped, {} flagged with warnings",
        outcome.responses.len(),
        outcome.skipped.len(),
        outcome.n_flagged()
    );
    Ok(())
}

fn run_grade(args: GradeArgs) -> anyhow::Result<()> {
    // Key-level malformation aborts before any score is computed.
    let key = AnswerKey::from_csv_path(&args.answer_key_csv)
        .with_context(|| format!("loading answer key {}", args.answer_key_csv.display()))?;
    let rows = read_results_csv(&args.responses_csv)
        .with_context(|| format!("loading responses {}", args.responses_csv.display()))?;

    let report = score_rows(&rows, &key);
    for warning in &report.warnings {
        eprintln!("Warning: {warning}");
    }

    std::fs::create_dir_all(&args.output_dir)?;
    let graded_path = args.output_dir.join("graded_report.csv");
    let stats_path = args.output_dir.join("question_stats.csv");
    write_graded_csv(&graded_path, &report)?;
    write_question_stats_csv(&stats_path, &report)?;
    println!(
        "Wrote {} and {}",
        graded_path.display(),
        stats_path.display()
    );
    Ok(())
}

fn run_misses(args: MissesArgs) -> anyhow::Result<()> {
    if !(0.0 < args.partial_threshold && args.partial_threshold <= 1.0) {
        bail!("--partial-threshold must be in (0, 1]");
    }
    if args.miss_threshold < 0.0 {
        bail!("--miss-threshold cannot be negative");
    }

    let key = AnswerKey::from_csv_path(&args.key)
        .with_context(|| format!("loading answer key {}", args.key.display()))?;
    let rows = read_results_csv(&args.results)
        .with_context(|| format!("loading results {}", args.results.display()))?;

    let config = MissConfig {
        miss_threshold: args.miss_threshold,
        partial_threshold: args.partial_threshold,
    };
    let report = analyze_misses(&rows, &key, &config);

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    write_miss_report_csv(&args.output, &report)?;

    if let Some(log_path) = &args.log {
        write_warning_log(log_path, &report.log)?;
    } else if !report.log.is_empty() {
        eprintln!(
            "Note: {} warning(s) generated. Use --log to capture them.",
            report.log.len()
        );
    }

    if !report.high_miss.is_empty() {
        let listed: Vec<String> = report
            .high_miss
            .iter()
            .map(|(q, pct)| format!("{q} ({pct:.2}%)"))
            .collect();
        eprintln!(
            "Warning: {} missed by >= {:.2}% of students.",
            listed.join(", "),
            args.miss_threshold
        );
    }
    println!("Wrote miss report to {}", args.output.display());
    Ok(())
}
