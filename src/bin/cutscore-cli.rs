use std::{
    fs::{self, File},
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use cutscore::{
    AnalysisOptions, CsvSink, CutScorePlugin, ProgressCallback, ProgressInfo,
    RecordSink, ScoreRecord, VideoAnalyzer,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  cutscore score input.mp4 --out scores.csv --progress\n  cutscore score input.mp4 --limit 30 --json\n  cutscore extract-frames input.mp4 --out frames --every 25\n  ffmpeg -i input.mp4 -f image2pipe -vcodec ppm - | cutscore decode -\n  cutscore completions zsh > _cutscore";

#[derive(Debug, Parser)]
#[command(
    name = "cutscore",
    version,
    about = "Score inter-frame differences of a video for scene-cut analysis",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone)]
struct GlobalOptions {
    /// Path to the ffmpeg executable.
    #[arg(long, global = true, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// Show additional logging output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress spinner where supported.
    #[arg(long, global = true)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long, global = true)]
    overwrite: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Score every frame of a video against its predecessor.
    #[command(
        about = "Score inter-frame differences",
        after_help = "Examples:\n  cutscore score input.mp4 --out scores.csv\n  cutscore score input.mp4 --limit 10 --json"
    )]
    Score {
        /// Input video path.
        input: PathBuf,
        /// Output CSV path. Writes to stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Only analyse the first N seconds (0 = whole video).
        #[arg(long, default_value_t = 0)]
        limit: u32,
        /// Print records as JSON instead of CSV.
        #[arg(long, conflicts_with = "out")]
        json: bool,
    },

    /// Score a PPM stream that was already captured from ffmpeg.
    #[command(
        about = "Score a captured PPM stream",
        after_help = "Examples:\n  cutscore decode frames.ppm --out scores.csv\n  ffmpeg -i input.mp4 -f image2pipe -vcodec ppm - | cutscore decode -"
    )]
    Decode {
        /// Stream file, or `-` for standard input.
        stream: String,
        /// Output CSV path. Writes to stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Print records as JSON instead of CSV.
        #[arg(long, conflicts_with = "out")]
        json: bool,
    },

    /// Save decoded frames as images.
    #[command(
        about = "Extract video frames",
        after_help = "Examples:\n  cutscore extract-frames input.mp4 --out frames --every 10 --ext jpg"
    )]
    ExtractFrames {
        /// Input video path.
        input: PathBuf,
        /// Output directory for extracted frame images.
        #[arg(long)]
        out: PathBuf,
        /// Save every Nth frame.
        #[arg(long, default_value_t = 1)]
        every: u32,
        /// Only decode the first N seconds (0 = whole video).
        #[arg(long, default_value_t = 0)]
        limit: u32,
        /// Output image extension (png, jpg, jpeg, bmp, tiff).
        #[arg(long, default_value = "png")]
        ext: String,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::with_template(
            "{spinner:.green} {pos} frame(s) {msg}",
        )?);
        Ok(Self { bar })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        self.bar.set_position(info.current);
        self.bar
            .set_message(format!("{:.1} fps", info.frames_per_second));
        if info.finished {
            self.bar.finish_with_message("done");
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn analysis_options(global: &GlobalOptions) -> Result<AnalysisOptions, Box<dyn std::error::Error>> {
    let mut options = AnalysisOptions::new();
    if global.progress {
        options = options
            .with_progress(Arc::new(TerminalProgress::new()?))
            .with_batch_size(10);
    }
    Ok(options)
}

fn parse_image_extension(value: &str) -> Option<&'static str> {
    match value.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "png" => Some("png"),
        "jpg" | "jpeg" => Some("jpg"),
        "bmp" => Some("bmp"),
        "tif" | "tiff" => Some("tiff"),
        _ => None,
    }
}

/// Where the records of a scoring run go.
enum Output {
    Csv(CsvSink<Box<dyn Write>>),
    Json(Vec<ScoreRecord>),
}

impl Output {
    fn open(out: Option<&Path>, json: bool, overwrite: bool) -> Result<Self, Box<dyn std::error::Error>> {
        if json {
            return Ok(Output::Json(Vec::new()));
        }
        let writer: Box<dyn Write> = match out {
            Some(path) => {
                ensure_writable_path(path, overwrite)?;
                Box::new(BufWriter::new(File::create(path)?))
            }
            None => Box::new(io::stdout().lock()),
        };
        Ok(Output::Csv(CsvSink::new(writer)))
    }

    fn print_json(self) -> Result<(), Box<dyn std::error::Error>> {
        if let Output::Json(records) = self {
            let payload: Vec<_> = records
                .iter()
                .map(|record| {
                    json!({
                        "frame": record.frame_index,
                        "score": (!record.is_incomparable()).then_some(record.score),
                        "processing_time_ms": record.processing_time_ms,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Ok(())
    }
}

impl RecordSink for Output {
    fn begin(&mut self) -> Result<(), cutscore::CutScoreError> {
        match self {
            Output::Csv(sink) => sink.begin(),
            Output::Json(records) => records.begin(),
        }
    }

    fn record(&mut self, record: &ScoreRecord) -> Result<(), cutscore::CutScoreError> {
        match self {
            Output::Csv(sink) => sink.record(record),
            Output::Json(records) => records.record(record),
        }
    }

    fn finish(&mut self) -> Result<(), cutscore::CutScoreError> {
        match self {
            Output::Csv(sink) => sink.finish(),
            Output::Json(records) => records.finish(),
        }
    }
}

fn report_scored(frames: u32, out: Option<&Path>) {
    if let Some(path) = out {
        eprintln!(
            "{} {}",
            "success:".green().bold(),
            format!("Scored {frames} frame(s) to {}", path.display()).green()
        );
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    match cli.command {
        Commands::Score {
            input,
            out,
            limit,
            json,
        } => {
            let analyzer = VideoAnalyzer::new(&cli.global.ffmpeg)
                .with_time_limit(limit)
                .with_options(analysis_options(&cli.global)?);

            let mut plugin =
                CutScorePlugin::new(Output::open(out.as_deref(), json, cli.global.overwrite)?);
            let summary = analyzer.analyze(&input, &mut plugin)?;

            if !summary.transcoder_exit.success() {
                eprintln!(
                    "{} {}",
                    "warning:".yellow().bold(),
                    format!("ffmpeg exited with {}", summary.transcoder_exit.status).yellow()
                );
            }
            plugin.into_sink().print_json()?;
            report_scored(summary.frames, out.as_deref());
        }
        Commands::Decode { stream, out, json } => {
            let source: Box<dyn Read> = if stream == "-" {
                Box::new(io::stdin().lock())
            } else {
                Box::new(File::open(&stream)?)
            };

            let mut plugin =
                CutScorePlugin::new(Output::open(out.as_deref(), json, cli.global.overwrite)?);
            let frames =
                cutscore::run_with_options(source, &mut plugin, &analysis_options(&cli.global)?)?;

            plugin.into_sink().print_json()?;
            report_scored(frames, out.as_deref());
        }
        Commands::ExtractFrames {
            input,
            out,
            every,
            limit,
            ext,
        } => {
            if every == 0 {
                return Err("--every must be greater than 0".into());
            }
            let ext = parse_image_extension(&ext)
                .ok_or(format!("unsupported --ext: {ext} (png, jpg, bmp, tiff)"))?;

            if out.exists() {
                if !cli.global.overwrite {
                    return Err(format!(
                        "output directory already exists: {} (use --overwrite)",
                        out.display()
                    )
                    .into());
                }
                eprintln!(
                    "{} {}",
                    "warning:".yellow().bold(),
                    format!("writing into existing directory {}", out.display()).yellow()
                );
            }
            fs::create_dir_all(&out)?;

            let stream = VideoAnalyzer::new(&cli.global.ffmpeg)
                .with_time_limit(limit)
                .frames(&input)?;

            let progress_bar = if cli.global.progress {
                let pb = ProgressBar::new_spinner();
                pb.set_style(ProgressStyle::with_template(
                    "{spinner:.green} {pos} frame(s) decoded {msg}",
                )?);
                Some(pb)
            } else {
                None
            };

            let mut saved = 0_u64;
            let mut decoded = 0_u32;
            for (index, frame) in (0_u32..).zip(stream) {
                let frame = frame?;
                decoded += 1;
                if let Some(pb) = &progress_bar {
                    pb.inc(1);
                }
                if index % every != 0 {
                    continue;
                }

                let output_path = out.join(format!("frame_{index:06}.{ext}"));
                if output_path.exists() && !cli.global.overwrite {
                    return Err(format!(
                        "output file already exists: {} (use --overwrite)",
                        output_path.display()
                    )
                    .into());
                }
                frame.to_rgb_image()?.save(&output_path)?;
                saved += 1;

                if cli.global.verbose {
                    eprintln!("saved frame {index} -> {}", output_path.display());
                }
            }

            if let Some(pb) = progress_bar {
                pb.finish_with_message("done");
            }

            println!(
                "{} {}",
                "success:".green().bold(),
                format!(
                    "Saved {saved} of {decoded} frame(s) to {}",
                    out.display()
                )
                .green()
            );
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "cutscore", &mut io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
