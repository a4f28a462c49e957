use std::{
    fmt,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use colored::Colorize;
use graybalance::{
    BalanceError, BlackChannelPolicy, DiscardSink, FfmpegLogLevel, FrameSource, PartitionStrategy,
    Pipeline, PipelineMetrics, PipelineOptions, ProgressCallback, ProgressInfo, VideoCodec,
    VideoInput, VideoWriter, VideoWriterOptions,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  graybalance input.mp4 8\n  graybalance input.mp4 4 --strategy stride --window 120 --out balanced.avi\n  graybalance input.mp4 8 --strategy rows --no-output --json\n  graybalance input.mp4 8 --codec mpeg4 --bitrate 4000000\n  graybalance --completions zsh > _graybalance";

#[derive(Debug, Parser)]
#[command(
    name = "graybalance",
    version,
    about = "Gray-world color balance for video files",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    /// Input video path.
    #[arg(required_unless_present = "completions")]
    input: Option<String>,

    /// Number of worker threads.
    #[arg(required_unless_present = "completions")]
    threads: Option<usize>,

    /// Output video path.
    #[arg(long, default_value = "output.avi")]
    out: PathBuf,

    /// Work partitioning: block | stride | rows.
    #[arg(long, default_value = "block")]
    strategy: String,

    /// Frames held in memory at once.
    #[arg(long, default_value_t = graybalance::DEFAULT_WINDOW_SIZE)]
    window: usize,

    /// Output codec: huffyuv | mpeg4 | h264.
    #[arg(long, default_value = "huffyuv")]
    codec: String,

    /// Target bitrate in bits per second for lossy codecs.
    #[arg(long, value_name = "BITS")]
    bitrate: Option<usize>,

    /// Process frames without writing an output file.
    #[arg(long)]
    no_output: bool,

    /// Frames with a zero channel mean: fail | pass.
    #[arg(long, default_value = "fail")]
    black_channel: String,

    /// Allow overwriting an existing output file.
    #[arg(long)]
    overwrite: bool,

    /// Show a progress bar.
    #[arg(long)]
    progress: bool,

    /// Print metrics as machine-readable JSON.
    #[arg(long)]
    json: bool,

    /// FFmpeg log level (quiet, fatal, error, warning, info, debug).
    #[arg(long, default_value = "error")]
    log_level: String,

    /// Print a shell completion script and exit.
    #[arg(long, value_enum, hide = true, exclusive = true)]
    completions: Option<Shell>,
}

/// A failed invocation, classified by exit code.
#[derive(Debug)]
enum Failure {
    /// Bad arguments.
    Usage(String),
    /// The input could not be opened.
    Open(BalanceError),
    /// Anything that went wrong after the input was opened.
    Run(Box<dyn std::error::Error>),
}

impl Failure {
    fn exit_code(&self) -> u8 {
        match self {
            Failure::Run(_) => 1,
            Failure::Usage(_) => 2,
            Failure::Open(_) => 3,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Usage(message) => write!(f, "{message}"),
            Failure::Open(error) => write!(f, "cannot open input: {error}"),
            Failure::Run(error) => write!(f, "{error}"),
        }
    }
}

impl From<BalanceError> for Failure {
    fn from(error: BalanceError) -> Self {
        Failure::Run(Box::new(error))
    }
}

fn parse_strategy(value: &str) -> Option<PartitionStrategy> {
    value.parse().ok()
}

fn parse_codec(value: &str) -> Option<VideoCodec> {
    match value.to_ascii_lowercase().as_str() {
        "huffyuv" | "hfyu" => Some(VideoCodec::Huffyuv),
        "mpeg4" => Some(VideoCodec::Mpeg4),
        "h264" | "avc" => Some(VideoCodec::H264),
        _ => None,
    }
}

fn parse_black_channel(value: &str) -> Option<BlackChannelPolicy> {
    match value.to_ascii_lowercase().as_str() {
        "fail" => Some(BlackChannelPolicy::Fail),
        "pass" | "passthrough" => Some(BlackChannelPolicy::PassThrough),
        _ => None,
    }
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Failure> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(Failure::Usage(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )));
        }
    }
    Ok(())
}

/// Drives an `indicatif` bar from pipeline progress.
struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new(total: Option<u64>) -> Result<Self, Failure> {
        let bar = match total {
            Some(total) => ProgressBar::new(total),
            None => ProgressBar::new_spinner(),
        };
        let style = ProgressStyle::with_template(
            "{spinner:.green} {bar:40.cyan/blue} {pos}/{len} frames {msg}",
        )
        .map_err(|error| Failure::Run(Box::new(error)))?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        self.bar.set_position(info.current);
        if let Some(remaining) = info.estimated_remaining {
            self.bar.set_message(format!("eta {:.0}s", remaining.as_secs_f64()));
        }
    }
}

fn print_json(metrics: &PipelineMetrics, options: &PipelineOptions) {
    let payload = json!({
        "frames": metrics.frames,
        "batches": metrics.batches,
        "threads": options.threads(),
        "strategy": options.strategy().to_string(),
        "window": options.window_size(),
        "peak_resident": metrics.peak_resident,
        "total_seconds": metrics.total.as_secs_f64(),
        "input_seconds": metrics.decode.as_secs_f64(),
        "output_seconds": metrics.encode.as_secs_f64(),
        "calculate_seconds": metrics.compute.as_secs_f64(),
    });
    println!("{payload:#}");
}

fn run() -> Result<(), Failure> {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut command = Cli::command();
        clap_complete::generate(shell, &mut command, "graybalance", &mut std::io::stdout());
        return Ok(());
    }

    let (Some(input), Some(threads)) = (cli.input.as_deref(), cli.threads) else {
        return Err(Failure::Usage("usage: graybalance <INPUT> <THREADS>".to_string()));
    };
    if threads == 0 {
        return Err(Failure::Usage("THREADS must be at least 1".to_string()));
    }
    if cli.window == 0 {
        return Err(Failure::Usage("--window must be at least 1".to_string()));
    }

    let strategy = parse_strategy(&cli.strategy)
        .ok_or_else(|| Failure::Usage(format!("unsupported --strategy: {}", cli.strategy)))?;
    let codec = parse_codec(&cli.codec)
        .ok_or_else(|| Failure::Usage(format!("unsupported --codec: {}", cli.codec)))?;
    let black_channel = parse_black_channel(&cli.black_channel).ok_or_else(|| {
        Failure::Usage(format!("unsupported --black-channel: {}", cli.black_channel))
    })?;
    let log_level = FfmpegLogLevel::from_name(&cli.log_level)
        .ok_or_else(|| Failure::Usage(format!("unsupported --log-level: {}", cli.log_level)))?;
    graybalance::set_ffmpeg_log_level(log_level);

    if !cli.no_output {
        ensure_writable_path(&cli.out, cli.overwrite)?;
    }

    let source = VideoInput::open(input).map_err(Failure::Open)?;
    let info = source.info();

    let mut options = PipelineOptions::new()
        .with_threads(threads)
        .with_window_size(cli.window)
        .with_strategy(strategy)
        .with_black_channel_policy(black_channel);

    let progress = if cli.progress {
        let progress = Arc::new(TerminalProgress::new(info.frame_count)?);
        options = options
            .with_progress(Arc::clone(&progress) as Arc<dyn ProgressCallback>)
            .with_progress_interval(10);
        Some(progress)
    } else {
        None
    };

    let pipeline = Pipeline::new(options)?;
    let metrics = if cli.no_output {
        pipeline.run(&source, DiscardSink)?
    } else {
        let mut writer_options = VideoWriterOptions::from_stream(info).codec(codec);
        if let Some(bitrate) = cli.bitrate {
            writer_options = writer_options.bitrate(bitrate);
        }
        let writer = VideoWriter::create(&cli.out, writer_options)?;
        pipeline.run(&source, writer)?
    };

    if let Some(progress) = progress {
        progress.bar.finish_and_clear();
    }

    if cli.json {
        print_json(&metrics, pipeline.options());
    } else {
        println!("{metrics}");
    }
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            eprintln!("{} {failure}", "error:".red().bold());
            ExitCode::from(failure.exit_code())
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Failure, parse_black_channel, parse_codec, parse_strategy};
    use graybalance::{BlackChannelPolicy, PartitionStrategy, VideoCodec};

    #[test]
    fn parse_strategy_aliases() {
        assert_eq!(parse_strategy("block"), Some(PartitionStrategy::Block));
        assert_eq!(parse_strategy("STRIDE"), Some(PartitionStrategy::Stride));
        assert_eq!(parse_strategy("rows"), Some(PartitionStrategy::RowSplit));
        assert_eq!(parse_strategy("row-split"), Some(PartitionStrategy::RowSplit));
        assert!(parse_strategy("random").is_none());
    }

    #[test]
    fn parse_codec_aliases() {
        assert_eq!(parse_codec("huffyuv"), Some(VideoCodec::Huffyuv));
        assert_eq!(parse_codec("HFYU"), Some(VideoCodec::Huffyuv));
        assert_eq!(parse_codec("mpeg4"), Some(VideoCodec::Mpeg4));
        assert_eq!(parse_codec("h264"), Some(VideoCodec::H264));
        assert!(parse_codec("vp9").is_none());
    }

    #[test]
    fn parse_black_channel_aliases() {
        assert_eq!(parse_black_channel("fail"), Some(BlackChannelPolicy::Fail));
        assert_eq!(parse_black_channel("pass"), Some(BlackChannelPolicy::PassThrough));
        assert!(parse_black_channel("ignore").is_none());
    }

    #[test]
    fn positional_arguments_and_defaults() {
        let cli = Cli::try_parse_from(["graybalance", "in.mp4", "8"]).unwrap();
        assert_eq!(cli.input.as_deref(), Some("in.mp4"));
        assert_eq!(cli.threads, Some(8));
        assert_eq!(cli.out.to_str(), Some("output.avi"));
        assert_eq!(cli.window, graybalance::DEFAULT_WINDOW_SIZE);
        assert!(!cli.no_output);
        assert_eq!(cli.bitrate, None);
    }

    #[test]
    fn bitrate_is_parsed() {
        let cli = Cli::try_parse_from([
            "graybalance", "in.mp4", "4", "--codec", "mpeg4", "--bitrate", "4000000",
        ])
        .unwrap();
        assert_eq!(cli.bitrate, Some(4_000_000));
        assert!(Cli::try_parse_from(["graybalance", "in.mp4", "4", "--bitrate", "fast"]).is_err());
    }

    #[test]
    fn missing_threads_is_a_usage_error() {
        let error = Cli::try_parse_from(["graybalance", "in.mp4"]).unwrap_err();
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn exit_codes_are_distinct() {
        assert_eq!(Failure::Usage(String::new()).exit_code(), 2);
        assert_eq!(Failure::Open(graybalance::BalanceError::NoVideoStream).exit_code(), 3);
        assert_eq!(Failure::from(graybalance::BalanceError::EmptyStream).exit_code(), 1);
    }
}
