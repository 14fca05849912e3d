use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use ted_core::images::PatternImageClassifier;
use ted_core::tags::LoftyTagStore;
use ted_core::transcode::FfmpegTranscoder;
use ted_core::{normalize, save, snapshot, Collaborators, DirectoryProcessor, Release, Settings};

#[derive(Parser)]
#[command(name = "ted", version, about = "Ingest and classify ripped music release directories")]
struct Cli {
    /// TOML settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process release directories
    Process {
        #[arg(required = true)]
        directories: Vec<PathBuf>,

        /// Reprocess directories whose snapshot is Ok or Reviewed
        #[arg(long)]
        force: bool,

        /// Skip files with this extension (repeatable)
        #[arg(long = "ignore-ext")]
        ignore_extensions: Vec<String>,
    },
    /// Process every release directory under a staging directory
    Staging {
        /// Defaults to `staging_directory` from the settings file
        directory: Option<PathBuf>,

        /// Maximum number of directories to process
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Apply every corrective transform to a processed release and save it
    Normalize {
        directory: PathBuf,

        /// Make the first track's artist the release artist
        #[arg(long)]
        promote_track_artist: bool,

        /// Strip the release artist from track artists
        #[arg(long)]
        remove_artist_from_track_artists: bool,
    },
    /// Print the structure of a CUE sheet
    Cue { file: PathBuf },
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_release(release: &Release) {
    println!("{}", release.directory.display());
    println!("  {release}");
    for message in &release.processing_messages {
        println!("    {message}");
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let t_total = std::time::Instant::now();

    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let mut options = settings.options;
    tracing::debug!(config = ?cli.config, options = ?options, "settings loaded");

    let tag_store = LoftyTagStore;
    let transcoder = FfmpegTranscoder::new(options.ffmpeg_path.clone());
    let images = PatternImageClassifier;
    let collaborators = Collaborators {
        tag_store: &tag_store,
        transcoder: &transcoder,
        images: &images,
    };

    match cli.command {
        Command::Process {
            directories,
            force,
            ignore_extensions,
        } => {
            options.force |= force;
            options.ignore_extensions.extend(ignore_extensions);
            let processor = DirectoryProcessor::new(&options, collaborators);
            for dir in &directories {
                let release = processor.process(Utc::now(), dir, &[]);
                print_release(&release);
            }
        }
        Command::Staging { directory, limit } => {
            let staging = directory
                .or(settings.staging_directory)
                .context("no staging directory given and none configured")?;
            if let Some(limit) = limit {
                options.staging_scan_limit = limit;
            }
            let pb = ProgressBar::new(0);
            pb.set_style(ProgressStyle::default_bar().template("[{bar:40}] {pos}/{len} {msg}")?);
            let summary = ted_core::process_staging(&staging, &options, collaborators, &|_, current, total, message| {
                pb.set_length(total);
                pb.set_position(current + 1);
                pb.set_message(message.to_string());
            })?;
            pb.finish_and_clear();
            for (status, count) in &summary.by_status {
                println!("{status}: {count}");
            }
            eprintln!(
                "Done! {} directories ({:.2}s)",
                summary.processed,
                t_total.elapsed().as_secs_f64()
            );
        }
        Command::Normalize {
            directory,
            promote_track_artist,
            remove_artist_from_track_artists,
        } => normalize_directory(
            &directory,
            &options.snapshot_file_name,
            &tag_store,
            promote_track_artist,
            remove_artist_from_track_artists,
        )?,
        Command::Cue { file } => {
            let sheet = ted_core::cue::parse_file(&file).with_context(|| format!("parsing {}", file.display()))?;
            println!(
                "{} - {} ({})",
                sheet.performer.as_deref().unwrap_or("?"),
                sheet.title.as_deref().unwrap_or("?"),
                if sheet.is_standard { "standard" } else { "one file per track" }
            );
            for cue_file in &sheet.files {
                println!("  FILE {}", cue_file.file_name);
                for track in &cue_file.tracks {
                    let start = track.index(1).map(|i| i.time.to_string()).unwrap_or_default();
                    println!(
                        "    {:02} {} {}",
                        track.number,
                        start,
                        track.title.as_deref().unwrap_or("")
                    );
                }
            }
        }
    }
    Ok(())
}

fn normalize_directory(
    directory: &Path,
    snapshot_file_name: &str,
    tag_store: &LoftyTagStore,
    promote_track_artist: bool,
    remove_artist_from_track_artists: bool,
) -> anyhow::Result<()> {
    let mut release = snapshot::load(directory, snapshot_file_name)?
        .with_context(|| format!("{} has not been processed", directory.display()))?;
    let now = Utc::now();
    normalize::apply_all(&mut release, now);
    if promote_track_artist {
        normalize::promote_track_artist(&mut release);
    }
    if remove_artist_from_track_artists {
        normalize::remove_artist_from_track_artists(&mut release);
    }
    let failures = save::save_release(&mut release, now, tag_store, snapshot_file_name)?;
    print_release(&release);
    for failure in &failures {
        println!("    {failure}");
    }
    Ok(())
}
