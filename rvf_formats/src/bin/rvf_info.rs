use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::info;
use rvf_formats::{BlockKind, FrameStats, RvfAudioInfo, RvfFile};
use serde::Serialize;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(about = "Print metadata for RVF video files", version)]
struct Args {
    /// RVF files to inspect
    #[arg(value_name = "PATH", conflicts_with = "root")]
    paths: Vec<PathBuf>,

    /// Directory scanned recursively for .rvf files
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Emit one JSON document instead of text
    #[arg(long)]
    json: bool,

    /// Decode every frame and report block type totals
    #[arg(long)]
    stats: bool,
}

#[derive(Debug, Serialize)]
struct FileReport {
    path: PathBuf,
    width: u32,
    height: u32,
    frame_count: u32,
    frame_time: f32,
    compressed: bool,
    colors: usize,
    audio: Option<RvfAudioInfo>,
    audio_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<StreamStats>,
}

#[derive(Debug, Serialize)]
struct StreamStats {
    totals: FrameStats,
    keyframes: u32,
    /// Decoded bytes per compressed payload byte.
    compression_ratio: Option<f64>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let paths = resolve_paths(&args)?;
    if paths.is_empty() {
        bail!("no RVF files to inspect");
    }

    let mut reports = Vec::with_capacity(paths.len());
    for path in &paths {
        reports.push(inspect(path, args.stats)?);
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.json {
        serde_json::to_writer_pretty(&mut out, &reports)?;
        writeln!(out)?;
    } else {
        for report in &reports {
            print_report(&mut out, report)?;
        }
    }
    Ok(())
}

fn resolve_paths(args: &Args) -> Result<Vec<PathBuf>> {
    let mut paths = args.paths.clone();
    if let Some(root) = args.root.as_ref() {
        for entry in WalkDir::new(root) {
            let entry = entry.with_context(|| format!("scanning {}", root.display()))?;
            let is_rvf = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("rvf"))
                .unwrap_or(false);
            if entry.file_type().is_file() && is_rvf {
                paths.push(entry.into_path());
            }
        }
    }
    paths.sort();
    paths.dedup();
    Ok(paths)
}

fn inspect(path: &Path, with_stats: bool) -> Result<FileReport> {
    let mut rvf = RvfFile::open(path)?;
    let header = rvf.header().clone();

    let stats = if with_stats {
        let mut totals = FrameStats::default();
        let mut keyframes = 0;
        for _ in 0..header.frame_count {
            let frame = rvf.next_frame()?;
            if frame.flags.is_keyframe() {
                keyframes += 1;
            }
            if let Some(stats) = frame.stats.as_ref() {
                totals.merge(stats);
            }
        }
        let decoded = header.frame_len() as f64 * f64::from(header.frame_count);
        let compression_ratio =
            (header.is_compressed() && totals.bytes > 0).then(|| decoded / totals.bytes as f64);
        info!("{}: decoded {} frames", path.display(), header.frame_count);
        Some(StreamStats {
            totals,
            keyframes,
            compression_ratio,
        })
    } else {
        None
    };

    Ok(FileReport {
        path: path.to_path_buf(),
        width: header.width,
        height: header.height,
        frame_count: header.frame_count,
        frame_time: header.frame_time,
        compressed: header.is_compressed(),
        colors: header.palette.len(),
        audio: header.audio,
        audio_bytes: rvf.audio_data().map_or(0, <[u8]>::len),
        stats,
    })
}

fn print_report(out: &mut impl Write, report: &FileReport) -> Result<()> {
    writeln!(out, "{}", report.path.display())?;
    writeln!(
        out,
        "  {}x{}, {} frames @ {:.3}s, {} colors, {}",
        report.width,
        report.height,
        report.frame_count,
        report.frame_time,
        report.colors,
        if report.compressed { "compressed" } else { "raw" }
    )?;
    if let Some(audio) = report.audio {
        writeln!(
            out,
            "  audio: {} ch, {} Hz, {}-bit, {} bytes embedded",
            audio.channels, audio.frequency, audio.bits_per_sample, report.audio_bytes
        )?;
    }
    if let Some(stats) = report.stats.as_ref() {
        writeln!(out, "  keyframes: {}", stats.keyframes)?;
        for kind in BlockKind::ALL {
            let runs = stats.totals.runs_of(kind);
            if runs == 0 {
                continue;
            }
            writeln!(
                out,
                "  {name:<16} {runs:>10} runs {blocks:>12} blocks",
                name = kind.name(),
                blocks = stats.totals.blocks_of(kind)
            )?;
        }
        if stats.totals.discarded_blocks > 0 {
            writeln!(out, "  discarded blocks: {}", stats.totals.discarded_blocks)?;
        }
        if let Some(ratio) = stats.compression_ratio {
            writeln!(
                out,
                "  compressed {} bytes, ratio {:.2}:1",
                stats.totals.bytes, ratio
            )?;
        }
    }
    Ok(())
}
