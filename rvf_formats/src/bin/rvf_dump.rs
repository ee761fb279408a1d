//! Decode RVF frames to disk as palette-index dumps, RGBA dumps or PNG images.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use log::{info, warn};
use rvf_formats::{DecodeOptions, RvfFile, RvfPalette, debug_tags_to_rgba};

#[derive(Parser, Debug)]
#[command(about = "Decode RVF video frames to files", version)]
struct Args {
    /// RVF file to decode
    #[arg(long, value_name = "PATH")]
    input: PathBuf,

    /// Directory receiving one file per frame
    #[arg(long, value_name = "DIR", default_value = "frames")]
    dest: PathBuf,

    /// Output encoding
    #[arg(long, value_enum, default_value_t = DumpFormat::Png)]
    format: DumpFormat,

    /// Also write the block type map of every frame
    #[arg(long)]
    debug_tags: bool,

    /// Stop after this many frames
    #[arg(long, value_name = "N")]
    limit: Option<u32>,

    /// Do not rewrite frames whose output already exists
    #[arg(long)]
    skip_existing: bool,

    /// Log frames that fail to decode and repeat the previous frame
    #[arg(long)]
    keep_going: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DumpFormat {
    /// One palette index byte per pixel
    Raw,
    /// Four bytes per pixel
    Rgba,
    Png,
}

impl DumpFormat {
    fn extension(self) -> &'static str {
        match self {
            DumpFormat::Raw => "idx",
            DumpFormat::Rgba => "rgba",
            DumpFormat::Png => "png",
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut rvf = RvfFile::open(&args.input)?;
    let header = rvf.header().clone();
    let count = args
        .limit
        .map_or(header.frame_count, |limit| limit.min(header.frame_count));

    fs::create_dir_all(&args.dest)
        .with_context(|| format!("creating destination {}", args.dest.display()))?;

    let writer = FrameWriter {
        dest: &args.dest,
        format: args.format,
        width: header.width,
        height: header.height,
        palette: &header.palette,
    };

    let frame_len = header.frame_len();
    let mut pixels = vec![0u8; frame_len];
    let mut tags = vec![0u8; frame_len];
    let mut failures = 0u32;

    for index in 0..count {
        let options = if args.debug_tags {
            DecodeOptions::with_debug_tags(&mut tags)
        } else {
            DecodeOptions::default()
        };
        match rvf.next_frame_with(options) {
            Ok(frame) => pixels.copy_from_slice(frame.pixels),
            Err(err) if args.keep_going => {
                failures += 1;
                warn!("frame {index}: {err:#}; repeating previous frame");
            }
            Err(err) => return Err(err),
        }

        let name = format!("frame_{index:05}");
        if !(args.skip_existing && writer.path(&name).exists()) {
            writer.write_indices(&name, &pixels)?;
        }
        if args.debug_tags {
            let name = format!("{name}_tags");
            if !(args.skip_existing && writer.path(&name).exists()) {
                writer.write_tags(&name, &tags)?;
            }
        }
    }

    info!(
        "wrote {count} frames from {} to {} ({failures} failed)",
        args.input.display(),
        args.dest.display()
    );
    Ok(())
}

struct FrameWriter<'a> {
    dest: &'a Path,
    format: DumpFormat,
    width: u32,
    height: u32,
    palette: &'a RvfPalette,
}

impl FrameWriter<'_> {
    fn path(&self, name: &str) -> PathBuf {
        self.dest
            .join(name)
            .with_extension(self.format.extension())
    }

    fn write_indices(&self, name: &str, pixels: &[u8]) -> Result<()> {
        if self.format == DumpFormat::Raw {
            return self.write_bytes(name, pixels);
        }
        let mut rgba = vec![0u8; pixels.len() * 4];
        self.palette.to_rgba(pixels, &mut rgba)?;
        self.write_rgba(name, &rgba)
    }

    fn write_tags(&self, name: &str, tags: &[u8]) -> Result<()> {
        if self.format == DumpFormat::Raw {
            return self.write_bytes(name, tags);
        }
        let mut rgba = vec![0u8; tags.len() * 4];
        debug_tags_to_rgba(tags, &mut rgba)?;
        self.write_rgba(name, &rgba)
    }

    fn write_rgba(&self, name: &str, rgba: &[u8]) -> Result<()> {
        if self.format == DumpFormat::Rgba {
            return self.write_bytes(name, rgba);
        }
        let path = self.path(name);
        let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        PngEncoder::new(BufWriter::new(file))
            .write_image(rgba, self.width, self.height, ColorType::Rgba8.into())
            .with_context(|| format!("encoding {}", path.display()))
    }

    fn write_bytes(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(name);
        fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))
    }
}
