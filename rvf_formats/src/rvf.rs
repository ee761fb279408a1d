use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail, ensure};
use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, warn};
use memmap2::{Mmap, MmapOptions};
use serde::Serialize;

use crate::block::BlockKind;
use crate::decoder::{DecodeOptions, FrameDecoder, FrameStats};

const MAGIC: [u8; 3] = *b"RVF";

/// Container revision this reader understands.
pub const FORMAT_VERSION: u8 = 3;

const FLAG_COMPRESSED: u8 = 0b0000_0001;
const FLAG_AUDIO_BLOCK: u8 = 0b0000_0010;
const FLAG_AUDIO_STREAM: u8 = 0b0000_0100;

/// Size field plus flags byte that precede every compressed payload.
const FRAME_PREFIX_LEN: u32 = 4 + 1;

/// Audio stream description from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RvfAudioInfo {
    pub channels: u8,
    pub frequency: u32,
    pub bits_per_sample: u8,
}

/// Stream-level color table that decoded palette indices refer to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RvfPalette {
    colors: Vec<[u8; 3]>,
}

impl RvfPalette {
    pub fn new(colors: Vec<[u8; 3]>) -> Self {
        Self { colors }
    }

    pub fn colors(&self) -> &[[u8; 3]] {
        &self.colors
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    #[inline]
    pub fn get(&self, index: u8) -> Option<[u8; 3]> {
        self.colors.get(usize::from(index)).copied()
    }

    /// Expand palette indices to RGBA8. Indices past the end of the palette
    /// render as opaque black.
    pub fn to_rgba(&self, indices: &[u8], dst: &mut [u8]) -> Result<()> {
        ensure!(
            dst.len() >= indices.len() * 4,
            "RGBA destination too small: {} < {}",
            dst.len(),
            indices.len() * 4
        );
        for (rgba, &index) in dst.chunks_exact_mut(4).zip(indices) {
            let [r, g, b] = self.get(index).unwrap_or([0, 0, 0]);
            rgba.copy_from_slice(&[r, g, b, 0xFF]);
        }
        Ok(())
    }
}

/// Expand a block-type map (one tag nibble per pixel) to RGBA8 for viewing.
pub fn debug_tags_to_rgba(tags: &[u8], dst: &mut [u8]) -> Result<()> {
    ensure!(
        dst.len() >= tags.len() * 4,
        "RGBA destination too small: {} < {}",
        dst.len(),
        tags.len() * 4
    );
    for (rgba, &tag) in dst.chunks_exact_mut(4).zip(tags) {
        let [r, g, b] = BlockKind::from_header(tag << 4).debug_rgb();
        rgba.copy_from_slice(&[r, g, b, 0xFF]);
    }
    Ok(())
}

/// Parsed file header.
#[derive(Debug, Clone, PartialEq)]
pub struct RvfHeader {
    pub version: u8,
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
    /// Seconds per frame.
    pub frame_time: f32,
    pub flags: u8,
    pub audio: Option<RvfAudioInfo>,
    pub palette: RvfPalette,
}

impl RvfHeader {
    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }

    #[inline]
    pub fn has_audio_block(&self) -> bool {
        self.flags & FLAG_AUDIO_BLOCK != 0
    }

    #[inline]
    pub fn has_audio_stream(&self) -> bool {
        self.flags & FLAG_AUDIO_STREAM != 0
    }

    pub fn frame_rate(&self) -> Option<f32> {
        (self.frame_time > 0.0).then(|| 1.0 / self.frame_time)
    }

    /// Bytes in one decoded frame.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Parse everything up to and including the palette.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 3];
        reader
            .read_exact(&mut magic)
            .context("failed to read RVF magic")?;
        if magic != MAGIC {
            bail!("unsupported RVF magic {:02x?}", magic);
        }
        let version = reader.read_u8().context("failed to read RVF version")?;
        if version != FORMAT_VERSION {
            bail!("unsupported RVF version {version} (expected {FORMAT_VERSION})");
        }

        let width = reader
            .read_u32::<LittleEndian>()
            .context("failed to read RVF width")?;
        let height = reader
            .read_u32::<LittleEndian>()
            .context("failed to read RVF height")?;
        let frame_count = reader
            .read_u32::<LittleEndian>()
            .context("failed to read RVF frame count")?;
        let frame_time = reader
            .read_f32::<LittleEndian>()
            .context("failed to read RVF frame time")?;
        let flags = reader.read_u8().context("failed to read RVF flags")?;

        let audio = if flags & (FLAG_AUDIO_BLOCK | FLAG_AUDIO_STREAM) != 0 {
            let channels = reader
                .read_u8()
                .context("failed to read audio channel count")?;
            let frequency = reader
                .read_u32::<LittleEndian>()
                .context("failed to read audio frequency")?;
            let quality = reader.read_u8().context("failed to read audio quality")?;
            Some(RvfAudioInfo {
                channels,
                frequency,
                bits_per_sample: if quality != 0 { 16 } else { 8 },
            })
        } else {
            None
        };

        let color_count = usize::from(reader.read_u8().context("failed to read palette size")?) + 1;
        let mut colors = Vec::with_capacity(color_count);
        for index in 0..color_count {
            let mut rgb = [0u8; 3];
            reader
                .read_exact(&mut rgb)
                .with_context(|| format!("failed to read palette entry {index}"))?;
            colors.push(rgb);
        }

        Ok(Self {
            version,
            width,
            height,
            frame_count,
            frame_time,
            flags,
            audio,
            palette: RvfPalette::new(colors),
        })
    }
}

/// Per-frame flags stored in front of compressed payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags(pub u8);

impl FrameFlags {
    pub const KEYFRAME: u8 = 0b0000_0001;
    pub const FIRST: u8 = 0b0000_0010;
    pub const LAST: u8 = 0b0000_0100;

    pub fn is_keyframe(self) -> bool {
        self.0 & Self::KEYFRAME != 0
    }

    pub fn is_first(self) -> bool {
        self.0 & Self::FIRST != 0
    }

    pub fn is_last(self) -> bool {
        self.0 & Self::LAST != 0
    }
}

/// One decoded frame, borrowed from the reader's frame buffer.
#[derive(Debug)]
pub struct RvfFrame<'a> {
    pub index: u32,
    pub flags: FrameFlags,
    /// Decoder counters; `None` for uncompressed files.
    pub stats: Option<FrameStats>,
    pub pixels: &'a [u8],
}

/// Sequential reader over an RVF file.
///
/// Frames can only be read in order; after the last frame the reader loops
/// back to the first one.
#[derive(Debug)]
pub struct RvfFile<R> {
    source: Option<PathBuf>,
    header: RvfHeader,
    audio_data: Option<Vec<u8>>,
    reader: R,
    frames_offset: u64,
    next_index: u32,
    decoder: FrameDecoder,
    frame: Vec<u8>,
}

impl RvfFile<Cursor<Mmap>> {
    /// Memory-map and parse an RVF file from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open RVF file {}", path.display()))?;
        let mmap = unsafe { MmapOptions::new().map(&file) }
            .with_context(|| format!("failed to memory-map RVF file {}", path.display()))?;
        let mut parsed = Self::read_from(Cursor::new(mmap))
            .with_context(|| format!("failed to parse RVF file {}", path.display()))?;
        parsed.source = Some(path.to_path_buf());
        Ok(parsed)
    }
}

impl<R: Read + Seek> RvfFile<R> {
    /// Parse the header (and any embedded audio block) from an arbitrary reader.
    pub fn read_from(mut reader: R) -> Result<Self> {
        let header = RvfHeader::read_from(&mut reader)?;

        let audio_data = if header.has_audio_block() {
            let len = reader
                .read_u32::<LittleEndian>()
                .context("failed to read audio block size")?;
            let mut data = vec![0u8; len as usize];
            reader
                .read_exact(&mut data)
                .context("failed to read audio block")?;
            Some(data)
        } else {
            None
        };

        let frames_offset = reader
            .stream_position()
            .context("failed to capture frame data offset")?;
        let decoder = FrameDecoder::new(header.width, header.height)
            .context("failed to create RVF frame decoder")?;
        let frame = vec![0u8; decoder.frame_len()];

        debug!(
            "rvf header {}x{} frames={} compressed={} colors={} audio={:?}",
            header.width,
            header.height,
            header.frame_count,
            header.is_compressed(),
            header.palette.len(),
            header.audio
        );

        Ok(Self {
            source: None,
            header,
            audio_data,
            reader,
            frames_offset,
            next_index: 0,
            decoder,
            frame,
        })
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn header(&self) -> &RvfHeader {
        &self.header
    }

    /// Raw PCM bytes of the embedded audio block, if present.
    pub fn audio_data(&self) -> Option<&[u8]> {
        self.audio_data.as_deref()
    }

    /// Index of the frame the next read returns.
    pub fn next_index(&self) -> u32 {
        if self.next_index >= self.header.frame_count {
            0
        } else {
            self.next_index
        }
    }

    /// Seek back to the first frame. Decoder state is kept; the first frame of
    /// a compressed stream is expected to rewrite every block.
    pub fn rewind(&mut self) -> Result<()> {
        self.reader
            .seek(SeekFrom::Start(self.frames_offset))
            .context("failed to seek to first RVF frame")?;
        self.next_index = 0;
        Ok(())
    }

    pub fn next_frame(&mut self) -> Result<RvfFrame<'_>> {
        self.next_frame_with(DecodeOptions::default())
    }

    /// Read and decode the next frame.
    ///
    /// A frame that fails to decode still advances the reader, so callers may
    /// log the error and continue with the following frame.
    pub fn next_frame_with(&mut self, options: DecodeOptions<'_>) -> Result<RvfFrame<'_>> {
        ensure!(self.header.frame_count > 0, "RVF file contains no frames");
        if self.next_index >= self.header.frame_count {
            self.rewind()?;
        }
        let index = self.next_index;
        self.next_index += 1;

        if !self.header.is_compressed() {
            self.reader
                .read_exact(&mut self.frame)
                .with_context(|| format!("failed to read raw RVF frame {index}"))?;
            if let Some(tags) = options.debug_tags {
                let len = self.frame.len();
                ensure!(tags.len() >= len, "debug tag buffer too small");
                tags[..len].fill(BlockKind::Raw.tag());
            }
            return Ok(RvfFrame {
                index,
                flags: FrameFlags::default(),
                stats: None,
                pixels: &self.frame,
            });
        }

        let frame_size = self
            .reader
            .read_u32::<LittleEndian>()
            .with_context(|| format!("failed to read size of RVF frame {index}"))?;
        ensure!(
            frame_size >= FRAME_PREFIX_LEN,
            "RVF frame {index} reports impossible size {frame_size}"
        );
        let flags = FrameFlags(
            self.reader
                .read_u8()
                .with_context(|| format!("failed to read flags of RVF frame {index}"))?,
        );
        let payload_len = (frame_size - FRAME_PREFIX_LEN) as usize;
        self.decoder
            .stage_input(&mut self.reader, payload_len)
            .with_context(|| format!("failed to read payload of RVF frame {index}"))?;
        let trailer = self
            .reader
            .read_u32::<LittleEndian>()
            .with_context(|| format!("failed to read trailer of RVF frame {index}"))?;
        if trailer != frame_size {
            warn!("RVF frame {index} trailer {trailer} does not match size {frame_size}");
        }

        let stats = self
            .decoder
            .decode_staged(&mut self.frame, options)
            .with_context(|| format!("failed to decode RVF frame {index}"))?;

        Ok(RvfFrame {
            index,
            flags,
            stats: Some(stats),
            pixels: &self.frame,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use byteorder::WriteBytesExt;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Serialize a synthetic RVF file.
    fn build_rvf(
        width: u32,
        height: u32,
        compressed: bool,
        audio: Option<&[u8]>,
        palette: &[[u8; 3]],
        frames: &[(u8, Vec<u8>)],
    ) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"RVF");
        out.push(FORMAT_VERSION);
        out.write_u32::<LittleEndian>(width).unwrap();
        out.write_u32::<LittleEndian>(height).unwrap();
        out.write_u32::<LittleEndian>(frames.len() as u32).unwrap();
        out.write_f32::<LittleEndian>(1.0 / 25.0).unwrap();
        let mut flags = if compressed { FLAG_COMPRESSED } else { 0 };
        if audio.is_some() {
            flags |= FLAG_AUDIO_BLOCK;
        }
        out.push(flags);
        if audio.is_some() {
            out.push(2);
            out.write_u32::<LittleEndian>(22050).unwrap();
            out.push(1);
        }
        out.push((palette.len() - 1) as u8);
        for rgb in palette {
            out.extend_from_slice(rgb);
        }
        if let Some(audio) = audio {
            out.write_u32::<LittleEndian>(audio.len() as u32).unwrap();
            out.extend_from_slice(audio);
        }
        for (frame_flags, payload) in frames {
            if compressed {
                let size = payload.len() as u32 + FRAME_PREFIX_LEN;
                out.write_u32::<LittleEndian>(size).unwrap();
                out.push(*frame_flags);
                out.extend_from_slice(payload);
                out.write_u32::<LittleEndian>(size).unwrap();
            } else {
                out.extend_from_slice(payload);
            }
        }
        out
    }

    const PALETTE: [[u8; 3]; 3] = [[0, 0, 0], [255, 0, 0], [0, 0, 255]];

    #[test]
    fn reads_header_audio_and_frames() {
        let frames = vec![
            (FrameFlags::FIRST | FrameFlags::KEYFRAME, vec![0x43, 1]),
            (FrameFlags::LAST, vec![0x02, 0x40, 2]),
        ];
        let data = build_rvf(8, 8, true, Some(&[1, 2, 3, 4]), &PALETTE, &frames);
        let mut rvf = RvfFile::read_from(Cursor::new(data)).unwrap();

        let header = rvf.header().clone();
        assert_eq!((header.width, header.height, header.frame_count), (8, 8, 2));
        assert!(header.is_compressed());
        assert!(header.has_audio_block());
        assert!(!header.has_audio_stream());
        assert_eq!(
            header.audio,
            Some(RvfAudioInfo {
                channels: 2,
                frequency: 22050,
                bits_per_sample: 16
            })
        );
        assert_eq!(header.palette.len(), 3);
        assert!((header.frame_rate().unwrap() - 25.0).abs() < 1e-3);
        assert_eq!(rvf.audio_data(), Some(&[1u8, 2, 3, 4][..]));

        let first = rvf.next_frame().unwrap();
        assert_eq!(first.index, 0);
        assert!(first.flags.is_first() && first.flags.is_keyframe());
        assert!(first.pixels.iter().all(|&px| px == 1));

        let second = rvf.next_frame().unwrap();
        assert_eq!(second.index, 1);
        assert!(second.flags.is_last());
        // Three skipped blocks keep color 1; the fourth (top-right) turns 2.
        assert_eq!(second.pixels[0], 1);
        assert_eq!(second.pixels[4], 2);
        assert_eq!(second.stats.as_ref().unwrap().blocks_of(BlockKind::Skip), 3);

        assert_eq!(rvf.next_index(), 0);
        let looped = rvf.next_frame().unwrap();
        assert_eq!(looped.index, 0);
        assert!(looped.pixels.iter().all(|&px| px == 1));
    }

    #[test]
    fn reads_uncompressed_frames() {
        let frames = vec![(0, vec![1u8; 16]), (0, vec![2u8; 16])];
        let data = build_rvf(4, 4, false, None, &PALETTE, &frames);
        let mut rvf = RvfFile::read_from(Cursor::new(data)).unwrap();
        assert!(rvf.header().audio.is_none());
        assert_eq!(rvf.next_frame().unwrap().pixels, &[1u8; 16]);

        let mut tags = vec![0u8; 16];
        let frame = rvf
            .next_frame_with(DecodeOptions::with_debug_tags(&mut tags))
            .unwrap();
        assert_eq!(frame.pixels, &[2u8; 16]);
        assert!(frame.stats.is_none());
        assert!(tags.iter().all(|&tag| tag == BlockKind::Raw.tag()));
    }

    #[test]
    fn corrupt_frame_reports_decode_error_and_reader_continues() {
        let frames = vec![(0, vec![0x20]), (0, vec![0x40, 7])];
        let data = build_rvf(4, 4, true, None, &PALETTE, &frames);
        let mut rvf = RvfFile::read_from(Cursor::new(data)).unwrap();

        let err = rvf.next_frame().unwrap_err();
        assert_eq!(
            err.downcast_ref::<DecodeError>(),
            Some(&DecodeError::RepeatWithoutPrevious { offset: 0 })
        );
        let next = rvf.next_frame().unwrap();
        assert_eq!(next.index, 1);
        assert!(next.pixels.iter().all(|&px| px == 7));
    }

    #[test]
    fn tolerates_trailer_mismatch() {
        let mut data = build_rvf(4, 4, true, None, &PALETTE, &[(0, vec![0x40, 9])]);
        let len = data.len();
        data[len - 4..].copy_from_slice(&0u32.to_le_bytes());
        let mut rvf = RvfFile::read_from(Cursor::new(data)).unwrap();
        assert!(rvf.next_frame().unwrap().pixels.iter().all(|&px| px == 9));
    }

    #[test]
    fn rejects_bad_magic_and_version() {
        let mut data = build_rvf(4, 4, true, None, &PALETTE, &[]);
        data[3] = 2;
        assert!(RvfFile::read_from(Cursor::new(data.clone())).is_err());
        data[0] = b'X';
        let err = RvfFile::read_from(Cursor::new(data)).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn rejects_reads_from_empty_stream() {
        let data = build_rvf(4, 4, true, None, &PALETTE, &[]);
        let mut rvf = RvfFile::read_from(Cursor::new(data)).unwrap();
        assert!(rvf.next_frame().is_err());
    }

    #[test]
    fn rejects_undersized_frame_prefix() {
        let mut data = build_rvf(4, 4, true, None, &PALETTE, &[]);
        data[12..16].copy_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&3u32.to_le_bytes());
        data.push(0);
        let mut rvf = RvfFile::read_from(Cursor::new(data)).unwrap();
        let err = rvf.next_frame().unwrap_err();
        assert!(err.to_string().contains("impossible size"));
    }

    #[test]
    fn rejects_oversized_header_dimensions() {
        let mut data = build_rvf(4, 4, true, None, &PALETTE, &[]);
        data[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
        data[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
        let err = RvfFile::read_from(Cursor::new(data)).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DecodeError>(),
            Some(&DecodeError::InvalidGeometry {
                width: u32::MAX,
                height: u32::MAX
            })
        );
    }

    #[test]
    fn rejects_frame_size_past_end_of_file() {
        let mut data = build_rvf(4, 4, true, None, &PALETTE, &[]);
        data[12..16].copy_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&u32::MAX.to_le_bytes());
        data.extend_from_slice(&[0, 0x40, 3]);
        let mut rvf = RvfFile::read_from(Cursor::new(data)).unwrap();
        let err = rvf.next_frame().unwrap_err();
        assert!(format!("{err:#}").contains("payload of RVF frame 0"));
    }

    #[test]
    fn opens_files_from_disk() {
        let data = build_rvf(4, 4, true, None, &PALETTE, &[(0, vec![0x40, 2])]);
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        let mut rvf = RvfFile::open(file.path()).unwrap();
        assert_eq!(rvf.source(), Some(file.path()));
        let pixels = rvf.next_frame().unwrap().pixels.to_vec();

        let mut rgba = vec![0u8; pixels.len() * 4];
        rvf.header().palette.to_rgba(&pixels, &mut rgba).unwrap();
        assert_eq!(&rgba[..4], &[0, 0, 255, 255]);
    }

    #[test]
    fn palette_and_tags_expand_to_rgba() {
        let palette = RvfPalette::new(PALETTE.to_vec());
        let mut rgba = vec![0u8; 8];
        palette.to_rgba(&[1, 200], &mut rgba).unwrap();
        assert_eq!(rgba, vec![255, 0, 0, 255, 0, 0, 0, 255]);
        assert!(palette.to_rgba(&[1, 2, 3], &mut rgba).is_err());

        debug_tags_to_rgba(&[BlockKind::Raw.tag(), BlockKind::Repeat.tag()], &mut rgba).unwrap();
        assert_eq!(rgba, vec![0, 0, 255, 255, 255, 0, 0, 255]);
    }
}
