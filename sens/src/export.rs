use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ImageError, ImageFormat};

use crate::error::{Result, SensError};
use crate::frame::FrameRecord;
use crate::header::{Header, Matrix4};
use crate::reader::SensReader;

pub const DEPTH_DIR: &str = "depth";
pub const COLOR_DIR: &str = "color";
pub const POSE_DIR: &str = "pose";
pub const INTRINSIC_DIR: &str = "intrinsic";

pub const DEPTH_EXT: &str = "png";
pub const COLOR_EXT: &str = "jpg";

/// Which outputs an export run writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Channels {
    pub depth: bool,
    pub color: bool,
    pub poses: bool,
    pub intrinsics: bool,
}

impl Channels {
    pub fn all() -> Self {
        Self {
            depth: true,
            color: true,
            poses: true,
            intrinsics: true,
        }
    }

    pub fn any(&self) -> bool {
        self.depth || self.color || self.poses || self.intrinsics
    }
}

/// Configuration for an export run.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Export every `stride`-th frame, starting with the first.
    pub stride: u32,
    /// Resize depth images to `(width, height)` with nearest-neighbour sampling.
    pub depth_size: Option<(u32, u32)>,
    /// Resize color images to `(width, height)` with bilinear filtering.
    pub color_size: Option<(u32, u32)>,
    /// JPEG quality for color output, 1-100.
    pub jpeg_quality: u8,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            stride: 1,
            depth_size: None,
            color_size: None,
            jpeg_quality: 95,
        }
    }
}

impl ExportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stride == 0 {
            return Err(SensError::InvalidConfig("stride must be at least 1".into()));
        }
        for (name, size) in [("depth", self.depth_size), ("color", self.color_size)] {
            if let Some((w, h)) = size {
                if w == 0 || h == 0 {
                    return Err(SensError::InvalidConfig(format!(
                        "{} resize target {}x{} has a zero dimension",
                        name, w, h
                    )));
                }
            }
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(SensError::InvalidConfig(format!(
                "JPEG quality {} outside 1-100",
                self.jpeg_quality
            )));
        }
        Ok(())
    }
}

/// Per-frame output channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Depth,
    Color,
    Pose,
    Intrinsic,
}

/// Events emitted while an export runs.
#[derive(Debug, Clone)]
pub enum ExportEvent {
    /// `total` is the number of output indices this run will produce.
    Started { total: u64 },
    OutputWritten {
        channel: Channel,
        output_index: u64,
        total: u64,
        path: PathBuf,
    },
    OutputFailed {
        channel: Channel,
        output_index: u64,
        error: String,
    },
}

/// One output that could not be produced.
#[derive(Debug, Clone, serde::Serialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct OutputFailure {
    pub output_index: u64,
    /// Source frame, absent for calibration files.
    pub frame_index: Option<u64>,
    pub message: String,
}

/// Success/failure counts for one output channel.
#[derive(Debug, Clone, Default, serde::Serialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct ChannelTally {
    pub attempted: u64,
    pub succeeded: u64,
    pub failures: Vec<OutputFailure>,
}

impl ChannelTally {
    pub fn failed(&self) -> u64 {
        self.failures.len() as u64
    }

    fn record(
        &mut self,
        output_index: u64,
        frame_index: Option<u64>,
        result: Result<()>,
    ) -> std::result::Result<(), String> {
        self.attempted += 1;
        match result {
            Ok(()) => {
                self.succeeded += 1;
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                self.failures.push(OutputFailure {
                    output_index,
                    frame_index,
                    message: message.clone(),
                });
                Err(message)
            }
        }
    }
}

/// Outcome of an export run. Channels that were not requested are `None`.
#[derive(Debug, Clone, Default, serde::Serialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct ExportSummary {
    /// Number of output indices produced (`ceil(frames / stride)`).
    pub outputs: u64,
    pub depth: Option<ChannelTally>,
    pub color: Option<ChannelTally>,
    pub poses: Option<ChannelTally>,
    pub intrinsics: Option<ChannelTally>,
}

impl ExportSummary {
    pub fn tallies(&self) -> impl Iterator<Item = (Channel, &ChannelTally)> {
        [
            (Channel::Depth, self.depth.as_ref()),
            (Channel::Color, self.color.as_ref()),
            (Channel::Pose, self.poses.as_ref()),
            (Channel::Intrinsic, self.intrinsics.as_ref()),
        ]
        .into_iter()
        .filter_map(|(c, t)| t.map(|t| (c, t)))
    }

    pub fn total_failed(&self) -> u64 {
        self.tallies().map(|(_, t)| t.failed()).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.total_failed() == 0
    }
}

/// Export the requested channels from the reader's remaining frames.
pub fn export<R: Read>(
    reader: &mut SensReader<R>,
    dest: &Path,
    channels: &Channels,
    config: &ExportConfig,
) -> Result<ExportSummary> {
    export_with_progress(reader, dest, channels, config, &mut |_| {})
}

/// Export in a single forward pass, reporting progress to `progress`.
///
/// Outputs are numbered by output sequence, so with stride `S` the frames
/// `0, S, 2S, ...` are written as `0, 1, 2, ...`. Decode and write failures
/// are recorded in the summary and the run continues; a truncated source or
/// an unusable destination directory returns `Err`.
pub fn export_with_progress<R, F>(
    reader: &mut SensReader<R>,
    dest: &Path,
    channels: &Channels,
    config: &ExportConfig,
    progress: &mut F,
) -> Result<ExportSummary>
where
    R: Read,
    F: FnMut(ExportEvent),
{
    config.validate()?;
    let header = reader.header().clone();
    let stride = config.stride as u64;
    let total = reader.frames_remaining().div_ceil(stride);

    let mut summary = ExportSummary::default();

    if channels.intrinsics {
        summary.intrinsics = Some(write_intrinsics(&header, dest, progress)?);
    }

    let depth_dir = channel_dir(dest, DEPTH_DIR, channels.depth)?;
    let color_dir = channel_dir(dest, COLOR_DIR, channels.color)?;
    let pose_dir = channel_dir(dest, POSE_DIR, channels.poses)?;

    if !(channels.depth || channels.color || channels.poses) {
        return Ok(summary);
    }

    summary.depth = depth_dir.as_ref().map(|_| ChannelTally::default());
    summary.color = color_dir.as_ref().map(|_| ChannelTally::default());
    summary.poses = pose_dir.as_ref().map(|_| ChannelTally::default());

    log::info!(
        "Exporting {} of {} frames (stride {}) to {}",
        total,
        reader.frames_remaining(),
        stride,
        dest.display()
    );
    progress(ExportEvent::Started { total });

    let mut seen = 0u64;
    let mut output_index = 0u64;

    while let Some(frame) = reader.next_frame().inspect_err(|e| {
        log::error!("Export aborted after {} outputs: {}", output_index, e);
    })? {
        let selected = seen % stride == 0;
        seen += 1;
        if !selected {
            continue;
        }

        log::debug!("Frame {} -> output {}", frame.index, output_index);

        let jobs: [(Channel, Option<&Path>, Option<&mut ChannelTally>, FrameWriter); 3] = [
            (Channel::Depth, depth_dir.as_deref(), summary.depth.as_mut(), write_depth),
            (Channel::Color, color_dir.as_deref(), summary.color.as_mut(), write_color),
            (Channel::Pose, pose_dir.as_deref(), summary.poses.as_mut(), write_pose),
        ];
        for (channel, dir, tally, write) in jobs {
            let (Some(dir), Some(tally)) = (dir, tally) else {
                continue;
            };
            let path = output_path(dir, channel, output_index);
            let result = write(&frame, &header, &path, config);
            match tally.record(output_index, Some(frame.index), result) {
                Ok(()) => progress(ExportEvent::OutputWritten {
                    channel,
                    output_index,
                    total,
                    path,
                }),
                Err(error) => {
                    log::warn!("Skipping {:?} output {}: {}", channel, output_index, error);
                    progress(ExportEvent::OutputFailed {
                        channel,
                        output_index,
                        error,
                    });
                }
            }
        }

        output_index += 1;
    }

    summary.outputs = output_index;
    for (channel, tally) in summary.tallies() {
        log::info!(
            "{:?}: {} written, {} failed",
            channel,
            tally.succeeded,
            tally.failed()
        );
    }

    Ok(summary)
}

/// Export depth images only.
pub fn export_depth<R: Read>(
    reader: &mut SensReader<R>,
    dest: &Path,
    stride: u32,
    size: Option<(u32, u32)>,
) -> Result<ChannelTally> {
    let config = ExportConfig {
        stride,
        depth_size: size,
        ..ExportConfig::default()
    };
    let channels = Channels {
        depth: true,
        ..Channels::default()
    };
    Ok(export(reader, dest, &channels, &config)?
        .depth
        .unwrap_or_default())
}

/// Export color images only.
pub fn export_color<R: Read>(
    reader: &mut SensReader<R>,
    dest: &Path,
    stride: u32,
    size: Option<(u32, u32)>,
) -> Result<ChannelTally> {
    let config = ExportConfig {
        stride,
        color_size: size,
        ..ExportConfig::default()
    };
    let channels = Channels {
        color: true,
        ..Channels::default()
    };
    Ok(export(reader, dest, &channels, &config)?
        .color
        .unwrap_or_default())
}

/// Export camera-to-world poses only.
pub fn export_poses<R: Read>(
    reader: &mut SensReader<R>,
    dest: &Path,
    stride: u32,
) -> Result<ChannelTally> {
    let config = ExportConfig {
        stride,
        ..ExportConfig::default()
    };
    let channels = Channels {
        poses: true,
        ..Channels::default()
    };
    Ok(export(reader, dest, &channels, &config)?
        .poses
        .unwrap_or_default())
}

/// Write the four calibration matrices. Needs only the header.
pub fn export_intrinsics(header: &Header, dest: &Path) -> Result<ChannelTally> {
    write_intrinsics(header, dest, &mut |_| {})
}

fn write_intrinsics<F: FnMut(ExportEvent)>(
    header: &Header,
    dest: &Path,
    progress: &mut F,
) -> Result<ChannelTally> {
    let dir = dest.join(INTRINSIC_DIR);
    create_dir(&dir)?;

    let files = [
        ("intrinsic_color.txt", &header.color_calibration.intrinsic),
        ("extrinsic_color.txt", &header.color_calibration.extrinsic),
        ("intrinsic_depth.txt", &header.depth_calibration.intrinsic),
        ("extrinsic_depth.txt", &header.depth_calibration.extrinsic),
    ];

    let total = files.len() as u64;
    let mut tally = ChannelTally::default();
    for (i, (name, matrix)) in files.into_iter().enumerate() {
        let path = dir.join(name);
        let output_index = i as u64;
        match tally.record(output_index, None, write_matrix(&path, matrix)) {
            Ok(()) => progress(ExportEvent::OutputWritten {
                channel: Channel::Intrinsic,
                output_index,
                total,
                path,
            }),
            Err(error) => {
                log::warn!("Skipping {}: {}", name, error);
                progress(ExportEvent::OutputFailed {
                    channel: Channel::Intrinsic,
                    output_index,
                    error,
                });
            }
        }
    }
    Ok(tally)
}

fn channel_dir(dest: &Path, name: &str, enabled: bool) -> Result<Option<PathBuf>> {
    if !enabled {
        return Ok(None);
    }
    let dir = dest.join(name);
    create_dir(&dir)?;
    Ok(Some(dir))
}

fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|source| SensError::IoFailure {
        path: dir.to_path_buf(),
        source,
    })
}

pub fn output_path(dir: &Path, channel: Channel, output_index: u64) -> PathBuf {
    let ext = match channel {
        Channel::Depth => DEPTH_EXT,
        Channel::Color => COLOR_EXT,
        Channel::Pose | Channel::Intrinsic => "txt",
    };
    dir.join(format!("{}.{}", output_index, ext))
}

/// Writes one per-frame output file.
type FrameWriter = fn(&FrameRecord, &Header, &Path, &ExportConfig) -> Result<()>;

fn write_depth(
    frame: &FrameRecord,
    header: &Header,
    path: &Path,
    config: &ExportConfig,
) -> Result<()> {
    let mut depth = frame.decode_depth(header)?;
    if let Some((w, h)) = config.depth_size {
        // Nearest keeps every output value an actual measured depth.
        depth = imageops::resize(&depth, w, h, FilterType::Nearest);
    }
    depth
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| image_error(path, e))
}

fn write_color(
    frame: &FrameRecord,
    header: &Header,
    path: &Path,
    config: &ExportConfig,
) -> Result<()> {
    let mut color = frame.decode_color(header)?;
    if let Some((w, h)) = config.color_size {
        color = imageops::resize(&color, w, h, FilterType::Triangle);
    }

    let io_failure = |source| SensError::IoFailure {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = BufWriter::new(File::create(path).map_err(io_failure)?);
    JpegEncoder::new_with_quality(&mut writer, config.jpeg_quality)
        .encode_image(&color)
        .map_err(|e| image_error(path, e))?;
    writer.flush().map_err(io_failure)
}

fn write_pose(frame: &FrameRecord, _: &Header, path: &Path, _: &ExportConfig) -> Result<()> {
    write_matrix(path, &frame.camera_to_world)
}

fn image_error(path: &Path, e: ImageError) -> SensError {
    match e {
        ImageError::IoError(source) => SensError::IoFailure {
            path: path.to_path_buf(),
            source,
        },
        source => SensError::ImageWrite {
            path: path.to_path_buf(),
            source,
        },
    }
}

/// Format a matrix as four lines of four space-separated values. Each value
/// uses the shortest text that parses back to the same `f32`.
pub fn format_matrix(m: &Matrix4) -> String {
    let mut out = String::new();
    for row in m {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    }
    out
}

fn write_matrix(path: &Path, m: &Matrix4) -> Result<()> {
    fs::write(path, format_matrix(m)).map_err(|source| SensError::IoFailure {
        path: path.to_path_buf(),
        source,
    })
}
