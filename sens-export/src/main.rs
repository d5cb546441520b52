use std::path::{Path, PathBuf};

use clap::Parser;

use sens::export::{self, Channel, Channels, ExportConfig, ExportEvent, ExportSummary};
use sens::header::ReaderConfig;

/// SENS Export Tool: writes depth, color, pose and calibration files from a .sens capture.
#[derive(Parser)]
#[command(name = "sens-export")]
struct Args {
    /// Input .sens (or .sens.gz) file
    #[arg(long = "filename", required_unless_present = "version")]
    filename: Option<PathBuf>,

    /// Output directory; depth/, color/, pose/ and intrinsic/ are created inside it
    #[arg(long = "output-path", default_value = "./")]
    output_path: PathBuf,

    /// Export 16-bit PNG depth images
    #[arg(long = "export-depth-images")]
    export_depth_images: bool,

    /// Export JPEG color images
    #[arg(long = "export-color-images")]
    export_color_images: bool,

    /// Export camera-to-world poses as text
    #[arg(long = "export-poses")]
    export_poses: bool,

    /// Export color/depth intrinsic and extrinsic matrices as text
    #[arg(long = "export-intrinsics")]
    export_intrinsics: bool,

    /// Export every Nth frame
    #[arg(long = "frame-skip", default_value_t = 1)]
    frame_skip: u32,

    /// Resize depth images to WIDTHxHEIGHT (nearest neighbour)
    #[arg(long = "depth-size", value_parser = parse_size)]
    depth_size: Option<(u32, u32)>,

    /// Resize color images to WIDTHxHEIGHT
    #[arg(long = "color-size", value_parser = parse_size)]
    color_size: Option<(u32, u32)>,

    /// JPEG quality for color images (1-100)
    #[arg(long = "jpeg-quality", default_value_t = 95)]
    jpeg_quality: u8,

    /// Accept containers whose version differs from the supported one
    #[arg(long)]
    lenient: bool,

    /// Print the export summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Display version and quit
    #[arg(long = "version")]
    version: bool,
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let w = w.trim().parse().map_err(|e| format!("bad width '{}': {}", w, e))?;
    let h = h.trim().parse().map_err(|e| format!("bad height '{}': {}", h, e))?;
    Ok((w, h))
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    if args.version {
        sens::version::print_cli_version_banner(
            "SENS Export Tool",
            env!("CARGO_PKG_VERSION"),
            env!("RELEASE_VERSION"),
            env!("GIT_COMMIT"),
        );
        return Ok(());
    }

    let channels = Channels {
        depth: args.export_depth_images,
        color: args.export_color_images,
        poses: args.export_poses,
        intrinsics: args.export_intrinsics,
    };
    if !channels.any() {
        return Err("Nothing to do: enable at least one of --export-depth-images, \
                    --export-color-images, --export-poses, --export-intrinsics"
            .into());
    }

    let config = ExportConfig {
        stride: args.frame_skip,
        depth_size: args.depth_size,
        color_size: args.color_size,
        jpeg_quality: args.jpeg_quality,
    };
    config.validate()?;

    let filename = args.filename.as_deref().ok_or("--filename is required")?;
    let summary = export_file(filename, &args.output_path, &channels, &config, args.lenient)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    if !summary.is_complete() {
        log::error!("");
        log::error!("EXPORT COMPLETED WITH ERRORS:");
        for (channel, tally) in summary.tallies() {
            for f in &tally.failures {
                log::error!("  {:?} output {}: {}", channel, f.output_index, f.message);
            }
        }
        return Err(format!("{} output(s) failed", summary.total_failed()).into());
    }

    Ok(())
}

fn export_file(
    path: &Path,
    output_path: &Path,
    channels: &Channels,
    config: &ExportConfig,
    lenient: bool,
) -> Result<ExportSummary, Box<dyn std::error::Error>> {
    log::info!("Loading {}", path.display());
    let reader_config = ReaderConfig {
        strict_version: !lenient,
    };
    let mut reader = sens::reader::open_sens_with(path, &reader_config)
        .map_err(|e| format!("Error opening {}: {}", path.display(), e))?;

    let header = reader.header();
    log::info!("\tSensor: {}", header.sensor_name);
    log::info!("\tFrames: {}", header.frame_count);
    log::info!(
        "\tColor:  {}x{} ({})",
        header.color_width,
        header.color_height,
        header.color_codec.name()
    );
    log::info!(
        "\tDepth:  {}x{} ({}, shift {})",
        header.depth_width,
        header.depth_height,
        header.depth_codec.name(),
        header.depth_shift
    );

    // Log roughly every 10% of outputs, once per output index
    let mut step = 1;
    let mut last_logged = None;
    let mut progress = |event: ExportEvent| match event {
        ExportEvent::Started { total } => {
            step = (total / 10).max(1);
        }
        ExportEvent::OutputWritten {
            channel,
            output_index,
            total,
            ..
        } if channel != Channel::Intrinsic && last_logged != Some(output_index) => {
            if output_index % step == 0 || output_index + 1 == total {
                last_logged = Some(output_index);
                log::info!("Exported {}/{}", output_index + 1, total);
            }
        }
        _ => {}
    };

    let summary = export::export_with_progress(
        &mut reader,
        output_path,
        channels,
        config,
        &mut progress,
    )?;
    Ok(summary)
}
