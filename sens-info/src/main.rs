use std::path::Path;

use clap::Parser;
use sens::frame::FrameInfo;
use sens::header::{Header, Matrix4, ReaderConfig};

#[derive(Parser)]
#[command(name = "sens-info", about = "Parse and display .sens file structure")]
struct Args {
    /// Input .sens file
    #[arg(short = 'f', long = "file")]
    file: Option<String>,

    /// Input .sens file (positional)
    #[arg(conflicts_with = "file", required_unless_present_any = ["file", "schema", "version"])]
    input: Option<String>,

    /// Only print the header, without scanning frames
    #[arg(long)]
    header_only: bool,

    /// Accept containers whose version differs from the supported one
    #[arg(long)]
    lenient: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Print JSON schema for the output format and exit
    #[arg(long)]
    schema: bool,

    /// Display version and quit
    #[arg(long)]
    version: bool,
}

/// JSON output: the header plus per-frame metadata.
#[derive(serde::Serialize, schemars::JsonSchema)]
struct SensInfo {
    header: Header,
    frames: Vec<FrameInfo>,
    trailing_bytes: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Reset SIGPIPE to default so piped output (e.g. head/tail) exits cleanly
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    let args = Args::parse();

    if args.version {
        sens::version::print_cli_version_banner(
            "SENS Info Tool",
            env!("CARGO_PKG_VERSION"),
            env!("RELEASE_VERSION"),
            env!("GIT_COMMIT"),
        );
        return Ok(());
    }

    if args.schema {
        let schema = schemars::schema_for!(SensInfo);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    let file = args
        .file
        .or(args.input)
        .ok_or("file argument required")?;
    let config = ReaderConfig {
        strict_version: !args.lenient,
    };
    let mut reader = sens::reader::open_sens_with(Path::new(&file), &config)?;
    let header = reader.header().clone();

    if args.header_only {
        if args.json {
            println!("{}", serde_json::to_string(&header)?);
        } else {
            print_header(&header);
        }
        return Ok(());
    }

    if args.json {
        let frames = reader
            .by_ref()
            .map(|f| f.map(|f| f.info()))
            .collect::<sens::Result<Vec<_>>>()?;
        let trailing_bytes = reader.finish()?;
        let info = SensInfo {
            header,
            frames,
            trailing_bytes,
        };
        println!("{}", serde_json::to_string(&info)?);
        return Ok(());
    }

    print_header(&header);
    println!();
    println!(
        "{:>6} {:>12} {:>16} {:>16} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "FRAME", "OFFSET", "TS_COLOR", "TS_DEPTH", "COLOR", "DEPTH", "TX", "TY", "TZ"
    );

    for frame in reader.by_ref() {
        let frame = frame?;
        let m = &frame.camera_to_world;
        println!(
            "{:>6} {:>12} {:>16} {:>16} {:>10} {:>10} {:>10.4} {:>10.4} {:>10.4}",
            frame.index,
            frame.file_offset,
            frame.timestamp_color,
            frame.timestamp_depth,
            frame.color_payload.len(),
            frame.depth_payload.len(),
            m[0][3],
            m[1][3],
            m[2][3],
        );
    }

    let trailing = reader.finish()?;
    if trailing > 0 {
        println!("{} trailing bytes after last frame", trailing);
    }

    Ok(())
}

fn print_header(h: &Header) {
    println!("Version:      {}", h.version);
    println!("Sensor:       {}", h.sensor_name);
    println!(
        "Color:        {}x{} ({})",
        h.color_width,
        h.color_height,
        h.color_codec.name()
    );
    println!(
        "Depth:        {}x{} ({}, shift {})",
        h.depth_width,
        h.depth_height,
        h.depth_codec.name(),
        h.depth_shift
    );
    println!("Frames:       {}", h.frame_count);
    print_matrix("Color intrinsic", &h.color_calibration.intrinsic);
    print_matrix("Color extrinsic", &h.color_calibration.extrinsic);
    print_matrix("Depth intrinsic", &h.depth_calibration.intrinsic);
    print_matrix("Depth extrinsic", &h.depth_calibration.extrinsic);
}

fn print_matrix(label: &str, m: &Matrix4) {
    println!("{}:", label);
    for row in m {
        println!(
            "\t{:>12.4} {:>12.4} {:>12.4} {:>12.4}",
            row[0], row[1], row[2], row[3]
        );
    }
}
