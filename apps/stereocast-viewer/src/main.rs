//! Stereocast Headless Stereo Viewer
//!
//! Raycasts a synthetic CT head phantom for both eyes with the chunked tile
//! scheduler and writes the composited mirror output to PNG files.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p stereocast-viewer -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! ### Screenshot options
//! - `-S, --screenshot`: Enable screenshot capture mode
//! - `-o, --output <PATTERN>`: Output path pattern (use `{}` for frame number)
//! - `-f, --frames <FRAMES>`: Frame indices to capture (e.g., "0,10,20" or "0-5")
//! - `--exit-after`: Exit after capturing all specified frames
//!
//! ### Render options
//! - `--size <W>x<H>`: Per-eye viewport (default: 800x800)
//! - `--chunk <W>x<H>`: Tile size (default: 96x96)
//! - `--budget <N>`: Tiles per eye per frame (default: 8)
//! - `--tile-time <MS>`: Adapt the budget to this much tile time per frame
//! - `--volume <N>`: Phantom edge length in voxels (default: 128)
//! - `--run-frames <N>`: Frames to run (default: 240)
//! - `--hmd`: Simulate an attached HMD
//! - `--auto-rotate`: Start with auto-rotation on
//! - `--input <SCRIPT>`: Scripted input, e.g. "0:drag+,1:move=40,0,2:drag-"
//!
//! ### Other
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;
mod input;

use tracing_subscriber::EnvFilter;

use crate::app::{Viewer, ViewerArgs};

fn main() -> anyhow::Result<()> {
    // Check for help flag before doing any work
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut viewer = Viewer::new(ViewerArgs::parse(&args)?)?;
    viewer.run()
}

fn print_help() {
    eprintln!(
        "Stereocast Headless Stereo Viewer

USAGE:
    cargo run -p stereocast-viewer -- [OPTIONS]

SCREENSHOT OPTIONS:
    -S, --screenshot        Enable screenshot capture mode
    -o, --output <PATTERN>  Output path pattern (use {{}} for frame number)
                            Default: stereo_{{}}.png
    -f, --frames <FRAMES>   Frame indices to capture
                            Examples: \"0\" \"0,10,20\" \"0-5\" \"0,5-10,20\"
                            Default: 0
    --exit-after            Exit after capturing all specified frames

RENDER OPTIONS:
    --size <W>x<H>          Per-eye viewport (default: 800x800)
    --chunk <W>x<H>         Tile size (default: 96x96)
    --budget <N>            Tiles per eye per frame (default: 8)
    --tile-time <MS>        Adapt the tile budget to this much tile time per
                            eye and frame, never above --budget
    --volume <N>            Phantom edge length in voxels (default: 128)
    --run-frames <N>        Frames to run (default: 240)
    --hmd                   Simulate an attached HMD: eyes are submitted when
                            their sweep completes, the mirror updates every 0.1 s
    --auto-rotate           Start with auto-rotation on
    --input <SCRIPT>        Scripted input events, <frame>:<event> separated
                            by commas. Events: w a s d drag+ drag-
                            move=<dx>,<dy> auto view borders occlusion

OTHER:
    -h, --help              Print this help message

EXAMPLES:
    # Render a few sweeps at the default settings
    cargo run -p stereocast-viewer

    # Capture a turntable orbit and exit
    cargo run -p stereocast-viewer -- --auto-rotate -S -f 0,60,120 -o orbit_{{}}.png --exit-after

    # Small tiles to watch the sweep progress
    cargo run -p stereocast-viewer -- --chunk 32x32 --budget 4 -S -f 0-20 -o sweep/{{}}.png

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
