use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use flirone::{FlirCamera, ThermalCalibration};

/// Stream frames from a FLIR One Pro LT and print per-frame statistics.
#[derive(Debug, Parser)]
#[command(name = "flirdump")]
#[command(about = "dump thermal frames from a FLIR One Pro LT")]
struct Args {
    /// terminate after reception of <count> frames
    #[arg(short = 'n', value_name = "count")]
    count: Option<u64>,

    /// per-frame read timeout in milliseconds
    #[arg(short = 'T', value_name = "msecs", default_value_t = 1000)]
    timeout_ms: u64,

    /// calibration JSON file (PlanckR1/PlanckB/PlanckF/PlanckO/Emissivity/
    /// ReflectedApparentTemperature)
    #[arg(short = 'c', value_name = "path")]
    calibration: Option<PathBuf>,

    /// write each frame's embedded JPEG into this directory
    #[arg(long = "save-jpeg", value_name = "dir")]
    save_jpeg: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let calibration = match &args.calibration {
        Some(path) => ThermalCalibration::from_json_path(path)
            .with_context(|| format!("loading calibration from {}", path.display()))?,
        None => {
            log::info!("No calibration file given, using Lepton 3.5 defaults");
            ThermalCalibration::default()
        }
    };

    if let Some(dir) = &args.save_jpeg {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))?;
    }

    let mut camera = FlirCamera::new(calibration);
    if let Err(e) = camera.open() {
        eprintln!("Failed to open camera: {e}");
        process::exit(1);
    }

    let timeout = Duration::from_millis(args.timeout_ms);
    let mut seq: u64 = 0;

    while running.load(Ordering::SeqCst) {
        let frame = match camera.read_frame(timeout) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("Read error: {e}");
                break;
            }
        };

        println!(
            "frame {seq}: min={:7.2}C@({:2},{:2})  max={:7.2}C@({:2},{:2})  mean={:7.2}C  jpeg={}B status={}B",
            frame.min_c,
            frame.min_xy.0,
            frame.min_xy.1,
            frame.max_c,
            frame.max_xy.0,
            frame.max_xy.1,
            frame.mean_c,
            frame.visible_jpeg.as_ref().map_or(0, Vec::len),
            frame.status_data.as_ref().map_or(0, Vec::len),
        );

        if let (Some(dir), Some(jpeg)) = (&args.save_jpeg, &frame.visible_jpeg) {
            let path = dir.join(format!("frame_{seq:06}.jpg"));
            fs::write(&path, jpeg).with_context(|| format!("writing {}", path.display()))?;
        }

        seq += 1;
        if args.count.is_some_and(|count| seq >= count) {
            break;
        }
    }

    camera.close();
    Ok(())
}
