// Multi-channel capture example
//
// This example triggers a fixed number of frames on a SCPI oscilloscope
// attached to a serial port and prints every captured frame as a table.

use clap::Parser;
use scpi_block_acq::{
    Acquisition, AcquisitionConfig, AcquisitionState, ChannelDescriptor, FrameCollector,
    SerialScpi,
};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "capture")]
#[command(version = "1.0")]
#[command(about = "Capture waveform frames from a SCPI oscilloscope")]
#[command(long_about = "Trigger captures on a SCPI oscilloscope over a serial link, read back every enabled analog channel and digital pod as definite-length blocks and print each frame.")]
struct Args {
    /// Serial port the instrument is attached to
    port: String,

    #[arg(short, long, default_value_t = scpi_block_acq::serial_scpi::DEFAULT_BAUD_RATE, help = "Serial baud rate")]
    baud: u32,

    #[arg(short, long, value_delimiter = ',', default_value = "CH1", help = "Comma separated channels, e.g. CH1,CH2,D0")]
    channels: Vec<ChannelDescriptor>,

    #[arg(short, long, default_value_t = 1, help = "Number of frames to capture (0 runs until interrupted)")]
    frames: u64,

    #[arg(long, default_value_t = 0, help = "Payload chunk size in bytes (0 uses the default)")]
    chunk_size: usize,

    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    println!("SCPI Block Capture");
    println!("==================");
    println!("Port: {} @ {} baud", args.port, args.baud);
    let names: Vec<String> = args.channels.iter().map(ToString::to_string).collect();
    println!("Channels: {}", names.join(", "));
    println!();

    let mut scope = SerialScpi::open(&args.port, args.baud)?;
    match scope.identify() {
        Ok(idn) => println!("✓ Connected to {}", idn),
        Err(e) => eprintln!("Instrument did not identify itself: {}", e),
    }

    let config = AcquisitionConfig::default()
        .with_frame_limit(args.frames)
        .with_chunk_size(args.chunk_size);
    let mut acquisition = Acquisition::new(&args.channels, config)?;
    let mut collector = FrameCollector::new();

    let start_time = Instant::now();
    acquisition.start(&mut scope, &mut collector)?;

    while acquisition.state() != AcquisitionState::Idle {
        acquisition.on_readable(&mut scope, &mut collector)?;

        for frame in collector.take_frames() {
            println!(
                "[{:.3}s] frame {}",
                start_time.elapsed().as_secs_f64(),
                acquisition.frames_completed()
            );
            match frame.to_dataframe() {
                Ok(df) => println!("{}", df),
                Err(e) => eprintln!("Could not tabulate frame: {}", e),
            }
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    println!(
        "Captured {} frame(s) in {:.3}s",
        acquisition.frames_completed(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}
