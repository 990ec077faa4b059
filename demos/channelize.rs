//! Demo: channelize a synthesized tone
//!
//! Feeds a complex tone through the overlap-save channelizer and fans the
//! spectra out to several sinks, each logging the strongest bin per frame.
//!
//! Usage:
//!   cargo run --release --example channelize -- \
//!       --decimation 4 --transition-bw 0.1 \
//!       --consumers 3 --tone 0.125 -n 50

use clap::Parser;
use chanpipe::{Block, Channelizer, FrameSink, Pipeline, Sample, SampleSource, peak_bin};
use std::f32::consts::PI;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Decimation factor
    #[arg(short, long, default_value = "4")]
    decimation: i32,

    /// Transition bandwidth as a fraction of the output rate, in (0, 1)
    #[arg(short, long, default_value = "0.1")]
    transition_bw: f32,

    /// Number of spectrum consumers
    #[arg(short, long, default_value = "2")]
    consumers: usize,

    /// Tone frequency in cycles per sample, in [-0.5, 0.5)
    #[arg(long, default_value = "0.125", allow_hyphen_values = true)]
    tone: f32,

    /// Number of frames to produce
    #[arg(short, long, default_value = "20")]
    n: usize,

    /// Disable the blocked-operation watchdog
    #[arg(long)]
    no_watchdog: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let fft = Channelizer::create(args.decimation, args.transition_bw)?;
    let frame_len = fft.max_transfer_unit().unwrap_or(0);
    let input_size = fft.min_read_unit().unwrap_or(1);

    // Exactly enough samples for the requested number of frames
    let total = input_size * args.n;
    let tone = args.tone;
    let chunks = (0..total).step_by(input_size).map(move |start| {
        (start..(start + input_size).min(total))
            .map(|n| Sample::from_polar(1.0, 2.0 * PI * tone * n as f32))
            .collect::<Vec<_>>()
    });

    let mut pipeline = Pipeline::new().with_watchdog(!args.no_watchdog);
    pipeline.add_block(Block::new(SampleSource::new(chunks, input_size)))?;
    pipeline.add_block(fft)?;

    let mut names = Vec::with_capacity(args.consumers);
    for k in 0..args.consumers {
        let name = format!("sink{}", k);
        let mut frames = 0usize;
        let label = name.clone();
        let sink = FrameSink::new(move |spectrum: &[Sample]| {
            frames += 1;
            if let Some(bin) = peak_bin(spectrum) {
                let offset = bin as isize - (spectrum.len() / 2) as isize;
                info!(
                    "[{}] Frame {}: peak bin {} ({:+.4} cycles/sample)",
                    label,
                    frames,
                    bin,
                    offset as f32 / spectrum.len() as f32
                );
            }
        });
        pipeline.add_block(Block::new(sink).with_name(name.clone()))?;
        names.push(name);
    }

    pipeline.connect_one_to_one("source", "fft")?;
    let targets: Vec<&str> = names.iter().map(String::as_str).collect();
    pipeline.connect_one_to_many("fft", &targets)?;

    info!(
        "Channelizing {} samples into frames of {} bins for {} consumer(s)",
        total, frame_len, args.consumers
    );
    let mut scheduler = pipeline.build()?;
    scheduler.wait();

    Ok(())
}
