//! Cue generator
//!
//! Writes the steady sine tone the `term` policy is tuned to pick up.

use anyhow::Context;
use clap::Parser;
use scene_trigger::{init_logging, write_sine_wav};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "make-sine")]
#[command(about = "Write a 16-bit mono sine WAV cue", long_about = None)]
struct Cli {
    /// Output file path
    #[arg(short, long, default_value = "14000Hz_sine.wav")]
    output: PathBuf,

    /// Tone frequency (Hz)
    #[arg(short, long, default_value_t = 14_000.0)]
    frequency: f64,

    /// Length (seconds)
    #[arg(short, long, default_value_t = 30.0)]
    duration: f64,

    /// Sample rate (Hz)
    #[arg(short = 'r', long, default_value_t = 48_000)]
    sample_rate: u32,

    /// Peak amplitude
    #[arg(short, long, default_value_t = i16::MAX)]
    amplitude: i16,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging();

    anyhow::ensure!(cli.sample_rate > 0, "sample rate must be greater than 0");
    anyhow::ensure!(
        cli.duration.is_finite() && cli.duration > 0.0,
        "duration must be a positive number of seconds"
    );

    write_sine_wav(
        &cli.output,
        cli.frequency,
        cli.duration,
        cli.sample_rate,
        cli.amplitude,
    )
    .with_context(|| format!("failed to write {}", cli.output.display()))?;

    println!(
        "Wrote {:.1}s of {} Hz to {}",
        cli.duration,
        cli.frequency,
        cli.output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_cue() {
        let cli = Cli::try_parse_from(["make-sine"]).unwrap();

        assert_eq!(cli.output, PathBuf::from("14000Hz_sine.wav"));
        assert_eq!(cli.frequency, 14_000.0);
        assert_eq!(cli.duration, 30.0);
        assert_eq!(cli.sample_rate, 48_000);
        assert_eq!(cli.amplitude, i16::MAX);
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "make-sine", "-o", "cue.wav", "-f", "1000", "-d", "2.5", "-r", "16000", "-a", "8000",
        ])
        .unwrap();

        assert_eq!(cli.output, PathBuf::from("cue.wav"));
        assert_eq!(cli.frequency, 1000.0);
        assert_eq!(cli.duration, 2.5);
        assert_eq!(cli.sample_rate, 16_000);
        assert_eq!(cli.amplitude, 8000);
    }

    #[test]
    fn test_rejects_positional_arguments() {
        assert!(Cli::try_parse_from(["make-sine", "term"]).is_err());
    }
}
