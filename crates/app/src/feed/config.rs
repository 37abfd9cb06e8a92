//! Configuration parsing for the feed binary.
//!
//! This module owns translation of CLI arguments into a `FeedConfig` struct
//! which downstream stages use without re-parsing flags.

use std::net::SocketAddr;

use anyhow::{Result, bail};
use clap::Parser;

/// CLI arguments accepted by `frameview`.
#[derive(Debug, Parser)]
#[command(
    name = "frameview",
    about = "Serves the most recent camera frame to polling HTTP viewers"
)]
pub struct FeedCliArgs {
    /// Address and port the HTTP server binds to.
    #[arg(long = "bind", value_name = "ADDR:PORT", default_value = "0.0.0.0:8080")]
    pub bind: String,
    /// Capture width in pixels.
    #[arg(long = "width", value_name = "PX", default_value_t = 640)]
    pub width: u32,
    /// Capture height in pixels.
    #[arg(long = "height", value_name = "PX", default_value_t = 480)]
    pub height: u32,
    /// Frame rate of the test-pattern capture source.
    #[arg(long = "fps", value_name = "FPS", default_value_t = 30)]
    pub fps: u32,
    /// JPEG quality used by the encoder (1-100).
    #[arg(long = "jpeg-quality", value_name = "QUALITY", default_value_t = 85)]
    pub jpeg_quality: u8,
    /// Serve single-channel grayscale frames instead of color.
    #[arg(long = "grayscale", action = clap::ArgAction::SetTrue)]
    pub grayscale: bool,
    /// Consecutive failed capture cycles tolerated before the pipeline stops.
    #[arg(long = "max-failures", value_name = "N", default_value_t = 30)]
    pub max_failures: u32,
    /// Emit verbose logging (capture heartbeats, skipped cycles).
    #[arg(long = "verbose", action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
}

/// Canonical configuration shared by every stage of the feed.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    pub bind: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub jpeg_quality: u8,
    pub grayscale: bool,
    pub max_failures: u32,
    pub verbose: bool,
}

impl TryFrom<FeedCliArgs> for FeedConfig {
    type Error = anyhow::Error;

    fn try_from(args: FeedCliArgs) -> Result<Self> {
        if args.width == 0 || args.height == 0 {
            bail!("Capture width and height must be positive integers");
        }
        if !(1..=240).contains(&args.fps) {
            bail!("--fps must be between 1 and 240");
        }
        if !(1..=100).contains(&args.jpeg_quality) {
            bail!("--jpeg-quality must be an integer between 1 and 100");
        }
        if args.max_failures == 0 {
            bail!("--max-failures must be at least 1");
        }
        if args.bind.parse::<SocketAddr>().is_err() {
            bail!("--bind must be an ADDR:PORT socket address");
        }

        Ok(Self {
            bind: args.bind,
            width: args.width,
            height: args.height,
            fps: args.fps,
            jpeg_quality: args.jpeg_quality,
            grayscale: args.grayscale,
            max_failures: args.max_failures,
            verbose: args.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(argv: &[&str]) -> FeedCliArgs {
        FeedCliArgs::try_parse_from(argv).expect("parse CLI args")
    }

    #[test]
    fn defaults_produce_a_valid_config() {
        let config = FeedConfig::try_from(args(&["frameview"])).expect("valid defaults");
        assert_eq!(config.bind, "0.0.0.0:8080");
        assert_eq!((config.width, config.height), (640, 480));
        assert_eq!(config.fps, 30);
        assert_eq!(config.jpeg_quality, 85);
        assert!(!config.grayscale);
        assert_eq!(config.max_failures, 30);
    }

    #[test]
    fn rejects_out_of_range_quality() {
        let cli = args(&["frameview", "--jpeg-quality", "0"]);
        assert!(FeedConfig::try_from(cli).is_err());
    }

    #[test]
    fn rejects_zero_geometry() {
        let cli = args(&["frameview", "--width", "0"]);
        assert!(FeedConfig::try_from(cli).is_err());
    }

    #[test]
    fn rejects_unparseable_bind_address() {
        let cli = args(&["frameview", "--bind", "not-an-address"]);
        assert!(FeedConfig::try_from(cli).is_err());
    }

    #[test]
    fn grayscale_flag_is_carried_through() {
        let config =
            FeedConfig::try_from(args(&["frameview", "--grayscale"])).expect("valid config");
        assert!(config.grayscale);
    }
}
