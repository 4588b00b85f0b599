//! Reel command-line transcoder.
//!
//! ```bash
//! reel input.mp4 out.mov --start 2 --end 5
//! reel input.mp4 out.mov --quick
//! reel hdr.mov out.mov --tonemap --no-ten-bit --height 1080 --fps 30
//! reel input.mp4 --probe
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use reel_media::{MediaHandle, RenditionProfile, SidecarBackend};
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Width of the progress bar in cells.
const BAR_WIDTH: usize = 40;

#[derive(Parser, Debug)]
#[command(
    name = "reel",
    version,
    about = "Trim and re-encode a video into an HEVC QuickTime file",
    arg_required_else_help = true
)]
struct Cli {
    /// Source media file.
    input: PathBuf,

    /// Output .mov path.
    #[arg(required_unless_present = "probe")]
    output: Option<PathBuf>,

    /// Fast rendition on the hardware encoder.
    #[arg(long, conflicts_with_all = ["profile", "tonemap", "ten_bit", "no_ten_bit"])]
    quick: bool,

    /// Window start in seconds.
    #[arg(long, default_value_t = 0.0)]
    start: f64,

    /// Window end in seconds (0 = end of file).
    #[arg(long, default_value_t = 0.0)]
    end: f64,

    /// Tone-map to SDR even for SDR sources.
    #[arg(long)]
    tonemap: bool,

    /// Encode 10-bit Main10 (the default).
    #[arg(long, overrides_with = "no_ten_bit")]
    ten_bit: bool,

    /// Encode 8-bit Main instead of 10-bit.
    #[arg(long = "no-ten-bit", overrides_with = "ten_bit")]
    no_ten_bit: bool,

    /// Target height; width follows the aspect ratio.
    #[arg(long)]
    height: Option<u32>,

    /// Target frame rate; frames are dropped, never duplicated.
    #[arg(long)]
    fps: Option<f64>,

    /// JSON rendition profile.
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Print the probed stream as JSON and exit.
    #[arg(long)]
    probe: bool,
}

impl Cli {
    fn rendition(&self) -> Result<RenditionProfile> {
        let mut profile = if let Some(path) = &self.profile {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read profile {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("invalid profile {}", path.display()))?
        } else if self.quick {
            RenditionProfile::prepare()
        } else if self.tonemap || self.no_ten_bit {
            RenditionProfile::export_ext(self.tonemap, !self.no_ten_bit)
        } else {
            RenditionProfile::export()
        };
        if let Some(height) = self.height {
            profile.target_height = height;
        }
        if let Some(fps) = self.fps {
            profile.target_fps = fps;
        }
        Ok(profile)
    }
}

fn draw_progress(fraction: f64) {
    let filled = ((fraction.clamp(0.0, 1.0)) * BAR_WIDTH as f64).round() as usize;
    let mut err = std::io::stderr();
    // Progress output is best effort.
    let _ = write!(
        err,
        "\r[{}{}] {:5.1}%",
        "#".repeat(filled),
        " ".repeat(BAR_WIDTH - filled),
        fraction * 100.0
    );
    let _ = err.flush();
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut handle = MediaHandle::open_with(SidecarBackend::new(), &cli.input)
        .with_context(|| format!("cannot open {}", cli.input.display()))?;

    if cli.probe {
        let asset = handle.asset().context("media handle is closed")?;
        println!("{}", serde_json::to_string_pretty(asset.info())?);
        return Ok(());
    }

    println!(
        "{}: {} {}x{}, {:.3}s",
        cli.input.display(),
        handle.codec_name(),
        handle.width(),
        handle.height(),
        handle.duration()
    );

    let profile = cli.rendition()?;
    let output = cli.output.clone().context("missing output path")?;
    let request = profile.request(&output, cli.start, cli.end);
    info!("Rendering {} with profile {}", output.display(), profile.name);

    let show_bar = std::io::stderr().is_terminal();
    let mut progress = |p: f64| {
        if show_bar {
            draw_progress(p);
        }
    };
    let result = handle.transcode(&request, Some(&mut progress));
    if show_bar {
        eprintln!();
    }
    let summary = result.with_context(|| format!("transcode to {} failed", output.display()))?;

    println!(
        "{}: {} frames encoded ({} decoded, {} skipped), plan {}",
        output.display(),
        summary.frames_encoded,
        summary.frames_decoded,
        summary.frames_skipped,
        summary.plan.map_or("none", |p| p.name())
    );
    handle.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_output_required_without_probe() {
        assert!(Cli::try_parse_from(["reel", "in.mp4"]).is_err());
        let cli = Cli::try_parse_from(["reel", "in.mp4", "--probe"]).unwrap();
        assert!(cli.output.is_none());
    }

    #[test]
    fn test_rendition_selection() {
        let cli = Cli::try_parse_from(["reel", "in.mp4", "out.mov", "--quick"]).unwrap();
        assert_eq!(cli.rendition().unwrap().name, "prepare");

        let cli = Cli::try_parse_from([
            "reel", "in.mp4", "out.mov", "--tonemap", "--height", "720", "--fps", "30",
        ])
        .unwrap();
        let profile = cli.rendition().unwrap();
        assert_eq!(profile.name, "export-ext");
        assert!(profile.tonemap);
        assert!(profile.ten_bit);
        assert_eq!(profile.target_height, 720);
        assert_eq!(profile.target_fps, 30.0);

        let cli = Cli::try_parse_from(["reel", "in.mp4", "out.mov"]).unwrap();
        let profile = cli.rendition().unwrap();
        assert_eq!(profile.name, "export");
        assert!(profile.ten_bit);
    }

    #[test]
    fn test_eight_bit_is_opt_in() {
        let cli =
            Cli::try_parse_from(["reel", "in.mp4", "out.mov", "--tonemap", "--no-ten-bit"]).unwrap();
        let profile = cli.rendition().unwrap();
        assert!(profile.tonemap);
        assert!(!profile.ten_bit);

        let cli = Cli::try_parse_from(["reel", "in.mp4", "out.mov", "--no-ten-bit"]).unwrap();
        let profile = cli.rendition().unwrap();
        assert_eq!(profile.name, "export-ext");
        assert!(!profile.tonemap);
        assert!(!profile.ten_bit);

        // last flag wins
        let cli =
            Cli::try_parse_from(["reel", "in.mp4", "out.mov", "--no-ten-bit", "--ten-bit"]).unwrap();
        assert!(cli.rendition().unwrap().ten_bit);
    }

    #[test]
    fn test_quick_conflicts() {
        for flag in ["--tonemap", "--ten-bit", "--no-ten-bit"] {
            assert!(Cli::try_parse_from(["reel", "in.mp4", "o.mov", "--quick", flag]).is_err());
        }
        assert!(
            Cli::try_parse_from(["reel", "in.mp4", "o.mov", "--quick", "--profile", "p.json"])
                .is_err()
        );
    }
}
