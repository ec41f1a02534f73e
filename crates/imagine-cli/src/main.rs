use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod client;
mod run;

#[derive(Parser)]
#[command(name = "imagine", about = "Generate images on an imagine server", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate an image from a prompt
    Run(RunArgs),
    /// List the models available on the server
    List {
        /// Server address as host:port
        #[arg(short, long, default_value = "0.0.0.0:5000")]
        address: String,
    },
}

#[derive(clap::Args)]
pub struct RunArgs {
    /// Server address as host:port
    #[arg(short, long, default_value = "0.0.0.0:5000")]
    pub address: String,

    /// Model name, as reported by `imagine list`
    #[arg(short, long, default_value = "dreamshaper_8")]
    pub model: String,

    /// Output file; defaults to a timestamped name in the current directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write a JSON sidecar with the request parameters next to the image
    #[arg(long)]
    pub meta: bool,

    /// Image width in pixels
    #[arg(short, long, default_value_t = 512)]
    pub width: u32,

    /// Image height in pixels
    #[arg(short = 'H', long, default_value_t = 512)]
    pub height: u32,

    /// Number of denoising steps
    #[arg(short = 'n', long, default_value_t = 25)]
    pub steps: u32,

    /// Classifier-free guidance scale
    #[arg(short, long, default_value_t = 7.0)]
    pub guidance: f32,

    /// Sampler name
    #[arg(long, default_value = "dpm++ 2m")]
    pub sampler: String,

    /// Source image for img2img
    #[arg(short, long)]
    pub img: Option<PathBuf>,

    /// Denoising strength for img2img, in (0, 1]
    #[arg(short = 'd', long, default_value_t = 0.8)]
    pub strength: f32,

    /// CLIP skip
    #[arg(short, long, default_value_t = 1)]
    pub clip: u32,

    /// Run a second low-strength pass at this upscale factor, > 1 (text2img only)
    #[arg(short = 'f', long)]
    pub hires: Option<f32>,

    /// Seed; random when omitted
    #[arg(long)]
    pub seed: Option<u64>,

    /// Negative prompt
    #[arg(long, default_value = "ugly, deformed, blurry, low quality")]
    pub neg: String,

    /// Receive an intermediate image every N steps
    #[arg(short, long)]
    pub stream: Option<u32>,

    /// The prompt
    #[arg(required = true)]
    pub prompt: Vec<String>,
}

fn main() -> ExitCode {
    env_logger::init();

    let result = match Cli::parse().command {
        Command::Run(args) => run::run(args),
        Command::List { address } => run::list(&address),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_defaults() {
        let cli = Cli::parse_from(["imagine", "run", "a", "cat"]);
        let Command::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.prompt, vec!["a", "cat"]);
        assert_eq!(args.model, "dreamshaper_8");
        assert_eq!(args.width, 512);
        assert_eq!(args.steps, 25);
        assert_eq!(args.sampler, "dpm++ 2m");
        assert!(args.seed.is_none());
        assert!(args.stream.is_none());
    }

    #[test]
    fn test_run_requires_a_prompt() {
        assert!(Cli::try_parse_from(["imagine", "run"]).is_err());
    }

    #[test]
    fn test_short_flags() {
        let cli = Cli::parse_from([
            "imagine", "run", "-w", "256", "-H", "320", "-n", "8", "-s", "2", "-f", "1.5",
            "castle",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.width, 256);
        assert_eq!(args.height, 320);
        assert_eq!(args.steps, 8);
        assert_eq!(args.stream, Some(2));
        assert_eq!(args.hires, Some(1.5));
    }
}
