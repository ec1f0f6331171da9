use clap::{Parser, Subcommand};
use mockup_press::compositor::Compositor;
use mockup_press::config::{self, BackendKind, CompositorConfig};
use mockup_press::imaging::{CompositeBackend, SoftwareBackend, TensorBackend};
use mockup_press::output;
use mockup_press::types::{DesignArea, JobFile, OutputFormat};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "mockup-press")]
#[command(about = "Composite design artwork onto product mockup photos")]
#[command(long_about = "\
Composite design artwork onto product mockup photos

A design area places the design on the mockup: a rectangle in mockup pixels,
an optional clockwise rotation, and an optional opacity. The design is fitted
inside the rectangle (or stretched with --stretch), rotated about its center,
and blended over the mockup.

Images may be http(s) URLs, file:// URLs, or local paths.

Batch job file (JSON):

  {
    \"design\": \"https://cdn.example.com/logo.png\",
    \"variants\": [
      {\"id\": \"front\", \"imageUrl\": \"https://cdn.example.com/tee-front.png\",
       \"designArea\": {\"x\": 310, \"y\": 220, \"width\": 400, \"height\": 400,
                      \"rotation\": 0, \"opacity\": 1.0, \"centerInArea\": true}}
    ],
    \"options\": {\"outputFormat\": \"png\", \"maintainAspect\": true}
  }

Run 'mockup-press gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Config file (stock defaults when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Pixel backend, overriding engine.backend from the config
    #[arg(long, value_enum, global = true)]
    backend: Option<BackendKind>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Composite one design onto one mockup
    Composite(CompositeArgs),
    /// Run a JSON job file: one design onto many mockups, in parallel
    Batch(BatchArgs),
    /// Print a stock config.toml with all options documented
    GenConfig,
}

/// Commands that need a loaded config and a backend.
enum EngineCommand {
    Composite(CompositeArgs),
    Batch(BatchArgs),
}

#[derive(clap::Args)]
struct CompositeArgs {
    /// Mockup image (URL or path)
    #[arg(long)]
    mockup: String,
    /// Design image (URL or path)
    #[arg(long)]
    design: String,
    /// Left edge of the design area
    #[arg(long, allow_hyphen_values = true)]
    x: f64,
    /// Top edge of the design area
    #[arg(long, allow_hyphen_values = true)]
    y: f64,
    #[arg(long)]
    width: f64,
    #[arg(long)]
    height: f64,
    /// Clockwise rotation in degrees
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    rotation: f64,
    /// Design opacity, 0.0-1.0
    #[arg(long, default_value_t = 1.0)]
    opacity: f64,
    /// Center the design inside the area
    #[arg(long)]
    center: bool,
    /// Stretch to the area instead of keeping the aspect ratio
    #[arg(long)]
    stretch: bool,
    /// Output format (default: from the output file extension, then config)
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,
    /// JPEG quality, 1-100
    #[arg(long)]
    quality: Option<u32>,
    /// Spend more time for smaller output
    #[arg(long)]
    optimize: bool,
    /// Where to write the result
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(clap::Args)]
struct BatchArgs {
    /// JSON job file
    job: PathBuf,
    /// Directory for the results
    #[arg(long, default_value = "out")]
    out_dir: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let command = match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            return Ok(());
        }
        Command::Composite(args) => EngineCommand::Composite(args),
        Command::Batch(args) => EngineCommand::Batch(args),
    };

    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(backend) = cli.backend {
        config.engine.backend = backend;
    }

    match config.engine.backend {
        BackendKind::Software => run(SoftwareBackend::new(), &config, command),
        BackendKind::Tensor => run(TensorBackend::new(), &config, command),
    }
}

fn run<B: CompositeBackend>(
    backend: B,
    config: &CompositorConfig,
    command: EngineCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    let compositor = Compositor::from_config(backend, config)?;
    log::debug!(
        "{} backend, {} workers",
        compositor.backend().name(),
        compositor.concurrency()
    );

    match command {
        EngineCommand::Composite(args) => run_composite(&compositor, config, &args),
        EngineCommand::Batch(args) => run_batch(&compositor, config, &args),
    }
}

fn format_from_extension(path: &Path) -> Option<OutputFormat> {
    path.extension()?.to_str()?.parse().ok()
}

fn run_composite<B: CompositeBackend>(
    compositor: &Compositor<B>,
    config: &CompositorConfig,
    args: &CompositeArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut options = config.output.to_options();
    options.center_design = args.center;
    options.maintain_aspect = !args.stretch;
    options.optimize_size |= args.optimize;
    if let Some(format) = args.format.or_else(|| format_from_extension(&args.output)) {
        options.output_format = format;
    }
    if let Some(quality) = args.quality {
        options.quality = quality;
    }

    let area = DesignArea::new(args.x, args.y, args.width, args.height)
        .with_rotation(args.rotation)
        .with_opacity(args.opacity);

    let bytes = compositor.composite(&args.mockup, &args.design, &area, &options)?;
    std::fs::write(&args.output, &bytes)?;
    output::print_composite_output(&args.output, bytes.len());
    Ok(())
}

fn run_batch<B: CompositeBackend>(
    compositor: &Compositor<B>,
    config: &CompositorConfig,
    args: &BatchArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(&args.job)?;
    let job_file: JobFile = serde_json::from_str(&content)?;
    let job = job_file.to_batch_job(&config.output.to_options());
    std::fs::create_dir_all(&args.out_dir)?;

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_batch_event(&event) {
                println!("{}", line);
            }
        }
    });
    let report = compositor.run_job(&job, Some(tx))?;
    printer
        .join()
        .map_err(|_| "progress printer thread panicked")?;

    let mut written = Vec::new();
    for result in &report.results {
        if let Ok(bytes) = &result.outcome {
            let id = &job_file.variants[result.index].id;
            let path = args
                .out_dir
                .join(output::batch_file_name(result.index, id, job.options.output_format));
            std::fs::write(&path, bytes)?;
            written.push(path);
        }
    }
    output::print_batch_summary(&report, &written);

    if report.failed() > 0 {
        return Err(format!(
            "{} of {} units failed",
            report.failed(),
            report.results.len()
        )
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn gen_config_parses_without_arguments() {
        let cli = Cli::try_parse_from(["mockup-press", "gen-config"]).unwrap();
        assert!(matches!(cli.command, Command::GenConfig));
    }

    #[test]
    fn composite_accepts_negative_position() {
        let cli = Cli::try_parse_from([
            "mockup-press",
            "--backend",
            "tensor",
            "composite",
            "--mockup",
            "tee.png",
            "--design",
            "logo.png",
            "--x",
            "-12.5",
            "--y",
            "4",
            "--width",
            "100",
            "--height",
            "80",
            "--rotation",
            "-15",
            "-o",
            "out.jpg",
        ])
        .unwrap();
        assert!(matches!(cli.backend, Some(BackendKind::Tensor)));
        let Command::Composite(args) = cli.command else {
            panic!("expected composite");
        };
        assert_eq!(args.x, -12.5);
        assert_eq!(args.rotation, -15.0);
        assert_eq!(format_from_extension(&args.output), Some(OutputFormat::Jpeg));
    }

    #[test]
    fn composite_requires_design_area() {
        assert!(
            Cli::try_parse_from(["mockup-press", "composite", "--mockup", "a", "--design", "b"])
                .is_err()
        );
    }
}
