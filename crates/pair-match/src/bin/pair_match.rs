//! `pair-match`: register two images and render their correspondences.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use pair_match::core::{init_logging, LogConfig};
use pair_match::pipeline::{params_from_json, parse_param_assignment, run, PipelineConfig};
use pair_match::{PipelineError, RegistrationParams};

#[derive(Parser, Debug)]
#[command(
    name = "pair-match",
    version,
    about = "Match two images and estimate the rigid transform between them",
    after_help = "Examples:\n   pair-match -p Vis/CorNNType=2 -p Vis/PnPReprojError=3 from.png to.png\n   pair-match --calibration cam.json --from-depth from_depth.png --to-depth to_depth.png from.png to.png"
)]
struct Cli {
    /// Reference ("from") image.
    #[arg(required_unless_present = "show_params")]
    from: Option<PathBuf>,
    /// Image whose pose is estimated ("to").
    #[arg(required_unless_present = "show_params")]
    to: Option<PathBuf>,
    /// Calibration file (JSON), required with depth or right images.
    #[arg(long)]
    calibration: Option<PathBuf>,
    /// Depth (16-bit, mm) or right (8-bit) image of the "from" view.
    #[arg(long)]
    from_depth: Option<PathBuf>,
    /// Depth or right image of the "to" view.
    #[arg(long)]
    to_depth: Option<PathBuf>,
    /// Registration option, repeatable.
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,
    /// JSON object of registration options, applied before `--param`.
    #[arg(long)]
    params_json: Option<PathBuf>,
    /// Directory for matches.png, matches.svg and clouds.ply.
    #[arg(long, default_value = "pair-match-out")]
    output_dir: PathBuf,
    /// Write a JSON report to this path.
    #[arg(long)]
    report: Option<PathBuf>,
    /// Log level (off, error, warn, info, debug, trace).
    #[arg(long, default_value = "warn")]
    log_level: String,
    /// Emit JSON log events (with the `tracing` feature).
    #[arg(long)]
    log_json: bool,
    /// Skip image and point-cloud outputs.
    #[arg(long)]
    no_render: bool,
    /// Print the registration options and exit.
    #[arg(long)]
    show_params: bool,
}

fn registration_params(cli: &Cli) -> Result<RegistrationParams, PipelineError> {
    let mut params = RegistrationParams::default();
    if let Some(path) = &cli.params_json {
        params.apply(&params_from_json(path)?)?;
    }
    let overrides = cli
        .params
        .iter()
        .map(|arg| parse_param_assignment(arg))
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    params.apply(&overrides)?;
    Ok(params)
}

fn try_main(cli: Cli) -> Result<(), PipelineError> {
    let mut log = LogConfig::from_level_name(&cli.log_level)
        .ok_or_else(|| PipelineError::Usage(format!("unknown log level \"{}\"", cli.log_level)))?;
    log.json = cli.log_json;
    let _ = init_logging(&log);

    let params = registration_params(&cli)?;
    let (Some(from), Some(to)) = (cli.from, cli.to) else {
        return Err(PipelineError::Usage("both <FROM> and <TO> images are required".into()));
    };

    let mut config = PipelineConfig::new(from, to);
    config.calibration = cli.calibration;
    config.from_depth = cli.from_depth;
    config.to_depth = cli.to_depth;
    config.params = params;
    config.output_dir = Some(cli.output_dir);
    config.report = cli.report;
    config.render = !cli.no_render;

    run(&config, &mut std::io::stdout().lock())?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.show_params {
        print!("{}", RegistrationParams::usage());
        return ExitCode::SUCCESS;
    }
    match try_main(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            if matches!(err, PipelineError::Usage(_)) {
                eprintln!("\n{}", RegistrationParams::usage());
            }
            ExitCode::FAILURE
        }
    }
}
