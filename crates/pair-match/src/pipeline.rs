//! End-to-end run over one image pair.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use nalgebra::Isometry3;
use pair_match_core::{
    AuxImage, CalibrationError, CalibrationResolver, ObservationBuilder, Observation,
    ResolvedCalibration,
};
use pair_match_registration::{Estimate, RegistrationDriver, RegistrationParams};
use pair_match_view::{
    layout_matches, point_cloud, render_matches, render_matches_svg, save_ply, save_png, save_svg,
    CanvasPair, StackOrientation, ViewError, ViewLayer, DEFAULT_CANVAS_SIZE,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::error::PipelineError;
use crate::io::{load_aux, load_color};
use crate::report::{
    calibration_message, console_report, options_echo, timing_line, two_d_fallback_message,
    window_title, MatchReport, TransformReport,
};

pub const MATCHES_PNG: &str = "matches.png";
pub const MATCHES_SVG: &str = "matches.svg";
pub const CLOUDS_PLY: &str = "clouds.ply";

/// Inputs and switches of one run.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub from: PathBuf,
    pub to: PathBuf,
    pub from_depth: Option<PathBuf>,
    pub to_depth: Option<PathBuf>,
    pub calibration: Option<PathBuf>,
    pub params: RegistrationParams,
    /// Directory receiving the rendered outputs; nothing is rendered without it.
    pub output_dir: Option<PathBuf>,
    /// Path of the JSON report.
    pub report: Option<PathBuf>,
    pub render: bool,
    /// Long side of each canvas in the match image.
    pub canvas_size: u32,
    /// Pixel step of the exported point clouds.
    pub cloud_decimation: usize,
}

impl PipelineConfig {
    pub fn new(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            from_depth: None,
            to_depth: None,
            calibration: None,
            params: RegistrationParams::default(),
            output_dir: None,
            report: None,
            render: true,
            canvas_size: DEFAULT_CANVAS_SIZE,
            cloud_decimation: 4,
        }
    }
}

/// Everything a finished run produced.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub calibration: ResolvedCalibration,
    pub estimate: Estimate,
    pub title: String,
    pub report: MatchReport,
}

/// Split a `KEY=VALUE` command-line assignment.
pub fn parse_param_assignment(arg: &str) -> Result<(String, String), PipelineError> {
    match arg.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(PipelineError::Usage(format!(
            "expected KEY=VALUE, got \"{arg}\""
        ))),
    }
}

/// Read a flat JSON object of options; numbers and booleans are accepted
/// alongside strings.
pub fn params_from_json(path: &Path) -> Result<BTreeMap<String, String>, PipelineError> {
    let usage = |reason: String| {
        PipelineError::Usage(format!("invalid params file {}: {reason}", path.display()))
    };
    let raw = fs::read_to_string(path).map_err(|e| usage(e.to_string()))?;
    let map: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(&raw).map_err(|e| usage(e.to_string()))?;
    map.into_iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(s) => Ok((key, s)),
            serde_json::Value::Number(n) => Ok((key, n.to_string())),
            serde_json::Value::Bool(b) => Ok((key, b.to_string())),
            other => Err(usage(format!("unsupported value {other} for {key}"))),
        })
        .collect()
}

fn write_error(path: &Path, source: std::io::Error) -> PipelineError {
    PipelineError::Output(ViewError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn say(out: &mut dyn Write, text: &str) -> Result<(), PipelineError> {
    writeln!(out, "{}", text.trim_end()).map_err(|e| write_error(Path::new("<stdout>"), e))
}

fn load_optional_aux(out: &mut dyn Write, path: Option<&Path>, flag: &str) -> Result<Option<AuxImage>, PipelineError> {
    let Some(path) = path else {
        return Ok(None);
    };
    match load_aux(path) {
        Ok(aux) => Ok(Some(aux)),
        Err(err) => {
            log::warn!("failed loading {flag} image {}: {err}", path.display());
            say(out, &format!("Failed loading {flag} image: \"{}\"!", path.display()))?;
            Ok(None)
        }
    }
}

fn render_outputs(
    dir: &Path,
    from: &Observation,
    to: &Observation,
    estimate: &Estimate,
    config: &PipelineConfig,
    title: &str,
) -> Result<Vec<PathBuf>, PipelineError> {
    fs::create_dir_all(dir).map_err(|e| write_error(dir, e))?;
    let output = &estimate.output;
    let (a, b) = (from.image(), to.image());
    let orientation = StackOrientation::for_image(a.width, a.height);
    let pair = CanvasPair::fit((a.width, a.height), (b.width, b.height), orientation, config.canvas_size);
    let layout = layout_matches(&pair, &output.features_from, &output.features_to, &output.info.inlier_ids);
    log::debug!("{} correspondence lines, {orientation:?} layout", layout.len());

    let layer_a = ViewLayer {
        image: a,
        aux: from.aux(),
        features: &output.features_from,
    };
    let layer_b = ViewLayer {
        image: b,
        aux: to.aux(),
        features: &output.features_to,
    };
    let mut written = Vec::new();

    let png = dir.join(MATCHES_PNG);
    save_png(&png, &render_matches(&pair, &layer_a, &layer_b, &layout))?;
    written.push(png);

    let svg = dir.join(MATCHES_SVG);
    let doc = render_matches_svg(
        &pair,
        &output.features_from,
        &output.features_to,
        &layout,
        title,
        Some(MATCHES_PNG),
    );
    save_svg(&svg, &doc)?;
    written.push(svg);

    if let Some(t) = output.transform.as_ref() {
        let cloud_from = point_cloud(from, config.cloud_decimation);
        let cloud_to = point_cloud(to, config.cloud_decimation);
        if cloud_from.is_empty() && cloud_to.is_empty() {
            log::info!("no depth on either side, skipping point clouds");
        } else {
            let ply = dir.join(CLOUDS_PLY);
            save_ply(&ply, &cloud_from, &cloud_to, t)?;
            written.push(ply);
        }
    }
    Ok(written)
}

fn write_report(path: &Path, report: &MatchReport) -> Result<(), PipelineError> {
    let file = File::create(path).map_err(|e| write_error(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report).map_err(|e| write_error(path, e.into()))?;
    writer.flush().map_err(|e| write_error(path, e))
}

/// Load, resolve, register, render and report one image pair.
///
/// Console text goes to `out`. Returns an error only for fatal problems; a
/// pair that cannot be registered still yields a summary.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(from = %config.from.display(), to = %config.to.display()))
)]
pub fn run(config: &PipelineConfig, out: &mut dyn Write) -> Result<RunSummary, PipelineError> {
    say(
        out,
        &options_echo(
            config.calibration.as_deref(),
            config.from_depth.as_deref(),
            config.to_depth.as_deref(),
        ),
    )?;

    let image_error = |source| PipelineError::ImageLoad {
        from: config.from.clone(),
        to: config.to.clone(),
        source,
    };
    let image_from = load_color(&config.from).map_err(image_error)?;
    let image_to = load_color(&config.to).map_err(image_error)?;

    // Depth/right inputs need a calibration whether or not they load.
    if config.calibration.is_none() && (config.from_depth.is_some() || config.to_depth.is_some()) {
        return Err(CalibrationError::MissingCalibration.into());
    }
    let aux_from = load_optional_aux(out, config.from_depth.as_deref(), "from-depth")?;
    let aux_to = load_optional_aux(out, config.to_depth.as_deref(), "to-depth")?;

    let size = (image_from.width as u32, image_from.height as u32);
    let resolved = CalibrationResolver::default().resolve(
        config.calibration.as_deref(),
        aux_from.as_ref().map(AuxImage::format),
        aux_to.as_ref().map(AuxImage::format),
        size,
    )?;
    say(out, &calibration_message(&resolved))?;

    let (from, to) = ObservationBuilder::new(resolved.calibration)
        .build_pair((image_from, aux_from), (image_to, aux_to));
    if !from.has_aux() {
        say(out, &two_d_fallback_message())?;
    }

    let driver = RegistrationDriver::new(config.params.clone());
    let estimate = driver.estimate_features(&from, &to, &Isometry3::identity())?;
    say(out, &timing_line(estimate.elapsed))?;

    let output = &estimate.output;
    let title = window_title(&output.info, estimate.elapsed);
    say(out, &title)?;

    let outputs = match (&config.output_dir, config.render) {
        (Some(dir), true) => render_outputs(dir, &from, &to, &estimate, config, &title)?,
        _ => Vec::new(),
    };
    for path in &outputs {
        log::info!("wrote {}", path.display());
    }

    say(
        out,
        &console_report(
            output.transform.as_ref(),
            &output.features_from,
            &output.features_to,
            &output.info,
        ),
    )?;

    let report = MatchReport {
        from: config.from.clone(),
        to: config.to.clone(),
        calibration: calibration_message(&resolved),
        title: title.clone(),
        elapsed_secs: estimate.elapsed.as_secs_f64(),
        transform: output.transform.as_ref().map(TransformReport::from),
        features_from: output.features_from.len(),
        features_to: output.features_to.len(),
        info: output.info.clone(),
        outputs,
    };
    if let Some(path) = &config.report {
        write_report(path, &report)?;
    }

    Ok(RunSummary {
        calibration: resolved,
        estimate,
        title,
        report,
    })
}
