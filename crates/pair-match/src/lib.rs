//! High-level facade for the `pair-match-*` workspace.
//!
//! This crate provides:
//! - re-exports of the core, registration and view crates
//! - image and depth decoding on top of `image`
//! - console/JSON reporting and the end-to-end [`pipeline::run`]
//!
//! ## Quickstart
//!
//! ```no_run
//! use pair_match::pipeline::{run, PipelineConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = PipelineConfig::new("from.png", "to.png");
//! config.output_dir = Some("out".into());
//! let summary = run(&config, &mut std::io::stdout())?;
//! println!("registered: {}", summary.estimate.transform().is_some());
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `pair_match::core`: camera models, calibration resolution, observations.
//! - `pair_match::registration`: options, matching, RANSAC solvers, the driver.
//! - `pair_match::view`: canvas layout, match rendering, point clouds.
//! - `pair_match::report`: title and console text, JSON report.

pub use pair_match_core as core;
pub use pair_match_registration as registration;
pub use pair_match_view as view;

pub use pair_match_core::{Calibration, CalibrationKind, Observation, ObservationBuilder};
pub use pair_match_registration::{
    Estimate, EstimationMode, MatchingStrategy, Registration, RegistrationDriver, RegistrationInfo,
    RegistrationParams,
};

mod error;
pub mod io;
pub mod pipeline;
pub mod report;

pub use error::PipelineError;
