use std::path::PathBuf;

use pair_match_core::CalibrationError;
use pair_match_registration::{ParamsError, RegistrationError};
use pair_match_view::ViewError;

/// Fatal outcomes of a run. A registration that finds no transform is not
/// one of them.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Configuration(CalibrationError),
    #[error(transparent)]
    CalibrationLoad(CalibrationError),
    #[error("failed loading images {} and {}: {source}", from.display(), to.display())]
    ImageLoad {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Output(#[from] ViewError),
}

impl From<ParamsError> for PipelineError {
    fn from(err: ParamsError) -> Self {
        PipelineError::Usage(err.to_string())
    }
}

impl From<CalibrationError> for PipelineError {
    fn from(err: CalibrationError) -> Self {
        if err.is_configuration() {
            PipelineError::Configuration(err)
        } else {
            PipelineError::CalibrationLoad(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibration_errors_are_split_by_kind() {
        let missing: PipelineError = CalibrationError::MissingCalibration.into();
        assert!(matches!(missing, PipelineError::Configuration(_)));
        assert_eq!(missing.to_string(), "calibration required when depth is supplied");

        let load: PipelineError = CalibrationError::Load {
            path: PathBuf::from("cal.json"),
            reason: "bad".into(),
        }
        .into();
        assert!(matches!(load, PipelineError::CalibrationLoad(_)));
        assert!(load.to_string().contains("cal.json"));
    }

    #[test]
    fn params_errors_are_usage_errors() {
        let err: PipelineError = ParamsError::UnknownKey("Vis/Nope".into()).into();
        assert!(matches!(err, PipelineError::Usage(_)));
        assert!(err.to_string().contains("Vis/Nope"));
    }
}
