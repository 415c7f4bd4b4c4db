use crate::params::{MatchingStrategy, ParamsError};

#[derive(thiserror::Error, Debug)]
pub enum RegistrationError {
    #[error(transparent)]
    Params(#[from] ParamsError),
    #[error("matching strategy {0} needs a descriptor matcher, none was supplied")]
    MatcherUnavailable(MatchingStrategy),
    #[error("observation {id} has an empty image")]
    EmptyImage { id: i32 },
    #[error("registration backend failed: {0}")]
    Backend(String),
}
