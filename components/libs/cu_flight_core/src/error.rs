use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlightError {
    #[error("Could not read configuration file '{path}': {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not parse configuration: {0}")]
    ConfigParse(String),

    #[error("Rotor attachment point '{0}' not found on the body")]
    MissingAttachment(String),

    #[error("Invalid calibration value for '{key}': '{value}'")]
    InvalidCalibration { key: String, value: String },

    #[error("Snapshot error: {0}")]
    SnapshotError(String),
}

pub type FlightResult<T> = Result<T, FlightError>;
