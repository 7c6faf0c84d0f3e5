use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Manifest resolution could not produce a `{digest, version}` pair.
    #[error("No manifest found for {image}:{reference}")]
    NoManifestFound { image: String, reference: String },

    #[error("Registry API error: {0}")]
    RegistryApi(String),

    #[error("Invalid tag transform formula '{formula}'")]
    InvalidTransform { formula: String },

    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl AppError {
    pub fn no_manifest(image: &str, reference: &str) -> Self {
        AppError::NoManifestFound {
            image: image.to_string(),
            reference: reference.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
