use rust_bert::RustBertError;
use rust_tokenizers::error::TokenizerError;
use tch::TchError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExplorerError {
    #[error("Endpoint not available error: {0}")]
    FileDownloadError(String),

    #[error("IO error: {0}")]
    IOError(String),

    #[error("Tch tensor error: {0}")]
    TchError(String),

    #[error("Tokenizer error: {0}")]
    TokenizerError(String),

    #[error("Invalid configuration error: {0}")]
    InvalidConfigurationError(String),

    #[error("Value error: {0}")]
    ValueError(String),

    #[error("Please enter some text to analyze.")]
    EmptyInput,
}

impl From<RustBertError> for ExplorerError {
    fn from(error: RustBertError) -> Self {
        match error {
            RustBertError::FileDownloadError(message) => ExplorerError::FileDownloadError(message),
            RustBertError::IOError(message) => ExplorerError::IOError(message),
            RustBertError::TchError(message) => ExplorerError::TchError(message),
            RustBertError::TokenizerError(message) => ExplorerError::TokenizerError(message),
            RustBertError::InvalidConfigurationError(message) => {
                ExplorerError::InvalidConfigurationError(message)
            }
            RustBertError::ValueError(message) => ExplorerError::ValueError(message),
            other => ExplorerError::ValueError(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ExplorerError {
    fn from(error: std::io::Error) -> Self {
        ExplorerError::IOError(error.to_string())
    }
}

impl From<serde_json::Error> for ExplorerError {
    fn from(error: serde_json::Error) -> Self {
        ExplorerError::InvalidConfigurationError(error.to_string())
    }
}

impl From<TokenizerError> for ExplorerError {
    fn from(error: TokenizerError) -> Self {
        ExplorerError::TokenizerError(error.to_string())
    }
}

impl From<TchError> for ExplorerError {
    fn from(error: TchError) -> Self {
        ExplorerError::TchError(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_errors_keep_their_kind() {
        let error: ExplorerError =
            RustBertError::FileDownloadError("https://huggingface.co".to_string()).into();
        assert!(matches!(error, ExplorerError::FileDownloadError(_)));

        let error: ExplorerError = RustBertError::ValueError("bad shape".to_string()).into();
        assert_eq!(error.to_string(), "Value error: bad shape");
    }
}
