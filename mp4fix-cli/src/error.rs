use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Rewrite error: {0}")]
    Rewrite(#[from] mp4_fix::RewriteError),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
