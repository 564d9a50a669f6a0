use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatchError {
    #[error("invalid index parameters: {0}")]
    InvalidParams(String),
}

pub type MatchResult<T> = Result<T, MatchError>;
