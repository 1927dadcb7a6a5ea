use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("api returned code {code}: {message}")]
    Api { code: i64, message: String },
    #[error("Empty raffle_id_list")]
    EmptyRaffleList,
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ApiError {
    /// The upstream occasionally reports an empty raffle list transiently;
    /// callers retry this exactly once.
    pub fn is_transient_empty(&self) -> bool {
        matches!(self, ApiError::EmptyRaffleList)
    }
}
