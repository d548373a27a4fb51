#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Failed to parse API response: {0}")]
    JsonParseFailed(#[from] serde_json::Error),

    #[error("Invalid data from API: missing field `{field}`.")]
    MissingField { field: String },

    #[error("Catalog API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid category ID: {category_id}.")]
    InvalidCategoryId { category_id: String },

    #[error("Invalid time format received: {time}.")]
    InvalidTime { time: String },

    #[error("Failed to obtain access token: {message}")]
    Unauthorized { message: String },
}

impl From<wreq::Error> for CatalogError {
    fn from(e: wreq::Error) -> Self {
        CatalogError::RequestFailed(Box::new(e))
    }
}
