use thiserror::Error;

#[derive(Debug, Error)]
pub enum StudyRoomError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("room error: {0}")]
    Room(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("api returned status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("request cancelled")]
    Cancelled,
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for StudyRoomError {
    fn from(e: reqwest::Error) -> Self {
        StudyRoomError::Http(e.to_string())
    }
}
