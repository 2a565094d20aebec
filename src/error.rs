// Error types. Every variant states *where* things went wrong.
use thiserror::Error;

/// Top-level error for the CLI and the window loop.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Window init error: {0}")]
    WindowInit(String),   // Creating the window failed
    #[error("Window update error: {0}")]
    WindowUpdate(String), // Pushing the frame to the window failed
    #[error("Config error: {0}")]
    Config(String),
    #[error("Generation failed: {0}")]
    Generation(String),   // A headless generate run ended with an error notice
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Layout model mutations that name something that doesn't exist.
#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error("unknown element `{0}`")]
    UnknownElement(String),
    #[error("element `{id}` has {actual} style, patch is for {patch}")]
    StyleKindMismatch { id: String, actual: &'static str, patch: &'static str },
}

/// Generation backend failures (background + quote).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP {status} {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("No image data")]
    MissingImage,
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(err.to_string())
    }
}

/// Loading a background or logo into pixels.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("bad data url")]
    BadDataUrl,
    #[error("fetch {url}: {message}")]
    Fetch { url: String, message: String },
    #[error("read {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("decode: {0}")]
    Decode(String),
}

/// Pixel-level operations (blur, blend, inpaint).
#[derive(Debug, Error, PartialEq)]
pub enum PixelError {
    #[error("decode: {0}")]
    Decode(String),
    #[error("encode: {0}")]
    Encode(String),
    #[error("size mismatch: {0}")]
    SizeMismatch(&'static str),
    #[error("empty region")]
    EmptyRegion,
}

/// Composite export. One failure, never a partial file.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("image `{0}` is not loaded")]
    MissingAsset(String),
    #[error("encode: {0}")]
    Encode(String),
    #[error("write {path}: {source}")]
    Write { path: String, source: std::io::Error },
}

/// Snapshot store read/write.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot persist: {0}")]
    Persist(#[from] tempfile::PersistError),
}
