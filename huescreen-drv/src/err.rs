pub type SaverResult = anyhow::Result<()>;

#[derive(thiserror::Error, Debug)]
pub enum SaverError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected motion payload: {0}")]
    Payload(String),

    #[error("Toml deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Toml serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}
