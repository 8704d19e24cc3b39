pub type FormwrightResult<T> = Result<T, FormwrightError>;

#[derive(thiserror::Error, Debug)]
pub enum FormwrightError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("rpc error: {0}")]
    Rpc(#[from] crate::rpc::RpcFailure),

    #[error("session error: {0}")]
    Session(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FormwrightError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }
}
