use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    #[error("Broker connection error: {0}")]
    ConnectionError(String),

    #[error("Broker pool error: {0}")]
    PoolError(String),

    #[error("Broker command failed: {0}")]
    CommandError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type BrokerResult<T> = Result<T, BrokerError>;

impl From<redis::RedisError> for BrokerError {
    fn from(err: redis::RedisError) -> Self {
        BrokerError::CommandError(err.to_string())
    }
}

impl From<bb8::RunError<redis::RedisError>> for BrokerError {
    fn from(err: bb8::RunError<redis::RedisError>) -> Self {
        match err {
            bb8::RunError::User(e) => e.into(),
            bb8::RunError::TimedOut => {
                BrokerError::PoolError("timed out waiting for a connection".to_string())
            }
        }
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(err: serde_json::Error) -> Self {
        BrokerError::SerializationError(err.to_string())
    }
}
