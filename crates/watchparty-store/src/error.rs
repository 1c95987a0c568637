use thiserror::Error;

use crate::path::StorePath;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("value at {path} is not an object")]
    NotAnObject { path: StorePath },

    #[error("value at {path} is not a log")]
    NotALog { path: StorePath },

    #[error("connection is no longer live")]
    ConnectionLost,
}
