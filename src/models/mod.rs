pub mod category;
pub mod document;

pub use category::Category;
pub use document::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Malformed record document: {0}")]
    MalformedDocument(String),

    #[error("Invalid category: {0}")]
    InvalidCategory(String),

    #[error("Invalid account address: {0}")]
    InvalidAddress(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}
