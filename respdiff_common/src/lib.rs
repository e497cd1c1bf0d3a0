pub mod config;
pub mod document;
pub mod error;
pub mod types;

pub use config::*;
pub use document::*;
pub use error::*;
pub use types::*;
