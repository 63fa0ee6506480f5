pub mod accounting;
pub mod archive;
pub mod command;
pub mod config;
pub mod deleter;
pub mod error;
pub mod lims;
pub mod notify;
pub mod records;
pub mod samples;
pub mod store;

pub use config::AppConfig;
pub use deleter::{Deleter, DeletionContext, DeletionOptions, DeletionSummary};
pub use error::Error;
