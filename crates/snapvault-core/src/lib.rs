pub mod cleaner;
pub mod config;
pub mod digest;
pub mod error;
pub mod mapping;
pub mod progress;
pub mod record;
pub mod report;
pub mod store;
pub mod verifier;

pub use cleaner::{Cleaner, CleanupOutcome};
pub use config::AppConfig;
pub use error::Error;
pub use progress::{ProgressReporter, SilentReporter};
pub use report::{VerifyStatus, SCHEMA_VERSION};
pub use verifier::{Verifier, VerifyOutcome};
