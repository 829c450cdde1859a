//! CLI command implementations

mod config;
mod platforms;
mod stream;

pub use config::{config, ConfigArgs};
pub use platforms::platforms;
pub use stream::{stream, StreamArgs};
