//! Surfaces exposed to the plugin-facing layer and to the CLI.

pub mod bridge;
pub mod json {
    pub mod transaction_writer;
}
