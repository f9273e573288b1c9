//! CLI configuration

/// Runtime configuration for the CLI
pub struct Config {
    /// Base URL of the orchestrator API
    pub orchestrator_url: String,
}
