//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("storage.path", ".pokesync/store")?
        .set_default("storage.flush_on_commit", true)?
        .set_default("frame.window_ms", 100)?
        .set_default("frame.interval_ms", 100)
}
