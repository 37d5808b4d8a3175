//! Merge rules: defaults applied beneath every file and environment source.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("merge.clean_output", false)?
        .set_default("merge.fetch", "always")?
        .set_default("watch.debounce_ms", 100)
}
