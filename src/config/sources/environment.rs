//! Environment source: LAYERED__MERGE__CLEAN_OUTPUT=true, LAYERED__WATCH__DEBOUNCE_MS=50, ...

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::Environment;

pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix("LAYERED")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    )
}
