//! CLI domain: parse, route, output, and presentation only.
//! No merge orchestration; the route table dispatches to the host boundary.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::{map_error, CliError};
pub use parse::{Cli, Commands};
pub use presentation::{
    format_merge_json, format_merge_summary, format_plan_json, format_plan_table,
};
pub use route::RunContext;
