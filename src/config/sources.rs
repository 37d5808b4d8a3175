//! Configuration sources, lowest precedence first: project files, then environment.

pub mod environment;
pub mod project_file;
