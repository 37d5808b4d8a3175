//! Integration tests for the layered overlay merge engine

mod config_integration;
mod host_lifecycle;
mod merge_properties;
mod remote_layers;
mod test_utils;
