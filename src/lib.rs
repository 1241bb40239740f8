#![warn(
    clippy::all,
    clippy::correctness,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    clippy::perf,
    clippy::style
)]
#![allow(
    clippy::cargo_common_metadata,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::multiple_crate_versions,
    clippy::similar_names
)]

pub mod attr_cache;
pub mod config;
pub mod core;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod radio;
pub mod registry;
pub mod routes;
pub mod rules_engine;
pub mod server;
pub mod sync;
