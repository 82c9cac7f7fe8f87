//! Synchronized expression sets for microarray data.
//!
//! A [`dataset::SynchronizedDataset`] keeps an expression grid, per-sample
//! covariates and per-feature identifiers aligned through every subsetting
//! operation. Datasets are built from local delimited files or from GEO
//! series-matrix files.

pub mod app;
pub mod config;
pub mod covariates;
pub mod dataset;
pub mod domain;
pub mod error;
pub mod geo;
pub mod matrix;
pub mod output;
pub mod reader;
pub mod selection;
pub mod store;
pub mod summary;
