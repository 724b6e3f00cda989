//! Reconciles GEO supplementary-file references between series and their
//! samples, reports where files live, and downloads them with retries.

pub mod app;
pub mod batch;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod geo;
pub mod output;
pub mod record;
pub mod report;
pub mod soft;
pub mod store;
pub mod transfer;
pub mod tree;
