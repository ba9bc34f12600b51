//! Hierarchical weighted scoring of geospatial features.
//!
//! Feature values are weighted inside a [`hierarchy::Dataset`], datasets inside a
//! [`hierarchy::Category`] and categories inside a [`hierarchy::Mode`]; the
//! [`engine::ScoreAggregator`] rolls a feature collection up through that tree.

pub mod config;
pub mod engine;
pub mod error;
pub mod hierarchy;
pub mod telemetry;
