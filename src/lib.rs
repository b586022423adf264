//! Real-time bid-price prediction.
//!
//! A raw bid request is parsed into a typed [`request::BidRequest`], turned into the 13-feature
//! vector by [`features::FeatureTransformer`] and scored by [`engine::BidEngine`] against a
//! load-once [`artifacts::ArtifactBundle`] of fitted encoders, lookup tables and models.

pub mod artifacts;
pub mod config;
pub mod encoders;
pub mod engine;
pub mod error;
pub mod features;
pub mod logger;
pub mod lookup;
pub mod model;
pub mod model_bank;
pub mod request;
pub mod sample;
pub mod synthetic;
pub mod utils;
