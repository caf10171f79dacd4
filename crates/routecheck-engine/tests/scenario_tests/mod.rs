//! Scenario tests organized by the story they tell:
//!
//! - `lifecycle`: creating resources from templates, admission rejections,
//!   idempotent teardown
//! - `rollout`: no-op patches keep the generation, real ones advance it by
//!   exactly one
//! - `traffic`: weighted distribution and cookie stickiness through the
//!   sampler
//! - `snapshot`: block isolation against a live-looking HAProxy config

pub mod fake;

mod lifecycle;
mod snapshot;
