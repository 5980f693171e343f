//! Pacebot - LINE conversational running coach
//!
//! This library provides the core functionality for the pacebot relay:
//! - Signature-gated LINE webhook ingestion
//! - Mention addressing with a per-scope grace window
//! - Bounded, TTL'd conversation memory
//! - Calling-name resolution with a TTL cache
//! - Training-metric extraction and reward attachment
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               LINE Platform                   │
//! │   webhook events  │  reply API  │  profiles  │
//! └───────────────────┬──────────────────────────┘
//!                     │
//! ┌───────────────────▼──────────────────────────┐
//! │                 Pacebot                       │
//! │  signature │ addressing │ memory │ rewards   │
//! └───────────────────┬──────────────────────────┘
//!                     │
//! ┌───────────────────▼──────────────────────────┐
//! │            OpenAI Chat Completions            │
//! │      text  │  vision  │  name guessing       │
//! └──────────────────────────────────────────────┘
//! ```

pub mod ai;
pub mod api;
pub mod config;
pub mod error;
pub mod line;
pub mod memory;
pub mod mention;
pub mod metrics;
pub mod name;
pub mod pipeline;
pub mod prompt;
pub mod reward;

pub use api::ApiState;
pub use config::Config;
pub use error::{Error, Result};
