//! Roster Ingest Library
//!
//! Concurrent harvester for the student directory. Listing pages are walked
//! in batches; every roll number found is fetched, parsed and written to the
//! backing store exactly once.
//!
//! # Modules
//!
//! - [`tracker`]: lifecycle registry for every roll number
//! - [`fetcher`]: listing and detail fetch tasks
//! - [`pipeline`]: batch coordinator and persist stage
//! - [`source`] / [`storage`]: network and database seams
//! - [`parser`]: HTML extraction
//!
//! # Example
//!
//! ```no_run
//! use roster_ingest::config::Config;
//! use roster_ingest::pipeline::HarvestPipeline;
//! use roster_ingest::source::HttpSource;
//! use roster_ingest::storage::{PgStudentStore, RecordStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let store = PgStudentStore::connect(&config.database).await?;
//!     store.create_schema().await?;
//!
//!     let source = HttpSource::new(&config.source)?;
//!     let pipeline = HarvestPipeline::new(Arc::new(source), Arc::new(store), config.harvest);
//!     let stats = pipeline.run().await?;
//!     println!("inserted {}", stats.inserted);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod source;
pub mod storage;
pub mod tracker;

pub use error::{HarvestError, Result};
pub use pipeline::{HarvestPipeline, HarvestStats};
