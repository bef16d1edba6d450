//! # Tollgate Worker Library
//!
//! Background maintenance for the authorization core.
//!
//! ## Modules
//!
//! - `retention`: Periodic purge of audit entries past the retention horizon
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tollgate_shared::store::memory::MemoryStore;
//! use tollgate_worker::retention::RetentionJob;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let job = RetentionJob::new(Arc::new(MemoryStore::new()), 90);
//! let purged = job.run_once().await?;
//! println!("Purged {purged} entries");
//! # Ok(())
//! # }
//! ```

pub mod retention;
