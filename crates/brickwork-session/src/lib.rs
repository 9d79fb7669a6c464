//! Checkpointed session state machine.
//!
//! A session walks a fixed lattice of [`SessionPhase`]s. After every
//! transition a single [`SessionCheckpoint`] is written into the session
//! record held by a [`SessionStore`], overwriting the previous one, so an
//! interrupted session can be resumed from its last completed phase.
//!
//! ```rust
//! use std::sync::Arc;
//! use brickwork_session::{CheckpointManager, InMemorySessionStore, SessionPhase, SessionRecord};
//!
//! # let rt = tokio::runtime::Runtime::new().unwrap();
//! # rt.block_on(async {
//! let store = Arc::new(InMemorySessionStore::new());
//! let manager = CheckpointManager::new(store, "session-1");
//! manager.checkpoint(SessionPhase::Genesis, SessionRecord::new()).await?;
//!
//! let info = manager.can_resume().await?;
//! assert!(info.resumable);
//! assert_eq!(info.phase, Some(SessionPhase::Genesis));
//! # Ok::<(), brickwork_utils::SessionError>(())
//! # }).unwrap();
//! ```

pub mod checkpoint;
pub mod phase;
pub mod store;

pub use checkpoint::{
    CHECKPOINT_KEY, CheckpointManager, ResumeInfo, SessionCheckpoint, can_resume, load_checkpoint,
};
pub use phase::{SessionPhase, TOTAL_PHASE_STEPS};
pub use store::{InMemorySessionStore, SessionRecord, SessionStore, merge_record};
