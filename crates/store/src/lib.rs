//! Record storage for TaskTier.
//!
//! The file-backed [`RecordStore`](tasktier_core::RecordStore), the
//! progressive-disclosure [`SearchEngine`], skill discovery, and the
//! [`TierPolicy`] tying the three memory tiers together.

pub mod atomic;
pub mod file_store;
pub mod layout;
pub mod search;
pub mod skills;
pub mod tier;

pub use atomic::write_atomic;
pub use file_store::FileRecordStore;
pub use layout::Layout;
pub use search::{SearchEngine, SearchQuery, SearchReport, SortKey};
pub use skills::{SkillDescriptor, discover_skills};
pub use tier::{Tier, TierPolicy};
