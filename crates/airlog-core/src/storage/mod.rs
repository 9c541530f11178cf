//! File-based rollup storage
//!
//! Raw logs live at the storage root; each aggregation level gets its own
//! directory holding one file per calendar day:
//!
//! ```text
//! logs/
//! ├── temp_2024-01-01T00-00-01.log
//! ├── 5m/agg_5m_2024-01-01.log
//! ├── 30m/agg_30m_2024-01-01.log
//! ├── 2h/  12h/  1w/
//! ```

pub mod aggregate;
pub mod cascade;
pub mod events;
pub mod layout;
pub mod level;
pub mod record;
pub mod synthetic;

pub use aggregate::{AggregateStats, aggregate_files_to_interval};
pub use cascade::{BuildOptions, BuildOutcome, Cascade, CascadeReport, Failure};
pub use events::{BuildEvent, LogProgress, ProgressSink};
pub use layout::StorageLayout;
pub use level::Level;
pub use record::{AggregateRecord, LineRecord};
