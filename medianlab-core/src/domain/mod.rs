//! Domain types shared by the cursor, merge engine and median aggregate.

pub mod record;

pub use record::{Record, SourceId};
