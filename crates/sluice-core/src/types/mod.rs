pub mod entry;
pub mod value;

pub use entry::{Appended, Entry, EntryId, PendingSummary, TrimBound};
pub use value::{FieldValue, Fields};
