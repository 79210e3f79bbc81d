pub mod outbox_entry;

pub use outbox_entry::{EntryError, EntryStatus, OutboxEntry, OutboxRow};
