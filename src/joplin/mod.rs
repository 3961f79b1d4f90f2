//! Joplin as the resource and note store.

pub mod client;
pub mod dry_run;

pub use client::JoplinClient;
pub use dry_run::DryRunStore;
