//! Streaming codec for the NT backup stream format.
//!
//! The [`stream`] module holds the record codec and the two pipelines,
//! [`stream::BackupReader`] and [`stream::BackupWriter`]. The rest are
//! things to plug into them: on disk files, an inventory of the records and
//! transforms to drop or redact records.
pub mod buf;
pub mod file;
pub mod hash;
pub mod inventory;
pub mod rewrite;
pub mod stream;
