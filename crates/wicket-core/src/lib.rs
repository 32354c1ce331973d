//! Core data model and persistence for Wicket.
//!
//! A widget is a small, generated code bundle with a single `run_widget`
//! entry point. This crate owns everything about widgets that does not
//! involve running them:
//!
//! - [`Widget`] / [`WidgetDraft`] / [`Category`]: the persisted record
//! - [`ArtifactStore`]: create, read, list and usage bookkeeping over a
//!   pluggable [`KvStore`]
//! - [`InputMarshaler`]: turns a request payload into [`WidgetInputs`],
//!   materializing uploads on disk

pub mod error;
pub mod input;
pub mod kv;
pub mod marshal;
pub mod store;
pub mod widget;

pub use error::{MarshalError, StoreError};
pub use input::{InputValue, WidgetInputs};
pub use kv::{FsKvStore, KvEntry, KvStore, MemoryKvStore};
pub use marshal::{InputMarshaler, MarshaledInputs, RequestPayload, UploadSet, UploadedFile};
pub use store::ArtifactStore;
pub use widget::{Category, UnknownCategory, Widget, WidgetDraft, WidgetId};
