//! Session-id tracking for resumable assistants.
//!
//! The authoritative id for a working directory is, in order:
//! 1. the newest session-metadata file the assistant itself wrote under its
//!    own session directory, when the profile knows where that is;
//! 2. the last UUID observed on the assistant's output, persisted in a
//!    user-wide JSON store.

mod extract;
mod scan;
mod store;

pub use extract::{extract_uuid, is_uuid};
pub use scan::{cwd_dashed, latest_session_file_id, resolve_session_dir};
pub use store::{SessionRecord, SessionStore, default_store_path};
