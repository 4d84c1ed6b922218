//! Debounced, optimistic auto-save for form editors.
//!
//! This crate coordinates background persistence of in-progress edits:
//! the user keeps typing, edits are written through an injected save
//! function after a quiet period, and a small status value drives a
//! "Saving... / All changes saved" indicator.
//!
//! # Features
//!
//! - **Trailing debounce** so only the last edit in a burst triggers a save
//! - **Optimistic editing** with a dirty flag; input is never blocked
//! - **Explicit status machine** (`pristine`, `pending`, `saving`, `saved`, `error`)
//! - **Retry with exponential backoff** on transient save failures
//! - **Immediate flush** via `save_now` for blur and submit events
//! - **Observable status** through a `tokio::sync::watch` channel
//!
//! # Status machine
//!
//! ```text
//! pristine --edit--> pending --debounce--> saving --ok--> saved --decay--> pristine
//!                       ^                    |
//!                       |              retries left: saving (after backoff)
//!                       +--edit--+           |
//!                                      exhausted: error --edit/save_now--> ...
//! ```
//!
//! # Example
//!
//! ```ignore
//! use formsave::{AutoSaveConfig, AutoSaveSession};
//!
//! let session = AutoSaveSession::with_config(
//!     AutoSaveConfig::default().with_debounce_ms(1500),
//!     || async {
//!         // PATCH the current form values to the backend
//!         Ok::<(), formsave::BoxError>(())
//!     },
//! );
//!
//! // Wire form events to the session
//! session.mark_dirty();            // on every field change
//! session.save_now().await?;       // on blur / explicit save
//!
//! // Drive an indicator from the status
//! let mut status = session.subscribe();
//! ```
//!
//! # Architecture
//!
//! The crate is organized into:
//!
//! - `session.rs` - The auto-save engine (timers, retries, teardown)
//! - `status.rs` - The `SaveStatus` state machine
//! - `config.rs` - Debounce and retry configuration
//! - `error.rs` - Error types with user-friendly messages

mod config;
mod error;
mod session;
mod status;

// Re-export main types
pub use config::{AutoSaveConfig, RetryConfig};
pub use error::{AutoSaveError, BoxError};
pub use session::{AutoSaveSession, SaveOutcome};
pub use status::SaveStatus;
