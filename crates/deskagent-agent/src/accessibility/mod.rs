//! Accessibility snapshot capture and diffing.
//!
//! The backend itself is a platform-specific subprocess behind the
//! `AccessibilityBackend` port (see `crate::ports`); this module owns the
//! pure comparison logic that turns two snapshots into a `StateDiff`.

pub mod diff;

pub use diff::{diff_state, format_diff_for_agent};
