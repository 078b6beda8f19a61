//! # Library Browsing Module
//!
//! Browses a tag-indexed track collection as a virtual directory hierarchy.
//!
//! ## Overview
//!
//! This module provides:
//! - The tag model: fallback-aware tag access, multi-valued expansion,
//!   sorting, de-duplication and approximate filtering ([`tags`])
//! - Declarative groupings describing each hierarchy ([`grouping`])
//! - The browsing cursor with per-level listing cache and playback-position
//!   tracking ([`library`])
//!
//! Everything here is synchronous and free of I/O; the service layer feeds
//! tracks in and reacts to navigation outcomes.

pub mod error;
pub mod grouping;
pub mod library;
pub mod tags;

pub use error::{LibraryError, Result};
pub use grouping::{Grouping, Groupings, Level, Style};
pub use library::{Ancestor, Library, Listing, Navigation, VirtualPlaylist, ROOT, TOP};
pub use tags::{Row, Track};
