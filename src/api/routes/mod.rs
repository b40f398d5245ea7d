//! API Routes
//!
//! Route handlers organized by functionality.

pub mod entries;
pub mod health;
pub mod media;
pub mod page;
pub mod sessions;
