//! Embedded static HTML served by the control surface.
//!
//! Kept as `&'static str` so the page ships inside the binary.

pub mod hud;
