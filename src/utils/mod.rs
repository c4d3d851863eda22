//! Utility Module
//!
//! - [`color`]: tint conversion, colour multiplication and packed
//!   colour-alpha helpers used by the transform propagator and by backends.
//!
//! Colour manipulation is a fixed set of free functions plus the [`Tint`]
//! conversion type. Anything that can describe an RGB tint implements
//! `Into<Tint>` and is accepted directly by [`Scene::set_tint`].
//!
//! ```rust,ignore
//! use strata::utils::color::{multiply_colors, Tint};
//!
//! let red: Tint = [1.0, 0.0, 0.0].into();
//! assert_eq!(multiply_colors(red.rgb(), 0xFFFFFF), 0xFF0000);
//! ```
//!
//! [`Scene::set_tint`]: crate::scene::Scene::set_tint

pub mod color;

pub use color::Tint;
