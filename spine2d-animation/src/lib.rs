//! Keyframe timeline evaluation and multi-track animation mixing for Spine-style skeletons
//! (unofficial).
//!
//! The crate owns the timeline/mixing core: packed keyframe curves, the [`Timeline`] variants,
//! immutable [`Animation`]s, and the [`AnimationState`] track engine that crossfades, queues and
//! layers animations on top of a [`Skeleton`] pose. Loading, world transforms, constraint
//! solving and rendering live elsewhere.

#![forbid(unsafe_code)]

#[cfg(feature = "json")]
mod config;
mod error;
mod ids;
mod model;
mod runtime;

#[cfg(feature = "json")]
pub use config::*;
pub use error::*;
pub use model::*;
pub use runtime::*;
