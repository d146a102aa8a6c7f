//! 3D positional tracking
//!
//! - [`math`]: vector type shared by the listener and sources
//! - [`world`]: the scene lookup contract and an in-memory entity table
//! - [`track`]: per-buffer entity tracking with a non-positional fallback

pub mod math;
pub mod track;
pub mod world;

pub use math::Vec3;
pub use track::{DistanceStatus, SoundTrack3D};
pub use world::{EntityHandle, EntityTable, EntityTraits, WorldLookup, WorldTransform};
