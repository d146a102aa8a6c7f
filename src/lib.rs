//! Tickle-driven streaming audio presentation core
//!
//! Turns time-stamped data chunks arriving from a stream source into
//! synchronized audio output. Every in-flight presentation is a *presenter*:
//! a five-stage state machine (Ready, Starting, Streaming, Repeating, Done)
//! advanced by one `tickle` call per scheduler pass.
//!
//! # Features
//! - Wave presenters that stream PCM into a fixed-size hardware ring buffer in
//!   lock-step with the hardware play cursor, padding with silence on underrun
//!   and at end of stream
//! - Sequenced-music presenters that queue whole pre-formatted blocks and react
//!   to driver completion callbacks through a flag-and-defer guard
//! - Event presenters delivering chunks at their scheduled time
//! - Replay of looped media from a looping chunk buffer (N times or forever)
//! - 3D positional tracking of named world entities with a non-positional fallback
//! - A sound manager owning the device, the listener and the global volume policy
//!
//! # Crate feature flags
//! - `music` (default): sequenced-music block streamer (`music`)
//! - `export-wav` (default): WAV capture export (`export`)
//! - `streaming` (opt-in): real output through `rodio` (`streaming`)
//!
//! # Quick start
//! ```no_run
//! use tickle_audio::{
//!     Action, ManagerConfig, QueueSource, SimulatedHardware, SoundManager, WaveFormat,
//!     WavePresenter,
//! };
//!
//! let hardware = SimulatedHardware::new();
//! let mut manager = SoundManager::create(Box::new(hardware.clone()), ManagerConfig::default())?;
//!
//! let (source, feeder) = QueueSource::new();
//! let format = WaveFormat::pcm(22_050, 16, 1);
//! let presenter = WavePresenter::new(&manager.context(), Action::once(1, "door"), format, source);
//! manager.register(presenter.into());
//!
//! feeder.push_bytes(0, vec![0u8; 4096]);
//! feeder.finish();
//! manager.tick(0);
//! # Ok::<(), tickle_audio::TickleError>(())
//! ```

#![warn(missing_docs)]

pub mod action; // Action descriptors and completion notifications
pub mod cache; // Reusable-sound cache handoff
pub mod chunk; // Chunks and chunk sources
pub mod config; // Manager configuration
pub mod constants;
#[cfg(feature = "export-wav")]
pub mod export; // WAV capture export
pub mod hardware; // Device, buffer and listener abstraction
pub mod manager; // Device/listener manager and tick drivers
#[cfg(feature = "music")]
pub mod music; // Sequenced-music block streamer
pub mod presenter; // Presenter state machine
pub mod spatial; // 3D positional tracking
#[cfg(feature = "streaming")]
pub mod streaming; // Real audio output
pub mod wave; // Wave ring-buffer streamer

/// Error types for presentation operations
#[derive(thiserror::Error, Debug)]
pub enum TickleError {
    /// Hardware buffer, voice or device allocation failed
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Audio device or driver failure
    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Wave format rejected
    #[error("Invalid wave format: {0}")]
    InvalidFormat(String),

    /// Hardware sequencer failure
    #[error("Sequencer error: {0}")]
    SequencerError(String),

    /// IO error from filesystem or device
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be decoded
    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for TickleError {
    /// Converts a String into `TickleError::Other`.
    ///
    /// Prefer the specific variants (`ResourceExhausted`, `ConfigError`, ...)
    /// where the caller needs to tell failures apart.
    fn from(msg: String) -> Self {
        TickleError::Other(msg)
    }
}

impl From<&str> for TickleError {
    /// Converts a string slice into `TickleError::Other`.
    fn from(msg: &str) -> Self {
        TickleError::Other(msg.to_string())
    }
}

/// Result type for presentation operations
pub type Result<T> = std::result::Result<T, TickleError>;

// Public API exports
pub use action::{
    completion_channel, Action, ActionEnd, ActionId, ActionOutcome, CompletionSender, LoopCount,
};
pub use cache::{CachedSound, SoundCache};
pub use chunk::{Chunk, ChunkFlags, ChunkSource, MemorySource, QueueFeeder, QueueSource};
pub use config::{CooperativeLevel, ManagerConfig, PrimaryFormat, TickMode, WaveStreamConfig};
pub use hardware::simulated::{BufferProbe, SimulatedHardware};
pub use hardware::{
    AudioHardware, BufferCaps, BufferDesc, DeviceCaps, ListenerPose, OutputMode, SoundBuffer,
};
pub use manager::{AttenuationCurve, SoundManager, SoundSystem, VolumePolicy};
#[cfg(feature = "music")]
pub use music::{BlockDoneHandle, MusicPresenter, Sequencer, SimulatedSequencer};
pub use presenter::event::{ChannelSink, EventPresenter, EventSink};
pub use presenter::loop_buffer::{LoopCounter, LoopingChunkBuffer};
pub use presenter::{
    Positionable, PresenterContext, PresenterId, PresenterKind, PresenterVariant, TickContext,
    Tickle, TickleState,
};
pub use spatial::{
    DistanceStatus, EntityHandle, EntityTable, EntityTraits, SoundTrack3D, Vec3, WorldLookup,
    WorldTransform,
};
#[cfg(feature = "streaming")]
pub use streaming::RodioHardware;
pub use wave::{WaveFormat, WavePresenter, WaveStats};
