//! Wave ring-buffer streamer
//!
//! PCM chunks are staged into fixed-size slots and written into a hardware
//! ring a few slots ahead of the play cursor. Slots the cursor has left are
//! immediately refilled with silence, so an underrun plays silence instead of
//! stale audio.

mod format;
mod presenter;

pub use format::WaveFormat;
pub use presenter::{WavePresenter, WaveStats};
