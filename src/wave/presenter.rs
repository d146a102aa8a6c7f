use super::WaveFormat;
use crate::action::{Action, ActionOutcome};
use crate::cache::{CachedSound, SoundCache};
use crate::chunk::{Chunk, ChunkSource};
use crate::constants::MIN_ATTENUATION;
use crate::hardware::{BufferCaps, BufferDesc, SoundBuffer};
use crate::manager::VolumePolicy;
use crate::presenter::loop_buffer::{LoopCounter, LoopingChunkBuffer};
use crate::presenter::{
    Positionable, PresenterContext, PresenterCore, TickContext, Tickle, TickleState,
};
use crate::spatial::{DistanceStatus, SoundTrack3D};

/// Streaming statistics of one wave presenter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaveStats {
    /// Slots written with stream data (a padded final slot included).
    pub slots_written: u64,
    /// Pure silence slots written to drain the stream.
    pub silence_slots: u64,
    /// Times the play cursor overtook the writer.
    pub underruns: u64,
    /// Payload bytes written into the ring.
    pub bytes_streamed: u64,
    /// Chunks consumed from the source or the loop buffer.
    pub chunks_consumed: u64,
}

enum Staged {
    Full,
    Starved,
    Exhausted,
}

/// Streams PCM chunks into a hardware ring buffer.
///
/// Slot indices are absolute (they never wrap); the ring offset of slot `n`
/// is `(n % slots) * slot_size`. The writer never gets more than `slots`
/// slots ahead of the slot being played.
pub struct WavePresenter {
    core: PresenterCore,
    format: WaveFormat,
    source: Box<dyn ChunkSource>,
    loop_buffer: LoopingChunkBuffer,
    loops: LoopCounter,
    buffer: Option<Box<dyn SoundBuffer>>,
    track: Option<SoundTrack3D>,
    cache_key: Option<String>,
    cache_payload: Vec<u8>,
    cache_sent: bool,
    slots: usize,
    slot_size: usize,
    next_slot: u64,
    cleared_slots: u64,
    played_bytes: u64,
    last_cursor: usize,
    staging: Vec<u8>,
    last_timestamp: Option<u64>,
    source_ended: bool,
    end_of_media: bool,
    draining: bool,
    playing: bool,
    paused: bool,
    stats: WaveStats,
}

impl WavePresenter {
    /// Create an idle presenter reading `source`.
    pub fn new(
        ctx: &PresenterContext,
        action: Action,
        format: WaveFormat,
        source: impl ChunkSource + 'static,
    ) -> Self {
        let looping = action.is_looping();
        let loops = LoopCounter::new(action.loop_count);
        WavePresenter {
            core: PresenterCore::new(ctx, action),
            format,
            source: Box::new(source),
            loop_buffer: LoopingChunkBuffer::new(looping),
            loops,
            buffer: None,
            track: None,
            cache_key: None,
            cache_payload: Vec::new(),
            cache_sent: false,
            slots: 0,
            slot_size: 0,
            next_slot: 0,
            cleared_slots: 0,
            played_bytes: 0,
            last_cursor: 0,
            staging: Vec::new(),
            last_timestamp: None,
            source_ended: false,
            end_of_media: false,
            draining: false,
            playing: false,
            paused: false,
            stats: WaveStats::default(),
        }
    }

    /// Builder: follow a world entity in 3D.
    #[must_use]
    pub fn with_track(mut self, entity_name: impl Into<String>) -> Self {
        self.track = Some(SoundTrack3D::new(entity_name));
        self
    }

    /// Builder: hand the complete payload to the sound cache under `key`.
    #[must_use]
    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Wave format.
    pub fn format(&self) -> WaveFormat {
        self.format
    }

    /// Streaming statistics.
    pub fn stats(&self) -> WaveStats {
        self.stats
    }

    /// Slot size in bytes, zero before the buffer is allocated.
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// True while paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// True once the final silence slot was written.
    pub fn is_draining(&self) -> bool {
        self.draining
    }

    /// Stop the hardware voice without touching the write position.
    pub fn pause(&mut self) {
        if self.paused {
            return;
        }
        self.paused = true;
        if let (true, Some(buffer)) = (self.playing, self.buffer.as_mut()) {
            if let Err(e) = buffer.stop() {
                log::warn!("presenter {} pause failed: {e}", self.core.id());
            }
        }
    }

    /// Restart playback from the current cursor; nothing is re-buffered.
    pub fn resume(&mut self) {
        if !self.paused {
            return;
        }
        self.paused = false;
        if let (true, Some(buffer)) = (self.playing, self.buffer.as_mut()) {
            if let Err(e) = buffer.play(true) {
                log::warn!("presenter {} resume failed: {e}", self.core.id());
            }
        }
    }

    fn composed_attenuation(&self, policy: VolumePolicy<'_>) -> i32 {
        if self.core.is_enabled() {
            policy.attenuation(self.core.volume())
        } else {
            MIN_ATTENUATION
        }
    }

    /// Push the composed global × track volume to the buffer.
    pub fn apply_volume(&mut self, policy: VolumePolicy<'_>) {
        let attenuation = self.composed_attenuation(policy);
        if let Some(buffer) = self.buffer.as_mut() {
            if let Err(e) = buffer.set_volume(attenuation) {
                log::warn!("presenter {} volume not applied: {e}", self.core.id());
            }
        }
    }

    fn capacity(&self) -> usize {
        self.slot_size * self.slots
    }

    fn slot_offset(&self, slot: u64) -> usize {
        (slot % self.slots as u64) as usize * self.slot_size
    }

    fn silence(&self) -> Vec<u8> {
        vec![self.format.silence_byte(); self.slot_size]
    }

    /// Account cursor progress, silence played slots and detect underruns.
    ///
    /// Returns the absolute index of the slot being played.
    fn sync_cursor(&mut self, buffer: &mut dyn SoundBuffer) -> u64 {
        let capacity = self.capacity();
        let cursor = buffer.play_cursor() % capacity;
        let delta = (cursor + capacity - self.last_cursor) % capacity;
        self.last_cursor = cursor;
        self.played_bytes += delta as u64;

        let playing_slot = self.played_bytes / self.slot_size as u64;
        let from = self
            .cleared_slots
            .max(playing_slot.saturating_sub(self.slots as u64));
        if from < playing_slot {
            let silence = self.silence();
            for slot in from..playing_slot {
                if let Err(e) = buffer.write(self.slot_offset(slot), &silence) {
                    log::warn!("presenter {} could not clear slot {slot}: {e}", self.core.id());
                }
            }
        }
        self.cleared_slots = self.cleared_slots.max(playing_slot);

        if self.playing && !self.draining && playing_slot >= self.next_slot {
            self.stats.underruns += 1;
            log::warn!(
                "presenter {} underrun: cursor in slot {playing_slot}, writer at slot {}",
                self.core.id(),
                self.next_slot
            );
            self.next_slot = playing_slot + 1;
        }
        log::trace!(
            "presenter {} cursor {cursor} played {} slot {playing_slot} next write {}",
            self.core.id(),
            self.played_bytes,
            self.next_slot
        );
        playing_slot
    }

    fn write_slot(&mut self, buffer: &mut dyn SoundBuffer, data: &[u8]) {
        let offset = self.slot_offset(self.next_slot);
        if let Err(e) = buffer.write(offset, data) {
            log::warn!(
                "presenter {} slot {} write failed, filling with silence: {e}",
                self.core.id(),
                self.next_slot
            );
            if let Err(e) = buffer.write(offset, &self.silence()) {
                log::warn!("presenter {} silence fill failed: {e}", self.core.id());
            }
        }
        self.next_slot += 1;
    }

    fn accept(&mut self, chunk: Chunk) {
        if chunk.is_end_of_stream() {
            self.source_ended = true;
            if chunk.is_empty() {
                return;
            }
        }
        if let Some(last) = self.last_timestamp {
            if chunk.timestamp_ms() < last {
                log::warn!(
                    "presenter {} dropped out-of-order chunk at {} ms (last {} ms)",
                    self.core.id(),
                    chunk.timestamp_ms(),
                    last
                );
                return;
            }
        }
        self.last_timestamp = Some(chunk.timestamp_ms());
        self.loop_buffer.append(&chunk, self.core.state());
        if self.cache_key.is_some() && !self.cache_sent {
            self.cache_payload.extend_from_slice(chunk.payload());
        }
        self.stats.chunks_consumed += 1;
        self.staging.extend_from_slice(chunk.payload());
    }

    fn hand_off_cache(&mut self, cache: &mut SoundCache) {
        if self.cache_sent {
            return;
        }
        let Some(key) = self.cache_key.clone() else {
            return;
        };
        self.cache_sent = true;
        let payload = std::mem::take(&mut self.cache_payload);
        let expected = self.format.data_size as usize;
        if expected != 0 && payload.len() != expected {
            log::warn!(
                "'{key}' not cached: received {} of {expected} bytes",
                payload.len()
            );
            return;
        }
        cache.insert(key, CachedSound::new(self.format, payload));
    }

    /// Fill the staging area up to one slot.
    fn stage(&mut self, cache: &mut SoundCache) -> Staged {
        while self.staging.len() < self.slot_size {
            if self.core.state() == TickleState::Repeating {
                let Some(chunk) = self.loop_buffer.next() else {
                    return Staged::Exhausted;
                };
                self.staging.extend_from_slice(chunk.payload());
                self.stats.chunks_consumed += 1;
                continue;
            }
            if self.source_ended {
                self.hand_off_cache(cache);
                return Staged::Exhausted;
            }
            match self.source.next_chunk() {
                Some(chunk) => self.accept(chunk),
                None if self.source.has_reached_end() => self.source_ended = true,
                None => return Staged::Starved,
            }
        }
        Staged::Full
    }

    /// Start another pass from the loop buffer if the loop policy allows it.
    fn restart_loop(&mut self) -> bool {
        if !self.loops.next_cycle() {
            return false;
        }
        if self.loop_buffer.is_empty() {
            log::warn!("presenter {} has nothing recorded to loop", self.core.id());
            return false;
        }
        self.loop_buffer.rewind();
        self.core.transition(TickleState::Repeating)
    }

    fn fill(&mut self, cache: &mut SoundCache, buffer: &mut dyn SoundBuffer, playing_slot: u64) {
        let mut budget = self.slots;
        while budget > 0 && self.next_slot < playing_slot + self.slots as u64 {
            budget -= 1;
            if self.end_of_media {
                let silence = self.silence();
                self.write_slot(buffer, &silence);
                self.stats.silence_slots += 1;
                self.draining = true;
                log::debug!("presenter {} draining", self.core.id());
                return;
            }
            match self.stage(cache) {
                Staged::Full => {
                    let data: Vec<u8> = self.staging.drain(..self.slot_size).collect();
                    self.write_slot(buffer, &data);
                    self.stats.slots_written += 1;
                    self.stats.bytes_streamed += data.len() as u64;
                }
                Staged::Starved => return,
                Staged::Exhausted => {
                    if self.restart_loop() {
                        continue;
                    }
                    if !self.staging.is_empty() {
                        let mut data = std::mem::take(&mut self.staging);
                        self.stats.bytes_streamed += data.len() as u64;
                        data.resize(self.slot_size, self.format.silence_byte());
                        self.write_slot(buffer, &data);
                        self.stats.slots_written += 1;
                    }
                    self.end_of_media = true;
                }
            }
        }
    }

    /// One streaming pass. Returns true once the drain slot has played.
    fn stream(&mut self, cache: &mut SoundCache, buffer: &mut dyn SoundBuffer) -> bool {
        let playing_slot = self.sync_cursor(buffer);
        if self.draining {
            if self.played_bytes >= self.next_slot * self.slot_size as u64 {
                if let Err(e) = buffer.stop() {
                    log::warn!("presenter {} stop failed: {e}", self.core.id());
                }
                return true;
            }
            return false;
        }

        self.fill(cache, buffer, playing_slot);

        if !self.playing && (self.next_slot >= self.slots as u64 || self.draining) {
            match buffer.play(true) {
                Ok(()) => {
                    self.playing = true;
                    log::debug!("presenter {} playback started", self.core.id());
                }
                Err(e) => log::warn!("presenter {} could not start: {e}", self.core.id()),
            }
        }
        false
    }

    /// Follow the tracked entity; runs on every tick that holds a buffer.
    fn update_track(&mut self, ctx: &TickContext<'_>) {
        let fallback = self.composed_attenuation(ctx.volume);
        if let (Some(track), Some(buffer)) = (self.track.as_mut(), self.buffer.as_mut()) {
            track.update(ctx.world, buffer.as_mut(), fallback);
        }
    }

    fn pump(&mut self, ctx: &mut TickContext<'_>) {
        if self.paused {
            self.update_track(ctx);
            return;
        }
        let Some(mut buffer) = self.buffer.take() else {
            self.end(ActionOutcome::Failed("hardware buffer lost".into()));
            return;
        };
        let finished = self.stream(ctx.cache, buffer.as_mut());
        self.buffer = Some(buffer);
        if finished {
            self.end(ActionOutcome::Completed);
        } else {
            self.update_track(ctx);
        }
    }
}

impl Tickle for WavePresenter {
    fn core(&self) -> &PresenterCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PresenterCore {
        &mut self.core
    }

    fn ready_tickle(&mut self, ctx: &mut TickContext<'_>) {
        if let Err(e) = self.format.validate() {
            self.end(ActionOutcome::Failed(e.to_string()));
            return;
        }
        self.slots = ctx.wave.slots.max(2);
        self.slot_size = self.format.bytes_for_ms(ctx.wave.slot_ms);

        let mut caps = BufferCaps::CTRL_VOLUME | BufferCaps::CTRL_FREQUENCY;
        if ctx.enable_3d && self.track.is_some() {
            caps |= BufferCaps::CTRL_3D;
        }
        let desc = BufferDesc {
            format: self.format,
            capacity: self.capacity(),
            caps,
        };
        let mut buffer = match ctx.hardware.create_buffer(&desc) {
            Ok(buffer) => buffer,
            Err(e) => {
                self.end(ActionOutcome::Failed(e.to_string()));
                return;
            }
        };

        let silence = vec![self.format.silence_byte(); desc.capacity];
        if let Err(e) = buffer.write(0, &silence) {
            log::warn!("presenter {} initial silence fill failed: {e}", self.core.id());
        }
        if let Err(e) = buffer.set_frequency(self.format.sample_rate) {
            log::trace!("presenter {} keeps device frequency: {e}", self.core.id());
        }
        if let Some(track) = self.track.as_mut() {
            track.bind(ctx.world, buffer.as_mut());
        }
        self.buffer = Some(buffer);
        self.apply_volume(ctx.volume);
        log::debug!(
            "presenter {} ring of {} x {} bytes",
            self.core.id(),
            self.slots,
            self.slot_size
        );
        self.core.transition(TickleState::Starting);
    }

    fn starting_tickle(&mut self, ctx: &mut TickContext<'_>) {
        self.update_track(ctx);
        if ctx.now_ms >= self.core.action().start_ms {
            self.core.transition(TickleState::Streaming);
        }
    }

    fn streaming_tickle(&mut self, ctx: &mut TickContext<'_>) {
        self.pump(ctx);
    }

    fn repeating_tickle(&mut self, ctx: &mut TickContext<'_>) {
        self.pump(ctx);
    }

    fn release(&mut self) {
        if let Some(mut buffer) = self.buffer.take() {
            if let Err(e) = buffer.stop() {
                log::trace!("presenter {} stop on release: {e}", self.core.id());
            }
        }
        if let Some(track) = self.track.as_mut() {
            track.unbind();
        }
        self.playing = false;
    }
}

impl Positionable for WavePresenter {
    fn sound_track(&self) -> Option<&SoundTrack3D> {
        self.track.as_ref()
    }

    fn set_distance_range(&mut self, min: f32, max: f32) -> crate::Result<DistanceStatus> {
        let Some(track) = self.track.as_mut() else {
            return Ok(DistanceStatus::Not3D);
        };
        let buffer: Option<&mut dyn SoundBuffer> = match self.buffer.as_mut() {
            Some(buffer) => Some(buffer.as_mut()),
            None => None,
        };
        track.set_distance_range(min, max, buffer)
    }

    fn unbind_track(&mut self) {
        if let Some(track) = self.track.as_mut() {
            track.unbind();
        }
    }
}

impl Drop for WavePresenter {
    fn drop(&mut self) {
        self.release();
    }
}
