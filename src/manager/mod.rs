//! Device/listener manager
//!
//! Owns the single audio device, the listener and the global volume policy,
//! and keeps the registry of live presenters. One [`SoundManager::tick`] runs
//! every presenter to completion of its current stage, one after another.

mod attenuation;
mod system;

pub use attenuation::{AttenuationCurve, VolumePolicy};
pub use system::SoundSystem;

use crate::action::{completion_channel, Action, ActionEnd, ActionOutcome};
use crate::cache::SoundCache;
use crate::chunk::MemorySource;
use crate::config::ManagerConfig;
use crate::constants::MAX_VOLUME;
use crate::hardware::{AudioHardware, DeviceCaps, ListenerPose, OutputMode};
use crate::presenter::{PresenterContext, PresenterId, PresenterVariant, TickContext, TickleState};
use crate::spatial::{Vec3, WorldLookup};
use crate::wave::WavePresenter;
use crate::{Result, TickleError};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::time::Instant;

/// Process-scoped owner of the device, the listener and all presenters.
pub struct SoundManager {
    hardware: Box<dyn AudioHardware>,
    config: ManagerConfig,
    caps: DeviceCaps,
    output_mode: OutputMode,
    curve: AttenuationCurve,
    volume: u8,
    listener: ListenerPose,
    presenters: Vec<PresenterVariant>,
    context: PresenterContext,
    completions: Receiver<ActionEnd>,
    world: Option<Arc<dyn WorldLookup>>,
    cache: SoundCache,
    epoch: Instant,
    ticks: u64,
    shut_down: bool,
}

impl SoundManager {
    /// Open the device and create the primary buffer.
    ///
    /// The output mode (plain or 3D) is decided here once: 3D only when the
    /// configuration asks for it and the device supports it.
    pub fn create(mut hardware: Box<dyn AudioHardware>, config: ManagerConfig) -> Result<Self> {
        config.validate()?;
        let caps = hardware.initialize(config.cooperative_level)?;
        let output_mode = if config.enable_3d && caps.supports_3d {
            OutputMode::Positional3D
        } else {
            if config.enable_3d {
                log::warn!("device has no 3D support, falling back to stereo output");
            }
            OutputMode::Stereo
        };
        hardware.create_primary(&config.primary, output_mode)?;
        let listener = ListenerPose::default();
        hardware.apply_listener(&listener)?;

        let (tx, completions) = completion_channel();
        log::info!(
            "sound manager ready: {:?} output, {} voices, {:?} access",
            output_mode,
            caps.max_voices,
            config.cooperative_level
        );
        Ok(SoundManager {
            hardware,
            config,
            caps,
            output_mode,
            curve: AttenuationCurve::default(),
            volume: config.initial_volume.min(MAX_VOLUME),
            listener,
            presenters: Vec::new(),
            context: PresenterContext::new(tx),
            completions,
            world: None,
            cache: SoundCache::new(),
            epoch: Instant::now(),
            ticks: 0,
            shut_down: false,
        })
    }

    /// Context to hand to presenter constructors.
    pub fn context(&self) -> PresenterContext {
        self.context.clone()
    }

    /// Receiver of action-completion notifications.
    pub fn completions(&self) -> &Receiver<ActionEnd> {
        &self.completions
    }

    fn policy(&self) -> VolumePolicy<'_> {
        VolumePolicy::new(self.volume, &self.curve)
    }

    /// Start a presenter and add it to the registry.
    pub fn register(&mut self, mut presenter: PresenterVariant) -> PresenterId {
        let id = presenter.id();
        if !presenter.start() {
            log::warn!("presenter {id} registered after it was started");
        }
        presenter.apply_volume(self.policy());
        log::debug!("registered {:?} presenter {id}", presenter.kind());
        self.presenters.push(presenter);
        id
    }

    /// Stop a presenter and remove it. Returns false for an unknown id.
    pub fn unregister(&mut self, id: PresenterId) -> bool {
        let Some(index) = self.presenters.iter().position(|p| p.id() == id) else {
            return false;
        };
        let mut presenter = self.presenters.remove(index);
        presenter.end(ActionOutcome::Stopped);
        true
    }

    /// Run one scheduler pass at manager time `now_ms`.
    pub fn tick(&mut self, now_ms: u64) {
        let mut ctx = TickContext {
            now_ms,
            hardware: self.hardware.as_mut(),
            volume: VolumePolicy::new(self.volume, &self.curve),
            world: self.world.as_deref(),
            cache: &mut self.cache,
            wave: self.config.wave,
            enable_3d: self.output_mode.is_3d(),
        };
        for presenter in self.presenters.iter_mut() {
            presenter.tickle(&mut ctx);
        }
        let before = self.presenters.len();
        self.presenters.retain(|p| p.state() != TickleState::Done);
        if self.presenters.len() != before {
            log::debug!(
                "{} presenter(s) finished, {} live",
                before - self.presenters.len(),
                self.presenters.len()
            );
        }
        self.ticks += 1;
    }

    /// Tick at the manager's own monotonic clock.
    pub fn tick_now(&mut self) {
        let now = self.now_ms();
        self.tick(now);
    }

    /// Milliseconds since the manager was created.
    pub fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Scheduler passes run so far.
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    /// Set the global volume and re-apply it to every presenter.
    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(MAX_VOLUME);
        let policy = VolumePolicy::new(self.volume, &self.curve);
        for presenter in self.presenters.iter_mut() {
            presenter.apply_volume(policy);
        }
    }

    /// Global volume.
    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Set one presenter's track volume. Returns false for an unknown id.
    pub fn set_presenter_volume(&mut self, id: PresenterId, volume: u8) -> bool {
        let policy = VolumePolicy::new(self.volume, &self.curve);
        match self.presenters.iter_mut().find(|p| p.id() == id) {
            Some(presenter) => {
                presenter.set_volume(volume, policy);
                true
            }
            None => false,
        }
    }

    /// Enable or mute one presenter. Returns false for an unknown id.
    pub fn set_presenter_enabled(&mut self, id: PresenterId, enabled: bool) -> bool {
        let policy = VolumePolicy::new(self.volume, &self.curve);
        match self.presenters.iter_mut().find(|p| p.id() == id) {
            Some(presenter) => {
                presenter.set_enabled(enabled, policy);
                true
            }
            None => false,
        }
    }

    /// Pause every wave presenter. Music presenters keep their own transport.
    pub fn pause(&mut self) {
        for wave in self.presenters.iter_mut().filter_map(PresenterVariant::as_wave_mut) {
            wave.pause();
        }
    }

    /// Resume every wave presenter.
    pub fn resume(&mut self) {
        for wave in self.presenters.iter_mut().filter_map(PresenterVariant::as_wave_mut) {
            wave.resume();
        }
    }

    /// Update the listener; `None` arguments leave that part untouched.
    pub fn update_listener(
        &mut self,
        position: Option<Vec3>,
        forward: Option<Vec3>,
        up: Option<Vec3>,
        velocity: Option<Vec3>,
    ) -> Result<()> {
        self.listener.merge(position, forward, up, velocity);
        self.hardware.apply_listener(&self.listener)
    }

    /// Current listener pose.
    pub fn listener(&self) -> ListenerPose {
        self.listener
    }

    /// Hardware attenuation for a percentage volume.
    pub fn attenuation(&self, percent: u8) -> i32 {
        self.curve.lookup(percent)
    }

    /// Replace the attenuation curve and re-apply volumes.
    pub fn set_curve(&mut self, curve: AttenuationCurve) {
        self.curve = curve;
        self.set_volume(self.volume);
    }

    /// Attach the scene used by 3D tracks.
    pub fn set_world(&mut self, world: Arc<dyn WorldLookup>) {
        self.world = Some(world);
    }

    /// Detach the scene; tracks fall back to non-positional playback.
    pub fn clear_world(&mut self) {
        self.world = None;
    }

    /// Replay a cached sound through a fresh presenter.
    pub fn play_cached(&mut self, name: &str, action: Action) -> Result<PresenterId> {
        let sound = self
            .cache
            .get(name)
            .cloned()
            .ok_or_else(|| TickleError::ConfigError(format!("'{name}' is not cached")))?;
        let chunk_bytes = sound.format.bytes_for_ms(self.config.wave.slot_ms);
        let source = MemorySource::from_bytes(
            &sound.data,
            chunk_bytes,
            u64::from(self.config.wave.slot_ms),
        );
        let presenter = WavePresenter::new(&self.context, action, sound.format, source);
        Ok(self.register(presenter.into()))
    }

    /// Reusable-sound cache.
    pub fn cache(&self) -> &SoundCache {
        &self.cache
    }

    /// Reusable-sound cache, mutably.
    pub fn cache_mut(&mut self) -> &mut SoundCache {
        &mut self.cache
    }

    /// Look up a live presenter.
    pub fn presenter(&self, id: PresenterId) -> Option<&PresenterVariant> {
        self.presenters.iter().find(|p| p.id() == id)
    }

    /// Look up a live presenter, mutably.
    pub fn presenter_mut(&mut self, id: PresenterId) -> Option<&mut PresenterVariant> {
        self.presenters.iter_mut().find(|p| p.id() == id)
    }

    /// Live presenters.
    pub fn len(&self) -> usize {
        self.presenters.len()
    }

    /// True when no presenter is live.
    pub fn is_empty(&self) -> bool {
        self.presenters.is_empty()
    }

    /// Output mode chosen at creation.
    pub fn output_mode(&self) -> OutputMode {
        self.output_mode
    }

    /// Capabilities reported by the device.
    pub fn device_caps(&self) -> DeviceCaps {
        self.caps
    }

    /// Configuration the manager was created with.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Stop every presenter. Called on drop; safe to call twice.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        for mut presenter in self.presenters.drain(..) {
            presenter.end(ActionOutcome::Stopped);
        }
        log::info!("sound manager shut down after {} ticks", self.ticks);
    }
}

impl Drop for SoundManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
