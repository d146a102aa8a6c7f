//! Shared manager with an optional timer-thread tick driver
//!
//! With [`TickMode::TimerThread`] a dedicated thread ticks the manager at a
//! fixed interval. Control calls from other threads lock the same mutex, so a
//! tick and a `set_volume` never interleave.

use super::SoundManager;
use crate::config::{ManagerConfig, TickMode};
use crate::hardware::AudioHardware;
use crate::Result;
use crossbeam_channel::{RecvTimeoutError, Sender};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct TimerThread {
    shutdown: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl TimerThread {
    fn spawn(manager: Arc<Mutex<SoundManager>>, interval: Duration) -> Result<Self> {
        let (shutdown, signal) = crossbeam_channel::bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("tickle-timer".into())
            .spawn(move || loop {
                match signal.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => manager.lock().tick_now(),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;
        log::debug!("timer thread ticking every {interval:?}");
        Ok(TimerThread {
            shutdown,
            handle: Some(handle),
        })
    }

    fn stop(&mut self) {
        let _ = self.shutdown.try_send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("timer thread panicked");
            }
        }
    }
}

impl Drop for TimerThread {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A [`SoundManager`] behind a mutex, ticked externally or by a timer thread.
pub struct SoundSystem {
    manager: Arc<Mutex<SoundManager>>,
    timer: Option<TimerThread>,
}

impl SoundSystem {
    /// Create the manager and, for `TickMode::TimerThread`, start ticking it.
    pub fn start(hardware: Box<dyn AudioHardware>, config: ManagerConfig) -> Result<Self> {
        let manager = Arc::new(Mutex::new(SoundManager::create(hardware, config)?));
        let timer = match config.tick_mode {
            TickMode::External => None,
            TickMode::TimerThread { interval_ms } => Some(TimerThread::spawn(
                Arc::clone(&manager),
                Duration::from_millis(interval_ms),
            )?),
        };
        Ok(SoundSystem { manager, timer })
    }

    /// Lock the manager.
    pub fn manager(&self) -> MutexGuard<'_, SoundManager> {
        self.manager.lock()
    }

    /// Shared handle to the manager.
    pub fn handle(&self) -> Arc<Mutex<SoundManager>> {
        Arc::clone(&self.manager)
    }

    /// True when a timer thread drives the ticks.
    pub fn is_timer_driven(&self) -> bool {
        self.timer.is_some()
    }

    /// Run one pass at `now_ms`. Meant for `TickMode::External`.
    pub fn tick(&self, now_ms: u64) {
        self.manager.lock().tick(now_ms);
    }

    /// Set the global volume.
    pub fn set_volume(&self, volume: u8) {
        self.manager.lock().set_volume(volume);
    }

    /// Pause every wave presenter.
    pub fn pause(&self) {
        self.manager.lock().pause();
    }

    /// Resume every wave presenter.
    pub fn resume(&self) {
        self.manager.lock().resume();
    }

    /// Stop the timer thread and every presenter.
    pub fn shutdown(&mut self) {
        if let Some(mut timer) = self.timer.take() {
            timer.stop();
        }
        self.manager.lock().shutdown();
    }
}

impl Drop for SoundSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimulatedHardware;
    use std::time::Instant;

    #[test]
    fn test_external_mode_has_no_thread() {
        let system =
            SoundSystem::start(Box::new(SimulatedHardware::new()), ManagerConfig::default())
                .unwrap();
        assert!(!system.is_timer_driven());
        system.tick(0);
        assert_eq!(system.manager().tick_count(), 1);
    }

    #[test]
    fn test_timer_thread_ticks_and_stops() {
        let mut config = ManagerConfig::default();
        config.tick_mode = TickMode::TimerThread { interval_ms: 2 };
        let mut system = SoundSystem::start(Box::new(SimulatedHardware::new()), config).unwrap();
        assert!(system.is_timer_driven());

        let deadline = Instant::now() + Duration::from_secs(5);
        while system.manager().tick_count() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(system.manager().tick_count() >= 3);

        system.set_volume(40);
        assert_eq!(system.manager().volume(), 40);

        system.shutdown();
        let after = system.manager().tick_count();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(system.manager().tick_count(), after, "No ticks after shutdown");
    }
}
