//! Integration tests for music, event and timer-driven presentation
//!
//! Music completion callbacks fire from a foreign thread; the presenter only
//! reacts on its own tick.

#![cfg(feature = "music")]

use std::thread;
use std::time::{Duration, Instant};

use tickle_audio::{
    Action, ActionOutcome, ChannelSink, Chunk, EventPresenter, LoopCount, ManagerConfig,
    MemorySource, MusicPresenter, SimulatedHardware, SimulatedSequencer, SoundManager,
    SoundSystem, TickMode, TickleState,
};

fn manager() -> SoundManager {
    SoundManager::create(Box::new(SimulatedHardware::new()), ManagerConfig::default()).unwrap()
}

#[test]
fn test_music_callback_from_driver_thread() {
    let mut manager = manager();
    let sequencer = SimulatedSequencer::new();
    let presenter = MusicPresenter::new(
        &manager.context(),
        Action::once(7, "theme").looped(LoopCount::Finite(3)),
        MemorySource::new(vec![Chunk::new(0, vec![0x90, 0x40, 0x7F])]),
        sequencer.clone(),
    );
    let id = manager.register(presenter.into());

    manager.tick(0);
    manager.tick(1);
    assert_eq!(sequencer.submissions(), 1);

    for pass in 2..=3 {
        let driver = sequencer.clone();
        thread::spawn(move || assert!(driver.complete_current()))
            .join()
            .unwrap();
        assert_eq!(
            sequencer.submissions(),
            pass - 1,
            "Nothing is resubmitted until the next tick"
        );
        manager.tick(pass as u64);
        assert_eq!(sequencer.submissions(), pass);
        assert_eq!(
            manager.presenter(id).unwrap().state(),
            TickleState::Repeating
        );
    }

    sequencer.complete_current();
    manager.tick(10);
    assert!(manager.presenter(id).is_none());
    let end = manager.completions().try_recv().unwrap();
    assert_eq!(end.outcome, ActionOutcome::Completed);
    assert!(manager.completions().try_recv().is_err());
}

#[test]
fn test_music_volume_follows_manager() {
    let mut manager = manager();
    let sequencer = SimulatedSequencer::new();
    let presenter = MusicPresenter::new(
        &manager.context(),
        Action::once(1, "theme").with_volume(50),
        MemorySource::new(vec![Chunk::new(0, vec![1, 2, 3])]),
        sequencer.clone(),
    );
    let id = manager.register(presenter.into());
    manager.tick(0);

    manager.set_volume(60);
    assert_eq!(sequencer.volume(), 30);
    manager.set_presenter_enabled(id, false);
    assert_eq!(sequencer.volume(), 0);
}

#[test]
fn test_event_chunks_delivered_on_schedule() {
    let mut manager = manager();
    let (sink, events) = ChannelSink::new();
    let source = MemorySource::new(vec![
        Chunk::new(0, b"open".to_vec()),
        Chunk::new(50, b"close".to_vec()),
    ]);
    let presenter = EventPresenter::new(
        &manager.context(),
        Action::once(3, "cues").starting_at(100),
        source,
        sink,
    );
    manager.register(presenter.into());

    for now in [0, 50, 99] {
        manager.tick(now);
    }
    assert!(events.try_recv().is_err(), "Nothing before the scheduled start");

    manager.tick(100);
    manager.tick(120);
    let (action, chunk) = events.try_recv().unwrap();
    assert_eq!(action.0, 3);
    assert_eq!(chunk.payload(), b"open");
    assert!(events.try_recv().is_err());

    manager.tick(150);
    manager.tick(151);
    let (_, chunk) = events.try_recv().unwrap();
    assert_eq!(chunk.payload(), b"close");
    assert!(manager.is_empty());
    assert_eq!(
        manager.completions().try_recv().unwrap().outcome,
        ActionOutcome::Completed
    );
}

#[test]
fn test_timer_thread_drives_music_to_completion() {
    let config = ManagerConfig {
        tick_mode: TickMode::TimerThread { interval_ms: 1 },
        ..ManagerConfig::default()
    };
    let system = SoundSystem::start(Box::new(SimulatedHardware::new()), config).unwrap();
    assert!(system.is_timer_driven());

    let sequencer = SimulatedSequencer::new();
    {
        let mut manager = system.manager();
        let presenter = MusicPresenter::new(
            &manager.context(),
            Action::once(1, "jingle"),
            MemorySource::new(vec![Chunk::new(0, vec![1])]),
            sequencer.clone(),
        );
        manager.register(presenter.into());
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while sequencer.submissions() == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(sequencer.submissions(), 1);
    sequencer.complete_current();

    // Clone the receiver so the manager lock is not held while waiting.
    let completions = system.manager().completions().clone();
    let end = completions.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(end.outcome, ActionOutcome::Completed);
}
