//! Integration tests for the player driven by a real-time timer output.

mod common;

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{
    player, small_ring, wait_until, Event, FinishOnly, RecordingDelegate, ToneBackend,
};
use core_playback::{
    DecoderBackend, OpusPlayer, PacketDecoder, PlaybackError, PlaybackState, PlayerConfig,
    PlayerDelegate,
};
use mockall::mock;

const FRAME_SECS: f64 = 0.02;

fn install(player: &OpusPlayer, recorder: &Arc<RecordingDelegate>) {
    let delegate: Arc<dyn PlayerDelegate> = recorder.clone();
    player.set_delegate(&delegate);
}

// ============================================================================
// Open
// ============================================================================

#[test]
fn test_open_ten_second_track() {
    let backend = ToneBackend::new().with_track("/music/ten.opus", 10.0);
    let player = player(backend.clone(), small_ring());

    assert!(backend.can_decode(Path::new("/music/ten.opus")));
    assert_eq!(player.state(), PlaybackState::Idle);
    assert_eq!(player.duration(), 0.0);
    assert_eq!(player.current_position(true), 0.0);

    player.open("/music/ten.opus").unwrap();

    assert_eq!(player.state(), PlaybackState::Stopped);
    assert_eq!(player.duration(), 10.0);
    assert_eq!(player.current_position(true), 0.0);
    assert!(!player.is_playing());
    assert!(!player.is_paused());
    let info = player.track_info().unwrap();
    assert_eq!(info.sample_rate, 48_000);
    assert_eq!(info.channels, 1);
}

#[test]
fn test_open_rejects_undecodable_file() {
    let backend = ToneBackend::new();
    let player = player(backend.clone(), small_ring());

    assert!(!backend.can_decode(Path::new("/music/broken.opus")));
    let err = player.open("/music/broken.opus").unwrap_err();

    assert!(matches!(err, PlaybackError::UnsupportedFormat(_)));
    assert_eq!(player.state(), PlaybackState::Idle);
    assert!(player.path().is_none());
}

#[test]
fn test_failed_open_keeps_previous_track() {
    let backend = ToneBackend::new().with_track("/music/a.opus", 3.0);
    let player = player(backend, small_ring());
    player.open("/music/a.opus").unwrap();
    player.set_current_position(1.0).unwrap();

    assert!(player.open("/music/missing.opus").is_err());

    assert_eq!(player.state(), PlaybackState::Stopped);
    assert!(player.is_equal_to_path("/music/a.opus"));
    assert!((player.current_position(true) - 1.0).abs() < 1e-9);
}

#[test]
fn test_open_replaces_playing_track() {
    let backend = ToneBackend::new()
        .with_track("/music/a.opus", 5.0)
        .with_track("/music/b.opus", 2.0);
    let player = player(backend.clone(), small_ring());

    player.open("/music/a.opus").unwrap();
    player.play().unwrap();
    thread::sleep(Duration::from_millis(30));

    player.open("/music/b.opus").unwrap();

    assert_eq!(backend.opened(), 2);
    assert_eq!(player.state(), PlaybackState::Stopped);
    assert_eq!(player.duration(), 2.0);
    assert_eq!(player.current_position(true), 0.0);
    assert!(player.is_equal_to_path("/music/b.opus"));
}

// ============================================================================
// Transport
// ============================================================================

#[test]
fn test_play_advances_position() {
    let backend = ToneBackend::new().with_track("/music/ten.opus", 10.0);
    let player = player(backend, small_ring());
    player.open("/music/ten.opus").unwrap();

    player.play().unwrap();
    assert_eq!(player.state(), PlaybackState::Playing);
    thread::sleep(Duration::from_millis(50));

    let position = player.current_position(false);
    assert!(position > 0.0, "position did not advance: {position}");
    assert!(position <= 0.07, "position ran ahead: {position}");
}

#[test]
fn test_operations_without_track_are_noops() {
    let player = player(ToneBackend::new(), small_ring());

    player.play().unwrap();
    player.pause().unwrap();
    player.play_from(3.0).unwrap();
    player.set_current_position(1.0).unwrap();
    player.stop().unwrap();

    assert_eq!(player.state(), PlaybackState::Idle);
    assert_eq!(player.current_position(true), 0.0);
}

#[test]
fn test_pause_and_resume_without_jump() {
    let backend = ToneBackend::new().with_track("/music/ten.opus", 10.0);
    let player = player(backend, small_ring());
    player.open("/music/ten.opus").unwrap();
    player.play().unwrap();
    thread::sleep(Duration::from_millis(100));

    player.pause().unwrap();
    assert!(player.is_paused());
    let paused_at = player.current_position(true);
    assert!(paused_at > 0.0);

    thread::sleep(Duration::from_millis(50));
    assert_eq!(player.current_position(true), paused_at);

    player.play().unwrap();
    let resumed_at = player.current_position(true);
    assert!(resumed_at >= paused_at);
    assert!(resumed_at - paused_at <= FRAME_SECS, "jumped from {paused_at} to {resumed_at}");
}

#[test]
fn test_pause_when_stopped_is_noop() {
    let backend = ToneBackend::new().with_track("/music/a.opus", 1.0);
    let player = player(backend, small_ring());
    player.open("/music/a.opus").unwrap();

    player.pause().unwrap();

    assert_eq!(player.state(), PlaybackState::Stopped);
}

#[test]
fn test_stop_rewinds_and_is_idempotent() {
    let backend = ToneBackend::new().with_track("/music/ten.opus", 10.0);
    let player = player(backend, small_ring());
    player.open("/music/ten.opus").unwrap();
    player.play().unwrap();
    thread::sleep(Duration::from_millis(40));

    player.stop().unwrap();
    player.stop().unwrap();

    assert_eq!(player.state(), PlaybackState::Stopped);
    assert_eq!(player.current_position(true), 0.0);
    thread::sleep(Duration::from_millis(30));
    assert_eq!(player.current_position(true), 0.0);
}

#[test]
fn test_concurrent_stop_calls() {
    let backend = ToneBackend::new().with_track("/music/ten.opus", 10.0);
    let player = player(backend, small_ring());
    player.open("/music/ten.opus").unwrap();
    player.play().unwrap();
    thread::sleep(Duration::from_millis(20));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let player = player.clone();
            thread::spawn(move || player.stop())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(player.state(), PlaybackState::Stopped);
    assert_eq!(player.current_position(true), 0.0);
}

#[test]
fn test_play_after_stop_starts_over() {
    let backend = ToneBackend::new().with_track("/music/ten.opus", 10.0);
    let player = player(backend, small_ring());
    player.open("/music/ten.opus").unwrap();
    player.play_from(4.0).unwrap();
    player.stop().unwrap();

    player.play().unwrap();
    thread::sleep(Duration::from_millis(40));

    let position = player.current_position(true);
    assert!(position < 1.0, "did not restart from zero: {position}");
}

// ============================================================================
// Seeking
// ============================================================================

#[test]
fn test_play_from_converges() {
    let backend = ToneBackend::new().with_track("/music/ten.opus", 10.0);
    let player = player(backend, small_ring());
    player.open("/music/ten.opus").unwrap();

    for target in [0.0, 2.5, 7.3, 0.51] {
        player.play_from(target).unwrap();
        assert_eq!(player.state(), PlaybackState::Playing);
        let position = player.current_position(true);
        assert!(
            (position - target).abs() <= FRAME_SECS,
            "seek to {target} landed at {position}"
        );

        thread::sleep(Duration::from_millis(40));
        let position = player.current_position(true);
        assert!(position >= target, "went backwards from {target} to {position}");
        assert!(position - target < 0.2, "ran away from {target} to {position}");
    }
}

#[test]
fn test_play_from_clamps_to_track() {
    let backend = ToneBackend::new().with_track("/music/ten.opus", 10.0);
    let player = player(backend, small_ring());
    player.open("/music/ten.opus").unwrap();

    player.play_from(-3.0).unwrap();
    assert!(player.current_position(true) < FRAME_SECS);

    player.play_from(f64::NAN).unwrap();
    assert!(player.current_position(true) < FRAME_SECS);

    player.pause().unwrap();
    player.set_current_position(99.0).unwrap();
    assert_eq!(player.current_position(true), 10.0);
}

#[test]
fn test_set_position_keeps_state() {
    let backend = ToneBackend::new().with_track("/music/ten.opus", 10.0);
    let player = player(backend, small_ring());
    player.open("/music/ten.opus").unwrap();

    player.set_current_position(3.0).unwrap();
    assert_eq!(player.state(), PlaybackState::Stopped);
    assert!((player.current_position(true) - 3.0).abs() < 1e-9);

    player.play().unwrap();
    player.pause().unwrap();
    player.set_current_position(6.0).unwrap();
    assert_eq!(player.state(), PlaybackState::Paused);
    assert!((player.current_position(true) - 6.0).abs() < 1e-9);

    player.play().unwrap();
    player.set_current_position(1.0).unwrap();
    assert_eq!(player.state(), PlaybackState::Playing);
    let position = player.current_position(true);
    assert!((1.0..1.0 + FRAME_SECS).contains(&position));
}

// ============================================================================
// Completion
// ============================================================================

#[test]
fn test_short_track_finishes_once_on_main_queue() {
    let backend = ToneBackend::new().with_track("/music/short.opus", 0.5);
    let player = player(backend, small_ring());
    let recorder = RecordingDelegate::new();
    install(&player, &recorder);
    player.open("/music/short.opus").unwrap();

    let started = Instant::now();
    player.play().unwrap();

    assert!(wait_until(Duration::from_secs(3), || recorder.count(Event::Finished) == 1));
    assert!(started.elapsed() >= Duration::from_millis(400));
    thread::sleep(Duration::from_millis(100));

    assert_eq!(recorder.count(Event::Finished), 1);
    assert_eq!(recorder.off_main(), 0);
    assert_eq!(player.state(), PlaybackState::Finished);
    assert_eq!(player.current_position(true), 0.5);
    assert_eq!(player.current_position(false), 0.5);
}

#[test]
fn test_optional_notifications() {
    let backend = ToneBackend::new().with_track("/music/ten.opus", 10.0);
    let player = player(backend, small_ring());
    let recorder = RecordingDelegate::new();
    install(&player, &recorder);
    player.open("/music/ten.opus").unwrap();

    player.play().unwrap();
    player.pause().unwrap();
    player.pause().unwrap();

    assert!(wait_until(Duration::from_secs(1), || recorder.events().len() == 2));
    assert_eq!(recorder.events(), vec![Event::Started, Event::Paused]);
    assert_eq!(recorder.off_main(), 0);
}

#[test]
fn test_finished_track_can_be_replayed() {
    let backend = ToneBackend::new().with_track("/music/short.opus", 0.3);
    let player = player(backend, small_ring());
    let recorder = RecordingDelegate::new();
    install(&player, &recorder);
    player.open("/music/short.opus").unwrap();
    player.play().unwrap();
    assert!(wait_until(Duration::from_secs(3), || recorder.count(Event::Finished) == 1));

    // Play alone does not leave Finished.
    player.play().unwrap();
    assert_eq!(player.state(), PlaybackState::Finished);

    player.set_current_position(0.1).unwrap();
    assert_eq!(player.state(), PlaybackState::Paused);

    player.play_from(0.0).unwrap();
    assert_eq!(player.state(), PlaybackState::Playing);
    assert!(wait_until(Duration::from_secs(3), || recorder.count(Event::Finished) == 2));
    assert_eq!(player.state(), PlaybackState::Finished);
}

#[test]
fn test_play_from_end_finishes() {
    let backend = ToneBackend::new().with_track("/music/ten.opus", 10.0);
    let player = player(backend, small_ring());
    let recorder = RecordingDelegate::new();
    install(&player, &recorder);
    player.open("/music/ten.opus").unwrap();

    player.play_from(10.0).unwrap();

    assert!(wait_until(Duration::from_secs(1), || recorder.count(Event::Finished) == 1));
    assert_eq!(player.state(), PlaybackState::Finished);
    assert_eq!(player.current_position(true), 10.0);
}

#[test]
fn test_stop_before_end_suppresses_finish() {
    let backend = ToneBackend::new().with_track("/music/short.opus", 0.2);
    let player = player(backend, small_ring());
    let recorder = RecordingDelegate::new();
    install(&player, &recorder);
    player.open("/music/short.opus").unwrap();

    player.play().unwrap();
    thread::sleep(Duration::from_millis(60));
    player.stop().unwrap();
    thread::sleep(Duration::from_millis(400));

    assert_eq!(recorder.count(Event::Finished), 0);
    assert_eq!(player.state(), PlaybackState::Stopped);
}

#[test]
fn test_corrupt_stream_finishes_early() {
    // Packets from 200 ms on are undecodable.
    let backend = ToneBackend::new().with_corrupt_track("/music/bad.opus", 5.0, 10);
    let player = player(backend, small_ring());
    let recorder = RecordingDelegate::new();
    install(&player, &recorder);
    player.open("/music/bad.opus").unwrap();

    player.play().unwrap();

    assert!(wait_until(Duration::from_secs(2), || recorder.count(Event::Finished) == 1));
    assert_eq!(player.state(), PlaybackState::Finished);
}

// ============================================================================
// Delegate
// ============================================================================

#[test]
fn test_delegate_is_held_weakly() {
    let backend = ToneBackend::new().with_track("/music/short.opus", 0.2);
    let delegate = Arc::new(FinishOnly::default());
    let player = OpusPlayer::builder()
        .config(small_ring())
        .backend(backend)
        .delegate(delegate.clone())
        .output(Arc::new(bridge_desktop::TimerOutput::default()))
        .build()
        .unwrap();
    assert!(player.has_delegate());

    drop(delegate);
    assert!(!player.has_delegate());

    player.open("/music/short.opus").unwrap();
    player.play().unwrap();
    assert!(wait_until(Duration::from_secs(3), || {
        player.state() == PlaybackState::Finished
    }));
}

#[test]
fn test_clear_delegate() {
    let backend = ToneBackend::new().with_track("/music/short.opus", 0.2);
    let player = player(backend, small_ring());
    let delegate = Arc::new(FinishOnly::default());
    let as_dyn: Arc<dyn PlayerDelegate> = delegate.clone();
    player.set_delegate(&as_dyn);
    player.clear_delegate();
    assert!(!player.has_delegate());

    player.open("/music/short.opus").unwrap();
    player.play().unwrap();
    assert!(wait_until(Duration::from_secs(3), || {
        player.state() == PlaybackState::Finished
    }));
    thread::sleep(Duration::from_millis(50));

    assert_eq!(delegate.finished.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Identity
// ============================================================================

#[test]
fn test_path_identity() {
    let backend = ToneBackend::new()
        .with_track("/music/a.opus", 1.0)
        .with_track("/music/b.opus", 1.0);
    let first = player(backend.clone(), small_ring());
    let second = player(backend.clone(), small_ring());
    let third = player(backend, small_ring());

    assert!(!first.is_equal_to_path("/music/a.opus"));
    assert_ne!(first, second);

    first.open("/music/a.opus").unwrap();
    second.open("/music/a.opus").unwrap();
    third.open("/music/b.opus").unwrap();

    assert!(first.is_equal_to_path("/music/a.opus"));
    assert!(!first.is_equal_to_path("/music/b.opus"));
    assert_eq!(first, second);
    assert_ne!(first, third);
    assert_eq!(first, first.clone());
    assert_eq!(first.path().unwrap(), Path::new("/music/a.opus"));
}

#[test]
fn test_weak_handle() {
    let backend = ToneBackend::new().with_track("/music/a.opus", 1.0);
    let player = player(backend, small_ring());
    let weak = player.downgrade();

    assert_eq!(weak.upgrade().unwrap(), player);
    drop(player);
    assert!(weak.upgrade().is_none());
}

#[test]
fn test_dropping_playing_player() {
    let backend = ToneBackend::new().with_track("/music/ten.opus", 10.0);
    let player = player(backend, small_ring());
    player.open("/music/ten.opus").unwrap();
    player.play().unwrap();
    thread::sleep(Duration::from_millis(20));

    drop(player);
    thread::sleep(Duration::from_millis(20));
}

// ============================================================================
// Builder
// ============================================================================

#[test]
fn test_builder_rejects_invalid_config() {
    let config = PlayerConfig {
        ring_capacity_frames: 0,
        ..PlayerConfig::default()
    };
    let err = OpusPlayer::builder()
        .config(config)
        .output(Arc::new(bridge_desktop::TimerOutput::default()))
        .build()
        .unwrap_err();

    assert!(matches!(err, PlaybackError::InvalidConfig(_)));
}

#[cfg(feature = "desktop-shims")]
#[test]
fn test_builder_default_output() {
    let player = OpusPlayer::builder().backend(ToneBackend::new()).build().unwrap();
    assert_eq!(player.state(), PlaybackState::Idle);
}

#[cfg(not(feature = "desktop-shims"))]
#[test]
fn test_builder_requires_output() {
    let err = OpusPlayer::builder().build().unwrap_err();
    assert!(matches!(err, PlaybackError::CapabilityMissing { .. }));
}

// ============================================================================
// Backend seam
// ============================================================================

mock! {
    pub Backend {}

    impl DecoderBackend for Backend {
        fn can_decode(&self, path: &Path) -> bool;
        fn duration_secs(&self, path: &Path) -> core_playback::Result<f64>;
        fn open(&self, path: &Path) -> core_playback::Result<Box<dyn PacketDecoder>>;
    }
}

#[test]
fn test_open_goes_through_backend() {
    let mut backend = MockBackend::new();
    backend
        .expect_open()
        .times(1)
        .returning(|_| Err(PlaybackError::SourceError("No such file".to_string())));

    let player = OpusPlayer::builder()
        .backend(Arc::new(backend))
        .output(Arc::new(bridge_desktop::TimerOutput::default()))
        .build()
        .unwrap();

    let err = player.open("/music/x.opus").unwrap_err();
    assert!(matches!(err, PlaybackError::SourceError(_)));
    assert_eq!(player.state(), PlaybackState::Idle);
}
