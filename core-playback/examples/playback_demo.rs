//! # Playback Demo
//!
//! Plays an Ogg Opus file, optionally from an offset, and prints the
//! position until the track finishes.
//!
//! Run with:
//! `cargo run --example playback_demo --package core-playback -- <file.opus> [start-secs]`
//!
//! With the default features audio goes to a software-clocked output; add
//! `--features cpal-output` to hear it.

use std::sync::Arc;
use std::time::Duration;

use bridge_traits::time::LogLevel;
use core_async::sync::mpsc;
use core_playback::{can_play, file_duration, OpusPlayer, PlayerConfig, PlayerDelegate};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};

struct Announcer {
    finished: mpsc::UnboundedSender<()>,
}

impl PlayerDelegate for Announcer {
    fn did_finish_playing(&self, player: &OpusPlayer) {
        println!("finished at {:.2}s", player.current_position(true));
        let _ = self.finished.send(());
    }

    fn did_start_playing(&self, player: &OpusPlayer) {
        println!("playing from {:.2}s", player.current_position(true));
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(
        LoggingConfig::default()
            .with_format(LogFormat::Compact)
            .with_level(LogLevel::Debug),
    )?;

    let mut args = std::env::args().skip(1);
    let path = args.next().ok_or("usage: playback_demo <file.opus> [start-secs]")?;
    let start: f64 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(0.0);

    if !can_play(&path) {
        return Err(format!("{path} is not a playable Opus file").into());
    }
    println!("{path}: {:.2}s", file_duration(&path)?);

    let (tx, mut finished) = mpsc::unbounded_channel();
    let delegate: Arc<dyn PlayerDelegate> = Arc::new(Announcer { finished: tx });

    let player = OpusPlayer::builder()
        .config(PlayerConfig::high_stability())
        .delegate(Arc::clone(&delegate))
        .build()?;
    player.open(&path)?;
    player.play_from(start)?;

    let ticker = {
        let player = player.downgrade();
        std::thread::spawn(move || {
            while let Some(player) = player.upgrade() {
                if !player.is_playing() {
                    break;
                }
                println!(
                    "{:>7.2}s / {:.2}s  underruns: {}",
                    player.current_position(false),
                    player.duration(),
                    player.underrun_count()
                );
                drop(player);
                std::thread::sleep(Duration::from_millis(500));
            }
        })
    };

    finished.blocking_recv();
    let _ = ticker.join();
    Ok(())
}
