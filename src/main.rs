use cantata::{Composition, EngineEvent, Session, beats_to_seconds};
use crossbeam::channel::RecvTimeoutError;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: cantata <composition.json>");
        std::process::exit(2);
    };

    if let Err(e) = run(&path) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let mut composition: Composition = serde_json::from_str(&text)?;
    composition.normalize();

    let mut session = Session::new();
    session.init()?;

    let events = session.events().clone();
    session.play(&composition)?;

    // Let the score play out, plus a tail for the longest release.
    let length = beats_to_seconds(composition.length_beats(), composition.tempo_bpm);
    let deadline = Instant::now() + Duration::from_secs_f64(length + 2.0);

    loop {
        match events.recv_deadline(deadline) {
            Ok(EngineEvent::NoteTriggered {
                track_id,
                pitch,
                at_seconds,
                ..
            }) => info!(track = %track_id, %pitch, t = at_seconds, "note"),
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    session.stop();
    session.dispose();
    Ok(())
}
