//! In-process adapters for tests and the `--demo` mode.

use std::collections::VecDeque;
use std::time::Duration;

use super::{Adapter, AdapterError};
use crate::models::{PlaybackStatus, RawCandidate};

/// Reports the same candidates on every poll.
#[derive(Debug, Clone)]
pub struct FixedAdapter {
    name: String,
    candidates: Vec<RawCandidate>,
}

impl FixedAdapter {
    pub fn new(name: impl Into<String>, candidates: Vec<RawCandidate>) -> Self {
        Self {
            name: name.into(),
            candidates,
        }
    }
}

impl Adapter for FixedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll(&mut self) -> Result<Vec<RawCandidate>, AdapterError> {
        Ok(self.candidates.clone())
    }
}

/// One scripted poll result.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Emit(Vec<RawCandidate>),
    Fail(String),
}

/// Replays a fixed sequence of poll results, then goes quiet.
#[derive(Debug, Clone)]
pub struct ScriptedAdapter {
    name: String,
    steps: VecDeque<ScriptStep>,
}

impl ScriptedAdapter {
    pub fn new(name: impl Into<String>, steps: Vec<ScriptStep>) -> Self {
        Self {
            name: name.into(),
            steps: steps.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

impl Adapter for ScriptedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll(&mut self) -> Result<Vec<RawCandidate>, AdapterError> {
        match self.steps.pop_front() {
            Some(ScriptStep::Emit(candidates)) => Ok(candidates),
            Some(ScriptStep::Fail(reason)) => Err(AdapterError::Unavailable(reason)),
            None => Ok(Vec::new()),
        }
    }
}

struct DemoTrack {
    title: &'static str,
    artist: &'static str,
    album: &'static str,
    duration_ms: i64,
}

const DEMO_PLAYLIST: &[DemoTrack] = &[
    DemoTrack {
        title: "Gymnopédie No. 1",
        artist: "Erik Satie",
        album: "Trois Gymnopédies",
        duration_ms: 185_000,
    },
    DemoTrack {
        title: "Clair de lune",
        artist: "Claude Debussy",
        album: "Suite bergamasque",
        duration_ms: 300_000,
    },
    DemoTrack {
        title: "Spiegel im Spiegel",
        artist: "Arvo Pärt",
        album: "Alina",
        duration_ms: 540_000,
    },
];

/// A fake player that works through a small playlist in real time.
///
/// Every poll advances the position by `step`; at the end of a track it
/// moves on to the next one and wraps around.
#[derive(Debug, Clone)]
pub struct DemoAdapter {
    step: Duration,
    track: usize,
    position_ms: i64,
}

impl DemoAdapter {
    pub const NAME: &'static str = "demo";

    pub fn new(step: Duration) -> Self {
        Self {
            step,
            track: 0,
            position_ms: 0,
        }
    }

    fn advance(&mut self) {
        self.position_ms += self.step.as_millis() as i64;
        if self.position_ms >= DEMO_PLAYLIST[self.track].duration_ms {
            self.position_ms = 0;
            self.track = (self.track + 1) % DEMO_PLAYLIST.len();
        }
    }
}

impl Adapter for DemoAdapter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn poll(&mut self) -> Result<Vec<RawCandidate>, AdapterError> {
        let track = &DEMO_PLAYLIST[self.track];
        let candidate = RawCandidate::new("Demo Player")
            .title(track.title)
            .artist(track.artist)
            .album(track.album)
            .duration_ms(track.duration_ms)
            .position_ms(self.position_ms)
            .status(PlaybackStatus::Playing);
        self.advance();
        Ok(vec![candidate])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_adapter_replays_then_goes_quiet() {
        let mut adapter = ScriptedAdapter::new(
            "script",
            vec![
                ScriptStep::Emit(vec![RawCandidate::new("a")]),
                ScriptStep::Fail("gone".into()),
            ],
        );
        assert_eq!(adapter.poll().unwrap().len(), 1);
        assert!(matches!(adapter.poll(), Err(AdapterError::Unavailable(_))));
        assert_eq!(adapter.remaining(), 0);
        assert!(adapter.poll().unwrap().is_empty());
    }

    #[test]
    fn test_demo_adapter_advances_and_wraps() {
        let mut adapter = DemoAdapter::new(Duration::from_secs(100));

        let first = adapter.poll().unwrap().remove(0);
        assert_eq!(first.title, "Gymnopédie No. 1");
        assert_eq!(first.position_ms, Some(0));

        let second = adapter.poll().unwrap().remove(0);
        assert_eq!(second.position_ms, Some(100_000));

        // 200s is past the 185s first track.
        let third = adapter.poll().unwrap().remove(0);
        assert_eq!(third.title, "Clair de lune");
        assert_eq!(third.position_ms, Some(0));
    }
}
