//! In-memory output for engine tests.

use std::collections::HashMap;

use super::{OutputError, PlaybackOutput};

#[derive(Debug, Default)]
pub struct FakeOutput {
    pub loaded: Option<String>,
    pub loads: Vec<String>,
    pub playing: bool,
    pub elapsed: f64,
    pub finished: bool,
    pub volume: f32,
    pub durations: HashMap<String, f64>,
    /// Keys whose `load` fails.
    pub broken: Vec<String>,
}

impl FakeOutput {
    pub fn with_durations(durations: &[(&str, f64)]) -> Self {
        Self {
            durations: durations.iter().map(|(k, d)| (k.to_string(), *d)).collect(),
            volume: 1.0,
            ..Self::default()
        }
    }
}

impl PlaybackOutput for FakeOutput {
    fn load(&mut self, key: &str) -> Result<(), OutputError> {
        self.loads.push(key.to_string());
        self.playing = false;
        self.elapsed = 0.0;
        self.finished = false;
        if self.broken.iter().any(|k| k == key) {
            self.loaded = None;
            return Err(OutputError::Unplayable(key.to_string()));
        }
        self.loaded = Some(key.to_string());
        Ok(())
    }

    fn play(&mut self) {
        self.playing = self.loaded.is_some();
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn stop(&mut self) {
        self.loaded = None;
        self.playing = false;
        self.elapsed = 0.0;
    }

    fn seek(&mut self, seconds: f64) -> Result<(), OutputError> {
        self.elapsed = seconds;
        Ok(())
    }

    fn elapsed(&self) -> f64 {
        self.elapsed
    }

    fn duration(&self) -> Option<f64> {
        self.loaded.as_ref().and_then(|k| self.durations.get(k)).copied()
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    fn is_finished(&self) -> bool {
        self.finished || self.loaded.is_none()
    }
}
