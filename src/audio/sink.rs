use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};

use super::{OutputError, PlaybackOutput};

/// `rodio` sink on the default output device.
pub struct RodioOutput {
    stream: OutputStream,
    sink: Option<Sink>,
    duration: Option<f64>,
    volume: f32,
}

impl RodioOutput {
    pub fn open_default(volume: f32) -> Result<Self, OutputError> {
        let mut stream = OutputStreamBuilder::open_default_stream()
            .map_err(|e| OutputError::Device(e.to_string()))?;
        // rodio reports the stream drop on stderr, which interleaves with our output.
        stream.log_on_drop(false);
        Ok(Self {
            stream,
            sink: None,
            duration: None,
            volume,
        })
    }
}

fn is_remote(key: &str) -> bool {
    key.starts_with("http://") || key.starts_with("https://")
}

impl PlaybackOutput for RodioOutput {
    fn load(&mut self, key: &str) -> Result<(), OutputError> {
        self.stop();
        if is_remote(key) {
            return Err(OutputError::Unplayable(key.to_string()));
        }

        let path = PathBuf::from(key);
        let file = File::open(&path).map_err(|source| OutputError::Open {
            path: path.clone(),
            source,
        })?;
        let source = Decoder::new(BufReader::new(file)).map_err(|e| OutputError::Decode {
            path: path.clone(),
            message: e.to_string(),
        })?;

        self.duration = source.total_duration().map(|d| d.as_secs_f64());
        let sink = Sink::connect_new(self.stream.mixer());
        sink.set_volume(self.volume);
        sink.append(source);
        sink.pause();
        self.sink = Some(sink);
        Ok(())
    }

    fn play(&mut self) {
        if let Some(sink) = &self.sink {
            sink.play();
        }
    }

    fn pause(&mut self) {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.duration = None;
    }

    fn seek(&mut self, seconds: f64) -> Result<(), OutputError> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        sink.try_seek(Duration::from_secs_f64(seconds.max(0.0)))
            .map_err(|e| OutputError::Seek(e.to_string()))
    }

    fn elapsed(&self) -> f64 {
        self.sink
            .as_ref()
            .map(|s| s.get_pos().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        if let Some(sink) = &self.sink {
            sink.set_volume(volume);
        }
    }

    fn is_finished(&self) -> bool {
        self.sink.as_ref().map(Sink::empty).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::is_remote;

    #[test]
    fn remote_keys_are_recognized() {
        assert!(is_remote("https://example.com/ep.mp3"));
        assert!(is_remote("http://example.com/ep.mp3"));
        assert!(!is_remote("/music/a.mp3"));
    }
}
