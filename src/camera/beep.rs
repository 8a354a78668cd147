//! Scan feedback: beep and vibrate

use std::io::{self, Write};
use std::time::Duration;

use tracing::{debug, warn};

pub const VIBRATE_DURATION: Duration = Duration::from_millis(200);

/// Audio/haptic output device.
pub trait FeedbackSink: Send {
    fn beep(&mut self) -> io::Result<()>;

    fn vibrate(&mut self, duration: Duration) -> io::Result<()>;

    fn has_vibrator(&self) -> bool {
        true
    }
}

/// Rings the terminal bell; cannot vibrate.
#[derive(Debug, Default)]
pub struct TerminalBell;

impl FeedbackSink for TerminalBell {
    fn beep(&mut self) -> io::Result<()> {
        let mut stderr = io::stderr().lock();
        stderr.write_all(b"\x07")?;
        stderr.flush()
    }

    fn vibrate(&mut self, _duration: Duration) -> io::Result<()> {
        Ok(())
    }

    fn has_vibrator(&self) -> bool {
        false
    }
}

/// Plays feedback on a successful scan.
///
/// Sink failures are logged and never interrupt scanning.
pub struct BeepManager {
    sink: Option<Box<dyn FeedbackSink>>,
    play_beep: bool,
    vibrate: bool,
}

impl BeepManager {
    pub fn new(sink: Option<Box<dyn FeedbackSink>>, play_beep: bool, vibrate: bool) -> Self {
        Self {
            sink,
            play_beep,
            vibrate,
        }
    }

    pub fn set_play_beep(&mut self, play_beep: bool) {
        self.play_beep = play_beep;
    }

    pub fn set_vibrate(&mut self, vibrate: bool) {
        self.vibrate = vibrate;
    }

    pub fn set_sink(&mut self, sink: Box<dyn FeedbackSink>) {
        self.sink = Some(sink);
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_none()
    }

    pub fn play_beep_and_vibrate(&mut self) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        if self.play_beep {
            if let Err(e) = sink.beep() {
                warn!(error = %e, "beep failed");
            }
        }
        if self.vibrate && sink.has_vibrator() {
            if let Err(e) = sink.vibrate(VIBRATE_DURATION) {
                warn!(error = %e, "vibrate failed");
            }
        }
    }

    /// Release the output device. Idempotent.
    pub fn close(&mut self) {
        if self.sink.take().is_some() {
            debug!("feedback sink closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default, Clone)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl FeedbackSink for Recorder {
        fn beep(&mut self) -> io::Result<()> {
            self.0.lock().unwrap().push("beep".into());
            Ok(())
        }

        fn vibrate(&mut self, duration: Duration) -> io::Result<()> {
            self.0.lock().unwrap().push(format!("vibrate {}ms", duration.as_millis()));
            Ok(())
        }
    }

    #[test]
    fn test_flags_select_feedback() {
        let recorder = Recorder::default();
        let mut beep = BeepManager::new(Some(Box::new(recorder.clone())), true, false);
        beep.play_beep_and_vibrate();
        beep.set_vibrate(true);
        beep.set_play_beep(false);
        beep.play_beep_and_vibrate();
        assert_eq!(*recorder.0.lock().unwrap(), vec!["beep", "vibrate 200ms"]);
    }

    #[test]
    fn test_closed_is_silent() {
        let recorder = Recorder::default();
        let mut beep = BeepManager::new(Some(Box::new(recorder.clone())), true, true);
        beep.close();
        beep.close();
        assert!(beep.is_closed());
        beep.play_beep_and_vibrate();
        assert!(recorder.0.lock().unwrap().is_empty());
    }
}
