//! Sequencing between the two layers
//!
//! The comet may only launch after some starfield has put its first frame on
//! screen, and only once per daemon run. `CometCue` holds that ordering; the
//! Wayland side turns the returned delay into an event loop timer.

use crate::config::CometConfig;
use log::{debug, info};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
enum CueState {
    /// No starfield has reported ready yet
    Waiting,
    /// Ready seen on `output`, timer pending
    Armed { output: String },
    Fired,
    Disabled,
}

#[derive(Debug)]
pub struct CometCue {
    state: CueState,
    delay: Duration,
    /// Only a ready signal from this output arms the cue
    preferred: Option<String>,
}

impl CometCue {
    pub fn new(config: &CometConfig) -> Self {
        let state = if config.enabled {
            CueState::Waiting
        } else {
            info!("Comet disabled");
            CueState::Disabled
        };
        Self {
            state,
            delay: Duration::from_millis(config.delay_ms),
            preferred: config.output.clone(),
        }
    }

    /// Record a starfield ready signal from `output`. Returns the launch
    /// delay the first time a matching output reports, `None` afterwards.
    pub fn arm(&mut self, output: &str) -> Option<Duration> {
        if self.state != CueState::Waiting {
            return None;
        }
        if let Some(preferred) = &self.preferred
            && preferred != output
        {
            debug!("Ready on {} ignored, comet waits for {}", output, preferred);
            return None;
        }
        debug!("Comet cued on {} in {:?}", output, self.delay);
        self.state = CueState::Armed {
            output: output.to_string(),
        };
        Some(self.delay)
    }

    /// Take the output to launch on. Yields exactly once after `arm`.
    pub fn fire(&mut self) -> Option<String> {
        match std::mem::replace(&mut self.state, CueState::Fired) {
            CueState::Armed { output } => Some(output),
            other => {
                self.state = other;
                None
            }
        }
    }

    #[cfg(test)]
    pub fn is_spent(&self) -> bool {
        matches!(self.state, CueState::Fired | CueState::Disabled)
    }
}
