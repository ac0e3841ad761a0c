/// Filters the raw power-status line into a stable logical status.
///
/// The line is noisy around power transitions, so a candidate value must hold
/// for the full debounce window before it becomes the reported status. Any
/// observed flip restarts the window with the new candidate.
#[derive(Debug, Clone)]
pub struct InputDebouncer {
    window_ms: u64,
    invert: bool,
    stable: Option<bool>,
    candidate: Option<bool>,
    unstable_since_ms: u64,
}

impl InputDebouncer {
    pub fn new(window_ms: u64, invert: bool) -> Self {
        Self {
            window_ms,
            invert,
            stable: None,
            candidate: None,
            unstable_since_ms: 0,
        }
    }

    /// Current debounced status; `None` until a first value has survived a
    /// full window.
    pub fn status(&self) -> Option<bool> {
        self.stable
    }

    /// Restart the hold window, keeping the current candidate. Used after a
    /// blocking reconnect, where elapsed time says nothing about the line.
    pub fn restart_window(&mut self, now_ms: u64) {
        self.unstable_since_ms = now_ms;
    }

    /// Feed one raw sample. Returns `Some(new_status)` exactly on the tick
    /// where a held-steady sample first crosses the debounce window.
    pub fn feed(&mut self, raw: bool, now_ms: u64) -> Option<bool> {
        let sample = raw ^ self.invert;

        if self.candidate != Some(sample) {
            self.candidate = Some(sample);
            self.unstable_since_ms = now_ms;
        }

        if now_ms.saturating_sub(self.unstable_since_ms) >= self.window_ms
            && self.stable != Some(sample)
        {
            self.stable = Some(sample);
            return Some(sample);
        }

        None
    }
}
