use std::time::{Duration, Instant};

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(1);

/// Trailing-edge debounce for persisting a working copy.
///
/// Each edit marks the copy dirty and pushes the deadline back; a flush is
/// due once no edit has arrived for the quiet period. The clock is passed
/// in by the caller.
#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet: Duration,
    dirty: bool,
    last_edit: Option<Instant>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Debouncer {
            quiet,
            dirty: false,
            last_edit: None,
        }
    }

    pub fn mark_dirty(&mut self, now: Instant) {
        self.dirty = true;
        self.last_edit = Some(now);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn due(&self, now: Instant) -> bool {
        match (self.dirty, self.last_edit) {
            (true, Some(last)) => now.saturating_duration_since(last) >= self.quiet,
            _ => false,
        }
    }

    /// When the pending flush becomes due, if one is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.last_edit.filter(|_| self.dirty).map(|last| last + self.quiet)
    }

    pub fn clear(&mut self) {
        self.dirty = false;
        self.last_edit = None;
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Debouncer::new(DEFAULT_QUIET_PERIOD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_debouncer_is_never_due() {
        let debouncer = Debouncer::default();
        assert!(!debouncer.due(Instant::now() + Duration::from_secs(60)));
        assert_eq!(debouncer.deadline(), None);
    }

    #[test]
    fn burst_of_edits_coalesces_into_one_flush() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(500));

        debouncer.mark_dirty(start);
        debouncer.mark_dirty(start + Duration::from_millis(300));
        assert!(!debouncer.due(start + Duration::from_millis(600)));
        assert!(debouncer.due(start + Duration::from_millis(800)));
        assert_eq!(debouncer.deadline(), Some(start + Duration::from_millis(800)));

        debouncer.clear();
        assert!(!debouncer.is_dirty());
        assert!(!debouncer.due(start + Duration::from_secs(5)));
    }
}
