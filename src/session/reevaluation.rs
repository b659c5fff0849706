//! Mid-track re-evaluation scheduling.

use std::time::Duration;

/// Decides when, during one track, the quick re-classification runs.
///
/// Only tracks longer than the lead get a re-evaluation, due `lead` before
/// the track ends. It fires at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReEvaluationSchedule {
    due: Option<Duration>,
    fired: bool,
}

impl ReEvaluationSchedule {
    pub fn new(track: Duration, lead: Duration) -> Self {
        Self {
            due: (track > lead).then(|| track - lead),
            fired: false,
        }
    }

    /// Offset from track start at which re-evaluation is due.
    pub fn due_at(&self) -> Option<Duration> {
        self.due
    }

    /// Returns true exactly once, on the first poll at or after the due time.
    pub fn poll(&mut self, elapsed: Duration) -> bool {
        match self.due {
            Some(due) if !self.fired && elapsed >= due => {
                self.fired = true;
                true
            }
            _ => false,
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEAD: Duration = Duration::from_secs(60);

    fn fires_between(schedule: &mut ReEvaluationSchedule, until_secs: u64) -> Vec<u64> {
        (0..=until_secs)
            .filter(|s| schedule.poll(Duration::from_secs(*s)))
            .collect()
    }

    #[test]
    fn test_long_track_fires_once() {
        let mut schedule = ReEvaluationSchedule::new(Duration::from_secs(180), LEAD);
        assert_eq!(schedule.due_at(), Some(Duration::from_secs(120)));
        assert_eq!(fires_between(&mut schedule, 180), vec![120]);
        assert!(schedule.has_fired());
        assert!(!schedule.poll(Duration::from_secs(500)));
    }

    #[test]
    fn test_short_track_never_fires() {
        let mut schedule = ReEvaluationSchedule::new(Duration::from_secs(45), LEAD);
        assert_eq!(schedule.due_at(), None);
        assert!(fires_between(&mut schedule, 100).is_empty());

        // Exactly the lead is not longer than it
        let mut schedule = ReEvaluationSchedule::new(LEAD, LEAD);
        assert!(fires_between(&mut schedule, 100).is_empty());
    }

    #[test]
    fn test_late_poll_still_fires_once() {
        let mut schedule = ReEvaluationSchedule::new(Duration::from_secs(180), LEAD);
        assert!(!schedule.poll(Duration::from_secs(119)));
        assert!(schedule.poll(Duration::from_secs(150)));
        assert!(!schedule.poll(Duration::from_secs(151)));
    }
}
