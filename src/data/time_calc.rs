use std::time::Duration;

/// Accumulates per-stage durations across frames.
#[derive(Debug, Default, Clone)]
pub struct TimeCalc {
    frames: usize,
    stages: Vec<(&'static str, Duration)>,
}

impl TimeCalc {
    pub fn add(&mut self, stage: &'static str, elapsed: Duration) {
        match self.stages.iter_mut().find(|(name, _)| *name == stage) {
            Some((_, total)) => *total += elapsed,
            None => self.stages.push((stage, elapsed)),
        }
    }

    pub fn frame_done(&mut self) {
        self.frames += 1;
    }

    pub fn total(&self) -> Duration {
        self.stages.iter().map(|(_, d)| *d).sum()
    }

    pub fn avg(&self, stage: &str) -> Option<Duration> {
        if self.frames == 0 {
            return None;
        }
        self.stages
            .iter()
            .find(|(name, _)| *name == stage)
            .map(|(_, d)| *d / self.frames as u32)
    }

    pub fn summary(&self) -> String {
        self.stages
            .iter()
            .map(|(name, _)| format!("{}={:.2?}", name, self.avg(name).unwrap_or_default()))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_per_frame() {
        let mut t = TimeCalc::default();
        t.add("detect", Duration::from_millis(10));
        t.frame_done();
        t.add("detect", Duration::from_millis(30));
        t.frame_done();
        assert_eq!(t.avg("detect"), Some(Duration::from_millis(20)));
        assert_eq!(t.avg("render"), None);
        assert_eq!(t.total(), Duration::from_millis(40));
    }

    #[test]
    fn empty_has_no_average() {
        assert_eq!(TimeCalc::default().avg("detect"), None);
    }
}
