//! Staged virtual-user ramping profile.

use crate::duration::{self, human_serde};
use crate::error::LoadError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// One ramp segment: move linearly to `target` VUs over `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(with = "human_serde")]
    pub duration: Duration,
    pub target: u32,
}

impl Stage {
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }
}

impl FromStr for Stage {
    type Err = LoadError;

    /// Parses the CLI form `30s:100`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (dur, target) = s
            .rsplit_once(':')
            .ok_or_else(|| LoadError::Stage(s.to_string()))?;
        let duration = duration::parse_duration(dur).map_err(|_| LoadError::Stage(s.to_string()))?;
        let target = target
            .trim()
            .parse()
            .map_err(|_| LoadError::Stage(s.to_string()))?;
        Ok(Self { duration, target })
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", duration::to_human(self.duration), self.target)
    }
}

/// A VU ramp: start at `start_vus`, then walk through each stage in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default = "default_start_vus")]
    pub start_vus: u32,
    pub stages: Vec<Stage>,
}

fn default_start_vus() -> u32 {
    1
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            start_vus: default_start_vus(),
            stages: vec![Stage::new(Duration::from_secs(30), 100)],
        }
    }
}

impl Schedule {
    pub fn new(start_vus: u32, stages: Vec<Stage>) -> Self {
        Self { start_vus, stages }
    }

    /// Sum of all stage durations.
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Peak VU count over the whole schedule.
    pub fn max_vus(&self) -> u32 {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start_vus, u32::max)
    }

    /// Target VU count at `elapsed`, or `None` once the schedule has ended.
    ///
    /// Within a stage the count moves linearly from the previous target; the
    /// fractional part is truncated toward the stage's starting value.
    pub fn target_at(&self, elapsed: Duration) -> Option<u32> {
        let mut from = self.start_vus;
        let mut stage_start = Duration::ZERO;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let into = (elapsed - stage_start).as_nanos() as i128;
                let span = stage.duration.as_nanos() as i128;
                let delta = stage.target as i128 - from as i128;
                // i128 division truncates toward zero, i.e. toward `from`.
                let value = from as i128 + delta * into / span;
                return Some(value as u32);
            }
            from = stage.target;
            stage_start = stage_end;
        }

        None
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        if self.stages.is_empty() {
            return Err(LoadError::Schedule("at least one stage is required".into()));
        }
        if self.total_duration().is_zero() {
            return Err(LoadError::Schedule("total duration must be greater than zero".into()));
        }
        if self.max_vus() == 0 {
            return Err(LoadError::Schedule("no stage ever runs a virtual user".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn should_ramp_linearly_within_default_stage() {
        let schedule = Schedule::default();
        assert_eq!(schedule.target_at(Duration::ZERO), Some(1));
        // 1 + 99 * 15/30 = 50.5 -> 50
        assert_eq!(schedule.target_at(secs(15)), Some(50));
        assert_eq!(schedule.target_at(Duration::from_millis(29_999)), Some(99));
        assert_eq!(schedule.target_at(secs(30)), None);
    }

    #[test]
    fn should_truncate_toward_start_when_ramping_down() {
        let schedule = Schedule::new(10, vec![Stage::new(secs(10), 0)]);
        assert_eq!(schedule.target_at(Duration::ZERO), Some(10));
        // 10 - 10 * 0.55 = 4.5 -> 5 (truncated toward 10)
        assert_eq!(schedule.target_at(Duration::from_millis(5_500)), Some(5));
    }

    #[test]
    fn should_chain_stages_from_previous_target() {
        let schedule = Schedule::new(
            0,
            vec![
                Stage::new(secs(10), 20),
                Stage::new(secs(10), 20),
                Stage::new(secs(10), 0),
            ],
        );
        assert_eq!(schedule.target_at(secs(5)), Some(10));
        assert_eq!(schedule.target_at(secs(10)), Some(20));
        assert_eq!(schedule.target_at(secs(15)), Some(20));
        assert_eq!(schedule.target_at(secs(25)), Some(10));
        assert_eq!(schedule.total_duration(), secs(30));
        assert_eq!(schedule.max_vus(), 20);
    }

    #[test]
    fn should_jump_when_stage_has_zero_length() {
        let schedule = Schedule::new(0, vec![Stage::new(Duration::ZERO, 50), Stage::new(secs(5), 50)]);
        assert_eq!(schedule.target_at(Duration::ZERO), Some(50));
    }

    #[test]
    fn should_parse_stage_from_cli_form() {
        let stage: Stage = "1m30s:25".parse().unwrap();
        assert_eq!(stage, Stage::new(secs(90), 25));
        assert_eq!(stage.to_string(), "90s:25");
        assert!("30s".parse::<Stage>().is_err());
        assert!("30s:many".parse::<Stage>().is_err());
    }

    #[test]
    fn should_reject_invalid_schedules() {
        assert!(Schedule::new(1, vec![]).validate().is_err());
        assert!(Schedule::new(1, vec![Stage::new(Duration::ZERO, 5)]).validate().is_err());
        assert!(Schedule::new(0, vec![Stage::new(secs(5), 0)]).validate().is_err());
        assert!(Schedule::default().validate().is_ok());
    }

    #[test]
    fn should_deserialize_options_style_stages() {
        let json = r#"{"stages":[{"duration":"30s","target":100}]}"#;
        let schedule: Schedule = serde_json::from_str(json).unwrap();
        assert_eq!(schedule, Schedule::default());
    }
}
