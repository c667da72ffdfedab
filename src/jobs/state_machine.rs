//! Pure job execution state machine
//!
//! Nominal path: `QUEUED -> DOWNLOADING -> IN_PROGRESS -> SUCCEEDED`, one step per
//! job notification. A [`FailureScenario`] replaces the nominal table with an
//! explicit status sequence so tests can force non-happy outcomes.

use crate::protocol::jobs::{JobNotification, JobStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named alternate paths a job can be forced through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobExecutionPath {
    Ignore,
    Reject,
    DownloadHang,
    DownloadInProgressHang,
    DownloadTimeout,
    DownloadFailed,
}

impl JobExecutionPath {
    pub const ALL: [JobExecutionPath; 6] = [
        JobExecutionPath::Ignore,
        JobExecutionPath::Reject,
        JobExecutionPath::DownloadHang,
        JobExecutionPath::DownloadInProgressHang,
        JobExecutionPath::DownloadTimeout,
        JobExecutionPath::DownloadFailed,
    ];

    pub fn steps(self) -> &'static [JobStatus] {
        use JobStatus::*;
        match self {
            JobExecutionPath::Ignore => &[Queued],
            JobExecutionPath::Reject => &[Queued, Rejected],
            JobExecutionPath::DownloadHang => &[Queued, Downloading],
            JobExecutionPath::DownloadInProgressHang => &[Queued, Downloading, InProgress],
            JobExecutionPath::DownloadTimeout => &[Queued, Downloading, InProgress, TimedOut],
            JobExecutionPath::DownloadFailed => &[Queued, Downloading, Failed],
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            JobExecutionPath::Ignore => "Ignore Job",
            JobExecutionPath::Reject => "Reject Job",
            JobExecutionPath::DownloadHang => "Hang on DOWNLOADING state",
            JobExecutionPath::DownloadInProgressHang => "Hang on IN_PROGRESS state",
            JobExecutionPath::DownloadTimeout => "End with a TIME_OUT",
            JobExecutionPath::DownloadFailed => "End with FAILED",
        }
    }

    fn key(self) -> &'static str {
        match self {
            JobExecutionPath::Ignore => "ignore",
            JobExecutionPath::Reject => "reject",
            JobExecutionPath::DownloadHang => "download-hang",
            JobExecutionPath::DownloadInProgressHang => "download-in-progress-hang",
            JobExecutionPath::DownloadTimeout => "download-timeout",
            JobExecutionPath::DownloadFailed => "download-failed",
        }
    }
}

impl FromStr for JobExecutionPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();

        Self::ALL
            .into_iter()
            .find(|path| path.key().replace('-', "") == normalized)
            .ok_or_else(|| format!("Unknown job execution path: {s}"))
    }
}

/// Alternate status path configured at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FailureScenario {
    /// One of the named presets
    Path(JobExecutionPath),
    /// Explicit ordered status sequence
    Sequence(Vec<JobStatus>),
}

impl FailureScenario {
    pub fn steps(&self) -> &[JobStatus] {
        match self {
            FailureScenario::Path(path) => path.steps(),
            FailureScenario::Sequence(steps) => steps,
        }
    }

    /// Position-based successor: unknown statuses restart at the first step,
    /// the last step has no successor
    pub fn next_after(&self, current: JobStatus) -> Option<JobStatus> {
        let steps = self.steps();
        match steps.iter().position(|s| *s == current) {
            None => steps.first().copied(),
            Some(index) => steps.get(index + 1).copied(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            FailureScenario::Path(path) => path.display_name().to_string(),
            FailureScenario::Sequence(steps) => steps
                .iter()
                .map(|s| s.name())
                .collect::<Vec<_>>()
                .join(" -> "),
        }
    }
}

impl fmt::Display for FailureScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for FailureScenario {
    type Err = String;

    /// Accepts a preset name (`reject`, `download-hang`, ...) or a comma
    /// separated status list (`QUEUED,REJECTED`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(',') {
            let steps = s
                .split(',')
                .map(str::parse::<JobStatus>)
                .collect::<Result<Vec<_>, _>>()?;
            if steps.is_empty() {
                return Err("Failure scenario must contain at least one status".to_string());
            }
            return Ok(FailureScenario::Sequence(steps));
        }

        if let Ok(path) = s.parse::<JobExecutionPath>() {
            return Ok(FailureScenario::Path(path));
        }

        s.parse::<JobStatus>()
            .map(|status| FailureScenario::Sequence(vec![status]))
            .map_err(|_| format!("Unknown failure scenario: {s}"))
    }
}

/// Display name of the configured path, `Normal` when none is set
pub fn path_name(scenario: Option<&FailureScenario>) -> String {
    scenario
        .map(FailureScenario::name)
        .unwrap_or_else(|| "Normal".to_string())
}

fn nominal_next(current: JobStatus) -> Option<JobStatus> {
    match current {
        JobStatus::Queued => Some(JobStatus::Downloading),
        JobStatus::Downloading => Some(JobStatus::InProgress),
        JobStatus::InProgress => Some(JobStatus::Succeeded),
        _ => None,
    }
}

/// Status the job moves to on the next notification, if any
///
/// Terminal statuses never move. A successor of `QUEUED` is not a
/// transition: the device never reports a job as queued.
pub fn next_status(current: JobStatus, scenario: Option<&FailureScenario>) -> Option<JobStatus> {
    match current {
        JobStatus::Queued | JobStatus::Downloading | JobStatus::InProgress => {
            let candidate = match scenario {
                Some(scenario) => scenario.next_after(current),
                None => nominal_next(current),
            };
            candidate.filter(|next| *next != JobStatus::Queued)
        }
        JobStatus::Succeeded
        | JobStatus::Failed
        | JobStatus::TimedOut
        | JobStatus::Canceled
        | JobStatus::Rejected => None,
    }
}

/// Human-readable description of the step a job in `current` takes
///
/// Depends only on the current status, so a failure scenario changes the
/// reported status but not the message. Terminal statuses have none.
pub fn status_message(current: JobStatus, job: &JobNotification) -> Option<String> {
    let firmware = job.firmware_name();
    let location = job.location();

    match current {
        JobStatus::Queued => Some(format!(
            "downloading \"{firmware}\" firmware file from \"{location}\""
        )),
        JobStatus::Downloading => Some(format!(
            "installing \"{firmware}\" firmware file from \"{location}\""
        )),
        JobStatus::InProgress => Some(format!(
            "installation successful for \"{firmware}\" firmware file from \"{location}\""
        )),
        JobStatus::Succeeded
        | JobStatus::Failed
        | JobStatus::TimedOut
        | JobStatus::Canceled
        | JobStatus::Rejected => None,
    }
}

/// Outcome of applying one notification to a job
#[derive(Debug, Clone, PartialEq)]
pub struct JobTransition {
    pub job_id: String,
    pub previous: JobStatus,
    pub next: Option<JobStatus>,
    pub message: Option<String>,
}

impl JobTransition {
    pub fn plan(
        previous: JobStatus,
        job: &JobNotification,
        scenario: Option<&FailureScenario>,
    ) -> Self {
        let next = next_status(previous, scenario);
        Self {
            job_id: job.job_id.clone(),
            previous,
            next,
            message: status_message(previous, job),
        }
    }

    pub fn is_transition(&self) -> bool {
        self.next.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn job() -> JobNotification {
        JobNotification {
            job_id: "job-1".to_string(),
            firmware_type: 0,
            file_size: 1024.0,
            host: "host".to_string(),
            path: "/path".to_string(),
        }
    }

    fn walk(scenario: Option<&FailureScenario>) -> Vec<JobStatus> {
        let mut status = JobStatus::Queued;
        let mut seen = vec![status];
        while let Some(next) = next_status(status, scenario) {
            seen.push(next);
            status = next;
            assert!(seen.len() < 16, "state machine must terminate");
        }
        seen
    }

    #[test]
    fn test_nominal_path() {
        assert_eq!(
            walk(None),
            vec![
                JobStatus::Queued,
                JobStatus::Downloading,
                JobStatus::InProgress,
                JobStatus::Succeeded
            ]
        );
    }

    #[test]
    fn test_preset_paths() {
        use JobStatus::*;
        let cases = [
            (JobExecutionPath::Ignore, vec![Queued]),
            (JobExecutionPath::Reject, vec![Queued, Rejected]),
            (JobExecutionPath::DownloadHang, vec![Queued, Downloading]),
            (
                JobExecutionPath::DownloadInProgressHang,
                vec![Queued, Downloading, InProgress],
            ),
            (
                JobExecutionPath::DownloadTimeout,
                vec![Queued, Downloading, InProgress, TimedOut],
            ),
            (
                JobExecutionPath::DownloadFailed,
                vec![Queued, Downloading, Failed],
            ),
        ];

        for (path, expected) in cases {
            let scenario = FailureScenario::Path(path);
            assert_eq!(walk(Some(&scenario)), expected, "path {path:?}");
        }
    }

    #[test]
    fn test_terminal_statuses_never_move() {
        for status in JobStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            assert_eq!(next_status(status, None), None);
            let scenario = FailureScenario::Sequence(vec![status, JobStatus::Downloading]);
            assert_eq!(next_status(status, Some(&scenario)), None);
        }
    }

    #[test]
    fn test_status_missing_from_sequence_restarts_at_first_step() {
        let scenario = FailureScenario::Sequence(vec![JobStatus::InProgress, JobStatus::Failed]);
        assert_eq!(
            next_status(JobStatus::Queued, Some(&scenario)),
            Some(JobStatus::InProgress)
        );
        // Restarting at QUEUED would be a regression, not a transition
        let scenario = FailureScenario::Path(JobExecutionPath::Reject);
        assert_eq!(next_status(JobStatus::Downloading, Some(&scenario)), None);
    }

    #[test]
    fn test_plan_message_follows_current_status() {
        let transition = JobTransition::plan(JobStatus::Queued, &job(), None);
        assert_eq!(transition.next, Some(JobStatus::Downloading));
        assert_eq!(
            transition.message.as_deref(),
            Some("downloading \"APP\" firmware file from \"host/path\"")
        );

        let reject = FailureScenario::Path(JobExecutionPath::Reject);
        let transition = JobTransition::plan(JobStatus::Queued, &job(), Some(&reject));
        assert_eq!(transition.next, Some(JobStatus::Rejected));
        assert_eq!(
            transition.message.as_deref(),
            Some("downloading \"APP\" firmware file from \"host/path\"")
        );

        let transition = JobTransition::plan(JobStatus::Succeeded, &job(), None);
        assert!(!transition.is_transition());
        assert!(transition.message.is_none());
    }

    #[test]
    fn test_stalled_job_still_has_a_message() {
        let ignore = FailureScenario::Path(JobExecutionPath::Ignore);
        let transition = JobTransition::plan(JobStatus::Queued, &job(), Some(&ignore));
        assert!(!transition.is_transition());
        assert_eq!(
            transition.message.as_deref(),
            Some("downloading \"APP\" firmware file from \"host/path\"")
        );
    }

    #[test]
    fn test_repeated_step_is_reported_again() {
        let scenario =
            FailureScenario::Sequence(vec![JobStatus::Downloading, JobStatus::Downloading]);
        assert_eq!(
            next_status(JobStatus::Queued, Some(&scenario)),
            Some(JobStatus::Downloading)
        );
        assert_eq!(
            next_status(JobStatus::Downloading, Some(&scenario)),
            Some(JobStatus::Downloading)
        );
    }

    #[test]
    fn test_scenario_parsing() {
        assert_eq!(
            "reject".parse::<FailureScenario>(),
            Ok(FailureScenario::Path(JobExecutionPath::Reject))
        );
        assert_eq!(
            "DownloadInProgressHang".parse::<FailureScenario>(),
            Ok(FailureScenario::Path(JobExecutionPath::DownloadInProgressHang))
        );
        assert_eq!(
            "QUEUED,REJECTED".parse::<FailureScenario>(),
            Ok(FailureScenario::Sequence(vec![
                JobStatus::Queued,
                JobStatus::Rejected
            ]))
        );
        assert!("QUEUED,FINISHED".parse::<FailureScenario>().is_err());
        assert!("explode".parse::<FailureScenario>().is_err());
    }

    #[test]
    fn test_scenario_deserializes_from_toml() {
        #[derive(Deserialize)]
        struct Jobs {
            failure_scenario: FailureScenario,
        }

        let named: Jobs = toml::from_str("failure_scenario = \"download-timeout\"").unwrap();
        assert_eq!(
            named.failure_scenario,
            FailureScenario::Path(JobExecutionPath::DownloadTimeout)
        );

        let explicit: Jobs =
            toml::from_str("failure_scenario = [\"QUEUED\", \"DOWNLOADING\"]").unwrap();
        assert_eq!(
            explicit.failure_scenario,
            FailureScenario::Sequence(vec![JobStatus::Queued, JobStatus::Downloading])
        );
    }

    #[test]
    fn test_path_names() {
        assert_eq!(path_name(None), "Normal");
        assert_eq!(
            path_name(Some(&FailureScenario::Path(JobExecutionPath::DownloadHang))),
            "Hang on DOWNLOADING state"
        );
        assert_eq!(
            path_name(Some(&FailureScenario::Sequence(vec![
                JobStatus::Queued,
                JobStatus::Rejected
            ]))),
            "QUEUED -> REJECTED"
        );
    }

    proptest! {
        #[test]
        fn scenario_walk_is_a_prefix_of_the_sequence(
            tail in proptest::sample::subsequence(
                vec![
                    JobStatus::Downloading,
                    JobStatus::InProgress,
                    JobStatus::Succeeded,
                    JobStatus::Failed,
                    JobStatus::TimedOut,
                    JobStatus::Rejected,
                ],
                0..=6,
            )
            .prop_shuffle()
        ) {
            let mut steps = vec![JobStatus::Queued];
            steps.extend(tail);
            let scenario = FailureScenario::Sequence(steps.clone());
            let observed = walk(Some(&scenario));

            prop_assert!(observed.len() <= steps.len());
            prop_assert_eq!(&steps[..observed.len()], observed.as_slice());
        }
    }
}
