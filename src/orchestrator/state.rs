//! Connection bookkeeping owned by the orchestrator
//!
//! Every flag only ever goes from `false` to `true`; together they make
//! repeated `connect`/`reconnect` delivery safe.

use std::fmt;

/// Result of the one-time onboarding step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingOutcome {
    /// The JITP device was associated with the account
    Associated,
    /// Nothing to do: not a JITP device, or association was prevented
    Skipped,
    /// Association kept failing until the retries ran out
    Failed,
}

impl fmt::Display for OnboardingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnboardingOutcome::Associated => f.write_str("associated"),
            OnboardingOutcome::Skipped => f.write_str("skipped"),
            OnboardingOutcome::Failed => f.write_str("failed"),
        }
    }
}

/// Coarse lifecycle of the simulated device, for logging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrchestratorPhase {
    #[default]
    Disconnected,
    Connecting,
    /// Association call in flight
    Onboarding,
    /// Onboarded, shadow and job subscription not done yet
    ShadowPending,
    Operational,
}

impl fmt::Display for OrchestratorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrchestratorPhase::Disconnected => "disconnected",
            OrchestratorPhase::Connecting => "connecting",
            OrchestratorPhase::Onboarding => "onboarding",
            OrchestratorPhase::ShadowPending => "shadow-pending",
            OrchestratorPhase::Operational => "operational",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionState {
    onboarding_started: bool,
    onboarding_completed: bool,
    initial_jitp_disconnect_seen: bool,
    shadow_initialized: bool,
    onboarding_outcome: Option<OnboardingOutcome>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn onboarding_started(&self) -> bool {
        self.onboarding_started
    }

    pub fn onboarding_completed(&self) -> bool {
        self.onboarding_completed
    }

    pub fn initial_jitp_disconnect_seen(&self) -> bool {
        self.initial_jitp_disconnect_seen
    }

    pub fn shadow_initialized(&self) -> bool {
        self.shadow_initialized
    }

    pub fn onboarding_outcome(&self) -> Option<OnboardingOutcome> {
        self.onboarding_outcome
    }

    /// Started but no outcome yet
    pub fn onboarding_in_progress(&self) -> bool {
        self.onboarding_started && !self.onboarding_completed
    }

    /// Claim the onboarding step. Returns `false` if it was already claimed.
    pub fn start_onboarding(&mut self) -> bool {
        if self.onboarding_started {
            return false;
        }
        self.onboarding_started = true;
        true
    }

    /// Record the onboarding outcome; the first outcome wins
    pub fn complete_onboarding(&mut self, outcome: OnboardingOutcome) {
        self.onboarding_started = true;
        if !self.onboarding_completed {
            self.onboarding_completed = true;
            self.onboarding_outcome = Some(outcome);
        }
    }

    /// Mark the expected first JITP disconnect. Returns `true` only the first
    /// time.
    pub fn see_initial_jitp_disconnect(&mut self) -> bool {
        !std::mem::replace(&mut self.initial_jitp_disconnect_seen, true)
    }

    pub fn mark_shadow_initialized(&mut self) {
        self.shadow_initialized = true;
    }
}
