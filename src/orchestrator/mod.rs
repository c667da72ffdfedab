//! Connection orchestrator
//!
//! Top-level driver of one simulated device. It consumes the transport's
//! lifecycle and message events on a single task, performs the one-time
//! onboarding (association of JITP devices, with retry), initializes the
//! device twin and starts the job flow once the device is known to the
//! control plane.
//!
//! The association retry runs on its own task and reports back through a
//! channel, so other events keep being handled while it backs off.

pub mod state;

pub use state::{ConnectionState, OnboardingOutcome, OrchestratorPhase};

use crate::api::{DeviceApi, RetryPolicy};
use crate::config::{ConfigError, SimulatorConfig};
use crate::device::{DeviceSession, DispatchOutcome, IncomingMessage};
use crate::error::{SimulatorError, SimulatorResult};
use crate::jobs::JobsManager;
use crate::protocol::ShadowProfile;
use crate::transport::{Transport, TransportEvent};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn, Instrument};

/// Per-device settings the orchestrator acts on
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub app_fw_version: String,
    pub shadow_profile: Option<ShadowProfile>,
    pub prevent_jitp_association: bool,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            app_fw_version: "1.0.0".to_string(),
            shadow_profile: None,
            prevent_jitp_association: false,
            retry: RetryPolicy::default(),
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &SimulatorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            app_fw_version: config.device.app_fw_version.clone(),
            shadow_profile: config.device.resolve_shadow_profile()?,
            prevent_jitp_association: config.device.prevent_jitp_association,
            retry: RetryPolicy::default(),
        })
    }
}

pub struct Orchestrator<T: Transport + 'static, A: DeviceApi + 'static> {
    session: Arc<DeviceSession<T>>,
    jobs: Arc<JobsManager<T>>,
    api: Arc<A>,
    settings: OrchestratorSettings,
    state: ConnectionState,
    phase: OrchestratorPhase,
    connected: bool,
    onboarding_tx: mpsc::Sender<OnboardingOutcome>,
    onboarding_rx: mpsc::Receiver<OnboardingOutcome>,
}

impl<T: Transport + 'static, A: DeviceApi + 'static> Orchestrator<T, A> {
    pub fn new(
        session: Arc<DeviceSession<T>>,
        jobs: Arc<JobsManager<T>>,
        api: Arc<A>,
        settings: OrchestratorSettings,
    ) -> Self {
        let (onboarding_tx, onboarding_rx) = mpsc::channel(1);
        Self {
            session,
            jobs,
            api,
            settings,
            state: ConnectionState::new(),
            phase: OrchestratorPhase::Disconnected,
            connected: false,
            onboarding_tx,
            onboarding_rx,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn phase(&self) -> OrchestratorPhase {
        self.phase
    }

    pub fn session(&self) -> &Arc<DeviceSession<T>> {
        &self.session
    }

    pub fn jobs(&self) -> &Arc<JobsManager<T>> {
        &self.jobs
    }

    /// Drive the device until shutdown, the end of the event stream, or a
    /// fatal error
    pub async fn run(
        &mut self,
        mut events: mpsc::Receiver<TransportEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> SimulatorResult<()> {
        let span = crate::device_span!(
            device_id = %self.session.device_id(),
            device_type = %self.session.identity().device_type
        );

        async {
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Shutdown requested, stopping orchestrator");
                            return Ok(());
                        }
                    }
                    event = events.recv() => {
                        match event {
                            Some(event) => self.handle_event(event).await?,
                            None => {
                                info!("Transport event stream closed");
                                return Ok(());
                            }
                        }
                    }
                    Some(outcome) = self.onboarding_rx.recv() => {
                        self.handle_onboarding_finished(outcome).await?;
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Handle one transport event
    ///
    /// Only protocol violations are returned as errors; everything else is
    /// logged and absorbed.
    pub async fn handle_event(&mut self, event: TransportEvent) -> SimulatorResult<()> {
        let name = event.name();
        let result = match event {
            TransportEvent::Connect | TransportEvent::Reconnect => {
                self.connected = true;
                self.handle_connect(name).await
            }
            TransportEvent::Close => {
                self.handle_close();
                Ok(())
            }
            TransportEvent::Error(message) => {
                error!(event = name, "MQTT transport error: {}", message);
                Ok(())
            }
            TransportEvent::Message { topic, payload } => {
                self.handle_message(topic, &payload).await
            }
        };

        absorb_non_fatal(name, result)
    }

    /// Wait for the in-flight association to finish and apply its outcome
    ///
    /// Returns `None` straight away when no association is running.
    pub async fn wait_for_onboarding(&mut self) -> SimulatorResult<Option<OnboardingOutcome>> {
        if !self.state.onboarding_in_progress() {
            return Ok(None);
        }
        match self.onboarding_rx.recv().await {
            Some(outcome) => {
                self.handle_onboarding_finished(outcome).await?;
                Ok(Some(outcome))
            }
            None => Ok(None),
        }
    }

    async fn handle_connect(&mut self, event_name: &str) -> SimulatorResult<()> {
        info!("Handling MQTT {} event...", event_name);
        if self.phase == OrchestratorPhase::Disconnected {
            self.phase = OrchestratorPhase::Connecting;
        }

        if self.state.start_onboarding() {
            let identity = self.session.identity();
            if identity.is_jitp() && !self.settings.prevent_jitp_association {
                self.phase = OrchestratorPhase::Onboarding;
                self.spawn_association();
                return Ok(());
            }
            self.state.complete_onboarding(OnboardingOutcome::Skipped);
            debug!("No association needed, onboarding skipped");
        }

        if self.state.onboarding_completed() {
            self.after_onboarding().await
        } else {
            debug!("Association still running, deferring post-onboarding steps");
            Ok(())
        }
    }

    fn spawn_association(&self) {
        let api = Arc::clone(&self.api);
        let retry = self.settings.retry.clone();
        let device_id = self.session.device_id().to_string();
        let tx = self.onboarding_tx.clone();

        tokio::spawn(
            async move {
                info!("Associating JITP device {}...", device_id);
                let outcome = match retry
                    .retry_with_backoff("associate_device", || api.associate_device(&device_id))
                    .await
                {
                    Ok(()) => OnboardingOutcome::Associated,
                    Err(e) => {
                        error!(error = %e, "Could not associate JITP device {}", device_id);
                        OnboardingOutcome::Failed
                    }
                };
                if tx.send(outcome).await.is_err() {
                    debug!("Orchestrator gone before association finished");
                }
            }
            .in_current_span(),
        );
    }

    async fn handle_onboarding_finished(&mut self, outcome: OnboardingOutcome) -> SimulatorResult<()> {
        self.state.complete_onboarding(outcome);
        info!(outcome = %outcome, "Onboarding finished");

        if !self.connected {
            self.phase = OrchestratorPhase::Disconnected;
            debug!("Not connected, post-onboarding steps run on the next connect");
            return Ok(());
        }
        let result = self.after_onboarding().await;
        absorb_non_fatal("onboarding", result)
    }

    /// Team subscription, or shadow initialization and the job flow
    async fn after_onboarding(&mut self) -> SimulatorResult<()> {
        if self.session.identity().is_team() {
            let topic = self.session.topics().tenant_wildcard.clone();
            self.session.subscribe(&topic).await?;
            self.phase = OrchestratorPhase::Operational;
            return Ok(());
        }

        self.phase = OrchestratorPhase::ShadowPending;
        if let Some(profile) = &self.settings.shadow_profile {
            if !self.state.shadow_initialized() {
                info!("Initializing shadow for appType {}...", profile);
                self.session
                    .init_shadow(&self.settings.app_fw_version, profile)
                    .await?;
                self.state.mark_shadow_initialized();
            }
        }

        if !self.state.initial_jitp_disconnect_seen() {
            info!("Requesting new FOTA jobs by sending an empty message to the /jobs/req topic...");
        }
        self.jobs.wait_for_jobs().await?;
        self.phase = OrchestratorPhase::Operational;
        Ok(())
    }

    fn handle_close(&mut self) {
        self.connected = false;
        self.phase = OrchestratorPhase::Disconnected;

        if self.session.identity().is_jitp() && self.state.see_initial_jitp_disconnect() {
            info!("Initial disconnect when a JITP device is connecting for the first time. This is expected.");
        } else {
            error!(
                "Device disconnected. Make sure device id {} matches the one for the certificate.",
                self.session.device_id()
            );
        }
    }

    async fn handle_message(&mut self, topic: String, payload: &[u8]) -> SimulatorResult<()> {
        info!(
            direction = "incoming",
            topic = %topic,
            payload = %String::from_utf8_lossy(payload),
            "Received message"
        );

        let Some(payload) = decode_payload(&topic, payload) else {
            return Ok(());
        };

        let outcome = self
            .session
            .dispatch(IncomingMessage {
                topic: topic.clone(),
                payload,
            })
            .await;

        match outcome {
            Ok(DispatchOutcome::Handled) => Ok(()),
            Ok(DispatchOutcome::NoListener) if self.session.identity().is_team() => {
                debug!(topic = %topic, "No listener for topic on team device, ignoring");
                Ok(())
            }
            Ok(DispatchOutcome::NoListener) => Err(SimulatorError::protocol_violation(topic)),
            Err(e) => {
                error!(topic = %topic, error = %e, "Listener failed to handle message");
                Ok(())
            }
        }
    }
}

/// JSON payload, `{}` for an empty one, `None` (logged) if it is not JSON
fn decode_payload(topic: &str, payload: &[u8]) -> Option<Value> {
    if payload.is_empty() {
        return Some(json!({}));
    }
    match serde_json::from_slice(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            let error = SimulatorError::invalid_payload(topic, e.to_string());
            warn!(error = %error, "Dropping message that is not JSON");
            None
        }
    }
}

fn absorb_non_fatal(context: &str, result: SimulatorResult<()>) -> SimulatorResult<()> {
    match result {
        Err(e) if !e.is_fatal() => {
            error!(context, error = %e, "Error while handling event");
            Ok(())
        }
        other => other,
    }
}
