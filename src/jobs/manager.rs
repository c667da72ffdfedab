//! Job execution manager
//!
//! Listens on the jobs-receive topic and moves every job one step through its
//! state machine per notification, reporting each step on the jobs-update
//! topic.

use super::state_machine::{path_name, FailureScenario, JobTransition};
use crate::device::{DeviceSession, IncomingMessage, TopicListener};
use crate::error::{SimulatorError, SimulatorResult};
use crate::protocol::{JobNotification, JobRequest, JobStatus, JobUpdate};
use crate::transport::Transport;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn, Instrument};

pub struct JobsManager<T: Transport + 'static> {
    session: Arc<DeviceSession<T>>,
    /// Last published status per job id. Held for the whole handling of a
    /// notification so jobs advance one step at a time.
    statuses: Mutex<HashMap<String, JobStatus>>,
    scenario: Option<FailureScenario>,
    did_send_initial_job_request: AtomicBool,
}

impl<T: Transport + 'static> JobsManager<T> {
    pub fn new(session: Arc<DeviceSession<T>>, scenario: Option<FailureScenario>) -> Arc<Self> {
        Arc::new(Self {
            session,
            statuses: Mutex::new(HashMap::new()),
            scenario,
            did_send_initial_job_request: AtomicBool::new(false),
        })
    }

    pub fn scenario(&self) -> Option<&FailureScenario> {
        self.scenario.as_ref()
    }

    /// Last committed status of a job, `QUEUED` if it was never seen
    pub async fn job_status(&self, job_id: &str) -> JobStatus {
        self.statuses
            .lock()
            .await
            .get(job_id)
            .copied()
            .unwrap_or(JobStatus::Queued)
    }

    /// Ask for the latest queued job, then start listening for notifications
    pub async fn wait_for_jobs(self: &Arc<Self>) -> SimulatorResult<()> {
        self.request_latest_queued_job().await?;
        self.setup_jobs_listener().await
    }

    /// Publish `[""]` on the request topic, once per process
    pub async fn request_latest_queued_job(&self) -> SimulatorResult<()> {
        if self.did_send_initial_job_request.load(Ordering::SeqCst) {
            debug!("Already sent initial job request. Not sending another...");
            return Ok(());
        }

        self.session
            .publish(&self.session.topics().jobs.request, &JobRequest::latest_queued())
            .await?;
        self.did_send_initial_job_request
            .store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn setup_jobs_listener(self: &Arc<Self>) -> SimulatorResult<()> {
        let topic = self.session.topics().jobs.receive.clone();
        let listener = Arc::new(JobsListener {
            manager: Arc::downgrade(self),
        });
        if !self.session.register_listener(&topic, listener) {
            debug!(topic = %topic, "Jobs listener already registered");
        }
        self.session.subscribe(&topic).await
    }

    /// Apply one job notification
    ///
    /// Returns `None` when the payload is not a job tuple; such payloads are
    /// ignored without publishing anything.
    pub async fn handle_job_message(
        &self,
        payload: &Value,
    ) -> SimulatorResult<Option<JobTransition>> {
        let Some(job) = JobNotification::decode(payload) else {
            debug!(payload = %payload, "Ignoring payload that is not a job notification");
            return Ok(None);
        };

        let span = crate::job_span!(job_id = %job.job_id, firmware = %job.firmware_name());
        async {
            let mut statuses = self.statuses.lock().await;
            let previous = statuses
                .get(&job.job_id)
                .copied()
                .unwrap_or(JobStatus::Queued);

            log_terminal(&job.job_id, previous);

            let transition = JobTransition::plan(previous, &job, self.scenario.as_ref());
            let message = transition.message.as_deref().unwrap_or_default();
            if let Some(next) = transition.next {
                info!("Subscribing to jobExecution updates...");
                self.session
                    .publish(
                        &self.session.topics().jobs.request,
                        &JobRequest::for_job(&job.job_id),
                    )
                    .await?;

                info!("Updating jobExecution \"{}\"...", job.job_id);
                self.update_job_execution(&job.job_id, next, message).await?;
                statuses.insert(job.job_id.clone(), next);
            }

            if transition.message.is_some() {
                info!(
                    device_id = %self.session.device_id(),
                    job_id = %job.job_id,
                    old_status = %previous,
                    new_status = %transition.next.map(|s| s.to_string()).unwrap_or_default(),
                    message = %message,
                    execution_path = %path_name(self.scenario.as_ref()),
                    "Job execution step"
                );
            }

            Ok::<_, SimulatorError>(Some(transition))
        }
        .instrument(span)
        .await
    }

    /// Publish `[jobId, statusCode, message]` on the update topic
    pub async fn update_job_execution(
        &self,
        job_id: &str,
        status: JobStatus,
        message: &str,
    ) -> SimulatorResult<()> {
        let update = JobUpdate {
            job_id: job_id.to_string(),
            status,
            message: message.to_string(),
        };
        self.session
            .publish(&self.session.topics().jobs.update, &update)
            .await
    }
}

fn log_terminal(job_id: &str, status: JobStatus) {
    match status {
        JobStatus::Succeeded => info!("job \"{}\" succeeded!", job_id),
        JobStatus::Canceled => error!("ERROR: job \"{}\" was cancelled.", job_id),
        JobStatus::TimedOut => error!("ERROR: job \"{}\" was timed out.", job_id),
        JobStatus::Rejected => error!("ERROR: job \"{}\" was rejected.", job_id),
        JobStatus::Failed => error!("ERROR: job \"{}\" failed.", job_id),
        JobStatus::Queued | JobStatus::Downloading | JobStatus::InProgress => {}
    }
}

/// Listener bound to the jobs-receive topic
///
/// Holds a weak reference so the registry does not keep the manager alive.
struct JobsListener<T: Transport + 'static> {
    manager: Weak<JobsManager<T>>,
}

#[async_trait]
impl<T: Transport + 'static> TopicListener for JobsListener<T> {
    async fn on_message(&self, message: IncomingMessage) -> SimulatorResult<()> {
        let Some(manager) = self.manager.upgrade() else {
            warn!(topic = %message.topic, "Jobs manager dropped, ignoring notification");
            return Ok(());
        };
        manager.handle_job_message(&message.payload).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{CertificateType, DeviceIdentity, DeviceType};
    use crate::jobs::JobExecutionPath;
    use crate::protocol::TopicSet;
    use crate::testing::mocks::MockTransport;
    use serde_json::json;

    fn manager(
        transport: Arc<MockTransport>,
        scenario: Option<FailureScenario>,
    ) -> Arc<JobsManager<MockTransport>> {
        let identity =
            DeviceIdentity::new("dev-1", DeviceType::Generic, CertificateType::SelfSigned);
        let topics = TopicSet::new("dev-1", "prod/t/m/", "prod", "t");
        let session = Arc::new(DeviceSession::new(identity, topics, transport, 30));
        JobsManager::new(session, scenario)
    }

    fn notification(job_id: &str) -> Value {
        json!([job_id, 0, 1024, "host", "/path"])
    }

    #[tokio::test]
    async fn test_initial_request_sent_once() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager(transport.clone(), None);

        manager.wait_for_jobs().await.unwrap();
        manager.wait_for_jobs().await.unwrap();

        let requests = transport
            .get_published_json_on("prod/t/dev-1/jobs/req")
            .await;
        assert_eq!(requests, vec![json!([""])]);
        // Subscribing again on reconnect is expected
        assert_eq!(
            transport.get_subscriptions().await,
            vec!["prod/t/dev-1/jobs/rcv", "prod/t/dev-1/jobs/rcv"]
        );
    }

    #[tokio::test]
    async fn test_first_notification_moves_to_downloading() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager(transport.clone(), None);

        let transition = manager
            .handle_job_message(&notification("job-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(transition.previous, JobStatus::Queued);
        assert_eq!(transition.next, Some(JobStatus::Downloading));

        let published = transport.get_published_json().await;
        assert_eq!(
            published,
            vec![
                ("prod/t/dev-1/jobs/req".to_string(), json!(["job-1"])),
                (
                    "prod/t/dev-1/jobs/update".to_string(),
                    json!([
                        "job-1",
                        7,
                        "downloading \"APP\" firmware file from \"host/path\""
                    ])
                ),
            ]
        );
        assert_eq!(manager.job_status("job-1").await, JobStatus::Downloading);
    }

    #[tokio::test]
    async fn test_undecodable_payloads_are_ignored() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager(transport.clone(), None);

        for payload in [json!({}), json!(null), json!(["job-1"]), json!("job-1")] {
            assert!(manager.handle_job_message(&payload).await.unwrap().is_none());
        }
        assert!(transport.get_published_messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_ignore_path_never_publishes() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager(
            transport.clone(),
            Some(FailureScenario::Path(JobExecutionPath::Ignore)),
        );

        let transition = manager
            .handle_job_message(&notification("job-1"))
            .await
            .unwrap()
            .unwrap();
        assert!(!transition.is_transition());
        assert_eq!(
            transition.message.as_deref(),
            Some("downloading \"APP\" firmware file from \"host/path\"")
        );
        assert!(transport.get_published_messages().await.is_empty());
        assert_eq!(manager.job_status("job-1").await, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_reject_reports_current_step_message() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager(
            transport.clone(),
            Some(FailureScenario::Path(JobExecutionPath::Reject)),
        );

        manager
            .handle_job_message(&notification("job-1"))
            .await
            .unwrap();

        let updates = transport
            .get_published_json_on("prod/t/dev-1/jobs/update")
            .await;
        assert_eq!(
            updates,
            vec![json!([
                "job-1",
                6,
                "downloading \"APP\" firmware file from \"host/path\""
            ])]
        );
    }

    #[tokio::test]
    async fn test_failed_publish_does_not_commit_status() {
        let transport = Arc::new(MockTransport::with_failure());
        let manager = manager(transport, None);

        assert!(manager
            .handle_job_message(&notification("job-1"))
            .await
            .is_err());
        assert_eq!(manager.job_status("job-1").await, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_jobs_are_tracked_independently() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager(transport, None);

        manager.handle_job_message(&notification("a")).await.unwrap();
        manager.handle_job_message(&notification("a")).await.unwrap();
        manager.handle_job_message(&notification("b")).await.unwrap();

        assert_eq!(manager.job_status("a").await, JobStatus::InProgress);
        assert_eq!(manager.job_status("b").await, JobStatus::Downloading);
        assert_eq!(manager.job_status("c").await, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_listener_routes_to_manager() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager(transport.clone(), None);
        manager.setup_jobs_listener().await.unwrap();

        let outcome = manager
            .session
            .dispatch(IncomingMessage {
                topic: "prod/t/dev-1/jobs/rcv".to_string(),
                payload: notification("job-9"),
            })
            .await
            .unwrap();
        assert_eq!(outcome, crate::device::DispatchOutcome::Handled);
        assert_eq!(manager.job_status("job-9").await, JobStatus::Downloading);
    }
}
