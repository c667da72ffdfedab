//! Topic namespace for a simulated device
//!
//! Every topic the device publishes or subscribes to is derived once from the
//! device identity and the tenant/stage prefixes. The strings are part of the
//! wire contract with the control plane and must match exactly.

/// Job topics, all rooted at `<stage>/<tenantId>/<deviceId>/jobs`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTopics {
    /// `.../jobs/req` - acknowledge a job and ask for the next notification
    pub request: String,
    /// `.../jobs/rcv` - job notifications from the control plane
    pub receive: String,
    /// `.../jobs/update` - job execution status updates
    pub update: String,
}

/// Immutable set of topics for one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    /// Device-to-cloud telemetry: `<messagesPrefix>d/<deviceId>/d2c`
    pub d2c: String,
    pub jobs: JobTopics,
    /// Device twin update: `$aws/things/<deviceId>/shadow/update`
    pub shadow_update: String,
    /// Every topic of the tenant: `<stage>/<tenantId>/#`
    pub tenant_wildcard: String,
}

impl TopicSet {
    /// Derive the topic set. Input is passed through unchanged; validation
    /// happens when the configuration is loaded.
    pub fn new(device_id: &str, messages_prefix: &str, stage: &str, tenant_id: &str) -> Self {
        let jobs_root = format!("{stage}/{tenant_id}/{device_id}/jobs");

        Self {
            d2c: format!("{messages_prefix}d/{device_id}/d2c"),
            jobs: JobTopics {
                request: format!("{jobs_root}/req"),
                receive: format!("{jobs_root}/rcv"),
                update: format!("{jobs_root}/update"),
            },
            shadow_update: format!("$aws/things/{device_id}/shadow/update"),
            tenant_wildcard: format!("{stage}/{tenant_id}/#"),
        }
    }
}
