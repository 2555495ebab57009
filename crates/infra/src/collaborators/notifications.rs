use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use courseforge_core::{JobId, TenantId, UserId};

use crate::jobs::{GenerationJob, JobStatus, JobType};

use super::CollaboratorError;

/// Terminal job transition sent to the notification collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobNotification {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub job_id: JobId,
    pub job_type: JobType,
    pub status: JobStatus,
}

impl From<&GenerationJob> for JobNotification {
    fn from(job: &GenerationJob) -> Self {
        Self {
            tenant_id: job.tenant_id,
            user_id: job.requested_by,
            job_id: job.id,
            job_type: job.job_type,
            status: job.status,
        }
    }
}

/// Fire-and-forget notifications. Delivery failures never fail a job.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &JobNotification) -> Result<(), CollaboratorError>;
}

/// Sink that only logs, for deployments without a notification service.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn notify(&self, n: &JobNotification) -> Result<(), CollaboratorError> {
        info!(
            tenant_id = %n.tenant_id,
            user_id = %n.user_id,
            job_id = %n.job_id,
            job_type = %n.job_type,
            status = %n.status,
            "job notification"
        );
        Ok(())
    }
}

/// Recording sink for tests. Can be switched to fail every delivery.
#[derive(Debug, Default)]
pub struct InMemoryNotificationSink {
    sent: Mutex<Vec<JobNotification>>,
    failing: bool,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn sent(&self) -> Vec<JobNotification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn notify(&self, notification: &JobNotification) -> Result<(), CollaboratorError> {
        if self.failing {
            return Err(CollaboratorError::Unavailable("notification service down".to_string()));
        }
        self.sent
            .lock()
            .map_err(|_| CollaboratorError::Unavailable("notification sink lock poisoned".to_string()))?
            .push(notification.clone());
        Ok(())
    }
}
