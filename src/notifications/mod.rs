use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Failure surfaced by a notifier backend. Always logged, never
/// propagated into the transactional path.
#[derive(Debug, thiserror::Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Outbound notification contract. Implemented elsewhere (email/SMS
/// provider); this crate only ships the logging default.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_status_change(
        &self,
        order_id: Uuid,
        recipient_email: &str,
        recipient_name: &str,
        new_status: &str,
    ) -> Result<(), NotifyError>;
}

/// Default notifier: logs the notification and succeeds.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_status_change(
        &self,
        order_id: Uuid,
        recipient_email: &str,
        _recipient_name: &str,
        new_status: &str,
    ) -> Result<(), NotifyError> {
        debug!(
            order_id = %order_id,
            recipient = %recipient_email,
            new_status = %new_status,
            "Status change notification"
        );
        Ok(())
    }
}

/// Fire-and-forget dispatch around a notifier backend. Each dispatch
/// runs on its own task so one recipient's failure cannot affect
/// another's, and the caller never awaits delivery.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub fn dispatch_status_change(
        &self,
        order_id: Uuid,
        recipient_email: String,
        recipient_name: String,
        new_status: String,
    ) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier
                .notify_status_change(order_id, &recipient_email, &recipient_name, &new_status)
                .await
            {
                warn!(
                    order_id = %order_id,
                    recipient = %recipient_email,
                    error = %e,
                    "Failed to deliver status change notification"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    struct RecordingNotifier {
        delivered: Mutex<Vec<Uuid>>,
        fail_for: Option<Uuid>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify_status_change(
            &self,
            order_id: Uuid,
            _recipient_email: &str,
            _recipient_name: &str,
            _new_status: &str,
        ) -> Result<(), NotifyError> {
            if self.fail_for == Some(order_id) {
                return Err(NotifyError("smtp refused".into()));
            }
            self.delivered.lock().unwrap().push(order_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn one_failing_recipient_does_not_affect_others() {
        let failing = Uuid::new_v4();
        let ok_a = Uuid::new_v4();
        let ok_b = Uuid::new_v4();

        let notifier = Arc::new(RecordingNotifier {
            delivered: Mutex::new(Vec::new()),
            fail_for: Some(failing),
        });
        let dispatcher = NotificationDispatcher::new(notifier.clone());

        for id in [ok_a, failing, ok_b] {
            dispatcher.dispatch_status_change(
                id,
                "customer@example.com".into(),
                "Customer".into(),
                "shipped".into(),
            );
        }

        // Dispatch is asynchronous; poll for the two successes.
        for _ in 0..50 {
            if notifier.delivered.lock().unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let delivered = notifier.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 2);
        assert!(delivered.contains(&ok_a));
        assert!(delivered.contains(&ok_b));
        assert!(!delivered.contains(&failing));
    }
}
