//! Change-notification listener and the refresh signal consumers refetch on.

use showtrack_backend::{ChangeEvent, ChangeFeed, ChangePayload, RealtimeApi, Result, SubscriptionRequest};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Owns a running subscription. Dropping the handle tears it down.
pub struct RealtimeHandle {
    topic: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl RealtimeHandle {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }

    /// Leave the channel and wait for the listener task to exit
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(topic = %self.topic, error = %e, "Realtime listener ended abnormally");
            }
        }
    }
}

impl Drop for RealtimeHandle {
    fn drop(&mut self) {
        // The listener closes its feed once the shutdown sender is gone
        self.shutdown.take();
    }
}

enum Step {
    Shutdown,
    Change(Option<Result<ChangePayload>>),
}

/// Subscribe to `request` and call `callback` once per matching change
pub async fn listen<F>(api: &dyn RealtimeApi, request: SubscriptionRequest, callback: F) -> Result<RealtimeHandle>
where
    F: FnMut(ChangePayload) + Send + 'static,
{
    let topic = request.topic();
    let event = request.event;
    let feed = api.subscribe(request).await?;
    Ok(spawn_listener(topic, event, feed, callback))
}

pub(crate) fn spawn_listener<F>(
    topic: String,
    event: ChangeEvent,
    mut feed: Box<dyn ChangeFeed>,
    mut callback: F,
) -> RealtimeHandle
where
    F: FnMut(ChangePayload) + Send + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let task_topic = topic.clone();

    let task = tokio::spawn(async move {
        loop {
            let step = tokio::select! {
                _ = &mut shutdown_rx => Step::Shutdown,
                change = feed.next_change() => Step::Change(change),
            };

            match step {
                Step::Shutdown => {
                    if let Err(e) = feed.close().await {
                        warn!(topic = %task_topic, error = %e, "Failed to close realtime feed");
                    }
                    info!(operation = "unsubscribe", topic = %task_topic, "Realtime listener stopped");
                    break;
                }
                Step::Change(Some(Ok(change))) => {
                    if event.matches(change.event) {
                        debug!(topic = %task_topic, event = %change.event, "Change received");
                        callback(change);
                    }
                }
                Step::Change(Some(Err(e))) => {
                    warn!(topic = %task_topic, error = %e, "Realtime feed error");
                }
                Step::Change(None) => {
                    info!(topic = %task_topic, "Realtime feed ended");
                    break;
                }
            }
        }
    });

    RealtimeHandle {
        topic,
        shutdown: Some(shutdown_tx),
        task: Some(task),
    }
}

/// Fan-out of "something changed" to every registered consumer.
///
/// Each listener observes every notification once, so each consumer runs one
/// refetch per change.
#[derive(Clone)]
pub struct RefreshSignal {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Default for RefreshSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshSignal {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    pub fn subscribe(&self) -> RefreshListener {
        RefreshListener {
            receiver: self.sender.subscribe(),
        }
    }

    /// Returns the number of consumers notified
    pub fn notify(&self, change: &ChangePayload) -> usize {
        self.sender.send(change.event).unwrap_or(0)
    }

    pub fn consumers(&self) -> usize {
        self.sender.receiver_count()
    }
}

pub struct RefreshListener {
    receiver: broadcast::Receiver<ChangeEvent>,
}

impl RefreshListener {
    /// Wait for the next change; `None` once every signal clone is gone
    pub async fn changed(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Refresh listener fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Drain a pending change without waiting
    pub fn try_changed(&mut self) -> Option<ChangeEvent> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedFeed;
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn change(event: ChangeEvent) -> ChangePayload {
        ChangePayload {
            event,
            schema: "public".to_string(),
            table: "tvshow".to_string(),
            commit_timestamp: None,
            record: Some(serde_json::json!({"Show": "Dark"})),
            old_record: None,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_callback_fires_once_per_matching_event() {
        let (feed, sender, _closed) = ScriptedFeed::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handle = spawn_listener(
            "realtime:public:tvshow".to_string(),
            ChangeEvent::Update,
            Box::new(feed),
            move |c| sink.lock().unwrap().push(c.event),
        );

        sender.send(Ok(change(ChangeEvent::Update))).unwrap();
        sender.send(Ok(change(ChangeEvent::Insert))).unwrap();
        sender.send(Ok(change(ChangeEvent::Update))).unwrap();
        settle().await;

        assert_eq!(*seen.lock().unwrap(), vec![ChangeEvent::Update, ChangeEvent::Update]);
        handle.close().await;
    }

    #[tokio::test]
    async fn test_feed_errors_do_not_stop_listener() {
        let (feed, sender, _closed) = ScriptedFeed::new();
        let count = Arc::new(Mutex::new(0));
        let sink = count.clone();
        let handle = spawn_listener("t".to_string(), ChangeEvent::All, Box::new(feed), move |_| {
            *sink.lock().unwrap() += 1
        });

        sender.send(Err(showtrack_backend::BackendError::new("bad frame"))).unwrap();
        sender.send(Ok(change(ChangeEvent::Delete))).unwrap();
        settle().await;

        assert_eq!(*count.lock().unwrap(), 1);
        assert!(!handle.is_finished());
        handle.close().await;
    }

    #[tokio::test]
    async fn test_close_and_drop_tear_down_feed() {
        let (feed, _sender, closed) = ScriptedFeed::new();
        let handle = spawn_listener("t".to_string(), ChangeEvent::All, Box::new(feed), |_| {});
        handle.close().await;
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        let (feed, _sender, closed) = ScriptedFeed::new();
        let handle = spawn_listener("t".to_string(), ChangeEvent::All, Box::new(feed), |_| {});
        drop(handle);
        settle().await;
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_feed_end_finishes_listener() {
        let (feed, sender, _closed) = ScriptedFeed::new();
        let handle = spawn_listener("t".to_string(), ChangeEvent::All, Box::new(feed), |_| {});
        drop(sender);
        settle().await;
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_refresh_signal_reaches_each_consumer_once() {
        let signal = RefreshSignal::new();
        let mut first = signal.subscribe();
        let mut second = signal.subscribe();
        assert_eq!(signal.consumers(), 2);

        assert_eq!(signal.notify(&change(ChangeEvent::Insert)), 2);

        assert_eq!(first.changed().await, Some(ChangeEvent::Insert));
        assert_eq!(second.changed().await, Some(ChangeEvent::Insert));
        assert_eq!(first.try_changed(), None);
        assert_eq!(second.try_changed(), None);
    }

    #[tokio::test]
    async fn test_listener_drives_refresh_signal() {
        let (feed, sender, _closed) = ScriptedFeed::new();
        let signal = RefreshSignal::new();
        let mut consumer = signal.subscribe();
        let notifier = signal.clone();
        let handle = spawn_listener("t".to_string(), ChangeEvent::All, Box::new(feed), move |c| {
            notifier.notify(&c);
        });

        sender.send(Ok(change(ChangeEvent::Update))).unwrap();
        let event = tokio::time::timeout(Duration::from_secs(1), consumer.changed()).await.unwrap();
        assert_eq!(event, Some(ChangeEvent::Update));
        handle.close().await;
    }
}
