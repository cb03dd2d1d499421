//! Event routing: subscription matching and fan-out to targets and listeners.
//!
//! [`Dispatcher`] decouples object operations from delivery. Each event is
//! hashed by `bucket/object` onto one worker, so events for the same object
//! are delivered in the order they were routed.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, join_all};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::event::{EventData, NotificationEvent};
use crate::filter::service_matches;
use crate::listener::{ListenerChan, ListenerSend};
use crate::notifier::Shared;
use crate::targets::DynTarget;

/// Outcome counts of one delivery round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Subscriptions that matched the event.
    pub matched: usize,
    pub delivered: usize,
    /// Deliveries that failed or timed out.
    pub failed: usize,
    /// Matched subscriptions with no live target to deliver to.
    pub skipped: usize,
}

enum Outcome {
    Delivered,
    Failed,
    Skipped,
}

/// Where one matched subscription sends its event.
enum Route {
    External {
        target: DynTarget,
        configuration_id: String,
    },
    Listener {
        arn: String,
        configuration_id: String,
        chan: Option<ListenerChan>,
    },
    Remote {
        arn: String,
        configuration_id: String,
        node: String,
    },
}

/// Resolves the routes for `data` under the state read lock.
fn resolve_routes(shared: &Shared, data: &EventData) -> (usize, Vec<Route>) {
    let state = shared.state.read();
    let key = data.object.name.as_str();
    let local = shared.peers.local_addr();
    let mut matched = 0;
    let mut routes = Vec::new();

    if let Some(config) = state.notification_configs.get(&data.bucket) {
        for queue in &config.queue_configs {
            if !service_matches(&queue.service, data.event_name, key) {
                continue;
            }
            matched += 1;
            match state.external_targets.get(&queue.queue_arn) {
                Some(target) => routes.push(Route::External {
                    target,
                    configuration_id: queue.service.id.clone(),
                }),
                None => debug!(arn = %queue.queue_arn, "No target registered, dropping event"),
            }
        }
    }

    if let Some(listeners) = state.listener_configs.get(&data.bucket) {
        for listener in listeners {
            let topic = &listener.topic_config;
            if !service_matches(&topic.service, data.event_name, key) {
                continue;
            }
            matched += 1;
            let arn = topic.topic_arn.clone();
            let configuration_id = topic.service.id.clone();
            if listener.target_server == local {
                routes.push(Route::Listener {
                    chan: state.internal_targets.get(&arn),
                    arn,
                    configuration_id,
                });
            } else {
                routes.push(Route::Remote {
                    arn,
                    configuration_id,
                    node: listener.target_server.clone(),
                });
            }
        }
    }

    (matched, routes)
}

/// Delivers `data` to every matching subscription concurrently.
///
/// Never fails: each delivery is bounded by the configured timeout and its
/// outcome only shows up in the report and the logs.
pub(crate) async fn deliver(shared: &Shared, data: &EventData) -> DeliveryReport {
    let (matched, routes) = resolve_routes(shared, data);
    let mut report = DeliveryReport {
        matched,
        skipped: matched - routes.len(),
        ..Default::default()
    };
    if routes.is_empty() {
        return report;
    }

    let timeout = shared.config.delivery_timeout();
    let region = shared.config.region.as_str();

    let deliveries: Vec<BoxFuture<'_, Outcome>> = routes
        .into_iter()
        .map(|route| match route {
            Route::External {
                target,
                configuration_id,
            } => async move {
                let event = NotificationEvent::new(data, &configuration_id, region);
                match tokio::time::timeout(timeout, target.deliver(&event)).await {
                    Ok(Ok(())) => Outcome::Delivered,
                    Ok(Err(e)) => {
                        warn!(
                            arn = %target.arn(),
                            target = %target.kind(),
                            bucket = %data.bucket,
                            error = %e,
                            "Event delivery failed"
                        );
                        Outcome::Failed
                    }
                    Err(_) => {
                        warn!(
                            arn = %target.arn(),
                            target = %target.kind(),
                            timeout_ms = timeout.as_millis() as u64,
                            "Event delivery timed out"
                        );
                        Outcome::Failed
                    }
                }
            }
            .boxed(),
            Route::Listener {
                arn,
                configuration_id,
                chan,
            } => async move {
                let Some(chan) = chan else {
                    debug!(arn = %arn, "No listener channel registered");
                    return Outcome::Skipped;
                };
                let event = NotificationEvent::new(data, &configuration_id, region);
                match shared.send_to_listener(&arn, &chan, vec![event]).await {
                    ListenerSend::Delivered => Outcome::Delivered,
                    ListenerSend::Closed | ListenerSend::Unregistered => {
                        debug!(arn = %arn, "Listener gone before delivery");
                        Outcome::Skipped
                    }
                    ListenerSend::TimedOut => {
                        warn!(arn = %arn, "Listener too slow, event dropped");
                        Outcome::Failed
                    }
                }
            }
            .boxed(),
            Route::Remote {
                arn,
                configuration_id,
                node,
            } => async move {
                if !shared.peers.is_distributed() {
                    return Outcome::Skipped;
                }
                let event = NotificationEvent::new(data, &configuration_id, region);
                let forward = shared.peers.forward_event(&node, &arn, vec![event]);
                match tokio::time::timeout(timeout, forward).await {
                    Ok(Ok(())) => Outcome::Delivered,
                    Ok(Err(e)) => {
                        warn!(node = %node, arn = %arn, error = %e, "Event forwarding failed");
                        Outcome::Failed
                    }
                    Err(_) => {
                        warn!(node = %node, arn = %arn, "Event forwarding timed out");
                        Outcome::Failed
                    }
                }
            }
            .boxed(),
        })
        .collect();

    for outcome in join_all(deliveries).await {
        match outcome {
            Outcome::Delivered => report.delivered += 1,
            Outcome::Failed => report.failed += 1,
            Outcome::Skipped => report.skipped += 1,
        }
    }
    report
}

/// Worker pool running deliveries off the caller's task.
pub(crate) struct Dispatcher {
    queues: Vec<mpsc::Sender<EventData>>,
}

impl Dispatcher {
    /// Spawns `workers` delivery tasks. They stop once the dispatcher is dropped.
    pub(crate) fn start(shared: Arc<Shared>, workers: usize, capacity: usize) -> Self {
        let queues = (0..workers.max(1))
            .map(|worker| {
                let (tx, rx) = mpsc::channel(capacity.max(1));
                tokio::spawn(run_worker(worker, shared.clone(), rx));
                tx
            })
            .collect();
        Self { queues }
    }

    /// Queues `data` without waiting. Returns false if it was dropped.
    pub(crate) fn enqueue(&self, data: EventData) -> bool {
        let mut hasher = DefaultHasher::new();
        data.ordering_key().hash(&mut hasher);
        let index = (hasher.finish() % self.queues.len() as u64) as usize;

        match self.queues[index].try_send(data) {
            Ok(()) => true,
            Err(TrySendError::Full(data)) => {
                warn!(
                    bucket = %data.bucket,
                    object = %data.object.name,
                    event = %data.event_name,
                    worker = index,
                    "Notification queue full, event dropped"
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

async fn run_worker(worker: usize, shared: Arc<Shared>, mut rx: mpsc::Receiver<EventData>) {
    while let Some(data) = rx.recv().await {
        let report = deliver(&shared, &data).await;
        if report.matched > 0 {
            debug!(
                worker,
                bucket = %data.bucket,
                event = %data.event_name,
                delivered = report.delivered,
                failed = report.failed,
                skipped = report.skipped,
                "Event routed"
            );
        }
    }
    debug!(worker, "Notification worker stopped");
}
