use std::{collections::BTreeMap, pin::pin, time::Duration};

use futures::StreamExt;
use k8s_segnet_core::{
    kubernetes::GetApi, resources::crd::v1alpha1::segmentnetwork::SegmentNetwork,
};
use kube::{
    runtime::watcher::{watcher, Config, Event},
    Api, Client, ResourceExt,
};
use log::{debug, warn};
use tokio::sync::mpsc::{channel, Sender};
use tokio_stream::wrappers::ReceiverStream;

const NOTIFICATION_BUFFER: usize = 64;

/// How often the cluster is relisted to repair missed or misordered watch
/// events. Matches the informer period the segments were designed around.
pub const RESYNC_INTERVAL: Duration = Duration::from_secs(60 * 10);

/// Lifecycle notification for a single SegmentNetwork, carrying the last
/// snapshot of the object seen on the watch.
#[derive(Debug, Clone)]
pub enum Notification {
    Created(SegmentNetwork),
    Deleted(SegmentNetwork),
    Modified(SegmentNetwork),
}

/// Turns the raw cluster watch into `Notification`s. Tracks the set of known
/// segments so relists can be classified into creations and deletions.
pub struct EventSource {
    api: Api<SegmentNetwork>,
    resync_interval: Duration,
}

impl EventSource {
    pub fn new(client: &Client) -> Self {
        Self {
            api: client.global_api(),
            resync_interval: RESYNC_INTERVAL,
        }
    }

    /// Spawns the watch pump and returns the notification stream it feeds.
    /// The pump stops once the returned stream is dropped.
    pub fn subscribe(self) -> ReceiverStream<Notification> {
        let (tx, rx) = channel(NOTIFICATION_BUFFER);

        tokio::spawn(self.pump(tx));

        ReceiverStream::new(rx)
    }

    async fn pump(self, tx: Sender<Notification>) {
        let mut known = BTreeMap::new();

        loop {
            let resync = tokio::time::sleep(self.resync_interval);
            let mut events = pin!(watcher(self.api.clone(), Config::default()).take_until(resync));

            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => {
                        for notification in classify(event, &mut known) {
                            if tx.send(notification).await.is_err() {
                                debug!("Notification stream was dropped, stopping the watch");
                                return;
                            }
                        }
                    }
                    Err(error) => warn!("SegmentNetwork watch was interrupted! {error:?}"),
                }
            }

            debug!("Relisting SegmentNetworks");
        }
    }
}

/// Classifies one watch event against the segments known so far. A relist
/// re-announces every listed segment as created and reports segments that
/// vanished between watches as deleted; one name never appears on both sides.
fn classify(
    event: Event<SegmentNetwork>,
    known: &mut BTreeMap<String, SegmentNetwork>,
) -> Vec<Notification> {
    match event {
        Event::Applied(network) => match known.insert(network.name_any(), network.clone()) {
            Some(_) => vec![Notification::Modified(network)],
            None => vec![Notification::Created(network)],
        },
        Event::Deleted(network) => {
            known.remove(&network.name_any());

            vec![Notification::Deleted(network)]
        }
        Event::Restarted(networks) => {
            let mut vanished = std::mem::take(known);
            let mut notifications = Vec::with_capacity(networks.len());

            for network in networks {
                vanished.remove(&network.name_any());
                known.insert(network.name_any(), network.clone());
                notifications.push(Notification::Created(network));
            }

            for (_, network) in vanished {
                notifications.push(Notification::Deleted(network));
            }

            notifications
        }
    }
}
