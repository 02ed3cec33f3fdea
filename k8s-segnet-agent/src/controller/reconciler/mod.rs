use std::pin::pin;

use futures::{Stream, StreamExt};
use k8s_segnet_core::{
    kubernetes::operations::StatusWriteOutcome,
    resources::crd::v1alpha1::segmentnetwork::{SegmentNetwork, SegmentNetworkStatus},
};
use kube::ResourceExt;
use log::{debug, error, info, warn};

use crate::host_network::HostNetworkProvisioner;

use super::{event_source::Notification, status::NetworkStatusWriter};

/// Applies the per-notification policy: creations are validated, provisioned
/// and reflected in the resource status, deletions tear host state down, and
/// modifications are ignored. Failures are logged against the segment that
/// caused them and never stop the loop.
pub struct Reconciler<P, S> {
    provisioner: P,
    status_writer: S,
}

impl<P, S> Reconciler<P, S>
where
    P: HostNetworkProvisioner,
    S: NetworkStatusWriter,
{
    pub fn new(provisioner: P, status_writer: S) -> Self {
        Self {
            provisioner,
            status_writer,
        }
    }

    /// Consumes notifications one at a time, preserving their order per
    /// segment, until the stream ends.
    pub async fn run(self, notifications: impl Stream<Item = Notification>) {
        let mut notifications = pin!(notifications);

        while let Some(notification) = notifications.next().await {
            self.process(notification).await;
        }
    }

    pub async fn process(&self, notification: Notification) {
        match notification {
            Notification::Created(network) => self.handle_created(&network).await,
            Notification::Deleted(network) => self.handle_deleted(&network).await,
            Notification::Modified(network) => {
                // segments are provisioned once; spec edits don't propagate to hosts
                debug!(
                    "Ignoring modification of SegmentNetwork '{}'",
                    network.name_any()
                );
            }
        }
    }

    async fn handle_created(&self, network: &SegmentNetwork) {
        let Some(name) = network.metadata.name.clone() else {
            warn!("Discarding a nameless SegmentNetwork notification!");
            return;
        };

        if let Err(error) = network.spec.validate(&name) {
            warn!("SegmentNetwork '{name}' was rejected! {error}");
            self.apply_status(network, SegmentNetworkStatus::rejected(error.to_string()))
                .await;

            return;
        }

        if let Err(error) = self.provisioner.create(network).await {
            error!("Creating host interfaces for SegmentNetwork '{name}' failed! {error}");

            return;
        }

        info!("Host interfaces for SegmentNetwork '{name}' are ready");
        self.apply_status(network, SegmentNetworkStatus::accepted())
            .await;
    }

    async fn handle_deleted(&self, network: &SegmentNetwork) {
        let name = network.name_any();

        match self.provisioner.delete(network).await {
            Ok(()) => info!("Removed host interfaces for SegmentNetwork '{name}'"),
            Err(error) => {
                warn!("Deleting host interfaces for SegmentNetwork '{name}' failed! {error}")
            }
        }
    }

    async fn apply_status(&self, network: &SegmentNetwork, status: SegmentNetworkStatus) {
        let name = network.name_any();

        match self.status_writer.write(network, status).await {
            Ok(StatusWriteOutcome::Applied) => (),
            Ok(StatusWriteOutcome::Superseded) => {
                debug!("SegmentNetwork '{name}' changed, leaving its status to the next round")
            }
            Err(error) => warn!("Couldn't update the status of SegmentNetwork '{name}'! {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeSet,
        sync::{Arc, Mutex},
    };

    use async_trait::async_trait;
    use futures::stream;
    use k8s_segnet_core::resources::crd::v1alpha1::segmentnetwork::SegmentNetworkSpec;
    use kube::core::ErrorResponse;

    use crate::host_network::HostNetworkError;

    use super::*;

    #[derive(Clone, Default)]
    struct FakeHost {
        created: Arc<Mutex<Vec<String>>>,
        deleted: Arc<Mutex<Vec<String>>>,
        provisioned: Arc<Mutex<BTreeSet<String>>>,
        fail_create: bool,
    }

    #[async_trait]
    impl HostNetworkProvisioner for FakeHost {
        async fn create(&self, network: &SegmentNetwork) -> Result<(), HostNetworkError> {
            let name = network.name_any();
            self.created.lock().unwrap().push(name.clone());

            if self.fail_create {
                return Err(HostNetworkError::HostDeviceNotFound("eth0".to_owned()));
            }

            self.provisioned.lock().unwrap().insert(name);

            Ok(())
        }

        async fn delete(&self, network: &SegmentNetwork) -> Result<(), HostNetworkError> {
            let name = network.name_any();
            self.deleted.lock().unwrap().push(name.clone());
            self.provisioned.lock().unwrap().remove(&name);

            Ok(())
        }
    }

    #[derive(Clone)]
    struct FakeStatusWriter {
        writes: Arc<Mutex<Vec<(String, SegmentNetworkStatus)>>>,
        outcome: StatusWriteOutcome,
        fail: bool,
    }

    impl Default for FakeStatusWriter {
        fn default() -> Self {
            Self {
                writes: Arc::default(),
                outcome: StatusWriteOutcome::Applied,
                fail: false,
            }
        }
    }

    #[async_trait]
    impl NetworkStatusWriter for FakeStatusWriter {
        async fn write(
            &self,
            network: &SegmentNetwork,
            status: SegmentNetworkStatus,
        ) -> Result<StatusWriteOutcome, kube::Error> {
            if self.fail {
                return Err(kube::Error::Api(ErrorResponse {
                    status: "Failure".to_owned(),
                    message: "status subresource is on strike".to_owned(),
                    reason: "InternalError".to_owned(),
                    code: 500,
                }));
            }

            self.writes
                .lock()
                .unwrap()
                .push((network.name_any(), status));

            Ok(self.outcome)
        }
    }

    fn make_network(name: &str) -> SegmentNetwork {
        SegmentNetwork::new(
            name,
            SegmentNetworkSpec {
                host_device: Some("eth0".to_owned()),
                vlan: Some(42),
                vxlan: Some(5001),
                routing_table: Some(100),
                cidr: None,
            },
        )
    }

    fn make_reconciler(
        host: &FakeHost,
        status_writer: &FakeStatusWriter,
    ) -> Reconciler<FakeHost, FakeStatusWriter> {
        Reconciler::new(host.clone(), status_writer.clone())
    }

    #[tokio::test]
    async fn created_segments_are_provisioned_and_marked_valid() {
        let host = FakeHost::default();
        let status_writer = FakeStatusWriter::default();
        let reconciler = make_reconciler(&host, &status_writer);

        reconciler
            .process(Notification::Created(make_network("net-a")))
            .await;

        assert_eq!(*host.created.lock().unwrap(), vec!["net-a"]);
        assert_eq!(
            *status_writer.writes.lock().unwrap(),
            vec![("net-a".to_owned(), SegmentNetworkStatus::accepted())]
        );
    }

    #[tokio::test]
    async fn rejected_segments_never_reach_the_provisioner() {
        let host = FakeHost::default();
        let status_writer = FakeStatusWriter::default();
        let reconciler = make_reconciler(&host, &status_writer);

        let mut network = make_network("net-a");
        network.spec.vlan = Some(5000);

        reconciler.process(Notification::Created(network)).await;

        assert!(host.created.lock().unwrap().is_empty());

        let writes = status_writer.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, "net-a");
        assert!(!writes[0].1.valid);
        assert!(writes[0].1.message.is_some());
    }

    #[tokio::test]
    async fn failed_provisioning_leaves_the_status_untouched() {
        let host = FakeHost {
            fail_create: true,
            ..FakeHost::default()
        };
        let status_writer = FakeStatusWriter::default();
        let reconciler = make_reconciler(&host, &status_writer);

        reconciler
            .process(Notification::Created(make_network("net-a")))
            .await;

        assert_eq!(*host.created.lock().unwrap(), vec!["net-a"]);
        assert!(status_writer.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deletion_succeeds_after_a_failed_creation() {
        let host = FakeHost {
            fail_create: true,
            ..FakeHost::default()
        };
        let status_writer = FakeStatusWriter::default();
        let reconciler = make_reconciler(&host, &status_writer);

        reconciler
            .process(Notification::Created(make_network("net-a")))
            .await;
        reconciler
            .process(Notification::Deleted(make_network("net-a")))
            .await;

        assert_eq!(*host.deleted.lock().unwrap(), vec!["net-a"]);
        assert!(host.provisioned.lock().unwrap().is_empty());
        assert!(status_writer.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_a_segment_without_host_state_is_not_an_error() {
        let host = FakeHost::default();
        let status_writer = FakeStatusWriter::default();
        let reconciler = make_reconciler(&host, &status_writer);

        reconciler
            .process(Notification::Deleted(make_network("net-a")))
            .await;

        assert_eq!(*host.deleted.lock().unwrap(), vec!["net-a"]);
        assert!(status_writer.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn modifications_do_not_touch_the_host_or_the_status() {
        let host = FakeHost::default();
        let status_writer = FakeStatusWriter::default();
        let reconciler = make_reconciler(&host, &status_writer);

        let mut network = make_network("net-a");
        network.spec.vlan = Some(43);

        reconciler.process(Notification::Modified(network)).await;

        assert!(host.created.lock().unwrap().is_empty());
        assert!(host.deleted.lock().unwrap().is_empty());
        assert!(status_writer.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn superseded_status_writes_count_as_success() {
        let host = FakeHost::default();
        let status_writer = FakeStatusWriter {
            outcome: StatusWriteOutcome::Superseded,
            ..FakeStatusWriter::default()
        };
        let reconciler = make_reconciler(&host, &status_writer);

        reconciler
            .process(Notification::Created(make_network("net-a")))
            .await;

        assert_eq!(*host.created.lock().unwrap(), vec!["net-a"]);
        assert_eq!(status_writer.writes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn status_write_failures_do_not_stop_the_loop() {
        let host = FakeHost::default();
        let status_writer = FakeStatusWriter {
            fail: true,
            ..FakeStatusWriter::default()
        };
        let reconciler = make_reconciler(&host, &status_writer);

        reconciler
            .run(stream::iter(vec![
                Notification::Created(make_network("net-a")),
                Notification::Created(make_network("net-b")),
            ]))
            .await;

        assert_eq!(*host.created.lock().unwrap(), vec!["net-a", "net-b"]);
    }

    #[tokio::test]
    async fn redelivered_creations_converge_on_provisioned_state() {
        let host = FakeHost::default();
        let status_writer = FakeStatusWriter::default();
        let reconciler = make_reconciler(&host, &status_writer);

        // a deletion racing a relist that still listed the segment
        reconciler
            .run(stream::iter(vec![
                Notification::Deleted(make_network("net-a")),
                Notification::Created(make_network("net-a")),
            ]))
            .await;

        assert!(host.provisioned.lock().unwrap().contains("net-a"));
    }

    #[tokio::test]
    async fn relist_deletions_converge_on_absent_state() {
        let host = FakeHost::default();
        let status_writer = FakeStatusWriter::default();
        let reconciler = make_reconciler(&host, &status_writer);

        reconciler
            .run(stream::iter(vec![
                Notification::Created(make_network("net-a")),
                Notification::Deleted(make_network("net-a")),
            ]))
            .await;

        assert!(host.provisioned.lock().unwrap().is_empty());
    }
}
