use async_trait::async_trait;
use k8s_segnet_core::{
    kubernetes::{
        operations::{replace_resource_status, StatusWriteOutcome},
        GetApi,
    },
    resources::crd::v1alpha1::segmentnetwork::{SegmentNetwork, SegmentNetworkStatus},
};
use kube::{Api, Client, ResourceExt};

/// Sink for SegmentNetwork status updates.
#[async_trait]
pub trait NetworkStatusWriter {
    async fn write(
        &self,
        network: &SegmentNetwork,
        status: SegmentNetworkStatus,
    ) -> Result<StatusWriteOutcome, kube::Error>;
}

/// Writes statuses through the cluster API, keyed to the version of the
/// object the notification carried.
pub struct ApiStatusWriter {
    api: Api<SegmentNetwork>,
}

impl ApiStatusWriter {
    pub fn new(client: &Client) -> Self {
        Self {
            api: client.global_api(),
        }
    }
}

#[async_trait]
impl NetworkStatusWriter for ApiStatusWriter {
    async fn write(
        &self,
        network: &SegmentNetwork,
        status: SegmentNetworkStatus,
    ) -> Result<StatusWriteOutcome, kube::Error> {
        replace_resource_status(&self.api, &network.name_any(), network, status).await
    }
}
