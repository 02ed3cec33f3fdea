use async_trait::async_trait;
use k8s_segnet_core::resources::crd::v1alpha1::segmentnetwork::SegmentNetwork;
use thiserror::Error;

pub mod netlink;
pub mod rt_tables;

#[derive(Debug, Error)]
pub enum HostNetworkError {
    #[error("netlink request failed! Reason: {0}")]
    Netlink(#[from] rtnetlink::Error),
    #[error("host device '{0}' is not present on this host!")]
    HostDeviceNotFound(String),
    #[error("segment '{0}' requests a tagged link but names no host device!")]
    HostDeviceNotSpecified(String),
    #[error("couldn't update the routing table registry! Reason: {0}")]
    RtTables(#[from] std::io::Error),
}

/// Host-side realization of a segment. Implementations must be safe to call
/// repeatedly with the same segment: `create` over existing state and
/// `delete` over absent state both succeed.
#[async_trait]
pub trait HostNetworkProvisioner {
    async fn create(&self, network: &SegmentNetwork) -> Result<(), HostNetworkError>;
    async fn delete(&self, network: &SegmentNetwork) -> Result<(), HostNetworkError>;
}
