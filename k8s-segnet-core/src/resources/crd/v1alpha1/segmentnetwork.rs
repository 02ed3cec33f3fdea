use ipnet::Ipv4Net;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use thiserror::Error;

pub const MIN_VLAN_ID: u16 = 1;
pub const MAX_VLAN_ID: u16 = 4094;
pub const MIN_VNI: u32 = 1;
pub const MAX_VNI: u32 = 16_777_214;
pub const MIN_ROUTING_TABLE: u32 = 1;
/// tables 253-255 are preassigned in iproute2's rt_tables
pub const MAX_ROUTING_TABLE: u32 = 252;

/// IFNAMSIZ minus the trailing NUL
pub const MAX_LINK_NAME_LEN: usize = 15;

const VXLAN_LINK_PREFIX: &str = "vx-";

#[skip_serializing_none]
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[kube(
    group = "segnet.dev",
    version = "v1alpha1",
    kind = "SegmentNetwork",
    status = "SegmentNetworkStatus",
    derive = "Default"
)]
pub struct SegmentNetworkSpec {
    /// host NIC this segment attaches to, required whenever a VLAN or VXLAN id is set
    pub host_device: Option<String>,
    /// 802.1q id of the tagged subinterface created on the host device
    pub vlan: Option<u16>,
    /// VNI of the VXLAN overlay endpoint created on the host device
    pub vxlan: Option<u32>,
    /// policy routing table registered for this segment on every host
    pub routing_table: Option<u32>,
    /// address range handed out to workloads attached to this segment
    pub cidr: Option<Ipv4Net>,
}

#[skip_serializing_none]
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SegmentNetworkStatus {
    /// whether the last provisioning attempt accepted this segment
    pub valid: bool,
    /// reason the segment was rejected, unset for accepted segments
    pub message: Option<String>,
}

impl SegmentNetworkStatus {
    pub fn accepted() -> Self {
        Self {
            valid: true,
            message: None,
        }
    }

    pub fn rejected(message: String) -> Self {
        Self {
            valid: false,
            message: Some(message),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SegmentValidationError {
    #[error("VLAN id {0} is outside the {MIN_VLAN_ID}-{MAX_VLAN_ID} range!")]
    VlanOutOfRange(u16),
    #[error("VXLAN id {0} is outside the {MIN_VNI}-{MAX_VNI} range!")]
    VxlanOutOfRange(u32),
    #[error("routing table {0} is outside the {MIN_ROUTING_TABLE}-{MAX_ROUTING_TABLE} range!")]
    RoutingTableOutOfRange(u32),
    #[error("a segment with a VLAN or VXLAN id must name a host device!")]
    MissingHostDevice,
    #[error("link name '{0}' is over the {MAX_LINK_NAME_LEN} character limit!")]
    LinkNameTooLong(String),
}

impl SegmentNetworkSpec {
    /// Checks whether this segment can be realized on a host at all.
    /// Rejected segments must not reach the provisioner.
    pub fn validate(&self, name: &str) -> Result<(), SegmentValidationError> {
        if let Some(vlan) = self.vlan {
            if !(MIN_VLAN_ID..=MAX_VLAN_ID).contains(&vlan) {
                return Err(SegmentValidationError::VlanOutOfRange(vlan));
            }
        }

        if let Some(vxlan) = self.vxlan {
            if !(MIN_VNI..=MAX_VNI).contains(&vxlan) {
                return Err(SegmentValidationError::VxlanOutOfRange(vxlan));
            }
        }

        if let Some(table) = self.routing_table {
            if !(MIN_ROUTING_TABLE..=MAX_ROUTING_TABLE).contains(&table) {
                return Err(SegmentValidationError::RoutingTableOutOfRange(table));
            }
        }

        if (self.vlan.is_some() || self.vxlan.is_some()) && self.host_device.is_none() {
            return Err(SegmentValidationError::MissingHostDevice);
        }

        if let Some(link_name) = self.vlan_link_name() {
            if link_name.len() > MAX_LINK_NAME_LEN {
                return Err(SegmentValidationError::LinkNameTooLong(link_name));
            }
        }

        if let Some(link_name) = self.vxlan_link_name(name) {
            if link_name.len() > MAX_LINK_NAME_LEN {
                return Err(SegmentValidationError::LinkNameTooLong(link_name));
            }
        }

        Ok(())
    }

    /// Name of the tagged subinterface for this segment, if it requests one.
    pub fn vlan_link_name(&self) -> Option<String> {
        match (&self.host_device, self.vlan) {
            (Some(device), Some(vlan)) => Some(format!("{device}.{vlan}")),
            _ => None,
        }
    }

    /// Name of the VXLAN endpoint link for this segment, if it requests one.
    /// Derived from the resource name so it stays stable across spec changes.
    pub fn vxlan_link_name(&self, name: &str) -> Option<String> {
        self.vxlan.map(|_| format!("{VXLAN_LINK_PREFIX}{name}"))
    }
}
