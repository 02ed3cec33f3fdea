use async_trait::async_trait;
use futures::TryStreamExt;
use k8s_segnet_core::resources::crd::v1alpha1::segmentnetwork::SegmentNetwork;
use kube::ResourceExt;
use log::debug;
use netlink_packet_route::link::LinkMessage;
use rtnetlink::Handle;

use super::{rt_tables::RtTablesFile, HostNetworkError, HostNetworkProvisioner};

/// IANA assigned UDP port for VXLAN endpoints.
const VXLAN_PORT: u16 = 4789;

pub struct NetlinkProvisioner {
    handle: Handle,
    rt_tables: RtTablesFile,
}

impl NetlinkProvisioner {
    /// Opens a netlink socket and drives it from a background task.
    pub fn connect() -> std::io::Result<Self> {
        let (connection, handle, _) = rtnetlink::new_connection()?;

        tokio::spawn(connection);

        Ok(Self {
            handle,
            rt_tables: RtTablesFile::default(),
        })
    }

    async fn find_link(&self, name: &str) -> Result<Option<LinkMessage>, HostNetworkError> {
        let mut links = self
            .handle
            .link()
            .get()
            .match_name(name.to_owned())
            .execute();

        match links.try_next().await {
            Ok(link) => Ok(link),
            Err(error) if is_absent_link(&error) => Ok(None),
            Err(error) => Err(HostNetworkError::Netlink(error)),
        }
    }

    async fn host_device_index(&self, network: &SegmentNetwork) -> Result<u32, HostNetworkError> {
        let device = network
            .spec
            .host_device
            .as_deref()
            .ok_or_else(|| HostNetworkError::HostDeviceNotSpecified(network.name_any()))?;

        match self.find_link(device).await? {
            Some(link) => Ok(link.header.index),
            None => Err(HostNetworkError::HostDeviceNotFound(device.to_owned())),
        }
    }

    async fn ensure_vlan_link(
        &self,
        name: &str,
        parent: u32,
        vlan: u16,
    ) -> Result<(), HostNetworkError> {
        if self.find_link(name).await?.is_none() {
            let request = self.handle.link().add().vlan(name.to_owned(), parent, vlan);

            match request.execute().await {
                Ok(()) => debug!("Created VLAN link '{name}'"),
                Err(error) if is_existing_link(&error) => {}
                Err(error) => return Err(HostNetworkError::Netlink(error)),
            }
        }

        self.ensure_link_up(name).await
    }

    async fn ensure_vxlan_link(
        &self,
        name: &str,
        parent: u32,
        vni: u32,
    ) -> Result<(), HostNetworkError> {
        if self.find_link(name).await?.is_none() {
            let request = self
                .handle
                .link()
                .add()
                .vxlan(name.to_owned(), vni)
                .link(parent)
                .port(VXLAN_PORT);

            match request.execute().await {
                Ok(()) => debug!("Created VXLAN link '{name}'"),
                Err(error) if is_existing_link(&error) => {}
                Err(error) => return Err(HostNetworkError::Netlink(error)),
            }
        }

        self.ensure_link_up(name).await
    }

    async fn ensure_link_up(&self, name: &str) -> Result<(), HostNetworkError> {
        if let Some(link) = self.find_link(name).await? {
            self.handle
                .link()
                .set(link.header.index)
                .up()
                .execute()
                .await?;
        }

        Ok(())
    }

    async fn remove_link(&self, name: &str) -> Result<(), HostNetworkError> {
        let Some(link) = self.find_link(name).await? else {
            return Ok(());
        };

        match self.handle.link().del(link.header.index).execute().await {
            Ok(()) => {
                debug!("Removed link '{name}'");
                Ok(())
            }
            Err(error) if is_absent_link(&error) => Ok(()),
            Err(error) => Err(HostNetworkError::Netlink(error)),
        }
    }
}

#[async_trait]
impl HostNetworkProvisioner for NetlinkProvisioner {
    async fn create(&self, network: &SegmentNetwork) -> Result<(), HostNetworkError> {
        let name = network.name_any();
        let spec = &network.spec;

        if let Some(table) = spec.routing_table {
            self.rt_tables.register(table, &name).await?;
        }

        if spec.vlan.is_some() || spec.vxlan.is_some() {
            let parent = self.host_device_index(network).await?;

            if let (Some(vlan), Some(link_name)) = (spec.vlan, spec.vlan_link_name()) {
                self.ensure_vlan_link(&link_name, parent, vlan).await?;
            }

            if let (Some(vni), Some(link_name)) = (spec.vxlan, spec.vxlan_link_name(&name)) {
                self.ensure_vxlan_link(&link_name, parent, vni).await?;
            }
        }

        Ok(())
    }

    async fn delete(&self, network: &SegmentNetwork) -> Result<(), HostNetworkError> {
        let name = network.name_any();
        let spec = &network.spec;

        if let Some(link_name) = spec.vxlan_link_name(&name) {
            self.remove_link(&link_name).await?;
        }

        if let Some(link_name) = spec.vlan_link_name() {
            self.remove_link(&link_name).await?;
        }

        if spec.routing_table.is_some() {
            self.rt_tables.unregister(&name).await?;
        }

        Ok(())
    }
}

fn is_existing_link(error: &rtnetlink::Error) -> bool {
    netlink_errno(error) == Some(-libc::EEXIST)
}

fn is_absent_link(error: &rtnetlink::Error) -> bool {
    matches!(
        netlink_errno(error),
        Some(code) if code == -libc::ENODEV || code == -libc::ENOENT
    )
}

fn netlink_errno(error: &rtnetlink::Error) -> Option<i32> {
    match error {
        rtnetlink::Error::NetlinkError(message) => Some(message.raw_code()),
        _ => None,
    }
}
