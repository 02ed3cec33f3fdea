use kube::Client;
use log::info;

use crate::host_network::netlink::NetlinkProvisioner;

use self::{event_source::EventSource, reconciler::Reconciler, status::ApiStatusWriter};

pub mod event_source;
pub mod reconciler;
pub mod status;

pub async fn start_segment_controller(client: Client, provisioner: NetlinkProvisioner) {
    info!("Creating segment controller...");

    let notifications = EventSource::new(&client).subscribe();
    let reconciler = Reconciler::new(provisioner, ApiStatusWriter::new(&client));

    info!("Segment controller created!");

    reconciler.run(notifications).await
}
