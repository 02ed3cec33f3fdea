use std::{error::Error, process::exit};

use kube::Client;

use crate::{controller::start_segment_controller, host_network::netlink::NetlinkProvisioner};

mod controller;
mod host_network;

#[tokio::main()]
async fn main() -> Result<(), Box<dyn Error>> {
    configure_logger();

    let client = create_client().await;
    let provisioner = create_provisioner();

    start_segment_controller(client, provisioner).await;

    Ok(())
}

async fn create_client() -> Client {
    match Client::try_default().await {
        Ok(client) => client,
        Err(error) => {
            log::error!("Couldn't create client! {error:?}");
            exit(6)
        }
    }
}

fn create_provisioner() -> NetlinkProvisioner {
    match NetlinkProvisioner::connect() {
        Ok(provisioner) => provisioner,
        Err(error) => {
            log::error!("Couldn't open the netlink socket! {error:?}");
            exit(7)
        }
    }
}

fn configure_logger() {
    env_logger::builder()
        .default_format()
        .format_module_path(false)
        .filter_level(log::LevelFilter::Info)
        .init()
}
