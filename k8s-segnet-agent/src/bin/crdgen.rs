use k8s_segnet_core::resources::crd::v1alpha1::segmentnetwork::SegmentNetwork;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&SegmentNetwork::crd())?);

    Ok(())
}
