//! Prints the CRDs owned by the interconnect fabric as a YAML stream.
//!
//! Usage: `cargo run -p crds --bin crdgen > deploy/crds.yaml`

use crds::{Cluster, Link, Network, NetworkCluster, NetworkLink, NetworkService, Service};
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    let crds = [
        Network::crd(),
        NetworkCluster::crd(),
        NetworkLink::crd(),
        NetworkService::crd(),
        Cluster::crd(),
        Link::crd(),
        Service::crd(),
    ];

    for crd in &crds {
        println!("---");
        print!("{}", serde_yaml::to_string(crd)?);
    }
    Ok(())
}
