//! # CRD Generator
//!
//! Prints the Subscription CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/subscription.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```
//!
//! The APIRule CRD belongs to the API gateway and is not generated here.

use eventing_controller::crd::Subscription;
use kube::core::CustomResourceExt;

fn main() {
    let crd = Subscription::crd();
    match serde_yaml::to_string(&crd) {
        Ok(yaml) => print!("{yaml}"),
        Err(e) => {
            eprintln!("Failed to serialize CRD to YAML: {e}");
            std::process::exit(1);
        }
    }
}
