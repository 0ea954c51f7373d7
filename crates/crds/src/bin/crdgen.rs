//! # CRD Generator
//!
//! Prints the CustomResourceDefinition YAML of every Auth0 operator resource.
//!
//! ```bash
//! cargo run -p crds --bin crdgen > config/crd/auth0.yaml
//! cargo run -p crds --bin crdgen | kubectl apply -f -
//! ```

use crds::{A0Client, A0ClientGrant, A0Connection, A0ResourceServer, A0Tenant};
use kube::core::CustomResourceExt;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;

fn main() {
    let crds: [CustomResourceDefinition; 5] = [
        A0Tenant::crd(),
        A0Client::crd(),
        A0ClientGrant::crd(),
        A0Connection::crd(),
        A0ResourceServer::crd(),
    ];

    for crd in &crds {
        match serde_yaml::to_string(crd) {
            Ok(yaml) => {
                println!("---");
                print!("{yaml}");
            }
            Err(e) => {
                eprintln!("Failed to serialize CRD to YAML: {e}");
                std::process::exit(1);
            }
        }
    }
}
