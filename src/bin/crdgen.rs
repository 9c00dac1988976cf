//! # CRD Generator
//!
//! Prints the CustomResourceDefinitions of both custom resources as a
//! multi-document YAML stream.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/crds.yaml
//!
//! # Custom API group
//! OPERATOR_DOMAIN=secrets.example.com cargo run --bin crdgen | kubectl apply -f -
//! ```

use bitwarden_secrets_controller::crd::{BitwardenSyncConfig, BitwardenSyncSecret};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::core::CustomResourceExt;

/// Move a CRD to another API group (`OPERATOR_DOMAIN`)
fn with_group(mut crd: CustomResourceDefinition, group: &str) -> CustomResourceDefinition {
    crd.metadata.name = Some(format!("{}.{}", crd.spec.names.plural, group));
    crd.spec.group = group.to_string();
    crd
}

fn main() {
    let group = std::env::var("OPERATOR_DOMAIN")
        .ok()
        .filter(|v| !v.is_empty());

    let crds = [BitwardenSyncConfig::crd(), BitwardenSyncSecret::crd()];
    for crd in crds {
        let crd = match &group {
            Some(group) => with_group(crd, group),
            None => crd,
        };
        match serde_yaml::to_string(&crd) {
            Ok(yaml) => {
                println!("---");
                print!("{}", yaml);
            }
            Err(e) => {
                eprintln!("Failed to serialize CRD to YAML: {}", e);
                std::process::exit(1);
            }
        }
    }
}
