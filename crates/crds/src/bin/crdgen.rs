//! Prints the Website CRD manifest as YAML.
//!
//! ```sh
//! cargo run -p crds --bin crdgen > deploy/crds/website.yaml
//! kubectl apply -f deploy/crds/website.yaml
//! ```

use crds::Website;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crd = Website::crd();
    print!("{}", serde_yaml::to_string(&crd)?);
    Ok(())
}
