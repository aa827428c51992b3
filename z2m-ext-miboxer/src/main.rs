//! zigbee2mqtt extension host for MiBoxer FUT089Z remotes.

use z2m_ext_miboxer::{ControlsExposer, MiboxerConfig};
use z2m_extension_framework::run_extension_host;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    run_extension_host::<MiboxerConfig, _>("z2m-ext-miboxer", "miboxer.json5", |runner| {
        let exposer = ControlsExposer::new(runner.context().clone(), runner.config().remote.clone());
        runner.add(exposer);
        Ok(())
    })
    .await
}
