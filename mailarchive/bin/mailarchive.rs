#[cfg(not(unix))]
compile_error!("Only unix is currently supported");

use mailarchive::{Archive, ArchiveConfig};
use mailarchive_common::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let config = ArchiveConfig::load(&ArchiveConfig::locate()?)?;

    Archive::open(config).await?.run().await
}
