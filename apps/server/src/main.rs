use amora_kernel::config::{AppConfig, load_config};
use amora_server::{Server, init_logger};
use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1);
    let cfg: AppConfig =
        load_config(config_path.as_deref()).context("Critical: Configuration is malformed")?;

    let _log = init_logger(&cfg.logging)?;

    Server::builder().config(cfg).build().await?.run().await
}
