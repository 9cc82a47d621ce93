#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

/// Runs the delivery pipeline on an in-process broker until SIGINT or SIGTERM
///
/// With `stdin_intake: true` in the config, requests are read from standard
/// input one per line (`address<TAB>body`).
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = courier::config::find_config_file()?;
    let courier = courier::config::load(&config_path)?;

    courier.run().await
}
