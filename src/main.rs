mod cli;
mod console;
mod parent;
mod sink;

use anyhow::Result;
use clap::Parser;
use rdp_bridge_core::handoff::ChannelOpener;
use rdp_bridge_core::settings::{self, BridgeSettings, StoreBackend};
use rdp_bridge_core::store::{FileStore, KeyValueStore, MemoryStore, SystemClock};
use rdp_bridge_core::{FrameSink, Opener, SessionStore, SessionWindow, WindowOptions};
use std::sync::Arc;

use crate::cli::Cli;
use crate::sink::FileSink;

fn load_settings(cli: &Cli) -> BridgeSettings {
    let base = match &cli.settings {
        Some(path) => settings::load_settings_from(path)
            .apply_env(|key| std::env::var(key).ok()),
        None => settings::load_settings(),
    };
    cli.apply(base)
}

fn build_store(settings: &BridgeSettings, cli: &Cli) -> Result<SessionStore> {
    let kv: Arc<dyn KeyValueStore> = match settings.store {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::File => {
            let store = FileStore::for_window(cli.persisted_window_id()?);
            log::info!("Session credentials kept in {}", store.path().display());
            Arc::new(store)
        }
    };
    Ok(SessionStore::new(kv, Arc::new(SystemClock)))
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let settings = load_settings(&cli);
    let credentials = cli
        .credentials
        .as_deref()
        .map(parent::load_credentials)
        .transpose()?;
    let label = credentials.as_ref().map(|c| c.display_label());
    let store = build_store(&settings, &cli)?;

    let frame_sink = Arc::new(match &cli.frames_out {
        Some(path) => FileSink::to_file(path)?,
        None => FileSink::counting(),
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .thread_name("rdp-bridge")
        .build()?;

    log::info!("Gateway {}, origin {}", settings.gateway_url, settings.origin);

    let (to_parent, from_window) = async_channel::unbounded();
    let (to_window, inbox) = async_channel::unbounded();
    let opener: Arc<dyn Opener> = Arc::new(ChannelOpener::new(to_parent));

    let (window, handle) = SessionWindow::new(
        WindowOptions::from(&settings),
        store,
        Some(opener),
        inbox,
        frame_sink.clone() as Arc<dyn FrameSink>,
        runtime.handle().clone(),
    );

    let final_status = runtime.block_on(async {
        tokio::spawn(parent::serve(
            settings.origin.clone(),
            credentials,
            from_window,
            to_window,
        ));
        let printer = tokio::spawn(console::print_events(handle.events, label));
        tokio::spawn(console::read_commands(handle.controls.clone()));

        let controls = handle.controls;
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupted, closing session");
                controls.close();
            }
        });

        let status = window.run().await;
        let _ = printer.await;
        status
    });

    println!("{}", console::format_status(&final_status, None));
    log::info!(
        "Received {} frames ({} bytes)",
        frame_sink.frames(),
        frame_sink.bytes()
    );

    // stdin reader may still be parked on a blocking read
    runtime.shutdown_background();
    Ok(())
}
