//! Wires the actors together and runs them until a shutdown signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::{process, thread};

use anyhow::{Context, bail};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, error, info, warn};

use crate::actor;
use crate::actor::config_watcher::ConfigWatcher;
use crate::actor::reactor::{Reactor, ReactorHandle};
use crate::actor::server::Server;
use crate::actor::space_monitor::{self, SpaceMonitor};
use crate::common::config::{Paths, Settings};
use crate::ipc::{EndpointError, EndpointFile};
use crate::model::config_store::ConfigError;
use crate::model::{ConfigStore, LayoutCache, SpaceResolver};
use crate::sys::clock::SystemClock;
use crate::sys::defaults::DefaultsToggle;
use crate::sys::skylight::SkylightSource;
use crate::sys::spaces_plist::FileLayoutSource;
use crate::sys::window_server::WorkspaceObserver;

/// Everything that has to stay alive while the daemon runs.
struct Services {
    reactor: ReactorHandle,
    triggers: space_monitor::Sender,
    _watcher: Option<ConfigWatcher>,
    server: Server,
}

pub fn run(paths: Paths, settings: Settings) -> anyhow::Result<()> {
    let endpoint = EndpointFile::new(paths.endpoint_file());
    match endpoint.live_pid() {
        Ok(pid) => bail!("daemon already running with pid {pid}"),
        Err(EndpointError::Io(err)) => {
            return Err(err).context("failed to read endpoint file");
        }
        Err(_) => {}
    }

    let services = start(&paths, &settings)?;
    endpoint.publish(process::id() as i32).context("failed to publish endpoint")?;
    info!(pid = process::id(), "Daemon started");

    let stopping = Arc::new(AtomicBool::new(false));
    let ipc = {
        let stopping = stopping.clone();
        let queries = (*services.reactor).clone();
        let server = services.server;
        thread::Builder::new().name("ipc".to_string()).spawn(move || {
            let result = actor::run_local(async move {
                tokio::select! {
                    result = server.serve(queries) => {
                        if let Err(err) = result {
                            error!(%err, "IPC server stopped");
                        }
                    }
                    result = wait_for_shutdown() => {
                        if let Err(err) = result {
                            error!(%err, "Unable to listen for signals");
                        }
                    }
                }
            });
            if let Err(err) = result {
                error!(%err, "IPC runtime failed");
            }
            stopping.store(true, Ordering::SeqCst);
        })?
    };

    run_main_loop(services.triggers, &stopping);

    if ipc.join().is_err() {
        warn!("IPC thread panicked");
    }
    endpoint.remove();
    if let Err(err) = std::fs::remove_file(paths.socket()) {
        debug!(%err, "Socket already gone");
    }
    drop(services.reactor);
    info!("Daemon stopped");
    Ok(())
}

fn start(paths: &Paths, settings: &Settings) -> anyhow::Result<Services> {
    let config_path = paths.spaces_config();
    let store = Arc::new(ConfigStore::new());
    match store.load(&config_path) {
        Ok(count) => debug!(count, "Restored enabled spaces"),
        Err(ConfigError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %config_path.display(), "No space configuration yet");
        }
        Err(err) => warn!(%err, "Starting with empty space configuration"),
    }

    let primary = SkylightSource::load();
    if !primary.is_supported() {
        warn!("Active space query unavailable; identifying spaces by their windows");
    }
    let layouts = LayoutCache::new(
        Arc::new(FileLayoutSource::new(paths.layout_document.clone())),
        Arc::new(SystemClock),
        settings.layout_ttl(),
    );
    let resolver = SpaceResolver::new(Arc::new(primary), observer(), layouts).into_shared();
    let toggle = Arc::new(DefaultsToggle::new(&settings.toggle));

    let reactor = Reactor::spawn(resolver.clone(), store.clone(), toggle, Some(config_path.clone()))
        .context("failed to start reactor")?;
    let triggers = SpaceMonitor::new(
        resolver,
        reactor.sender(),
        settings.poll_interval(),
        settings.app_settle_delay(),
    )
    .spawn()
    .context("failed to start space monitor")?;

    let watcher = match ConfigWatcher::spawn(store, config_path) {
        Ok(watcher) => Some(watcher),
        Err(err) => {
            warn!(%err, "Configuration edits will not be picked up until restart");
            None
        }
    };
    let server = Server::bind(&paths.socket()).context("failed to bind IPC socket")?;

    Ok(Services { reactor, triggers, _watcher: watcher, server })
}

fn observer() -> Arc<dyn WorkspaceObserver> {
    #[cfg(target_os = "macos")]
    return Arc::new(crate::sys::window_server::SystemObserver);
    #[cfg(not(target_os = "macos"))]
    return Arc::new(crate::sys::window_server::NullObserver);
}

async fn wait_for_shutdown() -> std::io::Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = interrupt.recv() => info!("Interrupted"),
        _ = terminate.recv() => info!("Terminated"),
    }
    Ok(())
}

/// Workspace notifications are delivered on the main run loop, so the main
/// thread pumps it until shutdown.
#[cfg(target_os = "macos")]
fn run_main_loop(triggers: space_monitor::Sender, stopping: &AtomicBool) {
    use objc2_core_foundation::{CFRunLoop, kCFRunLoopDefaultMode};

    use crate::actor::notification_center::NotificationCenter;

    let _center = NotificationCenter::new(triggers);
    while !stopping.load(Ordering::SeqCst) {
        // SAFETY: The default mode constant is provided by CoreFoundation.
        unsafe { CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, 0.25, false) };
    }
}

/// Without workspace notifications the monitor relies on polling alone.
#[cfg(not(target_os = "macos"))]
fn run_main_loop(triggers: space_monitor::Sender, stopping: &AtomicBool) {
    while !stopping.load(Ordering::SeqCst) {
        thread::sleep(std::time::Duration::from_millis(250));
    }
    drop(triggers);
}
