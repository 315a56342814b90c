//! Bridge from platform location services to the recognition engine.
//!
//! The bridge walks `Disconnected -> Connecting -> Connected`. On every
//! connect it pushes the last known fix, then subscribes to periodic
//! updates and forwards each fix unchanged. A suspended connection or a
//! failed connect sends it back to `Connecting` after a reconnect delay;
//! this is the bridge's only retry policy and is never surfaced to the user.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::SyncSleeper;
use super::ports::{LocationRequestSettings, LocationSource, LocationUpdate, RecognitionEngine};

/// Connection state of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Not running.
    Disconnected,
    /// Connecting or waiting to reconnect.
    Connecting,
    /// Subscribed to updates.
    Connected,
}

/// Bridge configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationBridgeConfig {
    /// Periodic update request.
    pub request: LocationRequestSettings,
    /// Wait before reconnecting after a suspension or failed connect.
    pub reconnect_delay: Duration,
}

impl Default for LocationBridgeConfig {
    fn default() -> Self {
        Self {
            request: LocationRequestSettings::default(),
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Clone)]
struct BridgeContext {
    source: Arc<dyn LocationSource>,
    engine: Arc<dyn RecognitionEngine>,
    sleeper: Arc<dyn SyncSleeper>,
    config: LocationBridgeConfig,
    state: Arc<watch::Sender<BridgeState>>,
}

struct Running {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Location bridge owning the connection loop.
pub struct LocationBridge {
    context: BridgeContext,
    running: Mutex<Option<Running>>,
}

impl LocationBridge {
    /// Build a stopped bridge.
    pub fn new(
        source: Arc<dyn LocationSource>,
        engine: Arc<dyn RecognitionEngine>,
        sleeper: Arc<dyn SyncSleeper>,
        config: LocationBridgeConfig,
    ) -> Self {
        let (state, _) = watch::channel(BridgeState::Disconnected);
        Self {
            context: BridgeContext {
                source,
                engine,
                sleeper,
                config,
                state: Arc::new(state),
            },
            running: Mutex::new(None),
        }
    }

    /// Current state.
    pub fn state(&self) -> BridgeState {
        *self.context.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<BridgeState> {
        self.context.state.subscribe()
    }

    /// Start the connection loop. Does nothing when already running.
    /// Must be called inside a Tokio runtime.
    pub fn start(&self) {
        let mut running = match self.running.lock() {
            Ok(running) => running,
            Err(poisoned) => poisoned.into_inner(),
        };
        if running.as_ref().is_some_and(|run| !run.task.is_finished()) {
            debug!("location bridge already running");
            return;
        }
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run(self.context.clone(), stop_rx));
        *running = Some(Running { stop, task });
    }

    /// Cancel updates, stop the loop, and wait for it to finish.
    pub async fn stop(&self) {
        let running = match self.running.lock() {
            Ok(mut running) => running.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(Running { stop, task }) = running {
            let _ = stop.send(true);
            if let Err(err) = task.await {
                warn!(error = %err, "location bridge task ended abnormally");
            }
        }
        self.context.state.send_replace(BridgeState::Disconnected);
    }

    /// Whether the GPS provider is enabled; errors read as disabled.
    pub fn is_provider_enabled(&self) -> bool {
        match self.context.source.is_provider_enabled() {
            Ok(enabled) => enabled,
            Err(err) => {
                debug!(error = %err, "provider check failed");
                false
            }
        }
    }
}

enum Disconnect {
    Stopped,
    Lost,
}

async fn run(context: BridgeContext, mut stop: watch::Receiver<bool>) {
    loop {
        context.state.send_replace(BridgeState::Connecting);
        if matches!(
            connect_and_forward(&context, &mut stop).await,
            Disconnect::Stopped
        ) {
            break;
        }
        context.state.send_replace(BridgeState::Connecting);
        tokio::select! {
            _ = stop.changed() => break,
            () = context.sleeper.sleep(context.config.reconnect_delay) => {}
        }
    }
    context.state.send_replace(BridgeState::Disconnected);
}

async fn connect_and_forward(
    context: &BridgeContext,
    stop: &mut watch::Receiver<bool>,
) -> Disconnect {
    let connected = tokio::select! {
        _ = stop.changed() => return Disconnect::Stopped,
        connected = context.source.connect() => connected,
    };
    if let Err(err) = connected {
        warn!(error = %err, "location service connect failed");
        return Disconnect::Lost;
    }
    info!("connected to location service");
    context.state.send_replace(BridgeState::Connected);

    match context.source.last_known_location().await {
        Ok(Some(fix)) => context.engine.push_location(fix),
        Ok(None) => debug!("no last known location"),
        Err(err) => warn!(error = %err, "last known location unavailable"),
    }

    let mut updates = match context.source.request_updates(context.config.request).await {
        Ok(updates) => updates,
        Err(err) => {
            warn!(error = %err, "location update request failed");
            return Disconnect::Lost;
        }
    };

    loop {
        tokio::select! {
            _ = stop.changed() => {
                context.source.remove_updates().await;
                return Disconnect::Stopped;
            }
            update = updates.recv() => match update {
                Some(LocationUpdate::Fix(fix)) => context.engine.push_location(fix),
                Some(LocationUpdate::ConnectionSuspended) | None => {
                    warn!("disconnected from location service");
                    return Disconnect::Lost;
                }
            },
        }
    }
}
