use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::PoolConfig;
use crate::dispatcher::Dispatcher;
use crate::flood::FloodDetector;
use crate::provisioner::{EndpointProvisioner, NoopProvisioner};
use crate::recovery::RecoverySweeper;
use crate::transport::Transport;

/// A running dispatch pool: the dispatcher plus its two maintenance loops.
///
/// The loops only hold `Arc`s into shared state and are stopped by
/// [`Pool::shutdown`].
pub struct Pool {
    dispatcher: Arc<Dispatcher>,
    shutdown_tx: watch::Sender<bool>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl Pool {
    /// Build the dispatcher and spawn the flood and recovery sweepers.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: PoolConfig, transport: Arc<dyn Transport>) -> Self {
        Self::start_with_provisioner(config, transport, Arc::new(NoopProvisioner))
    }

    pub fn start_with_provisioner(
        config: PoolConfig,
        transport: Arc<dyn Transport>,
        provisioner: Arc<dyn EndpointProvisioner>,
    ) -> Self {
        let flood_every = config.flood_sweep_interval;
        let recovery_every = config.recovery_interval;
        let dispatcher = Arc::new(Dispatcher::with_provisioner(config, transport, provisioner));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker_handles = vec![
            tokio::spawn(flood_sweep_loop(
                dispatcher.flood_detector().clone(),
                flood_every,
                shutdown_rx.clone(),
            )),
            tokio::spawn(recovery_loop(
                dispatcher.recovery().clone(),
                recovery_every,
                shutdown_rx,
            )),
        ];

        info!(endpoints = dispatcher.registry().len(), "dispatch pool started");

        Self {
            dispatcher,
            shutdown_tx,
            worker_handles,
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn is_running(&self) -> bool {
        !*self.shutdown_tx.borrow()
    }

    /// Stop the maintenance loops and wait for them to exit.
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.worker_handles.drain(..) {
            let _ = handle.await;
        }
        info!("dispatch pool stopped");
    }
}

async fn flood_sweep_loop(flood: Arc<FloodDetector>, every: Duration, shutdown: watch::Receiver<bool>) {
    run_every(every, shutdown, || {
        let flood = flood.clone();
        async move {
            let cleared = flood.sweep().await;
            if cleared > 0 {
                debug!(cleared, "flood sweep");
            }
        }
    })
    .await;
}

async fn recovery_loop(recovery: Arc<RecoverySweeper>, every: Duration, shutdown: watch::Receiver<bool>) {
    run_every(every, shutdown, || {
        let recovery = recovery.clone();
        async move {
            let recovered = recovery.run_once().await;
            if recovered > 0 {
                debug!(recovered, "recovery sweep");
            }
        }
    })
    .await;
}

/// Run `job` on a fixed interval until shutdown is signalled.
async fn run_every<F, Fut>(every: Duration, mut shutdown: watch::Receiver<bool>, mut job: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = interval(every.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; sweeps start one period in.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => job().await,
            // Only ever flipped to `true`; a dropped sender also stops us.
            _ = shutdown.changed() => break,
        }
    }
}
