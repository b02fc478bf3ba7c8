//! Serialized per-machine channel
//!
//! One `DeviceChannel` owns exactly one transport. Every exchange (write a
//! line, settle, drain the replies) runs under the channel's `io_lock`, so
//! only one logical command is on the wire at a time. Transport calls block,
//! so they run on tokio's blocking pool with the lock guard moved along.

use super::{communicator_for, Communicator, ConnectionParams, NoOpCommunicator};
use cellkit_core::{ConnectionError, ControllerError, Result};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Builds the transport for a connection descriptor
pub type CommunicatorFactory =
    Arc<dyn Fn(&ConnectionParams) -> Box<dyn Communicator> + Send + Sync>;

type Transport = OwnedMutexGuard<Box<dyn Communicator>>;

/// Run a blocking transport call off the async workers, handing the guard back
async fn blocking<T, F>(mut comm: Transport, op: F) -> Result<(Transport, T)>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn Communicator) -> Result<T> + Send + 'static,
{
    let (comm, out) = tokio::task::spawn_blocking(move || {
        let out = op(&mut **comm);
        (comm, out)
    })
    .await
    .map_err(|e| ConnectionError::Io {
        reason: format!("transport task failed: {}", e),
    })?;
    Ok((comm, out?))
}

pub struct DeviceChannel {
    machine: String,
    io_lock: Arc<Mutex<Box<dyn Communicator>>>,
    connected: AtomicBool,
    params: RwLock<Option<ConnectionParams>>,
    factory: CommunicatorFactory,
}

impl std::fmt::Debug for DeviceChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceChannel")
            .field("machine", &self.machine)
            .field("connected", &self.is_connected())
            .field("params", &*self.params.read())
            .finish()
    }
}

impl DeviceChannel {
    /// Channel that opens the transport named by each descriptor
    pub fn new(machine: impl Into<String>) -> Self {
        Self::with_factory(machine, Arc::new(communicator_for))
    }

    /// Channel with a custom transport factory
    pub fn with_factory(machine: impl Into<String>, factory: CommunicatorFactory) -> Self {
        Self {
            machine: machine.into(),
            io_lock: Arc::new(Mutex::new(Box::new(NoOpCommunicator::new()))),
            connected: AtomicBool::new(false),
            params: RwLock::new(None),
            factory,
        }
    }

    pub fn machine(&self) -> &str {
        &self.machine
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Descriptor of the current (or last attempted) connection
    pub fn params(&self) -> Option<ConnectionParams> {
        self.params.read().clone()
    }

    /// Open a transport, closing any existing one first
    pub async fn connect(&self, params: &ConnectionParams) -> Result<()> {
        let mut comm = self.io_lock.lock().await;

        if comm.is_connected() {
            tracing::info!("{}: closing previous connection", self.machine);
            if let Err(e) = comm.disconnect() {
                tracing::warn!("{}: error closing previous connection: {}", self.machine, e);
            }
        }
        self.connected.store(false, Ordering::SeqCst);
        *self.params.write() = Some(params.clone());

        let fresh = (self.factory)(params);
        let opening = params.clone();
        let fresh = tokio::task::spawn_blocking(move || -> Result<Box<dyn Communicator>> {
            let mut fresh = fresh;
            fresh.connect(&opening)?;
            Ok(fresh)
        })
        .await
        .map_err(|e| ConnectionError::Io {
            reason: format!("transport task failed: {}", e),
        })??;
        *comm = fresh;
        self.connected.store(true, Ordering::SeqCst);

        tracing::info!("{}: connected via {}", self.machine, params.endpoint());
        Ok(())
    }

    /// Close the transport; closing a closed channel is a no-op
    pub async fn disconnect(&self) -> Result<()> {
        let mut comm = self.io_lock.lock().await;
        self.connected.store(false, Ordering::SeqCst);
        comm.disconnect()?;
        tracing::info!("{}: disconnected", self.machine);
        Ok(())
    }

    /// Write one line, wait `settle`, and return the reply lines buffered so far
    ///
    /// Best effort: replies arriving after the settle window are discarded by
    /// the next exchange.
    pub async fn send(&self, line: &str, settle: Duration) -> Result<Vec<String>> {
        let comm = self.io_lock.clone().lock_owned().await;
        self.ensure_connected(&**comm)?;

        let mut framed = Vec::with_capacity(line.len() + 1);
        framed.extend_from_slice(line.as_bytes());
        framed.push(b'\n');
        tracing::debug!("{} >> {}", self.machine, line);
        let (comm, _) = blocking(comm, move |comm| {
            comm.clear_input()?;
            comm.send(&framed)
        })
        .await?;

        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        let (_comm, raw) = blocking(comm, |comm| comm.receive()).await?;
        let lines = split_lines(&raw);
        for reply in &lines {
            tracing::debug!("{} << {}", self.machine, reply);
        }
        Ok(lines)
    }

    /// Write a single unframed control byte (soft reset, feed hold, cycle start)
    pub async fn send_realtime(&self, byte: u8) -> Result<()> {
        let comm = self.io_lock.clone().lock_owned().await;
        self.ensure_connected(&**comm)?;
        tracing::debug!("{} >> realtime 0x{:02x}", self.machine, byte);
        blocking(comm, move |comm| comm.send(&[byte])).await?;
        Ok(())
    }

    fn ensure_connected(&self, comm: &dyn Communicator) -> Result<()> {
        if !self.is_connected() || !comm.is_connected() {
            return Err(ControllerError::NotConnected {
                machine: self.machine.clone(),
            }
            .into());
        }
        Ok(())
    }
}

/// Split a raw reply into trimmed, non-empty lines
fn split_lines(raw: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(raw)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
