//! Fire-and-forget telemetry toward a remote relay.
//!
//! The control tick hands records to a bounded queue and never waits on the
//! network. A background task drains the queue and writes newline-delimited
//! JSON over TCP, reconnecting lazily when the next record arrives after a
//! failure. A record that cannot be delivered is dropped, not retried.

use crate::config::TelemetryConfig;
use crate::error::FlightError;
use crate::input::ActivityFlags;
use crate::{info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Wire form of one telemetry sample. Field names are part of the relay contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    pub simulation_time: f64,
    pub altitude: f64,
    pub filtered_roll: f64,
    pub filtered_pitch: f64,
    pub filtered_yaw: f64,
    pub stability_index: f64,
    pub ml_roll_error: f64,
    pub ml_pitch_error: f64,
    pub ml_yaw_error: f64,
    pub gyro_x: f64,
    pub gyro_y: f64,
    pub gyro_z: f64,
    pub target_altitude: f64,
    pub motor_velocities: [f64; 4],
    pub total_thrust: f64,
    pub user_inputs: ActivityFlags,
}

impl TelemetryRecord {
    pub fn to_line(&self) -> Result<String, FlightError> {
        let mut line =
            serde_json::to_string(self).map_err(|e| FlightError::TelemetrySink(e.to_string()))?;
        line.push('\n');
        Ok(line)
    }
}

/// Producer side of the telemetry queue, owned by the control loop.
///
/// When the queue is full the newest record is dropped and counted.
pub struct TelemetryLink {
    sender: mpsc::Sender<TelemetryRecord>,
    dropped: Arc<AtomicU64>,
}

impl TelemetryLink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TelemetryRecord>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let link = Self {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (link, receiver)
    }

    /// Starts a [`TelemetryWriter`] for `config.address` on `handle`.
    pub fn spawn(handle: &Handle, config: &TelemetryConfig) -> Self {
        let (link, receiver) = Self::channel(config.queue_capacity);
        let writer = TelemetryWriter::new(config);
        handle.spawn(writer.run(receiver));
        link
    }

    /// Queues a record without blocking. Returns whether it was accepted.
    pub fn publish(&self, record: TelemetryRecord) -> bool {
        match self.sender.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    warn!("Telemetry queue full, {dropped} records dropped so far");
                }
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer side: owns the TCP connection to the relay.
pub struct TelemetryWriter {
    address: String,
    connect_timeout: Duration,
    write_timeout: Duration,
    stream: Option<TcpStream>,
    reported_down: bool,
}

impl TelemetryWriter {
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            address: config.address.clone(),
            connect_timeout: config.connect_timeout(),
            write_timeout: config.write_timeout(),
            stream: None,
            reported_down: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub async fn run(mut self, mut receiver: mpsc::Receiver<TelemetryRecord>) {
        while let Some(record) = receiver.recv().await {
            if let Err(e) = self.send(&record).await {
                if !self.reported_down {
                    warn!("{e}; dropping records until the relay is back");
                    self.reported_down = true;
                }
            }
        }
        info!("Telemetry writer stopped");
    }

    /// Writes one record, connecting first if needed. On failure the
    /// connection is dropped and the next call reconnects.
    pub async fn send(&mut self, record: &TelemetryRecord) -> Result<(), FlightError> {
        let line = record.to_line()?;
        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => self.connect().await?,
        };

        match tokio::time::timeout(self.write_timeout, stream.write_all(line.as_bytes())).await {
            Ok(Ok(())) => {
                self.stream = Some(stream);
                Ok(())
            }
            Ok(Err(e)) => Err(FlightError::TelemetrySink(format!("write failed: {e}"))),
            Err(_) => Err(FlightError::TelemetrySink("write timed out".into())),
        }
    }

    async fn connect(&mut self) -> Result<TcpStream, FlightError> {
        let attempt = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.address));
        match attempt.await {
            Ok(Ok(stream)) => {
                info!("Connected to telemetry relay at {}", self.address);
                self.reported_down = false;
                Ok(stream)
            }
            Ok(Err(e)) => Err(FlightError::TelemetrySink(format!(
                "cannot reach {}: {e}",
                self.address
            ))),
            Err(_) => Err(FlightError::TelemetrySink(format!(
                "connecting to {} timed out",
                self.address
            ))),
        }
    }
}
