//! Device session
//!
//! [`Session`] owns the transport for as long as the device is open and runs
//! one command at a time against it. A transport failure closes the session;
//! every later call then fails with [`DeviceError::NotConnected`].

use crate::error::{DeviceError, Result};
use crate::export::export_to_gpx;
use crate::parser::decode_block;
use crate::protocol::commands;
use crate::protocol::frame::RetryPolicy;
use crate::transport::{SerialTransport, Transport, DEFAULT_BAUD, DEFAULT_READ_TIMEOUT};
use crate::types::{
    group_sessions, ClearStatus, Configuration, Progress, Track, TrackHeader, TrackSession,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connection settings.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD,
            read_timeout: DEFAULT_READ_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// A track component that could not be turned into points.
#[derive(Debug)]
pub struct ComponentFailure {
    pub index: u32,
    pub error: DeviceError,
}

/// Result of downloading one session.
#[derive(Debug)]
pub struct TrackReport {
    pub indices: Vec<u32>,
    /// GPX file written, `None` when no component yielded points.
    pub path: Option<PathBuf>,
    pub points: usize,
    pub failures: Vec<ComponentFailure>,
}

#[derive(Debug)]
pub struct DownloadReport {
    pub tracks: Vec<TrackReport>,
    /// Configuration re-queried after the last component, which switches
    /// the device's idle indicator back on.
    pub refresh: Result<Configuration>,
}

impl DownloadReport {
    pub fn files_written(&self) -> usize {
        self.tracks.iter().filter(|t| t.path.is_some()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.tracks.iter().map(|t| t.failures.len()).sum()
    }
}

/// Result of a memory erase.
#[derive(Debug)]
pub struct ClearReport {
    pub status: ClearStatus,
    /// Configuration re-queried after the erase.
    pub refresh: Result<Configuration>,
}

/// Open the serial port at `path` with default settings.
pub fn connect(path: &str) -> Result<Session<SerialTransport>> {
    connect_with(path, SessionOptions::default())
}

/// Open the serial port at `path`.
pub fn connect_with(path: &str, options: SessionOptions) -> Result<Session<SerialTransport>> {
    let transport = SerialTransport::open(path, options.baud_rate, options.read_timeout)
        .map_err(|source| DeviceError::Open {
            path: path.to_string(),
            source,
        })?;
    info!(port = path, baud = options.baud_rate, "connected");
    Ok(Session::with_transport(transport, options))
}

pub struct Session<T: Transport = SerialTransport> {
    transport: Option<T>,
    options: SessionOptions,
}

impl<T: Transport> Session<T> {
    pub fn with_transport(transport: T, options: SessionOptions) -> Self {
        Self {
            transport: Some(transport),
            options,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Close the session, handing back the transport if it was still open.
    pub fn close(&mut self) -> Option<T> {
        if let Some(transport) = &self.transport {
            debug!(channel = %transport.name(), "session closed");
        }
        self.transport.take()
    }

    /// Run one command; a transport failure closes the session.
    fn run<R>(&mut self, command: impl FnOnce(&mut T, &RetryPolicy) -> Result<R>) -> Result<R> {
        let retry = self.options.retry;
        let transport = self.transport.as_mut().ok_or(DeviceError::NotConnected)?;
        let result = command(transport, &retry);
        if let Err(DeviceError::Transport(e)) = &result {
            warn!(error = %e, "transport failed, closing session");
            self.transport = None;
        }
        result
    }

    /// Raw identification payload.
    pub fn identify(&mut self) -> Result<Vec<u8>> {
        self.run(commands::identify)
    }

    pub fn configuration(&mut self) -> Result<Configuration> {
        self.run(commands::get_configuration)
    }

    /// Write `config` and return the configuration the device reports back.
    pub fn set_configuration(&mut self, config: &Configuration) -> Result<Configuration> {
        self.run(|t, retry| commands::set_configuration(t, retry, config))?;
        self.configuration()
    }

    /// Every header slot, in device order.
    pub fn list_headers(&mut self) -> Result<Vec<TrackHeader>> {
        self.run(commands::list_headers)
    }

    /// Header listing grouped into recorded sessions.
    pub fn sessions(&mut self) -> Result<Vec<TrackSession>> {
        Ok(group_sessions(&self.list_headers()?))
    }

    /// Erase the device memory, then refresh its state.
    ///
    /// The erase status and the outcome of the re-query are reported
    /// separately: a failed re-query does not hide a completed erase.
    pub fn clear_memory(&mut self) -> Result<ClearReport> {
        let status = self.run(commands::clear_memory)?;
        let refresh = self.refresh_indicator();
        Ok(ClearReport { status, refresh })
    }

    /// The device switches its idle indicator back on after a
    /// configuration query.
    fn refresh_indicator(&mut self) -> Result<Configuration> {
        let result = self.configuration();
        match &result {
            Ok(config) => debug!(memory_usage = config.memory_usage_percent, "device state refreshed"),
            Err(e) => warn!(error = %e, "could not refresh device state"),
        }
        result
    }

    /// Download the given tracks (each a list of component indices) and write
    /// one GPX file per track into `folder`.
    ///
    /// `progress` is called after every frame exchange, two per component.
    /// A component that fails to decode is recorded in the report and
    /// skipped; device and transport failures abort the whole download.
    /// The closing configuration re-query is carried in
    /// [`DownloadReport::refresh`] so files already written stay reported.
    pub fn download<F>(&mut self, tracks: &[Vec<u32>], folder: &Path, mut progress: F) -> Result<DownloadReport>
    where
        F: FnMut(Progress),
    {
        let total = 2 * tracks.iter().map(Vec::len).sum::<usize>();
        let mut completed = 0;
        let mut reports = Vec::with_capacity(tracks.len());

        for indices in tracks {
            let mut track = Track::default();
            let mut failures = Vec::new();

            for &index in indices {
                let Ok(wire_index) = u16::try_from(index) else {
                    warn!(index, "component index does not fit the read command");
                    failures.push(ComponentFailure {
                        index,
                        error: DeviceError::Protocol(format!("component index {index} exceeds 16 bits")),
                    });
                    completed += 2;
                    progress(Progress { completed, total });
                    continue;
                };

                let block = self.run(|t, retry| {
                    commands::read_track_component(t, retry, wire_index, || {
                        completed += 1;
                        progress(Progress { completed, total });
                    })
                })?;

                match decode_block(&block) {
                    Ok(points) => track.points.extend(points),
                    Err(e) => {
                        warn!(index, error = %e, "skipping undecodable track component");
                        failures.push(ComponentFailure {
                            index,
                            error: e.into(),
                        });
                    }
                }
            }

            let path = if track.is_empty() {
                None
            } else {
                if let Some(duration) = track.duration() {
                    debug!(points = track.len(), seconds = duration.num_seconds(), "track assembled");
                }
                Some(export_to_gpx(folder, &track)?)
            };

            reports.push(TrackReport {
                indices: indices.clone(),
                path,
                points: track.len(),
                failures,
            });
        }

        Ok(DownloadReport {
            tracks: reports,
            refresh: self.refresh_indicator(),
        })
    }
}
