//! Push pipeline: periodically snapshot a [`Registry`] and send it to a
//! collector.

mod otlp;
mod remote_write;

use crate::{
    config::{EXPORT_INTERVAL, EXPORT_TIMEOUT, OTLP_ENDPOINT, REMOTE_WRITE_ENDPOINT},
    error::{Error, Result},
    proto::otlp::collector::metrics::v1::metrics_service_client::MetricsServiceClient,
    registry::{Registry, Snapshot},
};
use crossbeam::channel::{Receiver, Sender, select};
use prost::Message;
use std::{
    io,
    net::{TcpStream, ToSocketAddrs},
    sync::Arc,
    thread::JoinHandle,
    time::Duration,
};
use tokio::runtime::Runtime;
use tonic::transport::{Channel, Endpoint};
use ureq::{Agent, http::Uri};

const USER_AGENT: &str = concat!("metrics-stress/", env!("CARGO_PKG_VERSION"));

/// Wire format of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    /// OTLP over gRPC (`MetricsService/Export`), as accepted by an
    /// OpenTelemetry collector's `otlp` receiver.
    #[default]
    Otlp,
    /// Prometheus remote write 1.0, snappy-compressed over HTTP. Only reachable
    /// through the library API.
    RemoteWrite,
}

impl Protocol {
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Protocol::Otlp => OTLP_ENDPOINT,
            Protocol::RemoteWrite => REMOTE_WRITE_ENDPOINT,
        }
    }
}

/// Builder for the [`Exporter`].
#[derive(Debug, Clone)]
pub struct ExporterBuilder {
    endpoint: Option<String>,
    protocol: Protocol,
    interval: Duration,
    timeout: Duration,
}

impl ExporterBuilder {
    pub fn new() -> Self {
        Self {
            endpoint: None,
            protocol: Protocol::default(),
            interval: EXPORT_INTERVAL,
            timeout: EXPORT_TIMEOUT,
        }
    }

    /// Collector URL. Must be plain `http://`.
    ///
    /// Defaults to the protocol's conventional local endpoint.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Change the interval between pushes.
    ///
    /// Default is 1s.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Bound on connecting, each push and the final flush.
    ///
    /// Default is 1s.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validate the endpoint and connect to the collector.
    ///
    /// Fails when the collector does not accept a connection within the
    /// timeout.
    pub fn build(self, registry: Arc<Registry>) -> Result<Exporter> {
        let endpoint = self
            .endpoint
            .unwrap_or_else(|| self.protocol.default_endpoint().to_owned());

        let (host, port) = parse_endpoint(&endpoint)?;
        let transport = match self.protocol {
            Protocol::Otlp => Transport::grpc(&endpoint, self.timeout)?,
            Protocol::RemoteWrite => {
                check_reachable(&endpoint, &host, port, self.timeout)?;
                Transport::http(self.timeout)
            }
        };

        tracing::info!(%endpoint, protocol = ?self.protocol, interval = ?self.interval, "exporter ready");

        Ok(Exporter {
            registry,
            transport,
            endpoint,
            interval: self.interval,
        })
    }
}

impl Default for ExporterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_endpoint(endpoint: &str) -> Result<(String, u16)> {
    let invalid = |reason: &str| Error::InvalidEndpoint {
        endpoint: endpoint.to_owned(),
        reason: reason.to_owned(),
    };

    let uri: Uri = endpoint.parse().map_err(|_| invalid("not a valid URL"))?;
    if uri.scheme_str() != Some("http") {
        return Err(invalid("only insecure http:// transport is supported"));
    }
    let host = uri.host().ok_or_else(|| invalid("missing host"))?;
    let host = host.trim_start_matches('[').trim_end_matches(']').to_owned();

    Ok((host, uri.port_u16().unwrap_or(80)))
}

fn check_reachable(endpoint: &str, host: &str, port: u16, timeout: Duration) -> Result<()> {
    let unreachable = |source: io::Error| Error::CollectorUnreachable {
        endpoint: endpoint.to_owned(),
        source: source.into(),
    };

    let mut last = io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses");
    for addr in (host, port).to_socket_addrs().map_err(unreachable)? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => return Ok(()),
            Err(err) => last = err,
        }
    }
    Err(unreachable(last))
}

enum Transport {
    /// A tonic channel driven by a runtime private to the exporter, so pushes
    /// can block the worker thread.
    Grpc {
        runtime: Runtime,
        client: MetricsServiceClient<Channel>,
    },
    Http { agent: Agent },
}

impl Transport {
    fn grpc(endpoint: &str, timeout: Duration) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::Runtime)?;

        let channel = Endpoint::from_shared(endpoint.to_owned())
            .map_err(|err| Error::InvalidEndpoint {
                endpoint: endpoint.to_owned(),
                reason: err.to_string(),
            })?
            .connect_timeout(timeout)
            .timeout(timeout);

        let channel = runtime
            .block_on(channel.connect())
            .map_err(|err| Error::CollectorUnreachable {
                endpoint: endpoint.to_owned(),
                source: err.into(),
            })?;

        Ok(Transport::Grpc {
            runtime,
            client: MetricsServiceClient::new(channel),
        })
    }

    fn http(timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Transport::Http {
            agent: config.into(),
        }
    }
}

/// Sends registry snapshots to a collector.
pub struct Exporter {
    registry: Arc<Registry>,
    transport: Transport,
    endpoint: String,
    interval: Duration,
}

impl Exporter {
    pub fn builder() -> ExporterBuilder {
        ExporterBuilder::new()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Snapshot, encode and send once.
    pub fn push(&self) -> Result<()> {
        let snapshot = self.registry.snapshot();

        let bytes = match &self.transport {
            Transport::Grpc { runtime, client } => self.export(runtime, client, &snapshot)?,
            Transport::Http { agent } => self.write(agent, &snapshot)?,
        };

        tracing::debug!(
            endpoint = %self.endpoint,
            families = snapshot.families.len(),
            bytes,
            "pushed snapshot"
        );
        Ok(())
    }

    fn export(
        &self,
        runtime: &Runtime,
        client: &MetricsServiceClient<Channel>,
        snapshot: &Snapshot,
    ) -> Result<usize> {
        let request = otlp::request(snapshot);
        let bytes = request.encoded_len();

        let mut client = client.clone();
        let response = runtime
            .block_on(client.export(request))
            .map_err(|status| Error::Export {
                endpoint: self.endpoint.clone(),
                source: Box::new(status),
            })?;

        if let Some(partial) = response.into_inner().partial_success {
            if partial.rejected_data_points > 0 {
                tracing::warn!(
                    endpoint = %self.endpoint,
                    rejected = partial.rejected_data_points,
                    message = %partial.error_message,
                    "collector rejected data points"
                );
            }
        }
        Ok(bytes)
    }

    fn write(&self, agent: &Agent, snapshot: &Snapshot) -> Result<usize> {
        let body = remote_write::encode(snapshot)?;

        let mut response = agent
            .post(self.endpoint.as_str())
            .header("User-Agent", USER_AGENT)
            .header("Content-Encoding", "snappy")
            .header("X-Prometheus-Remote-Write-Version", "1.0.0")
            .content_type("application/x-protobuf")
            .send(&body)
            .map_err(|source| Error::Push {
                endpoint: self.endpoint.clone(),
                source: Box::new(source),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Rejected {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
                body: response.body_mut().read_to_string().unwrap_or_default(),
            });
        }
        Ok(body.len())
    }

    fn push_logged(&self) {
        if let Err(err) = self.push() {
            tracing::error!(%err, "export failed");
        }
    }

    /// Push on a background thread every interval.
    pub fn spawn(self) -> Result<ExporterHandle> {
        let (tx_shutdown, rx_shutdown) = crossbeam::channel::bounded(1);

        let worker = std::thread::Builder::new()
            .name("exporter".to_owned())
            .spawn(move || export_worker(self, rx_shutdown))
            .map_err(|source| Error::Spawn {
                name: "exporter",
                source,
            })?;

        Ok(ExporterHandle {
            tx_shutdown,
            worker,
        })
    }
}

fn export_worker(exporter: Exporter, rx_shutdown: Receiver<()>) {
    let rx_tick = crossbeam::channel::tick(exporter.interval);

    loop {
        select! {
            recv(rx_tick) -> _ => exporter.push_logged(),
            recv(rx_shutdown) -> _ => {
                // last batch, bounded by the request timeout
                exporter.push_logged();
                break;
            },
        }
    }

    tracing::info!(endpoint = %exporter.endpoint, "exporter stopped");
}

pub struct ExporterHandle {
    tx_shutdown: Sender<()>,
    worker: JoinHandle<()>,
}

impl ExporterHandle {
    /// Flush once more and wait for the worker to exit.
    pub fn shutdown(self) {
        self.tx_shutdown.send(()).ok();
        if self.worker.join().is_err() {
            tracing::error!("exporter thread panicked");
        }
    }
}
