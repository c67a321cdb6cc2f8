//! Probe engine
//!
//! Verifies one endpoint by spawning the external proxy engine on an
//! exclusively-owned local port, waiting for its SOCKS inbound to accept,
//! checking raw TLS reachability of the origin server, and timing one HTTP
//! request through the tunnel. The subprocess is killed and reaped on every
//! exit path; the scratch config file is removed on drop.

use std::net::SocketAddr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout, Instant};
use tokio_rustls::TlsConnector;
use tokio_socks::tcp::Socks5Stream;
use tracing::{debug, instrument};
use url::Url;

use crate::config::ProbeSettings;
use crate::error::{RelayError, Result};
use crate::models::{EndpointDescriptor, TransportKind};
use crate::probe::outbound;

const DIAL_TIMEOUT: Duration = Duration::from_millis(400);
const DIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Capability interface for probing one endpoint on one local port.
///
/// The real implementation spawns the external engine; tests substitute a
/// deterministic fake.
#[async_trait]
pub trait ProbeEngine: Send + Sync {
    /// Probe `descriptor` through a tunnel bound to `local_port`, returning
    /// the request latency on success.
    async fn probe(&self, descriptor: &EndpointDescriptor, local_port: u16) -> Result<Duration>;
}

/// Probe engine backed by a spawned external proxy engine subprocess
#[derive(Debug)]
pub struct SubprocessProbeEngine {
    settings: ProbeSettings,
    probe_host: String,
    probe_port: u16,
    probe_path: String,
    tls_config: Arc<ClientConfig>,
}

impl SubprocessProbeEngine {
    pub fn new(settings: ProbeSettings) -> Result<Self> {
        let url = Url::parse(&settings.probe_url)
            .map_err(|e| RelayError::InvalidConfig(format!("PROBE_URL: {}", e)))?;
        let probe_host = url
            .host_str()
            .ok_or_else(|| RelayError::InvalidConfig("PROBE_URL must include a host".into()))?
            .to_string();
        let probe_port = url
            .port_or_known_default()
            .ok_or_else(|| RelayError::InvalidConfig("PROBE_URL must include a port".into()))?;
        let probe_path = match url.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };

        Ok(Self {
            settings,
            probe_host,
            probe_port,
            probe_path,
            tls_config: reachability_tls_config(),
        })
    }

    /// Steps after the spawn: wait for the inbound, TLS reachability, then
    /// the HTTP probe. Separated so the caller owns exactly one teardown
    /// point for the subprocess.
    async fn probe_through(&self, d: &EndpointDescriptor, local_port: u16) -> Result<Duration> {
        self.wait_port(local_port).await?;

        self.tls_reachability(d).await?;

        // A single request is unreliable for timing over gRPC; take the
        // slower of two.
        let attempts = if d.transport == TransportKind::Grpc { 2 } else { 1 };
        let mut latency = Duration::ZERO;
        for _ in 0..attempts {
            latency = latency.max(self.request_through_socks(local_port).await?);
        }
        Ok(latency)
    }

    /// Poll the engine's inbound with short-timeout dials until it accepts
    async fn wait_port(&self, port: u16) -> Result<()> {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let deadline = Instant::now() + self.settings.port_wait();
        while Instant::now() < deadline {
            match timeout(DIAL_TIMEOUT, TcpStream::connect(addr)).await {
                Ok(Ok(_)) => return Ok(()),
                _ => sleep(DIAL_BACKOFF).await,
            }
        }
        Err(RelayError::EngineNotReady {
            port,
            output: String::new(),
        })
    }

    /// Raw TLS handshake against the endpoint's own server.
    ///
    /// Certificate verification is disabled: this is a reachability and
    /// latency probe, not a trust check.
    async fn tls_reachability(&self, d: &EndpointDescriptor) -> Result<Duration> {
        let server_name = if d.sni.is_empty() {
            ServerName::try_from(d.server.clone())
        } else {
            ServerName::try_from(d.sni.clone())
        }
        .map_err(|e| RelayError::TlsProbe(format!("invalid server name: {}", e)))?;

        let connector = TlsConnector::from(self.tls_config.clone());
        let start = Instant::now();

        timeout(self.settings.tls_wait(), async {
            let stream = TcpStream::connect((d.server.as_str(), d.port))
                .await
                .map_err(|e| RelayError::TlsProbe(format!("dial: {}", e)))?;
            connector
                .connect(server_name, stream)
                .await
                .map_err(|e| RelayError::TlsProbe(format!("handshake: {}", e)))
        })
        .await
        .map_err(|_| RelayError::Timeout)??;

        let elapsed = start.elapsed();
        if elapsed.is_zero() {
            return Err(RelayError::TlsProbe("zero handshake duration".into()));
        }
        Ok(elapsed)
    }

    /// One timed HTTP request through the engine's SOCKS inbound
    async fn request_through_socks(&self, local_port: u16) -> Result<Duration> {
        let proxy = SocketAddr::from(([127, 0, 0, 1], local_port));
        let start = Instant::now();

        timeout(self.settings.request_wait(), async {
            let mut stream =
                Socks5Stream::connect(proxy, (self.probe_host.as_str(), self.probe_port))
                    .await
                    .map_err(|e| RelayError::ProbeRequest(format!("socks connect: {}", e)))?;

            let request = format!(
                "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: relaywatch/0.1\r\nConnection: close\r\n\r\n",
                self.probe_path, self.probe_host
            );
            stream
                .write_all(request.as_bytes())
                .await
                .map_err(|e| RelayError::ProbeRequest(format!("write: {}", e)))?;

            let mut response = vec![0u8; 1024];
            let n = stream
                .read(&mut response)
                .await
                .map_err(|e| RelayError::ProbeRequest(format!("read: {}", e)))?;
            if n == 0 || !response.starts_with(b"HTTP/") {
                return Err(RelayError::ProbeRequest("invalid HTTP response".into()));
            }
            Ok(())
        })
        .await
        .map_err(|_| RelayError::Timeout)??;

        Ok(start.elapsed())
    }
}

#[async_trait]
impl ProbeEngine for SubprocessProbeEngine {
    #[instrument(skip(self, descriptor), fields(server = %descriptor.server, port = local_port))]
    async fn probe(&self, descriptor: &EndpointDescriptor, local_port: u16) -> Result<Duration> {
        let doc = outbound::build_engine_config(descriptor, local_port);

        // Scratch file named after the target host for diagnosability;
        // removed on drop whichever way this function exits.
        let scratch = tempfile::Builder::new()
            .prefix(&format!("engine-config-{}-", descriptor.server))
            .suffix(".json")
            .tempfile()?;
        serde_json::to_writer_pretty(scratch.as_file(), &doc)
            .map_err(|e| RelayError::Internal(format!("write engine config: {}", e)))?;

        let child = Command::new(&self.settings.engine_binary)
            .arg("run")
            .arg("-c")
            .arg(scratch.path())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RelayError::EngineSpawn(e.to_string()))?;

        let result = self.probe_through(descriptor, local_port).await;

        // Single teardown point: kill and reap regardless of which step
        // exited, collecting the engine's output for diagnosis.
        let output = stop_engine(child).await;

        match result {
            Ok(latency) => Ok(latency),
            Err(RelayError::EngineNotReady { port, .. }) => {
                Err(RelayError::EngineNotReady { port, output })
            }
            Err(e) => {
                if !output.is_empty() {
                    debug!(engine_output = %output, "Engine output after failed probe");
                }
                Err(e)
            }
        }
    }
}

/// Kill the engine subprocess and collect whatever it wrote
async fn stop_engine(mut child: Child) -> String {
    let _ = child.start_kill();
    match child.wait_with_output().await {
        Ok(out) => {
            let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&out.stderr));
            text.trim().to_string()
        }
        Err(_) => String::new(),
    }
}

fn reachability_tls_config() -> Arc<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .expect("ring provider supports default protocol versions")
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerification(provider)))
        .with_no_client_auth();
    Arc::new(config)
}

/// Accepts any certificate. The reachability probe measures whether a TLS
/// listener answers at all; trust is out of scope.
#[derive(Debug)]
struct NoVerification(Arc<rustls::crypto::CryptoProvider>);

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
