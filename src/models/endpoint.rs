use serde::{Deserialize, Serialize};

/// Latency sentinel recorded when a probe fails
pub const TEST_RESULT_FAILED: i64 = -1;

/// Security mode of an endpoint's outbound tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    #[default]
    None,
    Tls,
    Reality,
}

impl SecurityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityMode::None => "none",
            SecurityMode::Tls => "tls",
            SecurityMode::Reality => "reality",
        }
    }

    /// Parse the `security` query parameter. `ssl` is a legacy alias for TLS;
    /// anything unrecognized is treated as no security.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "tls" | "ssl" => SecurityMode::Tls,
            "reality" => SecurityMode::Reality,
            _ => SecurityMode::None,
        }
    }
}

impl std::fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transport carried by the outbound tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Tcp,
    Raw,
    Ws,
    Grpc,
    Http,
    Udp,
    Quic,
    Other,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Tcp => "tcp",
            TransportKind::Raw => "raw",
            TransportKind::Ws => "ws",
            TransportKind::Grpc => "grpc",
            TransportKind::Http => "http",
            TransportKind::Udp => "udp",
            TransportKind::Quic => "quic",
            TransportKind::Other => "other",
        }
    }

    /// Parse the `type` query parameter. `h2`, `http2` and `xhttp` all map to
    /// the HTTP transport; an empty value means plain TCP.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "" | "tcp" => TransportKind::Tcp,
            "raw" => TransportKind::Raw,
            "ws" => TransportKind::Ws,
            "grpc" => TransportKind::Grpc,
            "http" | "h2" | "http2" | "xhttp" => TransportKind::Http,
            "udp" => TransportKind::Udp,
            "quic" => TransportKind::Quic,
            _ => TransportKind::Other,
        }
    }

    /// Network the engine should use for this transport
    pub fn network(&self) -> &'static str {
        match self {
            TransportKind::Udp | TransportKind::Quic => "udp",
            _ => "tcp",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One proxy endpoint candidate.
///
/// The raw connection string is the sole identity: two descriptors refer to
/// the same endpoint iff their `url` fields are equal. Stability is always
/// clamped to [0, 100] by the scorer; descriptors are never deleted from the
/// full known set, only excluded from the published subset.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EndpointDescriptor {
    /// Raw connection string (identity key)
    pub url: String,
    /// User id from the URL userinfo
    pub uuid: String,
    /// Server host (IP literal)
    pub server: String,
    /// Server port
    pub port: u16,
    /// Security mode of the outbound
    pub security: SecurityMode,
    /// TLS server name
    pub sni: String,
    /// uTLS fingerprint (reality)
    pub fingerprint: String,
    /// Reality public key
    pub public_key: String,
    /// Reality short id
    pub short_id: String,
    /// Reality spider path
    pub spx: String,
    /// Transport type
    pub transport: TransportKind,
    /// Flow control parameter
    pub flow: String,
    /// Transport path (ws/http)
    pub path: String,
    /// Transport Host header (ws/http)
    pub host_header: String,
    /// gRPC service name
    pub service_name: String,
    /// Header obfuscation type
    pub header_type: String,
    /// Last probe latency in milliseconds, -1 on failure, 0 when never probed
    pub test_result: i64,
    /// Stability score in [0, 100]
    pub stability: f64,
}

impl EndpointDescriptor {
    /// Whether the last probe of this endpoint succeeded
    pub fn last_probe_succeeded(&self) -> bool {
        self.test_result > 0
    }
}
