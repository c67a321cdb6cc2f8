//! Outbound config builder
//!
//! Pure mapping from an endpoint descriptor to the declarative JSON document
//! consumed by the external proxy engine: a loopback SOCKS inbound on the
//! assigned local port, one outbound matching the descriptor's transport and
//! security parameters, a direct fallback, and a single routing rule to the
//! built outbound. Same descriptor and port always yield the same document.

use serde_json::{json, Value};

use crate::models::{EndpointDescriptor, SecurityMode, TransportKind};

const OUTBOUND_TAG: &str = "proxy";

/// Build the outbound block for one descriptor
pub fn build_outbound(d: &EndpointDescriptor) -> Value {
    let mut outbound = json!({
        "type": "vless",
        "tag": OUTBOUND_TAG,
        "server": d.server,
        "server_port": d.port,
        "uuid": d.uuid,
        "network": d.transport.network(),
    });

    if !d.flow.is_empty() {
        outbound["flow"] = json!(d.flow);
    }

    match d.security {
        SecurityMode::Reality => {
            outbound["tls"] = json!({
                "enabled": true,
                "server_name": d.sni,
                "utls": {
                    "enabled": true,
                },
                "reality": {
                    "enabled": true,
                    "public_key": d.public_key,
                    "short_id": d.short_id,
                },
            });
        }
        SecurityMode::Tls => {
            outbound["tls"] = json!({
                "enabled": true,
                "server_name": d.sni,
            });
        }
        SecurityMode::None => {}
    }

    if let Some(transport) = build_transport(d) {
        outbound["transport"] = transport;
    }

    outbound
}

/// Build the transport block, when the transport needs one
pub fn build_transport(d: &EndpointDescriptor) -> Option<Value> {
    match d.transport {
        TransportKind::Ws => {
            let mut ws = json!({"type": "ws"});
            if !d.path.is_empty() {
                ws["path"] = json!(d.path);
            }
            if let Some(host) = transport_host(d) {
                ws["headers"] = json!({"Host": host});
            }
            Some(ws)
        }
        TransportKind::Grpc => {
            let mut grpc = json!({"type": "grpc"});
            if !d.service_name.is_empty() {
                grpc["service_name"] = json!(d.service_name);
            }
            Some(grpc)
        }
        TransportKind::Http => {
            let mut http = json!({"type": "http"});
            if !d.path.is_empty() {
                http["path"] = json!(d.path);
            }
            if let Some(host) = transport_host(d) {
                http["headers"] = json!({"Host": host});
            }
            Some(http)
        }
        _ => None,
    }
}

/// Wrap one outbound in a full engine document bound to `local_port`
pub fn build_engine_config(d: &EndpointDescriptor, local_port: u16) -> Value {
    json!({
        "log": {"level": "error"},
        "inbounds": [
            {
                "type": "socks",
                "tag": "socks-in",
                "listen": "127.0.0.1",
                "listen_port": local_port,
            }
        ],
        "outbounds": [
            build_outbound(d),
            {"type": "direct", "tag": "direct"},
        ],
        "route": {
            "rules": [
                {"outbound": OUTBOUND_TAG}
            ],
        },
    })
}

// The Host header falls back to the SNI when no explicit host is given.
fn transport_host(d: &EndpointDescriptor) -> Option<&str> {
    if !d.host_header.is_empty() {
        Some(&d.host_header)
    } else if !d.sni.is_empty() {
        Some(&d.sni)
    } else {
        None
    }
}
