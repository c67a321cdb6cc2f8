//! Descriptor parser
//!
//! Turns one line of raw source input into an [`EndpointDescriptor`].
//! HTML-entity-escaped separators (`&amp;`) are normalized before parsing.
//! Lines with the wrong scheme, a host that is not an IP literal, or a
//! missing port are skipped by the batch parser, never fatal.

use std::net::IpAddr;

use tracing::trace;
use url::Url;

use crate::error::{RelayError, Result};
use crate::models::{EndpointDescriptor, SecurityMode, TransportKind};

const EXPECTED_SCHEME: &str = "vless";

/// Parse one raw connection string into a descriptor
pub fn parse_endpoint_line(line: &str) -> Result<EndpointDescriptor> {
    let raw = line.replace("&amp;", "&");

    let url = Url::parse(&raw)?;
    if url.scheme() != EXPECTED_SCHEME {
        return Err(RelayError::UnsupportedScheme(url.scheme().to_string()));
    }

    let host = url
        .host_str()
        .ok_or(RelayError::MissingField("host"))?
        .trim_matches(|c| c == '[' || c == ']')
        .to_string();
    if host.parse::<IpAddr>().is_err() {
        return Err(RelayError::InvalidServerAddress(host));
    }

    let port = url.port().ok_or(RelayError::MissingField("port"))?;

    let q = |name: &str| -> String {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default()
    };

    Ok(EndpointDescriptor {
        uuid: url.username().to_string(),
        server: host,
        port,
        security: SecurityMode::from_str(&q("security")),
        sni: q("sni"),
        fingerprint: q("fp"),
        public_key: q("pbk"),
        short_id: q("sid"),
        spx: q("spx"),
        transport: TransportKind::from_str(&q("type")),
        flow: q("flow"),
        path: q("path"),
        host_header: q("host"),
        service_name: q("serviceName"),
        header_type: q("headerType"),
        test_result: 0,
        stability: 0.0,
        url: raw,
    })
}

/// Parse a whole raw source document.
///
/// Blank lines are ignored; malformed lines are dropped from the batch.
pub fn parse_source_text(text: &str) -> Vec<EndpointDescriptor> {
    let mut descriptors = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_endpoint_line(line) {
            Ok(descriptor) => descriptors.push(descriptor),
            Err(e) => trace!("Skipping source line: {}", e),
        }
    }
    descriptors
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "vless://11111111-2222-3333-4444-555555555555@1.2.3.4:443?security=reality&sni=cdn.example.com&pbk=PUBKEY&sid=0123ab&fp=chrome&type=grpc&serviceName=svc&flow=xtls-rprx-vision#name";

    #[test]
    fn test_parse_full_descriptor() {
        let d = parse_endpoint_line(SAMPLE).unwrap();
        assert_eq!(d.uuid, "11111111-2222-3333-4444-555555555555");
        assert_eq!(d.server, "1.2.3.4");
        assert_eq!(d.port, 443);
        assert_eq!(d.security, SecurityMode::Reality);
        assert_eq!(d.sni, "cdn.example.com");
        assert_eq!(d.public_key, "PUBKEY");
        assert_eq!(d.short_id, "0123ab");
        assert_eq!(d.fingerprint, "chrome");
        assert_eq!(d.transport, TransportKind::Grpc);
        assert_eq!(d.service_name, "svc");
        assert_eq!(d.flow, "xtls-rprx-vision");
        assert_eq!(d.test_result, 0);
        assert_eq!(d.stability, 0.0);
        assert_eq!(d.url, SAMPLE);
    }

    #[test]
    fn test_html_entity_separators_are_normalized() {
        let line = "vless://u@1.2.3.4:443?security=tls&amp;sni=cdn.example.com";
        let d = parse_endpoint_line(line).unwrap();
        assert_eq!(d.security, SecurityMode::Tls);
        assert_eq!(d.sni, "cdn.example.com");
        // The stored identity is the normalized string.
        assert!(!d.url.contains("&amp;"));
    }

    #[test]
    fn test_wrong_scheme_is_rejected() {
        let err = parse_endpoint_line("trojan://u@1.2.3.4:443").unwrap_err();
        assert!(matches!(err, RelayError::UnsupportedScheme(_)));
    }

    #[test]
    fn test_hostname_is_rejected() {
        let err = parse_endpoint_line("vless://u@proxy.example.com:443").unwrap_err();
        assert!(matches!(err, RelayError::InvalidServerAddress(_)));
    }

    #[test]
    fn test_missing_port_is_rejected() {
        let err = parse_endpoint_line("vless://u@1.2.3.4?security=tls").unwrap_err();
        assert!(matches!(err, RelayError::MissingField("port")));
    }

    #[test]
    fn test_garbage_line_is_rejected() {
        assert!(parse_endpoint_line("not a url at all").is_err());
    }

    #[test]
    fn test_batch_parse_skips_bad_lines() {
        let text = format!(
            "\n{}\n\nnot a url\ntrojan://u@1.2.3.4:443\nvless://u@1.2.3.5:8443?security=tls\n",
            SAMPLE
        );
        let descriptors = parse_source_text(&text);
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].server, "1.2.3.4");
        assert_eq!(descriptors[1].server, "1.2.3.5");
    }
}
