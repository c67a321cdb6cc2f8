//! Whitelist filter
//!
//! Administrative allow-lists for endpoint server addresses and TLS server
//! names, built once at startup. Address matching truncates both sides to
//! the first three dot-separated octets and does an exact string lookup.
//! This is deliberately NOT CIDR containment: arbitrary-length subnets are
//! not supported, and the truncation semantics are part of the published
//! contract with the whitelist files.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::{RelayError, Result};
use crate::models::EndpointDescriptor;

/// Filter deciding whether a descriptor is administratively permitted
#[derive(Debug)]
pub struct WhitelistFilter {
    allowed_prefixes: HashSet<String>,
    allowed_snis: HashSet<String>,
}

impl WhitelistFilter {
    pub fn new<P, S>(prefixes: P, snis: S) -> Self
    where
        P: IntoIterator<Item = String>,
        S: IntoIterator<Item = String>,
    {
        Self {
            allowed_prefixes: prefixes.into_iter().collect(),
            allowed_snis: snis.into_iter().collect(),
        }
    }

    /// Build the filter from the two whitelist files.
    ///
    /// Address entries are truncated to their 3-octet prefix on load; SNI
    /// entries are kept verbatim. A missing or unreadable file is fatal:
    /// the process must not start serving without a whitelist.
    pub fn from_files(address_path: &Path, sni_path: &Path) -> Result<Self> {
        let prefixes = read_lines(address_path)?
            .map(|line| subnet_prefix(&line).to_string())
            .collect::<HashSet<_>>();
        let snis = read_lines(sni_path)?.collect::<HashSet<_>>();

        info!(
            prefixes = prefixes.len(),
            snis = snis.len(),
            "Whitelists loaded"
        );

        Ok(Self {
            allowed_prefixes: prefixes,
            allowed_snis: snis,
        })
    }

    /// Decide whether `descriptor` may enter the candidate set.
    ///
    /// The server address prefix must be whitelisted. A non-empty SNI must
    /// additionally be whitelisted; descriptors without an SNI carry no TLS
    /// server name to vet and pass that check.
    pub fn is_available(&self, descriptor: &EndpointDescriptor) -> Result<()> {
        if descriptor.server.is_empty() {
            return Err(RelayError::EmptyServerAddress);
        }

        let prefix = subnet_prefix(&descriptor.server);
        if !self.allowed_prefixes.contains(prefix) {
            return Err(RelayError::AddressNotWhitelisted(descriptor.server.clone()));
        }

        if !descriptor.sni.is_empty() && !self.allowed_snis.contains(&descriptor.sni) {
            return Err(RelayError::SniNotWhitelisted(descriptor.sni.clone()));
        }

        Ok(())
    }
}

/// Truncate an address to its first three dot-separated octets.
///
/// `"1.2.3.4"` becomes `"1.2.3"`; input with fewer than three dots is
/// returned unchanged.
pub fn subnet_prefix(address: &str) -> &str {
    let mut dots = 0;
    for (i, b) in address.bytes().enumerate() {
        if b == b'.' {
            dots += 1;
            if dots == 3 {
                return &address[..i];
            }
        }
    }
    address
}

fn read_lines(path: &Path) -> Result<impl Iterator<Item = String>> {
    let text = fs::read_to_string(path)
        .map_err(|e| RelayError::WhitelistLoad(format!("{}: {}", path.display(), e)))?;
    Ok(text
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .into_iter())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(server: &str, sni: &str) -> EndpointDescriptor {
        EndpointDescriptor {
            server: server.to_string(),
            sni: sni.to_string(),
            ..Default::default()
        }
    }

    fn filter() -> WhitelistFilter {
        WhitelistFilter::new(
            vec!["1.2.3".to_string(), "10.0.0".to_string()],
            vec!["cdn.example.com".to_string()],
        )
    }

    #[test]
    fn test_subnet_prefix_truncation() {
        assert_eq!(subnet_prefix("1.2.3.4"), "1.2.3");
        assert_eq!(subnet_prefix("1.2.3.250"), "1.2.3");
        assert_eq!(subnet_prefix("1.2.4.4"), "1.2.4");
        assert_eq!(subnet_prefix("1.2.3"), "1.2.3");
        assert_eq!(subnet_prefix(""), "");
    }

    #[test]
    fn test_addresses_in_same_prefix_match() {
        let f = filter();
        assert!(f.is_available(&descriptor("1.2.3.4", "")).is_ok());
        assert!(f.is_available(&descriptor("1.2.3.250", "")).is_ok());
    }

    #[test]
    fn test_neighbouring_prefix_is_rejected() {
        let f = filter();
        let err = f.is_available(&descriptor("1.2.4.4", "")).unwrap_err();
        assert!(matches!(err, RelayError::AddressNotWhitelisted(_)));
    }

    #[test]
    fn test_empty_server_is_an_explicit_error() {
        let f = filter();
        let err = f.is_available(&descriptor("", "")).unwrap_err();
        assert!(matches!(err, RelayError::EmptyServerAddress));
    }

    #[test]
    fn test_sni_membership() {
        let f = filter();
        assert!(f
            .is_available(&descriptor("1.2.3.4", "cdn.example.com"))
            .is_ok());

        let err = f
            .is_available(&descriptor("1.2.3.4", "evil.example.com"))
            .unwrap_err();
        assert!(matches!(err, RelayError::SniNotWhitelisted(_)));
    }

    #[test]
    fn test_from_files_truncates_entries() {
        use std::io::Write;

        let mut addr_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(addr_file, "1.2.3.0").unwrap();
        writeln!(addr_file).unwrap();
        writeln!(addr_file, "10.0.0.1").unwrap();

        let mut sni_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(sni_file, "cdn.example.com").unwrap();

        let f = WhitelistFilter::from_files(addr_file.path(), sni_file.path()).unwrap();
        assert!(f.is_available(&descriptor("1.2.3.77", "")).is_ok());
        assert!(f.is_available(&descriptor("10.0.0.200", "")).is_ok());
        assert!(f.is_available(&descriptor("10.0.1.1", "")).is_err());
    }

    #[test]
    fn test_from_files_missing_file_is_fatal() {
        let err = WhitelistFilter::from_files(
            Path::new("/nonexistent/cidrwhitelist.txt"),
            Path::new("/nonexistent/sniwhitelist.txt"),
        )
        .unwrap_err();
        assert!(matches!(err, RelayError::WhitelistLoad(_)));
    }
}
