//! Hosting of the peer endpoints for the CLI.
//!
//! Wraps [`tether_core::http`] with the configured scheme. For "https" the
//! endpoint presents a self-signed certificate kept in the data directory,
//! so the certificate survives restarts.

use crate::config::Config;
use anyhow::Context;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use tether_core::Node;
use tether_core::http::{HttpServer, TlsIdentity, routes};
use tracing::info;

/// Serve `node` on all interfaces at the configured HTTP port.
///
/// # Errors
///
/// Returns an error if the certificate cannot be loaded or created, or if
/// the port cannot be bound.
pub fn spawn(node: Node, config: &Config) -> anyhow::Result<HttpServer> {
    let addr = SocketAddr::new(IpAddr::from([0, 0, 0, 0]), config.device.http_port);
    let tls = match config.network.scheme.as_str() {
        "https" => Some(load_or_create_identity(
            &config.tls_cert_path(),
            &config.tls_key_path(),
        )?),
        _ => None,
    };
    let server = HttpServer::bind(routes(node), addr, tls.as_ref())
        .with_context(|| format!("binding peer endpoint on {addr}"))?;
    info!(
        "Peer endpoint on {}://{}",
        config.network.scheme,
        server.local_addr()
    );
    Ok(server)
}

/// Read the PEM pair at `cert`/`key`, generating it on first use.
fn load_or_create_identity(cert: &Path, key: &Path) -> anyhow::Result<TlsIdentity> {
    if cert.exists() && key.exists() {
        return Ok(TlsIdentity {
            cert_pem: std::fs::read_to_string(cert)
                .with_context(|| format!("reading {}", cert.display()))?,
            key_pem: std::fs::read_to_string(key)
                .with_context(|| format!("reading {}", key.display()))?,
        });
    }

    let identity = TlsIdentity::self_signed(vec!["localhost".to_string()])?;
    if let Some(parent) = cert.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(cert, &identity.cert_pem)
        .with_context(|| format!("writing {}", cert.display()))?;
    std::fs::write(key, &identity.key_pem).with_context(|| format!("writing {}", key.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(key, std::fs::Permissions::from_mode(0o600))?;
    }
    info!("Created endpoint certificate {}", cert.display());
    Ok(identity)
}
