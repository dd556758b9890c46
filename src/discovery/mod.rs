//! mDNS service advertisement for network discovery.
//!
//! This is best-effort - failure is logged but never prevents the listener
//! from starting. The record is withdrawn when the listener stops.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use mdns_sd::{ServiceDaemon, ServiceInfo};

use crate::config::schema::DiscoveryConfig;

/// Domain used when the configuration leaves it unset.
pub const DEFAULT_DOMAIN: &str = "local";

/// Publishes a DNS-SD record for a bound port.
///
/// The service is automatically unregistered when dropped.
pub struct Advertiser {
    daemon: ServiceDaemon,
    service_fullname: String,
    /// Tracks whether shutdown has been called to prevent double unregister.
    shutdown_called: AtomicBool,
}

impl Advertiser {
    /// Register `config` for `port` with the local mDNS responder.
    ///
    /// # Errors
    /// Returns an error if the mDNS daemon cannot be created or the service
    /// cannot be registered (e.g., mDNS not available on the system).
    pub fn publish(config: &DiscoveryConfig, port: u16) -> Result<Self, mdns_sd::Error> {
        let daemon = ServiceDaemon::new()?;

        let hostname = machine_hostname();
        let instance_name = config.name.clone().unwrap_or_else(|| hostname.clone());
        let ty_domain = qualified_service_type(&config.service_type, config.domain.as_deref());
        let txt: HashMap<String, String> = config
            .txt
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let service = ServiceInfo::new(
            &ty_domain,
            &instance_name,
            &format!("{}.local.", dns_label(&hostname)),
            "",
            port,
            txt,
        )?
        .enable_addr_auto();

        let fullname = service.get_fullname().to_string();
        daemon.register(service)?;

        tracing::info!(
            instance = %instance_name,
            service_type = %ty_domain,
            port,
            "Advertising discovery record"
        );

        Ok(Self {
            daemon,
            service_fullname: fullname,
            shutdown_called: AtomicBool::new(false),
        })
    }

    /// Full DNS-SD name of the published instance.
    pub fn fullname(&self) -> &str {
        &self.service_fullname
    }

    /// Unregisters the service and stops the responder.
    ///
    /// Safe to call multiple times - subsequent calls are no-ops.
    pub fn shutdown(&self) {
        if self.shutdown_called.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.daemon.unregister(&self.service_fullname) {
            tracing::warn!(error = %e, "Failed to unregister discovery record");
        }
        if let Err(e) = self.daemon.shutdown() {
            tracing::debug!(error = %e, "mDNS daemon shutdown failed");
        }
    }
}

impl Drop for Advertiser {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// `_svc._tcp` + `local` → `_svc._tcp.local.`
pub fn qualified_service_type(service_type: &str, domain: Option<&str>) -> String {
    let service_type = service_type.trim().trim_end_matches('.');
    let domain = domain
        .map(|d| d.trim().trim_matches('.'))
        .filter(|d| !d.is_empty())
        .unwrap_or(DEFAULT_DOMAIN);

    if service_type.ends_with(&format!(".{}", domain)) {
        format!("{}.", service_type)
    } else {
        format!("{}.{}.", service_type, domain)
    }
}

fn machine_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "play-trigger".to_string())
}

/// Sanitize a hostname for DNS (lowercase, no spaces).
fn dns_label(hostname: &str) -> String {
    let label: String = hostname
        .to_lowercase()
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    if label.is_empty() {
        "play-trigger".to_string()
    } else {
        label
    }
}
