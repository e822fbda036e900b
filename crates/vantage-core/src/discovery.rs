// ── mDNS discovery ──
//
// Controllers advertise `_aci._tcp` on the local network. Their hostname
// ends in the serial number ("IC-INFUSION-2024166.local."), which lets a
// discovered controller be matched to an existing entry before login.

use std::net::IpAddr;
use std::pin::pin;
use std::time::Duration;

use futures_core::Stream;
use futures_util::StreamExt;
use indexmap::IndexMap;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::CoreError;

pub const SERVICE_TYPE: &str = "_aci._tcp.local.";

/// One controller seen on the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredController {
    /// Address to connect to.
    pub host: String,
    /// Advertised hostname, without the trailing dot.
    pub hostname: String,
    pub port: u16,
    pub serial_number: Option<String>,
}

impl DiscoveredController {
    pub fn new(host: impl Into<String>, hostname: &str, port: u16) -> Self {
        let hostname = hostname.trim_end_matches('.').to_owned();
        Self {
            host: host.into(),
            serial_number: serial_from_hostname(&hostname),
            hostname,
            port,
        }
    }

    fn from_service(info: &ServiceInfo) -> Self {
        let mut addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
        addresses.sort_by_key(|addr| (addr.is_ipv6(), *addr));
        let hostname = info.get_hostname();
        let host = addresses.first().map_or_else(
            || hostname.trim_end_matches('.').to_owned(),
            ToString::to_string,
        );
        Self::new(host, hostname, info.get_port())
    }
}

/// Serial number from the trailing digits of the hostname's first label.
pub fn serial_from_hostname(hostname: &str) -> Option<String> {
    let label = hostname.split('.').next()?;
    let digits = label.len() - label.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    (digits > 0).then(|| label[label.len() - digits..].to_owned())
}

fn discovery_error(err: &mdns_sd::Error) -> CoreError {
    CoreError::Discovery {
        message: err.to_string(),
    }
}

/// Browse for controllers until `cancel` fires. The same controller may be
/// yielded more than once as it re-announces.
pub fn browse(
    cancel: CancellationToken,
) -> Result<impl Stream<Item = DiscoveredController> + Send, CoreError> {
    let daemon = ServiceDaemon::new().map_err(|e| discovery_error(&e))?;
    let receiver = daemon.browse(SERVICE_TYPE).map_err(|e| discovery_error(&e))?;
    debug!(service = SERVICE_TYPE, "browsing for controllers");

    Ok(async_stream::stream! {
        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = receiver.recv_async() => match event {
                    Ok(event) => event,
                    Err(_) => break,
                },
            };
            match event {
                ServiceEvent::ServiceResolved(info) => {
                    let found = DiscoveredController::from_service(&info);
                    trace!(host = %found.host, hostname = %found.hostname, "controller resolved");
                    yield found;
                }
                other => trace!(?other, "mdns event"),
            }
        }
        if let Err(err) = daemon.shutdown() {
            debug!(error = %err, "mdns daemon shutdown failed");
        }
    })
}

/// Collect every controller that answers within `window`, one per host.
pub async fn discover(window: Duration) -> Result<Vec<DiscoveredController>, CoreError> {
    let cancel = CancellationToken::new();
    let mut stream = pin!(browse(cancel.clone())?);
    let mut found: IndexMap<String, DiscoveredController> = IndexMap::new();

    let deadline = tokio::time::sleep(window);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            () = &mut deadline => break,
            next = stream.next() => match next {
                Some(controller) => {
                    found.insert(controller.host.clone(), controller);
                }
                None => break,
            },
        }
    }

    // Let the stream observe cancellation and stop the daemon.
    cancel.cancel();
    let _ = stream.next().await;
    Ok(found.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_comes_from_trailing_digits() {
        assert_eq!(
            serial_from_hostname("IC-INFUSION-2024166.local."),
            Some("2024166".into())
        );
        assert_eq!(serial_from_hostname("ic2024166"), Some("2024166".into()));
        assert_eq!(serial_from_hostname("vantage-controller.local."), None);
        assert_eq!(serial_from_hostname("12-abc.local"), None);
        assert_eq!(serial_from_hostname(""), None);
    }

    #[test]
    fn discovered_controller_trims_hostname() {
        let found = DiscoveredController::new("192.168.1.40", "IC-INFUSION-2024166.local.", 2001);
        assert_eq!(found.hostname, "IC-INFUSION-2024166.local");
        assert_eq!(found.serial_number.as_deref(), Some("2024166"));
        assert_eq!(found.port, 2001);
    }
}
