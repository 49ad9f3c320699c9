//! Live UDP telemetry sources and their receive pumps.
//!
//! Each source owns one bound socket and one spawned pump task. The pump
//! decodes every inbound datagram against the source's format spec, merges
//! the values with the configured labels, and broadcasts the result. Decode
//! failures are per-datagram: logged, dropped, never fatal to the socket.

use crate::common::{SourceId, UiMapping};
use crate::events::{DecodedTelemetry, SystemEvent};
use crate::wire::{FieldValue, FormatSpec};
use chrono::Utc;
use slotmap::SlotMap;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Largest datagram any catalog format is expected to describe.
const MAX_DATAGRAM: usize = 2048;

/// Shared registry of live sources, keyed by stable [`SourceId`]s.
pub(crate) type SourceRegistry = Arc<RwLock<SlotMap<SourceId, SourceEntry>>>;

/// Registry entry for one live source.
pub(crate) struct SourceEntry {
    pub host: IpAddr,
    pub port: u16,
    pub stream_id: String,
    pub ui_map: Vec<UiMapping>,
    /// Handle of the receive pump; aborting it closes the socket.
    pub pump: JoinHandle<()>,
}

impl SourceEntry {
    pub fn summary(&self) -> SourceSummary {
        SourceSummary {
            host: self.host,
            port: self.port,
            stream_id: self.stream_id.clone(),
            ui_map: self.ui_map.clone(),
        }
    }
}

/// Read-only snapshot of a live source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSummary {
    pub host: IpAddr,
    pub port: u16,
    pub stream_id: String,
    pub ui_map: Vec<UiMapping>,
}

/// Pairs decoded values with their labels, preserving decode order.
///
/// Returns `None` when the counts disagree; the caller drops the datagram.
pub(crate) fn merge_readings(
    labels: &[String],
    values: Vec<FieldValue>,
) -> Option<BTreeMap<String, FieldValue>> {
    if labels.len() != values.len() {
        return None;
    }
    Some(labels.iter().cloned().zip(values).collect())
}

/// Receive pump for one source socket.
///
/// Runs until the socket reports an error (in which case the source prunes
/// itself from the registry) or the pump's task is aborted by a remove.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_pump(
    socket: UdpSocket,
    spec: FormatSpec,
    labels: Vec<String>,
    ui_map: Vec<UiMapping>,
    telemetry_tx: broadcast::Sender<Arc<DecodedTelemetry>>,
    system_tx: broadcast::Sender<SystemEvent>,
    registry: SourceRegistry,
    id: SourceId,
) {
    let host = socket
        .local_addr()
        .map(|a| a.ip())
        .unwrap_or(IpAddr::from([0, 0, 0, 0]));
    let port = socket.local_addr().map(|a| a.port()).unwrap_or(0);

    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, _peer)) => {
                let values = match spec.decode(&buf[..len]) {
                    Ok(values) => values,
                    Err(e) => {
                        warn!(%host, port, error = %e, "dropping undecodable datagram");
                        continue;
                    }
                };
                let Some(readings) = merge_readings(&labels, values) else {
                    warn!(
                        %host,
                        port,
                        labels = labels.len(),
                        "dropping datagram: label/value count mismatch"
                    );
                    continue;
                };
                let frame = DecodedTelemetry {
                    readings,
                    ui_map: ui_map.clone(),
                    received: Utc::now(),
                };
                // No receivers is not an error; the next subscriber simply
                // starts with the next datagram.
                telemetry_tx.send(Arc::new(frame)).ok();
            }
            Err(e) => {
                warn!(%host, port, error = %e, "udp receive error, closing source");
                let removed = registry.write().await.remove(id).is_some();
                if removed {
                    debug!(%host, port, "pruned dead source from registry");
                    system_tx.send(SystemEvent::SourceRemoved { host, port }).ok();
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn merge_pairs_labels_with_values_in_order() {
        let merged = merge_readings(
            &labels(&["alt", "vel"]),
            vec![FieldValue::UInt(1000), FieldValue::UInt(100)],
        )
        .expect("counts match");
        assert_eq!(merged.get("alt"), Some(&FieldValue::UInt(1000)));
        assert_eq!(merged.get("vel"), Some(&FieldValue::UInt(100)));
    }

    #[test]
    fn merge_rejects_count_mismatch() {
        assert!(merge_readings(&labels(&["alt"]), vec![]).is_none());
        assert!(merge_readings(
            &labels(&["alt"]),
            vec![FieldValue::UInt(1), FieldValue::UInt(2)]
        )
        .is_none());
    }
}
