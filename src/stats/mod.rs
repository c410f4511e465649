pub mod stats_collector;

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use stats_collector::StatsCollector;

use crate::data_channel::RTCDataChannel;
use crate::ice_transport::ice_gatherer::RTCIceGatherer;

/// A stats object's type, as standardized by the stats registry.
#[derive(Debug, Serialize, Deserialize)]
pub enum RTCStatsType {
    #[serde(rename = "data-channel")]
    DataChannel,
    #[serde(rename = "peer-connection")]
    PeerConnection,
    #[serde(rename = "transport")]
    Transport,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum StatsReportType {
    DataChannel(DataChannelStats),
    PeerConnection(PeerConnectionStats),
    ICEGatherer(ICEGathererStats),
}

/// StatsReport collects Stats objects keyed by their statistics id.
#[derive(Debug, Default, Serialize)]
pub struct StatsReport {
    pub reports: HashMap<String, StatsReportType>,
}

impl From<StatsCollector> for StatsReport {
    fn from(collector: StatsCollector) -> Self {
        StatsReport {
            reports: collector.into_reports(),
        }
    }
}

/// stats_timestamp_now is the number of milliseconds since the unix epoch,
/// matching the DOMHighResTimeStamp the stats API reports.
pub(crate) fn stats_timestamp_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0f64, |d| d.as_secs_f64() * 1000.0)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerConnectionStats {
    pub timestamp: f64,
    #[serde(rename = "type")]
    pub stats_type: RTCStatsType,
    pub id: String,

    pub data_channels_opened: u32,
    pub data_channels_closed: u32,
    pub data_channels_requested: u32,
    pub data_channels_accepted: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataChannelStats {
    pub timestamp: f64,
    #[serde(rename = "type")]
    pub stats_type: RTCStatsType,
    pub id: String,

    pub label: String,
    pub protocol: String,
    pub data_channel_identifier: u16,
    pub state: String,
    pub messages_sent: u32,
    pub bytes_sent: usize,
}

impl From<&RTCDataChannel> for DataChannelStats {
    fn from(data_channel: &RTCDataChannel) -> Self {
        DataChannelStats {
            timestamp: stats_timestamp_now(),
            stats_type: RTCStatsType::DataChannel,
            id: data_channel.stats_id.clone(),
            label: data_channel.label().to_owned(),
            protocol: data_channel.protocol().to_owned(),
            data_channel_identifier: data_channel.id(),
            state: data_channel.ready_state().to_string(),
            messages_sent: data_channel.messages_sent(),
            bytes_sent: data_channel.bytes_sent(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ICEGathererStats {
    pub timestamp: f64,
    #[serde(rename = "type")]
    pub stats_type: RTCStatsType,
    pub id: String,

    pub state: String,
}

impl RTCIceGatherer {
    pub(crate) fn collect_stats(&self, collector: &StatsCollector) {
        let stats = ICEGathererStats {
            timestamp: stats_timestamp_now(),
            stats_type: RTCStatsType::Transport,
            id: "iceGatherer".to_owned(),
            state: self.state().to_string(),
        };

        collector.insert(stats.id.clone(), StatsReportType::ICEGatherer(stats));
    }
}
