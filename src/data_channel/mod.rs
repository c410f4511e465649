pub mod data_channel_init;
pub mod data_channel_message;
pub mod data_channel_parameters;
pub mod data_channel_state;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use data_channel_message::DataChannelMessage;
use data_channel_parameters::DataChannelParameters;
use data_channel_state::RTCDataChannelState;
use tokio::sync::Mutex;
use util::sync::Mutex as SyncMutex;

use crate::error::{Error, Result};
use crate::sctp_transport::RTCSctpTransport;
use crate::stats::stats_collector::StatsCollector;
use crate::stats::{DataChannelStats, StatsReportType};

pub type OnMessageHdlrFn = Box<
    dyn (FnMut(DataChannelMessage) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnOpenHdlrFn =
    Box<dyn (FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;

pub type OnCloseHdlrFn =
    Box<dyn (FnMut() -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;

/// DataChannel represents a WebRTC DataChannel
/// The DataChannel interface represents a network channel
/// which can be used for bidirectional peer-to-peer transfers of arbitrary data
///
/// ## Specifications
///
/// * [MDN]
/// * [W3C]
///
/// [MDN]: https://developer.mozilla.org/en-US/docs/Web/API/RTCDataChannel
/// [W3C]: https://w3c.github.io/webrtc-pc/#dom-rtcdatachannel
#[derive(Default)]
pub struct RTCDataChannel {
    pub(crate) stats_id: String,
    pub(crate) label: String,
    pub(crate) ordered: bool,
    pub(crate) max_packet_lifetime: Option<u16>,
    pub(crate) max_retransmits: Option<u16>,
    pub(crate) protocol: String,
    pub(crate) negotiated: bool,
    pub(crate) id: AtomicU16,
    pub(crate) ready_state: Arc<AtomicU8>, // RTCDataChannelState

    messages_sent: AtomicU32,
    bytes_sent: AtomicUsize,

    on_message_handler: Arc<ArcSwapOption<Mutex<OnMessageHdlrFn>>>,
    on_open_handler: SyncMutex<Option<OnOpenHdlrFn>>,
    on_close_handler: Arc<ArcSwapOption<Mutex<OnCloseHdlrFn>>>,

    pub(crate) sctp_transport: Mutex<Option<Weak<RTCSctpTransport>>>,
}

impl RTCDataChannel {
    // create the DataChannel object before the networking is set up.
    pub(crate) fn new(params: DataChannelParameters) -> Self {
        RTCDataChannel {
            stats_id: format!(
                "DataChannel-{}",
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map_or(0, |d| d.as_nanos())
            ),
            label: params.label,
            protocol: params.protocol,
            negotiated: params.negotiated,
            id: AtomicU16::new(params.id),
            ordered: params.ordered,
            max_packet_lifetime: params.max_packet_life_time,
            max_retransmits: params.max_retransmits,
            ready_state: Arc::new(AtomicU8::new(RTCDataChannelState::Connecting as u8)),
            ..Default::default()
        }
    }

    /// open opens the datachannel over the sctp transport
    pub(crate) async fn open(&self, sctp_transport: Arc<RTCSctpTransport>) -> Result<()> {
        if let Some(association) = sctp_transport.association().await {
            {
                let mut st = self.sctp_transport.lock().await;
                if st.is_none() {
                    *st = Some(Arc::downgrade(&sctp_transport));
                } else {
                    return Ok(());
                }
            }

            association.open_stream(self.id()).await?;

            self.set_ready_state(RTCDataChannelState::Open);
            self.do_open();

            Ok(())
        } else {
            Err(Error::ErrSCTPNotEstablished)
        }
    }

    /// transport returns the SCTPTransport instance the DataChannel is sending over.
    pub async fn transport(&self) -> Option<Weak<RTCSctpTransport>> {
        let sctp_transport = self.sctp_transport.lock().await;
        sctp_transport.clone()
    }

    /// on_open sets an event handler which is invoked when
    /// the underlying data transport has been established (or re-established).
    pub fn on_open(&self, f: OnOpenHdlrFn) {
        {
            let mut handler = self.on_open_handler.lock();
            *handler = Some(f);
        }

        if self.ready_state() == RTCDataChannelState::Open {
            self.do_open();
        }
    }

    fn do_open(&self) {
        let on_open_handler = { self.on_open_handler.lock().take() };
        if let Some(f) = on_open_handler {
            tokio::spawn(async move {
                f().await;
            });
        }
    }

    /// on_close sets an event handler which is invoked when
    /// the underlying data transport has been closed.
    pub fn on_close(&self, f: OnCloseHdlrFn) {
        self.on_close_handler.store(Some(Arc::new(Mutex::new(f))));
    }

    /// on_message sets an event handler which is invoked on a binary
    /// message arrival over the sctp transport from a remote peer.
    pub fn on_message(&self, f: OnMessageHdlrFn) {
        self.on_message_handler.store(Some(Arc::new(Mutex::new(f))));
    }

    pub(crate) async fn do_message(&self, msg: DataChannelMessage) {
        if let Some(handler) = self.on_message_handler.load_full() {
            let mut f = handler.lock().await;
            f(msg).await;
        }
    }

    /// send sends the binary message to the DataChannel peer
    pub async fn send(&self, data: &Bytes) -> Result<usize> {
        self.ensure_open()?;

        self.messages_sent.fetch_add(1, Ordering::SeqCst);
        self.bytes_sent.fetch_add(data.len(), Ordering::SeqCst);

        Ok(data.len())
    }

    /// send_text sends a text message to the DataChannel peer
    pub async fn send_text(&self, s: impl Into<String>) -> Result<usize> {
        self.send(&Bytes::from(s.into())).await
    }

    fn ensure_open(&self) -> Result<()> {
        if self.ready_state() != RTCDataChannelState::Open {
            Err(Error::ErrClosedPipe)
        } else {
            Ok(())
        }
    }

    /// Close Closes the DataChannel. It may be called regardless of whether
    /// the DataChannel object was created by this peer or the remote peer.
    pub async fn close(&self) -> Result<()> {
        if self.ready_state() == RTCDataChannelState::Closed {
            return Ok(());
        }

        self.set_ready_state(RTCDataChannelState::Closed);

        if let Some(handler) = self.on_close_handler.load_full() {
            let mut f = handler.lock().await;
            f().await;
        }

        Ok(())
    }

    /// label represents a label that can be used to distinguish this
    /// DataChannel object from other DataChannel objects. Scripts are
    /// allowed to create multiple DataChannel objects with the same label.
    pub fn label(&self) -> &str {
        self.label.as_str()
    }

    /// Ordered represents if the DataChannel is ordered, and false if
    /// out-of-order delivery is allowed.
    pub fn ordered(&self) -> bool {
        self.ordered
    }

    /// max_packet_lifetime represents the length of the time window (msec) during
    /// which transmissions and retransmissions may occur in unreliable mode.
    pub fn max_packet_lifetime(&self) -> Option<u16> {
        self.max_packet_lifetime
    }

    /// max_retransmits represents the maximum number of retransmissions that are
    /// attempted in unreliable mode.
    pub fn max_retransmits(&self) -> Option<u16> {
        self.max_retransmits
    }

    /// protocol represents the name of the sub-protocol used with this
    /// DataChannel.
    pub fn protocol(&self) -> &str {
        self.protocol.as_str()
    }

    /// negotiated represents whether this DataChannel was negotiated by the
    /// application (true), or not (false).
    pub fn negotiated(&self) -> bool {
        self.negotiated
    }

    /// id represents the ID for this DataChannel. The value is initially
    /// null, which is what will be returned if the ID was not provided at
    /// channel creation time. Otherwise, it will return the ID that was either
    /// selected by the script or generated. After the ID is set to a non-null
    /// value, it will not change.
    pub fn id(&self) -> u16 {
        self.id.load(Ordering::SeqCst)
    }

    /// ready_state represents the state of the DataChannel object.
    pub fn ready_state(&self) -> RTCDataChannelState {
        self.ready_state.load(Ordering::SeqCst).into()
    }

    pub(crate) fn set_ready_state(&self, r: RTCDataChannelState) {
        self.ready_state.store(r as u8, Ordering::SeqCst);
    }

    pub(crate) fn collect_stats(&self, collector: &StatsCollector) {
        let stats = DataChannelStats::from(self);
        collector.insert(self.stats_id.clone(), StatsReportType::DataChannel(stats));
    }

    pub(crate) fn messages_sent(&self) -> u32 {
        self.messages_sent.load(Ordering::SeqCst)
    }

    pub(crate) fn bytes_sent(&self) -> usize {
        self.bytes_sent.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod data_channel_test {
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test]
    async fn test_data_channel_on_message() -> Result<()> {
        let dc = RTCDataChannel::new(DataChannelParameters {
            label: "test".to_owned(),
            ordered: true,
            ..Default::default()
        });

        let (msg_tx, mut msg_rx) = mpsc::channel::<DataChannelMessage>(1);
        let msg_tx = Arc::new(Mutex::new(Some(msg_tx)));
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            let msg_tx = Arc::clone(&msg_tx);
            Box::pin(async move {
                let mut tx = msg_tx.lock().await;
                if let Some(tx) = tx.take() {
                    let _ = tx.send(msg).await;
                }
            })
        }));

        dc.do_message(DataChannelMessage {
            is_string: true,
            data: Bytes::from_static(b"hello"),
        })
        .await;

        let msg = msg_rx.recv().await.ok_or(Error::ErrDataChannelNotOpen)?;
        assert!(msg.is_string);
        assert_eq!(&msg.data[..], b"hello");

        Ok(())
    }

    #[tokio::test]
    async fn test_data_channel_on_open_after_open() -> Result<()> {
        let dc = RTCDataChannel::new(DataChannelParameters {
            label: "test".to_owned(),
            ordered: true,
            ..Default::default()
        });

        dc.set_ready_state(RTCDataChannelState::Open);

        let (open_tx, mut open_rx) = mpsc::channel::<()>(1);
        dc.on_open(Box::new(move || {
            Box::pin(async move {
                let _ = open_tx.send(()).await;
            })
        }));

        assert_eq!(open_rx.recv().await, Some(()));

        Ok(())
    }

    #[tokio::test]
    async fn test_data_channel_send_counters() -> Result<()> {
        let dc = RTCDataChannel::new(DataChannelParameters {
            label: "test".to_owned(),
            ordered: true,
            ..Default::default()
        });

        dc.set_ready_state(RTCDataChannelState::Open);

        dc.send(&Bytes::from_static(b"abcd")).await?;
        dc.send_text("efgh").await?;

        assert_eq!(dc.messages_sent(), 2);
        assert_eq!(dc.bytes_sent(), 8);

        Ok(())
    }

    #[tokio::test]
    async fn test_data_channel_send_before_open() -> Result<()> {
        let dc = RTCDataChannel::new(DataChannelParameters {
            label: "test".to_owned(),
            ordered: true,
            ..Default::default()
        });

        assert_eq!(dc.ready_state(), RTCDataChannelState::Connecting);

        let result = dc.send(&Bytes::from_static(b"hello")).await;
        assert_eq!(result, Err(Error::ErrClosedPipe));

        Ok(())
    }

    #[tokio::test]
    async fn test_data_channel_open_requires_association() -> Result<()> {
        let dc = RTCDataChannel::new(DataChannelParameters {
            label: "test".to_owned(),
            ordered: true,
            ..Default::default()
        });

        let sctp = Arc::new(RTCSctpTransport::default());
        assert_eq!(
            dc.open(sctp).await,
            Err(Error::ErrSCTPNotEstablished)
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_data_channel_close_idempotent() -> Result<()> {
        let dc = RTCDataChannel::new(DataChannelParameters {
            label: "test".to_owned(),
            ordered: true,
            ..Default::default()
        });

        dc.close().await?;
        assert_eq!(dc.ready_state(), RTCDataChannelState::Closed);
        dc.close().await?;

        Ok(())
    }
}
