pub mod sctp_transport_capabilities;
pub mod sctp_transport_state;

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::Mutex;

use crate::data_channel::data_channel_parameters::DataChannelParameters;
use crate::data_channel::RTCDataChannel;
use crate::dtls_transport::dtls_transport_state::RTCDtlsTransportState;
use crate::dtls_transport::RTCDtlsTransport;
use crate::error::{Error, Result};
use crate::sctp_transport::sctp_transport_capabilities::SCTPTransportCapabilities;
use crate::sctp_transport::sctp_transport_state::RTCSctpTransportState;

pub(crate) const SCTP_MAX_CHANNELS: u16 = u16::MAX;

pub type OnDataChannelHdlrFn = Box<
    dyn (FnMut(Arc<RTCDataChannel>) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnDataChannelOpenedHdlrFn = Box<
    dyn (FnMut(Arc<RTCDataChannel>) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

/// Association is the handle to an established SCTP association. Stream
/// multiplexing is the association's concern; the transport only tracks
/// which stream identifiers are in use.
#[derive(Default)]
pub(crate) struct Association {
    streams: Mutex<HashSet<u16>>,
}

impl Association {
    pub(crate) async fn open_stream(&self, stream_identifier: u16) -> Result<()> {
        let mut streams = self.streams.lock().await;
        streams.insert(stream_identifier);
        Ok(())
    }

    pub(crate) async fn close(&self) -> Result<()> {
        let mut streams = self.streams.lock().await;
        streams.clear();
        Ok(())
    }
}

/// SCTPTransport provides details about the SCTP transport.
#[derive(Default)]
pub struct RTCSctpTransport {
    pub(crate) dtls_transport: Arc<RTCDtlsTransport>,

    // State represents the current state of the SCTP transport.
    state: AtomicU8, // RTCSctpTransportState

    // SCTPTransportState doesn't have an enum to distinguish between New/Connecting
    // so we need a dedicated field
    is_started: AtomicBool,

    // max_message_size represents the maximum size of data that can be passed to
    // DataChannel's send() method.
    max_message_size: usize,

    // max_channels represents the maximum amount of DataChannel's that can
    // be used simultaneously.
    max_channels: u16,

    pub(crate) association: Mutex<Option<Arc<Association>>>,

    on_data_channel_handler: Arc<ArcSwapOption<Mutex<OnDataChannelHdlrFn>>>,
    on_data_channel_opened_handler: Arc<ArcSwapOption<Mutex<OnDataChannelOpenedHdlrFn>>>,
}

impl RTCSctpTransport {
    pub(crate) fn new(dtls_transport: Arc<RTCDtlsTransport>) -> Self {
        RTCSctpTransport {
            dtls_transport,
            state: AtomicU8::new(RTCSctpTransportState::Connecting as u8),
            is_started: AtomicBool::new(false),
            max_message_size: RTCSctpTransport::calc_message_size(65536, 65536),
            max_channels: SCTP_MAX_CHANNELS,
            ..Default::default()
        }
    }

    /// transport returns the DTLSTransport instance the SCTPTransport is sending over.
    pub fn transport(&self) -> Arc<RTCDtlsTransport> {
        Arc::clone(&self.dtls_transport)
    }

    /// get_capabilities returns the SCTPCapabilities of the SCTPTransport.
    pub fn get_capabilities(&self) -> SCTPTransportCapabilities {
        SCTPTransportCapabilities {
            max_message_size: 0,
        }
    }

    /// Start the SCTPTransport. Since both local and remote parties must mutually
    /// create an SCTPTransport, SCTP SO (Simultaneous Open) is used to establish
    /// a connection over SCTP.
    pub async fn start(&self, _remote_caps: SCTPTransportCapabilities) -> Result<()> {
        if self.is_started.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.is_started.store(true, Ordering::SeqCst);

        if self.dtls_transport.state() != RTCDtlsTransportState::Connected {
            return Err(Error::ErrSCTPTransportDTLS);
        }

        {
            let mut association = self.association.lock().await;
            *association = Some(Arc::new(Association::default()));
        }

        self.state
            .store(RTCSctpTransportState::Connected as u8, Ordering::SeqCst);

        Ok(())
    }

    /// Stop stops the SCTPTransport
    pub async fn stop(&self) -> Result<()> {
        {
            let mut association = self.association.lock().await;
            if let Some(a) = association.take() {
                a.close().await?;
            }
        }

        self.state
            .store(RTCSctpTransportState::Closed as u8, Ordering::SeqCst);

        Ok(())
    }

    /// on_data_channel sets an event handler which is invoked when a data
    /// channel is announced by the remote peer.
    pub fn on_data_channel(&self, f: OnDataChannelHdlrFn) {
        self.on_data_channel_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// on_data_channel_opened sets an event handler which is invoked when a
    /// data channel is opened
    pub fn on_data_channel_opened(&self, f: OnDataChannelOpenedHdlrFn) {
        self.on_data_channel_opened_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// handle_data_channel surfaces a data channel announced by the remote
    /// side of the association.
    pub(crate) async fn handle_data_channel(
        self: &Arc<Self>,
        params: DataChannelParameters,
    ) -> Result<Arc<RTCDataChannel>> {
        let dc = Arc::new(RTCDataChannel::new(params));

        if let Some(handler) = self.on_data_channel_handler.load_full() {
            let mut f = handler.lock().await;
            f(Arc::clone(&dc)).await;
        }

        dc.open(Arc::clone(self)).await?;

        if let Some(handler) = self.on_data_channel_opened_handler.load_full() {
            let mut f = handler.lock().await;
            f(Arc::clone(&dc)).await;
        }

        Ok(dc)
    }

    fn calc_message_size(remote_max_message_size: usize, can_send_size: usize) -> usize {
        if remote_max_message_size == 0 && can_send_size == 0 {
            usize::MAX
        } else if remote_max_message_size == 0 {
            can_send_size
        } else if can_send_size == 0 || can_send_size > remote_max_message_size {
            remote_max_message_size
        } else {
            can_send_size
        }
    }

    /// max_channels is the maximum number of RTCDataChannels that can be open simultaneously.
    pub fn max_channels(&self) -> u16 {
        if self.max_channels == 0 {
            SCTP_MAX_CHANNELS
        } else {
            self.max_channels
        }
    }

    /// state returns the current state of the SCTPTransport
    pub fn state(&self) -> RTCSctpTransportState {
        self.state.load(Ordering::SeqCst).into()
    }

    pub(crate) async fn association(&self) -> Option<Arc<Association>> {
        let association = self.association.lock().await;
        association.clone()
    }
}
