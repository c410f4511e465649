use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};

use crate::error::{Error, Result};
use crate::rtp_transceiver::SSRC;

/// SrtpSession is the interface the peer connection holds onto an
/// SRTP or SRTCP session exported by the DTLS transport. Packet
/// cryptography lives behind it; the session only demultiplexes
/// streams by SSRC and hands them out.
pub(crate) struct SrtpSession {
    new_stream_tx: Mutex<Option<mpsc::Sender<Arc<SrtpStream>>>>,
    new_stream_rx: Mutex<mpsc::Receiver<Arc<SrtpStream>>>,

    streams: Mutex<HashMap<SSRC, Arc<SrtpStream>>>,
    write_stream: Arc<SrtpWriteStream>,
}

impl SrtpSession {
    pub(crate) fn new() -> Self {
        let (new_stream_tx, new_stream_rx) = mpsc::channel(16);
        SrtpSession {
            new_stream_tx: Mutex::new(Some(new_stream_tx)),
            new_stream_rx: Mutex::new(new_stream_rx),
            streams: Mutex::new(HashMap::new()),
            write_stream: Arc::new(SrtpWriteStream::default()),
        }
    }

    /// accept_stream blocks until an inbound stream with an SSRC nobody has
    /// claimed via open_read_stream shows up, or the session closes.
    pub(crate) async fn accept_stream(&self) -> Result<(Arc<SrtpStream>, SSRC)> {
        let mut new_stream_rx = self.new_stream_rx.lock().await;
        match new_stream_rx.recv().await {
            Some(stream) => {
                let ssrc = stream.ssrc;
                Ok((stream, ssrc))
            }
            None => Err(Error::ErrClosedPipe),
        }
    }

    /// open_read_stream claims the stream for the given SSRC. Packets
    /// demultiplexed to it are no longer surfaced through accept_stream.
    pub(crate) async fn open_read_stream(&self, ssrc: SSRC) -> Result<Arc<SrtpStream>> {
        let mut streams = self.streams.lock().await;
        let stream = streams
            .entry(ssrc)
            .or_insert_with(|| Arc::new(SrtpStream::new(ssrc)));
        Ok(Arc::clone(stream))
    }

    pub(crate) async fn open_write_stream(&self) -> Result<Arc<SrtpWriteStream>> {
        Ok(Arc::clone(&self.write_stream))
    }

    /// dispatch routes an inbound packet to the stream claimed for its SSRC,
    /// announcing a fresh stream through accept_stream when none was claimed.
    pub(crate) async fn dispatch(&self, ssrc: SSRC, payload: Bytes) -> Result<()> {
        let (stream, is_new) = {
            let mut streams = self.streams.lock().await;
            match streams.get(&ssrc) {
                Some(stream) => (Arc::clone(stream), false),
                None => {
                    let stream = Arc::new(SrtpStream::new(ssrc));
                    streams.insert(ssrc, Arc::clone(&stream));
                    (stream, true)
                }
            }
        };

        stream.feed(payload).await?;

        if is_new {
            let new_stream_tx = self.new_stream_tx.lock().await;
            match &*new_stream_tx {
                Some(tx) => tx
                    .send(stream)
                    .await
                    .map_err(|e| Error::new(e.to_string()))?,
                None => return Err(Error::ErrClosedPipe),
            }
        }

        Ok(())
    }

    pub(crate) async fn close(&self) -> Result<()> {
        let mut new_stream_tx = self.new_stream_tx.lock().await;
        new_stream_tx.take();
        Ok(())
    }
}

/// SrtpStream is a single inbound RTP or RTCP stream, identified by SSRC.
pub(crate) struct SrtpStream {
    pub(crate) ssrc: SSRC,

    packets_tx: mpsc::Sender<Bytes>,
    packets_rx: Mutex<mpsc::Receiver<Bytes>>,
}

impl SrtpStream {
    fn new(ssrc: SSRC) -> Self {
        let (packets_tx, packets_rx) = mpsc::channel(64);
        SrtpStream {
            ssrc,
            packets_tx,
            packets_rx: Mutex::new(packets_rx),
        }
    }

    pub(crate) async fn feed(&self, payload: Bytes) -> Result<()> {
        self.packets_tx
            .send(payload)
            .await
            .map_err(|e| Error::new(e.to_string()))
    }

    /// read blocks until the next packet for this stream arrives.
    pub(crate) async fn read(&self) -> Result<Bytes> {
        let mut packets_rx = self.packets_rx.lock().await;
        packets_rx.recv().await.ok_or(Error::ErrClosedPipe)
    }
}

/// SrtpWriteStream is the single outbound stream of a session. Encryption
/// and the wire are the session's concern; the handle only accounts for
/// what was handed over.
#[derive(Default)]
pub(crate) struct SrtpWriteStream {
    bytes_written: AtomicUsize,
}

impl SrtpWriteStream {
    pub(crate) fn write(&self, b: &Bytes) -> Result<usize> {
        self.bytes_written.fetch_add(b.len(), Ordering::SeqCst);
        Ok(b.len())
    }

    pub(crate) fn bytes_written(&self) -> usize {
        self.bytes_written.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_srtp_session_accept_stream() -> Result<()> {
        let session = SrtpSession::new();

        session.dispatch(1234, Bytes::from_static(&[0u8; 12])).await?;

        let (stream, ssrc) = session.accept_stream().await?;
        assert_eq!(ssrc, 1234);
        assert_eq!(stream.read().await?.len(), 12);

        Ok(())
    }

    #[tokio::test]
    async fn test_srtp_session_claimed_stream_not_accepted() -> Result<()> {
        let session = SrtpSession::new();

        let claimed = session.open_read_stream(5678).await?;
        session.dispatch(5678, Bytes::from_static(&[1u8; 8])).await?;

        assert_eq!(claimed.read().await?.len(), 8);

        session.close().await?;
        assert!(matches!(
            session.accept_stream().await,
            Err(Error::ErrClosedPipe)
        ));

        Ok(())
    }
}
