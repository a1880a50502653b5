use super::frame::Frame;
use crate::error::IntercomError;
use futures::channel::mpsc;

pub type PortId = u64;

/// One end of a bidirectional byte channel between two contexts.
///
/// In the browser the wasm glue builds ends from a runtime port with
/// [`PortEnd::from_parts`]; in-process (and in tests) [`channel`] returns a
/// connected pair. Dropping an end closes the channel for the other side.
pub struct PortEnd {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl PortEnd {
    pub fn from_parts(
        tx: mpsc::UnboundedSender<Vec<u8>>,
        rx: mpsc::UnboundedReceiver<Vec<u8>>,
    ) -> Self {
        Self { tx, rx }
    }

    pub fn split(self) -> (PortSender, mpsc::UnboundedReceiver<Vec<u8>>) {
        (PortSender(self.tx), self.rx)
    }
}

/// Connected pair of port ends.
pub fn channel() -> (PortEnd, PortEnd) {
    let (a_tx, b_rx) = mpsc::unbounded();
    let (b_tx, a_rx) = mpsc::unbounded();
    (
        PortEnd { tx: a_tx, rx: a_rx },
        PortEnd { tx: b_tx, rx: b_rx },
    )
}

#[derive(Clone)]
pub struct PortSender(mpsc::UnboundedSender<Vec<u8>>);

impl PortSender {
    pub fn send(&self, frame: &Frame) -> Result<(), IntercomError> {
        let bytes = frame.encode()?;
        self.0
            .unbounded_send(bytes)
            .map_err(|_| IntercomError::Disconnected)
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExtensionNotification;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_pair_delivers_frames_in_order() {
        let (a, b) = channel();
        let (a_tx, _a_rx) = a.split();
        let (_b_tx, mut b_rx) = b.split();

        for chain in ["1", "2"] {
            a_tx.send(&Frame::Notify {
                notification: ExtensionNotification::ChainSwitched {
                    origin: "https://dapp.example".into(),
                    chain_id: chain.into(),
                },
            })
            .unwrap();
        }

        let first = Frame::decode(&b_rx.next().await.unwrap()).unwrap();
        let second = Frame::decode(&b_rx.next().await.unwrap()).unwrap();
        assert!(matches!(
            first,
            Frame::Notify {
                notification: ExtensionNotification::ChainSwitched { ref chain_id, .. }
            } if chain_id == "1"
        ));
        assert!(matches!(
            second,
            Frame::Notify {
                notification: ExtensionNotification::ChainSwitched { ref chain_id, .. }
            } if chain_id == "2"
        ));
    }

    #[tokio::test]
    async fn test_dropping_an_end_closes_the_other() {
        let (a, b) = channel();
        let (b_tx, mut b_rx) = b.split();
        drop(a);
        assert!(b_rx.next().await.is_none());
        assert!(b_tx.is_closed());
        assert!(matches!(
            b_tx.send(&Frame::Notify {
                notification: ExtensionNotification::DAppsDisconnected { origins: vec![] }
            }),
            Err(IntercomError::Disconnected)
        ));
    }
}
