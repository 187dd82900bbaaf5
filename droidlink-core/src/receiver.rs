//! Inbound event channel.

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::codec::DeviceMessageDecoder;
use crate::device::DeviceMessage;
use crate::error::Result;

/// Reads device messages from the control socket and hands each one to
/// `sink` in arrival order.
pub struct Receiver<R, F> {
    reader: FramedRead<R, DeviceMessageDecoder>,
    sink: F,
}

impl<R, F> Receiver<R, F>
where
    R: AsyncRead + Unpin,
    F: FnMut(DeviceMessage) + Send,
{
    pub fn new(reader: R, sink: F) -> Self {
        Self {
            reader: FramedRead::new(reader, DeviceMessageDecoder),
            sink,
        }
    }

    /// Run until the stream closes, a message cannot be parsed, or the
    /// token is cancelled. Returns the number of messages delivered.
    pub async fn run(mut self, token: CancellationToken) -> Result<u64> {
        let mut delivered = 0u64;
        loop {
            let next = tokio::select! {
                _ = token.cancelled() => return Ok(delivered),
                next = self.reader.next() => next,
            };
            match next {
                Some(Ok(message)) => {
                    (self.sink)(message);
                    delivered += 1;
                }
                Some(Err(e)) => {
                    error!("device message stream broken: {e}");
                    return Err(e);
                }
                None => {
                    debug!(delivered, "control stream closed");
                    return Ok(delivered);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;

    use super::*;
    use crate::error::{DeserializeError, DroidlinkError};

    fn collector() -> (Arc<Mutex<Vec<DeviceMessage>>>, impl FnMut(DeviceMessage) + Send) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            move |message| seen.lock().unwrap().push(message)
        };
        (seen, sink)
    }

    #[tokio::test]
    async fn reassembles_split_messages() {
        let reader = tokio_test::io::Builder::new()
            .read(&[0x00, 0x00, 0x00])
            .read(&[0x00, 0x03, b'A'])
            .read(&[b'B', b'C', 0x01, 0, 0, 0])
            .read(&[0, 0, 0, 0, 0x2a])
            .build();
        let (seen, sink) = collector();

        let delivered = Receiver::new(reader, sink)
            .run(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(
            *seen.lock().unwrap(),
            [
                DeviceMessage::Clipboard {
                    text: Bytes::from_static(b"ABC")
                },
                DeviceMessage::AckClipboard { sequence: 42 },
            ]
        );
    }

    #[tokio::test]
    async fn several_messages_in_one_read() {
        let reader = tokio_test::io::Builder::new()
            .read(&[0x01, 0, 0, 0, 0, 0, 0, 0, 0x01, 0x01, 0, 0, 0, 0, 0, 0, 0, 0x02])
            .build();
        let (seen, sink) = collector();
        Receiver::new(reader, sink)
            .run(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_tag_stops_the_loop() {
        let reader = tokio_test::io::Builder::new()
            .read(&[0x01, 0, 0, 0, 0, 0, 0, 0, 0x07])
            .read(&[0x63, 0, 0, 0, 0])
            .build();
        let (seen, sink) = collector();
        let result = Receiver::new(reader, sink)
            .run(CancellationToken::new())
            .await;
        assert!(matches!(
            result,
            Err(DroidlinkError::Deserialize(DeserializeError::NotRecoverable))
        ));
        assert_eq!(
            *seen.lock().unwrap(),
            [DeviceMessage::AckClipboard { sequence: 7 }]
        );
    }

    #[tokio::test]
    async fn partial_message_at_close_is_not_an_error() {
        let reader = tokio_test::io::Builder::new()
            .read(&[0x00, 0x00, 0x00, 0x00, 0x05, b'h', b'i'])
            .build();
        let (seen, sink) = collector();
        let delivered = Receiver::new(reader, sink)
            .run(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(delivered, 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_stops_a_waiting_receiver() {
        let (_device, client) = tokio::io::duplex(64);
        let token = CancellationToken::new();
        let task = tokio::spawn(Receiver::new(client, |_| {}).run(token.clone()));
        token.cancel();
        assert_eq!(task.await.unwrap().unwrap(), 0);
    }
}
