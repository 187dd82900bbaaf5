//! Outbound command channel.
//!
//! Producers enqueue [`ControlMessage`]s through a [`ControllerHandle`];
//! a single writer loop ([`Controller::run`]) drains the queue in
//! submission order and resolves each command's [`Completion`] once its
//! bytes have been flushed to the socket.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::SinkExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::codec::ControlMessageEncoder;
use crate::control::{ControlMessage, ScreenPowerMode};
use crate::error::{DroidlinkError, Result};
use crate::mouse::MouseClick;

/// A queued command and the latch fired once it is on the wire.
#[derive(Debug)]
pub struct PendingCommand {
    message: ControlMessage,
    done: oneshot::Sender<()>,
}

impl PendingCommand {
    pub fn new(message: ControlMessage) -> (Self, Completion) {
        let (done, rx) = oneshot::channel();
        (Self { message, done }, Completion { rx })
    }

    pub fn message(&self) -> &ControlMessage {
        &self.message
    }
}

/// Resolves when the command's bytes have been flushed.
///
/// Fails with [`DroidlinkError::ChannelClosed`] when the writer stopped
/// before the command was written. It does not wait for the device to
/// act on the command.
#[derive(Debug)]
#[must_use = "a completion does nothing unless awaited"]
pub struct Completion {
    rx: oneshot::Receiver<()>,
}

impl Future for Completion {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map_err(|_| DroidlinkError::ChannelClosed)
    }
}

/// Producer side of the command queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<PendingCommand>,
}

impl ControllerHandle {
    /// Enqueue from async code.
    ///
    /// The queue is unbounded, so this never waits for space.
    pub async fn push(&self, message: ControlMessage) -> Result<Completion> {
        self.push_nowait(message)
    }

    /// Enqueue from code that cannot await.
    pub fn push_nowait(&self, message: ControlMessage) -> Result<Completion> {
        let (pending, completion) = PendingCommand::new(message);
        self.tx.send(pending)?;
        Ok(completion)
    }

    pub fn turn_screen_off(&self) -> Result<Completion> {
        self.push_nowait(ControlMessage::SetScreenPowerMode {
            mode: ScreenPowerMode::Off,
        })
    }

    pub fn inject_click(&self, click: MouseClick) -> Result<Completion> {
        self.push_nowait(click.into())
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct Controller<W> {
    writer: FramedWrite<W, ControlMessageEncoder>,
    rx: mpsc::UnboundedReceiver<PendingCommand>,
    tx: mpsc::UnboundedSender<PendingCommand>,
}

impl<W> Controller<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            writer: FramedWrite::new(writer, ControlMessageEncoder),
            rx,
            tx,
        }
    }

    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            tx: self.tx.clone(),
        }
    }

    /// Write queued commands until cancelled, the socket fails or every
    /// handle is dropped. The write side is shut down on exit.
    pub async fn run(self, token: CancellationToken) -> Result<()> {
        let Controller {
            mut writer,
            mut rx,
            tx,
        } = self;
        drop(tx);

        let result = loop {
            let pending = tokio::select! {
                _ = token.cancelled() => break Ok(()),
                pending = rx.recv() => match pending {
                    Some(pending) => pending,
                    None => break Ok(()),
                },
            };

            let PendingCommand { message, done } = pending;
            trace!(%message, "writing control message");
            let sent = tokio::select! {
                _ = token.cancelled() => break Ok(()),
                sent = writer.send(message) => sent,
            };
            if let Err(e) = sent {
                error!("control socket write failed: {e}");
                break Err(e);
            }
            // the producer may have stopped caring
            let _ = done.send(());
        };

        // pending completions resolve to ChannelClosed
        rx.close();
        if let Err(e) = writer.get_mut().shutdown().await {
            debug!("control socket shutdown: {e}");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::android::{KeyEventAction, Keycode, MetaState};
    use crate::coords::{Point, Position, Size};
    use crate::mouse::{ClickAction, MouseButtons};

    fn back() -> ControlMessage {
        ControlMessage::BackOrScreenOn {
            action: KeyEventAction::Down,
        }
    }

    #[tokio::test]
    async fn writes_in_submission_order() {
        let enter = ControlMessage::InjectKeycode {
            action: KeyEventAction::Up,
            keycode: Keycode::ENTER,
            repeat: 5,
            meta_state: MetaState::SHIFT_ON | MetaState::SHIFT_LEFT_ON,
        };
        let writer = tokio_test::io::Builder::new()
            .write(&[0x00, 0x01, 0, 0, 0, 0x42, 0, 0, 0, 0x05, 0, 0, 0, 0x41])
            .write(&[0x04, 0x00])
            .write(&[0x07])
            .build();

        let controller = Controller::new(writer);
        let handle = controller.handle();
        let task = tokio::spawn(controller.run(CancellationToken::new()));

        // producers on separate tasks, each submitted after the previous
        let a = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.push(enter).await.unwrap() })
                .await
                .unwrap()
        };
        let b = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.push(back()).await.unwrap() })
                .await
                .unwrap()
        };
        let c = handle
            .push_nowait(ControlMessage::CollapsePanels)
            .unwrap();

        a.await.unwrap();
        b.await.unwrap();
        c.await.unwrap();

        drop(handle);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn completion_waits_for_the_bytes_to_leave() {
        let (client, mut device) = tokio::io::duplex(16);
        let controller = Controller::new(client);
        let handle = controller.handle();
        let token = CancellationToken::new();
        let task = tokio::spawn(controller.run(token.clone()));

        let text = "x".repeat(40);
        let completion = handle
            .push(ControlMessage::InjectText { text: text.clone() })
            .await
            .unwrap();
        tokio::pin!(completion);

        // the pipe holds 16 bytes; the message is 45
        assert!(
            tokio::time::timeout(Duration::from_millis(50), &mut completion)
                .await
                .is_err()
        );

        let mut wire = vec![0u8; 45];
        device.read_exact(&mut wire).await.unwrap();
        assert_eq!(wire[0], 0x01);
        assert_eq!(&wire[5..], text.as_bytes());

        completion.await.unwrap();
        token.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn mouse_click_goes_out_as_a_touch_event() {
        let click = MouseClick {
            position: Position {
                point: Point { x: 10, y: 20 },
                screen_size: Size {
                    width: 100,
                    height: 200,
                },
            },
            action: ClickAction::Down,
            buttons: MouseButtons::LEFT,
        };
        let expected = ControlMessage::from(click).serialize();
        let writer = tokio_test::io::Builder::new().write(&expected).build();

        let controller = Controller::new(writer);
        let handle = controller.handle();
        let task = tokio::spawn(controller.run(CancellationToken::new()));
        handle.inject_click(click).unwrap().await.unwrap();

        drop(handle);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn push_after_stop_reports_closed_channel() {
        let writer = tokio_test::io::Builder::new().build();
        let controller = Controller::new(writer);
        let handle = controller.handle();
        let token = CancellationToken::new();
        token.cancel();
        controller.run(token).await.unwrap();

        assert!(handle.is_closed());
        assert!(matches!(
            handle.push_nowait(back()),
            Err(DroidlinkError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn unsent_commands_fail_their_completion() {
        let (client, _device) = tokio::io::duplex(1);
        let controller = Controller::new(client);
        let handle = controller.handle();
        let token = CancellationToken::new();

        let first = handle.push_nowait(ControlMessage::RotateDevice).unwrap();
        let stuck = handle
            .push_nowait(ControlMessage::InjectText {
                text: "blocked".into(),
            })
            .unwrap();
        let never = handle.turn_screen_off().unwrap();

        let task = tokio::spawn(controller.run(token.clone()));
        first.await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        task.await.unwrap().unwrap();

        assert!(matches!(stuck.await, Err(DroidlinkError::ChannelClosed)));
        assert!(matches!(never.await, Err(DroidlinkError::ChannelClosed)));
    }
}
