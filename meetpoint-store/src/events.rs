use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::info;

use meetpoint_core::{MemberEvent, Notifier, NotifyError, OperatorEvent, ReplyHandle};

/// A state-change notification on its way to the transport layer
#[derive(Debug, Clone)]
pub enum BusMessage {
    Member {
        reply: ReplyHandle,
        event: MemberEvent,
    },
    Operator {
        event: OperatorEvent,
    },
}

/// In-process fan-out of engine notifications. The transport layer
/// subscribes and renders; delivery fails when nothing is listening.
#[derive(Clone)]
pub struct NotificationBus {
    tx: broadcast::Sender<BusMessage>,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl Notifier for NotificationBus {
    async fn notify_member(
        &self,
        reply: ReplyHandle,
        event: MemberEvent,
    ) -> Result<(), NotifyError> {
        self.tx
            .send(BusMessage::Member { reply, event })
            .map_err(|_| NotifyError::ChannelClosed("no transport subscriber".to_string()))?;
        info!("Member notice queued for channel {}", reply.channel_id);
        Ok(())
    }

    async fn notify_operator(&self, event: OperatorEvent) -> Result<(), NotifyError> {
        self.tx
            .send(BusMessage::Operator { event })
            .map_err(|_| NotifyError::ChannelClosed("no transport subscriber".to_string()))?;
        info!("Operator notice queued");
        Ok(())
    }
}
