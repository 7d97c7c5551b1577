//! Simple stateless pub-sub notification channel.
//!
//! Completion and refund notifications to the two parties are advisory: their failure must never block or reverse
//! a transition. Handlers therefore run on their own task, fed through a bounded channel, and a full or closed
//! channel is logged and forgotten.
use std::{future::Future, pin::Pin, sync::Arc};

use log::{debug, error, trace};
use tokio::sync::mpsc;

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Runs until the last subscribed producer is dropped.
    pub async fn start_handler(mut self) {
        debug!("📬️ Starting notification handler");
        // Drop the internal sender so the loop ends when the last subscriber goes away.
        drop(self.sender);
        while let Some(event) = self.listener.recv().await {
            trace!("📬️ Handling notification event");
            (self.handler)(event).await;
        }
        debug!("📬️ Notification handler has shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to publish notification event: {e}");
        }
    }
}
