use std::sync::{
    mpsc::{channel, Receiver, Sender},
    Arc, Mutex,
};

/// Fan-out of committed events to any number of receivers. Receivers that
/// have been dropped are pruned on the next notify.
#[derive(Clone)]
pub struct Notifier<Event: Send + Clone + 'static> {
    senders: Arc<Mutex<Vec<Sender<Event>>>>,
}

impl<Event: Send + Clone + 'static> Default for Notifier<Event> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Event: Send + Clone + 'static> Notifier<Event> {
    pub fn new() -> Self {
        Self {
            senders: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn notify(&self, event: Event) {
        match self.senders.lock() {
            Ok(mut senders) => senders.retain(|tx| tx.send(event.clone()).is_ok()),
            Err(_) => log::warn!("Notifier lock poisoned, dropping event"),
        }
    }

    pub fn observer(&self) -> Receiver<Event> {
        let (tx, rx) = channel();
        match self.senders.lock() {
            Ok(mut senders) => senders.push(tx),
            Err(_) => log::warn!("Notifier lock poisoned, observer will receive nothing"),
        }
        rx
    }

    pub fn observer_count(&self) -> usize {
        self.senders.lock().map(|s| s.len()).unwrap_or(0)
    }
}
