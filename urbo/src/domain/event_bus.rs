//! Ordered delivery of engine notifications to UI-facing listeners.
//!
//! Publishing is synchronous and callable from any thread; one dispatcher
//! task delivers notifications in publish order. Listeners are read at
//! delivery time, so replacing a listener affects only later notifications.

use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::{Poi, RecognitionState, Snapshot, SnapshotId};

/// Structured diagnostic for the debug overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    /// Set a persistent label; an empty value removes it.
    Field {
        /// Label name.
        key: String,
        /// Label value.
        value: String,
    },
    /// Remove a label.
    RemoveField {
        /// Label name.
        key: String,
    },
    /// Remove every label.
    ClearFields,
    /// Transient user-facing error message.
    Toast {
        /// Message text.
        message: String,
    },
}

/// Notification kinds carried by the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Recognition state transition.
    StateChanged {
        /// New state.
        state: RecognitionState,
        /// POI currently recognised, if any.
        poi: Option<Poi>,
        /// Snapshot the state refers to, or [`SnapshotId::INVALID`].
        snapshot_id: SnapshotId,
    },
    /// A snapshot is ready for display.
    SnapshotReady(Snapshot),
    /// Debug overlay update.
    Diagnostic(DiagnosticEvent),
}

/// Receives recognition state and snapshot notifications.
pub trait RecognitionListener: Send + Sync {
    /// Recognition state changed.
    fn on_state_changed(&self, state: RecognitionState, poi: Option<&Poi>, snapshot_id: SnapshotId);

    /// A snapshot is ready.
    fn on_snapshot(&self, snapshot: &Snapshot);
}

/// Receives debug overlay updates.
pub trait DebugListener: Send + Sync {
    /// Set a persistent label.
    fn set_field(&self, key: &str, value: &str);

    /// Remove a persistent label.
    fn remove_field(&self, key: &str);

    /// Remove all labels.
    fn clear_fields(&self);

    /// Show a transient message.
    fn toast(&self, message: &str);
}

#[derive(Default)]
struct Listeners {
    recognition: RwLock<Option<Arc<dyn RecognitionListener>>>,
    debug: RwLock<Option<Arc<dyn DebugListener>>>,
}

impl Listeners {
    fn recognition(&self) -> Option<Arc<dyn RecognitionListener>> {
        match self.recognition.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn debug(&self) -> Option<Arc<dyn DebugListener>> {
        match self.debug.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

enum BusMessage {
    Deliver(Notification),
    Flush(oneshot::Sender<()>),
}

/// Single-dispatcher notification bus.
pub struct EventBus {
    sender: Mutex<Option<mpsc::UnboundedSender<BusMessage>>>,
    listeners: Arc<Listeners>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl EventBus {
    /// Spawn the dispatcher. Must be called inside a Tokio runtime.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let listeners = Arc::new(Listeners::default());
        let dispatcher = tokio::spawn(dispatch(receiver, Arc::clone(&listeners)));
        Self {
            sender: Mutex::new(Some(sender)),
            listeners,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    /// Replace the recognition listener; `None` unregisters it.
    pub fn set_listener(&self, listener: Option<Arc<dyn RecognitionListener>>) {
        match self.listeners.recognition.write() {
            Ok(mut guard) => *guard = listener,
            Err(poisoned) => *poisoned.into_inner() = listener,
        }
    }

    /// Replace the debug listener; `None` unregisters it.
    pub fn set_debug_listener(&self, listener: Option<Arc<dyn DebugListener>>) {
        match self.listeners.debug.write() {
            Ok(mut guard) => *guard = listener,
            Err(poisoned) => *poisoned.into_inner() = listener,
        }
    }

    /// Queue a notification for delivery.
    pub fn publish(&self, notification: Notification) {
        if !self.send(BusMessage::Deliver(notification)) {
            debug!("event bus closed, notification dropped");
        }
    }

    /// Wait until everything published before this call is delivered.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.send(BusMessage::Flush(done)) {
            let _ = wait.await;
        }
    }

    /// Deliver what is queued, then stop the dispatcher.
    pub async fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let dispatcher = match self.dispatcher.lock() {
            Ok(mut dispatcher) => dispatcher.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(dispatcher) = dispatcher {
            if let Err(err) = dispatcher.await {
                error!(error = %err, "event dispatcher ended abnormally");
            }
        }
    }

    fn send(&self, message: BusMessage) -> bool {
        let Ok(guard) = self.sender.lock() else {
            return false;
        };
        guard
            .as_ref()
            .is_some_and(|sender| sender.send(message).is_ok())
    }
}

async fn dispatch(mut receiver: mpsc::UnboundedReceiver<BusMessage>, listeners: Arc<Listeners>) {
    while let Some(message) = receiver.recv().await {
        match message {
            BusMessage::Deliver(notification) => deliver(&listeners, notification),
            BusMessage::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

fn deliver(listeners: &Listeners, notification: Notification) {
    match notification {
        Notification::StateChanged {
            state,
            poi,
            snapshot_id,
        } => {
            if let Some(listener) = listeners.recognition() {
                listener.on_state_changed(state, poi.as_ref(), snapshot_id);
            }
        }
        Notification::SnapshotReady(snapshot) => {
            if let Some(listener) = listeners.recognition() {
                listener.on_snapshot(&snapshot);
            }
        }
        Notification::Diagnostic(event) => deliver_diagnostic(listeners, event),
    }
}

fn deliver_diagnostic(listeners: &Listeners, event: DiagnosticEvent) {
    let listener = listeners.debug();
    match event {
        DiagnosticEvent::Field { key, value } if value.is_empty() => {
            info!(key = %key, "diagnostic field cleared");
            if let Some(listener) = listener {
                listener.remove_field(&key);
            }
        }
        DiagnosticEvent::Field { key, value } => {
            info!(key = %key, value = %value, "diagnostic field");
            if let Some(listener) = listener {
                listener.set_field(&key, &value);
            }
        }
        DiagnosticEvent::RemoveField { key } => {
            if let Some(listener) = listener {
                listener.remove_field(&key);
            }
        }
        DiagnosticEvent::ClearFields => {
            if let Some(listener) = listener {
                listener.clear_fields();
            }
        }
        DiagnosticEvent::Toast { message } => {
            error!(message = %message, "diagnostic error");
            if let Some(listener) = listener {
                listener.toast(&message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl Recorder {
        fn push(&self, entry: String) {
            self.0.lock().expect("recorder mutex").push(entry);
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().expect("recorder mutex").clone()
        }
    }

    impl RecognitionListener for Recorder {
        fn on_state_changed(&self, state: RecognitionState, poi: Option<&Poi>, snapshot_id: SnapshotId) {
            let name = poi.map_or("-", |poi| poi.name.as_str());
            self.push(format!("state {} {name} {snapshot_id}", state.id()));
        }

        fn on_snapshot(&self, snapshot: &Snapshot) {
            self.push(format!("snapshot {}", snapshot.id));
        }
    }

    impl DebugListener for Recorder {
        fn set_field(&self, key: &str, value: &str) {
            self.push(format!("set {key}={value}"));
        }

        fn remove_field(&self, key: &str) {
            self.push(format!("remove {key}"));
        }

        fn clear_fields(&self) {
            self.push("clear".to_owned());
        }

        fn toast(&self, message: &str) {
            self.push(format!("toast {message}"));
        }
    }

    fn state(id: i32) -> Notification {
        Notification::StateChanged {
            state: RecognitionState::from_id(id).expect("known state"),
            poi: None,
            snapshot_id: SnapshotId::INVALID,
        }
    }

    #[rstest]
    #[tokio::test]
    async fn state_changes_arrive_in_publish_order() {
        let bus = EventBus::new();
        let recorder = Arc::new(Recorder::default());
        bus.set_listener(Some(recorder.clone()));

        for id in [0, 1, 2, 0, 5] {
            bus.publish(state(id));
        }
        bus.flush().await;

        assert_eq!(
            recorder.entries(),
            vec![
                "state 0 - -1",
                "state 1 - -1",
                "state 2 - -1",
                "state 0 - -1",
                "state 5 - -1",
            ]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn publish_from_other_threads_is_delivered() {
        let bus = Arc::new(EventBus::new());
        let recorder = Arc::new(Recorder::default());
        bus.set_listener(Some(recorder.clone()));

        let publisher = {
            let bus = Arc::clone(&bus);
            std::thread::spawn(move || {
                for _ in 0..10 {
                    bus.publish(state(1));
                }
            })
        };
        publisher.join().expect("publisher thread");
        bus.flush().await;

        assert_eq!(recorder.entries().len(), 10);
    }

    #[rstest]
    #[case(
        DiagnosticEvent::Field { key: "fps".to_owned(), value: "30".to_owned() },
        "set fps=30"
    )]
    #[case(
        DiagnosticEvent::Field { key: "fps".to_owned(), value: String::new() },
        "remove fps"
    )]
    #[case(DiagnosticEvent::RemoveField { key: "fps".to_owned() }, "remove fps")]
    #[case(DiagnosticEvent::ClearFields, "clear")]
    #[case(DiagnosticEvent::Toast { message: "camera lost".to_owned() }, "toast camera lost")]
    #[tokio::test]
    async fn diagnostics_map_to_debug_listener_calls(
        #[case] event: DiagnosticEvent,
        #[case] expected: &str,
    ) {
        let bus = EventBus::new();
        let recorder = Arc::new(Recorder::default());
        bus.set_debug_listener(Some(recorder.clone()));

        bus.publish(Notification::Diagnostic(event));
        bus.flush().await;

        assert_eq!(recorder.entries(), vec![expected.to_owned()]);
    }

    #[rstest]
    #[tokio::test]
    async fn replacing_listener_redirects_later_notifications() {
        let bus = EventBus::new();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        bus.set_listener(Some(first.clone()));
        bus.publish(state(0));
        bus.flush().await;

        bus.set_listener(Some(second.clone()));
        bus.publish(state(1));
        bus.flush().await;
        bus.set_listener(None);
        bus.publish(state(2));
        bus.shutdown().await;

        assert_eq!(first.entries(), vec!["state 0 - -1"]);
        assert_eq!(second.entries(), vec!["state 1 - -1"]);
    }

    #[rstest]
    #[tokio::test]
    async fn publish_after_shutdown_is_dropped() {
        let bus = EventBus::new();
        let recorder = Arc::new(Recorder::default());
        bus.set_listener(Some(recorder.clone()));
        bus.shutdown().await;

        bus.publish(state(1));
        bus.flush().await;

        assert!(recorder.entries().is_empty());
    }
}
