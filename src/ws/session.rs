use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::{Mutex as AsyncMutex, Notify, mpsc};
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

use crate::bus::{Bus, BusSubscription};
use crate::config::Config;
use crate::db::Db;
use crate::error::AppError;
use crate::models::{self, Message};
use crate::ws::dispatcher;
use crate::ws::frame::{InboundFrame, OutboundFrame};

/// Shared, cloneable handle to a live session's mutable state. The dispatcher (run
/// synchronously inside the read loop) uses this to check and extend the
/// subscription set; the write loop uses the same state to apply lifecycle rules.
#[derive(Clone)]
pub struct SessionHandle {
    pub user_id: String,
    subscriptions: Arc<std::sync::Mutex<HashSet<String>>>,
    reconnect_tx: mpsc::Sender<()>,
    torn_down: Arc<AtomicBool>,
}

impl SessionHandle {
    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.subscriptions.lock().unwrap().contains(channel)
    }

    /// Adds a channel to the subscription set and requests a reconnect of the bus
    /// handle. Used by the dispatcher for `CreateRoom`, and by the write loop for
    /// the `AddUser`/`RemoveUser`/`DeleteRoom` lifecycle rules.
    pub async fn add_channel(&self, channel: String) {
        self.subscriptions.lock().unwrap().insert(channel);
        let _ = self.reconnect_tx.send(()).await;
    }

    pub async fn remove_channel(&self, channel: &str) {
        self.subscriptions.lock().unwrap().remove(channel);
        let _ = self.reconnect_tx.send(()).await;
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }
}

struct Shared {
    db: Arc<Db>,
    bus: Arc<dyn Bus>,
    config: Arc<Config>,
}

/// A listener owns exactly one bus subscription for as long as it is the active
/// listener. Reconnect supersedes it by notifying `stop`; the listener then closes
/// its own subscription and exits, which is how "only one listener is active per
/// session at any moment" is enforced without holding a lock across a blocking recv.
struct ListenerSlot {
    stop: Arc<Notify>,
}

/// Runs one session end to end: admits the bus subscription, then drives the read,
/// write, and listener loops until any of them decides the session is over.
pub async fn run(
    socket: WebSocket,
    user_id: String,
    initial_channels: HashSet<String>,
    db: Arc<Db>,
    bus: Arc<dyn Bus>,
    config: Arc<Config>,
) {
    let shared = Arc::new(Shared { db, bus, config });

    let channel_vec: Vec<String> = initial_channels.iter().cloned().collect();
    let mut subscription = match shared.bus.subscribe(&channel_vec).await {
        Ok(s) => s,
        Err(e) => {
            warn!(user_id, error = %e, "initial bus subscribe failed, admission aborted");
            return;
        }
    };
    if let Err(e) = subscription.ping().await {
        warn!(user_id, error = %e, "bus liveness ping failed at admission");
        return;
    }

    let _ = shared.db.set_user_online(&user_id, true);
    info!(user_id, channels = channel_vec.len(), "session admitted");

    let (in_tx, in_rx) = mpsc::channel::<Message>(256);
    let (reconnect_tx, reconnect_rx) = mpsc::channel::<()>(8);
    let (err_tx, err_rx) = mpsc::channel::<AppError>(32);
    let teardown = Arc::new(Notify::new());
    let torn_down = Arc::new(AtomicBool::new(false));

    let handle = SessionHandle {
        user_id: user_id.clone(),
        subscriptions: Arc::new(std::sync::Mutex::new(initial_channels)),
        reconnect_tx,
        torn_down: torn_down.clone(),
    };

    let initial_stop = Arc::new(Notify::new());
    let current_listener: Arc<AsyncMutex<ListenerSlot>> = Arc::new(AsyncMutex::new(ListenerSlot {
        stop: initial_stop.clone(),
    }));
    spawn_listener(subscription, initial_stop, teardown.clone(), in_tx.clone());

    let (ws_sink, ws_stream) = socket.split();

    let write_handle = handle.clone();
    let write_shared = shared.clone();
    let write_current_listener = current_listener.clone();
    let write_in_tx = in_tx.clone();
    let write_teardown = teardown.clone();
    let write_task = tokio::spawn(async move {
        write_loop(
            ws_sink,
            in_rx,
            reconnect_rx,
            err_rx,
            write_handle,
            write_shared,
            write_current_listener,
            write_in_tx,
            write_teardown,
        )
        .await;
    });

    read_loop(ws_stream, handle.clone(), shared.clone(), err_tx).await;

    disconnect(&handle, &shared, &current_listener, &teardown).await;
    write_task.abort();
}

/// The third cooperative task: reads from the bus subscription it owns, decodes the
/// payload into a Message, and enqueues it on the in-queue. Exits when the bus
/// channel closes, the subscription errors, teardown fires, or `stop` fires because
/// a reconnect superseded it — in every exit path it closes its own subscription.
fn spawn_listener(
    mut subscription: Box<dyn BusSubscription>,
    stop: Arc<Notify>,
    teardown: Arc<Notify>,
    in_tx: mpsc::Sender<Message>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = stop.notified() => {
                    debug!("listener superseded by reconnect, closing");
                    subscription.close().await;
                    return;
                }
                _ = teardown.notified() => {
                    debug!("teardown fired, listener closing");
                    subscription.close().await;
                    return;
                }
                next = subscription.recv() => {
                    match next {
                        Some(Ok((_channel, payload))) => match serde_json::from_slice::<Message>(&payload) {
                            Ok(msg) => {
                                if in_tx.send(msg).await.is_err() {
                                    subscription.close().await;
                                    return;
                                }
                            }
                            Err(e) => warn!(error = %e, "failed to decode bus payload"),
                        },
                        Some(Err(e)) => {
                            warn!(error = %e, "bus subscription error, listener exiting");
                            subscription.close().await;
                            return;
                        }
                        None => {
                            debug!("bus channel closed, listener exiting");
                            return;
                        }
                    }
                }
            }
        }
    });
}

async fn read_loop(
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    handle: SessionHandle,
    shared: Arc<Shared>,
    err_tx: mpsc::Sender<AppError>,
) {
    let services = dispatcher::Services {
        db: shared.db.clone(),
        bus: shared.bus.clone(),
        config: shared.config.clone(),
    };

    loop {
        let next = timeout(shared.config.pong_wait(), ws_stream.next()).await;
        let frame = match next {
            Ok(Some(Ok(WsMessage::Text(text)))) => text,
            Ok(Some(Ok(WsMessage::Pong(_)))) => continue,
            Ok(Some(Ok(WsMessage::Close(_)))) => {
                debug!(user_id = %handle.user_id, "peer closed normally");
                return;
            }
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => {
                warn!(user_id = %handle.user_id, error = %e, "read error, tearing down");
                return;
            }
            Ok(None) => {
                debug!(user_id = %handle.user_id, "socket stream ended");
                return;
            }
            Err(_) => {
                warn!(user_id = %handle.user_id, "pong timeout, tearing down");
                return;
            }
        };

        let inbound: InboundFrame = match serde_json::from_str(&frame) {
            Ok(f) => f,
            Err(e) => {
                debug!(error = %e, "malformed inbound frame");
                let _ = err_tx.send(AppError::Validation(e.to_string())).await;
                continue;
            }
        };
        if let Err(e) = inbound.validate() {
            debug!(error = %e, "invalid inbound frame");
            let _ = err_tx.send(e).await;
            continue;
        }

        if let Err(e) = dispatcher::dispatch(inbound, &handle, &services).await {
            debug!(error = %e, "dispatch error");
            if e.is_session_fatal() {
                return;
            }
            let _ = err_tx.send(e).await;
        }
    }
}

/// Writes one outbound frame with a 10s timeout, closing the socket on any failure.
/// Returns `false` when the caller should stop the write loop.
async fn send_frame(
    ws_sink: &mut futures::stream::SplitSink<WebSocket, WsMessage>,
    frame: OutboundFrame,
) -> bool {
    let send = timeout(
        std::time::Duration::from_secs(10),
        ws_sink.send(WsMessage::Text(frame.to_json())),
    );
    match send.await {
        Ok(Ok(())) => true,
        _ => {
            let _ = ws_sink.send(WsMessage::Close(None)).await;
            false
        }
    }
}

async fn write_loop(
    mut ws_sink: futures::stream::SplitSink<WebSocket, WsMessage>,
    mut in_rx: mpsc::Receiver<Message>,
    mut reconnect_rx: mpsc::Receiver<()>,
    mut err_rx: mpsc::Receiver<AppError>,
    handle: SessionHandle,
    shared: Arc<Shared>,
    current_listener: Arc<AsyncMutex<ListenerSlot>>,
    in_tx: mpsc::Sender<Message>,
    teardown: Arc<Notify>,
) {
    let mut ticker = tokio::time::interval(shared.config.ping_period());
    ticker.tick().await; // first tick fires immediately; consume it

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if ws_sink.send(WsMessage::Ping(Vec::new())).await.is_err() {
                    let _ = ws_sink.send(WsMessage::Close(None)).await;
                    return;
                }
            }
            Some(()) = reconnect_rx.recv() => {
                reconnect(&handle, &shared, &current_listener, &in_tx, &teardown).await;
            }
            Some(err) = err_rx.recv() => {
                if !send_frame(&mut ws_sink, err.to_error_frame()).await {
                    return;
                }
            }
            msg = in_rx.recv() => {
                let Some(msg) = msg else { return; };
                apply_lifecycle_rules(&msg, &handle, &shared, &current_listener, &in_tx, &teardown).await;
                if !send_frame(&mut ws_sink, OutboundFrame::Message(msg)).await {
                    return;
                }
            }
        }
    }
}

/// The three lifecycle rules the write loop applies before forwarding a message.
/// Mutates the subscription set directly (bypassing `SessionHandle::add_channel`/
/// `remove_channel`, which additionally queue a reconnect signal for callers with no
/// other way to reach the write loop) since this runs inside the write loop already
/// and reconnects once, explicitly, below.
async fn apply_lifecycle_rules(
    msg: &Message,
    handle: &SessionHandle,
    shared: &Arc<Shared>,
    current_listener: &Arc<AsyncMutex<ListenerSlot>>,
    in_tx: &mpsc::Sender<Message>,
    teardown: &Arc<Notify>,
) {
    let changed = match msg.command.as_str() {
        models::COMMAND_ADD_USER if msg.target_id == handle.user_id => {
            handle.subscriptions.lock().unwrap().insert(msg.room_id.clone());
            true
        }
        models::COMMAND_REMOVE_USER if msg.target_id == handle.user_id => {
            handle.subscriptions.lock().unwrap().remove(&msg.room_id);
            true
        }
        models::COMMAND_DELETE_ROOM => {
            handle.subscriptions.lock().unwrap().remove(&msg.room_id);
            true
        }
        _ => false,
    };
    if changed {
        reconnect(handle, shared, current_listener, in_tx, teardown).await;
    }
}

/// Atomically, under `current_listener`'s lock: open a new subscription for the
/// current set, supersede (and thereby close) the previous listener, and start a
/// fresh one. The in-queue is untouched — only the upstream listener is replaced, so
/// no already-buffered message is lost.
async fn reconnect(
    handle: &SessionHandle,
    shared: &Arc<Shared>,
    current_listener: &Arc<AsyncMutex<ListenerSlot>>,
    in_tx: &mpsc::Sender<Message>,
    teardown: &Arc<Notify>,
) {
    if handle.is_torn_down() {
        return;
    }
    let channels: Vec<String> = handle.subscriptions.lock().unwrap().iter().cloned().collect();
    let new_subscription = match shared.bus.subscribe(&channels).await {
        Ok(s) => s,
        Err(e) => {
            warn!(user_id = %handle.user_id, error = %e, "reconnect subscribe failed");
            return;
        }
    };

    let mut slot = current_listener.lock().await;
    slot.stop.notify_waiters();
    let new_stop = Arc::new(Notify::new());
    slot.stop = new_stop.clone();
    spawn_listener(new_subscription, new_stop, teardown.clone(), in_tx.clone());
    drop(slot);
    debug!(user_id = %handle.user_id, "bus subscription reconnected");
}

/// Fires teardown (which the active listener observes and uses to close its own bus
/// subscription) and clears the user's online flag. Idempotent: a second call is a
/// no-op.
async fn disconnect(
    handle: &SessionHandle,
    shared: &Arc<Shared>,
    current_listener: &Arc<AsyncMutex<ListenerSlot>>,
    teardown: &Arc<Notify>,
) {
    if handle.torn_down.swap(true, Ordering::SeqCst) {
        return;
    }
    let _ = current_listener.lock().await;
    teardown.notify_waiters();
    let _ = shared.db.set_user_online(&handle.user_id, false);
    info!(user_id = %handle.user_id, "session disconnected");
}
