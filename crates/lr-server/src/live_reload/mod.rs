//! Live reload: file watching, debouncing and WebSocket broadcasting.

mod debouncer;
mod notifier;
mod watcher;
mod websocket;

pub(crate) use notifier::Notifier;
pub(crate) use watcher::ChangeWatcher;
pub(crate) use websocket::ws_handler;
