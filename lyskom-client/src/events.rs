//! Handler registries for asynchronous messages and connection lifecycle.
//!
//! Handlers run synchronously on the reader task, in the order their bytes
//! arrived, and are never awaited.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use protocol_lyskom::Value;

use crate::Error;

pub(crate) type AsyncHandler = Box<dyn Fn(&Value) + Send + Sync>;
pub(crate) type ErrorHandler = Box<dyn Fn(&Error) + Send + Sync>;
pub(crate) type Hook = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub(crate) struct Events {
    async_handlers: Mutex<HashMap<&'static str, Vec<AsyncHandler>>>,
    error_handlers: Mutex<Vec<ErrorHandler>>,
    connect_handlers: Mutex<Vec<Hook>>,
    close_handlers: Mutex<Vec<Hook>>,
    close_emitted: AtomicBool,
}

impl Events {
    pub fn subscribe_async(&self, name: &'static str, handler: AsyncHandler) {
        lock(&self.async_handlers).entry(name).or_default().push(handler);
    }

    pub fn subscribe_error(&self, handler: ErrorHandler) {
        lock(&self.error_handlers).push(handler);
    }

    pub fn subscribe_connect(&self, handler: Hook) {
        lock(&self.connect_handlers).push(handler);
    }

    pub fn subscribe_close(&self, handler: Hook) {
        lock(&self.close_handlers).push(handler);
    }

    pub fn emit_async(&self, name: &str, value: &Value) {
        let handlers = lock(&self.async_handlers);
        if let Some(list) = handlers.get(name) {
            for handler in list {
                handler(value);
            }
        }
    }

    pub fn emit_error(&self, error: &Error) {
        for handler in lock(&self.error_handlers).iter() {
            handler(error);
        }
    }

    pub fn emit_connect(&self) {
        for handler in lock(&self.connect_handlers).iter() {
            handler();
        }
    }

    /// Run close handlers. Emitted at most once per connection.
    pub fn emit_close(&self) {
        if self.close_emitted.swap(true, Ordering::SeqCst) {
            return;
        }
        for handler in lock(&self.close_handlers).iter() {
            handler();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_close_emitted_once() {
        let events = Events::default();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        events.subscribe_close(Box::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        events.emit_close();
        events.emit_close();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_async_handlers_keyed_by_name() {
        let events = Events::default();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        events.subscribe_async("send-message", Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        events.emit_async("send-message", &Value::Empty);
        events.emit_async("logout", &Value::Empty);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
