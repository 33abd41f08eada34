//! Actor types a slave node can host

use async_trait::async_trait;
use bytes::Bytes;
use remote_actors::{ActorTypeRegistry, RemoteActor, ReplySink};
use tracing::{debug, warn};

pub const ECHO: &str = "Echo";
pub const COUNTER: &str = "Counter";

/// Register every built-in actor type
pub fn register_builtin_types(types: &ActorTypeRegistry) {
    types.register(ECHO, || Echo);
    types.register(COUNTER, Counter::default);
}

/// Replies with whatever it receives
pub struct Echo;

#[async_trait]
impl RemoteActor for Echo {
    async fn receive(&mut self, behavior: &str, payload: Bytes, replies: &ReplySink) {
        if let Err(e) = replies.reply(payload) {
            warn!(actor = %replies.uuid(), behavior, error = %e, "Echo reply not sent");
        }
    }
}

/// Running total
///
/// Behaviors:
/// - `increment`: add the payload read as a big-endian unsigned integer of up
///   to 8 bytes; an empty payload adds 1
/// - `get`: reply with the total as 8 big-endian bytes
/// - `reset`: back to zero
#[derive(Debug, Default)]
pub struct Counter {
    total: u64,
}

impl Counter {
    fn amount(payload: &[u8]) -> Option<u64> {
        match payload.len() {
            0 => Some(1),
            1..=8 => Some(payload.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))),
            _ => None,
        }
    }
}

#[async_trait]
impl RemoteActor for Counter {
    async fn receive(&mut self, behavior: &str, payload: Bytes, replies: &ReplySink) {
        match behavior {
            "increment" => match Self::amount(&payload) {
                Some(amount) => self.total = self.total.wrapping_add(amount),
                None => warn!(
                    actor = %replies.uuid(),
                    len = payload.len(),
                    "Increment wider than 8 bytes ignored"
                ),
            },
            "get" => {
                let total = Bytes::copy_from_slice(&self.total.to_be_bytes());
                if let Err(e) = replies.reply(total) {
                    warn!(actor = %replies.uuid(), error = %e, "Counter reply not sent");
                }
            }
            "reset" => self.total = 0,
            other => warn!(actor = %replies.uuid(), behavior = other, "Unknown counter behavior"),
        }
    }

    async fn on_stop(&mut self) {
        debug!(total = self.total, "Counter stopped");
    }
}
