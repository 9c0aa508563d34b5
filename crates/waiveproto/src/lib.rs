//! waiveproto - message types and the correlation bridge between the HTTP
//! gateway and the generation worker.
//!
//! Many request handlers share one [`Bridge`]. Exactly one worker loop owns the
//! matching [`WorkerPort`]. Every submission is tagged with a fresh request id
//! and the reply travels back under the same id, so a handler always receives
//! the reply to its own work item no matter how many are in flight.
//!
//! ```text
//!  handlers ──submit──▶ reactor ──inbound (FIFO)──▶ worker loop
//!     ▲                    │                            │
//!     └──── oneshot ◀──────┴──── outbound (tagged) ◀────┘
//! ```
//!
//! Usage:
//! ```ignore
//! let (bridge, port) = waiveproto::bridge::channel(BridgeOptions::default());
//! let worker = waiveproto::spawn_worker(MyWorker::new(), port, shutdown.clone());
//! let reply = bridge.request(WorkItem::new("ping", "abc", Payload::new())?).await?;
//! ```

pub mod bridge;
pub mod item;
pub mod worker;

pub use bridge::{Bridge, BridgeError, BridgeOptions, Tagged, Ticket, WorkerPort};
pub use item::{Payload, ProtoError, ReplyBody, ResultItem, WorkItem};
pub use worker::{run_worker, spawn_worker, Worker};
