//! pulse-transfer: the transfer protocol engine.
//!
//! A [`Sender`] and a [`Receiver`] each hold one connection to the relay and
//! exchange encrypted protocol messages over it. The relay is a blind
//! forwarder; ordering, integrity and cancellation are enforced here.

pub mod channel;
pub mod config;
pub mod error;
pub mod history;
pub mod link;
pub mod receiver;
pub mod sender;
pub mod stats;
pub mod transport;

pub use config::TransferConfig;
pub use error::{TransferError, TransportError};
pub use history::{HistoryEntry, HistorySink, NoHistory, TransferDirection};
pub use receiver::{Receiver, ReceiverState};
pub use sender::{Sender, SenderState};
pub use stats::{FileProgress, TransferStats};
pub use transport::{memory_pair, Connector, FrameTransport, WsConnector};
