//! # rmi-comms
//!
//! A remote-messaging framework built directly on ZeroMQ socket roles. It
//! layers a checked binary wire format, a thread-per-endpoint concurrency
//! model, and a Remote Method Invocation stack (method registry, service,
//! service manager, typed proxy) on top of REQ/REP, ROUTER/DEALER, PUB/SUB
//! and PUSH/PULL sockets.

pub mod async_client;
pub mod async_server;
pub mod cli;
pub mod error;
pub mod handshake;
pub mod logging;
pub mod pipeline;
pub mod queue;
pub mod rmi;
pub mod serialize;
pub mod socket;
pub(crate) mod stopper;
pub mod stream;
pub mod transport;

pub use async_client::{AsyncClient, Reply};
pub use async_server::{AsyncServer, Msg};
pub use error::{DecodeError, FrameworkError, MethodError, Result};
pub use pipeline::{Puller, Pusher, SyncClientServer};
pub use queue::SyncQueue;
pub use rmi::{MethodCall, MethodRegistry, Service, ServiceManager, ServiceProxy};
pub use serialize::{ByteArray, Wire};
pub use stream::{Publisher, Subscriber};
pub use transport::{RawPolicy, SizePrefixedPolicy, TransmissionPolicy};

/// The current version of the framework.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
