//! Remote Method Invocation: a [`registry::MethodRegistry`] of integer-keyed
//! methods exposed by a [`service::Service`], discoverable through a
//! [`manager::ServiceManager`] directory and called through a
//! [`proxy::ServiceProxy`].

pub mod manager;
pub mod proxy;
pub mod registry;
pub mod service;

pub use manager::ServiceManager;
pub use proxy::{MethodCall, ServiceProxy};
pub use registry::MethodRegistry;
pub use service::Service;

/// Status byte sent ahead of every RMI reply payload.
pub(crate) const STATUS_OK: i32 = 0;
pub(crate) const STATUS_ERROR: i32 = -1;
