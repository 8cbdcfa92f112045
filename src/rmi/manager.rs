//! Directory mapping service names to endpoint URIs, lazily starting each
//! [`Service`] the first time it's looked up.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::FrameworkError;
use crate::rmi::registry::MethodRegistry;
use crate::rmi::service::Service;
use crate::serialize::{pack, unpack};
use crate::socket::{build_socket, new_context, poll_readable};
use crate::stopper::Stopper;

type RegistryBuilder = Arc<dyn Fn() -> MethodRegistry + Send + Sync>;

struct Entry {
    endpoint: String,
    builder: RegistryBuilder,
    service: Option<Service>,
}

/// Binds its own request/reply endpoint and answers `lookup(name)` calls with
/// `(found: bool, uri_or_message: String)`, starting the named service on
/// first lookup.
pub struct ServiceManager {
    directory: Arc<Mutex<HashMap<String, Entry>>>,
    stopper: Arc<Stopper>,
    thread: Option<JoinHandle<()>>,
}

impl ServiceManager {
    pub fn bind(uri: &str, poll_timeout: Duration) -> Result<Self, FrameworkError> {
        let ctx = new_context();
        let socket = build_socket(&ctx, zmq::ROUTER)?;
        socket.bind(uri)?;

        let directory: Arc<Mutex<HashMap<String, Entry>>> = Arc::new(Mutex::new(HashMap::new()));
        let stopper = Arc::new(Stopper::new());
        let thread = {
            let directory = directory.clone();
            let stopper = stopper.clone();
            thread::Builder::new()
                .name("rmi-service-manager".into())
                .spawn(move || Self::loop_body(socket, directory, stopper, poll_timeout))
                .expect("failed to spawn service manager thread")
        };

        Ok(ServiceManager {
            directory,
            stopper,
            thread: Some(thread),
        })
    }

    /// Declare a service by name; it is not started until the first lookup.
    pub fn register_service<F>(&self, name: impl Into<String>, endpoint: impl Into<String>, builder: F)
    where
        F: Fn() -> MethodRegistry + Send + Sync + 'static,
    {
        self.directory.lock().insert(
            name.into(),
            Entry {
                endpoint: endpoint.into(),
                builder: Arc::new(builder),
                service: None,
            },
        );
    }

    fn loop_body(
        socket: zmq::Socket,
        directory: Arc<Mutex<HashMap<String, Entry>>>,
        stopper: Arc<Stopper>,
        poll_timeout: Duration,
    ) {
        loop {
            if stopper.should_stop() {
                break;
            }
            if poll_readable(&socket, poll_timeout.as_millis() as i64).unwrap_or(false) {
                if let Err(err) = Self::handle_one(&socket, &directory) {
                    warn!(?err, "service manager failed to handle a lookup");
                }
            }
        }
        stopper.notify_done();
    }

    fn handle_one(
        socket: &zmq::Socket,
        directory: &Mutex<HashMap<String, Entry>>,
    ) -> Result<(), FrameworkError> {
        let peer_id = socket.recv_bytes(0)?;
        let _delimiter = socket.recv_bytes(0)?;
        let name_bytes = socket.recv_bytes(0)?;
        let name: String = unpack(&name_bytes)?;

        let reply: (bool, String) = {
            let mut dir = directory.lock();
            match dir.get_mut(&name) {
                None => (false, format!("No {name} available")),
                Some(entry) => {
                    if entry.service.is_none() {
                        info!(service = %name, endpoint = %entry.endpoint, "starting service on first lookup");
                        let registry = (entry.builder)();
                        let service =
                            Service::start(&entry.endpoint, registry, Duration::from_millis(20))?;
                        entry.service = Some(service);
                    }
                    (true, entry.endpoint.clone())
                }
            }
        };

        socket.send(&peer_id, zmq::SNDMORE)?;
        socket.send(&[] as &[u8], zmq::SNDMORE)?;
        socket.send(&pack(&reply), 0)?;
        Ok(())
    }

    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.stopper.request_stop();
        let manager_stopped = match self.thread.take() {
            Some(handle) => Stopper::join(handle, &self.stopper.done_rx(), timeout),
            None => true,
        };

        let mut all_ok = manager_stopped;
        for entry in self.directory.lock().values_mut() {
            if let Some(service) = entry.service.as_mut() {
                all_ok &= service.stop(timeout);
            }
        }
        all_ok
    }
}

impl Drop for ServiceManager {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop(Duration::from_secs(2));
        }
    }
}
