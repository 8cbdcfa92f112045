//! A typed client-side wrapper around a request/reply socket connected to
//! one RMI service (or, via `lookup`, to its owning manager first).

use crate::error::FrameworkError;
use crate::handshake;
use crate::rmi::STATUS_OK;
use crate::serialize::{pack, unpack, Wire};
use crate::socket::{build_socket, has_more, new_context};

pub struct ServiceProxy {
    socket: zmq::Socket,
    _ctx: zmq::Context,
}

impl ServiceProxy {
    /// Connect directly to a known service endpoint.
    pub fn connect(service_uri: &str) -> Result<Self, FrameworkError> {
        let ctx = new_context();
        let socket = build_socket(&ctx, zmq::REQ)?;
        socket.connect(service_uri)?;
        Ok(ServiceProxy { socket, _ctx: ctx })
    }

    /// Ask `manager_uri` for `service_name`'s endpoint and connect to it.
    pub fn lookup_and_connect(manager_uri: &str, service_name: &str) -> Result<Self, FrameworkError> {
        let uri = Self::lookup(manager_uri, service_name)?;
        Self::connect(&uri)
    }

    /// Resolve a service name to its endpoint URI through a manager, without
    /// connecting to the service itself.
    pub fn lookup(manager_uri: &str, service_name: &str) -> Result<String, FrameworkError> {
        let (found, message): (bool, String) =
            handshake::initiate(manager_uri, &service_name.to_string(), 4096)?;
        if found {
            Ok(message)
        } else {
            Err(FrameworkError::RemoteServiceException(message))
        }
    }

    /// Call a method by id, packing `args` and decoding the reply as `R`. A
    /// server-side ERROR status surfaces as `RemoteServiceException`.
    pub fn request<A: Wire, R: Wire>(&self, method_id: i32, args: &A) -> Result<R, FrameworkError> {
        let args_bytes = pack(args);
        if args_bytes.is_empty() {
            self.socket.send(&pack(&method_id), 0)?;
        } else {
            self.socket.send(&pack(&method_id), zmq::SNDMORE)?;
            self.socket.send(&args_bytes, 0)?;
        }

        let status_bytes = self.socket.recv_bytes(0)?;
        let status: i32 = unpack(&status_bytes)?;
        let payload = if has_more(&self.socket)? {
            self.socket.recv_bytes(0)?
        } else {
            Vec::new()
        };

        if status == STATUS_OK {
            Ok(unpack(&payload)?)
        } else {
            let message: String = unpack(&payload).unwrap_or_else(|_| "remote method failed".to_string());
            Err(FrameworkError::RemoteServiceException(message))
        }
    }

    /// A builder-style call, for call sites that read better as
    /// `proxy.call(SUM).invoke(&(5, 4))` than a bare `request`.
    pub fn call(&self, method_id: i32) -> MethodCall<'_> {
        MethodCall {
            proxy: self,
            method_id,
        }
    }
}

pub struct MethodCall<'a> {
    proxy: &'a ServiceProxy,
    method_id: i32,
}

impl<'a> MethodCall<'a> {
    pub fn invoke<A: Wire, R: Wire>(&self, args: &A) -> Result<R, FrameworkError> {
        self.proxy.request(self.method_id, args)
    }

    pub fn invoke_unit<R: Wire>(&self) -> Result<R, FrameworkError> {
        self.proxy.request(self.method_id, &())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rmi::{MethodRegistry, Service};
    use std::time::Duration;

    const SUM: i32 = 1;
    const FAIL_DIVIDE: i32 = 2;

    #[test]
    fn sum_round_trips_through_the_proxy() {
        let uri = "ipc:///tmp/rmi-comms-proxy-sum";
        let mut registry = MethodRegistry::new();
        registry.register(SUM, |(a, b): (i32, i32)| a + b);
        let mut service = Service::start(uri, registry, Duration::from_millis(20)).unwrap();

        let proxy = ServiceProxy::connect(uri).unwrap();
        let result: i32 = proxy.call(SUM).invoke(&(5i32, 4i32)).unwrap();
        assert_eq!(result, 9);

        service.stop(Duration::from_secs(2));
    }

    #[test]
    fn application_error_surfaces_as_remote_service_exception() {
        let uri = "ipc:///tmp/rmi-comms-proxy-error";
        let mut registry = MethodRegistry::new();
        registry.register_fallible(FAIL_DIVIDE, |(numerator, divisor): (i32, i32)| {
            if divisor == 0 {
                Err("division by zero".to_string())
            } else {
                Ok(numerator / divisor)
            }
        });
        let mut service = Service::start(uri, registry, Duration::from_millis(20)).unwrap();

        let proxy = ServiceProxy::connect(uri).unwrap();
        let err = proxy.call(FAIL_DIVIDE).invoke::<_, i32>(&(10i32, 0i32)).unwrap_err();
        match err {
            FrameworkError::RemoteServiceException(message) => {
                assert_eq!(message, "division by zero");
            }
            other => panic!("expected RemoteServiceException, got {other:?}"),
        }

        service.stop(Duration::from_secs(2));
    }
}
