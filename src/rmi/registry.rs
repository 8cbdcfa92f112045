//! Type-erased method registry.
//!
//! Every registered method is collapsed onto a single
//! `Fn(&[u8]) -> Result<ByteArray, MethodError>` representation regardless of
//! its original argument/return arity — the closed tagged-variant
//! {POD-POD, POD-void, void-POD, void-void} family is realized here as one
//! erasure, with the generic `register*` helpers producing the right closure
//! shape at registration time.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::MethodError;
use crate::serialize::{pack, unpack, ByteArray, Wire};

type MethodHandler = Arc<dyn Fn(&[u8]) -> Result<ByteArray, MethodError> + Send + Sync>;

#[derive(Default)]
pub struct MethodRegistry {
    methods: HashMap<i32, MethodHandler>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        MethodRegistry {
            methods: HashMap::new(),
        }
    }

    /// Register `f`, decoding its argument tuple from the request payload and
    /// packing its return value into the reply payload. `Args` is typically a
    /// tuple (`(i32, i32)`, `()`, ...); `R` may also be `()`.
    pub fn register<F, Args, R>(&mut self, method_id: i32, f: F)
    where
        F: Fn(Args) -> R + Send + Sync + 'static,
        Args: Wire,
        R: Wire,
    {
        let handler: MethodHandler = Arc::new(move |bytes: &[u8]| {
            let args: Args = unpack(bytes)?;
            Ok(pack(&f(args)))
        });
        self.methods.insert(method_id, handler);
    }

    /// Register a fallible `f`; an `Err(message)` surfaces to the caller as a
    /// `RemoteServiceException(message)`.
    pub fn register_fallible<F, Args, R>(&mut self, method_id: i32, f: F)
    where
        F: Fn(Args) -> Result<R, String> + Send + Sync + 'static,
        Args: Wire,
        R: Wire,
    {
        let handler: MethodHandler = Arc::new(move |bytes: &[u8]| {
            let args: Args = unpack(bytes)?;
            match f(args) {
                Ok(result) => Ok(pack(&result)),
                Err(message) => Err(MethodError::Application(message)),
            }
        });
        self.methods.insert(method_id, handler);
    }

    pub fn invoke(&self, method_id: i32, bytes: &[u8]) -> Result<ByteArray, MethodError> {
        match self.methods.get(&method_id) {
            Some(handler) => handler(bytes),
            None => Err(MethodError::NotFound(method_id)),
        }
    }

    pub fn contains(&self, method_id: i32) -> bool {
        self.methods.contains_key(&method_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invokes_a_two_argument_method() {
        let mut registry = MethodRegistry::new();
        registry.register(1, |(a, b): (i32, i32)| a + b);
        let reply = registry.invoke(1, &pack(&(5i32, 4i32))).unwrap();
        assert_eq!(unpack::<i32>(&reply).unwrap(), 9);
    }

    #[test]
    fn unregistered_method_is_not_found() {
        let registry = MethodRegistry::new();
        let err = registry.invoke(99, &[]).unwrap_err();
        assert!(matches!(err, MethodError::NotFound(99)));
    }

    #[test]
    fn fallible_method_surfaces_application_error() {
        let mut registry = MethodRegistry::new();
        registry.register_fallible(2, |(divisor,): (i32,)| {
            if divisor == 0 {
                Err("division by zero".to_string())
            } else {
                Ok(100 / divisor)
            }
        });
        let err = registry.invoke(2, &pack(&(0i32,))).unwrap_err();
        assert!(matches!(err, MethodError::Application(ref m) if m == "division by zero"));
    }
}
