//! Test doubles shared by the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use certdock_cert::{
    Certificate, GenerateError, Generator, SelfSignedGenerator, Store, StoreError,
};

/// Store that records every call and can be told to fail
#[derive(Default)]
pub struct MockStore {
    certs: Mutex<HashMap<String, Certificate>>,
    get_calls: Mutex<Vec<String>>,
    set_calls: Mutex<Vec<String>>,
    get_error: Option<String>,
    set_error: Option<String>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_get(message: &str) -> Self {
        Self {
            get_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn failing_set(message: &str) -> Self {
        Self {
            set_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Seed an entry without recording a `set` call
    pub fn insert(&self, host: &str, cert: &Certificate) {
        self.certs
            .lock()
            .unwrap()
            .insert(host.to_string(), cert.clone());
    }

    pub fn entry(&self, host: &str) -> Option<Certificate> {
        self.certs.lock().unwrap().get(host).cloned()
    }

    pub fn hosts(&self) -> Vec<String> {
        self.certs.lock().unwrap().keys().cloned().collect()
    }

    pub fn get_calls(&self) -> Vec<String> {
        self.get_calls.lock().unwrap().clone()
    }

    pub fn set_calls(&self) -> Vec<String> {
        self.set_calls.lock().unwrap().clone()
    }
}

impl Store for MockStore {
    fn get(&self, host: &str) -> Result<Option<Certificate>, StoreError> {
        self.get_calls.lock().unwrap().push(host.to_string());
        if let Some(message) = &self.get_error {
            return Err(StoreError::backend(message.clone()));
        }
        Ok(self.entry(host))
    }

    fn set(&self, host: &str, cert: &Certificate) -> Result<(), StoreError> {
        self.set_calls.lock().unwrap().push(host.to_string());
        if let Some(message) = &self.set_error {
            return Err(StoreError::backend(message.clone()));
        }
        self.insert(host, cert);
        Ok(())
    }
}

/// Self-signed generator that counts invocations
#[derive(Default)]
pub struct CountingGenerator {
    inner: SelfSignedGenerator,
    calls: AtomicUsize,
}

impl CountingGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Generator for CountingGenerator {
    fn generate(&self, host: &str) -> Result<Certificate, GenerateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.generate(host)
    }
}

pub fn generate(host: &str) -> Certificate {
    SelfSignedGenerator::new()
        .generate(host)
        .expect("Failed to generate test certificate")
}
