//! Scripted transport for unit tests.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::Semaphore;

use super::transport::{ApiRequest, ApiResponse, Transport, TransportError};

type Handler = dyn Fn(&ApiRequest, usize) -> Result<ApiResponse, TransportError> + Send + Sync;

/// Records every request and answers from a closure.
///
/// The closure receives the request and the zero-based index of the call.
/// Paths can be held so that requests to them wait until released.
pub struct FakeTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<ApiRequest>>,
    holds: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl FakeTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&ApiRequest, usize) -> Result<ApiResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            holds: Mutex::new(HashMap::new()),
        }
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Paths of every request received so far.
    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }

    /// Number of requests sent to a path.
    pub fn count(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }

    /// Make requests to `path` wait until [`Self::release`] is called.
    pub fn hold(&self, path: &str) {
        self.holds
            .lock()
            .unwrap()
            .insert(path.to_string(), Arc::new(Semaphore::new(0)));
    }

    /// Let one held request to `path` through.
    pub fn release(&self, path: &str) {
        if let Some(gate) = self.holds.lock().unwrap().get(path) {
            gate.add_permits(1);
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len() - 1
        };

        let gate = self.holds.lock().unwrap().get(&request.path).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        (self.handler)(request, index)
    }
}

/// `200 OK` with a JSON body.
pub fn ok_json(body: &serde_json::Value) -> Result<ApiResponse, TransportError> {
    Ok(ApiResponse::json(StatusCode::OK, body))
}

/// An empty response with the given status.
pub fn status(status: StatusCode) -> Result<ApiResponse, TransportError> {
    Ok(ApiResponse::new(status, ""))
}

/// A profile body for `id`.
pub fn identity_json(id: i64, username: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "username": username,
        "email": format!("{username}@example.com"),
        "phone": null,
        "address": null,
    })
}

/// A cart body with one line of `quantity` units per entry.
pub fn cart_json(quantities: &[u32]) -> serde_json::Value {
    let items: Vec<_> = quantities
        .iter()
        .enumerate()
        .map(|(i, quantity)| {
            serde_json::json!({
                "id": i + 1,
                "product": {
                    "id": 40 + i,
                    "name": format!("Product {i}"),
                    "slug": format!("product-{i}"),
                    "price": "10.00",
                    "stock": 50,
                    "in_stock": true,
                },
                "quantity": quantity,
                "subtotal": format!("{}.00", quantity * 10),
            })
        })
        .collect();
    let total: u32 = quantities.iter().map(|q| q * 10).sum();
    serde_json::json!({ "id": 1, "cart_items": items, "total": total })
}

/// A product body.
pub fn product_json(id: i64, slug: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": slug.replace('-', " "),
        "slug": slug,
        "description": "",
        "price": "12.50",
        "stock": 4,
        "in_stock": true,
        "is_active": true,
    })
}

/// Poll `condition` until it holds, panicking after two seconds.
pub async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("condition not met within two seconds");
}
