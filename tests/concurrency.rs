//! Unregistering while requests are in flight.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use axum::http::Method;
use futures_util::future::BoxFuture;
use tokio::sync::Semaphore;

use alias_dispatch::http::{Request, Response};
use alias_dispatch::lifecycle::drain_table;
use alias_dispatch::registration::HandlerConfig;
use alias_dispatch::{DispatchError, DispatchTable, Endpoint, HandlerError, RegistrationError};

mod common;
use common::{EventLog, MemoryContext, RecordingEndpoint, RecordingMiddleware};

/// Holds every request until the test hands out a permit.
struct Gated {
    gate: Semaphore,
    started: AtomicUsize,
    finished: AtomicUsize,
    destroyed: AtomicUsize,
    used_after_destroy: AtomicUsize,
}

impl Gated {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
            used_after_destroy: AtomicUsize::new(0),
        })
    }

    fn check_alive(&self) {
        if self.destroyed.load(Ordering::SeqCst) > 0 {
            self.used_after_destroy.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Endpoint for Gated {
    fn service<'a>(&'a self, _: &'a mut Request, response: &'a mut Response) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            self.check_alive();
            self.started.fetch_add(1, Ordering::SeqCst);
            self.gate.acquire().await?.forget();
            self.check_alive();
            response.write(b"done");
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn destroy(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

async fn wait_for(what: &str, condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

fn spawn_request(table: &DispatchTable, path: &'static str) -> tokio::task::JoinHandle<Result<Vec<u8>, DispatchError>> {
    let table = table.clone();
    tokio::spawn(async move {
        let mut request = Request::new(Method::GET, path);
        let mut response = Response::new();
        table.dispatch(&mut request, &mut response).await?;
        Ok(response.body().to_vec())
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_destroy_deferred_until_last_request() {
    const N: usize = 8;
    let table = DispatchTable::new();
    let endpoint = Gated::new();
    table
        .register("/a", endpoint.clone(), MemoryContext::new().as_http_context(), Default::default())
        .unwrap();
    let registration = table.get("/a").unwrap();

    let requests: Vec<_> = (0..N).map(|_| spawn_request(&table, "/a/work")).collect();
    wait_for("all requests to start", || endpoint.started.load(Ordering::SeqCst) == N).await;
    assert_eq!(registration.reference_count(), N);

    table.unregister("/a").unwrap();
    assert!(table.lookup("/a/work").is_none());
    assert!(registration.is_removed());
    assert!(!registration.is_destroyed());
    assert_eq!(endpoint.destroyed.load(Ordering::SeqCst), 0);

    for finished in 1..N {
        endpoint.gate.add_permits(1);
        wait_for("a request to finish", || endpoint.finished.load(Ordering::SeqCst) == finished).await;
        assert_eq!(endpoint.destroyed.load(Ordering::SeqCst), 0, "destroyed with requests in flight");
    }
    endpoint.gate.add_permits(1);

    let mut completed = 0;
    for request in requests {
        assert_eq!(request.await.unwrap().unwrap(), b"done");
        completed += 1;
    }
    assert_eq!(completed, N);

    assert_eq!(endpoint.destroyed.load(Ordering::SeqCst), 1);
    assert!(registration.is_destroyed());
    assert_eq!(registration.reference_count(), 0);
    assert_eq!(endpoint.used_after_destroy.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unregister_and_wait_blocks_until_drained() {
    let table = DispatchTable::new();
    let endpoint = Gated::new();
    table
        .register("/a", endpoint.clone(), MemoryContext::new().as_http_context(), Default::default())
        .unwrap();

    let request = spawn_request(&table, "/a");
    wait_for("the request to start", || endpoint.started.load(Ordering::SeqCst) == 1).await;

    let waiter = {
        let table = table.clone();
        tokio::spawn(async move { table.unregister_and_wait("/a").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());
    assert!(table.lookup("/a").is_none());

    endpoint.gate.add_permits(1);
    tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("unregister_and_wait did not return")
        .unwrap()
        .unwrap();
    assert_eq!(endpoint.destroyed.load(Ordering::SeqCst), 1);
    request.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_churn_destroys_each_registration_once() {
    const ROUNDS: usize = 50;
    let table = DispatchTable::new();
    let context = MemoryContext::new();
    let log = EventLog::default();

    let traffic = {
        let table = table.clone();
        tokio::spawn(async move {
            let mut served = 0usize;
            for _ in 0..ROUNDS * 20 {
                let mut request = Request::new(Method::GET, "/churn/x");
                let mut response = Response::new();
                match table.dispatch(&mut request, &mut response).await {
                    Ok(()) => served += 1,
                    Err(DispatchError::NotFound(_)) => {}
                    Err(e) => panic!("unexpected error: {e}"),
                }
                tokio::task::yield_now().await;
            }
            served
        })
    };

    let mut endpoints = Vec::new();
    for round in 0..ROUNDS {
        let endpoint = RecordingEndpoint::new(&format!("e{round}"), &log);
        table
            .register("/churn", endpoint.clone(), context.as_http_context(), Default::default())
            .unwrap();
        tokio::task::yield_now().await;
        table.unregister("/churn").unwrap();
        endpoints.push(endpoint);
    }

    traffic.await.unwrap();
    for endpoint in &endpoints {
        assert_eq!(endpoint.destroy_count(), 1, "{}", endpoint.name);
    }
}

/// Parks its first `init` until the test releases it.
struct SlowInit {
    entered: Barrier,
    release: Barrier,
    parked: AtomicBool,
    destroyed: AtomicUsize,
}

impl SlowInit {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Barrier::new(2),
            release: Barrier::new(2),
            parked: AtomicBool::new(false),
            destroyed: AtomicUsize::new(0),
        })
    }
}

impl Endpoint for SlowInit {
    fn init(&self, _: &HandlerConfig) -> Result<(), HandlerError> {
        if !self.parked.swap(true, Ordering::SeqCst) {
            self.entered.wait();
            self.release.wait();
        }
        Ok(())
    }

    fn service<'a>(&'a self, _: &'a mut Request, response: &'a mut Response) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            response.write(b"slow");
            Ok(())
        })
    }

    fn destroy(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_shutdown_during_init_discards_registration() {
    let table = DispatchTable::new();
    let context = MemoryContext::new();
    let endpoint = SlowInit::new();

    let registering = {
        let table = table.clone();
        let endpoint = endpoint.clone();
        let context = context.as_http_context();
        std::thread::spawn(move || table.register("/a", endpoint, context, Default::default()))
    };
    endpoint.entered.wait();

    assert!(table.shutdown().is_empty());
    // the in-flight registration still owns the handler
    let err = table
        .register("/b", endpoint.clone(), context.as_http_context(), Default::default())
        .unwrap_err();
    assert!(matches!(err, RegistrationError::HandlerAlreadyBound(ref a) if a == "/a"));

    endpoint.release.wait();
    let result = registering.join().unwrap();
    assert!(matches!(result, Err(RegistrationError::ShutDown(ref a)) if a == "/a"));
    assert!(table.is_empty());
    assert!(table.lookup("/a").is_none());
    assert_eq!(endpoint.destroyed.load(Ordering::SeqCst), 1);

    // the handler is free again once the discarded registration is gone
    table
        .register("/c", endpoint.clone(), context.as_http_context(), Default::default())
        .unwrap();
    assert_eq!(table.aliases(), vec!["/c"]);
}

#[tokio::test]
async fn test_drain_waits_for_middleware() {
    let table = DispatchTable::new();
    let context = MemoryContext::new();
    let log = EventLog::default();
    let endpoint = RecordingEndpoint::new("e", &log);
    table
        .register("/a", endpoint.clone(), context.as_http_context(), Default::default())
        .unwrap();
    table
        .register_middleware("/", RecordingMiddleware::new("m", &log), context.as_http_context(), Default::default())
        .unwrap();

    let in_flight = table.lookup("/a/x").unwrap();
    assert_eq!(in_flight.middleware_aliases(), vec!["/"]);
    assert_eq!(drain_table(&table, Duration::from_millis(20)).await, 2);
    assert_eq!(endpoint.destroy_count(), 0);

    drop(in_flight);
    assert_eq!(endpoint.destroy_count(), 1);
    assert!(log.events().contains(&"destroy:m".to_string()));
}
