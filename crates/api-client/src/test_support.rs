//! Scripted in-memory transport for pipeline and coordinator tests.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use transport::{HttpRequest, HttpResponse, Transport};

type Handler = dyn Fn(&HttpRequest) -> transport::Result<HttpResponse> + Send + Sync;

#[derive(Default)]
struct Route {
    queue: VecDeque<transport::Result<HttpResponse>>,
    handler: Option<Arc<Handler>>,
    gate: Option<Arc<Notify>>,
    calls: usize,
}

/// Routes are keyed by path suffix. Queued outcomes are served first, then
/// the route handler; unscripted calls get a 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one outcome for the next call to `route`.
    pub fn respond(&self, route: &str, outcome: transport::Result<HttpResponse>) {
        self.routes
            .lock()
            .unwrap()
            .entry(route.to_string())
            .or_default()
            .queue
            .push_back(outcome);
    }

    /// Answer every unqueued call to `route` from a function of the request.
    pub fn respond_with<F>(&self, route: &str, handler: F)
    where
        F: Fn(&HttpRequest) -> transport::Result<HttpResponse> + Send + Sync + 'static,
    {
        self.routes
            .lock()
            .unwrap()
            .entry(route.to_string())
            .or_default()
            .handler = Some(Arc::new(handler));
    }

    /// Hold responses for `route` until the returned `Notify` is signalled
    /// (one permit per held call).
    pub fn gate(&self, route: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.routes
            .lock()
            .unwrap()
            .entry(route.to_string())
            .or_default()
            .gate = Some(gate.clone());
        gate
    }

    pub fn calls_to(&self, route: &str) -> usize {
        self.routes
            .lock()
            .unwrap()
            .get(route)
            .map(|r| r.calls)
            .unwrap_or(0)
    }

    /// Every request seen, in dispatch order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests whose URL path ends with `route`.
    pub fn requests_to(&self, route: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| path_of(&r.url).ends_with(route))
            .collect()
    }

    pub async fn wait_for_calls(&self, route: &str, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.calls_to(route) < count {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("timed out waiting for scripted calls");
    }
}

fn path_of(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

impl Transport for ScriptedTransport {
    fn id(&self) -> &str {
        "scripted"
    }

    fn send(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = transport::Result<HttpResponse>> + Send + '_>> {
        let (outcome, gate) = {
            let mut routes = self.routes.lock().unwrap();
            let path = path_of(&request.url);
            let key = routes
                .keys()
                .filter(|k| path.ends_with(k.as_str()))
                .max_by_key(|k| k.len())
                .cloned();
            match key.and_then(|k| routes.get_mut(&k)) {
                Some(route) => {
                    route.calls += 1;
                    let outcome = route
                        .queue
                        .pop_front()
                        .or_else(|| route.handler.as_ref().map(|h| h(&request)))
                        .unwrap_or_else(|| Ok(HttpResponse::new(404, "no scripted response")));
                    (outcome, route.gate.clone())
                }
                None => (Ok(HttpResponse::new(404, "no scripted route")), None),
            }
        };
        self.requests.lock().unwrap().push(request);

        Box::pin(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            outcome
        })
    }
}
