//! Getting requests to the model API and responses back.

//! The rendering side is single threaded: `Transport::send` returns
//! right away, and the reply continuation is later run on the
//! rendering thread. `HttpTransport` does the HTTP part on a worker
//! pool; only the request description and the response value cross
//! threads, continuations never do.

use std::{cell::{Cell, RefCell},
          collections::BTreeMap,
          sync::Arc,
          sync::mpsc::{channel, Receiver, Sender, RecvTimeoutError},
          time::{Duration, Instant}};

use anyhow::{Result, Context, anyhow};
use kstring::KString;
use scoped_thread_pool::{Pool, ThreadConfig};
use serde_json::{json, Value};

use crate::{warn, info};

pub type Params = Vec<(KString, KString)>;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// Absolute, or relative to the transport's base URL.
    pub url: KString,
    pub params: Params,
}

impl ApiRequest {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Continuation receiving the response envelope.
pub type Reply = Box<dyn FnOnce(Value)>;

pub trait Transport {
    /// Issue `request` and return without waiting for it. `reply` is
    /// run at most once, with the response envelope. If the request
    /// fails, `reply` is dropped without being run.
    fn send(&self, request: ApiRequest, reply: Reply);
}

/// What a response looks like to path resolution: the body under
/// `data`, which is what makes paths like `data.models` work.
pub fn envelope(status: u16, body: Value) -> Value {
    json!({ "data": body, "status": status })
}

/// `url` as is if it's absolute, otherwise appended to `base`.
pub fn resolve_url(base: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.into()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
    }
}


// ------------------------------------------------------------------
// HTTP

struct Completion {
    id: u64,
    result: Result<(u16, Value)>,
}

struct Pending {
    request: ApiRequest,
    deadline: Instant,
    reply: Reply,
}

pub struct HttpTransport {
    base_url: String,
    timeout: Duration,
    client: reqwest::blocking::Client,
    pool: Arc<Pool>,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    next_id: Cell<u64>,
    pending: RefCell<BTreeMap<u64, Pending>>,
}

fn fetch(
    client: &reqwest::blocking::Client,
    url: &str,
    params: &[(String, String)]
) -> Result<(u16, Value)> {
    let response = client.get(url).query(params).send()?;
    let status = response.status().as_u16();
    let body: Value = response.json().with_context(
        || anyhow!("response from {url:?} (status {status}) is not JSON"))?;
    Ok((status, body))
}

pub fn fetch_pool(workers: usize) -> Arc<Pool> {
    let cfg = ThreadConfig::new().prefix("awidget_fetch");
    Arc::new(Pool::with_thread_config(workers.max(1), cfg))
}

impl HttpTransport {
    /// `timeout` bounds every single request; a request that doesn't
    /// complete in time has its continuation dropped. The requests
    /// are run on `pool`, which may be shared between transports.
    pub fn new(base_url: &str, timeout: Duration, pool: Arc<Pool>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        let (tx, rx) = channel();
        Ok(HttpTransport {
            base_url: base_url.into(),
            timeout,
            client,
            pool,
            tx,
            rx,
            next_id: Cell::new(0),
            pending: RefCell::new(BTreeMap::new()),
        })
    }

    /// With a pool of its own.
    pub fn with_workers(base_url: &str, timeout: Duration, workers: usize) -> Result<Self> {
        Self::new(base_url, timeout, fetch_pool(workers))
    }

    pub fn in_flight(&self) -> usize {
        self.pending.borrow().len()
    }

    // Drop the continuations of all requests past their deadline.
    fn expire(&self, now: Instant) {
        let expired: Vec<u64> = self.pending.borrow().iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            if let Some(p) = self.pending.borrow_mut().remove(&id) {
                warn!("request to {:?} {:?} timed out after {:?}, dropping it",
                      p.request.url, p.request.params, self.timeout);
            }
        }
    }

    /// Run continuations on the current thread as responses arrive,
    /// until no request is in flight anymore. Continuations may issue
    /// further requests, those are waited for, too. Returns the
    /// number of continuations run.
    pub fn drain(&self) -> usize {
        let mut delivered = 0;
        loop {
            let next_deadline = self.pending.borrow().values().map(|p| p.deadline).min();
            let next_deadline = match next_deadline {
                Some(d) => d,
                None => break,
            };
            let wait = next_deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(wait) {
                Ok(Completion { id, result }) => {
                    let pending = self.pending.borrow_mut().remove(&id);
                    // `None` if it timed out already
                    if let Some(Pending { request, reply, .. }) = pending {
                        match result {
                            Ok((status, body)) => {
                                if ! (200..300).contains(&status) {
                                    warn!("status {status} from {:?} {:?}",
                                          request.url, request.params);
                                }
                                reply(envelope(status, body));
                                delivered += 1;
                            }
                            Err(e) => warn!("request to {:?} {:?} failed, dropping it: {e:#}",
                                            request.url, request.params)
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => self.expire(Instant::now()),
                Err(RecvTimeoutError::Disconnected) =>
                    unreachable!("we are holding a sender ourselves"),
            }
        }
        delivered
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: ApiRequest, reply: Reply) {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let url = resolve_url(&self.base_url, &request.url);
        let params: Vec<(String, String)> = request.params.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        info!("GET {url} {params:?}");
        self.pending.borrow_mut().insert(id, Pending {
            request,
            deadline: Instant::now() + self.timeout,
            reply,
        });
        let client = self.client.clone();
        let tx = self.tx.clone();
        self.pool.spawn(move || {
            let result = fetch(&client, &url, &params);
            // The receiver is gone if the transport was dropped
            // meanwhile; nobody's waiting then.
            let _ = tx.send(Completion { id, result });
        });
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        if Arc::strong_count(&self.pool) == 1 {
            self.pool.shutdown();
        }
    }
}


// ------------------------------------------------------------------
// Scripted responses, for tests



#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_resolve_url() {
        assert_eq!(resolve_url("http://127.0.0.1:3000", "/api/"),
                   "http://127.0.0.1:3000/api/");
        assert_eq!(resolve_url("http://127.0.0.1:3000/", "api/"),
                   "http://127.0.0.1:3000/api/");
        assert_eq!(resolve_url("http://a", "https://b/api/"), "https://b/api/");
    }

    #[test]
    fn t_envelope() {
        assert_eq!(envelope(404, json!({"models": []})),
                   json!({"data": {"models": []}, "status": 404}));
    }

    #[test]
    fn t_request_param() {
        let r = ApiRequest {
            url: KString::from_static("/api/"),
            params: vec![(KString::from_static("model"), KString::from_static("widget"))],
        };
        assert_eq!(r.param("model"), Some("widget"));
        assert_eq!(r.param("filter"), None);
    }

    #[test]
    fn t_drain_without_requests() -> Result<()> {
        let t = HttpTransport::with_workers("http://127.0.0.1:9", Duration::from_millis(100), 1)?;
        assert_eq!(t.drain(), 0);
        assert_eq!(t.in_flight(), 0);
        Ok(())
    }

    #[test]
    fn t_failed_request_drops_reply() -> Result<()> {
        // Port 9 (discard) is not expected to serve HTTP on loopback.
        let t = HttpTransport::with_workers("http://127.0.0.1:9", Duration::from_millis(500), 1)?;
        let ran = std::rc::Rc::new(Cell::new(false));
        let ran2 = ran.clone();
        t.send(ApiRequest { url: KString::from_static("/api/"), params: vec![] },
               Box::new(move |_| ran2.set(true)));
        assert_eq!(t.in_flight(), 1);
        assert_eq!(t.drain(), 0);
        assert!(!ran.get());
        assert_eq!(t.in_flight(), 0);
        Ok(())
    }
}
