//! The HTTP side of the backend: the `/api/` model endpoint, and
//! optionally pages rendered with their widgets.

use std::{borrow::Cow,
          path::PathBuf,
          rc::Rc,
          sync::Arc,
          thread::JoinHandle,
          time::Duration};

use anyhow::{Result, anyhow};
use rouille::{Request, Response, ResponseBody, Server};
use scoped_thread_pool::Pool;
use serde_json::Value;

use crate::{accesslog::AccessLog,
            fixtures::Fixtures,
            io_util::my_read_to_string,
            model_store::{ApiError, ModelQuery, ModelStore},
            page::render_page,
            registry::WidgetRegistry,
            transport::HttpTransport,
            warn, info};


/// Pages to serve, with the widget pipeline fetching models from
/// `api_base`.
pub struct PageSite {
    pub pages_dir: PathBuf,
    pub fixtures: Arc<Fixtures>,
    pub api_base: String,
    pub fetch_timeout: Duration,
    pub pool: Arc<Pool>,
}

impl PageSite {
    /// Render the page source `html` through a pipeline of its own.
    pub fn render(&self, html: &str) -> Result<String> {
        let transport = Rc::new(HttpTransport::new(
            &self.api_base, self.fetch_timeout, self.pool.clone())?);
        let registry = WidgetRegistry::from_fixtures(transport.clone(), &self.fixtures)?;
        render_page(html, &registry, &self.fixtures.settings.dom_attach_point,
                    || transport.drain())
    }
}

pub struct ApiServer {
    pub store: Arc<ModelStore>,
    pub log: Arc<AccessLog>,
    pub pages: Option<PageSite>,
}

pub fn json_response(code: u16, body: &Value) -> Response {
    Response::json(body).with_status_code(code)
}

pub fn errorpage_from_status(code: u16, title: &str) -> Response {
    let resp = format!("<html><head><title>{title}</title></head><body><h1>{title}</h1>\
                        </body></html>\n");
    Response {
        status_code: code,
        headers: vec![(Cow::from("Content-type"), Cow::from("text/html; charset=utf-8"))],
        data: ResponseBody::from_string(resp),
        upgrade: None,
    }
}

/// Without `.` segments, and `None` if `..` would leave the root.
fn canonicalize_path(path: &str) -> Option<Vec<&str>> {
    let mut out = Vec::new();
    for segment in path.split('/') {
        match segment {
            "." | "" => (),
            ".." =>
                if out.pop().is_none() {
                    return None
                },
            _ => out.push(segment)
        }
    }
    Some(out)
}

impl ApiServer {
    pub fn handle(&self, request: &Request) -> Response {
        self.log.log(request, || self.route(request))
    }

    fn route(&self, request: &Request) -> Response {
        let url = request.url();
        if url == "/api" || url == "/api/" {
            let (code, body) = self.api(request);
            return json_response(code, &body)
        }
        match &self.pages {
            Some(site) => self.page(site, &url),
            None => errorpage_from_status(404, "Not Found"),
        }
    }

    /// Status and body for the `/api/` endpoint.
    pub fn api(&self, request: &Request) -> (u16, Value) {
        if request.method() != "GET" {
            let e = ApiError::InvalidMethod(request.method().into());
            return (e.code(), e.to_json())
        }
        let model = request.get_param("model");
        let filter = request.get_param("filter");
        let sort = request.get_param("sort");
        match ModelQuery::from_params(model.as_deref(), filter.as_deref(), sort.as_deref()) {
            Ok(query) => self.store.get_response(&query),
            Err(e) => (e.code(), e.to_json()),
        }
    }

    fn page(&self, site: &PageSite, url: &str) -> Response {
        let segments = match canonicalize_path(url) {
            Some(s) => s,
            None => return errorpage_from_status(404, "Not Found"),
        };
        let mut path = site.pages_dir.clone();
        if segments.is_empty() {
            path.push("index.html");
        } else {
            for s in &segments {
                path.push(s);
            }
            if path.extension().is_none() {
                path.set_extension("html");
            }
        }
        if ! path.is_file() {
            return errorpage_from_status(404, "Not Found")
        }
        let result = my_read_to_string(&path).and_then(|html| site.render(&html));
        match result {
            Ok(html) => Response::html(html),
            Err(e) => {
                warn!("rendering page {path:?}: {e:#}");
                errorpage_from_status(500, "Internal Server Error")
            }
        }
    }
}

/// Run the server in a thread of its own, until something is sent
/// on the returned sender. Dropping the sender does not stop it.
pub fn run_server(
    addr: &str,
    server: Arc<ApiServer>,
) -> Result<(std::net::SocketAddr, JoinHandle<()>, std::sync::mpsc::Sender<()>)> {
    let server = Server::new(addr, move |request| server.handle(request))
        .map_err(|e| anyhow!("starting server on {addr:?}: {e}"))?;
    let local = server.server_addr();
    info!("listening on {local}");
    let (handle, stop) = server.stoppable();
    Ok((local, handle, stop))
}
