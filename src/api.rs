//! Client for the model API: one request per call, the result (or a
//! part of it) handed to a callback.

use std::rc::Rc;

use kstring::KString;
use serde_json::Value;

use crate::{json_path::resolve,
            transport::{Transport, ApiRequest, Params},
            nowarn as warn};


pub struct ApiClient {
    transport: Rc<dyn Transport>,
    endpoint: KString,
}

impl ApiClient {
    /// `endpoint` is used for all requests that don't bring their own
    /// URL.
    pub fn new(transport: Rc<dyn Transport>, endpoint: &str) -> Self {
        ApiClient {
            transport,
            endpoint: KString::from_ref(endpoint),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Issue a request with `params` against the endpoint (or `url`
    /// if given). Without `path`, `callback` gets the whole response
    /// envelope; with it, the chunk at that dot-path, `None` if it
    /// doesn't exist. `callback` is never run if the request doesn't
    /// complete.
    pub fn get<F>(&self, url: Option<&str>, params: Params, path: Option<&str>, callback: F)
    where F: FnOnce(Option<Value>) + 'static
    {
        let request = ApiRequest {
            url: url.map(KString::from_ref).unwrap_or_else(|| self.endpoint.clone()),
            params,
        };
        warn!("ApiClient::get {request:?} {path:?}");
        match path {
            None => self.transport.send(request, Box::new(
                move |response| callback(Some(response)))),
            Some(path) => {
                let path = path.to_string();
                self.transport.send(request, Box::new(
                    move |response| callback(resolve(&response, &path))))
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use serde_json::json;

    use crate::transport::testing::ScriptedTransport;

    fn params(model: &str) -> Params {
        vec![(KString::from_static("model"), KString::from_ref(model))]
    }

    #[test]
    fn t_get_raw_and_path() {
        let transport = Rc::new(ScriptedTransport::new());
        let api = ApiClient::new(transport.clone(), "/api/");
        let got: Rc<RefCell<Vec<Option<Value>>>> = Default::default();

        let g = got.clone();
        api.get(None, params("category"), None, move |v| g.borrow_mut().push(v));
        let g = got.clone();
        api.get(Some("/other/"), params("category"), Some("data.models.0.name"),
                move |v| g.borrow_mut().push(v));
        let g = got.clone();
        api.get(None, params("category"), Some("data.nothing"),
                move |v| g.borrow_mut().push(v));

        // exactly one request per call, nothing delivered yet
        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].url.as_str(), "/api/");
        assert_eq!(requests[1].url.as_str(), "/other/");
        assert_eq!(requests[0].param("model"), Some("category"));
        assert!(got.borrow().is_empty());

        let body = json!({"models": ["{\"name\": \"Fiction\"}"]});
        transport.respond(1, body.clone());
        transport.respond(0, body.clone());
        transport.respond(2, body.clone());
        assert_eq!(*got.borrow(),
                   vec![Some(json!("Fiction")),
                        Some(json!({"data": body, "status": 200})),
                        None]);
    }
}
