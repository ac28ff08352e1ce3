use rama::{
    error::BoxError,
    http::{Body, HeaderMap, Method, Request, Response, StatusCode, Uri},
};

/// Blueprint for the GET request every probe and worker iteration sends.
///
/// Requests own their body and can't be cloned,
/// so a fresh one is stamped out per attempt.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    uri: Uri,
    headers: HeaderMap,
}

impl RequestTemplate {
    pub fn new(uri: Uri, headers: HeaderMap) -> Self {
        Self { uri, headers }
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn build(&self) -> Request {
        let mut req = Request::new(Body::empty());
        *req.method_mut() = Method::GET;
        *req.uri_mut() = self.uri.clone();
        *req.headers_mut() = self.headers.clone();
        req
    }
}

/// How a single request ended, from the point of view of the throughput count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// 2xx response: counts towards the total.
    Success,
    /// The server answered, but not with a 2xx status.
    HttpStatus(StatusCode),
    /// Transport error, timeout or anything else without a response.
    Failure,
}

impl RequestOutcome {
    pub fn classify(result: &Result<Response, BoxError>) -> Self {
        match result {
            Ok(resp) if resp.status().is_success() => Self::Success,
            Ok(resp) => Self::HttpStatus(resp.status()),
            Err(_) => Self::Failure,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}
