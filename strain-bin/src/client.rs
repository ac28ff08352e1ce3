//! web client used to put load on the target

use std::time::Duration;

use rama::{
    Layer as _, Service,
    error::BoxError,
    http::{Request, Response, Version, client::EasyHttpWebClient},
    layer::{MapErrLayer, TimeoutLayer},
};

/// Create the web client shared by the probe and all workers.
///
/// No connection pool is used: every request opens its own connection,
/// so the measured latency includes connection setup the same way
/// for the probe and the workers.
pub fn new_web_client(
    timeout: Duration,
) -> Result<impl Service<Request, Output = Response, Error = BoxError>, BoxError> {
    let inner_https_client = EasyHttpWebClient::connector_builder()
        .with_default_transport_connector()
        .without_tls_proxy_support()
        .without_proxy_support()
        // fallback to HTTP/1.1 as default HTTP version in case
        // no protocol negotation happens on layers such as TLS (e.g. ALPN)
        .with_tls_support_using_boringssl_and_default_http_version(None, Version::HTTP_11)
        .with_default_http_connector()
        .build_client();

    Ok((
        MapErrLayer::new(Into::into),
        TimeoutLayer::new(timeout),
    )
        .into_layer(inner_https_client))
}
