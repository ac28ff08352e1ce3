use rama::http::{
    HeaderMap, HeaderName, HeaderValue,
    header::{ACCEPT, USER_AGENT},
};
use rama::telemetry::tracing;

/// Browser-like user agent, enough to get past the most trivial bot filters.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// The fixed header set sent with every probe and worker request.
pub fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers
}

/// Overwrite `headers` with every header found in `extra`.
///
/// Names present in `extra` replace all existing values for that name,
/// repeated names within `extra` are appended.
pub fn merge_headers(
    headers: &mut HeaderMap,
    extra: impl IntoIterator<Item = (HeaderName, HeaderValue)>,
) {
    let mut replaced: Vec<HeaderName> = Vec::new();
    for (name, value) in extra {
        if replaced.contains(&name) {
            headers.append(name, value);
            continue;
        }
        if headers.insert(name.clone(), value).is_some() {
            tracing::debug!(header = %name, "custom header replaces default value");
        }
        replaced.push(name);
    }
}

/// Parse a `name: value` (or `name:value`) header argument.
pub fn parse_header(input: &str) -> Result<(HeaderName, HeaderValue), String> {
    let Some((name, value)) = input.split_once(':') else {
        return Err(format!("header '{input}' is missing a ':' separator"));
    };

    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header '{input}' has an empty name"));
    }

    let name = HeaderName::try_from(name).map_err(|err| format!("header name '{name}': {err}"))?;
    let value = HeaderValue::try_from(value.trim())
        .map_err(|err| format!("header value for '{name}': {err}"))?;

    Ok((name, value))
}
