//! Link-header pagination used by the catalog and tag-list endpoints.

use http::HeaderMap;
use http::Uri;
use http::header::LINK;
use http::uri::PathAndQuery;

/// Find the `rel="next"` target in a response's `Link` headers.
///
/// Returns the path and query of the next page, e.g. `/v2/_catalog?last=b&n=100`.
pub(crate) fn next_page(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(next_target)
}

fn next_target(link: &str) -> Option<String> {
    let (target, params) = link.trim().split_once(';')?;
    let target = target.trim().strip_prefix('<')?.strip_suffix('>')?;

    let is_next = params.split(';').any(|param| {
        let param = param.trim().replace(' ', "");
        param == "rel=\"next\"" || param == "rel=next"
    });

    if !is_next {
        return None;
    }

    if target.starts_with('/') {
        let target: PathAndQuery = target.parse().ok()?;
        return Some(target.as_str().to_owned());
    }

    // Absolute links keep only their path; requests always go to the configured registry.
    let uri: Uri = target.parse().ok()?;
    uri.path_and_query().map(|pq| pq.as_str().to_owned())
}
