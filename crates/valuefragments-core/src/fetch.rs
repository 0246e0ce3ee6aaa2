//! Fetch a page and pick anchor targets out of it.

use std::error::Error as StdError;
use std::io::{self, Read};
use std::path::Path;
use std::time::Duration;

use scraper::{Html, Selector};
use tracing::{debug, error};

use crate::error_handling::utils::{io_error, network_error, parse_error};
use crate::error_handling::FragmentError;
use crate::utils::filecache;

/// Connect and read timeouts used when none are given.
pub const DEFAULT_TIMEOUTS: (Duration, Duration) = (Duration::from_secs(5), Duration::from_secs(10));

/// GET `url` and return every `<a href>` value containing `substring`.
///
/// A timeout is logged and yields an empty list; other transport failures and
/// HTTP error statuses are returned as `FragmentError::Network`.
pub fn selected_href_links(
    url: &str,
    substring: &str,
    timeouts: (Duration, Duration),
) -> Result<Vec<String>, FragmentError> {
    let response = match agent(timeouts).get(url).call() {
        Ok(resp) => resp,
        Err(ureq::Error::Status(code, _resp)) => {
            return Err(network_error("selected_href_links", Some(url), format!("HTTP {}", code)));
        }
        Err(ureq::Error::Transport(t)) if is_timeout(&t) => {
            error!("timeout exception while fetching {}", url);
            return Ok(Vec::new());
        }
        Err(e) => return Err(network_error("selected_href_links", Some(url), e)),
    };
    debug!(
        "Request to {} with Status {} and Reason {}",
        url,
        response.status(),
        response.status_text()
    );
    let body = response
        .into_string()
        .map_err(|e| network_error("selected_href_links", Some(url), e))?;
    extract_href_links(&body, substring)
}

fn agent((connect, read): (Duration, Duration)) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(connect)
        .timeout_read(read)
        .build()
}

/// True if an `io::Error` of kind `TimedOut` or `WouldBlock` sits anywhere in
/// the source chain.
fn is_timeout(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<io::Error>() {
            if matches!(io.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) {
                return true;
            }
        }
        current = e.source();
    }
    false
}

/// GET `url` and hand back the body as a reader. HTTP error statuses are errors.
pub fn open_url(
    url: &str,
    timeouts: (Duration, Duration),
) -> io::Result<Box<dyn Read + Send + Sync + 'static>> {
    agent(timeouts)
        .get(url)
        .call()
        .map(|response| response.into_reader())
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
}

/// [`selected_href_links`] reading the page through a file cache at
/// `cache_path`; the page is fetched again once the file is older than
/// `max_age`.
pub fn selected_href_links_cached(
    url: &str,
    substring: &str,
    cache_path: &Path,
    timeouts: (Duration, Duration),
    max_age: Duration,
) -> Result<Vec<String>, FragmentError> {
    let body = filecache(
        cache_path,
        || open_url(url, timeouts),
        |path| std::fs::read_to_string(path),
        max_age,
    )?
    .map_err(|e| {
        io_error(
            "selected_href_links_cached",
            Some(&cache_path.to_string_lossy()),
            e,
        )
    })?;
    extract_href_links(&body, substring)
}

/// `href` values of all anchors in `html` that contain `substring`, in document order.
pub fn extract_href_links(html: &str, substring: &str) -> Result<Vec<String>, FragmentError> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]")
        .map_err(|e| parse_error("extract_href_links", format!("{:?}", e)))?;
    Ok(document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .filter(|href| href.contains(substring))
        .map(str::to_string)
        .collect())
}
