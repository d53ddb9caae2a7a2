//! Morphology file URL resolution.
//!
//! The archive does not expose a stable URL scheme for standardized SWC
//! files; the path encodes internal archive layout and casing. The one
//! reliable source is the neuron's own page, which renders an anchor to
//! the standardized file. Resolution fetches that page and extracts the
//! anchor.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::client::ArchiveClient;
use crate::error::{DownloadError, Error, Result};

/// Anchor the archive renders for the standardized SWC file. The href is
/// unquoted in the served HTML.
#[allow(clippy::unwrap_used)]
static MORPHOLOGY_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<a href=(dableFiles/[^>]+)>Morphology File \(Standardized\)</a>").unwrap()
});

/// Pulls the standardized-file href out of a neuron page, if present.
pub(crate) fn extract_morphology_href(html: &str) -> Option<&str> {
    MORPHOLOGY_LINK
        .captures(html)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}

/// Resolves the download URL for `name` by scraping its archive page.
pub(crate) async fn resolve_swc_url(client: &ArchiveClient, name: &str) -> Result<Url> {
    let html = client.neuron_page(name).await?;
    let href = extract_morphology_href(&html).ok_or_else(|| {
        Error::from(DownloadError::MorphologyLinkMissing {
            name: name.to_string(),
        })
    })?;
    Ok(client.site_base().join(href)?)
}
