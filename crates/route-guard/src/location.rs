//! Current app location and OAuth callback code handling

use std::fmt;

use url::{Url, form_urlencoded};

/// Query parameter the OAuth redirect appends
const CODE_PARAM: &str = "code";

/// Where the user is (or tried to go) inside the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    url: Url,
}

impl Location {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    /// Resolve `target` against the app origin. Accepts absolute URLs and
    /// app-relative paths like `/dashboard?code=abc`.
    pub fn resolve(app_origin: &Url, target: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(app_origin.join(target)?))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// The one-time OAuth code, if the URL carries a non-empty one.
    pub fn callback_code(&self) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, v)| k == CODE_PARAM && !v.is_empty())
            .map(|(_, v)| v.into_owned())
    }

    /// Same location with every `code` parameter removed. Other parameters
    /// keep their original bytes, and the fragment is kept.
    pub fn without_callback_code(&self) -> Location {
        let kept: Vec<&str> = self
            .url
            .query()
            .unwrap_or_default()
            .split('&')
            .filter(|segment| !segment.is_empty() && !is_code_segment(segment))
            .collect();

        let mut url = self.url.clone();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&kept.join("&")));
        }
        Location::new(url)
    }

    /// Path, query and fragment, as the app's router sees it.
    pub fn relative(&self) -> String {
        let mut out = self.url.path().to_owned();
        if let Some(query) = self.url.query() {
            out.push('?');
            out.push_str(query);
        }
        if let Some(fragment) = self.url.fragment() {
            out.push('#');
            out.push_str(fragment);
        }
        out
    }
}

fn is_code_segment(segment: &str) -> bool {
    form_urlencoded::parse(segment.as_bytes())
        .next()
        .is_some_and(|(key, _)| key == CODE_PARAM)
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.relative())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(target: &str) -> Location {
        let origin = Url::parse("http://app.local").unwrap();
        Location::resolve(&origin, target).unwrap()
    }

    #[test]
    fn resolves_relative_paths() {
        let loc = at("/dashboard?tab=agents");
        assert_eq!(loc.path(), "/dashboard");
        assert_eq!(loc.relative(), "/dashboard?tab=agents");
    }

    #[test]
    fn finds_callback_code() {
        assert_eq!(at("/dashboard?code=XYZ").callback_code().as_deref(), Some("XYZ"));
        assert_eq!(at("/dashboard?code=").callback_code(), None);
        assert_eq!(at("/dashboard").callback_code(), None);
    }

    #[test]
    fn strips_only_code() {
        let loc = at("/dashboard?code=XYZ&tab=agents#top").without_callback_code();
        assert_eq!(loc.relative(), "/dashboard?tab=agents#top");
        assert!(loc.callback_code().is_none());
    }

    #[test]
    fn strips_query_entirely_when_only_code() {
        let loc = at("/dashboard?code=XYZ").without_callback_code();
        assert_eq!(loc.relative(), "/dashboard");
        assert!(loc.url().query().is_none());
    }

    #[test]
    fn strips_repeated_codes() {
        let loc = at("/?code=a&code=b").without_callback_code();
        assert_eq!(loc.relative(), "/");
    }

    #[test]
    fn remaining_parameters_keep_their_encoding() {
        let loc = at("/dashboard?flag&code=XYZ&q=a%20b&plus=a+b").without_callback_code();
        assert_eq!(loc.relative(), "/dashboard?flag&q=a%20b&plus=a+b");
    }

    #[test]
    fn absolute_target_overrides_origin() {
        let loc = at("https://elsewhere.example/account");
        assert_eq!(loc.url().host_str(), Some("elsewhere.example"));
        assert_eq!(loc.to_string(), "/account");
    }
}
