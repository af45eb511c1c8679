// Outbound request descriptor.
// Resolves a path template plus positional parameters and query pairs against a base URI.

use url::Url;

use crate::error::{FetchError, Result};

/// Path of the downstream single-money endpoint.
pub const SINGLE_MONEY_PATH: &str = "/query/money/single-money";

/// Immutable description of one GET call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    path: String,
    path_params: Vec<String>,
    query: Vec<(String, String)>,
}

impl FetchRequest {
    /// Create a request for a path template such as `/users/{id}/money`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            path_params: Vec::new(),
            query: Vec::new(),
        }
    }

    /// Append a positional path parameter.
    pub fn path_param(mut self, value: impl ToString) -> Self {
        self.path_params.push(value.to_string());
        self
    }

    /// Append a query pair.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Resolve the full URL against `base`.
    ///
    /// Placeholders (`{...}`) are filled from the path parameters in order and
    /// each filled segment is percent-encoded. Surplus parameters are ignored;
    /// an unfilled placeholder is an error.
    pub fn resolve(&self, base: &Url) -> Result<Url> {
        let segments = expand_segments(&self.path, &self.path_params)?;

        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidUri(format!("{base} cannot take a path")))?
            .pop_if_empty()
            .extend(&segments);

        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }

        Ok(url)
    }
}

fn expand_segments(template: &str, params: &[String]) -> Result<Vec<String>> {
    let mut params = params.iter();
    template
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| fill_segment(template, segment, &mut params))
        .collect()
}

fn fill_segment<'a>(
    template: &str,
    segment: &str,
    params: &mut impl Iterator<Item = &'a String>,
) -> Result<String> {
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;

    while let Some(open) = rest.find('{') {
        let close = rest[open..]
            .find('}')
            .map(|i| open + i)
            .ok_or_else(|| FetchError::InvalidUri(format!("unclosed placeholder in {template}")))?;
        let name = &rest[open + 1..close];
        let value = params.next().ok_or_else(|| {
            FetchError::InvalidUri(format!("no value for placeholder {{{name}}} in {template}"))
        })?;

        out.push_str(&rest[..open]);
        out.push_str(value);
        rest = &rest[close + 1..];
    }
    out.push_str(rest);

    Ok(out)
}
