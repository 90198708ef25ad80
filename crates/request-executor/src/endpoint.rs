//! Ordered endpoint paths for one logical operation.

/// `[primary, fallback...]`, relative to the API base.
///
/// The executor moves to the next path only after a 404, and at most once
/// per call, so paths after the first fallback are never tried by a single
/// call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    paths: Vec<String>,
}

impl EndpointSpec {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            paths: vec![normalize(primary.into())],
        }
    }

    pub fn with_fallback(mut self, path: impl Into<String>) -> Self {
        self.paths.push(normalize(path.into()));
        self
    }

    pub fn primary(&self) -> &str {
        &self.paths[0]
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.paths.get(index).map(String::as_str)
    }
}

fn normalize(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    }
}
