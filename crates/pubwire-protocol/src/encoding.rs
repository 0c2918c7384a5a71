//! Percent-encoding for request paths and query strings.
//!
//! Everything except ASCII alphanumerics and `-_.~` is escaped, so JSON
//! structure survives transport intact:
//!
//! ```text
//! "hi"            -> %22hi%22
//! ["a","b","c"]   -> %5B%22a%22%2C%22b%22%2C%22c%22%5D
//! ```

/// Percent-encodes a single path segment or query value.
pub fn encode_component(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

/// Builds an absolute path from unencoded segments.
pub fn encode_path<S: AsRef<str>>(segments: &[S]) -> String {
    let mut path = String::new();
    for segment in segments {
        path.push('/');
        path.push_str(&encode_component(segment.as_ref()));
    }
    path
}

/// Renders `name=value` pairs, encoding every value.
///
/// Parameter names are emitted as-is and must already be URL-safe.
pub fn encode_query<N, V>(params: &[(N, V)]) -> String
where
    N: AsRef<str>,
    V: AsRef<str>,
{
    params
        .iter()
        .map(|(name, value)| format!("{}={}", name.as_ref(), encode_component(value.as_ref())))
        .collect::<Vec<_>>()
        .join("&")
}
