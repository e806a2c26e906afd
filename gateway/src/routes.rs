//! Request path and query parsing.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

#[derive(Debug, PartialEq, Eq)]
pub enum Route<'a> {
    /// `/sub`: convert an arbitrary upstream URL, no store involved.
    Direct,
    /// `/<token>`: serve a stored subscription.
    Token(&'a str),
    NotFound,
}

impl<'a> Route<'a> {
    pub fn from_path(path: &'a str) -> Self {
        let normalized = path.trim().trim_matches('/');
        if normalized.is_empty() || normalized.contains('/') {
            return Route::NotFound;
        }

        match normalized {
            "sub" => Route::Direct,
            token => Route::Token(token),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Route::Direct => "direct",
            Route::Token(_) => "token",
            Route::NotFound => "not_found",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum DirectQueryError {
    MissingSub,
    InvalidSub,
}

#[derive(Debug, PartialEq, Eq)]
pub struct DirectQuery {
    pub upstream_url: String,
    /// False only for an explicit `convert=false`.
    pub convert: bool,
}

impl DirectQuery {
    pub fn parse(query: Option<&str>) -> Result<Self, DirectQueryError> {
        let mut sub = None;
        let mut convert = true;

        for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            match key.as_ref() {
                "sub" => sub = Some(value.into_owned()),
                "convert" => convert = value != "false",
                _ => {}
            }
        }

        let sub = sub.filter(|s| !s.is_empty()).ok_or(DirectQueryError::MissingSub)?;

        // An unescaped `+` arrives as a space after form decoding.
        let encoded = sub.trim().replace(' ', "+");
        let decoded = STANDARD
            .decode(encoded)
            .map_err(|_| DirectQueryError::InvalidSub)?;
        let upstream_url = String::from_utf8(decoded).map_err(|_| DirectQueryError::InvalidSub)?;

        Ok(DirectQuery {
            upstream_url,
            convert,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_matching() {
        assert_eq!(Route::from_path("/sub"), Route::Direct);
        assert_eq!(Route::from_path("/sub/"), Route::Direct);
        assert_eq!(Route::from_path("/sk-abc"), Route::Token("sk-abc"));
        assert_eq!(Route::from_path("/"), Route::NotFound);
        assert_eq!(Route::from_path("/a/b"), Route::NotFound);
    }

    #[test]
    fn test_direct_query() {
        let encoded = STANDARD.encode("https://upstream.example/sub?token=1");
        let query = DirectQuery::parse(Some(&format!("sub={encoded}"))).unwrap();
        assert_eq!(query.upstream_url, "https://upstream.example/sub?token=1");
        assert!(query.convert);

        let query = DirectQuery::parse(Some(&format!("convert=false&sub={encoded}"))).unwrap();
        assert!(!query.convert);

        let query = DirectQuery::parse(Some(&format!("convert=no&sub={encoded}"))).unwrap();
        assert!(query.convert);
    }

    #[test]
    fn test_direct_query_plus_survives_form_decoding() {
        // "https://a.example/?>>" encodes to a value containing '+'
        let encoded = STANDARD.encode("https://a.example/?>>");
        assert!(encoded.contains('+'));
        let query = DirectQuery::parse(Some(&format!("sub={encoded}"))).unwrap();
        assert_eq!(query.upstream_url, "https://a.example/?>>");
    }

    #[test]
    fn test_direct_query_errors() {
        assert_eq!(DirectQuery::parse(None), Err(DirectQueryError::MissingSub));
        assert_eq!(DirectQuery::parse(Some("sub=")), Err(DirectQueryError::MissingSub));
        assert_eq!(DirectQuery::parse(Some("convert=false")), Err(DirectQueryError::MissingSub));
        assert_eq!(
            DirectQuery::parse(Some("sub=%%%not-base64")),
            Err(DirectQueryError::InvalidSub)
        );
    }
}
