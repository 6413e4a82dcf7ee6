//! OAuth 1.0a encoding and signature base string construction.

use sigil_core::{WebMethod, WebParameter};
use url::Url;

/// Percent-encodes per RFC 3986, leaving only `A-Z a-z 0-9 - . _ ~`.
pub fn url_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Normalizes a URL for signing.
///
/// Scheme and host are lowercase, default ports are dropped, and the query
/// and fragment are removed.
pub fn normalize_url(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
    format!(
        "{}://{}{}{}",
        url.scheme().to_ascii_lowercase(),
        host,
        port,
        url.path()
    )
}

/// Sorts and joins parameters for signing.
///
/// Names and values are encoded before sorting; `oauth_signature` is never
/// part of its own base string.
pub fn normalize_parameters<'a, I>(parameters: I) -> String
where
    I: IntoIterator<Item = &'a WebParameter>,
{
    let mut pairs: Vec<(String, String)> = parameters
        .into_iter()
        .filter(|p| p.name != "oauth_signature")
        .map(|p| (url_encode(&p.name), url_encode(&p.value)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Builds the signature base string.
pub fn signature_base<'a, I>(method: WebMethod, url: &Url, parameters: I) -> String
where
    I: IntoIterator<Item = &'a WebParameter>,
{
    format!(
        "{}&{}&{}",
        method.as_str(),
        url_encode(&normalize_url(url)),
        url_encode(&normalize_parameters(parameters))
    )
}

/// Returns the URL's query pairs, decoded.
pub fn query_pairs(url: &Url) -> Vec<(String, String)> {
    url.query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_core::WebParameterCollection;

    #[test]
    fn test_url_encode_is_strict() {
        assert_eq!(url_encode("abc-._~XYZ019"), "abc-._~XYZ019");
        assert_eq!(url_encode("a b"), "a%20b");
        assert_eq!(url_encode("!*'()"), "%21%2A%27%28%29");
        assert_eq!(url_encode("ü"), "%C3%BC");
        assert_eq!(url_encode("="), "%3D");
    }

    #[test]
    fn test_normalize_url() {
        let url = Url::parse("HTTP://Example.COM:80/r%20v/X?id=123#frag").unwrap();
        assert_eq!(normalize_url(&url), "http://example.com/r%20v/X");

        let url = Url::parse("https://example.com:8443/api").unwrap();
        assert_eq!(normalize_url(&url), "https://example.com:8443/api");
    }

    #[test]
    fn test_normalize_parameters_sorts_by_name_then_value() {
        let params: WebParameterCollection = [
            ("b", "2"),
            ("a", "z"),
            ("a", "a b"),
            ("oauth_signature", "ignored"),
        ]
        .into_iter()
        .collect();
        assert_eq!(normalize_parameters(&params), "a=a%20b&a=z&b=2");
    }

    #[test]
    fn test_signature_base_appendix_example() {
        let url = Url::parse("http://photos.example.net/photos?file=vacation.jpg&size=original")
            .unwrap();
        let params: WebParameterCollection = [
            ("file", "vacation.jpg"),
            ("size", "original"),
            ("oauth_consumer_key", "dpf43f3p2l4k3l03"),
            ("oauth_token", "nnch734d00sl2jdk"),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", "1191242096"),
            ("oauth_nonce", "kllo9940pd9333jh"),
            ("oauth_version", "1.0"),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            signature_base(WebMethod::Get, &url, &params),
            "GET&http%3A%2F%2Fphotos.example.net%2Fphotos&file%3Dvacation.jpg%26\
             oauth_consumer_key%3Ddpf43f3p2l4k3l03%26oauth_nonce%3Dkllo9940pd9333jh%26\
             oauth_signature_method%3DHMAC-SHA1%26oauth_timestamp%3D1191242096%26\
             oauth_token%3Dnnch734d00sl2jdk%26oauth_version%3D1.0%26size%3Doriginal"
        );
    }
}
