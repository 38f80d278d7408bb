use super::RequestAdapter;
use crate::engine::model::{HeaderMap, ParamPlacement, Request, Response};
use crate::error::{AdapterError, ErrorCode};
use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::multipart::Form;
use reqwest::redirect::Policy;
use reqwest::{Client, Method};
use std::time::{Duration, Instant};
use uuid::Uuid;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends a `Request` over HTTP/HTTPS with `reqwest`, the same client-reuse
/// and header/body shape as teacher's `HttpExecutor`. Interpolation already
/// happened upstream in `engine::expand_request`; this adapter only builds
/// and fires the wire request.
pub struct HttpAdapter {
    client: Client,
}

impl HttpAdapter {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .redirect(Policy::none())
                .cookie_store(false)
                .build()
                .expect("reqwest client builder should not fail with default TLS config"),
        }
    }
}

impl Default for HttpAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RequestAdapter for HttpAdapter {
    async fn send(&self, request: &Request) -> Result<Response, AdapterError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| AdapterError::Other(ErrorCode::HTTP_CONNECTION_ERROR, e.to_string()))?;

        let url = if request.params.is_empty() || request.param_placement != ParamPlacement::Url {
            request.url.clone()
        } else {
            append_query(&request.url, &request.params)
        };

        let mut builder = self
            .client
            .request(method, &url)
            .timeout(request.timeout().unwrap_or(DEFAULT_TIMEOUT));

        for (name, values) in request.headers.iter() {
            for value in values {
                builder = builder.header(name, value);
            }
        }
        if let Some((user, pass)) = &request.basic_auth {
            builder = builder.basic_auth(user, Some(pass));
        }

        if !request.params.is_empty() && request.param_placement == ParamPlacement::Multipart {
            let mut form = Form::new();
            for (name, values) in request.params.iter() {
                for value in values {
                    form = form.text(name.clone(), value.clone());
                }
            }
            builder = builder.multipart(form);
        } else if !request.params.is_empty() && request.param_placement == ParamPlacement::Body {
            builder = builder.body(form_encode(&request.params));
        } else if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let start = Instant::now();
        let mut redirect_chain = Vec::new();
        let mut current_url = request.url.clone();
        let mut response = builder.send().await?;

        if request.follow_redirects {
            let mut hops = 0;
            while response.status().is_redirection() && hops < 20 {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let Some(location) = location else { break };
                redirect_chain.push(current_url.clone());
                current_url = resolve_redirect(&current_url, &location);
                response = self
                    .client
                    .get(&current_url)
                    .timeout(request.timeout().unwrap_or(DEFAULT_TIMEOUT))
                    .send()
                    .await?;
                hops += 1;
            }
            if hops >= 20 {
                return Err(AdapterError::Other(
                    ErrorCode::REDIRECT_LOOP,
                    format!("more than {hops} redirects following {}", request.url),
                ));
            }
        }

        let duration = start.elapsed();
        let status_code = response.status().as_u16();
        let reason_phrase = response
            .status()
            .canonical_reason()
            .unwrap_or_default()
            .to_string();
        let protocol_version = format!("{:?}", response.version());

        let mut headers: HeaderMap = IndexMap::new();
        for (name, value) in response.headers().iter() {
            let key = name.as_str().to_ascii_lowercase();
            let value = value.to_str().unwrap_or_default().to_string();
            headers.entry(key).or_default().push(value);
        }

        let body_error = None;
        let body = response.bytes().await?.to_vec();

        Ok(Response {
            request_id: Uuid::new_v4(),
            status_code,
            reason_phrase,
            protocol_version,
            headers,
            body,
            body_error,
            duration,
            redirect_chain,
        })
    }
}

/// Builds a `key=value&...` query string from a multi-valued param map,
/// the same `urlencoding::encode` pairing teacher's `HttpExecutor` used for
/// `query_params`, repeating the key once per value rather than joining them.
fn append_query(url: &str, params: &HeaderMap) -> String {
    let mut pairs = Vec::new();
    for (name, values) in params.iter() {
        for value in values {
            pairs.push(format!(
                "{}={}",
                urlencoding::encode(name),
                urlencoding::encode(value)
            ));
        }
    }
    let joined = pairs.join("&");
    if url.contains('?') {
        format!("{url}&{joined}")
    } else {
        format!("{url}?{joined}")
    }
}

fn form_encode(params: &HeaderMap) -> String {
    let mut pairs = Vec::new();
    for (name, values) in params.iter() {
        for value in values {
            pairs.push(format!(
                "{}={}",
                urlencoding::encode(name),
                urlencoding::encode(value)
            ));
        }
    }
    pairs.join("&")
}

fn resolve_redirect(base: &str, location: &str) -> String {
    if location.starts_with("http://") || location.starts_with("https://") {
        return location.to_string();
    }
    match reqwest::Url::parse(base).and_then(|u| u.join(location)) {
        Ok(joined) => joined.to_string(),
        Err(_) => location.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_redirect_against_base() {
        let resolved = resolve_redirect("https://example.com/a/b", "/c");
        assert_eq!(resolved, "https://example.com/c");
    }

    #[test]
    fn absolute_redirect_location_is_used_verbatim() {
        let resolved = resolve_redirect("https://example.com/a", "https://other.test/x");
        assert_eq!(resolved, "https://other.test/x");
    }

    fn params(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map: HeaderMap = IndexMap::new();
        for (k, v) in pairs {
            map.entry(k.to_string()).or_default().push(v.to_string());
        }
        map
    }

    #[test]
    fn append_query_adds_question_mark_when_url_has_none() {
        let url = append_query("https://example.com/search", &params(&[("q", "rust lang")]));
        assert_eq!(url, "https://example.com/search?q=rust%20lang");
    }

    #[test]
    fn append_query_joins_with_ampersand_when_url_already_has_one() {
        let url = append_query("https://example.com/search?page=2", &params(&[("q", "x")]));
        assert_eq!(url, "https://example.com/search?page=2&q=x");
    }

    #[test]
    fn form_encode_repeats_key_for_each_value() {
        let mut map: HeaderMap = IndexMap::new();
        map.insert("tag".to_string(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(form_encode(&map), "tag=a&tag=b");
    }
}
