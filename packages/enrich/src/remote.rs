//! Remote chunk resolution over HTTP.
//!
//! Sends `POST {base_url}/api/lookup` with `{"ips": [...]}` and reads back
//! `{"results": [...], "count": n}`. Addresses the server leaves out of
//! `results` are `not-found`.

use std::time::Duration;

use async_trait::async_trait;
use stream_atlas_geoip::address;
use stream_atlas_geoip_models::{AddressKey, ResolutionOutcome, UnresolvedReason};
use stream_atlas_server_models::{LookupRequest, LookupResponse};

use crate::resolver::{ChunkError, ChunkOutcomes, ChunkResolver};

/// Resolves chunks by calling a lookup server.
///
/// Private, reserved and malformed addresses are classified locally and
/// never sent.
#[derive(Debug, Clone)]
pub struct RemoteChunkResolver {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteChunkResolver {
    /// Creates a resolver for the server at `base_url`. Every request is
    /// bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ChunkError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Creates a resolver using an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/lookup", base_url.trim_end_matches('/')),
        }
    }

    /// The lookup URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChunkResolver for RemoteChunkResolver {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn resolve_chunk(&self, chunk: &[AddressKey]) -> Result<ChunkOutcomes, ChunkError> {
        let mut outcomes = ChunkOutcomes::new();
        let mut to_send: Vec<&AddressKey> = Vec::with_capacity(chunk.len());

        for key in chunk {
            match address::screen(key.as_str()) {
                Ok(_) => to_send.push(key),
                Err(reason) => {
                    outcomes.insert(key.clone(), ResolutionOutcome::unresolved(reason));
                }
            }
        }

        if to_send.is_empty() {
            return Ok(outcomes);
        }

        log::debug!(
            "Sending {} addresses to {} ({} screened locally)",
            to_send.len(),
            self.endpoint,
            outcomes.len()
        );

        let request = LookupRequest {
            ips: to_send.iter().map(|k| k.as_str().to_string()).collect(),
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ChunkError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: LookupResponse = resp.json().await?;

        let mut located: ChunkOutcomes = body
            .results
            .into_iter()
            .filter_map(|result| {
                let key = AddressKey::normalize(&result.ip)?;
                Some((key, ResolutionOutcome::Resolved(result.into_location())))
            })
            .collect();

        for key in to_send {
            let outcome = located
                .remove(key)
                .unwrap_or(ResolutionOutcome::unresolved(UnresolvedReason::NotFound));
            outcomes.insert(key.clone(), outcome);
        }

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use actix_web::{App, HttpResponse, HttpServer, web};
    use stream_atlas_server_models::LookupResult;

    use super::*;

    fn key(s: &str) -> AddressKey {
        AddressKey::normalize(s).unwrap()
    }

    async fn fake_lookup(body: web::Json<LookupRequest>) -> HttpResponse {
        let results: Vec<LookupResult> = body
            .ips
            .iter()
            .filter(|ip| ip.as_str() == "8.8.8.8")
            .map(|ip| LookupResult {
                ip: ip.clone(),
                latitude: 37.751,
                longitude: -97.822,
                city: None,
                country: Some("US".to_string()),
                region: None,
            })
            .collect();
        let count = results.len();
        HttpResponse::Ok().json(LookupResponse { results, count })
    }

    async fn failing_lookup() -> HttpResponse {
        HttpResponse::ServiceUnavailable().json(serde_json::json!({"error": "down"}))
    }

    async fn slow_lookup() -> HttpResponse {
        tokio::time::sleep(Duration::from_secs(5)).await;
        HttpResponse::Ok().finish()
    }

    fn spawn_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = HttpServer::new(|| {
            App::new()
                .route("/ok/api/lookup", web::post().to(fake_lookup))
                .route("/down/api/lookup", web::post().to(failing_lookup))
                .route("/slow/api/lookup", web::post().to(slow_lookup))
        })
        .workers(1)
        .listen(listener)
        .unwrap()
        .run();
        actix_rt::spawn(server);
        format!("http://127.0.0.1:{port}")
    }

    #[actix_web::test]
    async fn absent_results_are_not_found() {
        let base = spawn_server();
        let resolver =
            RemoteChunkResolver::new(&format!("{base}/ok/"), Duration::from_secs(5)).unwrap();

        let outcomes = resolver
            .resolve_chunk(&[key("8.8.8.8"), key("9.9.9.9"), key("10.0.0.1")])
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        let location = outcomes[&key("8.8.8.8")].location().unwrap();
        assert_eq!(location.country_code.as_deref(), Some("US"));
        assert_eq!(
            outcomes[&key("9.9.9.9")].reason(),
            Some(UnresolvedReason::NotFound)
        );
        assert_eq!(
            outcomes[&key("10.0.0.1")].reason(),
            Some(UnresolvedReason::PrivateOrReserved)
        );
    }

    #[actix_web::test]
    async fn private_only_chunk_never_calls_the_server() {
        let resolver =
            RemoteChunkResolver::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let outcomes = resolver
            .resolve_chunk(&[key("192.168.0.1"), key("nonsense")])
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.values().all(|o| !o.is_resolved()));
    }

    #[actix_web::test]
    async fn error_status_fails_the_chunk() {
        let base = spawn_server();
        let resolver =
            RemoteChunkResolver::new(&format!("{base}/down"), Duration::from_secs(5)).unwrap();
        let err = resolver.resolve_chunk(&[key("8.8.8.8")]).await.unwrap_err();
        assert!(matches!(err, ChunkError::Status { status: 503, .. }));
    }

    #[actix_web::test]
    async fn request_timeout_fails_the_chunk() {
        let base = spawn_server();
        let resolver =
            RemoteChunkResolver::new(&format!("{base}/slow"), Duration::from_millis(200))
                .unwrap();
        let err = resolver.resolve_chunk(&[key("8.8.8.8")]).await.unwrap_err();
        assert!(matches!(err, ChunkError::Http(_)));
    }

    #[test]
    fn endpoint_joins_base_url() {
        let resolver =
            RemoteChunkResolver::with_client(reqwest::Client::new(), "http://host:8080/");
        assert_eq!(resolver.endpoint(), "http://host:8080/api/lookup");
    }
}
