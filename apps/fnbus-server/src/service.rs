//! Hyper service that authenticates every inbound request.
//!
//! `GET /_fnbus/health` is answered without authentication. Every other
//! request is buffered (up to a size cap) and passed through the
//! [`SignatureGuard`]; accepted requests receive a JSON description of the
//! caller, rejected ones a 403. When an identity provider is attached, the
//! caller's enterprise claims are added to the description.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use fnbus_auth_http::{Authenticated, EnterpriseIdentity, IdentityProvider, SignatureGuard};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::service::Service;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Path of the unauthenticated health endpoint.
pub const HEALTH_PATH: &str = "/_fnbus/health";

/// Largest request body accepted by default.
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const REQUEST_ID_HEADER: &str = "x-fnbus-request-id";
const SERVER_NAME: &str = "fnbus-server";

/// Response body type.
pub type GatewayBody = Full<Bytes>;

/// JSON body returned for an authenticated request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdentityResponse<'a> {
    identifier: &'a str,
    scheme: &'static str,
    date_stamp: &'a str,
    signed_headers: &'a [String],
    request_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    enterprise: Option<EnterpriseClaims<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EnterpriseClaims<'a> {
    authentication_type: &'a str,
    name: Option<&'a str>,
    name_type: &'a str,
    role_type: &'a str,
    claims: &'a BTreeMap<String, String>,
}

impl<'a> From<&'a EnterpriseIdentity> for EnterpriseClaims<'a> {
    fn from(identity: &'a EnterpriseIdentity) -> Self {
        Self {
            authentication_type: &identity.authentication_type,
            name: identity.name(),
            name_type: &identity.name_type,
            role_type: &identity.role_type,
            claims: &identity.claims,
        }
    }
}

/// The gateway service.
#[derive(Clone)]
pub struct GatewayService {
    guard: SignatureGuard,
    identity: Option<Arc<dyn IdentityProvider>>,
    max_body_bytes: usize,
}

impl std::fmt::Debug for GatewayService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayService")
            .field("guard", &self.guard)
            .field("identity", &self.identity.is_some())
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

impl GatewayService {
    /// Create a gateway protected by `guard`.
    pub fn new(guard: SignatureGuard) -> Self {
        Self {
            guard,
            identity: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Attach enterprise claims from `provider` to authenticated responses.
    #[must_use]
    pub fn with_identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(provider);
        self
    }

    /// Reject bodies larger than `limit` bytes with `413 Payload Too Large`.
    #[must_use]
    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Handle one request.
    pub async fn handle<B>(&self, req: http::Request<B>) -> http::Response<GatewayBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let request_id = uuid::Uuid::new_v4().to_string();

        if is_health_check(req.method(), req.uri().path()) {
            return add_common_headers(health_check_response(), &request_id);
        }

        let (mut parts, body) = req.into_parts();
        let body = match Limited::new(body, self.max_body_bytes).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                warn!(
                    request_id = %request_id,
                    limit = self.max_body_bytes,
                    "request body too large"
                );
                return add_common_headers(
                    text_response(http::StatusCode::PAYLOAD_TOO_LARGE, "request body too large"),
                    &request_id,
                );
            }
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "failed to read request body");
                return add_common_headers(
                    text_response(http::StatusCode::BAD_REQUEST, "cannot read request body"),
                    &request_id,
                );
            }
        };

        debug!(
            request_id = %request_id,
            method = %parts.method,
            path = %parts.uri.path(),
            body_len = body.len(),
            "authenticating request",
        );

        let response = match self.guard.check(&mut parts, body).await {
            Ok(authenticated) => {
                info!(
                    request_id = %request_id,
                    identifier = %authenticated.result.identifier,
                    scheme = %authenticated.scheme,
                    "request authenticated",
                );
                let enterprise = self
                    .enterprise_identity(&authenticated.result.identifier, &request_id)
                    .await;
                identity_response(&authenticated, enterprise.as_ref(), &request_id)
            }
            Err(rejection) => rejection.into_response(),
        };
        add_common_headers(response, &request_id)
    }

    /// Successful enterprise identity for `identifier`, if a provider is attached.
    async fn enterprise_identity(
        &self,
        identifier: &str,
        request_id: &str,
    ) -> Option<EnterpriseIdentity> {
        let provider = self.identity.as_ref()?;
        match provider.get_identity(identifier).await {
            Ok(Some(identity)) if identity.is_success => Some(identity),
            Ok(_) => {
                debug!(request_id = %request_id, identifier, "no enterprise identity");
                None
            }
            Err(e) => {
                warn!(request_id = %request_id, identifier, error = %e, "identity lookup failed");
                None
            }
        }
    }
}

impl Service<http::Request<Incoming>> for GatewayService {
    type Response = http::Response<GatewayBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let svc = self.clone();
        Box::pin(async move { Ok(svc.handle(req).await) })
    }
}

fn is_health_check(method: &http::Method, path: &str) -> bool {
    *method == http::Method::GET && path == HEALTH_PATH
}

fn health_check_response() -> http::Response<GatewayBody> {
    json_response(
        http::StatusCode::OK,
        &serde_json::json!({ "status": "running", "version": env!("CARGO_PKG_VERSION") }),
    )
}

fn identity_response(
    authenticated: &Authenticated,
    enterprise: Option<&EnterpriseIdentity>,
    request_id: &str,
) -> http::Response<GatewayBody> {
    let result = &authenticated.result;
    let body = IdentityResponse {
        identifier: &result.identifier,
        scheme: authenticated.scheme.as_str(),
        date_stamp: &result.date_stamp,
        signed_headers: &result.signed_headers,
        request_id,
        enterprise: enterprise.map(EnterpriseClaims::from),
    };
    json_response(http::StatusCode::OK, &body)
}

fn json_response<T: Serialize>(
    status: http::StatusCode,
    body: &T,
) -> http::Response<GatewayBody> {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = http::Response::new(Full::new(Bytes::from(bytes)));
            *response.status_mut() = status;
            response.headers_mut().insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/json"),
            );
            response
        }
        Err(e) => {
            warn!(error = %e, "failed to serialize response");
            text_response(http::StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn text_response(status: http::StatusCode, message: &'static str) -> http::Response<GatewayBody> {
    let mut response = http::Response::new(Full::new(Bytes::from_static(message.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn add_common_headers(
    mut response: http::Response<GatewayBody>,
    request_id: &str,
) -> http::Response<GatewayBody> {
    let headers = response.headers_mut();
    if let Ok(hv) = http::HeaderValue::from_str(request_id) {
        headers.entry(REQUEST_ID_HEADER).or_insert(hv);
    }
    headers.insert(http::header::SERVER, http::HeaderValue::from_static(SERVER_NAME));
    response
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use fnbus_auth::StaticCredentialProvider;
    use fnbus_auth_http::{GuardConfig, IdentityError, sign_request};

    use super::*;

    struct FixedIdentity(Option<EnterpriseIdentity>);

    #[async_trait]
    impl IdentityProvider for FixedIdentity {
        async fn get_identity(
            &self,
            _identifier: &str,
        ) -> Result<Option<EnterpriseIdentity>, IdentityError> {
            Ok(self.0.clone())
        }
    }

    fn signed_post(body: &'static [u8]) -> http::Request<Full<Bytes>> {
        let mut req = http::Request::post("http://svc.internal/orders?id=7")
            .header("content-type", "application/json")
            .body(Bytes::from_static(body))
            .unwrap();
        sign_request(&mut req, "AKID", "SECRET").unwrap();
        req.map(Full::new)
    }

    fn gateway() -> GatewayService {
        let provider = Arc::new(StaticCredentialProvider::new(vec![(
            "AKID".to_owned(),
            "SECRET".to_owned(),
        )]));
        GatewayService::new(SignatureGuard::new(provider, GuardConfig::default()))
    }

    async fn body_json(response: http::Response<GatewayBody>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_should_detect_health_check_path() {
        assert!(is_health_check(&http::Method::GET, HEALTH_PATH));
        assert!(!is_health_check(&http::Method::POST, HEALTH_PATH));
        assert!(!is_health_check(&http::Method::GET, "/health"));
    }

    #[tokio::test]
    async fn test_should_answer_health_check_without_signature() {
        let req = http::Request::get(HEALTH_PATH)
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = gateway().handle(req).await;
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(response.headers().get("server").unwrap(), SERVER_NAME);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        assert_eq!(body_json(response).await["status"], "running");
    }

    #[tokio::test]
    async fn test_should_describe_authenticated_caller() {
        let response = gateway().handle(signed_post(br#"{"qty":3}"#)).await;
        assert_eq!(response.status(), http::StatusCode::OK);
        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_owned();

        let json = body_json(response).await;
        assert_eq!(json["identifier"], "AKID");
        assert_eq!(json["scheme"], "FNBUS1");
        assert_eq!(json["requestId"], request_id);
        assert_eq!(
            json["signedHeaders"],
            serde_json::json!(["content-type", "host"])
        );
        assert!(json.get("enterprise").is_none());
    }

    #[tokio::test]
    async fn test_should_refuse_body_over_limit() {
        let service = gateway().with_max_body_bytes(8);
        let response = service.handle(signed_post(br#"{"qty":1234567}"#)).await;
        assert_eq!(response.status(), http::StatusCode::PAYLOAD_TOO_LARGE);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));

        let response = service.handle(signed_post(b"{}")).await;
        assert_eq!(response.status(), http::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_should_attach_enterprise_claims() {
        let mut identity = EnterpriseIdentity {
            is_success: true,
            ..EnterpriseIdentity::default()
        };
        identity
            .claims
            .insert(identity.name_type.clone(), "Acme Logistics".to_owned());
        let service = gateway().with_identity_provider(Arc::new(FixedIdentity(Some(identity))));

        let json = body_json(service.handle(signed_post(b"{}")).await).await;
        assert_eq!(json["identifier"], "AKID");
        assert_eq!(json["enterprise"]["authenticationType"], "Enterprise");
        assert_eq!(json["enterprise"]["name"], "Acme Logistics");
    }

    #[tokio::test]
    async fn test_should_omit_claims_for_unsuccessful_identity() {
        let service = gateway()
            .with_identity_provider(Arc::new(FixedIdentity(Some(EnterpriseIdentity::default()))));
        let response = service.handle(signed_post(b"{}")).await;
        assert_eq!(response.status(), http::StatusCode::OK);
        assert!(body_json(response).await.get("enterprise").is_none());
    }

    #[tokio::test]
    async fn test_should_reject_unsigned_request() {
        let req = http::Request::get("http://svc.internal/orders")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = gateway().handle(req).await;
        assert_eq!(response.status(), http::StatusCode::FORBIDDEN);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }
}
