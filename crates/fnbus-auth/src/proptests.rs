//! Property-based tests for signing and verification.
//!
//! - Any request signed with a secret verifies against the same secret
//! - Changing the body or a query value after signing breaks verification
//! - Headers outside the signed set never affect the outcome
//! - Whitespace compression is idempotent

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use crate::canonical::compress_whitespace;
use crate::context::{SigningContext, VerifyingContext};
use crate::credentials::StaticCredentialProvider;
use crate::signer::Signer;
use crate::validator::Validator;

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 30, 23, 59, 59).unwrap()
}

#[derive(Debug, Clone)]
struct Request {
    method: &'static str,
    path: String,
    query: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
    secret: String,
}

fn arb_request() -> impl Strategy<Value = Request> {
    (
        prop::sample::select(vec!["GET", "PUT", "POST", "DELETE", "PATCH"]),
        prop::collection::vec("[a-z0-9_-]{1,8}", 0..4),
        prop::collection::btree_map("[a-z]{1,6}", ".{0,10}", 0..4),
        prop::collection::btree_map("x-[a-z]{1,8}", "[!-~]([ -~]{0,16}[!-~])?", 0..4),
        prop::collection::vec(any::<u8>(), 0..64),
        "[A-Za-z0-9/+]{1,40}",
    )
        .prop_map(|(method, segments, query, headers, body, secret)| Request {
            method,
            path: format!("/{}", segments.join("/")),
            query,
            headers,
            body,
            secret,
        })
}

impl Request {
    fn signing_context(&self) -> SigningContext {
        let endpoint = format!("http://svc.internal:8080{}", self.path);
        let mut ctx = SigningContext::new(self.method, endpoint.parse().unwrap())
            .with_body(self.body.clone())
            .with_credentials("AKID", self.secret.clone());
        for (k, v) in &self.query {
            ctx = ctx.with_query(k.clone(), v.clone());
        }
        for (k, v) in &self.headers {
            ctx = ctx.with_header(k.clone(), v.clone());
        }
        ctx
    }

    fn provider(&self) -> StaticCredentialProvider {
        StaticCredentialProvider::new(vec![("AKID".to_owned(), self.secret.clone())])
    }
}

fn sign_and_receive(request: &Request) -> VerifyingContext {
    let ctx = request.signing_context();
    let result = Signer::new().sign_at(&ctx, fixed_now()).unwrap();
    VerifyingContext::from_signed(&ctx, &result).unwrap()
}

proptest! {
    #[test]
    fn signed_requests_verify(request in arb_request()) {
        let incoming = sign_and_receive(&request);
        let ok = tokio_test::block_on(
            Validator::default().verify(&incoming, &request.provider()),
        );
        prop_assert!(ok);
    }

    #[test]
    fn signing_is_deterministic(request in arb_request()) {
        let ctx = request.signing_context();
        let a = Signer::new().sign_at(&ctx, fixed_now()).unwrap();
        let b = Signer::new().sign_at(&ctx, fixed_now()).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn body_tampering_is_detected(request in arb_request(), extra in any::<u8>()) {
        let mut body = request.body.clone();
        body.push(extra);
        let incoming = sign_and_receive(&request).with_body(body);
        let ok = tokio_test::block_on(
            Validator::default().verify(&incoming, &request.provider()),
        );
        prop_assert!(!ok);
    }

    #[test]
    fn query_tampering_is_detected(request in arb_request(), key in "[a-z]{1,6}") {
        let incoming = sign_and_receive(&request);
        let tampered_value = request
            .query
            .get(&key)
            .map_or_else(|| "injected".to_owned(), |v| format!("{v}x"));
        let incoming = incoming.with_query(key, tampered_value);
        let ok = tokio_test::block_on(
            Validator::default().verify(&incoming, &request.provider()),
        );
        prop_assert!(!ok);
    }

    #[test]
    fn unsigned_headers_are_ignored(request in arb_request(), value in "[!-~]{1,20}") {
        let incoming = sign_and_receive(&request)
            .with_header("y-unsigned", &value)
            .unwrap();
        let ok = tokio_test::block_on(
            Validator::default().verify(&incoming, &request.provider()),
        );
        prop_assert!(ok);
    }

    #[test]
    fn whitespace_compression_is_idempotent(value in "[ \\ta-z]{0,30}") {
        let once = compress_whitespace(&value).into_owned();
        let twice = compress_whitespace(&once).into_owned();
        prop_assert!(!once.contains("  "));
        prop_assert_eq!(once, twice);
    }
}
