//! # Envelope Round-Trip Properties
//!
//! For any valid request, the built envelope parses back to the same
//! request, carries a 15-digit NSU, and a server echoing the request's NSU
//! and taxpayer back yields a response the client reads the same values
//! from.

use dfe_client::{
    build_request, parse_request, parse_response, DistributionQuery, DistributionRequest,
    ProtocolClient,
};
use dfe_core::{AccessKey, AuthorityCode, Cnpj, Environment, Nsu};
use proptest::prelude::*;
use url::Url;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const AUTHORITIES: [u8; 28] = [
    11, 12, 13, 14, 15, 16, 17, 21, 22, 23, 24, 25, 26, 27, 28, 29, 31, 32, 33, 35, 41, 42, 43,
    50, 51, 52, 53, 91,
];

fn cnpj_strategy() -> impl Strategy<Value = Cnpj> {
    "[0-9]{12}".prop_filter_map("repeated-digit base", |base| Cnpj::from_base(&base).ok())
}

fn query_strategy() -> impl Strategy<Value = DistributionQuery> {
    prop_oneof![
        (0..=Nsu::MAX.value()).prop_map(|n| DistributionQuery::LastNsu(Nsu::new(n).unwrap())),
        (0..=Nsu::MAX.value()).prop_map(|n| DistributionQuery::SingleNsu(Nsu::new(n).unwrap())),
        "[0-9]{44}".prop_map(|k| DistributionQuery::AccessKey(AccessKey::new(k).unwrap())),
    ]
}

fn request_strategy() -> impl Strategy<Value = DistributionRequest> {
    (
        cnpj_strategy(),
        prop::sample::select(AUTHORITIES.to_vec()),
        prop_oneof![Just(Environment::Production), Just(Environment::Homologation)],
        query_strategy(),
    )
        .prop_map(|(cnpj, uf, environment, query)| DistributionRequest {
            cnpj,
            authority: AuthorityCode::new(uf).unwrap(),
            environment,
            query,
        })
}

proptest! {
    #[test]
    fn build_then_parse_recovers_request(req in request_strategy()) {
        let parsed = parse_request(&build_request(&req)).unwrap();
        prop_assert_eq!(parsed, req);
    }

    #[test]
    fn nsu_is_always_fifteen_padded_digits(n in 0..=Nsu::MAX.value()) {
        let req = DistributionRequest::incremental(
            Cnpj::new("11222333000181").unwrap(),
            AuthorityCode::NATIONAL,
            Environment::Production,
            Nsu::new(n).unwrap(),
        );
        let text = String::from_utf8(build_request(&req)).unwrap();
        let expected = format!("<ultNSU>{n:015}</ultNSU>");
        prop_assert!(text.contains(&expected));
    }
}

/// Answers with `ultNSU` set to the requested NSU and the requesting CNPJ
/// in `xMotivo`.
struct Echo;

impl Respond for Echo {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let parsed = parse_request(&request.body).expect("server parses request");
        let nsu = match parsed.query {
            DistributionQuery::LastNsu(n) | DistributionQuery::SingleNsu(n) => n,
            DistributionQuery::AccessKey(_) => Nsu::ZERO,
        };
        let body = format!(
            r#"<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope"><soap:Body><nfeDistDFeInteresseResponse><nfeDistDFeInteresseResult><retDistDFeInt><tpAmb>{}</tpAmb><cStat>137</cStat><xMotivo>{}</xMotivo><ultNSU>{}</ultNSU><maxNSU>{}</maxNSU></retDistDFeInt></nfeDistDFeInteresseResult></nfeDistDFeInteresseResponse></soap:Body></soap:Envelope>"#,
            parsed.environment.code(),
            parsed.cnpj,
            nsu.to_wire(),
            nsu.to_wire(),
        );
        ResponseTemplate::new(200).set_body_raw(body, "application/soap+xml; charset=utf-8")
    }
}

#[tokio::test]
async fn echoed_response_recovers_taxpayer_and_nsu() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::method("POST"))
        .respond_with(Echo)
        .mount(&server)
        .await;

    let client = ProtocolClient::new(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        0,
    );

    for (cnpj, n) in [("11222333000181", 0u64), ("11.222.333/0001-81", 42), ("11222333000181", 999_999_999_999_999)] {
        let req = DistributionRequest::incremental(
            Cnpj::new(cnpj).unwrap(),
            AuthorityCode::new(35).unwrap(),
            Environment::Homologation,
            Nsu::new(n).unwrap(),
        );
        let raw = client.send(&build_request(&req)).await.expect("send");
        let resp = parse_response(&raw).expect("parse");

        assert_eq!(resp.reason, req.cnpj.as_str());
        assert_eq!(resp.last_nsu, Some(Nsu::new(n).unwrap()));
        assert_eq!(resp.environment, Some(Environment::Homologation));
    }
}
