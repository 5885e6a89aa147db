//! Contract tests for postcode to authority resolution through GOV.UK.

mod common;

use std::sync::Arc;

use bindays_core::{
    ClientSideRequest, CollectorError, GetCollectorResponse, Method,
    resolution::FIND_LOCAL_COUNCIL_URL,
};
use common::*;
use pretty_assertions::assert_eq;

fn start(service: &bindays_core::BinDaysService, postcode: &str) -> ClientSideRequest {
    match service.get_collector(postcode, None).expect("first step") {
        GetCollectorResponse::NextClientSideRequest(request) => request,
        GetCollectorResponse::Collector(meta) => panic!("resolved too early: {meta:?}"),
    }
}

#[test]
fn first_step_posts_the_formatted_postcode_without_redirects() {
    let service = service_with(Vec::new());
    let request = start(&service, "sw1a0aa");

    assert_eq!(request.request_id, 1);
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.url, FIND_LOCAL_COUNCIL_URL);
    assert_eq!(request.body.as_deref(), Some("postcode=SW1A+0AA"));
    assert!(!request.options.follow_redirects);
}

#[test]
fn redirect_resolves_a_registered_collector() {
    let service = service_with(vec![Arc::new(ScriptedCollector::new(
        "wealden",
        "Wealden District Council",
    ))]);
    let lookup = start(&service, "TN22 1AA");

    let redirect = respond_with_headers(
        &lookup,
        302,
        "",
        &[("Location", "https://www.gov.uk/find-local-council/wealden")],
    );
    let GetCollectorResponse::NextClientSideRequest(page) = service
        .get_collector("TN22 1AA", Some(&redirect))
        .expect("second step")
    else {
        panic!("expected authority page request");
    };
    assert_eq!(page.request_id, 2);
    assert_eq!(page.url, format!("{FIND_LOCAL_COUNCIL_URL}/wealden"));

    let html = r#"<div class="unitary-result">
        <p class="govuk-body">Your local authority is <strong>Wealden District Council</strong></p>
        <a href="/find-local-council/wealden">Share</a></div>"#;
    let resolved = service
        .get_collector("TN22 1AA", Some(&respond(&page, 200, html)))
        .expect("terminal step");

    let GetCollectorResponse::Collector(meta) = resolved else {
        panic!("expected collector");
    };
    assert_eq!(meta.id.0, "wealden");
    assert_eq!(meta.name, "Wealden District Council");
}

#[test]
fn multiple_candidates_use_the_first_option() {
    let service = service_with(Vec::new());
    let lookup = start(&service, "TN22 1AA");
    let html = r#"<form><select id="address" name="authority">
        <option value="">Choose your address</option>
        <option value="wealden|100060085791">1 High Street</option>
        <option value="lewes|100060085792">Hill Farm</option>
        </select></form>"#;

    let GetCollectorResponse::NextClientSideRequest(page) = service
        .get_collector("TN22 1AA", Some(&respond(&lookup, 200, html)))
        .expect("candidate step")
    else {
        panic!("expected authority page request");
    };
    assert_eq!(page.url, format!("{FIND_LOCAL_COUNCIL_URL}/wealden"));
    assert_eq!(page.method, Method::Get);
}

#[test]
fn authority_pages_without_a_self_link_resolve_from_the_first_step() {
    let service = service_with(vec![Arc::new(ScriptedCollector::new(
        "wealden",
        "Wealden District Council",
    ))]);
    let html = r#"<p class="govuk-body">Your local authority is <strong>Wealden District Council</strong></p>
        <a href="https://www.wealden.gov.uk/">Go to Wealden District Council website</a>"#;
    let candidates = r#"<select name="authority">
        <option value="wealden|100060085791">1 High Street</option>
        </select>"#;

    let lookup = start(&service, "TN22 1AA");
    let redirect = respond_with_headers(
        &lookup,
        302,
        "",
        &[("Location", "/find-local-council/wealden")],
    );
    let listed = respond(&lookup, 200, candidates);

    for first in [redirect, listed] {
        let GetCollectorResponse::NextClientSideRequest(page) = service
            .get_collector("TN22 1AA", Some(&first))
            .expect("second step")
        else {
            panic!("expected authority page request");
        };
        assert_eq!(page.options.metadata.get("authority").map(String::as_str), Some("wealden"));

        let GetCollectorResponse::Collector(meta) = service
            .get_collector("TN22 1AA", Some(&respond(&page, 200, html)))
            .expect("terminal step")
        else {
            panic!("expected collector");
        };
        assert_eq!(meta.id.0, "wealden");
    }
}

#[test]
fn missing_identifier_is_not_found_rather_than_a_crash() {
    let service = service_with(Vec::new());
    let lookup = start(&service, "TN22 1AA");

    let error = service
        .get_collector(
            "TN22 1AA",
            Some(&respond(&lookup, 200, "<html><body>Something else</body></html>")),
        )
        .expect_err("no identifier");
    assert!(matches!(error, CollectorError::AuthorityIdentifierNotFound(_)));

    let page = ClientSideRequest::get(2, format!("{FIND_LOCAL_COUNCIL_URL}/x"));
    let error = service
        .get_collector("TN22 1AA", Some(&respond(&page, 200, "<p>No links here</p>")))
        .expect_err("no identifier on page");
    assert!(matches!(error, CollectorError::AuthorityIdentifierNotFound(_)));
}

#[test]
fn rejected_postcode_is_invalid() {
    let service = service_with(Vec::new());
    let lookup = start(&service, "NOT A POSTCODE");
    let html = r##"<div class="govuk-error-summary"><a href="#postcode">This isn&#39;t a valid postcode.</a></div>"##;

    let error = service
        .get_collector("NOT A POSTCODE", Some(&respond(&lookup, 200, html)))
        .expect_err("invalid postcode");
    assert!(matches!(error, CollectorError::InvalidPostcode(_)));
    assert!(error.is_not_found());
}

#[test]
fn unregistered_authority_is_unsupported_with_its_name() {
    let service = service_with(Vec::new());
    let page = ClientSideRequest::get(2, format!("{FIND_LOCAL_COUNCIL_URL}/example-collector"));
    let html = r#"<p>Your local authority is</p><p><strong>Example Collector</strong></p>
        <link rel="canonical" href="https://www.gov.uk/find-local-council/example-collector">"#;

    let error = service
        .get_collector("SW1A 0AA", Some(&respond(&page, 200, html)))
        .expect_err("unsupported");
    match error {
        CollectorError::UnsupportedAuthority { id, name } => {
            assert_eq!(id, "example-collector");
            assert_eq!(name, "Example Collector");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn two_tier_areas_prefer_the_district() {
    let service = service_with(vec![Arc::new(ScriptedCollector::new(
        "wealden",
        "Wealden District Council",
    ))]);
    let page = ClientSideRequest::get(2, format!("{FIND_LOCAL_COUNCIL_URL}/wealden"));
    let html = r#"
        <div class="county-result">
          <p>Your county council is <strong>East Sussex County Council</strong></p>
          <a href="/find-local-council/east-sussex">East Sussex</a>
        </div>
        <div class="district-result">
          <p>Your district council is <strong>Wealden District Council</strong></p>
          <a href="/find-local-council/wealden">Wealden</a>
        </div>"#;

    let GetCollectorResponse::Collector(meta) = service
        .get_collector("TN22 1AA", Some(&respond(&page, 200, html)))
        .expect("resolved")
    else {
        panic!("expected collector");
    };
    assert_eq!(meta.id.0, "wealden");
}

#[test]
fn inline_result_page_resolves_without_a_second_request() {
    let service = service_with(vec![Arc::new(ScriptedCollector::new(
        "wealden",
        "Wealden District Council",
    ))]);
    let lookup = start(&service, "TN22 1AA");
    let html = r#"<p>Your local authority is <strong>Wealden District Council</strong></p>
        <form action="/find-local-council/wealden"></form>"#;

    assert!(matches!(
        service.get_collector("TN22 1AA", Some(&respond(&lookup, 200, html))),
        Ok(GetCollectorResponse::Collector(_))
    ));
}

#[test]
fn foreign_request_id_is_a_protocol_violation() {
    let service = service_with(Vec::new());
    let stray = ClientSideRequest::get(3, "https://www.gov.uk/");

    assert!(matches!(
        service.get_collector("TN22 1AA", Some(&respond(&stray, 200, ""))),
        Err(CollectorError::ProtocolViolation { request_id: 3, .. })
    ));
}
