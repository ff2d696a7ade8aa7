use std::sync::Arc;

use fieldmesh_engine::{EngineConfig, FieldSource, FixtureGateway, FixtureResponse, ProviderErrorKind, Resolver};
use fieldmesh_types::ParameterMap;
use serde_json::{Map as JsonMap, Value, json};

fn load_config() -> EngineConfig {
    EngineConfig::from_yaml_str(include_str!("data/engine.yaml")).expect("load engine config from fixture")
}

fn object(value: Value) -> JsonMap<String, Value> {
    value.as_object().cloned().expect("object literal")
}

fn params(symbol: &str) -> ParameterMap {
    object(json!({ "symbol": symbol }))
}

#[tokio::test]
async fn per_field_chain_falls_back_when_primary_fails() {
    let gateway = Arc::new(
        FixtureGateway::new()
            .with_response("ep1", FixtureResponse::Error(ProviderErrorKind::Unavailable))
            .with_response("ep2", FixtureResponse::Map(object(json!({"org_name": "Acme Corp", "ind_name": "Banking"})))),
    );
    let resolver = Resolver::new(load_config(), gateway.clone());

    let resolution = resolver.resolve("company_profile", &params("600000")).await.expect("resolution");

    assert_eq!(
        serde_json::to_value(&resolution.record).expect("serialize record"),
        json!({"name": "Acme Corp", "industry": "Banking"})
    );
    assert!(resolution.missing.is_empty());
    assert_eq!(gateway.fetch_count("ep1"), 1);
    assert_eq!(gateway.fetch_count("ep2"), 1);
    assert_eq!(resolution.report.fetch_count("ep2"), 1);
    assert_eq!(
        resolution.report.source_of("name"),
        Some(&FieldSource::Endpoint {
            endpoint: "ep2".into(),
            depth: 1,
        })
    );
    assert_eq!(resolution.report.depth_reached, 2);

    let ep2_call = gateway.calls().into_iter().find(|call| call.endpoint == "ep2").expect("ep2 called");
    assert_eq!(ep2_call.provider, "backup");
    assert_eq!(ep2_call.params, object(json!({"stock_code": "SH600000"})));
}

#[tokio::test]
async fn global_chain_stops_once_every_field_resolves() {
    let gateway = Arc::new(
        FixtureGateway::new()
            .with_response("quote_em", FixtureResponse::Rows(vec![object(json!({"code": "600000", "name": "X Bank"}))]))
            .with_response("quote_xq", FixtureResponse::Map(object(json!({"symbol": "SH600000", "name": "Other"})))),
    );
    let resolver = Resolver::new(load_config(), gateway.clone());

    let resolution = resolver.resolve("stock_quote", &params("600000")).await.expect("resolution");

    assert_eq!(resolution.record.get("code"), Some(&json!("600000")));
    assert_eq!(resolution.record.get("name"), Some(&json!("X Bank")));
    assert!(resolution.missing.is_empty());
    assert_eq!(gateway.fetch_count("quote_em"), 1);
    assert_eq!(gateway.fetch_count("quote_xq"), 0);
    assert_eq!(resolution.report.fetches.len(), 1);
}

#[tokio::test]
async fn global_chain_continues_past_partial_endpoints() {
    let gateway = Arc::new(
        FixtureGateway::new()
            .with_response("quote_em", FixtureResponse::Rows(vec![object(json!({"code": "600000", "name": "NaN"}))]))
            .with_response("quote_xq", FixtureResponse::Map(object(json!({"symbol": "SH600000", "name": "X Bank"})))),
    );
    let resolver = Resolver::new(load_config(), gateway.clone());

    let resolution = resolver.resolve("stock_quote", &params("600000")).await.expect("resolution");

    assert_eq!(resolution.record.get("code"), Some(&json!("600000")));
    assert_eq!(resolution.record.get("name"), Some(&json!("X Bank")));
    assert_eq!(gateway.fetch_count("quote_xq"), 1);
}

#[tokio::test]
async fn epoch_millis_list_dates_become_iso_dates() {
    let gateway = Arc::new(FixtureGateway::new().with_response(
        "xq_profile",
        FixtureResponse::Map(object(json!({
            "listed_date": 761_270_400_000_i64,
            "affiliate_industry": {"ind_name": "Banking", "ind_code": "BK0475"}
        }))),
    ));
    let resolver = Resolver::new(load_config(), gateway.clone());

    let resolution = resolver.resolve("stock_listing", &params("600000")).await.expect("resolution");

    assert_eq!(resolution.record.get("list_date"), Some(&json!("1994-02-15")));
    assert_eq!(resolution.record.get("industry"), Some(&json!("Banking")));
    assert_eq!(resolution.record.get("market"), Some(&json!("SH")));
    assert_eq!(resolution.record.get("status"), Some(&json!("listed")));
    assert_eq!(resolution.report.source_of("market"), Some(&FieldSource::Derived));
    assert!(resolution.missing.is_empty());
}

#[tokio::test]
async fn list_date_conversion_counts_whole_utc_days() {
    let gateway = Arc::new(
        FixtureGateway::new().with_response("xq_profile", FixtureResponse::Map(object(json!({"listed_date": 760_291_200_000_i64})))),
    );
    let resolver = Resolver::new(load_config(), gateway);

    let resolution = resolver.resolve("stock_listing", &params("002156")).await.expect("resolution");

    assert_eq!(resolution.record.get("list_date"), Some(&json!("1994-02-03")));
    assert_eq!(resolution.record.get("market"), Some(&json!("SZ")));
    assert!(resolution.missing.contains("industry"));
}

#[tokio::test]
async fn concurrent_calls_never_share_endpoint_results() {
    let gateway = Arc::new(FixtureGateway::new().with_responder("ep2", |params| {
        let code = params.get("stock_code").and_then(Value::as_str).unwrap_or_default();
        let name = match code {
            "SZ002156" => "Tongfu Microelectronics",
            "SH600000" => "Pudong Development Bank",
            _ => "",
        };
        FixtureResponse::Map(object(json!({"org_name": name})))
    }));
    let resolver = Resolver::new(load_config(), gateway.clone());

    let first_params = params("002156");
    let second_params = params("600000");
    let (first, second) = tokio::join!(
        resolver.resolve("company_names", &first_params),
        resolver.resolve("company_profile", &second_params),
    );
    let first = first.expect("first resolution");
    let second = second.expect("second resolution");

    assert_eq!(first.record.get("name"), Some(&json!("Tongfu Microelectronics")));
    assert_eq!(second.record.get("name"), Some(&json!("Pudong Development Bank")));
    assert_eq!(gateway.fetch_count("ep2"), 2);

    let mut codes: Vec<Value> = gateway
        .calls()
        .into_iter()
        .filter(|call| call.endpoint == "ep2")
        .filter_map(|call| call.params.get("stock_code").cloned())
        .collect();
    codes.sort_by_key(Value::to_string);
    assert_eq!(codes, vec![json!("SH600000"), json!("SZ002156")]);
}
