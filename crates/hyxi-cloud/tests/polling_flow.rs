// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of HYXi Cloud.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! End-to-end polling against a mocked HYXi cloud

use hyxi_cloud::api::{
    DEVICE_DATA_PATH, DEVICE_INFO_PATH, DEVICE_PAGE_PATH, PLANT_PAGE_PATH, TOKEN_PATH,
};
use hyxi_cloud::metrics::{BAT_CHARGING, GRID_EXPORT, HOME_LOAD, LAST_SEEN};
use hyxi_cloud::{
    DeviceKind, HyxiConfig, MetricValue, PollCoordinator, PollError, PollingClient, RetryPolicy,
};
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{Value, json};
use std::time::Duration;

fn ok(data: Value) -> String {
    json!({"success": true, "code": 200, "message": "ok", "data": data}).to_string()
}

fn items(pairs: Value) -> Value {
    Value::Array(
        pairs
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| json!({"dataKey": k, "dataValue": v}))
            .collect(),
    )
}

fn config(server: &ServerGuard) -> HyxiConfig {
    HyxiConfig {
        access_key: "ak-test".to_owned(),
        secret_key: "sk-test".to_owned(),
        base_url: format!("{}/", server.url()),
        enable_virtual_battery: true,
        ..HyxiConfig::default()
    }
}

fn coordinator(server: &ServerGuard) -> PollCoordinator<PollingClient> {
    let client = PollingClient::new(&config(server)).unwrap();
    PollCoordinator::new(client, RetryPolicy::new(2, Duration::from_millis(10)), true)
}

async fn device_call(server: &mut ServerGuard, path: &str, serial: &str, body: String) -> Mock {
    server
        .mock("GET", path)
        .match_query(Matcher::UrlEncoded("deviceSn".into(), serial.into()))
        .match_header("authorization", "Bearer tok-e2e")
        .with_body(body)
        .create_async()
        .await
}

/// Two plants: a hybrid inverter with a collector, and a standalone battery.
async fn mock_fleet(server: &mut ServerGuard) -> Vec<Mock> {
    let mut mocks = vec![
        server
            .mock("POST", TOKEN_PATH)
            .match_header("sign-headers", "grantType")
            .with_body(ok(json!({"token": "tok-e2e"})))
            .expect(1)
            .create_async()
            .await,
        server
            .mock("POST", PLANT_PAGE_PATH)
            .with_body(ok(json!({"list": [{"plantId": "P-1"}, {"plantId": 2002}], "total": 2})))
            .create_async()
            .await,
        server
            .mock("POST", DEVICE_PAGE_PATH)
            .match_body(Matcher::PartialJson(json!({"plantId": "P-1"})))
            .with_body(ok(json!({"deviceList": [
                {
                    "deviceSn": "HYB-1",
                    "deviceType": "HYBRID_INVERTER",
                    "deviceName": "Roof",
                    "swVer": "V1.0"
                },
                {"deviceSn": "COL-1", "deviceType": "COLLECTOR"}
            ]})))
            .create_async()
            .await,
        server
            .mock("POST", DEVICE_PAGE_PATH)
            .match_body(Matcher::PartialJson(json!({"plantId": "2002"})))
            .with_body(ok(json!([{"deviceSn": "BAT-1", "deviceType": "BATTERY"}])))
            .create_async()
            .await,
    ];

    mocks.push(
        device_call(
            server,
            DEVICE_DATA_PATH,
            "HYB-1",
            ok(items(json!({
                "gridP": "3.0",
                "pbat": "-150",
                "ph1Loadp": "400.5",
                "ph2Loadp": "",
                "ph3Loadp": "99.5",
                "batSoc": "80",
                "batSoh": "98"
            }))),
        )
        .await,
    );
    mocks.push(
        device_call(
            server,
            DEVICE_INFO_PATH,
            "HYB-1",
            ok(items(json!({"swVerMaster": "M2.3", "maxChargingDischargingPower": 6000}))),
        )
        .await,
    );
    mocks.push(
        device_call(
            server,
            DEVICE_INFO_PATH,
            "COL-1",
            ok(items(json!({"signalIntensity": 72, "wifiVer": "W1"}))),
        )
        .await,
    );
    mocks.push(
        device_call(
            server,
            DEVICE_DATA_PATH,
            "BAT-1",
            ok(items(json!({"batSoc": 60, "batSoh": 96, "pbat": 200}))),
        )
        .await,
    );
    mocks.push(
        device_call(
            server,
            DEVICE_INFO_PATH,
            "BAT-1",
            ok(json!([{"dataKey": "batCap", "dataValue": 10.24}])),
        )
        .await,
    );
    mocks
}

#[tokio::test]
async fn test_full_poll_builds_snapshot() {
    let mut server = Server::new_async().await;
    let mocks = mock_fleet(&mut server).await;
    let mut coordinator = coordinator(&server);

    assert_eq!(coordinator.refresh().await.unwrap(), 1);
    let snapshot = coordinator.current_snapshot();
    assert_eq!(
        snapshot.serials().collect::<Vec<_>>(),
        vec!["BAT-1", "COL-1", "HYB-1"]
    );

    let hybrid = snapshot.get("HYB-1").unwrap();
    assert_eq!(hybrid.kind(), DeviceKind::Hybrid);
    assert_eq!(hybrid.device.device_name, "Roof");
    assert_eq!(hybrid.device.sw_version.as_deref(), Some("M2.3"));
    assert_eq!(hybrid.metrics.number(GRID_EXPORT), 3000.0);
    assert_eq!(hybrid.metrics.number(BAT_CHARGING), 150.0);
    assert_eq!(hybrid.metrics.number(HOME_LOAD), 500.0);
    assert_eq!(hybrid.metrics.number("maxChargePower"), 6000.0);
    assert_eq!(
        hybrid.metrics.get("gridP"),
        Some(&MetricValue::Text("3.0".to_owned()))
    );

    let collector = snapshot.get("COL-1").unwrap();
    assert_eq!(collector.device.device_name, "Collector COL-1");
    assert_eq!(collector.metrics.number("signalIntensity"), 72.0);
    assert!(collector.metrics.contains_key(LAST_SEEN));

    let health = coordinator.health();
    assert!(health.cloud_online);
    assert_eq!(health.last_attempts, 1);
    assert!(health.last_success.is_some());

    let aggregate = coordinator.aggregate_summary().unwrap();
    assert_eq!(aggregate.device_count, 2);
    assert_eq!(aggregate.avg_soc, 70.0);
    assert_eq!(aggregate.avg_soh, 97.0);
    assert_eq!(aggregate.battery_power, 50.0);

    for mock in &mocks {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn test_outage_keeps_last_snapshot() {
    let mut server = Server::new_async().await;
    let mocks = mock_fleet(&mut server).await;
    let mut coordinator = coordinator(&server);

    coordinator.refresh().await.unwrap();
    let before = coordinator.current_snapshot();
    let last_success = coordinator.health().last_success;

    // Every request now hits an unmatched route and gets a 501.
    for mock in &mocks {
        mock.remove_async().await;
    }

    let err = coordinator.refresh().await.unwrap_err();
    assert!(matches!(err, PollError::Unreachable { attempts: 2, .. }));
    assert_eq!(coordinator.current_snapshot(), before);

    let health = coordinator.health();
    assert!(!health.cloud_online);
    assert_eq!(health.last_attempts, 2);
    assert_eq!(health.last_success, last_success);
    assert!(coordinator.aggregate_summary().is_some());
}

#[tokio::test]
async fn test_failed_device_listings_keep_last_snapshot() {
    let mut server = Server::new_async().await;
    let mocks = mock_fleet(&mut server).await;
    let mut coordinator = coordinator(&server);

    coordinator.refresh().await.unwrap();
    let before = coordinator.current_snapshot();

    // mocks[2] and mocks[3] are the device listings of P-1 and 2002.
    for mock in &mocks[2..4] {
        mock.remove_async().await;
    }
    let _unavailable = server
        .mock("POST", DEVICE_PAGE_PATH)
        .match_body(Matcher::PartialJson(json!({"plantId": "P-1"})))
        .with_status(503)
        .create_async()
        .await;
    let _busy = server
        .mock("POST", DEVICE_PAGE_PATH)
        .match_body(Matcher::PartialJson(json!({"plantId": "2002"})))
        .with_body(json!({"success": false, "code": "500", "message": "system busy"}).to_string())
        .create_async()
        .await;

    let err = coordinator.refresh().await.unwrap_err();
    assert!(matches!(err, PollError::Unreachable { attempts: 2, .. }));
    assert_eq!(coordinator.current_snapshot(), before);
    assert!(!coordinator.health().cloud_online);
    assert!(coordinator.aggregate_summary().is_some());
}

#[tokio::test]
async fn test_rejected_credentials_stop_after_one_attempt() {
    let mut server = Server::new_async().await;
    let token = server
        .mock("POST", TOKEN_PATH)
        .with_status(403)
        .expect(1)
        .create_async()
        .await;
    let plants = server
        .mock("POST", PLANT_PAGE_PATH)
        .expect(0)
        .create_async()
        .await;

    let mut coordinator = coordinator(&server);
    let err = coordinator.refresh().await.unwrap_err();

    assert!(err.is_auth_rejected());
    assert_eq!(err.attempts(), 1);
    assert!(coordinator.health().auth_required);
    token.assert_async().await;
    plants.assert_async().await;
}

#[tokio::test]
async fn test_validate_credentials() {
    let mut server = Server::new_async().await;
    let _token = server
        .mock("POST", TOKEN_PATH)
        .with_body(json!({"success": false, "code": 401, "message": "sign error"}).to_string())
        .create_async()
        .await;

    let client = PollingClient::new(&config(&server)).unwrap();
    let err = client.validate_credentials().await.unwrap_err();
    assert!(matches!(err, hyxi_cloud::TokenError::AuthRejected(m) if m == "sign error"));
}
