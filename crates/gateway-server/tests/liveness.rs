//! `GET /` is a plain liveness probe, reachable whether or not a device is
//! ever authenticated (spec §4.12).

mod common;

#[tokio::test]
async fn root_returns_liveness_text() {
    let addr = common::spawn_server(|_| {}).await;

    let response = reqwest::get(format!("http://{addr}/")).await.expect("request liveness endpoint");
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let body = response.text().await.expect("read body");
    assert!(body.contains("ok"), "unexpected liveness body: {body}");
}
