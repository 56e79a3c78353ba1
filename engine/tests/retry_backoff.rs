//! The segment fetcher retries transient upstream failures on the
//! linear-capped schedule (`min((attempt+1)*3s, 15s)`) and succeeds once
//! the upstream starts serving a real segment.

#[path = "support/mod.rs"]
mod support;

use offload_engine::fetch::fetch_to_file_default;

fn json_error_body() -> Vec<u8> {
    let mut body = br#"{"error": "still transcoding, try again shortly"}"#.to_vec();
    body.resize(body.len().max(120), b' ');
    body
}

#[tokio::test(start_paused = true)]
async fn retries_on_the_linear_capped_schedule_then_succeeds() {
    let server = support::MockServer::start().await;
    let path = "/hls/1/1080p/seg0.mp4";
    server.set_sequence(
        path,
        vec![
            (200, json_error_body()),
            (200, json_error_body()),
            (200, json_error_body()),
            (200, support::fake_segment_body()),
        ],
    );

    let client = reqwest::Client::new();
    let dest_dir = tempfile::tempdir().unwrap();
    let dest = dest_dir.path().join("0.mp4");

    let url = server.url(path);
    let handle = tokio::spawn(async move { fetch_to_file_default(&client, &url, &dest, None).await });

    // Three retries elapse at 3s, 6s, 9s before the fourth attempt (the
    // success) fires; advance virtual time past that before awaiting the
    // task so the sleeps between attempts don't block this test for real.
    tokio::time::advance(std::time::Duration::from_secs(20)).await;

    let bytes = handle.await.unwrap().unwrap();
    assert_eq!(bytes, 200);
    assert_eq!(server.hit_count(path), 4);
}

#[tokio::test(start_paused = true)]
async fn exhausting_the_retry_budget_surfaces_the_last_error() {
    let server = support::MockServer::start().await;
    let path = "/hls/1/1080p/seg0.mp4";
    server.set(path, 200, json_error_body());

    let client = reqwest::Client::new();
    let dest_dir = tempfile::tempdir().unwrap();
    let dest = dest_dir.path().join("0.mp4");
    let url = server.url(path);

    let handle = tokio::spawn(async move { fetch_to_file_default(&client, &url, &dest, None).await });

    // Default budget is 8 attempts, 7 gaps of at most 15s each: 105s is
    // comfortably past the worst case.
    tokio::time::advance(std::time::Duration::from_secs(120)).await;

    let result = handle.await.unwrap();
    assert!(result.is_err());
    assert_eq!(server.hit_count(path), 8);
}
