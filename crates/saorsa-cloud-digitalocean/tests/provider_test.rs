//! DigitalOcean provider tests against a mock API server

use mockito::{Matcher, Server, ServerGuard};
use saorsa_cloud::{CloudError, ComputeProvider, InstanceSpec, PollPolicy, VolumeSpec};
use saorsa_cloud_digitalocean::{DigitalOceanConfig, DigitalOceanProvider};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const TOKEN: &str = "test-token";

fn provider_for(server: &ServerGuard) -> DigitalOceanProvider {
    let config = DigitalOceanConfig::new(TOKEN)
        .with_base_url(server.url())
        .with_activation_policy(PollPolicy::new(
            Duration::from_millis(10),
            Duration::from_secs(5),
        ))
        .with_detach_settle(Duration::ZERO);
    DigitalOceanProvider::new(config)
}

fn bootstrap_spec() -> InstanceSpec {
    InstanceSpec {
        name: "DEV-01-saorsa-bootstrap".to_string(),
        region: "lon1".to_string(),
        size: "s-2vcpu-4gb".to_string(),
        image: "ubuntu-24-04-x64".to_string(),
        ssh_keys: vec![36971688, 30643816],
    }
}

fn droplet_json(id: u64, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": "DEV-01-saorsa-bootstrap",
        "status": status,
        "region": { "slug": "lon1" },
        "networks": {
            "v4": [
                { "ip_address": "10.106.0.2", "type": "private" },
                { "ip_address": "143.198.100.50", "type": "public" }
            ]
        }
    })
}

#[tokio::test]
async fn test_existing_droplet_is_reused() {
    let mut server = Server::new_async().await;

    let list = server
        .mock("GET", "/droplets")
        .match_query(Matcher::UrlEncoded(
            "name".into(),
            "DEV-01-saorsa-bootstrap".into(),
        ))
        .match_header("authorization", "Bearer test-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "droplets": [droplet_json(42, "active")] }).to_string())
        .create_async()
        .await;
    let create = server
        .mock("POST", "/droplets")
        .expect(0)
        .create_async()
        .await;

    let provider = provider_for(&server);
    let ensured = provider.ensure_instance(&bootstrap_spec()).await.unwrap();

    assert_eq!(ensured.id, 42);
    assert_eq!(ensured.ip_address, "143.198.100.50");
    assert!(!ensured.created);
    list.assert_async().await;
    create.assert_async().await;
}

#[tokio::test]
async fn test_ensure_twice_creates_once() {
    let mut server = Server::new_async().await;

    let listed = Arc::new(AtomicUsize::new(0));
    let counter = listed.clone();
    let _list = server
        .mock("GET", "/droplets")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body_from_request(move |_| {
            let droplets = if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                json!([])
            } else {
                json!([droplet_json(42, "active")])
            };
            json!({ "droplets": droplets }).to_string().into()
        })
        .create_async()
        .await;
    let create = server
        .mock("POST", "/droplets")
        .match_body(Matcher::PartialJson(json!({
            "name": "DEV-01-saorsa-bootstrap",
            "region": "lon1",
            "size": "s-2vcpu-4gb",
            "image": "ubuntu-24-04-x64",
            "ssh_keys": [36971688, 30643816]
        })))
        .with_status(202)
        .with_header("content-type", "application/json")
        .with_body(json!({ "droplet": droplet_json(42, "new") }).to_string())
        .expect(1)
        .create_async()
        .await;
    let _get = server
        .mock("GET", "/droplets/42")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "droplet": droplet_json(42, "active") }).to_string())
        .create_async()
        .await;

    let provider = provider_for(&server);
    let first = provider.ensure_instance(&bootstrap_spec()).await.unwrap();
    let second = provider.ensure_instance(&bootstrap_spec()).await.unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.id, second.id);
    assert_eq!(second.ip_address, "143.198.100.50");
    create.assert_async().await;
    assert_eq!(listed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_activation_timeout() {
    let mut server = Server::new_async().await;

    let _list = server
        .mock("GET", "/droplets")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!({ "droplets": [] }).to_string())
        .create_async()
        .await;
    let _create = server
        .mock("POST", "/droplets")
        .with_status(202)
        .with_body(json!({ "droplet": droplet_json(7, "new") }).to_string())
        .create_async()
        .await;
    let _get = server
        .mock("GET", "/droplets/7")
        .with_status(200)
        .with_body(json!({ "droplet": droplet_json(7, "new") }).to_string())
        .create_async()
        .await;

    let config = DigitalOceanConfig::new(TOKEN)
        .with_base_url(server.url())
        .with_activation_policy(PollPolicy::new(
            Duration::from_millis(10),
            Duration::from_millis(50),
        ));
    let provider = DigitalOceanProvider::new(config);

    let err = provider.ensure_instance(&bootstrap_spec()).await.unwrap_err();
    assert!(matches!(err, CloudError::ProvisioningTimeout { ref resource, .. } if resource == "Droplet 7"));
}

#[tokio::test]
async fn test_api_error_surfaces_status_and_body() {
    let mut server = Server::new_async().await;

    let _list = server
        .mock("GET", "/droplets")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body(r#"{"id":"unauthorized","message":"Unable to authenticate you"}"#)
        .create_async()
        .await;

    let provider = provider_for(&server);
    let err = provider
        .find_instance("DEV-01-saorsa-bootstrap")
        .await
        .unwrap_err();

    match err {
        CloudError::Api { status, body } => {
            assert_eq!(status, 401);
            assert_eq!(
                body,
                r#"{"id":"unauthorized","message":"Unable to authenticate you"}"#
            );
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_volume_created_with_ext4() {
    let mut server = Server::new_async().await;

    let _list = server
        .mock("GET", "/volumes")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("name".into(), "dev-01-saorsa-bootstrap-storage".into()),
            Matcher::UrlEncoded("region".into(), "lon1".into()),
        ]))
        .with_status(200)
        .with_body(json!({ "volumes": [] }).to_string())
        .create_async()
        .await;
    let create = server
        .mock("POST", "/volumes")
        .match_body(Matcher::Json(json!({
            "size_gigabytes": 35,
            "name": "dev-01-saorsa-bootstrap-storage",
            "region": "lon1",
            "filesystem_type": "ext4"
        })))
        .with_status(201)
        .with_body(
            json!({
                "volume": {
                    "id": "506f78a4-e098-11e5-ad9f-000f53306ae1",
                    "name": "dev-01-saorsa-bootstrap-storage",
                    "region": { "slug": "lon1" },
                    "droplet_ids": []
                }
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let provider = provider_for(&server);
    let ensured = provider
        .ensure_volume(&VolumeSpec {
            name: "dev-01-saorsa-bootstrap-storage".to_string(),
            region: "lon1".to_string(),
            size_gb: 35,
        })
        .await
        .unwrap();

    assert!(ensured.created);
    assert_eq!(ensured.id, "506f78a4-e098-11e5-ad9f-000f53306ae1");
    create.assert_async().await;
}

#[tokio::test]
async fn test_attach_skipped_when_already_attached() {
    let mut server = Server::new_async().await;

    let _get = server
        .mock("GET", "/volumes/vol-1")
        .with_status(200)
        .with_body(
            json!({
                "volume": { "id": "vol-1", "name": "v", "droplet_ids": [42] }
            })
            .to_string(),
        )
        .create_async()
        .await;
    let action = server
        .mock("POST", "/volumes/vol-1/actions")
        .expect(0)
        .create_async()
        .await;

    let provider = provider_for(&server);
    let issued = provider.ensure_attached("vol-1", 42, "lon1").await.unwrap();

    assert!(!issued);
    action.assert_async().await;
}

#[tokio::test]
async fn test_attach_issued_when_unattached() {
    let mut server = Server::new_async().await;

    let _get = server
        .mock("GET", "/volumes/vol-1")
        .with_status(200)
        .with_body(
            json!({
                "volume": { "id": "vol-1", "name": "v", "droplet_ids": [] }
            })
            .to_string(),
        )
        .create_async()
        .await;
    let action = server
        .mock("POST", "/volumes/vol-1/actions")
        .match_body(Matcher::Json(json!({
            "type": "attach",
            "droplet_id": 42,
            "region": "lon1"
        })))
        .with_status(202)
        .with_body(r#"{"action":{"id":1,"status":"in-progress"}}"#)
        .expect(1)
        .create_async()
        .await;

    let provider = provider_for(&server);
    assert!(provider.ensure_attached("vol-1", 42, "lon1").await.unwrap());
    action.assert_async().await;
}

#[tokio::test]
async fn test_destroy_with_volume_sequence() {
    let mut server = Server::new_async().await;

    let detach = server
        .mock("POST", "/volumes/vol-1/actions")
        .match_body(Matcher::PartialJson(json!({ "type": "detach", "droplet_id": 42 })))
        .with_status(202)
        .with_body(r#"{"action":{"id":2,"status":"in-progress"}}"#)
        .expect(1)
        .create_async()
        .await;
    let delete_droplet = server
        .mock("DELETE", "/droplets/42")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;
    let delete_volume = server
        .mock("DELETE", "/volumes/vol-1")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let provider = provider_for(&server);
    provider
        .destroy_instance_with_volume(42, "vol-1", "lon1")
        .await
        .unwrap();

    detach.assert_async().await;
    delete_droplet.assert_async().await;
    delete_volume.assert_async().await;
}
