//! # Resolver Scenario Tests
//!
//! Source resolution against a snapshot fetched from a fake store holding
//! `simple_secret`, `dict_secret` and a project-scoped `db_password`.

mod common;

use bitwarden_secrets_controller::controller::error::ResolutionError;
use bitwarden_secrets_controller::controller::resolver::{resolve_data, resolve_strings};
use bitwarden_secrets_controller::crd::SecretSource;
use bitwarden_secrets_controller::provider::{fetch_snapshot, StoreSnapshot};
use common::FakeStore;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;

async fn snapshot() -> StoreSnapshot {
    fetch_snapshot(&FakeStore::sample(), "token", None).await.unwrap()
}

fn one(source: SecretSource) -> BTreeMap<String, SecretSource> {
    BTreeMap::from([("out".to_string(), source)])
}

async fn resolve(source: SecretSource) -> Result<String, ResolutionError> {
    resolve_strings(&one(source), &snapshot().await)
        .map(|mut map| map.remove("out").unwrap_or_default())
}

#[tokio::test]
async fn test_plain_reference() {
    assert_eq!(
        resolve(SecretSource::reference("simple_secret", None)).await.unwrap(),
        "string value"
    );
}

#[tokio::test]
async fn test_literal_ignores_store() {
    assert_eq!(resolve(SecretSource::literal("literal")).await.unwrap(), "literal");
    assert_eq!(
        resolve_strings(&one(SecretSource::literal("literal")), &StoreSnapshot::default())
            .unwrap()["out"],
        "literal"
    );
}

#[tokio::test]
async fn test_top_level_key() {
    assert_eq!(
        resolve(SecretSource::reference("dict_secret", Some("key00"))).await.unwrap(),
        "dict value"
    );
}

#[tokio::test]
async fn test_dotted_path() {
    assert_eq!(
        resolve(SecretSource::reference("dict_secret", Some("nested.key01"))).await.unwrap(),
        "nested value"
    );
}

#[tokio::test]
async fn test_literal_dotted_key_wins_over_path() {
    assert_eq!(
        resolve(SecretSource::reference("dict_secret", Some("key.with.periods"))).await.unwrap(),
        "value not nested"
    );
}

#[tokio::test]
async fn test_key_on_plain_string_is_an_error() {
    let err = resolve(SecretSource::reference("simple_secret", Some("anything")))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ResolutionError::NotADictionary {
            secret: "simple_secret".into(),
            key: "anything".into()
        }
    );
    assert_eq!(
        err.to_string(),
        "Bitwarden secret simple_secret not in YAML dictionary format for anything"
    );
}

#[tokio::test]
async fn test_whole_dictionary_is_json() {
    let value = resolve(SecretSource::reference("dict_secret", Some("nested"))).await.unwrap();
    assert_eq!(value, r#"{"key01": "nested value"}"#);
}

#[tokio::test]
async fn test_project_scoped_reference() {
    let mut source = SecretSource::reference("db_password", None);
    source.project = Some("team".into());
    assert_eq!(resolve(source.clone()).await.unwrap(), "hunter2");

    source.project = Some("missing".into());
    assert_eq!(
        resolve(source).await.unwrap_err(),
        ResolutionError::ProjectNotFound("missing".into())
    );

    // The project must exist even when a literal is given
    let mut literal = SecretSource::literal("x");
    literal.project = Some("missing".into());
    assert!(resolve(literal).await.is_err());
}

#[tokio::test]
async fn test_snapshot_scoped_by_project_name() {
    let snapshot = fetch_snapshot(&FakeStore::sample(), "token", Some("team")).await.unwrap();
    assert_eq!(snapshot.secrets().len(), 1);
    assert_eq!(snapshot.secrets()[0].key, "db_password");

    let sources = one(SecretSource::reference("simple_secret", None));
    assert_eq!(
        resolve_strings(&sources, &snapshot),
        Err(ResolutionError::SecretNotFound("simple_secret".into()))
    );
}

#[tokio::test]
async fn test_data_encoding() {
    let snapshot = snapshot().await;

    let mut pre_encoded = SecretSource::literal("c3RyaW5nIHZhbHVl");
    pre_encoded.base64encode = false;
    let sources = BTreeMap::from([
        ("plain".to_string(), SecretSource::reference("simple_secret", None)),
        ("decoded".to_string(), pre_encoded),
    ]);

    let data = resolve_data(&sources, &snapshot).unwrap();
    assert_eq!(data["plain"], ByteString(b"string value".to_vec()));
    assert_eq!(data["decoded"], ByteString(b"string value".to_vec()));

    let mut invalid = SecretSource::reference("simple_secret", None);
    invalid.base64encode = false;
    assert!(matches!(
        resolve_data(&one(invalid), &snapshot),
        Err(ResolutionError::InvalidBase64 { key, .. }) if key == "out"
    ));
}
