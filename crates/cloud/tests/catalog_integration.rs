//! Integration tests for the catalog client.
//!
//! Tests marked `#[ignore]` require network access to the public data
//! catalog. Run with: `cargo test -p eetools-cloud -- --ignored catalog`

use eetools_cloud::{CatalogClient, CatalogClientOptions, CloudError};

/// Resolve a well-known collection and read its citation metadata.
#[tokio::test]
#[ignore]
async fn catalog_landsat_doi_and_citation() {
    let client =
        CatalogClient::new(CatalogClientOptions::default()).expect("failed to create client");

    let doi = client.doi("LANDSAT/LC08/C02/T1_L2").await.expect("doi lookup failed");
    println!("doi: {doi}");
    assert!(!doi.is_empty());

    let citation = client
        .citation("LANDSAT/LC08/C02/T1_L2")
        .await
        .expect("citation lookup failed");
    println!("citation: {citation}");
    assert!(!citation.is_empty());
}

/// A missing project fails locally with a descriptive error.
#[tokio::test]
#[ignore]
async fn catalog_unknown_project_is_not_found() {
    let client =
        CatalogClient::new(CatalogClientOptions::default()).expect("failed to create client");

    let err = client
        .collection("NOT_A_PROJECT/NOT_A_COLLECTION")
        .await
        .expect_err("lookup should fail");
    match err {
        CloudError::NotFound { kind, name } => {
            assert_eq!(kind, "project");
            assert_eq!(name, "NOT_A_PROJECT");
        }
        other => panic!("expected NotFound, got {other}"),
    }
}
