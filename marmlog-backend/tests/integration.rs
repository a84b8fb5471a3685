use marmlog_backend::{
    config::Config,
    server::{self, AppState},
};
use pretty_assertions::assert_eq;
use serde_json::json;

async fn spawn_app() -> String {
    let config: Config = serde_json::from_value(json!({ "dev": true })).unwrap();
    let app = server::app(AppState::new(&config).unwrap());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

fn submission() -> serde_json::Value {
    json!({
        "user_first_name": "Ahmed",
        "date": "2025-10-01",
        "marmoset": "Petra",
        "slab": "5",
        "tile": "7",
        "hemisphere": "Left hemisphere",
        "tile_location": "A1",
        "sort_method": "pooled",
        "facs_population": "NeuN+",
        "rxn_number": 2,
        "sorter_initials": "HT",
        "project": "HMBA_CjAtlas_Subcortex",
        "elab_link": "",
        "expected_recovery": 10000,
        "nuclei_concentration": "1,000",
        "nuclei_volume": 40,
        "cdna_amp_date": "251002",
        "rna_prep_date": "251003",
        "atac_prep_date": "251004",
        "rna_indices": "12a,3B",
        "atac_indices": "A1,B2",
        "cdna_concentration": "10,11",
        "percent_cdna_400bp": "50,60",
        "rna_lib_concentration": "4,5",
        "cdna_pcr_cycles": "7,7",
        "rna_sizes": "450,460",
        "library_cycles_rna": "14,14",
        "atac_lib_concentration": "2.5,3",
        "atac_sizes": "500,510",
        "library_cycles_atac": "9,9",
    })
}

#[tokio::test]
async fn api_round_trip() {
    let app_address = spawn_app().await;
    let client = reqwest::Client::new();

    let health = client
        .get(format!("{app_address}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status().as_u16(), 200);

    // A valid submission appends one RNA and one ATAC row per reaction
    let response: serde_json::Value = client
        .post(format!("{app_address}/submit"))
        .json(&submission())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(response["success"], json!(true));
    assert_eq!(response["rows_appended"], json!(4));
    assert_eq!(
        response["barcoded_cell_sample_names"],
        json!(["P0090_1", "P0090_2"])
    );

    // Missing required fields are named, nothing is written
    let mut incomplete = submission();
    incomplete.as_object_mut().unwrap().remove("date");
    let response = client
        .post(format!("{app_address}/submit"))
        .json(&incomplete)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 422);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], json!(false));
    assert!(body["reason"].as_str().unwrap().contains("date"));

    let mut unknown_donor = submission();
    unknown_donor["marmoset"] = json!("Garfield");
    let body: serde_json::Value = client
        .post(format!("{app_address}/submit"))
        .json(&unknown_donor)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["error"]["type"], json!("unknown_donor"));

    // The download carries everything appended so far
    let download = client
        .get(format!("{app_address}/download"))
        .query(&[("user", "Ahmed")])
        .send()
        .await
        .unwrap();

    assert_eq!(download.status().as_u16(), 200);
    assert_eq!(
        download.headers()["content-disposition"],
        "attachment; filename=\"Ahmed_krienen_data_log.csv\""
    );
    let body = download.text().await.unwrap();
    assert!(body.starts_with("krienen_lab_identifier,"));
    assert!(body.contains("251001_HMBA_cjPetra_Slab5_Tile7_pooled_RNA1"));
    assert!(body.contains("APHTXR_251002_1_B"));

    // The counter override redirects the next allocation
    let body: serde_json::Value = client
        .post(format!("{app_address}/counter"))
        .json(&json!({ "user": "Ahmed", "next_chip": 120 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["next_chip"], json!(120));

    let body: serde_json::Value = client
        .get(format!("{app_address}/counter"))
        .query(&[("user", "Ahmed")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["next_chip"], json!(120));

    let response: serde_json::Value = client
        .post(format!("{app_address}/submit"))
        .json(&submission())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        response["barcoded_cell_sample_names"],
        json!(["P0120_1", "P0120_2"])
    );
}

#[tokio::test]
async fn downloads_for_a_new_user_create_an_empty_log() {
    let app_address = spawn_app().await;
    let client = reqwest::Client::new();

    let download = client
        .get(format!("{app_address}/download"))
        .query(&[("user", "Maria")])
        .send()
        .await
        .unwrap();

    assert_eq!(download.status().as_u16(), 200);
    let body = download.text().await.unwrap();
    assert_eq!(body.lines().count(), 1);
    assert!(body.starts_with("krienen_lab_identifier,"));
}
