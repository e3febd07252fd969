mod common;

use axum::http::StatusCode;
use common::{SALES_CSV, XLSX_MIME, build_xlsx, setup};
use serde_json::json;

#[tokio::test]
async fn test_table_returns_rows_with_limit() {
    let app = setup().await;
    let token = app.user("Jo", "jo@x.com").await;
    let (_, body) = app.upload(&token, "sales.csv", "text/csv", SALES_CSV).await;
    let file_id = body["fileId"].as_str().unwrap();

    let (status, body) = app
        .json("GET", &format!("/api/auth/table/{}", file_id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["headers"], json!(["Product", "Revenue", "Region"]));
    assert_eq!(body["totalRows"], 3);
    assert_eq!(body["rows"][0], json!(["A", 10.0, "West"]));

    let (status, body) = app
        .json(
            "GET",
            &format!("/api/auth/table/{}?limit=1", file_id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"].as_array().unwrap().len(), 1);
    assert_eq!(body["totalRows"], 3);
}

#[tokio::test]
async fn test_chart_groups_and_sums() {
    let app = setup().await;
    let token = app.user("Jo", "jo@x.com").await;
    let (_, body) = app.upload(&token, "sales.csv", "text/csv", SALES_CSV).await;
    let file_id = body["fileId"].as_str().unwrap();

    let (status, body) = app
        .json(
            "POST",
            &format!("/api/auth/chart/{}", file_id),
            Some(&token),
            Some(json!({
                "chartType": "bar",
                "xAxis": "Product",
                "yAxis": "Revenue",
                "groupBy": "Product",
                "aggregation": "sum"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "categorical");
    assert_eq!(body["chartType"], "bar");
    assert_eq!(body["labels"], json!(["A", "B"]));
    assert_eq!(body["datasets"][0]["data"], json!([15.0, 20.0]));
    assert_eq!(body["datasets"][0]["label"], "Revenue vs Product");
}

#[tokio::test]
async fn test_chart_average_and_count() {
    let app = setup().await;
    let token = app.user("Jo", "jo@x.com").await;
    let (_, body) = app.upload(&token, "sales.csv", "text/csv", SALES_CSV).await;
    let uri = format!("/api/auth/chart/{}", body["fileId"].as_str().unwrap());

    let (_, body) = app
        .json(
            "POST",
            &uri,
            Some(&token),
            Some(json!({
                "chartType": "pie",
                "xAxis": "Region",
                "yAxis": "Revenue",
                "groupBy": "Region",
                "aggregation": "average"
            })),
        )
        .await;
    assert_eq!(body["labels"], json!(["West", "East"]));
    assert_eq!(body["datasets"][0]["data"], json!([10.0, 12.5]));

    let (_, body) = app
        .json(
            "POST",
            &uri,
            Some(&token),
            Some(json!({
                "chartType": "line",
                "xAxis": "Product",
                "yAxis": "Revenue",
                "groupBy": "Product",
                "aggregation": "count"
            })),
        )
        .await;
    assert_eq!(body["datasets"][0]["data"], json!([2.0, 1.0]));
}

#[tokio::test]
async fn test_chart_rejects_bad_configuration() {
    let app = setup().await;
    let token = app.user("Jo", "jo@x.com").await;
    let (_, body) = app.upload(&token, "sales.csv", "text/csv", SALES_CSV).await;
    let uri = format!("/api/auth/chart/{}", body["fileId"].as_str().unwrap());

    let (status, body) = app
        .json(
            "POST",
            &uri,
            Some(&token),
            Some(json!({ "chartType": "bar", "xAxis": "Product", "yAxis": "Profit" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Profit"));

    let (status, body) = app
        .json(
            "POST",
            &uri,
            Some(&token),
            Some(json!({
                "chartType": "bar",
                "xAxis": "NoSuchColumn",
                "yAxis": "Revenue",
                "groupBy": "Product"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("NoSuchColumn"));

    let (status, _) = app
        .json(
            "POST",
            &uri,
            Some(&token),
            Some(json!({ "chartType": "3dscatter", "xAxis": "Product", "yAxis": "Revenue" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_spatial_chart_from_workbook() {
    let app = setup().await;
    let token = app.user("Jo", "jo@x.com").await;
    let workbook = build_xlsx(&[
        &["X", "Y", "Z"],
        &["1", "2", "3"],
        &["4", "5", "6"],
    ]);
    let (status, body) = app.upload(&token, "points.xlsx", XLSX_MIME, &workbook).await;
    assert_eq!(status, StatusCode::OK);
    let uri = format!("/api/auth/chart/{}", body["fileId"].as_str().unwrap());

    let (status, body) = app
        .json(
            "POST",
            &uri,
            Some(&token),
            Some(json!({ "chartType": "3dscatter", "xAxis": "X", "yAxis": "Y", "zAxis": "Z" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "spatial");
    assert_eq!(body["x"], json!([1.0, 4.0]));
    assert_eq!(body["z"], json!([3.0, 6.0]));
}

#[tokio::test]
async fn test_chart_of_foreign_file_is_not_found() {
    let app = setup().await;
    let jo = app.user("Jo", "jo@x.com").await;
    let sam = app.user("Sam", "sam@x.com").await;
    let (_, body) = app.upload(&jo, "sales.csv", "text/csv", SALES_CSV).await;
    let file_id = body["fileId"].as_str().unwrap();

    let (status, _) = app
        .json("GET", &format!("/api/auth/table/{}", file_id), Some(&sam), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
