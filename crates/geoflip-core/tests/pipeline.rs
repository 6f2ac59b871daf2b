use std::sync::Arc;
use std::time::Duration;

use geo::{Area, BoundingRect};
use geo_types::Geometry;
use geoflip_core::jobs::{InMemoryJobStore, JobStore, cleanup_job};
use geoflip_core::reproject::IdentityReprojector;
use geoflip_core::{
    ErrorKind, GeoflipConfig, JobOrchestrator, JobOutput, PipelineContext, TransformRequest, Upload,
};
use geoflip_core_common::FeatureReader;
use geoflip_shapefile::{ShapefileReader, ShapefileReaderOptions, extract_archive};
use serde_json::{Value, json};
use tempfile::TempDir;

const POLL: Duration = Duration::from_millis(10);

fn perth_point() -> Value {
    json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [115.8605, -31.9505]},
            "properties": {"name": "Perth GPO"}
        }]
    })
}

fn request(value: Value) -> TransformRequest {
    TransformRequest::from_value(value).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_buffered_point_to_shapefile() {
    let root = TempDir::new().unwrap();
    let orchestrator = JobOrchestrator::start(PipelineContext::new(GeoflipConfig::new(root.path()).with_workers(1)));

    let receipt = orchestrator
        .submit(
            request(json!({
                "input": {"format": "geojson", "data": perth_point()},
                "transformations": [{"type": "buffer", "params": {"distance": 50, "units": "meters"}}],
                "output": {"format": "shp", "epsg": 4326}
            })),
            Vec::new(),
        )
        .await
        .unwrap();
    assert_eq!(receipt.status, "queued");

    let status = orchestrator.wait_for_terminal(&receipt.job_id, POLL).await.unwrap();
    assert_eq!(status.status, "success", "job failed: {:?}", status.error);

    let JobOutput::File { path, file_name, .. } = orchestrator.result(&receipt.job_id).await.unwrap() else {
        panic!("expected a file result");
    };
    assert_eq!(file_name, "geoflip_shp_4326.zip");

    let listing_dir = root.path().join("listing");
    std::fs::create_dir(&listing_dir).unwrap();
    let mut listing = extract_archive(&path, &listing_dir).unwrap();
    listing.sort();
    assert!(listing.iter().any(|p| p.extension().is_some_and(|ext| ext == "shp")));
    assert!(listing.iter().any(|p| p.extension().is_some_and(|ext| ext == "prj")));

    let table = ShapefileReader::new(ShapefileReaderOptions::new().with_extract_dir(root.path().join("read")))
        .read_path(&path, None)
        .unwrap();
    assert_eq!(table.srid(), Some(4326));
    assert_eq!(table.len(), 1);

    let Some(Geometry::Polygon(polygon)) = table.features()[0].geometry.clone() else {
        panic!("expected a polygon");
    };
    // Roughly 100 m across, in degrees.
    let bounds = polygon.bounding_rect().unwrap();
    assert!((bounds.width() - 0.00106).abs() < 0.0002, "width {}", bounds.width());
    assert!((bounds.height() - 0.0009).abs() < 0.0002, "height {}", bounds.height());
    assert!(polygon.unsigned_area() > 0.0);
    assert!(bounds.min().x < 115.8605 && bounds.max().x > 115.8605);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_lifecycle_after_cleanup() {
    let root = TempDir::new().unwrap();
    let config = GeoflipConfig::new(root.path()).with_workers(2);
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new(config.job_expiry));
    let orchestrator = JobOrchestrator::start_with_store(
        PipelineContext::with_reprojector(config, Arc::new(IdentityReprojector)),
        Arc::clone(&store),
    );

    let file_job = orchestrator
        .submit(
            request(json!({
                "input": {"format": "csv", "epsg": 4326, "geometry_column": "wkt"},
                "output": {"format": "geojson"}
            })),
            vec![Upload::new("stops.csv", "stop,wkt\n1,POINT (115.86 -31.95)\n")],
        )
        .await
        .unwrap();
    let inline_job = orchestrator
        .submit(
            request(json!({
                "input": {"format": "geojson", "data": perth_point()},
                "output": {"format": "geojson", "to_file": false}
            })),
            Vec::new(),
        )
        .await
        .unwrap();

    for job_id in [file_job.job_id, inline_job.job_id] {
        let status = orchestrator.wait_for_terminal(&job_id, POLL).await.unwrap();
        assert_eq!(status.status, "success");
    }
    assert!(matches!(orchestrator.result(&file_job.job_id).await.unwrap(), JobOutput::File { .. }));

    for job_id in [file_job.job_id, inline_job.job_id] {
        cleanup_job(root.path(), &job_id);
        cleanup_job(root.path(), &job_id);
    }

    let err = orchestrator.result(&file_job.job_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let JobOutput::Inline(value) = orchestrator.result(&inline_job.job_id).await.unwrap() else {
        panic!("expected inline data");
    };
    assert_eq!(value["features"][0]["properties"]["name"], "Perth GPO");

    let record = store.get(&inline_job.job_id).await.unwrap();
    assert!(record.finished_at.is_some());
    assert!(record.state.is_terminal());

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_malformed_upload_fails_the_job() {
    let root = TempDir::new().unwrap();
    let orchestrator = JobOrchestrator::start(PipelineContext::with_reprojector(
        GeoflipConfig::new(root.path()),
        Arc::new(IdentityReprojector),
    ));

    let receipt = orchestrator
        .submit(
            request(json!({
                "input": {"format": "csv", "epsg": 4326},
                "output": {"format": "csv", "epsg": 4326}
            })),
            vec![Upload::new("bad.csv", "id,geom_wkt\n1,POINT (1 2)\n2,NOT WKT\n3,POINT (3 4\n")],
        )
        .await
        .unwrap();

    let status = orchestrator.wait_for_terminal(&receipt.job_id, POLL).await.unwrap();
    assert_eq!(status.status, "failure");
    let detail = status.error.unwrap();
    assert!(detail.starts_with("MalformedInput: "), "{detail}");
    assert!(detail.contains('1') && detail.contains('2'), "{detail}");
    assert_eq!(
        orchestrator.result(&receipt.job_id).await.unwrap_err().kind(),
        ErrorKind::NotReady
    );
    assert_eq!(orchestrator.stats().failed, 1);

    orchestrator.shutdown().await;
}
