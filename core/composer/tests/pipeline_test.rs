use anyhow::Result;
use lifegraph_composer::{
    BuildConfig, FatalError, Pipeline, GRAPH_FILE, LAYOUT_FILE, MEDIA_STAGING_DIR, STATUS_FILE,
};
use lifegraph_ingestion::MemorySource;
use lifegraph_schemas::EpochDefinition;
use serde_json::{json, Value};
use std::path::Path;
use tempfile::TempDir;

fn write_json(path: &Path, value: &Value) {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).unwrap();
    }
    std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn records() -> Value {
    json!([
        {
            "id": "hike-1",
            "type": "moment",
            "title": "Hike with Alice",
            "date": "2020-05-01",
            "visibility": "public",
            "isHub": true,
            "source": "photos",
            "entities": {"people": ["Alice Smith"], "tags": ["hiking"], "places": ["Yosemite"]},
            "location": {"lat": 37.745123, "lng": -119.593456}
        },
        {
            "id": "hike-2",
            "title": "Camp",
            "date": "2020-05-01",
            "visibility": "public",
            "source": "photos",
            "media": ["photos/missing.jpg", "https://example.com/camp.jpg"],
            "entities": {"tags": ["Hiking"]}
        },
        {
            "id": "school",
            "title": "Photo with Jace Rowe at Park",
            "date": "2020-05-20",
            "visibility": "public",
            "source": "photos",
            "entities": {"people": ["Jace Rowe"]},
            "location": {"lat": 28.541234, "lng": -81.383456}
        },
        {"id": "secret", "title": "Diary", "date": "2020-05-02", "visibility": "private"},
        {"id": "novis", "title": "No tier", "date": "2020-01-01"},
        {"title": "No id", "date": "2020-01-01"},
        {"id": "nodate", "title": "No date", "visibility": "public"},
        {"id": "hidden", "title": "Curated away", "date": "2021-01-01", "visibility": "public"}
    ])
}

fn work_records() -> Value {
    json!({
        "records": [
            {
                "id": "work",
                "type": "project",
                "title": "Kickoff",
                "date": "2019-03-01",
                "visibility": "friends",
                "source": "calendar",
                "entities": {"people": ["Bob Stranger"], "projects": ["Atlas"]}
            },
            {
                "id": "work-2",
                "type": "project",
                "title": "Launch",
                "date": "2019-03-10T09:00:00Z",
                "visibility": "public",
                "source": "calendar",
                "entities": {"projects": ["atlas"]}
            }
        ]
    })
}

/// A build workspace with inputs on disk and a config pointing at them
fn workspace() -> (TempDir, BuildConfig) {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    write_json(&root.join("records/a.json"), &records());
    write_json(&root.join("records/b.json"), &work_records());
    write_json(
        &root.join("allowlist.json"),
        &json!({
            "public": ["Alice Smith"],
            "friends": ["Carol"],
            "minors": {"firstNames": ["Jace"], "blockedPatterns": ["Park Elementary"]}
        }),
    );
    write_json(&root.join("curation.json"), &json!({"hidden": ["hidden"]}));
    std::fs::create_dir_all(root.join("media")).unwrap();

    let mut config = BuildConfig::default();
    config.paths.records_dir = root.join("records");
    config.paths.allowlist = root.join("allowlist.json");
    config.paths.curation = root.join("curation.json");
    config.paths.output_dir = root.join("out");
    config.paths.media_root = Some(root.join("media"));
    config.epochs = vec![
        EpochDefinition {
            label: "Work".to_string(),
            start: "2019-01-01".to_string(),
            end: "2019-12-31".to_string(),
        },
        EpochDefinition {
            label: "Outdoors".to_string(),
            start: "2020-01-01".to_string(),
            end: "2020-12-31".to_string(),
        },
    ];

    (dir, config)
}

fn node<'a>(graph: &'a Value, id: &str) -> &'a Value {
    graph["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|n| n["id"] == id)
        .unwrap_or_else(|| panic!("node {} missing", id))
}

#[tokio::test]
async fn test_end_to_end_build() -> Result<()> {
    let (_dir, config) = workspace();
    let out = config.paths.output_dir.clone();

    let stats = Pipeline::new(config).run().await?;

    assert_eq!(stats.records_in, 10);
    assert_eq!(stats.records_dropped, 2);
    assert_eq!(stats.records_private, 2);
    assert_eq!(stats.records_hidden, 1);
    assert_eq!(stats.nodes_published, 5);
    assert_eq!(stats.by_source["photos"], 3);
    assert_eq!(stats.by_source["calendar"], 2);
    assert_eq!(stats.by_type["project"], 2);
    assert_eq!(stats.by_visibility["friends"], 2);
    assert_eq!(stats.edges, 2);
    assert_eq!(stats.media_written, 0);
    assert_eq!(stats.media_skipped, 1);
    assert_eq!(stats.audit_violations, 0);

    let graph = read_json(&out.join(GRAPH_FILE));
    let layout = read_json(&out.join(LAYOUT_FILE));

    let ids: Vec<&str> = graph["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["hike-1", "hike-2", "school", "work", "work-2"]);

    // GPS rounded to two places
    assert_eq!(node(&graph, "hike-1")["location"], json!({"lat": 37.75, "lng": -119.59}));
    assert_eq!(node(&graph, "hike-1")["visibility"], "public");

    // Minor guard: last name stripped, location cleared, unknown name generalized
    let school = node(&graph, "school");
    assert_eq!(school["title"], "Photo with Jace at Park");
    assert_eq!(school["location"], Value::Null);
    assert_eq!(school["isMinor"], true);
    assert_eq!(school["visibility"], "friends");
    assert_eq!(school["entities"]["people"], json!(["Friend"]));

    // Non-public person caps the tier and is generalized
    let work = node(&graph, "work");
    assert_eq!(work["visibility"], "friends");
    assert_eq!(work["entities"]["people"], json!(["Friend"]));
    assert_eq!(work["epoch"], "Work");

    // Only verified or remote media survive
    assert_eq!(node(&graph, "hike-2")["media"], json!(["https://example.com/camp.jpg"]));

    // Edges: same-day plus shared tags, and project plus proximity
    let edges = graph["edges"].as_array().unwrap();
    assert_eq!(edges[0]["source"], "hike-1");
    assert_eq!(edges[0]["target"], "hike-2");
    assert_eq!(edges[0]["weight"], 1.2);
    assert_eq!(edges[1]["source"], "work");
    assert_eq!(edges[1]["target"], "work-2");
    assert_eq!(edges[1]["weight"], 1.0);
    for edge in edges {
        let weight = edge["weight"].as_f64().unwrap();
        let sum: f64 = edge["evidence"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["weight"].as_f64().unwrap())
            .sum();
        assert!(weight >= 0.5);
        assert_eq!(weight, format!("{:.2}", sum).parse::<f64>().unwrap());
    }
    assert_eq!(node(&graph, "hike-1")["connections"], json!(["hike-2"]));
    assert_eq!(node(&graph, "school")["connections"], json!([]));

    let epochs: Vec<(&str, u64)> = graph["epochs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| (e["label"].as_str().unwrap(), e["count"].as_u64().unwrap()))
        .collect();
    assert_eq!(epochs, vec![("Work", 2), ("Outdoors", 3)]);

    let positions = layout["positions"].as_object().unwrap();
    assert_eq!(positions.len(), 5);
    assert_eq!(layout["helixParams"]["seed"], 42);
    // Outdoors starts one pitch plus one gap above Work
    assert_eq!(layout["bounds"]["minY"], 0.0);
    assert_eq!(positions["hike-1"]["y"], 52.0);

    let status = read_json(&out.join(STATUS_FILE));
    assert_eq!(status["status"], "success");
    assert_eq!(status["stats"]["nodesPublished"], 5);

    Ok(())
}

#[tokio::test]
async fn test_output_is_canonical_text() -> Result<()> {
    let (_dir, config) = workspace();
    let out = config.paths.output_dir.clone();
    Pipeline::new(config).run().await?;

    for file in [GRAPH_FILE, LAYOUT_FILE] {
        let text = std::fs::read_to_string(out.join(file))?;
        assert!(text.ends_with("}\n"));
        assert!(!text.ends_with("\n\n"));
        assert!(text.starts_with("{\n  \""));
    }

    let graph_text = std::fs::read_to_string(out.join(GRAPH_FILE))?;
    let edges = graph_text.find("\"edges\"").unwrap();
    let epochs = graph_text.find("\"epochs\"").unwrap();
    let nodes = graph_text.find("\"nodes\"").unwrap();
    assert!(edges < epochs && epochs < nodes);
    Ok(())
}

#[tokio::test]
async fn test_identical_runs_are_byte_identical() -> Result<()> {
    let (_dir, config) = workspace();
    let out = config.paths.output_dir.clone();
    let pipeline = Pipeline::new(config);

    pipeline.run().await?;
    let graph = std::fs::read(out.join(GRAPH_FILE))?;
    let layout = std::fs::read(out.join(LAYOUT_FILE))?;
    let status = std::fs::read(out.join(STATUS_FILE))?;

    pipeline.run().await?;
    assert_eq!(std::fs::read(out.join(GRAPH_FILE))?, graph);
    assert_eq!(std::fs::read(out.join(LAYOUT_FILE))?, layout);
    // Only the status carries a run id and timestamp
    assert_ne!(std::fs::read(out.join(STATUS_FILE))?, status);
    Ok(())
}

#[tokio::test]
async fn test_seed_changes_only_layout() -> Result<()> {
    let (_dir, mut config) = workspace();
    let out = config.paths.output_dir.clone();

    Pipeline::new(config.clone()).run().await?;
    let graph = std::fs::read(out.join(GRAPH_FILE))?;
    let layout = std::fs::read(out.join(LAYOUT_FILE))?;

    config.layout.seed = 7;
    Pipeline::new(config).run().await?;
    assert_eq!(std::fs::read(out.join(GRAPH_FILE))?, graph);
    assert_ne!(std::fs::read(out.join(LAYOUT_FILE))?, layout);
    Ok(())
}

#[tokio::test]
async fn test_zero_records_blocks_publication() -> Result<()> {
    let (dir, mut config) = workspace();
    let empty = dir.path().join("empty");
    std::fs::create_dir_all(&empty)?;
    config.paths.records_dir = empty;
    let out = config.paths.output_dir.clone();

    let result = Pipeline::new(config).run().await;

    let err = result.unwrap_err();
    assert!(matches!(err, FatalError::NoRecords));
    assert_eq!(err.exit_code(), 2);
    assert!(!out.join(GRAPH_FILE).exists());
    assert!(!out.join(LAYOUT_FILE).exists());

    let status = read_json(&out.join(STATUS_FILE));
    assert_eq!(status["status"], "failed");
    assert_eq!(status["error"], "no input records");
    assert!(status.get("stats").is_none());
    Ok(())
}

#[tokio::test]
async fn test_only_invalid_records_counts_as_zero() -> Result<()> {
    let (_dir, config) = workspace();
    let source = MemorySource::new(vec![json!({"title": "no id"}), json!(42)]);

    let err = Pipeline::with_source(config, Box::new(source))
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, FatalError::NoRecords));
    Ok(())
}

#[tokio::test]
async fn test_privacy_violation_preserves_prior_output() -> Result<()> {
    let (_dir, mut config) = workspace();
    let out = config.paths.output_dir.clone();

    Pipeline::new(config.clone()).run().await?;
    let graph = std::fs::read(out.join(GRAPH_FILE))?;
    let layout = std::fs::read(out.join(LAYOUT_FILE))?;

    config.privacy.forbidden_substrings = vec!["yosemite".to_string()];
    let err = Pipeline::new(config).run().await.unwrap_err();

    assert!(matches!(err, FatalError::Privacy(_)));
    assert_eq!(err.exit_code(), 4);
    assert_eq!(std::fs::read(out.join(GRAPH_FILE))?, graph);
    assert_eq!(std::fs::read(out.join(LAYOUT_FILE))?, layout);
    assert!(!out.join("graph.json.tmp").exists());

    let status = read_json(&out.join(STATUS_FILE));
    assert_eq!(status["status"], "failed");
    assert!(status["error"].as_str().unwrap().contains("yosemite"));
    Ok(())
}

#[tokio::test]
async fn test_failed_run_leaves_published_media_untouched() -> Result<()> {
    let (dir, mut config) = workspace();
    let out = config.paths.output_dir.clone();
    let photo = dir.path().join("media/beach.png");
    write_json(
        &dir.path().join("records/c.json"),
        &json!([{
            "id": "beach",
            "title": "Beach day",
            "date": "2020-06-01",
            "visibility": "public",
            "media": ["beach.png"]
        }]),
    );
    image::RgbImage::from_pixel(2, 2, image::Rgb([250, 220, 120])).save(&photo)?;

    let stats = Pipeline::new(config.clone()).run().await?;
    assert_eq!(stats.media_written, 1);

    let published = out.join("media/beach-0.png");
    let graph = read_json(&out.join(GRAPH_FILE));
    assert_eq!(node(&graph, "beach")["media"], json!(["media/beach-0.png"]));
    assert_eq!(image::image_dimensions(&published)?, (2, 2));
    assert!(!out.join(MEDIA_STAGING_DIR).exists());
    let asset = std::fs::read(&published)?;

    // New pixels upstream, but the run is blocked by the audit
    image::RgbImage::from_pixel(5, 5, image::Rgb([0, 0, 0])).save(&photo)?;
    config.privacy.forbidden_substrings = vec!["Beach".to_string()];
    let err = Pipeline::new(config).run().await.unwrap_err();

    assert!(matches!(err, FatalError::Privacy(_)));
    assert_eq!(std::fs::read(&published)?, asset);
    assert!(!out.join(MEDIA_STAGING_DIR).exists());
    Ok(())
}

#[tokio::test]
async fn test_friend_full_name_fails_closed() -> Result<()> {
    let (dir, config) = workspace();
    write_json(
        &dir.path().join("allowlist.json"),
        &json!({"public": ["Alice Smith"], "friends": ["Bob Stranger"]}),
    );

    let err = Pipeline::new(config).run().await.unwrap_err();
    match err {
        FatalError::Privacy(violations) => {
            assert_eq!(
                violations,
                vec!["node work names \"Bob Stranger\" who is not public".to_string()]
            );
        }
        other => panic!("expected privacy failure, got {}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_missing_allowlist_is_fatal() -> Result<()> {
    let (dir, config) = workspace();
    std::fs::remove_file(dir.path().join("allowlist.json"))?;

    let err = Pipeline::new(config).run().await.unwrap_err();
    assert!(matches!(err, FatalError::Unexpected(_)));
    assert_eq!(err.exit_code(), 1);
    Ok(())
}

#[tokio::test]
async fn test_curation_override_can_raise_tier() -> Result<()> {
    let (dir, config) = workspace();
    write_json(
        &dir.path().join("curation.json"),
        &json!({"hidden": [], "visibility_overrides": {"secret": "public", "hike-1": "private"}}),
    );
    let out = config.paths.output_dir.clone();

    let stats = Pipeline::new(config).run().await?;
    let graph = read_json(&out.join(GRAPH_FILE));

    assert_eq!(stats.records_hidden, 0);
    assert_eq!(node(&graph, "secret")["visibility"], "public");
    assert!(graph["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .all(|n| n["id"] != "hike-1"));
    Ok(())
}
