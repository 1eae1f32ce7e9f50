use fanout::RankedEntry;
use fanout::config::OutputConfig;
use fanout::output::{create_handler, persist};
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

fn ranked() -> Vec<RankedEntry> {
    vec![
        RankedEntry::new(1, "2.2.2.2:80", Duration::from_millis(100)),
        RankedEntry::new(0, "1.1.1.1:80", Duration::from_millis(250)),
    ]
}

#[tokio::test]
async fn text_output_is_newline_delimited_in_rank_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Proxy.txt");
    let config = OutputConfig::Text {
        path: path.display().to_string(),
    };

    let mut handler = create_handler(&config, None).unwrap();
    persist(handler.as_mut(), &ranked()).await.unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "2.2.2.2:80\n1.1.1.1:80\n");
}

#[tokio::test]
async fn json_output_is_an_array() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ranked.json");
    let config = OutputConfig::Json {
        path: path.display().to_string(),
    };

    let mut handler = create_handler(&config, None).unwrap();
    persist(handler.as_mut(), &ranked()).await.unwrap();

    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let entries = value.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["endpoint"], "2.2.2.2:80");
    assert_eq!(entries[0]["latency_ms"], 100.0);
}

#[tokio::test]
async fn csv_output_has_header_and_rows() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ranked.csv");
    let config = OutputConfig::Csv {
        path: path.display().to_string(),
    };

    let mut handler = create_handler(&config, None).unwrap();
    persist(handler.as_mut(), &ranked()).await.unwrap();

    let content = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "seq,endpoint,latency_ms");
    assert_eq!(lines[1], "1,2.2.2.2:80,100.0");
    assert_eq!(lines.len(), 3);
}

#[tokio::test]
async fn empty_ranking_writes_empty_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Proxy.txt");
    let config = OutputConfig::Text {
        path: path.display().to_string(),
    };

    let mut handler = create_handler(&config, None).unwrap();
    persist(handler.as_mut(), &[]).await.unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "");
}
