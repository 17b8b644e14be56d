use logguard_core::{load_records, write_records, FeatureExtractor, RecordError, SyntheticTraffic, FEATURE_DIM};
use std::fs;

#[test]
fn test_load_access_log_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("traffic.csv");
    fs::write(
        &path,
        "timestamp,ip_address,username,endpoint,duration,status,bytes_sent,method\n\
         08:15:00,192.168.1.4,user,/login,0.5,200,900,POST\n\
         23:59:59,203.0.113.7,unknown,/admin,7.25,403,15000,DELETE\n",
    )
    .unwrap();

    let records = load_records(&path).expect("valid csv should load");
    assert_eq!(records.len(), 2);

    // file order is kept
    assert_eq!(records[0].endpoint, "/login");
    assert_eq!(records[1].status_code, 403);
    assert_eq!(records[1].bytes_sent, 15000);
    assert!(!records[1].is_identified_user());
}

#[test]
fn test_malformed_row_reports_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.csv");
    fs::write(
        &path,
        "timestamp,ip_address,username,endpoint,duration,status,bytes_sent,method\n\
         08:15:00,192.168.1.4,user,/login,0.5,200,900,POST\n\
         08:16:00,192.168.1.4,user,/login,fast,200,900,POST\n",
    )
    .unwrap();

    match load_records(&path) {
        Err(RecordError::Malformed { line, .. }) => assert_eq!(line, 3),
        other => panic!("expected malformed error, got {:?}", other),
    }
}

#[test]
fn test_generated_traffic_survives_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("traffic.csv");

    let records = SyntheticTraffic::new(50).with_seed(3).records();
    write_records(&path, &records).unwrap();
    let loaded = load_records(&path).unwrap();

    assert_eq!(loaded.len(), records.len());
    assert_eq!(loaded[0].source_address, records[0].source_address);

    let matrix = FeatureExtractor::new().extract(&loaded);
    assert_eq!(matrix.shape(), (50, FEATURE_DIM));
}

#[test]
fn test_header_only_file_gives_empty_matrix() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.csv");
    fs::write(&path, "timestamp,ip_address,username,endpoint,duration,status,bytes_sent,method\n").unwrap();

    let records = load_records(&path).unwrap();
    assert!(records.is_empty());
    let matrix = FeatureExtractor::new().extract(&records);
    assert_eq!(matrix.shape(), (0, FEATURE_DIM));
}
