use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use droopy::storage::{
    candidate_name, promote, published_files, sweep_temp_files, DirectorySink, InFlight, UploadSink,
};

fn sink(dir: &std::path::Path) -> (DirectorySink, InFlight) {
    let in_flight: InFlight = Arc::new(DashMap::new());
    (DirectorySink::new(dir.to_path_buf(), None, in_flight.clone()), in_flight)
}

#[test]
fn test_candidate_name() {
    assert_eq!(candidate_name("report.pdf", 0), "report.pdf");
    assert_eq!(candidate_name("report.pdf", 1), "report-1.pdf");
    assert_eq!(candidate_name("a.tar.gz", 2), "a.tar-2.gz");
    assert_eq!(candidate_name(".bashrc", 1), ".bashrc-1");
    assert_eq!(candidate_name("README", 3), "README-3");
}

#[test]
fn test_part_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, in_flight) = sink(dir.path());

    let mut part = sink.create_part().unwrap();
    assert!(part.path().file_name().unwrap().to_str().unwrap().starts_with("tmpdroopy"));
    assert!(in_flight.contains_key(part.path()));
    part.write_all(b"hello").unwrap();

    let stored = sink.finalize(part, "hello.txt").unwrap();
    assert_eq!(stored.name, "hello.txt");
    assert_eq!(stored.size, 5);
    assert_eq!(std::fs::read(&stored.path).unwrap(), b"hello");
    assert!(in_flight.is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_dropped_part_is_removed() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, in_flight) = sink(dir.path());

    let mut part = sink.create_part().unwrap();
    part.write_all(b"half an upload").unwrap();
    let path = part.path().to_path_buf();
    assert!(path.exists());

    drop(part);
    assert!(!path.exists());
    assert!(in_flight.is_empty());
}

#[cfg(unix)]
#[test]
fn test_file_mode() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let sink = DirectorySink::new(dir.path().to_path_buf(), Some(0o640), Arc::new(DashMap::new()));
    let part = sink.create_part().unwrap();
    let stored = sink.finalize(part, "mode.txt").unwrap();
    // finalize leaves the mode alone until the file is sealed
    std::fs::write(&stored.path, "rewritten").unwrap();
    sink.seal(&stored).unwrap();

    let mode = std::fs::metadata(&stored.path).unwrap().permissions().mode();
    assert_eq!(mode & 0o7777, 0o640);
}

#[test]
fn test_live_part_survives_zero_age_sweep() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, in_flight) = sink(dir.path());

    let mut part = sink.create_part().unwrap();
    assert_eq!(sweep_temp_files(dir.path(), Duration::ZERO, &in_flight).unwrap(), 0);
    assert!(part.path().exists());

    part.write_all(b"still here").unwrap();
    let stored = sink.finalize(part, "live.txt").unwrap();
    assert_eq!(std::fs::read(&stored.path).unwrap(), b"still here");
}

#[test]
fn test_concurrent_promotes_never_collide() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, _) = sink(dir.path());

    let names: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let sink = &sink;
                scope.spawn(move || {
                    let mut part = sink.create_part().unwrap();
                    write!(part, "upload {i}").unwrap();
                    sink.finalize(part, "same.txt").unwrap().name
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let unique: HashSet<&String> = names.iter().collect();
    assert_eq!(unique.len(), 16);
    assert!(unique.contains(&"same.txt".to_string()));
    for i in 1..16 {
        assert!(unique.contains(&format!("same-{i}.txt")));
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 16);
}

#[test]
fn test_promote_skips_taken_names() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "old").unwrap();
    std::fs::write(dir.path().join("a-1.txt"), "older").unwrap();
    let temp = dir.path().join("tmpdroopyx");
    std::fs::write(&temp, "new").unwrap();

    let path = promote(&temp, dir.path(), "a.txt").unwrap();
    assert_eq!(path, dir.path().join("a-2.txt"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "old");
    assert!(!temp.exists());
}

#[test]
fn test_sweep_skips_in_flight_and_fresh_files() {
    let dir = tempfile::tempdir().unwrap();
    let in_flight: InFlight = Arc::new(DashMap::new());

    let stale = dir.path().join("tmpdroopystale");
    let busy = dir.path().join("tmpdroopybusy");
    let kept = dir.path().join("keep.txt");
    for path in [&stale, &busy, &kept] {
        std::fs::write(path, "x").unwrap();
    }
    in_flight.insert(busy.clone(), Instant::now());

    // nothing is old enough yet
    assert_eq!(sweep_temp_files(dir.path(), Duration::from_secs(3600), &in_flight).unwrap(), 0);
    assert!(stale.exists());

    assert_eq!(sweep_temp_files(dir.path(), Duration::ZERO, &in_flight).unwrap(), 1);
    assert!(!stale.exists());
    assert!(busy.exists());
    assert!(kept.exists());

    in_flight.remove(&busy);
    assert_eq!(sweep_temp_files(dir.path(), Duration::ZERO, &in_flight).unwrap(), 1);
    assert!(!busy.exists());
    assert!(kept.exists());
}

#[tokio::test]
async fn test_published_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("b.txt"), "b").unwrap();
    std::fs::write(dir.path().join("A.txt"), "a").unwrap();
    std::fs::write(dir.path().join("tmpdroopy42"), "partial").unwrap();
    std::fs::create_dir(dir.path().join("subdir")).unwrap();

    let names = published_files(dir.path()).await.unwrap();
    assert_eq!(names, vec!["A.txt", "b.txt"]);
}
