//! Shared fixtures for motility-server integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request},
    Router,
};
use motility_common::config::{StorageConfig, StorageSection, WorkerConfig, WorkerSection};
use motility_server::services::{ExternalJob, JobError, JobOutput, JobRunner};
use motility_server::{build_router, AppState};
use serde_json::Value;
use tempfile::TempDir;
use tokio::io::DuplexStream;
use tokio_util::io::ReaderStream;

pub const BOUNDARY: &str = "----motility-test-boundary";

/// Stand-in for the analysis, transcoding and plotting tools
///
/// Dispatch jobs write the artifacts a real worker would leave for the
/// selected script; normalize jobs copy input to output; graph jobs write the
/// limit into the image.
#[derive(Default)]
pub struct FakeWorker {
    pub jobs: Mutex<Vec<ExternalJob>>,
    /// Fail dispatch jobs with this stderr
    pub dispatch_stderr: Option<String>,
    /// Fail normalize jobs
    pub fail_normalize: bool,
    /// Occupy the archive staging path so bundling fails
    pub block_archive: bool,
}

impl FakeWorker {
    pub fn labels(&self) -> Vec<&'static str> {
        self.jobs.lock().unwrap().iter().map(|j| j.label).collect()
    }

    fn failed(job: &ExternalJob, stderr: &str) -> JobError {
        JobError::Failed {
            command: job.command_line(),
            code: Some(1),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    fn write_session(&self, script: &str, session_dir: &Path) {
        let frames = session_dir.join("labeled_frames");
        std::fs::create_dir_all(&frames).unwrap();
        std::fs::write(frames.join("frame_0002.png"), b"frame-2").unwrap();
        std::fs::write(frames.join("frame_0001.png"), b"frame-1").unwrap();

        let (raw, csvs): (&str, &[&str]) = if script.ends_with("run_detection_only.py") {
            ("labeled_video.mp4", &[])
        } else if script.ends_with("run_tracking_noise.py") {
            ("tracked_video.mp4", &["simple_tracks.csv", "final_summary.csv"])
        } else {
            (
                "filtered_tracking_video.mp4",
                &["simple_tracks.csv", "filtered_tracks.csv", "final_summary.csv"],
            )
        };

        std::fs::write(session_dir.join(raw), vec![7u8; 4096]).unwrap();
        for csv in csvs {
            std::fs::write(session_dir.join(csv), b"track_id,x,y\n1,0.5,0.5\n").unwrap();
        }
        if !csvs.is_empty() {
            std::fs::write(session_dir.join("graph.png"), b"default-graph").unwrap();
        }
        if self.block_archive {
            std::fs::create_dir_all(session_dir.join("results.zip.part")).unwrap();
        }
    }
}

#[async_trait]
impl JobRunner for FakeWorker {
    async fn run(&self, job: &ExternalJob) -> Result<JobOutput, JobError> {
        self.jobs.lock().unwrap().push(job.clone());

        match job.label {
            "dispatch" => {
                if let Some(stderr) = &self.dispatch_stderr {
                    return Err(Self::failed(job, stderr));
                }
                let script = job.args[0].to_string_lossy().into_owned();
                self.write_session(&script, Path::new(&job.args[2]));
            }
            "normalize" => {
                if self.fail_normalize {
                    return Err(Self::failed(job, "Invalid data found when processing input"));
                }
                let input = &job.args[2];
                let output = job.args.last().unwrap();
                std::fs::copy(input, output).unwrap();
            }
            "graph" => {
                let limit = job.args[3].to_string_lossy();
                std::fs::write(&job.args[2], format!("custom-graph limit={}", limit)).unwrap();
            }
            other => panic!("unexpected job {}", other),
        }

        Ok(JobOutput::default())
    }
}

/// Router wired to a temp root and a fake worker
pub struct TestApp {
    pub root: TempDir,
    pub worker: Arc<FakeWorker>,
    pub router: Router,
}

impl TestApp {
    pub fn new(worker: FakeWorker) -> Self {
        let root = TempDir::new().unwrap();
        let storage = StorageConfig::from_root(root.path(), &StorageSection::default());
        storage.ensure_directories().unwrap();
        let workers = WorkerConfig::from(&WorkerSection::default());
        let worker = Arc::new(worker);

        let state = AppState::new(Arc::new(storage), Arc::new(workers), worker.clone());
        Self {
            root,
            worker,
            router: build_router(state),
        }
    }

    pub fn sessions_root(&self) -> PathBuf {
        self.root.path().join("sessions")
    }

    pub fn uploads_root(&self) -> PathBuf {
        self.root.path().join("uploads")
    }

    pub fn session_dir(&self, id: &str) -> PathBuf {
        self.sessions_root().join(id)
    }
}

/// Multipart upload body with optional file and mode parts
pub fn upload_request(file: Option<(&str, &[u8])>, mode: Option<&str>) -> Request<Body> {
    upload_request_with_field("video", file, mode)
}

pub fn upload_request_with_field(
    field: &str,
    file: Option<(&str, &[u8])>,
    mode: Option<&str>,
) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(mode) = mode {
        body.extend_from_slice(&mode_part(mode));
    }
    if let Some((name, bytes)) = file {
        body.extend_from_slice(&file_part_head(field, name));
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    multipart_request(Body::from(body))
}

/// Upload whose body is whatever the test writes into the returned stream
///
/// The body stays open until the writer is dropped.
pub fn streaming_upload_request() -> (DuplexStream, Request<Body>) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let body = Body::from_stream(ReaderStream::new(server));
    (client, multipart_request(body))
}

/// Complete `mode` part
pub fn mode_part(mode: &str) -> Vec<u8> {
    format!(
        "--{}\r\nContent-Disposition: form-data; name=\"mode\"\r\n\r\n{}\r\n",
        BOUNDARY, mode
    )
    .into_bytes()
}

/// File part headers; the file bytes follow
pub fn file_part_head(field: &str, name: &str) -> Vec<u8> {
    format!(
        "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: video/mp4\r\n\r\n",
        BOUNDARY, field, name
    )
    .into_bytes()
}

fn multipart_request(body: Body) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(body)
        .unwrap()
}

/// Names in a directory, sorted
pub fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Poll until `dir` holds at least `count` entries
pub async fn wait_for_entries(dir: &Path, count: usize) {
    for _ in 0..500 {
        if dir.is_dir() && entries(dir).len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} never reached {} entries", dir.display(), count);
}

pub fn graph_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/generate-graph")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str, range: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(range) = range {
        builder = builder.header(header::RANGE, range);
    }
    builder.body(Body::empty()).unwrap()
}

/// Extract JSON body from response
pub async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

/// Collect a streamed body
pub async fn extract_bytes(body: Body) -> Vec<u8> {
    use http_body_util::BodyExt;
    body.collect().await.expect("Should read body").to_bytes().to_vec()
}

/// Manifest keys present in a JSON object
pub fn keys(manifest: &Value) -> Vec<String> {
    let mut keys: Vec<String> = manifest
        .as_object()
        .expect("manifest is an object")
        .keys()
        .cloned()
        .collect();
    keys.sort();
    keys
}

/// Write a file inside a session directory, creating parents
pub fn seed_file(dir: &Path, name: &str, bytes: &[u8]) {
    let path = dir.join(name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, bytes).unwrap();
}
