use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response, multipart};
use tracing::{debug, error, info, trace};

use crate::config::RvConfig;
use crate::domain::{Command, Message, Position, RemoteFile, RemoteMetadata, RvError};

/// The resume server as seen by the client.
pub trait Backend: Send {
    fn list_files(&self) -> Result<Vec<RemoteFile>, RvError>;
    fn upload(&self, file: &Path, position: &Position) -> Result<(), RvError>;
    fn file_stats(&self, name: &str) -> Result<RemoteMetadata, RvError>;
    fn download(&self, name: &str) -> Result<Vec<u8>, RvError>;
}

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &RvConfig) -> Result<Self, RvError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.server.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn named_url(&self, path: &str, name: &str) -> String {
        self.url(&format!("{}/{}", path, urlencoding::encode(name)))
    }

    /// Anything but 200 is a failure, the body is kept for the log.
    fn check(response: Response) -> Result<Response, RvError> {
        let status = response.status();
        if status == StatusCode::OK {
            Ok(response)
        } else {
            let body = response.text().unwrap_or_default();
            Err(RvError::Status(status.as_u16(), body))
        }
    }
}

impl Backend for HttpBackend {
    fn list_files(&self) -> Result<Vec<RemoteFile>, RvError> {
        let response = Self::check(self.client.get(self.url("files")).send()?)?;
        let body = response.text()?;
        Ok(serde_json::from_str(&body)?)
    }

    fn upload(&self, file: &Path, position: &Position) -> Result<(), RvError> {
        let form = multipart::Form::new()
            .text("position", position.as_str().to_string())
            .file("file", file)?;
        let response = self.client.post(self.url("upload")).multipart(form).send()?;
        Self::check(response)?;
        Ok(())
    }

    fn file_stats(&self, name: &str) -> Result<RemoteMetadata, RvError> {
        let response = Self::check(self.client.get(self.named_url("file-stats", name)).send()?)?;
        let body = response.text()?;
        Ok(serde_json::from_str(&body)?)
    }

    fn download(&self, name: &str) -> Result<Vec<u8>, RvError> {
        let response = Self::check(self.client.get(self.named_url("download", name)).send()?)?;
        Ok(response.bytes()?.to_vec())
    }
}

/// Runs a single command against the backend and turns the outcome into the
/// message the model is waiting for.
pub fn execute(backend: &dyn Backend, download_dir: &Path, command: Command) -> Message {
    match command {
        Command::FetchFiles => {
            let result = backend.list_files();
            if let Ok(files) = &result {
                debug!("Fetched {} files", files.len());
            }
            Message::FilesLoaded(result.map_err(|e| e.to_string()))
        }
        Command::Upload { file, position } => {
            info!("Uploading {} as {}", file.display(), position);
            Message::UploadFinished(backend.upload(&file, &position).map_err(|e| e.to_string()))
        }
        Command::FileStats { name } => {
            let result = backend.file_stats(&name).map_err(|e| e.to_string());
            Message::StatsLoaded(name, result)
        }
        Command::Download { name } => {
            let result = save_download(backend, download_dir, &name).map_err(|e| e.to_string());
            Message::DownloadFinished(name, result)
        }
        Command::CopyToClipboard(text) => {
            error!("Clipboard request for {} reached the request worker", text);
            Message::CopyFinished(Err("clipboard is not available here".to_string()))
        }
    }
}

fn save_download(backend: &dyn Backend, download_dir: &Path, name: &str) -> Result<PathBuf, RvError> {
    // Only the final component, a server side name must not escape the directory
    let file_name = Path::new(name)
        .file_name()
        .ok_or_else(|| RvError::InvalidInput(format!("not a file name: {name}")))?;
    let bytes = backend.download(name)?;
    fs::create_dir_all(download_dir)?;
    let target = download_dir.join(file_name);
    fs::write(&target, bytes)?;
    info!("Saved {} to {}", name, target.display());
    Ok(target)
}

/// Background thread owning the backend. Commands go in, messages come out,
/// so the ui loop never waits on the network.
pub struct Worker {
    commands: Sender<Command>,
    responses: Receiver<Message>,
    _handle: JoinHandle<()>,
}

impl Worker {
    pub fn spawn<B: Backend + 'static>(backend: B, download_dir: PathBuf) -> Self {
        let (command_tx, command_rx) = mpsc::channel::<Command>();
        let (response_tx, response_rx) = mpsc::channel::<Message>();

        let handle = thread::spawn(move || {
            // Ends once the ui side drops its sender
            for command in command_rx {
                trace!("Worker executing {:?}", command);
                let message = execute(&backend, &download_dir, command);
                if response_tx.send(message).is_err() {
                    break;
                }
            }
            debug!("Request worker stopped");
        });

        Self {
            commands: command_tx,
            responses: response_rx,
            _handle: handle,
        }
    }

    pub fn submit(&self, command: Command) -> Result<(), RvError> {
        self.commands.send(command).map_err(|e| {
            error!("Request worker is gone, dropping {:?}", e.0);
            RvError::WorkerStopped
        })
    }

    /// Next finished request, if any. A worker that went away can never
    /// answer the requests still in flight, so that is an error.
    pub fn try_recv(&self) -> Result<Option<Message>, RvError> {
        match self.responses.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                error!("Request worker stopped unexpectedly");
                Err(RvError::WorkerStopped)
            }
        }
    }

    #[cfg(test)]
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Option<Message> {
        self.responses.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// In memory server, records every call it gets.
    #[derive(Clone, Default)]
    pub struct FakeBackend {
        pub files: Vec<RemoteFile>,
        pub fail_with: Option<u16>,
        pub calls: Arc<Mutex<Vec<String>>>,
    }

    impl FakeBackend {
        pub fn with_files(files: Vec<RemoteFile>) -> Self {
            Self {
                files,
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) -> Result<(), RvError> {
            self.calls.lock().unwrap().push(call);
            match self.fail_with {
                Some(code) => Err(RvError::Status(code, "fake failure".to_string())),
                None => Ok(()),
            }
        }
    }

    impl Backend for FakeBackend {
        fn list_files(&self) -> Result<Vec<RemoteFile>, RvError> {
            self.record("GET /files".to_string())?;
            Ok(self.files.clone())
        }

        fn upload(&self, file: &Path, position: &Position) -> Result<(), RvError> {
            self.record(format!("POST /upload {} {}", file.display(), position))
        }

        fn file_stats(&self, name: &str) -> Result<RemoteMetadata, RvError> {
            self.record(format!("GET /file-stats/{name}"))?;
            self.files
                .iter()
                .find(|f| f.name == name)
                .map(|f| f.metadata.clone())
                .ok_or_else(|| RvError::Status(404, "File not found".to_string()))
        }

        fn download(&self, name: &str) -> Result<Vec<u8>, RvError> {
            self.record(format!("GET /download/{name}"))?;
            Ok(b"%PDF-1.4".to_vec())
        }
    }

    pub fn remote(name: &str, date: &str, position: &str) -> RemoteFile {
        RemoteFile {
            name: name.to_string(),
            metadata: RemoteMetadata {
                upload_date: date.to_string(),
                position: position.to_string(),
            },
        }
    }

    #[test]
    fn fetch_is_answered_with_files_loaded() {
        let backend = FakeBackend::with_files(vec![remote("a.pdf", "2024-01-01", "Engineer")]);
        let message = execute(&backend, Path::new("."), Command::FetchFiles);
        assert_eq!(
            message,
            Message::FilesLoaded(Ok(vec![remote("a.pdf", "2024-01-01", "Engineer")]))
        );
    }

    #[test]
    fn failed_upload_carries_the_error_text() {
        let backend = FakeBackend {
            fail_with: Some(400),
            ..FakeBackend::default()
        };
        let command = Command::Upload {
            file: PathBuf::from("cv.pdf"),
            position: Position::Analyst,
        };
        match execute(&backend, Path::new("."), command) {
            Message::UploadFinished(Err(text)) => assert!(text.contains("400")),
            other => panic!("unexpected message {other:?}"),
        }
        assert_eq!(backend.calls(), vec!["POST /upload cv.pdf Analyst"]);
    }

    #[test]
    fn unknown_file_stats_is_an_error() {
        let backend = FakeBackend::default();
        let message = execute(
            &backend,
            Path::new("."),
            Command::FileStats {
                name: "missing.pdf".to_string(),
            },
        );
        assert!(matches!(message, Message::StatsLoaded(name, Err(_)) if name == "missing.pdf"));
    }

    #[test]
    fn download_stays_inside_the_target_directory() {
        let dir = std::env::temp_dir().join(format!("rv-download-{}", std::process::id()));
        let backend = FakeBackend::default();
        let message = execute(
            &backend,
            &dir,
            Command::Download {
                name: "../../etc/cv.pdf".to_string(),
            },
        );
        match message {
            Message::DownloadFinished(_, Ok(path)) => {
                assert_eq!(path, dir.join("cv.pdf"));
                assert_eq!(fs::read(&path).unwrap(), b"%PDF-1.4");
            }
            other => panic!("unexpected message {other:?}"),
        }
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn worker_answers_in_submission_order() {
        let backend = FakeBackend::with_files(vec![remote("a.pdf", "2024-01-01", "Engineer")]);
        let calls = backend.calls.clone();
        let worker = Worker::spawn(backend, PathBuf::from("."));

        worker.submit(Command::FetchFiles).unwrap();
        worker
            .submit(Command::FileStats {
                name: "a.pdf".to_string(),
            })
            .unwrap();

        let first = worker.recv_timeout(Duration::from_secs(5));
        let second = worker.recv_timeout(Duration::from_secs(5));
        assert!(matches!(first, Some(Message::FilesLoaded(Ok(files))) if files.len() == 1));
        assert!(matches!(second, Some(Message::StatsLoaded(_, Ok(_)))));
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["GET /files".to_string(), "GET /file-stats/a.pdf".to_string()]
        );
    }

    #[test]
    fn stopped_worker_is_reported() {
        let (commands, _) = mpsc::channel::<Command>();
        let (response_tx, responses) = mpsc::channel::<Message>();
        let worker = Worker {
            commands,
            responses,
            _handle: thread::spawn(|| ()),
        };
        assert!(matches!(worker.try_recv(), Ok(None)));

        drop(response_tx);
        assert!(matches!(worker.try_recv(), Err(RvError::WorkerStopped)));
        assert!(matches!(
            worker.submit(Command::FetchFiles),
            Err(RvError::WorkerStopped)
        ));
    }

    #[test]
    fn names_are_percent_encoded_in_urls() {
        let backend = HttpBackend::new(&RvConfig::default().with_server("http://host:5000/".to_string()))
            .unwrap();
        assert_eq!(backend.url("files"), "http://host:5000/files");
        assert_eq!(
            backend.named_url("download", "my cv.pdf"),
            "http://host:5000/download/my%20cv.pdf"
        );
    }
}
