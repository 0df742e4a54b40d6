//! reqwest-backed transport. Every operation runs on its own tokio task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use reqwest::Client;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::request::{RequestBuilder, TransferProgress};
use super::{
    ClientError, Completion, OperationHandle, OperationId, Outcome, RequestDescriptor, StartError,
    Transport,
};
use crate::config::ApiConfig;
use crate::job::Phase;

struct Operation {
    phase: Phase,
    task: Option<JoinHandle<()>>,
    progress: Arc<TransferProgress>,
}

type Operations = Arc<Mutex<HashMap<OperationId, Operation>>>;

pub struct HttpTransport {
    requests: RequestBuilder,
    operations: Operations,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: Mutex<Option<mpsc::UnboundedReceiver<Completion>>>,
}

impl HttpTransport {
    pub fn new(config: &ApiConfig) -> Result<Self, StartError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| StartError::InvalidRequest(format!("header '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| StartError::InvalidRequest(format!("header '{}': {}", name, e)))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|e| StartError::InvalidRequest(e.to_string()))?;

        Self::with_client(client, &config.base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self, StartError> {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Ok(Self {
            requests: RequestBuilder::new(client, base_url)?,
            operations: Arc::default(),
            completions_tx,
            completions_rx: Mutex::new(Some(completions_rx)),
        })
    }

    /// Takes the completion stream. Only the first call returns it.
    pub fn take_completions(&self) -> Option<mpsc::UnboundedReceiver<Completion>> {
        self.completions_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    pub fn requests(&self) -> &RequestBuilder {
        &self.requests
    }

    fn operations(&self) -> MutexGuard<'_, HashMap<OperationId, Operation>> {
        lock_operations(&self.operations)
    }
}

fn lock_operations(
    operations: &Operations,
) -> MutexGuard<'_, HashMap<OperationId, Operation>> {
    operations.lock().unwrap_or_else(|poisoned| {
        warn!("HTTP transport operation table poisoned, recovering");
        poisoned.into_inner()
    })
}

impl Transport for HttpTransport {
    fn start(&self, request: RequestDescriptor) -> Result<OperationId, StartError> {
        let runtime = Handle::try_current()
            .map_err(|e| StartError::Unavailable(format!("no tokio runtime: {}", e)))?;

        let progress = Arc::new(TransferProgress::default());
        let http_request = self.requests.build(&request, &progress)?;
        let id = OperationId::generate();
        let phase = request.phase();

        debug!(
            "Starting {} {} as operation {}",
            http_request.method(),
            http_request.url(),
            id
        );

        // Register before spawning so a fast completion always finds its entry.
        let mut operations = self.operations();
        operations.insert(
            id.clone(),
            Operation {
                phase,
                task: None,
                progress,
            },
        );

        let client = self.requests.client().clone();
        let table = Arc::clone(&self.operations);
        let tx = self.completions_tx.clone();
        let op_id = id.clone();
        let task = runtime.spawn(async move {
            let outcome = execute(&client, http_request).await;
            let registered = lock_operations(&table).remove(&op_id).is_some();
            if registered {
                if tx.send((op_id.clone(), outcome)).is_err() {
                    debug!("Completion for {} dropped, receiver closed", op_id);
                }
            } else {
                debug!("Operation {} was cancelled before completing", op_id);
            }
        });

        if let Some(op) = operations.get_mut(&id) {
            op.task = Some(task);
        }

        Ok(id)
    }

    fn lookup(&self, id: &OperationId) -> Option<OperationHandle> {
        self.operations().get(id).map(|op| OperationHandle {
            id: id.clone(),
            phase: op.phase,
        })
    }

    fn cancel(&self, id: &OperationId) {
        match self.operations().remove(id) {
            Some(op) => {
                if let Some(task) = op.task {
                    task.abort();
                }
                debug!("Cancelled operation {}", id);
            }
            None => debug!("Cancel for unknown operation {}", id),
        }
    }

    fn progress(&self, id: &OperationId) -> Option<f64> {
        self.operations()
            .get(id)
            .and_then(|op| op.progress.fraction())
    }
}

async fn execute(client: &Client, request: reqwest::Request) -> Outcome {
    let response = match client.execute(request).await {
        Ok(response) => response,
        Err(e) => return Outcome::client_failure(client_error(&e)),
    };

    let status = response.status().as_u16();
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match response.bytes().await {
        Ok(bytes) => Outcome {
            status,
            location,
            body: Some(bytes.to_vec()),
            client_error: None,
        },
        Err(e) => Outcome {
            status,
            location,
            body: None,
            client_error: Some(client_error(&e)),
        },
    }
}

fn client_error(err: &reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::timeout(err.to_string())
    } else {
        ClientError::new(err.to_string())
    }
}
