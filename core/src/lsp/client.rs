//! Generic JSON-RPC client for language analyzers.
//!
//! One background task reads frames off the transport and hands each
//! response to the caller waiting on its id. Callers register a one-shot
//! slot in the pending table before writing their request; the slot is
//! removed on delivery, and a drop guard removes it on timeout,
//! cancellation or write failure.

use super::framing;
use super::LspError;
use log::debug;
use lsp_types::notification::{Exit, Notification};
use lsp_types::request::{Request, Shutdown};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on each step of [`ProtocolClient::close`].
const CLOSE_GRACE: Duration = Duration::from_secs(2);

type Slot = oneshot::Sender<Result<Value, LspError>>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type SharedWriter = Arc<tokio::sync::Mutex<Option<BoxedWriter>>>;

#[derive(Default)]
struct PendingTable {
    slots: HashMap<i64, Slot>,
    /// Set once the reader has stopped; nothing will be delivered anymore.
    closed: bool,
}

fn lock(pending: &Mutex<PendingTable>) -> MutexGuard<'_, PendingTable> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a pending registration when the waiting call ends, however it ends.
struct Registration<'a> {
    pending: &'a Mutex<PendingTable>,
    id: i64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        lock(self.pending).slots.remove(&self.id);
    }
}

pub struct ProtocolClient {
    writer: SharedWriter,
    pending: Arc<Mutex<PendingTable>>,
    next_id: AtomicI64,
    timeout: Duration,
    cancel: CancellationToken,
    reader: Option<JoinHandle<()>>,
    // Behind a lock so the client stays `Sync` for callers sharing `&self`.
    child: Mutex<Option<Child>>,
}

impl ProtocolClient {
    /// Spawn `program` in `cwd` and talk to it over its stdin/stdout.
    pub fn spawn(program: &str, args: &[String], cwd: &Path) -> Result<Self, LspError> {
        let spawn_error = |source| LspError::Spawn {
            program: program.to_owned(),
            source,
        };

        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(spawn_error(std::io::Error::other("stdio not captured")));
        };

        debug!("[ProtocolClient::spawn] started {program} {}", args.join(" "));
        let mut client = Self::from_transport(stdout, stdin);
        client.child = Mutex::new(Some(child));
        Ok(client)
    }

    /// Build a client over an arbitrary byte stream pair. Must be called
    /// from within a tokio runtime.
    pub fn from_transport<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: SharedWriter = Arc::new(tokio::sync::Mutex::new(Some(Box::new(writer))));
        let pending = Arc::new(Mutex::new(PendingTable::default()));

        let reader = tokio::spawn(read_loop(
            reader,
            Arc::clone(&pending),
            Arc::clone(&writer),
        ));

        Self {
            writer,
            pending,
            next_id: AtomicI64::new(1),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            cancel: CancellationToken::new(),
            reader: Some(reader),
            child: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Abort in-flight and future calls when `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Number of requests still waiting for a response.
    pub fn pending_len(&self) -> usize {
        lock(&self.pending).slots.len()
    }

    /// Send a request and wait for its response, the timeout, or cancellation.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, LspError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut table = lock(&self.pending);
            if table.closed {
                return Err(LspError::Disconnected);
            }
            table.slots.insert(id, tx);
        }
        let _registration = Registration {
            pending: &self.pending,
            id,
        };

        debug!("[ProtocolClient::call] -> {method} #{id}");
        write_envelope(&self.writer, &envelope(Some(id), method, params)).await?;

        tokio::select! {
            delivered = rx => delivered.unwrap_or(Err(LspError::Disconnected)),
            () = tokio::time::sleep(self.timeout) => Err(LspError::Timeout {
                method: method.to_owned(),
                timeout: self.timeout,
            }),
            () = self.cancel.cancelled() => Err(LspError::Cancelled),
        }
    }

    /// Send a notification. Nothing is awaited beyond the write.
    pub async fn notify(&self, method: &str, params: Value) -> Result<(), LspError> {
        debug!("[ProtocolClient::notify] -> {method}");
        write_envelope(&self.writer, &envelope(None, method, params)).await
    }

    pub async fn request<R>(&self, params: R::Params) -> Result<R::Result, LspError>
    where
        R: Request,
    {
        let result = self.call(R::METHOD, serde_json::to_value(params)?).await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn notify_typed<N>(&self, params: N::Params) -> Result<(), LspError>
    where
        N: Notification,
    {
        self.notify(N::METHOD, serde_json::to_value(params)?).await
    }

    /// Shut the analyzer down and release the transport.
    ///
    /// Sends `shutdown` and `exit`, closes stdin, waits for the process
    /// (killing it if it lingers) and joins the reader task.
    pub async fn close(mut self) {
        let grace = self.timeout.min(CLOSE_GRACE);
        match tokio::time::timeout(grace, self.request::<Shutdown>(())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("[ProtocolClient::close] shutdown failed: {e}"),
            Err(_) => debug!("[ProtocolClient::close] shutdown timed out"),
        }
        if let Err(e) = self.notify_typed::<Exit>(()).await {
            debug!("[ProtocolClient::close] exit notification failed: {e}");
        }

        drop(self.writer.lock().await.take());

        let child = self
            .child
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut child) = child {
            match tokio::time::timeout(CLOSE_GRACE, child.wait()).await {
                Ok(Ok(status)) => debug!("[ProtocolClient::close] analyzer exited: {status}"),
                Ok(Err(e)) => debug!("[ProtocolClient::close] wait failed: {e}"),
                Err(_) => {
                    debug!("[ProtocolClient::close] analyzer still running, killing");
                    if let Err(e) = child.kill().await {
                        debug!("[ProtocolClient::close] kill failed: {e}");
                    }
                }
            }
        }

        if let Some(mut reader) = self.reader.take() {
            if tokio::time::timeout(CLOSE_GRACE, &mut reader).await.is_err() {
                reader.abort();
            }
        }
    }
}

impl Drop for ProtocolClient {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

fn envelope(id: Option<i64>, method: &str, params: Value) -> Value {
    let mut message = Map::new();
    message.insert("jsonrpc".to_owned(), json!("2.0"));
    if let Some(id) = id {
        message.insert("id".to_owned(), json!(id));
    }
    message.insert("method".to_owned(), json!(method));
    if !params.is_null() {
        message.insert("params".to_owned(), params);
    }
    Value::Object(message)
}

async fn write_envelope(writer: &SharedWriter, message: &Value) -> Result<(), LspError> {
    let body = serde_json::to_vec(message)?;
    let mut guard = writer.lock().await;
    let transport = guard.as_mut().ok_or(LspError::Disconnected)?;
    framing::write_message(transport, &body).await?;
    Ok(())
}

async fn read_loop<R>(reader: R, pending: Arc<Mutex<PendingTable>>, writer: SharedWriter)
where
    R: AsyncRead + Send + Unpin,
{
    let _closer = CloseOnExit {
        pending: Arc::clone(&pending),
    };
    let mut reader = BufReader::new(reader);
    loop {
        let body = match framing::read_message(&mut reader).await {
            Ok(Some(body)) => body,
            Ok(None) => {
                debug!("[read_loop] analyzer closed its output");
                break;
            }
            Err(e) => {
                debug!("[read_loop] transport error: {e}");
                break;
            }
        };
        match serde_json::from_slice::<Value>(&body) {
            Ok(message) => dispatch(message, &pending, &writer).await,
            Err(e) => debug!("[read_loop] dropping malformed frame: {e}"),
        }
    }
}

/// Marks the table closed and fails every waiter once the reader stops,
/// including when it unwinds.
struct CloseOnExit {
    pending: Arc<Mutex<PendingTable>>,
}

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        let mut table = lock(&self.pending);
        table.closed = true;
        table.slots.clear();
    }
}

async fn dispatch(mut message: Value, pending: &Mutex<PendingTable>, writer: &SharedWriter) {
    let id = message.get("id").filter(|id| !id.is_null()).cloned();
    let method = message
        .get("method")
        .and_then(Value::as_str)
        .map(str::to_owned);

    match (method, id) {
        (Some(method), Some(id)) => {
            // Requests from the server share the id space with ours only by
            // coincidence; answer them and never treat them as responses.
            debug!("[read_loop] <- server request {method}, replying null");
            let reply = json!({ "jsonrpc": "2.0", "id": id, "result": null });
            if let Err(e) = write_envelope(writer, &reply).await {
                debug!("[read_loop] failed to answer {method}: {e}");
            }
        }
        (Some(method), None) => debug!("[read_loop] <- notification {method}"),
        (None, Some(id)) => {
            let Some(id) = id.as_i64() else {
                debug!("[read_loop] dropping response with non-numeric id {id}");
                return;
            };
            let slot = lock(pending).slots.remove(&id);
            match slot {
                Some(slot) => {
                    debug!("[read_loop] <- response #{id}");
                    // The caller may have given up already; that is fine.
                    let _ = slot.send(response_outcome(&mut message));
                }
                None => debug!("[read_loop] dropping response for unknown id {id}"),
            }
        }
        (None, None) => debug!("[read_loop] dropping message without id or method"),
    }
}

fn response_outcome(message: &mut Value) -> Result<Value, LspError> {
    if let Some(error) = message.get("error") {
        return Err(LspError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
        });
    }
    Ok(message.get_mut("result").map(Value::take).unwrap_or_default())
}
