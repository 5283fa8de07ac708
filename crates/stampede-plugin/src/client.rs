//! Client side of the plugin protocol.
//!
//! A [`DriverClient`] implements [`Driver`] by forwarding every call to a
//! plugin. A background task reads replies and routes them to the waiting
//! call by request id, so any number of calls may be in flight at once.
//!
//! A transaction stream grants the plugin credit as the consumer takes
//! items, so at most [`STREAM_WINDOW`] items are buffered per stream.

use crate::driver::Driver;
use crate::error::DriverError;
use crate::protocol::{
    check_handshake, message_reader, message_writer, read_line, read_message, write_message,
    Call, MessageWriter, Reply, Request, Response, MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE,
    STREAM_WINDOW,
};
use crate::stream::TransactionStream;
use async_trait::async_trait;
use futures::stream;
use stampede_core::{
    BuildQueriesContext, DriverConfig, DriverQuery, StepContext, Transaction, UnitBuildContext,
};
use std::collections::HashMap;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long a freshly spawned plugin may take to write its handshake
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;
type SharedWriter = Arc<Mutex<MessageWriter<BoxedWriter>>>;

enum Pending {
    Unary(oneshot::Sender<Reply>),
    Stream(mpsc::UnboundedSender<Reply>),
}

/// In-flight requests; `None` once the reply reader has stopped.
type PendingMap = Arc<StdMutex<Option<HashMap<u64, Pending>>>>;

/// Connection to a driver plugin.
pub struct DriverClient {
    writer: SharedWriter,
    pending: PendingMap,
    next_id: AtomicU64,
    reader_task: JoinHandle<()>,
    child: Mutex<Option<Child>>,
}

impl DriverClient {
    /// Perform the handshake over an established pipe and start routing replies.
    pub async fn new<R, W>(reader: R, writer: W) -> Result<Self, DriverError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        let mut reader = message_reader(reader);
        let line = read_line(&mut reader).await?.ok_or_else(|| {
            DriverError::Handshake("driver exited before completing the handshake".to_string())
        })?;
        check_handshake(&line)?;

        let pending: PendingMap = Arc::new(StdMutex::new(Some(HashMap::new())));
        let routes = Arc::clone(&pending);
        let reader_task = tokio::spawn(async move {
            loop {
                match read_message::<_, Response>(&mut reader).await {
                    Ok(Some(response)) => route(&routes, response),
                    Ok(None) => {
                        debug!("Driver closed its output");
                        break;
                    }
                    Err(e) => {
                        warn!("Stopped reading driver replies: {e}");
                        break;
                    }
                }
            }
            close_pending(&routes);
        });

        let writer: BoxedWriter = Box::pin(writer);
        Ok(Self {
            writer: Arc::new(Mutex::new(message_writer(writer))),
            pending,
            next_id: AtomicU64::new(1),
            reader_task,
            child: Mutex::new(None),
        })
    }

    /// Kill the plugin process, if this client launched one.
    pub async fn kill(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill driver process: {e}");
            }
        }
    }

    fn register(&self, pending: Pending) -> Result<u64, DriverError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut guard = lock(&self.pending);
        let map = guard.as_mut().ok_or_else(connection_closed)?;
        map.insert(id, pending);
        Ok(id)
    }

    async fn send(&self, id: u64, call: Call) -> Result<(), DriverError> {
        let result = send_call(&self.writer, id, call).await;
        if result.is_err() {
            unregister(&self.pending, id);
        }
        result
    }

    async fn call(&self, call: Call) -> Result<Reply, DriverError> {
        let (sender, receiver) = oneshot::channel();
        let id = self.register(Pending::Unary(sender))?;
        self.send(id, call).await?;

        match receiver.await.map_err(|_| connection_closed())? {
            Reply::Error(message) => Err(DriverError::Remote(message)),
            reply => Ok(reply),
        }
    }

    async fn call_ack(&self, call: Call) -> Result<(), DriverError> {
        let method = call.method();
        match self.call(call).await? {
            Reply::Ack => Ok(()),
            other => Err(unexpected(method, &other)),
        }
    }
}

impl Drop for DriverClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

#[async_trait]
impl Driver for DriverClient {
    async fn initialize(&self, context: &StepContext) -> Result<(), DriverError> {
        self.call_ack(Call::Initialize(context.clone())).await
    }

    async fn build_transactions_from_unit(
        &self,
        context: &UnitBuildContext,
    ) -> Result<Vec<Transaction>, DriverError> {
        match self
            .call(Call::BuildTransactionsFromUnit(context.clone()))
            .await?
        {
            Reply::Transactions(transactions) => Ok(transactions),
            other => Err(unexpected("build_transactions_from_unit", &other)),
        }
    }

    async fn build_transactions_from_unit_stream(
        &self,
        context: &UnitBuildContext,
    ) -> Result<TransactionStream, DriverError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.register(Pending::Stream(sender))?;
        self.send(id, Call::BuildTransactionsFromUnitStream(context.clone()))
            .await?;

        let credit = CreditGrant {
            stream: id,
            consumed: 0,
            finished: false,
            writer: Arc::clone(&self.writer),
            pending: Arc::clone(&self.pending),
        };
        let items = stream::unfold((receiver, credit), |(mut receiver, mut credit)| async move {
            let item = match receiver.recv().await? {
                Reply::StreamItem(transaction) => {
                    credit.consumed_one().await;
                    Ok(transaction)
                }
                Reply::StreamEnd => {
                    credit.finished = true;
                    return None;
                }
                Reply::Error(message) => {
                    credit.finished = true;
                    Err(DriverError::Remote(message))
                }
                other => {
                    credit.finished = true;
                    Err(unexpected("build_transactions_from_unit_stream", &other))
                }
            };
            Some((item, (receiver, credit)))
        });
        Ok(TransactionStream::new(items))
    }

    async fn run_transaction(&self, transaction: &Transaction) -> Result<(), DriverError> {
        self.call_ack(Call::RunTransaction(transaction.clone())).await
    }

    async fn teardown(&self) -> Result<(), DriverError> {
        self.call_ack(Call::Teardown).await
    }

    async fn build_queries(
        &self,
        context: &BuildQueriesContext,
    ) -> Result<Vec<DriverQuery>, DriverError> {
        match self.call(Call::BuildQueries(context.clone())).await? {
            Reply::Queries(queries) => Ok(queries),
            other => Err(unexpected("build_queries", &other)),
        }
    }

    async fn run_query(&self, query: &DriverQuery) -> Result<(), DriverError> {
        self.call_ack(Call::RunQuery(query.clone())).await
    }
}

/// Consumer side of a stream's credit window.
struct CreditGrant {
    stream: u64,
    consumed: u32,
    finished: bool,
    writer: SharedWriter,
    pending: PendingMap,
}

impl CreditGrant {
    /// Record one consumed item, granting credit back in half-window batches.
    async fn consumed_one(&mut self) {
        self.consumed += 1;
        if self.consumed < STREAM_WINDOW / 2 {
            return;
        }
        let call = Call::StreamCredit {
            stream: self.stream,
            credit: self.consumed,
        };
        self.consumed = 0;
        // A broken pipe also fails the stream through the reply reader
        if let Err(e) = send_call(&self.writer, self.stream, call).await {
            debug!(stream = self.stream, "Could not grant stream credit: {e}");
        }
    }
}

impl Drop for CreditGrant {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        unregister(&self.pending, self.stream);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let writer = Arc::clone(&self.writer);
        let stream = self.stream;
        runtime.spawn(async move {
            if let Err(e) = send_call(&writer, stream, Call::CloseStream { stream }).await {
                debug!(stream, "Could not close stream: {e}");
            }
        });
    }
}

async fn send_call(writer: &SharedWriter, id: u64, call: Call) -> Result<(), DriverError> {
    debug!(id, method = call.method(), "Sending driver call");
    let mut writer = writer.lock().await;
    write_message(&mut *writer, &Request { id, call }).await
}

/// Launch the plugin described by `config` and connect to it.
///
/// The command line runs through `sh -c`, with the magic cookie set in the
/// plugin's environment. The plugin's stderr is inherited.
pub async fn connect(config: &DriverConfig) -> Result<DriverClient, DriverError> {
    let command_line = command_line(config);
    info!(command = %command_line, "Starting driver plugin");

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(&command_line)
        .env(MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| DriverError::Spawn {
            path: config.path.clone(),
            source,
        })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| DriverError::Protocol("driver stdin is not piped".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| DriverError::Protocol("driver stdout is not piped".to_string()))?;

    let client = tokio::time::timeout(HANDSHAKE_TIMEOUT, DriverClient::new(stdout, stdin))
        .await
        .map_err(|_| {
            DriverError::Handshake(format!(
                "no handshake within {}s",
                HANDSHAKE_TIMEOUT.as_secs()
            ))
        })??;
    *client.child.lock().await = Some(child);

    info!(path = %config.path, "Connected to driver plugin");
    Ok(client)
}

/// Shell command line for a driver: the path followed by quoted arguments.
pub fn command_line(config: &DriverConfig) -> String {
    let mut line = config.path.clone();
    for arg in &config.args {
        line.push(' ');
        line.push_str(&shell_quote(arg));
    }
    line
}

fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

fn lock(
    pending: &PendingMap,
) -> std::sync::MutexGuard<'_, Option<HashMap<u64, Pending>>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn unregister(pending: &PendingMap, id: u64) {
    if let Some(map) = lock(pending).as_mut() {
        map.remove(&id);
    }
}

fn route(pending: &PendingMap, response: Response) {
    let mut guard = lock(pending);
    let Some(map) = guard.as_mut() else {
        return;
    };

    let is_final = response.reply.is_final();
    match map.remove(&response.id) {
        Some(Pending::Stream(sender)) => {
            // The consumer may have dropped the stream; that is not an error
            let _ = sender.send(response.reply);
            if !is_final {
                map.insert(response.id, Pending::Stream(sender));
            }
        }
        Some(Pending::Unary(sender)) => {
            let _ = sender.send(response.reply);
        }
        // Items already in flight when the harness closed a stream
        None => debug!(id = response.id, "Reply for closed request"),
    }
}

/// Fail every in-flight request and refuse new ones.
fn close_pending(pending: &PendingMap) {
    let Some(map) = lock(pending).take() else {
        return;
    };
    for (_, entry) in map {
        match entry {
            // Dropping the sender fails the waiting call
            Pending::Unary(_) => {}
            Pending::Stream(sender) => {
                let _ = sender.send(Reply::Error(connection_closed().to_string()));
            }
        }
    }
}

fn connection_closed() -> DriverError {
    DriverError::Protocol("driver connection closed".to_string())
}

fn unexpected(method: &str, reply: &Reply) -> DriverError {
    DriverError::Protocol(format!("unexpected reply to {method}: {reply:?}"))
}
