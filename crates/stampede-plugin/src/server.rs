//! Plugin side of the protocol.
//!
//! A driver binary hands its [`Driver`] to [`serve_stdio`] and the harness
//! takes it from there:
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # async fn run(driver: Arc<dyn stampede_plugin::Driver>) -> Result<(), stampede_plugin::DriverError> {
//! stampede_plugin::serve_stdio(driver).await
//! # }
//! ```

use crate::driver::Driver;
use crate::error::DriverError;
use crate::protocol::{
    handshake_line, message_reader, message_writer, read_message, write_line, write_message,
    Call, Reply, Request, Response, MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE, STREAM_WINDOW,
};
use stampede_core::UnitBuildContext;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// Serve `driver` over the process's stdin and stdout.
///
/// Refuses to run unless the harness's magic cookie is present, so that a
/// driver binary started by hand fails with a clear message instead of
/// waiting for input.
pub async fn serve_stdio(driver: Arc<dyn Driver>) -> Result<(), DriverError> {
    match std::env::var(MAGIC_COOKIE_KEY) {
        Ok(value) if value == MAGIC_COOKIE_VALUE => {}
        _ => {
            return Err(DriverError::Handshake(
                "this binary is a stampede driver plugin and is launched by the harness"
                    .to_string(),
            ))
        }
    }
    serve(driver, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Credit windows of the streams in flight, keyed by request id.
type Windows = Arc<StdMutex<HashMap<u64, Arc<Semaphore>>>>;

/// Serve `driver` over an arbitrary pipe until the reading side closes.
///
/// Requests are handled concurrently; replies are written as they complete.
/// A transaction stream is only pulled as far as the harness has granted
/// credit for it.
pub async fn serve<D, R, W>(driver: Arc<D>, reader: R, writer: W) -> Result<(), DriverError>
where
    D: Driver + ?Sized + 'static,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut reader = message_reader(reader);
    let mut writer = message_writer(writer);
    write_line(&mut writer, handshake_line()).await?;

    let (replies, mut outgoing) = mpsc::unbounded_channel::<Response>();
    let writer_task = tokio::spawn(async move {
        while let Some(response) = outgoing.recv().await {
            write_message(&mut writer, &response).await?;
        }
        Ok::<_, DriverError>(())
    });

    let windows: Windows = Arc::default();
    let mut handlers = JoinSet::new();
    let read_result = loop {
        match read_message::<_, Request>(&mut reader).await {
            Ok(Some(request)) => {
                debug!(id = request.id, method = request.call.method(), "Driver call");
                match request.call {
                    Call::StreamCredit { stream, credit } => {
                        if let Some(window) = lock(&windows).get(&stream) {
                            window.add_permits(credit as usize);
                        }
                    }
                    Call::CloseStream { stream } => {
                        if let Some(window) = lock(&windows).remove(&stream) {
                            window.close();
                        }
                    }
                    call => {
                        if matches!(call, Call::BuildTransactionsFromUnitStream(_)) {
                            let window = Arc::new(Semaphore::new(STREAM_WINDOW as usize));
                            lock(&windows).insert(request.id, window);
                        }
                        let request = Request {
                            id: request.id,
                            call,
                        };
                        handlers.spawn(handle(
                            Arc::clone(&driver),
                            request,
                            replies.clone(),
                            Arc::clone(&windows),
                        ));
                    }
                }
            }
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    // Nobody is left to grant credit
    for (_, window) in lock(&windows).drain() {
        window.close();
    }

    while let Some(joined) = handlers.join_next().await {
        if let Err(e) = joined {
            error!("Driver call handler panicked: {e}");
        }
    }
    drop(replies);

    match writer_task.await {
        Ok(write_result) => write_result?,
        Err(e) => warn!("Reply writer stopped abnormally: {e}"),
    }
    read_result
}

async fn handle<D>(
    driver: Arc<D>,
    request: Request,
    replies: mpsc::UnboundedSender<Response>,
    windows: Windows,
) where
    D: Driver + ?Sized,
{
    let id = request.id;
    let send = |reply: Reply| replies.send(Response { id, reply }).is_ok();

    let reply = match request.call {
        Call::Initialize(context) => driver.initialize(&context).await.map(|_| Reply::Ack),
        Call::BuildTransactionsFromUnit(context) => driver
            .build_transactions_from_unit(&context)
            .await
            .map(Reply::Transactions),
        Call::BuildTransactionsFromUnitStream(context) => {
            let window = lock(&windows)
                .get(&id)
                .cloned()
                .unwrap_or_else(|| Arc::new(Semaphore::new(STREAM_WINDOW as usize)));
            let forwarded = forward_stream(&*driver, &context, &window, &send).await;
            lock(&windows).remove(&id);
            match forwarded {
                Some(reply) => reply,
                None => return,
            }
        }
        Call::RunTransaction(transaction) => {
            driver.run_transaction(&transaction).await.map(|_| Reply::Ack)
        }
        Call::Teardown => driver.teardown().await.map(|_| Reply::Ack),
        Call::BuildQueries(context) => driver.build_queries(&context).await.map(Reply::Queries),
        Call::RunQuery(query) => driver.run_query(&query).await.map(|_| Reply::Ack),
        // Flow control never reaches a handler
        Call::StreamCredit { .. } | Call::CloseStream { .. } => return,
    };

    send(reply.unwrap_or_else(|e| Reply::Error(error_message(e))));
}

/// Send the driver's stream item by item, one per credit in `window`.
///
/// Returns the closing reply, or `None` once the harness has closed the
/// stream or stopped listening.
async fn forward_stream<D>(
    driver: &D,
    context: &UnitBuildContext,
    window: &Semaphore,
    send: &impl Fn(Reply) -> bool,
) -> Option<Result<Reply, DriverError>>
where
    D: Driver + ?Sized,
{
    let mut stream = match driver.build_transactions_from_unit_stream(context).await {
        Ok(stream) => stream,
        Err(e) => return Some(Err(e)),
    };

    loop {
        window.acquire().await.ok()?.forget();
        match stream.recv().await {
            Some(Ok(transaction)) => {
                if !send(Reply::StreamItem(transaction)) {
                    return None;
                }
            }
            Some(Err(e)) => return Some(Err(e)),
            None => return Some(Ok(Reply::StreamEnd)),
        }
    }
}

fn lock(windows: &Windows) -> MutexGuard<'_, HashMap<u64, Arc<Semaphore>>> {
    windows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Remote errors travel as their bare message so they are not prefixed twice.
fn error_message(err: DriverError) -> String {
    match err {
        DriverError::Remote(message) => message,
        other => other.to_string(),
    }
}
