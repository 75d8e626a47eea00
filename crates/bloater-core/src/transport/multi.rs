//! libcurl transport driven by one `curl::multi` event loop.
//!
//! A dedicated thread owns the multi handle. [`CurlTransport::get`] queues a
//! job and wakes the loop, which adds an easy handle on its next pass; the
//! curl timeout therefore runs from the moment the transfer starts. Every
//! easy handle asks for its connection to be closed afterwards.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use curl::easy::{Easy2, Handler, List, WriteError};
use curl::multi::{Easy2Handle, Multi, MultiWaker};
use tokio::sync::oneshot;

use super::{Transport, TransportError, TransportFuture};

/// Longest the loop sleeps in `poll` when nothing wakes it.
const IDLE_POLL: Duration = Duration::from_millis(250);

type Reply = oneshot::Sender<Result<u16, TransportError>>;

struct Job {
    url: String,
    timeout: Duration,
    reply: Reply,
}

/// Easy2 handler that drops the response body.
struct Discard;

impl Handler for Discard {
    fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        Ok(data.len())
    }
}

/// Production transport built on the curl crate's multi interface.
pub struct CurlTransport {
    jobs: Sender<Job>,
    waker: MultiWaker,
}

impl std::fmt::Debug for CurlTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurlTransport").finish_non_exhaustive()
    }
}

impl CurlTransport {
    /// Start the event loop thread. It exits once the transport is dropped
    /// and its last transfer has finished.
    pub fn new() -> anyhow::Result<Self> {
        let (jobs, rx) = mpsc::channel();
        let (waker_tx, waker_rx) = mpsc::sync_channel(1);
        thread::Builder::new()
            .name("bloater-curl".to_string())
            .spawn(move || {
                let multi = Multi::new();
                if waker_tx.send(multi.waker()).is_err() {
                    return;
                }
                event_loop(&multi, &rx);
            })
            .context("spawn curl event loop")?;
        let waker = waker_rx
            .recv()
            .context("curl event loop exited before start")?;
        Ok(Self { jobs, waker })
    }
}

impl Transport for CurlTransport {
    fn get<'a>(&'a self, url: &'a str, timeout: Duration) -> TransportFuture<'a> {
        Box::pin(async move {
            let (reply, rx) = oneshot::channel();
            self.jobs
                .send(Job {
                    url: url.to_string(),
                    timeout,
                    reply,
                })
                .map_err(|_| TransportError::Other("curl event loop stopped".to_string()))?;
            self.waker
                .wakeup()
                .map_err(|e| TransportError::Other(format!("curl multi wakeup: {}", e)))?;
            rx.await
                .map_err(|_| TransportError::Other("curl event loop dropped the request".to_string()))?
        })
    }
}

/// Admit queued jobs, drive transfers, answer finished ones; repeat until the
/// job channel is closed and nothing is active.
fn event_loop(multi: &Multi, jobs: &Receiver<Job>) {
    let mut active: Vec<(Easy2Handle<Discard>, Reply)> = Vec::new();
    let mut open = true;

    while open || !active.is_empty() {
        loop {
            match jobs.try_recv() {
                Ok(job) => match start(multi, &job.url, job.timeout) {
                    Ok(handle) => active.push((handle, job.reply)),
                    Err(e) => {
                        let _ = job.reply.send(Err(e));
                    }
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    open = false;
                    break;
                }
            }
        }

        if let Err(e) = multi.perform() {
            tracing::error!("curl multi perform: {}", e);
            for (_, reply) in active.drain(..) {
                let _ = reply.send(Err(TransportError::Other(format!("curl multi perform: {}", e))));
            }
            return;
        }

        let mut done: Vec<(usize, Result<(), curl::Error>)> = Vec::new();
        multi.messages(|msg| {
            for (i, (handle, _)) in active.iter().enumerate() {
                if let Some(result) = msg.result_for2(handle) {
                    done.push((i, result));
                    break;
                }
            }
        });
        // Highest index first keeps swap_remove from moving an unvisited entry.
        done.sort_by(|a, b| b.0.cmp(&a.0));
        for (i, result) in done {
            let (handle, reply) = active.swap_remove(i);
            let _ = reply.send(finish(multi, handle, result));
        }

        if open || !active.is_empty() {
            if let Err(e) = multi.poll(&mut [], IDLE_POLL) {
                tracing::warn!("curl multi poll: {}", e);
            }
        }
    }
    tracing::debug!("curl event loop stopped");
}

fn start(multi: &Multi, url: &str, timeout: Duration) -> Result<Easy2Handle<Discard>, TransportError> {
    let mut easy = Easy2::new(Discard);
    easy.url(url)?;
    easy.get(true)?;
    easy.timeout(timeout)?;
    easy.forbid_reuse(true)?;

    let mut list = List::new();
    list.append("Connection: close")?;
    easy.http_headers(list)?;

    multi
        .add2(easy)
        .map_err(|e| TransportError::Other(format!("curl multi add: {}", e)))
}

/// Detach a finished handle and turn its result into a status code.
fn finish(
    multi: &Multi,
    handle: Easy2Handle<Discard>,
    result: Result<(), curl::Error>,
) -> Result<u16, TransportError> {
    let easy = multi
        .remove2(handle)
        .map_err(|e| TransportError::Other(format!("curl multi remove: {}", e)))?;
    result?;
    let code = easy.response_code()?;
    u16::try_from(code).map_err(|_| TransportError::Other(format!("invalid status code {}", code)))
}

impl From<curl::Error> for TransportError {
    fn from(e: curl::Error) -> Self {
        classify_curl_error(&e)
    }
}

/// Map a curl error onto the transport taxonomy; only timeouts are special.
fn classify_curl_error(e: &curl::Error) -> TransportError {
    if e.is_operation_timedout() {
        return TransportError::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
    {
        return TransportError::Connection(e.to_string());
    }
    TransportError::Other(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_error_maps_to_timeout() {
        // CURLE_OPERATION_TIMEDOUT
        let e = curl::Error::new(28);
        assert_eq!(TransportError::from(e), TransportError::Timeout);
    }

    #[test]
    fn refused_maps_to_connection() {
        // CURLE_COULDNT_CONNECT
        let e = curl::Error::new(7);
        assert!(matches!(TransportError::from(e), TransportError::Connection(_)));
    }

    #[test]
    fn unknown_maps_to_other() {
        // CURLE_UNSUPPORTED_PROTOCOL
        let e = curl::Error::new(1);
        let mapped = TransportError::from(e);
        assert!(matches!(mapped, TransportError::Other(_)));
        assert!(!mapped.is_timeout());
    }

    #[tokio::test]
    async fn dropped_transport_stops_its_loop() {
        let transport = CurlTransport::new().unwrap();
        let waker = transport.waker.clone();
        drop(transport);
        // The loop notices the closed channel within one idle poll.
        tokio::time::sleep(IDLE_POLL * 3).await;
        assert!(waker.wakeup().is_err());
    }
}
