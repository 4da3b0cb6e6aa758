//! Response interception for cache population.
//!
//! [`TeeBody`] forwards every frame of the render response to the client
//! unchanged and keeps a copy of each data chunk. Once the body has been
//! fully produced, the concatenated copy is handed to the cache store on a
//! background task; the client never waits on it.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use axum::body::Body;
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use http_body::{Body as HttpBody, Frame, SizeHint};

use crate::cache::{CacheStore, ResponseMeta};
use crate::observability::metrics;

/// Max characters of body echoed in a store-failure log line.
pub const SNIPPET_LEN: usize = 200;

type OnComplete = Box<dyn FnOnce(Bytes) + Send>;

/// A body wrapper that copies data frames into a buffer.
pub struct TeeBody {
    inner: Body,
    captured: BytesMut,
    on_complete: Option<OnComplete>,
}

impl TeeBody {
    pub fn new(inner: Body, on_complete: impl FnOnce(Bytes) + Send + 'static) -> Self {
        Self {
            inner,
            captured: BytesMut::new(),
            on_complete: Some(Box::new(on_complete)),
        }
    }

    fn finish(&mut self) {
        if let Some(done) = self.on_complete.take() {
            done(self.captured.split().freeze());
        }
    }
}

impl HttpBody for TeeBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match ready!(Pin::new(&mut this.inner).poll_frame(cx)) {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    this.captured.extend_from_slice(data);
                }
                // hyper stops polling once the inner body reports its end
                if this.inner.is_end_stream() {
                    this.finish();
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(e)) => {
                // A broken render is never stored
                this.on_complete = None;
                Poll::Ready(Some(Err(e)))
            }
            None => {
                this.finish();
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for TeeBody {
    fn drop(&mut self) {
        // Empty bodies may never be polled; an abandoned stream is incomplete.
        if self.on_complete.is_some() && self.inner.is_end_stream() {
            self.finish();
        }
    }
}

/// Wrap a render response so its body is stored under `path` on completion.
pub fn intercept(response: Response, path: String, cache: Arc<dyn CacheStore>) -> Response {
    let (parts, body) = response.into_parts();
    let meta = ResponseMeta {
        status: parts.status,
        headers: parts.headers.clone(),
    };

    let tee = TeeBody::new(body, move |captured| {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(path = %path, "No runtime to store cache entry");
            return;
        };
        runtime.spawn(store(cache, path, captured, meta));
    });

    Response::from_parts(parts, Body::new(tee))
}

async fn store(cache: Arc<dyn CacheStore>, path: String, body: Bytes, meta: ResponseMeta) {
    match cache.put(&path, body.clone(), &meta).await {
        Ok(()) => {
            metrics::record_cache_store("stored");
            tracing::info!(path = %path, "stored in cache");
        }
        Err(e) => {
            metrics::record_cache_store("error");
            tracing::warn!(
                path = %path,
                error = %e,
                body = %format!("{}...", snippet(&body)),
                "error storing cache"
            );
        }
    }
}

/// Body text with newlines removed, truncated to [`SNIPPET_LEN`] characters.
pub fn snippet(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .chars()
        .filter(|c| *c != '\n')
        .take(SNIPPET_LEN)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_tee_preserves_order_and_reports_once() {
        let chunks = vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"<html>")),
            Ok(Bytes::from_static(b"<body>Welcome")),
            Ok(Bytes::from_static(b"</body></html>")),
        ];
        let inner = Body::from_stream(futures_util::stream::iter(chunks));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let tee = TeeBody::new(inner, move |b| sink.lock().unwrap().push(b));

        let sent = tee.collect().await.unwrap().to_bytes();
        assert_eq!(&sent[..], b"<html><body>Welcome</body></html>");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], sent);
    }

    #[tokio::test]
    async fn test_full_body_completes_without_trailing_poll() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let mut tee = TeeBody::new(Body::from("one shot"), move |b| {
            *sink.lock().unwrap() = Some(b)
        });

        let frame = tee.frame().await.unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap(), Bytes::from_static(b"one shot"));
        assert_eq!(
            seen.lock().unwrap().as_deref(),
            Some(&b"one shot"[..])
        );
    }

    #[tokio::test]
    async fn test_abandoned_stream_is_not_reported() {
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, std::io::Error>>(1);
        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        let called = Arc::new(Mutex::new(false));
        let flag = called.clone();
        let mut tee = TeeBody::new(Body::from_stream(stream), move |_| {
            *flag.lock().unwrap() = true
        });

        tx.send(Ok(Bytes::from_static(b"partial"))).await.unwrap();
        let _ = tee.frame().await;
        drop(tee);
        assert!(!*called.lock().unwrap());
    }

    #[test]
    fn test_snippet_strips_newlines_and_truncates() {
        let body = format!("line one\nline two\n{}", "x".repeat(500));
        let s = snippet(body.as_bytes());
        assert_eq!(s.chars().count(), SNIPPET_LEN);
        assert!(s.starts_with("line oneline two"));
        assert!(!s.contains('\n'));
    }
}
