//! `multipart/mixed` framing for incrementally delivered results.
//!
//! Wire shape, boundary `-`:
//!
//! ```text
//! ---\r\nContent-Type: application/json; charset=utf-8\r\nContent-Length: N\r\n\r\n{..}
//! \r\n---\r\nContent-Type: ...                      (one per further chunk)
//! \r\n-----\r\n                                      (end of stream)
//! ```

use std::convert::Infallible;

use axum::{
    body::{Body, Bytes},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use futures::{Stream, StreamExt, stream};

const OPENING: &[u8] = b"---";
const PART_SEPARATOR: &str = "\r\n---";
const CLOSING: &[u8] = b"\r\n-----\r\n";

pub const CONTENT_TYPE: &str = "multipart/mixed; boundary=\"-\"";

/// Chunked response that forwards `chunks` as they arrive.
///
/// Dropping the body (client went away) drops `chunks`, which is how the
/// engine's source gets unsubscribed.
pub fn response<S>(chunks: S) -> Response
where
    S: Stream<Item = serde_json::Value> + Send + 'static,
{
    let mut response = Body::from_stream(frames(chunks)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));
    headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
    response
}

pub fn frames<S>(chunks: S) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static
where
    S: Stream<Item = serde_json::Value> + Send + 'static,
{
    let parts = chunks
        .enumerate()
        .map(|(index, chunk)| Bytes::from(part(index, &chunk)));

    stream::once(async { Bytes::from_static(OPENING) })
        .chain(parts)
        .chain(stream::once(async { Bytes::from_static(CLOSING) }))
        .map(Ok)
}

fn part(index: usize, chunk: &serde_json::Value) -> Vec<u8> {
    let json = chunk.to_string();
    let separator = if index == 0 { "" } else { PART_SEPARATOR };
    format!(
        "{separator}\r\nContent-Type: application/json; charset=utf-8\r\nContent-Length: {}\r\n\r\n{json}",
        json.len()
    )
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};

    use http_body_util::BodyExt;
    use serde_json::json;

    use super::*;

    /// Yields the given chunks, then stays pending forever. Counts how many
    /// chunks were pulled and how many times it was dropped.
    struct TrackedSource {
        chunks: VecDeque<serde_json::Value>,
        pulled: Arc<AtomicUsize>,
        dropped: Arc<AtomicUsize>,
    }

    impl Stream for TrackedSource {
        type Item = serde_json::Value;

        fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    self.pulled.fetch_add(1, Ordering::SeqCst);
                    Poll::Ready(Some(chunk))
                }
                None => Poll::Pending,
            }
        }
    }

    impl Drop for TrackedSource {
        fn drop(&mut self) {
            self.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn two_chunks_then_closing_boundary() {
        let chunks = stream::iter(vec![json!({ "data": { "a": 1 } }), json!({ "b": "é" })]);
        let res = response(chunks);

        assert_eq!(res.headers()[header::CONTENT_TYPE], CONTENT_TYPE);
        assert_eq!(res.headers()[header::TRANSFER_ENCODING], "chunked");
        assert_eq!(res.headers()[header::CONNECTION], "keep-alive");

        let body = res.into_body().collect().await.unwrap().to_bytes();
        let expected = concat!(
            "---",
            "\r\nContent-Type: application/json; charset=utf-8\r\nContent-Length: 16\r\n\r\n",
            "{\"data\":{\"a\":1}}",
            "\r\n---",
            "\r\nContent-Type: application/json; charset=utf-8\r\nContent-Length: 10\r\n\r\n",
            "{\"b\":\"é\"}",
            "\r\n-----\r\n",
        );
        assert_eq!(std::str::from_utf8(&body).unwrap(), expected);
    }

    #[tokio::test]
    async fn empty_stream_still_closes() {
        let body = response(stream::empty())
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(&body[..], b"---\r\n-----\r\n");
    }

    #[tokio::test]
    async fn disconnect_unsubscribes_once_and_stops_output() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicUsize::new(0));
        let source = TrackedSource {
            chunks: VecDeque::from(vec![json!(1), json!(2), json!(3)]),
            pulled: pulled.clone(),
            dropped: dropped.clone(),
        };

        let mut body = response(source).into_body();

        let opening = body.frame().await.unwrap().unwrap().into_data().unwrap();
        assert_eq!(&opening[..], OPENING);
        let first = body.frame().await.unwrap().unwrap().into_data().unwrap();
        assert!(first.ends_with(b"\r\n\r\n1"));

        // Client goes away
        drop(body);

        assert_eq!(dropped.load(Ordering::SeqCst), 1);
        assert_eq!(pulled.load(Ordering::SeqCst), 1);
    }
}
