//! In-process fan-out of newly created posts to subscription streams.

use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::graphql::schema::Post;

const FEED_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct PostFeed {
    tx: broadcast::Sender<Post>,
}

impl Default for PostFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl PostFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, post: Post) {
        // Err only means nobody is listening right now
        if let Err(err) = self.tx.send(post) {
            tracing::debug!(post_id = %err.0.id.as_str(), "no subscribers for created post");
        }
    }

    /// A stream of posts published after this call. Lagging subscribers skip
    /// what they missed instead of ending the stream.
    pub fn subscribe(&self) -> impl Stream<Item = Post> + Send + 'static {
        let rx = self.tx.subscribe();
        futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(post) => return Some((post, rx)),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "post subscriber lagged");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
    }
}
