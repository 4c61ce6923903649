use crate::core::feeds::FeedStream;
use futures::StreamExt;
use futures::stream;
use tokio::sync::watch;

/// Latest-value publisher backing the feeds exposed by providers.
///
/// Subscribers receive the current value (if any) followed by later values.
/// Values published faster than a subscriber reads them are coalesced. Every
/// stream ends once the cell is dropped.
pub struct FeedCell<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T> FeedCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn publish(&self, value: T) {
        self.tx.send_replace(Some(value));
    }

    pub fn current(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> FeedStream<T> {
        let rx = self.tx.subscribe();
        stream::unfold((rx, true), |(mut rx, first)| async move {
            if first {
                let current = rx.borrow_and_update().clone();
                if let Some(value) = current {
                    return Some((Ok(value), (rx, false)));
                }
            }
            loop {
                rx.changed().await.ok()?;
                let next = rx.borrow_and_update().clone();
                if let Some(value) = next {
                    return Some((Ok(value), (rx, false)));
                }
            }
        })
        .boxed()
    }
}

impl<T> Default for FeedCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_sees_current_then_updates() {
        let cell = FeedCell::<u32>::new();
        cell.publish(1);

        let mut stream = cell.subscribe();
        assert_eq!(stream.next().await.unwrap().unwrap(), 1);

        cell.publish(2);
        assert_eq!(stream.next().await.unwrap().unwrap(), 2);
        assert_eq!(cell.current(), Some(2));
    }

    #[tokio::test]
    async fn test_values_are_coalesced() {
        let cell = FeedCell::<u32>::new();
        let mut stream = cell.subscribe();

        cell.publish(1);
        cell.publish(2);
        cell.publish(3);
        assert_eq!(stream.next().await.unwrap().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_stream_ends_when_cell_dropped() {
        let cell = FeedCell::<u32>::new();
        let mut stream = cell.subscribe();
        drop(cell);
        assert!(stream.next().await.is_none());
    }
}
