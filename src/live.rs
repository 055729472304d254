//! Scoped live subscriptions.
//!
//! A [`LiveStream`] owns the task that feeds it. Dropping the stream aborts
//! that task, so a view releases every subscription it holds simply by
//! going out of scope.

use crate::error::StoreError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct LiveStream<T> {
    rx: watch::Receiver<T>,
    producer: Option<JoinHandle<()>>,
}

impl<T> LiveStream<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Wraps a receiver together with the task that publishes into it.
    pub fn new(rx: watch::Receiver<T>, producer: JoinHandle<()>) -> Self {
        Self {
            rx,
            producer: Some(producer),
        }
    }

    /// Latest published value.
    pub fn current(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Waits for the next value and returns it.
    pub async fn changed(&mut self) -> Result<T, StoreError> {
        self.rx.changed().await.map_err(|_| StoreError::Closed)?;
        Ok(self.rx.borrow_and_update().clone())
    }

    /// Another receiver on the same channel. It does not keep the producer alive.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.rx.clone()
    }

    pub fn is_active(&self) -> bool {
        self.producer.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Derives a stream by applying `f` to every value. The source is owned by
    /// the derived stream's task and released with it.
    pub fn map<U, F>(self, mut f: F) -> LiveStream<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnMut(&T) -> U + Send + 'static,
    {
        let mut source = self;
        let initial = f(&*source.rx.borrow_and_update());
        let (tx, rx) = watch::channel(initial);
        let producer = tokio::spawn(async move {
            while source.rx.changed().await.is_ok() {
                let next = f(&*source.rx.borrow_and_update());
                if tx.send(next).is_err() {
                    break;
                }
            }
        });
        LiveStream::new(rx, producer)
    }

    /// Stops the producer now rather than at drop.
    pub fn release(mut self) {
        if let Some(handle) = self.producer.take() {
            handle.abort();
        }
    }
}

impl<T> Drop for LiveStream<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.producer.take() {
            handle.abort();
        }
    }
}

/// Recomputes `f` from the latest value of both receivers whenever either one
/// changes. Both values are read at the same instant, so a result never pairs
/// a fresh value with one from an earlier emission.
pub fn combine_latest<A, B, C, F>(
    mut a: watch::Receiver<A>,
    mut b: watch::Receiver<B>,
    mut f: F,
) -> LiveStream<C>
where
    A: Send + Sync + 'static,
    B: Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
    F: FnMut(&A, &B) -> C + Send + 'static,
{
    let initial = {
        let av = a.borrow_and_update();
        let bv = b.borrow_and_update();
        f(&*av, &*bv)
    };
    let (tx, rx) = watch::channel(initial);
    let producer = tokio::spawn(async move {
        loop {
            let alive = tokio::select! {
                r = a.changed() => r.is_ok(),
                r = b.changed() => r.is_ok(),
            };
            if !alive {
                break;
            }
            let next = {
                let av = a.borrow_and_update();
                let bv = b.borrow_and_update();
                f(&*av, &*bv)
            };
            if tx.send(next).is_err() {
                break;
            }
        }
    });
    LiveStream::new(rx, producer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn next<T: Clone + Send + Sync + 'static>(s: &mut LiveStream<T>) -> T {
        tokio::time::timeout(Duration::from_secs(2), s.changed())
            .await
            .expect("timed out waiting for emission")
            .expect("stream closed")
    }

    #[tokio::test]
    async fn test_map_follows_source() {
        let (tx, rx) = watch::channel(1u32);
        let producer = tokio::spawn(async {});
        let source = LiveStream::new(rx, producer);
        let mut doubled = source.map(|v| v * 2);
        assert_eq!(doubled.current(), 2);

        tx.send(5).unwrap();
        assert_eq!(next(&mut doubled).await, 10);
    }

    #[tokio::test]
    async fn test_combine_latest_uses_newest_pair() {
        let (tx_a, rx_a) = watch::channel(vec![1, 2, 3]);
        let (tx_b, rx_b) = watch::channel(0);
        let mut sums = combine_latest(rx_a, rx_b, |a: &Vec<i32>, b: &i32| {
            a.iter().sum::<i32>() + b
        });
        assert_eq!(sums.current(), 6);

        tx_b.send(10).unwrap();
        assert_eq!(next(&mut sums).await, 16);

        tx_a.send(vec![1]).unwrap();
        assert_eq!(next(&mut sums).await, 11);
    }

    #[tokio::test]
    async fn test_drop_aborts_producer() {
        let (tx, rx) = watch::channel(0u8);
        let producer = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(5)).await;
                if tx.send(1).is_err() {
                    break;
                }
            }
        });
        let stream = LiveStream::new(rx, producer);
        let observer = stream.subscribe();
        assert!(stream.is_active());
        drop(stream);

        // The sender lives inside the aborted task, so the channel closes.
        let mut observer = observer;
        let closed = tokio::time::timeout(Duration::from_secs(2), async {
            while observer.changed().await.is_ok() {}
        })
        .await;
        assert!(closed.is_ok());
    }

    #[tokio::test]
    async fn test_changed_after_close() {
        let (tx, rx) = watch::channel(0u8);
        let producer = tokio::spawn(async {});
        let mut stream = LiveStream::new(rx, producer);
        drop(tx);
        assert!(matches!(stream.changed().await, Err(StoreError::Closed)));
    }
}
