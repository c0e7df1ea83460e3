use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// One channel drained by many workers
///
/// Each item goes to exactly one caller of [`SharedReceiver::recv`]. Once
/// every sender is dropped and the buffer is empty, all callers see `None`.
#[derive(Debug)]
pub struct SharedReceiver<T> {
    inner: Arc<Mutex<UnboundedReceiver<T>>>,
}

impl<T> Clone for SharedReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedReceiver<T> {
    pub fn new(receiver: UnboundedReceiver<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(receiver)),
        }
    }

    pub async fn recv(&self) -> Option<T> {
        self.inner.lock().await.recv().await
    }
}

/// Unbounded channel whose receiving half can be shared
pub fn shared_channel<T>() -> (UnboundedSender<T>, SharedReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, SharedReceiver::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_each_item_delivered_once() {
        let (tx, rx) = shared_channel();
        for n in 0..100u32 {
            tx.send(n).unwrap();
        }
        drop(tx);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let rx = rx.clone();
                tokio::spawn(async move {
                    let mut got = Vec::new();
                    while let Some(n) = rx.recv().await {
                        got.push(n);
                    }
                    got
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for n in handle.await.unwrap() {
                assert!(seen.insert(n), "{n} delivered twice");
            }
        }
        assert_eq!(seen.len(), 100);
    }
}
