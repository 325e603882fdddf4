use std::io;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    mpsc, Arc, Mutex,
};
use std::thread;

use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Shutdown,
}

struct ThreadPoolInner {
    name: String,
    sender: Mutex<mpsc::Sender<Message>>,
    workers: Mutex<Vec<Option<thread::JoinHandle<()>>>>,
    total_workers: usize,
    active_workers: Arc<AtomicUsize>,
}

/// Fixed-size pool of named worker threads fed through a channel.
#[derive(Clone)]
pub struct ThreadPool {
    inner: Arc<ThreadPoolInner>,
}

impl Drop for ThreadPoolInner {
    fn drop(&mut self) {
        let Ok(mut workers) = self.workers.lock() else {
            return;
        };

        // Tell everyone to shut down
        if let Ok(sender) = self.sender.lock() {
            for _ in 0..workers.len() {
                let _ = sender.send(Message::Shutdown);
            }
        }

        // Join them
        for handle_opt in workers.iter_mut() {
            if let Some(handle) = handle_opt.take() {
                let _ = handle.join();
            }
        }
        debug!("ThreadPool {} stopped", self.name);
    }
}

/// Counters for `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolMetrics {
    pub total: usize,
    pub active: usize,
}

impl ThreadPool {
    pub fn new(name: &str, size: usize) -> io::Result<Self> {
        let size = size.max(1);
        let (tx, rx) = mpsc::channel::<Message>();
        let receiver = Arc::new(Mutex::new(rx));

        let inner = Arc::new(ThreadPoolInner {
            name: name.to_string(),
            sender: Mutex::new(tx),
            workers: Mutex::new(Vec::with_capacity(size)),
            total_workers: size,
            active_workers: Arc::new(AtomicUsize::new(0)),
        });

        let mut handles = Vec::with_capacity(size);
        for idx in 0..size {
            let rx = Arc::clone(&receiver);
            let active = Arc::clone(&inner.active_workers);

            let handle = thread::Builder::new()
                .name(format!("{}-worker-{}", name, idx))
                .spawn(move || loop {
                    let message = match rx.lock() {
                        Ok(guard) => guard.recv(),
                        Err(_) => break,
                    };

                    match message {
                        Ok(Message::Run(job)) => {
                            active.fetch_add(1, Ordering::SeqCst);
                            job();
                            active.fetch_sub(1, Ordering::SeqCst);
                        }
                        Ok(Message::Shutdown) | Err(_) => break,
                    }
                })?;

            handles.push(Some(handle));
        }

        if let Ok(mut workers) = inner.workers.lock() {
            *workers = handles;
        }

        Ok(ThreadPool { inner })
    }

    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let sent = self
            .inner
            .sender
            .lock()
            .map(|sender| sender.send(Message::Run(Box::new(job))).is_ok());

        if !matches!(sent, Ok(true)) {
            warn!("ThreadPool {}: worker channel closed, job dropped", self.inner.name);
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            total: self.inner.total_workers,
            active: self.inner.active_workers.load(Ordering::SeqCst),
        }
    }
}
