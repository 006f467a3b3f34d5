//! Worker pool for map tasks.
//!
//! Tasks go to the workers over an unbounded FIFO channel. Finished tasks
//! come back over a second channel so their completion hooks can run on
//! the observer thread in [`Executor::process_completed`].

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::task::{Task, TaskQueue};

/// Background executor with a fixed number of named worker threads.
///
/// With a single worker, tasks run strictly in submission order.
pub struct Executor {
    jobs: Mutex<Option<Sender<Box<dyn Task>>>>,
    completed: Receiver<Box<dyn Task>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    in_flight: Arc<AtomicUsize>,
}

impl Executor {
    /// Starts `worker_threads` workers (at least one).
    pub fn new(worker_threads: usize) -> io::Result<Self> {
        let (job_tx, job_rx) = unbounded::<Box<dyn Task>>();
        let (done_tx, done_rx) = unbounded::<Box<dyn Task>>();
        let in_flight = Arc::new(AtomicUsize::new(0));

        let count = worker_threads.max(1);
        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let jobs = job_rx.clone();
            let done = done_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("voxmap-worker-{index}"))
                .spawn(move || worker_loop(&jobs, &done))?;
            workers.push(handle);
        }
        info!(workers = count, "started map executor");

        Ok(Self {
            jobs: Mutex::new(Some(job_tx)),
            completed: done_rx,
            workers: Mutex::new(workers),
            in_flight,
        })
    }

    /// Runs the completion hooks of every finished task. Returns how many ran.
    pub fn process_completed(&self) -> usize {
        let mut count = 0;
        for mut task in self.completed.try_iter() {
            task.on_complete();
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
            count += 1;
        }
        count
    }

    /// Tasks submitted whose completion hook has not run yet.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Stops accepting tasks, lets the workers drain the queue, joins them
    /// and runs the remaining completion hooks.
    pub fn shutdown(&self) {
        if self.jobs.lock().take().is_none() {
            return;
        }
        for handle in self.workers.lock().drain(..) {
            if handle.join().is_err() {
                warn!("map worker panicked");
            }
        }
        let finished = self.process_completed();
        info!(finished, "map executor shut down");
    }
}

impl TaskQueue for Executor {
    fn submit(&self, task: Box<dyn Task>) {
        let jobs = self.jobs.lock();
        let Some(sender) = jobs.as_ref() else {
            warn!(kind = ?task.kind(), "executor shut down, dropping task");
            return;
        };
        trace!(kind = ?task.kind(), "submitting task");
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = sender.send(task) {
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
            warn!(kind = ?e.into_inner().kind(), "no worker left, dropping task");
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(jobs: &Receiver<Box<dyn Task>>, done: &Sender<Box<dyn Task>>) {
    while let Ok(mut task) = jobs.recv() {
        task.run();
        if done.send(task).is_err() {
            break;
        }
    }
    debug!("map worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskKind;
    use std::time::{Duration, Instant};

    struct Recorder {
        id: usize,
        ran: Arc<Mutex<Vec<usize>>>,
        completed: Arc<Mutex<Vec<(usize, String)>>>,
    }

    impl Task for Recorder {
        fn kind(&self) -> TaskKind {
            TaskKind::SaveChunk
        }

        fn run(&mut self) {
            self.ran.lock().push(self.id);
        }

        fn on_complete(&mut self) {
            let name = thread::current().name().unwrap_or_default().to_string();
            self.completed.lock().push((self.id, name));
        }
    }

    fn wait_for(executor: &Executor, expected: usize) -> usize {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut total = 0;
        while total < expected && Instant::now() < deadline {
            total += executor.process_completed();
            thread::sleep(Duration::from_millis(1));
        }
        total
    }

    #[test]
    fn test_single_worker_is_fifo() {
        let executor = Executor::new(1).expect("spawn");
        let ran = Arc::new(Mutex::new(Vec::new()));
        let completed = Arc::new(Mutex::new(Vec::new()));
        for id in 0..50 {
            executor.submit(Box::new(Recorder {
                id,
                ran: ran.clone(),
                completed: completed.clone(),
            }));
        }

        assert_eq!(wait_for(&executor, 50), 50);
        assert_eq!(*ran.lock(), (0..50).collect::<Vec<_>>());
        assert_eq!(executor.in_flight(), 0);

        let here = thread::current().name().unwrap_or_default().to_string();
        assert!(completed.lock().iter().all(|(_, name)| *name == here));
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let executor = Executor::new(3).expect("spawn");
        let ran = Arc::new(Mutex::new(Vec::new()));
        let completed = Arc::new(Mutex::new(Vec::new()));
        for id in 0..20 {
            executor.submit(Box::new(Recorder {
                id,
                ran: ran.clone(),
                completed: completed.clone(),
            }));
        }
        executor.shutdown();
        assert_eq!(ran.lock().len(), 20);
        assert_eq!(completed.lock().len(), 20);

        executor.submit(Box::new(Recorder {
            id: 99,
            ran: ran.clone(),
            completed,
        }));
        assert_eq!(ran.lock().len(), 20);
        assert_eq!(executor.in_flight(), 0);
    }
}
