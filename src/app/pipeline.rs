use std::{
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, Mutex,
    },
    thread,
};

use anyhow::{anyhow, Result};

use crate::jobs::{Job, Outcome, Worker};

/// Runs [`Job`]s on a fixed set of threads and hands back their outcomes.
pub struct Pipeline {
    job_tx: Sender<Job>,
    outcome_rx: Receiver<Outcome>,
    pub in_flight: usize,
}

impl Pipeline {
    pub fn new(concurrency: usize, worker: Arc<Worker>) -> Self {
        let (job_tx, job_rx) = mpsc::channel();
        let (outcome_tx, outcome_rx) = mpsc::channel();

        let rx = Arc::new(Mutex::new(job_rx));

        for _ in 0..concurrency.max(1) {
            Self::spawn_worker_thread(rx.clone(), outcome_tx.clone(), worker.clone());
        }

        Self {
            job_tx,
            outcome_rx,
            in_flight: 0,
        }
    }

    fn spawn_worker_thread(rx: Arc<Mutex<Receiver<Job>>>, tx: Sender<Outcome>, worker: Arc<Worker>) {
        thread::spawn(move || loop {
            let job = {
                let Ok(lock) = rx.lock() else { break };
                match lock.recv() {
                    Ok(job) => job,
                    Err(_) => break,
                }
            };

            if tx.send(worker.run(job)).is_err() {
                break;
            }
        });
    }

    pub fn submit(&mut self, job: Job) -> Result<()> {
        self.in_flight += 1;
        self.job_tx.send(job).map_err(|e| {
            self.in_flight -= 1;
            anyhow!("Failed to queue job: {}", e)
        })
    }

    pub fn poll(&mut self) -> Vec<Outcome> {
        let mut completed = Vec::new();
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            completed.push(outcome);
        }
        completed
    }
}
