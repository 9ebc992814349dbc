//! Runs a job on a worker thread: load, validate, fan out, dock each sub-job
//! and checkpoint it. The calling thread only relays progress.

use std::{
    path::Path,
    sync::{
        mpsc::{self, Sender},
        Arc, Mutex,
    },
    thread,
};

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};
use vina_job::{
    batch::{self, SubJob},
    checkpoint::CheckpointStore,
    Config,
};

use crate::{
    docking::{DockingInvoker, EngineFactory, EngineSettings},
    progress::ProgressReporter,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobReport {
    pub sub_jobs: usize,
    pub skipped: usize,
    pub docked: usize,
}

/// Load, validate and run the job described by `config_file`, calling
/// `on_progress` with the overall completion fraction as it grows.
///
/// A sub-job failure aborts the job and leaves the checkpoint in place, so
/// the next run resumes after the last docked sub-job.
pub fn run_job<F, P>(config_file: &Path, factory: F, mut on_progress: P) -> Result<JobReport>
where
    F: EngineFactory + Send + 'static,
    P: FnMut(f64),
{
    let config = Config::load(config_file).context("Config load failed, cannot proceed further")?;
    config
        .validate()
        .context("Config validation failed, cannot proceed further")?;
    let sub_jobs = batch::plan(&config)?;
    let checkpoint = CheckpointStore::for_config(config_file);

    let (sender, receiver) = mpsc::channel();
    let worker = thread::Builder::new()
        .name("docking".to_string())
        .spawn(move || execute(config, sub_jobs, checkpoint, factory, sender))
        .context("Unable to start the docking worker")?;
    for fraction in receiver {
        on_progress(fraction);
    }
    worker
        .join()
        .map_err(|_| anyhow!("The docking worker panicked"))?
}

fn relay<F>(reporter: &Mutex<ProgressReporter>, sender: &Sender<f64>, step: F)
where
    F: FnOnce(&mut ProgressReporter) -> Option<f64>,
{
    let Ok(mut reporter) = reporter.lock() else {
        return;
    };
    if let Some(fraction) = step(&mut reporter) {
        // the receiver only goes away once the worker is done
        let _ = sender.send(fraction);
    }
}

fn execute<F: EngineFactory>(
    config: Config,
    sub_jobs: Vec<SubJob>,
    checkpoint: CheckpointStore,
    factory: F,
    sender: Sender<f64>,
) -> Result<JobReport> {
    let completed = checkpoint.completed()?;
    if !completed.is_empty() {
        info!(
            "Resume from checkpoint {:?}, {} of {} sub-jobs already docked",
            checkpoint.path(),
            completed.len(),
            sub_jobs.len()
        );
    }

    let reporter = Arc::new(Mutex::new(ProgressReporter::new(sub_jobs.len())));
    let callback = {
        let reporter = reporter.clone();
        let sender = sender.clone();
        Box::new(move |fraction: f64| relay(&reporter, &sender, |r| r.update(fraction)))
    };
    let engine = factory.create(&EngineSettings::from(&config), callback)?;
    let mut invoker = DockingInvoker::new(engine);
    invoker.prepare(&config)?;

    let mut report = JobReport {
        sub_jobs: sub_jobs.len(),
        ..Default::default()
    };
    for (index, sub_job) in sub_jobs.iter().enumerate() {
        relay(&reporter, &sender, |r| {
            r.begin(index);
            None
        });
        if completed.contains(&sub_job.key) {
            info!("Skip {:?}, docked before the restart", sub_job.key);
            report.skipped += 1;
        } else {
            info!(
                "Sub-job {}/{}: {:?}",
                index + 1,
                sub_jobs.len(),
                sub_job.key
            );
            if let Err(err) = invoker.dock(&sub_job.config) {
                warn!(
                    "Docking stopped at {:?}, checkpoint {:?} kept",
                    sub_job.key,
                    checkpoint.path()
                );
                return Err(err.context(format!("Docking {:?} failed", sub_job.key)));
            }
            checkpoint.record(&sub_job.key)?;
            report.docked += 1;
        }
        relay(&reporter, &sender, |r| r.update(1.));
    }

    checkpoint.clear()?;
    relay(&reporter, &sender, ProgressReporter::finish);
    info!(
        "Docking finished, {} sub-jobs docked and {} skipped",
        report.docked, report.skipped
    );
    Ok(report)
}
