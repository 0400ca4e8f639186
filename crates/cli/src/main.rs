mod cli;
mod manifest;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use tracing::info;

use mlswarm_core::{ChunkId, Config, EstimatorId, TaskId, TaskRecord, TaskStatus};
use mlswarm_tasks::{Dispatcher, NewChunk, NewEstimator, NewTask, Swarm};

use crate::cli::{CliArgs, Command};
use crate::manifest::{raw_properties, Manifest};

fn main() -> Result<()> {
    mlswarm_core::config::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let mut config = Config::from_env();

    match args.command {
        Command::Services { json } => {
            let swarm = Swarm::from_config(&config);
            print_services(&swarm, json)
        }
        Command::Run {
            manifest,
            reports_dir,
            workers,
            json,
        } => {
            if let Some(dir) = reports_dir {
                config.storage.reports_dir = dir;
            }
            if let Some(n) = workers {
                config.worker.threads = n;
            }
            config.log_summary();
            run_manifest(&config, &manifest, json)
        }
    }
}

fn print_services(swarm: &Swarm, json: bool) -> Result<()> {
    let parsers = swarm.list_parser_services();
    let estimators = swarm.list_estimator_services();

    if json {
        let out = serde_json::json!({ "parsers": parsers, "estimators": estimators });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for (family, services) in [("parsers", &parsers), ("estimators", &estimators)] {
        println!("{}:", family);
        for service in services.iter() {
            let fields: Vec<String> = service
                .properties
                .fields()
                .iter()
                .map(|f| {
                    if f.required {
                        format!("{}*", f.name)
                    } else {
                        f.name.clone()
                    }
                })
                .collect();
            println!("  {:<30} {}", service.id, fields.join(", "));
        }
    }
    Ok(())
}

fn run_manifest(config: &Config, path: &Path, json: bool) -> Result<()> {
    let manifest = Manifest::load(path)?;
    let swarm = Arc::new(Swarm::from_config(config));
    let dispatcher = Dispatcher::new(config.worker.resolved_threads())?;

    let mut datasets: HashMap<String, Vec<ChunkId>> = HashMap::new();
    for entry in manifest.datasets {
        let dataset = swarm.create_dataset(entry.name.clone())?;
        let mut chunk_ids = Vec::with_capacity(entry.chunks.len());
        for (i, chunk) in entry.chunks.into_iter().enumerate() {
            let created = swarm
                .add_chunk(
                    dataset.id,
                    NewChunk {
                        content: chunk.content,
                        delimiter: chunk.delimiter,
                        service: chunk.service,
                        ignore_features: chunk.ignore_features.map(Into::into).unwrap_or_default(),
                        to_lowercase: chunk.to_lowercase,
                        properties: raw_properties(chunk.properties)?,
                        tags: chunk.tags,
                    },
                )
                .with_context(|| format!("dataset '{}' chunk {}", entry.name, i))?;
            chunk_ids.push(created.id);
        }
        datasets.insert(entry.name, chunk_ids);
    }

    let mut estimators: HashMap<String, EstimatorId> = HashMap::new();
    for entry in manifest.estimators {
        let created = swarm
            .create_estimator(NewEstimator {
                name: entry.name,
                service: entry.service,
                properties: raw_properties(entry.properties)?,
            })
            .with_context(|| format!("estimator '{}'", entry.key))?;
        estimators.insert(entry.key, created.id);
    }

    let mut tasks: HashMap<String, TaskId> = HashMap::new();
    let mut unsuccessful = 0usize;
    for entry in manifest.tasks {
        let kind = entry.task_kind()?;
        let estimator_id = *estimators
            .get(&entry.estimator)
            .ok_or_else(|| anyhow!("task '{}': unknown estimator '{}'", entry.key, entry.estimator))?;
        let mut chunk_ids = Vec::new();
        for name in &entry.datasets {
            let ids = datasets
                .get(name)
                .ok_or_else(|| anyhow!("task '{}': unknown dataset '{}'", entry.key, name))?;
            chunk_ids.extend(ids.iter().copied());
        }
        let training_id = match &entry.training {
            Some(key) => Some(
                *tasks
                    .get(key)
                    .ok_or_else(|| anyhow!("task '{}': unknown training '{}'", entry.key, key))?,
            ),
            None => None,
        };

        let id = swarm
            .create_task(NewTask {
                kind,
                owner_id: entry.owner,
                estimator_id,
                chunk_ids,
                training_id,
                properties: raw_properties(entry.properties)?,
            })
            .with_context(|| format!("task '{}'", entry.key))?;
        tasks.insert(entry.key.clone(), id);

        let record = dispatcher
            .dispatch(Arc::clone(&swarm), id)
            .wait()
            .context("worker exited without reporting")?
            .with_context(|| format!("task '{}'", entry.key))?;
        if record.status != TaskStatus::Completed {
            unsuccessful += 1;
        }
        print_task(&entry.key, &record, json)?;
    }

    info!(tasks = tasks.len(), unsuccessful, "manifest finished");
    if unsuccessful > 0 {
        bail!("{} of {} task(s) did not complete", unsuccessful, tasks.len());
    }
    Ok(())
}

fn print_task(key: &str, record: &TaskRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }
    println!("{} [{}] {} {}", key, record.kind, record.id, record.status);
    if let Some(errors) = &record.errors {
        println!("  errors: {}", errors);
    }
    if let Some(report) = record.report() {
        println!("  report: {}", report);
    }
    Ok(())
}
