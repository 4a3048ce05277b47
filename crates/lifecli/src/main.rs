// crates/lifecli/src/main.rs

mod scenario;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use lifecore::memory::{MemoryStorage, RecordingJobCache};
use lifecore::{AgentId, ClusterObject, ItemId, KernelEvent, TransactionScope, TransitionId};
use liferuntime::{JobScope, Kernel, KernelConfig, StepRegistry, Workflow};
use scenario::{ActionDef, Scenario};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "life")]
#[command(about = "Item lifecycle kernel CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay the actions of a scenario against an in-memory kernel
    Simulate {
        /// Path to scenario JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Number of job push workers
        #[arg(long, default_value_t = 4)]
        push_workers: usize,

        /// Pending job pushes kept before new ones are dropped
        #[arg(long, default_value_t = 256)]
        queue_capacity: usize,

        /// Do not deliver job lists to agents
        #[arg(long)]
        no_push: bool,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Check the workflow of a scenario
    Verify {
        /// Path to scenario JSON file
        file: PathBuf,
    },

    /// List the predefined steps every item offers
    Steps,

    /// Create an example scenario
    Init {
        /// Output file path
        #[arg(short, long, default_value = "scenario.json")]
        output: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            file,
            push_workers,
            queue_capacity,
            no_push,
            verbose,
        } => {
            init_logging(verbose);
            let config = KernelConfig {
                push_workers,
                push_queue_capacity: queue_capacity,
                push_jobs: !no_push,
                ..KernelConfig::default()
            };
            simulate(file, config).await?;
        }

        Commands::Verify { file } => {
            init_logging(false);
            verify_scenario(file)?;
        }

        Commands::Steps => {
            list_steps();
        }

        Commands::Init { output } => {
            create_example_scenario(output)?;
        }
    }

    Ok(())
}

fn registry() -> StepRegistry {
    let mut registry = StepRegistry::new();
    lifesteps::register_all(&mut registry);
    registry
}

async fn simulate(file: PathBuf, config: KernelConfig) -> Result<()> {
    println!("🚀 Loading scenario from: {}", file.display());
    let scenario = Scenario::load(&file)?;

    println!("📋 Scenario: {}", scenario.name);
    println!("   Steps: {}", scenario.steps.len());
    println!("   Actions: {}", scenario.actions.len());
    println!();

    let storage = Arc::new(MemoryStorage::new());
    let cache = Arc::new(RecordingJobCache::new());
    let kernel = Kernel::builder(
        storage.clone(),
        Arc::new(scenario.lookup()),
        Arc::new(scenario.descriptions()),
    )
    .with_steps(Arc::new(registry()))
    .with_job_cache(cache.clone())
    .with_config(config)
    .build();

    let mut events = kernel.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(&event);
        }
    });

    let item = ItemId::new();
    let mut workflow = kernel.new_workflow(item);
    scenario.build(&mut workflow)?;
    if !workflow.verify() {
        print_diagnostics(&workflow);
        bail!("the workflow of '{}' is not sound", scenario.name);
    }

    let scope = TransactionScope::begin(kernel.storage())?;
    for property in &scenario.properties {
        kernel
            .storage()
            .put(item, &ClusterObject::Property(property.clone()), scope.txn())?;
    }
    scope.commit()?;

    kernel.create_item(&AgentId::new(&scenario.creator), workflow)?;
    println!("▶️  Created item {}", item);

    for action in &scenario.actions {
        match perform(&kernel, item, action) {
            Ok(_) => println!("  ✅ {} did {} on {}", action.agent, action.transition, action.step),
            Err(e) => println!(
                "  ❌ {} could not {} {}: {}",
                action.agent, action.transition, action.step, e
            ),
        }
        // let the push workers catch up between actions
        tokio::task::yield_now().await;
    }

    println!();
    println!("📊 Job lists:");
    for name in scenario.agents() {
        let jobs = kernel.calculate_jobs(&AgentId::new(&name), item, JobScope::Domain)?;
        if jobs.is_empty() {
            println!("   {}: nothing to do", name);
            continue;
        }
        println!("   {}:", name);
        for job in jobs {
            println!("     {} {} ({} -> {})", job.transition_name, job.step_path, job.origin_state, job.target_state);
        }
    }

    kernel.shutdown().await;
    let pushed = cache.refreshes().await.len();
    let recorded = storage
        .objects(item)
        .values()
        .filter(|o| o.as_event().is_some())
        .count();
    drop(kernel);
    let _ = event_task.await;

    println!();
    println!("📤 Summary:");
    println!("   Audit events: {}", recorded);
    println!("   Job lists delivered: {}", pushed);
    Ok(())
}

/// Requests the action, resolving its transition by name first.
fn perform(kernel: &Kernel, item: ItemId, action: &ActionDef) -> Result<String> {
    let transition = transition_id(kernel, item, &action.step, &action.transition)?;
    let payload = action.payload()?;
    Ok(kernel.request_action(&AgentId::new(&action.agent), item, &action.step, transition, &payload)?)
}

fn transition_id(kernel: &Kernel, item: ItemId, step: &str, name: &str) -> Result<TransitionId> {
    let workflow = kernel.load_workflow(item)?;
    let v = workflow
        .search(step)
        .ok_or_else(|| anyhow!("no step at '{}'", step))?;
    let machine = workflow.state_machine(v, kernel)?;
    machine
        .transition_by_name(name)
        .map(|t| t.id)
        .ok_or_else(|| anyhow!("state machine {} has no transition '{}'", machine.name, name))
}

fn print_event(event: &KernelEvent) {
    match event {
        KernelEvent::TransitionPerformed {
            step_path,
            transition,
            event_id,
            agent,
            ..
        } => {
            println!("  ⚡ event {}: {} performed transition {} on {}", event_id, agent, transition, step_path);
        }
        KernelEvent::JobsPushed { step_path, agent, jobs, .. } => {
            println!("     📬 {} job(s) on {} sent to {}", jobs, step_path, agent);
        }
        KernelEvent::PushFailed { step_path, target, reason, .. } => {
            println!("     ⚠️  jobs on {} not delivered to {}: {}", step_path, target, reason);
        }
        KernelEvent::PushDropped { step_path, role, .. } => {
            println!("     ⚠️  push queue full, jobs on {} for role {} dropped", step_path, role);
        }
    }
}

fn print_diagnostics(workflow: &Workflow) {
    for diagnostic in workflow.diagnostics() {
        println!("   {}: {}", diagnostic.path, diagnostic.message);
    }
}

fn verify_scenario(file: PathBuf) -> Result<()> {
    println!("🔍 Verifying scenario: {}", file.display());

    let scenario = Scenario::load(&file)?;
    let mut workflow = Workflow::new(ItemId::new()).with_predefined(&registry());
    scenario.build(&mut workflow)?;

    if !workflow.verify() {
        println!("❌ Workflow is not sound:");
        print_diagnostics(&workflow);
        bail!("{} problem(s) found", workflow.diagnostics().len());
    }

    println!("✅ Workflow is sound:");
    println!("   Name: {}", scenario.name);
    println!("   Vertices: {}", workflow.vertex_count());
    println!("   Nexts: {}", scenario.nexts.len());
    Ok(())
}

fn list_steps() {
    println!("📦 Predefined Steps:");
    println!();

    let registry = registry();
    for step_type in registry.list_step_types() {
        match registry.description(&step_type) {
            Some(description) => {
                println!("  • {}", step_type);
                println!("    {}", description);
            }
            None => println!("  • {}", step_type),
        }
    }
}

fn create_example_scenario(output: PathBuf) -> Result<()> {
    let scenario = Scenario::example()?;

    let json = serde_json::to_string_pretty(&scenario)?;
    std::fs::write(&output, json)?;

    println!("✨ Created example scenario: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  life simulate --file {}", output.display());

    Ok(())
}
