use crate::cli::commands::{Cli, Commands};
use anyhow::{Context, Result};
use phasegate::EngineError;
use phasegate::config::Config;
use phasegate::evidence::EvidenceStore;
use phasegate::gates::{GateEngine, GateIssue, GateRegistry};
use phasegate::observability::create_observer;
use phasegate::plan::Plan;
use phasegate::report::{ReportStore, exit_codes, render_summary};
use phasegate::runner::CommandRunner;
use phasegate::scheduler::{Scheduler, SchedulerOptions};
use serde_json::json;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Options of `phasegate execute`.
struct ExecuteArgs {
    contract: PathBuf,
    plan_only: bool,
    force: bool,
    max_workers: Option<u16>,
    state_dir: Option<PathBuf>,
    workdir: Option<PathBuf>,
    json: bool,
}

/// Run a parsed command line. Returns the process exit code.
pub async fn dispatch(cli: Cli, config: Config) -> Result<i32> {
    match cli.command {
        Commands::Execute {
            contract,
            plan,
            force,
            max_workers,
            state_dir,
            workdir,
            json,
        } => {
            execute(
                config,
                ExecuteArgs {
                    contract,
                    plan_only: plan,
                    force,
                    max_workers,
                    state_dir,
                    workdir,
                    json,
                },
            )
            .await
        }
        Commands::Show {
            report,
            json,
            state_dir,
        } => show(config, &report, json, state_dir),
        Commands::Evidence { digest, state_dir } => evidence(config, &digest, state_dir),
    }
}

fn apply_state_dir(config: &mut Config, state_dir: Option<PathBuf>) {
    if let Some(dir) = state_dir {
        config.storage.state_dir = dir.to_string_lossy().into_owned();
    }
}

async fn execute(mut config: Config, args: ExecuteArgs) -> Result<i32> {
    apply_state_dir(&mut config, args.state_dir);
    if let Some(workers) = args.max_workers {
        config.scheduler.max_workers = usize::from(workers);
    }

    let plan = Plan::load(&args.contract)?;
    let gates = GateEngine::new(Arc::new(GateRegistry::with_builtins()), &config.gates);

    if args.plan_only {
        let issues = gates.dry_run(&plan.contract);
        print_plan(&plan, &issues, args.json)?;
        return Ok(if issues.is_empty() {
            exit_codes::SUCCESS
        } else {
            exit_codes::INVALID
        });
    }

    let reports = ReportStore::new(config.storage.reports_dir());
    let evidence = Arc::new(EvidenceStore::new(config.storage.evidence_dir()));
    if !args.force {
        let earlier = reports
            .find_successful(&plan.plan_hash)
            .map_err(EngineError::from)?;
        if let Some((path, report)) = earlier {
            // The earlier report carries the evidence digests this run would reproduce.
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "plan {} already succeeded; pass --force to run it again",
                    plan.plan_hash
                );
                print!("{}", render_summary(&report, Some(&evidence), Some(&path)));
            }
            return Ok(exit_codes::SUCCESS);
        }
    }

    let workdir = match args.workdir {
        Some(dir) => dir,
        None => std::env::current_dir().context("failed to resolve current directory")?,
    };
    let runner = Arc::new(CommandRunner::new(evidence.clone(), config.runner.clone()));
    let scheduler = Scheduler::new(
        runner,
        gates,
        create_observer(&config.logging.observer),
        SchedulerOptions {
            max_workers: config.scheduler.effective_max_workers(),
            non_blocking_failure: config.gates.non_blocking_failure,
            workdir,
        },
    );

    let cancel = CancellationToken::new();
    if config.scheduler.cancel_on_ctrl_c {
        let token = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; letting in-flight tasks finish");
                token.cancel();
            }
        });
    }

    info!(
        contract = %args.contract.display(),
        plan_hash = %plan.plan_hash,
        "executing contract"
    );
    let report = scheduler.run(&plan, cancel).await;
    let path = reports.save(&report).map_err(EngineError::from)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_summary(&report, Some(&evidence), Some(&path)));
    }
    Ok(report.exit_code)
}

fn print_plan(plan: &Plan, issues: &[GateIssue], as_json: bool) -> Result<()> {
    if as_json {
        let issues: Vec<String> = issues.iter().map(ToString::to_string).collect();
        let doc = json!({
            "plan_hash": plan.plan_hash,
            "valid": issues.is_empty(),
            "issues": issues,
            "contract": plan.contract,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    let contract = &plan.contract;
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", contract.task_id, contract.title);
    let _ = writeln!(out, "plan: {}", plan.plan_hash);
    for phase in &contract.phases {
        let (parallel, sequential) = phase.partition();
        let _ = writeln!(
            out,
            "phase {}{}: {} parallel, {} sequential",
            phase.name,
            if phase.blocking { " [blocking]" } else { "" },
            parallel.len(),
            sequential.len()
        );
        for task in &phase.tasks {
            let _ = writeln!(
                out,
                "  {} {}{}",
                if task.parallel { "[P]" } else { "   " },
                task.id,
                task.title
                    .as_deref()
                    .map(|title| format!(" - {title}"))
                    .unwrap_or_default()
            );
        }
    }
    let gate_count = contract.all_gates().count();
    if issues.is_empty() {
        let _ = writeln!(out, "gates: {gate_count} declared, all valid");
    } else {
        let _ = writeln!(out, "gates: {gate_count} declared, {} invalid", issues.len());
        for issue in issues {
            let _ = writeln!(out, "  {issue}");
        }
    }
    print!("{out}");
    Ok(())
}

fn show(
    mut config: Config,
    report_path: &Path,
    as_json: bool,
    state_dir: Option<PathBuf>,
) -> Result<i32> {
    apply_state_dir(&mut config, state_dir);
    let report = ReportStore::load(report_path).map_err(EngineError::from)?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let evidence = EvidenceStore::new(config.storage.evidence_dir());
        print!("{}", render_summary(&report, Some(&evidence), Some(report_path)));
    }
    Ok(exit_codes::SUCCESS)
}

fn evidence(mut config: Config, digest: &str, state_dir: Option<PathBuf>) -> Result<i32> {
    apply_state_dir(&mut config, state_dir);
    let store = EvidenceStore::new(config.storage.evidence_dir());
    let bytes = store
        .get(digest)
        .map_err(EngineError::from)
        .with_context(|| format!("evidence lookup failed in {}", store.root().display()))?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&bytes)?;
    stdout.flush()?;
    Ok(exit_codes::SUCCESS)
}
