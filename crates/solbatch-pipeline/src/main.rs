//! `solbatch` command-line entry point

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use solbatch_extract::{ContractExtractor, Solc};
use solbatch_jobs::{CancelToken, RunSummary};
use solbatch_pipeline::batch::{open_failures, BatchCoordinator, BatchOptions};
use solbatch_pipeline::stages::{deploy, deploy_all, safemath, single, train, StageOptions};
use solbatch_pipeline::{init_tracing, PipelineConfig, SolcSelect, Toolchain};
use solbatch_scaffold::ProjectSynthesizer;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Exit status of a stage stopped by an interrupt
const INTERRUPTED: u8 = 130;

fn concurrency_arg() -> Arg {
    Arg::new("concurrency")
        .long("concurrency")
        .short('j')
        .value_parser(value_parser!(usize))
        .help("Worker-pool width (defaults to the configured width)")
}

fn retry_arg() -> Arg {
    Arg::new("retry-failed")
        .long("retry-failed")
        .action(ArgAction::SetTrue)
        .help("Clear recorded failures before starting")
}

fn dir_arg(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help(help)
}

fn output_arg() -> Arg {
    Arg::new("output")
        .long("output")
        .short('o')
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Output directory")
}

fn cli() -> Command {
    Command::new("solbatch")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Turn a Solidity corpus into deployable projects and drive them through deployment and fuzzing")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("state-dir")
                .long("state-dir")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Directory for checkpoints, snapshots and reports"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .help("Log filter used when RUST_LOG is unset (default: info)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("batch")
                .visible_alias("trufflize")
                .about("Scaffold one project per corpus file, bucketed by compiler release")
                .arg(dir_arg("corpus", "Directory of .sol files"))
                .arg(output_arg())
                .arg(concurrency_arg())
                .arg(
                    Arg::new("solc")
                        .long("solc")
                        .help("Use this release for every file instead of resolving pragmas"),
                )
                .arg(
                    Arg::new("resume")
                        .long("resume")
                        .value_parser(value_parser!(PathBuf))
                        .help("Success-set file of a previous run to resume from"),
                )
                .arg(retry_arg())
                .arg(
                    Arg::new("open-failures")
                        .long("open-failures")
                        .action(ArgAction::SetTrue)
                        .help("Open the failure map with the configured viewer when done"),
                ),
        )
        .subcommand(
            Command::new("deploy-all")
                .about("Compile and deploy every project below a directory")
                .arg(dir_arg("projects", "Directory containing projects"))
                .arg(concurrency_arg())
                .arg(
                    Arg::new("base-port")
                        .long("base-port")
                        .value_parser(value_parser!(u16))
                        .help("Port of the first worker slot"),
                )
                .arg(retry_arg()),
        )
        .subcommand(
            Command::new("deploy")
                .about("Compile and deploy one project against a private chain")
                .arg(
                    Arg::new("project")
                        .long("project")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Project directory"),
                )
                .arg(
                    Arg::new("port")
                        .long("port")
                        .required(true)
                        .value_parser(value_parser!(u16))
                        .help("Chain simulator port"),
                ),
        )
        .subcommand(
            Command::new("train")
                .about("Run the fuzzer over every deployed project")
                .arg(dir_arg("projects", "Directory containing projects"))
                .arg(output_arg())
                .arg(
                    Arg::new("visited")
                        .long("visited")
                        .value_parser(value_parser!(PathBuf))
                        .help("Success-set file of the deploy stage (default: its checkpoint)"),
                )
                .arg(concurrency_arg())
                .arg(retry_arg()),
        )
        .subcommand(
            Command::new("strip-safemath")
                .about("Comment out safe-math overflow guards and recompile")
                .arg(dir_arg("projects", "Directory containing projects"))
                .arg(
                    Arg::new("prefix")
                        .long("prefix")
                        .help("Only projects whose directory name starts with this"),
                )
                .arg(concurrency_arg())
                .arg(retry_arg()),
        )
        .subcommand(
            Command::new("single")
                .about("Scaffold and deploy one source file")
                .arg(
                    Arg::new("file")
                        .long("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Source file"),
                )
                .arg(
                    Arg::new("contract")
                        .long("contract")
                        .help("Contract to deploy (default: extracted from the file)"),
                )
                .arg(
                    Arg::new("solc")
                        .long("solc")
                        .required(true)
                        .help("Compiler release; one of the canonical releases"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .default_value(".")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory the project is written under"),
                ),
        )
        .subcommand(
            Command::new("toolchain-install")
                .about("Install compiler releases")
                .arg(
                    Arg::new("versions")
                        .num_args(0..)
                        .help("Releases to install (default: the configured list)"),
                ),
        )
}

fn required<T: Clone + Send + Sync + 'static>(args: &ArgMatches, id: &str) -> Result<T> {
    args.get_one::<T>(id)
        .cloned()
        .with_context(|| format!("missing argument --{id}"))
}

fn stage_options(config: &PipelineConfig, args: &ArgMatches, default_width: usize) -> StageOptions {
    StageOptions {
        state_dir: config.state_dir.clone(),
        concurrency: args.get_one::<usize>("concurrency").copied().unwrap_or(default_width),
        flush_every: config.flush_every,
        retry_failed: args.get_flag("retry-failed"),
    }
}

fn stage_exit(summary: &RunSummary) -> ExitCode {
    if summary.cancelled {
        ExitCode::from(INTERRUPTED)
    } else {
        ExitCode::SUCCESS
    }
}

fn toolchain(config: &PipelineConfig) -> Toolchain {
    Toolchain::new(Arc::new(SolcSelect::new(config.toolchain.clone())))
}

fn extractor(config: &PipelineConfig) -> ContractExtractor {
    ContractExtractor::new(Arc::new(Solc::new(config.compiler.clone())))
}

async fn run(matches: ArgMatches) -> Result<ExitCode> {
    let config_path = matches.get_one::<PathBuf>("config").cloned();
    let mut config = PipelineConfig::load(config_path.as_deref()).context("loading configuration")?;
    if let Some(state_dir) = matches.get_one::<PathBuf>("state-dir") {
        config.state_dir.clone_from(state_dir);
    }

    let (token, cancel) = CancelToken::new();
    token.cancel_on_ctrl_c();

    match matches.subcommand() {
        Some(("batch", args)) => {
            let corpus: PathBuf = required(args, "corpus")?;
            let output: PathBuf = required(args, "output")?;
            let options = BatchOptions {
                state_dir: config.state_dir.clone(),
                concurrency: args.get_one::<usize>("concurrency").copied().unwrap_or(config.concurrency),
                flush_every: config.flush_every,
                version_override: args.get_one::<String>("solc").cloned(),
                ignored_files: config.ignored_files.clone(),
                retry_failed: args.get_flag("retry-failed"),
                resume_from: args.get_one::<PathBuf>("resume").cloned(),
            };
            let coordinator = BatchCoordinator::new(
                extractor(&config),
                ProjectSynthesizer::new(config.network.clone(), &config.migrations_artifact),
                Arc::new(toolchain(&config)),
                config.version_table(),
                options,
            );
            let report = coordinator
                .run(&corpus, &output, cancel)
                .await
                .with_context(|| format!("scaffolding corpus {}", corpus.display()))?;
            if args.get_flag("open-failures") {
                open_failures(&config.failure_viewer, &report.failures_path).await;
            }
            Ok(if report.cancelled {
                ExitCode::from(INTERRUPTED)
            } else {
                ExitCode::SUCCESS
            })
        }
        Some(("deploy-all", args)) => {
            let root: PathBuf = required(args, "projects")?;
            let template = if config.deploy.command.is_empty() {
                deploy_all::self_deploy_command(config_path.as_deref())?
            } else {
                config.deploy.command.clone()
            };
            let base_port = args.get_one::<u16>("base-port").copied().unwrap_or(config.deploy.base_port);
            let options = stage_options(&config, args, config.concurrency);
            let summary = deploy_all::deploy_all(&root, template, base_port, &options, cancel)
                .await
                .with_context(|| format!("deploying projects under {}", root.display()))?;
            Ok(stage_exit(&summary))
        }
        Some(("deploy", args)) => {
            let project: PathBuf = required(args, "project")?;
            let port: u16 = required(args, "port")?;
            deploy::deploy_project(&config.deploy, &config.simulator, &project, port)
                .await
                .with_context(|| format!("deploying {}", project.display()))?;
            Ok(ExitCode::SUCCESS)
        }
        Some(("train", args)) => {
            let root: PathBuf = required(args, "projects")?;
            let output: PathBuf = required(args, "output")?;
            let options = stage_options(&config, args, config.train.concurrency);
            let source = args
                .get_one::<PathBuf>("visited")
                .map_or(train::DeployedSet::Checkpoint, |p| train::DeployedSet::File(p.clone()));
            let projects = train::deployed_projects(&source, &options).context("reading deployed projects")?;
            let summary = train::train_all(&root, &output, projects, &config.train.command, &options, cancel)
                .await
                .context("generating training data")?;
            Ok(stage_exit(&summary))
        }
        Some(("strip-safemath", args)) => {
            let root: PathBuf = required(args, "projects")?;
            let prefix = args
                .get_one::<String>("prefix")
                .cloned()
                .or_else(|| config.safemath.prefix.clone());
            let options = stage_options(&config, args, config.concurrency);
            let summary = safemath::strip_all(
                &root,
                prefix.as_deref(),
                &config.safemath.patterns,
                &config.deploy.framework,
                &options,
                cancel,
            )
            .await
            .context("stripping safe-math guards")?;
            Ok(stage_exit(&summary))
        }
        Some(("single", args)) => {
            let file = single::SingleFile {
                source: required(args, "file")?,
                contract: args.get_one::<String>("contract").cloned(),
                release: required(args, "solc")?,
                output: required(args, "output")?,
            };
            let scaffold = single::run_single(&file, &config, &toolchain(&config), &extractor(&config))
                .await
                .with_context(|| format!("single-file run of {}", file.source.display()))?;
            tracing::info!(project = %scaffold.root.display(), "done");
            Ok(ExitCode::SUCCESS)
        }
        Some(("toolchain-install", args)) => {
            let versions: Vec<String> = match args.get_many::<String>("versions") {
                Some(values) => values.cloned().collect(),
                None => config.toolchain.install_versions.clone(),
            };
            let failed = toolchain(&config).install_all(&versions).await;
            for (version, error) in &failed {
                tracing::error!(%version, %error, "install failed");
            }
            tracing::info!(requested = versions.len(), failed = failed.len(), "toolchain install finished");
            Ok(if failed.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        _ => Ok(ExitCode::FAILURE),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_tracing(
        matches.get_one::<String>("log-level").map(String::as_str),
        matches.get_flag("json-logs"),
    );

    match run(matches).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "solbatch failed");
            ExitCode::FAILURE
        }
    }
}
