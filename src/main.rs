use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use dns_benchmark_core::cli::{BenchmarkArgs, Cli, Command};
use dns_benchmark_core::config::FailCondition;
use dns_benchmark_core::driver::RunOutcome;
use dns_benchmark_core::server::{HttpVersion, ServerDescriptor};
use dns_benchmark_core::stats::AggregateStats;
use dns_benchmark_core::{batch, config, driver, question, report, score};

const EXIT_OK: u8 = 0;
const EXIT_ERROR: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
	tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

	let cli = <Cli as clap::Parser>::parse();
	match run(cli).await {
		Ok(code) => ExitCode::from(code),
		Err(e) => {
			eprintln!("error: {e}");
			ExitCode::from(EXIT_ERROR)
		}
	}
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
	let command = cli.command.unwrap_or(Command::Benchmark(cli.benchmark));
	match command {
		Command::Benchmark(args) => run_benchmark(args).await,
		Command::Frontend { addr } => {
			// The frontend subcommand exists only so its own flags validate;
			// the benchmarking core never binds a listener itself.
			eprintln!("frontend subcommand is out of scope for dns-benchmark-core (would bind {addr})");
			Ok(EXIT_ERROR)
		}
	}
}

async fn run_benchmark(args: BenchmarkArgs) -> anyhow::Result<u8> {
	let (server, config, questions) = config::assemble(&args).await?;
	let questions = Arc::new(questions);

	report::print_config_summary(&args.server, questions.len(), config.concurrency);

	if let Some(batch_raw) = &args.batch_json {
		return run_batch_mode(&args, batch_raw, config, questions, &server).await;
	}

	let cancel = install_signal_handler();
	let outcome = driver::run(&config, &server, questions, cancel).await?;
	let (aggregate, was_cancelled) = unwrap_outcome(outcome);

	let score = score::calculate_score(&aggregate);
	let is_doh = matches!(server.kind, dns_benchmark_core::server::ServerKind::DoH { .. });
	let report = report::build_report(&aggregate, score, is_doh, server.flags.dnssec_do);

	report::print_summary_table(&args.server, &report);
	if let Some(path) = &args.json {
		write_json(path, &report)?;
	}

	let fail_triggered = fail_conditions_triggered(&aggregate, &config.fail_conditions);
	Ok(exit_code(was_cancelled, fail_triggered))
}

async fn run_batch_mode(
	args: &BenchmarkArgs,
	batch_raw: &str,
	config: config::BenchmarkConfig,
	questions: Arc<Vec<question::Question>>,
	server: &ServerDescriptor,
) -> anyhow::Result<u8> {
	let servers = batch::split_batch_servers(batch_raw);
	let http_version = HttpVersion::parse(&args.doh_protocol)?;
	let doh_method = dns_benchmark_core::server::DohMethod::parse(&args.doh_method)?;

	let entries = batch::run_batch(&servers, &config, questions, args.tcp, args.dot, http_version, doh_method, &server.flags).await;

	let mut out = serde_json::Map::new();
	let mut any_fail = false;
	let mut any_cancelled = false;
	for entry in &entries {
		match &entry.outcome {
			Ok(outcome) => {
				let (aggregate, was_cancelled) = aggregate_ref(outcome);
				any_cancelled |= was_cancelled;
				let score = score::calculate_score(aggregate);
				let is_doh = matches!(server.kind, dns_benchmark_core::server::ServerKind::DoH { .. });
				let report = report::build_report(aggregate, score, is_doh, server.flags.dnssec_do);
				any_fail |= fail_conditions_triggered(aggregate, &config.fail_conditions);
				out.insert(entry.server_label.clone(), serde_json::to_value(&report)?);
			}
			Err(e) => {
				any_fail = true;
				out.insert(entry.server_label.clone(), serde_json::json!({ "error": e.to_string() }));
			}
		}
	}

	let json_text = serde_json::to_string_pretty(&serde_json::Value::Object(out))?;
	if let Some(path) = &args.json {
		std::fs::write(path, &json_text)?;
		println!("batch JSON written to {path}");
	} else {
		println!("{json_text}");
	}

	Ok(exit_code(any_cancelled, any_fail))
}

fn unwrap_outcome(outcome: RunOutcome) -> (AggregateStats, bool) {
	match outcome {
		RunOutcome::Completed(agg) => (agg, false),
		RunOutcome::Cancelled(agg) => (agg, true),
	}
}

fn aggregate_ref(outcome: &RunOutcome) -> (&AggregateStats, bool) {
	match outcome {
		RunOutcome::Completed(agg) => (agg, false),
		RunOutcome::Cancelled(agg) => (agg, true),
	}
}

fn fail_conditions_triggered(stats: &AggregateStats, conditions: &[FailCondition]) -> bool {
	conditions.iter().any(|c| match c {
		FailCondition::IoError => stats.counters.ioerror > 0,
		FailCondition::Negative => stats.counters.negative > 0,
		FailCondition::Error => stats.counters.error > 0,
		FailCondition::IdMismatch => stats.counters.idmismatch > 0,
	})
}

fn exit_code(was_cancelled: bool, fail_triggered: bool) -> u8 {
	if fail_triggered || was_cancelled {
		EXIT_ERROR
	} else {
		EXIT_OK
	}
}

fn write_json(path: &str, report: &report::BenchmarkReport) -> anyhow::Result<()> {
	let json_text = serde_json::to_string_pretty(report)?;
	std::fs::write(path, json_text)?;
	println!("JSON report written to {path}");
	Ok(())
}

/// Install a `SIGINT` handler that cancels the run on the first signal
/// and force-exits the process on a second.
fn install_signal_handler() -> CancellationToken {
	let cancel = CancellationToken::new();
	let handler_cancel = cancel.clone();
	tokio::spawn(async move {
		let mut escalated = false;
		loop {
			if tokio::signal::ctrl_c().await.is_err() {
				return;
			}
			if escalated {
				eprintln!("second interrupt received, exiting immediately");
				std::process::exit(130);
			}
			escalated = true;
			handler_cancel.cancel();
		}
	});
	cancel
}
