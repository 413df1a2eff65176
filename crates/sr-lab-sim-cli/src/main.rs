use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{Level, info, warn};

use sr_lab_abstract::{
    ProtocolConfigOverride, RetransmitPolicy, SimConfigOverride, TestAction, TestScenario,
};
use sr_lab_protocol::{SrReceiver, SrSender};
use sr_lab_simulator::{SimulationReport, Simulator, scenario_runner};

#[derive(Parser, Debug)]
#[command(author, version, about = "Selective Repeat ARQ simulator")]
struct Args {
    /// Load a scenario from disk. Flags below override its settings.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Sender and receiver window size.
    #[arg(long)]
    window_size: Option<usize>,

    /// Sequence number modulus (at least twice the window size).
    #[arg(long)]
    seq_space: Option<u32>,

    /// Retransmission timeout in ms.
    #[arg(long)]
    timeout: Option<u64>,

    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,

    /// Probability that a packet is lost.
    #[arg(long)]
    loss: Option<f64>,

    /// Probability that a packet is corrupted.
    #[arg(long)]
    corrupt: Option<f64>,

    #[arg(long)]
    min_latency: Option<u64>,
    #[arg(long)]
    max_latency: Option<u64>,

    #[arg(long)]
    seed: Option<u64>,

    /// Messages to generate when no scenario is given.
    #[arg(long, default_value_t = 20, conflicts_with = "scenario")]
    messages: u32,

    /// Gap between generated messages in ms.
    #[arg(long, default_value_t = 50, conflicts_with = "scenario")]
    interval: u64,

    /// Stop the run after this many simulated ms.
    #[arg(long)]
    time_limit: Option<u64>,

    #[arg(long, default_value_t = Level::INFO)]
    log_level: Level,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    PerPacket,
    GoBackN,
}

impl From<PolicyArg> for RetransmitPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::PerPacket => RetransmitPolicy::PerPacket,
            PolicyArg::GoBackN => RetransmitPolicy::GoBackN,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();
    info!("sr-lab-sim-cli starting…");

    let mut scenario = match &args.scenario {
        Some(path) => scenario_runner::load_scenario(path)?,
        None => args.generated_scenario(),
    };
    args.apply_overrides(&mut scenario);

    let (sender, receiver) = scenario_runner::sr_endpoints(&scenario)?;
    let mut sim = scenario_runner::build_simulator(&scenario, sender, receiver)?;
    sim.set_record_link_events(args.trace_out.is_some());
    sim.run_until_complete();
    let report = sim.export_report();
    log_summary(&sim, &report);

    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &report)?;
    }

    scenario_runner::check_assertions(&scenario, &report)?;
    Ok(())
}

impl Args {
    fn generated_scenario(&self) -> TestScenario {
        TestScenario {
            name: "generated".to_string(),
            description: format!("{} messages every {}ms", self.messages, self.interval),
            config: SimConfigOverride::default(),
            protocol: ProtocolConfigOverride::default(),
            actions: vec![TestAction::AppBurst {
                time: 0,
                count: self.messages,
                interval: self.interval,
            }],
            assertions: Vec::new(),
        }
    }

    fn apply_overrides(&self, scenario: &mut TestScenario) {
        let protocol = &mut scenario.protocol;
        protocol.window_size = self.window_size.or(protocol.window_size);
        protocol.seq_space = self.seq_space.or(protocol.seq_space);
        protocol.timeout_ms = self.timeout.or(protocol.timeout_ms);
        protocol.policy = self.policy.map(Into::into).or(protocol.policy);

        let config = &mut scenario.config;
        config.loss_rate = self.loss.or(config.loss_rate);
        config.corrupt_rate = self.corrupt.or(config.corrupt_rate);
        config.min_latency = self.min_latency.or(config.min_latency);
        config.max_latency = self.max_latency.or(config.max_latency);
        config.seed = self.seed.or(config.seed);
        config.time_limit = self.time_limit.or(config.time_limit);
    }
}

fn log_summary(sim: &Simulator<SrSender, SrReceiver>, report: &SimulationReport) {
    let sender = sim.sender.stats();
    let receiver = sim.receiver.stats();
    info!(
        "Delivered {}/{} messages in {}ms",
        report.delivered_data.len(),
        report.submitted_data.len(),
        report.duration_ms
    );
    info!(
        "Sender: {} sent, {} resent, {} window-full; ACKs {} new, {} dup, {} corrupted",
        sender.packets_sent,
        sender.retransmissions,
        sender.window_full,
        sender.new_acks,
        sender.duplicate_acks,
        sender.corrupted_acks
    );
    info!(
        "Receiver: {} received, {} duplicates, {} corrupted, {} out of window, {} ACKs",
        receiver.packets_received,
        receiver.duplicates,
        receiver.corrupted,
        receiver.out_of_window,
        receiver.acks_sent
    );
    info!(
        "Channel: forward {}/{} lost, {} corrupted; reverse {}/{} lost, {} corrupted",
        report.forward.lost,
        report.forward.sent,
        report.forward.corrupted,
        report.reverse.lost,
        report.reverse.sent,
        report.reverse.corrupted
    );
    if report.backlog > 0 {
        warn!("{} messages were never accepted by the sender", report.backlog);
    }
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    info!("Trace written to {}", path.display());
    Ok(())
}
