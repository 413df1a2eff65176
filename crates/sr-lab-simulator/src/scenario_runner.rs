use anyhow::{Context, Result, bail, ensure};
use sr_lab_abstract::{
    Message, ProtocolConfig, SimConfig, TestAction, TestAssertion, TestScenario,
    TransportProtocol,
};
use sr_lab_protocol::{SrReceiver, SrSender};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::engine::Simulator;
use crate::trace::SimulationReport;

pub fn load_scenario(path: &Path) -> Result<TestScenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    let scenario: TestScenario = toml::from_str(&content)
        .with_context(|| format!("Failed to parse scenario file {}", path.display()))?;
    Ok(scenario)
}

/// Simulation config with the scenario's overrides applied.
pub fn sim_config(scenario: &TestScenario) -> Result<SimConfig> {
    let mut config = SimConfig::default();
    scenario.config.apply_to(&mut config);
    config
        .validate()
        .with_context(|| format!("Invalid channel config in scenario '{}'", scenario.name))?;
    Ok(config)
}

/// Protocol config with the scenario's overrides applied.
pub fn protocol_config(scenario: &TestScenario) -> Result<ProtocolConfig> {
    let mut config = ProtocolConfig::default();
    scenario.protocol.apply_to(&mut config);
    config
        .validate()
        .with_context(|| format!("Invalid protocol config in scenario '{}'", scenario.name))?;
    Ok(config)
}

pub fn configure_actions<S, R>(sim: &mut Simulator<S, R>, actions: &[TestAction])
where
    S: TransportProtocol,
    R: TransportProtocol,
{
    for action in actions {
        match action {
            TestAction::AppSend { time, data } => {
                sim.schedule_app_send(*time, data.as_bytes().to_vec());
            }
            TestAction::AppBurst {
                time,
                count,
                interval,
            } => {
                sim.schedule_messages(*time, *count, *interval);
            }
            TestAction::DropNextFromSenderSeq { seq } => {
                sim.add_drop_sender_seq_once(*seq);
            }
            TestAction::DropNextFromReceiverAck { ack } => {
                sim.add_drop_receiver_ack_once(*ack);
            }
            TestAction::CorruptNextFromSenderSeq { seq } => {
                sim.add_corrupt_sender_seq_once(*seq);
            }
            TestAction::CorruptNextFromReceiverAck { ack } => {
                sim.add_corrupt_receiver_ack_once(*ack);
            }
        }
    }
}

/// Build a simulator for `scenario` around the given endpoints.
pub fn build_simulator<S, R>(
    scenario: &TestScenario,
    sender: S,
    receiver: R,
) -> Result<Simulator<S, R>>
where
    S: TransportProtocol,
    R: TransportProtocol,
{
    let mut sim = Simulator::new(sim_config(scenario)?, sender, receiver)?;
    configure_actions(&mut sim, &scenario.actions);
    Ok(sim)
}

/// Selective Repeat endpoints configured for `scenario`.
pub fn sr_endpoints(scenario: &TestScenario) -> Result<(SrSender, SrReceiver)> {
    let config = protocol_config(scenario)?;
    Ok((SrSender::new(config.clone())?, SrReceiver::new(config)?))
}

/// Run a scenario file against the Selective Repeat endpoints and check its assertions.
pub fn run_scenario(scenario_path: &str) -> Result<SimulationReport> {
    let scenario = load_scenario(Path::new(scenario_path))?;
    let (sender, receiver) = sr_endpoints(&scenario)?;
    run_with(&scenario, sender, receiver)
}

/// Run `scenario` with arbitrary endpoints and check its assertions.
pub fn run_with<S, R>(scenario: &TestScenario, sender: S, receiver: R) -> Result<SimulationReport>
where
    S: TransportProtocol,
    R: TransportProtocol,
{
    info!("Running scenario '{}': {}", scenario.name, scenario.description);
    let mut sim = build_simulator(scenario, sender, receiver)?;
    sim.run_until_complete();
    let report = sim.export_report();
    check_assertions(scenario, &report)?;
    info!("Scenario '{}' passed", scenario.name);
    Ok(report)
}

fn padded(data: &[u8]) -> Result<Vec<u8>> {
    Ok(Message::from_slice(data)?.as_bytes().to_vec())
}

pub fn check_assertions(scenario: &TestScenario, report: &SimulationReport) -> Result<()> {
    for assertion in &scenario.assertions {
        check_assertion(assertion, report)
            .with_context(|| format!("Scenario '{}' failed", scenario.name))?;
    }
    Ok(())
}

fn check_assertion(assertion: &TestAssertion, report: &SimulationReport) -> Result<()> {
    match assertion {
        TestAssertion::DataDelivered { data } => {
            let expected = padded(data.as_bytes())?;
            ensure!(
                report.delivered_data.contains(&expected),
                "data {data:?} was never delivered"
            );
        }
        TestAssertion::DeliveredInOrder => {
            ensure!(
                report.accepted_data.len() == report.submitted_data.len(),
                "only {} of {} submitted messages were accepted by the sender",
                report.accepted_data.len(),
                report.submitted_data.len()
            );
            let expected = report
                .accepted_data
                .iter()
                .map(|data| padded(data))
                .collect::<Result<Vec<_>>>()?;
            if report.delivered_data != expected {
                let first_mismatch = report
                    .delivered_data
                    .iter()
                    .zip(&expected)
                    .position(|(got, want)| got != want);
                bail!(
                    "delivered {} messages, expected {} (first mismatch at {:?})",
                    report.delivered_data.len(),
                    expected.len(),
                    first_mismatch
                );
            }
        }
        TestAssertion::DeliveredCount { count } => {
            ensure!(
                report.delivered_data.len() == *count,
                "delivered {} messages, expected {count}",
                report.delivered_data.len()
            );
        }
        TestAssertion::SenderPacketCount { min, max } => {
            let sent = report.sender_packet_count;
            ensure!(sent >= *min, "sender sent {sent} packets, expected at least {min}");
            if let Some(max) = max {
                ensure!(sent <= *max, "sender sent {sent} packets, expected at most {max}");
            }
        }
        TestAssertion::Retransmissions { min, max } => {
            let resent = report.retransmissions();
            ensure!(
                resent >= *min,
                "sender retransmitted {resent} packets, expected at least {min}"
            );
            if let Some(max) = max {
                ensure!(
                    resent <= *max,
                    "sender retransmitted {resent} packets, expected at most {max}"
                );
            }
        }
        TestAssertion::MaxDuration { ms } => {
            ensure!(
                report.duration_ms <= *ms,
                "run took {}ms, limit is {ms}ms",
                report.duration_ms
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(text: &str) -> TestScenario {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn rejects_misconfigured_protocol() {
        let s = scenario(
            r#"
            name = "bad"
            actions = []
            [protocol]
            window_size = 6
            seq_space = 7
            "#,
        );
        let err = sr_endpoints(&s).unwrap_err();
        assert!(format!("{err:#}").contains("too small"));
    }

    #[test]
    fn clean_channel_scenario_passes() {
        let s = scenario(
            r#"
            name = "clean"
            [[actions]]
            type = "app_send"
            time = 0
            data = "hello"

            [[actions]]
            type = "app_burst"
            time = 10
            count = 8
            interval = 0

            [[assertions]]
            type = "data_delivered"
            data = "hello"

            [[assertions]]
            type = "delivered_in_order"

            [[assertions]]
            type = "delivered_count"
            count = 9

            [[assertions]]
            type = "retransmissions"
            min = 0
            max = 0
            "#,
        );
        let (sender, receiver) = sr_endpoints(&s).unwrap();
        let report = run_with(&s, sender, receiver).unwrap();
        assert!(report.app_busy_count > 0);
        assert_eq!(report.backlog, 0);
    }

    #[test]
    fn failing_assertion_is_reported() {
        let s = scenario(
            r#"
            name = "impossible"
            [[actions]]
            type = "app_send"
            time = 0
            data = "x"

            [[assertions]]
            type = "delivered_count"
            count = 2
            "#,
        );
        let (sender, receiver) = sr_endpoints(&s).unwrap();
        let err = run_with(&s, sender, receiver).unwrap_err();
        assert!(format!("{err:#}").contains("impossible"));
    }
}
