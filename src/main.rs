use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use tracelink::trace::{ActionResult, AgentName, LogMode, TraceWriter};
use tracelink::transport::{CommandId, ConnectionHooks, Connector, Tracer};
use tracelink::TransportConfig;

const DEMO_AGENTS: usize = 3;

// Greets the observer and logs whatever it sends back.
struct DemoHooks;

impl ConnectionHooks for DemoHooks {
    fn on_connection(&mut self, tracer: &Tracer) {
        tracer.send_text("[connected]tracelink demo\n", CommandId::INITIAL);
    }

    fn on_receive_messages(&mut self, messages: &str, _tracer: &Tracer) {
        for line in messages.lines().filter(|l| !l.trim().is_empty()) {
            info!("[MSG] {}", line);
        }
    }
}

fn load_config() -> anyhow::Result<TransportConfig> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => TransportConfig::from_path(path)?,
        None => TransportConfig::default(),
    };
    if let Ok(port) = std::env::var("TRACELINK_PORT") {
        config.port = port.parse()?;
    }
    Ok(config)
}

/// A fake agent ticking its tree and emitting trace lines until stopped.
fn run_agent(index: usize, writer: TraceWriter, stop: CancellationToken) {
    let agent = AgentName::new("Demo.Agent", &format!("agent_{}", index));
    let mut count = 0u32;

    while !stop.is_cancelled() {
        count += 1;
        writer.action(&agent, "demo.xml.Sequence[0]:enter", ActionResult::All, LogMode::Tick, count);
        writer.property(&agent, "Demo::Agent::ticks", &count.to_string());
        writer.action(&agent, "demo.xml.Sequence[0]:exit", ActionResult::Success, LogMode::Tick, count);
        std::thread::sleep(Duration::from_millis(50));
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Setup Logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // 2. Transport
    let config = load_config()?;
    // init may wait for the observer when `blocking` is set.
    let connector = tokio::task::block_in_place(|| Connector::init_with_hooks(config, DemoHooks))?;
    info!(port = connector.local_port(), "tracelink demo up, attach an observer");

    // 3. Agents on their own OS threads, one trace slot each
    let stop = CancellationToken::new();
    let agents: Vec<_> = (0..DEMO_AGENTS)
        .map(|i| {
            let writer = TraceWriter::new(connector.tracer());
            let stop = stop.clone();
            std::thread::spawn(move || run_agent(i, writer, stop))
        })
        .collect();

    // 4. Status until Ctrl+C
    let mut cadence = tokio::time::interval(Duration::from_secs(1));
    cadence.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = cadence.tick() => {
                info!(
                    state = ?connector.state(),
                    threads = connector.tracked_threads(),
                    overhead = connector.memory_overhead(),
                    dropped = connector.dropped_count(),
                    "status"
                );
            }
        }
    }

    info!("shutting down");
    stop.cancel();
    for agent in agents {
        let _ = agent.join();
    }
    connector.close();
    Ok(())
}
