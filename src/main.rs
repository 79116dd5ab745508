use flowgen::addressgen::AddressGenerators;
use flowgen::config::{self, Configuration};
use flowgen::error::Error;
use flowgen::export::PcapExporter;
use flowgen::flow::Flow;
use flowgen::meter::TrafficMeter;
use flowgen::profile;
use flowgen::random::RandomGenerator;

mod cmd;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fs;
use std::process;
use std::time::Duration;

/// A flow waiting in the emission queue, keyed by its next packet time.
struct OpenFlow {
    key: Duration,
    flow: Flow,
}

impl PartialEq for OpenFlow {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.flow.id == other.flow.id
    }
}

impl Eq for OpenFlow {}

impl Ord for OpenFlow {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then(self.flow.id.cmp(&other.flow.id))
    }
}

impl PartialOrd for OpenFlow {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = cmd::Args::parse();
    if let Err(e) = run(args) {
        log::error!("{e}");
        process::exit(1);
    }
}

/// Load the configuration and the flow table, plan one flow per profile,
/// then emit packets across all open flows in timestamp order.
fn run(args: cmd::Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => config::import_config(&fs::read_to_string(path)?)?,
        None => Configuration::default(),
    };
    let profiles = profile::load_profiles(&args.profiles)?;
    log::info!("loaded {} flow profiles", profiles.len());

    let seed = args.seed.unwrap_or_else(rand::random);
    log::info!("generating with seed {seed}");
    let mut rng = RandomGenerator::new(seed);
    let mut address_generators = AddressGenerators::new(
        args.address_seed,
        config.ipv4.ip_range.clone(),
        config.ipv6.ip_range.clone(),
    )?;

    let mut meter = TrafficMeter::new();
    let mut exporter = PcapExporter::create(&args.output)?;

    let mut heap: BinaryHeap<Reverse<OpenFlow>> = BinaryHeap::new();
    let mut flow_id = 0u64;
    for profile in &profiles {
        match Flow::new(flow_id, profile, &mut address_generators, &config, &mut rng) {
            Ok(flow) => {
                meter.open_flow(flow_id, profile);
                flow_id += 1;
                if let Some(key) = flow.next_packet_time() {
                    heap.push(Reverse(OpenFlow { key, flow }));
                }
            }
            Err(e @ (Error::UnknownProtocol { .. } | Error::ProtocolMismatch { .. })) => {
                log::error!("skipping flow: {e}");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let progress = ProgressBar::new(heap.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner:.green} Generating [{wide_bar}] {pos}/{len} flows")
            .unwrap(),
    );

    while let Some(Reverse(mut entry)) = heap.pop() {
        let packet = entry.flow.generate_next_packet(&mut rng)?;
        meter.record_packet(entry.flow.id, &packet);
        exporter.write_packet(&packet)?;

        match entry.flow.next_packet_time() {
            Some(key) => {
                entry.key = key;
                heap.push(Reverse(entry));
            }
            None => {
                meter.close_flow(entry.flow.id);
                progress.inc(1);
            }
        }
    }
    progress.finish();

    if let Some(report) = &args.report {
        meter.write_report_csv(report)?;
        log::info!("per-flow report written to {report}");
    }
    log::info!(
        "generated {} packets across {} flows into {}",
        meter.packet_count(),
        meter.flow_count(),
        args.output
    );
    Ok(())
}
