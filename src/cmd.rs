use clap::Parser;

#[derive(Debug, Parser, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(short, long, help = "Input flow table (csv)")]
    pub profiles: String,
    #[arg(short, long, help = "Output pcap file for the generated packets")]
    pub output: String,
    #[arg(
        short,
        long,
        default_value = None,
        help = "Path to the generator configuration file (yaml)"
    )]
    pub config: Option<String>,
    #[arg(
        short,
        long,
        default_value = None,
        help = "Csv file to export per-flow statistics of the generated traffic"
    )]
    pub report: Option<String>,
    #[arg(short, long, help = "Seed for random number generation")]
    pub seed: Option<u32>,
    #[arg(
        long,
        default_value_t = 1,
        help = "Seed of the address generators (1 - 2147483646)"
    )]
    pub address_seed: u32,
}
