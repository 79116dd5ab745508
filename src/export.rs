use crate::error::Result;
use crate::packet::Packet;
use pcap_file::pcap::{PcapPacket, PcapWriter};
use std::fs::{File, OpenOptions};
use std::io::BufWriter;

/// The packet sink: a pcap file with the standard Ethernet link type.
pub struct PcapExporter {
    writer: PcapWriter<BufWriter<File>>,
}

impl PcapExporter {
    pub fn create(path: &str) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let writer = PcapWriter::new(BufWriter::new(file))?;
        Ok(PcapExporter { writer })
    }

    pub fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        self.writer.write_packet(&PcapPacket::new(
            packet.timestamp,
            packet.data.len() as u32,
            &packet.data,
        ))?;
        Ok(())
    }
}
