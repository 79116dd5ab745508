use assert_cmd::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

fn temp_path(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("flowgen-test-{}-{name}", std::process::id()));
    path
}

fn write_profiles(name: &str) -> PathBuf {
    let path = temp_path(name);
    fs::write(
        &path,
        "SRC_IP,DST_IP,START_TIME,END_TIME,L3_PROTO,L4_PROTO,SRC_PORT,DST_PORT,PACKETS,BYTES,PACKETS_REV,BYTES_REV\n\
         192.0.2.1,192.0.2.2,1000.000,2000.000,4,17,5353,53,5,1500,3,900\n\
         ,,1500.000,2500.000,6,6,40000,443,6,3000,4,2000\n",
    )
    .unwrap();
    path
}

#[test]
fn deterministic_generation() -> Result<(), Box<dyn std::error::Error>> {
    let profiles = write_profiles("profiles.csv");
    let out_a = temp_path("a.pcap");
    let out_b = temp_path("b.pcap");

    for out in [&out_a, &out_b] {
        let mut cmd = Command::cargo_bin("flowgen")?;
        cmd.arg("-p")
            .arg(&profiles)
            .arg("-o")
            .arg(out)
            .arg("-s")
            .arg("42")
            .arg("--address-seed")
            .arg("7");
        cmd.assert().success();
    }

    let bytes_a = fs::read(&out_a)?;
    let bytes_b = fs::read(&out_b)?;
    assert!(!bytes_a.is_empty());
    assert_eq!(bytes_a, bytes_b, "same seeds must give identical pcaps");

    fs::remove_file(profiles)?;
    fs::remove_file(out_a)?;
    fs::remove_file(out_b)?;
    Ok(())
}

#[test]
fn report_matches_the_flow_table_shape() -> Result<(), Box<dyn std::error::Error>> {
    let profiles = write_profiles("report-profiles.csv");
    let out = temp_path("report.pcap");
    let report = temp_path("report.csv");

    let mut cmd = Command::cargo_bin("flowgen")?;
    cmd.arg("-p")
        .arg(&profiles)
        .arg("-o")
        .arg(&out)
        .arg("-r")
        .arg(&report)
        .arg("-s")
        .arg("1");
    cmd.assert().success();

    let report_content = fs::read_to_string(&report)?;
    let mut lines = report_content.lines();
    assert!(lines.next().unwrap().starts_with("SRC_IP,DST_IP"));
    // One record per flow, each with the full column set.
    let records: Vec<_> = lines.collect();
    assert_eq!(records.len(), 2);
    for record in records {
        assert_eq!(record.split(',').count(), 12);
    }

    fs::remove_file(profiles)?;
    fs::remove_file(out)?;
    fs::remove_file(report)?;
    Ok(())
}

#[test]
fn invalid_address_seed_fails_the_run() -> Result<(), Box<dyn std::error::Error>> {
    let profiles = write_profiles("seed-profiles.csv");
    let out = temp_path("seed.pcap");

    let mut cmd = Command::cargo_bin("flowgen")?;
    cmd.arg("-p")
        .arg(&profiles)
        .arg("-o")
        .arg(&out)
        .arg("--address-seed")
        .arg("0");
    cmd.assert().failure();

    fs::remove_file(profiles)?;
    Ok(())
}
