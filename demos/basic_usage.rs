use physio_sync::{compute, load_log, ChannelKind, ExtractOptions, LogSet, PhysioConfig};
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    let config = PhysioConfig::default();
    let prefix = "data/Physio_20231220_160314";

    // Print basic information about the trigger log
    let trigger = load_log(format!("{}.ext", prefix), ChannelKind::Trigger, &config)?;
    println!("Format version: {}", trigger.format_version);
    println!("Trigger log samples: {}", trigger.num_samples());
    println!("Started at: {} ms after midnight", trigger.start_time_ms);
    if let Some(span) = trigger.logged_span_ms() {
        println!("Logged span: {:.1} seconds", span as f64 / 1000.0);
    }

    // Align every channel to the scan window without writing anything
    let logs = LogSet::from_prefix(prefix);
    let outputs = compute(&logs, &ExtractOptions::default(), &config)?;

    println!("\nAligned outputs:");
    for output in &outputs {
        let num_samples = std::cmp::min(5, output.trace.len());
        println!(
            "  {}: {} samples, first {}: {:?}",
            output.name,
            output.trace.len(),
            num_samples,
            output.trace.iter().take(num_samples).collect::<Vec<_>>()
        );
    }

    Ok(())
}
