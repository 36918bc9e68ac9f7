//! Audio device listing command.

use clap::Args;
use resono_io::{AudioBackend, AudioHostCatalog, CpalBackend};

#[derive(Args)]
pub struct DevicesArgs {
    /// Audio system to query (e.g. "ALSA", "JACK"); default is the platform's
    #[arg(long)]
    system: Option<String>,

    /// Probe each device for the supported sample rates
    #[arg(long)]
    rates: bool,
}

pub fn run(args: DevicesArgs) -> anyhow::Result<()> {
    println!("Audio Systems");
    println!("=============\n");
    for name in CpalBackend::available_systems() {
        println!("  {name}");
    }
    println!();

    let backend = CpalBackend::with_system(args.system.as_deref().unwrap_or_default())?;
    let default = backend.default_output_device()?.map(|d| d.name);
    let mut catalog = AudioHostCatalog::new();
    let devices = catalog.devices(&backend)?.to_vec();

    if devices.is_empty() {
        println!("No output devices found.");
        return Ok(());
    }

    println!("Output Devices");
    println!("==============\n");
    for (idx, device) in devices.iter().enumerate() {
        let marker = if default.as_deref() == Some(device.name.as_str()) {
            " (default)"
        } else {
            ""
        };
        println!(
            "  [{}] {} ({} Hz, {} ch){}",
            idx, device.name, device.default_sample_rate, device.channels, marker
        );
        if args.rates {
            match catalog.sample_rates(&backend, &device.name) {
                Ok(rates) if rates.is_empty() => println!("      no supported rates"),
                Ok(rates) => {
                    let rates: Vec<String> = rates.iter().map(u32::to_string).collect();
                    println!("      rates: {}", rates.join(", "));
                }
                Err(e) => println!("      rates: unavailable ({e})"),
            }
        }
    }
    println!();
    println!("Total: {} output(s)", devices.len());
    println!();
    println!("Tip: pass a device name, or part of one, to play:");
    println!("  resono play --device \"USB\" --instrument bell");

    Ok(())
}
